//! # UDP Plumbing
//!
//! Binding and receive loop shared by the network transports. Sockets bind
//! to loopback unless the profile or `PIE_BRIDGE_BIND_HOST` says otherwise.

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{BridgeError, Result};

/// Largest datagram any transport accepts
pub const MAX_DATAGRAM: usize = 2048;

/// Binds a UDP socket for `transport`.
///
/// # Errors
///
/// Returns `Io` if the address is in use or cannot be parsed.
pub async fn bind(transport: &str, host: &str, port: u16) -> Result<UdpSocket> {
    let socket = UdpSocket::bind((host, port)).await.map_err(|e| {
        BridgeError::Io(std::io::Error::new(
            e.kind(),
            format!("cannot bind {}:{}: {}", host, port, e),
        ))
    })?;
    info!("[{}] Listening on UDP {}:{}", transport, host, port);
    Ok(socket)
}

/// Spawns a receive loop calling `on_datagram` for every datagram.
///
/// Receive errors (ICMP port unreachable and the like) are logged and the
/// loop keeps going. The socket closes when the task is aborted.
pub fn spawn_receiver<F>(transport: &'static str, socket: UdpSocket, mut on_datagram: F) -> JoinHandle<()>
where
    F: FnMut(&[u8]) + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, _peer)) => on_datagram(&buf[..len]),
                Err(e) => debug!("[{}] UDP receive error: {}", transport, e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::stop_task;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_bind_loopback_ephemeral() {
        let socket = bind("test", "127.0.0.1", 0).await.unwrap();
        assert!(socket.local_addr().unwrap().ip().is_loopback());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_error() {
        let first = bind("test", "127.0.0.1", 0).await.unwrap();
        let port = first.local_addr().unwrap().port();
        assert!(bind("test", "127.0.0.1", port).await.is_err());
    }

    #[tokio::test]
    async fn test_receiver_delivers_and_shuts_down() {
        let socket = bind("test", "127.0.0.1", 0).await.unwrap();
        let addr = socket.local_addr().unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);

        let mut task = Some(spawn_receiver("test", socket, move |data| {
            counter.fetch_add(data.len(), Ordering::SeqCst);
        }));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(&[1, 2, 3], addr).await.unwrap();

        for _ in 0..100 {
            if seen.load(Ordering::SeqCst) == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(seen.load(Ordering::SeqCst), 3);

        stop_task(&mut task).await;
        assert!(task.is_none());
        // Second stop is a no-op
        stop_task(&mut task).await;
    }
}
