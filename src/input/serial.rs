//! # Serial Plumbing
//!
//! Shared by the serial motion-sensor transports:
//! - Opening a port as 8N1 without flow control
//! - The timed initialization handshake (commands with forced gaps)
//! - A read loop handing raw chunks to the transport's framer

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};

/// Read buffer size for serial chunks
const READ_CHUNK: usize = 256;

/// Trait for serial port write operations
#[async_trait]
pub trait SerialPortIO: Send {
    /// Write all data to the port
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer
    async fn flush(&mut self) -> io::Result<()>;
}

#[async_trait]
impl SerialPortIO for tokio_serial::SerialStream {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        AsyncWriteExt::write_all(self, data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        AsyncWriteExt::flush(self).await
    }
}

/// Open a serial port at `baud_rate`, 8N1, no flow control
///
/// # Arguments
///
/// * `path` - Device path (e.g., "/dev/ttyUSB0")
/// * `baud_rate` - Line speed
///
/// # Errors
///
/// Returns `Serial` if the device cannot be opened.
pub fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
    let port = tokio_serial::new(path, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| BridgeError::Serial(format!("Failed to open {}: {}", path, e)))?;

    info!("Opened {} at {} baud", path, baud_rate);
    Ok(port)
}

/// Send each command followed by a fixed pause
///
/// # Errors
///
/// Returns `Serial` if a write or flush fails.
pub async fn handshake<P>(port: &mut P, commands: &[&[u8]], gap: Duration) -> Result<()>
where
    P: SerialPortIO + ?Sized,
{
    for command in commands {
        port.write_all(command)
            .await
            .map_err(|e| BridgeError::Serial(format!("Failed to write init command: {}", e)))?;
        port.flush()
            .await
            .map_err(|e| BridgeError::Serial(format!("Failed to flush serial port: {}", e)))?;
        debug!("Sent init command ({} bytes)", command.len());
        tokio::time::sleep(gap).await;
    }
    Ok(())
}

/// Spawn a task reading chunks from `reader` until EOF or error
///
/// A read error ends the task; the transport stays inert afterwards.
pub fn spawn_reader<R, F>(transport: &'static str, mut reader: R, mut on_chunk: F) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    F: FnMut(&[u8]) + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    warn!("[{}] Serial port closed", transport);
                    return;
                }
                Ok(n) => on_chunk(&buf[..n]),
                Err(e) => {
                    warn!("[{}] Serial read failed: {}", transport, e);
                    return;
                }
            }
        }
    })
}
