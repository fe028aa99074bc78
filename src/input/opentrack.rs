//! # Head-Tracker Transport
//!
//! OpenTrack "UDP over network" output: 48-byte datagrams of six
//! little-endian f64 values, x/y/z in centimetres then yaw/pitch/roll in
//! degrees.

use async_trait::async_trait;
use tokio::task::JoinHandle;

use super::udp;
use super::{f64_le, stop_task, DropCounter, Pending};
use crate::config::OpentrackConfig;
use crate::engine::{DataSignal, Plugin};
use crate::error::Result;

/// OpenTrack datagram size
pub const PACKET_SIZE: usize = 48;

/// Head pose
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HeadPose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

impl HeadPose {
    /// Decodes a datagram. Returns `None` if it is short or any value is
    /// not finite. Trailing bytes are ignored.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < PACKET_SIZE {
            return None;
        }

        let mut values = [0f64; 6];
        for (i, value) in values.iter_mut().enumerate() {
            let v = f64_le(bytes, i * 8)?;
            if !v.is_finite() {
                return None;
            }
            *value = v;
        }

        let [x, y, z, yaw, pitch, roll] = values;
        Some(Self { x, y, z, yaw, pitch, roll })
    }
}

/// Head-tracker transport
#[derive(Debug)]
pub struct OpentrackTransport {
    host: String,
    port: u16,
    pending: Pending<HeadPose>,
    /// Committed pose
    pub pose: HeadPose,
    task: Option<JoinHandle<()>>,
}

impl OpentrackTransport {
    /// Creates an unstarted transport.
    #[must_use]
    pub fn new(host: &str, config: &OpentrackConfig) -> Self {
        Self {
            host: host.to_string(),
            port: config.port,
            pending: Pending::default(),
            pose: HeadPose::default(),
            task: None,
        }
    }

    /// Whether the socket is bound.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }
}

#[async_trait]
impl Plugin for OpentrackTransport {
    fn name(&self) -> &'static str {
        "opentrack"
    }

    async fn start(&mut self, signal: DataSignal) -> Result<()> {
        let socket = udp::bind("opentrack", &self.host, self.port).await?;
        let pending = self.pending.clone();
        let mut drops = DropCounter::new("opentrack");

        self.task = Some(udp::spawn_receiver("opentrack", socket, move |datagram| {
            match HeadPose::decode(datagram) {
                Some(pose) => {
                    *pending.lock() = pose;
                    signal.raise();
                }
                None => drops.record("short or non-finite datagram"),
            }
        }));
        Ok(())
    }

    async fn stop(&mut self) {
        stop_task(&mut self.task).await;
    }

    fn before_tick(&mut self) {
        self.pose = *self.pending.lock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UdpSocket;

    fn frame(values: [f64; 6]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_decode_frame() {
        let pose = HeadPose::decode(&frame([1.0, 2.0, 3.0, -90.0, 45.0, 180.0])).unwrap();
        assert_eq!(pose.x, 1.0);
        assert_eq!(pose.z, 3.0);
        assert_eq!(pose.yaw, -90.0);
        assert_eq!(pose.pitch, 45.0);
        assert_eq!(pose.roll, 180.0);
    }

    #[test]
    fn test_short_frame_rejected() {
        let bytes = frame([0.0; 6]);
        assert!(HeadPose::decode(&bytes[..47]).is_none());
    }

    #[test]
    fn test_non_finite_frame_rejected() {
        assert!(HeadPose::decode(&frame([0.0, 0.0, 0.0, f64::NAN, 0.0, 0.0])).is_none());
        assert!(HeadPose::decode(&frame([f64::INFINITY, 0.0, 0.0, 0.0, 0.0, 0.0])).is_none());
    }

    #[tokio::test]
    async fn test_udp_loopback() {
        let probe = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        let mut transport = OpentrackTransport::new("127.0.0.1", &OpentrackConfig { port });
        let signal = DataSignal::new();
        transport.start(signal.clone()).await.unwrap();
        assert!(transport.is_active());

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender
            .send_to(&frame([0.0, 0.0, 0.0, 12.5, -3.0, 0.0]), ("127.0.0.1", port))
            .await
            .unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(1), signal.notified())
            .await
            .unwrap();
        transport.before_tick();
        assert_eq!(transport.pose.yaw, 12.5);
        assert_eq!(transport.pose.pitch, -3.0);

        transport.stop().await;
        transport.stop().await;
        assert!(!transport.is_active());
    }

    #[tokio::test]
    async fn test_bind_failure_leaves_transport_inert() {
        let holder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = holder.local_addr().unwrap().port();

        let mut transport = OpentrackTransport::new("127.0.0.1", &OpentrackConfig { port });
        assert!(transport.start(DataSignal::new()).await.is_err());
        assert!(!transport.is_active());
        transport.before_tick();
        assert_eq!(transport.pose, HeadPose::default());
    }
}
