//! # Phone Sensor Transport (binary UDP)
//!
//! FreePIE Android IMU protocol, one datagram per sample:
//!
//! | Bytes | Present when | Content |
//! |-------|--------------|---------|
//! | 0 | always | device index |
//! | 1 | always | flags (`0x01` raw, `0x02` orientation, `0x04` buttons) |
//! | +36 | `0x01` | 9 × f32: accel xyz, gyro xyz, mag xyz |
//! | +12 | `0x02` | 3 × f32: yaw, pitch, roll |
//! | +1 | `0x04` | button bitmask (bit 0 primary, bit 1 secondary) |
//!
//! Groups are laid out in flag order. A datagram shorter than its flags
//! imply, or carrying a non-finite float, is dropped whole.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use super::udp;
use super::{f32_le, stop_task, DropCounter, Pending};
use crate::config::AndroidConfig;
use crate::engine::{DataSignal, Plugin};
use crate::error::Result;

/// Raw sensor group present
pub const FLAG_RAW: u8 = 0x01;
/// Orientation group present
pub const FLAG_ORIENTATION: u8 = 0x02;
/// Button byte present
pub const FLAG_BUTTONS: u8 = 0x04;

const HEADER_LEN: usize = 2;
const RAW_LEN: usize = 36;
const ORIENTATION_LEN: usize = 12;
const BUTTONS_LEN: usize = 1;

/// Three-axis sensor reading
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Script-visible state of one phone
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhoneRecord {
    /// Accelerometer, m/s²
    pub accel: Vector3,
    /// Gyroscope, rad/s
    pub gyro: Vector3,
    /// Magnetometer, µT
    pub mag: Vector3,
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
    /// Button bitmask
    pub buttons: u8,
}

impl PhoneRecord {
    /// Primary button (volume up / on-screen left click)
    #[must_use]
    pub fn primary(&self) -> bool {
        self.buttons & 0x01 != 0
    }

    /// Secondary button (volume down / on-screen right click)
    #[must_use]
    pub fn secondary(&self) -> bool {
        self.buttons & 0x02 != 0
    }
}

/// One decoded datagram. Absent groups are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct PhonePacket {
    pub index: u8,
    pub raw: Option<[Vector3; 3]>,
    pub orientation: Option<[f64; 3]>,
    pub buttons: Option<u8>,
}

impl PhonePacket {
    /// Decodes a datagram.
    ///
    /// Returns `None` if the datagram is shorter than its flags imply or a
    /// float is not finite.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_LEN {
            return None;
        }
        let index = bytes[0];
        let flags = bytes[1];
        let mut offset = HEADER_LEN;

        let raw = if flags & FLAG_RAW != 0 {
            if bytes.len() < offset + RAW_LEN {
                return None;
            }
            let mut values = [0f64; 9];
            for (i, value) in values.iter_mut().enumerate() {
                *value = finite(f32_le(bytes, offset + i * 4)?)?;
            }
            offset += RAW_LEN;
            Some([
                Vector3 { x: values[0], y: values[1], z: values[2] },
                Vector3 { x: values[3], y: values[4], z: values[5] },
                Vector3 { x: values[6], y: values[7], z: values[8] },
            ])
        } else {
            None
        };

        let orientation = if flags & FLAG_ORIENTATION != 0 {
            if bytes.len() < offset + ORIENTATION_LEN {
                return None;
            }
            let yaw = finite(f32_le(bytes, offset)?)?;
            let pitch = finite(f32_le(bytes, offset + 4)?)?;
            let roll = finite(f32_le(bytes, offset + 8)?)?;
            offset += ORIENTATION_LEN;
            Some([yaw, pitch, roll])
        } else {
            None
        };

        let buttons = if flags & FLAG_BUTTONS != 0 {
            if bytes.len() < offset + BUTTONS_LEN {
                return None;
            }
            Some(bytes[offset])
        } else {
            None
        };

        Some(Self {
            index,
            raw,
            orientation,
            buttons,
        })
    }

    /// Writes the present groups into `record`; absent groups keep their
    /// previous values.
    pub fn apply(&self, record: &mut PhoneRecord) {
        if let Some([accel, gyro, mag]) = self.raw {
            record.accel = accel;
            record.gyro = gyro;
            record.mag = mag;
        }
        if let Some([yaw, pitch, roll]) = self.orientation {
            record.yaw = yaw;
            record.pitch = pitch;
            record.roll = roll;
        }
        if let Some(buttons) = self.buttons {
            record.buttons = buttons;
        }
    }
}

fn finite(value: f32) -> Option<f64> {
    value.is_finite().then_some(f64::from(value))
}

/// Phone sensor transport, one record per device index
#[derive(Debug)]
pub struct AndroidTransport {
    host: String,
    port: u16,
    pending: Pending<BTreeMap<u8, PhoneRecord>>,
    devices: BTreeMap<u8, PhoneRecord>,
    task: Option<JoinHandle<()>>,
}

impl AndroidTransport {
    /// Creates an unstarted transport.
    #[must_use]
    pub fn new(host: &str, config: &AndroidConfig) -> Self {
        Self {
            host: host.to_string(),
            port: config.port,
            pending: Pending::default(),
            devices: BTreeMap::new(),
            task: None,
        }
    }

    /// Record for `index`, created on first access.
    pub fn device(&mut self, index: u8) -> &mut PhoneRecord {
        self.devices.entry(index).or_default()
    }

    /// Record for `index` if that phone has been seen or accessed.
    #[must_use]
    pub fn get(&self, index: u8) -> Option<&PhoneRecord> {
        self.devices.get(&index)
    }

    /// Whether the socket is bound.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }

    /// Decodes one datagram into pending state. Returns whether it was applied.
    fn receive(pending: &Pending<BTreeMap<u8, PhoneRecord>>, drops: &mut DropCounter, datagram: &[u8]) -> bool {
        match PhonePacket::decode(datagram) {
            Some(packet) => {
                let mut devices = pending.lock();
                packet.apply(devices.entry(packet.index).or_default());
                true
            }
            None => {
                drops.record("short or non-finite datagram");
                false
            }
        }
    }
}

#[async_trait]
impl Plugin for AndroidTransport {
    fn name(&self) -> &'static str {
        "android"
    }

    async fn start(&mut self, signal: DataSignal) -> Result<()> {
        let socket = udp::bind("android", &self.host, self.port).await?;
        let pending = self.pending.clone();
        let mut drops = DropCounter::new("android");

        self.task = Some(udp::spawn_receiver("android", socket, move |datagram| {
            if Self::receive(&pending, &mut drops, datagram) {
                signal.raise();
            }
        }));
        Ok(())
    }

    async fn stop(&mut self) {
        stop_task(&mut self.task).await;
    }

    fn before_tick(&mut self) {
        let pending = self.pending.lock();
        for (index, record) in pending.iter() {
            self.devices.insert(*index, record.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UdpSocket;

    fn floats(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn packet(index: u8, flags: u8, raw: &[f32], orientation: &[f32], buttons: Option<u8>) -> Vec<u8> {
        let mut bytes = vec![index, flags];
        bytes.extend(floats(raw));
        bytes.extend(floats(orientation));
        bytes.extend(buttons);
        bytes
    }

    const RAW: [f32; 9] = [0.1, 0.2, 9.8, 1.0, 2.0, 3.0, 30.0, 40.0, 50.0];

    #[test]
    fn test_raw_and_orientation_50_bytes() {
        let bytes = packet(0, 0x03, &RAW, &[10.0, 20.0, 30.0], None);
        assert_eq!(bytes.len(), 50);

        let mut record = PhoneRecord::default();
        PhonePacket::decode(&bytes).unwrap().apply(&mut record);

        assert_eq!(record.accel.z, f64::from(9.8f32));
        assert_eq!(record.gyro.y, 2.0);
        assert_eq!(record.mag.x, 30.0);
        assert_eq!(record.yaw, 10.0);
        assert_eq!(record.pitch, 20.0);
        assert_eq!(record.roll, 30.0);
    }

    #[test]
    fn test_raw_only_38_bytes_keeps_orientation() {
        let mut record = PhoneRecord {
            yaw: 5.0,
            pitch: 6.0,
            roll: 7.0,
            ..PhoneRecord::default()
        };
        let bytes = packet(0, 0x01, &RAW, &[], None);
        assert_eq!(bytes.len(), 38);

        let decoded = PhonePacket::decode(&bytes).unwrap();
        assert!(decoded.orientation.is_none());
        decoded.apply(&mut record);

        assert_eq!(record.accel.x, f64::from(0.1f32));
        assert_eq!((record.yaw, record.pitch, record.roll), (5.0, 6.0, 7.0));
    }

    #[test]
    fn test_orientation_without_raw_starts_at_offset_2() {
        let bytes = packet(3, FLAG_ORIENTATION, &[], &[1.0, 2.0, 3.0], None);
        let decoded = PhonePacket::decode(&bytes).unwrap();
        assert_eq!(decoded.index, 3);
        assert_eq!(decoded.orientation, Some([1.0, 2.0, 3.0]));
        assert!(decoded.raw.is_none());
    }

    #[test]
    fn test_truncated_packet_dropped_whole() {
        let mut bytes = packet(0, 0x03, &RAW, &[10.0, 20.0, 30.0], None);
        bytes.truncate(49);
        assert!(PhonePacket::decode(&bytes).is_none());

        // Buttons flag set but byte missing
        let bytes = packet(0, 0x07, &RAW, &[10.0, 20.0, 30.0], None);
        assert!(PhonePacket::decode(&bytes).is_none());

        assert!(PhonePacket::decode(&[0]).is_none());
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut raw = RAW;
        raw[4] = f32::NAN;
        let bytes = packet(0, 0x01, &raw, &[], None);
        assert!(PhonePacket::decode(&bytes).is_none());

        let bytes = packet(0, 0x02, &[], &[f32::INFINITY, 0.0, 0.0], None);
        assert!(PhonePacket::decode(&bytes).is_none());
    }

    #[test]
    fn test_button_bitmask() {
        let bytes = packet(1, 0x07, &RAW, &[0.0, 0.0, 0.0], Some(0x02));
        assert_eq!(bytes.len(), 51);

        let mut record = PhoneRecord::default();
        PhonePacket::decode(&bytes).unwrap().apply(&mut record);
        assert!(!record.primary());
        assert!(record.secondary());
    }

    #[test]
    fn test_device_get_or_create() {
        let mut transport = AndroidTransport::new("127.0.0.1", &AndroidConfig::default());
        assert!(transport.get(2).is_none());
        assert_eq!(transport.device(2).yaw, 0.0);
        assert!(transport.get(2).is_some());
    }

    #[test]
    fn test_pending_committed_on_before_tick() {
        let mut transport = AndroidTransport::new("127.0.0.1", &AndroidConfig::default());
        let mut drops = DropCounter::new("test");
        let bytes = packet(0, FLAG_ORIENTATION, &[], &[45.0, 0.0, 0.0], None);

        assert!(AndroidTransport::receive(&transport.pending, &mut drops, &bytes));
        assert!(transport.get(0).is_none());

        transport.before_tick();
        assert_eq!(transport.get(0).map(|r| r.yaw), Some(45.0));

        assert!(!AndroidTransport::receive(&transport.pending, &mut drops, &[0, 0x02]));
        assert_eq!(drops.count(), 1);
    }

    #[tokio::test]
    async fn test_udp_loopback() {
        let mut transport = AndroidTransport::new("127.0.0.1", &AndroidConfig::default());
        let socket = udp::bind("android", "127.0.0.1", 0).await.unwrap();
        let addr = socket.local_addr().unwrap();
        let signal = DataSignal::new();
        let pending = transport.pending.clone();
        let raise = signal.clone();
        let mut drops = DropCounter::new("android");
        transport.task = Some(udp::spawn_receiver("android", socket, move |d| {
            if AndroidTransport::receive(&pending, &mut drops, d) {
                raise.raise();
            }
        }));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let bytes = packet(0, FLAG_ORIENTATION, &[], &[90.0, 0.0, 0.0], None);
        sender.send_to(&bytes, addr).await.unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(1), signal.notified())
            .await
            .unwrap();
        transport.before_tick();
        assert_eq!(transport.get(0).map(|r| r.yaw), Some(90.0));

        transport.stop().await;
        assert!(!transport.is_active());
    }
}
