//! # AHRS Serial Transport
//!
//! SparkFun 9DOF Razor AHRS firmware in binary streaming mode. After the
//! init handshake the board streams 12-byte frames of three little-endian
//! f32 values: yaw, pitch, roll in radians.

use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use super::framing::RecordBuffer;
use super::serial;
use super::{f32_le, stop_task, DropCounter, Orientation, Pending};
use crate::config::SerialDeviceConfig;
use crate::engine::{DataSignal, Plugin};
use crate::error::Result;

/// AHRS line speed
pub const BAUD_RATE: u32 = 57_600;

/// Size of one orientation frame
pub const FRAME_SIZE: usize = 12;

/// Binary output, continuous streaming, no error messages
pub const INIT_COMMANDS: &[&[u8]] = &[b"#ob\r", b"#o1\r", b"#oe0\r"];

/// Pause after each init command
pub const INIT_GAP: Duration = Duration::from_millis(100);

/// Decodes one frame. Returns `None` for short or non-finite frames.
#[must_use]
pub fn decode_frame(bytes: &[u8]) -> Option<Orientation> {
    let yaw = f32_le(bytes, 0)?;
    let pitch = f32_le(bytes, 4)?;
    let roll = f32_le(bytes, 8)?;

    if !(yaw.is_finite() && pitch.is_finite() && roll.is_finite()) {
        return None;
    }

    Some(Orientation {
        yaw: f64::from(yaw),
        pitch: f64::from(pitch),
        roll: f64::from(roll),
    })
}

/// Reassembles frames from serial chunks
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: RecordBuffer,
    drops: DropCounter,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self {
            buffer: RecordBuffer::new(FRAME_SIZE),
            drops: DropCounter::new("ahrs"),
        }
    }
}

impl FrameDecoder {
    /// Feeds a chunk and returns the last valid frame it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<Orientation> {
        let mut latest = None;
        for frame in self.buffer.push(chunk) {
            match decode_frame(&frame) {
                Some(orientation) => latest = Some(orientation),
                None => self.drops.record("non-finite frame"),
            }
        }
        latest
    }

    /// Bytes waiting for the rest of a frame.
    #[must_use]
    pub fn leftover(&self) -> usize {
        self.buffer.leftover()
    }
}

/// AHRS transport, a single orientation record in radians
#[derive(Debug)]
pub struct AhrsTransport {
    path: String,
    pending: Pending<Orientation>,
    /// Committed orientation
    pub orientation: Orientation,
    task: Option<JoinHandle<()>>,
}

impl AhrsTransport {
    /// Creates an unstarted transport.
    #[must_use]
    pub fn new(config: &SerialDeviceConfig) -> Self {
        Self {
            path: config.port.clone(),
            pending: Pending::default(),
            orientation: Orientation::default(),
            task: None,
        }
    }

    /// Whether the port is open and streaming.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

#[async_trait]
impl Plugin for AhrsTransport {
    fn name(&self) -> &'static str {
        "ahrs"
    }

    async fn start(&mut self, signal: DataSignal) -> Result<()> {
        let mut port = serial::open_port(&self.path, BAUD_RATE)?;
        serial::handshake(&mut port, INIT_COMMANDS, INIT_GAP).await?;

        let pending = self.pending.clone();
        let mut decoder = FrameDecoder::default();
        self.task = Some(serial::spawn_reader("ahrs", port, move |chunk| {
            if let Some(orientation) = decoder.feed(chunk) {
                *pending.lock() = orientation;
                signal.raise();
            }
        }));
        Ok(())
    }

    async fn stop(&mut self) {
        stop_task(&mut self.task).await;
    }

    fn before_tick(&mut self) {
        self.orientation = *self.pending.lock();
    }
}
