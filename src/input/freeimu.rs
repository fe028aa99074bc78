//! # FreeIMU Serial Transport
//!
//! Text protocol: one `yaw,pitch,roll` line per sample, in radians. Extra
//! columns after the third are ignored.

use async_trait::async_trait;
use tokio::task::JoinHandle;

use super::framing::LineBuffer;
use super::serial;
use super::{stop_task, DropCounter, Orientation, Pending};
use crate::config::SerialDeviceConfig;
use crate::engine::{DataSignal, Plugin};
use crate::error::Result;

/// FreeIMU line speed
pub const BAUD_RATE: u32 = 115_200;

/// Longest line accepted before it is discarded
pub const MAX_LINE: usize = 256;

/// Parses a `yaw,pitch,roll` line.
///
/// # Examples
///
/// ```
/// use pie_bridge::input::freeimu::parse_line;
///
/// let o = parse_line("10.5,-3,0.25").unwrap();
/// assert_eq!(o.yaw, 10.5);
/// assert!(parse_line("10.5,-3").is_none());
/// ```
#[must_use]
pub fn parse_line(line: &str) -> Option<Orientation> {
    let mut values = line.split(',').map(|part| part.trim().parse::<f64>().ok());
    let yaw = values.next()??;
    let pitch = values.next()??;
    let roll = values.next()??;

    (yaw.is_finite() && pitch.is_finite() && roll.is_finite())
        .then_some(Orientation { yaw, pitch, roll })
}

/// FreeIMU transport
#[derive(Debug)]
pub struct FreeImuTransport {
    path: String,
    pending: Pending<Orientation>,
    /// Committed orientation
    pub orientation: Orientation,
    task: Option<JoinHandle<()>>,
}

impl FreeImuTransport {
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

/// Splits a chunk into lines and commits the last valid sample.
fn receive(
    lines: &mut LineBuffer,
    drops: &mut DropCounter,
    pending: &Pending<Orientation>,
    chunk: &[u8],
) -> bool {
    let mut latest = None;
    for line in lines.push(chunk) {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(&line) {
            Some(orientation) => latest = Some(orientation),
            None => drops.record("unparsable line"),
        }
    }

    match latest {
        Some(orientation) => {
            *pending.lock() = orientation;
            true
        }
        None => false,
    }
}

#[async_trait]
impl Plugin for FreeImuTransport {
    fn name(&self) -> &'static str {
        "freeimu"
    }

    async fn start(&mut self, signal: DataSignal) -> Result<()> {
        let port = serial::open_port(&self.path, BAUD_RATE)?;
        let pending = self.pending.clone();
        let mut lines = LineBuffer::new(MAX_LINE);
        let mut drops = DropCounter::new("freeimu");

        self.task = Some(serial::spawn_reader("freeimu", port, move |chunk| {
            if receive(&mut lines, &mut drops, &pending, chunk) {
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
