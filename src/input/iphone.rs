//! # Phone Sensor Transport (CSV UDP)
//!
//! FreePIE iOS IMU protocol. The first datagram is a header naming the
//! columns (`Timestamp,Roll,Pitch,Yaw,...`); every later datagram is one
//! row of values in that order.
//!
//! The wire `Roll` column feeds `pitch` and the wire `Pitch` column feeds
//! `roll`. The sender swaps the two relative to the Android app and
//! existing scripts depend on the swapped mapping.

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::udp;
use super::{stop_task, DropCounter, Orientation, Pending};
use crate::config::IphoneConfig;
use crate::engine::{DataSignal, Plugin};
use crate::error::Result;

/// Column positions of the three angles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    pub roll: usize,
    pub pitch: usize,
    pub yaw: usize,
}

/// Layout of the stock sender, used when no header can be parsed
pub const DEFAULT_LAYOUT: ColumnLayout = ColumnLayout {
    roll: 1,
    pitch: 2,
    yaw: 3,
};

impl ColumnLayout {
    /// Parses a header row. Returns `None` unless all three columns are named.
    #[must_use]
    pub fn from_header(line: &str) -> Option<Self> {
        let columns: Vec<&str> = line.split(',').map(str::trim).collect();
        let position = |name: &str| columns.iter().position(|c| *c == name);

        Some(Self {
            roll: position("Roll")?,
            pitch: position("Pitch")?,
            yaw: position("Yaw")?,
        })
    }

    /// Parses a data row into an orientation, applying the Roll/Pitch swap.
    ///
    /// Returns `None` if a column is missing or not a finite number.
    #[must_use]
    pub fn parse_row(&self, line: &str) -> Option<Orientation> {
        let columns: Vec<&str> = line.split(',').collect();
        let value = |index: usize| -> Option<f64> {
            let v: f64 = columns.get(index)?.trim().parse().ok()?;
            v.is_finite().then_some(v)
        };

        let wire_roll = value(self.roll)?;
        let wire_pitch = value(self.pitch)?;
        let yaw = value(self.yaw)?;

        Some(Orientation {
            yaw,
            pitch: wire_roll,
            roll: wire_pitch,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderState {
    Awaiting,
    Retry,
    Ready(ColumnLayout),
}

/// Stateful line decoder
#[derive(Debug)]
pub struct RowDecoder {
    state: HeaderState,
    drops: DropCounter,
}

impl Default for RowDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RowDecoder {
    /// Creates a decoder waiting for its header.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: HeaderState::Awaiting,
            drops: DropCounter::new("iphone"),
        }
    }

    /// Active column layout, once known.
    #[must_use]
    pub fn layout(&self) -> Option<ColumnLayout> {
        match self.state {
            HeaderState::Ready(layout) => Some(layout),
            _ => None,
        }
    }

    /// Feeds one line. Returns an orientation for data rows.
    ///
    /// The header is parsed once. If it is unreadable the next line is
    /// tried as a header too; if that also fails the stock layout is
    /// assumed and that line is read as data.
    pub fn feed(&mut self, line: &str) -> Option<Orientation> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return None;
        }

        match self.state {
            HeaderState::Awaiting => {
                match ColumnLayout::from_header(line) {
                    Some(layout) => self.accept(layout),
                    None => {
                        warn!("[iphone] Unexpected header: {}", line);
                        self.state = HeaderState::Retry;
                    }
                }
                None
            }
            HeaderState::Retry => match ColumnLayout::from_header(line) {
                Some(layout) => {
                    self.accept(layout);
                    None
                }
                None => {
                    warn!(
                        "[iphone] No header found, assuming Roll@{} Pitch@{} Yaw@{}",
                        DEFAULT_LAYOUT.roll, DEFAULT_LAYOUT.pitch, DEFAULT_LAYOUT.yaw
                    );
                    self.state = HeaderState::Ready(DEFAULT_LAYOUT);
                    self.row(DEFAULT_LAYOUT, line)
                }
            },
            HeaderState::Ready(layout) => self.row(layout, line),
        }
    }

    fn accept(&mut self, layout: ColumnLayout) {
        info!(
            "[iphone] Header parsed: Roll@{} Pitch@{} Yaw@{}",
            layout.roll, layout.pitch, layout.yaw
        );
        self.state = HeaderState::Ready(layout);
    }

    fn row(&mut self, layout: ColumnLayout, line: &str) -> Option<Orientation> {
        let parsed = layout.parse_row(line);
        if parsed.is_none() {
            self.drops.record("unparsable row");
        }
        parsed
    }
}

/// iOS IMU transport, a single orientation record in degrees
#[derive(Debug)]
pub struct IphoneTransport {
    host: String,
    port: u16,
    pending: Pending<Orientation>,
    /// Committed orientation
    pub orientation: Orientation,
    task: Option<JoinHandle<()>>,
}

impl IphoneTransport {
    /// Creates an unstarted transport.
    #[must_use]
    pub fn new(host: &str, config: &IphoneConfig) -> Self {
        Self {
            host: host.to_string(),
            port: config.port,
            pending: Pending::default(),
            orientation: Orientation::default(),
            task: None,
        }
    }

    /// Whether the socket is bound.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }
}

/// Feeds every line of a datagram, committing the last row to `pending`.
fn receive(decoder: &mut RowDecoder, pending: &Pending<Orientation>, datagram: &[u8]) -> bool {
    let text = String::from_utf8_lossy(datagram);
    let mut latest = None;
    for line in text.lines() {
        if let Some(orientation) = decoder.feed(line) {
            latest = Some(orientation);
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
impl Plugin for IphoneTransport {
    fn name(&self) -> &'static str {
        "iphone"
    }

    async fn start(&mut self, signal: DataSignal) -> Result<()> {
        let socket = udp::bind("iphone", &self.host, self.port).await?;
        let pending = self.pending.clone();
        let mut decoder = RowDecoder::new();

        self.task = Some(udp::spawn_receiver("iphone", socket, move |datagram| {
            if receive(&mut decoder, &pending, datagram) {
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

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Timestamp,Roll,Pitch,Yaw,UserAcceleration.X";

    #[test]
    fn test_header_layout() {
        let layout = ColumnLayout::from_header(HEADER).unwrap();
        assert_eq!(layout, ColumnLayout { roll: 1, pitch: 2, yaw: 3 });
        assert!(ColumnLayout::from_header("Timestamp,Roll,Yaw").is_none());
    }

    #[test]
    fn test_roll_pitch_swap() {
        let mut decoder = RowDecoder::new();
        assert!(decoder.feed(HEADER).is_none());

        let o = decoder.feed("1234567890,1.5,-0.5,0.75,0.0\r\n").unwrap();
        assert_eq!(o.pitch, 1.5);
        assert_eq!(o.roll, -0.5);
        assert_eq!(o.yaw, 0.75);
    }

    #[test]
    fn test_header_column_order_respected() {
        let mut decoder = RowDecoder::new();
        decoder.feed("Yaw,Pitch,Roll");
        let o = decoder.feed("3,2,1").unwrap();
        assert_eq!((o.yaw, o.roll, o.pitch), (3.0, 2.0, 1.0));
    }

    #[test]
    fn test_bad_header_retried_once() {
        let mut decoder = RowDecoder::new();
        assert!(decoder.feed("garbage from a port scanner").is_none());
        assert!(decoder.layout().is_none());

        // Second line is a valid header
        assert!(decoder.feed(HEADER).is_none());
        assert_eq!(decoder.layout(), Some(DEFAULT_LAYOUT));
        assert!(decoder.feed("0,1,2,3").is_some());
    }

    #[test]
    fn test_two_bad_headers_fall_back_to_default_layout() {
        let mut decoder = RowDecoder::new();
        decoder.feed("garbage");
        // Treated as data with the stock layout
        let o = decoder.feed("99,10,20,30").unwrap();
        assert_eq!((o.pitch, o.roll, o.yaw), (10.0, 20.0, 30.0));
        assert!(decoder.feed("100,11,21,31").is_some());
    }

    #[test]
    fn test_invalid_row_rejected_whole() {
        let mut decoder = RowDecoder::new();
        decoder.feed(HEADER);
        assert!(decoder.feed("0,1.0,abc,3.0").is_none());
        assert!(decoder.feed("0,1.0").is_none());
        assert!(decoder.feed("0,NaN,1,2").is_none());
    }

    #[test]
    fn test_receive_commits_last_row() {
        let pending = Pending::new(Orientation::default());
        let mut decoder = RowDecoder::new();

        assert!(!receive(&mut decoder, &pending, HEADER.as_bytes()));
        assert!(receive(&mut decoder, &pending, b"0,1,2,3\n0,4,5,6\n"));
        assert_eq!(pending.lock().yaw, 6.0);
    }
}
