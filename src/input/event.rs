//! # Kernel Input Event Record
//!
//! `struct input_event` as laid out on 64-bit Linux (24 bytes):
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 8 | `tv_sec` (i64) |
//! | 8 | 8 | `tv_usec` (i64) |
//! | 16 | 2 | `type` (u16) |
//! | 18 | 2 | `code` (u16) |
//! | 20 | 4 | `value` (i32) |
//!
//! Event files under `/dev/input` produce these records and uinput
//! consumes the same layout.

use crate::output::codes::{EventClass, EV_SYN, SYN_REPORT};

/// Size of one encoded event record in bytes.
pub const EVENT_RECORD_SIZE: usize = 24;

/// One decoded input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawEvent {
    /// Seconds part of the kernel timestamp.
    pub tv_sec: i64,
    /// Microseconds part of the kernel timestamp.
    pub tv_usec: i64,
    /// Event type (`EV_*`).
    pub kind: u16,
    /// Event code within the type.
    pub code: u16,
    /// Event value.
    pub value: i32,
}

impl RawEvent {
    /// Creates an event with a zero timestamp (the kernel stamps writes).
    #[must_use]
    pub fn new(class: EventClass, code: u16, value: i32) -> Self {
        Self {
            kind: class.raw(),
            code,
            value,
            ..Self::default()
        }
    }

    /// The `EV_SYN / SYN_REPORT` frame marker.
    #[must_use]
    pub fn sync_report() -> Self {
        Self {
            kind: EV_SYN,
            code: SYN_REPORT,
            ..Self::default()
        }
    }

    /// Event class, if it is one the bridge handles.
    #[must_use]
    pub fn class(&self) -> Option<EventClass> {
        EventClass::from_raw(self.kind)
    }

    /// Decodes one record.
    ///
    /// Returns `None` if `bytes` is shorter than [`EVENT_RECORD_SIZE`].
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let record: &[u8; EVENT_RECORD_SIZE] = bytes.get(..EVENT_RECORD_SIZE)?.try_into().ok()?;

        let mut sec = [0u8; 8];
        sec.copy_from_slice(&record[0..8]);
        let mut usec = [0u8; 8];
        usec.copy_from_slice(&record[8..16]);

        Some(Self {
            tv_sec: i64::from_le_bytes(sec),
            tv_usec: i64::from_le_bytes(usec),
            kind: u16::from_le_bytes([record[16], record[17]]),
            code: u16::from_le_bytes([record[18], record[19]]),
            value: i32::from_le_bytes([record[20], record[21], record[22], record[23]]),
        })
    }

    /// Encodes the record into its 24-byte wire form.
    #[must_use]
    pub fn encode(&self) -> [u8; EVENT_RECORD_SIZE] {
        let mut out = [0u8; EVENT_RECORD_SIZE];
        out[0..8].copy_from_slice(&self.tv_sec.to_le_bytes());
        out[8..16].copy_from_slice(&self.tv_usec.to_le_bytes());
        out[16..18].copy_from_slice(&self.kind.to_le_bytes());
        out[18..20].copy_from_slice(&self.code.to_le_bytes());
        out[20..24].copy_from_slice(&self.value.to_le_bytes());
        out
    }
}
