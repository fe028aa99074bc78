//! # PS3 Controller Adapter
//!
//! The HID report decoding lives outside the bridge. A decoder holds a
//! [`Ps3Feed`] and pushes complete snapshots of named values
//! (`cross`, `leftStickX`, `l2Analog`, ...). The latest snapshot is overlaid
//! onto the script-visible record in the pre-tick hook; names absent from a
//! snapshot keep their previous value.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::Pending;
use crate::engine::{DataSignal, Plugin};
use crate::error::Result;

/// One decoded controller report
pub type Ps3Snapshot = BTreeMap<String, f64>;

/// Producer handle given to the HID decoder
#[derive(Debug, Clone, Default)]
pub struct Ps3Feed {
    pending: Pending<Option<Ps3Snapshot>>,
    signal: Pending<Option<DataSignal>>,
}

impl Ps3Feed {
    /// Publishes a snapshot, replacing any not yet committed.
    pub fn push(&self, snapshot: Ps3Snapshot) {
        *self.pending.lock() = Some(snapshot);
        if let Some(signal) = self.signal.lock().as_ref() {
            signal.raise();
        }
    }
}

/// PS3 transport
#[derive(Debug, Default)]
pub struct Ps3Transport {
    feed: Ps3Feed,
    values: Ps3Snapshot,
}

impl Ps3Transport {
    /// Creates an empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for the decoder.
    #[must_use]
    pub fn feed(&self) -> Ps3Feed {
        self.feed.clone()
    }

    /// Named value, 0 if never reported.
    #[must_use]
    pub fn get(&self, name: &str) -> f64 {
        self.values.get(name).copied().unwrap_or(0.0)
    }

    /// Whether a named button is held.
    #[must_use]
    pub fn pressed(&self, name: &str) -> bool {
        self.get(name) != 0.0
    }

    /// All committed values.
    #[must_use]
    pub fn values(&self) -> &Ps3Snapshot {
        &self.values
    }

    /// Whether a decoder is attached and the engine is listening.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.feed.signal.lock().is_some()
    }
}

#[async_trait]
impl Plugin for Ps3Transport {
    fn name(&self) -> &'static str {
        "ps3"
    }

    async fn start(&mut self, signal: DataSignal) -> Result<()> {
        *self.feed.signal.lock() = Some(signal);
        Ok(())
    }

    async fn stop(&mut self) {
        *self.feed.signal.lock() = None;
    }

    fn before_tick(&mut self) {
        if let Some(snapshot) = self.feed.pending.lock().take() {
            self.values.extend(snapshot);
        }
    }
}
