//! # Input Transports
//!
//! One module per input source. Every transport owns its byte source and
//! decoder, writes decoded samples into a *pending* record from its I/O
//! task and raises the engine's [`DataSignal`](crate::engine::DataSignal).
//! The engine's pre-tick hook copies pending into the *committed* record
//! the script reads, under a mutex.

pub mod ahrs;
pub mod android;
pub mod discovery;
pub mod event;
pub mod evdev;
pub mod framing;
pub mod freeimu;
pub mod iphone;
pub mod midi;
pub mod opentrack;
pub mod ps3;
pub mod serial;
pub mod udp;

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Number of dropped frames between drop summaries
pub const DROP_LOG_INTERVAL: u64 = 1000;

/// Pending state written by an I/O task and read by the pre-tick hook.
#[derive(Debug, Default)]
pub struct Pending<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for Pending<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Pending<T> {
    /// Wraps an initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    /// Locks the pending value, recovering a poisoned lock.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Orientation triad shared by the IMU and head-tracker transports.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Orientation {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

/// Counts malformed frames and rate limits the warnings about them.
#[derive(Debug)]
pub struct DropCounter {
    transport: &'static str,
    count: u64,
}

impl DropCounter {
    /// Creates a counter for `transport`.
    #[must_use]
    pub const fn new(transport: &'static str) -> Self {
        Self { transport, count: 0 }
    }

    /// Records one dropped frame. The first drop and every
    /// [`DROP_LOG_INTERVAL`]th are logged at WARN.
    pub fn record(&mut self, reason: &str) {
        self.count += 1;
        if self.count == 1 || self.count % DROP_LOG_INTERVAL == 0 {
            warn!(
                "[{}] Dropped malformed frame ({}), {} so far",
                self.transport, reason, self.count
            );
        } else {
            debug!("[{}] Dropped malformed frame ({})", self.transport, reason);
        }
    }

    /// Frames dropped so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }
}

/// Aborts an I/O task and waits for it to finish, releasing the handles it
/// owns. Does nothing if the task was never started or already stopped.
pub async fn stop_task(task: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = task.take() {
        handle.abort();
        let _ = handle.await;
    }
}

/// Reads a little-endian `f32` at `offset`.
pub(crate) fn f32_le(bytes: &[u8], offset: usize) -> Option<f32> {
    let raw: [u8; 4] = bytes.get(offset..offset + 4)?.try_into().ok()?;
    Some(f32::from_le_bytes(raw))
}

/// Reads a little-endian `f64` at `offset`.
pub(crate) fn f64_le(bytes: &[u8], offset: usize) -> Option<f64> {
    let raw: [u8; 8] = bytes.get(offset..offset + 8)?.try_into().ok()?;
    Some(f64::from_le_bytes(raw))
}
