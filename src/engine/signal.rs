//! # Data Signal
//!
//! "Data available" notification shared by every transport and the
//! scheduler. Transports raise it from their I/O tasks; the scheduler
//! waits on it between ticks.
//!
//! While a tick is running the signal is *busy* and raises are dropped,
//! not queued. The next tick reads whatever state was committed most
//! recently. Raises while idle coalesce into a single wake-up.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    busy: AtomicBool,
    notify: Notify,
    raised: AtomicU64,
    dropped: AtomicU64,
}

/// Cloneable handle to the engine's data-available signal.
#[derive(Debug, Clone, Default)]
pub struct DataSignal {
    inner: Arc<Inner>,
}

impl DataSignal {
    /// Creates an idle signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports that new data is available.
    ///
    /// Never blocks. Dropped if a tick is in flight.
    pub fn raise(&self) {
        self.inner.raised.fetch_add(1, Ordering::Relaxed);
        if self.inner.busy.load(Ordering::Acquire) {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.inner.notify.notify_one();
    }

    /// Waits until data is reported.
    pub async fn notified(&self) {
        self.inner.notify.notified().await;
    }

    /// Number of raises dropped because a tick was running.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Total number of raises.
    #[must_use]
    pub fn raised(&self) -> u64 {
        self.inner.raised.load(Ordering::Relaxed)
    }

    /// Whether a tick is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::Acquire)
    }

    /// Idle -> Running. Returns false if already running.
    pub(crate) fn try_begin(&self) -> bool {
        self.inner
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Running -> Idle.
    pub(crate) fn end(&self) {
        self.inner.busy.store(false, Ordering::Release);
    }
}
