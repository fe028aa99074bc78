//! # Execution Engine
//!
//! Ties transports, the script and the output devices together.
//!
//! ## Tick protocol
//!
//! The engine waits on the shared [`DataSignal`]. When it fires and no tick
//! is in flight, one tick runs:
//!
//! 1. every started plugin's [`Plugin::before_tick`] commits pending input
//! 2. the script's `tick` runs once; an error or panic is logged and counted
//! 3. every started plugin's [`Plugin::after_tick`] writes output devices
//!
//! Raises that arrive while a tick runs are dropped, so a burst of input
//! edges faster than one tick can lose an edge. The next tick reads the
//! most recently committed state.

pub mod bindings;
pub mod signal;

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

use async_trait::async_trait;
use tracing::{debug, info, warn};

pub use bindings::{Bindings, Transport};
pub use signal::DataSignal;

use crate::error::Result;
use crate::script::Script;

/// Lifecycle and tick hooks shared by transports and output devices.
#[async_trait]
pub trait Plugin: Send {
    /// Name used in logs and profiles.
    fn name(&self) -> &'static str;

    /// Opens handles and spawns I/O tasks.
    ///
    /// # Errors
    ///
    /// A setup failure. The engine logs it and leaves the plugin inert.
    async fn start(&mut self, signal: DataSignal) -> Result<()>;

    /// Releases every handle. Must be idempotent and safe after a failed
    /// start.
    async fn stop(&mut self);

    /// Commits pending input into the script-visible record.
    fn before_tick(&mut self) {}

    /// Writes script output to devices.
    ///
    /// # Errors
    ///
    /// A device write failure. The engine logs it; the next tick retries.
    fn after_tick(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Single-flight scheduler
pub struct Engine {
    bindings: Bindings,
    script: Box<dyn Script>,
    signal: DataSignal,
    ticks: u64,
    faults: u64,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("ticks", &self.ticks)
            .field("faults", &self.faults)
            .field("busy", &self.signal.is_busy())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Engine {
    /// Creates an engine over started bindings and a loaded script.
    #[must_use]
    pub fn new(bindings: Bindings, script: Box<dyn Script>, signal: DataSignal) -> Self {
        Self {
            bindings,
            script,
            signal,
            ticks: 0,
            faults: 0,
        }
    }

    /// Shared data signal.
    #[must_use]
    pub fn signal(&self) -> &DataSignal {
        &self.signal
    }

    /// Script-visible records.
    #[must_use]
    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    /// Mutable access to the records, for tests and embedders.
    pub fn bindings_mut(&mut self) -> &mut Bindings {
        &mut self.bindings
    }

    /// Ticks run so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Ticks whose script call failed or panicked.
    #[must_use]
    pub fn faults(&self) -> u64 {
        self.faults
    }

    /// Handles one data notification. Runs a tick unless one is already in
    /// flight. Returns whether a tick ran.
    pub fn on_data(&mut self) -> bool {
        if !self.signal.try_begin() {
            debug!("Tick in flight, data signal dropped");
            return false;
        }
        self.tick();
        self.signal.end();
        true
    }

    fn tick(&mut self) {
        self.bindings.before_tick();

        let outcome =
            panic::catch_unwind(AssertUnwindSafe(|| self.script.tick(&mut self.bindings)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.faults += 1;
                warn!("Script fault in tick {}: {}", self.ticks, e);
            }
            Err(payload) => {
                self.faults += 1;
                warn!(
                    "Script panicked in tick {}: {}",
                    self.ticks,
                    panic_message(payload.as_ref())
                );
            }
        }

        self.bindings.after_tick();
        self.ticks += 1;
    }

    /// Runs ticks on data notifications until `shutdown` completes.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future,
    {
        tokio::pin!(shutdown);
        let signal = self.signal.clone();
        info!("Engine running");

        loop {
            tokio::select! {
                _ = signal.notified() => {
                    self.on_data();
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested after {} ticks ({} faults, {} signals dropped)",
                        self.ticks, self.faults, self.signal.dropped());
                    break;
                }
            }
        }
    }

    /// Stops every enabled plugin in registration order.
    pub async fn stop(&mut self) {
        self.bindings.stop_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;
    use crate::error::BridgeError;
    use std::time::Duration;
    use tokio_test::{assert_pending, task};

    fn bindings() -> Bindings {
        let profile = Profile::from_toml("script = \"debug\"").unwrap();
        Bindings::from_profile(&profile, &[])
    }

    /// Raises the data signal from inside its own tick.
    struct Reentrant {
        signal: DataSignal,
        calls: u32,
    }

    impl Script for Reentrant {
        fn tick(&mut self, _ctx: &mut Bindings) -> Result<()> {
            self.calls += 1;
            self.signal.raise();
            self.signal.raise();
            Ok(())
        }
    }

    struct Faulty {
        calls: u32,
    }

    impl Script for Faulty {
        fn tick(&mut self, ctx: &mut Bindings) -> Result<()> {
            self.calls += 1;
            match self.calls {
                1 => Err(BridgeError::Script("bad mapping".to_string())),
                2 => panic!("script bug"),
                _ => {
                    ctx.mouse.x = 1;
                    Ok(())
                }
            }
        }
    }

    #[test]
    fn test_raise_inside_tick_does_not_nest() {
        let signal = DataSignal::new();
        let script = Reentrant {
            signal: signal.clone(),
            calls: 0,
        };
        let mut engine = Engine::new(bindings(), Box::new(script), signal.clone());

        assert!(engine.on_data());
        assert_eq!(engine.ticks(), 1);
        assert_eq!(signal.dropped(), 2);
        assert!(!signal.is_busy());

        // Dropped raises leave nothing queued
        let mut wait = task::spawn(signal.notified());
        assert_pending!(wait.poll());
    }

    #[test]
    fn test_busy_engine_skips_tick() {
        let signal = DataSignal::new();
        let mut engine = Engine::new(bindings(), Box::new(Faulty { calls: 10 }), signal.clone());

        assert!(signal.try_begin());
        assert!(!engine.on_data());
        assert_eq!(engine.ticks(), 0);
        signal.end();
        assert!(engine.on_data());
        assert_eq!(engine.ticks(), 1);
    }

    #[test]
    fn test_script_faults_do_not_stop_ticks() {
        let signal = DataSignal::new();
        let mut engine = Engine::new(bindings(), Box::new(Faulty { calls: 0 }), signal.clone());

        assert!(engine.on_data());
        assert!(engine.on_data());
        assert!(engine.on_data());
        assert_eq!(engine.ticks(), 3);
        assert_eq!(engine.faults(), 2);
        assert!(!signal.is_busy());
        // Relative output is drained after the tick even without a device
        assert_eq!(engine.bindings().mouse.x, 0);
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let signal = DataSignal::new();
        let mut engine = Engine::new(bindings(), Box::new(Faulty { calls: 10 }), signal.clone());

        signal.raise();
        engine.run_until(tokio::time::sleep(Duration::from_millis(50))).await;
        assert_eq!(engine.ticks(), 1);
        engine.stop().await;
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(format!("code {}", 7));
        assert_eq!(panic_message(payload.as_ref()), "code 7");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
