//! # PIE Bridge
//!
//! Routes physical input devices into virtual joystick, mouse and keyboard
//! devices under the control of a mapping script.
//!
//! # Usage
//!
//! ```bash
//! pie-bridge                         # bundled gamepad profile
//! pie-bridge scripts/android-mouse.toml
//! RUST_LOG=debug pie-bridge scripts/debug.toml
//! ```

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pie_bridge::config::Profile;
use pie_bridge::engine::{Bindings, DataSignal, Engine};
use pie_bridge::script;

/// Main entry point
///
/// # Control Flow
///
/// 1. Load the profile named on the command line, or the bundled one
/// 2. Start every enabled plugin; one that cannot start stays inert
/// 3. Build the script against the started bindings
/// 4. Run ticks on incoming data until Ctrl+C
/// 5. Stop every plugin in registration order
///
/// # Errors
///
/// Returns error if the profile cannot be loaded or names an unknown
/// script, or if a script param is malformed.
#[tokio::main]
async fn main() -> Result<()> {
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("PIE Bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let profile = match std::env::args_os().nth(1) {
        Some(path) => Profile::load(&path)
            .with_context(|| format!("Cannot load profile {}", path.to_string_lossy()))?,
        None => Profile::bundled().context("Cannot load bundled profile")?,
    };

    let transports = script::resolve_transports(&profile)?;
    info!(
        "Script '{}' with plugins: {}",
        profile.script,
        transports.iter().map(|t| t.name()).collect::<Vec<_>>().join(", ")
    );

    let signal = DataSignal::new();
    let mut bindings = Bindings::from_profile(&profile, &transports);
    let started = bindings.start_all(&signal).await;
    info!("{} of {} plugins started", started, transports.len());

    let script = match script::load(&profile, &mut bindings) {
        Ok(script) => script,
        Err(e) => {
            bindings.stop_all().await;
            return Err(e.into());
        }
    };

    let mut engine = Engine::new(bindings, script, signal);
    info!("Press Ctrl+C to exit");
    engine
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Cannot listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    engine.stop().await;
    info!("Shutdown complete");
    Ok(())
}
