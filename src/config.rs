//! # Configuration Module
//!
//! Loads and validates script profiles from TOML files.
//!
//! A profile names a built-in script, optionally overrides the set of
//! transports it enables and carries per-transport settings plus a free-form
//! `[params]` table read by the script. Environment variables are applied
//! after the file is parsed and take precedence.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{BridgeError, Result};

/// Profile used when no script file is given on the command line
pub const BUNDLED_PROFILE: &str = include_str!("../scripts/gamepad.toml");

/// Transport and output plugin names accepted in `transports`
pub const TRANSPORT_NAMES: &[&str] = &[
    "joystick", "android", "iphone", "opentrack", "ahrs", "freeimu", "midi", "ps3", "vjoy",
    "mouse",
];

/// Environment variable overriding every UDP bind host
pub const ENV_BIND_HOST: &str = "PIE_BRIDGE_BIND_HOST";
/// Environment variable overriding the head-tracker UDP port
pub const ENV_OPENTRACK_PORT: &str = "PIE_BRIDGE_OPENTRACK_PORT";
/// Environment variable overriding the AHRS serial device
pub const ENV_AHRS_PORT: &str = "PIE_BRIDGE_AHRS_PORT";
/// Environment variable overriding the FreeIMU serial device
pub const ENV_FREEIMU_PORT: &str = "PIE_BRIDGE_FREEIMU_PORT";

/// Script profile
#[derive(Debug, Deserialize, Clone)]
pub struct Profile {
    /// Built-in script name
    pub script: String,

    /// Transports to enable instead of the script's defaults
    #[serde(default)]
    pub transports: Option<Vec<String>>,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub joystick: JoystickConfig,

    #[serde(default)]
    pub android: AndroidConfig,

    #[serde(default)]
    pub iphone: IphoneConfig,

    #[serde(default)]
    pub opentrack: OpentrackConfig,

    #[serde(default = "default_ahrs")]
    pub ahrs: SerialDeviceConfig,

    #[serde(default = "default_freeimu")]
    pub freeimu: SerialDeviceConfig,

    #[serde(default)]
    pub midi: MidiConfig,

    /// Script parameters
    #[serde(default)]
    pub params: toml::Table,
}

/// Shared network settings
#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
}

/// Raw event-file joystick settings
#[derive(Debug, Deserialize, Clone)]
pub struct JoystickConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_keepalive_ms")]
    pub keepalive_ms: u64,

    #[serde(default = "default_grab")]
    pub grab: bool,

    /// Directory holding `eventN` files
    #[serde(default = "default_input_dir")]
    pub input_dir: String,
}

/// Phone sensor transport A settings
#[derive(Debug, Deserialize, Clone)]
pub struct AndroidConfig {
    #[serde(default = "default_android_port")]
    pub port: u16,
}

/// Phone sensor transport B settings
#[derive(Debug, Deserialize, Clone)]
pub struct IphoneConfig {
    #[serde(default = "default_iphone_port")]
    pub port: u16,
}

/// Head-tracker settings
#[derive(Debug, Deserialize, Clone)]
pub struct OpentrackConfig {
    #[serde(default = "default_opentrack_port")]
    pub port: u16,
}

/// Serial motion-sensor settings
#[derive(Debug, Deserialize, Clone)]
pub struct SerialDeviceConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,
}

/// MIDI settings
#[derive(Debug, Deserialize, Clone)]
pub struct MidiConfig {
    /// Directory scanned for `midiC*D*` raw devices
    #[serde(default = "default_midi_dir")]
    pub device_dir: String,
}

// Default value functions
fn default_bind_host() -> String { "127.0.0.1".to_string() }

fn default_poll_interval_ms() -> u64 { 4 }
fn default_keepalive_ms() -> u64 { 16 }
fn default_grab() -> bool { true }
fn default_input_dir() -> String { "/dev/input".to_string() }

fn default_android_port() -> u16 { 5555 }
fn default_iphone_port() -> u16 { 10552 }
fn default_opentrack_port() -> u16 { 4242 }

fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_ahrs() -> SerialDeviceConfig { SerialDeviceConfig { port: default_serial_port() } }
fn default_freeimu() -> SerialDeviceConfig { SerialDeviceConfig { port: default_serial_port() } }

fn default_midi_dir() -> String { "/dev/snd".to_string() }

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { bind_host: default_bind_host() }
    }
}

impl Default for JoystickConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            keepalive_ms: default_keepalive_ms(),
            grab: default_grab(),
            input_dir: default_input_dir(),
        }
    }
}

impl Default for AndroidConfig {
    fn default() -> Self {
        Self { port: default_android_port() }
    }
}

impl Default for IphoneConfig {
    fn default() -> Self {
        Self { port: default_iphone_port() }
    }
}

impl Default for OpentrackConfig {
    fn default() -> Self {
        Self { port: default_opentrack_port() }
    }
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self { device_dir: default_midi_dir() }
    }
}

fn invalid(msg: impl std::fmt::Display) -> BridgeError {
    BridgeError::Config(toml::de::Error::custom(msg))
}

impl Profile {
    /// Load a profile from a TOML file
    ///
    /// Environment overrides are applied before validation.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - An environment override cannot be parsed
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use pie_bridge::config::Profile;
    ///
    /// let profile = Profile::load("scripts/gamepad-mouse.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// The profile embedded in the binary
    ///
    /// # Errors
    ///
    /// Returns error if an environment override is invalid.
    pub fn bundled() -> Result<Self> {
        Self::from_toml(BUNDLED_PROFILE)
    }

    /// Parse a profile from TOML text, then apply environment overrides
    ///
    /// # Errors
    ///
    /// Returns error if parsing, overrides or validation fail.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let mut profile: Profile = toml::from_str(contents)?;
        profile.apply_overrides(|key| std::env::var(key).ok())?;
        profile.validate()?;
        Ok(profile)
    }

    /// Apply overrides from a key lookup (normally the process environment)
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a port override is not a number.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_BIND_HOST) {
            self.network.bind_host = host;
        }

        if let Some(port) = lookup(ENV_OPENTRACK_PORT) {
            self.opentrack.port = port.trim().parse().map_err(|_| {
                invalid(format!("{} must be a port number, got '{}'", ENV_OPENTRACK_PORT, port))
            })?;
        }

        if let Some(path) = lookup(ENV_AHRS_PORT) {
            self.ahrs.port = path;
        }

        if let Some(path) = lookup(ENV_FREEIMU_PORT) {
            self.freeimu.port = path;
        }

        Ok(())
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.script.trim().is_empty() {
            return Err(invalid("script cannot be empty"));
        }

        if self.network.bind_host.is_empty() {
            return Err(invalid("bind_host cannot be empty"));
        }

        if let Some(transports) = &self.transports {
            for name in transports {
                if !TRANSPORT_NAMES.contains(&name.as_str()) {
                    return Err(invalid(format!(
                        "unknown transport '{}' (expected one of: {})",
                        name,
                        TRANSPORT_NAMES.join(", ")
                    )));
                }
            }
        }

        if self.joystick.poll_interval_ms == 0 || self.joystick.poll_interval_ms > 1000 {
            return Err(invalid("poll_interval_ms must be between 1 and 1000"));
        }

        if self.joystick.keepalive_ms > 10000 {
            return Err(invalid("keepalive_ms must be between 0 and 10000"));
        }

        if self.joystick.input_dir.is_empty() {
            return Err(invalid("joystick input_dir cannot be empty"));
        }

        for (name, port) in [
            ("android", self.android.port),
            ("iphone", self.iphone.port),
            ("opentrack", self.opentrack.port),
        ] {
            if port == 0 {
                return Err(invalid(format!("{} port must be greater than 0", name)));
            }
        }

        for (name, path) in [("ahrs", &self.ahrs.port), ("freeimu", &self.freeimu.port)] {
            if path.is_empty() {
                return Err(invalid(format!("{} serial port cannot be empty", name)));
            }
        }

        if self.midi.device_dir.is_empty() {
            return Err(invalid("midi device_dir cannot be empty"));
        }

        Ok(())
    }
}
