//! # Mapping Scripts
//!
//! A script is the per-tick mapping from input records to output records.
//! Scripts are compiled in and selected by name from the profile; the
//! profile's `[params]` table tunes them.
//!
//! ## Example
//!
//! ```no_run
//! use pie_bridge::config::Profile;
//! use pie_bridge::engine::Bindings;
//! use pie_bridge::script;
//!
//! let profile = Profile::from_toml("script = \"gamepad-mouse\"")?;
//! let transports = script::resolve_transports(&profile)?;
//! let mut bindings = Bindings::from_profile(&profile, &transports);
//! let script = script::load(&profile, &mut bindings)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod android_mouse;
pub mod debug;
pub mod descent;
pub mod gamepad;
pub mod gamepad_mouse;
pub mod midi;
pub mod opentrack_mouse;
pub mod orientation_joystick;
pub mod remote_control;
pub mod turbo;

use tracing::{info, warn};

use crate::config::Profile;
use crate::engine::{Bindings, Transport};
use crate::error::{BridgeError, Result};
use crate::input::evdev::JoystickDevice;

/// Per-tick mapping logic
pub trait Script: Send {
    /// Reads inputs and writes outputs for one tick.
    ///
    /// # Errors
    ///
    /// Any error is logged by the engine; the next tick runs normally.
    fn tick(&mut self, ctx: &mut Bindings) -> Result<()>;
}

/// Typed view over a profile's `[params]` table
#[derive(Debug, Clone, Copy)]
pub struct Params<'a> {
    table: &'a toml::Table,
}

fn wrong_type(key: &str, expected: &str, value: &toml::Value) -> BridgeError {
    BridgeError::Script(format!(
        "param '{}' must be {}, got {}",
        key,
        expected,
        value.type_str()
    ))
}

impl<'a> Params<'a> {
    #[must_use]
    pub fn new(table: &'a toml::Table) -> Self {
        Self { table }
    }

    /// Float param. Integers are accepted.
    ///
    /// # Errors
    ///
    /// Returns `Script` if the value is neither a float nor an integer.
    pub fn float(&self, key: &str, default: f64) -> Result<f64> {
        match self.table.get(key) {
            None => Ok(default),
            Some(toml::Value::Float(f)) => Ok(*f),
            Some(toml::Value::Integer(i)) => Ok(*i as f64),
            Some(other) => Err(wrong_type(key, "a number", other)),
        }
    }

    /// Optional integer param.
    ///
    /// # Errors
    ///
    /// Returns `Script` if the value is not an integer.
    pub fn opt_integer(&self, key: &str) -> Result<Option<i64>> {
        match self.table.get(key) {
            None => Ok(None),
            Some(toml::Value::Integer(i)) => Ok(Some(*i)),
            Some(other) => Err(wrong_type(key, "an integer", other)),
        }
    }

    /// Integer param.
    ///
    /// # Errors
    ///
    /// Returns `Script` if the value is not an integer.
    pub fn integer(&self, key: &str, default: i64) -> Result<i64> {
        Ok(self.opt_integer(key)?.unwrap_or(default))
    }

    /// Optional string param.
    ///
    /// # Errors
    ///
    /// Returns `Script` if the value is not a string.
    pub fn opt_string(&self, key: &str) -> Result<Option<&'a str>> {
        match self.table.get(key) {
            None => Ok(None),
            Some(toml::Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(wrong_type(key, "a string", other)),
        }
    }

    /// String param.
    ///
    /// # Errors
    ///
    /// Returns `Script` if the value is not a string.
    pub fn string(&self, key: &str, default: &'a str) -> Result<&'a str> {
        Ok(self.opt_string(key)?.unwrap_or(default))
    }

    /// Boolean param.
    ///
    /// # Errors
    ///
    /// Returns `Script` if the value is not a boolean.
    pub fn boolean(&self, key: &str, default: bool) -> Result<bool> {
        match self.table.get(key) {
            None => Ok(default),
            Some(toml::Value::Boolean(b)) => Ok(*b),
            Some(other) => Err(wrong_type(key, "a boolean", other)),
        }
    }
}

type Builder = fn(&Params<'_>, &mut Bindings) -> Result<Box<dyn Script>>;

/// A compiled-in script
pub struct ScriptEntry {
    /// Name used in profiles
    pub name: &'static str,
    /// One-line summary
    pub description: &'static str,
    /// Plugins enabled when the profile does not list its own
    pub transports: &'static [Transport],
    build: Builder,
}

impl std::fmt::Debug for ScriptEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEntry")
            .field("name", &self.name)
            .field("transports", &self.transports)
            .finish_non_exhaustive()
    }
}

impl ScriptEntry {
    /// Instantiates the script.
    ///
    /// # Errors
    ///
    /// Returns `Script` for a malformed param.
    pub fn build(&self, params: &Params<'_>, bindings: &mut Bindings) -> Result<Box<dyn Script>> {
        (self.build)(params, bindings)
    }
}

/// Every built-in script
pub static SCRIPTS: &[ScriptEntry] = &[
    ScriptEntry {
        name: "gamepad",
        description: "controller pass-through with dead zone and response curve",
        transports: &[Transport::Joystick, Transport::Vjoy],
        build: gamepad::build,
    },
    ScriptEntry {
        name: "gamepad-mouse",
        description: "right stick moves the mouse, left stick scrolls",
        transports: &[Transport::Joystick, Transport::Mouse],
        build: gamepad_mouse::build,
    },
    ScriptEntry {
        name: "turbo",
        description: "pass-through with auto-fire on A and B",
        transports: &[Transport::Joystick, Transport::Vjoy],
        build: turbo::build,
    },
    ScriptEntry {
        name: "android-mouse",
        description: "phone orientation aims the mouse",
        transports: &[Transport::Android, Transport::Mouse],
        build: android_mouse::build,
    },
    ScriptEntry {
        name: "remote-control",
        description: "phone gyro aims, phone buttons click",
        transports: &[Transport::Android, Transport::Mouse],
        build: remote_control::build,
    },
    ScriptEntry {
        name: "opentrack-mouse",
        description: "head tracker yaw and pitch move the mouse",
        transports: &[Transport::Opentrack, Transport::Mouse],
        build: opentrack_mouse::build,
    },
    ScriptEntry {
        name: "orientation-joystick",
        description: "IMU or head tracker angles drive joystick axes",
        transports: &[Transport::Ahrs, Transport::Vjoy],
        build: orientation_joystick::build,
    },
    ScriptEntry {
        name: "midi",
        description: "controller knobs to axes, pads to buttons and shortcuts",
        transports: &[Transport::Midi, Transport::Vjoy],
        build: midi::build,
    },
    ScriptEntry {
        name: "descent",
        description: "PS3 controller with shift layers for Descent",
        transports: &[Transport::Ps3, Transport::Vjoy],
        build: descent::build,
    },
    ScriptEntry {
        name: "debug",
        description: "logs controller buttons and axis movement",
        transports: &[Transport::Joystick],
        build: debug::build,
    },
];

/// Finds a built-in script by name.
///
/// # Errors
///
/// Returns `UnknownScript` if no script has that name.
pub fn lookup(name: &str) -> Result<&'static ScriptEntry> {
    SCRIPTS
        .iter()
        .find(|entry| entry.name == name)
        .ok_or_else(|| BridgeError::UnknownScript(name.to_string()))
}

/// Plugins to enable: the profile's list if present, else the script's.
///
/// # Errors
///
/// Returns `UnknownScript` for an unknown script, or `Script` for an
/// unknown transport name.
pub fn resolve_transports(profile: &Profile) -> Result<Vec<Transport>> {
    let entry = lookup(&profile.script)?;
    match &profile.transports {
        None => Ok(entry.transports.to_vec()),
        Some(names) => names
            .iter()
            .map(|name| {
                Transport::from_name(name)
                    .ok_or_else(|| BridgeError::Script(format!("unknown transport '{}'", name)))
            })
            .collect(),
    }
}

/// Builds the profile's script against started bindings.
///
/// # Errors
///
/// Returns `UnknownScript` or a param error.
pub fn load(profile: &Profile, bindings: &mut Bindings) -> Result<Box<dyn Script>> {
    let entry = lookup(&profile.script)?;
    let script = entry.build(&Params::new(&profile.params), bindings)?;
    info!("Loaded script '{}': {}", entry.name, entry.description);
    Ok(script)
}

/// Resolves the controller a joystick script reads.
///
/// `device = N` selects `eventN` directly; otherwise discovery runs with
/// the optional `find` keyword. A discovery miss is logged and yields
/// `None`, which leaves the script idle.
///
/// # Errors
///
/// Returns `Script` for a malformed `device` or `find` param.
pub(crate) fn select_joystick(params: &Params<'_>, bindings: &mut Bindings) -> Result<Option<u32>> {
    if let Some(index) = params.opt_integer("device")? {
        let index = u32::try_from(index)
            .map_err(|_| BridgeError::Script(format!("param 'device' out of range: {}", index)))?;
        bindings.joystick.device(index);
        return Ok(Some(index));
    }

    match bindings.joystick.find(params.opt_string("find")?) {
        Ok(device) => Ok(Some(device.index())),
        Err(e) => {
            warn!("[joystick] {}; script will idle", e);
            Ok(None)
        }
    }
}

/// Full-scale stick range reported by evdev gamepads
pub(crate) const STICK_MAX: f64 = 32767.0;

/// Trigger range reported by evdev gamepads
pub(crate) const TRIGGER_MAX: f64 = 255.0;

/// Stick axis normalized to `[-1, 1]`.
pub(crate) fn stick(pad: &JoystickDevice, code: u16) -> f64 {
    crate::filters::FilterBank::map_range_clamped(
        f64::from(pad.axis(code)),
        -STICK_MAX,
        STICK_MAX,
        -1.0,
        1.0,
    )
}

/// Trigger axis normalized to `[-1, 1]`.
pub(crate) fn trigger(pad: &JoystickDevice, code: u16) -> f64 {
    crate::filters::FilterBank::map_range_clamped(f64::from(pad.axis(code)), 0.0, TRIGGER_MAX, -1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(text: &str) -> Profile {
        Profile::from_toml(text).unwrap()
    }

    #[test]
    fn test_script_names_unique() {
        for (i, entry) in SCRIPTS.iter().enumerate() {
            assert!(SCRIPTS[i + 1..].iter().all(|other| other.name != entry.name));
            assert!(!entry.transports.is_empty());
        }
    }

    #[test]
    fn test_lookup_unknown_script() {
        assert!(lookup("gamepad").is_ok());
        assert!(matches!(lookup("tetris"), Err(BridgeError::UnknownScript(name)) if name == "tetris"));
    }

    #[test]
    fn test_resolve_default_transports() {
        let transports = resolve_transports(&profile("script = \"android-mouse\"")).unwrap();
        assert_eq!(transports, vec![Transport::Android, Transport::Mouse]);
    }

    #[test]
    fn test_resolve_profile_transports_override() {
        let transports = resolve_transports(&profile(
            "script = \"orientation-joystick\"\ntransports = [\"freeimu\", \"vjoy\"]",
        ))
        .unwrap();
        assert_eq!(transports, vec![Transport::FreeImu, Transport::Vjoy]);
    }

    #[test]
    fn test_params_typed_access() {
        let table: toml::Table = toml::from_str(
            "sensitivity = 2\nsmoothing = 0.5\ncurve = \"expo\"\ninvert = true\ndevice = 3",
        )
        .unwrap();
        let params = Params::new(&table);

        assert_eq!(params.float("sensitivity", 1.0).unwrap(), 2.0);
        assert_eq!(params.float("smoothing", 0.0).unwrap(), 0.5);
        assert_eq!(params.float("missing", 0.25).unwrap(), 0.25);
        assert_eq!(params.string("curve", "linear").unwrap(), "expo");
        assert!(params.boolean("invert", false).unwrap());
        assert_eq!(params.integer("device", 0).unwrap(), 3);
        assert_eq!(params.opt_string("find").unwrap(), None);
    }

    #[test]
    fn test_params_wrong_type() {
        let table: toml::Table = toml::from_str("curve = 3\nsmoothing = \"high\"").unwrap();
        let params = Params::new(&table);

        assert!(matches!(params.string("curve", "linear"), Err(BridgeError::Script(_))));
        let err = params.float("smoothing", 0.2).unwrap_err();
        assert!(err.to_string().contains("smoothing"));
    }

    #[test]
    fn test_load_every_script_without_hardware() {
        for entry in SCRIPTS {
            // An explicit device index keeps joystick scripts off discovery
            let profile = profile(&format!("script = \"{}\"\n[params]\ndevice = 0", entry.name));
            let mut bindings = Bindings::from_profile(&profile, &[]);
            let mut script = load(&profile, &mut bindings).unwrap();
            script.tick(&mut bindings).unwrap();
        }
    }

    #[test]
    fn test_shipped_profiles_resolve() {
        let profiles = [
            include_str!("../../scripts/gamepad.toml"),
            include_str!("../../scripts/gamepad-curves.toml"),
            include_str!("../../scripts/gamepad-mouse.toml"),
            include_str!("../../scripts/turbo.toml"),
            include_str!("../../scripts/android-mouse.toml"),
            include_str!("../../scripts/remote-control.toml"),
            include_str!("../../scripts/opentrack-mouse.toml"),
            include_str!("../../scripts/orientation-joystick.toml"),
            include_str!("../../scripts/midi.toml"),
            include_str!("../../scripts/descent.toml"),
            include_str!("../../scripts/debug.toml"),
        ];
        for text in profiles {
            let profile = profile(text);
            assert!(!resolve_transports(&profile).unwrap().is_empty(), "{}", profile.script);
        }
    }

    #[test]
    fn test_load_unknown_script() {
        let profile = profile("script = \"tetris\"");
        let mut bindings = Bindings::from_profile(&profile, &[]);
        assert!(matches!(load(&profile, &mut bindings), Err(BridgeError::UnknownScript(_))));
    }
}
