//! # Input Device Discovery
//!
//! Finds an event file by device name. Names are compared after
//! lowercasing and stripping hyphens and whitespace, so `"Xbox-360"` matches
//! `"Microsoft X-Box 360 pad"`. Devices created by this bridge are skipped.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};

/// Keywords matched when the caller gives none
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "gamepad",
    "joystick",
    "controller",
    "xbox",
    "dualshock",
    "playstation",
    "8bitdo",
    "steam deck",
    "pro controller",
];

/// Name prefix of the virtual devices this bridge creates
pub const SELF_PREFIX: &str = "pie-bridge";

/// An enumerated input device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDeviceInfo {
    /// N in `/dev/input/eventN`
    pub index: u32,
    pub path: PathBuf,
    pub name: String,
}

/// Lowercases and strips hyphens and whitespace.
#[must_use]
pub fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn is_self(name: &str) -> bool {
    normalize(name).starts_with(&normalize(SELF_PREFIX))
}

/// Picks the first device, in enumeration order, whose name contains
/// `keyword` or any of the default keywords.
///
/// # Errors
///
/// Returns `DeviceNotFound` carrying every seen device name.
pub fn match_device<'a>(
    devices: &'a [InputDeviceInfo],
    keyword: Option<&str>,
) -> Result<&'a InputDeviceInfo> {
    let candidates: Vec<&InputDeviceInfo> = devices.iter().filter(|d| !is_self(&d.name)).collect();

    let keywords: Vec<String> = match keyword {
        Some(k) => vec![normalize(k)],
        None => DEFAULT_KEYWORDS.iter().map(|k| normalize(k)).collect(),
    };

    let found = candidates.into_iter().find(|d| {
        let name = normalize(&d.name);
        keywords.iter().any(|k| name.contains(k.as_str()))
    });
    if let Some(device) = found {
        return Ok(device);
    }

    Err(BridgeError::DeviceNotFound {
        keyword: keyword.map(str::to_string),
        available: devices
            .iter()
            .map(|d| format!("{} ({})", d.name, d.path.display()))
            .collect(),
    })
}

fn event_index(path: &std::path::Path) -> Option<u32> {
    path.file_name()?.to_str()?.strip_prefix("event")?.parse().ok()
}

/// Lists the host's event devices, sorted by index.
#[must_use]
pub fn enumerate_devices() -> Vec<InputDeviceInfo> {
    let mut devices: Vec<InputDeviceInfo> = evdev::enumerate()
        .filter_map(|(path, device)| {
            let index = event_index(&path)?;
            let name = device.name().unwrap_or("unknown").to_string();
            Some(InputDeviceInfo { index, path, name })
        })
        .collect();
    devices.sort_by_key(|d| d.index);
    debug!("Enumerated {} input devices", devices.len());
    devices
}

/// Finds a device on this host.
///
/// # Errors
///
/// Returns `DeviceNotFound` if nothing matches. The available devices are
/// logged as well.
pub fn find(keyword: Option<&str>) -> Result<InputDeviceInfo> {
    let devices = enumerate_devices();
    match match_device(&devices, keyword) {
        Ok(device) => {
            info!("Found input device {:?} at {}", device.name, device.path.display());
            Ok(device.clone())
        }
        Err(e) => {
            warn!("No input device matched {:?}", keyword.unwrap_or("default keywords"));
            for device in &devices {
                warn!("  {} {}", device.path.display(), device.name);
            }
            Err(e)
        }
    }
}
