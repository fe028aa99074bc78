//! Phone orientation as a mouse.
//!
//! Yaw and pitch are unwrapped across the ±180° seam, differenced per tick,
//! smoothed and scaled to pixels. Params: `device` (phone index, 0),
//! `sensitivity` (0.4 px per degree), `smoothing` (0.3).

use super::{Params, Script};
use crate::engine::Bindings;
use crate::error::{BridgeError, Result};
use crate::filters::AngleUnit;

const DEFAULT_SENSITIVITY: f64 = 0.4;
const DEFAULT_SMOOTHING: f64 = 0.3;

pub(crate) fn phone_index(params: &Params<'_>) -> Result<u8> {
    let index = params.integer("device", 0)?;
    u8::try_from(index)
        .map_err(|_| BridgeError::Script(format!("phone index must be 0-255, got {}", index)))
}

pub(crate) fn smoothing(params: &Params<'_>, default: f64) -> Result<f64> {
    let value = params.float("smoothing", default)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(BridgeError::Script(format!(
            "smoothing must be between 0 and 1, got {}",
            value
        )));
    }
    Ok(value)
}

#[derive(Debug)]
pub struct AndroidMouse {
    phone: u8,
    sensitivity: f64,
    smoothing: f64,
}

pub(crate) fn build(params: &Params<'_>, bindings: &mut Bindings) -> Result<Box<dyn Script>> {
    let phone = phone_index(params)?;
    bindings.android.device(phone);
    Ok(Box::new(AndroidMouse {
        phone,
        sensitivity: params.float("sensitivity", DEFAULT_SENSITIVITY)?,
        smoothing: smoothing(params, DEFAULT_SMOOTHING)?,
    }))
}

impl Script for AndroidMouse {
    fn tick(&mut self, ctx: &mut Bindings) -> Result<()> {
        let phone = ctx.android.device(self.phone);
        let (yaw, pitch) = (phone.yaw, phone.pitch);
        let filters = &mut ctx.filters;

        let yaw = filters.continuous_rotation(yaw, AngleUnit::Degrees, "yaw");
        let pitch = filters.continuous_rotation(pitch, AngleUnit::Degrees, "pitch");
        let dyaw = filters.delta(yaw, "yaw");
        let dpitch = filters.delta(pitch, "pitch");
        let dyaw = filters.ema(dyaw, self.smoothing, "syaw")?;
        let dpitch = filters.ema(dpitch, self.smoothing, "spitch")?;

        ctx.mouse.x = (dyaw * self.sensitivity).round() as i32;
        ctx.mouse.y = (dpitch * self.sensitivity).round() as i32;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;

    fn setup(params: &str) -> (Bindings, Box<dyn Script>) {
        let profile =
            Profile::from_toml(&format!("script = \"android-mouse\"\n[params]\n{}", params))
                .unwrap();
        let mut bindings = Bindings::from_profile(&profile, &[]);
        let script = build(&Params::new(&profile.params), &mut bindings).unwrap();
        (bindings, script)
    }

    #[test]
    fn test_turn_moves_pointer() {
        let (mut bindings, mut script) = setup("sensitivity = 2.0\nsmoothing = 0.0");

        bindings.android.device(0).yaw = 10.0;
        script.tick(&mut bindings).unwrap();
        assert_eq!(bindings.mouse.x, 0);

        bindings.android.device(0).yaw = 15.0;
        bindings.android.device(0).pitch = -3.0;
        script.tick(&mut bindings).unwrap();
        assert_eq!(bindings.mouse.x, 10);
        assert_eq!(bindings.mouse.y, -6);
    }

    #[test]
    fn test_seam_crossing_is_small_step() {
        let (mut bindings, mut script) = setup("sensitivity = 1.0\nsmoothing = 0.0");

        bindings.android.device(0).yaw = 179.0;
        script.tick(&mut bindings).unwrap();
        bindings.android.device(0).yaw = -179.0;
        script.tick(&mut bindings).unwrap();
        assert_eq!(bindings.mouse.x, 2);
    }

    #[test]
    fn test_params_validated() {
        let profile = Profile::from_toml(
            "script = \"android-mouse\"\n[params]\nsmoothing = 1.5",
        )
        .unwrap();
        let mut bindings = Bindings::from_profile(&profile, &[]);
        assert!(build(&Params::new(&profile.params), &mut bindings).is_err());

        let table: toml::Table = toml::from_str("device = 300").unwrap();
        assert!(phone_index(&Params::new(&table)).is_err());
    }
}
