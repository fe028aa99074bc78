//! Phone as a wireless pointer: gyro rates aim, the phone's primary and
//! secondary buttons hold the left and right mouse buttons.

use super::android_mouse::{phone_index, smoothing};
use super::{Params, Script};
use crate::engine::Bindings;
use crate::error::Result;
use crate::filters::FilterBank;

const DEFAULT_SENSITIVITY: f64 = 600.0;
const DEFAULT_SMOOTHING: f64 = 0.2;
/// rad/s
const DEFAULT_DEADBAND: f64 = 0.004;

#[derive(Debug)]
pub struct RemoteControl {
    phone: u8,
    sensitivity_x: f64,
    sensitivity_y: f64,
    smoothing: f64,
    deadband: f64,
}

pub(crate) fn build(params: &Params<'_>, bindings: &mut Bindings) -> Result<Box<dyn Script>> {
    let phone = phone_index(params)?;
    bindings.android.device(phone);
    let sensitivity = params.float("sensitivity", DEFAULT_SENSITIVITY)?;
    Ok(Box::new(RemoteControl {
        phone,
        sensitivity_x: params.float("sensitivity_x", sensitivity)?,
        sensitivity_y: params.float("sensitivity_y", sensitivity)?,
        smoothing: smoothing(params, DEFAULT_SMOOTHING)?,
        deadband: params.float("deadband", DEFAULT_DEADBAND)?,
    }))
}

impl Script for RemoteControl {
    fn tick(&mut self, ctx: &mut Bindings) -> Result<()> {
        let phone = ctx.android.device(self.phone);
        ctx.mouse.left = phone.primary();
        ctx.mouse.right = phone.secondary();

        let yaw_rate = FilterBank::deadband(phone.gyro.y, self.deadband);
        let pitch_rate = FilterBank::deadband(phone.gyro.x, self.deadband);
        let yaw_rate = ctx.filters.ema(yaw_rate, self.smoothing, "gy")?;
        let pitch_rate = ctx.filters.ema(pitch_rate, self.smoothing, "gx")?;

        ctx.mouse.x = (yaw_rate * self.sensitivity_x).round() as i32;
        ctx.mouse.y = (pitch_rate * self.sensitivity_y).round() as i32;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;

    fn setup(params: &str) -> (Bindings, Box<dyn Script>) {
        let profile =
            Profile::from_toml(&format!("script = \"remote-control\"\n[params]\n{}", params))
                .unwrap();
        let mut bindings = Bindings::from_profile(&profile, &[]);
        let script = build(&Params::new(&profile.params), &mut bindings).unwrap();
        (bindings, script)
    }

    #[test]
    fn test_buttons_follow_bits() {
        let (mut bindings, mut script) = setup("");

        bindings.android.device(0).buttons = 0b01;
        script.tick(&mut bindings).unwrap();
        assert!(bindings.mouse.left);
        assert!(!bindings.mouse.right);

        bindings.android.device(0).buttons = 0b10;
        script.tick(&mut bindings).unwrap();
        assert!(!bindings.mouse.left);
        assert!(bindings.mouse.right);
    }

    #[test]
    fn test_gyro_aims() {
        let (mut bindings, mut script) = setup("smoothing = 0.0\nsensitivity_y = 100.0");

        let phone = bindings.android.device(0);
        phone.gyro.y = 0.05;
        phone.gyro.x = -0.2;
        script.tick(&mut bindings).unwrap();
        assert_eq!(bindings.mouse.x, 30);
        assert_eq!(bindings.mouse.y, -20);

        // Tremor below the dead zone
        let phone = bindings.android.device(0);
        phone.gyro.y = 0.003;
        phone.gyro.x = 0.0;
        script.tick(&mut bindings).unwrap();
        assert_eq!((bindings.mouse.x, bindings.mouse.y), (0, 0));
    }
}
