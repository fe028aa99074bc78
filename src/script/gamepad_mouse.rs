//! Controller as a mouse: right stick moves the pointer, left stick Y
//! scrolls, A/B/X click left/right/middle.
//!
//! Motion is per tick, so the joystick keep-alive ticker is what keeps the
//! pointer moving while a stick is held still.

use super::{select_joystick, stick, Params, Script};
use crate::engine::Bindings;
use crate::error::Result;
use crate::filters::FilterBank;

const DEFAULT_SPEED: f64 = 15.0;
const DEFAULT_SCROLL: f64 = 3.0;
const DEFAULT_DEADBAND: f64 = 0.1;

#[derive(Debug)]
pub struct GamepadMouse {
    device: Option<u32>,
    speed: f64,
    scroll: f64,
    deadband: f64,
}

pub(crate) fn build(params: &Params<'_>, bindings: &mut Bindings) -> Result<Box<dyn Script>> {
    Ok(Box::new(GamepadMouse {
        device: select_joystick(params, bindings)?,
        speed: params.float("speed", DEFAULT_SPEED)?,
        scroll: params.float("scroll", DEFAULT_SCROLL)?,
        deadband: params.float("deadband", DEFAULT_DEADBAND)?,
    }))
}

impl Script for GamepadMouse {
    fn tick(&mut self, ctx: &mut Bindings) -> Result<()> {
        let Some(index) = self.device else {
            return Ok(());
        };
        let pad = ctx.joystick.device(index);

        let rx = FilterBank::deadband(stick(pad, 3), self.deadband);
        let ry = FilterBank::deadband(stick(pad, 4), self.deadband);
        let ly = FilterBank::deadband(stick(pad, 1), self.deadband);

        ctx.mouse.x = (rx * self.speed).round() as i32;
        ctx.mouse.y = (ry * self.speed).round() as i32;
        ctx.mouse.wheel = (-ly * self.scroll).round() as i32;

        ctx.mouse.left = pad.button(0x130);
        ctx.mouse.right = pad.button(0x131);
        ctx.mouse.middle = pad.button(0x133);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;
    use crate::input::evdev::JoystickState;

    #[test]
    fn test_sticks_and_clicks() {
        let profile =
            Profile::from_toml("script = \"gamepad-mouse\"\n[params]\ndevice = 2").unwrap();
        let mut bindings = Bindings::from_profile(&profile, &[]);
        let mut script = build(&Params::new(&profile.params), &mut bindings).unwrap();

        bindings.joystick.device(2).set_state(JoystickState {
            axes: [(3, 32767), (4, -16384), (1, -32767), (0, 32767)].into_iter().collect(),
            buttons: [(0x131, 1), (0x133, 1)].into_iter().collect(),
        });
        script.tick(&mut bindings).unwrap();

        assert_eq!(bindings.mouse.x, 15);
        assert_eq!(bindings.mouse.y, -8);
        assert_eq!(bindings.mouse.wheel, 3);
        assert!(!bindings.mouse.left);
        assert!(bindings.mouse.right);
        assert!(bindings.mouse.middle);
    }

    #[test]
    fn test_small_deflection_ignored() {
        let profile = Profile::from_toml(
            "script = \"gamepad-mouse\"\n[params]\ndevice = 2\nspeed = 20",
        )
        .unwrap();
        let mut bindings = Bindings::from_profile(&profile, &[]);
        let mut script = build(&Params::new(&profile.params), &mut bindings).unwrap();

        bindings.joystick.device(2).set_state(JoystickState {
            axes: [(3, 3000), (4, 32767)].into_iter().collect(),
            buttons: Default::default(),
        });
        script.tick(&mut bindings).unwrap();
        assert_eq!((bindings.mouse.x, bindings.mouse.y), (0, 20));
    }
}
