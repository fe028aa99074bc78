//! Pass-through with auto-fire: while A or B is held the virtual button
//! toggles at `hz` (default 10), on for the first half of each period.
//! Other buttons and all axes pass through unchanged.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::gamepad::{BUTTON_MAP, HAT_X, HAT_Y, STICKS, TRIGGERS};
use super::{select_joystick, stick, trigger, Params, Script};
use crate::engine::Bindings;
use crate::error::{BridgeError, Result};
use crate::output::codes::{Axis, Button};

const DEFAULT_HZ: f64 = 10.0;
const TURBO_BUTTONS: [Button; 2] = [Button::A, Button::B];

#[derive(Debug)]
pub struct Turbo {
    device: Option<u32>,
    period: Duration,
    held_since: HashMap<Button, Instant>,
}

pub(crate) fn build(params: &Params<'_>, bindings: &mut Bindings) -> Result<Box<dyn Script>> {
    let hz = params.float("hz", DEFAULT_HZ)?;
    if !(hz > 0.0 && hz <= 100.0) {
        return Err(BridgeError::Script(format!("turbo hz must be in (0, 100], got {}", hz)));
    }
    Ok(Box::new(Turbo {
        device: select_joystick(params, bindings)?,
        period: Duration::from_secs_f64(1.0 / hz),
        held_since: HashMap::new(),
    }))
}

impl Turbo {
    /// Whether a turbo button held since `since` is in its on phase.
    fn phase_on(&self, since: Instant, now: Instant) -> bool {
        let elapsed = now.duration_since(since).as_secs_f64();
        let period = self.period.as_secs_f64();
        (elapsed % period) / period < 0.5
    }

    fn tick_at(&mut self, ctx: &mut Bindings, now: Instant) {
        let Some(index) = self.device else {
            return;
        };
        let pad = ctx.joystick.device(index);

        for &(code, button) in BUTTON_MAP {
            if !pad.button(code) {
                ctx.vjoy.set_button(button, false);
                self.held_since.remove(&button);
                continue;
            }
            if TURBO_BUTTONS.contains(&button) {
                let since = *self.held_since.entry(button).or_insert(now);
                ctx.vjoy.set_button(button, self.phase_on(since, now));
            } else {
                ctx.vjoy.set_button(button, true);
            }
        }

        for &(code, axis) in STICKS {
            ctx.vjoy.set_axis(axis, stick(pad, code));
        }
        for &(code, axis) in TRIGGERS {
            ctx.vjoy.set_axis(axis, trigger(pad, code));
        }
        ctx.vjoy.set_axis(Axis::Hat0x, f64::from(pad.axis(HAT_X)));
        ctx.vjoy.set_axis(Axis::Hat0y, f64::from(pad.axis(HAT_Y)));
    }
}

impl Script for Turbo {
    fn tick(&mut self, ctx: &mut Bindings) -> Result<()> {
        self.tick_at(ctx, Instant::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;
    use crate::input::evdev::JoystickState;

    fn setup() -> (Bindings, Turbo) {
        let profile = Profile::from_toml("script = \"turbo\"\n[params]\ndevice = 0").unwrap();
        let bindings = Bindings::from_profile(&profile, &[]);
        let turbo = Turbo {
            device: Some(0),
            period: Duration::from_millis(100),
            held_since: HashMap::new(),
        };
        (bindings, turbo)
    }

    fn hold(bindings: &mut Bindings, buttons: &[u16]) {
        bindings.joystick.device(0).set_state(JoystickState {
            axes: [(0, 32767)].into_iter().collect(),
            buttons: buttons.iter().map(|&code| (code, 1)).collect(),
        });
    }

    #[test]
    fn test_turbo_toggles_at_rate() {
        let (mut bindings, mut turbo) = setup();
        let start = Instant::now();
        hold(&mut bindings, &[0x130, 0x134]);

        let at = |ms| start + Duration::from_millis(ms);
        let mut samples = Vec::new();
        for ms in [0, 20, 60, 90, 110, 160] {
            turbo.tick_at(&mut bindings, at(ms));
            samples.push(bindings.vjoy.button(Button::A));
            // Non-turbo button stays held
            assert!(bindings.vjoy.button(Button::Y));
        }
        assert_eq!(samples, vec![true, true, false, false, true, false]);
        assert_eq!(bindings.vjoy.axis(Axis::X), 1.0);
    }

    #[test]
    fn test_release_restarts_phase() {
        let (mut bindings, mut turbo) = setup();
        let start = Instant::now();

        hold(&mut bindings, &[0x131]);
        turbo.tick_at(&mut bindings, start);
        turbo.tick_at(&mut bindings, start + Duration::from_millis(70));
        assert!(!bindings.vjoy.button(Button::B));

        hold(&mut bindings, &[]);
        turbo.tick_at(&mut bindings, start + Duration::from_millis(80));
        assert!(!bindings.vjoy.button(Button::B));

        // Pressed again: on phase starts over
        hold(&mut bindings, &[0x131]);
        turbo.tick_at(&mut bindings, start + Duration::from_millis(170));
        assert!(bindings.vjoy.button(Button::B));
    }

    #[test]
    fn test_invalid_rate_rejected() {
        let profile = Profile::from_toml("script = \"turbo\"\n[params]\ndevice = 0\nhz = 0").unwrap();
        let mut bindings = Bindings::from_profile(&profile, &[]);
        assert!(build(&Params::new(&profile.params), &mut bindings).is_err());
    }
}
