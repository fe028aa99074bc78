//! # Gamepad Pass-through
//!
//! Mirrors a physical controller onto the virtual joystick. Sticks get a
//! dead zone and a response curve, triggers span the full axis and the
//! d-pad goes to the hat axes or to d-pad buttons.
//!
//! | param      | default             | meaning                              |
//! |------------|---------------------|--------------------------------------|
//! | `device`   | discovery           | `eventN` index                       |
//! | `find`     | built-in keywords   | discovery keyword                    |
//! | `curve`    | `linear`            | `linear`, `quadratic`, `cubic`, `expo`, `smoothstep` |
//! | `deadband` | 0.05, 0.08 curved   | stick dead zone                      |
//! | `expo`     | 0.6                 | cubic share of the `expo` curve      |
//! | `dpad`     | `hat`               | `hat` or `buttons`                   |

use super::{select_joystick, stick, trigger, Params, Script};
use crate::engine::Bindings;
use crate::error::{BridgeError, Result};
use crate::filters::FilterBank;
use crate::output::codes::{Axis, Button};

/// Controller button codes and their virtual counterparts
pub(crate) const BUTTON_MAP: &[(u16, Button)] = &[
    (0x130, Button::A),
    (0x131, Button::B),
    (0x133, Button::X),
    (0x134, Button::Y),
    (0x136, Button::Tl),
    (0x137, Button::Tr),
    (0x13a, Button::Select),
    (0x13b, Button::Start),
    (0x13c, Button::Mode),
    (0x13d, Button::ThumbL),
    (0x13e, Button::ThumbR),
];

/// Stick codes
pub(crate) const STICKS: &[(u16, Axis)] = &[(0, Axis::X), (1, Axis::Y), (3, Axis::Rx), (4, Axis::Ry)];

/// Trigger codes
pub(crate) const TRIGGERS: &[(u16, Axis)] = &[(2, Axis::Z), (5, Axis::Rz)];

pub(crate) const HAT_X: u16 = 16;
pub(crate) const HAT_Y: u16 = 17;

const DEFAULT_DEADBAND: f64 = 0.05;
const DEFAULT_CURVED_DEADBAND: f64 = 0.08;
const DEFAULT_EXPO: f64 = 0.6;

/// Stick response curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Curve {
    Linear,
    Quadratic,
    Cubic,
    /// Blend of cubic and linear; the value is the cubic share
    Expo(f64),
    Smoothstep,
}

impl Curve {
    /// Parses a curve name.
    ///
    /// # Errors
    ///
    /// Returns `Script` for an unknown name.
    pub fn from_name(name: &str, expo: f64) -> Result<Self> {
        match name {
            "linear" => Ok(Curve::Linear),
            "quadratic" => Ok(Curve::Quadratic),
            "cubic" => Ok(Curve::Cubic),
            "expo" => Ok(Curve::Expo(expo.clamp(0.0, 1.0))),
            "smoothstep" => Ok(Curve::Smoothstep),
            other => Err(BridgeError::Script(format!("unknown curve '{}'", other))),
        }
    }

    /// Applies the curve to a value in `[-1, 1]`, keeping its sign.
    #[must_use]
    pub fn apply(self, x: f64) -> f64 {
        let s = if x < 0.0 { -1.0 } else { 1.0 };
        let a = x.abs();
        match self {
            Curve::Linear => x,
            Curve::Quadratic => s * a * a,
            Curve::Cubic => x * x * x,
            Curve::Expo(k) => s * (k * a * a * a + (1.0 - k) * a),
            Curve::Smoothstep => s * a * a * (3.0 - 2.0 * a),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dpad {
    Hat,
    Buttons,
}

#[derive(Debug)]
pub struct Gamepad {
    device: Option<u32>,
    curve: Curve,
    deadband: f64,
    dpad: Dpad,
}

pub(crate) fn build(params: &Params<'_>, bindings: &mut Bindings) -> Result<Box<dyn Script>> {
    let curve = Curve::from_name(
        params.string("curve", "linear")?,
        params.float("expo", DEFAULT_EXPO)?,
    )?;
    let default_deadband = if curve == Curve::Linear {
        DEFAULT_DEADBAND
    } else {
        DEFAULT_CURVED_DEADBAND
    };
    let dpad = match params.string("dpad", "hat")? {
        "hat" => Dpad::Hat,
        "buttons" => Dpad::Buttons,
        other => return Err(BridgeError::Script(format!("unknown dpad mode '{}'", other))),
    };

    Ok(Box::new(Gamepad {
        device: select_joystick(params, bindings)?,
        curve,
        deadband: params.float("deadband", default_deadband)?,
        dpad,
    }))
}

impl Script for Gamepad {
    fn tick(&mut self, ctx: &mut Bindings) -> Result<()> {
        let Some(index) = self.device else {
            return Ok(());
        };
        let pad = ctx.joystick.device(index);

        for &(code, axis) in STICKS {
            let value = FilterBank::deadband(stick(pad, code), self.deadband);
            ctx.vjoy.set_axis(axis, self.curve.apply(value));
        }
        for &(code, axis) in TRIGGERS {
            ctx.vjoy.set_axis(axis, trigger(pad, code));
        }
        for &(code, button) in BUTTON_MAP {
            ctx.vjoy.set_button(button, pad.button(code));
        }

        let hat_x = pad.axis(HAT_X);
        let hat_y = pad.axis(HAT_Y);
        match self.dpad {
            Dpad::Hat => {
                ctx.vjoy.set_axis(Axis::Hat0x, f64::from(hat_x));
                ctx.vjoy.set_axis(Axis::Hat0y, f64::from(hat_y));
            }
            Dpad::Buttons => {
                ctx.vjoy.set_button(Button::DpadLeft, hat_x < 0);
                ctx.vjoy.set_button(Button::DpadRight, hat_x > 0);
                ctx.vjoy.set_button(Button::DpadUp, hat_y < 0);
                ctx.vjoy.set_button(Button::DpadDown, hat_y > 0);
            }
        }
        Ok(())
    }
}
