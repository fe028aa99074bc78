//! # Descent Mapping
//!
//! PS3 controller to virtual joystick and keyboard for Descent-style six
//! degree of freedom shooters.
//!
//! - Sticks drive x/y/z/rx with a squared response; Y axes are inverted.
//! - L1/L2 analog drive `ry` as a throttle; both held together press
//!   `tl2` (slide) and leave only L2 on `ry`.
//! - PS, Start and Select are shift buttons. Held with another button they
//!   send a key from their layer instead of its normal action. Tapped
//!   alone, PS sends Esc and Select toggles the vulcan cannon.
//! - Pressing PS, Start and Select together recentres the sticks.

use std::collections::BTreeMap;

use tracing::{debug, info};

use super::{Params, Script};
use crate::engine::Bindings;
use crate::error::Result;
use crate::input::ps3::Ps3Transport;
use crate::output::codes::{Axis, Button};

const BUTTONS: &[(&str, Button)] = &[
    ("r1", Button::A),
    ("r2", Button::B),
    ("leftStickButton", Button::X),
    ("rightStickButton", Button::Y),
    ("circle", Button::Tl),
    ("triangle", Button::Tr),
];

const KEYS: &[(&str, &str)] = &[
    ("up", "up"),
    ("down", "down"),
    ("left", "left"),
    ("right", "right"),
    ("cross", "enter"),
    ("square", "space"),
];

type Layer = &'static [(&'static str, &'static [&'static str])];

/// Shift buttons and their layers. Several keys in one entry form a chord.
const SHIFT_LAYERS: &[(&str, Layer)] = &[
    (
        "ps",
        &[
            ("cross", &["ralt", "f2"]),
            ("circle", &["ralt", "f3"]),
            ("square", &["f2"]),
            ("triangle", &["tab"]),
            ("up", &["pageUp"]),
            ("down", &["pageDown"]),
            ("left", &["home"]),
            ("right", &["end"]),
        ],
    ),
    (
        "start",
        &[
            ("down", &["one"]),
            ("left", &["two"]),
            ("up", &["three"]),
            ("right", &["four"]),
            ("select", &["five"]),
        ],
    ),
    (
        "select",
        &[
            ("cross", &["six"]),
            ("circle", &["seven"]),
            ("triangle", &["eight"]),
            ("square", &["nine"]),
            ("start", &["zero"]),
        ],
    ),
];

/// Virtual axis, source value, direction
const AXES: &[(Axis, &str, f64)] = &[
    (Axis::X, "leftStickX", 1.0),
    (Axis::Y, "leftStickY", -1.0),
    (Axis::Z, "rightStickX", 1.0),
    (Axis::Rx, "rightStickY", -1.0),
];

const VULCAN: &str = "two";

#[derive(Debug, Clone, Copy, PartialEq)]
struct Calibration {
    center: f64,
    factor: f64,
}

#[derive(Debug)]
pub struct Descent {
    previous: BTreeMap<&'static str, bool>,
    calibration: [Calibration; 4],
    shift: Option<&'static str>,
    shift_used: bool,
    vulcan: bool,
    weapon: &'static str,
}

pub(crate) fn build(_params: &Params<'_>, _bindings: &mut Bindings) -> Result<Box<dyn Script>> {
    Ok(Box::new(Descent::new()))
}

/// Every button whose edges are tracked.
fn tracked() -> impl Iterator<Item = &'static str> {
    let layers = SHIFT_LAYERS
        .iter()
        .flat_map(|(shift, layer)| std::iter::once(*shift).chain(layer.iter().map(|(b, _)| *b)));
    BUTTONS
        .iter()
        .map(|(b, _)| *b)
        .chain(KEYS.iter().map(|(b, _)| *b))
        .chain(layers)
}

impl Descent {
    fn new() -> Self {
        let mut calibration = [Calibration {
            center: 0.0,
            factor: 1.0,
        }; 4];
        for (slot, (_, _, direction)) in calibration.iter_mut().zip(AXES) {
            slot.factor = *direction;
        }
        Self {
            previous: tracked().map(|b| (b, false)).collect(),
            calibration,
            shift: None,
            shift_used: false,
            vulcan: false,
            weapon: "one",
        }
    }

    fn was(&self, button: &str) -> bool {
        self.previous.get(button).copied().unwrap_or(false)
    }

    fn rising(&self, ps3: &Ps3Transport, button: &str) -> bool {
        !self.was(button) && ps3.pressed(button)
    }

    fn calibrate(&mut self, ps3: &Ps3Transport) {
        info!("[descent] Calibrating");
        for (slot, &(axis, source, direction)) in self.calibration.iter_mut().zip(AXES) {
            let center = ps3.get(source);
            if center.abs() >= 1.0 {
                continue;
            }
            *slot = Calibration {
                center,
                factor: direction / (1.0 - center.abs()),
            };
            info!(
                "[descent] Axis {}: center {:.3}, factor {:.3}",
                axis.name(),
                slot.center,
                slot.factor
            );
        }
    }

    fn send(ctx: &mut Bindings, keys: &[&str]) -> Result<()> {
        match keys {
            [key] => ctx.vjoy.key_press(key),
            chord => ctx.vjoy.key_chord(chord),
        }
    }

    fn shift_release(&mut self, shift: &str, ctx: &mut Bindings) -> Result<()> {
        match shift {
            "ps" => Self::send(ctx, &["esc"])?,
            "select" => {
                let weapon = if self.vulcan { self.weapon } else { VULCAN };
                Self::send(ctx, &[weapon])?;
                self.vulcan = !self.vulcan;
            }
            _ => {}
        }
        Ok(())
    }

    fn shift_press(&mut self, keys: &'static [&'static str], ctx: &mut Bindings) -> Result<()> {
        Self::send(ctx, keys)?;
        match keys {
            ["one" | "three" | "four" | "five"] => {
                self.weapon = keys[0];
                self.vulcan = false;
            }
            [VULCAN] => self.vulcan = true,
            _ => {}
        }
        Ok(())
    }
}

impl Script for Descent {
    fn tick(&mut self, ctx: &mut Bindings) -> Result<()> {
        let combo = ["ps", "start", "select"];
        if combo.iter().all(|b| ctx.ps3.pressed(b)) && !combo.iter().all(|b| self.was(b)) {
            self.calibrate(&ctx.ps3);
            self.shift_used = true;
        }

        for (slot, &(axis, source, _)) in self.calibration.iter().zip(AXES) {
            let value = ((ctx.ps3.get(source) - slot.center) * slot.factor).clamp(-1.0, 1.0);
            ctx.vjoy.set_axis(axis, value * value.abs());
        }

        let l2 = ctx.ps3.get("l2Analog");
        if ctx.ps3.pressed("l1") && ctx.ps3.pressed("l2") {
            ctx.vjoy.set_button(Button::Tl2, true);
            ctx.vjoy.set_axis(Axis::Ry, -l2);
        } else {
            ctx.vjoy.set_button(Button::Tl2, false);
            ctx.vjoy.set_axis(Axis::Ry, ctx.ps3.get("l1Analog") - l2);
        }

        match self.shift {
            None => {
                // Last newly pressed shift button wins
                for &(shift, _) in SHIFT_LAYERS {
                    if self.rising(&ctx.ps3, shift) {
                        self.shift = Some(shift);
                        debug!("[descent] Shift: {}", shift);
                    }
                }
            }
            Some(shift) if !ctx.ps3.pressed(shift) => {
                if !self.shift_used {
                    self.shift_release(shift, ctx)?;
                }
                self.shift = None;
                self.shift_used = false;
                debug!("[descent] No shift");
            }
            Some(shift) => {
                let layer = SHIFT_LAYERS
                    .iter()
                    .find(|(s, _)| *s == shift)
                    .map(|(_, layer)| *layer)
                    .unwrap_or_default();
                for &(button, keys) in layer {
                    if self.rising(&ctx.ps3, button) {
                        self.shift_used = true;
                        self.shift_press(keys, ctx)?;
                    }
                }
            }
        }

        for &(name, button) in BUTTONS {
            if self.rising(&ctx.ps3, name) {
                if self.shift.is_none() {
                    ctx.vjoy.set_button(button, true);
                }
            } else if self.was(name) && !ctx.ps3.pressed(name) {
                ctx.vjoy.set_button(button, false);
            }
        }

        for &(name, key) in KEYS {
            if self.rising(&ctx.ps3, name) {
                if self.shift.is_none() {
                    ctx.vjoy.set_key(key, true)?;
                }
            } else if self.was(name) && !ctx.ps3.pressed(name) {
                ctx.vjoy.set_key(key, false)?;
            }
        }

        for (name, level) in self.previous.iter_mut() {
            *level = ctx.ps3.pressed(name);
        }
        Ok(())
    }
}
