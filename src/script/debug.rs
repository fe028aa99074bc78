//! Controller diagnostics: logs every button transition and axis movement
//! of one joystick, to find the codes a mapping should use.
//!
//! Small-range axes (hats, triggers) log every change. Sticks log zero
//! crossings and jumps of at least a tenth of the largest magnitude seen.

use std::collections::BTreeMap;

use tracing::info;

use super::{select_joystick, Params, Script};
use crate::engine::Bindings;
use crate::error::Result;
use crate::input::evdev::JoystickState;

/// Axes whose largest magnitude is below this log every change
const SMALL_RANGE: i32 = 500;

#[derive(Debug, Default)]
pub struct Monitor {
    device: Option<u32>,
    buttons: BTreeMap<u16, u8>,
    axes: BTreeMap<u16, i32>,
    peaks: BTreeMap<u16, i32>,
}

pub(crate) fn build(params: &Params<'_>, bindings: &mut Bindings) -> Result<Box<dyn Script>> {
    let device = select_joystick(params, bindings)?;
    if let Some(index) = device {
        info!("[debug] Watching joystick {}", index);
    }
    Ok(Box::new(Monitor {
        device,
        ..Monitor::default()
    }))
}

impl Monitor {
    /// Log lines for the changes in `state` since the previous call.
    fn observe(&mut self, state: &JoystickState) -> Vec<String> {
        let mut lines = Vec::new();

        for (&code, &value) in &state.buttons {
            if self.buttons.insert(code, value) != Some(value) {
                let label = if value != 0 { "pressed" } else { "released" };
                lines.push(format!("BTN  {:#05x} ({:3})  {}", code, code, label));
            }
        }

        for (&code, &value) in &state.axes {
            let Some(&prev) = self.axes.get(&code) else {
                // Baseline only
                self.axes.insert(code, value);
                self.peaks.insert(code, value.saturating_abs());
                continue;
            };
            if value == prev {
                continue;
            }

            let peak = self.peaks.entry(code).or_insert(0);
            *peak = (*peak).max(value.saturating_abs());
            let range = (*peak).max(1);

            let jump = (i64::from(value) - i64::from(prev)).abs();
            if value == 0 || prev == 0 || range < SMALL_RANGE || jump * 10 >= i64::from(range) {
                lines.push(format!("AXIS {:2}  value={}  range~{}", code, value, range));
                self.axes.insert(code, value);
            }
        }

        lines
    }
}

impl Script for Monitor {
    fn tick(&mut self, ctx: &mut Bindings) -> Result<()> {
        let Some(index) = self.device else {
            return Ok(());
        };
        let state = ctx.joystick.device(index).state().clone();
        for line in self.observe(&state) {
            info!("[debug] {}", line);
        }
        Ok(())
    }
}
