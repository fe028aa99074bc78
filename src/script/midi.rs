//! # MIDI Controller Mapping
//!
//! Knobs and sliders drive joystick axes, drum pads hold buttons and a few
//! pads fire keyboard shortcuts.
//!
//! | message        | output                  |
//! |----------------|-------------------------|
//! | CC 1, 2, 7, 10 | axes x, y, z, rx        |
//! | notes 36-41    | buttons a, b, x, y      |
//! | note 48        | Enter                   |
//! | note 50        | Esc                     |
//! | note 52        | Ctrl+S                  |
//!
//! Only a tick that follows a new message acts on it, so a held note never
//! repeats its shortcut. Note on with velocity 0 counts as note off.

use std::collections::HashMap;

use super::{Params, Script};
use crate::engine::Bindings;
use crate::error::{BridgeError, Result};
use crate::filters::FilterBank;
use crate::input::midi::{MidiMessage, STATUS_CONTROL, STATUS_NOTE_OFF, STATUS_NOTE_ON};
use crate::output::codes::{Axis, Button};

const CC_AXES: &[(u8, Axis)] = &[(1, Axis::X), (2, Axis::Y), (7, Axis::Z), (10, Axis::Rx)];

const NOTE_BUTTONS: &[(u8, Button)] = &[
    (36, Button::A),
    (38, Button::B),
    (40, Button::X),
    (41, Button::Y),
];

const NOTE_SHORTCUTS: &[(u8, &[&str])] = &[(48, &["enter"]), (50, &["esc"]), (52, &["lctrl", "s"])];

#[derive(Debug)]
pub struct MidiMapping {
    port: usize,
    notes: HashMap<u8, bool>,
}

pub(crate) fn build(params: &Params<'_>, bindings: &mut Bindings) -> Result<Box<dyn Script>> {
    let port = params.integer("device", 0)?;
    let port = usize::try_from(port)
        .map_err(|_| BridgeError::Script(format!("MIDI port index out of range: {}", port)))?;
    bindings.midi.port(port);
    Ok(Box::new(MidiMapping {
        port,
        notes: HashMap::new(),
    }))
}

impl MidiMapping {
    fn apply(&mut self, message: MidiMessage, ctx: &mut Bindings) -> Result<()> {
        match message.status {
            STATUS_CONTROL => {
                if let Some(&(_, axis)) = CC_AXES.iter().find(|(cc, _)| *cc == message.cc()) {
                    let value =
                        FilterBank::map_range(f64::from(message.value()), 0.0, 127.0, -1.0, 1.0);
                    ctx.vjoy.set_axis(axis, value);
                }
            }
            STATUS_NOTE_ON if message.velocity() > 0 => {
                self.notes.insert(message.note(), true);
                if let Some((_, keys)) = NOTE_SHORTCUTS.iter().find(|(n, _)| *n == message.note()) {
                    ctx.vjoy.key_chord(keys)?;
                }
            }
            STATUS_NOTE_ON | STATUS_NOTE_OFF => {
                self.notes.insert(message.note(), false);
            }
            _ => {}
        }
        Ok(())
    }
}

impl Script for MidiMapping {
    fn tick(&mut self, ctx: &mut Bindings) -> Result<()> {
        let port = ctx.midi.port(self.port);
        if port.is_fresh() {
            let message = *port.message();
            self.apply(message, ctx)?;
        }

        for &(note, button) in NOTE_BUTTONS {
            let held = self.notes.get(&note).copied().unwrap_or(false);
            ctx.vjoy.set_button(button, held);
        }
        Ok(())
    }
}
