//! # Virtual Mouse Output
//!
//! Second uinput device, `pie-bridge-mouse`. `x`, `y` and `wheel` are
//! per-tick movements: written when non-zero and reset to 0 after every
//! tick. Buttons are levels written on change.

use async_trait::async_trait;
use evdev::RelativeAxisType;
use tracing::info;

use super::codes::{EventClass, MouseButton, MOUSE_AXES, MOUSE_BUTTONS};
use super::device::{Capabilities, VirtualOutputDevice};
use crate::engine::{DataSignal, Plugin};
use crate::error::Result;

/// Kernel device name
pub const DEVICE_NAME: &str = "pie-bridge-mouse";

fn button_code(button: MouseButton) -> u16 {
    MOUSE_BUTTONS
        .iter()
        .find(|(b, _)| *b == button)
        .map(|(_, key)| key.code())
        .unwrap_or_default()
}

/// Capabilities of the mouse device.
#[must_use]
pub fn capabilities() -> Capabilities {
    let mut caps = Capabilities::new();
    for axis in MOUSE_AXES {
        caps.declare(EventClass::Relative, axis.0);
    }
    for (_, key) in MOUSE_BUTTONS {
        caps.declare(EventClass::Key, key.code());
    }
    caps
}

/// Mouse output plugin
#[derive(Debug, Default)]
pub struct MouseOutput {
    /// Horizontal movement this tick, in pixels
    pub x: i32,
    /// Vertical movement this tick, in pixels
    pub y: i32,
    /// Wheel clicks this tick
    pub wheel: i32,
    pub left: bool,
    pub right: bool,
    pub middle: bool,
    device: Option<VirtualOutputDevice>,
}

impl MouseOutput {
    /// Creates an output without a kernel device.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn with_device(device: VirtualOutputDevice) -> Self {
        Self {
            device: Some(device),
            ..Self::default()
        }
    }

    /// Whether the kernel device exists.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.device.as_ref().is_some_and(VirtualOutputDevice::is_active)
    }

    fn flush(&mut self) -> Result<()> {
        let moves = [
            (RelativeAxisType::REL_X, std::mem::take(&mut self.x)),
            (RelativeAxisType::REL_Y, std::mem::take(&mut self.y)),
            (RelativeAxisType::REL_WHEEL, std::mem::take(&mut self.wheel)),
        ];
        let Some(device) = self.device.as_mut() else {
            return Ok(());
        };

        for (axis, value) in moves {
            device.write_relative(axis.0, value)?;
        }

        for (button, pressed) in [
            (MouseButton::Left, self.left),
            (MouseButton::Right, self.right),
            (MouseButton::Middle, self.middle),
        ] {
            device.write_discrete(EventClass::Key, button_code(button), i32::from(pressed))?;
        }

        device.sync()?;
        Ok(())
    }
}

#[async_trait]
impl Plugin for MouseOutput {
    fn name(&self) -> &'static str {
        "mouse"
    }

    async fn start(&mut self, _signal: DataSignal) -> Result<()> {
        if self.device.is_none() {
            self.device = Some(VirtualOutputDevice::create(DEVICE_NAME, capabilities(), &[])?);
            info!("[mouse] Mouse device ready");
        }
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.destroy();
        }
    }

    fn after_tick(&mut self) -> Result<()> {
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::codes::{EV_KEY, EV_REL};
    use crate::output::device::MockEventSink;
    use evdev::Key;

    fn output(sink: MockEventSink) -> MouseOutput {
        let device =
            VirtualOutputDevice::with_sink(DEVICE_NAME, capabilities(), Box::new(sink)).unwrap();
        MouseOutput::with_device(device)
    }

    #[test]
    fn test_capabilities() {
        let caps = capabilities();
        assert_eq!(caps.len(), 6);
        assert!(caps.contains(EventClass::Relative, RelativeAxisType::REL_WHEEL.0));
        assert!(caps.contains(EventClass::Key, Key::BTN_MIDDLE.code()));
    }

    #[test]
    fn test_relative_fields_reset_every_tick() {
        let mut sink = MockEventSink::new();
        sink.expect_write_event()
            .withf(|e| e.kind == EV_REL && e.code == RelativeAxisType::REL_X.0 && e.value == 15)
            .times(2)
            .returning(|_| Ok(()));
        sink.expect_write_event()
            .withf(|e| e.kind == EV_REL && e.code == RelativeAxisType::REL_WHEEL.0 && e.value == -3)
            .times(1)
            .returning(|_| Ok(()));
        sink.expect_sync().times(2).returning(|| Ok(()));

        let mut mouse = output(sink);
        mouse.x = 15;
        mouse.wheel = -3;
        mouse.after_tick().unwrap();
        assert_eq!((mouse.x, mouse.y, mouse.wheel), (0, 0, 0));

        // Nothing set: no writes, no sync
        mouse.after_tick().unwrap();

        // Same movement again is emitted again
        mouse.x = 15;
        mouse.after_tick().unwrap();
    }

    #[test]
    fn test_buttons_written_on_change() {
        let mut sink = MockEventSink::new();
        sink.expect_write_event()
            .withf(|e| e.kind == EV_KEY && e.code == Key::BTN_LEFT.code())
            .times(2)
            .returning(|_| Ok(()));
        sink.expect_sync().times(2).returning(|| Ok(()));

        let mut mouse = output(sink);
        mouse.left = true;
        mouse.after_tick().unwrap();
        mouse.after_tick().unwrap();
        mouse.left = false;
        mouse.after_tick().unwrap();
    }

    #[test]
    fn test_inert_mouse_still_resets() {
        let mut mouse = MouseOutput::new();
        mouse.y = 7;
        mouse.after_tick().unwrap();
        assert_eq!(mouse.y, 0);
        assert!(!mouse.is_active());
    }
}
