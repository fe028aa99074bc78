//! # Virtual Joystick and Keyboard Output
//!
//! One uinput device named `pie-bridge` carrying gamepad buttons, keyboard
//! keys and eight absolute axes. Scripts set:
//!
//! - axes in `[-1, 1]`, scaled to the device range `[0, 1000]` (centre 500).
//!   Hats are declared `[-1, 1]` and passed through rounded.
//! - buttons and sustained keyboard keys as levels.
//! - one-shot key strokes and chords, drained after every tick.
//!
//! After each tick the plugin writes strokes first, then sustained keys,
//! axes and buttons, and closes the frame with one sync. Only changed
//! values reach the kernel. A stroke that fails is logged and skipped.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{info, warn};

use super::codes::{keyboard_key, Axis, Button, EventClass, AXES, BUTTONS, KEYBOARD_KEYS};
use super::device::{AxisRange, Capabilities, VirtualOutputDevice};
use crate::engine::{DataSignal, Plugin};
use crate::error::{BridgeError, Result};

/// Kernel device name
pub const DEVICE_NAME: &str = "pie-bridge";

/// Native range of sticks and triggers
pub const AXIS_MIN: i32 = 0;
pub const AXIS_MAX: i32 = 1000;

/// Native range of hats
pub const HAT_MIN: i32 = -1;
pub const HAT_MAX: i32 = 1;

fn key_code(name: &str) -> Result<u16> {
    keyboard_key(name)
        .map(|key| key.code())
        .ok_or_else(|| BridgeError::Script(format!("unknown keyboard key '{}'", name)))
}

/// Maps a script value to the axis' native range.
///
/// # Examples
///
/// ```
/// use pie_bridge::output::codes::Axis;
/// use pie_bridge::output::vjoy::scale_axis;
///
/// assert_eq!(scale_axis(Axis::X, 0.0), 500);
/// assert_eq!(scale_axis(Axis::X, -1.0), 0);
/// assert_eq!(scale_axis(Axis::Rz, 2.0), 1000);
/// assert_eq!(scale_axis(Axis::Hat0x, -0.7), -1);
/// ```
#[must_use]
pub fn scale_axis(axis: Axis, value: f64) -> i32 {
    if !value.is_finite() {
        return if axis.is_hat() { 0 } else { 500 };
    }
    let value = value.clamp(-1.0, 1.0);
    if axis.is_hat() {
        value.round() as i32
    } else {
        (value * 500.0 + 500.0).round() as i32
    }
}

/// Capabilities of the joystick device.
#[must_use]
pub fn capabilities() -> Capabilities {
    let mut caps = Capabilities::new();
    for (_, _, key) in BUTTONS {
        caps.declare(EventClass::Key, key.code());
    }
    for (_, key) in KEYBOARD_KEYS {
        caps.declare(EventClass::Key, key.code());
    }
    for (_, _, abs) in AXES {
        caps.declare(EventClass::Absolute, abs.0);
    }
    caps
}

/// Native ranges of the joystick axes.
#[must_use]
pub fn axis_ranges() -> Vec<AxisRange> {
    AXES.iter()
        .map(|(axis, _, abs)| {
            if axis.is_hat() {
                AxisRange::new(abs.0, HAT_MIN, HAT_MAX)
            } else {
                AxisRange::new(abs.0, AXIS_MIN, AXIS_MAX)
            }
        })
        .collect()
}

/// Joystick and keyboard output plugin
#[derive(Debug, Default)]
pub struct VjoyOutput {
    axes: BTreeMap<Axis, f64>,
    buttons: BTreeMap<Button, bool>,
    keyboard: BTreeMap<u16, bool>,
    strokes: Vec<Vec<u16>>,
    device: Option<VirtualOutputDevice>,
}

impl VjoyOutput {
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

    /// Sets an axis, normalized to `[-1, 1]`.
    pub fn set_axis(&mut self, axis: Axis, value: f64) {
        self.axes.insert(axis, value);
    }

    /// Last value set for an axis, 0 if never set.
    #[must_use]
    pub fn axis(&self, axis: Axis) -> f64 {
        self.axes.get(&axis).copied().unwrap_or(0.0)
    }

    /// Sets a button level.
    pub fn set_button(&mut self, button: Button, pressed: bool) {
        self.buttons.insert(button, pressed);
    }

    /// Last level set for a button.
    #[must_use]
    pub fn button(&self, button: Button) -> bool {
        self.buttons.get(&button).copied().unwrap_or(false)
    }

    /// Holds or releases a keyboard key.
    ///
    /// # Errors
    ///
    /// Returns `Script` for a key name the device does not declare.
    pub fn set_key(&mut self, name: &str, pressed: bool) -> Result<()> {
        self.keyboard.insert(key_code(name)?, pressed);
        Ok(())
    }

    /// Queues a press and release of one key.
    ///
    /// # Errors
    ///
    /// Returns `Script` for an unknown key name.
    pub fn key_press(&mut self, name: &str) -> Result<()> {
        self.strokes.push(vec![key_code(name)?]);
        Ok(())
    }

    /// Queues a chord: every key pressed in order, then all released.
    ///
    /// # Errors
    ///
    /// Returns `Script` if any key name is unknown; nothing is queued then.
    pub fn key_chord(&mut self, names: &[&str]) -> Result<()> {
        let codes = names.iter().map(|n| key_code(n)).collect::<Result<Vec<_>>>()?;
        self.strokes.push(codes);
        Ok(())
    }

    /// Strokes queued during the current tick.
    #[must_use]
    pub fn pending_strokes(&self) -> usize {
        self.strokes.len()
    }

    /// Whether the kernel device exists.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.device.as_ref().is_some_and(VirtualOutputDevice::is_active)
    }

    fn flush(&mut self) -> Result<()> {
        let strokes = std::mem::take(&mut self.strokes);
        let Some(device) = self.device.as_mut() else {
            return Ok(());
        };

        for codes in &strokes {
            if let Err(e) = device.write_stroke(codes) {
                warn!("[vjoy] Dropped key stroke {:?}: {}", codes, e);
            }
        }

        for (&code, &pressed) in &self.keyboard {
            device.write_discrete(EventClass::Key, code, i32::from(pressed))?;
        }

        for (&axis, &value) in &self.axes {
            device.write_discrete(EventClass::Absolute, axis.code(), scale_axis(axis, value))?;
        }

        for (&button, &pressed) in &self.buttons {
            device.write_discrete(EventClass::Key, button.code(), i32::from(pressed))?;
        }

        device.sync()?;
        Ok(())
    }
}

#[async_trait]
impl Plugin for VjoyOutput {
    fn name(&self) -> &'static str {
        "vjoy"
    }

    async fn start(&mut self, _signal: DataSignal) -> Result<()> {
        if self.device.is_none() {
            let device = VirtualOutputDevice::create(DEVICE_NAME, capabilities(), &axis_ranges())?;
            info!("[vjoy] Joystick and keyboard device ready");
            self.device = Some(device);
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
    use crate::input::event::RawEvent;
    use crate::output::codes::{EV_ABS, EV_KEY};
    use crate::output::device::MockEventSink;
    use evdev::Key;
    use mockall::predicate::eq;

    fn output(sink: MockEventSink) -> VjoyOutput {
        let device =
            VirtualOutputDevice::with_sink(DEVICE_NAME, capabilities(), Box::new(sink)).unwrap();
        VjoyOutput::with_device(device)
    }

    #[test]
    fn test_capabilities_cover_tables() {
        let caps = capabilities();
        assert_eq!(caps.len(), BUTTONS.len() + KEYBOARD_KEYS.len() + AXES.len());
        assert!(caps.contains(EventClass::Key, Key::BTN_SOUTH.code()));
        assert!(caps.contains(EventClass::Key, Key::KEY_PAGEUP.code()));
        assert_eq!(axis_ranges().len(), AXES.len());
    }

    #[test]
    fn test_axis_scaling() {
        assert_eq!(scale_axis(Axis::Y, 1.0), 1000);
        assert_eq!(scale_axis(Axis::Y, 0.5), 750);
        assert_eq!(scale_axis(Axis::Y, -3.0), 0);
        assert_eq!(scale_axis(Axis::Y, f64::NAN), 500);
        assert_eq!(scale_axis(Axis::Hat0y, 1.0), 1);
        assert_eq!(scale_axis(Axis::Hat0y, 0.2), 0);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let mut vjoy = VjoyOutput::new();
        assert!(vjoy.set_key("escape", true).is_err());
        assert!(vjoy.key_chord(&["lctrl", "ctrl"]).is_err());
        assert_eq!(vjoy.pending_strokes(), 0);
        vjoy.key_chord(&["lctrl", "s"]).unwrap();
        assert_eq!(vjoy.pending_strokes(), 1);
    }

    #[test]
    fn test_after_tick_writes_changes_once() {
        let mut sink = MockEventSink::new();
        sink.expect_write_event()
            .with(eq(RawEvent::new(EventClass::Absolute, Axis::X.code(), 750)))
            .times(1)
            .returning(|_| Ok(()));
        sink.expect_write_event()
            .with(eq(RawEvent::new(EventClass::Key, Button::A.code(), 1)))
            .times(1)
            .returning(|_| Ok(()));
        sink.expect_sync().times(1).returning(|| Ok(()));

        let mut vjoy = output(sink);
        vjoy.set_axis(Axis::X, 0.5);
        vjoy.set_button(Button::A, true);
        vjoy.after_tick().unwrap();

        // Unchanged state writes nothing and skips the sync
        vjoy.after_tick().unwrap();
    }

    #[test]
    fn test_strokes_drained_before_sustained_keys() {
        let enter = Key::KEY_ENTER.code();
        let mut sink = MockEventSink::new();
        let mut seq = mockall::Sequence::new();
        sink.expect_write_event()
            .withf(move |e| e.kind == EV_KEY && e.code == enter && e.value == 1)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        sink.expect_write_event()
            .withf(move |e| e.kind == EV_KEY && e.code == enter && e.value == 0)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        sink.expect_sync().times(1).in_sequence(&mut seq).returning(|| Ok(()));
        sink.expect_write_event()
            .withf(|e| e.kind == EV_KEY && e.code == Key::KEY_SPACE.code() && e.value == 1)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        sink.expect_sync().times(1).in_sequence(&mut seq).returning(|| Ok(()));

        let mut vjoy = output(sink);
        vjoy.key_press("enter").unwrap();
        vjoy.set_key("space", true).unwrap();
        vjoy.after_tick().unwrap();
        assert_eq!(vjoy.pending_strokes(), 0);
    }

    #[test]
    fn test_failed_stroke_does_not_block_the_tick() {
        let mut sink = MockEventSink::new();
        let mut seq = mockall::Sequence::new();
        sink.expect_write_event()
            .withf(|e| e.code == Key::KEY_ESC.code())
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        sink.expect_sync()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(std::io::Error::new(std::io::ErrorKind::Other, "gone")));
        sink.expect_write_event()
            .withf(|e| e.code == Key::KEY_ENTER.code())
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        sink.expect_sync().times(1).in_sequence(&mut seq).returning(|| Ok(()));
        sink.expect_write_event()
            .with(eq(RawEvent::new(EventClass::Key, Button::A.code(), 1)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        sink.expect_sync().times(1).in_sequence(&mut seq).returning(|| Ok(()));

        let mut vjoy = output(sink);
        vjoy.key_press("esc").unwrap();
        vjoy.key_press("enter").unwrap();
        vjoy.set_button(Button::A, true);
        vjoy.after_tick().unwrap();
        assert_eq!(vjoy.pending_strokes(), 0);
    }

    #[test]
    fn test_hat_passthrough() {
        let mut sink = MockEventSink::new();
        sink.expect_write_event()
            .withf(|e| e.kind == EV_ABS && e.code == Axis::Hat0x.code() && e.value == -1)
            .times(1)
            .returning(|_| Ok(()));
        sink.expect_sync().times(1).returning(|| Ok(()));

        let mut vjoy = output(sink);
        vjoy.set_axis(Axis::Hat0x, -1.0);
        vjoy.after_tick().unwrap();
    }

    #[test]
    fn test_inert_output_drops_strokes() {
        let mut vjoy = VjoyOutput::new();
        vjoy.key_press("esc").unwrap();
        vjoy.set_axis(Axis::Z, 1.0);
        vjoy.after_tick().unwrap();
        assert_eq!(vjoy.pending_strokes(), 0);
        assert!(!vjoy.is_active());
        assert_eq!(vjoy.axis(Axis::Z), 1.0);
    }

    #[tokio::test]
    async fn test_stop_destroys_device() {
        let mut sink = MockEventSink::new();
        sink.expect_write_event().times(0);
        let mut vjoy = output(sink);
        assert!(vjoy.is_active());
        vjoy.stop().await;
        vjoy.stop().await;
        assert!(!vjoy.is_active());
    }
}
