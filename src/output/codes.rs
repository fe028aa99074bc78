//! # Capability Tables
//!
//! Static (name, code) tables for everything the virtual devices declare.
//! Names are the ones scripts and profiles use; codes come from
//! `linux/input-event-codes.h` through the `evdev` crate.

use evdev::{AbsoluteAxisType, Key, RelativeAxisType};

/// Event class of a kernel input event (`EV_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventClass {
    /// EV_SYN
    Sync,
    /// EV_KEY
    Key,
    /// EV_REL
    Relative,
    /// EV_ABS
    Absolute,
}

/// EV_SYN
pub const EV_SYN: u16 = 0x00;
/// EV_KEY
pub const EV_KEY: u16 = 0x01;
/// EV_REL
pub const EV_REL: u16 = 0x02;
/// EV_ABS
pub const EV_ABS: u16 = 0x03;
/// SYN_REPORT
pub const SYN_REPORT: u16 = 0;

impl EventClass {
    /// Raw `EV_*` type value.
    #[must_use]
    pub fn raw(self) -> u16 {
        match self {
            EventClass::Sync => EV_SYN,
            EventClass::Key => EV_KEY,
            EventClass::Relative => EV_REL,
            EventClass::Absolute => EV_ABS,
        }
    }

    /// Maps a raw `EV_*` type value back to a class.
    #[must_use]
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            EV_SYN => Some(EventClass::Sync),
            EV_KEY => Some(EventClass::Key),
            EV_REL => Some(EventClass::Relative),
            EV_ABS => Some(EventClass::Absolute),
            _ => None,
        }
    }
}

/// Axes of the virtual joystick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Axis {
    /// Left stick horizontal
    X,
    /// Left stick vertical
    Y,
    /// Left trigger
    Z,
    /// Right stick horizontal
    Rx,
    /// Right stick vertical
    Ry,
    /// Right trigger
    Rz,
    /// D-pad horizontal (-1 left, 0 centre, 1 right)
    Hat0x,
    /// D-pad vertical (-1 up, 0 centre, 1 down)
    Hat0y,
}

/// Joystick axis table: (axis, script name, kernel code).
pub const AXES: &[(Axis, &str, AbsoluteAxisType)] = &[
    (Axis::X, "x", AbsoluteAxisType::ABS_X),
    (Axis::Y, "y", AbsoluteAxisType::ABS_Y),
    (Axis::Z, "z", AbsoluteAxisType::ABS_Z),
    (Axis::Rx, "rx", AbsoluteAxisType::ABS_RX),
    (Axis::Ry, "ry", AbsoluteAxisType::ABS_RY),
    (Axis::Rz, "rz", AbsoluteAxisType::ABS_RZ),
    (Axis::Hat0x, "hat0x", AbsoluteAxisType::ABS_HAT0X),
    (Axis::Hat0y, "hat0y", AbsoluteAxisType::ABS_HAT0Y),
];

impl Axis {
    /// Kernel `ABS_*` code.
    #[must_use]
    pub fn code(self) -> u16 {
        AXES.iter()
            .find(|(axis, _, _)| *axis == self)
            .map(|(_, _, abs)| abs.0)
            .unwrap_or_default()
    }

    /// Script-facing name.
    #[must_use]
    pub fn name(self) -> &'static str {
        AXES.iter()
            .find(|(axis, _, _)| *axis == self)
            .map(|(_, name, _)| *name)
            .unwrap_or_default()
    }

    /// Looks an axis up by its script-facing name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        AXES.iter().find(|(_, n, _)| *n == name).map(|(axis, _, _)| *axis)
    }

    /// Whether this is a d-pad hat axis.
    #[must_use]
    pub fn is_hat(self) -> bool {
        matches!(self, Axis::Hat0x | Axis::Hat0y)
    }
}

/// Buttons of the virtual joystick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Button {
    A,
    B,
    X,
    Y,
    Tl,
    Tr,
    Tl2,
    Tr2,
    Select,
    Start,
    Mode,
    ThumbL,
    ThumbR,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
}

/// Joystick button table: (button, script name, kernel code).
pub const BUTTONS: &[(Button, &str, Key)] = &[
    (Button::A, "a", Key::BTN_SOUTH),
    (Button::B, "b", Key::BTN_EAST),
    (Button::X, "x", Key::BTN_NORTH),
    (Button::Y, "y", Key::BTN_WEST),
    (Button::Tl, "tl", Key::BTN_TL),
    (Button::Tr, "tr", Key::BTN_TR),
    (Button::Tl2, "tl2", Key::BTN_TL2),
    (Button::Tr2, "tr2", Key::BTN_TR2),
    (Button::Select, "select", Key::BTN_SELECT),
    (Button::Start, "start", Key::BTN_START),
    (Button::Mode, "mode", Key::BTN_MODE),
    (Button::ThumbL, "thumbl", Key::BTN_THUMBL),
    (Button::ThumbR, "thumbr", Key::BTN_THUMBR),
    (Button::DpadUp, "up", Key::BTN_DPAD_UP),
    (Button::DpadDown, "down", Key::BTN_DPAD_DOWN),
    (Button::DpadLeft, "left", Key::BTN_DPAD_LEFT),
    (Button::DpadRight, "right", Key::BTN_DPAD_RIGHT),
];

impl Button {
    /// Kernel `BTN_*` code.
    #[must_use]
    pub fn code(self) -> u16 {
        BUTTONS
            .iter()
            .find(|(button, _, _)| *button == self)
            .map(|(_, _, key)| key.code())
            .unwrap_or_default()
    }

    /// Looks a button up by its script-facing name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        BUTTONS
            .iter()
            .find(|(_, n, _)| *n == name)
            .map(|(button, _, _)| *button)
    }
}

/// Keyboard keys declared on the virtual joystick device.
pub const KEYBOARD_KEYS: &[(&str, Key)] = &[
    ("esc", Key::KEY_ESC),
    ("one", Key::KEY_1),
    ("two", Key::KEY_2),
    ("three", Key::KEY_3),
    ("four", Key::KEY_4),
    ("five", Key::KEY_5),
    ("six", Key::KEY_6),
    ("seven", Key::KEY_7),
    ("eight", Key::KEY_8),
    ("nine", Key::KEY_9),
    ("zero", Key::KEY_0),
    ("minus", Key::KEY_MINUS),
    ("equals", Key::KEY_EQUAL),
    ("backspace", Key::KEY_BACKSPACE),
    ("tab", Key::KEY_TAB),
    ("q", Key::KEY_Q),
    ("w", Key::KEY_W),
    ("e", Key::KEY_E),
    ("r", Key::KEY_R),
    ("t", Key::KEY_T),
    ("y", Key::KEY_Y),
    ("u", Key::KEY_U),
    ("i", Key::KEY_I),
    ("o", Key::KEY_O),
    ("p", Key::KEY_P),
    ("a", Key::KEY_A),
    ("s", Key::KEY_S),
    ("d", Key::KEY_D),
    ("f", Key::KEY_F),
    ("g", Key::KEY_G),
    ("h", Key::KEY_H),
    ("j", Key::KEY_J),
    ("k", Key::KEY_K),
    ("l", Key::KEY_L),
    ("z", Key::KEY_Z),
    ("x", Key::KEY_X),
    ("c", Key::KEY_C),
    ("v", Key::KEY_V),
    ("b", Key::KEY_B),
    ("n", Key::KEY_N),
    ("m", Key::KEY_M),
    ("comma", Key::KEY_COMMA),
    ("period", Key::KEY_DOT),
    ("enter", Key::KEY_ENTER),
    ("lctrl", Key::KEY_LEFTCTRL),
    ("capslock", Key::KEY_CAPSLOCK),
    ("lshift", Key::KEY_LEFTSHIFT),
    ("shift", Key::KEY_RIGHTSHIFT),
    ("lalt", Key::KEY_LEFTALT),
    ("space", Key::KEY_SPACE),
    ("rctrl", Key::KEY_RIGHTCTRL),
    ("ralt", Key::KEY_RIGHTALT),
    ("super", Key::KEY_LEFTMETA),
    ("f1", Key::KEY_F1),
    ("f2", Key::KEY_F2),
    ("f3", Key::KEY_F3),
    ("f4", Key::KEY_F4),
    ("f5", Key::KEY_F5),
    ("f6", Key::KEY_F6),
    ("f7", Key::KEY_F7),
    ("f8", Key::KEY_F8),
    ("f9", Key::KEY_F9),
    ("f10", Key::KEY_F10),
    ("f11", Key::KEY_F11),
    ("f12", Key::KEY_F12),
    ("home", Key::KEY_HOME),
    ("up", Key::KEY_UP),
    ("pageUp", Key::KEY_PAGEUP),
    ("left", Key::KEY_LEFT),
    ("right", Key::KEY_RIGHT),
    ("end", Key::KEY_END),
    ("down", Key::KEY_DOWN),
    ("pageDown", Key::KEY_PAGEDOWN),
    ("insert", Key::KEY_INSERT),
    ("del", Key::KEY_DELETE),
];

/// Looks a keyboard key up by name.
#[must_use]
pub fn keyboard_key(name: &str) -> Option<Key> {
    KEYBOARD_KEYS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, key)| *key)
}

/// Mouse buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Mouse button table: (button, kernel code).
pub const MOUSE_BUTTONS: &[(MouseButton, Key)] = &[
    (MouseButton::Left, Key::BTN_LEFT),
    (MouseButton::Right, Key::BTN_RIGHT),
    (MouseButton::Middle, Key::BTN_MIDDLE),
];

/// Relative axes of the virtual mouse.
pub const MOUSE_AXES: &[RelativeAxisType] = &[
    RelativeAxisType::REL_X,
    RelativeAxisType::REL_Y,
    RelativeAxisType::REL_WHEEL,
];
