//! # Virtual Output Device
//!
//! Edge-triggered writer in front of a kernel virtual input device.
//!
//! Capabilities are declared up front and frozen at creation; the kernel
//! refuses changes afterwards. Key and absolute codes are written only
//! when their value changes. Relative codes are written whenever they are
//! non-zero. Writes accumulate into a frame that [`VirtualOutputDevice::sync`]
//! closes with a single `SYN_REPORT`. Values written into a frame count as
//! delivered only once that frame is flushed; a failed flush drops them so
//! the next write of the same value is emitted again.
//!
//! ```
//! use pie_bridge::output::codes::EventClass;
//! use pie_bridge::output::device::Capabilities;
//!
//! let mut caps = Capabilities::new();
//! caps.declare(EventClass::Key, 0x110)
//!     .declare(EventClass::Relative, 0x00);
//! assert!(caps.contains(EventClass::Key, 0x110));
//! assert!(!caps.contains(EventClass::Absolute, 0x00));
//! ```

use std::collections::{BTreeSet, HashMap};
use std::io;

use tracing::{debug, info, warn};

use super::codes::EventClass;
use super::uinput::UinputSink;
use crate::error::{BridgeError, Result};
use crate::input::event::RawEvent;

/// Destination of encoded events, normally a uinput handle.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send {
    /// Queues one event into the current frame.
    fn write_event(&mut self, event: RawEvent) -> io::Result<()>;

    /// Closes the current frame with a `SYN_REPORT`.
    fn sync(&mut self) -> io::Result<()>;
}

/// Set of (event class, code) pairs a device supports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    codes: BTreeSet<(EventClass, u16)>,
}

impl Capabilities {
    /// Creates an empty capability set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares support for `code` under `class`.
    pub fn declare(&mut self, class: EventClass, code: u16) -> &mut Self {
        self.codes.insert((class, code));
        self
    }

    /// Whether `code` was declared under `class`.
    #[must_use]
    pub fn contains(&self, class: EventClass, code: u16) -> bool {
        self.codes.contains(&(class, code))
    }

    /// Codes declared under `class`, in ascending order.
    pub fn codes(&self, class: EventClass) -> impl Iterator<Item = u16> + '_ {
        self.codes
            .iter()
            .filter(move |(c, _)| *c == class)
            .map(|(_, code)| *code)
    }

    /// Whether nothing has been declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Number of declared codes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }
}

/// Native integer range of one absolute axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisRange {
    /// `ABS_*` code.
    pub code: u16,
    /// Lowest reported value.
    pub min: i32,
    /// Highest reported value.
    pub max: i32,
}

impl AxisRange {
    /// Creates a range for `code`.
    #[must_use]
    pub const fn new(code: u16, min: i32, max: i32) -> Self {
        Self { code, min, max }
    }

    /// Midpoint of the range.
    #[must_use]
    pub fn center(&self) -> i32 {
        self.min + (self.max - self.min) / 2
    }
}

/// A kernel virtual input device with edge-triggered writes.
pub struct VirtualOutputDevice {
    name: String,
    capabilities: Capabilities,
    sink: Option<Box<dyn EventSink>>,
    last_written: HashMap<(EventClass, u16), i32>,
    staged: HashMap<(EventClass, u16), i32>,
    dirty: bool,
}

impl std::fmt::Debug for VirtualOutputDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualOutputDevice")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities.len())
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl VirtualOutputDevice {
    /// Creates the kernel device through uinput.
    ///
    /// # Errors
    ///
    /// Returns `DeviceCreate` if no capability was declared, an absolute
    /// axis has no range, or `/dev/uinput` cannot be opened or configured.
    pub fn create(name: &str, capabilities: Capabilities, axis_ranges: &[AxisRange]) -> Result<Self> {
        if capabilities.is_empty() {
            return Err(BridgeError::DeviceCreate(format!(
                "{}: no capabilities declared",
                name
            )));
        }

        let sink = UinputSink::create(name, &capabilities, axis_ranges)?;
        info!(
            "Created virtual device '{}' ({} capabilities)",
            name,
            capabilities.len()
        );
        Self::with_sink(name, capabilities, Box::new(sink))
    }

    /// Wraps an already created sink.
    ///
    /// # Errors
    ///
    /// Returns `DeviceCreate` if no capability was declared.
    pub fn with_sink(
        name: &str,
        capabilities: Capabilities,
        sink: Box<dyn EventSink>,
    ) -> Result<Self> {
        if capabilities.is_empty() {
            return Err(BridgeError::DeviceCreate(format!(
                "{}: no capabilities declared",
                name
            )));
        }

        // Keys start released on a fresh kernel device
        let last_written = capabilities
            .codes(EventClass::Key)
            .map(|code| ((EventClass::Key, code), 0))
            .collect();

        Ok(Self {
            name: name.to_string(),
            capabilities,
            sink: Some(sink),
            last_written,
            staged: HashMap::new(),
            dirty: false,
        })
    }

    /// Device name as registered with the kernel.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the kernel handle is still held.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.sink.is_some()
    }

    /// Declared capabilities.
    #[must_use]
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Writes a key or absolute-axis value if it differs from the last one
    /// written for that code.
    ///
    /// Returns whether an event was emitted.
    ///
    /// # Errors
    ///
    /// Returns `UndeclaredCapability` for a code outside the declared set
    /// (or a relative code), and `Io` if the kernel write fails.
    pub fn write_discrete(&mut self, class: EventClass, code: u16, value: i32) -> Result<bool> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(false);
        };

        if !matches!(class, EventClass::Key | EventClass::Absolute)
            || !self.capabilities.contains(class, code)
        {
            return Err(BridgeError::UndeclaredCapability {
                class: class.raw(),
                code,
            });
        }

        let current = self
            .staged
            .get(&(class, code))
            .or_else(|| self.last_written.get(&(class, code)));
        if current == Some(&value) {
            return Ok(false);
        }

        sink.write_event(RawEvent::new(class, code, value))?;
        self.staged.insert((class, code), value);
        self.dirty = true;
        Ok(true)
    }

    /// Writes a relative movement if it is non-zero.
    ///
    /// The caller resets its source value after the tick.
    ///
    /// # Errors
    ///
    /// Returns `UndeclaredCapability` for an undeclared relative code and
    /// `Io` if the kernel write fails.
    pub fn write_relative(&mut self, code: u16, value: i32) -> Result<bool> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(false);
        };

        if !self.capabilities.contains(EventClass::Relative, code) {
            return Err(BridgeError::UndeclaredCapability {
                class: EventClass::Relative.raw(),
                code,
            });
        }

        if value == 0 {
            return Ok(false);
        }

        sink.write_event(RawEvent::new(EventClass::Relative, code, value))?;
        self.dirty = true;
        Ok(true)
    }

    /// Writes a one-shot key stroke: every key pressed in order, then every
    /// key released, closed by its own frame marker. The keys end released.
    ///
    /// # Errors
    ///
    /// Returns `UndeclaredCapability` if any code is not a declared key, in
    /// which case nothing is written, and `Io` if the kernel write fails.
    pub fn write_stroke(&mut self, codes: &[u16]) -> Result<()> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };

        if let Some(&code) = codes
            .iter()
            .find(|&&code| !self.capabilities.contains(EventClass::Key, code))
        {
            return Err(BridgeError::UndeclaredCapability {
                class: EventClass::Key.raw(),
                code,
            });
        }
        if codes.is_empty() {
            return Ok(());
        }

        for &code in codes {
            sink.write_event(RawEvent::new(EventClass::Key, code, 1))?;
        }
        for &code in codes {
            sink.write_event(RawEvent::new(EventClass::Key, code, 0))?;
            self.staged.insert((EventClass::Key, code), 0);
        }
        self.dirty = true;
        self.sync()?;
        Ok(())
    }

    /// Closes the frame of events written since the last sync.
    ///
    /// Does nothing when nothing was written. Returns whether a frame
    /// marker was emitted.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the kernel write fails.
    pub fn sync(&mut self) -> Result<bool> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(false);
        };
        if !self.dirty {
            return Ok(false);
        }

        self.dirty = false;
        match sink.sync() {
            Ok(()) => {
                self.last_written.extend(self.staged.drain());
                Ok(true)
            }
            Err(e) => {
                self.staged.clear();
                Err(e.into())
            }
        }
    }

    /// Releases the kernel handle. Safe to call more than once.
    pub fn destroy(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            if self.dirty {
                if let Err(e) = sink.sync() {
                    warn!("Failed to flush '{}' before destroy: {}", self.name, e);
                }
            }
            drop(sink);
            debug!("Destroyed virtual device '{}'", self.name);
        }
        self.staged.clear();
        self.dirty = false;
    }
}

impl Drop for VirtualOutputDevice {
    fn drop(&mut self) {
        self.destroy();
    }
}
