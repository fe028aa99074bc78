//! # uinput Sink
//!
//! Kernel side of [`VirtualOutputDevice`](super::device::VirtualOutputDevice).
//!
//! Device creation goes through `evdev::uinput`, which performs the
//! legacy setup sequence on `/dev/uinput`: enable each event class and
//! code, write the 1116-byte `uinput_user_dev` descriptor (name at 0,
//! `input_id` at 80, `ff_effects_max` at 88, `absmax[64]` at 92,
//! `absmin[64]` at 348) and issue `UI_DEV_CREATE`. Events are written in
//! the 24-byte `input_event` layout.

use std::io;

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{
    AbsInfo, AbsoluteAxisType, AttributeSet, BusType, EventType, InputEvent, InputId, Key,
    RelativeAxisType, UinputAbsSetup,
};

use super::codes::EventClass;
use super::device::{AxisRange, Capabilities, EventSink};
use crate::error::{BridgeError, Result};
use crate::input::event::RawEvent;

const VENDOR_ID: u16 = 0x1;
const PRODUCT_ID: u16 = 0x1;
const VERSION: u16 = 1;

/// `EventSink` writing into a uinput device.
pub struct UinputSink {
    device: VirtualDevice,
    frame: Vec<InputEvent>,
}

impl UinputSink {
    /// Registers a virtual device with the kernel.
    ///
    /// # Arguments
    ///
    /// * `name` - Device name shown to consuming applications
    /// * `capabilities` - Every code the device will ever emit
    /// * `axis_ranges` - Native range of each declared absolute axis
    ///
    /// # Errors
    ///
    /// Returns `DeviceCreate` if an absolute axis has no range or the
    /// kernel rejects the setup (missing module, permissions).
    pub fn create(name: &str, capabilities: &Capabilities, axis_ranges: &[AxisRange]) -> Result<Self> {
        let fail = |e: io::Error| BridgeError::DeviceCreate(format!("{}: {}", name, e));

        let mut builder = VirtualDeviceBuilder::new()
            .map_err(fail)?
            .name(name)
            .input_id(InputId::new(BusType::BUS_VIRTUAL, VENDOR_ID, PRODUCT_ID, VERSION));

        let mut keys = AttributeSet::<Key>::new();
        for code in capabilities.codes(EventClass::Key) {
            keys.insert(Key::new(code));
        }
        if keys.iter().next().is_some() {
            builder = builder.with_keys(&keys).map_err(fail)?;
        }

        for code in capabilities.codes(EventClass::Absolute) {
            let range = axis_ranges
                .iter()
                .find(|r| r.code == code)
                .ok_or_else(|| {
                    BridgeError::DeviceCreate(format!("{}: no range for axis {:#x}", name, code))
                })?;
            let info = AbsInfo::new(range.center(), range.min, range.max, 0, 0, 0);
            let setup = UinputAbsSetup::new(AbsoluteAxisType(code), info);
            builder = builder.with_absolute_axis(&setup).map_err(fail)?;
        }

        let mut rel = AttributeSet::<RelativeAxisType>::new();
        for code in capabilities.codes(EventClass::Relative) {
            rel.insert(RelativeAxisType(code));
        }
        if rel.iter().next().is_some() {
            builder = builder.with_relative_axes(&rel).map_err(fail)?;
        }

        let device = builder.build().map_err(fail)?;

        Ok(Self {
            device,
            frame: Vec::with_capacity(32),
        })
    }
}

impl EventSink for UinputSink {
    fn write_event(&mut self, event: RawEvent) -> io::Result<()> {
        self.frame
            .push(InputEvent::new(EventType(event.kind), event.code, event.value));
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        // emit() appends the SYN_REPORT
        let result = self.device.emit(&self.frame);
        self.frame.clear();
        result
    }
}
