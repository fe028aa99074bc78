//! # Output Devices
//!
//! Kernel virtual devices and the plugins that drive them after each tick.

pub mod codes;
pub mod device;
pub mod mouse;
pub mod uinput;
pub mod vjoy;

pub use device::{Capabilities, VirtualOutputDevice};
pub use mouse::MouseOutput;
pub use vjoy::VjoyOutput;
