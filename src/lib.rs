//! # PIE Bridge Library
//!
//! Routes gamepads, phone IMUs, head trackers, serial motion sensors and
//! MIDI controllers into virtual joystick, mouse and keyboard devices.
//!
//! Every input source is a [`engine::Plugin`] that decodes its stream into
//! a record of [`engine::Bindings`]. Whenever new data arrives the
//! [`engine::Engine`] runs one tick of a [`script::Script`], which maps the
//! input records onto the output records; the output plugins then write
//! the changes to uinput devices.

pub mod config;
pub mod engine;
pub mod error;
pub mod filters;
pub mod input;
pub mod output;
pub mod script;
