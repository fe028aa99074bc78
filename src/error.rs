//! # Error Types
//!
//! Custom error types for PIE Bridge using `thiserror`.

use thiserror::Error;

/// Main error type for PIE Bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Virtual output device could not be created
    #[error("Device create error: {0}")]
    DeviceCreate(String),

    /// Write to an event code that was not declared before device creation
    #[error("Undeclared capability: event class {class} code {code:#x}")]
    UndeclaredCapability { class: u16, code: u16 },

    /// No input device matched during discovery
    #[error("No input device found matching {keyword:?} (available: {available:?})")]
    DeviceNotFound {
        keyword: Option<String>,
        available: Vec<String>,
    },

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// Invalid argument passed to a filter
    #[error("Filter argument error: {0}")]
    FilterArgument(String),

    /// Fault raised by a script tick
    #[error("Script error: {0}")]
    Script(String),

    /// Script profile names a script that is not built in
    #[error("Unknown script: {0}")]
    UnknownScript(String),
}

/// Result type alias for PIE Bridge
pub type Result<T> = std::result::Result<T, BridgeError>;
