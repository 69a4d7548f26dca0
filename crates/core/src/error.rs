//! Error types for icue-link-core.

use thiserror::Error;

/// Core library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// No HID device with the hub's vendor/product pair was enumerated.
    #[error("device not found: {0}")]
    NotFound(String),

    /// The OS refused to open the enumerated device.
    #[error("failed to connect to device: {0}")]
    ConnectFailed(String),

    /// Writing an output report failed.
    #[error("failed to send command: {0}")]
    WriteFailed(String),

    /// Other HID subsystem failure (initialisation, reads).
    #[error("HID error: {0}")]
    Hid(String),

    /// No response with the expected data type arrived before the deadline.
    #[error("timeout waiting for response type {data_type:02x?} after {elapsed_ms} ms")]
    Timeout { data_type: [u8; 2], elapsed_ms: u64 },

    /// The device answered with a nonzero status byte.
    #[error("device returned error status: 0x{status:02X}")]
    DeviceError { status: u8 },

    /// A command was issued before `connect()` or after `disconnect()`.
    #[error("device not connected")]
    NotConnected,

    /// A telemetry read was issued before entering software mode.
    #[error("software mode has not been entered since connect")]
    SoftwareModeRequired,

    /// Invalid or unreadable session configuration.
    #[error("config error: {0}")]
    Config(String),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
