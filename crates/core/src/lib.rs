//! icue-link-core: telemetry client for the Corsair iCUE LINK System Hub.
//!
//! This crate implements the hub's request/response protocol over USB HID:
//! packet framing, the endpoint open/read/close choreography, response
//! matching with timeout, and decoding of liquid temperature and pump/fan
//! speeds. Only telemetry reads are supported.

pub mod comm;
pub mod config;
pub mod device;
pub mod error;
pub mod protocol;
pub mod session;
pub mod telemetry;
pub mod transport;

pub use error::{Error, Result};
pub use session::{Session, SessionState, SpeedReading};

/// Corsair USB Vendor ID.
pub const CORSAIR_VID: u16 = 0x1B1C;
/// iCUE LINK System Hub product ID.
pub const ICUE_LINK_HUB_PID: u16 = 0x0C3F;
