//! Error classification for the polling side.
//!
//! The session never retries. Pollers use [`ErrorClass`] to decide whether a
//! failed read can simply be retried on the next tick or whether the session
//! must be torn down and rebuilt.

use crate::error::Error;

/// Classification of session errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The hub answered with an error status; the link itself is fine.
    Transient,
    /// No matching reply in time; the hub may be out of step with us.
    Desynchronized,
    /// The transport is gone or unusable.
    Disconnected,
    /// Calls were made in the wrong order (not connected, no software mode).
    Sequencing,
    /// Bad configuration; reconnecting will not help.
    Configuration,
}

impl ErrorClass {
    /// Classify an error for reconnect decisions.
    pub fn classify(err: &Error) -> Self {
        match err {
            Error::DeviceError { .. } => Self::Transient,
            Error::Timeout { .. } => Self::Desynchronized,
            Error::NotFound(_)
            | Error::ConnectFailed(_)
            | Error::WriteFailed(_)
            | Error::Hid(_) => Self::Disconnected,
            Error::NotConnected | Error::SoftwareModeRequired => Self::Sequencing,
            Error::Config(_) => Self::Configuration,
        }
    }

    /// Whether the session should be disconnected and connected again.
    pub fn needs_reconnect(&self) -> bool {
        matches!(
            self,
            Self::Desynchronized | Self::Disconnected | Self::Sequencing
        )
    }
}

/// Health of the link as seen by a poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// Last poll completed without faults.
    Healthy,
    /// A reading failed but the session can be reused.
    Degraded,
    /// The session must be rebuilt before the next poll.
    Broken,
}

impl LinkStatus {
    pub fn from_fault(fault: Option<&Error>) -> Self {
        match fault.map(ErrorClass::classify) {
            None => Self::Healthy,
            Some(class) if class.needs_reconnect() => Self::Broken,
            Some(_) => Self::Degraded,
        }
    }
}
