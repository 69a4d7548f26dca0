//! Session timing configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Pause after every command write. The hub desyncs without it.
pub const DEFAULT_COMMAND_DELAY_MS: u64 = 50;
/// Deadline for a matching response after a read-request.
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 1000;
/// Upper bound on a single transport read while waiting for a response.
pub const DEFAULT_POLL_SLICE_MS: u64 = 10;

/// Timing parameters of a [`Session`](crate::session::Session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub command_delay_ms: u64,
    pub response_timeout_ms: u64,
    pub poll_slice_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_delay_ms: DEFAULT_COMMAND_DELAY_MS,
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            poll_slice_ms: DEFAULT_POLL_SLICE_MS,
        }
    }
}

impl SessionConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the receive loop meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.response_timeout_ms == 0 {
            return Err(Error::Config("response_timeout_ms must be positive".into()));
        }
        if self.poll_slice_ms == 0 {
            return Err(Error::Config("poll_slice_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn command_delay(&self) -> Duration {
        Duration::from_millis(self.command_delay_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn poll_slice(&self) -> Duration {
        Duration::from_millis(self.poll_slice_ms)
    }
}
