//! HID transport abstraction for device communication.
//!
//! Provides a trait-based transport layer so that the real hub and the
//! scripted mock used in tests share the same interface.

use crate::error::{Error, Result};
use crate::protocol::INPUT_REPORT_LEN;
use std::time::Duration;
use tracing::debug;

/// Abstraction over raw HID report I/O.
///
/// The handle is released when the value is dropped.
pub trait HidTransport: Send {
    /// Write one full output report.
    fn write_report(&self, data: &[u8]) -> Result<()>;

    /// Read one input report, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    fn read_report(&self, timeout: Duration) -> Result<Option<Vec<u8>>>;
}

/// Transport over a `hidapi` device handle.
pub struct HidapiTransport {
    device: hidapi::HidDevice,
}

impl HidapiTransport {
    /// Open the HID interface at `path` in non-blocking mode.
    pub fn open(api: &hidapi::HidApi, path: &std::ffi::CStr) -> Result<Self> {
        let device = api
            .open_path(path)
            .map_err(|e| Error::ConnectFailed(format!("open {}: {e}", path.to_string_lossy())))?;
        device
            .set_blocking_mode(false)
            .map_err(|e| Error::ConnectFailed(format!("set non-blocking: {e}")))?;
        debug!(path = %path.to_string_lossy(), "HID handle opened");
        Ok(Self { device })
    }
}

impl HidTransport for HidapiTransport {
    fn write_report(&self, data: &[u8]) -> Result<()> {
        self.device
            .write(data)
            .map_err(|e| Error::WriteFailed(format!("write: {e}")))?;
        Ok(())
    }

    fn read_report(&self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let mut buf = [0u8; INPUT_REPORT_LEN];
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let n = self
            .device
            .read_timeout(&mut buf, timeout_ms)
            .map_err(|e| Error::Hid(format!("read_timeout: {e}")))?;

        if n == 0 {
            return Ok(None);
        }
        Ok(Some(buf[..n].to_vec()))
    }
}

/// A scripted HID transport for testing.
///
/// Every written report is recorded. Replies queued with
/// [`MockHub::reply_to_read`] are released one per read-request command, and
/// [`MockHub::inject`] makes a report readable immediately.
#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::protocol::{opcodes, COMMAND_HEADER, DATA_TYPE_INDEX, PAYLOAD_INDEX, STATUS_INDEX};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct State {
        written: Vec<Vec<u8>>,
        scripted: VecDeque<Vec<Vec<u8>>>,
        readable: VecDeque<Vec<u8>>,
        fail_writes: bool,
        released: bool,
    }

    /// Observer side of the mock; stays with the test.
    #[derive(Clone, Default)]
    pub struct MockHub {
        state: Arc<Mutex<State>>,
    }

    /// Transport side of the mock; handed to the session.
    pub struct MockTransport {
        state: Arc<Mutex<State>>,
    }

    impl MockHub {
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a transport handle wired to this hub.
        pub fn transport(&self) -> Box<dyn HidTransport> {
            Box::new(MockTransport {
                state: Arc::clone(&self.state),
            })
        }

        /// Queue the reports the hub sends after the next unanswered read-request.
        pub fn reply_to_read(&self, reports: Vec<Vec<u8>>) {
            self.state.lock().unwrap().scripted.push_back(reports);
        }

        /// Make a report readable right away.
        pub fn inject(&self, report: Vec<u8>) {
            self.state.lock().unwrap().readable.push_back(report);
        }

        pub fn fail_writes(&self, fail: bool) {
            self.state.lock().unwrap().fail_writes = fail;
        }

        /// All reports written so far.
        pub fn written(&self) -> Vec<Vec<u8>> {
            self.state.lock().unwrap().written.clone()
        }

        /// Opcode + payload of every written report, padding stripped.
        pub fn written_commands(&self) -> Vec<Vec<u8>> {
            self.written()
                .iter()
                .map(|w| {
                    let body = &w[1 + COMMAND_HEADER.len()..];
                    let end = body.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
                    body[..end].to_vec()
                })
                .collect()
        }

        pub fn clear_written(&self) {
            self.state.lock().unwrap().written.clear();
        }

        /// Whether the session dropped its transport handle.
        pub fn released(&self) -> bool {
            self.state.lock().unwrap().released
        }
    }

    impl HidTransport for MockTransport {
        fn write_report(&self, data: &[u8]) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            if state.fail_writes {
                return Err(Error::WriteFailed("mock: write rejected".into()));
            }
            state.written.push(data.to_vec());

            let opcode_at = 1 + COMMAND_HEADER.len();
            if data[opcode_at..].starts_with(&opcodes::READ) {
                if let Some(reports) = state.scripted.pop_front() {
                    state.readable.extend(reports);
                }
            }
            Ok(())
        }

        fn read_report(&self, timeout: Duration) -> Result<Option<Vec<u8>>> {
            let next = self.state.lock().unwrap().readable.pop_front();
            if next.is_none() {
                std::thread::sleep(timeout.min(Duration::from_millis(1)));
            }
            Ok(next)
        }
    }

    impl Drop for MockTransport {
        fn drop(&mut self) {
            self.state.lock().unwrap().released = true;
        }
    }

    /// Build a full-size input report.
    pub fn report(status: u8, data_type: [u8; 2], payload: &[u8]) -> Vec<u8> {
        let mut raw = vec![0u8; INPUT_REPORT_LEN];
        raw[STATUS_INDEX] = status;
        raw[DATA_TYPE_INDEX..DATA_TYPE_INDEX + 2].copy_from_slice(&data_type);
        raw[PAYLOAD_INDEX..PAYLOAD_INDEX + payload.len()].copy_from_slice(payload);
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::mock::*;
    use super::*;
    use crate::protocol::{build_command, opcodes};

    #[test]
    fn mock_releases_reply_on_read_request() {
        let hub = MockHub::new();
        let transport = hub.transport();
        hub.reply_to_read(vec![report(0x00, [0x10, 0x00], &[])]);

        assert!(transport
            .read_report(Duration::from_millis(1))
            .unwrap()
            .is_none());

        transport
            .write_report(build_command(&opcodes::READ, &[]).as_bytes())
            .unwrap();
        let raw = transport
            .read_report(Duration::from_millis(1))
            .unwrap()
            .unwrap();
        assert_eq!(&raw[4..6], &[0x10, 0x00]);
    }

    #[test]
    fn mock_records_commands_without_padding() {
        let hub = MockHub::new();
        let transport = hub.transport();
        transport
            .write_report(build_command(&opcodes::OPEN_ENDPOINT, &[0x21]).as_bytes())
            .unwrap();
        assert_eq!(hub.written_commands(), vec![vec![0x0D, 0x01, 0x21]]);
    }

    #[test]
    fn mock_tracks_release() {
        let hub = MockHub::new();
        let transport = hub.transport();
        assert!(!hub.released());
        drop(transport);
        assert!(hub.released());
    }

    #[test]
    fn mock_write_failure() {
        let hub = MockHub::new();
        let transport = hub.transport();
        hub.fail_writes(true);
        let result = transport.write_report(&[0u8; 8]);
        assert!(matches!(result, Err(Error::WriteFailed(_))));
        assert!(hub.written().is_empty());
    }
}
