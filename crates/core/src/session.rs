//! Protocol session: connection lifecycle and the command/response choreography.
//!
//! The hub is strictly half-duplex. Each command is written, followed by a
//! fixed pause, and at most one response is awaited at a time. Endpoint reads
//! are always bracketed as
//!
//! ```text
//! close(ep) -> open(ep) -> read-request -> wait for data type -> close(ep)
//! ```
//!
//! The leading close resets whatever state a previous client left behind.

use crate::config::SessionConfig;
use crate::device;
use crate::error::{Error, Result};
use crate::protocol::{
    decode_speed_table, decode_temperature, match_response, Command, Endpoint, ResponsePacket,
};
use crate::transport::{HidTransport, HidapiTransport};
use crate::{CORSAIR_VID, ICUE_LINK_HUB_PID};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Sensor-table slot of the pump.
pub const PUMP_SENSOR_INDEX: usize = 1;
/// Sensor-table slot of the first fan.
pub const FAN_SENSORS_START_INDEX: usize = 13;
/// Fans reported by [`Session::read_speeds`].
pub const MAX_FANS: usize = 3;

/// Bytes of each report included in trace logs.
const TRACE_BYTES: usize = 32;

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    SoftwareMode,
}

/// Pump and fan speeds extracted from the sensor table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SpeedReading {
    pub pump_rpm: Option<i16>,
    pub fan_rpms: [Option<i16>; MAX_FANS],
}

impl SpeedReading {
    /// Pick the pump and fan slots out of a decoded sensor table.
    ///
    /// Slots the table does not reach are `None`.
    pub fn from_table(table: &[Option<i16>]) -> Self {
        let slot = |index: usize| table.get(index).copied().flatten();
        Self {
            pump_rpm: slot(PUMP_SENSOR_INDEX),
            fan_rpms: std::array::from_fn(|i| slot(FAN_SENSORS_START_INDEX + i)),
        }
    }
}

/// A client session with one iCUE LINK hub.
///
/// Owns the transport handle exclusively. Dropping the session disconnects it.
pub struct Session {
    config: SessionConfig,
    transport: Option<Box<dyn HidTransport>>,
    device_path: Option<String>,
    software_mode: bool,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            transport: None,
            device_path: None,
            software_mode: false,
        }
    }

    pub fn state(&self) -> SessionState {
        match (&self.transport, self.software_mode) {
            (None, _) => SessionState::Disconnected,
            (Some(_), false) => SessionState::Connected,
            (Some(_), true) => SessionState::SoftwareMode,
        }
    }

    /// Path of the connected device, for labelling output.
    pub fn device_path(&self) -> Option<&str> {
        self.device_path.as_deref()
    }

    /// Find the first attached hub and open it.
    ///
    /// An existing connection is torn down first.
    pub fn connect(&mut self) -> Result<()> {
        self.disconnect();

        info!(
            vid = format_args!("0x{:04X}", CORSAIR_VID),
            pid = format_args!("0x{:04X}", ICUE_LINK_HUB_PID),
            "Searching for iCUE LINK hub"
        );
        let api = hidapi::HidApi::new()
            .map_err(|e| Error::ConnectFailed(format!("hidapi init: {e}")))?;

        let devices = device::enumerate(&api);
        let first = devices.first().ok_or_else(|| {
            Error::NotFound(format!(
                "no iCUE LINK System Hub (VID=0x{CORSAIR_VID:04X} PID=0x{ICUE_LINK_HUB_PID:04X}); \
                 ensure it is connected and that you have permission to access it"
            ))
        })?;

        let transport = HidapiTransport::open(&api, &first.path)?;
        self.attach(Box::new(transport), first.path_str());
        Ok(())
    }

    /// Take ownership of an already opened transport.
    ///
    /// An existing connection is torn down first.
    pub fn attach(&mut self, transport: Box<dyn HidTransport>, device_path: impl Into<String>) {
        self.disconnect();
        let path = device_path.into();
        info!(path = %path, "Connected to device");
        self.transport = Some(transport);
        self.device_path = Some(path);
        self.software_mode = false;
    }

    /// Return the hub to hardware mode and release the handle.
    ///
    /// Failures while leaving software mode are logged. The handle is always
    /// released and the session always ends up disconnected.
    pub fn disconnect(&mut self) {
        if self.transport.is_none() {
            return;
        }

        info!("Returning device to hardware mode");
        if let Err(e) = self.send(Command::ExitSoftwareMode) {
            warn!(error = %e, "Error during disconnect");
        }

        self.transport = None;
        self.software_mode = false;
        if let Some(path) = self.device_path.take() {
            info!(path = %path, "Device disconnected");
        }
    }

    /// Switch the hub to software mode. Fire-and-forget; no reply is sent.
    pub fn enter_software_mode(&mut self) -> Result<()> {
        info!("Entering software mode");
        self.send(Command::EnterSoftwareMode)?;
        self.software_mode = true;
        Ok(())
    }

    /// Read the liquid temperature in degrees Celsius.
    ///
    /// `Ok(None)` means the round trip succeeded but carried no value.
    pub fn read_temperature(&mut self) -> Result<Option<f64>> {
        self.require_software_mode()?;
        let response = self.read_endpoint(Endpoint::Temperatures)?;
        let temperature = decode_temperature(response.as_bytes());
        debug!(liquid_temp_c = ?temperature, "Temperature read");
        Ok(temperature)
    }

    /// Read the pump speed and the first three fan speeds.
    pub fn read_speeds(&mut self) -> Result<SpeedReading> {
        self.require_software_mode()?;
        let response = self.read_endpoint(Endpoint::Speeds)?;
        let table = decode_speed_table(response.payload());
        let speeds = SpeedReading::from_table(&table);
        debug!(
            sensors = table.len(),
            pump_rpm = ?speeds.pump_rpm,
            fan_rpms = ?speeds.fan_rpms,
            "Speeds read"
        );
        Ok(speeds)
    }

    fn require_software_mode(&self) -> Result<()> {
        match self.state() {
            SessionState::Disconnected => Err(Error::NotConnected),
            SessionState::Connected => Err(Error::SoftwareModeRequired),
            SessionState::SoftwareMode => Ok(()),
        }
    }

    fn transport(&self) -> Result<&dyn HidTransport> {
        self.transport.as_deref().ok_or(Error::NotConnected)
    }

    /// Write one command, then hold off for the inter-command delay.
    fn send(&self, command: Command) -> Result<()> {
        let transport = self.transport()?;
        let packet = command.encode();
        trace!(
            command = %command,
            report_hex = format_args!("{:02X?}", &packet.as_bytes()[..TRACE_BYTES]),
            "TX"
        );

        transport.write_report(packet.as_bytes())?;
        std::thread::sleep(self.config.command_delay());
        Ok(())
    }

    /// Poll the transport until a report of `expected_type` arrives.
    ///
    /// Empty reads, failed reads and reports of other data types are
    /// discarded. A report with a nonzero status ends the wait at once.
    fn receive(&self, expected_type: [u8; 2]) -> Result<ResponsePacket> {
        let transport = self.transport()?;
        let timeout = self.config.response_timeout();
        let start = Instant::now();

        loop {
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                break;
            }
            let slice = (timeout - elapsed).min(self.config.poll_slice());

            let raw = match transport.read_report(slice) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    debug!(error = %e, "Read failed while waiting for response");
                    std::thread::sleep(slice);
                    continue;
                }
            };

            trace!(
                report_hex = format_args!("{:02X?}", &raw[..raw.len().min(TRACE_BYTES)]),
                "RX"
            );

            if let Some(response) = match_response(&raw, expected_type)? {
                return Ok(response);
            }
            debug!(
                expected = format_args!("{:02X?}", expected_type),
                len = raw.len(),
                "Discarding unrelated report"
            );
        }

        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        Err(Error::Timeout {
            data_type: expected_type,
            elapsed_ms,
        })
    }

    /// Run the bracketed endpoint read. Once opened, the endpoint is closed
    /// again on every path.
    fn read_endpoint(&self, endpoint: Endpoint) -> Result<ResponsePacket> {
        self.send(Command::CloseEndpoint(endpoint))?;
        self.send(Command::OpenEndpoint(endpoint))?;

        let response = self
            .send(Command::ReadRequest)
            .and_then(|()| self.receive(endpoint.data_type()));
        let closed = self.send(Command::CloseEndpoint(endpoint));

        match (response, closed) {
            (Ok(response), Ok(())) => Ok(response),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    warn!(
                        endpoint = endpoint.name(),
                        error = %close_err,
                        "Failed to close endpoint after error"
                    );
                }
                Err(e)
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}
