//! Telemetry sampling and output formatting for pollers.
//!
//! [`sample`] turns read failures into absent readings so that one bad round
//! trip never drops a whole sample, while still handing the first fault back
//! so the caller can decide whether to reconnect.

use crate::error::Error;
use crate::session::{Session, MAX_FANS};
use chrono::{DateTime, Local, SecondsFormat};
use serde::Serialize;
use std::io::Write;
use tracing::warn;

/// CSV header written by [`CsvLog`].
pub const CSV_HEADER: &str =
    "timestamp,device_path,liquid_temp_c,pump_rpm,fan1_rpm,fan2_rpm,fan3_rpm";

/// One poll's worth of readings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySample {
    pub timestamp: DateTime<Local>,
    pub liquid_temp_c: Option<f64>,
    pub pump_rpm: Option<i16>,
    pub fan_rpms: [Option<i16>; MAX_FANS],
}

impl TelemetrySample {
    /// A sample with every reading absent.
    pub fn empty(timestamp: DateTime<Local>) -> Self {
        Self {
            timestamp,
            liquid_temp_c: None,
            pump_rpm: None,
            fan_rpms: [None; MAX_FANS],
        }
    }

    /// An all-absent sample stamped now, for polls made while disconnected.
    pub fn unavailable() -> Self {
        Self::empty(Local::now())
    }

    fn timestamp_str(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, false)
    }

    /// Single console line, e.g.
    /// `<ts> | Liquid: 31.2°C | Pump: 2400 RPM | Fans: 900, N/A, N/A RPM`.
    pub fn format_line(&self) -> String {
        let temp = self
            .liquid_temp_c
            .map_or_else(|| "N/A".to_string(), |t| format!("{t:.1}°C"));
        let pump = or_na(self.pump_rpm);
        let fans: Vec<String> = self.fan_rpms.iter().map(|&rpm| or_na(rpm)).collect();

        format!(
            "{} | Liquid: {temp} | Pump: {pump} RPM | Fans: {} RPM",
            self.timestamp_str(),
            fans.join(", ")
        )
    }

    /// CSV row matching [`CSV_HEADER`]; absent readings are empty cells.
    pub fn csv_row(&self, device_path: &str) -> String {
        let mut cells = vec![
            self.timestamp_str(),
            csv_escape(device_path),
            self.liquid_temp_c.map(|t| t.to_string()).unwrap_or_default(),
            self.pump_rpm.map(|r| r.to_string()).unwrap_or_default(),
        ];
        cells.extend(
            self.fan_rpms
                .iter()
                .map(|rpm| rpm.map(|r| r.to_string()).unwrap_or_default()),
        );
        cells.join(",")
    }
}

fn or_na(value: Option<i16>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Result of one poll.
#[derive(Debug)]
pub struct Sampled {
    pub sample: TelemetrySample,
    /// First error hit while reading, if any.
    pub fault: Option<Error>,
}

/// Read temperature and speeds once.
///
/// A failed read leaves its fields `None`; the speeds read is still attempted
/// after a failed temperature read.
pub fn sample(session: &mut Session) -> Sampled {
    let mut sample = TelemetrySample::empty(Local::now());
    let mut fault = None;

    match session.read_temperature() {
        Ok(temp) => sample.liquid_temp_c = temp,
        Err(e) => {
            warn!(error = %e, "Failed to read temperature");
            fault = Some(e);
        }
    }

    match session.read_speeds() {
        Ok(speeds) => {
            sample.pump_rpm = speeds.pump_rpm;
            sample.fan_rpms = speeds.fan_rpms;
        }
        Err(e) => {
            warn!(error = %e, "Failed to read speeds");
            fault.get_or_insert(e);
        }
    }

    Sampled { sample, fault }
}

/// CSV sink for telemetry samples.
pub struct CsvLog<W: Write> {
    writer: W,
    device_path: String,
}

impl<W: Write> CsvLog<W> {
    /// Write the header and return the log.
    pub fn new(mut writer: W, device_path: impl Into<String>) -> std::io::Result<Self> {
        writeln!(writer, "{CSV_HEADER}")?;
        Ok(Self {
            writer,
            device_path: device_path.into(),
        })
    }

    /// Label rows with a new device path, e.g. after a reconnect.
    pub fn set_device_path(&mut self, device_path: impl Into<String>) {
        self.device_path = device_path.into();
    }

    pub fn append(&mut self, sample: &TelemetrySample) -> std::io::Result<()> {
        writeln!(self.writer, "{}", sample.csv_row(&self.device_path))?;
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
