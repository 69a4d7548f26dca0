//! iCUE LINK hub packet encoding and decoding.
//!
//! Every outbound command is a full output report:
//! - byte 0: report ID (always 0x00)
//! - bytes 1..4: protocol header `00 00 01`
//! - opcode bytes, then payload bytes, zero padded to [`OUTPUT_REPORT_LEN`]
//!
//! Inbound reports are [`INPUT_REPORT_LEN`] bytes with the status code at
//! offset 1, the data-type tag at offsets 4..6 and the payload from offset 6.
//!
//! Nothing in this module performs I/O.

use crate::error::{Error, Result};

/// Output report length including the leading report ID.
pub const OUTPUT_REPORT_LEN: usize = 513;
/// Input report length.
pub const INPUT_REPORT_LEN: usize = 512;

/// Report ID prefixed to every output report.
pub const REPORT_ID: u8 = 0x00;
/// Header written after the report ID on every command.
pub const COMMAND_HEADER: [u8; 3] = [0x00, 0x00, 0x01];

/// Offset of the status code in an input report.
pub const STATUS_INDEX: usize = 1;
/// Offset of the 2-byte data-type tag in an input report.
pub const DATA_TYPE_INDEX: usize = 4;
/// Offset of the payload in an input report.
pub const PAYLOAD_INDEX: usize = 6;
/// Shortest input report that carries a status and a data-type tag.
pub const MIN_RESPONSE_LEN: usize = DATA_TYPE_INDEX + 2;

/// Status code of a successful response.
pub const STATUS_SUCCESS: u8 = 0x00;

/// Fixed opcodes.
pub mod opcodes {
    pub const ENTER_SOFTWARE_MODE: [u8; 4] = [0x01, 0x03, 0x00, 0x02];
    pub const EXIT_SOFTWARE_MODE: [u8; 4] = [0x01, 0x03, 0x00, 0x01];
    pub const OPEN_ENDPOINT: [u8; 2] = [0x0D, 0x01];
    pub const CLOSE_ENDPOINT: [u8; 3] = [0x05, 0x01, 0x01];
    pub const READ: [u8; 2] = [0x08, 0x01];
}

/// Temperature value offsets, relative to the start of the input report.
pub const TEMP_VALUE_INDEX_LOW: usize = 11;
pub const TEMP_VALUE_INDEX_HIGH: usize = 12;
/// Raw temperatures are tenths of a degree Celsius.
pub const TEMP_SCALING_FACTOR: f64 = 10.0;

/// Bytes per sensor entry in a speeds payload: status + i16 LE rpm.
pub const SENSOR_BLOCK_LEN: usize = 3;
/// Sensor status signalling a present reading.
pub const SENSOR_PRESENT: u8 = 0x00;

/// Device-internal telemetry endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Speeds,
    Temperatures,
}

impl Endpoint {
    /// One-byte endpoint identifier sent with open/close commands.
    pub fn id(&self) -> u8 {
        match self {
            Self::Speeds => 0x17,
            Self::Temperatures => 0x21,
        }
    }

    /// Data-type tag carried by this endpoint's responses.
    pub fn data_type(&self) -> [u8; 2] {
        match self {
            Self::Speeds => [0x25, 0x00],
            Self::Temperatures => [0x10, 0x00],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Speeds => "speeds",
            Self::Temperatures => "temperatures",
        }
    }
}

/// Commands understood by the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    EnterSoftwareMode,
    ExitSoftwareMode,
    OpenEndpoint(Endpoint),
    CloseEndpoint(Endpoint),
    ReadRequest,
}

impl Command {
    /// Opcode bytes following the protocol header.
    pub fn opcode(&self) -> &'static [u8] {
        match self {
            Self::EnterSoftwareMode => &opcodes::ENTER_SOFTWARE_MODE,
            Self::ExitSoftwareMode => &opcodes::EXIT_SOFTWARE_MODE,
            Self::OpenEndpoint(_) => &opcodes::OPEN_ENDPOINT,
            Self::CloseEndpoint(_) => &opcodes::CLOSE_ENDPOINT,
            Self::ReadRequest => &opcodes::READ,
        }
    }

    /// Payload bytes following the opcode.
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Self::OpenEndpoint(ep) | Self::CloseEndpoint(ep) => vec![ep.id()],
            _ => Vec::new(),
        }
    }

    /// Build the framed output report for this command.
    pub fn encode(&self) -> CommandPacket {
        build_command(self.opcode(), &self.payload())
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EnterSoftwareMode => write!(f, "enter-software-mode"),
            Self::ExitSoftwareMode => write!(f, "exit-software-mode"),
            Self::OpenEndpoint(ep) => write!(f, "open-endpoint({})", ep.name()),
            Self::CloseEndpoint(ep) => write!(f, "close-endpoint({})", ep.name()),
            Self::ReadRequest => write!(f, "read-request"),
        }
    }
}

/// A framed output report, ready to be written to the transport.
#[derive(Clone, PartialEq, Eq)]
pub struct CommandPacket {
    buf: Box<[u8; OUTPUT_REPORT_LEN]>,
}

impl CommandPacket {
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..]
    }
}

impl std::fmt::Debug for CommandPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The tail is zero padding; only the framed prefix is interesting.
        write!(f, "CommandPacket({:02X?}..)", &self.buf[..16])
    }
}

/// Frame `opcode` and `payload` into a full output report.
///
/// # Panics
///
/// Panics if the framed command does not fit in [`OUTPUT_REPORT_LEN`] bytes.
/// All opcodes and payloads are fixed by this crate, so an overflow is a bug.
pub fn build_command(opcode: &[u8], payload: &[u8]) -> CommandPacket {
    let framed_len = 1 + COMMAND_HEADER.len() + opcode.len() + payload.len();
    assert!(
        framed_len <= OUTPUT_REPORT_LEN,
        "command of {framed_len} bytes exceeds output report size {OUTPUT_REPORT_LEN}"
    );

    let mut buf = Box::new([0u8; OUTPUT_REPORT_LEN]);
    buf[0] = REPORT_ID;
    let mut pos = 1;
    for part in [&COMMAND_HEADER[..], opcode, payload] {
        buf[pos..pos + part.len()].copy_from_slice(part);
        pos += part.len();
    }

    CommandPacket { buf }
}

/// A successful input report whose data type matched the awaited endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePacket {
    raw: Vec<u8>,
}

impl ResponsePacket {
    pub fn status(&self) -> u8 {
        self.raw[STATUS_INDEX]
    }

    pub fn data_type(&self) -> [u8; 2] {
        [self.raw[DATA_TYPE_INDEX], self.raw[DATA_TYPE_INDEX + 1]]
    }

    /// Bytes from [`PAYLOAD_INDEX`] to the end of the report.
    pub fn payload(&self) -> &[u8] {
        &self.raw[PAYLOAD_INDEX..]
    }

    /// The full input report.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }
}

/// Check whether `raw` is the response to a request for `expected_type`.
///
/// Returns `Ok(None)` for reports that are too short or belong to another
/// data type; the caller keeps waiting. A nonzero status byte is an error
/// whatever the data type.
pub fn match_response(raw: &[u8], expected_type: [u8; 2]) -> Result<Option<ResponsePacket>> {
    if raw.len() < MIN_RESPONSE_LEN {
        return Ok(None);
    }

    let status = raw[STATUS_INDEX];
    if status != STATUS_SUCCESS {
        return Err(Error::DeviceError { status });
    }

    if raw[DATA_TYPE_INDEX..DATA_TYPE_INDEX + 2] != expected_type {
        return Ok(None);
    }

    Ok(Some(ResponsePacket { raw: raw.to_vec() }))
}

/// Decode the liquid temperature in degrees Celsius from a temperatures report.
///
/// `report` is the full input report; `None` if it is too short.
pub fn decode_temperature(report: &[u8]) -> Option<f64> {
    let bytes = report.get(TEMP_VALUE_INDEX_LOW..=TEMP_VALUE_INDEX_HIGH)?;
    let raw = i16::from_le_bytes([bytes[0], bytes[1]]);
    Some(f64::from(raw) / TEMP_SCALING_FACTOR)
}

/// Decode the sensor table from a speeds payload.
///
/// The first byte is the sensor count; each sensor follows as a 3-byte block.
/// A truncated payload yields the sensors decoded before the cut.
pub fn decode_speed_table(payload: &[u8]) -> Vec<Option<i16>> {
    let Some((&count, blocks)) = payload.split_first() else {
        return Vec::new();
    };

    blocks
        .chunks_exact(SENSOR_BLOCK_LEN)
        .take(count as usize)
        .map(|block| match block[0] {
            SENSOR_PRESENT => Some(i16::from_le_bytes([block[1], block[2]])),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(status: u8, data_type: [u8; 2], payload: &[u8]) -> Vec<u8> {
        let mut raw = vec![0u8; INPUT_REPORT_LEN];
        raw[STATUS_INDEX] = status;
        raw[DATA_TYPE_INDEX..DATA_TYPE_INDEX + 2].copy_from_slice(&data_type);
        raw[PAYLOAD_INDEX..PAYLOAD_INDEX + payload.len()].copy_from_slice(payload);
        raw
    }

    #[test]
    fn build_command_frames_header_opcode_payload() {
        let packet = build_command(&opcodes::OPEN_ENDPOINT, &[0x17]);
        let bytes = packet.as_bytes();
        assert_eq!(bytes.len(), OUTPUT_REPORT_LEN);
        assert_eq!(&bytes[..7], &[0x00, 0x00, 0x00, 0x01, 0x0D, 0x01, 0x17]);
        assert!(bytes[7..].iter().all(|&b| b == 0));
    }

    #[test]
    fn build_command_recovers_opcode_and_payload() {
        let cases: [(&[u8], &[u8]); 4] = [
            (&opcodes::ENTER_SOFTWARE_MODE, &[]),
            (&opcodes::CLOSE_ENDPOINT, &[0x21]),
            (&[0xAA], &[0x01, 0x02, 0x03, 0x04]),
            (&[0x01; 8], &[0xFF; 500]),
        ];
        for (opcode, payload) in cases {
            let packet = build_command(opcode, payload);
            let body = &packet.as_bytes()[1 + COMMAND_HEADER.len()..];
            assert_eq!(&body[..opcode.len()], opcode);
            assert_eq!(&body[opcode.len()..opcode.len() + payload.len()], payload);
        }
    }

    #[test]
    fn build_command_accepts_exact_fit() {
        let payload = vec![0x5A; OUTPUT_REPORT_LEN - 1 - COMMAND_HEADER.len() - 2];
        let packet = build_command(&opcodes::READ, &payload);
        assert_eq!(packet.as_bytes()[OUTPUT_REPORT_LEN - 1], 0x5A);
    }

    #[test]
    #[should_panic(expected = "exceeds output report size")]
    fn build_command_rejects_oversized_payload() {
        let payload = vec![0u8; OUTPUT_REPORT_LEN];
        build_command(&opcodes::READ, &payload);
    }

    #[test]
    fn command_encoding_uses_endpoint_id() {
        let close = Command::CloseEndpoint(Endpoint::Temperatures).encode();
        assert_eq!(&close.as_bytes()[4..8], &[0x05, 0x01, 0x01, 0x21]);

        let open = Command::OpenEndpoint(Endpoint::Speeds).encode();
        assert_eq!(&open.as_bytes()[4..7], &[0x0D, 0x01, 0x17]);

        let read = Command::ReadRequest.encode();
        assert_eq!(&read.as_bytes()[4..7], &[0x08, 0x01, 0x00]);
    }

    #[test]
    fn match_response_accepts_expected_type() {
        let raw = report(0x00, [0x25, 0x00], &[0x01]);
        let resp = match_response(&raw, [0x25, 0x00]).unwrap().unwrap();
        assert_eq!(resp.status(), 0);
        assert_eq!(resp.data_type(), [0x25, 0x00]);
        assert_eq!(resp.payload()[0], 0x01);
        assert_eq!(resp.payload().len(), INPUT_REPORT_LEN - PAYLOAD_INDEX);
    }

    #[test]
    fn match_response_skips_other_type() {
        let raw = report(0x00, [0x10, 0x00], &[]);
        assert!(match_response(&raw, [0x25, 0x00]).unwrap().is_none());
    }

    #[test]
    fn match_response_skips_short_report() {
        assert!(match_response(&[0x00, 0x00, 0x00], [0x25, 0x00])
            .unwrap()
            .is_none());
        assert!(match_response(&[], [0x25, 0x00]).unwrap().is_none());
    }

    #[test]
    fn match_response_status_error_wins_over_type_mismatch() {
        let raw = report(0x03, [0x10, 0x00], &[]);
        match match_response(&raw, [0x25, 0x00]) {
            Err(Error::DeviceError { status }) => assert_eq!(status, 0x03),
            other => panic!("expected device error, got {other:?}"),
        }
    }

    #[test]
    fn decode_temperature_scales_tenths() {
        let mut raw = vec![0u8; 13];
        raw[TEMP_VALUE_INDEX_LOW..=TEMP_VALUE_INDEX_HIGH].copy_from_slice(&235i16.to_le_bytes());
        assert_eq!(decode_temperature(&raw), Some(23.5));
    }

    #[test]
    fn decode_temperature_negative() {
        let mut raw = vec![0u8; INPUT_REPORT_LEN];
        raw[TEMP_VALUE_INDEX_LOW..=TEMP_VALUE_INDEX_HIGH].copy_from_slice(&(-52i16).to_le_bytes());
        assert_eq!(decode_temperature(&raw), Some(-5.2));
    }

    #[test]
    fn decode_temperature_short_report() {
        assert_eq!(decode_temperature(&[0u8; 12]), None);
    }

    #[test]
    fn decode_speed_table_status_maps_to_presence() {
        let payload = [
            0x03, // count
            0x00, 0xB0, 0x04, // 1200 rpm
            0x01, 0xFF, 0xFF, // unavailable
            0x00, 0x84, 0x03, // 900 rpm
        ];
        assert_eq!(
            decode_speed_table(&payload),
            vec![Some(1200), None, Some(900)]
        );
    }

    #[test]
    fn decode_speed_table_stops_at_truncation() {
        let payload = [0x04, 0x00, 0x10, 0x00, 0x00, 0x20];
        assert_eq!(decode_speed_table(&payload), vec![Some(16)]);
    }

    #[test]
    fn decode_speed_table_ignores_trailing_blocks() {
        let payload = [0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x00];
        assert_eq!(decode_speed_table(&payload), vec![Some(1)]);
    }

    #[test]
    fn decode_speed_table_empty_payload() {
        assert!(decode_speed_table(&[]).is_empty());
        assert!(decode_speed_table(&[0x00]).is_empty());
    }

    #[test]
    fn decode_speed_table_negative_rpm() {
        let payload = [0x01, 0x00, 0xFE, 0xFF];
        assert_eq!(decode_speed_table(&payload), vec![Some(-2)]);
    }
}
