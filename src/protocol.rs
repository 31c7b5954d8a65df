//! Modbus RTU protocol for the SenseAir S8 CO2 sensor.
//!
//! This module is pure: it builds request frames, validates response frames
//! and maps the sensor's register layout onto strongly typed values. It never
//! touches a transport.
//!
//! The S8 speaks a small subset of Modbus RTU over its serial line: read
//! holding register (0x03), read input register (0x04) and write single
//! holding register (0x06), always addressed with the "any sensor" slave
//! address `0xFE` and always transferring exactly one register per request.

use std::fmt;

/// Slave address the S8 answers regardless of its configured bus address.
pub const SLAVE_ADDRESS: u8 = 0xFE;

/// Every request is a fixed 8-byte frame.
pub const REQUEST_FRAME_LEN: usize = 8;
/// Single-register read responses are 7 bytes.
pub const READ_RESPONSE_LEN: usize = 7;
/// A write is answered by an 8-byte echo of the request.
pub const WRITE_ECHO_LEN: usize = 8;

/// Register count field for single-register read requests.
pub const READ_QUANTITY: u16 = 1;

/// Frame-level errors detected while decoding a sensor response.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The response buffer is shorter than the frame it should contain.
    #[error("response truncated: expected {expected} bytes, got {got}")]
    FrameTooShort { expected: usize, got: usize },

    /// The byte-count field of a read response was not 2.
    #[error("invalid byte count: expected 2, got {got}")]
    InvalidByteCount { got: u8 },

    /// The trailing checksum disagrees with the one recomputed over the payload.
    #[error("checksum mismatch: expected {expected:#06X}, got {got:#06X}")]
    CrcMismatch { expected: u16, got: u16 },

    /// A write echo did not reproduce the request.
    #[error("write echo mismatch: request {requested:02X?}, echo {echoed:02X?}")]
    EchoMismatch { requested: [u8; 6], echoed: [u8; 6] },
}

/// Modbus function codes understood by the S8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FunctionCode {
    ReadHoldingRegister = 0x03,
    ReadInputRegister = 0x04,
    WriteHoldingRegister = 0x06,
}

/// Computes the Modbus RTU CRC16 (polynomial 0xA001, initial value 0xFFFF).
///
/// The result is transmitted low byte first.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Builds the 8-byte request frame for `function`.
///
/// `value` is the register count for reads and the value to store for writes.
/// S8 registers all fit one byte, so the register high byte is always zero.
pub fn build_request(function: FunctionCode, register: u8, value: u16) -> [u8; REQUEST_FRAME_LEN] {
    let mut frame = [
        SLAVE_ADDRESS,
        function as u8,
        0x00,
        register,
        (value >> 8) as u8,
        (value & 0xFF) as u8,
        0x00,
        0x00,
    ];
    let crc = crc16(&frame[..6]);
    frame[6] = (crc & 0xFF) as u8;
    frame[7] = (crc >> 8) as u8;
    frame
}

/// Checks the trailing checksum of `frame`, where the last two bytes carry
/// the CRC of everything before them, low byte first.
fn check_crc(frame: &[u8]) -> Result<(), Error> {
    let payload_len = frame.len() - 2;
    let expected = crc16(&frame[..payload_len]);
    let got = frame[payload_len] as u16 + frame[payload_len + 1] as u16 * 256;
    if expected != got {
        return Err(Error::CrcMismatch { expected, got });
    }
    Ok(())
}

/// Validates a 7-byte single-register read response and extracts the value.
///
/// The byte-count field must be 2 and the trailing checksum must verify;
/// the register value is big-endian on the wire.
pub fn parse_read_response(frame: &[u8]) -> Result<u16, Error> {
    if frame.len() < READ_RESPONSE_LEN {
        return Err(Error::FrameTooShort {
            expected: READ_RESPONSE_LEN,
            got: frame.len(),
        });
    }
    if frame[2] != 2 {
        return Err(Error::InvalidByteCount { got: frame[2] });
    }
    check_crc(&frame[..READ_RESPONSE_LEN])?;
    Ok(frame[3] as u16 * 256 + frame[4] as u16)
}

/// Validates the 8-byte echo of a single-register write.
///
/// The echo must carry a consistent checksum and reproduce the request
/// byte for byte; a sensor that stored a different value echoes that
/// difference back.
pub fn parse_write_echo(frame: &[u8], request: &[u8; REQUEST_FRAME_LEN]) -> Result<(), Error> {
    if frame.len() < WRITE_ECHO_LEN {
        return Err(Error::FrameTooShort {
            expected: WRITE_ECHO_LEN,
            got: frame.len(),
        });
    }
    check_crc(&frame[..WRITE_ECHO_LEN])?;
    if frame[..6] != request[..6] {
        let mut requested = [0u8; 6];
        let mut echoed = [0u8; 6];
        requested.copy_from_slice(&request[..6]);
        echoed.copy_from_slice(&frame[..6]);
        return Err(Error::EchoMismatch { requested, echoed });
    }
    Ok(())
}

/// CO2 concentration in parts per million.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Co2(u16);

impl Co2 {
    /// Input register holding the current CO2 reading.
    pub const ADDRESS: u8 = 0x03;

    pub const fn decode(value: u16) -> Self {
        Self(value)
    }

    pub const fn ppm(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for Co2 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Factory-programmed 32-bit sensor identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SensorId(u32);

impl SensorId {
    /// Input register holding the identifier's upper 16 bits.
    pub const ADDRESS_HIGH: u8 = 0x1D;
    /// Input register holding the identifier's lower 16 bits.
    pub const ADDRESS_LOW: u8 = 0x1E;

    /// Combines the two identifier registers, high register first.
    pub const fn decode(high: u16, low: u16) -> Self {
        Self((high as u32) * 65536 + low as u32)
    }

    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

/// Sensor firmware revision, major in the high byte, minor in the low byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
}

impl FirmwareVersion {
    /// Input register holding the firmware revision.
    pub const ADDRESS: u8 = 0x1C;

    pub const fn decode(value: u16) -> Self {
        Self {
            major: (value >> 8) as u8,
            minor: (value & 0xFF) as u8,
        }
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Automatic Baseline Correction period in hours. Zero disables ABC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AbcPeriod(u16);

impl AbcPeriod {
    /// Holding register storing the ABC period.
    pub const ADDRESS: u8 = 0x1F;

    /// ABC switched off.
    pub const DISABLED: AbcPeriod = AbcPeriod(0);
    /// Period the sensor ships with.
    pub const FACTORY_DEFAULT: AbcPeriod = AbcPeriod(180);

    pub const fn decode(value: u16) -> Self {
        Self(value)
    }

    pub const fn encode(&self) -> u16 {
        self.0
    }

    pub const fn hours(&self) -> u16 {
        self.0
    }

    pub const fn is_disabled(&self) -> bool {
        self.0 == 0
    }
}

impl From<u16> for AbcPeriod {
    fn from(hours: u16) -> Self {
        Self(hours)
    }
}

impl fmt::Display for AbcPeriod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Register pair driving the one-shot background calibration command.
///
/// The acknowledgement register is cleared before the command word is
/// written; the sensor sets [`Self::ACK_MASK`] once the calibration
/// completed.
#[derive(Debug)]
pub struct BackgroundCalibration;

impl BackgroundCalibration {
    /// Holding register carrying the acknowledgement bits.
    pub const ACK_ADDRESS: u8 = 0x00;
    /// Holding register receiving calibration commands.
    pub const COMMAND_ADDRESS: u8 = 0x01;
    /// Command word that starts a background calibration.
    pub const COMMAND: u16 = 0x7C06;
    /// Acknowledgement bit set after a completed background calibration.
    pub const ACK_MASK: u16 = 0x0020;

    pub const fn is_acknowledged(ack: u16) -> bool {
        ack & Self::ACK_MASK != 0
    }
}
