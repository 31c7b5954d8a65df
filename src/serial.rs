//! `serialport`-backed transport for the S8's serial line.
//!
//! The S8 line discipline is fixed by the sensor firmware (9600 baud, 8 data
//! bits, no parity, one stop bit, no flow control), so opening a device
//! takes nothing but its path.

use std::io::{self, Read, Write};
use std::time::Duration;

use crate::transport::Transport;

/// Baud rate fixed by the sensor firmware.
pub const BAUD_RATE: u32 = 9600;
/// The parity used for serial communication.
pub const PARITY: serialport::Parity = serialport::Parity::None;
/// The number of stop bits used for serial communication.
pub const STOP_BITS: serialport::StopBits = serialport::StopBits::One;
/// The number of data bits used for serial communication.
pub const DATA_BITS: serialport::DataBits = serialport::DataBits::Eight;

/// Transport over an exclusively owned hardware serial port.
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    /// Opens `device` (e.g. `/dev/ttyUSB0`, `COM3`) with the fixed S8
    /// line settings.
    pub fn open(device: &str) -> serialport::Result<Self> {
        let port = serialport::new(device, BAUD_RATE)
            .parity(PARITY)
            .stop_bits(STOP_BITS)
            .data_bits(DATA_BITS)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()?;
        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.port.write_all(buf)?;
        self.port.flush()
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let pending = self.port.bytes_to_read().map_err(io::Error::from)?;
        Ok(pending as usize)
    }

    fn read_byte(&mut self) -> io::Result<u8> {
        let mut byte = [0u8; 1];
        self.port.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    // A hardware UART keeps the default no-op restart; only
    // software-emulated lines need reopening to clear driver buffers.
}
