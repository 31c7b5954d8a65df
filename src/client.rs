//! Blocking driver for one SenseAir S8 sensor.
//!
//! [`SenseairS8`] layers the register access operations (read input
//! register, read holding register, write holding register) on top of the
//! frame codec and the transport timing layer, and maps the sensor's domain
//! operations onto them.
//!
//! The driver is fully synchronous: exactly one request is in flight at any
//! time, matching the half-duplex bus where only the master initiates and
//! only one device may drive the line. Every wait is bounded by the
//! [`Timing`] profile. There is no cancellation; a caller that wants to give
//! up lets the bounded timeout elapse. No operation retries automatically —
//! retry policy belongs to the caller.

use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::error::Result;
use crate::protocol as proto;
use crate::transport::{self, Timing, Transport};

/// Snapshot of the sensor's identification and configuration registers.
///
/// Captured by [`SenseairS8::initialize`]. A `None` field means that read
/// failed; initialization never aborts on partial failure. The snapshot is
/// only as fresh as the last explicit read — the driver performs no
/// background refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SensorInfo {
    pub sensor_id: Option<proto::SensorId>,
    pub firmware_version: Option<proto::FirmwareVersion>,
    pub abc_period: Option<proto::AbcPeriod>,
}

/// Blocking Modbus RTU master for an S8 sensor on an exclusively owned
/// serial line.
///
/// Callers in a concurrent host must serialize all operations through one
/// driver instance per physical bus; [`crate::safe_client::SafeClient`]
/// packages that invariant behind a mutex.
pub struct SenseairS8<T: Transport> {
    transport: T,
    timing: Timing,
}

impl<T: Transport> SenseairS8<T> {
    /// Creates a driver with the default [`Timing`] profile.
    pub fn new(transport: T) -> Self {
        Self::with_timing(transport, Timing::default())
    }

    /// Creates a driver with a caller-supplied timing profile.
    pub fn with_timing(transport: T, timing: Timing) -> Self {
        Self { transport, timing }
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Replaces the deadline for collecting a response.
    pub fn set_response_timeout(&mut self, timeout: Duration) {
        self.timing.response_timeout = timeout;
    }

    /// Consumes the driver and hands the transport back.
    pub fn into_transport(self) -> T {
        self.transport
    }

    // --- register access layer ---

    /// Discards stray bytes left over from a failed or aborted exchange.
    ///
    /// Done once per logical sensor operation, before the first request of
    /// that operation; the register operations themselves never clear.
    pub fn clear_receive_buffer(&mut self) -> Result<()> {
        transport::drain(&mut self.transport)
    }

    /// Reads one 16-bit input register.
    pub fn read_input_register(&mut self, register: u8) -> Result<u16> {
        self.read_register(proto::FunctionCode::ReadInputRegister, register)
    }

    /// Reads one 16-bit holding register.
    pub fn read_holding_register(&mut self, register: u8) -> Result<u16> {
        self.read_register(proto::FunctionCode::ReadHoldingRegister, register)
    }

    fn read_register(&mut self, function: proto::FunctionCode, register: u8) -> Result<u16> {
        let request = proto::build_request(function, register, proto::READ_QUANTITY);
        transport::write_frame(&mut self.transport, &self.timing, &request)?;
        let response =
            transport::read_exact(&mut self.transport, &self.timing, proto::READ_RESPONSE_LEN)?;
        let value = proto::parse_read_response(&response)?;
        debug!("register {register:#04X} ({function:?}) = {value:#06X}");
        Ok(value)
    }

    /// Writes one 16-bit holding register and verifies the sensor's echo.
    pub fn write_holding_register(&mut self, register: u8, value: u16) -> Result<()> {
        let request =
            proto::build_request(proto::FunctionCode::WriteHoldingRegister, register, value);
        transport::write_frame(&mut self.transport, &self.timing, &request)?;
        let echo = transport::read_exact(&mut self.transport, &self.timing, proto::WRITE_ECHO_LEN)?;
        proto::parse_write_echo(&echo, &request)?;
        debug!("register {register:#04X} written = {value:#06X}");
        Ok(())
    }

    // --- sensor facade ---

    /// Reads the identification and configuration registers once and
    /// returns the snapshot.
    ///
    /// Each field is read independently; a failed read leaves that field
    /// empty and is logged, the remaining fields are still attempted.
    pub fn initialize(&mut self) -> Result<SensorInfo> {
        self.clear_receive_buffer()?;
        let sensor_id = self
            .read_sensor_id()
            .map_err(|err| warn!("sensor ID read failed: {err}"))
            .ok();
        let firmware_version = self
            .read_firmware_version()
            .map_err(|err| warn!("firmware version read failed: {err}"))
            .ok();
        let abc_period = self
            .read_abc_period()
            .map_err(|err| warn!("ABC period read failed: {err}"))
            .ok();
        Ok(SensorInfo {
            sensor_id,
            firmware_version,
            abc_period,
        })
    }

    /// Reads the current CO2 concentration.
    pub fn read_co2(&mut self) -> Result<proto::Co2> {
        self.clear_receive_buffer()?;
        let raw = self.read_input_register(proto::Co2::ADDRESS)?;
        Ok(proto::Co2::decode(raw))
    }

    fn read_sensor_id(&mut self) -> Result<proto::SensorId> {
        let high = self.read_input_register(proto::SensorId::ADDRESS_HIGH)?;
        let low = self.read_input_register(proto::SensorId::ADDRESS_LOW)?;
        Ok(proto::SensorId::decode(high, low))
    }

    fn read_firmware_version(&mut self) -> Result<proto::FirmwareVersion> {
        let raw = self.read_input_register(proto::FirmwareVersion::ADDRESS)?;
        Ok(proto::FirmwareVersion::decode(raw))
    }

    /// Reads the configured ABC period.
    pub fn read_abc_period(&mut self) -> Result<proto::AbcPeriod> {
        let raw = self.read_holding_register(proto::AbcPeriod::ADDRESS)?;
        Ok(proto::AbcPeriod::decode(raw))
    }

    /// Writes the ABC period and returns the value the sensor reports back.
    ///
    /// The write is not trusted until the confirming re-read after the
    /// apply delay; the returned period is what the sensor actually stores.
    pub fn set_abc_period(&mut self, period: proto::AbcPeriod) -> Result<proto::AbcPeriod> {
        self.clear_receive_buffer()?;
        self.write_holding_register(proto::AbcPeriod::ADDRESS, period.encode())?;
        thread::sleep(self.timing.abc_confirm_delay);
        let confirmed = self.read_abc_period()?;
        if confirmed != period {
            warn!("ABC period readback {confirmed} differs from requested {period}");
        }
        Ok(confirmed)
    }

    /// Triggers a background calibration and reports the acknowledgement.
    ///
    /// Clears the acknowledgement register, writes the calibration command,
    /// blocks for the full calibration wait and reads the acknowledgement
    /// back. `Ok(true)` means the sensor set the acknowledgement bit;
    /// `Ok(false)` means it answered without acknowledging. A failure of
    /// any step aborts the sequence.
    ///
    /// The sensor should sit in fresh air for the whole wait.
    pub fn background_calibration(&mut self) -> Result<bool> {
        self.clear_receive_buffer()?;
        self.write_holding_register(proto::BackgroundCalibration::ACK_ADDRESS, 0x0000)?;
        self.write_holding_register(
            proto::BackgroundCalibration::COMMAND_ADDRESS,
            proto::BackgroundCalibration::COMMAND,
        )?;
        thread::sleep(self.timing.calibration_wait);
        let ack = self.read_holding_register(proto::BackgroundCalibration::ACK_ADDRESS)?;
        debug!("calibration acknowledgement register = {ack:#06X}");
        Ok(proto::BackgroundCalibration::is_acknowledged(ack))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use assert_matches::assert_matches;
    use std::collections::VecDeque;
    use std::io;

    /// Transport that releases the next scripted reply each time a request
    /// frame is written, like a well-behaved slave on the bus.
    #[derive(Default)]
    struct ScriptedTransport {
        replies: VecDeque<Vec<u8>>,
        rx: VecDeque<u8>,
        written: Vec<Vec<u8>>,
    }

    impl ScriptedTransport {
        fn reply(mut self, frame: &[u8]) -> Self {
            self.replies.push_back(frame.to_vec());
            self
        }

        /// Scripts a request the sensor never answers.
        fn silence(self) -> Self {
            self.reply(&[])
        }
    }

    impl Transport for ScriptedTransport {
        fn write(&mut self, buf: &[u8]) -> io::Result<()> {
            self.written.push(buf.to_vec());
            if let Some(reply) = self.replies.pop_front() {
                self.rx.extend(reply);
            }
            Ok(())
        }

        fn bytes_available(&mut self) -> io::Result<usize> {
            Ok(self.rx.len())
        }

        fn read_byte(&mut self) -> io::Result<u8> {
            self.rx
                .pop_front()
                .ok_or_else(|| io::Error::new(io::ErrorKind::WouldBlock, "rx empty"))
        }
    }

    fn fast_timing() -> Timing {
        Timing {
            write_settle: Duration::ZERO,
            poll_interval: Duration::from_millis(1),
            response_timeout: Duration::from_millis(20),
            abc_confirm_delay: Duration::ZERO,
            calibration_wait: Duration::ZERO,
        }
    }

    fn driver(transport: ScriptedTransport) -> SenseairS8<ScriptedTransport> {
        SenseairS8::with_timing(transport, fast_timing())
    }

    #[test]
    fn read_co2_end_to_end() {
        let transport = ScriptedTransport::default().reply(&[0xFE, 0x04, 0x02, 0x01, 0xF4, 0xAD, 0x33]);
        let mut sensor = driver(transport);
        let co2 = sensor.read_co2().unwrap();
        assert_eq!(co2.ppm(), 500);
        assert_eq!(
            sensor.into_transport().written,
            vec![vec![0xFE, 0x04, 0x00, 0x03, 0x00, 0x01, 0xD5, 0xC5]]
        );
    }

    #[test]
    fn read_co2_times_out_on_silent_sensor() {
        let mut sensor = driver(ScriptedTransport::default().silence());
        assert_matches!(
            sensor.read_co2(),
            Err(Error::Timeout {
                expected: 7,
                received: 0
            })
        );
    }

    #[test]
    fn read_rejects_wrong_byte_count() {
        let transport = ScriptedTransport::default().reply(&[0xFE, 0x04, 0x03, 0x01, 0xF4, 0xAD, 0x33]);
        let mut sensor = driver(transport);
        assert_matches!(
            sensor.read_co2(),
            Err(Error::Protocol(proto::Error::InvalidByteCount { got: 3 }))
        );
    }

    #[test]
    fn read_rejects_corrupted_checksum() {
        // CO2 response with one flipped bit in the CRC low byte.
        let transport = ScriptedTransport::default().reply(&[0xFE, 0x04, 0x02, 0x01, 0xF4, 0xAC, 0x33]);
        let mut sensor = driver(transport);
        assert_matches!(
            sensor.read_co2(),
            Err(Error::Protocol(proto::Error::CrcMismatch { .. }))
        );
    }

    #[test]
    fn initialize_builds_full_snapshot() {
        let transport = ScriptedTransport::default()
            .reply(&[0xFE, 0x04, 0x02, 0x00, 0x01, 0x6C, 0xE4]) // ID high = 0x0001
            .reply(&[0xFE, 0x04, 0x02, 0x00, 0x02, 0x2C, 0xE5]) // ID low = 0x0002
            .reply(&[0xFE, 0x04, 0x02, 0x01, 0x02, 0x2D, 0x75]) // firmware 0x0102
            .reply(&[0xFE, 0x03, 0x02, 0x00, 0xB4, 0xAC, 0x27]); // ABC 180 h
        let mut sensor = driver(transport);
        let info = sensor.initialize().unwrap();
        assert_eq!(info.sensor_id, Some(proto::SensorId::decode(0x0001, 0x0002)));
        assert_eq!(info.sensor_id.unwrap().value(), 65538);
        assert_eq!(
            info.firmware_version,
            Some(proto::FirmwareVersion { major: 1, minor: 2 })
        );
        assert_eq!(info.abc_period, Some(proto::AbcPeriod::FACTORY_DEFAULT));
    }

    #[test]
    fn initialize_keeps_going_after_partial_failure() {
        // The ID low register never answers; firmware and ABC still arrive.
        let transport = ScriptedTransport::default()
            .reply(&[0xFE, 0x04, 0x02, 0x00, 0x01, 0x6C, 0xE4])
            .silence()
            .reply(&[0xFE, 0x04, 0x02, 0x01, 0x02, 0x2D, 0x75])
            .reply(&[0xFE, 0x03, 0x02, 0x00, 0xB4, 0xAC, 0x27]);
        let mut sensor = driver(transport);
        let info = sensor.initialize().unwrap();
        assert_eq!(info.sensor_id, None);
        assert_eq!(
            info.firmware_version,
            Some(proto::FirmwareVersion { major: 1, minor: 2 })
        );
        assert_eq!(info.abc_period, Some(proto::AbcPeriod::FACTORY_DEFAULT));
    }

    #[test]
    fn set_abc_period_confirms_via_reread() {
        let write_echo = [0xFE, 0x06, 0x00, 0x1F, 0x00, 0xB4, 0xAC, 0x74];
        let transport = ScriptedTransport::default()
            .reply(&write_echo)
            .reply(&[0xFE, 0x03, 0x02, 0x00, 0xB4, 0xAC, 0x27]);
        let mut sensor = driver(transport);
        let confirmed = sensor.set_abc_period(proto::AbcPeriod::from(180)).unwrap();
        assert_eq!(confirmed, proto::AbcPeriod::FACTORY_DEFAULT);
        let written = sensor.into_transport().written;
        assert_eq!(written[0], write_echo.to_vec());
        assert_eq!(
            written[1],
            vec![0xFE, 0x03, 0x00, 0x1F, 0x00, 0x01, 0xA1, 0xC3]
        );
    }

    #[test]
    fn set_abc_period_fails_on_echo_mismatch() {
        // Valid CRC but the sensor echoes 181 instead of 180.
        let transport =
            ScriptedTransport::default().reply(&[0xFE, 0x06, 0x00, 0x1F, 0x00, 0xB5, 0x6D, 0xB4]);
        let mut sensor = driver(transport);
        assert_matches!(
            sensor.set_abc_period(proto::AbcPeriod::from(180)),
            Err(Error::Protocol(proto::Error::EchoMismatch { .. }))
        );
    }

    #[test]
    fn background_calibration_acknowledged() {
        let transport = ScriptedTransport::default()
            .reply(&[0xFE, 0x06, 0x00, 0x00, 0x00, 0x00, 0x9D, 0xC5]) // ack clear echo
            .reply(&[0xFE, 0x06, 0x00, 0x01, 0x7C, 0x06, 0x6C, 0xC7]) // command echo
            .reply(&[0xFE, 0x03, 0x02, 0x00, 0x20, 0xAD, 0x88]); // ack = 0x0020
        let mut sensor = driver(transport);
        assert_matches!(sensor.background_calibration(), Ok(true));
        let written = sensor.into_transport().written;
        assert_eq!(
            written,
            vec![
                vec![0xFE, 0x06, 0x00, 0x00, 0x00, 0x00, 0x9D, 0xC5],
                vec![0xFE, 0x06, 0x00, 0x01, 0x7C, 0x06, 0x6C, 0xC7],
                vec![0xFE, 0x03, 0x00, 0x00, 0x00, 0x01, 0x90, 0x05],
            ]
        );
    }

    #[test]
    fn background_calibration_not_acknowledged() {
        let transport = ScriptedTransport::default()
            .reply(&[0xFE, 0x06, 0x00, 0x00, 0x00, 0x00, 0x9D, 0xC5])
            .reply(&[0xFE, 0x06, 0x00, 0x01, 0x7C, 0x06, 0x6C, 0xC7])
            .reply(&[0xFE, 0x03, 0x02, 0x00, 0x00, 0xAC, 0x50]); // ack bit clear
        let mut sensor = driver(transport);
        assert_matches!(sensor.background_calibration(), Ok(false));
    }

    #[test]
    fn background_calibration_aborts_when_ack_clear_fails() {
        let mut sensor = driver(ScriptedTransport::default().silence());
        assert_matches!(sensor.background_calibration(), Err(Error::Timeout { .. }));
        // The command register write never happened.
        assert_eq!(sensor.into_transport().written.len(), 1);
    }

    #[test]
    fn background_calibration_fails_when_ack_read_times_out() {
        let transport = ScriptedTransport::default()
            .reply(&[0xFE, 0x06, 0x00, 0x00, 0x00, 0x00, 0x9D, 0xC5])
            .reply(&[0xFE, 0x06, 0x00, 0x01, 0x7C, 0x06, 0x6C, 0xC7])
            .silence();
        let mut sensor = driver(transport);
        assert_matches!(sensor.background_calibration(), Err(Error::Timeout { .. }));
    }

    #[test]
    fn operations_drain_stale_bytes_first() {
        // A leftover fragment from an aborted exchange sits in the buffer.
        let mut transport = ScriptedTransport::default().reply(&[0xFE, 0x04, 0x02, 0x01, 0xF4, 0xAD, 0x33]);
        transport.rx.extend([0xFE, 0x04, 0x02]);
        let mut sensor = driver(transport);
        let co2 = sensor.read_co2().unwrap();
        assert_eq!(co2.ppm(), 500);
    }
}
