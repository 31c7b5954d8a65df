//! Transport abstraction and half-duplex timing layer.
//!
//! The protocol engine depends only on the [`Transport`] capability; how the
//! byte stream was opened and configured belongs to whoever constructed it.
//! This module adds the timing discipline of the half-duplex bus on top:
//! a settle delay before transmitting, a deadline-bounded polling read and
//! a receive-buffer drain to resynchronize after failures.

use std::io;
use std::thread;
use std::time::{Duration, Instant};

use log::trace;

use crate::error::{Error, Result};

/// Byte-stream capability required from a serial link.
///
/// The driver owns its transport exclusively; no other component may read
/// or write it concurrently without breaking framing.
pub trait Transport {
    /// Writes the whole buffer in one call.
    fn write(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Number of received bytes waiting to be consumed.
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Consumes one buffered byte.
    fn read_byte(&mut self) -> io::Result<u8>;

    /// Reopens a software-emulated line to flush driver-level buffering
    /// artifacts. Hardware ports have nothing to restart.
    fn restart(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Timing profile of the request/response cycle.
///
/// All waits of the driver are explicit parameters rather than embedded
/// sleeps, so a host with different latency requirements (or a test) can
/// supply its own profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Bus/converter turnaround settle delay before transmitting a frame.
    pub write_settle: Duration,
    /// Sleep between polls while waiting for response bytes.
    pub poll_interval: Duration,
    /// Deadline for collecting a complete response.
    pub response_timeout: Duration,
    /// Wait after writing the ABC period before the confirming re-read.
    pub abc_confirm_delay: Duration,
    /// Wait for the sensor to finish a background calibration.
    pub calibration_wait: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            write_settle: Duration::from_millis(5),
            poll_interval: Duration::from_millis(15),
            response_timeout: Duration::from_millis(100),
            abc_confirm_delay: Duration::from_millis(50),
            calibration_wait: Duration::from_millis(3000),
        }
    }
}

/// Transmits one request frame after the turnaround settle delay.
pub fn write_frame<T: Transport + ?Sized>(
    transport: &mut T,
    timing: &Timing,
    frame: &[u8],
) -> Result<()> {
    thread::sleep(timing.write_settle);
    trace!("tx {frame:02X?}");
    transport.write(frame)?;
    Ok(())
}

/// Collects exactly `expected` response bytes within the response deadline.
///
/// Polls the transport, consuming one byte at a time; between empty polls
/// control is yielded for the poll interval. Hitting the deadline discards
/// the partial buffer and fails with [`Error::Timeout`].
pub fn read_exact<T: Transport + ?Sized>(
    transport: &mut T,
    timing: &Timing,
    expected: usize,
) -> Result<Vec<u8>> {
    let deadline = Instant::now() + timing.response_timeout;
    let mut buf = Vec::with_capacity(expected);
    while buf.len() < expected {
        if transport.bytes_available()? > 0 {
            buf.push(transport.read_byte()?);
        } else if Instant::now() > deadline {
            return Err(Error::Timeout {
                expected,
                received: buf.len(),
            });
        } else {
            thread::sleep(timing.poll_interval);
        }
    }
    trace!("rx {buf:02X?}");
    Ok(buf)
}

/// Drains stray buffered bytes so the next exchange starts on a clean line.
///
/// Restarts the transport first where that is meaningful (software-emulated
/// serial), then discards everything still buffered.
pub fn drain<T: Transport + ?Sized>(transport: &mut T) -> Result<()> {
    transport.restart()?;
    let mut discarded = 0usize;
    while transport.bytes_available()? > 0 {
        transport.read_byte()?;
        discarded += 1;
    }
    if discarded > 0 {
        trace!("drained {discarded} stray bytes");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct LoopbackTransport {
        rx: VecDeque<u8>,
        written: Vec<Vec<u8>>,
        restarts: usize,
    }

    impl Transport for LoopbackTransport {
        fn write(&mut self, buf: &[u8]) -> io::Result<()> {
            self.written.push(buf.to_vec());
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

        fn restart(&mut self) -> io::Result<()> {
            self.restarts += 1;
            Ok(())
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

    #[test]
    fn read_exact_collects_expected_bytes() {
        let mut transport = LoopbackTransport::default();
        transport.rx.extend([0xFE, 0x04, 0x02, 0x01, 0xF4, 0xAD, 0x33]);
        let buf = read_exact(&mut transport, &fast_timing(), 7).unwrap();
        assert_eq!(buf, vec![0xFE, 0x04, 0x02, 0x01, 0xF4, 0xAD, 0x33]);
    }

    #[test]
    fn read_exact_times_out_on_partial_response() {
        let mut transport = LoopbackTransport::default();
        transport.rx.extend([0xFE, 0x04]);
        assert_matches!(
            read_exact(&mut transport, &fast_timing(), 7),
            Err(Error::Timeout {
                expected: 7,
                received: 2
            })
        );
    }

    #[test]
    fn write_frame_sends_whole_buffer() {
        let mut transport = LoopbackTransport::default();
        let frame = [0xFE, 0x04, 0x00, 0x03, 0x00, 0x01, 0xD5, 0xC5];
        write_frame(&mut transport, &fast_timing(), &frame).unwrap();
        assert_eq!(transport.written, vec![frame.to_vec()]);
    }

    #[test]
    fn drain_restarts_and_discards() {
        let mut transport = LoopbackTransport::default();
        transport.rx.extend([0x00, 0xFF, 0x42]);
        drain(&mut transport).unwrap();
        assert_eq!(transport.restarts, 1);
        assert!(transport.rx.is_empty());
    }
}
