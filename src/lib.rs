//! A driver for the SenseAir S8 CO2 sensor speaking Modbus RTU over a
//! half-duplex serial line.
//!
//! The crate implements the master side of the exchange: frame construction,
//! CRC16 checksum computation and verification, timeout-bounded response
//! collection over an unreliable byte stream, and the mapping of the S8's
//! registers (sensor ID, firmware version, CO2 concentration, ABC period,
//! calibration command pair) onto that protocol engine.
//!
//! Layers, leaf first:
//!
//! 1. [`protocol`] — pure frame codec and register map; no I/O.
//! 2. [`transport`] — the abstract [`transport::Transport`] byte-stream
//!    capability and the half-duplex timing discipline (settle delay,
//!    bounded polling read, receive-buffer drain).
//! 3. [`client`] — register access operations composed into the sensor
//!    facade, [`client::SenseairS8`].
//! 4. [`safe_client`] — a mutex-serialized handle for concurrent hosts.
//!
//! The driver never opens or configures its transport; inject one at
//! construction (the [`serial`] module provides a `serialport`-backed
//! implementation behind the `serial` feature).
//!
//! ## Quick start
//!
//! ```no_run
//! use senseair_s8_lib::{client::SenseairS8, serial::SerialTransport};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = SerialTransport::open("/dev/ttyUSB0")?;
//!     let mut sensor = SenseairS8::new(transport);
//!
//!     let info = sensor.initialize()?;
//!     if let Some(id) = info.sensor_id {
//!         println!("Sensor ID: {id}");
//!     }
//!
//!     let co2 = sensor.read_co2()?;
//!     println!("CO2: {co2} ppm");
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod protocol;
pub mod safe_client;
pub mod transport;

#[cfg_attr(docsrs, doc(cfg(feature = "serial")))]
#[cfg(feature = "serial")]
pub mod serial;

pub use error::{Error, Result};
