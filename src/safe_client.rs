//! Thread-safe wrapper around the blocking driver.
//!
//! The half-duplex bus admits exactly one outstanding request, so a driver
//! shared between threads must serialize whole operations. [`SafeClient`]
//! packages that invariant: every method locks the inner driver for the
//! full duration of the operation, calibration wait included.
//!
//! ## Example
//!
//! ```no_run
//! use senseair_s8_lib::{client::SenseairS8, safe_client::SafeClient, serial::SerialTransport};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = SerialTransport::open("/dev/ttyUSB0")?;
//!     let client = SafeClient::new(SenseairS8::new(transport));
//!
//!     let poller = client.clone();
//!     std::thread::spawn(move || {
//!         if let Ok(co2) = poller.read_co2() {
//!             println!("CO2: {co2} ppm");
//!         }
//!     });
//!
//!     let info = client.initialize()?;
//!     println!("sensor: {info:?}");
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex};

use crate::client::{SenseairS8, SensorInfo};
use crate::error::Result;
use crate::protocol as proto;
use crate::transport::Transport;

/// Shares one [`SenseairS8`] driver between threads.
pub struct SafeClient<T: Transport> {
    driver: Arc<Mutex<SenseairS8<T>>>,
}

// Cloning shares the driver; the transport itself is never cloned.
impl<T: Transport> Clone for SafeClient<T> {
    fn clone(&self) -> Self {
        Self {
            driver: self.driver.clone(),
        }
    }
}

impl<T: Transport> SafeClient<T> {
    /// Wraps a driver in a shared, serializing handle.
    pub fn new(driver: SenseairS8<T>) -> Self {
        Self {
            driver: Arc::new(Mutex::new(driver)),
        }
    }

    /// Creates a handle from an already shared driver.
    pub fn from_shared(driver: Arc<Mutex<SenseairS8<T>>>) -> Self {
        Self { driver }
    }

    /// Clones the shared driver handle.
    pub fn clone_shared(&self) -> Arc<Mutex<SenseairS8<T>>> {
        self.driver.clone()
    }

    /// Reads the identification and configuration registers once.
    pub fn initialize(&self) -> Result<SensorInfo> {
        self.driver.lock().unwrap().initialize()
    }

    /// Reads the current CO2 concentration.
    pub fn read_co2(&self) -> Result<proto::Co2> {
        self.driver.lock().unwrap().read_co2()
    }

    /// Reads the configured ABC period.
    pub fn read_abc_period(&self) -> Result<proto::AbcPeriod> {
        self.driver.lock().unwrap().read_abc_period()
    }

    /// Writes the ABC period and returns the confirmed value.
    pub fn set_abc_period(&self, period: proto::AbcPeriod) -> Result<proto::AbcPeriod> {
        self.driver.lock().unwrap().set_abc_period(period)
    }

    /// Triggers a background calibration; blocks for the full wait.
    pub fn background_calibration(&self) -> Result<bool> {
        self.driver.lock().unwrap().background_calibration()
    }

    /// Reads one raw input register.
    pub fn read_input_register(&self, register: u8) -> Result<u16> {
        self.driver.lock().unwrap().read_input_register(register)
    }

    /// Reads one raw holding register.
    pub fn read_holding_register(&self, register: u8) -> Result<u16> {
        self.driver.lock().unwrap().read_holding_register(register)
    }

    /// Writes one raw holding register.
    pub fn write_holding_register(&self, register: u8, value: u16) -> Result<()> {
        self.driver
            .lock()
            .unwrap()
            .write_holding_register(register, value)
    }
}
