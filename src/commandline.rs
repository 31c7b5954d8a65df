use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use senseair_s8_lib::protocol as proto;
use std::time::Duration;

fn default_device_name() -> String {
    if cfg!(target_os = "windows") {
        String::from("COM1") // Common default for Windows, though may vary.
    } else {
        String::from("/dev/ttyUSB0") // Common default for USB-to-serial adapters on Linux.
    }
}

fn parse_register(s: &str) -> Result<u8, String> {
    clap_num::maybe_hex::<u8>(s).map_err(|e| format!("Invalid register address format: {e}"))
}

fn parse_abc_period(s: &str) -> Result<proto::AbcPeriod, String> {
    let hours = clap_num::maybe_hex::<u16>(s)
        .map_err(|e| format!("Invalid ABC period format: {e}"))?;
    Ok(proto::AbcPeriod::from(hours))
}

/// Which of the two Modbus register classes to address.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterKind {
    /// Read-only input register (function 0x04).
    Input,
    /// Read/write holding register (function 0x03).
    Holding,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Read and display the current CO2 concentration.
    Read,

    /// Read and display the sensor ID, firmware version and ABC period.
    Info,

    /// Read and display the Automatic Baseline Correction period in hours.
    ReadAbc,

    /// Set the Automatic Baseline Correction period.
    /// The sensor is given time to apply the setting and the stored value
    /// is read back for confirmation; the confirmed value is printed.
    #[clap(verbatim_doc_comment)]
    SetAbc {
        /// New ABC period in hours. `0` disables ABC.
        /// Can be specified in decimal or hexadecimal (e.g., "180" or "0xB4").
        #[arg(value_parser = parse_abc_period, verbatim_doc_comment)]
        period: proto::AbcPeriod,
    },

    /// Trigger a background calibration against fresh air.
    /// The sensor must sit in fresh air (approx. 400 ppm) for the whole
    /// calibration wait; the command blocks until the sensor acknowledges.
    /// **Warning:** Calibrating indoors will skew all subsequent readings.
    #[clap(verbatim_doc_comment)]
    Calibrate,

    /// Read a single raw register, for diagnostics.
    ReadRegister {
        /// Register class to address.
        #[arg(value_enum)]
        kind: RegisterKind,
        /// Register address (decimal or hexadecimal, e.g. "0x1F").
        #[arg(value_parser = parse_register)]
        register: u8,
    },

    /// Run in daemon mode: continuously poll the CO2 concentration and
    /// print readings to the standard output.
    #[clap(verbatim_doc_comment)]
    Daemon {
        /// Interval between readings (e.g., "10s", "1m").
        #[arg(value_parser = humantime::parse_duration, short, long, default_value = "10sec")]
        poll_interval: Duration,
    },
}

const fn about_text() -> &'static str {
    "SenseAir S8 CO2 monitor CLI - Interact with S8 sensors via Modbus RTU."
}

#[derive(Parser, Debug)]
#[command(name="co2mon", author, version, about=about_text(), long_about = None, propagate_version = true)]
pub struct CliArgs {
    /// Configure verbosity of logging output.
    /// -v for info, -vv for debug, -vvv for trace. Default is off.
    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,

    /// Serial port device name.
    /// Examples: "/dev/ttyUSB0" (Linux), "COM3" (Windows).
    /// The S8 line discipline is fixed at 9600 8N1.
    #[arg(short, long, default_value_t = default_device_name(), verbatim_doc_comment)]
    pub device: String,

    /// Deadline for collecting a sensor response.
    /// Examples: "100ms", "1s".
    #[arg(global = true, long, default_value = "100ms", value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub timeout: Duration,

    /// The command to execute against the sensor.
    #[command(subcommand)]
    pub command: CliCommands,
}
