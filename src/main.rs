//! SenseAir S8 CO2 monitor CLI
//!
//! A command-line interface (CLI) application for interacting with SenseAir
//! S8 CO2 sensors over Modbus RTU (serial).
//!
//! This tool allows users to:
//! - Read the current CO2 concentration.
//! - Read the sensor ID, firmware version and ABC period in one go.
//! - Read and set the Automatic Baseline Correction period.
//! - Trigger a background calibration against fresh air.
//! - Read single raw registers for diagnostics.
//! - Run in a continuous daemon mode to poll readings and print them to
//!   the console.
//!
//! The CLI leverages the `senseair_s8_lib` crate for protocol definitions
//! and driver operations.

use anyhow::{Context, Result, bail};
use clap::Parser;
use dialoguer::Confirm;
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use senseair_s8_lib::{client::SenseairS8, serial::SerialTransport, transport::Timing};
use std::panic;

mod commandline;

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown_file>", 0, 0)); // Provide defaults

        let cause_str = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            *s
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.as_str()
        } else {
            "<unknown_panic_cause>"
        };

        error!(
            target: "panic",
            "Thread '{}' panicked at '{}': {}:{} - Cause: {}",
            std::thread::current().name().unwrap_or("<unnamed>"),
            filename,
            line,
            column,
            cause_str
        );
    }));
    log_handle
}

macro_rules! print_co2 {
    ($sensor:expr) => {
        let co2 = $sensor
            .read_co2()
            .with_context(|| "Cannot read CO2 concentration")?;
        println!("CO2 (ppm): {co2}");
    };
}

/// Prints one snapshot field, or a marker for a failed read.
fn print_info_field<T: std::fmt::Display>(label: &str, field: &Option<T>) {
    match field {
        Some(value) => println!("{label}: {value}"),
        None => println!("{label}: <read failed>"),
    }
}

/// Handles the background calibration command.
///
/// The calibration shifts the sensor's baseline to the current ambient
/// level, so the user is asked to confirm the sensor actually sits in
/// fresh air before the blocking command sequence starts.
fn handle_calibrate(sensor: &mut SenseairS8<SerialTransport>) -> Result<()> {
    info!("Executing: Background Calibration");
    println!(
        "WARNING: Background calibration sets the sensor's baseline to the\n\
         current ambient CO2 level. The sensor must sit in FRESH AIR\n\
         (approx. 400 ppm, e.g. outdoors or at an open window) for the whole\n\
         procedure. Calibrating indoors will skew all subsequent readings."
    );
    println!(
        "The command blocks for several seconds while the sensor calibrates."
    );

    if !Confirm::new()
        .with_prompt("Is the sensor in fresh air and do you want to continue?")
        .default(false)
        .show_default(true)
        .interact()?
    {
        info!("Background calibration aborted by user.");
        return Ok(());
    }

    let acknowledged = sensor
        .background_calibration()
        .with_context(|| "Background calibration command sequence failed")?;
    if acknowledged {
        println!("Background calibration completed and acknowledged by the sensor.");
        Ok(())
    } else {
        bail!("Sensor did not acknowledge the background calibration.");
    }
}

fn main() -> Result<()> {
    let args = commandline::CliArgs::parse();

    // 1. Initialize logging as early as possible
    let _log_handle = logging_init(args.verbose.log_level_filter());
    info!(
        "S8 CLI started. Log level: {}",
        args.verbose.log_level_filter()
    );

    // 2. Open the serial transport and build the driver
    info!("Attempting to open serial device {}...", args.device);
    let transport = SerialTransport::open(&args.device)
        .with_context(|| format!("Cannot open serial port {}", args.device))?;
    let timing = Timing {
        response_timeout: args.timeout,
        ..Timing::default()
    };
    let mut sensor = SenseairS8::with_timing(transport, timing);

    // 3. Execute the command
    match &args.command {
        commandline::CliCommands::Read => {
            info!("Executing: Read CO2");
            print_co2!(&mut sensor);
        }
        commandline::CliCommands::Info => {
            info!("Executing: Read Sensor Info");
            let info = sensor
                .initialize()
                .with_context(|| "Cannot read sensor info")?;
            print_info_field("Sensor ID", &info.sensor_id);
            print_info_field("Firmware version", &info.firmware_version);
            print_info_field("ABC period (hours, 0 means disabled)", &info.abc_period);
        }
        commandline::CliCommands::ReadAbc => {
            info!("Executing: Read ABC Period");
            let period = sensor
                .read_abc_period()
                .with_context(|| "Cannot read ABC period")?;
            println!("ABC period (hours, 0 means disabled): {period}");
        }
        commandline::CliCommands::SetAbc { period } => {
            info!("Executing: Set ABC Period to {period} hours");
            let confirmed = sensor
                .set_abc_period(*period)
                .with_context(|| format!("Failed to set ABC period to {period} hours"))?;
            if &confirmed != period {
                bail!("Sensor stored {confirmed} hours instead of the requested {period}.");
            }
            if confirmed.is_disabled() {
                println!("Automatic Baseline Correction disabled successfully.");
            } else {
                println!("ABC period set to {confirmed} hours successfully.");
            }
        }
        commandline::CliCommands::Calibrate => {
            handle_calibrate(&mut sensor)?;
        }
        commandline::CliCommands::ReadRegister { kind, register } => {
            info!("Executing: Read Raw Register {register:#04X} ({kind:?})");
            sensor
                .clear_receive_buffer()
                .with_context(|| "Cannot clear receive buffer")?;
            let value = match kind {
                commandline::RegisterKind::Input => sensor.read_input_register(*register),
                commandline::RegisterKind::Holding => sensor.read_holding_register(*register),
            }
            .with_context(|| format!("Cannot read register {register:#04X}"))?;
            println!("Register {register:#04X}: {value:#06X} ({value})");
        }
        commandline::CliCommands::Daemon { poll_interval } => {
            info!("Starting daemon mode: interval={poll_interval:?}");
            loop {
                debug!("Daemon: Reading CO2 for stdout...");
                print_co2!(&mut sensor);
                std::thread::sleep(*poll_interval);
            }
        }
    }

    Ok(())
}
