//! NI 4050 simulator CLI
//!
//! Runs the measurement protocol against a simulated card so range profiles,
//! arming sequences and conversions can be inspected without hardware.
//!
//! # Usage
//!
//! ```bash
//! # List every range with its identifier and full-scale value
//! nidmm-sim ranges
//!
//! # Arm 2VDC and take five readings of raw code 0x9FFFFF
//! nidmm-sim measure --range 2VDC --raw-code 0x9FFFFF --samples 5
//!
//! # Show the register writes of the arming sequence
//! nidmm-sim measure --range 2MOHM --show-writes
//!
//! # Read a calibration-store byte
//! nidmm-sim eeprom 0x9F2
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use ni4050::{
    config::DriverConfig, logging, range::ProfileTable, Range, Request, Response, SimulatedCard,
};

/// NI 4050 measurement protocol simulator
#[derive(Parser, Debug)]
#[command(name = "nidmm-sim")]
#[command(version)]
#[command(about = "Drive the NI 4050 protocol against a simulated card", long_about = None)]
struct Args {
    /// Driver configuration file (TOML)
    #[arg(short, long, value_name = "FILE", default_value = "ni4050.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the supported measurement ranges
    Ranges,

    /// Arm a range and take readings
    Measure {
        /// Range name, e.g. 2VDC or 200KOHM
        #[arg(short, long)]
        range: Range,

        /// Raw 24-bit code the simulated ADC returns
        #[arg(long, value_parser = parse_code, default_value = "0x7FFFFF")]
        raw_code: u32,

        /// Calibrated internal resistance of the simulated card (ohms)
        #[arg(long, default_value_t = 1_000_000)]
        resistance: u32,

        /// Number of readings
        #[arg(short = 'n', long, default_value_t = 1)]
        samples: u32,

        /// Print the register writes of the arming sequence
        #[arg(long)]
        show_writes: bool,
    },

    /// Read one calibration-store byte
    Eeprom {
        /// Address (decimal or 0x-prefixed hex)
        #[arg(value_parser = parse_code)]
        address: u32,

        /// Calibrated internal resistance of the simulated card (ohms)
        #[arg(long, default_value_t = 1_000_000)]
        resistance: u32,
    },
}

fn parse_code(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", s, e))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = DriverConfig::load_from(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if args.verbose {
        config.logging.level = "debug".to_string();
    }
    config.validate()?;
    logging::init(&config.logging)?;

    match args.command {
        Command::Ranges => list_ranges(),
        Command::Measure {
            range,
            raw_code,
            resistance,
            samples,
            show_writes,
        } => measure(&config, range, raw_code, resistance, samples, show_writes),
        Command::Eeprom {
            address,
            resistance,
        } => read_eeprom(&config, address, resistance),
    }
}

fn list_ranges() -> Result<()> {
    let profiles = ProfileTable::standard();
    println!("{:>3}  {:<9} {:>14}  {:<5} cal", "id", "name", "full scale", "unit");
    for profile in profiles.iter() {
        let range = profile.range;
        println!(
            "{:>3}  {:<9} {:>14}  {:<5} {:#05x}",
            range.id(),
            range.name(),
            range.full_scale(),
            range.unit(),
            profile.cal_offset
        );
    }
    Ok(())
}

fn measure(
    config: &DriverConfig,
    range: Range,
    raw_code: u32,
    resistance: u32,
    samples: u32,
    show_writes: bool,
) -> Result<()> {
    if raw_code > 0xFF_FFFF {
        bail!("raw code {:#x} does not fit in 24 bits", raw_code);
    }

    let card = SimulatedCard::with_reading(resistance, raw_code);
    let dmm = config.dispatcher();
    let unit = dmm.attach(card.clone())?;
    let session = dmm.open(unit)?;

    card.clear_log();
    session.dispatch(Request::StartMeasurement { range: range.id() })?;
    info!(%unit, %range, "Range armed");

    if show_writes {
        for (offset, value) in card.adc_writes() {
            println!("write reg {} <- {:#04x}", offset, value);
        }
    }

    for i in 0..samples {
        match session.dispatch(Request::ReadConvertedValue)? {
            Response::Value(value) => println!("{:>4}: {:.6} {}", i, value, range.unit()),
            other => bail!("unexpected response {:?}", other),
        }
    }

    session.close();
    dmm.detach(unit)?;
    Ok(())
}

fn read_eeprom(config: &DriverConfig, address: u32, resistance: u32) -> Result<()> {
    let dmm = config.dispatcher();
    let unit = dmm.attach(SimulatedCard::with_reading(resistance, 0))?;
    let session = dmm.open(unit)?;

    match session.dispatch(Request::ReadConfigByte { address })? {
        Response::ConfigByte(byte) => println!("{:#05x}: {:#04x}", address, byte),
        other => bail!("unexpected response {:?}", other),
    }
    Ok(())
}
