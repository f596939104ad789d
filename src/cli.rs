//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Fuse value that leaves the fuse untouched
const FUSE_UNCHANGED: &str = "0xFFFF";

/// Parse a hexadecimal u16, with or without `0x` prefix
pub fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let hex = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u16::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
}

/// Parse a supply voltage in volts
fn parse_volts(s: &str) -> Result<f32, String> {
    let volts: f32 = s.parse().map_err(|e| format!("Invalid voltage: {}", e))?;
    if (0.0..=6.5).contains(&volts) {
        Ok(volts)
    } else {
        Err(format!("{} V is outside 0.0..=6.5 V", volts))
    }
}

#[derive(Parser)]
#[command(name = "pdkprog")]
#[command(author, version, about = "Programmer for PADAUK microcontrollers", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Chip database file (RON) replacing the built-in IC table
    #[arg(long, global = true)]
    pub chip_db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Programmer selection shared across commands
#[derive(clap::Args, Debug, Clone, Default)]
pub struct PortArgs {
    /// Serial port of the programmer, `dummy` for the emulator
    /// (searched automatically if not given)
    #[arg(short, long)]
    pub port: Option<String>,
}

/// IC selection shared across commands
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ChipArgs {
    /// IC name
    #[arg(short = 'n', long)]
    pub icname: Option<String>,

    /// IC ID (12 bit, hex)
    #[arg(short = 'i', long, value_parser = parse_hex_u16)]
    pub icid: Option<u16>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List supported ICs
    List,

    /// Probe for an attached IC
    Probe {
        #[command(flatten)]
        port: PortArgs,
    },

    /// Read the IC into a file
    Read {
        #[command(flatten)]
        port: PortArgs,

        #[command(flatten)]
        chip: ChipArgs,

        /// Write the output file as raw binary instead of Intel HEX
        #[arg(short, long)]
        bin: bool,

        /// Output file (read only if not given)
        file: Option<PathBuf>,
    },

    /// Write a file to the IC
    Write {
        #[command(flatten)]
        port: PortArgs,

        #[command(flatten)]
        chip: ChipArgs,

        /// Skip erase before write
        #[arg(long)]
        noerase: bool,

        /// Skip blank check before write
        #[arg(long)]
        noblankchk: bool,

        /// Fill unused space with 0 (NOP) to prevent readout
        #[arg(long)]
        securefill: bool,

        /// Skip verify after write
        #[arg(long)]
        noverify: bool,

        /// Ignore calibration stubs in the image
        #[arg(long)]
        nocalibrate: bool,

        /// Fuse value (hex), 0xFFFF leaves the fuse untouched
        #[arg(short, long, value_parser = parse_hex_u16, default_value = FUSE_UNCHANGED)]
        fuse: u16,

        /// Input file (Intel HEX, or raw binary if ending in .bin)
        file: Option<PathBuf>,
    },

    /// Erase a FLASH IC
    Erase {
        #[command(flatten)]
        port: PortArgs,

        #[command(flatten)]
        chip: ChipArgs,

        /// Skip blank check after erase
        #[arg(long)]
        noblankchk: bool,
    },

    /// Run the IC and relay its debug output
    Start {
        #[command(flatten)]
        port: PortArgs,

        /// Supply voltage while running (volts)
        #[arg(short, long, value_parser = parse_volts, default_value = "5.0")]
        runvdd: f32,
    },
}
