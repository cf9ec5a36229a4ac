//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

#[derive(Parser)]
#[command(name = "fwcompose")]
#[command(author, version, about = "Secure-boot flash image composer", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to device database directory or file (.ron)
    /// Defaults to looking in ./devices/ and /usr/share/fwcompose/devices/
    #[arg(long, global = true)]
    pub device_db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Device selection shared across commands
#[derive(clap::Args, Debug, Clone)]
pub struct DeviceArgs {
    /// Device family (e.g. rt117x)
    #[arg(short, long)]
    pub family: String,

    /// Silicon revision
    #[arg(short, long, default_value = "latest")]
    pub revision: String,
}

/// Grouped register selection
#[derive(clap::Args, Debug, Clone)]
pub struct RegisterArgs {
    /// Register name as declared by the family (e.g. MASTER_KEY, OTFAD{index}_KEY)
    #[arg(long)]
    pub register: String,

    /// Value substituted for {index} in the register name
    #[arg(long, value_parser = parse_hex_u32)]
    pub index: Option<u32>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compose an image from a TOML description
    Compose {
        /// Image description (TOML format)
        #[arg(short, long)]
        config: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Print the memory map of the composed image
        #[arg(long)]
        map: bool,
    },

    /// Show the memory map of an image description without writing it
    Map {
        /// Image description (TOML format)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// List device families
    Families,

    /// Show the resolved attributes of a device
    Attributes {
        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Show the component offsets of a memory type
    Layout {
        #[command(flatten)]
        device: DeviceArgs,

        /// Memory type (e.g. flexspi_nor); lists memory types if omitted
        #[arg(short, long)]
        memory_type: Option<String>,
    },

    /// Split a key into fuse sub-registers
    EncodeKey {
        #[command(flatten)]
        device: DeviceArgs,

        #[command(flatten)]
        register: RegisterArgs,

        /// Key value as hex (optional 0x prefix)
        #[arg(short, long)]
        key: String,

        /// Print a fuse programming script instead of the sub-registers
        #[arg(long)]
        script: bool,
    },

    /// Join fuse sub-registers back into a key
    DecodeKey {
        #[command(flatten)]
        device: DeviceArgs,

        #[command(flatten)]
        register: RegisterArgs,

        /// Sub-register values as hex, in physical order
        #[arg(required = true)]
        subregs: Vec<String>,
    },
}
