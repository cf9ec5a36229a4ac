//! fwcompose - A secure-boot flash image composer
//!
//! Builds bootable flash images for secure-boot capable microcontrollers
//! from a device attribute database and a TOML image description, and
//! encodes key material into fuse sub-registers.
//!
//! # Architecture
//!
//! All device knowledge lives in the RON device database (`devices/`):
//! - **Families** carry attributes, revision layers and aliases
//! - **Memory types** of a family fix the offsets of image components
//! - **Grouped registers** describe how keys are split over fuse words
//!
//! The database is loaded once and shared read-only by every command.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use fwcompose_core::device::AttributeDatabase;
use std::path::{Path, PathBuf};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    // Load device database
    let db = match load_device_database(cli.device_db.as_deref()) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Failed to load device database: {}", e);
            std::process::exit(1);
        }
    };

    log::info!("Loaded {} device families", db.len());

    match cli.command {
        Commands::Compose {
            config,
            output,
            map,
        } => commands::compose::cmd_compose(&db, &config, &output, map),
        Commands::Map { config } => commands::compose::cmd_map(&db, &config),
        Commands::Families => {
            commands::device::list_families(&db);
            Ok(())
        }
        Commands::Attributes { device } => {
            commands::device::cmd_attributes(&db, &device.family, &device.revision)
        }
        Commands::Layout {
            device,
            memory_type,
        } => commands::device::cmd_layout(
            &db,
            &device.family,
            &device.revision,
            memory_type.as_deref(),
        ),
        Commands::EncodeKey {
            device,
            register,
            key,
            script,
        } => commands::key::cmd_encode(&db, &device, &register, &key, script),
        Commands::DecodeKey {
            device,
            register,
            subregs,
        } => commands::key::cmd_decode(&db, &device, &register, &subregs),
    }
}

/// Load the device database from the specified path or default locations
fn load_device_database(
    path: Option<&Path>,
) -> Result<AttributeDatabase, Box<dyn std::error::Error>> {
    let mut db = AttributeDatabase::new();

    if let Some(path) = path {
        // User specified a path
        if path.is_dir() {
            db.load_dir(path)?;
        } else if path.is_file() {
            db.load_file(path)?;
        } else {
            return Err(format!("Device database path not found: {}", path.display()).into());
        }
    } else {
        // Try default locations
        let default_paths = [
            PathBuf::from("devices"),
            PathBuf::from("/usr/share/fwcompose/devices"),
            PathBuf::from("/usr/local/share/fwcompose/devices"),
        ];

        let mut loaded = false;
        for dir in &default_paths {
            if loaded {
                break;
            }
            if dir.is_dir() {
                match db.load_dir(dir) {
                    Ok(count) => {
                        log::debug!("Loaded {} families from {}", count, dir.display());
                        loaded = true;
                    }
                    Err(e) => {
                        log::warn!("Failed to load devices from {}: {}", dir.display(), e);
                        db = AttributeDatabase::new();
                    }
                }
            }
        }

        if !loaded {
            log::warn!("No device database found in default locations");
        }
    }

    db.validate()?;
    Ok(db)
}
