//! Man page generator for fwcompose
//!
//! Writes `fwcompose.1` plus one `fwcompose-<command>.1` page per
//! subcommand (compose, map, encode-key, ...).
//!
//! Usage: cargo run --bin gen-manpage -- [output-dir]

use clap::CommandFactory;
use std::fs;
use std::path::{Path, PathBuf};

#[path = "../cli.rs"]
mod cli;

fn render(cmd: clap::Command, path: &Path) -> std::io::Result<()> {
    let mut buffer = Vec::new();
    clap_mangen::Man::new(cmd).render(&mut buffer)?;
    fs::write(path, buffer)
}

fn main() -> std::io::Result<()> {
    let output_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("man"));

    fs::create_dir_all(&output_dir)?;

    let cmd = cli::Cli::command();
    let mut pages = vec![output_dir.join("fwcompose.1")];
    for sub in cmd.get_subcommands() {
        let name = format!("fwcompose-{}", sub.get_name());
        let path = output_dir.join(format!("{}.1", name));
        render(sub.clone().display_name(name), &path)?;
        pages.push(path);
    }
    render(cmd, &pages[0])?;

    println!("Generated {} man pages in {}", pages.len(), output_dir.display());
    println!("\nTo read the compose reference:");
    println!("  man -l {}", output_dir.join("fwcompose-compose.1").display());
    println!("\nTo install next to the device database (/usr/share/fwcompose/devices):");
    println!(
        "  sudo install -m 644 {}/fwcompose*.1 /usr/share/man/man1/",
        output_dir.display()
    );

    Ok(())
}
