//! Image composition commands

use fwcompose_core::device::AttributeDatabase;
use fwcompose_core::image::{BinaryImage, ConfigError, ImageConfig};
use std::fs;
use std::path::Path;

fn load_image(db: &AttributeDatabase, config: &Path) -> Result<BinaryImage, ConfigError> {
    let config = ImageConfig::from_toml_file(config)?;
    let db = (!db.is_empty()).then_some(db);
    config.load(db)
}

/// Compose an image and write it to `output`
///
/// The output file is only written once composition has fully succeeded.
pub fn cmd_compose(
    db: &AttributeDatabase,
    config: &Path,
    output: &Path,
    map: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let image = load_image(db, config)?;
    let composed = image.compose()?;

    fs::write(output, composed.data())?;

    if map {
        print!("{}", composed.map());
        println!();
    }
    println!(
        "Wrote {} bytes ({} regions) to {:?}",
        composed.size(),
        composed.placements().len(),
        output
    );
    Ok(())
}

/// Print the memory map of an image description
pub fn cmd_map(db: &AttributeDatabase, config: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let image = load_image(db, config)?;
    print!("{}", image.draw());
    Ok(())
}
