//! Fuse key encoding commands

use crate::cli::{DeviceArgs, RegisterArgs};
use fwcompose_core::device::AttributeDatabase;
use fwcompose_core::register::{parse_hex, EncodedRegister, RegisterLayout};

fn open_codec(
    db: &AttributeDatabase,
    device: &DeviceArgs,
    register: &RegisterArgs,
) -> Result<RegisterLayout, Box<dyn std::error::Error>> {
    let attrs = db.resolve(&device.family, &device.revision)?;
    let codec = RegisterLayout::from_attributes(&attrs, &register.register, register.index)?;
    log::debug!(
        "{}: {} bits in {} x {}-bit sub-registers",
        codec.register().name,
        codec.register().width,
        codec.count(),
        codec.subreg_width()
    );
    Ok(codec)
}

/// Split a key into sub-registers, or print a fuse programming script
pub fn cmd_encode(
    db: &AttributeDatabase,
    device: &DeviceArgs,
    register: &RegisterArgs,
    key: &str,
    script: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let codec = open_codec(db, device, register)?;
    let value = parse_hex(key)?;

    if script {
        for record in codec.fuse_records(&value)? {
            println!("{}", record);
        }
        return Ok(());
    }

    println!("{}:", codec.register().name);
    match codec.encode(&value)? {
        EncodedRegister::Hex(words) => {
            for (i, word) in words.iter().enumerate() {
                println!("  [{}] {}", i, word);
            }
        }
        EncodedRegister::Raw(words) => {
            for (i, word) in words.iter().enumerate() {
                println!("  [{}] 0x{}", i, hex::encode_upper(word));
            }
        }
    }
    Ok(())
}

/// Join sub-registers (physical order) back into a key
pub fn cmd_decode(
    db: &AttributeDatabase,
    device: &DeviceArgs,
    register: &RegisterArgs,
    subregs: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let codec = open_codec(db, device, register)?;
    let value = codec.decode(&EncodedRegister::Hex(subregs.to_vec()))?;
    println!("{}: 0x{}", codec.register().name, hex::encode_upper(value));
    Ok(())
}
