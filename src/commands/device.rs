//! Device database commands

use fwcompose_core::device::AttributeDatabase;
use fwcompose_core::template::MemoryLayout;

/// List all device families
pub fn list_families(db: &AttributeDatabase) {
    println!("Device families:");
    println!();
    println!("{:<16} {:<10} {}", "Family", "Latest", "Revisions");
    println!("{}", "-".repeat(50));

    for family in db.families() {
        if let Some(alias) = &family.alias {
            let pinned = alias
                .revision
                .as_deref()
                .map(|r| format!(" ({})", r))
                .unwrap_or_default();
            println!("{:<16} -> {}{}", family.name, alias.family, pinned);
            continue;
        }

        let revisions: Vec<&str> = family.revision_names().collect();
        println!(
            "{:<16} {:<10} {}",
            family.name,
            family.latest.as_deref().unwrap_or("-"),
            revisions.join(", ")
        );
    }
}

/// Show the resolved attributes of a device
pub fn cmd_attributes(
    db: &AttributeDatabase,
    family: &str,
    revision: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let attrs = db.resolve(family, revision)?;

    println!("{} (revision {}):", attrs.family(), attrs.revision());
    for (name, value) in attrs.iter() {
        println!("  {:<24} {}", name, value);
    }
    Ok(())
}

/// Show the component offsets of a memory type, or list the memory types
pub fn cmd_layout(
    db: &AttributeDatabase,
    family: &str,
    revision: &str,
    memory_type: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let attrs = db.resolve(family, revision)?;

    let Some(memory_type) = memory_type else {
        println!("Memory types of {}:", family);
        for name in MemoryLayout::memory_types(&attrs)? {
            println!("  {}", name);
        }
        return Ok(());
    };

    let layout = MemoryLayout::from_attributes(&attrs, memory_type)?;
    println!("{} / {}:", layout.family(), layout.memory_type());

    let mut offsets: Vec<(&String, &u32)> = layout.offsets().iter().collect();
    offsets.sort_by_key(|(_, offset)| **offset);
    for (name, offset) in offsets {
        println!("  0x{:08X}  {}", offset, name);
    }

    if let Some(remap) = layout.remap() {
        match remap.align {
            Some(align) => println!("Alias base 0x{:08X}, alignment 0x{:X}", remap.base, align),
            None => println!("Alias base 0x{:08X}", remap.base),
        }
    }
    if let Some(n) = layout.byte_swap() {
        println!("Content byte swapped in {}-byte chunks", n);
    }
    Ok(())
}
