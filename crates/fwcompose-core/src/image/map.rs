//! Text memory maps of composed images

use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use core::fmt::{self, Write};

use super::compose::{ComposedImage, Placement, PlacementKind};
use super::types::{BinaryImage, BinaryRegion, Pattern, RegionContent};
use crate::error::Error;

/// Marker appended to regions named by a composition error
const CONFLICT: &str = "  <-- conflict";

/// Memory map of a composed image, rendered through `Display`
pub struct MemoryMap<'a> {
    image: &'a ComposedImage,
}

impl ComposedImage {
    /// Memory map listing every placed region and pattern-filled gap
    pub fn map(&self) -> MemoryMap<'_> {
        MemoryMap { image: self }
    }
}

/// A composite whose children are being listed
struct Open {
    cursor: u32,
    end: u32,
    pattern: Pattern,
}

fn range(f: &mut fmt::Formatter<'_>, depth: usize, start: u32, end: u32) -> fmt::Result {
    write!(
        f,
        "{:indent$}[0x{:08X}, 0x{:08X})  {:>#10X}  ",
        "",
        start,
        end,
        end - start,
        indent = depth * 2
    )
}

fn gap(f: &mut fmt::Formatter<'_>, depth: usize, open: &Open, until: u32) -> fmt::Result {
    if until > open.cursor {
        range(f, depth, open.cursor, until)?;
        writeln!(f, "<{}>", open.pattern)?;
    }
    Ok(())
}

fn placement(f: &mut fmt::Formatter<'_>, p: &Placement) -> fmt::Result {
    range(f, p.depth, p.start, p.end)?;
    match p.kind {
        PlacementKind::Data => writeln!(f, "{}", p.name),
        PlacementKind::Block => writeln!(f, "{} <{}>", p.name, p.pattern),
        PlacementKind::Image => writeln!(f, "{} (pattern {})", p.name, p.pattern),
    }
}

impl fmt::Display for MemoryMap<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let image = self.image;
        writeln!(
            f,
            "{}: 0x{:X} bytes, pattern {}",
            image.name().unwrap_or("image"),
            image.size(),
            image.pattern()
        )?;

        let mut stack = Vec::new();
        stack.push(Open {
            cursor: 0,
            end: image.size(),
            pattern: image.pattern(),
        });

        for p in image.placements() {
            while stack.len() > p.depth + 1 {
                if let Some(done) = stack.pop() {
                    gap(f, stack.len(), &done, done.end)?;
                }
            }
            if let Some(parent) = stack.last_mut() {
                gap(f, p.depth, parent, p.start)?;
                parent.cursor = p.end;
            }
            placement(f, p)?;
            if p.kind == PlacementKind::Image {
                stack.push(Open {
                    cursor: p.start,
                    end: p.end,
                    pattern: p.pattern,
                });
            }
        }

        while let Some(done) = stack.pop() {
            gap(f, stack.len(), &done, done.end)?;
        }
        Ok(())
    }
}

/// Labels of the regions a composition error is about
fn conflicting(e: &Error) -> Vec<&str> {
    match e {
        Error::RegionOverlap { first, second } => vec![first.name.as_str(), second.name.as_str()],
        Error::MissingSize { region }
        | Error::ImageTooSmall { region, .. }
        | Error::ContentTooLarge { region, .. }
        | Error::UnresolvedOffset { region, .. } => vec![region.as_str()],
        _ => Vec::new(),
    }
}

fn list_regions(
    out: &mut String,
    regions: &[BinaryRegion],
    depth: usize,
    marked: &[&str],
) -> fmt::Result {
    for region in regions {
        let offset = if region.offset < 0 {
            alloc::format!("-0x{:X}", region.offset.unsigned_abs())
        } else {
            alloc::format!("0x{:X}", region.offset)
        };
        let size = match (&region.content, region.size) {
            (_, Some(size)) => alloc::format!("0x{:X}", size),
            (RegionContent::Data(data), None) => alloc::format!("0x{:X}", data.len()),
            _ => "?".to_string(),
        };
        let label = region.label();
        write!(
            out,
            "{:indent$}{} @ {} size {}",
            "",
            label,
            offset,
            size,
            indent = depth * 2
        )?;
        if marked.contains(&label.as_str()) {
            out.push_str(CONFLICT);
        }
        out.push('\n');
        list_regions(out, region.children(), depth + 1, marked)?;
    }
    Ok(())
}

impl BinaryImage {
    /// Render a memory map of the image
    ///
    /// When the image cannot be composed, the configured regions are
    /// listed as given, the ones named by the error marked, followed by
    /// the composition error.
    pub fn draw(&self) -> String {
        match self.compose() {
            Ok(composed) => composed.map().to_string(),
            Err(e) => {
                let mut out = String::new();
                self.draw_invalid(&mut out, &e).ok();
                out
            }
        }
    }

    fn draw_invalid(&self, out: &mut String, e: &Error) -> fmt::Result {
        let marked = conflicting(e);
        let label = self.label();
        write!(out, "{}: invalid layout", label)?;
        if marked.contains(&label.as_str()) {
            out.push_str(CONFLICT);
        }
        out.push('\n');
        list_regions(out, &self.regions, 1, &marked)?;
        writeln!(out, "error: {}", e)
    }
}
