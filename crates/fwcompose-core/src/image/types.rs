//! Region tree types
//!
//! Core types for binary image composition that work in no_std
//! environments.

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;
use core::str::FromStr;

use crate::error::Error;

/// Fill pattern for gaps and blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// Every byte has the same value
    Byte(u8),
    /// Incrementing bytes: position within the owning composite, modulo 256
    Inc,
}

impl Pattern {
    /// All bytes 0x00
    pub const ZEROS: Pattern = Pattern::Byte(0x00);
    /// All bytes 0xFF (erased flash)
    pub const ONES: Pattern = Pattern::Byte(0xFF);

    /// Byte at `position` of a fill span
    pub fn byte_at(&self, position: usize) -> u8 {
        match self {
            Self::Byte(b) => *b,
            Self::Inc => position as u8,
        }
    }

    /// Fill `buf`, treating `buf[0]` as position `start` of the span
    pub fn fill(&self, buf: &mut [u8], start: usize) {
        match self {
            Self::Byte(b) => buf.fill(*b),
            Self::Inc => {
                for (i, byte) in buf.iter_mut().enumerate() {
                    *byte = (start + i) as u8;
                }
            }
        }
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Self::ZEROS
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Byte(0x00) => write!(f, "zeros"),
            Self::Byte(0xFF) => write!(f, "ones"),
            Self::Byte(b) => write!(f, "0x{:02X}", b),
            Self::Inc => write!(f, "inc"),
        }
    }
}

impl FromStr for Pattern {
    type Err = Error;

    /// Parse `zeros`, `ones`, `inc` or a single byte value (`0xA5`, `165`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || Error::InvalidPattern(s.to_string());
        match s.to_ascii_lowercase().as_str() {
            "zeros" => Ok(Self::ZEROS),
            "ones" => Ok(Self::ONES),
            "inc" => Ok(Self::Inc),
            lower => {
                let value = if let Some(hex) = lower.strip_prefix("0x") {
                    u8::from_str_radix(hex, 16)
                } else {
                    lower.parse::<u8>()
                };
                value.map(Self::Byte).map_err(|_| invalid())
            }
        }
    }
}

/// Content of a region
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionContent {
    /// Bytes loaded from a file (or produced by another tool)
    Data(Vec<u8>),
    /// Block defined only by size and pattern
    Block,
    /// Nested composite; child offsets are relative to this region
    Image(Vec<BinaryRegion>),
}

/// A placement unit inside a composite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryRegion {
    /// Optional name, used in diagnostics and maps
    pub name: Option<String>,
    /// Offset within the parent; negative values are alias addresses
    /// that must be remapped before composition
    pub offset: i64,
    /// Explicit size; required for blocks, inferred otherwise
    pub size: Option<u32>,
    /// Fill pattern; inherited from the parent when unset
    pub pattern: Option<Pattern>,
    /// Region content
    pub content: RegionContent,
}

impl BinaryRegion {
    /// Create a data region
    pub fn data(offset: i64, data: Vec<u8>) -> Self {
        Self {
            name: None,
            offset,
            size: None,
            pattern: None,
            content: RegionContent::Data(data),
        }
    }

    /// Create a block region filled with a pattern
    pub fn block(offset: i64, size: u32) -> Self {
        Self {
            name: None,
            offset,
            size: Some(size),
            pattern: None,
            content: RegionContent::Block,
        }
    }

    /// Create a nested composite region
    pub fn image(offset: i64, regions: Vec<BinaryRegion>) -> Self {
        Self {
            name: None,
            offset,
            size: None,
            pattern: None,
            content: RegionContent::Image(regions),
        }
    }

    /// Set the region name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the explicit size
    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    /// Set the fill pattern
    pub fn with_pattern(mut self, pattern: Pattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Name for diagnostics; unnamed regions are labelled by offset
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None if self.offset < 0 => format!("region@-0x{:X}", self.offset.unsigned_abs()),
            None => format!("region@0x{:X}", self.offset),
        }
    }

    /// Children of a nested composite (empty otherwise)
    pub fn children(&self) -> &[BinaryRegion] {
        match &self.content {
            RegionContent::Image(regions) => regions,
            _ => &[],
        }
    }
}

/// Root composite of one composition request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryImage {
    /// Optional image name
    pub name: Option<String>,
    /// Declared size; inferred from the regions when unset
    pub size: Option<u32>,
    /// Default fill pattern
    pub pattern: Pattern,
    /// Top-level regions
    pub regions: Vec<BinaryRegion>,
}

impl BinaryImage {
    /// Create an empty image with a default pattern
    pub fn new(pattern: Pattern) -> Self {
        Self {
            name: None,
            size: None,
            pattern,
            regions: Vec::new(),
        }
    }

    /// Set the image name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the declared size
    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    /// Add a top-level region
    pub fn add_region(&mut self, region: BinaryRegion) {
        self.regions.push(region);
    }

    /// Find a top-level region by name (case-insensitive)
    pub fn find_region(&self, name: &str) -> Option<&BinaryRegion> {
        self.regions
            .iter()
            .find(|r| r.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(name)))
    }

    /// Name for diagnostics
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| "image".to_string())
    }

    /// Get the number of top-level regions
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Check if the image has no regions
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Sort top-level regions by offset
    pub fn sort_by_offset(&mut self) {
        self.regions.sort_by_key(|r| r.offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_pattern_parse() {
        assert_eq!("zeros".parse::<Pattern>().unwrap(), Pattern::Byte(0));
        assert_eq!("ones".parse::<Pattern>().unwrap(), Pattern::Byte(0xFF));
        assert_eq!("inc".parse::<Pattern>().unwrap(), Pattern::Inc);
        assert_eq!("0xA5".parse::<Pattern>().unwrap(), Pattern::Byte(0xA5));
        assert_eq!("0x2".parse::<Pattern>().unwrap(), Pattern::Byte(2));
        assert_eq!("165".parse::<Pattern>().unwrap(), Pattern::Byte(0xA5));
        assert!(matches!(
            "rand".parse::<Pattern>(),
            Err(Error::InvalidPattern(_))
        ));
        assert!("0x1FF".parse::<Pattern>().is_err());
    }

    #[test]
    fn test_pattern_fill() {
        let mut buf = [0u8; 4];
        Pattern::ONES.fill(&mut buf, 0);
        assert_eq!(buf, [0xFF; 4]);
        Pattern::Inc.fill(&mut buf, 0);
        assert_eq!(buf, [0, 1, 2, 3]);
        Pattern::Inc.fill(&mut buf, 254);
        assert_eq!(buf, [254, 255, 0, 1]);
    }

    #[test]
    fn test_labels() {
        assert_eq!(BinaryRegion::block(0x400, 4).label(), "region@0x400");
        assert_eq!(
            BinaryRegion::block(-0x1000_0000, 4).label(),
            "region@-0x10000000"
        );
        assert_eq!(
            BinaryRegion::data(0, vec![1]).with_name("fcb").label(),
            "fcb"
        );
    }

    #[test]
    fn test_pattern_display_round_trip() {
        for p in [Pattern::ZEROS, Pattern::ONES, Pattern::Inc, Pattern::Byte(0xA5)] {
            assert_eq!(p.to_string().parse::<Pattern>().unwrap(), p);
        }
    }
}
