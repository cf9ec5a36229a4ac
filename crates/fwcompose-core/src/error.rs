//! Error types for fwcompose-core
//!
//! This module provides a no_std compatible error type used by device
//! resolution, register encoding and image composition. Every variant
//! carries enough context to be reported to the user as is.

use alloc::string::String;
use core::fmt;

/// A named byte range `[start, end)` inside a composed image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionSpan {
    /// Region name (or a generated label for unnamed regions)
    pub name: String,
    /// First byte of the region, absolute within the image
    pub start: u32,
    /// One past the last byte of the region
    pub end: u32,
}

impl fmt::Display for RegionSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' [0x{:08X}, 0x{:08X})", self.name, self.start, self.end)
    }
}

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Device resolution errors
    /// Family is not declared in the database
    UnknownFamily {
        /// Requested family name
        family: String,
    },
    /// Revision is neither declared by the family nor "latest"
    UnknownRevision {
        /// Family the revision was looked up in
        family: String,
        /// Requested revision
        revision: String,
    },
    /// Alias chain does not terminate
    AliasCycle {
        /// Family where resolution started
        family: String,
    },
    /// Family declares no layout for the memory type
    UnknownMemoryType {
        /// Resolved family
        family: String,
        /// Requested memory type
        memory_type: String,
    },
    /// Attribute is required but not present
    MissingAttribute {
        /// Attribute name
        name: String,
    },
    /// Attribute is present with an unexpected type
    AttributeType {
        /// Attribute name
        name: String,
        /// Type the consumer expected
        expected: &'static str,
    },

    // Register encoding errors
    /// Value has more significant bits than the register holds
    ValueTooWide {
        /// Register name
        register: String,
        /// Register width in bits
        width: u32,
        /// Significant bits of the value
        actual: u32,
    },
    /// Register or sub-register width cannot be encoded
    InvalidRegisterWidth {
        /// Register name
        register: String,
        /// Offending width in bits
        width: i64,
    },
    /// Wrong number or size of sub-registers when decoding
    DecodeLength {
        /// Register name
        register: String,
        /// Expected count (or byte length)
        expected: usize,
        /// Actual count (or byte length)
        actual: usize,
    },
    /// Malformed hexadecimal string
    InvalidHex,

    // Composition errors
    /// Component has no template offset and none was supplied
    MissingOffset {
        /// Component name
        component: String,
    },
    /// Block region has neither content nor size
    MissingSize {
        /// Region label
        region: String,
    },
    /// Two regions of the same composite intersect
    RegionOverlap {
        /// Region placed first (lower start offset)
        first: RegionSpan,
        /// Region that starts inside the first one
        second: RegionSpan,
    },
    /// Declared composite size is smaller than its content
    ImageTooSmall {
        /// Label of the composite
        region: String,
        /// Declared size in bytes
        declared: u32,
        /// Size required by the placed regions
        required: u32,
    },
    /// Data region declares a size smaller than its data
    ContentTooLarge {
        /// Region label
        region: String,
        /// Declared size in bytes
        size: u32,
        /// Length of the content
        content: u32,
    },
    /// Negative (alias) offset reached the composer untranslated
    UnresolvedOffset {
        /// Region label
        region: String,
        /// The untranslated offset
        offset: i64,
    },
    /// Alias address lies below the remap base
    RemapOutOfRange {
        /// Address to translate
        address: u64,
        /// Remap base of the family
        base: u64,
    },
    /// Translated offset violates the remap alignment
    RemapMisaligned {
        /// Translated offset
        offset: u64,
        /// Required alignment
        align: u64,
    },
    /// Offset or size arithmetic exceeds the 32-bit address space
    AddressOverflow,
    /// Pattern name or value is not recognised
    InvalidPattern(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownFamily { family } => write!(f, "unknown device family '{}'", family),
            Self::UnknownRevision { family, revision } => {
                write!(f, "unknown revision '{}' for family '{}'", revision, family)
            }
            Self::AliasCycle { family } => {
                write!(f, "device alias chain starting at '{}' does not terminate", family)
            }
            Self::UnknownMemoryType {
                family,
                memory_type,
            } => write!(
                f,
                "family '{}' has no layout for memory type '{}'",
                family, memory_type
            ),
            Self::MissingAttribute { name } => write!(f, "missing attribute '{}'", name),
            Self::AttributeType { name, expected } => {
                write!(f, "attribute '{}' is not {}", name, expected)
            }
            Self::ValueTooWide {
                register,
                width,
                actual,
            } => write!(
                f,
                "value for {} has {} significant bits, register is {} bits wide",
                register, actual, width
            ),
            Self::InvalidRegisterWidth { register, width } => {
                write!(f, "invalid width {} for register {}", width, register)
            }
            Self::DecodeLength {
                register,
                expected,
                actual,
            } => write!(
                f,
                "cannot decode {}: expected length {}, got {}",
                register, expected, actual
            ),
            Self::InvalidHex => write!(f, "invalid hexadecimal string"),
            Self::MissingOffset { component } => {
                write!(f, "no offset defined for component '{}'", component)
            }
            Self::MissingSize { region } => {
                write!(f, "region '{}' has no content and no size", region)
            }
            Self::RegionOverlap { first, second } => {
                write!(f, "region {} overlaps region {}", second, first)
            }
            Self::ImageTooSmall {
                region,
                declared,
                required,
            } => write!(
                f,
                "'{}' declares 0x{:X} bytes but its regions need 0x{:X} bytes",
                region, declared, required
            ),
            Self::ContentTooLarge {
                region,
                size,
                content,
            } => write!(
                f,
                "region '{}' declares 0x{:X} bytes but holds 0x{:X} bytes of data",
                region, size, content
            ),
            Self::UnresolvedOffset { region, offset } => write!(
                f,
                "region '{}' uses alias offset -0x{:X} but no remap rule applies",
                region,
                offset.unsigned_abs()
            ),
            Self::RemapOutOfRange { address, base } => write!(
                f,
                "alias address 0x{:X} is below remap base 0x{:X}",
                address, base
            ),
            Self::RemapMisaligned { offset, align } => write!(
                f,
                "remapped offset 0x{:X} is not aligned to 0x{:X}",
                offset, align
            ),
            Self::AddressOverflow => write!(f, "address exceeds 32-bit range"),
            Self::InvalidPattern(p) => write!(f, "invalid pattern '{}'", p),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
