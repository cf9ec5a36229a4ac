//! Binary image composition
//!
//! An image is a tree of regions: raw data, pattern-filled blocks and
//! nested composites. [`BinaryImage::compose`] validates the tree and
//! produces one contiguous buffer.

mod compose;
#[cfg(feature = "std")]
mod input;
mod map;
pub(crate) mod remap;
#[cfg(feature = "std")]
mod toml;
mod types;

pub use compose::{ComposedImage, Placement, PlacementKind};
pub use map::MemoryMap;
pub use remap::{AddressTranslator, RemapRule, REMAP_ALIGN, REMAP_BASE};
#[cfg(feature = "std")]
pub use input::{DecodedInput, InputError, InputFormat};
#[cfg(feature = "std")]
pub use self::toml::{ConfigError, ImageConfig};
pub use types::*;
