//! fwcompose-core - Core library for secure-boot flash image composition
//!
//! This crate provides the pieces needed to build fixed-layout flash images
//! for secure-boot capable microcontrollers:
//!
//! - [`device`] - a layered device attribute database (defaults, family,
//!   revision, alias) describing each chip family
//! - [`register`] - encoding of multi-word key values (master keys, KEK
//!   seeds, OTFAD keys) into fuse sub-registers
//! - [`template`] - per memory type component offsets (key blob, FCB,
//!   application, containers)
//! - [`image`] - the region tree and the composer producing the final bytes
//!
//! The core is `no_std` compatible (it needs `alloc`). Loading the device
//! database from RON files and image descriptions from TOML files requires
//! the `std` feature.
//!
//! # Example
//!
//! ```ignore
//! use fwcompose_core::image::{BinaryImage, BinaryRegion, Pattern};
//!
//! let mut image = BinaryImage::new(Pattern::Byte(0xA5)).with_size(0x2010);
//! image.add_region(BinaryRegion::data(0x400, fcb_bytes).with_name("fcb"));
//! image.add_region(BinaryRegion::data(0x2000, app_bytes).with_name("application"));
//! let composed = image.compose()?;
//! std::fs::write("bootable.bin", composed.data())?;
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod device;
pub mod error;
pub mod image;
pub mod register;
pub mod template;

pub use error::{Error, RegionSpan, Result};
