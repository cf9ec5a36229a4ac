//! Grouped register (multi-word key) encoding
//!
//! A grouped register is one logical value, such as a 256-bit master key,
//! stored across several fixed-width fuse words. This module splits such
//! values into physical sub-registers and joins them back.

mod codec;
mod flags;

pub use codec::*;
pub use flags::RegisterFlags;
