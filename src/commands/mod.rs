//! CLI command implementations
//!
//! Every command receives the loaded device database read-only:
//!
//! - `compose` builds images from TOML descriptions
//! - `device` inspects families, attributes and memory layouts
//! - `key` converts key material to and from fuse sub-registers

pub mod compose;
pub mod device;
pub mod key;
