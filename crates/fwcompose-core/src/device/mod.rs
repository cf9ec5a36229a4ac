//! Device attribute database
//!
//! This module resolves a (family, revision) pair to a flat set of typed
//! attributes. The database is usually loaded from RON documents:
//!
//! ```ignore
//! let db = AttributeDatabase::from_dir(Path::new("devices"))?;
//! let attrs = db.resolve("rt117x", LATEST)?;
//! let remap_base = attrs.get_opt_int("remap_base")?;
//! ```

mod attribute;
mod database;

#[cfg(feature = "std")]
mod ron;

pub use attribute::*;
pub use database::*;

#[cfg(feature = "std")]
pub use self::ron::DatabaseError;
