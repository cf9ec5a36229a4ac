//! RON device database loading
//!
//! Each document describes one or more families:
//!
//! ```ron
//! (
//!     attributes: { "fuse_word_width": 32 },
//!     devices: {
//!         "rt117x": (
//!             latest: Some("b0"),
//!             attributes: Some({ "remap_base": 0x1000_0000 }),
//!             revisions: { "a0": {}, "b0": {} },
//!         ),
//!         "rt1176": (
//!             device_alias: Some((family: "rt117x")),
//!         ),
//!     },
//! )
//! ```
//!
//! Unknown keys are ignored. A family must declare `attributes` or
//! `device_alias`, but not both.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::string::String;
use std::vec::Vec;
use std::format;

use thiserror::Error;

use super::attribute::AttributeMap;
use super::database::{AttributeDatabase, DeviceAlias, DeviceFamily};

/// Error type for device database loading
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// I/O error reading files
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// RON parsing error
    #[error("parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
    /// Structural error in a document
    #[error("validation error: {0}")]
    Validation(String),
    /// Alias references do not resolve
    #[error("invalid device alias: {0}")]
    Alias(#[from] crate::Error),
}

// ============================================================================
// RON deserialization types (intermediate format)
// ============================================================================

/// Alias record (RON format)
#[derive(Debug, Clone, serde::Deserialize)]
struct AliasDef {
    family: String,
    #[serde(default)]
    revision: Option<String>,
}

/// Family definition (RON format)
#[derive(Debug, Clone, serde::Deserialize)]
struct DeviceDef {
    #[serde(default)]
    latest: Option<String>,
    #[serde(default)]
    attributes: Option<AttributeMap>,
    #[serde(default)]
    revisions: BTreeMap<String, AttributeMap>,
    #[serde(default)]
    device_alias: Option<AliasDef>,
}

/// Top-level document (RON format)
#[derive(Debug, Clone, serde::Deserialize)]
struct DatabaseDef {
    #[serde(default)]
    attributes: AttributeMap,
    #[serde(default)]
    devices: BTreeMap<String, DeviceDef>,
}

impl DeviceDef {
    fn into_family(self, name: String) -> Result<DeviceFamily, DatabaseError> {
        let alias = self.device_alias.map(|a| DeviceAlias {
            family: a.family,
            revision: a.revision,
        });

        let attributes = match (self.attributes, &alias) {
            (Some(_), Some(_)) => {
                return Err(DatabaseError::Validation(format!(
                    "family '{}' is an alias and cannot declare attributes",
                    name
                )))
            }
            (None, None) => {
                return Err(DatabaseError::Validation(format!(
                    "family '{}' has neither attributes nor device_alias",
                    name
                )))
            }
            (attributes, _) => attributes.unwrap_or_default(),
        };

        if let Some(latest) = &self.latest {
            if !self.revisions.is_empty() && !self.revisions.contains_key(latest) {
                return Err(DatabaseError::Validation(format!(
                    "family '{}' declares latest revision '{}' which is not defined",
                    name, latest
                )));
            }
        }

        Ok(DeviceFamily {
            name,
            latest: self.latest,
            attributes,
            revisions: self.revisions,
            alias,
        })
    }
}

// ============================================================================
// Loading
// ============================================================================

impl AttributeDatabase {
    /// Load families from a RON string
    ///
    /// Defaults are merged into the existing defaults. Aliases are not
    /// checked here since their target may live in a document loaded
    /// later; call [`validate`](Self::validate) once everything is loaded.
    pub fn load_ron(&mut self, content: &str) -> Result<usize, DatabaseError> {
        let def: DatabaseDef = ron::from_str(content)?;
        let count = def.devices.len();

        for key in self.extend_defaults(def.attributes) {
            log::warn!(
                "default attribute '{}' redefined, using the later value",
                key
            );
        }
        for (name, device) in def.devices {
            if self.family(&name).is_some() {
                return Err(DatabaseError::Validation(format!(
                    "family '{}' is defined twice",
                    name
                )));
            }
            self.insert_family(device.into_family(name)?);
        }

        Ok(count)
    }

    /// Load families from a single RON file
    pub fn load_file(&mut self, path: &Path) -> Result<usize, DatabaseError> {
        let content = fs::read_to_string(path)?;
        let count = self.load_ron(&content)?;
        log::debug!("Loaded {} families from {}", count, path.display());
        Ok(count)
    }

    /// Load all RON files from a directory, in file name order
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, DatabaseError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "ron") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut total = 0;
        for path in &paths {
            total += self.load_file(path)?;
        }
        Ok(total)
    }

    /// Parse and validate a database from a single RON string
    pub fn from_ron_str(content: &str) -> Result<Self, DatabaseError> {
        let mut db = Self::new();
        db.load_ron(content)?;
        db.validate()?;
        Ok(db)
    }

    /// Load and validate a database from a file or directory
    pub fn from_path(path: &Path) -> Result<Self, DatabaseError> {
        let mut db = Self::new();
        if path.is_dir() {
            db.load_dir(path)?;
        } else {
            db.load_file(path)?;
        }
        db.validate()?;
        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{AttributeValue, LATEST};
    use crate::Error;

    const DB: &str = r#"
    (
        attributes: { "fuse_word_width": 32, "fuse_byte_swap": false },
        devices: {
            "rt117x": (
                latest: Some("b0"),
                attributes: Some({
                    "remap_base": 0x10000000,
                    "mem_types": {
                        "flexspi_nor": {
                            "offsets": { "keyblob": 0, "fcb": 0x400 },
                        },
                    },
                    "tags": ["hab", "otfad"],
                }),
                revisions: { "a0": { "fuse_byte_swap": true }, "b0": {} },
                unknown_key: 5,
            ),
            "rt1176": (
                device_alias: Some((family: "rt117x")),
            ),
        },
    )
    "#;

    #[test]
    fn test_load_ron() {
        let db = AttributeDatabase::from_ron_str(DB).unwrap();
        assert_eq!(db.len(), 2);
        assert!(db.family("rt1176").unwrap().is_alias());

        let attrs = db.resolve("rt117x", "a0").unwrap();
        assert_eq!(attrs.get_int("fuse_word_width").unwrap(), 32);
        assert!(attrs.get_flag("fuse_byte_swap").unwrap());
        assert_eq!(attrs.get_int("remap_base").unwrap(), 0x1000_0000);
        assert_eq!(attrs.get_list("tags").unwrap().len(), 2);

        let mem = attrs.get_table("mem_types").unwrap();
        assert!(mem.contains_key("flexspi_nor"));
    }

    #[test]
    fn test_alias_matches_target() {
        let db = AttributeDatabase::from_ron_str(DB).unwrap();
        let target = db.resolve("rt117x", LATEST).unwrap();
        let alias = db.resolve("rt1176", LATEST).unwrap();
        assert!(target.iter().eq(alias.iter()));
    }

    #[test]
    fn test_family_without_content() {
        let doc = r#"( devices: { "empty": ( latest: Some("a0") ) } )"#;
        assert!(matches!(
            AttributeDatabase::from_ron_str(doc),
            Err(DatabaseError::Validation(_))
        ));
    }

    #[test]
    fn test_alias_cycle_rejected_at_load() {
        let doc = r#"
        (
            devices: {
                "a": ( device_alias: Some((family: "b")) ),
                "b": ( device_alias: Some((family: "a")) ),
            },
        )
        "#;
        assert!(matches!(
            AttributeDatabase::from_ron_str(doc),
            Err(DatabaseError::Alias(Error::AliasCycle { .. }))
        ));
    }

    #[test]
    fn test_duplicate_family() {
        let doc = r#"( devices: { "x": ( attributes: Some({}) ) } )"#;
        let mut db = AttributeDatabase::new();
        db.load_ron(doc).unwrap();
        assert!(matches!(
            db.load_ron(doc),
            Err(DatabaseError::Validation(_))
        ));
    }

    #[test]
    fn test_redefined_default_later_wins() {
        let mut db = AttributeDatabase::new();
        db.load_ron(r#"( attributes: { "fuse_word_width": 32, "remap_base": 0 }, devices: {} )"#)
            .unwrap();
        db.load_ron(r#"( attributes: { "fuse_word_width": 64, "remap_base": 0 }, devices: {} )"#)
            .unwrap();
        assert_eq!(
            db.defaults().get("fuse_word_width"),
            Some(&AttributeValue::Int(64))
        );
    }
}
