//! Layered device attribute database
//!
//! Attributes of a device are resolved by merging, in order:
//!
//! 1. global defaults
//! 2. family attributes
//! 3. revision attributes
//!
//! A family may instead be a pure alias of another family. Resolving an
//! alias resolves its target first and then applies the alias's own
//! revision layer (if it declares one) on top.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use super::attribute::{AttributeMap, AttributeSet};
use crate::error::{Error, Result};

/// Revision sentinel selecting the family's latest revision
pub const LATEST: &str = "latest";

/// Redirection record of an alias family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAlias {
    /// Target family
    pub family: String,
    /// Target revision; when `None` the requested revision is forwarded
    pub revision: Option<String>,
}

/// One device family entry of the database
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFamily {
    /// Family name (e.g. "rt117x")
    pub name: String,
    /// Revision selected by [`LATEST`]
    pub latest: Option<String>,
    /// Family-level attributes (empty for aliases)
    pub attributes: AttributeMap,
    /// Revision-level attributes
    pub revisions: BTreeMap<String, AttributeMap>,
    /// Set when this family is a pure alias
    pub alias: Option<DeviceAlias>,
}

impl DeviceFamily {
    /// Create a family with only family-level attributes
    pub fn new(name: impl Into<String>, attributes: AttributeMap) -> Self {
        Self {
            name: name.into(),
            attributes,
            ..Default::default()
        }
    }

    /// Create a pure alias of another family
    pub fn alias(
        name: impl Into<String>,
        family: impl Into<String>,
        revision: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            alias: Some(DeviceAlias {
                family: family.into(),
                revision,
            }),
            ..Default::default()
        }
    }

    /// Add a revision layer; the first revision added becomes `latest` if unset
    pub fn with_revision(mut self, revision: impl Into<String>, attributes: AttributeMap) -> Self {
        let revision = revision.into();
        if self.latest.is_none() {
            self.latest = Some(revision.clone());
        }
        self.revisions.insert(revision, attributes);
        self
    }

    /// Set the revision selected by [`LATEST`]
    pub fn with_latest(mut self, revision: impl Into<String>) -> Self {
        self.latest = Some(revision.into());
        self
    }

    /// Check whether this family is an alias
    pub fn is_alias(&self) -> bool {
        self.alias.is_some()
    }

    /// Names of the declared revisions
    pub fn revision_names(&self) -> impl Iterator<Item = &str> {
        self.revisions.keys().map(|k| k.as_str())
    }

    /// Select the revision layer for a requested revision
    ///
    /// Returns `None` when the family declares no revisions and the request
    /// can be satisfied without a revision layer.
    fn select_revision(&self, requested: &str) -> Result<Option<(&str, &AttributeMap)>> {
        let unknown = || Error::UnknownRevision {
            family: self.name.clone(),
            revision: requested.to_string(),
        };

        if self.revisions.is_empty() {
            // Aliases forward whatever was requested to their target
            let forwarded = self.is_alias()
                || requested == LATEST
                || self.latest.as_deref() == Some(requested);
            return if forwarded { Ok(None) } else { Err(unknown()) };
        }

        let name = if requested == LATEST {
            self.latest.as_deref().ok_or_else(unknown)?
        } else {
            requested
        };

        self.revisions
            .get_key_value(name)
            .map(|(k, v)| Some((k.as_str(), v)))
            .ok_or_else(unknown)
    }
}

/// Device attribute database
///
/// Loaded once, validated with [`validate`](Self::validate) and shared
/// read-only afterwards; resolution never mutates it.
#[derive(Debug, Clone, Default)]
pub struct AttributeDatabase {
    defaults: AttributeMap,
    families: BTreeMap<String, DeviceFamily>,
}

impl AttributeDatabase {
    /// Create an empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Global default attributes
    pub fn defaults(&self) -> &AttributeMap {
        &self.defaults
    }

    /// Merge attributes into the global defaults
    ///
    /// Later values win. Returns the keys that were already set to a
    /// different value.
    pub fn extend_defaults(&mut self, defaults: AttributeMap) -> Vec<String> {
        let mut redefined = Vec::new();
        for (key, value) in defaults {
            if let Some(old) = self.defaults.insert(key.clone(), value) {
                if self.defaults.get(&key) != Some(&old) {
                    redefined.push(key);
                }
            }
        }
        redefined
    }

    /// Add a family, replacing an existing one with the same name
    ///
    /// Returns the replaced family, if any.
    pub fn insert_family(&mut self, family: DeviceFamily) -> Option<DeviceFamily> {
        self.families.insert(family.name.clone(), family)
    }

    /// Look up a family by name
    pub fn family(&self, name: &str) -> Option<&DeviceFamily> {
        self.families.get(name)
    }

    /// Iterate over all families in name order
    pub fn families(&self) -> impl Iterator<Item = &DeviceFamily> {
        self.families.values()
    }

    /// Names of all families
    pub fn family_names(&self) -> Vec<&str> {
        self.families.keys().map(|k| k.as_str()).collect()
    }

    /// Number of families
    pub fn len(&self) -> usize {
        self.families.len()
    }

    /// Check if the database is empty
    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// Check alias references after loading
    ///
    /// Every alias must reach a non-alias family; pinned target revisions
    /// must exist.
    pub fn validate(&self) -> Result<()> {
        for family in self.families.values() {
            let Some(alias) = &family.alias else {
                continue;
            };

            let target = self.families.get(&alias.family).ok_or_else(|| Error::UnknownFamily {
                family: alias.family.clone(),
            })?;
            if let Some(revision) = &alias.revision {
                if !target.is_alias() {
                    target.select_revision(revision)?;
                }
            }

            self.alias_target(&family.name)?;
        }
        Ok(())
    }

    /// Follow an alias chain to the first non-alias family
    pub fn alias_target(&self, family: &str) -> Result<&DeviceFamily> {
        let mut current = self.families.get(family).ok_or_else(|| Error::UnknownFamily {
            family: family.to_string(),
        })?;

        for _ in 0..=self.families.len() {
            match &current.alias {
                None => return Ok(current),
                Some(alias) => {
                    current = self.families.get(&alias.family).ok_or_else(|| {
                        Error::UnknownFamily {
                            family: alias.family.clone(),
                        }
                    })?;
                }
            }
        }

        Err(Error::AliasCycle {
            family: family.to_string(),
        })
    }

    /// Resolve the flat attribute set of a family/revision pair
    ///
    /// `revision` may be [`LATEST`]. The returned set reports the requested
    /// family name and the concrete revision it resolved to.
    pub fn resolve(&self, family: &str, revision: &str) -> Result<AttributeSet> {
        let mut set = AttributeSet::new(family, revision);
        set.merge(&self.defaults);
        let resolved = self.layer(family, revision, &mut set, 0)?;
        set.set_revision(resolved);
        Ok(set)
    }

    fn layer(
        &self,
        family: &str,
        revision: &str,
        set: &mut AttributeSet,
        hops: usize,
    ) -> Result<String> {
        // Any terminating chain visits each family at most once
        if hops > self.families.len() {
            return Err(Error::AliasCycle {
                family: set.family().to_string(),
            });
        }

        let entry = self.families.get(family).ok_or_else(|| Error::UnknownFamily {
            family: family.to_string(),
        })?;
        let own = entry.select_revision(revision)?;

        match &entry.alias {
            Some(alias) => {
                let forwarded = match (&alias.revision, own) {
                    (Some(pinned), _) => pinned.as_str(),
                    (None, Some((name, _))) => name,
                    (None, None) => revision,
                };
                let target_revision = self.layer(&alias.family, forwarded, set, hops + 1)?;
                match own {
                    Some((name, attributes)) => {
                        set.merge(attributes);
                        Ok(name.to_string())
                    }
                    None => Ok(target_revision),
                }
            }
            None => {
                set.merge(&entry.attributes);
                match own {
                    Some((name, attributes)) => {
                        set.merge(attributes);
                        Ok(name.to_string())
                    }
                    None => Ok(entry
                        .latest
                        .clone()
                        .unwrap_or_else(|| revision.to_string())),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::attribute::AttributeValue;
    use super::*;

    fn layer(entries: &[(&str, i64)]) -> AttributeMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), AttributeValue::Int(*v)))
            .collect()
    }

    fn database() -> AttributeDatabase {
        let mut db = AttributeDatabase::new();
        db.extend_defaults(layer(&[("fuse_word_width", 32), ("remap_base", 0)]));
        db.insert_family(
            DeviceFamily::new("rt117x", layer(&[("remap_base", 0x1000_0000), ("keys", 4)]))
                .with_revision("a0", layer(&[("keys", 2)]))
                .with_revision("b0", layer(&[]))
                .with_latest("b0"),
        );
        db.insert_family(DeviceFamily::alias("rt1176", "rt117x", None));
        db.insert_family(DeviceFamily::alias("rt1175", "rt117x", Some("a0".to_string())));
        db.insert_family(
            DeviceFamily::alias("rt1173", "rt117x", None)
                .with_revision("b0", layer(&[("keys", 8)])),
        );
        db
    }

    #[test]
    fn test_layers_override_in_order() {
        let db = database();

        let b0 = db.resolve("rt117x", "b0").unwrap();
        assert_eq!(b0.get_int("fuse_word_width").unwrap(), 32);
        assert_eq!(b0.get_int("remap_base").unwrap(), 0x1000_0000);
        assert_eq!(b0.get_int("keys").unwrap(), 4);

        let a0 = db.resolve("rt117x", "a0").unwrap();
        assert_eq!(a0.get_int("keys").unwrap(), 2);
    }

    #[test]
    fn test_latest_selects_declared_revision() {
        let db = database();
        let set = db.resolve("rt117x", LATEST).unwrap();
        assert_eq!(set.revision(), "b0");
    }

    #[test]
    fn test_unknown_family_and_revision() {
        let db = database();
        assert!(matches!(
            db.resolve("kw45xx", LATEST),
            Err(Error::UnknownFamily { .. })
        ));
        assert!(matches!(
            db.resolve("rt117x", "c0"),
            Err(Error::UnknownRevision { .. })
        ));
    }

    #[test]
    fn test_alias_is_transparent() {
        let db = database();
        for revision in [LATEST, "a0", "b0"] {
            let target = db.resolve("rt117x", revision).unwrap();
            let alias = db.resolve("rt1176", revision).unwrap();
            assert!(target.iter().eq(alias.iter()));
            assert_eq!(alias.family(), "rt1176");
            assert_eq!(alias.revision(), target.revision());
        }
    }

    #[test]
    fn test_alias_pinned_revision() {
        let db = database();
        let set = db.resolve("rt1175", LATEST).unwrap();
        assert_eq!(set.revision(), "a0");
        assert_eq!(set.get_int("keys").unwrap(), 2);
    }

    #[test]
    fn test_alias_revision_layer_applies_last() {
        let db = database();
        let set = db.resolve("rt1173", LATEST).unwrap();
        assert_eq!(set.get_int("keys").unwrap(), 8);
        assert_eq!(set.get_int("remap_base").unwrap(), 0x1000_0000);
        assert!(matches!(
            db.resolve("rt1173", "a0"),
            Err(Error::UnknownRevision { .. })
        ));
    }

    #[test]
    fn test_alias_cycle() {
        let mut db = database();
        db.insert_family(DeviceFamily::alias("x", "y", None));
        db.insert_family(DeviceFamily::alias("y", "x", None));

        assert!(matches!(db.validate(), Err(Error::AliasCycle { .. })));
        assert!(matches!(
            db.resolve("x", LATEST),
            Err(Error::AliasCycle { .. })
        ));
    }

    #[test]
    fn test_validate_dangling_alias() {
        let mut db = database();
        db.insert_family(DeviceFamily::alias("ghost", "missing", None));
        assert!(matches!(db.validate(), Err(Error::UnknownFamily { .. })));
    }

    #[test]
    fn test_validate_ok() {
        let db = database();
        db.validate().unwrap();
        assert_eq!(db.alias_target("rt1176").unwrap().name, "rt117x");
    }

    #[test]
    fn test_extend_defaults_reports_changed_keys() {
        let mut db = AttributeDatabase::new();
        assert!(db
            .extend_defaults(layer(&[("fuse_word_width", 32), ("remap_base", 0)]))
            .is_empty());

        let redefined = db.extend_defaults(layer(&[
            ("fuse_word_width", 64),
            ("remap_base", 0),
            ("keys", 4),
        ]));
        assert_eq!(redefined, ["fuse_word_width"]);
        assert_eq!(
            db.defaults().get("fuse_word_width"),
            Some(&AttributeValue::Int(64))
        );
    }
}
