//! Attribute values and resolved attribute sets

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;

use crate::error::{Error, Result};

/// Placeholder token replaced by a peripheral index (e.g. `OTFAD{index}_KEY`)
pub const INDEX_PLACEHOLDER: &str = "{index}";

/// One layer of attributes, keyed by name
pub type AttributeMap = BTreeMap<String, AttributeValue>;

/// A typed attribute value
///
/// Tables are used for structured attributes such as `mem_types` and
/// `grouped_registers`. Every variant, tables included, is replaced
/// wholesale when a later layer defines the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "std", serde(untagged))]
pub enum AttributeValue {
    /// Boolean flag
    Bool(bool),
    /// Integer (offsets, widths, counts)
    Int(i64),
    /// String, possibly containing [`INDEX_PLACEHOLDER`]
    Str(String),
    /// List of strings
    List(Vec<String>),
    /// Nested table
    Table(AttributeMap),
}

impl AttributeValue {
    /// Human readable type name, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "a boolean",
            Self::Int(_) => "an integer",
            Self::Str(_) => "a string",
            Self::List(_) => "a list",
            Self::Table(_) => "a table",
        }
    }

    /// Get the value as an integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as a string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Get the value as a list of strings
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    /// Get the value as a nested table
    pub fn as_table(&self) -> Option<&AttributeMap> {
        match self {
            Self::Table(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) if *v < 0 => write!(f, "-0x{:X}", v.unsigned_abs()),
            Self::Int(v) => write!(f, "0x{:X}", v),
            Self::Str(v) => write!(f, "\"{}\"", v),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "\"{}\"", item)?;
                }
                write!(f, "]")
            }
            Self::Table(table) => {
                write!(f, "{{")?;
                for (i, (key, value)) in table.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Replace the index placeholder in `template` with `index`
///
/// Plain textual substitution; strings without the placeholder are
/// returned unchanged.
pub fn substitute_index(template: &str, index: u32) -> String {
    template.replace(INDEX_PLACEHOLDER, &index.to_string())
}

/// Look up an integer in a table, failing if it has another type
pub fn table_int(table: &AttributeMap, key: &str) -> Result<Option<i64>> {
    match table.get(key) {
        None => Ok(None),
        Some(value) => value.as_int().map(Some).ok_or_else(|| Error::AttributeType {
            name: key.to_string(),
            expected: "an integer",
        }),
    }
}

/// Look up a boolean in a table; absent means `false`
pub fn table_flag(table: &AttributeMap, key: &str) -> Result<bool> {
    match table.get(key) {
        None => Ok(false),
        Some(value) => value.as_bool().ok_or_else(|| Error::AttributeType {
            name: key.to_string(),
            expected: "a boolean",
        }),
    }
}

/// The flat attribute set of one resolved device
///
/// Produced by [`AttributeDatabase::resolve`](super::AttributeDatabase::resolve)
/// and never modified afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSet {
    family: String,
    revision: String,
    values: AttributeMap,
}

impl AttributeSet {
    /// Create an empty set for a family/revision pair
    pub fn new(family: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            revision: revision.into(),
            values: AttributeMap::new(),
        }
    }

    /// Family this set was resolved for (as requested, aliases included)
    pub fn family(&self) -> &str {
        &self.family
    }

    /// Concrete revision the set was resolved to
    pub fn revision(&self) -> &str {
        &self.revision
    }

    pub(crate) fn set_revision(&mut self, revision: impl Into<String>) {
        self.revision = revision.into();
    }

    /// Apply a layer: every attribute in `layer` replaces the one with the same name
    pub fn merge(&mut self, layer: &AttributeMap) {
        for (name, value) in layer {
            self.values.insert(name.clone(), value.clone());
        }
    }

    /// Get a raw attribute value
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.values.get(name)
    }

    /// Check whether an attribute is present
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Get a required integer attribute
    pub fn get_int(&self, name: &str) -> Result<i64> {
        self.get_opt_int(name)?.ok_or_else(|| Error::MissingAttribute {
            name: name.to_string(),
        })
    }

    /// Get an optional integer attribute
    pub fn get_opt_int(&self, name: &str) -> Result<Option<i64>> {
        table_int(&self.values, name)
    }

    /// Get a boolean attribute; absent means `false`
    pub fn get_flag(&self, name: &str) -> Result<bool> {
        table_flag(&self.values, name)
    }

    /// Get a required string attribute
    pub fn get_str(&self, name: &str) -> Result<&str> {
        self.typed(name, "a string", AttributeValue::as_str)
    }

    /// Get a string attribute with the index placeholder substituted
    pub fn get_indexed_str(&self, name: &str, index: u32) -> Result<String> {
        self.get_str(name).map(|s| substitute_index(s, index))
    }

    /// Get a required list attribute
    pub fn get_list(&self, name: &str) -> Result<&[String]> {
        self.typed(name, "a list", AttributeValue::as_list)
    }

    /// Get a required table attribute
    pub fn get_table(&self, name: &str) -> Result<&AttributeMap> {
        self.typed(name, "a table", AttributeValue::as_table)
    }

    fn typed<'a, T: ?Sized>(
        &'a self,
        name: &str,
        expected: &'static str,
        cast: impl Fn(&'a AttributeValue) -> Option<&'a T>,
    ) -> Result<&'a T> {
        let value = self.values.get(name).ok_or_else(|| Error::MissingAttribute {
            name: name.to_string(),
        })?;
        cast(value).ok_or_else(|| Error::AttributeType {
            name: name.to_string(),
            expected,
        })
    }

    /// Iterate over all attributes in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of attributes
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the set is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
