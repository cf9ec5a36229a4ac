//! TOML image descriptions
//!
//! ```toml
//! name = "bootable_image"
//! size = "0x2010"
//! pattern = "ones"
//! family = "rt117x"
//! memory_type = "flexspi_nor"
//!
//! [[regions]]
//! binary_block = { offset = 0x1000, size = "4 KiB", pattern = 0xA5 }
//!
//! [[regions]]
//! binary_file = { path = "app.bin", offset = "0x2000", name = "application" }
//!
//! [[regions]]
//! binary_file = { path = "boot.s19" }
//!
//! [components]
//! fcb = "fcb.bin"
//! keystore = { path = "keystore.bin", offset = 0x900 }
//! ```
//!
//! Paths are relative to the directory of the description. Components
//! are placed through the memory layout of `family`/`memory_type`.
//! Intel HEX, S-record and ELF files default to their load address when
//! `offset` is omitted; raw binaries need an explicit offset.

use std::collections::BTreeMap;
use std::format;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::string::String;
use std::vec::Vec;

use thiserror::Error;

use super::input::{DecodedInput, InputError};
use super::types::{BinaryImage, BinaryRegion, Pattern};
use super::RemapRule;
use crate::device::{AttributeDatabase, LATEST};
use crate::template::{ComponentInput, MemoryLayout};

/// Error type for image description loading
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the description or an input file failed
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        /// File that could not be read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },
    /// TOML syntax error or invalid value
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// An input file could not be decoded
    #[error("{}: {source}", .path.display())]
    Input {
        /// File that could not be decoded
        path: PathBuf,
        /// Underlying error
        #[source]
        source: InputError,
    },
    /// A setting needed by the description is absent
    #[error("{0} is required")]
    Missing(&'static str),
    /// Device resolution or image construction failed
    #[error(transparent)]
    Core(#[from] crate::Error),
}

// ============================================================================
// TOML deserialization types (intermediate format)
// ============================================================================

#[derive(Debug, serde::Deserialize)]
struct ImageDef {
    name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_size")]
    size: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_pattern")]
    pattern: Option<Pattern>,
    family: Option<String>,
    revision: Option<String>,
    memory_type: Option<String>,
    #[serde(default)]
    regions: Vec<RegionDef>,
    #[serde(default)]
    components: BTreeMap<String, ComponentDef>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
enum RegionDef {
    BinaryFile(FileDef),
    BinaryBlock(BlockDef),
    BinaryImage(NestedDef),
}

#[derive(Debug, serde::Deserialize)]
struct FileDef {
    path: PathBuf,
    #[serde(default, deserialize_with = "deserialize_opt_offset")]
    offset: Option<i64>,
    name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_size")]
    size: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_pattern")]
    pattern: Option<Pattern>,
}

#[derive(Debug, serde::Deserialize)]
struct BlockDef {
    #[serde(default, deserialize_with = "deserialize_opt_size")]
    size: Option<u32>,
    #[serde(deserialize_with = "deserialize_offset")]
    offset: i64,
    name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_pattern")]
    pattern: Option<Pattern>,
}

#[derive(Debug, serde::Deserialize)]
struct NestedDef {
    #[serde(deserialize_with = "deserialize_offset")]
    offset: i64,
    name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_size")]
    size: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_pattern")]
    pattern: Option<Pattern>,
    #[serde(default)]
    regions: Vec<RegionDef>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum ComponentDef {
    Path(PathBuf),
    Placed {
        path: PathBuf,
        #[serde(deserialize_with = "deserialize_offset")]
        offset: i64,
    },
}

/// Integer given as a TOML number or as a string
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum NumOrStr {
    Int(i64),
    Str(String),
}

fn deserialize_offset<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    match NumOrStr::deserialize(deserializer)? {
        NumOrStr::Int(n) => Ok(n),
        NumOrStr::Str(s) => parse_number(&s).map_err(serde::de::Error::custom),
    }
}

fn deserialize_opt_offset<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_offset(deserializer).map(Some)
}

fn deserialize_opt_size<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    let size = match NumOrStr::deserialize(deserializer)? {
        NumOrStr::Int(n) => u32::try_from(n).map_err(|_| format!("invalid size: {}", n)),
        NumOrStr::Str(s) => parse_size(&s),
    };
    size.map(Some).map_err(serde::de::Error::custom)
}

fn deserialize_opt_pattern<'de, D>(deserializer: D) -> Result<Option<Pattern>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    let pattern = match NumOrStr::deserialize(deserializer)? {
        NumOrStr::Int(n) => u8::try_from(n)
            .map(Pattern::Byte)
            .map_err(|_| format!("invalid pattern: {}", n)),
        NumOrStr::Str(s) => s.parse::<Pattern>().map_err(|e| format!("{}", e)),
    };
    pattern.map(Some).map_err(serde::de::Error::custom)
}

/// Parse a number that can be hex (0x...) or decimal, optionally negative
fn parse_number(s: &str) -> Result<i64, String> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, s),
    };
    let digits = digits.replace('_', "");

    let value = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).map_err(|e| format!("invalid hex: {}", e))?
    } else {
        digits
            .parse::<i64>()
            .map_err(|e| format!("invalid number: {}", e))?
    };

    Ok(if negative { -value } else { value })
}

/// Parse a size string like "16 KiB", "0x400" or "4096"
fn parse_size(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let invalid = || format!("invalid size: {}", s);

    if let Ok(n) = parse_number(s) {
        return u32::try_from(n).map_err(|_| invalid());
    }

    let s_lower = s.to_lowercase();
    let (num_str, multiplier) = if let Some(n) = s_lower.strip_suffix("mib") {
        (n.trim(), 1024 * 1024)
    } else if let Some(n) = s_lower.strip_suffix("mb") {
        (n.trim(), 1024 * 1024)
    } else if let Some(n) = s_lower.strip_suffix("kib") {
        (n.trim(), 1024)
    } else if let Some(n) = s_lower.strip_suffix("kb") {
        (n.trim(), 1024)
    } else if let Some(n) = s_lower.strip_suffix("b") {
        (n.trim(), 1)
    } else {
        return Err(invalid());
    };

    let num = parse_number(num_str).map_err(|_| invalid())?;
    u32::try_from(num)
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(invalid)
}

// ============================================================================
// Loading
// ============================================================================

/// A parsed image description
#[derive(Debug)]
pub struct ImageConfig {
    def: ImageDef,
    base_dir: PathBuf,
}

impl ImageConfig {
    /// Load a description from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::from_toml_str(&content, base_dir)
    }

    /// Parse a description; relative paths are resolved against `base_dir`
    pub fn from_toml_str(content: &str, base_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let def: ImageDef = toml::from_str(content)?;
        Ok(Self {
            def,
            base_dir: base_dir.into(),
        })
    }

    /// Image name
    pub fn name(&self) -> Option<&str> {
        self.def.name.as_deref()
    }

    /// Device family the image is built for
    pub fn family(&self) -> Option<&str> {
        self.def.family.as_deref()
    }

    /// Requested revision, `latest` when unset
    pub fn revision(&self) -> &str {
        self.def.revision.as_deref().unwrap_or(LATEST)
    }

    /// Memory type selecting the layout template
    pub fn memory_type(&self) -> Option<&str> {
        self.def.memory_type.as_deref()
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, ConfigError> {
        let path = self.base_dir.join(path);
        let data = fs::read(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        log::debug!("Read {} bytes from {}", data.len(), path.display());
        Ok(data)
    }

    fn file_region(&self, def: &FileDef) -> Result<BinaryRegion, ConfigError> {
        let input = DecodedInput::decode(&def.path, self.read(&def.path)?).map_err(|source| {
            ConfigError::Input {
                path: self.base_dir.join(&def.path),
                source,
            }
        })?;
        let offset = def
            .offset
            .or(input.address.map(i64::from))
            .ok_or(ConfigError::Missing("binary_file offset"))?;

        let mut region = BinaryRegion::data(offset, Vec::new());
        region.content = input.content;
        Ok(region)
    }

    fn region(&self, def: &RegionDef) -> Result<BinaryRegion, ConfigError> {
        let (mut region, name, size, pattern) = match def {
            RegionDef::BinaryFile(f) => (self.file_region(f)?, &f.name, f.size, f.pattern),
            RegionDef::BinaryBlock(b) => {
                let mut region = BinaryRegion::block(b.offset, 0);
                region.size = None;
                (region, &b.name, b.size, b.pattern)
            }
            RegionDef::BinaryImage(n) => {
                let children = n
                    .regions
                    .iter()
                    .map(|child| self.region(child))
                    .collect::<Result<Vec<_>, _>>()?;
                (
                    BinaryRegion::image(n.offset, children),
                    &n.name,
                    n.size,
                    n.pattern,
                )
            }
        };
        region.name = name.clone();
        region.size = size.or(region.size);
        region.pattern = pattern;
        Ok(region)
    }

    /// Read all inputs and build the region tree
    ///
    /// A device database is needed when the description names a memory
    /// type, uses components or contains alias offsets of a family with a
    /// remap rule.
    pub fn load(&self, db: Option<&AttributeDatabase>) -> Result<BinaryImage, ConfigError> {
        let mut image = BinaryImage::new(self.def.pattern.unwrap_or_default());
        image.name = self.def.name.clone();
        image.size = self.def.size;
        for def in &self.def.regions {
            image.add_region(self.region(def)?);
        }

        let attrs = match (self.family(), db) {
            (Some(family), Some(db)) => Some(db.resolve(family, self.revision())?),
            (Some(_), None) if self.memory_type().is_some() => {
                return Err(ConfigError::Missing("device database"))
            }
            _ => None,
        };

        let layout = match (self.memory_type(), &attrs) {
            (Some(memory_type), Some(attrs)) => {
                Some(MemoryLayout::from_attributes(attrs, memory_type)?)
            }
            (Some(_), None) => return Err(ConfigError::Missing("family")),
            (None, _) => None,
        };

        if !self.def.components.is_empty() {
            let layout = layout.as_ref().ok_or(ConfigError::Missing("memory_type"))?;
            let mut inputs = Vec::with_capacity(self.def.components.len());
            for (name, component) in &self.def.components {
                let input = match component {
                    ComponentDef::Path(path) => ComponentInput::new(name.clone(), self.read(path)?),
                    ComponentDef::Placed { path, offset } => {
                        ComponentInput::new(name.clone(), self.read(path)?).with_offset(*offset)
                    }
                };
                inputs.push(input);
            }
            image.regions.extend(layout.place(inputs)?);
        }

        match (&layout, &attrs) {
            (Some(layout), _) => layout.apply_remap(&mut image)?,
            (None, Some(attrs)) => {
                if let Some(rule) = RemapRule::from_attributes(attrs)? {
                    image.remap_offsets(&rule)?;
                }
            }
            (None, None) => {}
        }

        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{AttributeMap, AttributeValue, DeviceFamily};
    use crate::Error;
    use std::vec;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("0x400").unwrap(), 0x400);
        assert_eq!(parse_number("1024").unwrap(), 1024);
        assert_eq!(parse_number("-0x1000_0000").unwrap(), -0x1000_0000);
        assert!(parse_number("0xZZ").is_err());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("16 KiB").unwrap(), 16 * 1024);
        assert_eq!(parse_size("1MiB").unwrap(), 1024 * 1024);
        assert_eq!(parse_size("0x2010").unwrap(), 0x2010);
        assert_eq!(parse_size("79").unwrap(), 79);
        assert!(parse_size("-4").is_err());
        assert!(parse_size("8 GiB").is_err());
    }

    #[test]
    fn test_blocks_only() {
        let config = ImageConfig::from_toml_str(
            r#"
            name = "blocks"
            size = 16
            pattern = "0xA5"

            [[regions]]
            binary_block = { name = "blk", offset = "0x4", size = 4, pattern = "zeros" }
            "#,
            "",
        )
        .unwrap();

        let image = config.load(None).unwrap();
        assert_eq!(image.name.as_deref(), Some("blocks"));
        let data = image.export().unwrap();
        assert_eq!(&data[..4], &[0xA5; 4]);
        assert_eq!(&data[4..8], &[0; 4]);
        assert_eq!(&data[8..], &[0xA5; 8]);
    }

    #[test]
    fn test_declared_size_too_small() {
        let config = ImageConfig::from_toml_str(
            r#"
            size = 79
            [[regions]]
            binary_block = { offset = 48, size = 32 }
            "#,
            "",
        )
        .unwrap();
        let image = config.load(None).unwrap();
        assert!(matches!(
            image.compose(),
            Err(Error::ImageTooSmall { declared: 79, required: 80, .. })
        ));
    }

    #[test]
    fn test_block_without_size() {
        let config = ImageConfig::from_toml_str(
            r#"
            [[regions]]
            binary_block = { offset = 0, name = "nosize" }
            "#,
            "",
        )
        .unwrap();
        let image = config.load(None).unwrap();
        assert!(matches!(image.compose(), Err(Error::MissingSize { .. })));
    }

    #[test]
    fn test_nested_content_too_large() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.bin"), [1u8, 2, 3, 4]).unwrap();

        let config = ImageConfig::from_toml_str(
            r#"
            pattern = "ones"

            [[regions]]
            binary_file = { path = "a.bin", offset = 0, size = 6 }

            [[regions]]
            [regions.binary_image]
            offset = 8
            size = 4
            pattern = 0xCC
            regions = [ { binary_file = { path = "a.bin", offset = 1, size = 2 } } ]
            "#,
            dir.path(),
        )
        .unwrap();

        let image = config.load(None).unwrap();
        assert!(matches!(
            image.compose(),
            Err(Error::ContentTooLarge { size: 2, content: 4, .. })
        ));
    }

    #[test]
    fn test_nested_composite() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.bin"), [1u8, 2]).unwrap();

        let config = ImageConfig::from_toml_str(
            r#"
            pattern = "ones"

            [[regions]]
            [regions.binary_image]
            offset = 2
            size = 4
            pattern = 0xCC
            regions = [ { binary_file = { path = "a.bin", offset = 1 } } ]
            "#,
            dir.path(),
        )
        .unwrap();

        let data = config.load(None).unwrap().export().unwrap();
        assert_eq!(data, vec![0xFF, 0xFF, 0xCC, 1, 2, 0xCC]);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = ImageConfig::from_toml_str(
            r#"
            [[regions]]
            binary_file = { path = "missing.bin", offset = 0 }
            "#,
            dir.path(),
        )
        .unwrap();
        assert!(matches!(config.load(None), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_components_need_layout() {
        let config = ImageConfig::from_toml_str(
            r#"
            [components]
            fcb = "fcb.bin"
            "#,
            "",
        )
        .unwrap();
        assert!(matches!(
            config.load(None),
            Err(ConfigError::Missing("memory_type"))
        ));
    }

    #[test]
    fn test_alias_offset_with_family_remap() {
        let mut db = AttributeDatabase::new();
        let mut attrs = AttributeMap::new();
        attrs.insert("remap_base".into(), AttributeValue::Int(0x1000_0000));
        db.insert_family(DeviceFamily::new("lpc55s3x", attrs));

        let config = ImageConfig::from_toml_str(
            r#"
            family = "lpc55s3x"
            [[regions]]
            binary_block = { offset = "-0x1000_0010", size = 4 }
            "#,
            "",
        )
        .unwrap();

        let image = config.load(Some(&db)).unwrap();
        assert_eq!(image.regions[0].offset, 0x10);
        assert!(matches!(
            config.load(None).unwrap().compose(),
            Err(Error::UnresolvedOffset { .. })
        ));
    }

    #[test]
    fn test_hex_file_at_load_address() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("app.hex"),
            ":0400100001020304E2\n:00000001FF\n",
        )
        .unwrap();

        let config = ImageConfig::from_toml_str(
            r#"
            pattern = "zeros"
            [[regions]]
            binary_file = { path = "app.hex", name = "app" }
            "#,
            dir.path(),
        )
        .unwrap();

        let image = config.load(None).unwrap();
        assert_eq!(image.regions[0].offset, 0x10);
        let data = image.export().unwrap();
        assert_eq!(data.len(), 0x14);
        assert_eq!(&data[0x10..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_explicit_offset_overrides_load_address() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("app.hex"),
            ":0400100001020304E2\n:00000001FF\n",
        )
        .unwrap();

        let config = ImageConfig::from_toml_str(
            r#"
            [[regions]]
            binary_file = { path = "app.hex", offset = 0 }
            "#,
            dir.path(),
        )
        .unwrap();
        assert_eq!(config.load(None).unwrap().export().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_raw_file_needs_offset() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.bin"), [1u8, 2]).unwrap();

        let config = ImageConfig::from_toml_str(
            r#"
            [[regions]]
            binary_file = { path = "a.bin" }
            "#,
            dir.path(),
        )
        .unwrap();
        assert!(matches!(
            config.load(None),
            Err(ConfigError::Missing("binary_file offset"))
        ));
    }

    #[test]
    fn test_malformed_input_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.s19"), "S3not-a-record\n").unwrap();

        let config = ImageConfig::from_toml_str(
            r#"
            [[regions]]
            binary_file = { path = "bad.s19", offset = 0 }
            "#,
            dir.path(),
        )
        .unwrap();
        assert!(matches!(config.load(None), Err(ConfigError::Input { .. })));
    }
}
