//! Memory layout templates
//!
//! Each family declares, per memory type, the fixed offsets of the
//! components of a bootable image:
//!
//! ```ron
//! "mem_types": {
//!     "flexspi_nor": {
//!         "offsets": { "keyblob": 0, "fcb": 0x400, "hab_container": 0x1000 },
//!         "remap_align": 0x1000,
//!     },
//!     "sd": { "offsets": { "hab_container": 0x400 }, "byte_swap": 4 },
//! }
//! ```
//!
//! Alias families have no table of their own; they see their target's.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::device::{table_int, AttributeDatabase, AttributeMap, AttributeSet};
use crate::error::{Error, Result};
use crate::image::{remap, BinaryImage, BinaryRegion, Pattern, RemapRule};

/// Family attribute holding the per memory type layouts
pub const MEM_TYPES: &str = "mem_types";
/// Component offsets of one memory type
pub const OFFSETS: &str = "offsets";
/// Chunk size for byte swapping component content
pub const BYTE_SWAP: &str = "byte_swap";

/// Content supplied for one component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentInput {
    /// Component name, matched against the template
    pub name: String,
    /// Component bytes
    pub data: Vec<u8>,
    /// Explicit offset, overriding the template
    pub offset: Option<i64>,
}

impl ComponentInput {
    /// Component placed at its template offset
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
            offset: None,
        }
    }

    /// Place the component at an explicit offset
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Reverse the bytes of every `n`-byte chunk, including a trailing partial one
pub fn swap_bytes(data: &mut [u8], n: usize) {
    if n > 1 {
        data.chunks_mut(n).for_each(<[u8]>::reverse);
    }
}

/// Resolved layout of one (family, memory type) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryLayout {
    family: String,
    revision: String,
    memory_type: String,
    offsets: BTreeMap<String, u32>,
    remap: Option<RemapRule>,
    byte_swap: Option<usize>,
}

fn mem_types(attrs: &AttributeSet) -> Result<Option<&AttributeMap>> {
    if !attrs.contains(MEM_TYPES) {
        return Ok(None);
    }
    attrs.get_table(MEM_TYPES).map(Some)
}

fn nested_name(memory_type: &str, key: &str) -> String {
    alloc::format!("{}.{}.{}", MEM_TYPES, memory_type, key)
}

impl MemoryLayout {
    /// Memory types declared by a resolved family
    pub fn memory_types(attrs: &AttributeSet) -> Result<Vec<String>> {
        Ok(mem_types(attrs)?
            .map(|table| table.keys().cloned().collect())
            .unwrap_or_default())
    }

    /// Extract the layout of `memory_type` from resolved attributes
    pub fn from_attributes(attrs: &AttributeSet, memory_type: &str) -> Result<Self> {
        let entry = mem_types(attrs)?
            .and_then(|table| table.get(memory_type))
            .ok_or_else(|| Error::UnknownMemoryType {
                family: attrs.family().to_string(),
                memory_type: memory_type.to_string(),
            })?;
        let entry = entry.as_table().ok_or_else(|| Error::AttributeType {
            name: alloc::format!("{}.{}", MEM_TYPES, memory_type),
            expected: "a table",
        })?;

        let mut offsets = BTreeMap::new();
        if let Some(table) = entry.get(OFFSETS) {
            let table = table.as_table().ok_or_else(|| Error::AttributeType {
                name: nested_name(memory_type, OFFSETS),
                expected: "a table",
            })?;
            for (component, value) in table {
                let offset = value
                    .as_int()
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| Error::AttributeType {
                        name: nested_name(memory_type, component),
                        expected: "a 32-bit offset",
                    })?;
                offsets.insert(component.clone(), offset);
            }
        }

        let mut remap = RemapRule::from_attributes(attrs)?;
        if let Some(align) = table_int(entry, remap::REMAP_ALIGN)? {
            let align = remap::non_negative(remap::REMAP_ALIGN, align)?;
            if let Some(rule) = remap.as_mut() {
                rule.align = Some(align);
            }
        }

        let byte_swap = table_int(entry, BYTE_SWAP)?
            .map(|n| {
                usize::try_from(n).map_err(|_| Error::AttributeType {
                    name: nested_name(memory_type, BYTE_SWAP),
                    expected: "a non-negative integer",
                })
            })
            .transpose()?
            .filter(|&n| n > 1);

        Ok(Self {
            family: attrs.family().to_string(),
            revision: attrs.revision().to_string(),
            memory_type: memory_type.to_string(),
            offsets,
            remap,
            byte_swap,
        })
    }

    /// Resolve a family and extract the layout of `memory_type`
    pub fn resolve(
        db: &AttributeDatabase,
        family: &str,
        revision: &str,
        memory_type: &str,
    ) -> Result<Self> {
        let attrs = db.resolve(family, revision)?;
        Self::from_attributes(&attrs, memory_type)
    }

    /// Family the layout was resolved for
    pub fn family(&self) -> &str {
        &self.family
    }

    /// Resolved revision
    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// Memory type of the layout
    pub fn memory_type(&self) -> &str {
        &self.memory_type
    }

    /// Component offsets by name
    pub fn offsets(&self) -> &BTreeMap<String, u32> {
        &self.offsets
    }

    /// Template offset of a component
    pub fn offset(&self, component: &str) -> Option<u32> {
        self.offsets.get(component).copied()
    }

    /// Alias address translation of the family
    pub fn remap(&self) -> Option<RemapRule> {
        self.remap
    }

    /// Byte swap chunk size of the memory type
    pub fn byte_swap(&self) -> Option<usize> {
        self.byte_swap
    }

    /// Turn component inputs into regions
    ///
    /// An explicit offset wins over the template; a component without
    /// either fails with [`Error::MissingOffset`].
    pub fn place(&self, inputs: Vec<ComponentInput>) -> Result<Vec<BinaryRegion>> {
        inputs
            .into_iter()
            .map(|input| {
                let offset = input
                    .offset
                    .or_else(|| self.offset(&input.name).map(i64::from))
                    .ok_or_else(|| Error::MissingOffset {
                        component: input.name.clone(),
                    })?;

                let mut data = input.data;
                if let Some(n) = self.byte_swap {
                    swap_bytes(&mut data, n);
                }
                Ok(BinaryRegion::data(offset, data).with_name(input.name))
            })
            .collect()
    }

    /// Translate alias offsets of `image` with the family's remap rule
    ///
    /// Without a rule the image is left alone; any alias offset then
    /// fails composition.
    pub fn apply_remap(&self, image: &mut BinaryImage) -> Result<()> {
        match &self.remap {
            Some(rule) => image.remap_offsets(rule),
            None => Ok(()),
        }
    }

    /// Build a ready-to-compose image from component inputs
    pub fn build_image(
        &self,
        size: Option<u32>,
        pattern: Pattern,
        inputs: Vec<ComponentInput>,
    ) -> Result<BinaryImage> {
        let mut image = BinaryImage::new(pattern)
            .with_name(alloc::format!("{}_{}", self.family, self.memory_type));
        image.size = size;
        image.regions = self.place(inputs)?;
        self.apply_remap(&mut image)?;
        Ok(image)
    }
}
