//! Alias address translation
//!
//! A negative region offset `-A` names the alias (for example secure)
//! address `A` of the region rather than a byte position. Before
//! composition such offsets are translated to physical offsets.

use crate::device::AttributeSet;
use crate::error::{Error, Result};

use super::types::{BinaryImage, BinaryRegion, RegionContent};

/// Attribute holding the start of the alias address range
pub const REMAP_BASE: &str = "remap_base";
/// Attribute holding the required alignment of translated offsets
pub const REMAP_ALIGN: &str = "remap_align";

/// Translates alias addresses into physical image offsets
pub trait AddressTranslator {
    /// Translate the alias `address` into a physical offset
    fn translate(&self, address: u64) -> Result<u64>;
}

/// Translation by subtracting a fixed base, with an optional alignment check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemapRule {
    /// First alias address, maps to physical offset 0
    pub base: u64,
    /// Required alignment of the physical offset
    pub align: Option<u64>,
}

impl RemapRule {
    /// Create a rule without alignment requirement
    pub fn new(base: u64) -> Self {
        Self { base, align: None }
    }

    /// Set the alignment requirement
    pub fn with_align(mut self, align: u64) -> Self {
        self.align = Some(align);
        self
    }

    /// Read `remap_base`/`remap_align` from resolved family attributes
    ///
    /// Returns `None` when the family declares no remap base.
    pub fn from_attributes(attrs: &AttributeSet) -> Result<Option<Self>> {
        let Some(base) = attrs.get_opt_int(REMAP_BASE)? else {
            return Ok(None);
        };
        let base = non_negative(REMAP_BASE, base)?;
        let align = attrs
            .get_opt_int(REMAP_ALIGN)?
            .map(|align| non_negative(REMAP_ALIGN, align))
            .transpose()?;
        Ok(Some(Self { base, align }))
    }
}

pub(crate) fn non_negative(name: &str, value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| Error::AttributeType {
        name: name.into(),
        expected: "a non-negative integer",
    })
}

impl AddressTranslator for RemapRule {
    fn translate(&self, address: u64) -> Result<u64> {
        let physical = address.checked_sub(self.base).ok_or(Error::RemapOutOfRange {
            address,
            base: self.base,
        })?;
        if let Some(align) = self.align.filter(|&a| a > 1) {
            if physical % align != 0 {
                return Err(Error::RemapMisaligned {
                    offset: physical,
                    align,
                });
            }
        }
        Ok(physical)
    }
}

/// Translate negative offsets of `regions`, whose composite starts at the
/// absolute offset `base`
fn remap_regions(
    regions: &mut [BinaryRegion],
    base: u64,
    translator: &dyn AddressTranslator,
) -> Result<()> {
    for region in regions {
        if region.offset < 0 {
            let physical = translator.translate(region.offset.unsigned_abs())?;
            let relative = physical
                .checked_sub(base)
                .ok_or(Error::RemapOutOfRange {
                    address: physical,
                    base,
                })?;
            let relative = i64::try_from(relative).map_err(|_| Error::AddressOverflow)?;
            log::debug!(
                "remapped {} from -0x{:X} to 0x{:X}",
                region.label(),
                region.offset.unsigned_abs(),
                relative
            );
            region.offset = relative;
        }

        let start = base
            .checked_add(region.offset.unsigned_abs())
            .ok_or(Error::AddressOverflow)?;
        if let RegionContent::Image(children) = &mut region.content {
            remap_regions(children, start, translator)?;
        }
    }
    Ok(())
}

impl BinaryImage {
    /// Translate every negative (alias) offset in the tree
    ///
    /// Offsets inside nested composites stay relative to their parent.
    pub fn remap_offsets(&mut self, translator: &dyn AddressTranslator) -> Result<()> {
        remap_regions(&mut self.regions, 0, translator)
    }
}
