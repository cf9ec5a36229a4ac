//! Splitting and joining grouped register values
//!
//! A value of `W` bits is left-padded to `N * R` bits (`N = ceil(W / R)`,
//! `R` the fuse word width) and cut into `N` chunks, most significant
//! first. With [`RegisterFlags::REVERSE_SUBREGS_ORDER`] logical chunk `i`
//! goes to physical sub-register `N-1-i`, matching fuse maps that keep the
//! most significant word at the highest fuse address.

use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use super::RegisterFlags;
use crate::device::{substitute_index, table_flag, table_int, AttributeSet};
use crate::error::{Error, Result};

/// Attribute holding the grouped register table
pub const GROUPED_REGISTERS: &str = "grouped_registers";
/// Attribute holding the physical fuse word width in bits
pub const FUSE_WORD_WIDTH: &str = "fuse_word_width";
/// Attribute enabling byte swap within each fuse word
pub const FUSE_BYTE_SWAP: &str = "fuse_byte_swap";

const DEFAULT_FUSE_WORD_WIDTH: u32 = 32;

/// A logical multi-word register
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupedRegister {
    /// Register name, placeholder already substituted
    pub name: String,
    /// Total width in bits
    pub width: u32,
    /// Ordering and rendering flags
    pub flags: RegisterFlags,
    /// Fuse index of physical sub-register 0, if known
    pub fuse_index: Option<u32>,
}

impl GroupedRegister {
    /// Create a register with default flags
    pub fn new(name: impl Into<String>, width: u32) -> Self {
        Self {
            name: name.into(),
            width,
            flags: RegisterFlags::empty(),
            fuse_index: None,
        }
    }

    /// Set the register flags
    pub fn with_flags(mut self, flags: RegisterFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the fuse index of the first physical sub-register
    pub fn with_fuse_index(mut self, index: u32) -> Self {
        self.fuse_index = Some(index);
        self
    }
}

/// Encoded sub-registers in physical order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedRegister {
    /// Fixed-width uppercase hex strings, no `0x` prefix
    Hex(Vec<String>),
    /// Raw bytes, big-endian per sub-register unless byte swapped
    Raw(Vec<Vec<u8>>),
}

impl EncodedRegister {
    /// Number of sub-registers
    pub fn len(&self) -> usize {
        match self {
            Self::Hex(v) => v.len(),
            Self::Raw(v) => v.len(),
        }
    }

    /// Check if there are no sub-registers
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One fuse word to program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuseRecord {
    /// Fuse index
    pub index: u32,
    /// Word value as stored (big-endian, after byte swap)
    pub value: Vec<u8>,
}

impl fmt::Display for FuseRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "efuse-program-once 0x{:X} 0x{}",
            self.index,
            hex::encode_upper(&self.value)
        )
    }
}

/// Codec for one grouped register on a given fuse word width
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterLayout {
    register: GroupedRegister,
    subreg_width: u32,
}

impl RegisterLayout {
    /// Create a codec; `subreg_width` must be a non-zero multiple of 8
    pub fn new(register: GroupedRegister, subreg_width: u32) -> Result<Self> {
        if subreg_width == 0 || subreg_width % 8 != 0 {
            return Err(Error::InvalidRegisterWidth {
                register: register.name,
                width: i64::from(subreg_width),
            });
        }
        if register.width == 0 {
            return Err(Error::InvalidRegisterWidth {
                register: register.name,
                width: 0,
            });
        }
        Ok(Self {
            register,
            subreg_width,
        })
    }

    /// Build the codec for `name` from resolved device attributes
    ///
    /// `name` is looked up as written in the `grouped_registers` table
    /// (e.g. `OTFAD{index}_KEY`); `index` substitutes the placeholder and,
    /// together with an `index_stride` entry, offsets the fuse index.
    pub fn from_attributes(attrs: &AttributeSet, name: &str, index: Option<u32>) -> Result<Self> {
        let table = attrs.get_table(GROUPED_REGISTERS)?;
        let entry = table
            .get(name)
            .ok_or_else(|| Error::MissingAttribute {
                name: [GROUPED_REGISTERS, ".", name].concat(),
            })?
            .as_table()
            .ok_or_else(|| Error::AttributeType {
                name: name.to_string(),
                expected: "a table",
            })?;

        let width = table_int(entry, "width")?.ok_or_else(|| Error::MissingAttribute {
            name: [name, ".width"].concat(),
        })?;
        let width = u32::try_from(width).map_err(|_| Error::InvalidRegisterWidth {
            register: name.to_string(),
            width,
        })?;

        let mut flags = RegisterFlags::empty();
        if table_flag(entry, "reverse_subregs_order")? {
            flags |= RegisterFlags::REVERSE_SUBREGS_ORDER;
        }
        if table_flag(entry, "config_as_hexstring")? {
            flags |= RegisterFlags::CONFIG_AS_HEXSTRING;
        }
        if attrs.get_flag(FUSE_BYTE_SWAP)? {
            flags |= RegisterFlags::BYTE_SWAP;
        }

        let stride = table_int(entry, "index_stride")?.unwrap_or(0);
        let fuse_index = table_int(entry, "fuse_index")?
            .map(|base| {
                stride
                    .checked_mul(i64::from(index.unwrap_or(0)))
                    .and_then(|offset| base.checked_add(offset))
                    .and_then(|i| u32::try_from(i).ok())
                    .ok_or(Error::AddressOverflow)
            })
            .transpose()?;

        let subreg_width = match attrs.get_opt_int(FUSE_WORD_WIDTH)? {
            Some(w) => u32::try_from(w).map_err(|_| Error::InvalidRegisterWidth {
                register: name.to_string(),
                width: w,
            })?,
            None => DEFAULT_FUSE_WORD_WIDTH,
        };

        let register = GroupedRegister {
            name: match index {
                Some(i) => substitute_index(name, i),
                None => name.to_string(),
            },
            width,
            flags,
            fuse_index,
        };
        Self::new(register, subreg_width)
    }

    /// The register described by this codec
    pub fn register(&self) -> &GroupedRegister {
        &self.register
    }

    /// Physical sub-register width in bits
    pub fn subreg_width(&self) -> u32 {
        self.subreg_width
    }

    /// Number of physical sub-registers
    pub fn count(&self) -> usize {
        self.register.width.div_ceil(self.subreg_width) as usize
    }

    /// Physical sub-register index holding logical chunk `logical`
    pub fn physical_index(&self, logical: usize) -> usize {
        if self
            .register
            .flags
            .contains(RegisterFlags::REVERSE_SUBREGS_ORDER)
        {
            self.count() - 1 - logical
        } else {
            logical
        }
    }

    fn word_bytes(&self) -> usize {
        (self.subreg_width / 8) as usize
    }

    fn too_wide(&self, bits: usize) -> Error {
        Error::ValueTooWide {
            register: self.register.name.clone(),
            width: self.register.width,
            actual: u32::try_from(bits).unwrap_or(u32::MAX),
        }
    }

    /// Split a big-endian value into sub-register words, in physical order
    fn split(&self, value: &[u8]) -> Result<Vec<Vec<u8>>> {
        let bits = significant_bits(value);
        if bits > self.register.width as usize {
            return Err(self.too_wide(bits));
        }

        let word = self.word_bytes();
        let count = self.count();
        let total = word * count;

        let significant = &value[value.len() - bits.div_ceil(8)..];
        let mut padded = vec![0u8; total];
        padded[total - significant.len()..].copy_from_slice(significant);

        let swap = self.register.flags.contains(RegisterFlags::BYTE_SWAP);
        let mut words = vec![Vec::new(); count];
        for (logical, chunk) in padded.chunks(word).enumerate() {
            let mut w = chunk.to_vec();
            if swap {
                w.reverse();
            }
            words[self.physical_index(logical)] = w;
        }
        Ok(words)
    }

    /// Encode a big-endian value into physical sub-registers
    ///
    /// Shorter values are zero-extended; values with more than `W`
    /// significant bits fail with [`Error::ValueTooWide`].
    pub fn encode(&self, value: &[u8]) -> Result<EncodedRegister> {
        let words = self.split(value)?;
        if self
            .register
            .flags
            .contains(RegisterFlags::CONFIG_AS_HEXSTRING)
        {
            Ok(EncodedRegister::Hex(
                words.iter().map(hex::encode_upper).collect(),
            ))
        } else {
            Ok(EncodedRegister::Raw(words))
        }
    }

    /// Encode a value given as a hex string (optional `0x` prefix)
    pub fn encode_hex(&self, value: &str) -> Result<EncodedRegister> {
        self.encode(&parse_hex(value)?)
    }

    /// Decode physical sub-registers back into a `ceil(W / 8)` byte value
    pub fn decode(&self, encoded: &EncodedRegister) -> Result<Vec<u8>> {
        let words: Vec<Vec<u8>> = match encoded {
            EncodedRegister::Hex(strings) => strings
                .iter()
                .map(|s| parse_hex(s))
                .collect::<Result<_>>()?,
            EncodedRegister::Raw(words) => words.clone(),
        };

        let count = self.count();
        if words.len() != count {
            return Err(Error::DecodeLength {
                register: self.register.name.clone(),
                expected: count,
                actual: words.len(),
            });
        }

        let word = self.word_bytes();
        let swap = self.register.flags.contains(RegisterFlags::BYTE_SWAP);
        let mut padded = Vec::with_capacity(word * count);
        for logical in 0..count {
            let w = &words[self.physical_index(logical)];
            if w.len() != word {
                return Err(Error::DecodeLength {
                    register: self.register.name.clone(),
                    expected: word,
                    actual: w.len(),
                });
            }
            if swap {
                padded.extend(w.iter().rev());
            } else {
                padded.extend_from_slice(w);
            }
        }

        let bits = significant_bits(&padded);
        if bits > self.register.width as usize {
            return Err(self.too_wide(bits));
        }

        let out = (self.register.width as usize).div_ceil(8);
        Ok(padded.split_off(padded.len() - out))
    }

    /// Fuse words to program for `value`, one per physical sub-register
    ///
    /// Indexes start at the register's fuse index (0 if unknown).
    pub fn fuse_records(&self, value: &[u8]) -> Result<Vec<FuseRecord>> {
        let base = self.register.fuse_index.unwrap_or(0);
        self.split(value)?
            .into_iter()
            .enumerate()
            .map(|(physical, value)| {
                let offset = u32::try_from(physical).map_err(|_| Error::AddressOverflow)?;
                Ok(FuseRecord {
                    index: base.checked_add(offset).ok_or(Error::AddressOverflow)?,
                    value,
                })
            })
            .collect()
    }
}

/// Number of significant bits in a big-endian value
fn significant_bits(value: &[u8]) -> usize {
    match value.iter().position(|&b| b != 0) {
        None => 0,
        Some(i) => (value.len() - i - 1) * 8 + (8 - value[i].leading_zeros() as usize),
    }
}

/// Parse a hex string, accepting an optional `0x` prefix and either case
pub fn parse_hex(s: &str) -> Result<Vec<u8>> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    hex::decode(digits).map_err(|_| Error::InvalidHex)
}
