//! Firmware input files
//!
//! Region files may be raw binaries, Intel HEX, Motorola S-record or ELF
//! executables. The three addressed formats carry their own load address;
//! their segments become one region at the lowest address, with gaps
//! between segments left to the pattern fill.

use std::format;
use std::path::Path;
use std::string::{String, ToString};
use std::vec::Vec;

use object::{Object, ObjectSegment};
use thiserror::Error;

use super::types::{BinaryRegion, RegionContent};

/// Error type for decoding input files
#[derive(Debug, Error)]
pub enum InputError {
    /// The file content does not match its format
    #[error("invalid {format} file: {message}")]
    Parse {
        /// Detected format
        format: InputFormat,
        /// Decoder message
        message: String,
    },
    /// Two segments of one file cover the same address
    #[error("{format} segments overlap at 0x{address:08X}")]
    Overlap {
        /// Detected format
        format: InputFormat,
        /// First address covered twice
        address: u32,
    },
    /// The file has no loadable data
    #[error("{0} file contains no data")]
    Empty(InputFormat),
}

/// Format of an input file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// Raw bytes without a load address
    Binary,
    /// Intel HEX
    IntelHex,
    /// Motorola S-record
    SRecord,
    /// ELF executable, placed by its loadable segments
    Elf,
}

impl core::fmt::Display for InputFormat {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Binary => "binary",
            Self::IntelHex => "Intel HEX",
            Self::SRecord => "S-record",
            Self::Elf => "ELF",
        };
        f.write_str(name)
    }
}

impl InputFormat {
    /// Detect the format from the ELF magic, then from the file extension
    pub fn detect(path: &Path, data: &[u8]) -> Self {
        if data.starts_with(b"\x7fELF") {
            return Self::Elf;
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("hex" | "ihex" | "ihx") => Self::IntelHex,
            Some("s19" | "s28" | "s37" | "srec" | "mot") => Self::SRecord,
            Some("elf" | "axf") => Self::Elf,
            _ => Self::Binary,
        }
    }
}

/// Bytes at a load address
#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    address: u32,
    data: Vec<u8>,
}

/// A decoded input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInput {
    /// Format the file was decoded as
    pub format: InputFormat,
    /// Lowest load address, `None` for raw binaries
    pub address: Option<u32>,
    /// Region content
    pub content: RegionContent,
}

impl DecodedInput {
    /// Decode `data` read from `path`
    pub fn decode(path: &Path, data: Vec<u8>) -> Result<Self, InputError> {
        let format = InputFormat::detect(path, &data);
        let segments = match format {
            InputFormat::Binary => {
                return Ok(Self {
                    format,
                    address: None,
                    content: RegionContent::Data(data),
                })
            }
            InputFormat::IntelHex => intel_hex(&text(format, &data)?)?,
            InputFormat::SRecord => s_record(&text(format, &data)?)?,
            InputFormat::Elf => elf(&data)?,
        };

        let segments = merge(format, segments)?;
        let Some(base) = segments.first().map(|s| s.address) else {
            return Err(InputError::Empty(format));
        };
        log::debug!(
            "{}: {} {} segment(s) from 0x{:08X}",
            path.display(),
            segments.len(),
            format,
            base
        );

        let content = if segments.len() == 1 {
            RegionContent::Data(segments.into_iter().flat_map(|s| s.data).collect())
        } else {
            RegionContent::Image(
                segments
                    .into_iter()
                    .map(|s| {
                        BinaryRegion::data(i64::from(s.address - base), s.data)
                            .with_name(format!("segment@0x{:08X}", s.address))
                    })
                    .collect(),
            )
        };

        Ok(Self {
            format,
            address: Some(base),
            content,
        })
    }
}

fn parse_error(format: InputFormat, e: impl core::fmt::Display) -> InputError {
    InputError::Parse {
        format,
        message: e.to_string(),
    }
}

fn text(format: InputFormat, data: &[u8]) -> Result<String, InputError> {
    core::str::from_utf8(data)
        .map(|s| s.trim().to_string())
        .map_err(|e| parse_error(format, e))
}

fn intel_hex(text: &str) -> Result<Vec<Segment>, InputError> {
    let format = InputFormat::IntelHex;
    let mut base = 0u32;
    let mut segments = Vec::new();

    for record in ihex::Reader::new(text) {
        match record.map_err(|e| parse_error(format, e))? {
            ihex::Record::Data { offset, value } => segments.push(Segment {
                address: base.wrapping_add(u32::from(offset)),
                data: value,
            }),
            ihex::Record::ExtendedSegmentAddress(segment) => base = u32::from(segment) << 4,
            ihex::Record::ExtendedLinearAddress(upper) => base = u32::from(upper) << 16,
            ihex::Record::EndOfFile => break,
            _ => {}
        }
    }
    Ok(segments)
}

fn s_record(text: &str) -> Result<Vec<Segment>, InputError> {
    let format = InputFormat::SRecord;
    let mut segments = Vec::new();

    for record in srec::reader::read_records(text) {
        let (address, data) = match record.map_err(|e| parse_error(format, e))? {
            srec::Record::S1(data) => (u32::from(data.address.0), data.data),
            srec::Record::S2(data) => (data.address.0, data.data),
            srec::Record::S3(data) => (data.address.0, data.data),
            _ => continue,
        };
        segments.push(Segment { address, data });
    }
    Ok(segments)
}

fn elf(data: &[u8]) -> Result<Vec<Segment>, InputError> {
    let format = InputFormat::Elf;
    let file = object::File::parse(data).map_err(|e| parse_error(format, e))?;

    let mut segments = Vec::new();
    for segment in file.segments() {
        let bytes = segment.data().map_err(|e| parse_error(format, e))?;
        if bytes.is_empty() {
            continue;
        }
        let address = u32::try_from(segment.address())
            .map_err(|_| parse_error(format, "segment address above 4 GiB"))?;
        segments.push(Segment {
            address,
            data: bytes.to_vec(),
        });
    }
    Ok(segments)
}

/// Sort segments and join contiguous ones; overlapping segments are an error
fn merge(format: InputFormat, mut segments: Vec<Segment>) -> Result<Vec<Segment>, InputError> {
    segments.sort_by_key(|s| s.address);

    let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());
    for segment in segments.into_iter().filter(|s| !s.data.is_empty()) {
        if let Some(last) = merged.last_mut() {
            let end = u64::from(last.address) + last.data.len() as u64;
            if u64::from(segment.address) < end {
                return Err(InputError::Overlap {
                    format,
                    address: segment.address,
                });
            }
            if u64::from(segment.address) == end {
                last.data.extend(segment.data);
                continue;
            }
        }
        merged.push(segment);
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec;

    /// Minimal little-endian ELF32 executable with one PT_LOAD segment
    fn elf32(address: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"\x7fELF");
        out.extend_from_slice(&[1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        out.extend_from_slice(&2u16.to_le_bytes()); // ET_EXEC
        out.extend_from_slice(&0x28u16.to_le_bytes()); // EM_ARM
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&address.to_le_bytes()); // e_entry
        out.extend_from_slice(&52u32.to_le_bytes()); // e_phoff
        out.extend_from_slice(&0u32.to_le_bytes()); // e_shoff
        out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        out.extend_from_slice(&52u16.to_le_bytes()); // e_ehsize
        out.extend_from_slice(&32u16.to_le_bytes()); // e_phentsize
        out.extend_from_slice(&1u16.to_le_bytes()); // e_phnum
        out.extend_from_slice(&40u16.to_le_bytes()); // e_shentsize
        out.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
        out.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx

        let size = payload.len() as u32;
        for field in [1, 84, address, address, size, size, 5, 4] {
            out.extend_from_slice(&field.to_le_bytes());
        }
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_detect() {
        assert_eq!(
            InputFormat::detect(Path::new("app.bin"), &[0x7f, b'E', b'L', b'F']),
            InputFormat::Elf
        );
        assert_eq!(
            InputFormat::detect(Path::new("APP.HEX"), b":00000001FF"),
            InputFormat::IntelHex
        );
        assert_eq!(
            InputFormat::detect(Path::new("app.s19"), b"S0"),
            InputFormat::SRecord
        );
        // Text formats are only recognised by extension
        assert_eq!(
            InputFormat::detect(Path::new("fcb.bin"), b":00000001FF"),
            InputFormat::Binary
        );
    }

    #[test]
    fn test_binary_has_no_address() {
        let input = DecodedInput::decode(Path::new("fcb.bin"), vec![1, 2, 3]).unwrap();
        assert_eq!(input.address, None);
        assert_eq!(input.content, RegionContent::Data(vec![1, 2, 3]));
    }

    #[test]
    fn test_intel_hex() {
        let hex = ":020000040800F2\n\
                   :0400000001020304F2\n\
                   :0400040005060708DE\n\
                   :00000001FF\n";
        let input = DecodedInput::decode(Path::new("app.hex"), hex.as_bytes().to_vec()).unwrap();
        assert_eq!(input.format, InputFormat::IntelHex);
        assert_eq!(input.address, Some(0x0800_0000));
        assert_eq!(
            input.content,
            RegionContent::Data(vec![1, 2, 3, 4, 5, 6, 7, 8])
        );
    }

    #[test]
    fn test_s_record_with_gap() {
        let srec = "S30900001000AABBCCDDD8\n\
                    S30700001010EEFFEB\n\
                    S70500001000EA\n";
        let input = DecodedInput::decode(Path::new("app.srec"), srec.as_bytes().to_vec()).unwrap();
        assert_eq!(input.address, Some(0x1000));
        let RegionContent::Image(children) = input.content else {
            panic!("expected segments");
        };
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].offset, 0);
        assert_eq!(children[1].offset, 0x10);
        assert_eq!(children[1].content, RegionContent::Data(vec![0xEE, 0xFF]));
    }

    #[test]
    fn test_elf_load_address() {
        let data = elf32(0x8000_2000, &[0xDE, 0xAD, 0xBE, 0xEF]);
        let input = DecodedInput::decode(Path::new("image.elf"), data).unwrap();
        assert_eq!(input.format, InputFormat::Elf);
        assert_eq!(input.address, Some(0x8000_2000));
        assert_eq!(
            input.content,
            RegionContent::Data(vec![0xDE, 0xAD, 0xBE, 0xEF])
        );
    }

    #[test]
    fn test_overlapping_segments() {
        let segments = vec![
            Segment {
                address: 0x10,
                data: vec![0; 8],
            },
            Segment {
                address: 0x14,
                data: vec![0; 2],
            },
        ];
        assert!(matches!(
            merge(InputFormat::IntelHex, segments),
            Err(InputError::Overlap { address: 0x14, .. })
        ));
    }

    #[test]
    fn test_invalid_and_empty() {
        assert!(matches!(
            DecodedInput::decode(Path::new("bad.hex"), b":zz".to_vec()),
            Err(InputError::Parse { .. })
        ));
        assert!(matches!(
            DecodedInput::decode(Path::new("empty.hex"), b":00000001FF".to_vec()),
            Err(InputError::Empty(InputFormat::IntelHex))
        ));
    }
}
