//! Region placement and composition
//!
//! Composition is a single pass over the region tree: every composite
//! resolves its children's intervals (rendering nested composites with
//! their own pattern first), rejects overlapping intervals, checks its
//! declared size and finally fills a buffer. Nothing is returned unless
//! every step succeeds.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use super::types::{BinaryImage, BinaryRegion, Pattern, RegionContent};
use crate::error::{Error, RegionSpan, Result};

/// Kind of a placed region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementKind {
    /// Data region
    Data,
    /// Pattern-filled block
    Block,
    /// Nested composite
    Image,
}

/// A region as placed in the composed image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Region label
    pub name: String,
    /// Nesting depth (0 for top-level regions)
    pub depth: usize,
    /// Absolute start offset
    pub start: u32,
    /// Absolute end offset (exclusive)
    pub end: u32,
    /// Region kind
    pub kind: PlacementKind,
    /// Effective fill pattern of the region
    pub pattern: Pattern,
}

impl Placement {
    /// Size in bytes
    pub fn size(&self) -> u32 {
        self.end - self.start
    }
}

/// Result of a successful composition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedImage {
    name: Option<String>,
    pattern: Pattern,
    data: Vec<u8>,
    placements: Vec<Placement>,
}

impl ComposedImage {
    /// Image name, if any
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Final resolved size in bytes
    pub fn size(&self) -> u32 {
        // render() only allocates buffers whose size fits in u32
        self.data.len() as u32
    }

    /// Default fill pattern
    pub fn pattern(&self) -> Pattern {
        self.pattern
    }

    /// The composed bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Take the composed bytes
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// All placed regions, depth first, each composite sorted by offset
    pub fn placements(&self) -> &[Placement] {
        &self.placements
    }
}

/// How a span is written into its parent buffer
enum Fill<'a> {
    Data(&'a [u8]),
    Block,
    Image(Rendered),
}

/// A resolved child interval, relative to its parent
struct Span<'a> {
    region: &'a BinaryRegion,
    start: u32,
    end: u32,
    fill: Fill<'a>,
}

impl Span<'_> {
    fn absolute(&self, base: u32) -> RegionSpan {
        RegionSpan {
            name: self.region.label(),
            start: base.saturating_add(self.start),
            end: base.saturating_add(self.end),
        }
    }
}

/// A composite rendered into its own buffer
struct Rendered {
    data: Vec<u8>,
    placements: Vec<Placement>,
}

fn region_offset(region: &BinaryRegion) -> Result<u32> {
    if region.offset < 0 {
        return Err(Error::UnresolvedOffset {
            region: region.label(),
            offset: region.offset,
        });
    }
    u32::try_from(region.offset).map_err(|_| Error::AddressOverflow)
}

fn length(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::AddressOverflow)
}

/// Build the interval of one child, rendering nested composites
fn span<'a>(region: &'a BinaryRegion, pattern: Pattern, base: u32, depth: usize) -> Result<Span<'a>> {
    let start = region_offset(region)?;

    let (size, fill) = match &region.content {
        RegionContent::Data(data) => {
            let len = length(data.len())?;
            match region.size {
                Some(size) if size < len => {
                    return Err(Error::ContentTooLarge {
                        region: region.label(),
                        size,
                        content: len,
                    })
                }
                Some(size) => (size, Fill::Data(data)),
                None => (len, Fill::Data(data)),
            }
        }
        RegionContent::Block => {
            let size = region.size.ok_or_else(|| Error::MissingSize {
                region: region.label(),
            })?;
            (size, Fill::Block)
        }
        RegionContent::Image(children) => {
            let rendered = render(
                children,
                region.size,
                region.pattern.unwrap_or(pattern),
                &region.label(),
                base.saturating_add(start),
                depth + 1,
            )?;
            (length(rendered.data.len())?, Fill::Image(rendered))
        }
    };

    let end = start.checked_add(size).ok_or(Error::AddressOverflow)?;
    Ok(Span {
        region,
        start,
        end,
        fill,
    })
}

fn render(
    regions: &[BinaryRegion],
    declared: Option<u32>,
    pattern: Pattern,
    label: &str,
    base: u32,
    depth: usize,
) -> Result<Rendered> {
    let mut spans = regions
        .iter()
        .map(|region| span(region, pattern, base, depth))
        .collect::<Result<Vec<_>>>()?;

    // Sorted by start, the intervals are disjoint iff each one starts at or
    // after the end of the previous non-empty one
    spans.sort_by_key(|s| (s.start, s.end));
    let mut previous: Option<&Span<'_>> = None;
    for current in spans.iter().filter(|s| s.end > s.start) {
        if let Some(prev) = previous {
            if current.start < prev.end {
                return Err(Error::RegionOverlap {
                    first: prev.absolute(base),
                    second: current.absolute(base),
                });
            }
        }
        previous = Some(current);
    }

    let required = spans.iter().map(|s| s.end).max().unwrap_or(0);
    let size = match declared {
        Some(declared) if declared < required => {
            return Err(Error::ImageTooSmall {
                region: label.into(),
                declared,
                required,
            })
        }
        Some(declared) => declared,
        None => required,
    };

    let mut data = vec![0u8; size as usize];
    pattern.fill(&mut data, 0);

    let mut placements = Vec::with_capacity(spans.len());
    for span in spans {
        let target = &mut data[span.start as usize..span.end as usize];
        let region_pattern = span.region.pattern.unwrap_or(pattern);
        let name = span.region.label();
        log::trace!(
            "{:indent$}{} -> 0x{:08X}..0x{:08X}",
            "",
            name,
            base.saturating_add(span.start),
            base.saturating_add(span.end),
            indent = depth * 2
        );

        let (kind, nested) = match span.fill {
            Fill::Data(bytes) => {
                let (head, tail) = target.split_at_mut(bytes.len());
                head.copy_from_slice(bytes);
                region_pattern.fill(tail, span.start as usize + bytes.len());
                (PlacementKind::Data, Vec::new())
            }
            Fill::Block => {
                region_pattern.fill(target, span.start as usize);
                (PlacementKind::Block, Vec::new())
            }
            Fill::Image(rendered) => {
                target.copy_from_slice(&rendered.data);
                (PlacementKind::Image, rendered.placements)
            }
        };

        placements.push(Placement {
            name,
            depth,
            start: base.saturating_add(span.start),
            end: base.saturating_add(span.end),
            kind,
            pattern: region_pattern,
        });
        placements.extend(nested);
    }

    Ok(Rendered { data, placements })
}

impl BinaryImage {
    /// Compose the image into one contiguous buffer
    ///
    /// Fails without partial output on missing sizes, untranslated alias
    /// offsets, overlapping regions or a declared size that is too small.
    pub fn compose(&self) -> Result<ComposedImage> {
        let rendered = render(&self.regions, self.size, self.pattern, &self.label(), 0, 0)?;
        Ok(ComposedImage {
            name: self.name.clone(),
            pattern: self.pattern,
            data: rendered.data,
            placements: rendered.placements,
        })
    }

    /// Validate the region tree, returning the resolved image size
    pub fn validate(&self) -> Result<u32> {
        self.compose().map(|image| image.size())
    }

    /// Compose and return only the bytes
    pub fn export(&self) -> Result<Vec<u8>> {
        self.compose().map(ComposedImage::into_data)
    }

    /// Replace all regions by one data region holding the composed bytes
    pub fn join(&mut self) -> Result<()> {
        let composed = self.compose()?;
        self.size = Some(composed.size());
        self.regions = vec![BinaryRegion {
            name: self.name.clone(),
            offset: 0,
            size: None,
            pattern: None,
            content: RegionContent::Data(composed.into_data()),
        }];
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn byte_block(offset: i64, size: u32, value: u8) -> BinaryRegion {
        BinaryRegion::block(offset, size).with_pattern(Pattern::Byte(value))
    }

    #[test]
    fn test_empty_image_is_pattern() {
        let image = BinaryImage::new(Pattern::Byte(0xA5)).with_size(16);
        assert_eq!(image.export().unwrap(), vec![0xA5; 16]);
    }

    #[test]
    fn test_regions_sorted_on_output() {
        let mut image = BinaryImage::new(Pattern::ZEROS).with_name("main").with_size(8);
        image.add_region(byte_block(0x2, 1, 0x2).with_name("0x2"));
        image.add_region(byte_block(0x6, 1, 0x6).with_name("0x6"));
        image.add_region(byte_block(0x4, 1, 0x4).with_name("0x4"));

        assert_eq!(
            image.export().unwrap(),
            vec![0x00, 0x00, 0x02, 0x00, 0x04, 0x00, 0x06, 0x00]
        );
    }

    #[test]
    fn test_join() {
        let mut image = BinaryImage::new(Pattern::ZEROS).with_name("main").with_size(8);
        image.add_region(byte_block(0x2, 1, 0x2));
        image.add_region(byte_block(0x6, 1, 0x6));
        let before = image.export().unwrap();

        image.join().unwrap();
        assert_eq!(image.len(), 1);
        assert_eq!(image.export().unwrap(), before);
    }

    #[test]
    fn test_overlap_is_exact() {
        for a0 in 0..6u32 {
            for a1 in a0..6 {
                for b0 in 0..6u32 {
                    for b1 in b0..6 {
                        let mut image = BinaryImage::new(Pattern::ZEROS);
                        image.add_region(BinaryRegion::block(a0.into(), a1 - a0).with_name("a"));
                        image.add_region(BinaryRegion::block(b0.into(), b1 - b0).with_name("b"));

                        let overlaps = a0 < a1 && b0 < b1 && a0 < b1 && b0 < a1;
                        let result = image.compose();
                        assert_eq!(
                            matches!(result, Err(Error::RegionOverlap { .. })),
                            overlaps,
                            "a=[{a0},{a1}) b=[{b0},{b1})"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_overlap_names_both_regions() {
        let mut image = BinaryImage::new(Pattern::ZEROS);
        image.add_region(BinaryRegion::block(0x10, 0x10).with_name("fcb"));
        image.add_region(BinaryRegion::block(0x18, 0x10).with_name("app"));

        let Err(Error::RegionOverlap { first, second }) = image.compose() else {
            panic!("expected overlap");
        };
        assert_eq!(
            first,
            RegionSpan {
                name: "fcb".into(),
                start: 0x10,
                end: 0x20
            }
        );
        assert_eq!(second.name, "app");
        assert_eq!((second.start, second.end), (0x18, 0x28));
    }

    #[test]
    fn test_declared_size_too_small() {
        let mut image = BinaryImage::new(Pattern::ZEROS).with_size(79);
        image.add_region(BinaryRegion::block(48, 32));
        assert!(matches!(
            image.compose(),
            Err(Error::ImageTooSmall {
                declared: 79,
                required: 80,
                ..
            })
        ));

        image.size = Some(80);
        assert_eq!(image.validate().unwrap(), 80);
    }

    #[test]
    fn test_size_inferred_from_last_region() {
        let mut image = BinaryImage::new(Pattern::ONES);
        image.add_region(BinaryRegion::data(0x10, vec![1, 2, 3]));
        let composed = image.compose().unwrap();
        assert_eq!(composed.size(), 0x13);
        assert_eq!(&composed.data()[..0x10], &[0xFF; 0x10]);
        assert_eq!(&composed.data()[0x10..], &[1, 2, 3]);
    }

    #[test]
    fn test_block_without_size() {
        let mut image = BinaryImage::new(Pattern::ZEROS);
        let mut block = BinaryRegion::block(0, 0).with_name("blk");
        block.size = None;
        image.add_region(block);
        assert!(matches!(
            image.compose(),
            Err(Error::MissingSize { region }) if region == "blk"
        ));
    }

    #[test]
    fn test_zero_length_never_conflicts() {
        let mut image = BinaryImage::new(Pattern::ZEROS);
        image.add_region(BinaryRegion::block(0, 8));
        image.add_region(BinaryRegion::block(4, 0));
        assert_eq!(image.validate().unwrap(), 8);
    }

    #[test]
    fn test_nested_pattern_precedence() {
        let nested = BinaryRegion::image(4, vec![byte_block(2, 2, 0x11)])
            .with_size(8)
            .with_pattern(Pattern::Byte(0xCC))
            .with_name("nested");
        let mut image = BinaryImage::new(Pattern::Byte(0xA5)).with_size(16);
        image.add_region(nested);

        let composed = image.compose().unwrap();
        assert_eq!(
            composed.data(),
            &[
                0xA5, 0xA5, 0xA5, 0xA5, //
                0xCC, 0xCC, 0x11, 0x11, 0xCC, 0xCC, 0xCC, 0xCC, //
                0xA5, 0xA5, 0xA5, 0xA5,
            ]
        );

        let placements = composed.placements();
        assert_eq!(placements.len(), 2);
        assert_eq!((placements[0].start, placements[0].end), (4, 12));
        assert_eq!(placements[1].depth, 1);
        assert_eq!((placements[1].start, placements[1].end), (6, 8));
    }

    #[test]
    fn test_nested_inherits_parent_pattern() {
        let nested = BinaryRegion::image(0, vec![byte_block(1, 1, 0x11)]).with_size(3);
        let mut image = BinaryImage::new(Pattern::Byte(0xA5));
        image.add_region(nested);
        assert_eq!(image.export().unwrap(), vec![0xA5, 0x11, 0xA5]);
    }

    #[test]
    fn test_nested_overlap_reports_absolute_ranges() {
        let nested = BinaryRegion::image(
            0x100,
            vec![
                BinaryRegion::block(0, 8).with_name("x"),
                BinaryRegion::block(4, 8).with_name("y"),
            ],
        );
        let mut image = BinaryImage::new(Pattern::ZEROS);
        image.add_region(nested);

        let Err(Error::RegionOverlap { first, second }) = image.compose() else {
            panic!("expected overlap");
        };
        assert_eq!((first.start, first.end), (0x100, 0x108));
        assert_eq!((second.start, second.end), (0x104, 0x10C));
    }

    #[test]
    fn test_nested_declared_size_too_small() {
        let nested = BinaryRegion::image(0, vec![BinaryRegion::block(0, 8)])
            .with_size(4)
            .with_name("container");
        let mut image = BinaryImage::new(Pattern::ZEROS);
        image.add_region(nested);
        assert!(matches!(
            image.compose(),
            Err(Error::ImageTooSmall { region, .. }) if region == "container"
        ));
    }

    #[test]
    fn test_sibling_overlapping_nested_gap() {
        // The gap inside a composite still belongs to it
        let nested = BinaryRegion::image(0, vec![BinaryRegion::block(0, 2)]).with_size(8);
        let mut image = BinaryImage::new(Pattern::ZEROS);
        image.add_region(nested);
        image.add_region(BinaryRegion::block(4, 2));
        assert!(matches!(image.compose(), Err(Error::RegionOverlap { .. })));
    }

    #[test]
    fn test_data_padding_and_limits() {
        let mut image = BinaryImage::new(Pattern::ZEROS);
        image.add_region(
            BinaryRegion::data(0, vec![1, 2])
                .with_size(4)
                .with_pattern(Pattern::ONES),
        );
        assert_eq!(image.export().unwrap(), vec![1, 2, 0xFF, 0xFF]);

        image.regions[0].size = Some(1);
        assert!(matches!(
            image.compose(),
            Err(Error::ContentTooLarge {
                size: 1,
                content: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_unresolved_alias_offset() {
        let mut image = BinaryImage::new(Pattern::ZEROS);
        image.add_region(BinaryRegion::block(-0x1000_0000, 4));
        assert!(matches!(
            image.compose(),
            Err(Error::UnresolvedOffset {
                offset: -0x1000_0000,
                ..
            })
        ));
    }

    #[test]
    fn test_inc_pattern_positions() {
        let mut image = BinaryImage::new(Pattern::Inc).with_size(6);
        image.add_region(BinaryRegion::block(2, 2).with_pattern(Pattern::Inc));
        assert_eq!(image.export().unwrap(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_inc_pattern_inherited_by_block() {
        let mut image = BinaryImage::new(Pattern::Inc).with_size(6);
        image.add_region(BinaryRegion::block(2, 2));
        assert_eq!(image.export().unwrap(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_inc_pattern_pads_data() {
        let mut image = BinaryImage::new(Pattern::Inc).with_size(6);
        image.add_region(BinaryRegion::data(2, vec![0xAA]).with_size(3));
        assert_eq!(image.export().unwrap(), vec![0, 1, 0xAA, 3, 4, 5]);
    }

    #[test]
    fn test_inc_pattern_restarts_in_nested_composite() {
        let mut image = BinaryImage::new(Pattern::Inc).with_size(6);
        image.add_region(BinaryRegion::image(2, vec![BinaryRegion::block(1, 2)]).with_size(4));
        assert_eq!(image.export().unwrap(), vec![0, 1, 0, 1, 2, 3]);
    }
}
