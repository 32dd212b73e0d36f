//! Subblock directory - where each tile of pixels lives and what it covers

use crate::compression::CompressionMethod;
use crate::error::{CziError, Result};
use crate::io::{DimensionRecord, DirectoryEntryRecord};
use crate::types::{PixelType, Rect};
use std::collections::BTreeMap;
use std::io::Read;

/// One dimension of a subblock (X, Y, C, Z, T, S, M, ...)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimensionEntry {
    pub dimension: char,
    pub start: i32,
    pub size: i32,
    pub stored_size: i32,
}

impl From<&DimensionRecord> for DimensionEntry {
    fn from(record: &DimensionRecord) -> Self {
        Self {
            dimension: record.letter(),
            start: record.start,
            size: record.size,
            stored_size: record.stored_size,
        }
    }
}

/// Parsed directory entry of one subblock
#[derive(Debug, Clone, PartialEq)]
pub struct SubBlockEntry {
    pub pixel_type: PixelType,
    pub compression: CompressionMethod,
    pub file_position: u64,
    pub pyramid_type: u8,
    pub dimensions: Vec<DimensionEntry>,
}

impl SubBlockEntry {
    /// Decode one variable-length "DV" entry from `reader`
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let record: DirectoryEntryRecord = bincode::deserialize_from(&mut reader)?;
        if record.schema != DirectoryEntryRecord::SCHEMA {
            return Err(CziError::InvalidFormat(format!(
                "unsupported directory entry schema {:?}",
                String::from_utf8_lossy(&record.schema)
            )));
        }
        if record.dimension_count < 0 {
            return Err(CziError::InvalidFormat(format!(
                "negative dimension count {}",
                record.dimension_count
            )));
        }

        let mut dimensions = Vec::new();
        for _ in 0..record.dimension_count {
            let dimension: DimensionRecord = bincode::deserialize_from(&mut reader)?;
            dimensions.push(DimensionEntry::from(&dimension));
        }

        let pixel_type = PixelType::from_code(record.pixel_type).ok_or_else(|| {
            CziError::InvalidFormat(format!("unknown pixel type {}", record.pixel_type))
        })?;
        let compression = CompressionMethod::from_code(record.compression).ok_or_else(|| {
            CziError::InvalidFormat(format!("unknown compression {}", record.compression))
        })?;
        if record.file_position < 0 {
            return Err(CziError::InvalidFormat(format!(
                "negative subblock position {}",
                record.file_position
            )));
        }

        Ok(Self {
            pixel_type,
            compression,
            file_position: record.file_position as u64,
            pyramid_type: record.pyramid_type,
            dimensions,
        })
    }

    /// Size on disk of this entry
    pub fn encoded_size(&self) -> u64 {
        DirectoryEntryRecord::SIZE + self.dimensions.len() as u64 * DimensionRecord::SIZE
    }

    pub fn dimension(&self, letter: char) -> Option<&DimensionEntry> {
        self.dimensions.iter().find(|d| d.dimension == letter)
    }

    /// Start index along `letter`, if the entry carries that dimension
    pub fn start(&self, letter: char) -> Option<i32> {
        self.dimension(letter).map(|d| d.start)
    }

    pub fn scene(&self) -> Option<i32> {
        self.start('S')
    }

    pub fn mosaic_index(&self) -> Option<i32> {
        self.start('M')
    }

    /// Logical pixel rectangle covered by this subblock
    pub fn rect(&self) -> Option<Rect> {
        let x = self.dimension('X')?;
        let y = self.dimension('Y')?;
        if x.size <= 0 || y.size <= 0 {
            return None;
        }
        Some(Rect::new(x.start, y.start, x.size as u32, y.size as u32))
    }

    /// Stored (height, width) of the pixel data
    pub fn stored_shape(&self) -> Option<(usize, usize)> {
        let x = self.dimension('X')?;
        let y = self.dimension('Y')?;
        if x.stored_size <= 0 || y.stored_size <= 0 {
            return None;
        }
        Some((y.stored_size as usize, x.stored_size as usize))
    }

    /// Whether this subblock holds pixels at full resolution (pyramid level 0)
    pub fn is_full_resolution(&self) -> bool {
        match (self.dimension('X'), self.dimension('Y')) {
            (Some(x), Some(y)) => x.size == x.stored_size && y.size == y.stored_size,
            _ => false,
        }
    }

    /// Whether the entry sits at index `value` along `letter`.
    /// An entry without that dimension matches only index 0.
    fn at_index(&self, letter: char, value: i32) -> bool {
        self.start(letter).unwrap_or(0) == value
    }

    /// Whether this subblock contributes to the plane (channel, z, scene)
    pub fn matches_plane(&self, channel: usize, z: usize, scene: i32) -> bool {
        self.is_full_resolution()
            && self.at_index('C', channel as i32)
            && self.at_index('Z', z as i32)
            && self.at_index('T', 0)
            && self.scene().map_or(true, |s| s == scene)
    }
}

/// All subblock entries of a container
#[derive(Debug, Clone, Default)]
pub struct SubBlockDirectory {
    entries: Vec<SubBlockEntry>,
}

impl SubBlockDirectory {
    pub fn new(entries: Vec<SubBlockEntry>) -> Self {
        Self { entries }
    }

    /// Decode `count` consecutive entries. `count` comes from the file, so
    /// entries are pushed as they decode rather than reserved up front.
    pub fn read_from<R: Read>(mut reader: R, count: usize) -> Result<Self> {
        let mut entries = Vec::new();
        for _ in 0..count {
            entries.push(SubBlockEntry::read_from(&mut reader)?);
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[SubBlockEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn full_resolution(&self) -> impl Iterator<Item = &SubBlockEntry> {
        self.entries.iter().filter(|e| e.is_full_resolution())
    }

    /// Bounding rectangle per scene id. Empty when no subblock carries an S index.
    pub fn scene_rectangles(&self) -> BTreeMap<i32, Rect> {
        let mut scenes: BTreeMap<i32, Rect> = BTreeMap::new();
        for entry in self.full_resolution() {
            let (Some(scene), Some(rect)) = (entry.scene(), entry.rect()) else {
                continue;
            };
            scenes
                .entry(scene)
                .and_modify(|r| *r = r.union(&rect))
                .or_insert(rect);
        }
        scenes
    }

    /// Bounding rectangle of every full-resolution subblock
    pub fn bounding_rect(&self) -> Option<Rect> {
        self.full_resolution()
            .filter_map(|e| e.rect())
            .reduce(|acc, r| acc.union(&r))
    }

    /// Subblocks composing the plane (channel, z, scene), in mosaic order
    pub fn plane_tiles(&self, channel: usize, z: usize, scene: i32) -> Vec<&SubBlockEntry> {
        let mut tiles: Vec<_> = self
            .entries
            .iter()
            .filter(|e| e.matches_plane(channel, z, scene))
            .collect();
        tiles.sort_by_key(|e| e.mosaic_index().unwrap_or(0));
        tiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dim(letter: char, start: i32, size: i32) -> DimensionEntry {
        DimensionEntry {
            dimension: letter,
            start,
            size,
            stored_size: size,
        }
    }

    fn tile(x: i32, y: i32, w: i32, h: i32, extra: &[(char, i32)]) -> SubBlockEntry {
        let mut dimensions = vec![dim('X', x, w), dim('Y', y, h)];
        dimensions.extend(extra.iter().map(|&(l, s)| dim(l, s, 1)));
        SubBlockEntry {
            pixel_type: PixelType::Gray16,
            compression: CompressionMethod::Uncompressed,
            file_position: 0,
            pyramid_type: 0,
            dimensions,
        }
    }

    #[test]
    fn test_scene_rectangles_union() {
        let directory = SubBlockDirectory::new(vec![
            tile(0, 0, 10, 10, &[('S', 0), ('M', 0)]),
            tile(10, 0, 10, 10, &[('S', 0), ('M', 1)]),
            tile(100, 50, 8, 4, &[('S', 3)]),
        ]);
        let scenes = directory.scene_rectangles();
        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[&0], Rect::new(0, 0, 20, 10));
        assert_eq!(scenes[&3], Rect::new(100, 50, 8, 4));
        assert_eq!(directory.bounding_rect(), Some(Rect::new(0, 0, 108, 54)));
    }

    #[test]
    fn test_no_scene_dimension_gives_empty_map() {
        let directory = SubBlockDirectory::new(vec![tile(0, 0, 5, 5, &[('C', 0)])]);
        assert!(directory.scene_rectangles().is_empty());
        assert_eq!(directory.bounding_rect(), Some(Rect::new(0, 0, 5, 5)));
    }

    #[test]
    fn test_pyramid_tiles_are_ignored() {
        let mut reduced = tile(0, 0, 40, 40, &[('S', 0)]);
        reduced.dimensions[0].stored_size = 20;
        reduced.dimensions[1].stored_size = 20;
        let directory = SubBlockDirectory::new(vec![tile(0, 0, 10, 10, &[('S', 0)]), reduced]);

        assert_eq!(directory.scene_rectangles()[&0], Rect::new(0, 0, 10, 10));
        assert_eq!(directory.plane_tiles(0, 0, 0).len(), 1);
    }

    #[test]
    fn test_plane_tiles_selection_and_order() {
        let directory = SubBlockDirectory::new(vec![
            tile(10, 0, 10, 10, &[('C', 1), ('Z', 2), ('S', 0), ('M', 1)]),
            tile(0, 0, 10, 10, &[('C', 1), ('Z', 2), ('S', 0), ('M', 0)]),
            tile(0, 0, 10, 10, &[('C', 0), ('Z', 2), ('S', 0)]),
            tile(0, 0, 10, 10, &[('C', 1), ('Z', 2), ('S', 1)]),
            tile(0, 0, 10, 10, &[('C', 1), ('Z', 2), ('S', 0), ('T', 1)]),
        ]);
        let tiles = directory.plane_tiles(1, 2, 0);
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[0].mosaic_index(), Some(0));
        assert_eq!(tiles[1].mosaic_index(), Some(1));
    }

    #[test]
    fn test_missing_dimension_matches_index_zero() {
        let directory = SubBlockDirectory::new(vec![tile(0, 0, 4, 4, &[])]);
        assert_eq!(directory.plane_tiles(0, 0, 0).len(), 1);
        assert!(directory.plane_tiles(1, 0, 0).is_empty());
        assert!(directory.plane_tiles(0, 1, 0).is_empty());
    }
}
