//! Native CZI container access - main API for reading planes out of a file

use crate::backend::{ContainerBackend, ContainerSource, PlaneBuffer};
use crate::compression::get_compressor;
use crate::error::{CziError, Result};
use crate::io::{
    record_position, DirectoryEntryRecord, DirectoryRecord, FileHeaderRecord, MetadataRecord,
    SegmentKind, SegmentReader, SubBlockRecord, DIRECTORY_RECORD_SIZE, METADATA_RECORD_SIZE,
    SUBBLOCK_FIXED_SIZE, SUBBLOCK_RECORD_MIN_SIZE,
};
use crate::layout::{SubBlockDirectory, SubBlockEntry};
use crate::metadata::MetadataNode;
use crate::types::{PixelType, Rect};
use crate::utils::{decode_samples, format_bytes, Sample};
use ndarray::{s, Array3, ArrayD, Axis};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// An opened CZI file
pub struct CziReader {
    path: PathBuf,

    /// ZISRAWFILE record
    header: FileHeaderRecord,

    /// Every subblock entry of the file
    directory: SubBlockDirectory,

    /// Per-scene rectangles, computed once at open
    scenes: BTreeMap<i32, Rect>,

    /// Union of all full-resolution subblocks
    bounding: Option<Rect>,

    segments: Mutex<SegmentReader<BufReader<File>>>,
}

impl CziReader {
    /// Open a CZI file and load its subblock directory
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => CziError::FileNotFound(path.clone()),
            _ => open_failed(&path, e),
        })?;
        let mut segments =
            SegmentReader::new(BufReader::new(file)).map_err(|e| open_failed(&path, e))?;

        let (_, header): (_, FileHeaderRecord) = segments
            .read_record(0, SegmentKind::FileHeader)
            .map_err(|e| open_failed(&path, e))?;
        if header.major != FileHeaderRecord::SUPPORTED_MAJOR {
            return Err(CziError::UnsupportedVersion(header.major, header.minor));
        }

        let directory =
            Self::read_directory(&mut segments, &header).map_err(|e| open_failed(&path, e))?;
        let scenes = directory.scene_rectangles();
        let bounding = directory.bounding_rect();

        debug!(
            "File {} of {}, part {}",
            header.file_guid(),
            header.primary_file_guid(),
            header.file_part
        );
        info!(
            "Opened {} (CZI {}.{}, {} subblocks, {} scene(s))",
            path.display(),
            header.major,
            header.minor,
            directory.len(),
            scenes.len()
        );

        Ok(Self {
            path,
            header,
            directory,
            scenes,
            bounding,
            segments: Mutex::new(segments),
        })
    }

    fn read_directory(
        segments: &mut SegmentReader<BufReader<File>>,
        header: &FileHeaderRecord,
    ) -> Result<SubBlockDirectory> {
        if header.directory_position <= 0 {
            return Err(CziError::InvalidFormat(
                "file has no subblock directory".to_string(),
            ));
        }
        let position = header.directory_position as u64;
        let (_, record): (_, DirectoryRecord) =
            segments.read_record(position, SegmentKind::Directory)?;
        if record.entry_count < 0 {
            return Err(CziError::InvalidFormat(format!(
                "negative directory entry count {}",
                record.entry_count
            )));
        }

        let entries_position = record_position(position) + DIRECTORY_RECORD_SIZE;
        let count = record.entry_count as u64;
        if count * DirectoryEntryRecord::SIZE > segments.remaining_from(entries_position) {
            return Err(CziError::InvalidFormat(format!(
                "directory declares {} entries, more than the file can hold",
                count
            )));
        }
        let entries = segments.reader_at(entries_position)?;
        SubBlockDirectory::read_from(entries, count as usize)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &FileHeaderRecord {
        &self.header
    }

    pub fn directory(&self) -> &SubBlockDirectory {
        &self.directory
    }

    /// Raw metadata XML
    pub fn metadata_xml(&self) -> Result<String> {
        if self.header.metadata_position <= 0 {
            return Err(CziError::InvalidFormat(
                "file has no metadata segment".to_string(),
            ));
        }
        let position = self.header.metadata_position as u64;

        let mut segments = self.segments.lock();
        let (_, record): (_, MetadataRecord) =
            segments.read_record(position, SegmentKind::Metadata)?;
        if record.xml_size < 0 {
            return Err(CziError::InvalidFormat(format!(
                "negative metadata size {}",
                record.xml_size
            )));
        }
        let bytes = segments.read_bytes(
            record_position(position) + METADATA_RECORD_SIZE,
            record.xml_size as usize,
        )?;
        drop(segments);

        debug!("Read {} of metadata XML", format_bytes(bytes.len()));
        let xml = std::str::from_utf8(&bytes).map_err(|e| CziError::Xml(e.to_string()))?;
        Ok(xml
            .trim_start_matches('\u{feff}')
            .trim_end_matches('\0')
            .to_string())
    }

    /// Rectangle a plane of `scene` is painted into
    pub fn scene_rect(&self, scene: i32) -> Result<Rect> {
        if self.scenes.is_empty() {
            return self.bounding_rectangle();
        }
        self.scenes
            .get(&scene)
            .copied()
            .ok_or_else(|| CziError::InvalidFormat(format!("no subblocks for scene {scene}")))
    }

    /// Decompressed pixel bytes of one subblock
    fn read_tile_data(&self, entry: &SubBlockEntry) -> Result<Vec<u8>> {
        let (height, width) = entry.stored_shape().ok_or_else(|| {
            CziError::InvalidFormat(format!(
                "subblock at {} has no stored X/Y size",
                entry.file_position
            ))
        })?;
        let expected = height * width * entry.pixel_type.bytes_per_pixel();

        let mut segments = self.segments.lock();
        let (_, record): (_, SubBlockRecord) =
            segments.read_record(entry.file_position, SegmentKind::SubBlock)?;
        if record.metadata_size < 0 || record.data_size < 0 {
            return Err(CziError::InvalidFormat(format!(
                "subblock at {} has negative section sizes",
                entry.file_position
            )));
        }
        let header_size = SUBBLOCK_RECORD_MIN_SIZE.max(SUBBLOCK_FIXED_SIZE + entry.encoded_size());
        let data_position =
            record_position(entry.file_position) + header_size + record.metadata_size as u64;
        let data = segments.read_bytes(data_position, record.data_size as usize)?;
        drop(segments);

        debug!(
            "Subblock at {}: {} {:?}, {}",
            entry.file_position,
            entry.pixel_type,
            entry.compression,
            format_bytes(data.len())
        );

        let compressor = get_compressor(entry.compression)?;
        compressor
            .decompress(&data, Some(expected))
            .map_err(|e| match e {
                CziError::Decompression(reason) => CziError::Decompression(format!(
                    "subblock at {}: {}",
                    entry.file_position, reason
                )),
                other => other,
            })
    }

    /// Paint `tiles` in order into a canvas covering `canvas_rect`
    fn compose<T: Sample>(
        &self,
        tiles: &[&SubBlockEntry],
        canvas_rect: Rect,
        samples: usize,
    ) -> Result<ArrayD<T>> {
        let (height, width) = canvas_rect.shape();
        let storage = zeroed::<T>(height, width, samples)?;
        let mut canvas = Array3::from_shape_vec((height, width, samples), storage)
            .map_err(|e| CziError::InvalidFormat(e.to_string()))?;

        for tile in tiles {
            let Some(rect) = tile.rect() else {
                continue;
            };
            let Some(overlap) = rect.intersection(&canvas_rect) else {
                continue;
            };

            let values = decode_samples::<T>(&self.read_tile_data(tile)?)?;
            let (tile_height, tile_width) = rect.shape();
            let pixels = Array3::from_shape_vec((tile_height, tile_width, samples), values)
                .map_err(|e| CziError::InvalidFormat(e.to_string()))?;

            let (oh, ow) = overlap.shape();
            let (sy, sx) = (offset(overlap.y, rect.y), offset(overlap.x, rect.x));
            let (dy, dx) = (offset(overlap.y, canvas_rect.y), offset(overlap.x, canvas_rect.x));
            canvas
                .slice_mut(s![dy..dy + oh, dx..dx + ow, ..])
                .assign(&pixels.slice(s![sy..sy + oh, sx..sx + ow, ..]));
        }

        if samples == 1 {
            Ok(canvas.index_axis_move(Axis(2), 0).into_dyn())
        } else {
            Ok(canvas.into_dyn())
        }
    }
}

/// Zeroed canvas storage; extents come from the directory, so allocation may fail
fn zeroed<T: Sample>(height: usize, width: usize, samples: usize) -> Result<Vec<T>> {
    let too_large = || {
        CziError::InvalidFormat(format!(
            "plane of {height} x {width} x {samples} samples is too large"
        ))
    };
    let len = height
        .checked_mul(width)
        .and_then(|n| n.checked_mul(samples))
        .ok_or_else(too_large)?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| too_large())?;
    buf.resize(len, T::zero());
    Ok(buf)
}

fn offset(from: i32, origin: i32) -> usize {
    (from as i64 - origin as i64) as usize
}

fn open_failed(path: &Path, reason: impl Display) -> CziError {
    CziError::ContainerOpen {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

impl ContainerBackend for CziReader {
    fn metadata(&self) -> Result<MetadataNode> {
        MetadataNode::from_xml(&self.metadata_xml()?)
    }

    fn scene_rectangles(&self) -> Result<BTreeMap<i32, Rect>> {
        Ok(self.scenes.clone())
    }

    fn bounding_rectangle(&self) -> Result<Rect> {
        self.bounding.ok_or_else(|| {
            CziError::InvalidFormat("file holds no full-resolution subblocks".to_string())
        })
    }

    fn read_plane(&self, channel: usize, z: usize, scene: i32) -> Result<PlaneBuffer> {
        let tiles = self.directory.plane_tiles(channel, z, scene);
        let Some(first) = tiles.first() else {
            return Err(CziError::InvalidFormat(format!(
                "no subblocks for channel {channel}, z {z}, scene {scene}"
            )));
        };
        let pixel_type = first.pixel_type;
        if let Some(other) = tiles.iter().find(|t| t.pixel_type != pixel_type) {
            return Err(CziError::InvalidFormat(format!(
                "plane (channel {channel}, z {z}, scene {scene}) mixes {} and {} subblocks",
                pixel_type, other.pixel_type
            )));
        }

        let rect = self.scene_rect(scene)?;
        let samples = pixel_type.samples_per_pixel();
        match pixel_type {
            PixelType::Gray8 | PixelType::Bgr24 | PixelType::Bgra32 => {
                Ok(PlaneBuffer::U8(self.compose(&tiles, rect, samples)?))
            }
            PixelType::Gray16 | PixelType::Bgr48 => {
                Ok(PlaneBuffer::U16(self.compose(&tiles, rect, samples)?))
            }
            PixelType::Gray32 => Ok(PlaneBuffer::I32(self.compose(&tiles, rect, samples)?)),
            PixelType::Gray32Float | PixelType::Bgr96Float => {
                Ok(PlaneBuffer::F32(self.compose(&tiles, rect, samples)?))
            }
            PixelType::Gray64 => Ok(PlaneBuffer::F64(self.compose(&tiles, rect, samples)?)),
            PixelType::Gray64ComplexFloat | PixelType::Bgr192ComplexFloat => Err(
                CziError::Unsupported(format!("{} pixels cannot be converted", pixel_type)),
            ),
        }
    }
}

/// Opens files with [`CziReader`]
#[derive(Debug, Clone, Copy, Default)]
pub struct CziFileSource;

impl ContainerSource for CziFileSource {
    type Container = CziReader;

    fn open(&self, path: &Path) -> Result<CziReader> {
        CziReader::open(path)
    }
}
