//! Segment-level I/O for the ZISRAW (CZI) container
//!
//! A CZI file is a sequence of segments. Each one starts with a 32-byte
//! header naming its kind and size, followed by a fixed-layout record.
//! All integers are little-endian; records are decoded with bincode's
//! fixed-int encoding, which matches the on-disk layout byte for byte.

use crate::error::{CziError, Result};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{Read, Seek, SeekFrom};
use uuid::Uuid;

/// Size of every segment header
pub const SEGMENT_HEADER_SIZE: u64 = 32;

/// Bytes reserved for the metadata segment record before the XML starts
pub const METADATA_RECORD_SIZE: u64 = 256;

/// Bytes reserved for the directory segment record before the entries start
pub const DIRECTORY_RECORD_SIZE: u64 = 128;

/// Minimum size of the subblock record (fixed part + directory entry + padding)
pub const SUBBLOCK_RECORD_MIN_SIZE: u64 = 256;

/// Fixed part of a subblock record, before its directory entry
pub const SUBBLOCK_FIXED_SIZE: u64 = 16;

/// Segment kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentKind {
    FileHeader,
    Directory,
    SubBlock,
    Metadata,
    AttachmentDirectory,
    Attachment,
    Deleted,
    Unknown(String),
}

impl SegmentKind {
    pub fn from_id(id: &str) -> Self {
        match id {
            "ZISRAWFILE" => SegmentKind::FileHeader,
            "ZISRAWDIRECTORY" => SegmentKind::Directory,
            "ZISRAWSUBBLOCK" => SegmentKind::SubBlock,
            "ZISRAWMETADATA" => SegmentKind::Metadata,
            "ZISRAWATTDIR" => SegmentKind::AttachmentDirectory,
            "ZISRAWATTACH" => SegmentKind::Attachment,
            "DELETED" => SegmentKind::Deleted,
            other => SegmentKind::Unknown(other.to_string()),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            SegmentKind::FileHeader => "ZISRAWFILE",
            SegmentKind::Directory => "ZISRAWDIRECTORY",
            SegmentKind::SubBlock => "ZISRAWSUBBLOCK",
            SegmentKind::Metadata => "ZISRAWMETADATA",
            SegmentKind::AttachmentDirectory => "ZISRAWATTDIR",
            SegmentKind::Attachment => "ZISRAWATTACH",
            SegmentKind::Deleted => "DELETED",
            SegmentKind::Unknown(id) => id,
        }
    }
}

/// Header preceding every segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentHeader {
    pub id: [u8; 16],
    pub allocated_size: i64,
    pub used_size: i64,
}

impl SegmentHeader {
    pub fn new(kind: &SegmentKind, allocated_size: i64, used_size: i64) -> Self {
        let mut id = [0u8; 16];
        let name = kind.id().as_bytes();
        let len = name.len().min(id.len());
        id[..len].copy_from_slice(&name[..len]);
        Self {
            id,
            allocated_size,
            used_size,
        }
    }

    pub fn kind(&self) -> SegmentKind {
        let end = self.id.iter().position(|&b| b == 0).unwrap_or(self.id.len());
        SegmentKind::from_id(&String::from_utf8_lossy(&self.id[..end]))
    }
}

/// ZISRAWFILE record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeaderRecord {
    pub major: i32,
    pub minor: i32,
    pub reserved1: i32,
    pub reserved2: i32,
    pub primary_file_guid: [u8; 16],
    pub file_guid: [u8; 16],
    pub file_part: i32,
    pub directory_position: i64,
    pub metadata_position: i64,
    pub update_pending: i32,
    pub attachment_directory_position: i64,
}

impl FileHeaderRecord {
    pub const SUPPORTED_MAJOR: i32 = 1;

    pub fn primary_file_guid(&self) -> Uuid {
        Uuid::from_bytes_le(self.primary_file_guid)
    }

    pub fn file_guid(&self) -> Uuid {
        Uuid::from_bytes_le(self.file_guid)
    }
}

/// ZISRAWMETADATA record (padded to [`METADATA_RECORD_SIZE`])
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub xml_size: i32,
    pub attachment_size: i32,
}

/// ZISRAWDIRECTORY record (padded to [`DIRECTORY_RECORD_SIZE`])
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    pub entry_count: i32,
}

/// ZISRAWSUBBLOCK fixed record, followed by the subblock's own directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubBlockRecord {
    pub metadata_size: i32,
    pub attachment_size: i32,
    pub data_size: i64,
}

/// Fixed 32-byte part of a "DV" directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntryRecord {
    pub schema: [u8; 2],
    pub pixel_type: i32,
    pub file_position: i64,
    pub file_part: i32,
    pub compression: i32,
    pub pyramid_type: u8,
    pub spare: u8,
    pub spare2: [u8; 4],
    pub dimension_count: i32,
}

impl DirectoryEntryRecord {
    pub const SIZE: u64 = 32;
    pub const SCHEMA: [u8; 2] = *b"DV";
}

/// 20-byte dimension entry following a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionRecord {
    pub dimension: [u8; 4],
    pub start: i32,
    pub size: i32,
    pub start_coordinate: f32,
    pub stored_size: i32,
}

impl DimensionRecord {
    pub const SIZE: u64 = 20;

    pub fn letter(&self) -> char {
        self.dimension[0] as char
    }
}

/// Random-access reader over the segments of a container
pub struct SegmentReader<R> {
    inner: R,
    stream_len: u64,
}

impl<R: Read + Seek> SegmentReader<R> {
    pub fn new(mut inner: R) -> Result<Self> {
        let stream_len = inner.seek(SeekFrom::End(0))?;
        Ok(Self { inner, stream_len })
    }

    /// Total length of the underlying stream
    pub fn stream_len(&self) -> u64 {
        self.stream_len
    }

    /// Bytes available from `position` to the end of the stream
    pub fn remaining_from(&self, position: u64) -> u64 {
        self.stream_len.saturating_sub(position)
    }

    /// Read the segment header at `position`
    pub fn read_header(&mut self, position: u64) -> Result<SegmentHeader> {
        self.inner.seek(SeekFrom::Start(position))?;
        let mut buf = [0u8; SEGMENT_HEADER_SIZE as usize];
        self.inner.read_exact(&mut buf)?;
        Ok(bincode::deserialize(&buf)?)
    }

    /// Read the segment at `position`, require its kind, and decode its record
    pub fn read_record<T: DeserializeOwned>(
        &mut self,
        position: u64,
        expected: SegmentKind,
    ) -> Result<(SegmentHeader, T)> {
        let header = self.read_header(position)?;
        let kind = header.kind();
        if kind != expected {
            return Err(CziError::InvalidFormat(format!(
                "expected {} segment at offset {}, found {}",
                expected.id(),
                position,
                kind.id()
            )));
        }
        let record = bincode::deserialize_from(&mut self.inner)?;
        Ok((header, record))
    }

    /// Read `len` raw bytes at `position`
    pub fn read_bytes(&mut self, position: u64, len: usize) -> Result<Bytes> {
        if len as u64 > self.remaining_from(position) {
            return Err(CziError::InvalidFormat(format!(
                "{} bytes at offset {} run past the end of the file ({} bytes)",
                len, position, self.stream_len
            )));
        }
        self.inner.seek(SeekFrom::Start(position))?;
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Position the underlying reader at `position` for streaming decodes
    pub fn reader_at(&mut self, position: u64) -> Result<&mut R> {
        self.inner.seek(SeekFrom::Start(position))?;
        Ok(&mut self.inner)
    }
}

/// Offset of a segment's record, just past its header
pub fn record_position(segment_position: u64) -> u64 {
    segment_position + SEGMENT_HEADER_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_segment_header_layout() {
        let header = SegmentHeader::new(&SegmentKind::Metadata, 512, 300);
        let bytes = bincode::serialize(&header).unwrap();
        assert_eq!(bytes.len() as u64, SEGMENT_HEADER_SIZE);
        assert_eq!(&bytes[..14], b"ZISRAWMETADATA");
        assert_eq!(bytes[14], 0);
        assert_eq!(header.kind(), SegmentKind::Metadata);
    }

    #[test]
    fn test_record_sizes() {
        let entry = DirectoryEntryRecord {
            schema: DirectoryEntryRecord::SCHEMA,
            pixel_type: 1,
            file_position: 0,
            file_part: 0,
            compression: 0,
            pyramid_type: 0,
            spare: 0,
            spare2: [0; 4],
            dimension_count: 0,
        };
        assert_eq!(
            bincode::serialize(&entry).unwrap().len() as u64,
            DirectoryEntryRecord::SIZE
        );

        let dimension = DimensionRecord {
            dimension: *b"X\0\0\0",
            start: 0,
            size: 1,
            start_coordinate: 0.0,
            stored_size: 1,
        };
        assert_eq!(
            bincode::serialize(&dimension).unwrap().len() as u64,
            DimensionRecord::SIZE
        );
        assert_eq!(dimension.letter(), 'X');
    }

    #[test]
    fn test_read_record_checks_kind() {
        let mut bytes = bincode::serialize(&SegmentHeader::new(&SegmentKind::Directory, 128, 128))
            .unwrap();
        bytes.extend(bincode::serialize(&DirectoryRecord { entry_count: 4 }).unwrap());

        let mut reader = SegmentReader::new(Cursor::new(bytes)).unwrap();
        let (_, record): (_, DirectoryRecord) =
            reader.read_record(0, SegmentKind::Directory).unwrap();
        assert_eq!(record.entry_count, 4);

        let wrong: Result<(SegmentHeader, DirectoryRecord)> =
            reader.read_record(0, SegmentKind::SubBlock);
        assert!(matches!(wrong, Err(CziError::InvalidFormat(_))));
    }

    #[test]
    fn test_read_bytes_past_end() {
        let mut reader = SegmentReader::new(Cursor::new(vec![1u8; 64])).unwrap();
        assert_eq!(reader.stream_len(), 64);
        assert_eq!(reader.read_bytes(60, 4).unwrap().as_ref(), &[1, 1, 1, 1]);

        assert!(matches!(
            reader.read_bytes(60, 5),
            Err(CziError::InvalidFormat(_))
        ));
        assert!(matches!(
            reader.read_bytes(0, i64::MAX as usize),
            Err(CziError::InvalidFormat(_))
        ));
        assert!(matches!(
            reader.read_bytes(100, 1),
            Err(CziError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_unknown_segment_id() {
        assert_eq!(
            SegmentKind::from_id("NOTCZI"),
            SegmentKind::Unknown("NOTCZI".to_string())
        );
    }
}
