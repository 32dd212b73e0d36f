//! Synthetic CZI files for integration tests
//!
//! Files are produced by serializing the same bincode records the reader
//! decodes, laid out as: file header, metadata, subblocks, directory.

#![allow(dead_code)]

use czitool::compression::{get_compressor, CompressionLevel, CompressionMethod};
use czitool::io::{
    DimensionRecord, DirectoryEntryRecord, DirectoryRecord, FileHeaderRecord, MetadataRecord,
    SegmentHeader, SegmentKind, SubBlockRecord, DIRECTORY_RECORD_SIZE, METADATA_RECORD_SIZE,
    SUBBLOCK_RECORD_MIN_SIZE,
};
use czitool::utils::encode_samples;
use czitool::{PixelType, Rect};
use std::fs;
use std::path::{Path, PathBuf};

const FILE_HEADER_BODY_SIZE: usize = 512;

/// One subblock to be written
pub struct SubBlockSpec {
    pub rect: Rect,
    /// Non-spatial coordinates such as ('C', 1), ('Z', 0), ('S', 2), ('M', 0)
    pub coords: Vec<(char, i32)>,
    pub pixel_type: PixelType,
    pub compression: CompressionMethod,
    pub pixels: Vec<u8>,
}

impl SubBlockSpec {
    /// 16-bit grayscale tile whose pixels are `fill(x, y)` in container coordinates
    pub fn gray16(
        rect: Rect,
        coords: &[(char, i32)],
        compression: CompressionMethod,
        fill: impl Fn(i32, i32) -> u16,
    ) -> Self {
        let mut values = Vec::with_capacity(rect.width as usize * rect.height as usize);
        for y in 0..rect.height as i32 {
            for x in 0..rect.width as i32 {
                values.push(fill(rect.x + x, rect.y + y));
            }
        }
        Self {
            rect,
            coords: coords.to_vec(),
            pixel_type: PixelType::Gray16,
            compression,
            pixels: encode_samples(&values),
        }
    }

    fn entry_bytes(&self, file_position: i64) -> Vec<u8> {
        let mut dimensions = vec![
            ('X', self.rect.x, self.rect.width as i32),
            ('Y', self.rect.y, self.rect.height as i32),
        ];
        dimensions.extend(self.coords.iter().map(|&(letter, start)| (letter, start, 1)));

        let mut bytes = bincode::serialize(&DirectoryEntryRecord {
            schema: DirectoryEntryRecord::SCHEMA,
            pixel_type: self.pixel_type.code(),
            file_position,
            file_part: 0,
            compression: self.compression.code(),
            pyramid_type: 0,
            spare: 0,
            spare2: [0; 4],
            dimension_count: dimensions.len() as i32,
        })
        .expect("Failed to encode directory entry");
        for (letter, start, size) in dimensions {
            let record = DimensionRecord {
                dimension: [letter as u8, 0, 0, 0],
                start,
                size,
                start_coordinate: start as f32,
                stored_size: size,
            };
            bytes.extend(bincode::serialize(&record).expect("Failed to encode dimension"));
        }
        bytes
    }

    fn payload(&self) -> Vec<u8> {
        get_compressor(self.compression)
            .expect("Unsupported test compression")
            .compress(
                &self.pixels,
                self.pixel_type.bytes_per_sample(),
                CompressionLevel::default(),
            )
            .expect("Failed to compress tile")
    }
}

/// Builds a CZI file in memory
pub struct CziBuilder {
    xml: String,
    subblocks: Vec<SubBlockSpec>,
    major: i32,
}

impl CziBuilder {
    pub fn new(xml: impl Into<String>) -> Self {
        Self {
            xml: xml.into(),
            subblocks: Vec::new(),
            major: FileHeaderRecord::SUPPORTED_MAJOR,
        }
    }

    pub fn subblock(mut self, spec: SubBlockSpec) -> Self {
        self.subblocks.push(spec);
        self
    }

    pub fn major_version(mut self, major: i32) -> Self {
        self.major = major;
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let header_len = SEGMENT_HEADER_LEN + FILE_HEADER_BODY_SIZE;

        let mut metadata_body = padded(
            bincode::serialize(&MetadataRecord {
                xml_size: self.xml.len() as i32,
                attachment_size: 0,
            })
            .expect("Failed to encode metadata record"),
            METADATA_RECORD_SIZE as usize,
        );
        metadata_body.extend_from_slice(self.xml.as_bytes());
        let metadata = segment(SegmentKind::Metadata, metadata_body);

        let mut subblocks = Vec::new();
        let mut entries = Vec::new();
        let mut position = (header_len + metadata.len()) as i64;
        for spec in &self.subblocks {
            let entry = spec.entry_bytes(position);
            let payload = spec.payload();
            let mut body = bincode::serialize(&SubBlockRecord {
                metadata_size: 0,
                attachment_size: 0,
                data_size: payload.len() as i64,
            })
            .expect("Failed to encode subblock record");
            body.extend(&entry);
            let mut body = padded(body, SUBBLOCK_RECORD_MIN_SIZE as usize);
            body.extend(payload);

            let seg = segment(SegmentKind::SubBlock, body);
            position += seg.len() as i64;
            subblocks.extend(seg);
            entries.extend(entry);
        }

        let mut directory_body = padded(
            bincode::serialize(&DirectoryRecord {
                entry_count: self.subblocks.len() as i32,
            })
            .expect("Failed to encode directory record"),
            DIRECTORY_RECORD_SIZE as usize,
        );
        directory_body.extend(entries);

        let header = FileHeaderRecord {
            major: self.major,
            minor: 0,
            reserved1: 0,
            reserved2: 0,
            primary_file_guid: *b"czitool-test-gid",
            file_guid: *b"czitool-test-gid",
            file_part: 0,
            directory_position: position,
            metadata_position: header_len as i64,
            update_pending: 0,
            attachment_directory_position: 0,
        };

        let mut bytes = segment(
            SegmentKind::FileHeader,
            padded(
                bincode::serialize(&header).expect("Failed to encode file header"),
                FILE_HEADER_BODY_SIZE,
            ),
        );
        bytes.extend(metadata);
        bytes.extend(subblocks);
        bytes.extend(segment(SegmentKind::Directory, directory_body));
        bytes
    }

    pub fn write_to(&self, path: &Path) -> PathBuf {
        fs::write(path, self.to_bytes()).expect("Failed to write synthetic CZI");
        path.to_path_buf()
    }
}

const SEGMENT_HEADER_LEN: usize = 32;

/// Overwrite the i32 count field of the directory or metadata record in `bytes`
pub fn patch_record_count(bytes: &mut [u8], kind: SegmentKind, value: i32) {
    let header: FileHeaderRecord = bincode::deserialize(&bytes[SEGMENT_HEADER_LEN..])
        .expect("Failed to decode file header");
    let segment_position = match kind {
        SegmentKind::Directory => header.directory_position,
        SegmentKind::Metadata => header.metadata_position,
        other => panic!("no count field patched for {:?}", other),
    } as usize;
    let offset = segment_position + SEGMENT_HEADER_LEN;
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn segment(kind: SegmentKind, body: Vec<u8>) -> Vec<u8> {
    let size = body.len() as i64;
    let mut bytes = bincode::serialize(&SegmentHeader::new(&kind, size, size))
        .expect("Failed to encode segment header");
    bytes.extend(body);
    bytes
}

fn padded(mut bytes: Vec<u8>, size: usize) -> Vec<u8> {
    if bytes.len() < size {
        bytes.resize(size, 0);
    }
    bytes
}

/// Metadata XML in the layout written by acquisition software
pub fn metadata_xml(
    channels: &[&str],
    size_z: usize,
    size_s: Option<usize>,
    distances_m: [f64; 3],
) -> String {
    let channel_xml: String = channels
        .iter()
        .enumerate()
        .map(|(i, name)| {
            format!("<Channel Id=\"Channel:{i}\" Name=\"{name}\"><Fluor>{name}</Fluor></Channel>")
        })
        .collect();
    let size_s = size_s
        .map(|s| format!("<SizeS>{s}</SizeS>"))
        .unwrap_or_default();
    let distance_xml: String = ["X", "Y", "Z"]
        .iter()
        .zip(distances_m)
        .map(|(axis, value)| {
            format!(
                "<Distance Id=\"{axis}\"><Value>{value:e}</Value>\
                 <DefaultUnitFormat>\u{b5}m</DefaultUnitFormat></Distance>"
            )
        })
        .collect();

    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
         <ImageDocument><Metadata>\
         <Information>\
         <Document><Name>synthetic</Name></Document>\
         <Image>\
         <AcquisitionDateAndTime>2024-03-05T10:15:00.000Z</AcquisitionDateAndTime>\
         <SizeX>64</SizeX><SizeY>64</SizeY><SizeZ>{size_z}</SizeZ><SizeC>{}</SizeC>{size_s}\
         <Dimensions><Channels>{channel_xml}</Channels></Dimensions>\
         </Image>\
         </Information>\
         <Scaling><Items>{distance_xml}</Items></Scaling>\
         </Metadata></ImageDocument>",
        channels.len()
    )
}
