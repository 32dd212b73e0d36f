//! Compression and decompression for CZI subblock data

use crate::error::{CziError, Result};
use serde::{Deserialize, Serialize};

/// Compression methods a CZI directory entry can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionMethod {
    /// Raw little-endian pixels
    Uncompressed,
    /// JPEG file
    Jpg,
    /// LZW
    Lzw,
    /// JPEG-XR
    JpegXr,
    /// Plain zstd frame
    Zstd0,
    /// zstd frame behind a small header, optionally hi/lo byte packed
    Zstd1,
}

impl CompressionMethod {
    /// Decode the on-disk compression code
    pub fn from_code(value: i32) -> Option<Self> {
        match value {
            0 => Some(CompressionMethod::Uncompressed),
            1 => Some(CompressionMethod::Jpg),
            2 => Some(CompressionMethod::Lzw),
            4 => Some(CompressionMethod::JpegXr),
            5 => Some(CompressionMethod::Zstd0),
            6 => Some(CompressionMethod::Zstd1),
            _ => None,
        }
    }

    /// On-disk compression code
    pub fn code(&self) -> i32 {
        match self {
            CompressionMethod::Uncompressed => 0,
            CompressionMethod::Jpg => 1,
            CompressionMethod::Lzw => 2,
            CompressionMethod::JpegXr => 4,
            CompressionMethod::Zstd0 => 5,
            CompressionMethod::Zstd1 => 6,
        }
    }
}

/// Compression level handed to encoders (zstd levels 1-22).
///
/// Reading never needs a level; encoders exist so callers can produce
/// subblock payloads, e.g. when writing CZI fixtures.
#[derive(Debug, Clone, Copy)]
pub struct CompressionLevel(i32);

impl CompressionLevel {
    pub fn new(level: i32) -> Self {
        Self(level.clamp(1, 22))
    }

    pub fn value(&self) -> i32 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self(3)
    }
}

/// Trait for subblock compression/decompression
pub trait Compressor: Send + Sync {
    /// Encode pixel data into a subblock payload this compressor decodes.
    /// `bytes_per_sample` drives byte packing where supported. The converter
    /// itself only decompresses; this is the write side for producing
    /// containers and test fixtures.
    fn compress(&self, data: &[u8], bytes_per_sample: usize, level: CompressionLevel)
        -> Result<Vec<u8>>;

    /// Decompress subblock data; `expected_size`, when given, must match exactly
    fn decompress(&self, data: &[u8], expected_size: Option<usize>) -> Result<Vec<u8>>;

    /// Get the compression method
    fn method(&self) -> CompressionMethod;
}

/// No compression
#[derive(Debug, Default)]
pub struct NoneCompressor;

impl Compressor for NoneCompressor {
    fn compress(&self, data: &[u8], _bytes_per_sample: usize, _level: CompressionLevel) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8], expected_size: Option<usize>) -> Result<Vec<u8>> {
        check_size(data, expected_size)?;
        Ok(data.to_vec())
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::Uncompressed
    }
}

/// Plain zstd frame
#[derive(Debug, Default)]
pub struct Zstd0Compressor;

impl Compressor for Zstd0Compressor {
    fn compress(&self, data: &[u8], _bytes_per_sample: usize, level: CompressionLevel) -> Result<Vec<u8>> {
        zstd::encode_all(data, level.value()).map_err(|e| CziError::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8], expected_size: Option<usize>) -> Result<Vec<u8>> {
        let decompressed =
            zstd::decode_all(data).map_err(|e| CziError::Decompression(e.to_string()))?;
        check_size(&decompressed, expected_size)?;
        Ok(decompressed)
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::Zstd0
    }
}

/// zstd with a leading header; chunk type 1 flags hi/lo byte packing of 16-bit data
#[derive(Debug, Default)]
pub struct Zstd1Compressor;

const ZSTD1_CHUNK_HILO_PACKING: u8 = 1;

impl Zstd1Compressor {
    /// Returns (header length, hi/lo packed)
    fn parse_header(data: &[u8]) -> Result<(usize, bool)> {
        let header_size = *data
            .first()
            .ok_or_else(|| CziError::Decompression("empty zstd1 payload".to_string()))?
            as usize;
        if header_size == 0 || header_size > data.len() {
            return Err(CziError::Decompression(format!(
                "invalid zstd1 header size {header_size}"
            )));
        }

        let mut packed = false;
        let mut pos = 1;
        while pos < header_size {
            match data[pos] {
                ZSTD1_CHUNK_HILO_PACKING if pos + 1 < header_size => {
                    packed = data[pos + 1] & 1 == 1;
                    pos += 2;
                }
                other => {
                    return Err(CziError::Decompression(format!(
                        "unknown zstd1 header chunk {other}"
                    )))
                }
            }
        }
        Ok((header_size, packed))
    }

    /// Low bytes first, then high bytes
    fn pack_hi_lo(data: &[u8]) -> Vec<u8> {
        let half = data.len() / 2;
        let mut packed = vec![0u8; data.len()];
        for (i, pair) in data.chunks_exact(2).enumerate() {
            packed[i] = pair[0];
            packed[half + i] = pair[1];
        }
        packed
    }

    fn unpack_hi_lo(data: &[u8]) -> Result<Vec<u8>> {
        if data.len() % 2 != 0 {
            return Err(CziError::Decompression(
                "hi/lo packed data must have even length".to_string(),
            ));
        }
        let half = data.len() / 2;
        let (low, high) = data.split_at(half);
        let mut unpacked = Vec::with_capacity(data.len());
        for (lo, hi) in low.iter().zip(high) {
            unpacked.push(*lo);
            unpacked.push(*hi);
        }
        Ok(unpacked)
    }
}

impl Compressor for Zstd1Compressor {
    fn compress(&self, data: &[u8], bytes_per_sample: usize, level: CompressionLevel) -> Result<Vec<u8>> {
        let packed = bytes_per_sample == 2 && data.len() % 2 == 0;
        let (mut out, payload) = if packed {
            (vec![3, ZSTD1_CHUNK_HILO_PACKING, 1], Self::pack_hi_lo(data))
        } else {
            (vec![1], data.to_vec())
        };
        let compressed = zstd::encode_all(payload.as_slice(), level.value())
            .map_err(|e| CziError::Compression(e.to_string()))?;
        out.extend_from_slice(&compressed);
        Ok(out)
    }

    fn decompress(&self, data: &[u8], expected_size: Option<usize>) -> Result<Vec<u8>> {
        let (header_size, packed) = Self::parse_header(data)?;
        let decompressed = zstd::decode_all(&data[header_size..])
            .map_err(|e| CziError::Decompression(e.to_string()))?;
        let decompressed = if packed {
            Self::unpack_hi_lo(&decompressed)?
        } else {
            decompressed
        };
        check_size(&decompressed, expected_size)?;
        Ok(decompressed)
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::Zstd1
    }
}

fn check_size(data: &[u8], expected_size: Option<usize>) -> Result<()> {
    match expected_size {
        Some(size) if size != data.len() => Err(CziError::Decompression(format!(
            "expected {} bytes after decompression, got {}",
            size,
            data.len()
        ))),
        _ => Ok(()),
    }
}

/// Get a compressor for a given method
pub fn get_compressor(method: CompressionMethod) -> Result<Box<dyn Compressor>> {
    match method {
        CompressionMethod::Uncompressed => Ok(Box::new(NoneCompressor)),
        CompressionMethod::Zstd0 => Ok(Box::new(Zstd0Compressor)),
        CompressionMethod::Zstd1 => Ok(Box::new(Zstd1Compressor)),
        CompressionMethod::Jpg | CompressionMethod::Lzw | CompressionMethod::JpegXr => Err(
            CziError::Decompression(format!("{:?} subblocks are not supported", method)),
        ),
    }
}
