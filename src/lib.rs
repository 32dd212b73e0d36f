//! czitool - CZI microscopy container to 3D volume conversion
//!
//! A pure Rust reader for the ZISRAW (CZI) container that reassembles image
//! planes into one floating-point volume per (scene, channel) pair, calibrated
//! in nanometers.
//!
//! # Features
//!
//! - Native CZI reader: segment directory, mosaic tiles, zstd subblocks
//! - Schema-tolerant metadata interpretation (channels, depth, scene count)
//! - Voxel calibration from the container's scaling distances
//! - Multi-page float TIFF output with ImageJ calibration, written atomically
//! - Batch conversion that reports failures per file and never aborts the batch
//!
//! The pipeline talks to containers through the [`ContainerBackend`] trait and
//! to outputs through [`VolumeWriter`], so either side can be replaced.
//!
//! # Example
//!
//! ```rust,ignore
//! use czitool::{ConversionDriver, ConvertOptions};
//!
//! let driver = ConversionDriver::native(ConvertOptions::default());
//! let report = driver.convert_batch(&["sample.czi"]);
//! println!("{} converted, {} failed", report.succeeded(), report.failed());
//! ```

pub mod access;
pub mod assembler;
pub mod backend;
pub mod calibration;
pub mod compression;
pub mod config;
pub mod document;
pub mod driver;
pub mod error;
pub mod io;
pub mod layout;
pub mod metadata;
pub mod scene;
pub mod types;
pub mod utils;
pub mod writer;

// Re-exports
pub use access::{CziFileSource, CziReader};
pub use assembler::PlaneAssembler;
pub use backend::{ContainerBackend, ContainerSource, InMemoryContainer, PlaneBuffer};
pub use calibration::CalibrationResolver;
pub use compression::{CompressionMethod, Compressor};
pub use config::{ConvertOptions, ValueScaling, METADATA_LOG_NAME};
pub use document::{Document, MetadataInterpreter};
pub use driver::{BatchReport, ConversionDriver, FileOutcome, FileStatus};
pub use error::{CziError, FailureKind, Result};
pub use metadata::MetadataNode;
pub use scene::SceneLocator;
pub use types::{CalibrationVector, Channel, PixelType, Rect, Scene};
pub use writer::{volume_file_name, TiffVolumeWriter, VolumeRecord, VolumeWriter};

/// Version of the czitool implementation
pub const CZITOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Magic of the first segment of every CZI file
pub const CZI_MAGIC: &[u8; 10] = b"ZISRAWFILE";
