//! Error types for CZI reading and volume conversion

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for container and conversion operations
#[derive(Error, Debug)]
pub enum CziError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Cannot open container {}: {reason}", path.display())]
    ContainerOpen { path: PathBuf, reason: String },

    #[error("Invalid CZI format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported CZI version: {0}.{1}")]
    UnsupportedVersion(i32, i32),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Malformed metadata: {0}")]
    MalformedMetadata(String),

    #[error(
        "Plane shape mismatch for scene {scene}, channel {channel}, z {z}: \
         expected {expected:?}, got {actual:?}"
    )]
    PlaneShapeMismatch {
        scene: i32,
        channel: usize,
        z: usize,
        expected: (usize, usize),
        actual: Vec<usize>,
    },

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Specialized Result type for CZI operations
pub type Result<T> = std::result::Result<T, CziError>;

impl From<bincode::Error> for CziError {
    fn from(err: bincode::Error) -> Self {
        CziError::InvalidFormat(err.to_string())
    }
}

impl From<serde_json::Error> for CziError {
    fn from(err: serde_json::Error) -> Self {
        CziError::Serialization(err.to_string())
    }
}

impl From<quick_xml::Error> for CziError {
    fn from(err: quick_xml::Error) -> Self {
        CziError::Xml(err.to_string())
    }
}

/// Per-file failure categories reported by the conversion driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    FileNotFound,
    ContainerOpen,
    MalformedMetadata,
    PlaneShapeMismatch,
    Io,
    Write,
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl CziError {
    /// Map this error onto the failure category used in batch reports
    pub fn kind(&self) -> FailureKind {
        match self {
            CziError::FileNotFound(_) => FailureKind::FileNotFound,
            CziError::ContainerOpen { .. } | CziError::UnsupportedVersion(..) => {
                FailureKind::ContainerOpen
            }
            CziError::MalformedMetadata(_) | CziError::Xml(_) => FailureKind::MalformedMetadata,
            CziError::PlaneShapeMismatch { .. } => FailureKind::PlaneShapeMismatch,
            CziError::Io(_) => FailureKind::Io,
            CziError::Tiff(_) | CziError::Serialization(_) => FailureKind::Write,
            _ => FailureKind::Other,
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        CziError::MalformedMetadata(message.into())
    }
}
