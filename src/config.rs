//! Conversion options

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::CziError;

/// Name of the diagnostic metadata dump written next to the volumes
pub const METADATA_LOG_NAME: &str = "czitool.log.txt";

/// How integer pixel values are mapped to f32 when planes are read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValueScaling {
    /// Keep the stored value (65535 stays 65535.0)
    #[default]
    Raw,
    /// Divide by the maximum of the stored integer type, giving [0, 1]
    UnitRange,
}

impl FromStr for ValueScaling {
    type Err = CziError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(ValueScaling::Raw),
            "unit-range" | "unit_range" | "normalized" => Ok(ValueScaling::UnitRange),
            other => Err(CziError::Configuration(format!(
                "unknown value scaling '{other}' (expected raw or unit-range)"
            ))),
        }
    }
}

impl fmt::Display for ValueScaling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueScaling::Raw => f.write_str("raw"),
            ValueScaling::UnitRange => f.write_str("unit-range"),
        }
    }
}

/// Options for a conversion run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Pixel value mapping applied while reading planes
    pub value_scaling: ValueScaling,

    /// Directory under which per-input output directories are created.
    /// `None` places them next to each input file.
    pub output_root: Option<PathBuf>,

    /// Write the full metadata tree to [`METADATA_LOG_NAME`]
    pub write_metadata_log: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            value_scaling: ValueScaling::Raw,
            output_root: None,
            write_metadata_log: true,
        }
    }
}

impl ConvertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value_scaling(mut self, scaling: ValueScaling) -> Self {
        self.value_scaling = scaling;
        self
    }

    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = Some(root.into());
        self
    }

    pub fn with_metadata_log(mut self, enabled: bool) -> Self {
        self.write_metadata_log = enabled;
        self
    }

    /// Output directory for `input`: a directory named after the file stem,
    /// beside the input or under the output root
    pub fn output_dir_for(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| "output".into());
        match &self.output_root {
            Some(root) => root.join(stem),
            None => input
                .parent()
                .map(|p| p.join(&stem))
                .unwrap_or_else(|| PathBuf::from(&stem)),
        }
    }
}
