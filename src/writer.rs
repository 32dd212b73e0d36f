//! Volume output
//!
//! Volumes are written as multi-page 32-bit float TIFF stacks (one page per
//! Z plane, axis order Z-Y-X) carrying ImageJ-style calibration in
//! nanometers. Files are first written to a temporary file in the target
//! directory and then renamed into place, so a partially written volume
//! never appears under its final name.

use crate::error::{CziError, Result};
use crate::types::CalibrationVector;
use crate::utils::sanitize_file_component;
use ndarray::{Array3, Axis};
use std::fs::File;
use std::path::{Path, PathBuf};
use tiff::encoder::{colortype, Rational, TiffEncoder};
use tiff::tags::{ResolutionUnit, Tag};
use tracing::info;

/// One assembled volume and its naming inputs
#[derive(Debug, Clone, Copy)]
pub struct VolumeRecord<'a> {
    pub volume: &'a Array3<f32>,
    pub calibration: CalibrationVector,
    pub scene_id: i32,
    pub channel_name: &'a str,
}

impl VolumeRecord<'_> {
    pub fn file_name(&self) -> String {
        volume_file_name(self.channel_name, self.scene_id)
    }
}

/// `{channel}_{scene_id + 1:03}.tif`
pub fn volume_file_name(channel_name: &str, scene_id: i32) -> String {
    format!(
        "{}_{:03}.tif",
        sanitize_file_component(channel_name),
        scene_id as i64 + 1
    )
}

/// Durable sink for assembled volumes
pub trait VolumeWriter: Send + Sync {
    /// Write `record` into `out_dir` and return the final path
    fn write_volume(&self, out_dir: &Path, record: &VolumeRecord<'_>) -> Result<PathBuf>;
}

/// Multi-page float TIFF writer
#[derive(Debug, Clone, Copy, Default)]
pub struct TiffVolumeWriter;

impl TiffVolumeWriter {
    /// Denominator scale of the X/Y resolution rationals
    const RESOLUTION_SCALE: f64 = 1000.0;

    pub fn new() -> Self {
        Self
    }

    /// ImageJ hyperstack description stored on the first page
    pub fn image_description(depth: usize, calibration: &CalibrationVector) -> String {
        // meters-to-nm products carry float noise (299.99999999999994)
        let spacing = (calibration.dz_nm * 1e6).round() / 1e6;
        format!(
            "ImageJ=1.11a\nimages={depth}\nslices={depth}\nunit=nm\nspacing={spacing}\nloop=false\n"
        )
    }

    /// Pixels per nanometer for a spacing of `spacing_nm`
    fn resolution(spacing_nm: f64) -> Rational {
        let d = (spacing_nm * Self::RESOLUTION_SCALE).round();
        let d = if d.is_finite() && d >= 1.0 {
            d.min(u32::MAX as f64) as u32
        } else {
            1
        };
        Rational {
            n: Self::RESOLUTION_SCALE as u32,
            d,
        }
    }

    fn encode(file: &mut File, record: &VolumeRecord<'_>) -> Result<()> {
        let (depth, height, width) = record.volume.dim();
        let description = Self::image_description(depth, &record.calibration);
        let mut encoder = TiffEncoder::new(file)?;

        for (z, plane) in record.volume.axis_iter(Axis(0)).enumerate() {
            let mut image =
                encoder.new_image::<colortype::Gray32Float>(width as u32, height as u32)?;
            if z == 0 {
                image
                    .encoder()
                    .write_tag(Tag::ImageDescription, description.as_str())?;
            }
            image.x_resolution(Self::resolution(record.calibration.dx_nm));
            image.y_resolution(Self::resolution(record.calibration.dy_nm));
            image.resolution_unit(ResolutionUnit::None);

            let pixels: Vec<f32> = plane.iter().copied().collect();
            image.write_data(&pixels)?;
        }
        Ok(())
    }
}

impl VolumeWriter for TiffVolumeWriter {
    fn write_volume(&self, out_dir: &Path, record: &VolumeRecord<'_>) -> Result<PathBuf> {
        let (depth, height, width) = record.volume.dim();
        if depth == 0 || height == 0 || width == 0 {
            return Err(CziError::InvalidFormat(format!(
                "cannot write an empty volume of shape {:?}",
                record.volume.dim()
            )));
        }

        let target = out_dir.join(record.file_name());
        let mut staging = tempfile::Builder::new()
            .prefix(".czitool-")
            .suffix(".tif.part")
            .tempfile_in(out_dir)?;

        Self::encode(staging.as_file_mut(), record)?;
        staging.as_file().sync_all()?;
        staging.persist(&target).map_err(|e| CziError::Io(e.error))?;

        info!(
            "Wrote {} ({} x {} x {}, {})",
            target.display(),
            depth,
            height,
            width,
            record.calibration
        );
        Ok(target)
    }
}
