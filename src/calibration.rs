//! Physical voxel spacing from the `Scaling` block

use crate::error::{CziError, Result};
use crate::metadata::MetadataNode;
use crate::types::CalibrationVector;
use tracing::{debug, warn};

const DISTANCE_LISTS: &[&str] = &[
    "ImageDocument.Metadata.Scaling.Items.Distance",
    "Metadata.Scaling.Items.Distance",
    "Scaling.Items.Distance",
];

const AXES: [&str; 3] = ["X", "Y", "Z"];

/// Resolves X, Y, Z spacing. Distance values are taken to be meters.
pub struct CalibrationResolver;

impl CalibrationResolver {
    pub fn resolve(tree: &MetadataNode) -> Result<CalibrationVector> {
        let entries = DISTANCE_LISTS
            .iter()
            .map(|path| tree.at(path).items())
            .find(|items| !items.is_empty())
            .unwrap_or_default();

        if entries.len() < 3 {
            return Err(CziError::malformed(format!(
                "expected 3 scaling distances (X, Y, Z), found {}",
                entries.len()
            )));
        }

        let ordered = Self::order_by_id(&entries).unwrap_or_else(|| {
            debug!("Scaling distances carry no usable Id, using list order");
            [entries[0], entries[1], entries[2]]
        });

        let mut meters = [0.0f64; 3];
        for (slot, (axis, entry)) in meters.iter_mut().zip(AXES.iter().zip(ordered)) {
            *slot = Self::distance_value(axis, entry)?;
            if let Some(unit) = entry.get("DefaultUnitFormat").as_str() {
                debug!("Distance {axis} declares display unit {unit}; value read as meters");
            }
        }

        let calibration = CalibrationVector::from_meters(meters[0], meters[1], meters[2]);
        if meters.iter().any(|m| *m <= 0.0) {
            warn!("Non-positive voxel spacing {calibration}");
        }
        Ok(calibration)
    }

    /// Pick X, Y, Z by their `@Id`, when every axis is present
    fn order_by_id<'a>(entries: &[&'a MetadataNode]) -> Option<[&'a MetadataNode; 3]> {
        let find = |axis: &str| {
            entries
                .iter()
                .copied()
                .find(|e| e.get("@Id").as_str().map(str::trim) == Some(axis))
        };
        Some([find(AXES[0])?, find(AXES[1])?, find(AXES[2])?])
    }

    fn distance_value(axis: &str, entry: &MetadataNode) -> Result<f64> {
        let value = entry.get("Value");
        let raw = if value.is_absent() {
            entry.as_str()
        } else {
            value.as_str()
        };
        raw.and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .ok_or_else(|| {
                CziError::malformed(format!(
                    "scaling distance {axis} is not numeric: {:?}",
                    raw.unwrap_or_default()
                ))
            })
    }
}
