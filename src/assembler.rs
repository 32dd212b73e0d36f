//! Stacks the Z planes of one (scene, channel) pair into a volume

use crate::backend::ContainerBackend;
use crate::config::ValueScaling;
use crate::error::{CziError, Result};
use crate::types::Scene;
use ndarray::{stack, Array2, Array3, ArrayD, Axis, Ix2};
use tracing::debug;

/// Reads planes in ascending z and widens them to f32
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaneAssembler {
    scaling: ValueScaling,
}

impl PlaneAssembler {
    pub fn new(scaling: ValueScaling) -> Self {
        Self { scaling }
    }

    /// Volume of shape (depth, scene height, scene width)
    pub fn assemble<B: ContainerBackend + ?Sized>(
        &self,
        backend: &B,
        scene: &Scene,
        channel: usize,
        depth: usize,
    ) -> Result<Array3<f32>> {
        // depth comes from metadata; memory grows only with planes actually read
        let mut planes = Vec::new();
        for z in 0..depth {
            let raw = backend.read_plane(channel, z, scene.id)?;
            let plane = squeeze_trailing(raw.into_f32(self.scaling));
            planes.push(Self::validate(plane, scene, channel, z)?);
            debug!(scene = scene.id, channel, z, "Read plane");
        }

        if planes.is_empty() {
            let (height, width) = scene.rect.shape();
            return Ok(Array3::zeros((0, height, width)));
        }
        let views: Vec<_> = planes.iter().map(|p| p.view()).collect();
        stack(Axis(0), &views).map_err(|e| CziError::InvalidFormat(e.to_string()))
    }

    fn validate(plane: ArrayD<f32>, scene: &Scene, channel: usize, z: usize) -> Result<Array2<f32>> {
        let expected = scene.rect.shape();
        let mismatch = |actual: &[usize]| CziError::PlaneShapeMismatch {
            scene: scene.id,
            channel,
            z,
            expected,
            actual: actual.to_vec(),
        };
        if plane.shape() != [expected.0, expected.1] {
            return Err(mismatch(plane.shape()));
        }
        let shape = plane.shape().to_vec();
        plane.into_dimensionality::<Ix2>().map_err(|_| mismatch(&shape))
    }
}

/// Drop trailing length-1 axes, keeping at least two
fn squeeze_trailing(mut plane: ArrayD<f32>) -> ArrayD<f32> {
    while plane.ndim() > 2 && plane.shape()[plane.ndim() - 1] == 1 {
        let last = Axis(plane.ndim() - 1);
        plane = plane.index_axis_move(last, 0);
    }
    plane
}
