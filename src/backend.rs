//! Container backend seam
//!
//! The conversion pipeline only talks to containers through
//! [`ContainerBackend`]. The native CZI reader in [`crate::access`] is the
//! production implementation; [`InMemoryContainer`] serves synthetic data.

use crate::config::ValueScaling;
use crate::error::{CziError, Result};
use crate::metadata::MetadataNode;
use crate::types::Rect;
use ndarray::{Array2, ArrayD};
use num_traits::{AsPrimitive, Bounded};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Raw pixels of one plane as delivered by a backend.
/// Multi-sample pixel types carry a trailing sample axis.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaneBuffer {
    U8(ArrayD<u8>),
    U16(ArrayD<u16>),
    I32(ArrayD<i32>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
}

impl PlaneBuffer {
    pub fn shape(&self) -> &[usize] {
        match self {
            PlaneBuffer::U8(a) => a.shape(),
            PlaneBuffer::U16(a) => a.shape(),
            PlaneBuffer::I32(a) => a.shape(),
            PlaneBuffer::F32(a) => a.shape(),
            PlaneBuffer::F64(a) => a.shape(),
        }
    }

    /// Widen to f32, dividing integer samples by their type maximum under
    /// [`ValueScaling::UnitRange`]
    pub fn into_f32(self, scaling: ValueScaling) -> ArrayD<f32> {
        match self {
            PlaneBuffer::U8(a) => widen(a, integer_divisor::<u8>(scaling)),
            PlaneBuffer::U16(a) => widen(a, integer_divisor::<u16>(scaling)),
            PlaneBuffer::I32(a) => widen(a, integer_divisor::<i32>(scaling)),
            PlaneBuffer::F32(a) => a,
            PlaneBuffer::F64(a) => widen(a, 1.0),
        }
    }
}

impl From<Array2<u8>> for PlaneBuffer {
    fn from(a: Array2<u8>) -> Self {
        PlaneBuffer::U8(a.into_dyn())
    }
}

impl From<Array2<u16>> for PlaneBuffer {
    fn from(a: Array2<u16>) -> Self {
        PlaneBuffer::U16(a.into_dyn())
    }
}

impl From<Array2<f32>> for PlaneBuffer {
    fn from(a: Array2<f32>) -> Self {
        PlaneBuffer::F32(a.into_dyn())
    }
}

fn integer_divisor<T: Bounded + AsPrimitive<f32>>(scaling: ValueScaling) -> f32 {
    match scaling {
        ValueScaling::Raw => 1.0,
        ValueScaling::UnitRange => T::max_value().as_(),
    }
}

fn widen<T: AsPrimitive<f32>>(a: ArrayD<T>, divisor: f32) -> ArrayD<f32> {
    if divisor == 1.0 {
        a.mapv(|v| v.as_())
    } else {
        a.mapv(|v| v.as_() / divisor)
    }
}

/// Read access to one opened container.
///
/// Implementations are not required to support concurrent reads.
pub trait ContainerBackend {
    /// Full metadata tree
    fn metadata(&self) -> Result<MetadataNode>;

    /// Bounding rectangle per scene id; may be empty
    fn scene_rectangles(&self) -> Result<BTreeMap<i32, Rect>>;

    /// Bounding rectangle of all image data
    fn bounding_rectangle(&self) -> Result<Rect>;

    /// Pixels of the plane (channel, z, scene), covering the scene rectangle
    fn read_plane(&self, channel: usize, z: usize, scene: i32) -> Result<PlaneBuffer>;
}

/// Opens containers for the conversion driver
pub trait ContainerSource {
    type Container: ContainerBackend;

    /// Open `path`; unrecognized formats yield [`CziError::ContainerOpen`]
    fn open(&self, path: &Path) -> Result<Self::Container>;
}

/// Container held entirely in memory
#[derive(Debug, Clone)]
pub struct InMemoryContainer {
    metadata: MetadataNode,
    scenes: BTreeMap<i32, Rect>,
    bounding: Rect,
    planes: HashMap<(usize, usize, i32), PlaneBuffer>,
}

impl InMemoryContainer {
    pub fn new(metadata: MetadataNode, bounding: Rect) -> Self {
        Self {
            metadata,
            scenes: BTreeMap::new(),
            bounding,
            planes: HashMap::new(),
        }
    }

    pub fn with_scene(mut self, id: i32, rect: Rect) -> Self {
        self.scenes.insert(id, rect);
        self
    }

    pub fn with_plane(
        mut self,
        channel: usize,
        z: usize,
        scene: i32,
        plane: impl Into<PlaneBuffer>,
    ) -> Self {
        self.planes.insert((channel, z, scene), plane.into());
        self
    }
}

impl ContainerBackend for InMemoryContainer {
    fn metadata(&self) -> Result<MetadataNode> {
        Ok(self.metadata.clone())
    }

    fn scene_rectangles(&self) -> Result<BTreeMap<i32, Rect>> {
        Ok(self.scenes.clone())
    }

    fn bounding_rectangle(&self) -> Result<Rect> {
        Ok(self.bounding)
    }

    fn read_plane(&self, channel: usize, z: usize, scene: i32) -> Result<PlaneBuffer> {
        self.planes
            .get(&(channel, z, scene))
            .cloned()
            .ok_or_else(|| {
                CziError::InvalidFormat(format!(
                    "no plane for channel {channel}, z {z}, scene {scene}"
                ))
            })
    }
}

impl<B: ContainerBackend + ?Sized> ContainerBackend for Box<B> {
    fn metadata(&self) -> Result<MetadataNode> {
        (**self).metadata()
    }

    fn scene_rectangles(&self) -> Result<BTreeMap<i32, Rect>> {
        (**self).scene_rectangles()
    }

    fn bounding_rectangle(&self) -> Result<Rect> {
        (**self).bounding_rectangle()
    }

    fn read_plane(&self, channel: usize, z: usize, scene: i32) -> Result<PlaneBuffer> {
        (**self).read_plane(channel, z, scene)
    }
}
