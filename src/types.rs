//! Core data types for CZI containers and converted volumes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pixel types stored in CZI subblocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelType {
    /// Unsigned 8-bit grayscale
    Gray8,
    /// Unsigned 16-bit grayscale
    Gray16,
    /// 32-bit float grayscale
    Gray32Float,
    /// 3 x unsigned 8-bit, blue-green-red
    Bgr24,
    /// 3 x unsigned 16-bit, blue-green-red
    Bgr48,
    /// 3 x 32-bit float, blue-green-red
    Bgr96Float,
    /// 4 x unsigned 8-bit, blue-green-red-alpha
    Bgra32,
    /// 2 x 32-bit float (complex)
    Gray64ComplexFloat,
    /// 6 x 32-bit float (complex BGR)
    Bgr192ComplexFloat,
    /// Signed 32-bit grayscale
    Gray32,
    /// 64-bit float grayscale
    Gray64,
}

impl PixelType {
    /// Decode the on-disk pixel type code
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(PixelType::Gray8),
            1 => Some(PixelType::Gray16),
            2 => Some(PixelType::Gray32Float),
            3 => Some(PixelType::Bgr24),
            4 => Some(PixelType::Bgr48),
            8 => Some(PixelType::Bgr96Float),
            9 => Some(PixelType::Bgra32),
            10 => Some(PixelType::Gray64ComplexFloat),
            11 => Some(PixelType::Bgr192ComplexFloat),
            12 => Some(PixelType::Gray32),
            13 => Some(PixelType::Gray64),
            _ => None,
        }
    }

    /// On-disk pixel type code
    pub fn code(&self) -> i32 {
        match self {
            PixelType::Gray8 => 0,
            PixelType::Gray16 => 1,
            PixelType::Gray32Float => 2,
            PixelType::Bgr24 => 3,
            PixelType::Bgr48 => 4,
            PixelType::Bgr96Float => 8,
            PixelType::Bgra32 => 9,
            PixelType::Gray64ComplexFloat => 10,
            PixelType::Bgr192ComplexFloat => 11,
            PixelType::Gray32 => 12,
            PixelType::Gray64 => 13,
        }
    }

    /// Number of samples per pixel
    pub fn samples_per_pixel(&self) -> usize {
        match self {
            PixelType::Gray8
            | PixelType::Gray16
            | PixelType::Gray32Float
            | PixelType::Gray32
            | PixelType::Gray64 => 1,
            PixelType::Gray64ComplexFloat => 2,
            PixelType::Bgr24 | PixelType::Bgr48 | PixelType::Bgr96Float => 3,
            PixelType::Bgra32 => 4,
            PixelType::Bgr192ComplexFloat => 6,
        }
    }

    /// Size in bytes of one sample
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            PixelType::Gray8 | PixelType::Bgr24 | PixelType::Bgra32 => 1,
            PixelType::Gray16 | PixelType::Bgr48 => 2,
            PixelType::Gray32Float
            | PixelType::Bgr96Float
            | PixelType::Gray32
            | PixelType::Gray64ComplexFloat
            | PixelType::Bgr192ComplexFloat => 4,
            PixelType::Gray64 => 8,
        }
    }

    /// Size in bytes of one pixel
    pub fn bytes_per_pixel(&self) -> usize {
        self.samples_per_pixel() * self.bytes_per_sample()
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Pixel-space rectangle in the container coordinate system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge
    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    /// Exclusive bottom edge
    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Smallest rectangle containing both `self` and `other`
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect {
            x,
            y,
            width: (right - x as i64) as u32,
            height: (bottom - y as i64) as u32,
        }
    }

    /// Overlapping area of two rectangles, if any
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x as i64 || bottom <= y as i64 {
            return None;
        }
        Some(Rect {
            x,
            y,
            width: (right - x as i64) as u32,
            height: (bottom - y as i64) as u32,
        })
    }

    /// Shape as (height, width), the order of a 2D array
    pub fn shape(&self) -> (usize, usize) {
        (self.height as usize, self.width as usize)
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} at ({}, {})",
            self.width, self.height, self.x, self.y
        )
    }
}

/// One acquisition channel; `index` is its position in the metadata list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub index: usize,
    pub name: String,
}

/// One field of view. Ids are arbitrary and need not be contiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    pub id: i32,
    pub rect: Rect,
}

/// Physical voxel spacing in nanometers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationVector {
    pub dx_nm: f64,
    pub dy_nm: f64,
    pub dz_nm: f64,
}

impl CalibrationVector {
    pub const METERS_TO_NANOMETERS: f64 = 1e9;

    /// Build from spacings expressed in meters
    pub fn from_meters(dx: f64, dy: f64, dz: f64) -> Self {
        Self {
            dx_nm: dx * Self::METERS_TO_NANOMETERS,
            dy_nm: dy * Self::METERS_TO_NANOMETERS,
            dz_nm: dz * Self::METERS_TO_NANOMETERS,
        }
    }
}

impl fmt::Display for CalibrationVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2} x {:.2} x {:.2} nm",
            self.dx_nm, self.dy_nm, self.dz_nm
        )
    }
}
