//! Point types and related functionality

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// A 3D point with floating point coordinates
pub type Point3f = Point3<f32>;

/// A 3D vector with floating point components
pub type Vector3f = Vector3<f32>;

/// Color used for points captured without color
pub const DEFAULT_GRAY: [u8; 3] = [128, 128, 128];

/// A sensor sample: position plus optional RGB color
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanPoint {
    pub position: Point3f,
    pub color: Option<[u8; 3]>,
}

impl ScanPoint {
    /// Create an uncolored point
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            position: Point3f::new(x, y, z),
            color: None,
        }
    }

    /// Create a colored point
    pub fn with_color(position: Point3f, color: [u8; 3]) -> Self {
        Self {
            position,
            color: Some(color),
        }
    }

    /// Color of the point, falling back to mid-gray
    pub fn color_or_default(&self) -> [u8; 3] {
        self.color.unwrap_or(DEFAULT_GRAY)
    }

    /// Whether every coordinate is finite
    pub fn is_finite(&self) -> bool {
        self.position.coords.iter().all(|c| c.is_finite())
    }
}

impl Default for ScanPoint {
    fn default() -> Self {
        Self {
            position: Point3f::origin(),
            color: None,
        }
    }
}

impl From<Point3f> for ScanPoint {
    fn from(position: Point3f) -> Self {
        Self {
            position,
            color: None,
        }
    }
}

impl From<ScanPoint> for Point3f {
    fn from(point: ScanPoint) -> Self {
        point.position
    }
}
