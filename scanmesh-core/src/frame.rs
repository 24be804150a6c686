//! Sensor frames as delivered by the capture layer

use crate::point::{Point3f, ScanPoint};
use crate::traits::Transformable;
use crate::transform::Transform3D;
use serde::{Deserialize, Serialize};

/// One depth-sensor capture: an ordered set of points plus optional
/// structured dimensions and a capture timestamp in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub points: Vec<ScanPoint>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub timestamp: f64,
}

impl Frame {
    /// Create an unstructured frame
    pub fn new(points: Vec<ScanPoint>, timestamp: f64) -> Self {
        Self {
            points,
            width: None,
            height: None,
            timestamp,
        }
    }

    /// Create a structured (organized) frame
    pub fn structured(points: Vec<ScanPoint>, width: u32, height: u32, timestamp: f64) -> Self {
        Self {
            points,
            width: Some(width),
            height: Some(height),
            timestamp,
        }
    }

    /// Number of points in the frame
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the frame carries no points
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether width × height matches the point count
    pub fn is_organized(&self) -> bool {
        match (self.width, self.height) {
            (Some(w), Some(h)) => (w as usize) * (h as usize) == self.points.len(),
            _ => false,
        }
    }

    /// Positions of all points
    pub fn positions(&self) -> Vec<Point3f> {
        self.points.iter().map(|p| p.position).collect()
    }
}

impl Transformable for Frame {
    fn transform(&mut self, transform: &Transform3D) {
        for point in &mut self.points {
            point.position = transform.transform_point(&point.position);
        }
    }
}
