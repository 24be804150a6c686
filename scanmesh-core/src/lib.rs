//! Core data structures and traits for scanmesh
//! 
//! This crate provides the fundamental types shared by the scan pipeline:
//! scan points and frames, point clouds, triangle meshes, rigid transforms,
//! packed grid keys and the error type.

pub mod point;
pub mod frame;
pub mod point_cloud;
pub mod grid;
pub mod mesh;
pub mod traits;
pub mod transform;
pub mod error;

pub use point::*;
pub use frame::*;
pub use point_cloud::*;
pub use grid::*;
pub use mesh::*;
pub use traits::*;
pub use transform::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3, Matrix3, Isometry3, UnitQuaternion};

// Type aliases for easier imports
pub type Point = ScanPoint;
pub type Mesh = TriangleMesh;
