//! # scanmesh algorithms
//!
//! Point-level processing for the scan pipeline: a uniform-grid spatial
//! index, density estimation, per-frame outlier filtering and ICP
//! registration.

pub mod spatial_index;
pub mod density;
pub mod filtering;
pub mod registration;

// Re-export commonly used items
pub use spatial_index::*;
pub use density::*;
pub use filtering::*;
pub use registration::*;
