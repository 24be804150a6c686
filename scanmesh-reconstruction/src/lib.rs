//! # scanmesh reconstruction
//!
//! Turns filtered, registered scan points into triangle meshes.
//!
//! Two paths are provided: direct reconstruction over the union of buffered
//! frames (candidate triangles, hole filling and component consolidation),
//! and sparse volumetric fusion with a simplified surface extraction. The
//! [`ScanSession`] orchestrator drives either path through the scan
//! lifecycle and can hand quick-mode reconstruction to an external service.

pub mod fusion;
pub mod surface;
pub mod holes;
pub mod components;
pub mod reconstructor;
pub mod delegate;
pub mod pipeline;

// Re-export commonly used items
pub use fusion::*;
pub use surface::*;
pub use holes::*;
pub use components::*;
pub use reconstructor::*;
pub use delegate::*;
pub use pipeline::*;
