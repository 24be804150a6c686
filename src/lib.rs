//! # scanmesh
//!
//! Multi-frame depth scan processing for Rust: per-frame outlier filtering,
//! ICP registration, sparse volumetric fusion and direct surface
//! reconstruction, driven by a scan session state machine.
//!
//! This is the umbrella crate that provides convenient access to all scanmesh
//! functionality. Use the individual crates for more granular control over
//! dependencies.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scanmesh::prelude::*;
//!
//! # fn frames() -> Vec<Frame> { Vec::new() }
//! # fn main() -> Result<()> {
//! let mut session = ScanSession::new(ScanConfig::default())?;
//! session.start_scan()?;
//! for frame in frames() {
//!     session.ingest_frame(&frame)?;
//! }
//! session.stop_scan()?;
//!
//! let result = session.generate_mesh()?;
//! println!("{} triangles", result.stats.triangle_count);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `default`: Enables algorithms and reconstruction
//! - `algorithms`: Spatial index, filtering and registration
//! - `reconstruction`: Fusion, surface reconstruction and the scan session

// Re-export core functionality
pub use scanmesh_core::*;

// Re-export sub-crates
#[cfg(feature = "algorithms")]
pub use scanmesh_algorithms as algorithms;

#[cfg(feature = "reconstruction")]
pub use scanmesh_reconstruction as reconstruction;

/// Convenient imports for common use cases
pub mod prelude {
    pub use scanmesh_core::*;

    #[cfg(feature = "algorithms")]
    pub use scanmesh_algorithms::*;

    #[cfg(feature = "reconstruction")]
    pub use scanmesh_reconstruction::*;
}
