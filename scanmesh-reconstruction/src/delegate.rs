//! Delegated reconstruction
//!
//! A scan session may hand quick-mode reconstruction to an external service
//! (typically a ball-pivoting mesher). The service is reached through
//! [`DelegatedReconstructor`]; its responses are validated before use and any
//! failure falls back to local reconstruction.

use scanmesh_algorithms::point_statistics;
use scanmesh_core::{Error, Result, ScanPoint, TriangleMesh};
use serde::{Deserialize, Serialize};

/// Mesh encoding requested from the service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeshFormat {
    #[default]
    Ply,
    Obj,
}

impl MeshFormat {
    pub fn extension(self) -> &'static str {
        match self {
            MeshFormat::Ply => "ply",
            MeshFormat::Obj => "obj",
        }
    }
}

/// Parameters forwarded to the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegatedParams {
    /// Smallest ball radius as a multiple of the average point spacing
    pub radius_multiplier: f32,
    /// Number of ball radii, each 50% larger than the previous step
    pub num_radii: usize,
    pub output_format: MeshFormat,
}

impl Default for DelegatedParams {
    fn default() -> Self {
        Self {
            radius_multiplier: 1.5,
            num_radii: 2,
            output_format: MeshFormat::Ply,
        }
    }
}

/// Ball radii for a given average nearest-neighbor distance:
/// `avg * radius_multiplier * (1 + 0.5 i)` for `i in 0..num_radii`
pub fn ball_radii(avg_distance: f32, params: &DelegatedParams) -> Vec<f32> {
    (0..params.num_radii)
        .map(|i| avg_distance * params.radius_multiplier * (1.0 + 0.5 * i as f32))
        .collect()
}

/// Request sent to a [`DelegatedReconstructor`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegatedRequest {
    pub points: Vec<ScanPoint>,
    pub params: DelegatedParams,
    /// Ball radii derived from the point spacing
    pub radii: Vec<f32>,
}

impl DelegatedRequest {
    pub fn new(points: Vec<ScanPoint>, params: DelegatedParams) -> Result<Self> {
        if params.num_radii == 0 || !(params.radius_multiplier > 0.0) {
            return Err(Error::InvalidData(
                "delegated reconstruction needs at least one positive radius".to_string(),
            ));
        }
        let stats = point_statistics(&points).ok_or_else(|| Error::insufficient("points", 2, points.len()))?;
        let radii = ball_radii(stats.avg_point_distance, &params);
        Ok(Self { points, params, radii })
    }
}

/// Statistics reported with a delegated mesh
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DelegatedStats {
    pub vertex_count: usize,
    pub triangle_count: usize,
    /// Seconds spent by the service
    pub processing_time: f32,
}

/// Mesh returned by a [`DelegatedReconstructor`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegatedResponse {
    pub mesh: TriangleMesh,
    pub stats: DelegatedStats,
}

impl DelegatedResponse {
    /// Reject empty or malformed meshes and statistics that disagree with the mesh
    pub fn validate(&self) -> Result<()> {
        if self.mesh.is_empty() {
            return Err(Error::ExternalService("service returned an empty mesh".to_string()));
        }
        self.mesh
            .validate()
            .map_err(|e| Error::ExternalService(format!("service returned an invalid mesh: {}", e)))?;
        if self.stats.vertex_count != self.mesh.vertex_count()
            || self.stats.triangle_count != self.mesh.face_count()
        {
            return Err(Error::ExternalService(format!(
                "reported {} vertices / {} triangles, mesh has {} / {}",
                self.stats.vertex_count,
                self.stats.triangle_count,
                self.mesh.vertex_count(),
                self.mesh.face_count()
            )));
        }
        Ok(())
    }
}

/// An external reconstruction service.
///
/// Calls are blocking. Failures are reported as [`Error::ExternalService`].
pub trait DelegatedReconstructor: Send {
    fn reconstruct(&self, request: &DelegatedRequest) -> Result<DelegatedResponse>;
}
