//! Point set to mesh reconstruction
//!
//! Runs candidate triangulation, hole filling and component consolidation
//! over a merged point set. The output mesh uses the input points as its
//! vertex array, so vertex `i` is input point `i`.

use crate::components::{consolidate_components, Consolidation};
use crate::holes::{boundary_loops_from_usage, classify_and_fill_holes};
use crate::surface::{build_candidate_triangles, CandidateSurface};
use scanmesh_core::{canonical_face, Error, Face, Point3f, Result, ScanPoint, TriangleMesh};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;
use tracing::info;

/// Configuration for [`SurfaceReconstructor`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionConfig {
    /// Nearest neighbors considered per point
    pub max_neighbors: usize,
    /// `max_dist = resolution * neighbor_radius_factor`
    pub neighbor_radius_factor: f32,
    /// Triangles must span more than `min_area_ratio * max_dist²`
    pub min_area_ratio: f32,
    pub fill_holes: bool,
    pub consolidate: bool,
    /// Islands farther than `bridge_search_factor * max_dist` are left alone
    pub bridge_search_factor: f32,
    /// Vertices sampled per component when looking for a bridge
    pub bridge_sample_size: usize,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            max_neighbors: 20,
            neighbor_radius_factor: 2.5,
            min_area_ratio: 1e-4,
            fill_holes: true,
            consolidate: true,
            bridge_search_factor: 4.0,
            bridge_sample_size: 200,
        }
    }
}

impl ReconstructionConfig {
    /// Longest candidate edge for a sampling resolution
    pub fn max_dist(&self, resolution: f32) -> Result<f32> {
        let max_dist = resolution * self.neighbor_radius_factor;
        if !(max_dist > 0.0) || !max_dist.is_finite() {
            return Err(Error::InvalidData(format!(
                "resolution {} gives no usable neighbor radius",
                resolution
            )));
        }
        Ok(max_dist)
    }

    /// Area below which a triangle counts as degenerate
    pub fn area_epsilon(&self, max_dist: f32) -> f32 {
        self.min_area_ratio * max_dist * max_dist
    }
}

/// Per-stage counts of one reconstruction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconstructionReport {
    pub max_dist: f32,
    pub candidate_triangles: usize,
    pub boundary_loops: usize,
    pub filled_triangles: usize,
    pub consolidation: Consolidation,
    /// Seconds spent in [`SurfaceReconstructor::reconstruct`]
    pub processing_time: f32,
}

/// Reconstructed mesh plus its report
#[derive(Debug, Clone)]
pub struct SurfaceReconstruction {
    pub mesh: TriangleMesh,
    pub report: ReconstructionReport,
}

/// Builds a mesh directly on a merged scan point set
#[derive(Debug, Clone, Default)]
pub struct SurfaceReconstructor {
    config: ReconstructionConfig,
}

impl SurfaceReconstructor {
    pub fn new(config: ReconstructionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    /// Reconstruct a mesh over `points` sampled at roughly `resolution`.
    ///
    /// Vertex colors default to mid-gray for points without one, as long as
    /// at least one point is colored.
    pub fn reconstruct(&self, points: &[ScanPoint], resolution: f32) -> Result<SurfaceReconstruction> {
        let start_time = Instant::now();
        if points.len() < 3 {
            return Err(Error::insufficient("points", 3, points.len()));
        }

        let positions: Vec<Point3f> = points.iter().map(|p| p.position).collect();
        let CandidateSurface {
            mut triangles,
            edge_usage,
            max_dist,
        } = build_candidate_triangles(&positions, resolution, &self.config)?;

        let mut report = ReconstructionReport {
            max_dist,
            candidate_triangles: triangles.len(),
            ..Default::default()
        };

        if self.config.fill_holes {
            let loops = boundary_loops_from_usage(&edge_usage);
            let existing: HashSet<Face> = triangles.iter().map(canonical_face).collect();
            let filling = classify_and_fill_holes(&positions, &loops, &existing, self.config.area_epsilon(max_dist));
            report.boundary_loops = loops.len();
            report.filled_triangles = filling.triangles.len();
            triangles.extend(filling.triangles);
        }

        if self.config.consolidate {
            report.consolidation = consolidate_components(&positions, &mut triangles, max_dist, &self.config)?;
        }

        let mut mesh = TriangleMesh::from_vertices_and_faces(positions, triangles);
        if points.iter().any(|p| p.color.is_some()) {
            mesh.set_colors(points.iter().map(ScanPoint::color_or_default).collect());
        }
        mesh.compute_vertex_normals();

        report.processing_time = start_time.elapsed().as_secs_f32();
        info!(
            vertices = mesh.vertex_count(),
            triangles = mesh.face_count(),
            loops = report.boundary_loops,
            filled = report.filled_triangles,
            components = report.consolidation.final_components,
            seconds = report.processing_time,
            "surface reconstructed"
        );

        Ok(SurfaceReconstruction { mesh, report })
    }
}
