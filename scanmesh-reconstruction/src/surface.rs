//! Candidate triangle generation
//!
//! Every point is triangulated against pairs of its nearest neighbors. The
//! result is a deliberately redundant triangle set; boundary detection, hole
//! filling and component consolidation refine it afterwards.

use crate::reconstructor::ReconstructionConfig;
use itertools::Itertools;
use rayon::prelude::*;
use scanmesh_algorithms::SpatialIndex;
use scanmesh_core::{canonical_face, check_triangle, face_edges, Edge, Face, NearestNeighborSearch, Point3f, Result};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Triangles built from local neighborhoods plus per-edge usage counts
#[derive(Debug, Clone, Default)]
pub struct CandidateSurface {
    /// Unique triangles in canonical (sorted) index order
    pub triangles: Vec<Face>,
    /// Number of triangles using each undirected edge
    pub edge_usage: HashMap<Edge, u32>,
    /// Longest edge a candidate triangle may have
    pub max_dist: f32,
}

impl CandidateSurface {
    /// Edges used by exactly one triangle
    pub fn boundary_edge_count(&self) -> usize {
        self.edge_usage.values().filter(|&&n| n == 1).count()
    }
}

/// Per-undirected-edge usage counts of a triangle set
pub fn edge_usage(triangles: &[Face]) -> HashMap<Edge, u32> {
    let mut usage = HashMap::with_capacity(triangles.len() * 2);
    for face in triangles {
        for edge in face_edges(face) {
            *usage.entry(edge).or_insert(0) += 1;
        }
    }
    usage
}

/// Build candidate triangles over `points`.
///
/// `max_dist = resolution * neighbor_radius_factor`; for each point up to
/// `max_neighbors` nearest neighbors within `max_dist` are gathered and every
/// neighbor pair closing a triangle with all edges within `max_dist` and a
/// non-degenerate area becomes a candidate.
pub fn build_candidate_triangles(
    points: &[Point3f],
    resolution: f32,
    config: &ReconstructionConfig,
) -> Result<CandidateSurface> {
    let max_dist = config.max_dist(resolution)?;
    if points.len() < 3 {
        return Ok(CandidateSurface {
            max_dist,
            ..Default::default()
        });
    }

    let index = SpatialIndex::build(points, max_dist)?;
    let area_epsilon = config.area_epsilon(max_dist);

    let per_point: Vec<Vec<Face>> = points
        .par_iter()
        .enumerate()
        .map(|(i, p)| {
            let mut neighbors = index.find_radius_neighbors(p, max_dist);
            neighbors.retain(|(j, _)| *j != i);
            neighbors.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
            neighbors.truncate(config.max_neighbors);

            neighbors
                .iter()
                .tuple_combinations()
                .filter(|((j, _), (k, _))| (points[*j] - points[*k]).norm() <= max_dist)
                .map(|((j, _), (k, _))| canonical_face(&[i, *j, *k]))
                .filter(|face| check_triangle(points, face, area_epsilon).is_ok())
                .collect()
        })
        .collect();

    let mut seen = HashSet::new();
    let triangles: Vec<Face> = per_point
        .into_iter()
        .flatten()
        .filter(|face| seen.insert(*face))
        .collect();
    let edge_usage = edge_usage(&triangles);

    debug!(
        points = points.len(),
        triangles = triangles.len(),
        edges = edge_usage.len(),
        max_dist,
        "candidate triangles built"
    );

    Ok(CandidateSurface {
        triangles,
        edge_usage,
        max_dist,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: usize, spacing: f32) -> Vec<Point3f> {
        (0..n * n)
            .map(|i| Point3f::new((i % n) as f32 * spacing, (i / n) as f32 * spacing, 1.0))
            .collect()
    }

    #[test]
    fn test_too_few_points() {
        let config = ReconstructionConfig::default();
        let surface = build_candidate_triangles(&grid(1, 0.01), 0.01, &config).unwrap();
        assert!(surface.triangles.is_empty());
        assert!(build_candidate_triangles(&grid(3, 0.01), 0.0, &config).is_err());
    }

    #[test]
    fn test_single_triangle() {
        let points = vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(0.01, 0.0, 0.0),
            Point3f::new(0.0, 0.01, 0.0),
        ];
        let surface = build_candidate_triangles(&points, 0.01, &ReconstructionConfig::default()).unwrap();
        assert_eq!(surface.triangles, vec![[0, 1, 2]]);
        assert_eq!(surface.edge_usage.len(), 3);
        assert_eq!(surface.boundary_edge_count(), 3);
    }

    #[test]
    fn test_collinear_points_produce_nothing() {
        let points: Vec<Point3f> = (0..10).map(|i| Point3f::new(i as f32 * 0.01, 0.0, 1.0)).collect();
        let surface = build_candidate_triangles(&points, 0.01, &ReconstructionConfig::default()).unwrap();
        assert!(surface.triangles.is_empty());
    }

    #[test]
    fn test_grid_triangles_are_valid_and_unique() {
        let points = grid(12, 0.01);
        let surface = build_candidate_triangles(&points, 0.01, &ReconstructionConfig::default()).unwrap();

        assert!(!surface.triangles.is_empty());
        let mut seen = HashSet::new();
        for face in &surface.triangles {
            assert!(face[0] < face[1] && face[1] < face[2]);
            assert!(face.iter().all(|&i| i < points.len()));
            assert!(seen.insert(*face));
            for (a, b) in [(0, 1), (1, 2), (0, 2)] {
                assert!((points[face[a]] - points[face[b]]).norm() <= surface.max_dist);
            }
        }
        let total: u32 = surface.edge_usage.values().sum();
        assert_eq!(total as usize, surface.triangles.len() * 3);
    }

    #[test]
    fn test_neighbor_cap_bounds_triangles_per_point() {
        let points = grid(15, 0.01);
        let config = ReconstructionConfig {
            max_neighbors: 4,
            ..Default::default()
        };
        let surface = build_candidate_triangles(&points, 0.01, &config).unwrap();
        // at most C(4, 2) triangles are emitted from each point
        assert!(surface.triangles.len() <= points.len() * 6);
        assert!(!surface.triangles.is_empty());
    }
}
