//! Boundary loop detection and hole filling.
//!
//! A boundary edge is used by exactly one triangle. Boundary edges are
//! chained into closed loops, and each loop is closed by a triangle fan whose
//! center depends on the loop size.

use crate::surface::edge_usage;
use scanmesh_core::{canonical_face, check_triangle, edge_key, Edge, Face, Point3f, Vector3f};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Loops with fewer edges are fanned from their first vertex
pub const SMALL_HOLE_EDGES: usize = 10;

/// Loops with more edges are fanned from the vertex nearest their centroid
pub const LARGE_HOLE_EDGES: usize = 50;

/// Fan centers tried for medium loops
pub const FAN_CANDIDATES: usize = 8;

/// A closed loop of boundary edges
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryLoop {
    /// Ordered vertex indices; the last vertex connects back to the first
    pub vertices: Vec<usize>,
}

impl BoundaryLoop {
    /// Number of edges (and vertices) in the loop.
    pub fn edge_count(&self) -> usize {
        self.vertices.len()
    }
}

/// Size class of a hole, which selects its fill strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HoleClass {
    Small,
    Medium,
    Large,
}

impl HoleClass {
    pub fn of(edge_count: usize) -> Self {
        if edge_count < SMALL_HOLE_EDGES {
            HoleClass::Small
        } else if edge_count <= LARGE_HOLE_EDGES {
            HoleClass::Medium
        } else {
            HoleClass::Large
        }
    }
}

/// Triangles produced by [`classify_and_fill_holes`] and what happened to each loop
#[derive(Debug, Clone, Default)]
pub struct HoleFilling {
    pub triangles: Vec<Face>,
    pub small: usize,
    pub medium: usize,
    pub large: usize,
    /// Fan triangles rejected as degenerate or already present
    pub skipped: usize,
}

/// Detect all closed boundary loops of a triangle set.
///
/// Tracing starts from the smallest unvisited boundary edge. At a vertex with
/// several unvisited boundary edges the one leading to the smallest vertex
/// index is followed. Chains that dead-end before returning to their start are
/// dropped.
pub fn detect_boundary_loops(triangles: &[Face]) -> Vec<BoundaryLoop> {
    boundary_loops_from_usage(&edge_usage(triangles))
}

/// [`detect_boundary_loops`] over precomputed per-edge triangle counts
pub fn boundary_loops_from_usage(usage: &HashMap<Edge, u32>) -> Vec<BoundaryLoop> {
    let mut boundary_edges: Vec<Edge> = usage
        .iter()
        .filter_map(|(&edge, &n)| (n == 1).then_some(edge))
        .collect();

    if boundary_edges.is_empty() {
        return Vec::new();
    }
    boundary_edges.sort_unstable();

    debug!(edges = boundary_edges.len(), "boundary edges found");

    let mut neighbors: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &(a, b) in &boundary_edges {
        neighbors.entry(a).or_default().push(b);
        neighbors.entry(b).or_default().push(a);
    }
    for list in neighbors.values_mut() {
        list.sort_unstable();
    }

    let mut visited: HashSet<Edge> = HashSet::with_capacity(boundary_edges.len());
    let mut loops = Vec::new();
    let mut dropped = 0;

    for &(start, first) in &boundary_edges {
        if !visited.insert((start, first)) {
            continue;
        }

        let mut vertices = vec![start];
        let mut current = first;
        let closed = loop {
            if current == start {
                break true;
            }
            vertices.push(current);

            let next = neighbors
                .get(&current)
                .and_then(|list| list.iter().copied().find(|&n| !visited.contains(&edge_key(current, n))));

            match next {
                Some(n) => {
                    visited.insert(edge_key(current, n));
                    current = n;
                }
                None => break false,
            }
        };

        if closed && vertices.len() >= 3 {
            loops.push(BoundaryLoop { vertices });
        } else {
            dropped += 1;
        }
    }

    if dropped > 0 {
        warn!(dropped, "boundary chains did not close");
    }
    info!(
        loops = loops.len(),
        largest = loops.iter().map(BoundaryLoop::edge_count).max().unwrap_or(0),
        "boundary loops detected"
    );

    loops
}

/// Fan triangles around the loop vertex at `center`
fn fan(boundary: &BoundaryLoop, center: usize) -> Vec<Face> {
    let n = boundary.vertices.len();
    let apex = boundary.vertices[center];
    (1..n - 1)
        .map(|i| {
            [
                apex,
                boundary.vertices[(center + i) % n],
                boundary.vertices[(center + i + 1) % n],
            ]
        })
        .collect()
}

/// Variance of the spoke lengths of a fan centered at loop position `center`
fn spoke_variance(points: &[Point3f], boundary: &BoundaryLoop, center: usize) -> f32 {
    let apex = points[boundary.vertices[center]];
    let lengths: Vec<f32> = boundary
        .vertices
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != center)
        .map(|(_, &v)| (points[v] - apex).norm())
        .collect();
    let n = lengths.len() as f32;
    let mean = lengths.iter().sum::<f32>() / n;
    lengths.iter().map(|l| (l - mean).powi(2)).sum::<f32>() / n
}

/// Loop position of the fan center for a hole
fn fan_center(points: &[Point3f], boundary: &BoundaryLoop) -> usize {
    let n = boundary.vertices.len();
    match HoleClass::of(n) {
        HoleClass::Small => 0,
        HoleClass::Medium => {
            let mut candidates: Vec<usize> = (0..FAN_CANDIDATES).map(|k| k * n / FAN_CANDIDATES).collect();
            candidates.dedup();
            candidates
                .into_iter()
                .map(|c| (c, spoke_variance(points, boundary, c)))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map_or(0, |(c, _)| c)
        }
        HoleClass::Large => {
            let sum = boundary
                .vertices
                .iter()
                .fold(Vector3f::zeros(), |acc, &v| acc + points[v].coords);
            let centroid = Point3f::from(sum / n as f32);
            boundary
                .vertices
                .iter()
                .enumerate()
                .min_by(|a, b| {
                    (points[*a.1] - centroid)
                        .norm_squared()
                        .total_cmp(&(points[*b.1] - centroid).norm_squared())
                })
                .map_or(0, |(i, _)| i)
        }
    }
}

/// Fill boundary loops with triangle fans.
///
/// * fewer than 10 edges: fan from the first loop vertex
/// * 10 to 50 edges: fan from whichever of several evenly spaced loop
///   vertices gives the most uniform spoke lengths
/// * more than 50 edges: fan from the loop vertex closest to the loop centroid
///
/// Triangles that are degenerate, or whose canonical key is in `existing` or
/// was already produced, are skipped.
pub fn classify_and_fill_holes(
    points: &[Point3f],
    loops: &[BoundaryLoop],
    existing: &HashSet<Face>,
    area_epsilon: f32,
) -> HoleFilling {
    let mut filling = HoleFilling::default();
    let mut added: HashSet<Face> = HashSet::new();

    for boundary in loops.iter().filter(|l| l.edge_count() >= 3) {
        match HoleClass::of(boundary.edge_count()) {
            HoleClass::Small => filling.small += 1,
            HoleClass::Medium => filling.medium += 1,
            HoleClass::Large => filling.large += 1,
        }

        let center = fan_center(points, boundary);
        for face in fan(boundary, center) {
            let key = canonical_face(&face);
            if check_triangle(points, &face, area_epsilon).is_err()
                || existing.contains(&key)
                || !added.insert(key)
            {
                filling.skipped += 1;
                continue;
            }
            filling.triangles.push(face);
        }
    }

    debug!(
        small = filling.small,
        medium = filling.medium,
        large = filling.large,
        triangles = filling.triangles.len(),
        skipped = filling.skipped,
        "holes filled"
    );

    filling
}
