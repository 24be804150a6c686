//! Connected component consolidation
//!
//! Candidate triangulation of a multi-frame scan tends to leave small
//! islands around the main surface. Each island close enough to the largest
//! component is stitched to it with a chain of bridging triangles running
//! through real sample points.

use crate::reconstructor::ReconstructionConfig;
use scanmesh_algorithms::SpatialIndex;
use scanmesh_core::{canonical_face, check_triangle, Face, NearestNeighborSearch, Point3f, Result};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info};

/// Outcome of [`consolidate_components`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Consolidation {
    pub initial_components: usize,
    pub final_components: usize,
    /// Islands a bridge was attempted for
    pub bridges: usize,
    pub triangles_added: usize,
}

/// Vertex-connected components of a triangle set, largest first.
///
/// Only vertices referenced by a triangle take part; ties in size are
/// ordered by smallest vertex index.
pub fn connected_components(vertex_count: usize, triangles: &[Face]) -> Vec<Vec<usize>> {
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); vertex_count];
    for face in triangles {
        for (a, b) in [(face[0], face[1]), (face[1], face[2]), (face[2], face[0])] {
            adjacency[a].push(b);
            adjacency[b].push(a);
        }
    }

    let mut visited = vec![false; vertex_count];
    let mut components = Vec::new();
    for seed in 0..vertex_count {
        if visited[seed] || adjacency[seed].is_empty() {
            continue;
        }
        visited[seed] = true;
        let mut component = Vec::new();
        let mut queue = VecDeque::from([seed]);
        while let Some(v) = queue.pop_front() {
            component.push(v);
            for &n in &adjacency[v] {
                if !visited[n] {
                    visited[n] = true;
                    queue.push_back(n);
                }
            }
        }
        component.sort_unstable();
        components.push(component);
    }

    components.sort_by(|a, b| b.len().cmp(&a.len()).then(a[0].cmp(&b[0])));
    components
}

/// At most `limit` evenly strided members of a component
fn sample_evenly(component: &[usize], limit: usize) -> impl Iterator<Item = usize> + '_ {
    let step = component.len().div_ceil(limit.max(1)).max(1);
    component.iter().copied().step_by(step)
}

/// Closest sampled `(island vertex, main vertex, distance)` pair
fn closest_pair(points: &[Point3f], island: &[usize], main: &[usize], limit: usize) -> Option<(usize, usize, f32)> {
    let main_samples: Vec<usize> = sample_evenly(main, limit).collect();
    sample_evenly(island, limit)
        .flat_map(|u| main_samples.iter().map(move |&v| (u, v)))
        .map(|(u, v)| (u, v, (points[u] - points[v]).norm()))
        .min_by(|a, b| a.2.total_cmp(&b.2))
}

/// Triangles linking `u` to `v` through intermediate real points
fn bridge(
    points: &[Point3f],
    index: &SpatialIndex,
    u: usize,
    v: usize,
    max_dist: f32,
    area_epsilon: f32,
    faces: &mut HashSet<Face>,
) -> Vec<Face> {
    let start = points[u];
    let span = points[v] - start;
    let steps = (span.norm() / max_dist).ceil().max(1.0) as usize;

    let mut chain = vec![u];
    for s in 1..steps {
        let target = start + span * (s as f32 / steps as f32);
        let mut nearby = index.find_radius_neighbors(&target, max_dist);
        nearby.sort_by(|a, b| a.1.total_cmp(&b.1));
        if let Some(&(w, _)) = nearby.iter().find(|(w, _)| *w != v && !chain.contains(w)) {
            chain.push(w);
        }
    }
    chain.push(v);

    let mut added = Vec::new();
    for link in chain.windows(2) {
        let (a, b) = (link[0], link[1]);
        let midpoint = nalgebra::center(&points[a], &points[b]);
        let radius = max_dist.max((points[a] - points[b]).norm());
        let mut apexes = index.find_radius_neighbors(&midpoint, radius);
        apexes.sort_by(|x, y| x.1.total_cmp(&y.1));

        let triangle = apexes
            .iter()
            .filter(|(w, _)| *w != a && *w != b)
            .map(|&(w, _)| [a, b, w])
            .find(|face| {
                check_triangle(points, face, area_epsilon).is_ok() && !faces.contains(&canonical_face(face))
            });
        if let Some(face) = triangle {
            faces.insert(canonical_face(&face));
            added.push(face);
        }
    }
    added
}

/// Merge islands into the largest component.
///
/// Each pass bridges every non-dominant component whose closest sampled
/// vertex pair to the largest component lies within
/// `bridge_search_factor * max_dist`. Passes repeat until a single component
/// remains or a pass fails to reduce the component count. New triangles are
/// appended to `triangles`.
pub fn consolidate_components(
    points: &[Point3f],
    triangles: &mut Vec<Face>,
    max_dist: f32,
    config: &ReconstructionConfig,
) -> Result<Consolidation> {
    let mut components = connected_components(points.len(), triangles);
    let mut report = Consolidation {
        initial_components: components.len(),
        final_components: components.len(),
        ..Default::default()
    };
    if components.len() <= 1 {
        return Ok(report);
    }

    let index = SpatialIndex::build(points, max_dist)?;
    let reach = config.bridge_search_factor * max_dist;
    let area_epsilon = config.area_epsilon(max_dist);
    let mut faces: HashSet<Face> = triangles.iter().map(canonical_face).collect();

    while components.len() > 1 {
        let before = components.len();
        let (main, islands) = components.split_at(1);

        for island in islands {
            let Some((u, v, distance)) = closest_pair(points, island, &main[0], config.bridge_sample_size) else {
                continue;
            };
            if distance > reach {
                continue;
            }
            let added = bridge(points, &index, u, v, max_dist, area_epsilon, &mut faces);
            debug!(island = island.len(), distance, triangles = added.len(), "bridging component");
            report.bridges += 1;
            report.triangles_added += added.len();
            triangles.extend(added);
        }

        components = connected_components(points.len(), triangles);
        if components.len() >= before {
            break;
        }
    }

    report.final_components = components.len();
    info!(
        initial = report.initial_components,
        remaining = report.final_components,
        bridges = report.bridges,
        triangles = report.triangles_added,
        "components consolidated"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::build_candidate_triangles;

    fn patch(origin_x: f32, n: usize, spacing: f32) -> Vec<Point3f> {
        (0..n * n)
            .map(|i| Point3f::new(origin_x + (i % n) as f32 * spacing, (i / n) as f32 * spacing, 1.0))
            .collect()
    }

    #[test]
    fn test_connected_components_ignores_isolated_vertices() {
        let components = connected_components(7, &[[0, 1, 2], [4, 5, 6], [5, 6, 3]]);
        assert_eq!(components, vec![vec![3, 4, 5, 6], vec![0, 1, 2]]);
    }

    #[test]
    fn test_single_component_untouched() {
        let points = patch(0.0, 6, 0.01);
        let config = ReconstructionConfig::default();
        let mut triangles = build_candidate_triangles(&points, 0.01, &config).unwrap().triangles;
        let count = triangles.len();
        let report = consolidate_components(&points, &mut triangles, 0.025, &config).unwrap();

        assert_eq!(report.initial_components, 1);
        assert_eq!(report.final_components, 1);
        assert_eq!(triangles.len(), count);
    }

    #[test]
    fn test_close_islands_merge() {
        let mut points = patch(0.0, 6, 0.01);
        points.extend(patch(0.1, 6, 0.01)); // 0.05 gap, within 4 * 0.025
        let config = ReconstructionConfig::default();
        let surface = build_candidate_triangles(&points, 0.01, &config).unwrap();
        let mut triangles = surface.triangles;

        assert_eq!(connected_components(points.len(), &triangles).len(), 2);
        let report = consolidate_components(&points, &mut triangles, surface.max_dist, &config).unwrap();

        assert_eq!(report.initial_components, 2);
        assert_eq!(report.final_components, 1);
        assert!(report.triangles_added > 0);
        assert_eq!(connected_components(points.len(), &triangles).len(), 1);

        let unique: HashSet<Face> = triangles.iter().map(canonical_face).collect();
        assert_eq!(unique.len(), triangles.len());
    }

    #[test]
    fn test_distant_island_stays_separate() {
        let mut points = patch(0.0, 6, 0.01);
        points.extend(patch(0.1, 6, 0.01));
        points.extend(patch(1.0, 6, 0.01)); // far beyond reach
        let config = ReconstructionConfig::default();
        let surface = build_candidate_triangles(&points, 0.01, &config).unwrap();
        let mut triangles = surface.triangles;

        let report = consolidate_components(&points, &mut triangles, surface.max_dist, &config).unwrap();
        assert_eq!(report.initial_components, 3);
        assert_eq!(report.final_components, 2);
    }

    #[test]
    fn test_sample_evenly_bounds() {
        let component: Vec<usize> = (0..1000).collect();
        assert_eq!(sample_evenly(&component, 200).count(), 200);
        assert_eq!(sample_evenly(&component[..50], 200).count(), 50);
    }
}
