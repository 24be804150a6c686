//! Point density estimation
//!
//! Filters and reconstruction size their search structures from the local
//! sampling density of the data rather than from fixed constants.

use crate::spatial_index::SpatialIndex;
use itertools::Itertools;
use rayon::prelude::*;
use scanmesh_core::{NearestNeighborSearch, Point3f, Positioned, ScanPoint};
use serde::{Deserialize, Serialize};

/// Number of probe points used by [`estimate_density`]
pub const DENSITY_SAMPLE_SIZE: usize = 64;

/// Ratio between suggested reconstruction radius and mean spacing
pub const SUGGESTED_RADIUS_FACTOR: f32 = 1.5;

/// Candidates fetched per point when looking for its nearest distinct neighbor
const NEAREST_PROBE: usize = 4;

/// Points closer than this are treated as one sample
pub const COINCIDENT_DISTANCE: f32 = 1e-5;

/// Integer cell of `COINCIDENT_DISTANCE` size containing a position
fn coincident_key(p: &Point3f) -> [i64; 3] {
    [p.x, p.y, p.z].map(|c| (c / COINCIDENT_DISTANCE).floor() as i64)
}

/// Drop points that repeat an earlier point's position (to within
/// [`COINCIDENT_DISTANCE`]), keeping the first occurrence.
///
/// A stationary sensor produces the same samples frame after frame.
pub fn dedup_coincident<T: Positioned>(points: &[T]) -> Vec<T> {
    points
        .iter()
        .copied()
        .unique_by(|p| coincident_key(&p.position()))
        .collect()
}

/// Median distance from a probe point to its k-th nearest neighbor.
///
/// Probes at most [`DENSITY_SAMPLE_SIZE`] evenly strided points against the
/// whole set. Coincident neighbors are skipped, and a probe with fewer than
/// `k` distinct neighbors uses its farthest one. Returns `None` with fewer
/// than two points or when all points coincide.
pub fn estimate_density<T: Positioned + Sync>(points: &[T], k: usize) -> Option<f32> {
    let n = points.len();
    if n < 2 {
        return None;
    }
    let k = k.clamp(1, n - 1);
    let step = (n / DENSITY_SAMPLE_SIZE).max(1);

    let mut kth: Vec<f32> = (0..n)
        .step_by(step)
        .take(DENSITY_SAMPLE_SIZE)
        .collect::<Vec<_>>()
        .into_par_iter()
        .filter_map(|probe| {
            let origin = points[probe].position();
            let mut distances: Vec<f32> = points
                .iter()
                .map(|p| (p.position() - origin).norm())
                .filter(|&d| d > COINCIDENT_DISTANCE)
                .collect();
            if distances.is_empty() {
                return None;
            }
            let nth = (k - 1).min(distances.len() - 1);
            let (_, nth, _) = distances.select_nth_unstable_by(nth, |a, b| a.total_cmp(b));
            Some(*nth)
        })
        .collect();
    if kth.is_empty() {
        return None;
    }

    let mid = kth.len() / 2;
    let (_, median, _) = kth.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    let median = *median;
    (median > 0.0 && median.is_finite()).then_some(median)
}

/// Summary statistics of a point set, used to pick reconstruction radii
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointStatistics {
    pub num_points: usize,
    /// Mean distance from a point to its nearest neighbor
    pub avg_point_distance: f32,
    /// `avg_point_distance * 1.5`
    pub suggested_radius: f32,
    pub has_colors: bool,
}

/// Compute [`PointStatistics`]; `None` when the density cannot be estimated.
///
/// Spacing is measured between distinct positions, so repeated samples of the
/// same spot do not shrink it.
pub fn point_statistics(points: &[ScanPoint]) -> Option<PointStatistics> {
    let positions: Vec<Point3f> = dedup_coincident(points).iter().map(|p| p.position).collect();
    let cell = estimate_density(&positions, 1)?;
    let index = SpatialIndex::build(&positions, cell).ok()?;

    let nearest: Vec<f32> = positions
        .par_iter()
        .filter_map(|p| {
            index
                .find_k_nearest(p, NEAREST_PROBE)
                .into_iter()
                .map(|(_, d)| d)
                .find(|&d| d > COINCIDENT_DISTANCE)
        })
        .collect();
    if nearest.is_empty() {
        return None;
    }

    let avg_point_distance = nearest.iter().sum::<f32>() / nearest.len() as f32;
    Some(PointStatistics {
        num_points: points.len(),
        avg_point_distance,
        suggested_radius: avg_point_distance * SUGGESTED_RADIUS_FACTOR,
        has_colors: points.iter().any(|p| p.color.is_some()),
    })
}
