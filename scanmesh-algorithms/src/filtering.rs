//! Per-frame denoising filters

use crate::density::estimate_density;
use crate::spatial_index::SpatialIndex;
use rayon::prelude::*;
use scanmesh_core::{Error, Frame, NearestNeighborSearch, Point3f, PointCloud, Positioned, Result, ScanPoint};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Fraction of points statistical removal may drop before it gives up
pub const MAX_REMOVAL_FRACTION: f32 = 0.9;

/// Relative spread below which a cloud has no statistical outliers
const UNIFORM_SPREAD: f32 = 1e-4;

/// Radius outlier removal filter
/// 
/// Keeps points that have at least `min_neighbors` other points within
/// `radius`. The neighbor count uses an exact radius query, so a point that
/// satisfies the criterion in the input is never removed.
/// 
/// # Example
/// ```rust
/// use scanmesh_core::{PointCloud, Point3f};
/// use scanmesh_algorithms::radius_outlier_removal;
/// 
/// fn main() -> scanmesh_core::Result<()> {
///     let cloud = PointCloud::from_points(vec![
///         Point3f::new(0.0, 0.0, 0.0),
///         Point3f::new(0.1, 0.0, 0.0),
///         Point3f::new(0.0, 0.1, 0.0),
///         Point3f::new(10.0, 10.0, 10.0), // outlier
///     ]);
/// 
///     let filtered = radius_outlier_removal(&cloud, 0.5, 2)?;
///     assert_eq!(filtered.len(), 3);
///     Ok(())
/// }
/// ```
pub fn radius_outlier_removal<T: Positioned + Send + Sync>(
    cloud: &PointCloud<T>,
    radius: f32,
    min_neighbors: usize,
) -> Result<PointCloud<T>> {
    if cloud.is_empty() {
        return Ok(PointCloud::new());
    }

    if !(radius > 0.0) {
        return Err(Error::InvalidData("radius must be positive".to_string()));
    }

    if min_neighbors == 0 {
        return Err(Error::InvalidData(
            "min_neighbors must be greater than 0".to_string(),
        ));
    }

    let positions = cloud.positions();
    let index = SpatialIndex::build(&positions, radius)?;

    let keep: Vec<bool> = positions
        .par_iter()
        .enumerate()
        .map(|(i, point)| {
            index
                .find_radius_neighbors(point, radius)
                .iter()
                .filter(|(j, _)| *j != i)
                .count()
                >= min_neighbors
        })
        .collect();

    let filtered = cloud.retain_mask(&keep);
    debug!(
        input = cloud.len(),
        kept = filtered.len(),
        radius,
        min_neighbors,
        "radius outlier removal"
    );
    Ok(filtered)
}

/// Statistical outlier removal filter
/// 
/// For each point, computes the mean distance to its k nearest neighbors.
/// Points whose mean exceeds `global_mean + std_dev_multiplier * global_std`
/// are removed. Neighbor search runs on a [`SpatialIndex`] sized from the
/// estimated density; neighbors missing within its search horizon count as
/// lying on the horizon.
///
/// Clouds with uniform spacing are returned unchanged, and so is the input
/// when more than 90% of it would be rejected.
/// 
/// # Example
/// ```rust
/// use scanmesh_core::{PointCloud, Point3f};
/// use scanmesh_algorithms::statistical_outlier_removal;
/// 
/// fn main() -> scanmesh_core::Result<()> {
///     let mut points = Vec::new();
///     for i in 0..10 {
///         for j in 0..10 {
///             points.push(Point3f::new(i as f32 * 0.1, j as f32 * 0.1, 0.0));
///         }
///     }
///     points.push(Point3f::new(10.0, 10.0, 10.0)); // outlier
///
///     let filtered = statistical_outlier_removal(&PointCloud::from_points(points), 4, 1.0)?;
///     assert!(filtered.iter().all(|p| p.x < 5.0));
///     Ok(())
/// }
/// ```
pub fn statistical_outlier_removal<T: Positioned + Send + Sync>(
    cloud: &PointCloud<T>,
    k_neighbors: usize,
    std_dev_multiplier: f32,
) -> Result<PointCloud<T>> {
    if cloud.is_empty() {
        return Ok(PointCloud::new());
    }
    
    if k_neighbors == 0 {
        return Err(Error::InvalidData(
            "k_neighbors must be greater than 0".to_string()
        ));
    }
    
    if !(std_dev_multiplier > 0.0) {
        return Err(Error::InvalidData(
            "std_dev_multiplier must be positive".to_string()
        ));
    }

    let positions = cloud.positions();
    let k = k_neighbors.min(positions.len().saturating_sub(1));
    let Some(cell_size) = estimate_density(&positions, k) else {
        return Ok(cloud.clone());
    };
    let index = SpatialIndex::build(&positions, cell_size)?;
    let horizon = index.search_horizon();

    let mean_distances = mean_neighbor_distances(&index, &positions, k, horizon);

    let n = mean_distances.len() as f32;
    let global_mean = mean_distances.iter().sum::<f32>() / n;
    let variance = mean_distances
        .iter()
        .map(|&d| (d - global_mean).powi(2))
        .sum::<f32>() / n;
    let global_std_dev = variance.sqrt();

    if global_std_dev <= global_mean * UNIFORM_SPREAD {
        debug!(points = positions.len(), "uniform spacing, no statistical outliers");
        return Ok(cloud.clone());
    }

    let threshold = global_mean + std_dev_multiplier * global_std_dev;
    let keep: Vec<bool> = mean_distances.iter().map(|&d| d <= threshold).collect();
    let kept = keep.iter().filter(|&&k| k).count();
    let removed = positions.len() - kept;

    if removed as f32 > MAX_REMOVAL_FRACTION * positions.len() as f32 {
        warn!(
            removed,
            total = positions.len(),
            "statistical outlier removal would discard too much, keeping input"
        );
        return Ok(cloud.clone());
    }

    debug!(
        input = positions.len(),
        removed,
        threshold,
        "statistical outlier removal"
    );
    Ok(cloud.retain_mask(&keep))
}

fn mean_neighbor_distances(
    index: &SpatialIndex,
    positions: &[Point3f],
    k: usize,
    horizon: f32,
) -> Vec<f32> {
    positions
        .par_iter()
        .enumerate()
        .map(|(i, point)| {
            if k == 0 {
                return 0.0;
            }
            let found: Vec<f32> = index
                .find_k_nearest(point, k + 1)
                .into_iter()
                .filter(|(j, _)| *j != i)
                .take(k)
                .map(|(_, d)| d)
                .collect();
            let missing = k - found.len();
            (found.iter().sum::<f32>() + missing as f32 * horizon) / k as f32
        })
        .collect()
}

/// Keep points whose sensor-axis (z) distance lies in `[min_depth, max_depth]`.
/// Non-finite points are dropped as well.
pub fn depth_range_gate<T: Positioned>(
    cloud: &PointCloud<T>,
    min_depth: f32,
    max_depth: f32,
) -> Result<PointCloud<T>> {
    if !(min_depth <= max_depth) {
        return Err(Error::InvalidData(format!(
            "depth range [{}, {}] is empty",
            min_depth, max_depth
        )));
    }

    Ok(cloud
        .iter()
        .filter(|p| {
            let position = p.position();
            position.coords.iter().all(|c| c.is_finite())
                && position.z >= min_depth
                && position.z <= max_depth
        })
        .copied()
        .collect())
}

/// Parameters of [`statistical_outlier_removal`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatisticalParams {
    pub k_neighbors: usize,
    pub std_dev_multiplier: f32,
}

impl Default for StatisticalParams {
    fn default() -> Self {
        Self {
            k_neighbors: 8,
            std_dev_multiplier: 1.0,
        }
    }
}

/// Parameters of [`radius_outlier_removal`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadiusParams {
    pub radius: f32,
    pub min_neighbors: usize,
}

impl Default for RadiusParams {
    fn default() -> Self {
        Self {
            radius: 0.05,
            min_neighbors: 2,
        }
    }
}

/// Configuration for [`FrameFilter`]; a disabled stage is `None`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Accepted sensor-axis depth range
    pub depth_range: Option<(f32, f32)>,
    pub statistical: Option<StatisticalParams>,
    pub radius: Option<RadiusParams>,
    /// Derive the radius stage's search radius from the frame's density
    pub adaptive: bool,
    /// Radius = factor × median distance to the `min_neighbors`-th neighbor
    pub adaptive_radius_factor: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            depth_range: Some((0.05, 5.0)),
            statistical: Some(StatisticalParams::default()),
            radius: Some(RadiusParams::default()),
            adaptive: true,
            adaptive_radius_factor: 2.0,
        }
    }
}

/// Point counts after each filter stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterReport {
    pub input: usize,
    pub after_depth_gate: usize,
    pub after_statistical: usize,
    pub after_radius: usize,
}

impl FilterReport {
    /// Total number of points rejected
    pub fn removed(&self) -> usize {
        self.input - self.after_radius
    }
}

/// Filtered frame contents plus the per-stage report
#[derive(Debug, Clone)]
pub struct FilteredFrame {
    pub points: Vec<ScanPoint>,
    pub report: FilterReport,
}

/// Runs depth gating, statistical and radius outlier removal on a frame
#[derive(Debug, Clone, Default)]
pub struct FrameFilter {
    config: FilterConfig,
}

impl FrameFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Filter a sensor frame
    pub fn apply(&self, frame: &Frame) -> Result<FilteredFrame> {
        self.filter_points(PointCloud::from_points(frame.points.clone()))
    }

    /// Filter an arbitrary set of scan points
    pub fn filter_points(&self, cloud: PointCloud<ScanPoint>) -> Result<FilteredFrame> {
        let mut report = FilterReport {
            input: cloud.len(),
            ..Default::default()
        };

        let cloud = match self.config.depth_range {
            Some((min, max)) => depth_range_gate(&cloud, min, max)?,
            None => cloud,
        };
        report.after_depth_gate = cloud.len();

        let cloud = match self.config.statistical {
            Some(params) => {
                statistical_outlier_removal(&cloud, params.k_neighbors, params.std_dev_multiplier)?
            }
            None => cloud,
        };
        report.after_statistical = cloud.len();

        let cloud = match self.radius_params(&cloud) {
            Some(params) => radius_outlier_removal(&cloud, params.radius, params.min_neighbors)?,
            None => cloud,
        };
        report.after_radius = cloud.len();

        debug!(?report, "frame filtered");
        Ok(FilteredFrame {
            points: cloud.points,
            report,
        })
    }

    /// Radius stage parameters, adapted to the cloud's density when enabled
    pub fn radius_params(&self, cloud: &PointCloud<ScanPoint>) -> Option<RadiusParams> {
        let params = self.config.radius?;
        if !self.config.adaptive {
            return Some(params);
        }
        match estimate_density(&cloud.points, params.min_neighbors) {
            Some(spacing) => Some(RadiusParams {
                radius: spacing * self.config.adaptive_radius_factor,
                ..params
            }),
            None => Some(params),
        }
    }
}
