//! Incremental volumetric fusion
//!
//! A truncated signed distance field over a bounded cube, stored sparsely:
//! only voxels touched by an observation are materialized, keyed by
//! [`GridKey`]. The sensor sits at the world origin looking along +z, so the
//! observed distance of a point is its z coordinate.

use rayon::prelude::*;
use scanmesh_core::{Error, Face, GridKey, Point3f, Result, ScanPoint, TriangleMesh, Vector3f};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Forward offset pairs spanning the three axis-aligned planes
const PLANE_OFFSETS: [([i32; 3], [i32; 3]); 3] = [
    ([1, 0, 0], [0, 1, 0]),
    ([0, 1, 0], [0, 0, 1]),
    ([1, 0, 0], [0, 0, 1]),
];

/// Configuration for [`VolumetricFusion`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Center of the working cube
    pub volume_center: Point3f,
    /// Edge length of the working cube
    pub volume_size: f32,
    /// Voxels per cube edge
    pub resolution: u32,
    /// Half-width of the band integrated around each observation
    pub truncation_distance: f32,
    /// Voxels sampled along each viewing ray
    pub samples_per_ray: usize,
    /// Only every n-th point of a frame is integrated
    pub point_stride: usize,
    /// Cap on the accumulated weight of a voxel
    pub max_weight: f32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            volume_center: Point3f::origin(),
            volume_size: 3.0,
            resolution: 256,
            truncation_distance: 0.03,
            samples_per_ray: 5,
            point_stride: 2,
            max_weight: 255.0,
        }
    }
}

impl FusionConfig {
    pub fn voxel_size(&self) -> f32 {
        self.volume_size / self.resolution as f32
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.volume_size > 0.0) || self.resolution == 0 {
            return Err(Error::InvalidData("fusion volume must have positive size and resolution".to_string()));
        }
        if self.samples_per_ray == 0 || self.point_stride == 0 {
            return Err(Error::InvalidData("samples_per_ray and point_stride must be positive".to_string()));
        }
        if !(self.max_weight >= 1.0) {
            return Err(Error::InvalidData("max_weight must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Running averages stored per materialized voxel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Voxel {
    /// Truncated signed distance, positive in front of the surface
    pub distance: f32,
    pub weight: f32,
    pub color: [f32; 3],
}

impl Voxel {
    /// Fold one observation into the running averages
    fn fold(&mut self, distance: f32, color: [f32; 3], max_weight: f32) {
        let total = self.weight + 1.0;
        self.distance = (self.distance * self.weight + distance) / total;
        for (c, o) in self.color.iter_mut().zip(color) {
            *c = (*c * self.weight + o) / total;
        }
        self.weight = total.min(max_weight);
    }

    pub fn color_u8(&self) -> [u8; 3] {
        self.color.map(|c| c.round().clamp(0.0, 255.0) as u8)
    }
}

impl Default for Voxel {
    fn default() -> Self {
        Self {
            distance: 0.0,
            weight: 0.0,
            color: [0.0; 3],
        }
    }
}

/// Counters reported by [`VolumetricFusion::integrate_frame`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationStats {
    /// Points selected by the stride
    pub sampled_points: usize,
    /// Points skipped as non-finite or behind the sensor
    pub rejected_points: usize,
    /// Ray samples folded into a voxel
    pub integrated_samples: usize,
    /// Ray samples falling outside the working volume
    pub skipped_out_of_range: usize,
    /// Voxels materialized by this frame
    pub voxels_created: usize,
}

/// One ray sample ready to be folded
struct Sample {
    key: GridKey,
    distance: f32,
    color: [f32; 3],
}

/// Sparse truncated signed distance volume
#[derive(Debug, Clone)]
pub struct VolumetricFusion {
    config: FusionConfig,
    voxels: HashMap<GridKey, Voxel>,
    frame_count: usize,
    /// Truncation used by the most recent integration
    truncation: f32,
}

impl VolumetricFusion {
    pub fn new(config: FusionConfig) -> Result<Self> {
        config.validate()?;
        let truncation = config.truncation_distance;
        Ok(Self {
            config,
            voxels: HashMap::new(),
            frame_count: 0,
            truncation,
        })
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn voxel_size(&self) -> f32 {
        self.config.voxel_size()
    }

    pub fn voxel_count(&self) -> usize {
        self.voxels.len()
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn voxel(&self, key: GridKey) -> Option<&Voxel> {
        self.voxels.get(&key)
    }

    /// Drop every voxel and the frame counter
    pub fn reset(&mut self) {
        self.voxels.clear();
        self.frame_count = 0;
        self.truncation = self.config.truncation_distance;
    }

    fn volume_min(&self) -> Point3f {
        self.config.volume_center - Vector3f::repeat(self.config.volume_size * 0.5)
    }

    /// Key of the voxel containing `position`, or `FusionOutOfRange`
    pub fn voxel_key(&self, position: &Point3f) -> Result<GridKey> {
        let local = (position - self.volume_min()) / self.voxel_size();
        let resolution = self.config.resolution as f32;
        if local.iter().any(|c| !c.is_finite() || *c < 0.0 || *c >= resolution) {
            return Err(Error::FusionOutOfRange(format!(
                "({:.3}, {:.3}, {:.3}) lies outside the fusion volume",
                position.x, position.y, position.z
            )));
        }
        Ok(GridKey::new(
            local.x.floor() as i32,
            local.y.floor() as i32,
            local.z.floor() as i32,
        ))
    }

    /// World-space center of a voxel
    pub fn voxel_center(&self, key: GridKey) -> Point3f {
        let [x, y, z] = key.coords();
        let size = self.voxel_size();
        self.volume_min() + Vector3f::new(x as f32 + 0.5, y as f32 + 0.5, z as f32 + 0.5) * size
    }

    /// Ray samples for one observed point. A point behind the sensor or with
    /// non-finite coordinates is `FusionOutOfRange`; samples leaving the
    /// volume are counted in the second return value.
    fn ray_samples(&self, point: &ScanPoint, truncation: f32) -> Result<(Vec<Sample>, usize)> {
        let observed = point.position.z;
        if !point.is_finite() || observed <= 0.0 {
            return Err(Error::FusionOutOfRange(format!(
                "point at depth {} is not in front of the sensor",
                observed
            )));
        }

        let color = point.color_or_default().map(f32::from);
        let n = self.config.samples_per_ray;
        let step = if n > 1 { 2.0 * truncation / (n - 1) as f32 } else { 0.0 };

        let mut samples = Vec::with_capacity(n);
        let mut skipped = 0;
        for i in 0..n {
            let depth = if n > 1 { observed - truncation + step * i as f32 } else { observed };
            if depth <= 0.0 {
                skipped += 1;
                continue;
            }
            // point on the viewing ray at the sampled depth
            let position = Point3f::from(point.position.coords * (depth / observed));
            let key = match self.voxel_key(&position) {
                Ok(key) => key,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            };
            let voxel_depth = self.voxel_center(key).z;
            let distance = (observed - voxel_depth).clamp(-truncation, truncation);
            samples.push(Sample { key, distance, color });
        }
        Ok((samples, skipped))
    }

    /// Integrate one observed point; returns the number of samples folded
    pub fn integrate_point(&mut self, point: &ScanPoint, truncation_distance: f32) -> Result<usize> {
        let (samples, _) = self.ray_samples(point, truncation_distance)?;
        let max_weight = self.config.max_weight;
        for sample in &samples {
            self.voxels
                .entry(sample.key)
                .or_default()
                .fold(sample.distance, sample.color, max_weight);
        }
        Ok(samples.len())
    }

    /// Fuse a frame into the volume.
    ///
    /// Every `point_stride`-th point is cast; out-of-range points and samples
    /// are counted and skipped, never fatal.
    pub fn integrate_frame(&mut self, points: &[ScanPoint], truncation_distance: f32) -> Result<IntegrationStats> {
        if !(truncation_distance > 0.0) {
            return Err(Error::InvalidData("truncation distance must be positive".to_string()));
        }

        let casts: Vec<Result<(Vec<Sample>, usize)>> = points
            .par_iter()
            .step_by(self.config.point_stride)
            .map(|p| self.ray_samples(p, truncation_distance))
            .collect();

        let mut stats = IntegrationStats {
            sampled_points: casts.len(),
            ..Default::default()
        };
        let before = self.voxels.len();
        let max_weight = self.config.max_weight;

        for cast in casts {
            match cast {
                Ok((samples, skipped)) => {
                    stats.skipped_out_of_range += skipped;
                    stats.integrated_samples += samples.len();
                    for sample in samples {
                        self.voxels
                            .entry(sample.key)
                            .or_default()
                            .fold(sample.distance, sample.color, max_weight);
                    }
                }
                Err(_) => stats.rejected_points += 1,
            }
        }

        stats.voxels_created = self.voxels.len() - before;
        self.frame_count += 1;
        self.truncation = truncation_distance;
        debug!(frame = self.frame_count, voxels = self.voxels.len(), ?stats, "frame fused");
        Ok(stats)
    }

    /// Simplified isosurface extraction.
    ///
    /// This is not marching cubes: every voxel with `|distance|` below half the
    /// truncation distance becomes one vertex at its center, and triangles join
    /// it to materialized near-surface neighbors at fixed forward offsets in
    /// each axis plane. The result is a dense shell of small right triangles,
    /// not a watertight isosurface.
    pub fn extract_surface(&self) -> TriangleMesh {
        let threshold = self.truncation * 0.5;
        let mut surface: Vec<(GridKey, &Voxel)> = self
            .voxels
            .iter()
            .filter(|(_, v)| v.weight > 0.0 && v.distance.abs() < threshold)
            .map(|(k, v)| (*k, v))
            .collect();
        surface.sort_unstable_by_key(|(k, _)| *k);

        let index: HashMap<GridKey, usize> = surface
            .iter()
            .enumerate()
            .map(|(i, (k, _))| (*k, i))
            .collect();

        let faces: Vec<Face> = surface
            .par_iter()
            .enumerate()
            .flat_map_iter(|(i, (key, _))| {
                let mut faces = Vec::new();
                for (a, b) in PLANE_OFFSETS {
                    let along_a = index.get(&key.offset(a[0], a[1], a[2]));
                    let diagonal = index.get(&key.offset(a[0] + b[0], a[1] + b[1], a[2] + b[2]));
                    let along_b = index.get(&key.offset(b[0], b[1], b[2]));
                    if let (Some(&j), Some(&k)) = (along_a, diagonal) {
                        faces.push([i, j, k]);
                    }
                    if let (Some(&k), Some(&l)) = (diagonal, along_b) {
                        faces.push([i, k, l]);
                    }
                }
                faces
            })
            .collect();

        let vertices = surface.iter().map(|(k, _)| self.voxel_center(*k)).collect();
        let colors = surface.iter().map(|(_, v)| v.color_u8()).collect();

        let mut mesh = TriangleMesh::from_vertices_and_faces(vertices, faces);
        mesh.set_colors(colors);
        mesh.compute_vertex_normals();
        debug!(
            vertices = mesh.vertex_count(),
            triangles = mesh.face_count(),
            "surface extracted"
        );
        mesh
    }
}
