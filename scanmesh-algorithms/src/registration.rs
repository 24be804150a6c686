//! Registration algorithms
//!
//! Point-to-point ICP aligning each incoming frame onto the accumulated
//! model. Each attempt walks the state machine
//! `Init → Correspond → Estimate → Apply → {Converged | MaxIterations}`,
//! leaving early with `InsufficientCorrespondences` when fewer than three
//! pairs fall inside the correspondence threshold. Rigid motion is solved in
//! closed form (Kabsch/SVD).

use crate::spatial_index::SpatialIndex;
use nalgebra::{Matrix3, Translation3, UnitQuaternion};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use scanmesh_core::{Error, Isometry3, Point3f, PointCloud, Positioned, Result, Transform3D, Transformable, Vector3f};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Minimum number of correspondences for a rigid estimate
pub const MIN_CORRESPONDENCES: usize = 3;

/// ICP parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcpConfig {
    /// Source and target are randomly subsampled to at most this many points
    pub max_points: usize,
    pub max_iterations: usize,
    /// Pairs farther apart than this are not correspondences
    pub max_correspondence_distance: f32,
    /// Converged once the mean correspondence error drops below this
    pub tolerance: f32,
    /// Attempts after the first, each from a perturbed start
    pub restarts: usize,
    /// Rotation (radians) applied to the start of a restart
    pub restart_perturbation: f32,
    /// Fixed seed for reproducible subsampling
    pub seed: Option<u64>,
}

impl Default for IcpConfig {
    fn default() -> Self {
        Self {
            max_points: 1000,
            max_iterations: 20,
            max_correspondence_distance: 0.1,
            tolerance: 0.001,
            restarts: 3,
            restart_perturbation: 0.02,
            seed: None,
        }
    }
}

impl IcpConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_points < MIN_CORRESPONDENCES {
            return Err(Error::InvalidData(format!(
                "max_points must be at least {}",
                MIN_CORRESPONDENCES
            )));
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidData("Max iterations must be positive".to_string()));
        }
        if !(self.max_correspondence_distance > 0.0) {
            return Err(Error::InvalidData(
                "max_correspondence_distance must be positive".to_string(),
            ));
        }
        if !(self.tolerance > 0.0) {
            return Err(Error::InvalidData("Convergence tolerance must be positive".to_string()));
        }
        Ok(())
    }
}

/// Steps of one ICP attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IcpState {
    Init,
    Correspond,
    Estimate,
    Apply,
    Converged,
    MaxIterations,
    InsufficientCorrespondences,
}

impl IcpState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            IcpState::Converged | IcpState::MaxIterations | IcpState::InsufficientCorrespondences
        )
    }
}

/// Result of ICP registration
#[derive(Debug, Clone, PartialEq)]
pub struct IcpResult {
    /// Transform taking source points onto the target
    pub transformation: Transform3D,
    /// Mean correspondence distance after the last applied step
    pub mean_error: f32,
    /// Mean nearest distance (clamped to the threshold) against the full target
    pub residual: f32,
    /// Iterations applied by the winning attempt
    pub iterations: usize,
    /// Terminal state of the winning attempt
    pub termination: IcpState,
    /// Attempts run, including the first
    pub attempts: usize,
    /// Correspondences used in the last applied step
    pub correspondences: usize,
    /// False when no attempt found enough correspondences; the transform is then identity
    pub aligned: bool,
}

impl IcpResult {
    fn unaligned(attempts: usize) -> Self {
        Self {
            transformation: Transform3D::identity(),
            mean_error: f32::INFINITY,
            residual: f32::INFINITY,
            iterations: 0,
            termination: IcpState::InsufficientCorrespondences,
            attempts,
            correspondences: 0,
            aligned: false,
        }
    }

    pub fn converged(&self) -> bool {
        self.termination == IcpState::Converged
    }
}

/// Best transform plus the fully transformed source set
#[derive(Debug, Clone)]
pub struct Registration<T> {
    pub result: IcpResult,
    pub points: Vec<T>,
}

impl<T> Registration<T> {
    pub fn aligned(&self) -> bool {
        self.result.aligned
    }
}

/// Outcome of a single attempt
#[derive(Debug, Clone)]
struct Attempt {
    transformation: Isometry3<f32>,
    mean_error: f32,
    iterations: usize,
    termination: IcpState,
    correspondences: usize,
}

/// ICP driver owning its configuration and random source
#[derive(Debug, Clone)]
pub struct Registrar {
    config: IcpConfig,
    rng: StdRng,
}

impl Registrar {
    pub fn new(config: IcpConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { config, rng }
    }

    pub fn config(&self) -> &IcpConfig {
        &self.config
    }

    /// Align `source` onto `target`.
    ///
    /// Never fails for lack of overlap: without three correspondences in any
    /// attempt the identity transform and the unmodified source come back with
    /// `aligned == false`. Only an invalid configuration is an error.
    pub fn register<T: Positioned + Send + Sync>(
        &mut self,
        source: &[T],
        target: &[Point3f],
    ) -> Result<Registration<T>> {
        self.config.validate()?;

        if source.len() < MIN_CORRESPONDENCES || target.len() < MIN_CORRESPONDENCES {
            warn!(
                source = source.len(),
                target = target.len(),
                "too few points to register, keeping frame as is"
            );
            return Ok(Registration {
                result: IcpResult::unaligned(0),
                points: source.to_vec(),
            });
        }

        let source_positions: Vec<Point3f> = source.iter().map(Positioned::position).collect();
        let threshold = self.config.max_correspondence_distance;
        let full_target = SpatialIndex::build(target, threshold)?;

        let mut best: Option<(Attempt, f32)> = None;
        let mut attempts = 0;

        for attempt in 0..=self.config.restarts {
            attempts += 1;
            let source_sample = self.subsample(&source_positions);
            let target_sample = self.subsample(target);
            let target_index = SpatialIndex::build(&target_sample, threshold)?;

            let init = if attempt == 0 {
                Isometry3::identity()
            } else {
                self.perturbation(&source_sample)
            };

            let outcome = self.run_attempt(&source_sample, &target_sample, &target_index, init)?;
            if outcome.iterations == 0 {
                debug!(attempt, "no correspondences at start");
                continue;
            }

            let residual = clamped_residual(&source_sample, &outcome.transformation, &full_target, threshold);
            debug!(
                attempt,
                iterations = outcome.iterations,
                termination = ?outcome.termination,
                mean_error = outcome.mean_error,
                residual,
                "icp attempt finished"
            );

            let converged = outcome.termination == IcpState::Converged;
            if best.as_ref().map_or(true, |(_, r)| residual < *r) {
                best = Some((outcome, residual));
            }
            if converged && residual < self.config.tolerance {
                break;
            }
        }

        let Some((winner, residual)) = best else {
            warn!(attempts, "registration found no correspondences, using identity");
            return Ok(Registration {
                result: IcpResult::unaligned(attempts),
                points: source.to_vec(),
            });
        };

        let result = IcpResult {
            transformation: winner.transformation.into(),
            mean_error: winner.mean_error,
            residual,
            iterations: winner.iterations,
            termination: winner.termination,
            attempts,
            correspondences: winner.correspondences,
            aligned: true,
        };
        info!(
            iterations = result.iterations,
            attempts,
            residual,
            termination = ?result.termination,
            "frame registered"
        );

        let mut aligned = PointCloud::from_points(source.to_vec());
        aligned.transform(&result.transformation);
        Ok(Registration {
            result,
            points: aligned.points,
        })
    }

    fn run_attempt(
        &self,
        source: &[Point3f],
        target: &[Point3f],
        target_index: &SpatialIndex,
        init: Isometry3<f32>,
    ) -> Result<Attempt> {
        let threshold = self.config.max_correspondence_distance;
        let mut state = IcpState::Init;
        let mut current = init;
        let mut moved: Vec<Point3f> = Vec::new();
        let mut pairs: Vec<(usize, usize)> = Vec::new();
        let mut delta = Isometry3::identity();
        let mut mean_error = f32::INFINITY;
        let mut iterations = 0;

        while !state.is_terminal() {
            state = match state {
                IcpState::Init => {
                    moved = source.iter().map(|p| current * p).collect();
                    IcpState::Correspond
                }
                IcpState::Correspond => {
                    pairs = find_correspondences(&moved, target_index, threshold);
                    if pairs.len() < MIN_CORRESPONDENCES {
                        IcpState::InsufficientCorrespondences
                    } else {
                        IcpState::Estimate
                    }
                }
                IcpState::Estimate => {
                    let (src, tgt): (Vec<Point3f>, Vec<Point3f>) =
                        pairs.iter().map(|&(s, t)| (moved[s], target[t])).unzip();
                    delta = estimate_rigid_transform(&src, &tgt)?;
                    IcpState::Apply
                }
                IcpState::Apply => {
                    current = delta * current;
                    moved.iter_mut().for_each(|p| *p = delta * *p);
                    iterations += 1;
                    mean_error = pairs
                        .iter()
                        .map(|&(s, t)| (moved[s] - target[t]).norm())
                        .sum::<f32>()
                        / pairs.len() as f32;

                    if mean_error < self.config.tolerance {
                        IcpState::Converged
                    } else if iterations >= self.config.max_iterations {
                        IcpState::MaxIterations
                    } else {
                        IcpState::Correspond
                    }
                }
                terminal => terminal,
            };
        }

        Ok(Attempt {
            transformation: current,
            mean_error,
            iterations,
            termination: state,
            correspondences: pairs.len(),
        })
    }

    fn subsample(&mut self, points: &[Point3f]) -> Vec<Point3f> {
        if points.len() <= self.config.max_points {
            return points.to_vec();
        }
        sample(&mut self.rng, points.len(), self.config.max_points)
            .into_iter()
            .map(|i| points[i])
            .collect()
    }

    /// Small random rotation about the sample centroid
    fn perturbation(&mut self, points: &[Point3f]) -> Isometry3<f32> {
        let axis = Vector3f::new(
            self.rng.gen_range(-1.0..1.0),
            self.rng.gen_range(-1.0..1.0),
            self.rng.gen_range(-1.0..1.0),
        );
        let Some(axis) = nalgebra::Unit::try_new(axis, 1e-6) else {
            return Isometry3::identity();
        };
        let angle = self.rng.gen_range(-1.0f32..=1.0) * self.config.restart_perturbation;
        Isometry3::rotation_wrt_point(UnitQuaternion::from_axis_angle(&axis, angle), centroid(points))
    }
}

fn centroid(points: &[Point3f]) -> Point3f {
    let sum = points.iter().fold(Vector3f::zeros(), |acc, p| acc + p.coords);
    Point3f::from(sum / points.len().max(1) as f32)
}

/// Nearest target within `max_distance` for each source point, as
/// `(source index, target index)` pairs
fn find_correspondences(
    source: &[Point3f],
    target: &SpatialIndex,
    max_distance: f32,
) -> Vec<(usize, usize)> {
    source
        .par_iter()
        .enumerate()
        .filter_map(|(i, p)| target.nearest_within(p, max_distance).map(|(j, _)| (i, j)))
        .collect()
}

/// Mean nearest distance from the transformed points to the target, with
/// unmatched points counted at `max_distance`
fn clamped_residual(
    points: &[Point3f],
    transform: &Isometry3<f32>,
    target: &SpatialIndex,
    max_distance: f32,
) -> f32 {
    if points.is_empty() {
        return f32::INFINITY;
    }
    let total: f32 = points
        .par_iter()
        .map(|p| {
            target
                .nearest_within(&(transform * p), max_distance)
                .map_or(max_distance, |(_, d)| d)
        })
        .sum();
    total / points.len() as f32
}

/// Optimal rigid transform mapping `source_points` onto paired `target_points`
/// (Kabsch)
pub fn estimate_rigid_transform(
    source_points: &[Point3f],
    target_points: &[Point3f],
) -> Result<Isometry3<f32>> {
    if source_points.len() != target_points.len() || source_points.is_empty() {
        return Err(Error::AlignmentFailure("Point correspondence mismatch".to_string()));
    }

    let source_centroid = centroid(source_points);
    let target_centroid = centroid(target_points);

    // Covariance matrix H
    let mut h = Matrix3::zeros();
    for (src, tgt) in source_points.iter().zip(target_points.iter()) {
        let p = src - source_centroid;
        let q = tgt - target_centroid;
        h += p * q.transpose();
    }

    let svd = h.svd(true, true);
    let u = svd.u.ok_or_else(|| Error::AlignmentFailure("SVD U matrix not available".to_string()))?;
    let v_t = svd.v_t.ok_or_else(|| Error::AlignmentFailure("SVD V^T matrix not available".to_string()))?;

    let mut r = v_t.transpose() * u.transpose();

    // Reflection: flip the axis of the smallest singular value
    if r.determinant() < 0.0 {
        let mut v_t_corrected = v_t;
        v_t_corrected.set_row(2, &(-v_t.row(2)));
        r = v_t_corrected.transpose() * u.transpose();
    }

    let rotation = UnitQuaternion::from_matrix(&r);
    let translation = target_centroid - rotation * source_centroid;

    Ok(Isometry3::from_parts(
        Translation3::new(translation.x, translation.y, translation.z),
        rotation,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use scanmesh_core::ScanPoint;

    /// Bumpy patch without symmetries that could trap point-to-point ICP
    fn surface_patch(n: usize, seed: u64) -> Vec<Point3f> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let x: f32 = rng.gen_range(-0.4..0.4);
                let y: f32 = rng.gen_range(-0.4..0.4);
                let z = 1.0 + 0.15 * (3.0 * x).sin() * (2.5 * y).cos() + 0.2 * x * x - 0.1 * y;
                Point3f::new(x, y, z)
            })
            .collect()
    }

    fn seeded(config: IcpConfig) -> Registrar {
        Registrar::new(IcpConfig { seed: Some(7), ..config })
    }

    #[test]
    fn test_default_config() {
        let config = IcpConfig::default();
        assert_eq!(config.max_points, 1000);
        assert_eq!(config.max_iterations, 20);
        assert_relative_eq!(config.max_correspondence_distance, 0.1);
        assert_relative_eq!(config.tolerance, 0.001);
        assert_eq!(config.restarts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let points = surface_patch(50, 1);
        let mut registrar = seeded(IcpConfig { max_iterations: 0, ..Default::default() });
        assert!(registrar.register(&points, &points).is_err());
        let mut registrar = seeded(IcpConfig { tolerance: -1.0, ..Default::default() });
        assert!(registrar.register(&points, &points).is_err());
    }

    #[test]
    fn test_identity_alignment() {
        let points = surface_patch(400, 2);
        let registration = seeded(IcpConfig::default()).register(&points, &points).unwrap();

        assert!(registration.aligned());
        assert!(registration.result.converged());
        assert_eq!(registration.result.iterations, 1);
        assert!(registration.result.residual < 1e-4);
    }

    #[test]
    fn test_recovers_small_rotation_and_translation() {
        let target = surface_patch(800, 3);
        let center = centroid(&target);
        let motion = Isometry3::from_parts(
            Translation3::new(0.02, 0.01, 0.0),
            UnitQuaternion::identity(),
        ) * Isometry3::rotation_wrt_point(
            UnitQuaternion::from_axis_angle(&Vector3f::z_axis(), 5f32.to_radians()),
            center,
        );
        let inverse = motion.inverse();
        let source: Vec<Point3f> = target.iter().map(|p| inverse * p).collect();

        let config = IcpConfig::default();
        let registration = seeded(config.clone()).register(&source, &target).unwrap();
        let result = &registration.result;

        assert!(result.converged(), "terminated with {:?}", result.termination);
        assert!(result.iterations <= config.max_iterations);
        assert!(result.residual < config.tolerance, "residual {}", result.residual);
        assert_relative_eq!(result.transformation.rotation_angle(), 5f32.to_radians(), epsilon = 5e-3);
        for (moved, expected) in registration.points.iter().zip(&target) {
            assert!((moved - expected).norm() < 1e-2);
        }
    }

    #[test]
    fn test_disjoint_sets_fall_back_to_identity() {
        let source = surface_patch(100, 4);
        let target: Vec<Point3f> = source.iter().map(|p| p + Vector3f::new(10.0, 0.0, 0.0)).collect();
        let registration = seeded(IcpConfig::default()).register(&source, &target).unwrap();

        assert!(!registration.aligned());
        assert_eq!(registration.result.transformation, Transform3D::identity());
        assert_eq!(registration.result.attempts, 4);
        assert_eq!(registration.points, source);
    }

    #[test]
    fn test_tiny_inputs_are_returned_unchanged() {
        let source = vec![Point3f::new(0.0, 0.0, 1.0)];
        let target = surface_patch(10, 5);
        let registration = seeded(IcpConfig::default()).register(&source, &target).unwrap();
        assert!(!registration.aligned());
        assert_eq!(registration.points, source);
    }

    #[test]
    fn test_register_keeps_point_attributes() {
        let target = surface_patch(300, 6);
        let source: Vec<ScanPoint> = target
            .iter()
            .map(|p| ScanPoint::with_color(p + Vector3f::new(0.01, 0.0, 0.0), [10, 20, 30]))
            .collect();
        let registration = seeded(IcpConfig::default()).register(&source, &target).unwrap();

        assert!(registration.aligned());
        assert!(registration.points.iter().all(|p| p.color == Some([10, 20, 30])));
        assert_relative_eq!(registration.result.transformation.translation_part().x, -0.01, epsilon = 1e-3);
    }

    #[test]
    fn test_subsampling_respects_max_points() {
        let points = surface_patch(500, 8);
        let mut registrar = seeded(IcpConfig { max_points: 100, ..Default::default() });
        let sample = registrar.subsample(&points);
        assert_eq!(sample.len(), 100);
        assert!(sample.iter().all(|p| points.contains(p)));
    }

    #[test]
    fn test_estimate_rigid_transform_exact() {
        let source = surface_patch(50, 9);
        let known = Isometry3::from_parts(
            Translation3::new(0.3, -0.2, 0.1),
            UnitQuaternion::from_euler_angles(0.1, -0.2, 0.3),
        );
        let target: Vec<Point3f> = source.iter().map(|p| known * p).collect();
        let estimated = estimate_rigid_transform(&source, &target).unwrap();

        for (s, t) in source.iter().zip(&target) {
            assert!((estimated * s - t).norm() < 1e-4);
        }
        assert!(estimate_rigid_transform(&source, &target[..10]).is_err());
        assert!(estimate_rigid_transform(&[], &[]).is_err());
    }

    #[test]
    fn test_state_terminals() {
        assert!(IcpState::Converged.is_terminal());
        assert!(IcpState::MaxIterations.is_terminal());
        assert!(IcpState::InsufficientCorrespondences.is_terminal());
        assert!(!IcpState::Correspond.is_terminal());
    }
}
