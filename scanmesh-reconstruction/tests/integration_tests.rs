//! Integration tests for scanmesh-reconstruction
//!
//! These tests run frames through filtering, reconstruction, fusion and the
//! scan session together.

use nalgebra::Point3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scanmesh_algorithms::{point_statistics, FrameFilter, IcpConfig};
use scanmesh_core::{canonical_face, check_triangle, Error, Frame, Point3f, ScanPoint};
use scanmesh_reconstruction::*;
use std::collections::HashSet;

fn center() -> Point3f {
    Point3::new(0.0, 0.0, 1.0)
}
const RADIUS: f32 = 0.3;

/// Camera-facing hemisphere of `surface` points plus `outliers` pushed
/// radially 0.25 to 0.5 off the surface
fn hemisphere_frame(rng: &mut StdRng, surface: usize, outliers: usize, timestamp: f64) -> Frame {
    let mut points = Vec::with_capacity(surface + outliers);
    for i in 0..surface + outliers {
        let z: f32 = rng.gen_range(-1.0f32..=0.0);
        let phi: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
        let r = (1.0 - z * z).sqrt();
        let direction = nalgebra::Vector3::new(r * phi.cos(), r * phi.sin(), z);
        let distance = if i < surface {
            RADIUS
        } else {
            RADIUS + rng.gen_range(0.25f32..=0.5)
        };
        points.push(ScanPoint::with_color(center() + direction * distance, [180, 170, 160]));
    }
    Frame::new(points, timestamp)
}

fn is_outlier(p: &Point3f) -> bool {
    ((p - center()).norm() - RADIUS).abs() > 0.1
}

fn flat_patch(origin_x: f32, n: usize, spacing: f32) -> Vec<ScanPoint> {
    (0..n * n)
        .map(|i| ScanPoint::new(origin_x + (i % n) as f32 * spacing, (i / n) as f32 * spacing, 1.0))
        .collect()
}

#[test]
fn test_hemisphere_frames_to_mesh() {
    let mut rng = StdRng::seed_from_u64(42);
    let filter = FrameFilter::default();

    let mut merged = Vec::new();
    for i in 0..50 {
        let frame = hemisphere_frame(&mut rng, 120, 12, i as f64 / 30.0);
        let filtered = filter.apply(&frame).unwrap();
        assert!(filtered.report.removed() >= 1, "frame {} kept every outlier", i);
        merged.extend(filtered.points);
    }

    let stats = point_statistics(&merged).unwrap();
    assert!(stats.has_colors);
    let result = SurfaceReconstructor::default()
        .reconstruct(&merged, stats.avg_point_distance)
        .unwrap();
    let mesh = &result.mesh;

    let n = merged.len();
    assert!(mesh.face_count() >= n / 10, "{} triangles for {} points", mesh.face_count(), n);
    assert!(mesh.face_count() <= 20 * n, "{} triangles for {} points", mesh.face_count(), n);

    let referenced = mesh.referenced_vertices();
    assert!(!referenced.is_empty());
    let outliers = referenced.iter().filter(|&&v| is_outlier(&mesh.vertices[v])).count();
    assert!(
        (outliers as f32) < 0.02 * referenced.len() as f32,
        "{} of {} referenced vertices are outliers",
        outliers,
        referenced.len()
    );
}

#[test]
fn test_reconstructed_triangles_are_valid_and_unique() {
    let mut rng = StdRng::seed_from_u64(7);
    let points: Vec<ScanPoint> = (0..600)
        .map(|_| {
            let x: f32 = rng.gen_range(0.0..0.3);
            let y: f32 = rng.gen_range(0.0..0.3);
            ScanPoint::new(x, y, 1.0 + 0.1 * x * y)
        })
        .collect();
    let resolution = point_statistics(&points).unwrap().avg_point_distance;
    let result = SurfaceReconstructor::default().reconstruct(&points, resolution).unwrap();
    let mesh = &result.mesh;

    let epsilon = ReconstructionConfig::default().area_epsilon(result.report.max_dist);
    let mut seen = HashSet::new();
    for face in &mesh.faces {
        assert!(check_triangle(&mesh.vertices, face, epsilon).is_ok(), "bad face {:?}", face);
        assert!(seen.insert(canonical_face(face)), "duplicate face {:?}", face);
    }
    assert!(mesh.validate().is_ok());
}

#[test]
fn test_nearby_islands_are_bridged() {
    let mut points = flat_patch(0.0, 8, 0.01);
    points.extend(flat_patch(0.12, 8, 0.01));

    let result = SurfaceReconstructor::default().reconstruct(&points, 0.01).unwrap();
    let consolidation = &result.report.consolidation;
    assert_eq!(consolidation.initial_components, 2);
    assert_eq!(consolidation.final_components, 1);
    assert!(consolidation.triangles_added > 0);

    let components = connected_components(result.mesh.vertex_count(), &result.mesh.faces);
    assert_eq!(components.len(), 1);
}

#[test]
fn test_fusion_of_flat_square() {
    let mut fusion = VolumetricFusion::new(FusionConfig::default()).unwrap();
    let points = flat_patch(-0.1, 21, 0.01);
    let truncation = fusion.config().truncation_distance;

    let stats = fusion.integrate_frame(&points, truncation).unwrap();
    assert!(stats.voxels_created > 0);
    assert_eq!(stats.rejected_points, 0);

    let mesh = fusion.extract_surface();
    assert!(mesh.vertex_count() > 0);
    let diagonal = fusion.voxel_size() * 3.0f32.sqrt();
    for vertex in &mesh.vertices {
        assert!((vertex.z - 1.0).abs() <= diagonal, "vertex {:?} off the plane", vertex);
    }
}

struct FailingService;

impl DelegatedReconstructor for FailingService {
    fn reconstruct(&self, _request: &DelegatedRequest) -> scanmesh_core::Result<DelegatedResponse> {
        Err(Error::ExternalService("connection refused".to_string()))
    }
}

#[test]
fn test_session_quick_scan_with_fallback() {
    let mut rng = StdRng::seed_from_u64(3);
    let config = ScanConfig {
        registration: Some(IcpConfig {
            seed: Some(5),
            ..Default::default()
        }),
        remove_unreferenced_vertices: true,
        ..Default::default()
    };
    let mut session = ScanSession::new(config).unwrap().with_delegate(Box::new(FailingService));

    session.start_scan().unwrap();
    for i in 0..5 {
        let report = session.ingest_frame(&hemisphere_frame(&mut rng, 300, 10, i as f64)).unwrap();
        assert_eq!(report.frame_index, i);
        assert_eq!(report.registration.is_some(), i > 0);
    }
    session.stop_scan().unwrap();

    let result = session.generate_mesh().unwrap();
    assert_eq!(result.source, MeshSource::Local);
    assert!(result.stats.triangle_count > 0);
    assert_eq!(result.mesh.referenced_vertices().len(), result.mesh.vertex_count());
    assert!(result.mesh.colors.is_some());
    assert_eq!(session.state(), ScanState::MeshReady);
}

#[test]
fn test_session_fusion_scan() {
    let config = ScanConfig {
        mode: ScanMode::Fusion,
        registration: None,
        ..Default::default()
    };
    let mut session = ScanSession::new(config).unwrap();
    session.start_scan().unwrap();
    for i in 0..3 {
        session.ingest_frame(&Frame::new(flat_patch(-0.1, 21, 0.01), i as f64)).unwrap();
    }
    session.stop_scan().unwrap();

    let result = session.generate_mesh().unwrap();
    assert_eq!(result.source, MeshSource::Fusion);
    assert!(result.stats.vertex_count > 0);
    assert_eq!(session.fusion().frame_count(), 3);
}

#[test]
fn test_session_insufficient_points() {
    let mut session = ScanSession::new(ScanConfig {
        registration: None,
        min_points: 1000,
        ..Default::default()
    })
    .unwrap();
    session.start_scan().unwrap();
    session.ingest_frame(&Frame::new(flat_patch(0.0, 10, 0.01), 0.0)).unwrap();
    session.stop_scan().unwrap();

    let err = session.generate_mesh().unwrap_err();
    assert!(matches!(err, Error::InsufficientData { what: "points", required: 1000, .. }));
    assert_eq!(session.state(), ScanState::Stopped);

    session.reset();
    assert_eq!(session.state(), ScanState::Idle);
    assert!(matches!(session.stop_scan(), Err(Error::InvalidState { .. })));
}
