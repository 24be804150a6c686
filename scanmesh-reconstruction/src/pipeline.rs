//! Scan session orchestration
//!
//! A [`ScanSession`] owns every per-scan resource: the frame filter, the
//! registrar and its model reservoir, the quick-mode frame buffer and the
//! fusion volume. Its phases are enforced by a state machine:
//!
//! ```text
//! Idle --start_scan--> Scanning --stop_scan--> Stopped --generate_mesh--> MeshReady
//!   ^                                                                        |
//!   +------------------------------------reset-------------------------------+
//! ```

use crate::delegate::{DelegatedParams, DelegatedReconstructor, DelegatedRequest};
use crate::fusion::{FusionConfig, IntegrationStats, VolumetricFusion};
use crate::reconstructor::{ReconstructionConfig, SurfaceReconstructor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scanmesh_algorithms::{dedup_coincident, point_statistics, FilterConfig, FilterReport, FrameFilter, IcpConfig, IcpResult, Registrar};
use scanmesh_core::{Bounded, Error, Frame, Point3f, Result, ScanPoint, TriangleMesh};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Phase of a scan session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanState {
    Idle,
    Scanning,
    Stopped,
    MeshReady,
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanState::Idle => "idle",
            ScanState::Scanning => "scanning",
            ScanState::Stopped => "stopped",
            ScanState::MeshReady => "mesh ready",
        };
        f.write_str(name)
    }
}

/// How frames become a mesh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanMode {
    /// Buffer filtered frames and reconstruct over all their points
    #[default]
    Quick,
    /// Integrate frames into the volume and extract its surface
    Fusion,
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    pub mode: ScanMode,
    pub filter: FilterConfig,
    /// `None` disables frame-to-model registration
    pub registration: Option<IcpConfig>,
    pub fusion: FusionConfig,
    pub reconstruction: ReconstructionConfig,
    pub delegate: DelegatedParams,
    /// Quick-mode frames kept; the oldest is dropped beyond this
    pub max_buffered_frames: usize,
    /// Points (quick mode) or surface vertices (fusion mode) needed for a mesh
    pub min_points: usize,
    pub min_frames: usize,
    /// Quick-mode sampling resolution; estimated from the points when unset
    pub resolution: Option<f32>,
    /// Registered points kept as the registration target
    pub model_capacity: usize,
    /// Drop vertices no triangle uses from the final mesh
    pub remove_unreferenced_vertices: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            mode: ScanMode::Quick,
            filter: FilterConfig::default(),
            registration: Some(IcpConfig::default()),
            fusion: FusionConfig::default(),
            reconstruction: ReconstructionConfig::default(),
            delegate: DelegatedParams::default(),
            max_buffered_frames: 120,
            min_points: 3,
            min_frames: 1,
            resolution: None,
            model_capacity: 5000,
            remove_unreferenced_vertices: false,
        }
    }
}

/// What happened to one ingested frame
#[derive(Debug, Clone)]
pub struct IngestReport {
    /// Zero-based index of the frame within the scan
    pub frame_index: usize,
    pub filter: FilterReport,
    /// Present when the frame was registered against the model
    pub registration: Option<IcpResult>,
    /// Fusion counters, fusion mode only
    pub integration: Option<IntegrationStats>,
    /// Quick-mode frames held after this one
    pub buffered_frames: usize,
    /// Whether the oldest buffered frame was dropped to make room
    pub dropped_oldest: bool,
}

/// Where the session mesh came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeshSource {
    Local,
    Delegated,
    Fusion,
}

/// Size and timing of the session mesh
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshStats {
    pub vertex_count: usize,
    pub triangle_count: usize,
    /// Seconds spent in `generate_mesh`
    pub processing_time: f32,
}

/// Terminal artifact of a session
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub mesh: TriangleMesh,
    pub stats: MeshStats,
    pub source: MeshSource,
}

/// Bounded uniform sample of every registered point (reservoir sampling)
#[derive(Debug, Clone)]
struct ModelReservoir {
    points: Vec<Point3f>,
    capacity: usize,
    seen: usize,
    rng: StdRng,
}

impl ModelReservoir {
    fn new(capacity: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            points: Vec::with_capacity(capacity),
            capacity,
            seen: 0,
            rng,
        }
    }

    fn extend(&mut self, points: impl IntoIterator<Item = Point3f>) {
        for point in points {
            self.seen += 1;
            if self.points.len() < self.capacity {
                self.points.push(point);
            } else {
                let slot = self.rng.gen_range(0..self.seen);
                if slot < self.capacity {
                    self.points[slot] = point;
                }
            }
        }
    }

    fn clear(&mut self) {
        self.points.clear();
        self.seen = 0;
    }
}

/// One scan from first frame to finished mesh
pub struct ScanSession {
    config: ScanConfig,
    state: ScanState,
    filter: FrameFilter,
    registrar: Option<Registrar>,
    model: ModelReservoir,
    buffer: VecDeque<Vec<ScanPoint>>,
    fusion: VolumetricFusion,
    reconstructor: SurfaceReconstructor,
    delegate: Option<Box<dyn DelegatedReconstructor>>,
    frames_ingested: usize,
    result: Option<ScanResult>,
}

impl fmt::Debug for ScanSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanSession")
            .field("state", &self.state)
            .field("mode", &self.config.mode)
            .field("frames_ingested", &self.frames_ingested)
            .field("buffered_frames", &self.buffer.len())
            .field("voxels", &self.fusion.voxel_count())
            .field("delegate", &self.delegate.is_some())
            .finish()
    }
}

impl ScanSession {
    pub fn new(config: ScanConfig) -> Result<Self> {
        let fusion = VolumetricFusion::new(config.fusion.clone())?;
        let registrar = config.registration.clone().map(Registrar::new);
        let seed = config.registration.as_ref().and_then(|c| c.seed);
        Ok(Self {
            filter: FrameFilter::new(config.filter.clone()),
            reconstructor: SurfaceReconstructor::new(config.reconstruction.clone()),
            model: ModelReservoir::new(config.model_capacity, seed),
            registrar,
            fusion,
            buffer: VecDeque::new(),
            delegate: None,
            frames_ingested: 0,
            result: None,
            state: ScanState::Idle,
            config,
        })
    }

    /// Send quick-mode reconstruction to an external service first
    pub fn with_delegate(mut self, delegate: Box<dyn DelegatedReconstructor>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn frames_ingested(&self) -> usize {
        self.frames_ingested
    }

    pub fn buffered_frames(&self) -> usize {
        self.buffer.len()
    }

    pub fn fusion(&self) -> &VolumetricFusion {
        &self.fusion
    }

    pub fn result(&self) -> Option<&ScanResult> {
        self.result.as_ref()
    }

    pub fn mesh(&self) -> Option<&TriangleMesh> {
        self.result.as_ref().map(|r| &r.mesh)
    }

    fn invalid(&self, operation: &'static str) -> Error {
        Error::InvalidState {
            operation,
            state: self.state.to_string(),
        }
    }

    fn transition(&mut self, next: ScanState) {
        info!(from = %self.state, to = %next, "scan state changed");
        self.state = next;
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.fusion.reset();
        self.model.clear();
        self.frames_ingested = 0;
        self.result = None;
    }

    /// Begin a new scan, discarding buffered frames, fused voxels and any
    /// previous mesh. Not allowed while already scanning.
    pub fn start_scan(&mut self) -> Result<()> {
        if self.state == ScanState::Scanning {
            return Err(self.invalid("start a scan"));
        }
        self.clear();
        self.transition(ScanState::Scanning);
        Ok(())
    }

    /// Filter, register and store one frame
    pub fn ingest_frame(&mut self, frame: &Frame) -> Result<IngestReport> {
        if self.state != ScanState::Scanning {
            return Err(self.invalid("ingest a frame"));
        }

        let frame_index = self.frames_ingested;
        let filtered = self.filter.apply(frame)?;
        let mut points = filtered.points;
        let mut report = IngestReport {
            frame_index,
            filter: filtered.report,
            registration: None,
            integration: None,
            buffered_frames: self.buffer.len(),
            dropped_oldest: false,
        };

        if let Some(registrar) = self.registrar.as_mut() {
            if !self.model.points.is_empty() && !points.is_empty() {
                let registration = registrar.register(&points, &self.model.points)?;
                points = registration.points;
                report.registration = Some(registration.result);
            }
            self.model.extend(points.iter().map(|p| p.position));
        }

        match self.config.mode {
            ScanMode::Quick => {
                if !points.is_empty() {
                    self.buffer.push_back(points);
                    if self.buffer.len() > self.config.max_buffered_frames {
                        self.buffer.pop_front();
                        report.dropped_oldest = true;
                    }
                }
                report.buffered_frames = self.buffer.len();
            }
            ScanMode::Fusion => {
                let stats = self
                    .fusion
                    .integrate_frame(&points, self.config.fusion.truncation_distance)?;
                if stats.skipped_out_of_range > 0 {
                    warn!(
                        frame = frame_index,
                        skipped = stats.skipped_out_of_range,
                        bounds = ?frame.bounding_box(),
                        "frame extends past the fusion volume"
                    );
                }
                report.integration = Some(stats);
            }
        }

        self.frames_ingested += 1;
        debug!(
            frame = frame_index,
            input = report.filter.input,
            kept = report.filter.after_radius,
            registered = report.registration.is_some(),
            "frame ingested"
        );
        Ok(report)
    }

    /// Stop accepting frames
    pub fn stop_scan(&mut self) -> Result<()> {
        if self.state != ScanState::Scanning {
            return Err(self.invalid("stop a scan"));
        }
        self.transition(ScanState::Stopped);
        Ok(())
    }

    /// Build the session mesh.
    ///
    /// On insufficient data, including a reconstruction without a single
    /// triangle, the state stays `Stopped` and no mesh is stored.
    pub fn generate_mesh(&mut self) -> Result<&ScanResult> {
        if self.state != ScanState::Stopped {
            return Err(self.invalid("generate a mesh"));
        }
        let start_time = Instant::now();

        let (mut mesh, source) = match self.config.mode {
            ScanMode::Quick => self.quick_mesh()?,
            ScanMode::Fusion => self.fusion_mesh()?,
        };
        if mesh.face_count() == 0 {
            warn!(vertices = mesh.vertex_count(), ?source, "reconstruction produced no triangles");
            return Err(Error::insufficient("triangles", 1, 0));
        }

        if self.config.remove_unreferenced_vertices {
            let removed = mesh.remove_unreferenced_vertices();
            debug!(removed, "unreferenced vertices removed");
        }

        let stats = MeshStats {
            vertex_count: mesh.vertex_count(),
            triangle_count: mesh.face_count(),
            processing_time: start_time.elapsed().as_secs_f32(),
        };
        info!(
            vertices = stats.vertex_count,
            triangles = stats.triangle_count,
            seconds = stats.processing_time,
            ?source,
            "mesh generated"
        );

        self.transition(ScanState::MeshReady);
        Ok(&*self.result.insert(ScanResult { mesh, stats, source }))
    }

    fn quick_mesh(&self) -> Result<(TriangleMesh, MeshSource)> {
        if self.buffer.len() < self.config.min_frames {
            return Err(Error::insufficient("frames", self.config.min_frames, self.buffer.len()));
        }
        let merged: Vec<ScanPoint> = self.buffer.iter().flatten().copied().collect();
        let points = dedup_coincident(&merged);
        if points.len() < merged.len() {
            debug!(merged = merged.len(), distinct = points.len(), "coincident points merged");
        }
        if points.len() < self.config.min_points.max(3) {
            return Err(Error::insufficient("points", self.config.min_points.max(3), points.len()));
        }

        if let Some(delegate) = &self.delegate {
            match self.delegated_mesh(delegate.as_ref(), &points) {
                Ok(mesh) => return Ok((mesh, MeshSource::Delegated)),
                Err(e) => warn!(error = %e, "delegated reconstruction failed, falling back to local"),
            }
        }

        let resolution = match self.config.resolution {
            Some(resolution) => resolution,
            None => point_statistics(&points)
                .map(|stats| stats.avg_point_distance)
                .ok_or_else(|| Error::InvalidData("cannot estimate point spacing".to_string()))?,
        };
        let reconstruction = self.reconstructor.reconstruct(&points, resolution)?;
        Ok((reconstruction.mesh, MeshSource::Local))
    }

    fn delegated_mesh(&self, delegate: &dyn DelegatedReconstructor, points: &[ScanPoint]) -> Result<TriangleMesh> {
        let request = DelegatedRequest::new(points.to_vec(), self.config.delegate.clone())?;
        let response = delegate.reconstruct(&request)?;
        response.validate()?;
        info!(
            vertices = response.stats.vertex_count,
            triangles = response.stats.triangle_count,
            service_seconds = response.stats.processing_time,
            "delegated mesh accepted"
        );
        Ok(response.mesh)
    }

    fn fusion_mesh(&self) -> Result<(TriangleMesh, MeshSource)> {
        if self.fusion.frame_count() < self.config.min_frames {
            return Err(Error::insufficient("frames", self.config.min_frames, self.fusion.frame_count()));
        }
        let mesh = self.fusion.extract_surface();
        if mesh.vertex_count() < self.config.min_points {
            return Err(Error::insufficient("surface vertices", self.config.min_points, mesh.vertex_count()));
        }
        Ok((mesh, MeshSource::Fusion))
    }

    /// Discard everything and return to `Idle`
    pub fn reset(&mut self) {
        self.clear();
        self.transition(ScanState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::{DelegatedResponse, DelegatedStats};
    use scanmesh_core::Vector3f;

    fn patch_frame(offset: Vector3f, n: usize, spacing: f32) -> Frame {
        let points = (0..n * n)
            .map(|i| {
                let x = (i % n) as f32 * spacing - 0.1;
                let y = (i / n) as f32 * spacing - 0.1;
                let z = 1.0 + 0.2 * x * x + 0.01 * (8.0 * y).sin();
                ScanPoint::with_color(Point3f::new(x, y, z) + offset, [90, 120, 150])
            })
            .collect();
        Frame::new(points, 0.0)
    }

    fn quick_config() -> ScanConfig {
        ScanConfig {
            registration: None,
            ..Default::default()
        }
    }

    struct FixedDelegate(Option<DelegatedResponse>);

    impl DelegatedReconstructor for FixedDelegate {
        fn reconstruct(&self, _request: &DelegatedRequest) -> Result<DelegatedResponse> {
            self.0
                .clone()
                .ok_or_else(|| Error::ExternalService("service unavailable".to_string()))
        }
    }

    #[test]
    fn test_scan_config_default() {
        let config = ScanConfig::default();
        assert_eq!(config.mode, ScanMode::Quick);
        assert_eq!(config.max_buffered_frames, 120);
        assert_eq!(config.min_points, 3);
        assert_eq!(config.min_frames, 1);
        assert!(config.registration.is_some());
    }

    #[test]
    fn test_state_machine_guards() {
        let mut session = ScanSession::new(quick_config()).unwrap();
        let frame = patch_frame(Vector3f::zeros(), 10, 0.02);

        assert_eq!(session.state(), ScanState::Idle);
        assert!(matches!(session.ingest_frame(&frame), Err(Error::InvalidState { .. })));
        assert!(session.stop_scan().is_err());
        assert!(session.generate_mesh().is_err());

        session.start_scan().unwrap();
        assert!(session.start_scan().is_err());
        assert!(session.generate_mesh().is_err());
        session.ingest_frame(&frame).unwrap();
        session.stop_scan().unwrap();
        assert!(matches!(session.ingest_frame(&frame), Err(Error::InvalidState { .. })));

        session.generate_mesh().unwrap();
        assert_eq!(session.state(), ScanState::MeshReady);
        assert!(session.generate_mesh().is_err());

        session.reset();
        assert_eq!(session.state(), ScanState::Idle);
        assert!(session.mesh().is_none());
        assert_eq!(session.frames_ingested(), 0);
    }

    #[test]
    fn test_generate_without_frames_keeps_state() {
        let mut session = ScanSession::new(quick_config()).unwrap();
        session.start_scan().unwrap();
        session.stop_scan().unwrap();

        let result = session.generate_mesh();
        assert!(matches!(result, Err(Error::InsufficientData { what: "frames", .. })));
        assert_eq!(session.state(), ScanState::Stopped);
        assert!(session.mesh().is_none());
    }

    #[test]
    fn test_quick_mode_local_mesh() {
        let mut session = ScanSession::new(quick_config()).unwrap();
        session.start_scan().unwrap();
        for _ in 0..3 {
            session.ingest_frame(&patch_frame(Vector3f::zeros(), 12, 0.02)).unwrap();
        }
        session.stop_scan().unwrap();

        let result = session.generate_mesh().unwrap();
        assert_eq!(result.source, MeshSource::Local);
        assert!(result.stats.triangle_count > 0);
        assert_eq!(result.stats.vertex_count, result.mesh.vertex_count());
        assert!(result.mesh.validate().is_ok());
        assert!(result.mesh.colors.is_some());
    }

    #[test]
    fn test_buffer_drops_oldest_frame() {
        let mut session = ScanSession::new(ScanConfig {
            max_buffered_frames: 2,
            ..quick_config()
        })
        .unwrap();
        session.start_scan().unwrap();
        let frame = patch_frame(Vector3f::zeros(), 8, 0.02);

        let reports: Vec<IngestReport> = (0..4).map(|_| session.ingest_frame(&frame).unwrap()).collect();
        assert!(!reports[1].dropped_oldest);
        assert!(reports[2].dropped_oldest);
        assert_eq!(reports[3].buffered_frames, 2);
        assert_eq!(reports[3].frame_index, 3);
        assert_eq!(session.buffered_frames(), 2);
    }

    #[test]
    fn test_registration_aligns_shifted_frame() {
        let mut session = ScanSession::new(ScanConfig {
            registration: Some(IcpConfig {
                seed: Some(11),
                ..Default::default()
            }),
            ..Default::default()
        })
        .unwrap();
        session.start_scan().unwrap();

        let first = session.ingest_frame(&patch_frame(Vector3f::zeros(), 15, 0.015)).unwrap();
        assert!(first.registration.is_none());

        let second = session
            .ingest_frame(&patch_frame(Vector3f::new(0.003, 0.0, 0.0), 15, 0.015))
            .unwrap();
        let registration = second.registration.unwrap();
        assert!(registration.aligned);
        assert!((registration.transformation.translation_part().x + 0.003).abs() < 1.5e-3);
    }

    #[test]
    fn test_delegate_success_and_fallback() {
        let delegated = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 1.0),
                Point3f::new(0.1, 0.0, 1.0),
                Point3f::new(0.0, 0.1, 1.0),
            ],
            vec![[0, 1, 2]],
        );
        let response = DelegatedResponse {
            mesh: delegated,
            stats: DelegatedStats {
                vertex_count: 3,
                triangle_count: 1,
                processing_time: 0.5,
            },
        };

        let run = |delegate: FixedDelegate| {
            let mut session = ScanSession::new(quick_config()).unwrap().with_delegate(Box::new(delegate));
            session.start_scan().unwrap();
            session.ingest_frame(&patch_frame(Vector3f::zeros(), 10, 0.02)).unwrap();
            session.stop_scan().unwrap();
            let result = session.generate_mesh().unwrap();
            (result.source, result.stats.triangle_count)
        };

        assert_eq!(run(FixedDelegate(Some(response.clone()))), (MeshSource::Delegated, 1));

        let (source, triangles) = run(FixedDelegate(None));
        assert_eq!(source, MeshSource::Local);
        assert!(triangles > 0);

        // a response whose statistics disagree with its mesh is rejected
        let mut inconsistent = response;
        inconsistent.stats.triangle_count = 5;
        assert_eq!(run(FixedDelegate(Some(inconsistent))).0, MeshSource::Local);
    }

    #[test]
    fn test_fusion_mode_mesh() {
        let mut session = ScanSession::new(ScanConfig {
            mode: ScanMode::Fusion,
            registration: None,
            ..Default::default()
        })
        .unwrap();
        session.start_scan().unwrap();
        let report = session.ingest_frame(&patch_frame(Vector3f::zeros(), 20, 0.01)).unwrap();
        assert!(report.integration.is_some());
        assert_eq!(session.buffered_frames(), 0);
        session.stop_scan().unwrap();

        let result = session.generate_mesh().unwrap();
        assert_eq!(result.source, MeshSource::Fusion);
        assert!(result.stats.vertex_count > 0);
        assert_eq!(session.fusion().frame_count(), 1);
    }

    fn unfiltered() -> FilterConfig {
        FilterConfig {
            statistical: None,
            radius: None,
            ..Default::default()
        }
    }

    #[test]
    fn test_stationary_sensor_frames() {
        let registrations = [
            None,
            Some(IcpConfig {
                seed: Some(2),
                ..Default::default()
            }),
        ];
        for registration in registrations {
            let mut session = ScanSession::new(ScanConfig {
                registration,
                ..Default::default()
            })
            .unwrap();
            session.start_scan().unwrap();
            let frame = patch_frame(Vector3f::zeros(), 12, 0.02);
            for _ in 0..3 {
                session.ingest_frame(&frame).unwrap();
            }
            session.stop_scan().unwrap();

            let result = session.generate_mesh().unwrap();
            assert_eq!(result.source, MeshSource::Local);
            assert!(result.stats.triangle_count > 0);
        }
    }

    #[test]
    fn test_quick_mesh_without_triangles_is_rejected() {
        let mut session = ScanSession::new(ScanConfig {
            registration: None,
            filter: unfiltered(),
            ..Default::default()
        })
        .unwrap();
        session.start_scan().unwrap();
        let line = (0..20).map(|i| ScanPoint::new(i as f32 * 0.01, 0.0, 1.0)).collect();
        session.ingest_frame(&Frame::new(line, 0.0)).unwrap();
        session.stop_scan().unwrap();

        let err = session.generate_mesh().unwrap_err();
        assert!(matches!(err, Error::InsufficientData { what: "triangles", required: 1, actual: 0 }));
        assert_eq!(session.state(), ScanState::Stopped);
        assert!(session.result().is_none());
    }

    #[test]
    fn test_fusion_mesh_without_triangles_is_rejected() {
        let mut session = ScanSession::new(ScanConfig {
            mode: ScanMode::Fusion,
            registration: None,
            filter: unfiltered(),
            ..Default::default()
        })
        .unwrap();
        session.start_scan().unwrap();
        let sparse = (0..10).map(|i| ScanPoint::new(i as f32 * 0.1, 0.0, 1.0)).collect();
        session.ingest_frame(&Frame::new(sparse, 0.0)).unwrap();
        session.stop_scan().unwrap();

        let err = session.generate_mesh().unwrap_err();
        assert!(matches!(err, Error::InsufficientData { what: "triangles", .. }));
        assert_eq!(session.state(), ScanState::Stopped);
        assert!(session.mesh().is_none());
    }

    #[test]
    fn test_restart_clears_previous_scan() {
        let mut session = ScanSession::new(quick_config()).unwrap();
        session.start_scan().unwrap();
        session.ingest_frame(&patch_frame(Vector3f::zeros(), 10, 0.02)).unwrap();
        session.stop_scan().unwrap();
        session.generate_mesh().unwrap();

        session.start_scan().unwrap();
        assert!(session.mesh().is_none());
        assert_eq!(session.buffered_frames(), 0);
        assert_eq!(session.state(), ScanState::Scanning);
    }

    #[test]
    fn test_model_reservoir_is_bounded() {
        let mut model = ModelReservoir::new(100, Some(3));
        model.extend((0..1000).map(|i| Point3f::new(i as f32, 0.0, 0.0)));
        assert_eq!(model.points.len(), 100);
        assert_eq!(model.seen, 1000);
        // later points replace early ones
        assert!(model.points.iter().any(|p| p.x >= 100.0));
        model.clear();
        assert!(model.points.is_empty());
    }
}
