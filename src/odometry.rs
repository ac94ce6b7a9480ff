// odometry.rs — Per-frame pipeline and run driver.
//
// Frame 0 only seeds tracks and places the camera at the origin. Every
// later frame runs the strict chain
//
//   track → filter → relative pose → triangulate → accumulate → replenish
//
// and either commits all of its effects or none of them: a failing frame
// leaves the session, the active tracks and the previous frame untouched.

use std::ops::Range;

use log::{debug, info, warn};
use nalgebra::Point3;

use crate::camera::CameraIntrinsics;
use crate::config::OdometryConfig;
use crate::corners::CornerDetector;
use crate::error::{OdometryError, Result};
use crate::filter::{pair_tracks, Correspondence, MIN_CORRESPONDENCES};
use crate::klt::{SparseTracker, TrackPoint};
use crate::pose::{RelativePose, RelativePoseEstimator};
use crate::replenish::Replenisher;
use crate::session::{OdometrySession, WorldPose};
use crate::sink::{FrameObserver, MapSink, StatsSink, TrajectorySink};
use crate::source::{Frame, FrameSource, PreparedFrame};
use crate::stats::{ErrorSmoother, FrameStats};
use crate::triangulation::Triangulator;

/// Everything one successful frame produced.
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub index: usize,
    pub stats: FrameStats,
    /// Camera pose after this frame.
    pub world_pose: WorldPose,
    /// `None` for the first frame.
    pub relative: Option<RelativePose>,
    /// Filtered correspondences, in pixels.
    pub correspondences: Vec<Correspondence>,
    /// Pose inliers over `correspondences`.
    pub inliers: Vec<bool>,
    /// Indices of this frame's points in the session map.
    pub map_range: Range<usize>,
    /// This frame's map points in world coordinates.
    pub new_points: Vec<Point3<f64>>,
    /// Active tracks carried into the next frame.
    pub tracks: Vec<TrackPoint>,
}

impl FrameReport {
    pub fn position(&self) -> Point3<f64> {
        self.world_pose.position()
    }
}

pub struct Odometry {
    config: OdometryConfig,
    camera: CameraIntrinsics,
    tracker: Box<dyn SparseTracker>,
    detector: Box<dyn CornerDetector>,
    estimator: RelativePoseEstimator,
    triangulator: Triangulator,
    replenisher: Replenisher,
    session: OdometrySession,
    prev: Option<PreparedFrame>,
    tracks: Vec<TrackPoint>,
    smoother: ErrorSmoother,
}

impl Odometry {
    /// Pipeline with the pyramidal KLT tracker and Shi-Tomasi detector
    /// described by `config`.
    pub fn new(config: OdometryConfig, camera: CameraIntrinsics) -> Result<Self> {
        let tracker = Box::new(config.tracker());
        let detector = Box::new(config.detector());
        Self::with_components(config, camera, tracker, detector)
    }

    /// Pipeline with caller-supplied tracking and detection stages.
    pub fn with_components(
        config: OdometryConfig,
        camera: CameraIntrinsics,
        tracker: Box<dyn SparseTracker>,
        detector: Box<dyn CornerDetector>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Odometry {
            estimator: config.estimator(),
            triangulator: config.triangulator(),
            replenisher: config.replenisher(),
            smoother: ErrorSmoother::new(config.error_smoothing_window),
            config,
            camera,
            tracker,
            detector,
            session: OdometrySession::new(),
            prev: None,
            tracks: Vec::new(),
        })
    }

    pub fn config(&self) -> &OdometryConfig {
        &self.config
    }

    pub fn camera(&self) -> &CameraIntrinsics {
        &self.camera
    }

    pub fn session(&self) -> &OdometrySession {
        &self.session
    }

    /// Tracks that will be handed to the tracker with the next frame.
    pub fn tracks(&self) -> &[TrackPoint] {
        &self.tracks
    }

    /// Index the next frame is expected to carry at the earliest.
    pub fn next_index(&self) -> usize {
        self.session.last_frame().map_or(0, |last| last + 1)
    }

    pub fn process(&mut self, frame: Frame) -> Result<FrameReport> {
        if let Some(prev) = &self.prev {
            if frame.index <= prev.index {
                return Err(OdometryError::FrameUnavailable {
                    index: frame.index,
                    reason: format!("out of order after frame {}", prev.index),
                });
            }
            let size = (frame.image.width(), frame.image.height());
            if size != (prev.width(), prev.height()) {
                return Err(OdometryError::FrameUnavailable {
                    index: frame.index,
                    reason: format!(
                        "size {}x{} differs from {}x{}",
                        size.0,
                        size.1,
                        prev.width(),
                        prev.height()
                    ),
                });
            }
        }

        let prepared = frame.prepare(self.config.pyramid_levels, self.config.pyramid_sigma);
        match self.prev.take() {
            None => Ok(self.initialize(prepared)),
            Some(prev) => match self.step(&prev, &prepared) {
                Ok(report) => {
                    self.prev = Some(prepared);
                    Ok(report)
                }
                Err(e) => {
                    self.prev = Some(prev);
                    Err(e)
                }
            },
        }
    }

    fn initialize(&mut self, frame: PreparedFrame) -> FrameReport {
        let index = frame.index;
        self.tracks = self.detector.detect(&frame, self.config.max_corners, &[]);
        self.session.initialize(index);
        debug!("frame {index}: seeded {} tracks", self.tracks.len());

        let report = FrameReport {
            index,
            stats: FrameStats {
                frame: index,
                added: self.tracks.len(),
                total: self.tracks.len(),
                ..FrameStats::default()
            },
            world_pose: *self.session.pose(),
            relative: None,
            correspondences: Vec::new(),
            inliers: Vec::new(),
            map_range: 0..0,
            new_points: Vec::new(),
            tracks: self.tracks.clone(),
        };
        self.prev = Some(frame);
        report
    }

    fn step(&mut self, prev: &PreparedFrame, curr: &PreparedFrame) -> Result<FrameReport> {
        let index = curr.index;

        let results = self.tracker.track(prev, curr, &self.tracks);
        let pairs = pair_tracks(&self.tracks, &results);
        let survivors = self.config.filter(curr.width(), curr.height()).apply(&pairs);
        if survivors.len() < MIN_CORRESPONDENCES {
            return Err(OdometryError::InsufficientCorrespondences {
                frame: index,
                found: survivors.len(),
                required: MIN_CORRESPONDENCES,
            });
        }

        let correspondences: Vec<Correspondence> =
            survivors.iter().map(|p| p.correspondence()).collect();
        let estimate = self
            .estimator
            .estimate(&correspondences, &self.camera)
            .map_err(|reason| OdometryError::DegenerateEssentialModel {
                frame: index,
                reason,
            })?;

        // Nothing below can fail: commit.
        let points = self.triangulator.triangulate(
            &self.camera,
            &estimate.pose,
            &correspondences,
            &estimate.inliers,
        );
        let map_range = self.session.advance(index, &estimate.pose, &points);
        let new_points: Vec<Point3<f64>> = self.session.map()[map_range.clone()]
            .iter()
            .map(|m| m.position)
            .collect();

        let mean_error =
            survivors.iter().map(|p| p.error as f64).sum::<f64>() / survivors.len() as f64;
        let smoothed_error = self.smoother.push(mean_error);

        let lost = self.tracks.len() - survivors.len();
        let mut tracks: Vec<TrackPoint> = survivors.iter().map(|p| p.curr).collect();
        let added = self
            .replenisher
            .replenish(self.detector.as_ref(), curr, &mut tracks);
        self.tracks = tracks;

        let stats = FrameStats {
            frame: index,
            tracked: survivors.len(),
            lost,
            added,
            total: self.tracks.len(),
            mean_error,
            smoothed_error,
            inliers: estimate.num_inliers,
            map_points: new_points.len(),
        };
        debug!(
            "frame {index}: tracked {} | lost {lost} | added {added} | inliers {}/{} | +{} map points | error {mean_error:.3} (smoothed {smoothed_error:.3})",
            stats.tracked,
            estimate.num_inliers,
            estimate.ransac_inliers,
            stats.map_points,
        );

        Ok(FrameReport {
            index,
            stats,
            world_pose: *self.session.pose(),
            relative: Some(estimate.pose),
            correspondences,
            inliers: estimate.inliers,
            map_range,
            new_points,
            tracks: self.tracks.clone(),
        })
    }
}

/// Output destinations of a run. The observer and statistics sinks are
/// optional.
pub struct Sinks<'a> {
    pub trajectory: &'a mut dyn TrajectorySink,
    pub map: &'a mut dyn MapSink,
    pub observer: Option<&'a mut dyn FrameObserver>,
    pub stats: Option<&'a mut dyn StatsSink>,
}

impl<'a> Sinks<'a> {
    pub fn new(trajectory: &'a mut dyn TrajectorySink, map: &'a mut dyn MapSink) -> Self {
        Sinks {
            trajectory,
            map,
            observer: None,
            stats: None,
        }
    }

    pub fn with_observer(mut self, observer: &'a mut dyn FrameObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_stats(mut self, stats: &'a mut dyn StatsSink) -> Self {
        self.stats = Some(stats);
        self
    }

    fn deliver(&mut self, report: &FrameReport) -> Result<()> {
        self.trajectory.push_position(&report.position())?;
        self.map.push_points(&report.new_points)?;
        if let Some(observer) = self.observer.as_deref_mut() {
            observer.observe(report)?;
        }
        if let Some(stats) = self.stats.as_deref_mut() {
            stats.record(&report.stats)?;
        }
        Ok(())
    }

    /// Finish every sink, even after one fails. Returns the first failure.
    fn finish(&mut self) -> Result<()> {
        let mut results = vec![self.trajectory.finish(), self.map.finish()];
        if let Some(observer) = self.observer.as_deref_mut() {
            results.push(observer.finish());
        }
        if let Some(stats) = self.stats.as_deref_mut() {
            results.push(stats.finish());
        }
        results.into_iter().collect()
    }
}

/// How a run ended.
#[derive(Debug)]
pub struct RunSummary {
    pub frames_processed: usize,
    /// The frame-level error that stopped the run early, if any.
    pub halted: Option<OdometryError>,
    pub trajectory_len: usize,
    pub map_len: usize,
    /// Mean of the smoothed tracking error over frames after the first.
    pub average_smoothed_error: f64,
}

impl RunSummary {
    pub fn completed(&self) -> bool {
        self.halted.is_none()
    }
}

/// Pull up to `config.num_frames` frames from `source` through the
/// pipeline, feeding every success to `sinks`.
///
/// A frame-level error halts the run and is reported in the summary; the
/// state accumulated so far has already been delivered. Sinks are always
/// finished. Sink failures are returned as errors.
pub fn run(
    odometry: &mut Odometry,
    source: &mut dyn FrameSource,
    sinks: &mut Sinks<'_>,
) -> Result<RunSummary> {
    let num_frames = odometry.config().num_frames;
    let mut halted = None;
    let mut sink_error = None;
    let mut frames_processed = 0;
    let mut smoothed_sum = 0.0;
    let mut smoothed_count = 0usize;

    while frames_processed < num_frames {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                halted = Some(OdometryError::FrameUnavailable {
                    index: odometry.next_index(),
                    reason: format!(
                        "sequence ended after {frames_processed} of {num_frames} frames"
                    ),
                });
                break;
            }
            Err(e) => {
                halted = Some(e);
                break;
            }
        };

        let report = match odometry.process(frame) {
            Ok(report) => report,
            Err(e) => {
                halted = Some(e);
                break;
            }
        };
        frames_processed += 1;
        if report.relative.is_some() {
            smoothed_sum += report.stats.smoothed_error;
            smoothed_count += 1;
        }
        if let Err(e) = sinks.deliver(&report) {
            sink_error = Some(e);
            break;
        }
    }

    if let Some(e) = &halted {
        warn!("run halted after {frames_processed} frames: {e}");
    }
    let finished = sinks.finish();
    if let Some(e) = sink_error {
        return Err(e);
    }
    finished?;

    let summary = RunSummary {
        frames_processed,
        halted,
        trajectory_len: odometry.session().trajectory().len(),
        map_len: odometry.session().map().len(),
        average_smoothed_error: if smoothed_count > 0 {
            smoothed_sum / smoothed_count as f64
        } else {
            0.0
        },
    };
    info!(
        "processed {} frames: {} trajectory points, {} map points, avg. smoothed error {:.3}",
        summary.frames_processed,
        summary.trajectory_len,
        summary.map_len,
        summary.average_smoothed_error
    );
    Ok(summary)
}
