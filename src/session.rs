// session.rs — Trajectory/map accumulator.
//
// `OdometrySession` owns all state that outlives a frame: the world pose,
// the trajectory, the map and the display bounds. It is mutated exactly
// once per successful frame, through `advance`, in this order:
//
//   R_wc ← R_wc · R_ct
//   t_wc ← t_wc + R_wc · t_ct        (uses the updated rotation)
//   trajectory.push(t_wc)
//   map.extend(R_wc · p + t_wc)      (uses the updated pose)
//
// There is no rollback: one bad relative pose corrupts everything after it.
// Scale drifts freely since |t_ct| = 1 every frame.

use std::ops::Range;

use nalgebra::{Point3, Rotation3, Vector3};

use crate::pose::RelativePose;

/// Camera placement in the first frame's coordinate system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldPose {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

impl Default for WorldPose {
    fn default() -> Self {
        WorldPose {
            rotation: Rotation3::identity(),
            translation: Vector3::zeros(),
        }
    }
}

impl WorldPose {
    /// Camera-frame point into world coordinates.
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation * p + self.translation
    }

    /// Camera centre as a point.
    pub fn position(&self) -> Point3<f64> {
        Point3::from(self.translation)
    }
}

/// A triangulated point in world coordinates and the frame that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapPoint {
    pub position: Point3<f64>,
    pub frame: usize,
}

/// Running min/max over x and z of everything drawn in a top-down view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryBounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_z: f64,
    pub max_z: f64,
}

impl Default for TrajectoryBounds {
    fn default() -> Self {
        TrajectoryBounds {
            min_x: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            min_z: f64::INFINITY,
            max_z: f64::NEG_INFINITY,
        }
    }
}

impl TrajectoryBounds {
    pub fn include(&mut self, p: &Point3<f64>) {
        if !(p.x.is_finite() && p.z.is_finite()) {
            return;
        }
        self.min_x = self.min_x.min(p.x);
        self.max_x = self.max_x.max(p.x);
        self.min_z = self.min_z.min(p.z);
        self.max_z = self.max_z.max(p.z);
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x
    }

    /// Map (x, z) into a `width`×`height` canvas with `margin` pixels on each
    /// side, preserving aspect ratio. +z points up the canvas.
    pub fn project_xz(&self, p: &Point3<f64>, width: f64, height: f64, margin: f64) -> (f64, f64) {
        if self.is_empty() {
            return (width / 2.0, height / 2.0);
        }
        let span_x = (self.max_x - self.min_x).max(1e-9);
        let span_z = (self.max_z - self.min_z).max(1e-9);
        let scale = ((width - 2.0 * margin) / span_x).min((height - 2.0 * margin) / span_z);
        let u = margin + (p.x - self.min_x) * scale;
        let v = height - margin - (p.z - self.min_z) * scale;
        (u, v)
    }
}

/// The odometry state carried from frame to frame.
#[derive(Debug, Clone, Default)]
pub struct OdometrySession {
    pose: WorldPose,
    trajectory: Vec<Point3<f64>>,
    map: Vec<MapPoint>,
    bounds: TrajectoryBounds,
    last_frame: Option<usize>,
}

impl OdometrySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record frame 0 at the origin with identity rotation.
    ///
    /// # Panics
    /// Panics if the session already holds a frame.
    pub fn initialize(&mut self, frame: usize) {
        assert!(self.trajectory.is_empty(), "session already initialized");
        self.pose = WorldPose::default();
        let origin = self.pose.position();
        self.trajectory.push(origin);
        self.bounds.include(&origin);
        self.last_frame = Some(frame);
    }

    /// Fold one frame's relative pose and current-camera points into the
    /// session. Returns the index range of the map points it appended.
    pub fn advance(
        &mut self,
        frame: usize,
        relative: &RelativePose,
        points: &[Point3<f64>],
    ) -> Range<usize> {
        self.pose.rotation *= relative.rotation;
        self.pose.translation += self.pose.rotation * relative.translation.as_ref();

        let position = self.pose.position();
        self.trajectory.push(position);
        self.bounds.include(&position);

        let start = self.map.len();
        for p in points {
            let world = self.pose.transform_point(p);
            self.bounds.include(&world);
            self.map.push(MapPoint {
                position: world,
                frame,
            });
        }
        self.last_frame = Some(frame);
        start..self.map.len()
    }

    pub fn pose(&self) -> &WorldPose {
        &self.pose
    }

    /// One camera position per processed frame, frame 0 included.
    pub fn trajectory(&self) -> &[Point3<f64>] {
        &self.trajectory
    }

    pub fn map(&self) -> &[MapPoint] {
        &self.map
    }

    pub fn bounds(&self) -> &TrajectoryBounds {
        &self.bounds
    }

    /// Index of the last frame folded in.
    pub fn last_frame(&self) -> Option<usize> {
        self.last_frame
    }

    pub fn frames_processed(&self) -> usize {
        self.trajectory.len()
    }
}
