// klt.rs — Pyramidal Lucas-Kanade sparse tracker.
//
// Each point is tracked independently, coarse to fine:
//
//   d = 0 at the coarsest level
//   for level in coarsest..=0:
//       template T = patch of the previous image around p / 2^level
//       solve H · δ = Σ ∇T · (T − I(p/2^level + d)) until |δ| < ε
//       d = 2d when moving to the next finer level
//
// Gradients come from the template (previous frame), so the 2×2 Hessian is
// built once per level and only the residual is re-sampled per iteration.
// After the finest level the tracker reports the mean absolute intensity
// difference over the window: a residual on the 0–255 scale that the
// correspondence filter thresholds.

use crate::image::{interpolate_bilinear, Image};
use crate::pyramid::Pyramid;
use crate::source::PreparedFrame;

/// A 2-D image position of one tracked scene feature.
///
/// Identity is positional: tracks carry no ID, and a track that fails is
/// simply not carried into the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackPoint {
    pub x: f32,
    pub y: f32,
}

impl TrackPoint {
    pub fn new(x: f32, y: f32) -> Self {
        TrackPoint { x, y }
    }

    pub fn distance_to(&self, other: &TrackPoint) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Outcome of tracking one point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackStatus {
    Tracked,
    /// Untextured window (near-singular Hessian) or a non-finite update.
    Lost,
    /// The final position fell outside the current image.
    OutOfBounds,
}

/// Per-point tracker output: new position, status and residual.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackResult {
    pub point: TrackPoint,
    pub status: TrackStatus,
    /// Mean absolute intensity difference over the window at level 0.
    /// `f32::INFINITY` for points that were not tracked.
    pub error: f32,
}

impl TrackResult {
    pub fn is_tracked(&self) -> bool {
        self.status == TrackStatus::Tracked
    }
}

/// Propagates points from a previous frame into the current one.
///
/// Implementations must return exactly one result per input point, in
/// input order, and must not fail on points that leave the image.
pub trait SparseTracker {
    fn track(
        &self,
        prev: &PreparedFrame,
        curr: &PreparedFrame,
        points: &[TrackPoint],
    ) -> Vec<TrackResult>;
}

/// Pyramidal KLT tracker.
#[derive(Debug, Clone)]
pub struct KltTracker {
    /// Patch half-size; the window is `(2 * half_window + 1)²`.
    pub half_window: usize,
    pub max_iterations: usize,
    /// Convergence threshold on |δ| in pixels.
    pub epsilon: f32,
    /// Upper bound on pyramid levels used (the pyramid may have fewer).
    pub max_levels: usize,
    /// Minimum eigenvalue of the window Hessian, normalized by window area.
    /// Points below it sit on flat or edge-only texture and are Lost.
    pub min_eigenvalue: f32,
}

impl Default for KltTracker {
    /// 21×21 window, 4 levels, 30 iterations, ε = 0.01.
    fn default() -> Self {
        KltTracker {
            half_window: 10,
            max_iterations: 30,
            epsilon: 0.01,
            max_levels: 4,
            min_eigenvalue: 1e-4,
        }
    }
}

impl KltTracker {
    pub fn new(half_window: usize, max_iterations: usize, epsilon: f32, max_levels: usize) -> Self {
        KltTracker {
            half_window,
            max_iterations,
            epsilon,
            max_levels,
            ..KltTracker::default()
        }
    }

    /// Track `points` between two pyramids built with `Pyramid::build`.
    pub fn track_pyramids(
        &self,
        prev_pyr: &Pyramid,
        curr_pyr: &Pyramid,
        points: &[TrackPoint],
    ) -> Vec<TrackResult> {
        let num_levels = self
            .max_levels
            .max(1)
            .min(prev_pyr.num_levels())
            .min(curr_pyr.num_levels());

        points
            .iter()
            .map(|p| self.track_single(prev_pyr, curr_pyr, *p, num_levels))
            .collect()
    }

    fn track_single(
        &self,
        prev_pyr: &Pyramid,
        curr_pyr: &Pyramid,
        point: TrackPoint,
        num_levels: usize,
    ) -> TrackResult {
        let lost = |at: TrackPoint| TrackResult {
            point: at,
            status: TrackStatus::Lost,
            error: f32::INFINITY,
        };

        let mut dx = 0.0f32;
        let mut dy = 0.0f32;

        for level in (0..num_levels).rev() {
            let scale = 1.0 / (1u32 << level) as f32;
            match self.align_level(
                prev_pyr.level(level),
                curr_pyr.level(level),
                point.x * scale,
                point.y * scale,
                dx,
                dy,
            ) {
                Some((ndx, ndy)) => {
                    dx = ndx;
                    dy = ndy;
                }
                None => return lost(TrackPoint::new(point.x + dx / scale, point.y + dy / scale)),
            }
            if level > 0 {
                dx *= 2.0;
                dy *= 2.0;
            }
        }

        let tracked = TrackPoint::new(point.x + dx, point.y + dy);
        if !tracked.is_finite() {
            return lost(tracked);
        }
        if !curr_pyr.base().contains(tracked.x, tracked.y) {
            return TrackResult {
                point: tracked,
                status: TrackStatus::OutOfBounds,
                error: f32::INFINITY,
            };
        }

        TrackResult {
            point: tracked,
            status: TrackStatus::Tracked,
            error: self.window_residual(prev_pyr.base(), curr_pyr.base(), point, tracked),
        }
    }

    /// Iterative alignment at one level. `None` when the window is untextured.
    fn align_level(
        &self,
        prev_img: &Image<f32>,
        curr_img: &Image<f32>,
        px: f32,
        py: f32,
        mut dx: f32,
        mut dy: f32,
    ) -> Option<(f32, f32)> {
        let half = self.half_window as isize;
        let side = 2 * self.half_window + 1;
        let area = (side * side) as f32;

        let mut template = Vec::with_capacity(side * side);
        let (mut h00, mut h01, mut h11) = (0.0f32, 0.0f32, 0.0f32);
        for wy in -half..=half {
            for wx in -half..=half {
                let tx = px + wx as f32;
                let ty = py + wy as f32;
                let t = interpolate_bilinear(prev_img, tx, ty);
                let gx = 0.5
                    * (interpolate_bilinear(prev_img, tx + 1.0, ty)
                        - interpolate_bilinear(prev_img, tx - 1.0, ty));
                let gy = 0.5
                    * (interpolate_bilinear(prev_img, tx, ty + 1.0)
                        - interpolate_bilinear(prev_img, tx, ty - 1.0));
                h00 += gx * gx;
                h01 += gx * gy;
                h11 += gy * gy;
                template.push((wx as f32, wy as f32, t, gx, gy));
            }
        }

        // Smaller eigenvalue of [[h00, h01], [h01, h11]].
        let min_eig = 0.5 * (h00 + h11 - ((h00 - h11).powi(2) + 4.0 * h01 * h01).sqrt());
        let det = h00 * h11 - h01 * h01;
        if min_eig / area < self.min_eigenvalue || det.abs() < f32::EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;

        for _ in 0..self.max_iterations {
            let (mut b0, mut b1) = (0.0f32, 0.0f32);
            for &(ox, oy, t, gx, gy) in &template {
                let e = t - interpolate_bilinear(curr_img, px + dx + ox, py + dy + oy);
                b0 += gx * e;
                b1 += gy * e;
            }

            let delta_x = inv_det * (h11 * b0 - h01 * b1);
            let delta_y = inv_det * (h00 * b1 - h01 * b0);
            if !delta_x.is_finite() || !delta_y.is_finite() {
                return None;
            }
            dx += delta_x;
            dy += delta_y;

            if delta_x * delta_x + delta_y * delta_y < self.epsilon * self.epsilon {
                break;
            }
        }

        Some((dx, dy))
    }

    fn window_residual(
        &self,
        prev_img: &Image<f32>,
        curr_img: &Image<f32>,
        from: TrackPoint,
        to: TrackPoint,
    ) -> f32 {
        let half = self.half_window as isize;
        let mut sum = 0.0f32;
        let mut n = 0usize;
        for wy in -half..=half {
            for wx in -half..=half {
                let (ox, oy) = (wx as f32, wy as f32);
                let t = interpolate_bilinear(prev_img, from.x + ox, from.y + oy);
                let i = interpolate_bilinear(curr_img, to.x + ox, to.y + oy);
                sum += (t - i).abs();
                n += 1;
            }
        }
        sum / n as f32
    }
}

impl SparseTracker for KltTracker {
    fn track(
        &self,
        prev: &PreparedFrame,
        curr: &PreparedFrame,
        points: &[TrackPoint],
    ) -> Vec<TrackResult> {
        self.track_pyramids(&prev.pyramid, &curr.pyramid, points)
    }
}
