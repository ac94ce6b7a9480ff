// filter.rs — Correspondence filter between tracker and estimator.
//
// A tracked pair survives when the tracker succeeded, both endpoints are
// finite and inside the image, it moved less than the displacement ceiling,
// and its residual is under the error ceiling. The filter never reorders
// and never modifies a pair, so applying it twice changes nothing.

use nalgebra::Point2;

use crate::klt::{TrackPoint, TrackResult, TrackStatus};

/// Fewest correspondences the essential-matrix estimator accepts.
pub const MIN_CORRESPONDENCES: usize = 8;

/// A previous-frame point and what the tracker made of it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedPair {
    pub prev: TrackPoint,
    pub curr: TrackPoint,
    pub status: TrackStatus,
    pub error: f32,
}

impl TrackedPair {
    pub fn new(prev: TrackPoint, result: &TrackResult) -> Self {
        TrackedPair {
            prev,
            curr: result.point,
            status: result.status,
            error: result.error,
        }
    }

    pub fn displacement(&self) -> f32 {
        self.prev.distance_to(&self.curr)
    }

    pub fn correspondence(&self) -> Correspondence {
        Correspondence {
            prev: Point2::new(self.prev.x as f64, self.prev.y as f64),
            curr: Point2::new(self.curr.x as f64, self.curr.y as f64),
        }
    }
}

/// Pair tracker inputs with outputs, index by index.
///
/// # Panics
/// Panics if the tracker returned a different number of results than it
/// was given points.
pub fn pair_tracks(prev: &[TrackPoint], results: &[TrackResult]) -> Vec<TrackedPair> {
    assert_eq!(
        prev.len(),
        results.len(),
        "tracker returned {} results for {} points",
        results.len(),
        prev.len()
    );
    prev.iter()
        .zip(results)
        .map(|(p, r)| TrackedPair::new(*p, r))
        .collect()
}

/// A surviving pair in pixel coordinates, consumed by pose estimation
/// and triangulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub prev: Point2<f64>,
    pub curr: Point2<f64>,
}

impl Correspondence {
    pub fn new(prev: Point2<f64>, curr: Point2<f64>) -> Self {
        Correspondence { prev, curr }
    }

    /// Pixel displacement between the two views.
    pub fn parallax(&self) -> f64 {
        (self.curr - self.prev).norm()
    }
}

#[derive(Debug, Clone)]
pub struct CorrespondenceFilter {
    /// Pairs must move strictly less than this many pixels.
    pub max_displacement: f32,
    /// Pairs must have a residual strictly below this.
    pub max_error: f32,
    pub width: usize,
    pub height: usize,
}

impl CorrespondenceFilter {
    pub fn new(max_displacement: f32, max_error: f32, width: usize, height: usize) -> Self {
        CorrespondenceFilter {
            max_displacement,
            max_error,
            width,
            height,
        }
    }

    pub fn accepts(&self, pair: &TrackedPair) -> bool {
        pair.status == TrackStatus::Tracked
            && self.in_bounds(&pair.prev)
            && self.in_bounds(&pair.curr)
            && pair.displacement() < self.max_displacement
            && pair.error < self.max_error
    }

    /// Surviving pairs, in input order.
    pub fn apply(&self, pairs: &[TrackedPair]) -> Vec<TrackedPair> {
        pairs.iter().filter(|p| self.accepts(p)).copied().collect()
    }

    fn in_bounds(&self, p: &TrackPoint) -> bool {
        p.is_finite()
            && p.x >= 0.0
            && p.y >= 0.0
            && p.x < self.width as f32
            && p.y < self.height as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(px: f32, py: f32, cx: f32, cy: f32, status: TrackStatus, error: f32) -> TrackedPair {
        TrackedPair {
            prev: TrackPoint::new(px, py),
            curr: TrackPoint::new(cx, cy),
            status,
            error,
        }
    }

    fn filter() -> CorrespondenceFilter {
        CorrespondenceFilter::new(50.0, 15.0, 640, 480)
    }

    #[test]
    fn test_each_rule_rejects() {
        let f = filter();
        assert!(f.accepts(&pair(10.0, 10.0, 12.0, 11.0, TrackStatus::Tracked, 3.0)));
        assert!(!f.accepts(&pair(10.0, 10.0, 12.0, 11.0, TrackStatus::Lost, 3.0)));
        assert!(!f.accepts(&pair(10.0, 10.0, 70.0, 10.0, TrackStatus::Tracked, 3.0)));
        assert!(!f.accepts(&pair(10.0, 10.0, 12.0, 11.0, TrackStatus::Tracked, 15.0)));
        assert!(!f.accepts(&pair(10.0, 10.0, -0.5, 11.0, TrackStatus::Tracked, 3.0)));
        assert!(!f.accepts(&pair(10.0, 10.0, f32::NAN, 11.0, TrackStatus::Tracked, 3.0)));
    }

    #[test]
    fn test_displacement_ceiling_is_strict() {
        let f = filter();
        assert!(!f.accepts(&pair(0.0, 0.0, 30.0, 40.0, TrackStatus::Tracked, 1.0)));
        assert!(f.accepts(&pair(0.0, 0.0, 29.0, 40.0, TrackStatus::Tracked, 1.0)));
    }

    #[test]
    fn test_order_preserved() {
        let pairs = vec![
            pair(1.0, 1.0, 2.0, 2.0, TrackStatus::Tracked, 1.0),
            pair(5.0, 5.0, 6.0, 6.0, TrackStatus::OutOfBounds, 1.0),
            pair(3.0, 3.0, 4.0, 4.0, TrackStatus::Tracked, 1.0),
        ];
        let kept = filter().apply(&pairs);
        assert_eq!(kept, vec![pairs[0], pairs[2]]);
    }

    #[test]
    fn test_pair_tracks_zips_in_order() {
        let prev = [TrackPoint::new(1.0, 2.0), TrackPoint::new(3.0, 4.0)];
        let results = [
            TrackResult {
                point: TrackPoint::new(1.5, 2.0),
                status: TrackStatus::Tracked,
                error: 0.5,
            },
            TrackResult {
                point: TrackPoint::new(3.0, 4.0),
                status: TrackStatus::Lost,
                error: f32::INFINITY,
            },
        ];
        let pairs = pair_tracks(&prev, &results);
        assert_eq!(pairs[0].prev, prev[0]);
        assert_eq!(pairs[0].curr, TrackPoint::new(1.5, 2.0));
        assert_eq!(pairs[1].status, TrackStatus::Lost);
        assert!((pairs[0].correspondence().parallax() - 0.5).abs() < 1e-9);
    }
}
