// corners.rs — Shi-Tomasi corner detector.
//
// Algorithm:
//   1. Sobel gradients Ix, Iy
//   2. Structure tensor M = Σ_window [[Ix², IxIy], [IxIy, Iy²]] (box window)
//   3. Cornerness = smaller eigenvalue of M
//        λmin = (a + b)/2 − sqrt(((a − b)/2)² + c²)
//   4. Keep pixels with λmin ≥ quality_level · max(λmin) that are 3×3 local maxima
//   5. Greedy pick, strongest first, rejecting anything closer than
//      min_distance to an accepted corner (or to a caller-supplied point)
//
// Unlike the Harris score, λmin has an absolute meaning (the weaker of the
// two gradient directions), and the relative threshold makes the detector
// independent of image contrast.

use std::cmp::Ordering;

use crate::convolution::{box_kernel_1d, convolve_separable};
use crate::gradient::sobel_xy;
use crate::image::{Image, Pixel};
use crate::klt::TrackPoint;
use crate::occupancy::SeparationGrid;
use crate::source::PreparedFrame;

/// A detected corner with its cornerness score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corner {
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

impl Corner {
    pub fn point(&self) -> TrackPoint {
        TrackPoint::new(self.x, self.y)
    }
}

/// Seeds new tracks in a frame.
///
/// Returns at most `max_corners` points, none of them closer than the
/// detector's separation radius to each other or to any of `existing`.
pub trait CornerDetector {
    fn detect(
        &self,
        frame: &PreparedFrame,
        max_corners: usize,
        existing: &[TrackPoint],
    ) -> Vec<TrackPoint>;
}

#[derive(Debug, Clone)]
pub struct ShiTomasiDetector {
    /// Fraction of the strongest response a corner must reach (0.01 = 1%).
    pub quality_level: f32,
    /// Minimum Euclidean distance between returned corners, in pixels.
    pub min_distance: f32,
    /// Side of the structure-tensor window (odd).
    pub block_size: usize,
}

impl Default for ShiTomasiDetector {
    fn default() -> Self {
        ShiTomasiDetector {
            quality_level: 0.01,
            min_distance: 7.0,
            block_size: 3,
        }
    }
}

impl ShiTomasiDetector {
    pub fn new(quality_level: f32, min_distance: f32, block_size: usize) -> Self {
        ShiTomasiDetector {
            quality_level,
            min_distance,
            block_size,
        }
    }

    /// Min-eigenvalue response image.
    pub fn corner_response<T: Pixel>(&self, image: &Image<T>) -> Image<f32> {
        let (ix, iy) = sobel_xy(image);
        let w = image.width();
        let h = image.height();

        let ix2 = Image::from_fn(w, h, |x, y| ix.get(x, y) * ix.get(x, y));
        let iy2 = Image::from_fn(w, h, |x, y| iy.get(x, y) * iy.get(x, y));
        let ixiy = Image::from_fn(w, h, |x, y| ix.get(x, y) * iy.get(x, y));

        let window = box_kernel_1d(self.block_size);
        let sxx = convolve_separable(&ix2, &window, &window);
        let syy = convolve_separable(&iy2, &window, &window);
        let sxy = convolve_separable(&ixiy, &window, &window);

        Image::from_fn(w, h, |x, y| {
            let a = sxx.get(x, y);
            let b = syy.get(x, y);
            let c = sxy.get(x, y);
            let half_diff = 0.5 * (a - b);
            (0.5 * (a + b) - (half_diff * half_diff + c * c).sqrt()).max(0.0)
        })
    }

    /// Strongest well-separated corners, sorted by descending score.
    pub fn detect_corners<T: Pixel>(&self, image: &Image<T>, max_corners: usize) -> Vec<Corner> {
        self.detect_excluding(image, max_corners, &[])
    }

    /// Like `detect_corners`, but also keeps `min_distance` from `existing`.
    /// Existing points do not count towards `max_corners`.
    pub fn detect_excluding<T: Pixel>(
        &self,
        image: &Image<T>,
        max_corners: usize,
        existing: &[TrackPoint],
    ) -> Vec<Corner> {
        let w = image.width();
        let h = image.height();
        let border = self.block_size / 2 + 1;
        if max_corners == 0 || w <= 2 * border || h <= 2 * border {
            return Vec::new();
        }

        let response = self.corner_response(image);
        let max_response = response.as_slice().iter().copied().fold(0.0f32, f32::max);
        if max_response <= 0.0 {
            return Vec::new();
        }
        let threshold = self.quality_level * max_response;

        let mut candidates = Vec::new();
        for y in border..h - border {
            for x in border..w - border {
                let r = response.get(x, y);
                if r > 0.0 && r >= threshold && is_local_max(&response, x, y, r) {
                    candidates.push(Corner {
                        x: x as f32,
                        y: y as f32,
                        score: r,
                    });
                }
            }
        }
        // Stable sort: equal scores keep raster order.
        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

        let mut grid = SeparationGrid::new(w, h, self.min_distance);
        for p in existing {
            grid.insert(p.x, p.y);
        }

        let mut corners = Vec::with_capacity(max_corners.min(candidates.len()));
        for c in candidates {
            if corners.len() >= max_corners {
                break;
            }
            if grid.try_insert(c.x, c.y) {
                corners.push(c);
            }
        }
        corners
    }
}

impl CornerDetector for ShiTomasiDetector {
    fn detect(
        &self,
        frame: &PreparedFrame,
        max_corners: usize,
        existing: &[TrackPoint],
    ) -> Vec<TrackPoint> {
        self.detect_excluding(&frame.image, max_corners, existing)
            .iter()
            .map(Corner::point)
            .collect()
    }
}

/// `r` is at least every value in the 3×3 neighbourhood of (x, y).
fn is_local_max(response: &Image<f32>, x: usize, y: usize, r: f32) -> bool {
    for dy in -1isize..=1 {
        for dx in -1isize..=1 {
            if response.get_clamped(x as isize + dx, y as isize + dy) > r {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_chessboard(size: usize, cell: usize) -> Image<u8> {
        Image::from_fn(size, size, |x, y| {
            if (x / cell + y / cell) % 2 == 0 {
                20
            } else {
                230
            }
        })
    }

    #[test]
    fn test_flat_image_has_no_corners() {
        let img = Image::from_vec(40, 40, vec![128u8; 1600]);
        assert!(ShiTomasiDetector::default().detect_corners(&img, 100).is_empty());
    }

    #[test]
    fn test_straight_edge_has_weak_response() {
        // Along an infinite edge one eigenvalue vanishes.
        let img = Image::<u8>::from_fn(40, 40, |x, _| if x < 20 { 50 } else { 200 });
        let resp = ShiTomasiDetector::default().corner_response(&img);
        assert!(resp.get(20, 20) < 1e-3, "edge response {}", resp.get(20, 20));
    }

    #[test]
    fn test_chessboard_corners_near_junctions() {
        let cell = 10;
        let img = make_chessboard(80, cell);
        let corners = ShiTomasiDetector::default().detect_corners(&img, 100);
        assert!(corners.len() >= 20, "only {} corners", corners.len());
        for c in &corners {
            let jx = (c.x / cell as f32).round() * cell as f32;
            let jy = (c.y / cell as f32).round() * cell as f32;
            let d = ((c.x - jx).powi(2) + (c.y - jy).powi(2)).sqrt();
            assert!(d <= 2.0, "corner ({}, {}) is {d:.1}px from a junction", c.x, c.y);
        }
    }

    #[test]
    fn test_respects_max_and_min_distance() {
        let img = make_chessboard(100, 5);
        let det = ShiTomasiDetector::new(0.01, 12.0, 3);
        let corners = det.detect_corners(&img, 15);
        assert!(corners.len() <= 15);
        for (i, a) in corners.iter().enumerate() {
            for b in &corners[i + 1..] {
                assert!(a.point().distance_to(&b.point()) >= 12.0);
            }
        }
    }

    #[test]
    fn test_sorted_by_score() {
        let img = make_chessboard(80, 10);
        let corners = ShiTomasiDetector::default().detect_corners(&img, 50);
        assert!(corners.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_existing_points_block_neighbourhood() {
        let img = make_chessboard(80, 10);
        let det = ShiTomasiDetector::default();
        let existing = [TrackPoint::new(40.0, 40.0)];
        let corners = det.detect_excluding(&img, 100, &existing);
        assert!(!corners.is_empty());
        assert!(corners.iter().all(|c| c.point().distance_to(&existing[0]) >= 7.0));
    }
}
