// config.rs — Tunables of the odometry pipeline.
//
// One flat struct with the reference values as defaults. JSON files may
// set any subset of the keys; missing keys keep their defaults.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::corners::ShiTomasiDetector;
use crate::error::{OdometryError, Result};
use crate::filter::CorrespondenceFilter;
use crate::klt::KltTracker;
use crate::pose::RelativePoseEstimator;
use crate::replenish::{DedupPolicy, Replenisher};
use crate::triangulation::Triangulator;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OdometryConfig {
    /// Frames the run driver consumes before stopping normally.
    pub num_frames: usize,

    // Corner detector / replenisher
    /// Maximum number of active tracks (and of corners seeded at frame 0).
    pub max_corners: usize,
    pub quality_level: f32,
    pub min_distance: f32,
    pub corner_block_size: usize,
    pub replenish_floor: usize,
    pub replenish_dedup: DedupPolicy,

    // Tracker
    /// Window half-size; 10 gives 21×21.
    pub klt_window: usize,
    pub pyramid_levels: usize,
    pub pyramid_sigma: f32,
    pub klt_max_iterations: usize,
    pub klt_epsilon: f32,
    pub klt_min_eigenvalue: f32,

    // Correspondence filter
    pub max_displacement: f32,
    pub max_tracking_error: f32,

    // Relative pose
    pub ransac_confidence: f64,
    pub ransac_threshold_px: f64,
    pub ransac_max_iterations: usize,
    pub ransac_seed: u64,
    pub min_parallax_px: f64,
    pub cheirality_max_depth: f64,

    // Triangulation
    pub min_depth: f64,
    pub max_depth: f64,

    /// Frames averaged into the smoothed tracking error.
    pub error_smoothing_window: usize,
}

impl Default for OdometryConfig {
    fn default() -> Self {
        OdometryConfig {
            num_frames: 200,
            max_corners: 1500,
            quality_level: 0.01,
            min_distance: 7.0,
            corner_block_size: 3,
            replenish_floor: 500,
            replenish_dedup: DedupPolicy::SeparateFromSurvivors,
            klt_window: 10,
            pyramid_levels: 4,
            pyramid_sigma: 1.0,
            klt_max_iterations: 30,
            klt_epsilon: 0.01,
            klt_min_eigenvalue: 1e-4,
            max_displacement: 50.0,
            max_tracking_error: 15.0,
            ransac_confidence: 0.999,
            ransac_threshold_px: 1.0,
            ransac_max_iterations: 1000,
            ransac_seed: 42,
            min_parallax_px: 0.1,
            cheirality_max_depth: 50.0,
            min_depth: 0.1,
            max_depth: 1000.0,
            error_smoothing_window: 5,
        }
    }
}

impl OdometryConfig {
    /// Load and validate a JSON config file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            OdometryError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: OdometryConfig = serde_json::from_str(text)
            .map_err(|e| OdometryError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(OdometryError::InvalidConfig(msg));

        if self.max_corners == 0 {
            return fail("max_corners must be positive".into());
        }
        if self.replenish_floor > self.max_corners {
            return fail(format!(
                "replenish_floor ({}) exceeds max_corners ({})",
                self.replenish_floor, self.max_corners
            ));
        }
        if self.klt_window == 0 || self.pyramid_levels == 0 || self.klt_max_iterations == 0 {
            return fail("klt_window, pyramid_levels and klt_max_iterations must be positive".into());
        }
        if self.corner_block_size % 2 == 0 {
            return fail(format!("corner_block_size must be odd (got {})", self.corner_block_size));
        }
        if !(self.ransac_confidence > 0.0 && self.ransac_confidence < 1.0) {
            return fail(format!(
                "ransac_confidence must lie in (0, 1) (got {})",
                self.ransac_confidence
            ));
        }
        if self.ransac_threshold_px <= 0.0 || self.ransac_max_iterations == 0 {
            return fail("ransac_threshold_px and ransac_max_iterations must be positive".into());
        }
        if !(self.min_depth >= 0.0 && self.min_depth < self.max_depth) {
            return fail(format!(
                "depth bounds must satisfy 0 <= min_depth < max_depth (got {}..{})",
                self.min_depth, self.max_depth
            ));
        }
        if self.pyramid_sigma <= 0.0 || self.max_displacement <= 0.0 || self.max_tracking_error <= 0.0 {
            return fail("pyramid_sigma, max_displacement and max_tracking_error must be positive".into());
        }
        if self.error_smoothing_window == 0 {
            return fail("error_smoothing_window must be positive".into());
        }
        Ok(())
    }

    pub fn tracker(&self) -> KltTracker {
        KltTracker {
            half_window: self.klt_window,
            max_iterations: self.klt_max_iterations,
            epsilon: self.klt_epsilon,
            max_levels: self.pyramid_levels,
            min_eigenvalue: self.klt_min_eigenvalue,
        }
    }

    pub fn detector(&self) -> ShiTomasiDetector {
        ShiTomasiDetector::new(self.quality_level, self.min_distance, self.corner_block_size)
    }

    pub fn filter(&self, width: usize, height: usize) -> CorrespondenceFilter {
        CorrespondenceFilter::new(self.max_displacement, self.max_tracking_error, width, height)
    }

    pub fn estimator(&self) -> RelativePoseEstimator {
        RelativePoseEstimator {
            confidence: self.ransac_confidence,
            threshold_px: self.ransac_threshold_px,
            max_iterations: self.ransac_max_iterations,
            seed: self.ransac_seed,
            min_parallax_px: self.min_parallax_px,
            cheirality_max_depth: self.cheirality_max_depth,
        }
    }

    pub fn triangulator(&self) -> Triangulator {
        Triangulator::new(self.min_depth, self.max_depth)
    }

    pub fn replenisher(&self) -> Replenisher {
        Replenisher::new(self.replenish_floor, self.max_corners, self.replenish_dedup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(OdometryConfig::default().validate().is_ok());
        let t = OdometryConfig::default().tracker();
        assert_eq!(2 * t.half_window + 1, 21);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg = OdometryConfig::from_json_str(
            r#"{ "num_frames": 50, "replenish_dedup": "keep_all", "max_depth": 250.0 }"#,
        )
        .unwrap();
        assert_eq!(cfg.num_frames, 50);
        assert_eq!(cfg.replenish_dedup, DedupPolicy::KeepAll);
        assert_eq!(cfg.max_depth, 250.0);
        assert_eq!(cfg.max_corners, 1500);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = OdometryConfig::from_json_str(r#"{ "max_corner": 10 }"#).unwrap_err();
        assert!(matches!(err, OdometryError::InvalidConfig(_)));
    }

    #[test]
    fn test_floor_above_budget_rejected() {
        let cfg = OdometryConfig {
            replenish_floor: 2000,
            ..OdometryConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_inverted_depth_bounds_rejected() {
        let cfg = OdometryConfig {
            min_depth: 10.0,
            max_depth: 1.0,
            ..OdometryConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
