// pose.rs -- Relative pose from an essential matrix.
//
// E = U diag(1, 1, 0) V^T factors into four (R, t) pairs:
//
//   R_a = U W V^T,   R_b = U W^T V^T,   t = +/- u3
//   W = [[0, -1, 0], [1, 0, 0], [0, 0, 1]]
//
// Only one places the scene in front of both cameras. Each candidate
// triangulates the inliers and the one with the most points of positive
// depth in both views wins (cheirality vote).
//
// Convention: the pose maps previous-camera coordinates to current-camera
// coordinates, X_curr = R X_prev + t. |t| = 1 carries no metric meaning.

use nalgebra::{Matrix3, Point3, Rotation3, Unit, Vector3, SVD};

use crate::camera::{extrinsic_matrix, CameraIntrinsics};
use crate::error::Degeneracy;
use crate::essential::{estimate_essential_ransac, threshold_from_pixels, RansacConfig};
use crate::filter::{Correspondence, MIN_CORRESPONDENCES};
use crate::triangulation::triangulate_dlt;

/// Failure reasons of `RelativePoseEstimator::estimate`.
pub type PoseError = Degeneracy;

/// Rotation and unit translation direction from the previous to the
/// current camera frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativePose {
    pub rotation: Rotation3<f64>,
    pub translation: Unit<Vector3<f64>>,
}

impl RelativePose {
    /// Normalizes `translation` to unit length.
    ///
    /// # Panics
    /// Panics if `translation` is zero.
    pub fn new(rotation: Rotation3<f64>, translation: Vector3<f64>) -> Self {
        RelativePose {
            rotation,
            translation: Unit::new_normalize(translation),
        }
    }

    /// X_curr = R X_prev + t.
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation * p + self.translation.as_ref()
    }
}

/// The four (R, t) factorizations of E, in the order
/// (R_a, t), (R_b, t), (R_a, -t), (R_b, -t).
pub fn decompose_essential(e: &Matrix3<f64>) -> Option<[RelativePose; 4]> {
    let svd = SVD::new(*e, true, true);
    let mut u = svd.u?;
    let mut v_t = svd.v_t?;

    // Proper rotations need det(U) = det(V) = +1; flipping the sign of
    // either only flips the sign of E.
    if u.determinant() < 0.0 {
        u = -u;
    }
    if v_t.determinant() < 0.0 {
        v_t = -v_t;
    }

    let w = Matrix3::new(
        0.0, -1.0, 0.0, //
        1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0,
    );
    let r_a = Rotation3::from_matrix_unchecked(u * w * v_t);
    let r_b = Rotation3::from_matrix_unchecked(u * w.transpose() * v_t);
    let t = Unit::new_normalize(u.column(2).into_owned());
    let neg_t = -t;

    Some([
        RelativePose { rotation: r_a, translation: t },
        RelativePose { rotation: r_b, translation: t },
        RelativePose { rotation: r_a, translation: neg_t },
        RelativePose { rotation: r_b, translation: neg_t },
    ])
}

/// Mask of the `candidates` (normalized coordinates) that triangulate in
/// front of both cameras within `max_depth` baselines, restricted to `mask`.
pub fn cheirality_mask(
    pose: &RelativePose,
    normalized: &[Correspondence],
    mask: &[bool],
    max_depth: f64,
) -> Vec<bool> {
    let p0 = extrinsic_matrix(&Rotation3::identity(), &Vector3::zeros());
    let p1 = extrinsic_matrix(&pose.rotation, pose.translation.as_ref());
    normalized
        .iter()
        .zip(mask)
        .map(|(c, &inlier)| {
            inlier
                && triangulate_dlt(&p0, &p1, &c.prev, &c.curr).is_some_and(|x| {
                    let z_curr = pose.transform_point(&x).z;
                    x.z > 0.0 && z_curr > 0.0 && x.z < max_depth
                })
        })
        .collect()
}

/// Candidate with the most cheirality support, its support mask and count.
///
/// Ties keep the earlier candidate. `None` when no candidate has support.
pub fn select_by_cheirality(
    candidates: &[RelativePose],
    normalized: &[Correspondence],
    mask: &[bool],
    max_depth: f64,
) -> Option<(RelativePose, Vec<bool>, usize)> {
    let mut best: Option<(RelativePose, Vec<bool>, usize)> = None;
    for candidate in candidates {
        let support = cheirality_mask(candidate, normalized, mask, max_depth);
        let count = support.iter().filter(|&&b| b).count();
        if count > best.as_ref().map_or(0, |b| b.2) {
            best = Some((*candidate, support, count));
        }
    }
    best
}

/// Output of a successful estimate.
#[derive(Debug, Clone)]
pub struct RelativePoseEstimate {
    pub pose: RelativePose,
    /// RANSAC inliers that also passed the cheirality test for `pose`.
    pub inliers: Vec<bool>,
    pub num_inliers: usize,
    /// Inliers of the essential matrix alone, before the cheirality vote.
    pub ransac_inliers: usize,
    pub ransac_iterations: usize,
}

/// Robust relative pose from pixel correspondences.
#[derive(Debug, Clone)]
pub struct RelativePoseEstimator {
    pub confidence: f64,
    /// Epipolar inlier threshold in pixels.
    pub threshold_px: f64,
    pub max_iterations: usize,
    pub seed: u64,
    /// Median pixel displacement below which the pair is declared static.
    pub min_parallax_px: f64,
    /// Cheirality votes ignore points farther than this, in baselines.
    pub cheirality_max_depth: f64,
}

impl Default for RelativePoseEstimator {
    fn default() -> Self {
        RelativePoseEstimator {
            confidence: 0.999,
            threshold_px: 1.0,
            max_iterations: 1000,
            seed: 42,
            min_parallax_px: 0.1,
            cheirality_max_depth: 50.0,
        }
    }
}

impl RelativePoseEstimator {
    pub fn estimate(
        &self,
        correspondences: &[Correspondence],
        camera: &CameraIntrinsics,
    ) -> Result<RelativePoseEstimate, PoseError> {
        let total = correspondences.len();
        if total < MIN_CORRESPONDENCES {
            return Err(Degeneracy::NoConsensus { total });
        }

        let median_px = median_parallax(correspondences);
        if median_px < self.min_parallax_px {
            return Err(Degeneracy::NoParallax {
                median_px,
                min_px: self.min_parallax_px,
            });
        }

        let normalized: Vec<Correspondence> = correspondences
            .iter()
            .map(|c| Correspondence::new(camera.normalize(&c.prev), camera.normalize(&c.curr)))
            .collect();

        let ransac = RansacConfig {
            max_iterations: self.max_iterations,
            threshold: threshold_from_pixels(self.threshold_px, camera.mean_focal()),
            confidence: self.confidence,
            seed: self.seed,
        };
        let essential =
            estimate_essential_ransac(&normalized, &ransac).ok_or(Degeneracy::NoConsensus { total })?;

        let candidates =
            decompose_essential(&essential.e).ok_or(Degeneracy::NoConsensus { total })?;
        let (pose, inliers, num_inliers) = select_by_cheirality(
            &candidates,
            &normalized,
            &essential.inliers,
            self.cheirality_max_depth,
        )
        .ok_or(Degeneracy::NoCheiralitySupport)?;

        Ok(RelativePoseEstimate {
            pose,
            inliers,
            num_inliers,
            ransac_inliers: essential.num_inliers,
            ransac_iterations: essential.iterations,
        })
    }
}

/// Median pixel displacement over all correspondences (0 when empty).
pub fn median_parallax(correspondences: &[Correspondence]) -> f64 {
    let mut d: Vec<f64> = correspondences.iter().map(Correspondence::parallax).collect();
    if d.is_empty() {
        return 0.0;
    }
    d.sort_by(f64::total_cmp);
    let mid = d.len() / 2;
    if d.len() % 2 == 0 {
        0.5 * (d[mid - 1] + d[mid])
    } else {
        d[mid]
    }
}
