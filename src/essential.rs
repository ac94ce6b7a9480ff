// essential.rs -- Essential matrix estimation with RANSAC.
//
// The essential matrix E encodes the epipolar constraint between two
// calibrated views: x2^T * E * x1 = 0, where x1 and x2 are normalized
// coordinates (K^{-1} applied) in the previous and current frames.
//
// Algorithm: normalized 8-point (Hartley 1997).
//   1. Hartley normalization of each point set (centroid to origin,
//      mean distance sqrt(2)) for conditioning
//   2. Accumulate the 9x9 normal matrix M = sum a a^T, one constraint
//      row a per correspondence
//   3. Right singular vector of M with the smallest singular value -> E
//   4. Enforce rank 2, undo the normalization
//   5. Project onto the essential manifold (two equal singular values)
//
// RANSAC samples 8 correspondences per hypothesis, scores inliers by
// Sampson distance, adapts the iteration count to the observed inlier
// ratio, and finally refits on the consensus set.

use nalgebra::{Matrix3, SMatrix, Vector3, SVD};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

use crate::filter::{Correspondence, MIN_CORRESPONDENCES};

/// Result of robust essential matrix estimation.
#[derive(Debug, Clone)]
pub struct EssentialEstimate {
    /// Essential matrix in normalized coordinates, unit Frobenius norm.
    pub e: Matrix3<f64>,
    /// Inlier mask over the input correspondences.
    pub inliers: Vec<bool>,
    pub num_inliers: usize,
    /// Hypotheses evaluated.
    pub iterations: usize,
}

#[derive(Debug, Clone)]
pub struct RansacConfig {
    pub max_iterations: usize,
    /// Inlier threshold on the Sampson distance, in normalized units
    /// (a squared distance; see `threshold_from_pixels`).
    pub threshold: f64,
    /// Stop once the probability of having drawn an all-inlier sample
    /// exceeds this.
    pub confidence: f64,
    /// Seed for hypothesis sampling; equal inputs give equal results.
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        RansacConfig {
            max_iterations: 1000,
            threshold: threshold_from_pixels(1.0, 707.0),
            confidence: 0.999,
            seed: 42,
        }
    }
}

/// Sampson threshold equivalent to `pixels` of epipolar error at `focal`.
pub fn threshold_from_pixels(pixels: f64, focal: f64) -> f64 {
    let t = pixels / focal;
    t * t
}

// ============================================================
// 8-point algorithm
// ============================================================

/// Essential matrix from >= 8 normalized correspondences (no RANSAC).
///
/// Returns `None` for fewer than 8 points or a numerically null solution.
pub fn eight_point(correspondences: &[Correspondence]) -> Option<Matrix3<f64>> {
    if correspondences.len() < MIN_CORRESPONDENCES {
        return None;
    }

    let (t1, t2) = hartley_transforms(correspondences);

    let mut m = SMatrix::<f64, 9, 9>::zeros();
    for c in correspondences {
        let p1 = t1 * c.prev.to_homogeneous();
        let p2 = t2 * c.curr.to_homogeneous();
        let (x1, y1, x2, y2) = (p1.x, p1.y, p2.x, p2.y);
        let a = SMatrix::<f64, 9, 1>::from_column_slice(&[
            x2 * x1, x2 * y1, x2, //
            y2 * x1, y2 * y1, y2, //
            x1, y1, 1.0,
        ]);
        m += a * a.transpose();
    }

    let svd = SVD::new(m, false, true);
    let v_t = svd.v_t?;
    let row = v_t.row(svd.singular_values.imin());
    let e_norm = Matrix3::new(
        row[0], row[1], row[2], //
        row[3], row[4], row[5], //
        row[6], row[7], row[8],
    );

    let svd_e = SVD::new(e_norm, true, true);
    let (u, v_t) = (svd_e.u?, svd_e.v_t?);
    let s = svd_e.singular_values;
    let rank2 = u * Matrix3::from_diagonal(&Vector3::new(s[0], s[1], 0.0)) * v_t;

    project_to_essential(&(t2.transpose() * rank2 * t1))
}

/// Closest matrix with singular values (1, 1, 0), scaled to unit Frobenius norm.
pub fn project_to_essential(e: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    let svd = SVD::new(*e, true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);
    if svd.singular_values.max() < 1e-15 {
        return None;
    }
    let projected = u * Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, 0.0)) * v_t;
    let norm = projected.norm();
    Some(projected / norm)
}

// ============================================================
// RANSAC
// ============================================================

/// Robust essential matrix over normalized correspondences.
///
/// Returns `None` when fewer than 8 correspondences are given or no
/// hypothesis gathers 8 inliers.
pub fn estimate_essential_ransac(
    correspondences: &[Correspondence],
    config: &RansacConfig,
) -> Option<EssentialEstimate> {
    let n = correspondences.len();
    if n < MIN_CORRESPONDENCES {
        return None;
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best: Option<(Matrix3<f64>, Vec<bool>, usize)> = None;
    let mut adaptive_max = config.max_iterations;
    let mut iterations = 0;
    let mut sample = Vec::with_capacity(MIN_CORRESPONDENCES);

    while iterations < adaptive_max {
        iterations += 1;

        sample.clear();
        sample.extend(
            index::sample(&mut rng, n, MIN_CORRESPONDENCES)
                .into_iter()
                .map(|i| correspondences[i]),
        );
        let Some(e) = eight_point(&sample) else {
            continue;
        };

        let (inliers, count) = score(&e, correspondences, config.threshold);
        let best_count = best.as_ref().map_or(0, |b| b.2);
        if count > best_count {
            best = Some((e, inliers, count));

            let w = count as f64 / n as f64;
            let p_fail = (1.0 - w.powi(MIN_CORRESPONDENCES as i32)).max(1e-15);
            if p_fail < 1.0 {
                let k = (1.0 - config.confidence).ln() / p_fail.ln();
                adaptive_max = (k.ceil().max(1.0) as usize).min(config.max_iterations);
            }
        }
    }

    let (mut e, mut inliers, mut num_inliers) = best?;
    if num_inliers < MIN_CORRESPONDENCES {
        return None;
    }

    // Refit on the consensus set; keep it only if support does not shrink.
    let consensus: Vec<Correspondence> = correspondences
        .iter()
        .zip(&inliers)
        .filter(|(_, &is_inlier)| is_inlier)
        .map(|(c, _)| *c)
        .collect();
    if let Some(refined) = eight_point(&consensus) {
        let (refined_inliers, refined_count) = score(&refined, correspondences, config.threshold);
        if refined_count >= num_inliers {
            e = refined;
            inliers = refined_inliers;
            num_inliers = refined_count;
        }
    }

    Some(EssentialEstimate {
        e,
        inliers,
        num_inliers,
        iterations,
    })
}

fn score(e: &Matrix3<f64>, correspondences: &[Correspondence], threshold: f64) -> (Vec<bool>, usize) {
    let inliers: Vec<bool> = correspondences
        .iter()
        .map(|c| sampson_distance(e, c) < threshold)
        .collect();
    let count = inliers.iter().filter(|&&b| b).count();
    (inliers, count)
}

// ============================================================
// Error metrics
// ============================================================

/// Sampson distance, a first-order approximation of the squared geometric
/// distance to the epipolar lines:
///   d = (x2^T E x1)^2 / ((E x1)_1^2 + (E x1)_2^2 + (E^T x2)_1^2 + (E^T x2)_2^2)
pub fn sampson_distance(e: &Matrix3<f64>, c: &Correspondence) -> f64 {
    let x1 = c.prev.to_homogeneous();
    let x2 = c.curr.to_homogeneous();
    let ex1 = e * x1;
    let etx2 = e.transpose() * x2;
    let num = x2.dot(&ex1);
    let denom = ex1.x * ex1.x + ex1.y * ex1.y + etx2.x * etx2.x + etx2.y * etx2.y;
    if denom < 1e-30 {
        return f64::MAX;
    }
    num * num / denom
}

/// Algebraic epipolar residual x2^T E x1.
pub fn epipolar_error(e: &Matrix3<f64>, c: &Correspondence) -> f64 {
    c.curr.to_homogeneous().dot(&(e * c.prev.to_homogeneous()))
}

// ============================================================
// Hartley normalization
// ============================================================

fn hartley_transforms(corrs: &[Correspondence]) -> (Matrix3<f64>, Matrix3<f64>) {
    (
        hartley_transform(corrs.iter().map(|c| (c.prev.x, c.prev.y))),
        hartley_transform(corrs.iter().map(|c| (c.curr.x, c.curr.y))),
    )
}

/// Similarity moving the centroid to the origin with mean distance sqrt(2).
fn hartley_transform(points: impl Iterator<Item = (f64, f64)> + Clone) -> Matrix3<f64> {
    let n = points.clone().count().max(1) as f64;
    let (sx, sy) = points.clone().fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));
    let (mx, my) = (sx / n, sy / n);
    let mean_dist = points
        .map(|(x, y)| ((x - mx).powi(2) + (y - my).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let s = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    Matrix3::new(
        s, 0.0, -s * mx, //
        0.0, s, -s * my, //
        0.0, 0.0, 1.0,
    )
}
