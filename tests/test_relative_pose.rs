// tests/test_relative_pose.rs — Relative pose recovery from synthetic views.
//
// A known 3-D scene is projected through the KITTI intrinsics into two
// cameras related by (R*, t*). The estimator sees pixel coordinates only.

mod common;

use nalgebra::{Matrix3, Point2, Point3, Rotation3, Vector3};

use rudolf_vo::camera::CameraIntrinsics;
use rudolf_vo::error::Degeneracy;
use rudolf_vo::filter::Correspondence;
use rudolf_vo::pose::{cheirality_mask, decompose_essential, RelativePoseEstimator};
use rudolf_vo::triangulation::Triangulator;

use common::rotation_error;

/// Small deterministic generator in [0, 1).
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }

    fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next()
    }
}

struct Scene {
    camera: CameraIntrinsics,
    rotation: Rotation3<f64>,
    translation: Vector3<f64>,
    /// Scene points in the previous camera frame.
    points: Vec<Point3<f64>>,
    correspondences: Vec<Correspondence>,
}

/// Points visible in both views; `t` should have unit norm so depths read
/// in baselines.
fn scene(rotation: Rotation3<f64>, translation: Vector3<f64>, n: usize, seed: u64) -> Scene {
    let camera = CameraIntrinsics::kitti_00_02();
    let mut rng = Lcg(seed);
    let mut points = Vec::new();
    let mut correspondences = Vec::new();
    while correspondences.len() < n {
        let z = rng.range(5.0, 30.0);
        let p = Point3::new(rng.range(-0.7, 0.7) * z, rng.range(-0.2, 0.2) * z, z);
        let q = rotation * p + translation;
        let (Some(a), Some(b)) = (camera.project(&p), camera.project(&q)) else {
            continue;
        };
        let inside = |x: &Point2<f64>| {
            x.x >= 0.0 && x.y >= 0.0 && x.x < camera.width() as f64 && x.y < camera.height() as f64
        };
        if inside(&a) && inside(&b) {
            points.push(p);
            correspondences.push(Correspondence::new(a, b));
        }
    }
    Scene {
        camera,
        rotation,
        translation,
        points,
        correspondences,
    }
}

// ===== Recovery of R* and t* =====

#[test]
fn noiseless_recovery_is_exact() {
    let r = Rotation3::from_euler_angles(0.01, 0.04, -0.005);
    let t = Vector3::new(0.2, -0.05, 1.0).normalize();
    let s = scene(r, t, 120, 1);

    let est = RelativePoseEstimator::default().estimate(&s.correspondences, &s.camera).unwrap();
    assert!(rotation_error(&est.pose.rotation, &s.rotation) < 1e-6);
    assert!(est.pose.translation.dot(&s.translation) > 1.0 - 1e-9);
    assert_eq!(est.num_inliers, 120);
    assert!(est.inliers.iter().all(|&b| b));
}

#[test]
fn sideways_motion_recovered() {
    let r = Rotation3::from_euler_angles(0.0, -0.03, 0.0);
    let t = Vector3::new(-1.0, 0.0, 0.1).normalize();
    let s = scene(r, t, 100, 2);

    let est = RelativePoseEstimator::default().estimate(&s.correspondences, &s.camera).unwrap();
    assert!(rotation_error(&est.pose.rotation, &r) < 1e-6);
    assert!(est.pose.translation.dot(&t) > 1.0 - 1e-9, "sign flipped: {:?}", est.pose.translation);
}

#[test]
fn noisy_recovery_with_outliers() {
    let r = Rotation3::from_euler_angles(0.02, 0.05, 0.01);
    let t = Vector3::new(0.1, 0.05, 1.0).normalize();
    let mut s = scene(r, t, 200, 3);

    let mut rng = Lcg(99);
    let mut outliers = Vec::new();
    for (i, c) in s.correspondences.iter_mut().enumerate() {
        c.curr.x += rng.range(-0.3, 0.3);
        c.curr.y += rng.range(-0.3, 0.3);
        if i % 5 == 0 {
            // Gross mismatch: 20–40 px off in both axes.
            let sign = |b: bool| if b { 1.0 } else { -1.0 };
            c.curr.x += sign(rng.next() < 0.5) * rng.range(20.0, 40.0);
            c.curr.y += sign(rng.next() < 0.5) * rng.range(20.0, 40.0);
            outliers.push(i);
        }
    }

    let est = RelativePoseEstimator::default().estimate(&s.correspondences, &s.camera).unwrap();
    let err = rotation_error(&est.pose.rotation, &r);
    let cos = est.pose.translation.dot(&t);
    assert!(err < 0.014, "rotation error {err}");
    assert!(cos > 0.99, "translation cosine {cos}");

    let rejected = outliers.iter().filter(|&&i| !est.inliers[i]).count();
    assert!(rejected * 10 >= outliers.len() * 9, "{rejected}/{} outliers rejected", outliers.len());
    assert!(est.num_inliers >= 140, "{} inliers", est.num_inliers);
}

#[test]
fn estimation_is_deterministic() {
    let s = scene(Rotation3::from_euler_angles(0.0, 0.02, 0.0), Vector3::z(), 60, 4);
    let est = RelativePoseEstimator::default();
    let a = est.estimate(&s.correspondences, &s.camera).unwrap();
    let b = est.estimate(&s.correspondences, &s.camera).unwrap();
    assert_eq!(a.pose, b.pose);
    assert_eq!(a.inliers, b.inliers);
}

// ===== Four-way ambiguity =====

#[test]
fn exactly_one_candidate_passes_cheirality() {
    let r = Rotation3::from_euler_angles(0.0, 0.05, 0.0);
    let t = Vector3::new(0.3, 0.0, 1.0).normalize();
    let s = scene(r, t, 50, 5);

    let e = Matrix3::new(
        0.0, -t.z, t.y, //
        t.z, 0.0, -t.x, //
        -t.y, t.x, 0.0,
    ) * r.matrix();
    let candidates = decompose_essential(&e).unwrap();
    let all = vec![true; s.correspondences.len()];
    let normalized: Vec<Correspondence> = s
        .correspondences
        .iter()
        .map(|c| Correspondence::new(s.camera.normalize(&c.prev), s.camera.normalize(&c.curr)))
        .collect();
    let full_support: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| {
            cheirality_mask(c, &normalized, &all, 50.0)
                .iter()
                .all(|&b| b)
        })
        .map(|(i, _)| i)
        .collect();
    assert_eq!(full_support.len(), 1);
}

// ===== Degenerate input =====

#[test]
fn too_few_correspondences_have_no_consensus() {
    let s = scene(Rotation3::identity(), Vector3::z(), 7, 6);
    let err = RelativePoseEstimator::default().estimate(&s.correspondences, &s.camera).unwrap_err();
    assert_eq!(err, Degeneracy::NoConsensus { total: 7 });
}

#[test]
fn static_correspondences_have_no_parallax() {
    let s = scene(Rotation3::identity(), Vector3::z(), 30, 7);
    let frozen: Vec<Correspondence> =
        s.correspondences.iter().map(|c| Correspondence::new(c.prev, c.prev)).collect();
    let err = RelativePoseEstimator::default().estimate(&frozen, &s.camera).unwrap_err();
    assert!(matches!(err, Degeneracy::NoParallax { median_px, .. } if median_px == 0.0));
}

// ===== Estimate feeds triangulation =====

#[test]
fn estimated_pose_reconstructs_scene_in_current_frame() {
    let r = Rotation3::from_euler_angles(0.0, 0.03, 0.01);
    let t = Vector3::new(0.1, 0.0, 1.0).normalize();
    let s = scene(r, t, 80, 8);

    let est = RelativePoseEstimator::default().estimate(&s.correspondences, &s.camera).unwrap();
    let points = Triangulator::default().triangulate(&s.camera, &est.pose, &s.correspondences, &est.inliers);
    assert_eq!(points.len(), s.points.len());
    for (rec, truth) in points.iter().zip(&s.points) {
        let expected = s.rotation * truth + s.translation;
        assert!((rec - expected).norm() < 1e-4 * expected.z, "{rec:?} vs {expected:?}");
    }
}
