// triangulation.rs — Linear (DLT) two-view triangulation.
//
// For a point X seen at x0 through P0 and at x1 through P1, each view
// gives two rows of the homogeneous system A X = 0:
//
//   x * P[2] − P[0]
//   y * P[2] − P[1]
//
// X is the right singular vector of the 4×4 A with the smallest singular
// value, dehomogenized by its last coordinate.

use nalgebra::{Matrix3x4, Matrix4, Point2, Point3, RowVector4, SVD};

use crate::camera::CameraIntrinsics;
use crate::filter::Correspondence;
use crate::pose::RelativePose;

/// Homogeneous coordinates smaller than this are treated as points at infinity.
const MIN_HOMOGENEOUS_W: f64 = 1e-12;

/// DLT triangulation of one point; coordinates are in the frame of whatever
/// the projection matrices map from. `None` for points at infinity.
pub fn triangulate_dlt(
    p0: &Matrix3x4<f64>,
    p1: &Matrix3x4<f64>,
    x0: &Point2<f64>,
    x1: &Point2<f64>,
) -> Option<Point3<f64>> {
    let rows = [
        p0.row(2) * x0.x - p0.row(0),
        p0.row(2) * x0.y - p0.row(1),
        p1.row(2) * x1.x - p1.row(0),
        p1.row(2) * x1.y - p1.row(1),
    ];

    // Unit rows keep pixel-scale and normalized-scale inputs equally conditioned.
    let mut a = Matrix4::zeros();
    for (i, row) in rows.iter().enumerate() {
        let norm = row.norm();
        let row: RowVector4<f64> = if norm > 0.0 { *row / norm } else { *row };
        a.set_row(i, &row);
    }

    let svd = SVD::new(a, false, true);
    let v_t = svd.v_t?;
    let x = v_t.row(svd.singular_values.imin());
    let w = x[3];
    if w.abs() < MIN_HOMOGENEOUS_W {
        return None;
    }
    let p = Point3::new(x[0] / w, x[1] / w, x[2] / w);
    p.coords.iter().all(|v| v.is_finite()).then_some(p)
}

/// Triangulates inlier correspondences between the previous view
/// (P0 = K[I|0]) and the current view (P1 = K[R|t]).
#[derive(Debug, Clone)]
pub struct Triangulator {
    /// Points closer than this to the current camera are discarded.
    pub min_depth: f64,
    /// Points farther than this from the current camera are discarded.
    pub max_depth: f64,
}

impl Default for Triangulator {
    fn default() -> Self {
        Triangulator {
            min_depth: 0.1,
            max_depth: 1000.0,
        }
    }
}

impl Triangulator {
    pub fn new(min_depth: f64, max_depth: f64) -> Self {
        Triangulator { min_depth, max_depth }
    }

    /// Points for the correspondences selected by `mask`, expressed in the
    /// current camera's frame. Degenerate points are dropped, so the output
    /// may be shorter than the number of inliers.
    ///
    /// # Panics
    /// Panics if `mask` and `correspondences` differ in length.
    pub fn triangulate(
        &self,
        camera: &CameraIntrinsics,
        pose: &RelativePose,
        correspondences: &[Correspondence],
        mask: &[bool],
    ) -> Vec<Point3<f64>> {
        assert_eq!(correspondences.len(), mask.len(), "mask length mismatch");

        let p0 = camera.reference_projection();
        let p1 = camera.projection_matrix(&pose.rotation, pose.translation.as_ref());

        correspondences
            .iter()
            .zip(mask)
            .filter(|(_, &inlier)| inlier)
            .filter_map(|(c, _)| {
                let in_prev = triangulate_dlt(&p0, &p1, &c.prev, &c.curr)?;
                let in_curr = pose.transform_point(&in_prev);
                self.accepts(in_prev.z, in_curr.z).then_some(in_curr)
            })
            .collect()
    }

    fn accepts(&self, depth_prev: f64, depth_curr: f64) -> bool {
        depth_prev > 0.0
            && depth_curr > 0.0
            && depth_curr.abs() >= self.min_depth
            && depth_curr.abs() <= self.max_depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Vector3};

    #[test]
    fn test_dlt_recovers_point() {
        let cam = CameraIntrinsics::new(600.0, 600.0, 320.0, 240.0, 640, 480);
        let r = Rotation3::from_euler_angles(0.0, 0.05, 0.0);
        let t = Vector3::new(-1.0, 0.0, 0.0);
        let p0 = cam.reference_projection();
        let p1 = cam.projection_matrix(&r, &t);

        let x = Point3::new(0.4, -0.3, 6.0);
        let x0 = cam.project(&x).unwrap();
        let x1 = cam.project(&(r * x + t)).unwrap();

        let rec = triangulate_dlt(&p0, &p1, &x0, &x1).unwrap();
        assert!((rec - x).norm() < 1e-6, "recovered {rec:?}");
    }

    #[test]
    fn test_depth_bounds_discard() {
        let cam = CameraIntrinsics::new(600.0, 600.0, 320.0, 240.0, 640, 480);
        let pose = RelativePose::new(Rotation3::identity(), Vector3::new(1.0, 0.0, 0.0));
        // Current-frame depths: too close, fine, too far.
        let pts = [
            Point3::new(0.01, 0.0, 0.05),
            Point3::new(0.5, 0.2, 12.0),
            Point3::new(30.0, 10.0, 1500.0),
        ];
        let corrs: Vec<Correspondence> = pts
            .iter()
            .map(|x| {
                let prev = cam.project(x).unwrap();
                let curr = cam.project(&pose.transform_point(x)).unwrap();
                Correspondence::new(prev, curr)
            })
            .collect();

        let out = Triangulator::default().triangulate(&cam, &pose, &corrs, &[true; 3]);
        assert_eq!(out.len(), 1);
        assert!((out[0].z - 12.0).abs() < 1e-6);
    }

    #[test]
    fn test_mask_selects_points() {
        let cam = CameraIntrinsics::new(600.0, 600.0, 320.0, 240.0, 640, 480);
        let pose = RelativePose::new(Rotation3::identity(), Vector3::new(1.0, 0.0, 0.0));
        let pts = [Point3::new(0.0, 0.0, 5.0), Point3::new(1.0, 1.0, 8.0)];
        let corrs: Vec<Correspondence> = pts
            .iter()
            .map(|x| {
                let prev = cam.project(x).unwrap();
                let curr = cam.project(&pose.transform_point(x)).unwrap();
                Correspondence::new(prev, curr)
            })
            .collect();

        let out = Triangulator::default().triangulate(&cam, &pose, &corrs, &[false, true]);
        assert_eq!(out.len(), 1);
        let expected = pose.transform_point(&pts[1]);
        assert!((out[0] - expected).norm() < 1e-6);
    }
}
