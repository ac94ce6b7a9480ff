// camera.rs -- Pinhole intrinsics K.
//
// Handles:
// - K construction and projection matrices P = K[R|t]
// - Pixel <-> normalized coordinate conversion
// - Parsing a KITTI odometry calib.txt
//
// KITTI images are rectified, so there is no distortion model.

use std::fs;
use std::path::Path;

use nalgebra::{Matrix3, Matrix3x4, Point2, Point3, Rotation3, Vector3};

use crate::error::{OdometryError, Result};

/// Pinhole camera intrinsics. Constant for the whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    /// Image resolution [width, height].
    pub resolution: [usize; 2],
}

impl CameraIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64, width: usize, height: usize) -> Self {
        CameraIntrinsics {
            fx,
            fy,
            cx,
            cy,
            resolution: [width, height],
        }
    }

    /// Left grayscale camera of KITTI odometry sequences 00-02.
    pub fn kitti_00_02() -> Self {
        CameraIntrinsics::new(707.0493, 707.0493, 604.0814, 180.5066, 1241, 376)
    }

    /// Parse the `P<camera>:` line of a KITTI `calib.txt`.
    ///
    /// ```text
    /// P0: 7.188560e+02 0.000000e+00 6.071928e+02 0.000000e+00 0.000000e+00 7.188560e+02 1.852157e+02 ...
    /// ```
    /// The file carries no resolution, so the caller supplies it.
    pub fn from_kitti_calib(path: &Path, camera: usize, width: usize, height: usize) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            OdometryError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;

        let key = format!("P{camera}:");
        let values = parse_prefixed_values(&content, &key).ok_or_else(|| {
            OdometryError::InvalidConfig(format!("{key} line not found in {}", path.display()))
        })?;
        if values.len() != 12 {
            return Err(OdometryError::InvalidConfig(format!(
                "expected 12 values after {key}, got {}",
                values.len()
            )));
        }

        // Row-major 3x4: [fx 0 cx tx; 0 fy cy ty; 0 0 1 0]
        Ok(CameraIntrinsics::new(
            values[0], values[5], values[2], values[6], width, height,
        ))
    }

    pub fn width(&self) -> usize {
        self.resolution[0]
    }

    pub fn height(&self) -> usize {
        self.resolution[1]
    }

    /// Mean focal length, used to convert pixel thresholds to normalized units.
    pub fn mean_focal(&self) -> f64 {
        0.5 * (self.fx + self.fy)
    }

    pub fn k(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Apply K^{-1} to the homogeneous pixel [u, v, 1].
    pub fn normalize(&self, pixel: &Point2<f64>) -> Point2<f64> {
        Point2::new((pixel.x - self.cx) / self.fx, (pixel.y - self.cy) / self.fy)
    }

    pub fn denormalize(&self, normalized: &Point2<f64>) -> Point2<f64> {
        Point2::new(
            normalized.x * self.fx + self.cx,
            normalized.y * self.fy + self.cy,
        )
    }

    /// Project a camera-frame point to pixels. `None` behind the camera.
    pub fn project(&self, p: &Point3<f64>) -> Option<Point2<f64>> {
        if p.z <= 0.0 {
            return None;
        }
        Some(self.denormalize(&Point2::new(p.x / p.z, p.y / p.z)))
    }

    /// P = K [R | t].
    pub fn projection_matrix(&self, rotation: &Rotation3<f64>, translation: &Vector3<f64>) -> Matrix3x4<f64> {
        self.k() * extrinsic_matrix(rotation, translation)
    }

    /// P = K [I | 0] for the reference view.
    pub fn reference_projection(&self) -> Matrix3x4<f64> {
        self.projection_matrix(&Rotation3::identity(), &Vector3::zeros())
    }
}

/// [R | t] as a 3x4 matrix.
pub fn extrinsic_matrix(rotation: &Rotation3<f64>, translation: &Vector3<f64>) -> Matrix3x4<f64> {
    let mut rt = Matrix3x4::zeros();
    rt.fixed_view_mut::<3, 3>(0, 0).copy_from(rotation.matrix());
    rt.fixed_view_mut::<3, 1>(0, 3).copy_from(translation);
    rt
}

/// Whitespace-separated floats following `key` on its line.
fn parse_prefixed_values(content: &str, key: &str) -> Option<Vec<f64>> {
    let line = content.lines().find(|l| l.trim_start().starts_with(key))?;
    let rest = line.trim_start().strip_prefix(key)?;
    rest.split_whitespace()
        .map(|s| s.parse::<f64>().ok())
        .collect()
}
