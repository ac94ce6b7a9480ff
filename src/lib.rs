// Rudolf-VO: RUst Device-Optimized Library for Frontend Visual Odometry
// Monocular KLT tracking + essential-matrix relative pose + DLT mapping
//
// Reference pipeline: Shi-Tomasi corners, pyramidal Lucas-Kanade tracking,
// RANSAC 8-point essential matrix with cheirality disambiguation, linear
// triangulation, dead-reckoned pose accumulation (scale drifts freely).

pub mod image;
pub mod convolution;
pub mod gradient;
pub mod pyramid;
pub mod occupancy;
pub mod corners;
pub mod klt;
pub mod filter;

pub mod camera;
pub mod essential;
pub mod pose;
pub mod triangulation;

pub mod error;
pub mod config;
pub mod source;
pub mod session;
pub mod replenish;
pub mod stats;
pub mod sink;
pub mod odometry;

pub use camera::CameraIntrinsics;
pub use config::OdometryConfig;
pub use error::{Degeneracy, OdometryError, Result};
pub use odometry::{run, FrameReport, Odometry, RunSummary, Sinks};
