// benches/benchmarks.rs -- Per-stage and full-pipeline benchmarks.
//
// Synthetic benchmarks (always run):
//   cargo bench
//
// With real KITTI data (set KITTI_PATH to a sequence's image_0 directory):
//   KITTI_PATH=/path/to/sequences/00/image_0 cargo bench
//
// The KITTI benchmark loads the first 20 frames and runs the whole
// odometry pipeline over them with the default configuration.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use nalgebra::{Point3, Rotation3, Vector3};

use rudolf_vo::camera::CameraIntrinsics;
use rudolf_vo::config::OdometryConfig;
use rudolf_vo::corners::{CornerDetector, ShiTomasiDetector};
use rudolf_vo::filter::Correspondence;
use rudolf_vo::image::Image;
use rudolf_vo::klt::{KltTracker, SparseTracker};
use rudolf_vo::odometry::Odometry;
use rudolf_vo::pose::{RelativePose, RelativePoseEstimator};
use rudolf_vo::pyramid::Pyramid;
use rudolf_vo::source::{Frame, FrameSource, ImageSequence};
use rudolf_vo::triangulation::Triangulator;

use std::env;
use std::path::PathBuf;

// ============================================================
// Helpers
// ============================================================

/// Textured KITTI-sized frame: a ramp plus a field of bright rectangles,
/// translated by (dx, dy).
fn make_scene(w: usize, h: usize, dx: usize, dy: usize) -> Image<u8> {
    let mut img = Image::from_fn(w, h, |x, y| {
        let (sx, sy) = (x + dx, y + dy);
        ((sx * 120 / w) + (sy * 55 / h)) as u8
    });
    for rect in 0..24 {
        let rx = (30 + rect * 53 + dx) % w;
        let ry = (20 + (rect % 5) * 70 + dy) % h;
        let bright = 170u8.wrapping_add(rect as u8 * 3);
        for y in ry..(ry + 25).min(h) {
            for x in rx..(rx + 35).min(w) {
                img.set(x, y, bright);
            }
        }
    }
    img
}

/// Pixel correspondences of a random scene seen from two KITTI cameras.
fn make_correspondences(n: usize) -> (CameraIntrinsics, RelativePose, Vec<Correspondence>) {
    let cam = CameraIntrinsics::kitti_00_02();
    let pose = RelativePose::new(
        Rotation3::from_euler_angles(0.002, 0.01, 0.0),
        Vector3::new(0.05, 0.0, -1.0),
    );
    let corrs = (0..n)
        .filter_map(|i| {
            let f = i as f64;
            let z = 6.0 + (f * 0.37).sin().abs() * 30.0;
            let p = Point3::new((f * 0.71).sin() * 0.6 * z, (f * 0.23).cos() * 0.2 * z, z);
            let prev = cam.project(&p)?;
            let curr = cam.project(&pose.transform_point(&p))?;
            Some(Correspondence::new(prev, curr))
        })
        .collect();
    (cam, pose, corrs)
}

// ============================================================
// Per-stage benchmarks (synthetic, always runnable)
// ============================================================

fn bench_pyramid(c: &mut Criterion) {
    let img = make_scene(1241, 376, 0, 0);

    let mut group = c.benchmark_group("pyramid");
    group.bench_function("build_4level_1241x376", |b| {
        b.iter(|| Pyramid::build(&img, 4, 1.0))
    });
    group.finish();
}

fn bench_shi_tomasi(c: &mut Criterion) {
    let frame = Frame::new(0, make_scene(1241, 376, 0, 0)).prepare(1, 1.0);
    let det = ShiTomasiDetector::default();

    let mut group = c.benchmark_group("shi_tomasi");
    group.bench_function("detect_1500_1241x376", |b| {
        b.iter(|| det.detect(&frame, 1500, &[]))
    });
    group.finish();
}

fn bench_klt(c: &mut Criterion) {
    let prev = Frame::new(0, make_scene(1241, 376, 0, 0)).prepare(4, 1.0);
    let curr = Frame::new(1, make_scene(1241, 376, 3, 2)).prepare(4, 1.0);
    let points = ShiTomasiDetector::default().detect(&prev, 500, &[]);
    let tracker = KltTracker::default();

    let mut group = c.benchmark_group("klt");
    group.bench_function(
        BenchmarkId::new("21x21_4pyr", format!("{}feat", points.len())),
        |b| b.iter(|| tracker.track(&prev, &curr, &points)),
    );
    group.finish();
}

fn bench_relative_pose(c: &mut Criterion) {
    let mut group = c.benchmark_group("relative_pose");
    for n in [100, 500, 1500] {
        let (cam, _, corrs) = make_correspondences(n);
        let estimator = RelativePoseEstimator::default();
        group.bench_function(BenchmarkId::new("ransac_8pt", n), |b| {
            b.iter(|| estimator.estimate(&corrs, &cam))
        });
    }
    group.finish();
}

fn bench_triangulation(c: &mut Criterion) {
    let (cam, pose, corrs) = make_correspondences(1500);
    let mask = vec![true; corrs.len()];
    let triangulator = Triangulator::default();

    let mut group = c.benchmark_group("triangulation");
    group.bench_function("dlt_1500", |b| {
        b.iter(|| triangulator.triangulate(&cam, &pose, &corrs, &mask))
    });
    group.finish();
}

// ============================================================
// KITTI full pipeline (requires KITTI_PATH)
// ============================================================

fn load_kitti_frames(dir: PathBuf, count: usize) -> Vec<Frame> {
    let mut seq = ImageSequence::new(dir);
    let mut frames = Vec::with_capacity(count);
    while frames.len() < count {
        match seq.next_frame() {
            Ok(Some(frame)) => frames.push(frame),
            _ => break,
        }
    }
    frames
}

fn bench_kitti_pipeline(c: &mut Criterion) {
    let Ok(path) = env::var("KITTI_PATH") else {
        return;
    };
    let frames = load_kitti_frames(PathBuf::from(path), 20);
    if frames.len() < 2 {
        eprintln!("KITTI_PATH holds fewer than 2 frames, skipping pipeline benchmark");
        return;
    }

    let mut group = c.benchmark_group("kitti");
    group.sample_size(10);
    group.bench_function(BenchmarkId::new("pipeline", frames.len()), |b| {
        b.iter(|| {
            let mut odo = Odometry::new(OdometryConfig::default(), CameraIntrinsics::kitti_00_02())
                .expect("default config is valid");
            for frame in &frames {
                if odo.process(frame.clone()).is_err() {
                    break;
                }
            }
            odo.session().trajectory().len()
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_pyramid,
    bench_shi_tomasi,
    bench_klt,
    bench_relative_pose,
    bench_triangulation,
    bench_kitti_pipeline,
);
criterion_main!(benches);
