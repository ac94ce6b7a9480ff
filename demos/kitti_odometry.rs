// demos/kitti_odometry.rs
//
// Run monocular visual odometry over a KITTI odometry sequence.
//
// Usage:
//   cargo run --example kitti_odometry --release -- /path/to/sequences/00/image_0 [num_frames] [config.json] [start_frame]
//
// The KITTI odometry layout:
//   <sequence>/image_0/000000.png ...  grayscale left camera
//   <sequence>/calib.txt               projection matrices P0..P3
//
// When calib.txt sits next to the image directory its P0 line is used;
// otherwise the sequence 00-02 intrinsics are assumed.
//
// Output (current directory):
//   trajectory.txt      one "x y z" camera position per frame
//   cloud.ply           triangulated map points, ASCII PLY
//   tracking_stats.csv  per-frame statistics
//   trajectory.svg      top-down (x/z) view of trajectory and map
//   stdout              per-frame summary
//
// start_frame skips the first frames of the sequence (default 0).
//
// Set RUST_LOG=debug for per-stage logging.

use nalgebra::Point3;

use rudolf_vo::sink::{FrameObserver, PlyWriter, StatsCsvWriter, TrajectoryWriter};
use rudolf_vo::session::OdometrySession;
use rudolf_vo::source::{FrameSource, ImageSequence};
use rudolf_vo::{run, CameraIntrinsics, FrameReport, Odometry, OdometryConfig, Sinks};

use std::env;
use std::error::Error;
use std::fmt::Write as FmtWrite;
use std::fs;
use std::path::{Path, PathBuf};

const PLY_COLOUR_SEED: u64 = 42;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <image_dir> [num_frames] [config.json] [start_frame]", args[0]);
        eprintln!("  e.g.: {} /data/kitti/sequences/00/image_0 200", args[0]);
        std::process::exit(1);
    }

    let image_dir = PathBuf::from(&args[1]);
    let mut config = match args.get(3) {
        Some(path) => OdometryConfig::from_json_file(Path::new(path))?,
        None => OdometryConfig::default(),
    };
    if let Some(n) = args.get(2) {
        config.num_frames = n.parse()?;
    }
    let start_frame: usize = match args.get(4) {
        Some(s) => s.parse()?,
        None => 0,
    };

    let camera = load_camera(&image_dir)?;
    println!("Sequence: {} (from frame {start_frame})", image_dir.display());
    println!(
        "Camera: fx={:.3} fy={:.3} cx={:.3} cy={:.3} ({}x{})",
        camera.fx,
        camera.fy,
        camera.cx,
        camera.cy,
        camera.width(),
        camera.height()
    );
    println!(
        "Config: frames={} max_corners={} klt_window={} pyramid={}L ransac={}px",
        config.num_frames,
        config.max_corners,
        config.klt_window,
        config.pyramid_levels,
        config.ransac_threshold_px
    );

    let mut odometry = Odometry::new(config, camera)?;
    let mut source = ImageSequence::new(&image_dir).starting_at(start_frame);

    let mut trajectory = TrajectoryWriter::create(Path::new("trajectory.txt"))?;
    let mut cloud = PlyWriter::create(Path::new("cloud.ply"), PLY_COLOUR_SEED)?;
    let mut stats = StatsCsvWriter::create(Path::new("tracking_stats.csv"))?;
    let mut console = ConsoleObserver;

    println!(
        "\n{:>5}  {:>7}  {:>4}  {:>5}  {:>7}  {:>6}  {:>6}",
        "frame", "tracked", "lost", "added", "inliers", "points", "error"
    );
    println!("{}", "-".repeat(52));

    let summary = {
        let mut sinks = Sinks::new(&mut trajectory, &mut cloud)
            .with_observer(&mut console)
            .with_stats(&mut stats);
        run(&mut odometry, &mut source, &mut sinks)?
    };

    fs::write("trajectory.svg", render_top_down(odometry.session()))?;

    println!("\nProcessed {} frames", summary.frames_processed);
    println!("  Trajectory points: {}", summary.trajectory_len);
    println!("  Map points: {}", summary.map_len);
    println!("  Avg. smoothed error: {:.3}", summary.average_smoothed_error);
    if let Some(reason) = &summary.halted {
        println!("  Halted: {reason}");
    }
    println!("Wrote trajectory.txt, cloud.ply, tracking_stats.csv, trajectory.svg");
    Ok(())
}

/// Intrinsics from `<image_dir>/../calib.txt`, falling back to the
/// sequence 00-02 values.
fn load_camera(image_dir: &Path) -> Result<CameraIntrinsics, Box<dyn Error>> {
    let fallback = CameraIntrinsics::kitti_00_02();
    let Some(calib) = image_dir.parent().map(|p| p.join("calib.txt")) else {
        return Ok(fallback);
    };
    if !calib.exists() {
        return Ok(fallback);
    }

    // calib.txt has no resolution; take it from the first frame.
    let (width, height) = match ImageSequence::new(image_dir).next_frame()? {
        Some(frame) => (frame.image.width(), frame.image.height()),
        None => (fallback.width(), fallback.height()),
    };
    Ok(CameraIntrinsics::from_kitti_calib(&calib, 0, width, height)?)
}

/// Prints one summary line per frame.
struct ConsoleObserver;

impl FrameObserver for ConsoleObserver {
    fn observe(&mut self, report: &FrameReport) -> rudolf_vo::Result<()> {
        let s = &report.stats;
        println!(
            "{:5}  {:7}  {:4}  {:5}  {:7}  {:6}  {:6.3}",
            s.frame, s.tracked, s.lost, s.added, s.inliers, s.map_points, s.smoothed_error
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SVG top-down view
// ---------------------------------------------------------------------------

const SVG_SIZE: f64 = 800.0;
const SVG_MARGIN: f64 = 20.0;

/// Map points as faint dots, the trajectory as a polyline on top.
fn render_top_down(session: &OdometrySession) -> String {
    let bounds = session.bounds();
    let project = |p: &Point3<f64>| bounds.project_xz(p, SVG_SIZE, SVG_SIZE, SVG_MARGIN);

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 {SVG_SIZE} {SVG_SIZE}\" width=\"{SVG_SIZE}\" height=\"{SVG_SIZE}\">"
    );
    let _ = writeln!(svg, "<rect width=\"100%\" height=\"100%\" fill=\"#111\"/>");

    let _ = writeln!(svg, "<g fill=\"#4af\" opacity=\"0.5\">");
    for point in session.map() {
        let (u, v) = project(&point.position);
        let _ = writeln!(svg, "<circle cx=\"{u:.1}\" cy=\"{v:.1}\" r=\"0.8\"/>");
    }
    let _ = writeln!(svg, "</g>");

    let _ = write!(svg, "<polyline fill=\"none\" stroke=\"#f44\" stroke-width=\"1.5\" points=\"");
    for p in session.trajectory() {
        let (u, v) = project(p);
        let _ = write!(svg, "{u:.1},{v:.1} ");
    }
    let _ = writeln!(svg, "\"/>");

    if let Some(start) = session.trajectory().first() {
        let (u, v) = project(start);
        let _ = writeln!(svg, "<circle cx=\"{u:.1}\" cy=\"{v:.1}\" r=\"4\" fill=\"#4f4\"/>");
    }

    let _ = writeln!(
        svg,
        "<text x=\"{SVG_MARGIN}\" y=\"{}\" font-family=\"monospace\" font-size=\"12\" fill=\"#ddd\">{} poses, {} map points</text>",
        SVG_SIZE - 6.0,
        session.trajectory().len(),
        session.map().len()
    );
    let _ = writeln!(svg, "</svg>");
    svg
}
