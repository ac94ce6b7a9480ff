// sink.rs — Where a run's results go.
//
// The run driver pushes each frame's outputs into four kinds of sink and
// calls `finish` on all of them exactly once, whether the run completed or
// halted. File writers report I/O failures as `SinkUnavailable`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use nalgebra::Point3;
use ply_rs::ply::{
    Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
    ScalarType,
};
use ply_rs::writer::Writer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{OdometryError, Result};
use crate::odometry::FrameReport;
use crate::stats::FrameStats;

/// Receives one camera position per processed frame.
pub trait TrajectorySink {
    fn push_position(&mut self, position: &Point3<f64>) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

/// Receives the world-frame points each frame adds to the map.
pub trait MapSink {
    fn push_points(&mut self, points: &[Point3<f64>]) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

/// Sees the full report of every processed frame (display, debugging).
pub trait FrameObserver {
    fn observe(&mut self, report: &FrameReport) -> Result<()>;
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

pub trait StatsSink {
    fn record(&mut self, stats: &FrameStats) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// trajectory.txt
// ---------------------------------------------------------------------------

/// Plain text, one `x y z` line per frame.
pub struct TrajectoryWriter<W: Write> {
    out: W,
}

impl TrajectoryWriter<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(OdometryError::sink("trajectory"))?;
        Ok(TrajectoryWriter::new(BufWriter::new(file)))
    }
}

impl<W: Write> TrajectoryWriter<W> {
    pub fn new(out: W) -> Self {
        TrajectoryWriter { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TrajectorySink for TrajectoryWriter<W> {
    fn push_position(&mut self, p: &Point3<f64>) -> Result<()> {
        writeln!(self.out, "{} {} {}", p.x, p.y, p.z).map_err(OdometryError::sink("trajectory"))
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush().map_err(OdometryError::sink("trajectory"))
    }
}

// ---------------------------------------------------------------------------
// cloud.ply
// ---------------------------------------------------------------------------

/// ASCII PLY point cloud. The vertex count goes in the header, so points
/// are buffered and written on `finish`. Each vertex gets a random colour
/// from a seeded generator.
pub struct PlyWriter<W: Write> {
    out: Option<W>,
    points: Vec<Point3<f64>>,
    rng: StdRng,
}

impl PlyWriter<BufWriter<File>> {
    pub fn create(path: &Path, seed: u64) -> Result<Self> {
        let file = File::create(path).map_err(OdometryError::sink("point cloud"))?;
        Ok(PlyWriter::new(BufWriter::new(file), seed))
    }
}

impl<W: Write> PlyWriter<W> {
    pub fn new(out: W, seed: u64) -> Self {
        PlyWriter {
            out: Some(out),
            points: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The underlying writer, once `finish` has run.
    pub fn into_inner(self) -> Option<W> {
        self.out
    }

    fn write_all(&mut self) -> std::io::Result<()> {
        let Some(out) = self.out.as_mut() else {
            return Ok(());
        };

        let mut ply = Ply::<DefaultElement>::new();
        ply.header.encoding = Encoding::Ascii;

        let mut vertex = ElementDef::new("vertex".to_string());
        for axis in ["x", "y", "z"] {
            let p = PropertyDef::new(axis.to_string(), PropertyType::Scalar(ScalarType::Float));
            vertex.properties.add(p);
        }
        for channel in ["red", "green", "blue"] {
            let p = PropertyDef::new(channel.to_string(), PropertyType::Scalar(ScalarType::UChar));
            vertex.properties.add(p);
        }
        ply.header.elements.add(vertex);

        let mut vertices = Vec::with_capacity(self.points.len());
        for p in &self.points {
            let mut v = DefaultElement::new();
            v.insert("x".to_string(), Property::Float(p.x as f32));
            v.insert("y".to_string(), Property::Float(p.y as f32));
            v.insert("z".to_string(), Property::Float(p.z as f32));
            v.insert("red".to_string(), Property::UChar(self.rng.gen()));
            v.insert("green".to_string(), Property::UChar(self.rng.gen()));
            v.insert("blue".to_string(), Property::UChar(self.rng.gen()));
            vertices.push(v);
        }
        ply.payload.insert("vertex".to_string(), vertices);

        Writer::new().write_ply(out, &mut ply)?;
        out.flush()
    }
}

impl<W: Write> MapSink for PlyWriter<W> {
    fn push_points(&mut self, points: &[Point3<f64>]) -> Result<()> {
        self.points.extend_from_slice(points);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.write_all().map_err(OdometryError::sink("point cloud"))
    }
}

// ---------------------------------------------------------------------------
// tracking_stats.csv
// ---------------------------------------------------------------------------

pub const STATS_CSV_HEADER: &str =
    "frame,mean_error,smoothed_error,tracked,lost,added,inliers,map_points";

pub struct StatsCsvWriter<W: Write> {
    out: W,
    header_written: bool,
}

impl StatsCsvWriter<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(OdometryError::sink("statistics"))?;
        Ok(StatsCsvWriter::new(BufWriter::new(file)))
    }
}

impl<W: Write> StatsCsvWriter<W> {
    pub fn new(out: W) -> Self {
        StatsCsvWriter {
            out,
            header_written: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn ensure_header(&mut self) -> std::io::Result<()> {
        if !self.header_written {
            writeln!(self.out, "{STATS_CSV_HEADER}")?;
            self.header_written = true;
        }
        Ok(())
    }
}

impl<W: Write> StatsSink for StatsCsvWriter<W> {
    fn record(&mut self, s: &FrameStats) -> Result<()> {
        self.ensure_header()
            .and_then(|_| {
                writeln!(
                    self.out,
                    "{},{},{},{},{},{},{},{}",
                    s.frame,
                    s.mean_error,
                    s.smoothed_error,
                    s.tracked,
                    s.lost,
                    s.added,
                    s.inliers,
                    s.map_points
                )
            })
            .map_err(OdometryError::sink("statistics"))
    }

    fn finish(&mut self) -> Result<()> {
        self.ensure_header()
            .and_then(|_| self.out.flush())
            .map_err(OdometryError::sink("statistics"))
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Collects everything in memory. Implements every sink trait.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub positions: Vec<Point3<f64>>,
    pub points: Vec<Point3<f64>>,
    pub reports: Vec<FrameReport>,
    pub stats: Vec<FrameStats>,
    /// How many `finish` calls were received, across all traits.
    pub finished: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrajectorySink for MemorySink {
    fn push_position(&mut self, position: &Point3<f64>) -> Result<()> {
        self.positions.push(*position);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished += 1;
        Ok(())
    }
}

impl MapSink for MemorySink {
    fn push_points(&mut self, points: &[Point3<f64>]) -> Result<()> {
        self.points.extend_from_slice(points);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished += 1;
        Ok(())
    }
}

impl FrameObserver for MemorySink {
    fn observe(&mut self, report: &FrameReport) -> Result<()> {
        self.reports.push(report.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished += 1;
        Ok(())
    }
}

impl StatsSink for MemorySink {
    fn record(&mut self, stats: &FrameStats) -> Result<()> {
        self.stats.push(*stats);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished += 1;
        Ok(())
    }
}
