// error.rs — Error kinds of an odometry run.
//
// Every frame-level variant ends the run: there are no retries and no
// re-initialization. Whatever the session accumulated before the failing
// frame stays valid and is still flushed to the sinks.

use std::io;

use thiserror::Error;

/// Why the relative-pose estimator could not produce a usable model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Degeneracy {
    /// Median displacement too small to carry any epipolar geometry.
    #[error("median parallax {median_px:.4} px is below {min_px} px")]
    NoParallax { median_px: f64, min_px: f64 },
    /// RANSAC never found a model supported by 8 inliers.
    #[error("no essential model reached 8 inliers among {total} correspondences")]
    NoConsensus { total: usize },
    /// None of the four pose candidates puts an inlier in front of both cameras.
    #[error("no pose candidate passes the cheirality test")]
    NoCheiralitySupport,
}

#[derive(Debug, Error)]
pub enum OdometryError {
    /// The frame source is exhausted early, unreadable, or out of order.
    #[error("frame {index} unavailable: {reason}")]
    FrameUnavailable { index: usize, reason: String },

    /// Too few pairs survived the correspondence filter.
    #[error("frame {frame}: {found} correspondences survived filtering, need {required}")]
    InsufficientCorrespondences {
        frame: usize,
        found: usize,
        required: usize,
    },

    /// The relative-pose estimator found no usable two-view model.
    #[error("frame {frame}: degenerate essential model: {reason}")]
    DegenerateEssentialModel { frame: usize, reason: Degeneracy },

    /// An output sink could not be created or written.
    #[error("{sink} sink unavailable: {source}")]
    SinkUnavailable {
        sink: &'static str,
        #[source]
        source: io::Error,
    },

    /// Configuration rejected before any frame was processed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl OdometryError {
    /// Whether this error ended a run at frame level (as opposed to a
    /// setup or output failure).
    pub fn is_frame_level(&self) -> bool {
        matches!(
            self,
            OdometryError::FrameUnavailable { .. }
                | OdometryError::InsufficientCorrespondences { .. }
                | OdometryError::DegenerateEssentialModel { .. }
        )
    }

    pub(crate) fn sink(sink: &'static str) -> impl FnOnce(io::Error) -> OdometryError {
        move |source| OdometryError::SinkUnavailable { sink, source }
    }
}

pub type Result<T> = std::result::Result<T, OdometryError>;
