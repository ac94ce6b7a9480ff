// stats.rs — Per-frame tracking statistics.

use std::collections::VecDeque;

/// Counters for one processed frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameStats {
    pub frame: usize,
    /// Pairs that survived the correspondence filter.
    pub tracked: usize,
    /// Tracks handed to the tracker that did not survive.
    pub lost: usize,
    /// Corners added by replenishment.
    pub added: usize,
    /// Active tracks after replenishment.
    pub total: usize,
    /// Mean tracker residual over the surviving pairs (0 when none).
    pub mean_error: f64,
    /// Moving average of `mean_error` over the last few frames that had
    /// survivors.
    pub smoothed_error: f64,
    /// Correspondences that passed RANSAC and cheirality.
    pub inliers: usize,
    /// Map points added by this frame.
    pub map_points: usize,
}

/// Moving average over a fixed window of the most recent samples.
#[derive(Debug, Clone)]
pub struct ErrorSmoother {
    window: usize,
    samples: VecDeque<f64>,
    sum: f64,
}

impl ErrorSmoother {
    /// A zero window behaves like a window of one.
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        ErrorSmoother {
            window,
            samples: VecDeque::with_capacity(window),
            sum: 0.0,
        }
    }

    /// Add a sample and return the new average.
    pub fn push(&mut self, sample: f64) -> f64 {
        if self.samples.len() == self.window {
            if let Some(old) = self.samples.pop_front() {
                self.sum -= old;
            }
        }
        self.samples.push_back(sample);
        self.sum += sample;
        self.average()
    }

    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.sum / self.samples.len() as f64
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
