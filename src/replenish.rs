// replenish.rs — Keeps the active track set above a floor.
//
// Detection only runs when the survivors of a frame drop below the floor;
// it then fills up to the budget, never beyond. Whether new corners must
// keep their distance from surviving tracks is a policy choice.

use log::debug;
use serde::Deserialize;

use crate::corners::CornerDetector;
use crate::klt::TrackPoint;
use crate::source::PreparedFrame;

/// How new corners relate to tracks that are still alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// New corners keep the detector's minimum distance from survivors too.
    #[default]
    SeparateFromSurvivors,
    /// Survivors are ignored; new corners may land on top of them.
    KeepAll,
}

#[derive(Debug, Clone)]
pub struct Replenisher {
    /// Replenish only when fewer tracks than this survive.
    pub floor: usize,
    /// Maximum number of active tracks.
    pub max_tracked: usize,
    pub dedup: DedupPolicy,
}

impl Default for Replenisher {
    fn default() -> Self {
        Replenisher {
            floor: 500,
            max_tracked: 1500,
            dedup: DedupPolicy::SeparateFromSurvivors,
        }
    }
}

impl Replenisher {
    pub fn new(floor: usize, max_tracked: usize, dedup: DedupPolicy) -> Self {
        Replenisher {
            floor,
            max_tracked,
            dedup,
        }
    }

    pub fn needs_replenish(&self, survivors: usize) -> bool {
        survivors < self.floor
    }

    /// Append new corners from `frame` to `tracks` when below the floor.
    /// Returns how many were added.
    pub fn replenish(
        &self,
        detector: &dyn CornerDetector,
        frame: &PreparedFrame,
        tracks: &mut Vec<TrackPoint>,
    ) -> usize {
        if !self.needs_replenish(tracks.len()) {
            return 0;
        }
        let slots = self.max_tracked.saturating_sub(tracks.len());
        if slots == 0 {
            return 0;
        }

        let existing: &[TrackPoint] = match self.dedup {
            DedupPolicy::SeparateFromSurvivors => tracks.as_slice(),
            DedupPolicy::KeepAll => &[],
        };
        let mut fresh = detector.detect(frame, slots, existing);
        fresh.truncate(slots);
        let added = fresh.len();
        debug!(
            "frame {}: replenished {added} corners ({} survivors, budget {})",
            frame.index,
            tracks.len(),
            self.max_tracked
        );
        tracks.extend(fresh);
        added
    }
}
