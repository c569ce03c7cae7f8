//! Timeline: per-night scheduling state, and the observing blocks it's built from.

use serde::{Deserialize, Serialize};

use crate::interval::Interval;

use super::ids::PlateId;
use super::time::Jd;

/// A contiguous JD interval consumed to create a `Timeline` (spec §3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ObservingBlock {
    pub jd0: Jd,
    pub jd1: Jd,
}

/// Scheduling state for one observing block. Lives only during one
/// scheduling run (spec §3, Lifecycle).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline {
    pub jd_start: Jd,
    pub jd_end: Jd,
    /// JD slots in which a new exposure may still be inserted.
    pub unallocated_exposure_intervals: Vec<Interval>,
    /// JD window still available for any plate (a plate consumes its
    /// whole visibility range once scheduled).
    pub unallocated_plate_window: Vec<Interval>,
    pub scheduled: Vec<PlateId>,
    /// True iff weather was "good" for this block.
    pub observed: bool,
}

impl Timeline {
    pub fn new(jd_start: Jd, jd_end: Jd) -> Self {
        let full = Interval::new(jd_start.value(), jd_end.value());
        Self {
            jd_start,
            jd_end,
            unallocated_exposure_intervals: vec![full],
            unallocated_plate_window: vec![full],
            scheduled: vec![],
            observed: true,
        }
    }

    /// Sum of interval lengths in `unallocated_exposure_intervals`, in
    /// the same units as JD (i.e. days; callers convert to hours as
    /// needed — the spec's "hours" framing assumes JD-as-days intervals
    /// scaled by 24 at the call site).
    pub fn remaining_time(&self) -> f64 {
        self.unallocated_exposure_intervals
            .iter()
            .map(|i| i.len())
            .sum()
    }
}

impl From<ObservingBlock> for Timeline {
    fn from(block: ObservingBlock) -> Self {
        Timeline::new(block.jd0, block.jd1)
    }
}
