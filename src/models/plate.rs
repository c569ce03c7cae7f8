//! Plate: the drilled unit of observation; exclusively owns its sets and exposures.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::interval::Interval;

use super::exposure::Exposure;
use super::field::Field;
use super::ids::{ExposureNo, PlateId, SetId};
use super::set::Set;

/// Plate-level status labels (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlateStatusLabel {
    Rejected,
    Unobservable,
    Accepted,
    Started,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plate {
    pub plate_id: PlateId,
    pub ra: f64,
    pub dec: f64,
    pub priority: i64,
    pub statuses: HashSet<PlateStatusLabel>,
    pub sets: Vec<Set>,
    pub exposures: Vec<Exposure>,
    /// Visibility window in LST hours, `[lstStart, lstEnd] mod 24`.
    pub lst_window: Interval,
    pub plugged: bool,
}

impl Plate {
    pub fn has_status(&self, label: PlateStatusLabel) -> bool {
        self.statuses.contains(&label)
    }

    /// A plate is "started" iff it already has at least one exposure
    /// assigned to a set (spec §4.5 step 4).
    pub fn is_started(&self) -> bool {
        self.exposures.iter().any(|e| e.set_id.is_some())
    }

    pub fn exposure(&self, no: ExposureNo) -> Option<&Exposure> {
        self.exposures.iter().find(|e| e.exposure_no == no)
    }

    pub fn exposure_mut(&mut self, no: ExposureNo) -> Option<&mut Exposure> {
        self.exposures.iter_mut().find(|e| e.exposure_no == no)
    }

    pub fn set(&self, id: SetId) -> Option<&Set> {
        self.sets.iter().find(|s| s.set_id == id)
    }

    pub fn set_mut(&mut self, id: SetId) -> Option<&mut Set> {
        self.sets.iter_mut().find(|s| s.set_id == id)
    }

    /// Sets returned in `setId` order (spec §5, Ordering guarantees).
    pub fn sets_ordered(&self) -> Vec<&Set> {
        let mut v: Vec<&Set> = self.sets.iter().collect();
        v.sort_by_key(|s| s.set_id.0);
        v
    }

    /// Unassigned, valid exposures in ascending `exposureNo` order
    /// (spec §5, Ordering guarantees).
    pub fn unassigned_valid_exposures(&self) -> Vec<ExposureNo> {
        let mut v: Vec<ExposureNo> = self
            .exposures
            .iter()
            .filter(|e| e.set_id.is_none() && e.valid)
            .map(|e| e.exposure_no)
            .collect();
        v.sort_by_key(|n| n.0);
        v
    }

    pub fn mock_exposures(&self) -> Vec<ExposureNo> {
        self.exposures
            .iter()
            .filter(|e| e.is_mock())
            .map(|e| e.exposure_no)
            .collect()
    }

    /// Stands an undrilled `Field` in as a fallback scheduling candidate
    /// (spec §4.6: the planner schedules `plates ∪ fields`). A field has
    /// no sets or exposures yet, so it never reads `Complete` and is
    /// never `Accepted`/`Started`/`plugged` — it competes purely on LST
    /// visibility and priority until simulation adds trial exposures.
    /// Its synthetic `PlateId` is the field's id negated, so a caller can
    /// tell a scheduled field apart from a scheduled plate (real plate
    /// ids are always positive) without a parallel id namespace.
    pub fn from_field(field: &Field) -> Plate {
        Plate {
            plate_id: PlateId(-field.field_id.0),
            ra: field.ra,
            dec: field.dec,
            priority: field.priority,
            statuses: HashSet::new(),
            sets: Vec::new(),
            exposures: Vec::new(),
            lst_window: field.lst_window,
            plugged: false,
        }
    }

    /// Whether this plate is really a `Field` stood in via `from_field`.
    pub fn is_field_stand_in(&self) -> bool {
        self.plate_id.0 < 0
    }
}

impl PartialEq for Plate {
    fn eq(&self, other: &Self) -> bool {
        self.plate_id == other.plate_id
    }
}
