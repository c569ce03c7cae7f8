//! Set: a group of up to 3 exposures from one plate.

use serde::{Deserialize, Serialize};

use super::exposure::Sn2;
use super::ids::{ExposureNo, SetId};

/// Derived quality status of a set (spec §4.2). The two `Override*`
/// variants freeze the status regardless of data and pin the set
/// against automatic mutation (spec §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetStatus {
    Excellent,
    Good,
    Incomplete,
    Bad,
    Unplugged,
    OverrideGood,
    OverrideBad,
}

impl SetStatus {
    pub fn is_override(&self) -> bool {
        matches!(self, SetStatus::OverrideGood | SetStatus::OverrideBad)
    }

    /// Whether this status counts toward a plate's completion sum
    /// (spec §4.2: "Σ over non-Bad sets").
    pub fn counts_toward_completion(&self) -> bool {
        matches!(
            self,
            SetStatus::Excellent | SetStatus::Good | SetStatus::OverrideGood
        )
    }

    pub fn is_bad(&self) -> bool {
        matches!(self, SetStatus::Bad | SetStatus::OverrideBad)
    }
}

/// A group of up to 3 exposures from a single plate, ordered by
/// `exposureNo` (spec §3, Set invariants).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Set {
    pub set_id: SetId,
    pub exposures: Vec<ExposureNo>,
    pub status: SetStatus,
    pub sn2: Sn2,
}

impl Set {
    pub fn new(set_id: SetId, mut exposures: Vec<ExposureNo>) -> Self {
        exposures.sort_by_key(|e| e.0);
        Self {
            set_id,
            exposures,
            status: SetStatus::Incomplete,
            sn2: Sn2::ZERO,
        }
    }

    pub fn len(&self) -> usize {
        self.exposures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exposures.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.exposures.len() >= 3
    }

    pub fn is_override(&self) -> bool {
        self.status.is_override()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposures_kept_sorted_by_exposure_no() {
        let s = Set::new(SetId(1), vec![ExposureNo(3), ExposureNo(1), ExposureNo(2)]);
        assert_eq!(
            s.exposures,
            vec![ExposureNo(1), ExposureNo(2), ExposureNo(3)]
        );
    }

    #[test]
    fn override_status_is_pinned() {
        let mut s = Set::new(SetId(1), vec![ExposureNo(1)]);
        s.status = SetStatus::OverrideBad;
        assert!(s.is_override());
        assert!(s.status.is_bad());
        assert!(!s.status.counts_toward_completion());
    }

    #[test]
    fn excellent_and_override_good_count_toward_completion() {
        assert!(SetStatus::Excellent.counts_toward_completion());
        assert!(SetStatus::OverrideGood.counts_toward_completion());
        assert!(!SetStatus::Incomplete.counts_toward_completion());
        assert!(!SetStatus::Bad.counts_toward_completion());
    }
}
