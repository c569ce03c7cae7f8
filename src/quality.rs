//! `SetQualityEvaluator` (spec §4.2): pure functions deriving set status
//! and plate completion from SN² sums and pre-computed quality scalars.
//! Nothing here touches persistence or mutates a `Plate` in place — the
//! arrangement engine calls these and writes the results back.

use crate::config::Config;
use crate::models::{DitherPosition, Exposure, Plate, SetStatus};

/// Whether any two known (non-`None`) dither positions among `exposures`
/// collide. `None` is the "unknown" wildcard and never collides with
/// anything (spec §3, Set invariants; §4.2).
pub fn dithers_collide(exposures: &[&Exposure]) -> bool {
    let mut seen: Vec<DitherPosition> = Vec::new();
    for e in exposures {
        if e.dither_position == DitherPosition::None {
            continue;
        }
        if seen.contains(&e.dither_position) {
            return true;
        }
        seen.push(e.dither_position);
    }
    false
}

/// Sum of SN² across `exposures`' own `sn2` fields, using `nansum`
/// semantics (spec §9).
pub fn set_sn2(exposures: &[&Exposure]) -> crate::models::Sn2 {
    crate::models::exposure::nansum(exposures.iter().map(|e| e.sn2))
}

/// Whether every pre-computed quality scalar on `exposures` falls
/// inside its configured acceptance window (spec §4.2).
pub fn quality_acceptable(exposures: &[&Exposure], cfg: &Config) -> bool {
    exposures.iter().all(|e| {
        cfg.quality.seeing.accepts(e.quality.seeing)
            && cfg.quality.sky_brightness.accepts(e.quality.sky_brightness)
            && cfg.quality.airmass.accepts(e.quality.airmass)
    })
}

/// Derives a set's status from its member exposures (spec §4.2).
///
/// An existing `Override*` status is pinned by the caller before this
/// is ever invoked — this function only computes the data-driven
/// statuses (`Excellent`/`Good`/`Incomplete`/`Bad`/`Unplugged`).
pub fn evaluate_set_status(exposures: &[&Exposure], plugged: bool, cfg: &Config) -> SetStatus {
    if exposures.is_empty() {
        return if plugged {
            SetStatus::Incomplete
        } else {
            SetStatus::Unplugged
        };
    }
    // Validity/collision/quality-window `Bad` checks run regardless of
    // set size: a 1- or 2-exposure set is only `Incomplete`/`Unplugged`
    // if none of them apply (spec §4.2: "Incomplete iff fewer than 3
    // exposures and no rule above makes it Bad").
    if exposures.iter().any(|e| !e.valid) {
        return SetStatus::Bad;
    }
    if dithers_collide(exposures) {
        return SetStatus::Bad;
    }
    if !quality_acceptable(exposures, cfg) {
        return SetStatus::Bad;
    }
    if exposures.len() < 3 {
        return if plugged {
            SetStatus::Incomplete
        } else {
            SetStatus::Unplugged
        };
    }

    let sn2 = set_sn2(exposures);
    let excellent = &cfg.sn2_thresholds.set_excellent;
    let good = &cfg.sn2_thresholds.set_good;

    if sn2.blue1 >= excellent.blue1
        && sn2.blue2 >= excellent.blue2
        && sn2.red1 >= excellent.red1
        && sn2.red2 >= excellent.red2
    {
        SetStatus::Excellent
    } else if sn2.blue1 >= good.blue1
        && sn2.blue2 >= good.blue2
        && sn2.red1 >= good.red1
        && sn2.red2 >= good.red2
    {
        SetStatus::Good
    } else {
        SetStatus::Bad
    }
}

/// Blue/red completion fractions and their minimum, per spec §4.2:
/// completion is the minimum of the blue and red band completions,
/// each the sum of SN² over non-`Bad` sets divided by the plate-level
/// threshold for that band.
pub struct Completion {
    pub blue: f64,
    pub red: f64,
    pub overall: f64,
}

/// A plate is complete iff its completion fraction meets 1.0 (spec §4.2).
pub fn is_plate_complete(plate: &Plate, cfg: &Config) -> bool {
    plate_completion(plate, cfg).overall >= 1.0
}

pub fn plate_completion(plate: &Plate, cfg: &Config) -> Completion {
    let mut blue_sum = 0.0;
    let mut red_sum = 0.0;
    for set in &plate.sets {
        if set.status.is_bad() {
            continue;
        }
        blue_sum += if set.sn2.blue1.is_nan() { 0.0 } else { set.sn2.blue1 }
            + if set.sn2.blue2.is_nan() { 0.0 } else { set.sn2.blue2 };
        red_sum += if set.sn2.red1.is_nan() { 0.0 } else { set.sn2.red1 }
            + if set.sn2.red2.is_nan() { 0.0 } else { set.sn2.red2 };
    }
    let blue = blue_sum / (2.0 * cfg.sn2_thresholds.plate_blue);
    let red = red_sum / (2.0 * cfg.sn2_thresholds.plate_red);
    Completion {
        blue,
        red,
        overall: blue.min(red),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        DitherPosition, ExposureNo, ExposureOrigin, ExposureQuality, PlateId, Set, SetId, Sn2,
    };
    use crate::models::time::Jd;
    use std::collections::HashSet;

    fn exp(no: i64, dither: DitherPosition, sn2: Sn2, valid: bool) -> Exposure {
        Exposure {
            exposure_no: ExposureNo(no),
            dither_position: dither,
            sn2,
            jd_start: Jd::new(59000.0),
            jd_end: Jd::new(59000.1),
            valid,
            origin: ExposureOrigin::Persisted,
            quality: ExposureQuality {
                seeing: 1.0,
                sky_brightness: 21.0,
                airmass: 1.1,
            },
            set_id: None,
        }
    }

    fn excellent_sn2() -> Sn2 {
        Sn2 {
            blue1: 2.0,
            blue2: 2.0,
            red1: 3.0,
            red2: 3.0,
        }
    }

    #[test]
    fn three_excellent_exposures_yield_excellent_set() {
        let cfg = Config::default();
        let exposures = vec![
            exp(1, DitherPosition::N, excellent_sn2(), true),
            exp(2, DitherPosition::S, excellent_sn2(), true),
            exp(3, DitherPosition::E, excellent_sn2(), true),
        ];
        let refs: Vec<&Exposure> = exposures.iter().collect();
        assert_eq!(
            evaluate_set_status(&refs, true, &cfg),
            SetStatus::Excellent
        );
    }

    #[test]
    fn fewer_than_three_exposures_is_incomplete() {
        let cfg = Config::default();
        let exposures = vec![
            exp(1, DitherPosition::N, excellent_sn2(), true),
            exp(2, DitherPosition::S, excellent_sn2(), true),
        ];
        let refs: Vec<&Exposure> = exposures.iter().collect();
        assert_eq!(
            evaluate_set_status(&refs, true, &cfg),
            SetStatus::Incomplete
        );
    }

    #[test]
    fn invalid_exposure_makes_set_bad() {
        let cfg = Config::default();
        let exposures = vec![
            exp(1, DitherPosition::N, excellent_sn2(), true),
            exp(2, DitherPosition::S, excellent_sn2(), false),
            exp(3, DitherPosition::E, excellent_sn2(), true),
        ];
        let refs: Vec<&Exposure> = exposures.iter().collect();
        assert_eq!(evaluate_set_status(&refs, true, &cfg), SetStatus::Bad);
    }

    #[test]
    fn colliding_dithers_make_set_bad() {
        let cfg = Config::default();
        let exposures = vec![
            exp(1, DitherPosition::N, excellent_sn2(), true),
            exp(2, DitherPosition::N, excellent_sn2(), true),
            exp(3, DitherPosition::E, excellent_sn2(), true),
        ];
        let refs: Vec<&Exposure> = exposures.iter().collect();
        assert_eq!(evaluate_set_status(&refs, true, &cfg), SetStatus::Bad);
    }

    #[test]
    fn unknown_dither_never_collides() {
        let cfg = Config::default();
        let exposures = vec![
            exp(1, DitherPosition::None, excellent_sn2(), true),
            exp(2, DitherPosition::None, excellent_sn2(), true),
            exp(3, DitherPosition::E, excellent_sn2(), true),
        ];
        let refs: Vec<&Exposure> = exposures.iter().collect();
        assert_eq!(
            evaluate_set_status(&refs, true, &cfg),
            SetStatus::Excellent
        );
    }

    #[test]
    fn colliding_pair_below_three_exposures_is_bad_not_incomplete() {
        let cfg = Config::default();
        let exposures = vec![
            exp(1, DitherPosition::N, excellent_sn2(), true),
            exp(2, DitherPosition::N, excellent_sn2(), true),
        ];
        let refs: Vec<&Exposure> = exposures.iter().collect();
        assert_eq!(evaluate_set_status(&refs, true, &cfg), SetStatus::Bad);
    }

    #[test]
    fn invalid_pair_below_three_exposures_is_bad_not_incomplete() {
        let cfg = Config::default();
        let exposures = vec![
            exp(1, DitherPosition::N, excellent_sn2(), true),
            exp(2, DitherPosition::S, excellent_sn2(), false),
        ];
        let refs: Vec<&Exposure> = exposures.iter().collect();
        assert_eq!(evaluate_set_status(&refs, true, &cfg), SetStatus::Bad);
    }

    #[test]
    fn incomplete_set_on_unplugged_plate_is_unplugged() {
        let cfg = Config::default();
        let exposures = vec![exp(1, DitherPosition::N, excellent_sn2(), true)];
        let refs: Vec<&Exposure> = exposures.iter().collect();
        assert_eq!(
            evaluate_set_status(&refs, false, &cfg),
            SetStatus::Unplugged
        );
    }

    #[test]
    fn complete_excellent_set_stays_excellent_even_if_unplugged() {
        let cfg = Config::default();
        let exposures = vec![
            exp(1, DitherPosition::N, excellent_sn2(), true),
            exp(2, DitherPosition::S, excellent_sn2(), true),
            exp(3, DitherPosition::E, excellent_sn2(), true),
        ];
        let refs: Vec<&Exposure> = exposures.iter().collect();
        assert_eq!(
            evaluate_set_status(&refs, false, &cfg),
            SetStatus::Excellent
        );
    }

    #[test]
    fn plate_completion_is_monotonic_in_added_good_sets() {
        let cfg = Config::default();
        let mut plate = Plate {
            plate_id: PlateId(1),
            ra: 0.0,
            dec: 0.0,
            priority: 1,
            statuses: HashSet::new(),
            sets: vec![],
            exposures: vec![],
            lst_window: crate::interval::Interval::new(0.0, 2.0),
            plugged: true,
        };
        let before = plate_completion(&plate, &cfg).overall;

        let mut set = Set::new(SetId(1), vec![ExposureNo(1), ExposureNo(2), ExposureNo(3)]);
        set.status = SetStatus::Excellent;
        set.sn2 = excellent_sn2();
        plate.sets.push(set);
        let after = plate_completion(&plate, &cfg).overall;

        assert!(after >= before);
    }
}
