//! `PlateSimulator` (component C4): fills a plate's unused visibility
//! window with trial-mock exposures so the scheduler can evaluate
//! "what if we observed this plate here" without touching real data
//! (spec §4.4).

use std::collections::HashSet;

use crate::config::Config;
use crate::interval::{contains, Interval};
use crate::models::{
    DitherPosition, Exposure, ExposureNo, ExposureOrigin, ExposureQuality, Jd, ObservingBlock,
    Plate, Sn2,
};
use crate::quality::is_plate_complete;
use crate::site_clock::SiteClock;

/// Which caller is running the simulation: the nightly planner or the
/// plugger, each with its own efficiency/altitude settings (spec §4.4,
/// §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationMode {
    Planner,
    Plugger,
}

pub struct PlateSimulator<'a> {
    cfg: &'a Config,
    clock: &'a dyn SiteClock,
}

impl<'a> PlateSimulator<'a> {
    pub fn new(cfg: &'a Config, clock: &'a dyn SiteClock) -> Self {
        Self { cfg, clock }
    }

    fn efficiency(&self, mode: SimulationMode) -> f64 {
        match mode {
            SimulationMode::Planner => self.cfg.planner.efficiency,
            SimulationMode::Plugger => self.cfg.plugger.efficiency,
        }
    }

    fn max_altitude(&self, mode: SimulationMode) -> f64 {
        match mode {
            SimulationMode::Planner => self.cfg.planner.max_altitude,
            SimulationMode::Plugger => self.cfg.plugger.max_altitude,
        }
    }

    /// Per-band SN² a single trial exposure of `cfg.exposure.exposureTime`
    /// is modeled to contribute: one third of the configured "good" set
    /// threshold per band, so three average trial exposures land a set
    /// right at the `Good` boundary (spec §1/§4.4: "simulating
    /// exposure-by-exposure accumulation of signal-to-noise"). There's no
    /// real integration to measure during a trial, so this is an
    /// estimate rather than a physical model; it only needs to be
    /// monotonic in exposure count for `selectOptimal`'s completion
    /// ranking to be meaningful.
    fn modeled_exposure_sn2(&self) -> Sn2 {
        let good = self.cfg.sn2_thresholds.set_good;
        Sn2 {
            blue1: good.blue1 / 3.0,
            blue2: good.blue2 / 3.0,
            red1: good.red1 / 3.0,
            red2: good.red2 / 3.0,
        }
    }

    /// Fills `plate` with `TrialMock` exposures across `window`, one
    /// exposure-time slot (inflated by `mode`'s efficiency factor for
    /// overhead) at a time. Stops entirely once the plate is complete or
    /// the target climbs above `mode`'s altitude ceiling; merely skips
    /// (without stopping) slots where the plate is outside its LST
    /// visibility window, since it may come back into view later the
    /// same night (spec §4.4). Returns the created exposures.
    pub fn simulate(&self, plate: &mut Plate, window: ObservingBlock, mode: SimulationMode) -> Vec<Exposure> {
        let step_days = self.cfg.exposure.exposure_time / 86400.0 / self.efficiency(mode).max(1e-6);
        if step_days <= 0.0 {
            return Vec::new();
        }

        let mut jd = window.jd0.value();
        let end = window.jd1.value();
        let mut next_no = plate
            .exposures
            .iter()
            .map(|e| e.exposure_no.0)
            .max()
            .unwrap_or(0)
            + 1;

        let labels = &self.cfg.set.dither_positions;
        let mut cycle_index = 0usize;
        let mut created = Vec::new();

        while jd + step_days <= end {
            if is_plate_complete(plate, self.cfg) {
                break;
            }
            let lst = self.clock.lst_at(Jd::new(jd));
            let lst_mid = self.clock.lst_at(Jd::new(jd + step_days / 2.0));
            if !contains(lst, plate.lst_window, Some(24.0)) {
                jd += step_days;
                continue;
            }
            let alt = self.clock.altitude_at(plate.ra, plate.dec, lst_mid);
            if alt > self.max_altitude(mode) {
                break;
            }

            let label = labels
                .get(cycle_index % labels.len().max(1))
                .map(String::as_str)
                .unwrap_or("None");
            let exposure = Exposure {
                exposure_no: ExposureNo(next_no),
                dither_position: DitherPosition::from_label(label),
                sn2: self.modeled_exposure_sn2(),
                jd_start: Jd::new(jd),
                jd_end: Jd::new(jd + step_days),
                valid: true,
                origin: ExposureOrigin::TrialMock,
                quality: ExposureQuality {
                    seeing: 1.0,
                    sky_brightness: 21.0,
                    airmass: 1.2,
                },
                set_id: None,
            };
            created.push(exposure.clone());
            plate.exposures.push(exposure);
            next_no += 1;
            cycle_index += 1;
            jd += step_days;
        }

        created
    }

    /// Removes every mock exposure (and any now-orphaned set) from
    /// `plate`, restoring it to its pre-simulation state (spec §4.4,
    /// Testable Property: simulation idempotence). Callers should
    /// follow with `ArrangementEngine::update_plate` to refresh
    /// remaining-set statuses.
    pub fn cleanup_plate(&self, plate: &mut Plate) {
        let mock_nos: HashSet<ExposureNo> = plate
            .exposures
            .iter()
            .filter(|e| e.is_mock())
            .map(|e| e.exposure_no)
            .collect();
        plate.exposures.retain(|e| !e.is_mock());
        for set in plate.sets.iter_mut() {
            set.exposures.retain(|no| !mock_nos.contains(no));
        }
        plate.sets.retain(|s| !s.is_empty());
    }
}
