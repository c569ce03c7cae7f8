//! `TimelineScheduler` (component C5): allocates plates to a timeline's
//! remaining JD windows, simulating each candidate plate forward with
//! `PlateSimulator` before picking a winner (spec §4.5).

use std::cmp::Ordering;

use crate::arrangement::ArrangementEngine;
use crate::config::Config;
use crate::db::PersistencePort;
use crate::interval::{contains, remove, Interval};
use crate::models::{ExposureOrigin, Jd, ObservingBlock, Plate, PlateId, PlateStatusLabel, Timeline};
use crate::quality::{is_plate_complete, plate_completion};
use crate::simulator::{PlateSimulator, SimulationMode};
use crate::site_clock::SiteClock;

pub struct TimelineScheduler<'a> {
    cfg: &'a Config,
    clock: &'a dyn SiteClock,
    port: &'a dyn PersistencePort,
}

impl<'a> TimelineScheduler<'a> {
    pub fn new(cfg: &'a Config, clock: &'a dyn SiteClock, port: &'a dyn PersistencePort) -> Self {
        Self { cfg, clock, port }
    }

    pub fn remaining_time(&self, timeline: &Timeline) -> f64 {
        timeline.remaining_time()
    }

    fn simulator(&self) -> PlateSimulator<'_> {
        PlateSimulator::new(self.cfg, self.clock)
    }

    fn arrangement(&self) -> ArrangementEngine<'_> {
        ArrangementEngine::new(self.cfg, self.port)
    }

    /// Whether `plate` is above the horizon and within its LST window
    /// at the midpoint of the JD interval `window`.
    fn visible_during(&self, plate: &Plate, window: Interval) -> bool {
        let mid = Jd::new((window.lo + window.hi) / 2.0);
        let lst = self.clock.lst_at(mid);
        contains(lst, plate.lst_window, Some(24.0))
    }

    fn is_observable(&self, plate: &Plate, timeline: &Timeline) -> bool {
        timeline
            .unallocated_plate_window
            .iter()
            .any(|w| self.visible_during(plate, *w))
    }

    /// `numExposures / priority`, boosted for not-yet-plugged plates by
    /// `planner.noPlugPriority` so they out-rank an equally-complete
    /// plugged plate on ties (spec §4.5.1, §6).
    fn exposure_priority_ratio(&self, plate: &Plate) -> f64 {
        let mut priority = plate.priority as f64;
        if !plate.plugged {
            priority += self.cfg.planner.no_plug_priority;
        }
        plate.exposures.len() as f64 / priority.max(1.0)
    }

    /// Picks the next plate to schedule and the plate-window interval it
    /// consumes, simulating trial exposures onto candidates and
    /// promoting/rolling them back according to the winner
    /// (spec §4.5, `selectOptimalPlate`).
    pub async fn select_optimal_plate(
        &self,
        plates: &mut Vec<Plate>,
        timeline: &Timeline,
        mode: SimulationMode,
        prioritise_plugged: bool,
        exclude: &std::collections::HashSet<PlateId>,
    ) -> crate::error::Result<Option<(PlateId, Interval)>> {
        let candidates: Vec<PlateId> = plates
            .iter()
            .filter(|p| !exclude.contains(&p.plate_id))
            .filter(|p| self.is_observable(p, timeline))
            .filter(|p| !is_plate_complete(p, self.cfg))
            .map(|p| p.plate_id)
            .collect();
        if candidates.is_empty() {
            return Ok(None);
        }

        if prioritise_plugged {
            let plugged: Vec<PlateId> = candidates
                .iter()
                .filter(|id| {
                    plates
                        .iter()
                        .find(|p| p.plate_id == **id)
                        .map(|p| p.plugged)
                        .unwrap_or(false)
                })
                .copied()
                .collect();
            if !plugged.is_empty() {
                return self.select_among(plates, &plugged, timeline, mode).await;
            }
        }

        self.select_among(plates, &candidates, timeline, mode).await
    }

    /// Tries the `started` subset of `candidates` first (plates already
    /// carrying at least one assigned exposure); falls back to the full
    /// set if simulation on `started` produces nothing (spec §4.5 step 4).
    async fn select_among(
        &self,
        plates: &mut Vec<Plate>,
        candidates: &[PlateId],
        timeline: &Timeline,
        mode: SimulationMode,
    ) -> crate::error::Result<Option<(PlateId, Interval)>> {
        let started: Vec<PlateId> = candidates
            .iter()
            .filter(|id| {
                plates
                    .iter()
                    .find(|p| p.plate_id == **id)
                    .map(|p| p.is_started())
                    .unwrap_or(false)
            })
            .copied()
            .collect();

        if let Some(result) = self.simulate_and_select(plates, &started, timeline, mode).await? {
            return Ok(Some(result));
        }
        self.simulate_and_select(plates, candidates, timeline, mode).await
    }

    /// Runs `PlateSimulator` across `timeline`'s available plate windows
    /// for every plate in `ids`, keeps only those that gained at least
    /// one trial exposure, selects a winner among them (spec §4.5.1),
    /// promotes the winner's trial exposures to permanent mocks, and
    /// rolls every other candidate's trial exposures back.
    async fn simulate_and_select(
        &self,
        plates: &mut Vec<Plate>,
        ids: &[PlateId],
        timeline: &Timeline,
        mode: SimulationMode,
    ) -> crate::error::Result<Option<(PlateId, Interval)>> {
        if ids.is_empty() {
            return Ok(None);
        }

        let sim = self.simulator();
        let arrangement = self.arrangement();
        let mut produced: Vec<PlateId> = Vec::new();

        for id in ids {
            let Some(plate) = plates.iter_mut().find(|p| p.plate_id == *id) else {
                continue;
            };
            let mut gained = false;
            for window in timeline.unallocated_plate_window.clone() {
                let block = ObservingBlock {
                    jd0: Jd::new(window.lo),
                    jd1: Jd::new(window.hi),
                };
                if !sim.simulate(plate, block, mode).is_empty() {
                    gained = true;
                }
            }
            if gained {
                let _ = arrangement.update_plate_assignments(plate, false, None).await?;
                produced.push(*id);
            }
        }

        if produced.is_empty() {
            return Ok(None);
        }

        let winner = match self.select_optimal(plates, &produced, timeline) {
            Some(id) => id,
            None => return Ok(None),
        };
        let window = timeline
            .unallocated_plate_window
            .iter()
            .find(|w| {
                plates
                    .iter()
                    .find(|p| p.plate_id == winner)
                    .map(|p| self.visible_during(p, **w))
                    .unwrap_or(false)
            })
            .copied()
            .or_else(|| timeline.unallocated_plate_window.first().copied());
        let Some(window) = window else {
            return Ok(None);
        };

        for id in &produced {
            let Some(plate) = plates.iter_mut().find(|p| p.plate_id == *id) else {
                continue;
            };
            if *id == winner {
                for e in plate.exposures.iter_mut() {
                    if e.origin == ExposureOrigin::TrialMock {
                        e.origin = ExposureOrigin::Mock;
                    }
                }
            } else {
                sim.cleanup_plate(plate);
                arrangement.update_plate(plate);
            }
        }

        Ok(Some((winner, window)))
    }

    /// `selectOptimal` (spec §4.5.1): narrows to plates visible at the
    /// earliest unallocated moment if any qualify, then prefers a
    /// completed plate with the smallest `numExposures/priority`, else
    /// the `Accepted` plate with the highest completion (ties by the
    /// same ratio), else the same rule over every remaining candidate.
    fn select_optimal(&self, plates: &[Plate], candidates: &[PlateId], timeline: &Timeline) -> Option<PlateId> {
        let earliest = timeline
            .unallocated_plate_window
            .iter()
            .map(|w| w.lo)
            .fold(f64::INFINITY, f64::min);

        let mut pool: Vec<&Plate> = candidates
            .iter()
            .filter_map(|id| plates.iter().find(|p| p.plate_id == *id))
            .collect();

        if earliest.is_finite() {
            let min_lst = self.clock.lst_at(Jd::new(earliest));
            let narrowed: Vec<&Plate> = pool
                .iter()
                .copied()
                .filter(|p| contains(min_lst, p.lst_window, Some(24.0)))
                .collect();
            if !narrowed.is_empty() {
                pool = narrowed;
            }
        }

        let complete: Vec<&Plate> = pool.iter().copied().filter(|p| is_plate_complete(p, self.cfg)).collect();
        if !complete.is_empty() {
            let mut ranked = complete;
            ranked.sort_by(|a, b| {
                self.exposure_priority_ratio(a)
                    .partial_cmp(&self.exposure_priority_ratio(b))
                    .unwrap_or(Ordering::Equal)
                    .then(a.plate_id.0.cmp(&b.plate_id.0))
            });
            return ranked.first().map(|p| p.plate_id);
        }

        let accepted: Vec<&Plate> = pool.iter().copied().filter(|p| p.has_status(PlateStatusLabel::Accepted)).collect();
        let mut ranked = if accepted.is_empty() { pool } else { accepted };
        ranked.sort_by(|a, b| {
            let ca = plate_completion(a, self.cfg).overall;
            let cb = plate_completion(b, self.cfg).overall;
            cb.partial_cmp(&ca)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    self.exposure_priority_ratio(a)
                        .partial_cmp(&self.exposure_priority_ratio(b))
                        .unwrap_or(Ordering::Equal)
                })
                .then(a.plate_id.0.cmp(&b.plate_id.0))
        });
        ranked.first().map(|p| p.plate_id)
    }

    /// Subtracts each of `plate`'s valid exposures' own JD span from the
    /// timeline's exposure intervals, and the whole consumed `window`
    /// from its plate-window intervals (spec §4.5, `allocateJDs`).
    pub fn allocate_jds(&self, timeline: &mut Timeline, plate: &Plate, window: Interval) {
        let mut exposure_intervals = timeline.unallocated_exposure_intervals.clone();
        for e in &plate.exposures {
            if !e.valid {
                continue;
            }
            let span = Interval::new(e.jd_start.value(), e.jd_end.value());
            let mut next = Vec::new();
            for existing in &exposure_intervals {
                next.extend(remove(*existing, span, None));
            }
            exposure_intervals = next;
        }
        timeline.unallocated_exposure_intervals = exposure_intervals;

        let mut plate_windows = Vec::new();
        for iv in &timeline.unallocated_plate_window {
            plate_windows.extend(remove(*iv, window, None));
        }
        timeline.unallocated_plate_window = plate_windows;

        timeline.scheduled.push(plate.plate_id);
    }

    /// Greedily allocates plates to `timeline`'s remaining windows until
    /// it runs out of time, candidates, or neither simulation subset
    /// yields a mock exposure. With `force`, any plates still unscheduled
    /// afterward are appended anyway, unallocated (spec §4.5).
    ///
    /// Scheduled plates stay in `plates` (mutated with whatever mock
    /// exposures simulation promoted), merely excluded from the rest of
    /// *this* night's loop, so a caller carrying the same pool across
    /// several timelines (spec §4.6) sees every plate's accumulated
    /// completion on the next call.
    pub async fn schedule(
        &self,
        timeline: &mut Timeline,
        plates: &mut Vec<Plate>,
        mode: SimulationMode,
        force: bool,
    ) -> crate::error::Result<Vec<PlateId>> {
        let mut scheduled = Vec::new();
        let mut excluded = std::collections::HashSet::new();
        let prioritise_plugged = mode == SimulationMode::Plugger;

        while self.remaining_time(timeline) > 0.0 && excluded.len() < plates.len() {
            let selection = self
                .select_optimal_plate(plates, timeline, mode, prioritise_plugged, &excluded)
                .await?;
            let (chosen, window) = match selection {
                Some(v) => v,
                None => break,
            };
            let plate = plates
                .iter()
                .find(|p| p.plate_id == chosen)
                .cloned()
                .expect("selected plate id came from `plates`");

            self.allocate_jds(timeline, &plate, window);
            scheduled.push(chosen);
            excluded.insert(chosen);
        }

        if force {
            for plate in plates.iter().filter(|p| !excluded.contains(&p.plate_id)) {
                scheduled.push(plate.plate_id);
            }
        }

        Ok(scheduled)
    }
}
