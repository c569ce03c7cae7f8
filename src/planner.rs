//! `PlannerDriver` (component C6): runs the scheduler across a
//! multi-night plan, drawing a deterministic weather sample per run
//! and reporting unallocated time instead of printing it (spec §4.6,
//! §9 Design Notes).

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::Config;
use crate::db::PersistencePort;
use crate::models::{Field, ObservingBlock, Plate, PlateId, Timeline};
use crate::scheduler::TimelineScheduler;
use crate::simulator::SimulationMode;
use crate::site_clock::SiteClock;

/// Summary of one `PlannerDriver::plan` run, returned to the caller
/// rather than printed (spec §9, Design Notes).
#[derive(Debug, Clone)]
pub struct PlannerReport {
    pub nights_simulated: u32,
    pub nights_observed: u32,
    pub plates_scheduled: Vec<PlateId>,
    pub total_remaining_time: f64,
}

pub struct PlannerDriver<'a> {
    cfg: &'a Config,
    clock: &'a dyn SiteClock,
    port: &'a dyn PersistencePort,
}

impl<'a> PlannerDriver<'a> {
    pub fn new(cfg: &'a Config, clock: &'a dyn SiteClock, port: &'a dyn PersistencePort) -> Self {
        Self { cfg, clock, port }
    }

    /// Draws the set of night-indices (`0..n`) judged "good weather",
    /// using the configured seed and `goodWeatherFraction`. Same seed
    /// and `n` always produce the same set (spec §9, Testable
    /// Properties: weather determinism). Spec §4.6 specifies
    /// `⌊N × goodWeatherFraction⌋`, truncating rather than rounding
    /// (the original's `int(len * fraction)`).
    pub fn good_weather_nights(&self, n: usize) -> HashSet<usize> {
        let mut rng = StdRng::seed_from_u64(self.cfg.planner.seed);
        let count = ((n as f64) * self.cfg.planner.good_weather_fraction).floor() as usize;
        let mut indices: Vec<usize> = (0..n).collect();
        indices
            .partial_shuffle(&mut rng, count.min(n))
            .0
            .iter()
            .copied()
            .collect()
    }

    /// Runs the timeline scheduler across every block in `blocks`,
    /// skipping nights drawn as bad weather, and returns a report of
    /// what was scheduled and how much time went unallocated. The plate
    /// pool's mutations (promoted mock exposures, completion) carry
    /// forward from one timeline into the next (spec §4.6). `fields`
    /// are folded into the same pool as fallback candidates (stood in
    /// via `Plate::from_field`) so an undrilled field can be picked when
    /// no drilled plate is observable.
    pub async fn plan(
        &self,
        blocks: &[ObservingBlock],
        plates: &[Plate],
        fields: &[Field],
    ) -> crate::error::Result<PlannerReport> {
        let good_nights = self.good_weather_nights(blocks.len());
        let scheduler = TimelineScheduler::new(self.cfg, self.clock, self.port);

        let mut plate_pool: Vec<Plate> = plates.to_vec();
        plate_pool.extend(fields.iter().map(Plate::from_field));
        let mut plates_scheduled = Vec::new();
        let mut nights_observed = 0;
        let mut total_remaining_time = 0.0;

        for (i, block) in blocks.iter().enumerate() {
            let mut timeline = Timeline::from(*block);
            timeline.observed = good_nights.contains(&i);

            if timeline.observed {
                let scheduled = scheduler
                    .schedule(&mut timeline, &mut plate_pool, SimulationMode::Planner, false)
                    .await?;
                log::debug!("night {i}: scheduled {} plate(s)", scheduled.len());
                plates_scheduled.extend(scheduled);
                nights_observed += 1;
            } else {
                log::debug!("night {i}: lost to weather");
            }
            total_remaining_time += timeline.remaining_time();
        }

        Ok(PlannerReport {
            nights_simulated: blocks.len() as u32,
            nights_observed,
            plates_scheduled,
            total_remaining_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LocalPersistence;
    use crate::models::Jd;
    use crate::site_clock::SimpleSiteClock;

    fn cfg_with_seed(seed: u64) -> Config {
        let mut cfg = Config::default();
        cfg.planner.seed = seed;
        cfg.planner.good_weather_fraction = 0.5;
        cfg
    }

    #[test]
    fn same_seed_yields_identical_weather_draw() {
        let cfg = cfg_with_seed(42);
        let clock = SimpleSiteClock::new(0.0, Jd::new(59000.0), 32.78);
        let store = LocalPersistence::empty();
        let driver = PlannerDriver::new(&cfg, &clock, &store);

        let a = driver.good_weather_nights(10);
        let b = driver.good_weather_nights(10);
        assert_eq!(a, b);
    }

    #[test]
    fn good_weather_count_truncates_rather_than_rounds() {
        // 5 nights * 0.5 truncates to 2, not rounds to 3 (spec §4.6:
        // `floor(N * goodWeatherFraction)`).
        let cfg = cfg_with_seed(42);
        let clock = SimpleSiteClock::new(0.0, Jd::new(59000.0), 32.78);
        let store = LocalPersistence::empty();
        let driver = PlannerDriver::new(&cfg, &clock, &store);

        assert_eq!(driver.good_weather_nights(5).len(), 2);
    }

    #[test]
    fn different_seeds_can_yield_different_draws() {
        let clock = SimpleSiteClock::new(0.0, Jd::new(59000.0), 32.78);
        let store = LocalPersistence::empty();
        let cfg_a = cfg_with_seed(1);
        let cfg_b = cfg_with_seed(2);
        let a = PlannerDriver::new(&cfg_a, &clock, &store).good_weather_nights(20);
        let b = PlannerDriver::new(&cfg_b, &clock, &store).good_weather_nights(20);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn plan_reports_unallocated_time_without_printing() {
        let cfg = cfg_with_seed(7);
        let clock = SimpleSiteClock::new(0.0, Jd::new(59000.0), 32.78);
        let store = LocalPersistence::empty();
        let driver = PlannerDriver::new(&cfg, &clock, &store);

        let blocks = vec![ObservingBlock {
            jd0: Jd::new(59000.0),
            jd1: Jd::new(59000.4),
        }];
        let report = driver.plan(&blocks, &[], &[]).await.unwrap();

        assert_eq!(report.nights_simulated, 1);
        assert!(report.plates_scheduled.is_empty());
    }

    /// When no drilled plate is supplied, an undrilled `Field` is still
    /// a viable fallback candidate (spec §4.6: `plates ∪ fields`),
    /// surfaced in the report under its negated, synthetic `PlateId`.
    #[tokio::test]
    async fn plan_falls_back_to_fields_when_no_plates_are_given() {
        let mut cfg = cfg_with_seed(3);
        cfg.planner.good_weather_fraction = 1.0;
        let clock = SimpleSiteClock::new(0.0, Jd::new(59000.0), 32.78);
        let store = LocalPersistence::empty();
        let driver = PlannerDriver::new(&cfg, &clock, &store);

        let blocks = vec![ObservingBlock {
            jd0: Jd::new(59000.0),
            jd1: Jd::new(59000.5),
        }];
        let field = Field {
            field_id: crate::models::FieldId(1),
            ra: 0.0,
            dec: 32.78,
            priority: 1,
            lst_window: crate::interval::Interval::new(0.0, 24.0),
            ancillary_weight: None,
        };

        let report = driver.plan(&blocks, &[], std::slice::from_ref(&field)).await.unwrap();

        assert_eq!(report.plates_scheduled, vec![PlateId(-1)]);
    }
}
