//! Typed representation of the configuration surface enumerated in
//! spec.md §6. Loading (TOML via `serde`) is implemented; the search
//! path / secrets-management behavior around a real deployment's config
//! directory is an external concern.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::SchedulerError;
use crate::models::Sn2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposureConfig {
    /// Base exposure time, in seconds.
    pub exposure_time: f64,
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self {
            exposure_time: 900.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    pub efficiency: f64,
    pub good_weather_fraction: f64,
    pub no_plug_priority: f64,
    pub seed: u64,
    pub max_altitude: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            efficiency: 0.85,
            good_weather_fraction: 0.5,
            no_plug_priority: 1.0,
            seed: 0,
            max_altitude: 85.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluggerConfig {
    pub efficiency: f64,
    pub max_altitude: f64,
}

impl Default for PluggerConfig {
    fn default() -> Self {
        Self {
            efficiency: 0.9,
            max_altitude: 88.0,
        }
    }
}

/// Per-band SN² acceptance thresholds, e.g. `setExcellent*`/`setGood*`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BandThresholds {
    pub blue1: f64,
    pub blue2: f64,
    pub red1: f64,
    pub red2: f64,
}

impl BandThresholds {
    pub fn as_sn2(&self) -> Sn2 {
        Sn2 {
            blue1: self.blue1,
            blue2: self.blue2,
            red1: self.red1,
            red2: self.red2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sn2ThresholdsConfig {
    pub plate_blue: f64,
    pub plate_red: f64,
    pub set_excellent: BandThresholds,
    pub set_good: BandThresholds,
}

impl Default for Sn2ThresholdsConfig {
    fn default() -> Self {
        Self {
            plate_blue: 9.0,
            plate_red: 17.0,
            set_excellent: BandThresholds {
                blue1: 4.0,
                blue2: 4.0,
                red1: 7.0,
                red2: 7.0,
            },
            set_good: BandThresholds {
                blue1: 3.0,
                blue2: 3.0,
                red1: 5.5,
                red2: 5.5,
            },
        }
    }
}

/// Inclusive `[min, max]` acceptance window for one pre-computed
/// ensemble-quality scalar.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AcceptanceWindow {
    pub min: f64,
    pub max: f64,
}

impl AcceptanceWindow {
    pub fn accepts(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityWindowsConfig {
    pub seeing: AcceptanceWindow,
    pub sky_brightness: AcceptanceWindow,
    pub airmass: AcceptanceWindow,
}

impl Default for QualityWindowsConfig {
    fn default() -> Self {
        Self {
            seeing: AcceptanceWindow { min: 0.0, max: 2.5 },
            sky_brightness: AcceptanceWindow {
                min: 17.0,
                max: 25.0,
            },
            airmass: AcceptanceWindow { min: 1.0, max: 1.6 },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetConfig {
    /// The set of valid dither labels (excluding `None`), e.g. `[N, S, E]`.
    pub dither_positions: Vec<String>,
    pub set_rearrangement_factor: f64,
}

impl Default for SetConfig {
    fn default() -> Self {
        Self {
            dither_positions: vec!["N".into(), "S".into(), "E".into()],
            set_rearrangement_factor: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetArrangementConfig {
    pub permutation_limit_plate: u64,
    pub permutation_limit_incomplete: u64,
}

impl Default for SetArrangementConfig {
    fn default() -> Self {
        Self {
            permutation_limit_plate: 10_000,
            permutation_limit_incomplete: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FieldsConfig {
    pub science_catalogue: Option<String>,
    pub min_targets_in_tile: i64,
    pub tiles_being_drilled: Vec<i64>,
}

/// Aggregates every item in spec.md §6's enumerated config surface.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub exposure: ExposureConfig,
    pub planner: PlannerConfig,
    pub plugger: PluggerConfig,
    pub sn2_thresholds: Sn2ThresholdsConfig,
    pub quality: QualityWindowsConfig,
    pub set: SetConfig,
    pub set_arrangement: SetArrangementConfig,
    pub fields: FieldsConfig,
    pub date_at_apo: Option<String>,
    pub manga_carts: Vec<i64>,
    pub offline_carts: Vec<i64>,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, SchedulerError> {
        toml::from_str(s).map_err(|e| SchedulerError::Config(e.to_string()))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SchedulerError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SchedulerError::Config(format!(
                "could not read config file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml_str(&contents)
    }
}
