//! Exposure: immutable per-integration metadata, owned by its plate.

use serde::{Deserialize, Serialize};

use super::ids::{ExposureNo, SetId};
use super::time::Jd;

/// Dither offset label. `None` means "unknown" and is imputed at
/// assignment time (spec §3, Set invariants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DitherPosition {
    N,
    S,
    E,
    None,
}

impl DitherPosition {
    pub fn is_known(&self) -> bool {
        !matches!(self, DitherPosition::None)
    }

    /// Parses one of the configured dither labels (`set.ditherPositions`,
    /// spec §6), e.g. `"N"`, `"S"`, `"E"`. Unrecognized labels map to
    /// `None` (unknown/unassigned).
    pub fn from_label(label: &str) -> DitherPosition {
        match label {
            "N" => DitherPosition::N,
            "S" => DitherPosition::S,
            "E" => DitherPosition::E,
            _ => DitherPosition::None,
        }
    }
}

/// Where an exposure came from: a real persisted exposure, a mock
/// exposure that has been promoted into the plate's real arrangement,
/// or a trial mock created during simulation that may still be rolled
/// back. Replaces the source's mutable `_tmp` runtime attribute
/// (spec §9, Design Notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExposureOrigin {
    Persisted,
    Mock,
    TrialMock,
}

impl ExposureOrigin {
    pub fn is_mock(&self) -> bool {
        !matches!(self, ExposureOrigin::Persisted)
    }
}

/// Per-band signal-to-noise squared, in the fixed blue1/blue2/red1/red2
/// band order used throughout the engine. Entries may be `NaN`, meaning
/// "not measured" — all aggregation uses `nansum`/`nanmean` semantics
/// (spec §9).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sn2 {
    pub blue1: f64,
    pub blue2: f64,
    pub red1: f64,
    pub red2: f64,
}

impl Sn2 {
    pub const ZERO: Sn2 = Sn2 {
        blue1: 0.0,
        blue2: 0.0,
        red1: 0.0,
        red2: 0.0,
    };

    pub fn as_array(&self) -> [f64; 4] {
        [self.blue1, self.blue2, self.red1, self.red2]
    }

    pub fn from_array(a: [f64; 4]) -> Self {
        Self {
            blue1: a[0],
            blue2: a[1],
            red1: a[2],
            red2: a[3],
        }
    }

    /// Elementwise `nansum`: NaN entries contribute zero.
    pub fn nan_add(&self, other: &Sn2) -> Sn2 {
        let add = |a: f64, b: f64| {
            let a = if a.is_nan() { 0.0 } else { a };
            let b = if b.is_nan() { 0.0 } else { b };
            a + b
        };
        Sn2 {
            blue1: add(self.blue1, other.blue1),
            blue2: add(self.blue2, other.blue2),
            red1: add(self.red1, other.red1),
            red2: add(self.red2, other.red2),
        }
    }

    pub fn scalar_add(&self, k: f64) -> Sn2 {
        Sn2 {
            blue1: self.blue1 + k,
            blue2: self.blue2 + k,
            red1: self.red1 + k,
            red2: self.red2 + k,
        }
    }
}

/// `nansum` over a sequence of SN² vectors.
pub fn nansum(values: impl IntoIterator<Item = Sn2>) -> Sn2 {
    values
        .into_iter()
        .fold(Sn2::ZERO, |acc, v| acc.nan_add(&v))
}

/// `nanmean` of a pair of possibly-NaN values, treating NaN as missing.
pub fn nanmean2(a: f64, b: f64) -> f64 {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => 0.0,
        (true, false) => b,
        (false, true) => a,
        (false, false) => (a + b) / 2.0,
    }
}

/// Pre-computed ensemble-acceptance scalars, compared only against
/// config thresholds by the quality evaluator (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExposureQuality {
    pub seeing: f64,
    pub sky_brightness: f64,
    pub airmass: f64,
}

/// A single timed integration on a plate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exposure {
    pub exposure_no: ExposureNo,
    pub dither_position: DitherPosition,
    pub sn2: Sn2,
    pub jd_start: Jd,
    pub jd_end: Jd,
    pub valid: bool,
    pub origin: ExposureOrigin,
    pub quality: ExposureQuality,
    pub set_id: Option<SetId>,
}

impl Exposure {
    pub fn is_mock(&self) -> bool {
        self.origin.is_mock()
    }
}
