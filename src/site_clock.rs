//! `SiteClock` (component C9): the trait boundary to the site's time
//! and visibility geometry. Everything elsewhere in the crate that
//! needs "what's the LST right now" or "is this RA/Dec up" goes
//! through here, so the engine stays testable without a real ephemeris.

use crate::models::Jd;

pub trait SiteClock: Send + Sync {
    /// Local sidereal time, in hours `[0, 24)`, at Julian Date `jd`.
    fn lst_at(&self, jd: Jd) -> f64;

    /// Altitude in degrees of a target at `(ra, dec)` (both in hours/degrees
    /// as the catalogue stores them) when the local sidereal time is `lst`.
    fn altitude_at(&self, ra: f64, dec: f64, lst: f64) -> f64;
}

/// A deterministic `SiteClock` for tests: LST advances linearly with JD
/// at the sidereal rate, and altitude is a simple function of hour
/// angle and declination — enough to exercise visibility-window logic
/// without pulling in a real ephemeris library.
pub struct SimpleSiteClock {
    /// LST, in hours, at `jd0`.
    pub lst0: f64,
    pub jd0: Jd,
    /// Site latitude, in degrees.
    pub latitude: f64,
}

impl SimpleSiteClock {
    pub fn new(lst0: f64, jd0: Jd, latitude: f64) -> Self {
        Self { lst0, jd0, latitude }
    }
}

const SIDEREAL_HOURS_PER_DAY: f64 = 24.065_709_82;

impl SiteClock for SimpleSiteClock {
    fn lst_at(&self, jd: Jd) -> f64 {
        let elapsed_days = jd - self.jd0;
        let lst = self.lst0 + elapsed_days * SIDEREAL_HOURS_PER_DAY;
        lst.rem_euclid(24.0)
    }

    fn altitude_at(&self, _ra: f64, dec: f64, lst: f64) -> f64 {
        let hour_angle_deg = lst * 15.0;
        let lat = self.latitude.to_radians();
        let dec = dec.to_radians();
        let ha = hour_angle_deg.to_radians();
        let sin_alt = lat.sin() * dec.sin() + lat.cos() * dec.cos() * ha.cos();
        sin_alt.clamp(-1.0, 1.0).asin().to_degrees()
    }
}
