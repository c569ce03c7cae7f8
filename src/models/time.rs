//! Julian-Date representation used throughout the engine.

use serde::{Deserialize, Serialize};

/// A Julian Date value, as used for exposure and timeline boundaries.
///
/// MJD 0 = 1858-11-17 00:00:00 UTC. The engine only ever differences,
/// intersects or wraps these values, so the absolute epoch is not
/// load-bearing internally beyond the Unix-timestamp convenience below.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Jd(f64);

impl Jd {
    pub fn new<V: Into<f64>>(v: V) -> Self {
        Self(v.into())
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Convert to Unix timestamp (seconds since 1970-01-01 00:00:00 UTC).
    pub fn to_unix_timestamp(&self) -> f64 {
        (self.0 - 40587.0) * 86400.0
    }

    /// Create from Unix timestamp (seconds since 1970-01-01 00:00:00 UTC).
    pub fn from_unix_timestamp(timestamp: f64) -> Self {
        Self::new(timestamp / 86400.0 + 40587.0)
    }

    pub fn to_datetime(&self) -> chrono::DateTime<chrono::Utc> {
        let secs = self.to_unix_timestamp();
        let secs_i64 = secs.floor() as i64;
        let nanos = ((secs - secs.floor()) * 1e9) as u32;
        chrono::DateTime::from_timestamp(secs_i64, nanos)
            .unwrap_or_else(|| chrono::DateTime::UNIX_EPOCH)
    }

    pub fn from_datetime(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Self::from_unix_timestamp(dt.timestamp() as f64 + dt.timestamp_subsec_nanos() as f64 / 1e9)
    }
}

impl From<f64> for Jd {
    fn from(v: f64) -> Self {
        Jd::new(v)
    }
}

impl std::ops::Sub for Jd {
    type Output = f64;
    fn sub(self, rhs: Jd) -> f64 {
        self.0 - rhs.0
    }
}
