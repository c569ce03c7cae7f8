//! Domain data model: exposures, sets, plates, fields and timelines.
//!
//! Ownership follows a single tree — a plate exclusively owns its sets
//! and exposures; a set references its exposures by `ExposureNo` rather
//! than holding a back-pointer (spec §9, Design Notes).

pub mod exposure;
pub mod field;
pub mod ids;
pub mod plate;
pub mod set;
pub mod time;
pub mod timeline;

pub use exposure::{DitherPosition, Exposure, ExposureOrigin, ExposureQuality, Sn2};
pub use field::Field;
pub use ids::{ExposureNo, FieldId, PlateId, SetId};
pub use plate::{Plate, PlateStatusLabel};
pub use set::{Set, SetStatus};
pub use time::Jd;
pub use timeline::{ObservingBlock, Timeline};
