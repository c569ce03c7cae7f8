//! Field: an undrilled plate candidate, used as fallback by the planner.

use serde::{Deserialize, Serialize};

use crate::interval::Interval;

use super::ids::FieldId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub field_id: FieldId,
    pub ra: f64,
    pub dec: f64,
    pub priority: i64,
    pub lst_window: Interval,
    /// Ancillary weight for the field's tile, when present (spec §6,
    /// tile weights table).
    pub ancillary_weight: Option<f64>,
}
