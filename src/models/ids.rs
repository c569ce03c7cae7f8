//! Newtype identifiers for the plate/exposure/set data model.
//!
//! Mirrors the teacher's `define_id_type!`-generated wrappers, minus the
//! pyo3/tiberius bindings that macro pulled in for the Python/mssql
//! boundaries this crate doesn't have.

use std::fmt;

macro_rules! define_id_type {
    ($name:ident) => {
        #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(v: i64) -> Self {
                $name(v)
            }
        }

        impl From<$name> for i64 {
            fn from(v: $name) -> Self {
                v.0
            }
        }
    };
}

define_id_type!(ExposureNo);
define_id_type!(SetId);
define_id_type!(PlateId);
define_id_type!(FieldId);
