//! Engine-level error type (spec §7).
//!
//! Structured the way the teacher's repository layer structures
//! `RepositoryError` — a `thiserror` enum carrying a free-text message —
//! but scoped to the error kinds spec.md §7 actually enumerates for the
//! engine (persistence failures bridge in via `From<PersistenceError>`).

use thiserror::Error;

use crate::db::error::PersistenceError;

pub type Result<T> = std::result::Result<T, SchedulerError>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Caller already held an open transaction when invoking `updatePlate`
    /// or `rearrange` (spec §5, Shared-resource policy).
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// An invariant the engine assumes was violated internally, e.g. a
    /// `Bad` set with a single exposure reaching `repairBadSet`
    /// (spec §4.3.4).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Enumeration would exceed the configured permutation limit and
    /// `force` was not set. Carried as a value (not necessarily
    /// propagated as an `Err`) since `rearrange` responds by returning
    /// `false`, per spec §4.3.3 step 2 / §7.
    #[error("permutation limit exceeded: {attempted} > {limit}")]
    PermutationLimitExceeded { attempted: u64, limit: u64 },

    /// Unknown plate, set, or connection.
    #[error("not found: {0}")]
    NotFound(String),

    /// Missing required config file, or a malformed override file.
    #[error("configuration error: {0}")]
    Config(String),

    /// Underlying store failure; the triggering transaction has already
    /// been rolled back by the time this reaches the caller.
    #[error("transient persistence error: {0}")]
    Transient(#[from] PersistenceError),
}
