//! # Fiber Scheduler Core
//!
//! Set-arrangement and timeline-scheduling core for a multi-fiber
//! spectroscopic survey: given per-plate exposures grouped by dither
//! position, decide how to group them into sets, track plate
//! completion, and allocate plates to a night's JD timeline.
//!
//! ## Architecture
//!
//! - [`models`]: the data model — exposures, sets, plates, fields, timelines.
//! - [`interval`]: wrap-aware interval arithmetic (LST wraps at 24h).
//! - [`config`]: typed, serde-driven configuration surface.
//! - [`error`]: engine-level error type.
//! - [`db`]: the `PersistencePort` trait boundary and an in-memory test double.
//! - [`quality`]: set-status and plate-completion derivation (component C2).
//! - [`arrangement`]: set assignment, rearrangement and repair (component C3).
//! - [`simulator`]: trial-mock exposure generation for "what if" scheduling (component C4).
//! - [`scheduler`]: per-night plate-to-timeline allocation (component C5).
//! - [`planner`]: multi-night driver with a seeded weather model (component C6).
//! - [`site_clock`]: the LST/altitude trait boundary (component C9).

pub mod arrangement;
pub mod config;
pub mod db;
pub mod error;
pub mod interval;
pub mod models;
pub mod planner;
pub mod quality;
pub mod scheduler;
pub mod simulator;
pub mod site_clock;

pub use config::Config;
pub use db::{PersistencePort, Registry};
pub use error::{Result, SchedulerError};
