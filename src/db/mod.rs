//! Persistence boundary: the `PersistencePort` trait and an in-memory
//! implementation used by this crate's own tests.
//!
//! The teacher's database module reached for a process-wide
//! `OnceLock<Arc<dyn FullRepository>>` singleton, initialized lazily on
//! first access. This crate deliberately does not repeat that: engine
//! components take an explicit `&dyn PersistencePort` (or an explicit
//! `Registry` value bundling one with a `Config`), constructed by the
//! caller and passed down, rather than reached for through a global
//! (spec §9, Design Notes).

pub mod error;
pub mod local;
pub mod port;

pub use error::{ErrorContext, PersistenceError, PersistenceResult};
pub use local::LocalPersistence;
pub use port::{with_transaction, PersistencePort, PlateQueryOptions};

use std::sync::Arc;

use crate::config::Config;

/// Bundles a persistence backend with the config it was constructed
/// from. Passed explicitly to engine components in place of the
/// process-wide singleton the teacher used (spec §9, Design Notes).
#[derive(Clone)]
pub struct Registry {
    pub store: Arc<dyn PersistencePort>,
    pub config: Arc<Config>,
}

impl Registry {
    pub fn new(store: Arc<dyn PersistencePort>, config: Config) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    pub fn local(config: Config) -> Self {
        Self::new(Arc::new(LocalPersistence::empty()), config)
    }
}
