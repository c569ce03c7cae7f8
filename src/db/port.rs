//! `PersistencePort`: the trait boundary to the external relational
//! store (spec §4.7). Only the interface and an in-memory test double
//! (`LocalPersistence`) live in this crate — the actual ORM/SQL layer
//! is an external collaborator (spec §1, Out of scope).

use std::future::Future;

use async_trait::async_trait;

use crate::models::{Exposure, ExposureNo, Field, Plate, PlateId, SetId};

use super::error::PersistenceResult;

/// Filters for `getPlates`; left intentionally small since the query
/// shape is owned by the catalog/metadata layer, not this crate.
#[derive(Debug, Clone, Default)]
pub struct PlateQueryOptions {
    pub plate_ids: Option<Vec<PlateId>>,
    pub accepted_only: bool,
}

#[async_trait]
pub trait PersistencePort: Send + Sync {
    async fn get_plates(&self, options: PlateQueryOptions) -> PersistenceResult<Vec<Plate>>;

    async fn get_fields(
        &self,
        reject_drilled: bool,
        accept_priority1: bool,
    ) -> PersistenceResult<Vec<Field>>;

    async fn get_exposures(&self, plate_id: PlateId) -> PersistenceResult<Vec<Exposure>>;

    /// Returns `n` contiguous unused identifiers; if no gap of size `n`
    /// exists, returns identifiers starting at `max_existing_id + 1`
    /// (spec §4.7, Testable Property 4).
    async fn allocate_consecutive_set_ids(&self, n: usize) -> PersistenceResult<Vec<SetId>>;

    /// Opens (or, if already open, nests into) a transaction. Nested
    /// begins are allowed; only the outermost `commit_transaction`
    /// actually commits (spec §4.7, §7 partial-failure rule).
    async fn begin_transaction(&self) -> PersistenceResult<()>;
    async fn commit_transaction(&self) -> PersistenceResult<()>;
    async fn rollback_transaction(&self) -> PersistenceResult<()>;
    fn in_transaction(&self) -> bool;

    async fn delete_set(&self, set_id: SetId) -> PersistenceResult<()>;
    async fn update_exposure_set_id(
        &self,
        exposure_no: ExposureNo,
        set_id: Option<SetId>,
    ) -> PersistenceResult<()>;
    async fn remove_orphan_sets(&self) -> PersistenceResult<usize>;
}

/// Runs `f` inside a transaction on `port`, committing on success and
/// rolling back on error. A free function rather than a trait method
/// so it stays generic over the closure's return type without making
/// `PersistencePort` non-object-safe.
pub async fn with_transaction<'a, F, Fut, T>(
    port: &'a (dyn PersistencePort + 'a),
    f: F,
) -> PersistenceResult<T>
where
    F: FnOnce(&'a (dyn PersistencePort + 'a)) -> Fut,
    Fut: Future<Output = PersistenceResult<T>>,
{
    port.begin_transaction().await?;
    match f(port).await {
        Ok(value) => {
            port.commit_transaction().await?;
            Ok(value)
        }
        Err(e) => {
            let _ = port.rollback_transaction().await;
            Err(e)
        }
    }
}
