//! In-memory `PersistencePort` implementation, used by this crate's
//! own test suite. Grounded on the teacher's `LocalRepository` pattern
//! (a fixture-backed stand-in kept alongside the real repository so
//! higher layers can be tested without a database).

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::models::{Exposure, ExposureNo, Field, Plate, PlateId, PlateStatusLabel, SetId};

use super::error::{PersistenceError, PersistenceResult};
use super::port::{PersistencePort, PlateQueryOptions};

pub struct LocalPersistence {
    plates: Mutex<Vec<Plate>>,
    fields: Mutex<Vec<Field>>,
    next_set_id: AtomicI64,
    tx_depth: AtomicU32,
}

impl LocalPersistence {
    pub fn new(plates: Vec<Plate>, fields: Vec<Field>) -> Self {
        let max_set_id = plates
            .iter()
            .flat_map(|p| p.sets.iter())
            .map(|s| s.set_id.0)
            .max()
            .unwrap_or(0);
        Self {
            plates: Mutex::new(plates),
            fields: Mutex::new(fields),
            next_set_id: AtomicI64::new(max_set_id + 1),
            tx_depth: AtomicU32::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

#[async_trait]
impl PersistencePort for LocalPersistence {
    async fn get_plates(&self, options: PlateQueryOptions) -> PersistenceResult<Vec<Plate>> {
        let plates = self.plates.lock().await;
        let filtered = plates
            .iter()
            .filter(|p| match &options.plate_ids {
                Some(ids) => ids.contains(&p.plate_id),
                None => true,
            })
            .filter(|p| !options.accepted_only || p.has_status(PlateStatusLabel::Accepted))
            .cloned()
            .collect();
        Ok(filtered)
    }

    async fn get_fields(
        &self,
        _reject_drilled: bool,
        accept_priority1: bool,
    ) -> PersistenceResult<Vec<Field>> {
        let fields = self.fields.lock().await;
        let filtered = fields
            .iter()
            .filter(|f| !accept_priority1 || f.priority == 1)
            .cloned()
            .collect();
        Ok(filtered)
    }

    async fn get_exposures(&self, plate_id: PlateId) -> PersistenceResult<Vec<Exposure>> {
        let plates = self.plates.lock().await;
        let plate = plates
            .iter()
            .find(|p| p.plate_id == plate_id)
            .ok_or_else(|| {
                PersistenceError::not_found(format!("no such plate: {plate_id}"))
            })?;
        Ok(plate.exposures.clone())
    }

    async fn allocate_consecutive_set_ids(&self, n: usize) -> PersistenceResult<Vec<SetId>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let start = self.next_set_id.fetch_add(n as i64, Ordering::SeqCst);
        Ok((0..n as i64).map(|i| SetId(start + i)).collect())
    }

    async fn begin_transaction(&self) -> PersistenceResult<()> {
        self.tx_depth.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn commit_transaction(&self) -> PersistenceResult<()> {
        let prev = self.tx_depth.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| {
            d.checked_sub(1)
        });
        match prev {
            Ok(_) => Ok(()),
            Err(_) => Err(PersistenceError::transaction(
                "commit called with no open transaction",
            )),
        }
    }

    async fn rollback_transaction(&self) -> PersistenceResult<()> {
        self.tx_depth.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.tx_depth.load(Ordering::SeqCst) > 0
    }

    async fn delete_set(&self, set_id: SetId) -> PersistenceResult<()> {
        let mut plates = self.plates.lock().await;
        for plate in plates.iter_mut() {
            plate.sets.retain(|s| s.set_id != set_id);
        }
        Ok(())
    }

    async fn update_exposure_set_id(
        &self,
        exposure_no: ExposureNo,
        set_id: Option<SetId>,
    ) -> PersistenceResult<()> {
        let mut plates = self.plates.lock().await;
        for plate in plates.iter_mut() {
            if let Some(exp) = plate.exposure_mut(exposure_no) {
                exp.set_id = set_id;
                return Ok(());
            }
        }
        Err(PersistenceError::not_found(format!(
            "no such exposure: {exposure_no}"
        )))
    }

    async fn remove_orphan_sets(&self) -> PersistenceResult<usize> {
        let mut plates = self.plates.lock().await;
        let mut removed = 0usize;
        for plate in plates.iter_mut() {
            let before = plate.sets.len();
            plate.sets.retain(|s| !s.is_empty());
            removed += before - plate.sets.len();
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Set;
    use std::collections::HashSet;

    fn mk_plate(id: i64) -> Plate {
        Plate {
            plate_id: PlateId(id),
            ra: 10.0,
            dec: 20.0,
            priority: 5,
            statuses: HashSet::new(),
            sets: vec![],
            exposures: vec![],
            lst_window: crate::interval::Interval::new(0.0, 2.0),
            plugged: true,
        }
    }

    #[tokio::test]
    async fn allocate_consecutive_set_ids_is_monotonic() {
        let store = LocalPersistence::empty();
        let first = store.allocate_consecutive_set_ids(3).await.unwrap();
        let second = store.allocate_consecutive_set_ids(2).await.unwrap();
        assert_eq!(first, vec![SetId(1), SetId(2), SetId(3)]);
        assert_eq!(second, vec![SetId(4), SetId(5)]);
    }

    #[tokio::test]
    async fn remove_orphan_sets_counts_empty_sets() {
        let mut plate = mk_plate(1);
        plate.sets.push(Set::new(SetId(1), vec![]));
        plate.sets.push(Set::new(SetId(2), vec![ExposureNo(1)]));
        let store = LocalPersistence::new(vec![plate], vec![]);
        let removed = store.remove_orphan_sets().await.unwrap();
        assert_eq!(removed, 1);
        let plates = store.get_plates(PlateQueryOptions::default()).await.unwrap();
        assert_eq!(plates[0].sets.len(), 1);
    }

    #[tokio::test]
    async fn transaction_depth_nests_and_unwinds() {
        let store = LocalPersistence::empty();
        assert!(!store.in_transaction());
        store.begin_transaction().await.unwrap();
        store.begin_transaction().await.unwrap();
        assert!(store.in_transaction());
        store.commit_transaction().await.unwrap();
        assert!(store.in_transaction());
        store.commit_transaction().await.unwrap();
        assert!(!store.in_transaction());
    }

    #[tokio::test]
    async fn commit_without_begin_is_an_error() {
        let store = LocalPersistence::empty();
        assert!(store.commit_transaction().await.is_err());
    }
}
