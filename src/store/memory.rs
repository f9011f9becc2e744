// src/store/memory.rs
//! In-process store with fault injection for selection and writes.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::change_detector::{derive_status, is_eligible};
use crate::error::BacklogError;
use crate::persist::RecordUpdate;
use crate::record::{RecordId, StoredRecord, WorkItem};
use crate::store::{RecordStore, StoreQuery};

#[derive(Default)]
struct Inner {
    records: Vec<StoredRecord>,
    writes: Vec<(RecordId, RecordUpdate)>,
    selection_fault: Option<String>,
    failing_updates: HashSet<RecordId>,
}

pub struct MemoryStore {
    profiles: Vec<String>,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// `profiles` is what an RPC-style query checks; filter queries bring
    /// their own list.
    pub fn new(profiles: Vec<String>) -> Self {
        Self {
            profiles,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn with_records(profiles: Vec<String>, records: Vec<StoredRecord>) -> Self {
        let store = Self::new(profiles);
        for r in records {
            store.upsert(r);
        }
        store
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, BacklogError> {
        self.inner
            .lock()
            .map_err(|_| BacklogError::data_access("memory store mutex poisoned"))
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Insert or replace a record, keeping its original position.
    pub fn upsert(&self, record: StoredRecord) {
        let mut g = self.guard();
        match g.records.iter_mut().find(|r| r.id == record.id) {
            Some(slot) => *slot = record,
            None => g.records.push(record),
        }
    }

    pub fn get(&self, id: RecordId) -> Option<StoredRecord> {
        self.guard().records.iter().find(|r| r.id == id).cloned()
    }

    /// Every successful write, in order.
    pub fn writes(&self) -> Vec<(RecordId, RecordUpdate)> {
        self.guard().writes.clone()
    }

    /// Make the next selections fail as if the store were unreachable.
    pub fn fail_selection(&self, cause: impl Into<String>) {
        self.guard().selection_fault = Some(cause.into());
    }

    /// Reject writes for `id` until `heal_updates` is called.
    pub fn fail_updates_for(&self, id: impl Into<RecordId>) {
        self.guard().failing_updates.insert(id.into());
    }

    pub fn heal_updates(&self) {
        self.guard().failing_updates.clear();
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn select_eligible(&self, query: &StoreQuery) -> Result<Vec<WorkItem>, BacklogError> {
        let g = self.lock()?;
        if let Some(cause) = &g.selection_fault {
            return Err(BacklogError::DataAccess(cause.clone()));
        }
        let profiles = match query {
            StoreQuery::Rpc { .. } => &self.profiles,
            StoreQuery::Filter { profiles } => profiles,
        };
        let items = g
            .records
            .iter()
            .filter_map(|r| {
                let status = derive_status(r, profiles, None);
                is_eligible(status).then(|| WorkItem {
                    id: r.id,
                    stored_fingerprint: r.fingerprint.clone(),
                    reason: status.into(),
                })
            })
            .collect();
        Ok(items)
    }

    async fn stored_fingerprints(
        &self,
        ids: &[RecordId],
    ) -> Result<HashMap<RecordId, Option<String>>, BacklogError> {
        let g = self.lock()?;
        if let Some(cause) = &g.selection_fault {
            return Err(BacklogError::DataAccess(cause.clone()));
        }
        let wanted: HashSet<&RecordId> = ids.iter().collect();
        Ok(g.records
            .iter()
            .filter(|r| wanted.contains(&r.id))
            .map(|r| (r.id, r.fingerprint.clone()))
            .collect())
    }

    async fn update_record(&self, id: RecordId, update: &RecordUpdate) -> Result<(), BacklogError> {
        let mut g = self.lock()?;
        if g.failing_updates.contains(&id) {
            return Err(BacklogError::DataAccess(format!(
                "write rejected for record {id}"
            )));
        }
        let Some(record) = g.records.iter_mut().find(|r| r.id == id) else {
            return Err(BacklogError::DataAccess(format!("no record with id {id}")));
        };
        record.fingerprint = Some(update.fingerprint.clone());
        record.source_text = Some(update.source_text.clone());
        for (profile, output) in &update.outputs {
            record.outputs.insert(profile.clone(), output.clone());
        }
        g.writes.push((id, update.clone()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{EnrichmentOutput, FailureCategory, SelectionReason};

    fn profiles() -> Vec<String> {
        vec!["simple".into(), "complex".into()]
    }

    fn done(id: u64) -> StoredRecord {
        let mut r = StoredRecord::pending(id);
        r.fingerprint = Some(format!("h{id}"));
        r.outputs.insert("simple".into(), EnrichmentOutput::Summary("s".into()));
        r.outputs.insert("complex".into(), EnrichmentOutput::Summary("c".into()));
        r
    }

    #[tokio::test]
    async fn selects_pending_and_failed_in_insertion_order() {
        let mut failed = done(3);
        failed.outputs.insert(
            "complex".into(),
            EnrichmentOutput::failed(FailureCategory::RemoteError, "x"),
        );
        let store = MemoryStore::with_records(
            profiles(),
            vec![StoredRecord::pending(7), done(1), failed],
        );
        let items = store
            .select_eligible(&StoreQuery::Rpc {
                function: "get_bills_needing_summaries".into(),
            })
            .await
            .unwrap();
        let ids: Vec<_> = items.iter().map(|w| w.id.0).collect();
        assert_eq!(ids, vec![7, 3]);
        assert_eq!(items[0].reason, SelectionReason::Pending);
        assert_eq!(items[1].reason, SelectionReason::Failed);
        assert_eq!(items[1].stored_fingerprint.as_deref(), Some("h3"));
    }

    #[tokio::test]
    async fn rejected_write_leaves_record_untouched() {
        let store = MemoryStore::with_records(profiles(), vec![done(1)]);
        store.fail_updates_for(1);
        let before = store.get(RecordId(1)).unwrap();
        let update = RecordUpdate {
            fingerprint: "new".into(),
            source_text: "t".into(),
            outputs: vec![("simple".into(), EnrichmentOutput::Summary("n".into()))],
        };
        assert!(store.update_record(RecordId(1), &update).await.is_err());
        assert_eq!(store.get(RecordId(1)).unwrap(), before);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn unknown_id_is_a_data_access_error() {
        let store = MemoryStore::new(profiles());
        let update = RecordUpdate {
            fingerprint: "f".into(),
            source_text: "t".into(),
            outputs: vec![],
        };
        let err = store.update_record(RecordId(99), &update).await.unwrap_err();
        assert!(matches!(err, BacklogError::DataAccess(_)));
    }
}
