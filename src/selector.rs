// src/selector.rs
//! Work selector: builds the run's worklist once, before any record is
//! touched.

use std::collections::HashSet;

use metrics::gauge;
use tracing::info;

use crate::change_detector::is_stale;
use crate::error::BacklogError;
use crate::provider::BillProvider;
use crate::record::{RecordId, SelectionReason, WorkItem};
use crate::store::{RecordStore, StoreQuery};

pub const DEFAULT_RPC: &str = "get_bills_needing_summaries";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Store-side function returning eligible ids.
    Rpc { function: String },
    /// Column predicate over the profile columns.
    Filter,
    /// `Filter` plus records whose provider fingerprint moved on.
    MasterList,
}

impl Default for SelectionStrategy {
    fn default() -> Self {
        Self::Rpc {
            function: DEFAULT_RPC.to_string(),
        }
    }
}

pub struct WorkSelector {
    strategy: SelectionStrategy,
    profiles: Vec<String>,
}

impl WorkSelector {
    pub fn new(strategy: SelectionStrategy, profiles: Vec<String>) -> Self {
        Self { strategy, profiles }
    }

    pub fn strategy(&self) -> &SelectionStrategy {
        &self.strategy
    }

    /// Every eligible record, deduplicated, in a stable order. An empty
    /// vector means there is nothing to do; any failure to query is a
    /// `DataAccess` error and ends the run.
    pub async fn select_worklist(
        &self,
        store: &dyn RecordStore,
        provider: &dyn BillProvider,
    ) -> Result<Vec<WorkItem>, BacklogError> {
        let items = match &self.strategy {
            SelectionStrategy::Rpc { function } => {
                store
                    .select_eligible(&StoreQuery::Rpc {
                        function: function.clone(),
                    })
                    .await?
            }
            SelectionStrategy::Filter => store.select_eligible(&self.filter_query()).await?,
            SelectionStrategy::MasterList => {
                let mut items = store.select_eligible(&self.filter_query()).await?;
                items.extend(self.stale_from_master_list(store, provider).await?);
                items
            }
        };

        let items = dedup_stable(items);
        gauge!("backlog_worklist_size").set(items.len() as f64);
        info!(target: "selector", count = items.len(), strategy = ?self.strategy, "worklist selected");
        Ok(items)
    }

    fn filter_query(&self) -> StoreQuery {
        StoreQuery::Filter {
            profiles: self.profiles.clone(),
        }
    }

    /// Known records whose provider fingerprint differs from the stored one.
    /// Ids the store has never seen are left to ingestion.
    async fn stale_from_master_list(
        &self,
        store: &dyn RecordStore,
        provider: &dyn BillProvider,
    ) -> Result<Vec<WorkItem>, BacklogError> {
        let master = provider
            .master_list()
            .await
            .map_err(|e| BacklogError::DataAccess(format!("master list: {e:#}")))?;
        let ids: Vec<RecordId> = master.iter().map(|e| e.id).collect();
        let stored = store.stored_fingerprints(&ids).await?;

        Ok(master
            .into_iter()
            .filter_map(|entry| {
                let current = stored.get(&entry.id)?;
                is_stale(current.as_deref(), &entry.fingerprint).then(|| WorkItem {
                    id: entry.id,
                    stored_fingerprint: current.clone(),
                    reason: SelectionReason::Stale,
                })
            })
            .collect())
    }
}

/// Drop later duplicates of the same id; the first occurrence wins.
fn dedup_stable(items: Vec<WorkItem>) -> Vec<WorkItem> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|w| seen.insert(w.id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_keeps_first_occurrence_and_order() {
        let items = vec![
            WorkItem::new(3).with_reason(SelectionReason::Failed),
            WorkItem::new(1),
            WorkItem::new(3).with_reason(SelectionReason::Stale),
        ];
        let out = dedup_stable(items);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, RecordId(3));
        assert_eq!(out[0].reason, SelectionReason::Failed);
        assert_eq!(out[1].id, RecordId(1));
    }
}
