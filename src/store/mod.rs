// src/store/mod.rs
//! Backing store abstraction: eligibility queries plus keyed whole-record
//! updates.
pub mod memory;
pub mod supabase;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::BacklogError;
use crate::persist::RecordUpdate;
use crate::record::{RecordId, WorkItem};

/// Store-side query shape used by the work selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreQuery {
    /// Server-side function returning the ids that still need summaries.
    Rpc { function: String },
    /// Column predicate over every profile column (null, placeholder or
    /// failure sentinel).
    Filter { profiles: Vec<String> },
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All records the query deems eligible, in a stable order.
    async fn select_eligible(&self, query: &StoreQuery) -> Result<Vec<WorkItem>, BacklogError>;

    /// Last-processed fingerprints for the given ids. Ids unknown to the
    /// store are absent from the map.
    async fn stored_fingerprints(
        &self,
        ids: &[RecordId],
    ) -> Result<HashMap<RecordId, Option<String>>, BacklogError>;

    /// Apply `update` to record `id` as a single atomic write.
    async fn update_record(&self, id: RecordId, update: &RecordUpdate) -> Result<(), BacklogError>;

    fn name(&self) -> &'static str;
}
