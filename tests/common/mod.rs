// tests/common/mod.rs
// Shared test doubles: a scripted bill provider and record builders.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

use bill_backlog::config::Profile;
use bill_backlog::enrich::mock::MockBackend;
use bill_backlog::enrich::EnrichmentClient;
use bill_backlog::fetcher::RecordFetcher;
use bill_backlog::pacing::PacingConfig;
use bill_backlog::provider::{BillMetadata, BillProvider, DocumentRef, MasterListEntry};
use bill_backlog::record::{EnrichmentOutput, StoredRecord};
use bill_backlog::store::memory::MemoryStore;
use bill_backlog::{Orchestrator, RecordId};

pub const PROFILES: [&str; 3] = ["simple", "medium", "complex"];

pub fn profile_names() -> Vec<String> {
    PROFILES.iter().map(|p| p.to_string()).collect()
}

pub fn profiles() -> Vec<Profile> {
    PROFILES
        .iter()
        .map(|p| Profile::new(*p, format!("Summarize for a {p} audience.")))
        .collect()
}

/// Record with every profile summarized under `fingerprint`.
pub fn complete(id: u64, fingerprint: &str) -> StoredRecord {
    let mut r = StoredRecord::pending(id);
    r.fingerprint = Some(fingerprint.to_string());
    for p in PROFILES {
        r.outputs
            .insert(p.to_string(), EnrichmentOutput::Summary(format!("{p} summary of {id}")));
    }
    r
}

#[derive(Clone)]
enum BillScript {
    Document { fingerprint: Option<String>, text: String },
    NoDocument,
    Error(String),
}

/// In-memory provider. Bills are keyed by id; each document's doc_id is
/// `id * 10`.
#[derive(Default)]
pub struct ScriptedProvider {
    bills: Mutex<HashMap<RecordId, BillScript>>,
    master: Mutex<Option<Vec<MasterListEntry>>>,
    metadata_calls: Mutex<Vec<RecordId>>,
    /// id -> (successful metadata calls allowed, cause reported afterwards)
    fail_after: Mutex<HashMap<RecordId, (usize, String)>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, id: u64, fingerprint: &str, text: &str) -> Self {
        self.set_document(id, fingerprint, text);
        self
    }

    pub fn with_unhashed_document(self, id: u64, text: &str) -> Self {
        self.bills.lock().insert(
            RecordId(id),
            BillScript::Document {
                fingerprint: None,
                text: text.to_string(),
            },
        );
        self
    }

    pub fn without_document(self, id: u64) -> Self {
        self.bills.lock().insert(RecordId(id), BillScript::NoDocument);
        self
    }

    pub fn failing(self, id: u64, cause: &str) -> Self {
        self.bills
            .lock()
            .insert(RecordId(id), BillScript::Error(cause.to_string()));
        self
    }

    /// The first `calls` metadata requests for `id` succeed, later ones fail.
    pub fn failing_after(self, id: u64, calls: usize, cause: &str) -> Self {
        self.fail_after
            .lock()
            .insert(RecordId(id), (calls, cause.to_string()));
        self
    }

    pub fn with_master_list(self, entries: &[(u64, &str)]) -> Self {
        *self.master.lock() = Some(
            entries
                .iter()
                .map(|(id, fp)| MasterListEntry {
                    id: RecordId(*id),
                    fingerprint: fp.to_string(),
                })
                .collect(),
        );
        self
    }

    /// Change upstream content between runs.
    pub fn set_document(&self, id: u64, fingerprint: &str, text: &str) {
        self.bills.lock().insert(
            RecordId(id),
            BillScript::Document {
                fingerprint: Some(fingerprint.to_string()),
                text: text.to_string(),
            },
        );
    }

    /// Ids whose metadata was requested, in call order.
    pub fn metadata_calls(&self) -> Vec<u64> {
        self.metadata_calls.lock().iter().map(|id| id.0).collect()
    }
}

#[async_trait]
impl BillProvider for ScriptedProvider {
    async fn bill_metadata(&self, id: RecordId) -> Result<BillMetadata> {
        let seen = {
            let mut calls = self.metadata_calls.lock();
            calls.push(id);
            calls.iter().filter(|c| **c == id).count()
        };
        if let Some((allowed, cause)) = self.fail_after.lock().get(&id) {
            if seen > *allowed {
                return Err(anyhow!("HTTP 502: {cause}"));
            }
        }
        let script = self
            .bills
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown bill {id}"))?;
        match script {
            BillScript::Document { fingerprint, .. } => Ok(BillMetadata {
                id,
                label: Some(format!("HB {}", id.0)),
                fingerprint,
                documents: vec![DocumentRef { doc_id: id.0 * 10 }],
            }),
            BillScript::NoDocument => Ok(BillMetadata {
                id,
                label: Some(format!("HB {}", id.0)),
                fingerprint: Some(format!("nodoc-{}", id.0)),
                documents: vec![],
            }),
            BillScript::Error(cause) => Err(anyhow!("HTTP 502: {cause}")),
        }
    }

    async fn document_body(&self, doc_id: u64) -> Result<Vec<u8>> {
        match self.bills.lock().get(&RecordId(doc_id / 10)) {
            Some(BillScript::Document { text, .. }) => Ok(text.clone().into_bytes()),
            _ => Err(anyhow!("unknown document {doc_id}")),
        }
    }

    async fn master_list(&self) -> Result<Vec<MasterListEntry>> {
        self.master
            .lock()
            .clone()
            .ok_or_else(|| anyhow!("getMasterListRaw returned ERROR: Unknown session"))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub provider: Arc<ScriptedProvider>,
    pub backend: Arc<MockBackend>,
}

impl Harness {
    pub fn new(records: Vec<StoredRecord>, provider: ScriptedProvider) -> Self {
        Self {
            store: Arc::new(MemoryStore::with_records(profile_names(), records)),
            provider: Arc::new(provider),
            backend: Arc::new(MockBackend::new()),
        }
    }

    pub fn orchestrator(&self) -> Orchestrator {
        self.orchestrator_with(profiles())
    }

    pub fn orchestrator_with(&self, profiles: Vec<Profile>) -> Orchestrator {
        Orchestrator::new(
            self.store.clone(),
            RecordFetcher::new(self.provider.clone()),
            EnrichmentClient::new(self.backend.clone(), profiles),
        )
        .with_pacing(PacingConfig::immediate())
    }

    pub fn written_ids(&self) -> Vec<u64> {
        self.store.writes().iter().map(|(id, _)| id.0).collect()
    }
}
