// src/fetcher.rs
//! Record fetcher: metadata lookup, then document body, decoded to text.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::BacklogError;
use crate::provider::BillProvider;
use crate::record::RecordId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    pub source_text: String,
    /// Fingerprint observed at fetch time; this is what gets persisted.
    pub fingerprint: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Document(FetchedDocument),
    /// The provider has no document for this record yet. Not an error.
    NoDocument { label: String },
}

pub struct RecordFetcher {
    provider: Arc<dyn BillProvider>,
}

impl RecordFetcher {
    pub fn new(provider: Arc<dyn BillProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<dyn BillProvider> {
        &self.provider
    }

    pub async fn fetch(&self, id: RecordId) -> Result<FetchOutcome, BacklogError> {
        let meta = self
            .provider
            .bill_metadata(id)
            .await
            .map_err(|e| BacklogError::fetch(id, format!("{e:#}")))?;
        let label = meta.label.clone().unwrap_or_else(|| id.to_string());

        let Some(doc) = meta.latest_document() else {
            return Ok(FetchOutcome::NoDocument { label });
        };
        debug!(record_id = %id, doc_id = doc.doc_id, "fetching document body");

        let bytes = self
            .provider
            .document_body(doc.doc_id)
            .await
            .map_err(|e| BacklogError::fetch(id, format!("{e:#}")))?;
        let source_text = decode_document(&bytes);
        let fingerprint = meta
            .fingerprint
            .unwrap_or_else(|| content_fingerprint(&source_text));

        Ok(FetchOutcome::Document(FetchedDocument {
            source_text,
            fingerprint,
            label,
        }))
    }
}

/// UTF-8 with best-effort recovery: invalid sequences are dropped rather
/// than failing the record.
pub fn decode_document(bytes: &[u8]) -> String {
    bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()
}

/// Fallback fingerprint when the provider omits its hash.
pub fn content_fingerprint(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
