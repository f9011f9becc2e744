// src/provider/mod.rs
pub mod legiscan;

use anyhow::Result;

use crate::record::RecordId;

/// Record metadata as reported by the legislative-data provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillMetadata {
    pub id: RecordId,
    /// Human-readable label, e.g. "HB 1234".
    pub label: Option<String>,
    /// Provider content hash; `None` when the payload omits it.
    pub fingerprint: Option<String>,
    /// Document pointers, oldest first.
    pub documents: Vec<DocumentRef>,
}

impl BillMetadata {
    /// Latest document pointer, if any usable one exists.
    pub fn latest_document(&self) -> Option<&DocumentRef> {
        self.documents.last().filter(|d| d.doc_id != 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentRef {
    pub doc_id: u64,
}

/// One row of a session master list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterListEntry {
    pub id: RecordId,
    pub fingerprint: String,
}

#[async_trait::async_trait]
pub trait BillProvider: Send + Sync {
    /// Resolve metadata and document pointers for one record.
    async fn bill_metadata(&self, id: RecordId) -> Result<BillMetadata>;
    /// Raw (decoded from transport encoding) document body bytes.
    async fn document_body(&self, doc_id: u64) -> Result<Vec<u8>>;
    /// Current fingerprints of every bill in the configured session.
    async fn master_list(&self) -> Result<Vec<MasterListEntry>>;
    fn name(&self) -> &'static str;
}
