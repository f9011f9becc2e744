// src/persist.rs
//! Persistence gateway: one atomic whole-record write per processing attempt.

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::config::profiles::column_for;
use crate::error::BacklogError;
use crate::record::{EnrichmentOutput, RecordId};
use crate::store::RecordStore;

/// Everything written back for one record. The fingerprint travels with the
/// outputs so a reader never sees new summaries under an old fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordUpdate {
    pub fingerprint: String,
    pub source_text: String,
    /// Profile name -> output, in declared profile order.
    pub outputs: Vec<(String, EnrichmentOutput)>,
}

impl RecordUpdate {
    pub fn summaries(&self) -> usize {
        self.outputs.iter().filter(|(_, o)| o.is_summary()).count()
    }

    pub fn failures(&self) -> usize {
        self.outputs.iter().filter(|(_, o)| o.is_failure()).count()
    }

    /// Row patch in the store's column layout.
    pub fn to_row(&self) -> Map<String, Value> {
        let mut row = Map::new();
        row.insert("change_hash".into(), Value::String(self.fingerprint.clone()));
        row.insert("original_text".into(), Value::String(self.source_text.clone()));
        for (profile, output) in &self.outputs {
            let v = output.to_column().map(Value::String).unwrap_or(Value::Null);
            row.insert(column_for(profile), v);
        }
        row
    }
}

/// Write `update` for record `id`. Nothing is partially applied: either the
/// store accepted the whole row or the record keeps its previous state.
pub async fn save(
    store: &dyn RecordStore,
    id: RecordId,
    update: &RecordUpdate,
) -> Result<(), BacklogError> {
    if update.outputs.is_empty() {
        warn!(record_id = %id, store = store.name(), "record has no enrichment outputs, not saving");
        return Err(BacklogError::DataAccess(format!(
            "refusing to write record {id} without enrichment outputs"
        )));
    }
    match store.update_record(id, update).await {
        Ok(()) => {
            info!(
                record_id = %id,
                store = store.name(),
                summaries = update.summaries(),
                failures = update.failures(),
                "record saved"
            );
            Ok(())
        }
        Err(e) => {
            warn!(record_id = %id, store = store.name(), error = %e, "record save failed");
            Err(e)
        }
    }
}
