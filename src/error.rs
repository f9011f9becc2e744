// src/error.rs
//! Error taxonomy shared by every stage of the backlog pipeline.

use crate::record::RecordId;

/// Errors surfaced by the pipeline stages.
///
/// Fatality depends on where the error is raised: a `DataAccess` from the
/// work selector ends the run, the same variant from a single persistence
/// write is logged and the loop moves on.
#[derive(Debug, thiserror::Error)]
pub enum BacklogError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("data access error: {0}")]
    DataAccess(String),

    #[error("fetch failed for record {id}: {cause}")]
    Fetch { id: RecordId, cause: String },

    #[error("summarization tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("quota still exhausted after {retries} backoff pauses")]
    QuotaExhausted { retries: u32 },
}

impl BacklogError {
    pub fn data_access(cause: impl std::fmt::Display) -> Self {
        Self::DataAccess(cause.to_string())
    }

    pub fn fetch(id: RecordId, cause: impl std::fmt::Display) -> Self {
        Self::Fetch {
            id,
            cause: cause.to_string(),
        }
    }

    /// Errors that end the whole run rather than a single record.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::ToolUnavailable(_) | Self::QuotaExhausted { .. }
        )
    }
}

/// Raw failure reported by a summarization backend, before classification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The capability itself cannot be invoked (missing binary, missing key).
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Rate or volume limit signalled by the service.
    #[error("quota: {0}")]
    Quota(String),

    /// The service answered this particular call with an error.
    #[error("remote: {0}")]
    Remote(String),
}
