// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod bootstrap;
pub mod change_detector;
pub mod config;
pub mod delegate;
pub mod enrich;
pub mod error;
pub mod fetcher;
pub mod metrics;
pub mod orchestrator;
pub mod pacing;
pub mod persist;
pub mod provider;
pub mod record;
pub mod selector;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::bootstrap::BacklogRuntime;
pub use crate::config::BacklogConfig;
pub use crate::error::{BackendError, BacklogError};
pub use crate::orchestrator::{Orchestrator, RecordOutcome, RunState, RunSummary};
pub use crate::record::{EnrichmentOutput, FailureCategory, RecordId};
