// src/enrich/mod.rs
//! Enrichment client: one summarization call per profile, outcome
//! classification, and the backends that realize the capability.

pub mod cli;
pub mod mock;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::config::Profile;
use crate::error::BackendError;
use crate::record::{EnrichmentOutput, FailureCategory};

/// The summarization capability, whatever realizes it.
#[async_trait]
pub trait SummaryBackend: Send + Sync {
    async fn summarize(&self, prompt: &str, document: &str) -> Result<String, BackendError>;
    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type DynBackend = Arc<dyn SummaryBackend>;

/// Result of one profile call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Summary(String),
    Failure {
        category: FailureCategory,
        detail: String,
    },
}

impl Outcome {
    pub fn category(&self) -> Option<FailureCategory> {
        match self {
            Self::Summary(_) => None,
            Self::Failure { category, .. } => Some(*category),
        }
    }

    pub fn into_output(self) -> EnrichmentOutput {
        match self {
            Self::Summary(text) => EnrichmentOutput::Summary(text),
            Self::Failure { category, detail } => EnrichmentOutput::failed(category, detail),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileOutcome {
    pub profile: String,
    pub outcome: Outcome,
}

/// Outcomes for one record, in declared profile order. Stops early on a
/// run-level condition, so it may hold fewer entries than there are profiles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentReport {
    pub outcomes: Vec<ProfileOutcome>,
}

impl EnrichmentReport {
    /// First profile that failed with `category`, with its detail.
    pub fn first(&self, category: FailureCategory) -> Option<(&str, &str)> {
        self.outcomes.iter().find_map(|po| match &po.outcome {
            Outcome::Failure { category: c, detail } if *c == category => {
                Some((po.profile.as_str(), detail.as_str()))
            }
            _ => None,
        })
    }

    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|po| po.outcome.category().is_some())
            .count()
    }

    pub fn into_outputs(self) -> Vec<(String, EnrichmentOutput)> {
        self.outcomes
            .into_iter()
            .map(|po| (po.profile, po.outcome.into_output()))
            .collect()
    }
}

/// Provider messages that mean "slow down", whatever the transport said.
pub fn looks_like_quota(msg: &str) -> bool {
    static RE: OnceCell<regex::Regex> = OnceCell::new();
    RE.get_or_init(|| {
        regex::Regex::new(
            r"(?i)\b(quota|rate[ _-]?limit(ed)?|too many requests|resource[ _]exhausted|429|usage limit)\b",
        )
        .unwrap()
    })
    .is_match(msg)
}

/// Map a backend failure onto the outcome taxonomy.
pub fn classify(err: BackendError) -> Outcome {
    let (category, detail) = match err {
        BackendError::Unavailable(d) => (FailureCategory::ToolUnavailable, d),
        BackendError::Quota(d) => (FailureCategory::QuotaExceeded, d),
        BackendError::Remote(d) if looks_like_quota(&d) => (FailureCategory::QuotaExceeded, d),
        BackendError::Remote(d) => (FailureCategory::RemoteError, d),
    };
    Outcome::Failure { category, detail }
}

pub struct EnrichmentClient {
    backend: DynBackend,
    profiles: Vec<Profile>,
}

impl EnrichmentClient {
    pub fn new(backend: DynBackend, profiles: Vec<Profile>) -> Self {
        Self { backend, profiles }
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Summarize `source_text` under every profile, independently.
    ///
    /// A `RemoteError` on one profile does not stop the others. Tool
    /// unavailability and quota exhaustion end the pass right away: the
    /// former halts the run, the latter retries the whole record later, so
    /// further calls would be wasted.
    pub async fn enrich(&self, source_text: &str) -> EnrichmentReport {
        let mut report = EnrichmentReport::default();
        for profile in &self.profiles {
            let outcome = match self.backend.summarize(&profile.prompt, source_text).await {
                Ok(text) if text.trim().is_empty() => Outcome::Failure {
                    category: FailureCategory::RemoteError,
                    detail: "empty response".to_string(),
                },
                Ok(text) => Outcome::Summary(text.trim().to_string()),
                Err(e) => classify(e),
            };

            let stop = match &outcome {
                Outcome::Summary(_) => {
                    debug!(profile = %profile.name, backend = self.backend.name(), "summary ok");
                    false
                }
                Outcome::Failure { category, detail } => {
                    warn!(
                        profile = %profile.name,
                        backend = self.backend.name(),
                        %category,
                        "summary failed: {detail}"
                    );
                    counter!("backlog_profile_failures_total", "category" => category.as_str())
                        .increment(1);
                    matches!(
                        category,
                        FailureCategory::ToolUnavailable | FailureCategory::QuotaExceeded
                    )
                }
            };

            report.outcomes.push(ProfileOutcome {
                profile: profile.name.clone(),
                outcome,
            });
            if stop {
                break;
            }
        }
        report
    }
}
