// src/record.rs
//! Bill record data model: ids, worklist stubs, enrichment outputs and the
//! failure sentinel that makes failed records selectable again.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

/// Reserved prefix written in place of a summary when an attempt failed.
pub const FAILURE_PREFIX: &str = "AI_SUMMARY_FAILED:";

/// Stable provider-assigned bill identifier.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RecordId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Category encoded into a failure sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureCategory {
    ToolUnavailable,
    RemoteError,
    QuotaExceeded,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToolUnavailable => "ToolUnavailable",
            Self::RemoteError => "RemoteError",
            Self::QuotaExceeded => "QuotaExceeded",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "ToolUnavailable" => Some(Self::ToolUnavailable),
            "RemoteError" => Some(Self::RemoteError),
            "QuotaExceeded" => Some(Self::QuotaExceeded),
            _ => None,
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One profile's stored output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentOutput {
    /// Column is NULL, empty or still holds an ingestion placeholder.
    Unset,
    Summary(String),
    Failed {
        category: FailureCategory,
        detail: String,
    },
}

impl EnrichmentOutput {
    pub fn failed(category: FailureCategory, detail: impl Into<String>) -> Self {
        Self::Failed {
            category,
            detail: detail.into(),
        }
    }

    /// Decode a raw store column value.
    pub fn from_column(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::Unset;
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() || is_placeholder(trimmed) {
            return Self::Unset;
        }
        match trimmed.strip_prefix(FAILURE_PREFIX) {
            Some(rest) => parse_sentinel_body(rest),
            None => Self::Summary(raw.to_string()),
        }
    }

    /// Encode for the store. `Unset` becomes NULL.
    pub fn to_column(&self) -> Option<String> {
        match self {
            Self::Unset => None,
            Self::Summary(text) => Some(text.clone()),
            Self::Failed { category, detail } => {
                Some(format!("{FAILURE_PREFIX} {category} - {detail}"))
            }
        }
    }

    pub fn is_summary(&self) -> bool {
        matches!(self, Self::Summary(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

fn parse_sentinel_body(rest: &str) -> EnrichmentOutput {
    let rest = rest.trim();
    if let Some((head, detail)) = rest.split_once(" - ") {
        if let Some(category) = FailureCategory::parse(head) {
            return EnrichmentOutput::failed(category, detail.trim());
        }
    }
    if let Some(category) = FailureCategory::parse(rest) {
        return EnrichmentOutput::failed(category, "");
    }
    // Older markers carried free text only ("Gemini CLI Error - ...").
    EnrichmentOutput::failed(FailureCategory::RemoteError, rest)
}

/// Ingestion writes "Placeholder for <bill>" before any summary exists.
pub fn is_placeholder(s: &str) -> bool {
    static RE: OnceCell<regex::Regex> = OnceCell::new();
    RE.get_or_init(|| regex::Regex::new(r"(?i)^placeholder for\s").unwrap())
        .is_match(s.trim_start())
}

/// Derived lifecycle status of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    Stale,
    Failed,
    Complete,
}

/// Why a record landed on the worklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    Pending,
    Failed,
    Stale,
    /// The store query does not say (e.g. an RPC returning bare ids).
    Unknown,
}

impl From<RecordStatus> for SelectionReason {
    fn from(s: RecordStatus) -> Self {
        match s {
            RecordStatus::Pending => Self::Pending,
            RecordStatus::Failed => Self::Failed,
            RecordStatus::Stale => Self::Stale,
            RecordStatus::Complete => Self::Unknown,
        }
    }
}

/// Worklist stub: just enough to drive one record through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: RecordId,
    /// Fingerprint the store held at selection time.
    #[serde(default)]
    pub stored_fingerprint: Option<String>,
    #[serde(default = "unknown_reason")]
    pub reason: SelectionReason,
}

fn unknown_reason() -> SelectionReason {
    SelectionReason::Unknown
}

impl WorkItem {
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            stored_fingerprint: None,
            reason: SelectionReason::Unknown,
        }
    }

    pub fn with_fingerprint(mut self, fp: impl Into<String>) -> Self {
        self.stored_fingerprint = Some(fp.into());
        self
    }

    pub fn with_reason(mut self, reason: SelectionReason) -> Self {
        self.reason = reason;
        self
    }
}

/// Whole-record view as held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoredRecord {
    pub id: RecordId,
    pub label: Option<String>,
    /// Fingerprint observed when the record was last processed.
    pub fingerprint: Option<String>,
    pub source_text: Option<String>,
    /// Profile name -> output. Profiles missing from the map count as unset.
    pub outputs: BTreeMap<String, EnrichmentOutput>,
}

impl StoredRecord {
    /// Fresh record as ingestion creates it: no outputs, no fingerprint.
    pub fn pending(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn output(&self, profile: &str) -> &EnrichmentOutput {
        static UNSET: EnrichmentOutput = EnrichmentOutput::Unset;
        self.outputs.get(profile).unwrap_or(&UNSET)
    }
}
