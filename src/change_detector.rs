// src/change_detector.rs
//! Pure change detection: fingerprint comparison and record status derivation.
//! No I/O, so the selector, the stores and the orchestrator share one policy.

use crate::record::{RecordStatus, StoredRecord};

/// True when the provider's fingerprint differs from the stored one.
///
/// A record that was never processed (`stored == None`) is stale against any
/// observed fingerprint.
pub fn is_stale(stored: Option<&str>, observed: &str) -> bool {
    stored != Some(observed)
}

/// Derive the lifecycle status of `record` for the given profile set.
///
/// Precedence: any failure sentinel → `Failed`; any unset profile →
/// `Pending`; fingerprint mismatch against `upstream` (when known) →
/// `Stale`; otherwise `Complete`.
pub fn derive_status(
    record: &StoredRecord,
    profiles: &[String],
    upstream: Option<&str>,
) -> RecordStatus {
    let outputs: Vec<_> = profiles.iter().map(|p| record.output(p)).collect();

    if outputs.iter().any(|o| o.is_failure()) {
        return RecordStatus::Failed;
    }
    if outputs.iter().any(|o| !o.is_summary()) {
        return RecordStatus::Pending;
    }
    match upstream {
        Some(fp) if is_stale(record.fingerprint.as_deref(), fp) => RecordStatus::Stale,
        _ => RecordStatus::Complete,
    }
}

/// Eligible for (re)processing iff pending, stale or failed.
pub fn is_eligible(status: RecordStatus) -> bool {
    !matches!(status, RecordStatus::Complete)
}
