// src/orchestrator.rs
//! Backlog orchestrator: select once, then drive each record through
//! fetch -> enrich -> persist, strictly one at a time.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use tracing::{error, info, warn};

use crate::change_detector::is_stale;
use crate::enrich::EnrichmentClient;
use crate::error::BacklogError;
use crate::fetcher::{FetchOutcome, RecordFetcher};
use crate::metrics::ensure_metrics_described;
use crate::pacing::{Pacer, PacingConfig};
use crate::persist::{self, RecordUpdate};
use crate::record::{FailureCategory, SelectionReason, WorkItem};
use crate::selector::{SelectionStrategy, WorkSelector};
use crate::store::RecordStore;

/// Terminal state of one record within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Done { summaries: usize, failures: usize },
    SkippedNoDoc,
    /// Selected as stale, but the fetched fingerprint matched the stored one.
    SkippedCurrent,
    /// Fetch failed; nothing was written.
    FetchFailed,
    /// The write was rejected; the stored state is unchanged.
    PersistFailed,
}

impl RecordOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Done { .. } => "done",
            Self::SkippedNoDoc => "skipped_no_doc",
            Self::SkippedCurrent => "skipped_current",
            Self::FetchFailed => "fetch_failed",
            Self::PersistFailed => "persist_failed",
        }
    }
}

#[derive(Debug)]
pub enum RunState {
    Finished,
    NothingToDo,
    HaltedFatal(BacklogError),
    Interrupted,
}

impl RunState {
    /// Whether the process should exit successfully.
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::HaltedFatal(_))
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finished => f.write_str("finished"),
            Self::NothingToDo => f.write_str("nothing to do"),
            Self::HaltedFatal(e) => write!(f, "halted: {e}"),
            Self::Interrupted => f.write_str("interrupted"),
        }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub state: RunState,
    /// Worklist size.
    pub total: usize,
    /// Records that reached a terminal state.
    pub attempted: usize,
    pub processed: usize,
    pub skipped_no_doc: usize,
    pub skipped_current: usize,
    pub fetch_failed: usize,
    pub persist_failed: usize,
    /// Failure sentinels written across all records.
    pub profile_failures: usize,
    pub quota_pauses: u32,
}

impl RunSummary {
    pub fn new(state: RunState) -> Self {
        Self {
            state,
            total: 0,
            attempted: 0,
            processed: 0,
            skipped_no_doc: 0,
            skipped_current: 0,
            fetch_failed: 0,
            persist_failed: 0,
            profile_failures: 0,
            quota_pauses: 0,
        }
    }

    pub fn skipped(&self) -> usize {
        self.skipped_no_doc + self.skipped_current
    }

    fn tally(&mut self, outcome: RecordOutcome) {
        self.attempted += 1;
        match outcome {
            RecordOutcome::Done { failures, .. } => {
                self.processed += 1;
                self.profile_failures += failures;
            }
            RecordOutcome::SkippedNoDoc => self.skipped_no_doc += 1,
            RecordOutcome::SkippedCurrent => self.skipped_current += 1,
            RecordOutcome::FetchFailed => self.fetch_failed += 1,
            RecordOutcome::PersistFailed => self.persist_failed += 1,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run {}: {}/{} attempted, {} processed, {} skipped ({} no document, {} current), \
             {} fetch failed, {} persist failed, {} profile failures, {} quota pauses",
            self.state,
            self.attempted,
            self.total,
            self.processed,
            self.skipped(),
            self.skipped_no_doc,
            self.skipped_current,
            self.fetch_failed,
            self.persist_failed,
            self.profile_failures,
            self.quota_pauses,
        )
    }
}

pub struct Orchestrator {
    store: Arc<dyn RecordStore>,
    fetcher: RecordFetcher,
    enricher: EnrichmentClient,
    selector: WorkSelector,
    pacing: PacingConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        fetcher: RecordFetcher,
        enricher: EnrichmentClient,
    ) -> Self {
        let profiles = enricher.profiles().iter().map(|p| p.name.clone()).collect();
        Self {
            store,
            fetcher,
            enricher,
            selector: WorkSelector::new(SelectionStrategy::default(), profiles),
            pacing: PacingConfig::default(),
        }
    }

    pub fn with_selection(mut self, strategy: SelectionStrategy) -> Self {
        let profiles = self
            .enricher
            .profiles()
            .iter()
            .map(|p| p.name.clone())
            .collect();
        self.selector = WorkSelector::new(strategy, profiles);
        self
    }

    pub fn with_pacing(mut self, pacing: PacingConfig) -> Self {
        self.pacing = pacing;
        self
    }

    pub async fn run(&self) -> RunSummary {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Process the worklist until it is exhausted, a fatal condition is hit,
    /// or `shutdown` resolves. Shutdown drops the in-flight record at its
    /// current await point; nothing of it has been written unless the write
    /// itself already completed.
    pub async fn run_until<F>(&self, shutdown: F) -> RunSummary
    where
        F: Future<Output = ()>,
    {
        ensure_metrics_described();
        tokio::pin!(shutdown);

        let worklist = tokio::select! {
            biased;
            _ = &mut shutdown => return RunSummary::new(RunState::Interrupted),
            res = self.selector.select_worklist(self.store.as_ref(), self.fetcher.provider().as_ref()) => res,
        };
        let worklist = match worklist {
            Ok(w) if w.is_empty() => {
                info!("no records need enrichment");
                return RunSummary::new(RunState::NothingToDo);
            }
            Ok(w) => w,
            Err(e) => {
                error!(error = %e, "work selection failed");
                return RunSummary::new(RunState::HaltedFatal(e));
            }
        };

        let mut summary = RunSummary::new(RunState::Finished);
        summary.total = worklist.len();
        let mut pacer = Pacer::new(self.pacing);
        info!(
            total = summary.total,
            backend = self.enricher.backend_name(),
            store = self.store.name(),
            "starting backlog run"
        );

        for (idx, item) in worklist.iter().enumerate() {
            if idx > 0 {
                tokio::select! {
                    biased;
                    _ = &mut shutdown => {
                        summary.state = RunState::Interrupted;
                        break;
                    }
                    _ = pacer.between_records() => {}
                }
            }

            info!(record_id = %item.id, "[{}/{}] record {}", idx + 1, summary.total, item.id);
            let t0 = Instant::now();
            let res = tokio::select! {
                biased;
                _ = &mut shutdown => None,
                res = self.process_record(item, &mut pacer) => Some(res),
            };
            summary.quota_pauses = pacer.total_pauses();

            match res {
                None => {
                    warn!(record_id = %item.id, "interrupted, record left as it was");
                    summary.state = RunState::Interrupted;
                    break;
                }
                Some(Ok(outcome)) => {
                    pacer.reset_quota();
                    histogram!("backlog_record_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
                    counter!("backlog_records_total", "outcome" => outcome.as_str()).increment(1);
                    summary.tally(outcome);
                }
                Some(Err(e)) => {
                    error!(record_id = %item.id, error = %e, "run halted");
                    summary.state = RunState::HaltedFatal(e);
                    break;
                }
            }
        }

        gauge!("backlog_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
        info!("{summary}");
        summary
    }

    /// One record to its terminal state. `Err` is reserved for run-level
    /// conditions; everything record-scoped is an `Ok` outcome.
    async fn process_record(
        &self,
        item: &WorkItem,
        pacer: &mut Pacer,
    ) -> Result<RecordOutcome, BacklogError> {
        let id = item.id;
        loop {
            let doc = match self.fetcher.fetch(id).await {
                Ok(FetchOutcome::Document(doc)) => doc,
                Ok(FetchOutcome::NoDocument { label }) => {
                    info!(record_id = %id, %label, "no document available, skipping");
                    return Ok(RecordOutcome::SkippedNoDoc);
                }
                Err(e) => {
                    warn!(record_id = %id, error = %e, "fetch failed, leaving record for next run");
                    return Ok(RecordOutcome::FetchFailed);
                }
            };

            if item.reason == SelectionReason::Stale
                && !is_stale(item.stored_fingerprint.as_deref(), &doc.fingerprint)
            {
                info!(record_id = %id, label = %doc.label, "fingerprint unchanged, skipping");
                return Ok(RecordOutcome::SkippedCurrent);
            }

            let report = self.enricher.enrich(&doc.source_text).await;

            if let Some((profile, detail)) = report.first(FailureCategory::ToolUnavailable) {
                return Err(BacklogError::ToolUnavailable(format!("{profile}: {detail}")));
            }
            if let Some((profile, detail)) = report.first(FailureCategory::QuotaExceeded) {
                let what = format!("record {id} ({profile})");
                pacer.quota_pause(&what, detail).await?;
                continue;
            }

            let update = RecordUpdate {
                fingerprint: doc.fingerprint,
                source_text: doc.source_text,
                outputs: report.into_outputs(),
            };
            return match persist::save(self.store.as_ref(), id, &update).await {
                Ok(()) => {
                    info!(
                        record_id = %id,
                        label = %doc.label,
                        summaries = update.summaries(),
                        failures = update.failures(),
                        "record done"
                    );
                    Ok(RecordOutcome::Done {
                        summaries: update.summaries(),
                        failures: update.failures(),
                    })
                }
                // persist::save logs every rejection
                Err(_) => Ok(RecordOutcome::PersistFailed),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_counts_each_terminal_state() {
        let mut s = RunSummary::new(RunState::Finished);
        s.total = 5;
        s.tally(RecordOutcome::Done { summaries: 2, failures: 1 });
        s.tally(RecordOutcome::SkippedNoDoc);
        s.tally(RecordOutcome::SkippedCurrent);
        s.tally(RecordOutcome::FetchFailed);
        s.tally(RecordOutcome::PersistFailed);
        assert_eq!(s.attempted, 5);
        assert_eq!(s.processed, 1);
        assert_eq!(s.skipped(), 2);
        assert_eq!(s.profile_failures, 1);
        assert_eq!(s.fetch_failed, 1);
        assert_eq!(s.persist_failed, 1);
    }

    #[test]
    fn only_fatal_halts_are_unsuccessful() {
        assert!(RunState::Finished.is_success());
        assert!(RunState::NothingToDo.is_success());
        assert!(RunState::Interrupted.is_success());
        assert!(!RunState::HaltedFatal(BacklogError::ToolUnavailable("x".into())).is_success());
    }

    #[test]
    fn summary_line_is_readable() {
        let mut s = RunSummary::new(RunState::Finished);
        s.total = 2;
        s.tally(RecordOutcome::SkippedNoDoc);
        s.tally(RecordOutcome::Done { summaries: 3, failures: 0 });
        let line = s.to_string();
        assert!(line.starts_with("run finished: 2/2 attempted, 1 processed, 1 skipped"));
    }
}
