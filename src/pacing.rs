// src/pacing.rs
//! Politeness delay between records and bounded quota backoff.
//!
//! Both are full sleeps: nothing else runs while the loop waits, and the
//! caller may be cancelled at either point without leaving partial state.

use std::time::Duration;

use chrono::Local;
use metrics::counter;
use tracing::{info, warn};

use crate::error::BacklogError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingConfig {
    /// Sleep between two records, whatever the first one's outcome.
    pub politeness_delay: Duration,
    /// Sleep after a quota signal before retrying the same record.
    pub quota_backoff: Duration,
    /// Consecutive quota pauses tolerated before the run halts.
    pub max_quota_retries: u32,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            politeness_delay: Duration::from_secs(2),
            quota_backoff: Duration::from_secs(3600),
            max_quota_retries: 3,
        }
    }
}

impl PacingConfig {
    /// No sleeping at all; handy for tests and dry runs.
    pub fn immediate() -> Self {
        Self {
            politeness_delay: Duration::ZERO,
            quota_backoff: Duration::ZERO,
            max_quota_retries: 3,
        }
    }
}

/// Per-run pacing state.
#[derive(Debug)]
pub struct Pacer {
    cfg: PacingConfig,
    consecutive_quota: u32,
    total_pauses: u32,
}

impl Pacer {
    pub fn new(cfg: PacingConfig) -> Self {
        Self {
            cfg,
            consecutive_quota: 0,
            total_pauses: 0,
        }
    }

    pub fn config(&self) -> &PacingConfig {
        &self.cfg
    }

    pub fn total_pauses(&self) -> u32 {
        self.total_pauses
    }

    pub async fn between_records(&self) {
        if !self.cfg.politeness_delay.is_zero() {
            tokio::time::sleep(self.cfg.politeness_delay).await;
        }
    }

    /// Sleep for the configured backoff, or fail once the consecutive retry
    /// budget is spent.
    pub async fn quota_pause(&mut self, what: &str, detail: &str) -> Result<(), BacklogError> {
        if self.consecutive_quota >= self.cfg.max_quota_retries {
            warn!(
                target: "pacing",
                retries = self.consecutive_quota,
                %what,
                "quota still exhausted, giving up"
            );
            return Err(BacklogError::QuotaExhausted {
                retries: self.consecutive_quota,
            });
        }
        self.consecutive_quota += 1;
        self.total_pauses += 1;
        counter!("backlog_quota_pauses_total").increment(1);

        let backoff = self.cfg.quota_backoff;
        let resume_at = chrono::Duration::from_std(backoff)
            .ok()
            .map(|d| (Local::now() + d).format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "?".to_string());
        warn!(
            target: "pacing",
            %what,
            attempt = self.consecutive_quota,
            max = self.cfg.max_quota_retries,
            backoff_secs = backoff.as_secs(),
            %resume_at,
            "quota limit reached: {detail}"
        );
        if !backoff.is_zero() {
            tokio::time::sleep(backoff).await;
        }
        info!(target: "pacing", %what, "resuming after quota pause");
        Ok(())
    }

    /// A record reached its terminal state; the retry budget starts over.
    pub fn reset_quota(&mut self) {
        self.consecutive_quota = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn quota_retries_are_bounded() {
        let mut p = Pacer::new(PacingConfig {
            max_quota_retries: 2,
            ..PacingConfig::immediate()
        });
        assert!(p.quota_pause("record 1", "429").await.is_ok());
        assert!(p.quota_pause("record 1", "429").await.is_ok());
        let err = p.quota_pause("record 1", "429").await.unwrap_err();
        assert!(matches!(err, BacklogError::QuotaExhausted { retries: 2 }));
        assert_eq!(p.total_pauses(), 2);
    }

    #[tokio::test]
    async fn reset_restores_the_budget() {
        let mut p = Pacer::new(PacingConfig {
            max_quota_retries: 1,
            ..PacingConfig::immediate()
        });
        p.quota_pause("a", "limit").await.unwrap();
        p.reset_quota();
        p.quota_pause("b", "limit").await.unwrap();
        assert_eq!(p.total_pauses(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_sleeps_for_the_configured_interval() {
        let mut p = Pacer::new(PacingConfig {
            politeness_delay: Duration::from_secs(2),
            quota_backoff: Duration::from_secs(3600),
            max_quota_retries: 1,
        });
        let t0 = tokio::time::Instant::now();
        p.quota_pause("record 9", "rate limited").await.unwrap();
        assert!(t0.elapsed() >= Duration::from_secs(3600));

        let t1 = tokio::time::Instant::now();
        p.between_records().await;
        assert!(t1.elapsed() >= Duration::from_secs(2));
    }
}
