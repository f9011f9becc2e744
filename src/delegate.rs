// src/delegate.rs
//! Delegated mode: a remote procedure does fetch, enrich and persist for one
//! backlog item per call; only the pacing and quota loop runs here.

use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use metrics::counter;
use once_cell::sync::OnceCell;
use reqwest::Client;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::config::SupabaseConfig;
use crate::error::BacklogError;
use crate::metrics::ensure_metrics_described;
use crate::orchestrator::{RunState, RunSummary};
use crate::pacing::{Pacer, PacingConfig};

/// Server-side work can take a while; never wait less than this.
const MIN_CALL_TIMEOUT: Duration = Duration::from_secs(90);

/// Raw reply of one procedure call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureReply {
    pub status: u16,
    pub body: String,
}

/// "Process the next backlog item" exposed by the backing store.
#[async_trait]
pub trait BacklogProcedure: Send + Sync {
    /// Transport failures are `Err`; any HTTP answer is a reply.
    async fn call(&self) -> Result<ProcedureReply, BacklogError>;
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResponse {
    Processed(String),
    /// The server reports nothing left to do.
    Complete(String),
    QuotaLimited(String),
    Failed { status: u16, detail: String },
}

#[derive(Debug, Default, Deserialize)]
struct ReplyBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Messages meaning the backlog is drained. "Sync complete! Successfully
/// fetched ..." is progress, not completion.
fn is_completion(message: &str) -> bool {
    static RE: OnceCell<regex::Regex> = OnceCell::new();
    RE.get_or_init(|| {
        regex::Regex::new(
            r"(?i)(all bills are up[- ]to[- ]date|no new or updated bills|nothing to do|backlog (is )?empty)",
        )
        .unwrap()
    })
    .is_match(message)
}

fn is_limit(message: &str) -> bool {
    static RE: OnceCell<regex::Regex> = OnceCell::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"(?i)\b(quota|rate|(rate[ _-]?)?limit(s|ed)?|too many requests|429)\b")
            .unwrap()
    })
    .is_match(message)
}

pub fn classify_response(status: u16, body: &str) -> StepResponse {
    let Ok(parsed) = serde_json::from_str::<ReplyBody>(body) else {
        return StepResponse::Failed {
            status,
            detail: format!("undecodable response: {}", body.trim()),
        };
    };
    let message = parsed.message.unwrap_or_default();
    if is_completion(&message) {
        return StepResponse::Complete(message);
    }
    if !(200..300).contains(&status) {
        let detail = parsed.error.unwrap_or(message);
        if status == 429 || is_limit(&detail) {
            return StepResponse::QuotaLimited(detail);
        }
        return StepResponse::Failed { status, detail };
    }
    StepResponse::Processed(message)
}

/// Supabase edge function realization (`POST /functions/v1/<name>`).
pub struct SupabaseFunction {
    http: Client,
    url: String,
    name: String,
    service_key: String,
}

impl SupabaseFunction {
    pub fn new(cfg: &SupabaseConfig, function: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("bill-backlog/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout.max(MIN_CALL_TIMEOUT))
            .build()
            .context("building supabase function client")?;
        Ok(Self {
            http,
            url: format!(
                "{}/functions/v1/{}",
                cfg.url.trim_end_matches('/'),
                function
            ),
            name: function.to_string(),
            service_key: cfg.service_key.clone(),
        })
    }
}

#[async_trait]
impl BacklogProcedure for SupabaseFunction {
    async fn call(&self) -> Result<ProcedureReply, BacklogError> {
        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(&self.service_key)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| BacklogError::DataAccess(format!("{} request: {e}", self.name)))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| BacklogError::DataAccess(format!("{} body: {e}", self.name)))?;
        Ok(ProcedureReply { status, body })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Call `procedure` until it reports completion, a fatal answer comes back,
/// `max_calls` is reached, or `shutdown` resolves.
pub async fn run_delegated<F>(
    procedure: &dyn BacklogProcedure,
    pacing: PacingConfig,
    max_calls: u32,
    shutdown: F,
) -> RunSummary
where
    F: Future<Output = ()>,
{
    ensure_metrics_described();
    tokio::pin!(shutdown);
    let mut pacer = Pacer::new(pacing);
    let mut summary = RunSummary::new(RunState::Finished);
    let mut drained = false;

    info!(procedure = procedure.name(), max_calls, "starting delegated backlog run");
    for n in 1..=max_calls {
        info!("[{n}] triggering {}", procedure.name());
        let reply = tokio::select! {
            biased;
            _ = &mut shutdown => {
                summary.state = RunState::Interrupted;
                break;
            }
            r = procedure.call() => r,
        };
        counter!("backlog_delegate_calls_total").increment(1);

        let reply = match reply {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "delegated call failed");
                summary.state = RunState::HaltedFatal(e);
                break;
            }
        };

        match classify_response(reply.status, &reply.body) {
            StepResponse::Complete(message) => {
                info!(%message, "backlog drained");
                drained = true;
                break;
            }
            StepResponse::QuotaLimited(detail) => {
                let res = tokio::select! {
                    biased;
                    _ = &mut shutdown => None,
                    r = pacer.quota_pause(procedure.name(), &detail) => Some(r),
                };
                summary.quota_pauses = pacer.total_pauses();
                match res {
                    None => {
                        summary.state = RunState::Interrupted;
                        break;
                    }
                    Some(Err(e)) => {
                        summary.state = RunState::HaltedFatal(e);
                        break;
                    }
                    Some(Ok(())) => continue,
                }
            }
            StepResponse::Failed { status, detail } => {
                error!(status, %detail, "delegated call returned an error");
                summary.state = RunState::HaltedFatal(BacklogError::DataAccess(format!(
                    "{} returned HTTP {status}: {detail}",
                    procedure.name()
                )));
                break;
            }
            StepResponse::Processed(message) => {
                pacer.reset_quota();
                summary.attempted += 1;
                summary.processed += 1;
                counter!("backlog_records_total", "outcome" => "done").increment(1);
                info!(%message, "server processed one item");
            }
        }

        if n < max_calls {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    summary.state = RunState::Interrupted;
                    break;
                }
                _ = pacer.between_records() => {}
            }
        }
    }

    if matches!(summary.state, RunState::Finished) {
        if drained && summary.processed == 0 {
            summary.state = RunState::NothingToDo;
        } else if !drained {
            warn!(max_calls, "call cap reached before the server reported completion");
        }
    }
    summary.total = summary.processed;
    info!("{summary}");
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_is_recognised_only_for_drained_messages() {
        assert_eq!(
            classify_response(200, r#"{"message":"Sync complete. All bills are up-to-date."}"#),
            StepResponse::Complete("Sync complete. All bills are up-to-date.".into())
        );
        assert!(matches!(
            classify_response(200, r#"{"message":"Sync complete. No new or updated bills found."}"#),
            StepResponse::Complete(_)
        ));
        assert!(matches!(
            classify_response(200, r#"{"message":"✅ Sync complete! Successfully fetched 3 bills."}"#),
            StepResponse::Processed(_)
        ));
    }

    #[test]
    fn limit_errors_are_quota_others_fail() {
        assert_eq!(
            classify_response(500, r#"{"error":"Gemini quota exceeded"}"#),
            StepResponse::QuotaLimited("Gemini quota exceeded".into())
        );
        assert!(matches!(
            classify_response(429, r#"{"error":"slow down"}"#),
            StepResponse::QuotaLimited(_)
        ));
        assert_eq!(
            classify_response(500, r#"{"error":"relation bills does not exist"}"#),
            StepResponse::Failed {
                status: 500,
                detail: "relation bills does not exist".into()
            }
        );
    }

    #[test]
    fn undecodable_body_is_a_failure() {
        assert!(matches!(
            classify_response(502, "<html>Bad Gateway</html>"),
            StepResponse::Failed { status: 502, .. }
        ));
    }
}
