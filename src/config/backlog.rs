// src/config/backlog.rs
//! Process configuration, read from the environment (after `.env`).
use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::config::profiles::{load_profiles, Profile, ENV_PROFILES_PATH};
use crate::error::BacklogError;
use crate::pacing::PacingConfig;
use crate::selector::SelectionStrategy;

/// Where fetch + enrich + persist run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Fetch, summarize and persist from this process.
    Local,
    /// Call the store's "process next backlog item" function in a loop.
    Delegated,
}

/// Summarization backend selected at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    /// Local command-line tool, invoked as `<bin> -p <prompt+text>`.
    Cli { bin: String },
    /// Hosted chat-completions endpoint.
    OpenAi { api_key: String, model: String },
    /// Deterministic canned summaries.
    Mock,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegiscanConfig {
    pub api_key: String,
    pub access_key: String,
    pub session_id: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct BacklogConfig {
    pub mode: RunMode,
    pub supabase: SupabaseConfig,
    /// Required in local mode only.
    pub legiscan: Option<LegiscanConfig>,
    pub backend: BackendKind,
    pub selection: SelectionStrategy,
    pub pacing: PacingConfig,
    pub request_timeout: Duration,
    pub delegate_function: String,
    pub delegate_max_calls: u32,
    pub profiles: Vec<Profile>,
}

impl BacklogConfig {
    pub fn from_env() -> Result<Self, BacklogError> {
        Self::from_lookup(|k| env::var(k).ok())
    }

    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, BacklogError> {
        Self::from_lookup(|k| vars.get(k).cloned())
    }

    /// Build from any key lookup. Every missing required key is reported at
    /// once so the operator can fix the `.env` in one go.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BacklogError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut missing: Vec<&str> = Vec::new();
        let mut require = |k: &'static str| -> String {
            get(k).unwrap_or_else(|| {
                missing.push(k);
                String::new()
            })
        };

        let mode = match get("BACKLOG_MODE").as_deref().map(str::to_ascii_lowercase) {
            None => RunMode::Local,
            Some(m) if m == "local" => RunMode::Local,
            Some(m) if m == "delegated" => RunMode::Delegated,
            Some(other) => {
                return Err(BacklogError::Configuration(format!(
                    "unsupported BACKLOG_MODE: {other}"
                )))
            }
        };

        let supabase = SupabaseConfig {
            url: require("SUPABASE_URL").trim_end_matches('/').to_string(),
            service_key: require("SUPABASE_SERVICE_ROLE_KEY"),
        };

        let legiscan = match mode {
            RunMode::Local => Some(LegiscanConfig {
                api_key: require("LEGISCAN_API_KEY"),
                access_key: require("LEGISCAN_ACCESS_KEY"),
                session_id: get("LEGISCAN_SESSION_ID").and_then(|v| v.parse().ok()),
            }),
            RunMode::Delegated => None,
        };

        let backend = match get("BACKLOG_BACKEND").as_deref().map(str::to_ascii_lowercase) {
            None => BackendKind::Cli {
                bin: get("SUMMARY_CLI_BIN").unwrap_or_else(|| "gemini".to_string()),
            },
            Some(b) if b == "cli" => BackendKind::Cli {
                bin: get("SUMMARY_CLI_BIN").unwrap_or_else(|| "gemini".to_string()),
            },
            Some(b) if b == "openai" => BackendKind::OpenAi {
                api_key: require("OPENAI_API_KEY"),
                model: get("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            },
            Some(b) if b == "mock" => BackendKind::Mock,
            Some(other) => {
                return Err(BacklogError::Configuration(format!(
                    "unsupported BACKLOG_BACKEND: {other}"
                )))
            }
        };

        if !missing.is_empty() {
            return Err(BacklogError::Configuration(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let selection = match get("BACKLOG_SELECTION").as_deref().map(str::to_ascii_lowercase) {
            None => SelectionStrategy::default(),
            Some(s) if s == "rpc" => SelectionStrategy::default(),
            Some(s) if s == "filter" => SelectionStrategy::Filter,
            Some(s) if s == "masterlist" => {
                let has_session = legiscan.as_ref().is_some_and(|l| l.session_id.is_some());
                if !has_session {
                    return Err(BacklogError::Configuration(
                        "BACKLOG_SELECTION=masterlist requires LEGISCAN_SESSION_ID".into(),
                    ));
                }
                SelectionStrategy::MasterList
            }
            Some(other) => {
                return Err(BacklogError::Configuration(format!(
                    "unsupported BACKLOG_SELECTION: {other}"
                )))
            }
        };

        let defaults = PacingConfig::default();
        let pacing = PacingConfig {
            politeness_delay: secs_or(&get, "BACKLOG_PACING_SECS", defaults.politeness_delay),
            quota_backoff: secs_or(&get, "BACKLOG_QUOTA_BACKOFF_SECS", defaults.quota_backoff),
            max_quota_retries: parsed_or(
                &get,
                "BACKLOG_QUOTA_MAX_RETRIES",
                defaults.max_quota_retries,
            ),
        };

        let profiles = load_profiles(get(ENV_PROFILES_PATH).as_deref())
            .map_err(|e| BacklogError::Configuration(format!("{e:#}")))?;

        Ok(Self {
            mode,
            supabase,
            legiscan,
            backend,
            selection,
            pacing,
            request_timeout: secs_or(&get, "BACKLOG_REQUEST_TIMEOUT_SECS", Duration::from_secs(30)),
            delegate_function: get("BACKLOG_DELEGATE_FUNCTION")
                .unwrap_or_else(|| "sync-updated-bills".to_string()),
            delegate_max_calls: parsed_or(&get, "BACKLOG_DELEGATE_MAX_CALLS", 10_000),
            profiles,
        })
    }

    pub fn profile_names(&self) -> Vec<String> {
        self.profiles.iter().map(|p| p.name.clone()).collect()
    }
}

fn parsed_or<G, T>(get: &G, key: &str, default: T) -> T
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr + Copy,
{
    match get(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparsable value, using default");
            default
        }),
    }
}

fn secs_or<G>(get: &G, key: &str, default: Duration) -> Duration
where
    G: Fn(&str) -> Option<String>,
{
    Duration::from_secs(parsed_or(get, key, default.as_secs()))
}
