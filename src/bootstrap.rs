// src/bootstrap.rs
//! Process-scoped wiring: every client is built once here and handed down
//! explicitly.
use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::config::{BackendKind, BacklogConfig, RunMode};
use crate::delegate::{run_delegated, BacklogProcedure, SupabaseFunction};
use crate::enrich::cli::CliBackend;
use crate::enrich::mock::MockBackend;
use crate::enrich::openai::OpenAiBackend;
use crate::enrich::{DynBackend, EnrichmentClient};
use crate::fetcher::RecordFetcher;
use crate::orchestrator::{Orchestrator, RunSummary};
use crate::provider::legiscan::LegiscanProvider;
use crate::store::supabase::SupabaseStore;

pub enum BacklogRuntime {
    Local(Orchestrator),
    Delegated {
        procedure: Box<dyn BacklogProcedure>,
        cfg: BacklogConfig,
    },
}

pub fn build_backend(cfg: &BacklogConfig) -> anyhow::Result<DynBackend> {
    let backend: DynBackend = match &cfg.backend {
        BackendKind::Cli { bin } => Arc::new(CliBackend::new(bin.clone())),
        BackendKind::OpenAi { api_key, model } => Arc::new(
            OpenAiBackend::new(api_key.clone(), model.clone(), cfg.request_timeout)
                .context("openai backend")?,
        ),
        BackendKind::Mock => Arc::new(MockBackend::new()),
    };
    Ok(backend)
}

impl BacklogRuntime {
    pub fn from_config(cfg: BacklogConfig) -> anyhow::Result<Self> {
        // Safe diagnostics only: no keys.
        info!(
            mode = ?cfg.mode,
            selection = ?cfg.selection,
            profiles = ?cfg.profile_names(),
            "backlog config loaded"
        );
        match cfg.mode {
            RunMode::Local => {
                let legiscan = cfg
                    .legiscan
                    .as_ref()
                    .context("local mode needs LegiScan credentials")?;
                let store = Arc::new(SupabaseStore::new(&cfg.supabase, cfg.request_timeout)?);
                let provider = Arc::new(LegiscanProvider::new(legiscan, cfg.request_timeout)?);
                let backend = build_backend(&cfg)?;
                info!(backend = backend.name(), "summary backend ready");

                let orchestrator = Orchestrator::new(
                    store,
                    RecordFetcher::new(provider),
                    EnrichmentClient::new(backend, cfg.profiles.clone()),
                )
                .with_selection(cfg.selection.clone())
                .with_pacing(cfg.pacing);
                Ok(Self::Local(orchestrator))
            }
            RunMode::Delegated => {
                let procedure = SupabaseFunction::new(
                    &cfg.supabase,
                    &cfg.delegate_function,
                    cfg.request_timeout,
                )?;
                Ok(Self::Delegated {
                    procedure: Box::new(procedure),
                    cfg,
                })
            }
        }
    }

    pub async fn run_until<F>(&self, shutdown: F) -> RunSummary
    where
        F: Future<Output = ()>,
    {
        match self {
            Self::Local(orchestrator) => orchestrator.run_until(shutdown).await,
            Self::Delegated { procedure, cfg } => {
                run_delegated(
                    procedure.as_ref(),
                    cfg.pacing,
                    cfg.delegate_max_calls,
                    shutdown,
                )
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    #[serial_test::serial]
    fn mock_backend_is_selectable() {
        let cfg = BacklogConfig::from_map(&vars(&[
            ("SUPABASE_URL", "https://example.supabase.co"),
            ("SUPABASE_SERVICE_ROLE_KEY", "svc"),
            ("LEGISCAN_API_KEY", "k"),
            ("LEGISCAN_ACCESS_KEY", "a"),
            ("BACKLOG_BACKEND", "mock"),
        ]))
        .unwrap();
        assert_eq!(build_backend(&cfg).unwrap().name(), "mock");
    }

    #[test]
    #[serial_test::serial]
    fn both_modes_wire_up_without_network() {
        let local = BacklogConfig::from_map(&vars(&[
            ("SUPABASE_URL", "https://example.supabase.co"),
            ("SUPABASE_SERVICE_ROLE_KEY", "svc"),
            ("LEGISCAN_API_KEY", "k"),
            ("LEGISCAN_ACCESS_KEY", "a"),
        ]))
        .unwrap();
        assert!(matches!(
            BacklogRuntime::from_config(local).unwrap(),
            BacklogRuntime::Local(_)
        ));

        let delegated = BacklogConfig::from_map(&vars(&[
            ("SUPABASE_URL", "https://example.supabase.co"),
            ("SUPABASE_SERVICE_ROLE_KEY", "svc"),
            ("BACKLOG_MODE", "delegated"),
        ]))
        .unwrap();
        assert!(matches!(
            BacklogRuntime::from_config(delegated).unwrap(),
            BacklogRuntime::Delegated { .. }
        ));
    }
}
