//! Backlog runner: one pass over every bill still missing summaries.
//!
//! Configuration comes from the environment (`.env` is loaded first); see
//! `README.md` for the variables.

use std::process::ExitCode;

use bill_backlog::metrics::Metrics;
use bill_backlog::{BacklogConfig, BacklogRuntime};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact logs by default; `BACKLOG_LOG_JSON=1` for JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bill_backlog=info,warn"));
    let json = std::env::var("BACKLOG_LOG_JSON").is_ok_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local runs; absent file is fine.
    let _ = dotenvy::dotenv();
    init_tracing();

    let metrics = match Metrics::install() {
        Ok(m) => Some(m),
        Err(e) => {
            warn!(error = %e, "metrics recorder not installed");
            None
        }
    };

    let cfg = match BacklogConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let runtime = match BacklogRuntime::from_config(cfg) {
        Ok(rt) => rt,
        Err(e) => {
            error!("startup failed: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, stopping");
        } else {
            std::future::pending::<()>().await;
        }
    };
    let summary = runtime.run_until(shutdown).await;
    println!("{summary}");

    if std::env::var("BACKLOG_METRICS_DUMP").is_ok_and(|v| v == "1") {
        if let Some(m) = &metrics {
            info!("metrics:\n{}", m.render());
        }
    }

    if summary.state.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
