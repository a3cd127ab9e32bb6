use std::sync::Arc;

use chrono::Utc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use ff_fetcher::{cli, run, webhook};

#[tokio::main]
async fn main() {
    let config = match cli::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fedifetcher: {e}");
            std::process::exit(1);
        }
    };
    init_tracing(config.log_level);

    let start = Utc::now();
    let run_id = Uuid::new_v4();
    tracing::info!(%run_id, server = %config.server, "starting fedifetcher");

    let config = Arc::new(config);
    webhook::ping(config.on_start.as_deref(), run_id, config.http_timeout).await;

    match run::run(config.clone()).await {
        Ok(()) => {
            webhook::ping(config.on_done.as_deref(), run_id, config.http_timeout).await;
            tracing::info!(elapsed = %(Utc::now() - start), "processing finished");
        }
        Err(e) => {
            tracing::error!(error = %e, "error running fedifetcher");
            webhook::ping(config.on_fail.as_deref(), run_id, config.http_timeout).await;
            tracing::warn!(elapsed = %(Utc::now() - start), "job failed");
            std::process::exit(1);
        }
    }
}

/// Map the numeric log level onto an env-filter default; `RUST_LOG` wins
/// when set.
fn init_tracing(log_level: u8) {
    let default = match log_level {
        ..=10 => "debug",
        11..=20 => "info",
        21..=30 => "warn",
        _ => "error",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}
