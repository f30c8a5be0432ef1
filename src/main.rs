//! Traffic Incident Analyzer — Binary Entrypoint
//! Boots the Axum HTTP server, restores persisted state, and spawns the
//! background analysis loops.
//!
//! See `README.md` for quickstart and `config/analytics.toml` for the
//! reference configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use traffic_incident_analyzer::api;
use traffic_incident_analyzer::config::AnalyticsConfig;
use traffic_incident_analyzer::engine::AnalyticsEngine;
use traffic_incident_analyzer::metrics::Metrics;
use traffic_incident_analyzer::scheduler;
use traffic_incident_analyzer::state::load_snapshot;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("traffic_incident_analyzer=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    // Invalid configuration is fatal, silently running with wrong
    // thresholds is worse than not starting.
    let cfg = AnalyticsConfig::load_default().context("loading analytics config")?;
    let metrics = Metrics::init(cfg.cycles.accident_secs, cfg.cycles.pattern_secs);
    let engine = Arc::new(AnalyticsEngine::new(cfg)?);

    if let Some(path) = engine.config().snapshot_path.clone().map(PathBuf::from) {
        match load_snapshot(&path).await {
            Ok(Some(snap)) => engine.restore(&snap),
            Ok(None) => tracing::info!(path = %path.display(), "no snapshot found, starting fresh"),
            Err(e) => tracing::warn!("snapshot load failed, starting fresh: {e:#}"),
        }
    }

    tokio::spawn(scheduler::run_accident_loop(engine.clone()));
    tokio::spawn(scheduler::run_pattern_loop(engine.clone()));
    tokio::spawn(scheduler::run_snapshot_loop(engine.clone()));

    let router = api::create_router(engine).merge(metrics.router());

    let bind = std::env::var("ANALYTICS_BIND").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    tracing::info!(%bind, "listening");
    axum::serve(listener, router).await.context("serving HTTP")?;
    Ok(())
}
