//! Background loops driving the two analysis cycles and periodic snapshot
//! writes. Each loop owns one ticker; a failed tick is logged and the next
//! tick proceeds normally.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::{self, Duration};

use crate::engine::AnalyticsEngine;
use crate::state::save_snapshot;

fn current_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub async fn run_accident_loop(engine: Arc<AnalyticsEngine>) {
    let interval = engine.config().cycles.accident_secs;
    let mut ticker = time::interval(Duration::from_secs(interval.max(1)));
    tracing::info!(interval_secs = interval, "accident cycle loop started");
    loop {
        ticker.tick().await;
        let emitted = engine.run_accident_cycle(current_unix()).await;
        if !emitted.is_empty() {
            tracing::info!(count = emitted.len(), "accident cycle emitted records");
        }
    }
}

pub async fn run_pattern_loop(engine: Arc<AnalyticsEngine>) {
    let interval = engine.config().cycles.pattern_secs;
    let mut ticker = time::interval(Duration::from_secs(interval.max(1)));
    tracing::info!(interval_secs = interval, "pattern cycle loop started");
    loop {
        ticker.tick().await;
        let reports = engine.run_pattern_cycle(current_unix()).await;
        if !reports.is_empty() {
            tracing::info!(count = reports.len(), "pattern cycle emitted reports");
        }
    }
}

/// Persist a snapshot on a fixed cadence so a restart resumes close to
/// where it left off. No-op when no snapshot path is configured.
pub async fn run_snapshot_loop(engine: Arc<AnalyticsEngine>) {
    let Some(path) = engine.config().snapshot_path.clone().map(PathBuf::from) else {
        tracing::info!("no snapshot path configured, periodic persistence disabled");
        return;
    };
    let interval = engine.config().cycles.snapshot_secs;
    let mut ticker = time::interval(Duration::from_secs(interval.max(1)));
    tracing::info!(interval_secs = interval, path = %path.display(), "snapshot loop started");
    loop {
        ticker.tick().await;
        let snap = engine.snapshot();
        match save_snapshot(&path, &snap).await {
            Ok(()) => tracing::debug!(sensors = snap.sensors.len(), "snapshot written"),
            Err(e) => tracing::warn!("snapshot write failed: {e:#}"),
        }
    }
}
