use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::engine::AnalyticsEngine;
use crate::ingest::IngestSummary;
use crate::types::{AccidentRecord, PatternReport, RawObservation};

const DEFAULT_LIMIT: usize = 20;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AnalyticsEngine>,
}

pub fn create_router(engine: Arc<AnalyticsEngine>) -> Router {
    let state = AppState { engine };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/observations", post(ingest_observations))
        .route("/api/accidents", get(recent_accidents))
        .route("/api/patterns", get(recent_patterns))
        .route("/api/cycles/accident", post(trigger_accident_cycle))
        .route("/api/cycles/pattern", post(trigger_pattern_cycle))
        .route("/debug/sensors", get(debug_sensors))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn ingest_observations(
    State(state): State<AppState>,
    Json(batch): Json<Vec<RawObservation>>,
) -> Json<IngestSummary> {
    Json(state.engine.ingest_batch(batch).await)
}

fn limit_from(q: &HashMap<String, String>) -> usize {
    q.get("limit")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_LIMIT)
}

async fn recent_accidents(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Vec<AccidentRecord>> {
    Json(state.engine.recent_accidents(limit_from(&q)))
}

async fn recent_patterns(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<Vec<PatternReport>> {
    Json(state.engine.recent_patterns(limit_from(&q)))
}

/// Manual cycle triggers, mainly for operations and tests; the scheduler
/// runs the same entry points on its own tick.
async fn trigger_accident_cycle(State(state): State<AppState>) -> Json<Vec<AccidentRecord>> {
    Json(state.engine.run_accident_cycle(current_unix()).await)
}

async fn trigger_pattern_cycle(State(state): State<AppState>) -> Json<Vec<PatternReport>> {
    Json(state.engine.run_pattern_cycle(current_unix()).await)
}

#[derive(serde::Serialize)]
struct SensorsInfo {
    sensor_count: usize,
    accidents_logged: usize,
    patterns_logged: usize,
}

async fn debug_sensors(State(state): State<AppState>) -> Json<SensorsInfo> {
    Json(SensorsInfo {
        sensor_count: state.engine.sensor_count(),
        accidents_logged: state.engine.recent_accidents(usize::MAX).len(),
        patterns_logged: state.engine.recent_patterns(usize::MAX).len(),
    })
}

fn current_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
