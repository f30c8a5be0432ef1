// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod baseline;
pub mod config;
pub mod dedup;
pub mod detect;
pub mod engine;
pub mod forecast;
pub mod history;
pub mod ingest;
pub mod metrics;
pub mod pattern;
pub mod publish;
pub mod rolling;
pub mod scheduler;
pub mod state;
pub mod types;

// ---- Re-exports for stable public API ----
pub use crate::api::create_router;
pub use crate::config::AnalyticsConfig;
pub use crate::engine::AnalyticsEngine;
pub use crate::types::{
    AccidentRecord, AnomalyEvent, ForecastResult, Horizon, Metric, PatternReport, PatternWindow,
    RawObservation, Severity, WindowType,
};
