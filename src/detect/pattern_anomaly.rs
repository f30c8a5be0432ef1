//! Pattern-anomaly detector: standardizes current occupancy against the
//! *historical* same-hour-of-week baseline rather than the short rolling
//! window. Catches "this is wildly unlike a normal Tuesday 08:00" even
//! when the last few minutes have looked consistent.

use crate::config::PatternAnomalyConfig;
use crate::detect::{ramp_past, AccidentScorer};
use crate::state::SensorState;
use crate::types::Metric;

pub struct PatternAnomalyDetector {
    cfg: PatternAnomalyConfig,
}

impl PatternAnomalyDetector {
    pub fn new(cfg: PatternAnomalyConfig) -> Self {
        Self { cfg }
    }
}

impl AccidentScorer for PatternAnomalyDetector {
    fn method(&self) -> &'static str {
        "pattern_anomaly"
    }

    fn score(&self, state: &SensorState, _now_unix: u64) -> f64 {
        let Some((ts, latest)) = state.window(Metric::Occupancy).latest() else {
            return 0.0;
        };
        let Some(z) = state
            .baseline(Metric::Occupancy)
            .z_score(ts, latest, self.cfg.min_history)
        else {
            return 0.0;
        };
        ramp_past(z.abs(), self.cfg.z_threshold, self.cfg.z_threshold)
    }
}
