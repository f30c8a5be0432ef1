//! Occupancy-spike detector: a stopped queue over a sensor keeps the loop
//! occupied far longer than its recent baseline. Compares the newest
//! occupancy reading to the window's baseline mean and ramps with the
//! ratio beyond the configured spike factor.

use crate::config::OccupancySpikeConfig;
use crate::detect::{ramp_past, AccidentScorer};
use crate::state::SensorState;
use crate::types::Metric;

pub struct OccupancySpikeDetector {
    cfg: OccupancySpikeConfig,
}

impl OccupancySpikeDetector {
    pub fn new(cfg: OccupancySpikeConfig) -> Self {
        Self { cfg }
    }
}

impl AccidentScorer for OccupancySpikeDetector {
    fn method(&self) -> &'static str {
        "occupancy_spike"
    }

    fn score(&self, state: &SensorState, _now_unix: u64) -> f64 {
        let w = state.window(Metric::Occupancy);
        if w.len() < self.cfg.min_baseline_samples {
            return 0.0;
        }
        let Some((_, latest)) = w.latest() else { return 0.0 };
        let Some(s) = w.summary_excluding_latest() else { return 0.0 };
        if s.mean <= f64::EPSILON {
            // empty-road baseline; ratio is meaningless
            return 0.0;
        }
        let ratio = latest / s.mean;
        ramp_past(ratio, self.cfg.spike_factor, self.cfg.spike_factor)
    }
}
