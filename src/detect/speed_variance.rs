//! Speed-variance detector: standardizes the newest speed sample against
//! the rolling speed window's own recent past. A crash shows up as a speed
//! reading many standard deviations away from what the window considers
//! normal.

use crate::config::SpeedVarianceConfig;
use crate::detect::{ramp_past, AccidentScorer};
use crate::state::SensorState;
use crate::types::Metric;

/// With a perfectly constant baseline there is no std to standardize
/// against; changes smaller than this many km/h are treated as jitter.
const FLAT_BASELINE_DELTA_KMH: f64 = 5.0;

pub struct SpeedVarianceDetector {
    cfg: SpeedVarianceConfig,
}

impl SpeedVarianceDetector {
    pub fn new(cfg: SpeedVarianceConfig) -> Self {
        Self { cfg }
    }
}

impl AccidentScorer for SpeedVarianceDetector {
    fn method(&self) -> &'static str {
        "speed_variance"
    }

    fn score(&self, state: &SensorState, _now_unix: u64) -> f64 {
        let w = state.window(Metric::AverageSpeed);
        if w.len() < self.cfg.min_samples {
            return 0.0;
        }
        let Some((_, latest)) = w.latest() else { return 0.0 };
        let Some(s) = w.summary_excluding_latest() else { return 0.0 };
        if s.std <= f64::EPSILON {
            // constant baseline: ramp on the absolute change instead, so a
            // cliff still saturates while sensor jitter stays silent
            return ramp_past(
                (latest - s.mean).abs(),
                FLAT_BASELINE_DELTA_KMH,
                FLAT_BASELINE_DELTA_KMH,
            );
        }
        let z = ((latest - s.mean) / s.std).abs();
        // saturates one threshold-width past the knob
        ramp_past(z, self.cfg.z_threshold, self.cfg.z_threshold)
    }
}
