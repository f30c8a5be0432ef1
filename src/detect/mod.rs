//! # Accident Ensemble
//! Four independent detectors, each a pure function of a sensor's rolling
//! state returning a confidence in [0, 1] (0 = no signal), combined by a
//! weighted [`Combiner`]. Detectors with too little history stay silent;
//! that is a normal state, not an error.

pub mod combiner;
pub mod occupancy_spike;
pub mod pattern_anomaly;
pub mod speed_variance;
pub mod sudden_stop;

pub use combiner::Combiner;
pub use occupancy_spike::OccupancySpikeDetector;
pub use pattern_anomaly::PatternAnomalyDetector;
pub use speed_variance::SpeedVarianceDetector;
pub use sudden_stop::SuddenStopDetector;

use crate::config::AnalyticsConfig;
use crate::state::SensorState;

/// Uniform scoring capability so the combiner can iterate detectors
/// polymorphically without hardcoding method names.
pub trait AccidentScorer: Send + Sync {
    fn method(&self) -> &'static str;

    /// Confidence in [0, 1]; 0 means "no signal" (including "not enough
    /// data yet"). Must be monotonically non-decreasing in the magnitude
    /// of the underlying deviation.
    fn score(&self, state: &SensorState, now_unix: u64) -> f64;
}

/// Detectors paired with their configured ensemble weights, in a fixed
/// order so combined confidence is deterministic.
pub fn build_ensemble(cfg: &AnalyticsConfig) -> Vec<(f64, Box<dyn AccidentScorer>)> {
    let w = cfg.detectors.weights;
    vec![
        (
            w.speed_variance,
            Box::new(SpeedVarianceDetector::new(cfg.detectors.speed_variance)) as Box<dyn AccidentScorer>,
        ),
        (
            w.occupancy_spike,
            Box::new(OccupancySpikeDetector::new(cfg.detectors.occupancy_spike)),
        ),
        (
            w.sudden_stop,
            Box::new(SuddenStopDetector::new(cfg.detectors.sudden_stop)),
        ),
        (
            w.pattern_anomaly,
            Box::new(PatternAnomalyDetector::new(cfg.detectors.pattern_anomaly)),
        ),
    ]
}

pub(crate) fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Smooth ramp: 0 at the threshold, saturating to 1 as the deviation grows
/// by `scale` beyond it.
pub(crate) fn ramp_past(value: f64, threshold: f64, scale: f64) -> f64 {
    if value <= threshold || scale <= f64::EPSILON {
        return 0.0;
    }
    clamp01((value - threshold) / scale)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_is_zero_at_threshold_and_monotonic() {
        assert_eq!(ramp_past(3.0, 3.0, 3.0), 0.0);
        let a = ramp_past(4.0, 3.0, 3.0);
        let b = ramp_past(5.0, 3.0, 3.0);
        assert!(a > 0.0 && b > a);
        assert_eq!(ramp_past(100.0, 3.0, 3.0), 1.0);
    }

    #[test]
    fn ensemble_order_is_stable() {
        let cfg = AnalyticsConfig::default();
        let ens = build_ensemble(&cfg);
        let names: Vec<&str> = ens.iter().map(|(_, d)| d.method()).collect();
        assert_eq!(
            names,
            vec!["speed_variance", "occupancy_spike", "sudden_stop", "pattern_anomaly"]
        );
    }
}
