//! Sudden-stop detector: compares speed now against speed at the start of
//! a short recent span and ramps with the fractional drop. Gated by a
//! minimum initial speed so stationary or already-crawling traffic never
//! triggers.

use crate::config::SuddenStopConfig;
use crate::detect::{clamp01, AccidentScorer};
use crate::state::SensorState;
use crate::types::Metric;

pub struct SuddenStopDetector {
    cfg: SuddenStopConfig,
}

impl SuddenStopDetector {
    pub fn new(cfg: SuddenStopConfig) -> Self {
        Self { cfg }
    }
}

impl AccidentScorer for SuddenStopDetector {
    fn method(&self) -> &'static str {
        "sudden_stop"
    }

    fn score(&self, state: &SensorState, now_unix: u64) -> f64 {
        let w = state.window(Metric::AverageSpeed);
        let Some((t_now, v_now)) = w.latest() else { return 0.0 };
        let Some((t_before, v_before)) = w.earliest_within(now_unix, self.cfg.span_secs) else {
            return 0.0;
        };
        if t_before >= t_now {
            // only one sample inside the span: nothing to compare against
            return 0.0;
        }
        if v_before < self.cfg.min_initial_speed {
            return 0.0;
        }
        let drop = (v_before - v_now) / v_before;
        if drop <= self.cfg.drop_threshold {
            return 0.0;
        }
        // 0 at the threshold, 1 at a full stop
        clamp01((drop - self.cfg.drop_threshold) / (1.0 - self.cfg.drop_threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyticsConfig;
    use crate::detect::testutil::primed_state;

    fn detector() -> SuddenStopDetector {
        SuddenStopDetector::new(AnalyticsConfig::default().detectors.sudden_stop)
    }

    #[test]
    fn majority_drop_within_span_fires() {
        let cfg = AnalyticsConfig::default();
        // 51 -> 8 km/h inside the 60s span: an 84% drop
        let (st, now) = primed_state(&cfg, &[(51.0, 0.2), (8.0, 0.2)], 30);
        let c = detector().score(&st, now);
        assert!(c > 0.4, "confidence {c}");
        assert!(c <= 1.0);
    }

    #[test]
    fn slow_traffic_is_gated_out() {
        let cfg = AnalyticsConfig::default();
        // initial 20 km/h is below the 30 km/h gate even though the drop is 90%
        let (st, now) = primed_state(&cfg, &[(20.0, 0.2), (2.0, 0.2)], 30);
        assert_eq!(detector().score(&st, now), 0.0);
    }

    #[test]
    fn gradual_slowdown_stays_quiet() {
        let cfg = AnalyticsConfig::default();
        let (st, now) = primed_state(&cfg, &[(50.0, 0.2), (40.0, 0.2)], 30);
        assert_eq!(detector().score(&st, now), 0.0);
    }

    #[test]
    fn old_reference_outside_span_is_ignored() {
        let cfg = AnalyticsConfig::default();
        // samples 120s apart: the 50 km/h reading has left the 60s span
        let (st, now) = primed_state(&cfg, &[(50.0, 0.2), (8.0, 0.2)], 120);
        assert_eq!(detector().score(&st, now), 0.0);
    }

    #[test]
    fn single_sample_cannot_fire() {
        let cfg = AnalyticsConfig::default();
        let (st, now) = primed_state(&cfg, &[(50.0, 0.2)], 30);
        assert_eq!(detector().score(&st, now), 0.0);
    }

    #[test]
    fn deeper_drops_never_lower_confidence() {
        let cfg = AnalyticsConfig::default();
        let mut prev = 0.0;
        for after in [14.0, 10.0, 6.0, 2.0] {
            let (st, now) = primed_state(&cfg, &[(50.0, 0.2), (after, 0.2)], 30);
            let c = detector().score(&st, now);
            assert!(c >= prev, "confidence fell at {after}: {c} < {prev}");
            prev = c;
        }
    }
}
