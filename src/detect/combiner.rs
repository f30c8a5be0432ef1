//! Weighted combiner for the accident ensemble. Combined confidence is
//! the weight-sum of detector scores (weights validated at startup to sum
//! to 1.0, so the result stays in [0, 1]); severity falls out of three
//! ordered thresholds, which makes it non-decreasing in confidence by
//! construction.

use crate::config::{AnalyticsConfig, SeverityThresholds};
use crate::detect::{build_ensemble, AccidentScorer};
use crate::state::SensorState;
use crate::types::{AccidentCandidate, CombinedCandidate, GeoPoint, Severity};

pub struct Combiner {
    detectors: Vec<(f64, Box<dyn AccidentScorer>)>,
    severity: SeverityThresholds,
}

impl Combiner {
    pub fn new(cfg: &AnalyticsConfig) -> Self {
        Self {
            detectors: build_ensemble(cfg),
            severity: cfg.severity,
        }
    }

    /// Run every detector against the sensor state and fold the scores into
    /// one combined candidate. Also returns the per-detector candidates for
    /// diagnostics.
    pub fn evaluate(
        &self,
        state: &SensorState,
        now_unix: u64,
        location: Option<GeoPoint>,
    ) -> (Vec<AccidentCandidate>, CombinedCandidate) {
        let mut per_method = Vec::with_capacity(self.detectors.len());
        let mut combined = 0.0;
        let mut contributing = Vec::new();

        for (weight, det) in &self.detectors {
            let confidence = det.score(state, now_unix).clamp(0.0, 1.0);
            combined += weight * confidence;
            if confidence > 0.0 {
                contributing.push(det.method());
            }
            per_method.push(AccidentCandidate {
                sensor_id: state.sensor_id.clone(),
                ts_unix: now_unix,
                method: det.method(),
                confidence,
            });
        }

        let candidate = CombinedCandidate {
            sensor_id: state.sensor_id.clone(),
            ts_unix: now_unix,
            confidence: combined,
            severity: self.severity_for(combined),
            contributing_methods: contributing,
            location,
        };
        (per_method, candidate)
    }

    /// Step function over the ordered thresholds; below `minor` there is no
    /// severity (the dedup filter's confidence floor drops those anyway).
    pub fn severity_for(&self, confidence: f64) -> Option<Severity> {
        if confidence >= self.severity.severe {
            Some(Severity::Severe)
        } else if confidence >= self.severity.moderate {
            Some(Severity::Moderate)
        } else if confidence >= self.severity.minor {
            Some(Severity::Minor)
        } else {
            None
        }
    }
}
