//! # Forecast Ensemble
//! Four independent point-forecast methods blended by configured weights
//! into one prediction per (sensor, metric, horizon). Confidence is the
//! configured base scaled by the weight mass of methods that actually
//! produced a value, plus a small agreement bonus when their spread falls
//! within tolerance — always capped at 1.0.

pub mod methods;

pub use methods::{
    ArimaMethod, ExponentialSmoothing, ForecastMethod, MovingAverage, WeightedMovingAverage,
};

use std::collections::BTreeMap;

use crate::config::ForecastConfig;
use crate::types::{ForecastResult, Horizon, Metric};

pub struct ForecastEnsemble {
    methods: Vec<(f64, Box<dyn ForecastMethod>)>,
    base_confidence: f64,
    agreement_bonus: f64,
    agreement_tolerance: f64,
}

impl ForecastEnsemble {
    pub fn new(cfg: &ForecastConfig) -> Self {
        let methods: Vec<(f64, Box<dyn ForecastMethod>)> = vec![
            (
                cfg.weights.moving_average,
                Box::new(MovingAverage { window: cfg.moving_average_window }) as Box<dyn ForecastMethod>,
            ),
            (
                cfg.weights.exponential_smoothing,
                Box::new(ExponentialSmoothing { alpha: cfg.smoothing_alpha }),
            ),
            (
                cfg.weights.weighted_moving_average,
                Box::new(WeightedMovingAverage { weights: cfg.wma_weights.clone() }),
            ),
            (cfg.weights.arima, Box::new(ArimaMethod::default())),
        ];
        Self::with_methods(cfg, methods)
    }

    /// Seam for tests and alternative method sets.
    pub fn with_methods(cfg: &ForecastConfig, methods: Vec<(f64, Box<dyn ForecastMethod>)>) -> Self {
        Self {
            methods,
            base_confidence: cfg.base_confidence,
            agreement_bonus: cfg.agreement_bonus,
            agreement_tolerance: cfg.agreement_tolerance,
        }
    }

    /// Blend the per-method predictions over `history` (chronological,
    /// oldest first). `None` when no method has enough data.
    pub fn forecast(
        &self,
        sensor_id: &str,
        metric: Metric,
        horizon: Horizon,
        history: &[f64],
    ) -> Option<ForecastResult> {
        let mut per_method = BTreeMap::new();
        let mut produced: Vec<(f64, f64)> = Vec::new(); // (weight, prediction)

        for (weight, m) in &self.methods {
            if let Some(p) = m.predict(history) {
                per_method.insert(m.name().to_string(), p);
                produced.push((*weight, p));
            }
        }
        if produced.is_empty() {
            return None;
        }

        let mass: f64 = produced.iter().map(|(w, _)| *w).sum();
        if mass <= f64::EPSILON {
            return None;
        }
        // renormalize over participating methods so a missing method does
        // not bias the blend toward zero
        let blended = produced.iter().map(|(w, p)| w * p).sum::<f64>() / mass;

        let mut confidence = self.base_confidence * mass;
        if produced.len() >= 2 {
            let max = produced.iter().map(|(_, p)| *p).fold(f64::MIN, f64::max);
            let min = produced.iter().map(|(_, p)| *p).fold(f64::MAX, f64::min);
            if max - min <= self.agreement_tolerance {
                confidence += self.agreement_bonus;
            }
        }

        Some(ForecastResult {
            sensor_id: sensor_id.to_string(),
            metric,
            horizon,
            per_method_values: per_method,
            blended_value: blended,
            confidence: confidence.min(1.0),
        })
    }
}
