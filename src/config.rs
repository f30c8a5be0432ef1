// src/config.rs
// Immutable, validated runtime configuration. Loaded once at startup and
// passed explicitly to component constructors; no global mutable state.
//
// All numeric thresholds are knobs here, never hardcoded in detectors.
// Source audits disagree on some reference values (speed-variance "25.0"
// vs "3.0 sigma"; sudden-stop "80% in 30s" vs "20 km/h in 300s"); both
// readings stay reachable through configuration pending product-owner
// confirmation.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::GeoPoint;

pub const ENV_CONFIG_PATH: &str = "ANALYTICS_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/analytics.toml";

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Ensemble weights for the four accident detectors. Must sum to 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorWeights {
    pub speed_variance: f64,
    pub occupancy_spike: f64,
    pub sudden_stop: f64,
    pub pattern_anomaly: f64,
}

impl Default for DetectorWeights {
    fn default() -> Self {
        Self {
            speed_variance: 0.30,
            occupancy_spike: 0.25,
            sudden_stop: 0.25,
            pattern_anomaly: 0.20,
        }
    }
}

impl DetectorWeights {
    pub fn sum(&self) -> f64 {
        self.speed_variance + self.occupancy_spike + self.sudden_stop + self.pattern_anomaly
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedVarianceConfig {
    /// Z-score where confidence starts rising.
    pub z_threshold: f64,
    pub min_samples: usize,
}

impl Default for SpeedVarianceConfig {
    fn default() -> Self {
        Self { z_threshold: 3.0, min_samples: 5 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct OccupancySpikeConfig {
    /// Ratio of current occupancy over baseline mean where confidence starts rising.
    pub spike_factor: f64,
    pub min_baseline_samples: usize,
}

impl Default for OccupancySpikeConfig {
    fn default() -> Self {
        Self { spike_factor: 2.0, min_baseline_samples: 10 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SuddenStopConfig {
    /// Fractional speed drop where confidence starts rising.
    pub drop_threshold: f64,
    /// How far back the "before" speed is taken from.
    pub span_secs: u64,
    /// Stationary or already-slow traffic must not trigger.
    pub min_initial_speed: f64,
}

impl Default for SuddenStopConfig {
    fn default() -> Self {
        Self { drop_threshold: 0.7, span_secs: 60, min_initial_speed: 30.0 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternAnomalyConfig {
    pub z_threshold: f64,
    /// Minimum samples in the hour-of-week baseline bucket.
    pub min_history: usize,
}

impl Default for PatternAnomalyConfig {
    fn default() -> Self {
        Self { z_threshold: 2.5, min_history: 4 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DetectorConfig {
    pub weights: DetectorWeights,
    pub speed_variance: SpeedVarianceConfig,
    pub occupancy_spike: OccupancySpikeConfig,
    pub sudden_stop: SuddenStopConfig,
    pub pattern_anomaly: PatternAnomalyConfig,
}

/// Ordered severity thresholds over combined confidence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityThresholds {
    pub minor: f64,
    pub moderate: f64,
    pub severe: f64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self { minor: 0.3, moderate: 0.6, severe: 0.9 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Candidates below this confidence are dropped before any other check.
    pub min_confidence: f64,
    pub cooldown_secs: u64,
    pub radius_m: f64,
    /// Require at least two contributing detectors before acceptance.
    pub require_multi_method: bool,
    pub max_alerts_per_hour_sensor: usize,
    pub max_alerts_per_hour_global: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
            cooldown_secs: 600,
            radius_m: 100.0,
            require_multi_method: false,
            max_alerts_per_hour_sensor: 6,
            max_alerts_per_hour_global: 120,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Rolling buffer capacity per (sensor, metric).
    pub rolling_capacity: usize,
    /// Minimum sample counts before a pattern window may be emitted.
    pub hour_min_samples: usize,
    pub day_min_samples: usize,
    pub week_min_samples: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            rolling_capacity: 120,
            hour_min_samples: 10,
            day_min_samples: 24,
            week_min_samples: 168,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyMethod {
    ZScore,
    Iqr,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Exactly one method is active per deployment.
    pub method: AnomalyMethod,
    pub z_threshold: f64,
    pub iqr_k: f64,
    /// Minimum baseline bucket size before flagging runs.
    pub min_history: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self { method: AnomalyMethod::ZScore, z_threshold: 3.0, iqr_k: 1.5, min_history: 4 }
    }
}

/// Blend weights for the four forecast methods. Must sum to 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastWeights {
    pub moving_average: f64,
    pub exponential_smoothing: f64,
    pub weighted_moving_average: f64,
    pub arima: f64,
}

impl Default for ForecastWeights {
    fn default() -> Self {
        Self {
            moving_average: 0.25,
            exponential_smoothing: 0.30,
            weighted_moving_average: 0.20,
            arima: 0.25,
        }
    }
}

impl ForecastWeights {
    pub fn sum(&self) -> f64 {
        self.moving_average
            + self.exponential_smoothing
            + self.weighted_moving_average
            + self.arima
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub weights: ForecastWeights,
    /// Confidence when every method participates and none agree.
    pub base_confidence: f64,
    /// Added when the per-method spread is within tolerance; result capped at 1.0.
    pub agreement_bonus: f64,
    pub agreement_tolerance: f64,
    pub moving_average_window: usize,
    pub smoothing_alpha: f64,
    /// Most-recent-first weights; documented as not necessarily summing to 1.
    pub wma_weights: Vec<f64>,
    /// History lengths (samples) fed to the methods per horizon.
    pub short_history: usize,
    pub medium_history: usize,
    pub long_history: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            weights: ForecastWeights::default(),
            base_confidence: 0.7,
            agreement_bonus: 0.1,
            agreement_tolerance: 2.0,
            moving_average_window: 7,
            smoothing_alpha: 0.3,
            wma_weights: vec![0.4, 0.3, 0.2, 0.1, 0.0],
            short_history: 12,
            medium_history: 36,
            long_history: 96,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    pub accident_secs: u64,
    pub pattern_secs: u64,
    pub snapshot_secs: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self { accident_secs: 30, pattern_secs: 300, snapshot_secs: 300 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// Samples kept per hour-of-week bucket (weeks of history).
    pub bucket_capacity: usize,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self { bucket_capacity: 8 }
    }
}

/// Top-level configuration. `Default` carries the reference values from
/// the product audit; production deployments override via TOML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub detectors: DetectorConfig,
    pub severity: SeverityThresholds,
    pub dedup: DedupConfig,
    pub windows: WindowConfig,
    pub anomaly: AnomalyConfig,
    pub forecast: ForecastConfig,
    pub cycles: CycleConfig,
    pub baseline: BaselineConfig,
    pub snapshot_path: Option<String>,
    /// Known sensor locations; radius checks are skipped for unknown sensors.
    pub sensors: HashMap<String, GeoPoint>,
}

impl AnalyticsConfig {
    /// Parse and validate TOML. Invalid configuration is fatal.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: AnalyticsConfig = toml::from_str(s).context("parsing analytics config TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading analytics config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Load using env var + fallback:
    /// 1) $ANALYTICS_CONFIG_PATH
    /// 2) config/analytics.toml
    /// 3) built-in reference defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                bail!("{ENV_CONFIG_PATH} points to non-existent path");
            }
            return Self::from_path(&pb);
        }
        let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_p.exists() {
            return Self::from_path(&default_p);
        }
        let cfg = Self::default();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Fail fast on inconsistent knobs. Never silently renormalizes.
    pub fn validate(&self) -> Result<()> {
        let w = &self.detectors.weights;
        if (w.sum() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            bail!("detector ensemble weights must sum to 1.0, got {:.6}", w.sum());
        }
        for (name, v) in [
            ("speed_variance", w.speed_variance),
            ("occupancy_spike", w.occupancy_spike),
            ("sudden_stop", w.sudden_stop),
            ("pattern_anomaly", w.pattern_anomaly),
        ] {
            if !(0.0..=1.0).contains(&v) {
                bail!("detector weight {name} out of [0,1]: {v}");
            }
        }

        let s = &self.severity;
        if !(s.minor > 0.0 && s.minor < s.moderate && s.moderate < s.severe && s.severe <= 1.0) {
            bail!(
                "severity thresholds must satisfy 0 < minor < moderate < severe <= 1, got {}/{}/{}",
                s.minor, s.moderate, s.severe
            );
        }

        if !(0.0..=1.0).contains(&self.dedup.min_confidence) {
            bail!("dedup.min_confidence out of [0,1]: {}", self.dedup.min_confidence);
        }
        if self.dedup.cooldown_secs == 0 {
            bail!("dedup.cooldown_secs must be positive");
        }

        let wc = &self.windows;
        if wc.rolling_capacity == 0 {
            bail!("windows.rolling_capacity must be positive");
        }
        for (name, v) in [
            ("hour_min_samples", wc.hour_min_samples),
            ("day_min_samples", wc.day_min_samples),
            ("week_min_samples", wc.week_min_samples),
        ] {
            if v == 0 {
                bail!("windows.{name} must be positive");
            }
        }

        let fw = &self.forecast.weights;
        if (fw.sum() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            bail!("forecast blend weights must sum to 1.0, got {:.6}", fw.sum());
        }
        let f = &self.forecast;
        if !(0.0..=1.0).contains(&f.base_confidence) {
            bail!("forecast.base_confidence out of [0,1]: {}", f.base_confidence);
        }
        if !(f.smoothing_alpha > 0.0 && f.smoothing_alpha <= 1.0) {
            bail!("forecast.smoothing_alpha out of (0,1]: {}", f.smoothing_alpha);
        }
        if f.moving_average_window == 0 {
            bail!("forecast.moving_average_window must be positive");
        }
        if f.wma_weights.is_empty() {
            bail!("forecast.wma_weights must not be empty");
        }
        for (name, v) in [
            ("short_history", f.short_history),
            ("medium_history", f.medium_history),
            ("long_history", f.long_history),
        ] {
            if v < 2 {
                bail!("forecast.{name} must be at least 2");
            }
        }

        if self.detectors.sudden_stop.span_secs == 0 {
            bail!("detectors.sudden_stop.span_secs must be positive");
        }
        if !(0.0..1.0).contains(&self.detectors.sudden_stop.drop_threshold) {
            bail!(
                "detectors.sudden_stop.drop_threshold out of [0,1): {}",
                self.detectors.sudden_stop.drop_threshold
            );
        }
        if self.anomaly.z_threshold <= 0.0 || self.anomaly.iqr_k <= 0.0 {
            bail!("anomaly thresholds must be positive");
        }
        if self.baseline.bucket_capacity == 0 {
            bail!("baseline.bucket_capacity must be positive");
        }

        Ok(())
    }

    pub fn min_samples_for(&self, wt: crate::types::WindowType) -> usize {
        match wt {
            crate::types::WindowType::Hour => self.windows.hour_min_samples,
            crate::types::WindowType::Day => self.windows.day_min_samples,
            crate::types::WindowType::Week => self.windows.week_min_samples,
        }
    }

    pub fn history_for(&self, horizon: crate::types::Horizon) -> usize {
        match horizon {
            crate::types::Horizon::Short => self.forecast.short_history,
            crate::types::Horizon::Medium => self.forecast.medium_history,
            crate::types::Horizon::Long => self.forecast.long_history,
        }
    }

    pub fn location_of(&self, sensor_id: &str) -> Option<GeoPoint> {
        self.sensors.get(sensor_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_defaults_are_valid() {
        AnalyticsConfig::default().validate().unwrap();
    }

    #[test]
    fn detector_weights_must_sum_to_one() {
        let mut cfg = AnalyticsConfig::default();
        cfg.detectors.weights.speed_variance = 0.5; // sum now 1.2
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("sum to 1.0"), "{err}");
    }

    #[test]
    fn severity_thresholds_must_be_ordered() {
        let mut cfg = AnalyticsConfig::default();
        cfg.severity.moderate = 0.95; // above severe
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn forecast_weights_must_sum_to_one() {
        let mut cfg = AnalyticsConfig::default();
        cfg.forecast.weights.arima = 0.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn smoothing_alpha_must_lie_in_half_open_unit_interval() {
        let mut cfg = AnalyticsConfig::default();
        cfg.forecast.smoothing_alpha = 0.0; // degenerate: ignores all new data
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("smoothing_alpha"), "{err}");

        cfg.forecast.smoothing_alpha = 1.0; // boundary is allowed
        cfg.validate().unwrap();

        cfg.forecast.smoothing_alpha = 1.1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn toml_roundtrip_with_overrides() {
        let cfg = AnalyticsConfig::from_toml_str(
            r#"
            [detectors.weights]
            speed_variance = 0.4
            occupancy_spike = 0.2
            sudden_stop = 0.2
            pattern_anomaly = 0.2

            [dedup]
            cooldown_secs = 300
            require_multi_method = true

            [sensors.s1]
            lat = 50.05
            lon = 14.42
            "#,
        )
        .unwrap();
        assert_eq!(cfg.dedup.cooldown_secs, 300);
        assert!(cfg.dedup.require_multi_method);
        assert!((cfg.detectors.weights.speed_variance - 0.4).abs() < 1e-9);
        assert!(cfg.location_of("s1").is_some());
        // untouched sections keep reference defaults
        assert_eq!(cfg.windows.hour_min_samples, 10);
    }

    #[test]
    fn bad_toml_is_fatal_not_renormalized() {
        let res = AnalyticsConfig::from_toml_str(
            r#"
            [forecast.weights]
            moving_average = 0.9
            exponential_smoothing = 0.9
            weighted_moving_average = 0.1
            arima = 0.1
            "#,
        );
        assert!(res.is_err());
    }
}
