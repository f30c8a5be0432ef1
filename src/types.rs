// src/types.rs
// Core domain types shared across the analytics pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Observed congestion tier reported by the upstream counting collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CongestionLevel {
    FreeFlow,
    Light,
    Moderate,
    Heavy,
    Jam,
}

/// Wire-format observation as pushed by the ingestion collaborator.
/// Field names follow the upstream JSON contract (camelCase).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawObservation {
    pub sensor_id: String,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    pub vehicle_count: i64,
    /// km/h
    pub average_speed: f64,
    /// Fraction of time the sensor was occupied, in [0, 1].
    pub occupancy: f64,
    pub congestion_level: CongestionLevel,
}

/// Validated observation, immutable once accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub sensor_id: String,
    pub ts_unix: u64,
    pub vehicle_count: u64,
    pub average_speed: f64,
    pub occupancy: f64,
    pub congestion_level: CongestionLevel,
}

/// Metric tracked per sensor in rolling windows and pattern windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    VehicleCount,
    AverageSpeed,
    Occupancy,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::VehicleCount, Metric::AverageSpeed, Metric::Occupancy];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::VehicleCount => "vehicle_count",
            Metric::AverageSpeed => "average_speed",
            Metric::Occupancy => "occupancy",
        }
    }

    pub fn value_of(&self, obs: &Observation) -> f64 {
        match self {
            Metric::VehicleCount => obs.vehicle_count as f64,
            Metric::AverageSpeed => obs.average_speed,
            Metric::Occupancy => obs.occupancy,
        }
    }
}

/// WGS84 point used for the dedup filter's spatial radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// Great-circle distance in meters (haversine).
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_371_000.0;
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = (other.lat - self.lat).to_radians();
        let dlon = (other.lon - self.lon).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }
}

/// Accident severity tier, assigned from combined confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Moderate,
    Severe,
}

/// Per-detector score for one sensor in one cycle. Ephemeral.
#[derive(Debug, Clone)]
pub struct AccidentCandidate {
    pub sensor_id: String,
    pub ts_unix: u64,
    pub method: &'static str,
    pub confidence: f64,
}

/// Combiner output for one sensor, before the dedup filter.
#[derive(Debug, Clone)]
pub struct CombinedCandidate {
    pub sensor_id: String,
    pub ts_unix: u64,
    pub confidence: f64,
    pub severity: Option<Severity>,
    pub contributing_methods: Vec<&'static str>,
    pub location: Option<GeoPoint>,
}

/// Accident that passed the dedup filter. Immutable after creation except
/// for `resolved`, which an external collaborator may flip.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccidentRecord {
    /// Deterministic dedup key: `<sensorId>:<minute-truncated unix ts>`.
    pub id: String,
    pub sensor_id: String,
    pub location: Option<GeoPoint>,
    pub timestamp: DateTime<Utc>,
    pub confidence: f64,
    pub severity: Severity,
    pub contributing_methods: Vec<String>,
    #[serde(default)]
    pub resolved: bool,
}

/// Time granularity of a pattern window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowType {
    Hour,
    Day,
    Week,
}

impl WindowType {
    pub const ALL: [WindowType; 3] = [WindowType::Hour, WindowType::Day, WindowType::Week];

    pub fn span_secs(&self) -> u64 {
        match self {
            WindowType::Hour => 3_600,
            WindowType::Day => 86_400,
            WindowType::Week => 7 * 86_400,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WindowType::Hour => "hour",
            WindowType::Day => "day",
            WindowType::Week => "week",
        }
    }
}

/// Statistics bundle computed when a pattern window closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub p25: f64,
    pub p75: f64,
    pub p95: f64,
}

/// Closed, ready pattern window (sample count reached the type minimum).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternWindow {
    pub sensor_id: String,
    pub metric: Metric,
    pub window_type: WindowType,
    pub start_unix: u64,
    pub end_unix: u64,
    pub sample_count: usize,
    pub statistics: WindowStats,
}

/// Statistical outlier flagged over a closed window. Embedded in pattern
/// output, never persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyEvent {
    pub sensor_id: String,
    pub metric: Metric,
    pub ts_unix: u64,
    pub z_score: f64,
    pub value: f64,
}

/// Forecast horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Horizon {
    Short,
    Medium,
    Long,
}

impl Horizon {
    pub const ALL: [Horizon; 3] = [Horizon::Short, Horizon::Medium, Horizon::Long];

    pub fn as_str(&self) -> &'static str {
        match self {
            Horizon::Short => "short",
            Horizon::Medium => "medium",
            Horizon::Long => "long",
        }
    }
}

/// Blended multi-method forecast for one (sensor, metric, horizon).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastResult {
    pub sensor_id: String,
    pub metric: Metric,
    pub horizon: Horizon,
    pub per_method_values: BTreeMap<String, f64>,
    pub blended_value: f64,
    pub confidence: f64,
}

/// Full pattern-path emission: the closed window plus anomalies and
/// forecasts derived from it, handed to the external publisher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternReport {
    #[serde(flatten)]
    pub window: PatternWindow,
    pub anomalies: Vec<AnomalyEvent>,
    pub forecasts: Vec<ForecastResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_matches_tiers() {
        assert!(Severity::Minor < Severity::Moderate);
        assert!(Severity::Moderate < Severity::Severe);
    }

    #[test]
    fn haversine_sanity() {
        let a = GeoPoint { lat: 50.0, lon: 14.0 };
        let b = GeoPoint { lat: 50.0, lon: 14.0014 };
        // ~100 m per 0.0014 deg longitude at lat 50
        let d = a.distance_m(&b);
        assert!(d > 80.0 && d < 120.0, "distance {d}");
    }

    #[test]
    fn raw_observation_wire_names_are_camel_case() {
        let raw: RawObservation = serde_json::from_str(
            r#"{"sensorId":"s1","timestamp":"2026-01-05T10:00:00Z","vehicleCount":12,
                "averageSpeed":48.5,"occupancy":0.22,"congestionLevel":"light"}"#,
        )
        .unwrap();
        assert_eq!(raw.sensor_id, "s1");
        assert_eq!(raw.vehicle_count, 12);
    }
}
