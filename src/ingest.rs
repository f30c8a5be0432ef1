// src/ingest.rs
// Observation intake: validation and normalization of the raw wire format.
// Malformed records are skipped with a diagnostic and a counter bump;
// processing of everything else continues unaffected.

use metrics::{counter, describe_counter, describe_gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::types::{Observation, RawObservation};

/// Physical ceiling for a plausible speed reading, km/h.
const MAX_SPEED_KMH: f64 = 300.0;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("observations_accepted_total", "Observations accepted into sensor state.");
        describe_counter!(
            "observations_skipped_total",
            "Malformed observations skipped at intake."
        );
        describe_counter!("accidents_emitted_total", "Accident records past the dedup filter.");
        describe_counter!(
            "accidents_suppressed_total",
            "Accident candidates dropped by the dedup filter."
        );
        describe_counter!("pattern_windows_emitted_total", "Closed windows that met their minimum.");
        describe_counter!(
            "pattern_windows_skipped_total",
            "Windows closed below their sample minimum."
        );
        describe_counter!("anomalies_flagged_total", "Anomaly events embedded in pattern output.");
        describe_counter!("forecasts_produced_total", "Blended forecasts produced.");
        describe_gauge!("accident_cycle_last_run_ts", "Unix ts of the last accident cycle.");
        describe_gauge!("pattern_cycle_last_run_ts", "Unix ts of the last pattern cycle.");
    });
}

/// Outcome of one intake batch, reported back to the pushing collaborator.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct IngestSummary {
    pub accepted: usize,
    pub skipped: usize,
}

/// Check one raw record against the wire contract.
pub fn validate_observation(raw: &RawObservation) -> Result<Observation, String> {
    if raw.sensor_id.trim().is_empty() {
        return Err("empty sensorId".into());
    }
    let ts = raw.timestamp.timestamp();
    if ts <= 0 {
        return Err(format!("implausible timestamp {}", raw.timestamp));
    }
    if raw.vehicle_count < 0 {
        return Err(format!("negative vehicleCount {}", raw.vehicle_count));
    }
    if !raw.average_speed.is_finite() || raw.average_speed < 0.0 || raw.average_speed > MAX_SPEED_KMH
    {
        return Err(format!("averageSpeed out of range: {}", raw.average_speed));
    }
    if !raw.occupancy.is_finite() || !(0.0..=1.0).contains(&raw.occupancy) {
        return Err(format!("occupancy out of [0,1]: {}", raw.occupancy));
    }
    Ok(Observation {
        sensor_id: raw.sensor_id.trim().to_string(),
        ts_unix: ts as u64,
        vehicle_count: raw.vehicle_count as u64,
        average_speed: raw.average_speed,
        occupancy: raw.occupancy,
        congestion_level: raw.congestion_level,
    })
}

/// Validate a batch; bad records are logged and counted, good ones pass.
pub fn sanitize_batch(raw: Vec<RawObservation>) -> (Vec<Observation>, usize) {
    ensure_metrics_described();
    let mut kept = Vec::with_capacity(raw.len());
    let mut skipped = 0usize;
    for r in raw {
        match validate_observation(&r) {
            Ok(obs) => kept.push(obs),
            Err(reason) => {
                skipped += 1;
                tracing::warn!(
                    target: "ingest",
                    sensor = %r.sensor_id,
                    %reason,
                    "skipping malformed observation"
                );
            }
        }
    }
    counter!("observations_accepted_total").increment(kept.len() as u64);
    counter!("observations_skipped_total").increment(skipped as u64);
    (kept, skipped)
}
