//! # Analytics Engine
//! Wires the whole core together: observation intake, the accident path
//! (ensemble -> combiner -> dedup filter -> emission) and the pattern path
//! (aggregator -> anomaly flagger -> forecast ensemble -> emission).
//!
//! Sensors carry no cross-sensor dependencies, so the accident cycle fans
//! out one task per sensor; each task only ever locks its own sensor's
//! state. Admission through the shared cooldown table happens afterwards
//! on the cycle task, keeping the check-and-set sequential and
//! deterministic.

use anyhow::{Context, Result};
use metrics::{counter, gauge};
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;

use crate::config::AnalyticsConfig;
use crate::dedup::{Admission, DedupFilter};
use crate::detect::Combiner;
use crate::forecast::ForecastEnsemble;
use crate::history::EmissionLog;
use crate::ingest::{sanitize_batch, IngestSummary};
use crate::pattern::{AnomalyFlagger, PatternAggregator};
use crate::publish::{RecordPublisher, TracingPublisher};
use crate::state::{SensorStore, Snapshot};
use crate::types::{
    AccidentRecord, CombinedCandidate, Horizon, PatternReport, PatternWindow, RawObservation,
    WindowType,
};

const EMISSION_LOG_CAP: usize = 2_000;

pub struct AnalyticsEngine {
    cfg: AnalyticsConfig,
    store: SensorStore,
    combiner: Arc<Combiner>,
    dedup: Mutex<DedupFilter>,
    aggregator: Mutex<PatternAggregator>,
    flagger: AnomalyFlagger,
    forecaster: ForecastEnsemble,
    accidents: EmissionLog<AccidentRecord>,
    patterns: EmissionLog<PatternReport>,
    publisher: Arc<dyn RecordPublisher>,
}

impl AnalyticsEngine {
    /// Validates configuration up front; an inconsistent config refuses to
    /// construct rather than misbehave later.
    pub fn new(cfg: AnalyticsConfig) -> Result<Self> {
        Self::with_publisher(cfg, Arc::new(TracingPublisher))
    }

    pub fn with_publisher(cfg: AnalyticsConfig, publisher: Arc<dyn RecordPublisher>) -> Result<Self> {
        cfg.validate().context("analytics configuration rejected")?;
        crate::ingest::ensure_metrics_described();
        Ok(Self {
            combiner: Arc::new(Combiner::new(&cfg)),
            dedup: Mutex::new(DedupFilter::new(cfg.dedup)),
            aggregator: Mutex::new(PatternAggregator::new(&cfg)),
            flagger: AnomalyFlagger::new(cfg.anomaly),
            forecaster: ForecastEnsemble::new(&cfg.forecast),
            store: SensorStore::new(),
            accidents: EmissionLog::with_capacity(EMISSION_LOG_CAP),
            patterns: EmissionLog::with_capacity(EMISSION_LOG_CAP),
            publisher,
            cfg,
        })
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.cfg
    }

    /// Push a batch of raw observations into the core. Malformed records
    /// are skipped; windows that close as a side effect flow straight
    /// through the pattern path.
    pub async fn ingest_batch(&self, raw: Vec<RawObservation>) -> IngestSummary {
        let (observations, skipped) = sanitize_batch(raw);
        let accepted = observations.len();

        let mut closed = Vec::new();
        for obs in &observations {
            let handle = self.store.handle(&obs.sensor_id, &self.cfg);
            handle.lock().expect("sensor mutex poisoned").apply(obs);
            closed.extend(
                self.aggregator
                    .lock()
                    .expect("aggregator mutex poisoned")
                    .observe(obs),
            );
        }
        if !closed.is_empty() {
            self.process_closed_windows(closed).await;
        }

        IngestSummary { accepted, skipped }
    }

    /// Short-cycle accident path. Evaluates the ensemble for every known
    /// sensor concurrently, then admits candidates through the dedup
    /// filter in sensor-id order.
    pub async fn run_accident_cycle(&self, now_unix: u64) -> Vec<AccidentRecord> {
        let mut set: JoinSet<CombinedCandidate> = JoinSet::new();
        for (sensor_id, handle) in self.store.all_handles() {
            let combiner = self.combiner.clone();
            let location = self.cfg.location_of(&sensor_id);
            set.spawn(async move {
                let state = handle.lock().expect("sensor mutex poisoned");
                let (_, combined) = combiner.evaluate(&state, now_unix, location);
                combined
            });
        }

        let mut candidates = Vec::new();
        while let Some(res) = set.join_next().await {
            match res {
                Ok(c) => candidates.push(c),
                Err(e) => tracing::error!(error = %e, "sensor evaluation task failed"),
            }
        }
        candidates.sort_by(|a, b| a.sensor_id.cmp(&b.sensor_id));

        let mut emitted = Vec::new();
        for cand in candidates {
            if cand.confidence <= 0.0 {
                continue;
            }
            let admission = {
                let mut filter = self.dedup.lock().expect("dedup mutex poisoned");
                filter.admit(&cand, now_unix)
            };
            match admission {
                Admission::Accepted(record) => {
                    counter!("accidents_emitted_total").increment(1);
                    if let Err(e) = self.publisher.publish_accident(&record).await {
                        tracing::warn!(
                            publisher = self.publisher.name(),
                            error = %e,
                            "accident publish failed; record stays in the emission log"
                        );
                    }
                    self.accidents.push(record.clone());
                    emitted.push(record);
                }
                Admission::Rejected(reason) => {
                    counter!("accidents_suppressed_total").increment(1);
                    tracing::debug!(sensor = %cand.sensor_id, ?reason, "candidate suppressed");
                }
            }
        }

        self.dedup.lock().expect("dedup mutex poisoned").prune(now_unix);
        gauge!("accident_cycle_last_run_ts").set(now_unix as f64);
        emitted
    }

    /// Coarse-cycle pattern path: close windows whose span elapsed even on
    /// quiet sensors, then flag anomalies and forecast.
    pub async fn run_pattern_cycle(&self, now_unix: u64) -> Vec<PatternReport> {
        let closed = self
            .aggregator
            .lock()
            .expect("aggregator mutex poisoned")
            .flush_due(now_unix);
        let reports = self.process_closed_windows(closed).await;
        gauge!("pattern_cycle_last_run_ts").set(now_unix as f64);
        reports
    }

    async fn process_closed_windows(&self, closed: Vec<PatternWindow>) -> Vec<PatternReport> {
        let mut reports = Vec::with_capacity(closed.len());
        for window in closed {
            let handle = self.store.handle(&window.sensor_id, &self.cfg);

            let (anomalies, forecasts) = {
                let mut state = handle.lock().expect("sensor mutex poisoned");

                // flag against history first, then fold this window into it
                let anomaly = self.flagger.flag(&window, state.baseline(window.metric));
                if window.window_type == WindowType::Hour {
                    state
                        .baseline_mut(window.metric)
                        .record(window.start_unix, window.statistics.mean);
                }

                let mut forecasts = Vec::new();
                for horizon in Horizon::ALL {
                    let history = state
                        .window(window.metric)
                        .tail_values(self.cfg.history_for(horizon));
                    if let Some(f) = self.forecaster.forecast(
                        &window.sensor_id,
                        window.metric,
                        horizon,
                        &history,
                    ) {
                        forecasts.push(f);
                    }
                }
                (anomaly.into_iter().collect::<Vec<_>>(), forecasts)
            };

            counter!("pattern_windows_emitted_total").increment(1);
            counter!("anomalies_flagged_total").increment(anomalies.len() as u64);
            counter!("forecasts_produced_total").increment(forecasts.len() as u64);

            let report = PatternReport { window, anomalies, forecasts };
            if let Err(e) = self.publisher.publish_pattern(&report).await {
                tracing::warn!(
                    publisher = self.publisher.name(),
                    error = %e,
                    "pattern publish failed; report stays in the emission log"
                );
            }
            self.patterns.push(report.clone());
            reports.push(report);
        }
        reports
    }

    pub fn recent_accidents(&self, n: usize) -> Vec<AccidentRecord> {
        self.accidents.snapshot_last_n(n)
    }

    pub fn recent_patterns(&self, n: usize) -> Vec<PatternReport> {
        self.patterns.snapshot_last_n(n)
    }

    pub fn sensor_count(&self) -> usize {
        self.store.len()
    }

    /// Capture everything needed to resume without reprocessing history.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(
            &self.store,
            self.dedup.lock().expect("dedup mutex poisoned").snapshot(),
            self.aggregator.lock().expect("aggregator mutex poisoned").snapshot(),
        )
    }

    pub fn restore(&self, snap: &Snapshot) {
        snap.restore_sensors(&self.store);
        self.dedup
            .lock()
            .expect("dedup mutex poisoned")
            .restore(&snap.cooldowns);
        self.aggregator
            .lock()
            .expect("aggregator mutex poisoned")
            .restore(&snap.aggregator);
        tracing::info!(
            sensors = self.store.len(),
            saved_at = %snap.saved_at,
            "state restored from snapshot"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CongestionLevel, Metric};
    use chrono::{DateTime, Utc};

    fn raw(sensor: &str, ts: u64, speed: f64, occ: f64) -> RawObservation {
        RawObservation {
            sensor_id: sensor.into(),
            timestamp: DateTime::<Utc>::from_timestamp(ts as i64, 0).unwrap(),
            vehicle_count: 10,
            average_speed: speed,
            occupancy: occ,
            congestion_level: CongestionLevel::Light,
        }
    }

    fn crash_config() -> AnalyticsConfig {
        let mut cfg = AnalyticsConfig::default();
        cfg.detectors.occupancy_spike.min_baseline_samples = 4;
        cfg
    }

    #[tokio::test]
    async fn crash_pattern_emits_one_accident() {
        let engine = AnalyticsEngine::new(crash_config()).unwrap();
        let base = 1_000_000u64;
        let speeds = [50.0, 52.0, 49.0, 51.0, 8.0];
        for (i, s) in speeds.iter().enumerate() {
            let occ = if i == 4 { 0.9 } else { 0.2 };
            engine
                .ingest_batch(vec![raw("s1", base + i as u64 * 10, *s, occ)])
                .await;
        }
        let now = base + 40;
        let emitted = engine.run_accident_cycle(now).await;
        assert_eq!(emitted.len(), 1);
        let rec = &emitted[0];
        assert!(rec.confidence > 0.6);
        assert!(rec.contributing_methods.iter().any(|m| m == "speed_variance"));
        assert!(rec.contributing_methods.iter().any(|m| m == "sudden_stop"));

        // same cycle re-run: suppressed by cooldown
        let again = engine.run_accident_cycle(now + 60).await;
        assert!(again.is_empty());
        assert_eq!(engine.recent_accidents(10).len(), 1);
    }

    #[tokio::test]
    async fn quiet_sensor_emits_nothing() {
        let engine = AnalyticsEngine::new(AnalyticsConfig::default()).unwrap();
        let base = 1_000_000u64;
        for i in 0..10u64 {
            engine
                .ingest_batch(vec![raw("s1", base + i * 30, 50.0, 0.2)])
                .await;
        }
        let emitted = engine.run_accident_cycle(base + 300).await;
        assert!(emitted.is_empty());
    }

    #[tokio::test]
    async fn malformed_records_are_counted_not_fatal() {
        let engine = AnalyticsEngine::new(AnalyticsConfig::default()).unwrap();
        let base = 1_000_000u64;
        let mut bad = raw("s2", base, 50.0, 0.2);
        bad.occupancy = 7.0;
        let summary = engine
            .ingest_batch(vec![raw("s1", base, 50.0, 0.2), bad])
            .await;
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(engine.sensor_count(), 1);
    }

    #[tokio::test]
    async fn pattern_cycle_reports_ready_windows() {
        let engine = AnalyticsEngine::new(AnalyticsConfig::default()).unwrap();
        let start = 3_600_000u64; // hour-aligned
        for i in 0..12u64 {
            engine
                .ingest_batch(vec![raw("s1", start + i * 300, 50.0, 0.2)])
                .await;
        }
        let reports = engine.run_pattern_cycle(start + 3_600).await;
        assert!(reports
            .iter()
            .any(|r| r.window.metric == Metric::AverageSpeed && r.window.sample_count == 12));
        assert_eq!(engine.recent_patterns(100).len(), reports.len());
    }

    #[tokio::test]
    async fn invalid_config_refuses_to_build() {
        let mut cfg = AnalyticsConfig::default();
        cfg.detectors.weights.sudden_stop = 0.9;
        assert!(AnalyticsEngine::new(cfg).is_err());
    }

    #[tokio::test]
    async fn snapshot_restore_keeps_dedup_state() {
        let engine = AnalyticsEngine::new(crash_config()).unwrap();
        let base = 1_000_000u64;
        let speeds = [50.0, 52.0, 49.0, 51.0, 8.0];
        for (i, s) in speeds.iter().enumerate() {
            let occ = if i == 4 { 0.9 } else { 0.2 };
            engine
                .ingest_batch(vec![raw("s1", base + i as u64 * 10, *s, occ)])
                .await;
        }
        let now = base + 40;
        assert_eq!(engine.run_accident_cycle(now).await.len(), 1);
        let snap = engine.snapshot();

        // restart: fresh engine, restored state, same cycle re-run
        let engine2 = AnalyticsEngine::new(crash_config()).unwrap();
        engine2.restore(&snap);
        let replay = engine2.run_accident_cycle(now).await;
        assert!(replay.is_empty(), "replay after restore must not duplicate");
    }
}
