//! # Pattern Aggregator
//! Multi-granularity (hour/day/week) statistical summarizer per sensor and
//! metric. Samples accumulate into the currently open, time-aligned window;
//! when its span elapses the window closes, the statistics bundle is
//! computed, and the next window opens.
//!
//! A window is only emitted once its sample count reaches the granularity's
//! configured minimum — below that it stays Insufficient and is silently
//! skipped, which is a normal state, not a failure. A per-key watermark of
//! the last closed window start makes replays idempotent: late or repeated
//! samples for an already-closed period are dropped.

pub mod anomaly;

pub use anomaly::AnomalyFlagger;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::AnalyticsConfig;
use crate::rolling::percentile_sorted;
use crate::types::{Metric, Observation, PatternWindow, WindowStats, WindowType};

/// Lifecycle of one window instance; forward-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPhase {
    Insufficient,
    Ready,
}

type Key = (String, Metric, WindowType);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenWindow {
    start_unix: u64,
    samples: Vec<f64>,
}

#[derive(Debug)]
pub struct PatternAggregator {
    min_samples: [(WindowType, usize); 3],
    open: HashMap<Key, OpenWindow>,
    /// Start of the last closed window per key; anything at or before this
    /// is already accounted for.
    last_closed: HashMap<Key, u64>,
}

/// Serializable aggregator state for the durable snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregatorSnapshot {
    pub open: Vec<(String, Metric, WindowType, u64, Vec<f64>)>,
    pub watermarks: Vec<(String, Metric, WindowType, u64)>,
}

fn align(ts_unix: u64, wt: WindowType) -> u64 {
    ts_unix - ts_unix % wt.span_secs()
}

impl PatternAggregator {
    pub fn new(cfg: &AnalyticsConfig) -> Self {
        Self {
            min_samples: [
                (WindowType::Hour, cfg.windows.hour_min_samples),
                (WindowType::Day, cfg.windows.day_min_samples),
                (WindowType::Week, cfg.windows.week_min_samples),
            ],
            open: HashMap::new(),
            last_closed: HashMap::new(),
        }
    }

    fn min_for(&self, wt: WindowType) -> usize {
        self.min_samples
            .iter()
            .find(|(t, _)| *t == wt)
            .map(|(_, m)| *m)
            .unwrap_or(1)
    }

    /// Fold one observation into every (metric, granularity) pair. Returns
    /// windows that closed as a side effect and met their minimum.
    pub fn observe(&mut self, obs: &Observation) -> Vec<PatternWindow> {
        let mut closed = Vec::new();
        for metric in Metric::ALL {
            let value = metric.value_of(obs);
            for wt in WindowType::ALL {
                let key = (obs.sensor_id.clone(), metric, wt);
                let start = align(obs.ts_unix, wt);

                if self.last_closed.get(&key).is_some_and(|&w| start <= w) {
                    // replayed or late sample for an already-closed period
                    continue;
                }

                // span elapsed: close the old window before opening the new one
                let rollover = self.open.get(&key).is_some_and(|w| w.start_unix != start);
                if rollover {
                    if let Some(pw) = self.close(&key) {
                        closed.push(pw);
                    }
                }
                self.open
                    .entry(key)
                    .or_insert_with(|| OpenWindow { start_unix: start, samples: Vec::new() })
                    .samples
                    .push(value);
            }
        }
        closed
    }

    /// Close every open window whose span has fully elapsed by `now`.
    /// Called on the coarse pattern cycle so quiet sensors still close.
    pub fn flush_due(&mut self, now_unix: u64) -> Vec<PatternWindow> {
        let due: Vec<Key> = self
            .open
            .iter()
            .filter(|((_, _, wt), w)| w.start_unix + wt.span_secs() <= now_unix)
            .map(|(k, _)| k.clone())
            .collect();
        let mut closed = Vec::new();
        for key in due {
            if let Some(pw) = self.close(&key) {
                closed.push(pw);
            }
        }
        closed
    }

    /// Current phase of the open window for a key, if any.
    pub fn phase(&self, sensor_id: &str, metric: Metric, wt: WindowType) -> Option<WindowPhase> {
        let key = (sensor_id.to_string(), metric, wt);
        self.open.get(&key).map(|w| {
            if w.samples.len() >= self.min_for(wt) {
                WindowPhase::Ready
            } else {
                WindowPhase::Insufficient
            }
        })
    }

    /// Close and advance the watermark; emit only if the minimum was met.
    fn close(&mut self, key: &Key) -> Option<PatternWindow> {
        let w = self.open.remove(key)?;
        let (sensor_id, metric, wt) = key.clone();
        self.last_closed.insert(key.clone(), w.start_unix);

        if w.samples.len() < self.min_for(wt) {
            metrics::counter!("pattern_windows_skipped_total").increment(1);
            tracing::debug!(
                sensor = %sensor_id,
                metric = metric.as_str(),
                window = wt.as_str(),
                samples = w.samples.len(),
                "window closed below minimum, skipped"
            );
            return None;
        }

        Some(PatternWindow {
            sensor_id,
            metric,
            window_type: wt,
            start_unix: w.start_unix,
            end_unix: w.start_unix + wt.span_secs(),
            sample_count: w.samples.len(),
            statistics: compute_stats(&w.samples),
        })
    }

    pub fn snapshot(&self) -> AggregatorSnapshot {
        AggregatorSnapshot {
            open: self
                .open
                .iter()
                .map(|((s, m, wt), w)| (s.clone(), *m, *wt, w.start_unix, w.samples.clone()))
                .collect(),
            watermarks: self
                .last_closed
                .iter()
                .map(|((s, m, wt), start)| (s.clone(), *m, *wt, *start))
                .collect(),
        }
    }

    pub fn restore(&mut self, snap: &AggregatorSnapshot) {
        self.open = snap
            .open
            .iter()
            .map(|(s, m, wt, start, samples)| {
                (
                    (s.clone(), *m, *wt),
                    OpenWindow { start_unix: *start, samples: samples.clone() },
                )
            })
            .collect();
        self.last_closed = snap
            .watermarks
            .iter()
            .map(|(s, m, wt, start)| ((s.clone(), *m, *wt), *start))
            .collect();
    }
}

fn compute_stats(samples: &[f64]) -> WindowStats {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len() as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let var = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    WindowStats {
        mean,
        median: percentile_sorted(&sorted, 50.0),
        std: var.sqrt(),
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        p25: percentile_sorted(&sorted, 25.0),
        p75: percentile_sorted(&sorted, 75.0),
        p95: percentile_sorted(&sorted, 95.0),
    }
}
