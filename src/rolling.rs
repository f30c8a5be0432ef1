//! # Rolling Window
//! Bounded per-(sensor, metric) history buffer backing every detector and
//! aggregator. Capacity-bounded FIFO: the oldest sample is evicted on
//! overflow, so memory stays fixed by construction.
//!
//! Ownership note: windows live inside `SensorState`, which is handed out
//! single-writer per sensor, so no interior locking is needed here.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Bounded recent-history buffer of `(unix_seconds, value)` samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingWindow {
    capacity: usize,
    buf: VecDeque<(u64, f64)>,
}

/// Mean/std snapshot over some slice of a window.
#[derive(Debug, Clone, Copy)]
pub struct WindowSummary {
    pub mean: f64,
    pub std: f64,
    pub count: usize,
}

impl RollingWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            buf: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Record a new sample; evicts the oldest entry on overflow.
    pub fn record(&mut self, ts_unix: u64, value: f64) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back((ts_unix, value));
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<(u64, f64)> {
        self.buf.back().copied()
    }

    /// Oldest sample not older than `span_secs` before `now`. Used by the
    /// sudden-stop detector as the "before" reference.
    pub fn earliest_within(&self, now: u64, span_secs: u64) -> Option<(u64, f64)> {
        let cutoff = now.saturating_sub(span_secs);
        self.buf.iter().find(|&&(t, _)| t >= cutoff).copied()
    }

    /// Values in insertion (chronological) order.
    pub fn values(&self) -> Vec<f64> {
        self.buf.iter().map(|&(_, v)| v).collect()
    }

    /// Up to the `n` most recent values, chronological order.
    pub fn tail_values(&self, n: usize) -> Vec<f64> {
        let skip = self.buf.len().saturating_sub(n);
        self.buf.iter().skip(skip).map(|&(_, v)| v).collect()
    }

    /// Mean/std over the whole buffer.
    pub fn summary(&self) -> Option<WindowSummary> {
        summarize(self.buf.iter().map(|&(_, v)| v))
    }

    /// Mean/std over everything but the newest sample. Detectors that
    /// standardize "now" against "recent past" use this so the tested
    /// sample does not drag its own baseline.
    pub fn summary_excluding_latest(&self) -> Option<WindowSummary> {
        let n = self.buf.len();
        if n < 2 {
            return None;
        }
        summarize(self.buf.iter().take(n - 1).map(|&(_, v)| v))
    }

    /// Linear-interpolated percentile (p in [0, 100]) over current values.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        let mut v = self.values();
        if v.is_empty() {
            return None;
        }
        v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        Some(percentile_sorted(&v, p))
    }
}

fn summarize(values: impl Iterator<Item = f64>) -> Option<WindowSummary> {
    let v: Vec<f64> = values.collect();
    if v.is_empty() {
        return None;
    }
    let n = v.len() as f64;
    let mean = v.iter().sum::<f64>() / n;
    let var = v.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    Some(WindowSummary { mean, std: var.sqrt(), count: v.len() })
}

/// Percentile over an already-sorted slice, linear interpolation between ranks.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}
