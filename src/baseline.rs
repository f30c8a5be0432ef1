//! # Hour-of-Week Baselines
//! Longer-horizon "what is normal for this sensor at this time" statistic:
//! 168 buckets (Mon 00:00 .. Sun 23:00), each holding a bounded history of
//! hourly means. Feeds the pattern-anomaly detector and the anomaly
//! flagger; both treat a short bucket as "no baseline yet" and stay quiet.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::rolling::percentile_sorted;

pub const BUCKETS_PER_WEEK: usize = 168;

/// Bucket index for a unix timestamp: 0 = Monday 00:00 UTC.
pub fn hour_of_week(ts_unix: u64) -> usize {
    // Unix epoch fell on a Thursday; shift so Monday 00:00 maps to 0.
    ((ts_unix / 3_600 + 72) % BUCKETS_PER_WEEK as u64) as usize
}

#[derive(Debug, Clone, Copy)]
pub struct BucketStats {
    pub mean: f64,
    pub std: f64,
    pub count: usize,
}

/// Bounded per-bucket history. Buckets are stored sparsely; an absent
/// bucket is simply "no history".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourOfWeekBaseline {
    bucket_capacity: usize,
    buckets: BTreeMap<usize, VecDeque<f64>>,
}

impl HourOfWeekBaseline {
    pub fn new(bucket_capacity: usize) -> Self {
        Self {
            bucket_capacity: bucket_capacity.max(1),
            buckets: BTreeMap::new(),
        }
    }

    /// Record one hourly representative value for the bucket containing
    /// `ts_unix`. Oldest value falls out once the bucket is full.
    pub fn record(&mut self, ts_unix: u64, value: f64) {
        let b = self
            .buckets
            .entry(hour_of_week(ts_unix))
            .or_insert_with(|| VecDeque::with_capacity(self.bucket_capacity));
        if b.len() == self.bucket_capacity {
            b.pop_front();
        }
        b.push_back(value);
    }

    pub fn bucket_len(&self, ts_unix: u64) -> usize {
        self.buckets
            .get(&hour_of_week(ts_unix))
            .map_or(0, |b| b.len())
    }

    /// Mean/std of the bucket containing `ts_unix`, or None when empty.
    pub fn stats(&self, ts_unix: u64) -> Option<BucketStats> {
        let b = self.buckets.get(&hour_of_week(ts_unix))?;
        if b.is_empty() {
            return None;
        }
        let n = b.len() as f64;
        let mean = b.iter().sum::<f64>() / n;
        let var = b.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        Some(BucketStats { mean, std: var.sqrt(), count: b.len() })
    }

    /// (Q1, Q3) of the bucket containing `ts_unix`, for the IQR fence.
    pub fn quartiles(&self, ts_unix: u64) -> Option<(f64, f64)> {
        let b = self.buckets.get(&hour_of_week(ts_unix))?;
        if b.is_empty() {
            return None;
        }
        let mut v: Vec<f64> = b.iter().copied().collect();
        v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        Some((percentile_sorted(&v, 25.0), percentile_sorted(&v, 75.0)))
    }

    /// Z-score of `value` against its bucket, or None when the bucket has
    /// fewer than `min_history` samples or zero spread.
    pub fn z_score(&self, ts_unix: u64, value: f64, min_history: usize) -> Option<f64> {
        let s = self.stats(ts_unix)?;
        if s.count < min_history || s.std <= f64::EPSILON {
            return None;
        }
        Some((value - s.mean) / s.std)
    }
}
