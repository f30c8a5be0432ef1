//! # Dedup / Cooldown Filter
//! Spatio-temporal suppression and rate limiting between the combiner and
//! accident emission. One real-world event should surface once per
//! cooldown period, no matter how many cycles keep re-detecting it.
//!
//! The table sits behind a single check-and-set entry point (`admit`) so
//! the concurrency model can change without touching detector logic.
//! Rejected candidates are dropped, never queued; a persisting condition
//! simply reappears on a later cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::config::DedupConfig;
use crate::types::{AccidentRecord, CombinedCandidate, GeoPoint};

const RATE_WINDOW_SECS: u64 = 3_600;
/// Emitted keys older than this cannot recur in a replay and are pruned.
const KEY_RETENTION_SECS: u64 = 24 * 3_600;
/// Dedup keys are truncated to this granularity, making retried emissions
/// idempotent downstream.
const KEY_TRUNCATION_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownEntry {
    pub sensor_id: String,
    pub last_alert_ts: u64,
    pub last_alert_location: Option<GeoPoint>,
}

/// Why a candidate was dropped. Informational only; rejections are normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    BelowConfidenceFloor,
    NoSeverity,
    Cooldown,
    MultiMethodRequired,
    SensorRateCeiling,
    GlobalRateCeiling,
    DuplicateKey,
}

#[derive(Debug)]
pub enum Admission {
    Accepted(AccidentRecord),
    Rejected(Rejection),
}

#[derive(Debug)]
pub struct DedupFilter {
    cfg: DedupConfig,
    entries: HashMap<String, CooldownEntry>,
    per_sensor_alerts: HashMap<String, VecDeque<u64>>,
    global_alerts: VecDeque<u64>,
    /// dedup key -> candidate timestamp, for replay idempotence.
    emitted_keys: HashMap<String, u64>,
}

/// Serializable view of the table for the durable snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CooldownSnapshot {
    pub entries: Vec<CooldownEntry>,
    pub emitted_keys: Vec<(String, u64)>,
}

pub fn dedup_key(sensor_id: &str, ts_unix: u64) -> String {
    format!("{}:{}", sensor_id, ts_unix - ts_unix % KEY_TRUNCATION_SECS)
}

impl DedupFilter {
    pub fn new(cfg: DedupConfig) -> Self {
        Self {
            cfg,
            entries: HashMap::new(),
            per_sensor_alerts: HashMap::new(),
            global_alerts: VecDeque::new(),
            emitted_keys: HashMap::new(),
        }
    }

    /// Check-and-set: run the suppression chain in order and, on
    /// acceptance, refresh the cooldown entry and rate counters and mint
    /// the record in one step.
    pub fn admit(&mut self, cand: &CombinedCandidate, now_unix: u64) -> Admission {
        if cand.confidence < self.cfg.min_confidence {
            return Admission::Rejected(Rejection::BelowConfidenceFloor);
        }
        let Some(severity) = cand.severity else {
            return Admission::Rejected(Rejection::NoSeverity);
        };

        if self.in_cooldown(cand, now_unix) {
            return Admission::Rejected(Rejection::Cooldown);
        }

        if self.cfg.require_multi_method && cand.contributing_methods.len() < 2 {
            return Admission::Rejected(Rejection::MultiMethodRequired);
        }

        self.prune(now_unix);
        let sensor_count = self
            .per_sensor_alerts
            .get(&cand.sensor_id)
            .map_or(0, |q| q.len());
        if sensor_count >= self.cfg.max_alerts_per_hour_sensor {
            return Admission::Rejected(Rejection::SensorRateCeiling);
        }
        if self.global_alerts.len() >= self.cfg.max_alerts_per_hour_global {
            return Admission::Rejected(Rejection::GlobalRateCeiling);
        }

        let key = dedup_key(&cand.sensor_id, cand.ts_unix);
        if self.emitted_keys.insert(key.clone(), cand.ts_unix).is_some() {
            // replayed batch after a crash-restart: same key, no new record
            return Admission::Rejected(Rejection::DuplicateKey);
        }

        self.entries.insert(
            cand.sensor_id.clone(),
            CooldownEntry {
                sensor_id: cand.sensor_id.clone(),
                last_alert_ts: now_unix,
                last_alert_location: cand.location,
            },
        );
        self.per_sensor_alerts
            .entry(cand.sensor_id.clone())
            .or_default()
            .push_back(now_unix);
        self.global_alerts.push_back(now_unix);

        Admission::Accepted(AccidentRecord {
            id: key,
            sensor_id: cand.sensor_id.clone(),
            location: cand.location,
            timestamp: DateTime::<Utc>::from_timestamp(cand.ts_unix as i64, 0)
                .unwrap_or_else(Utc::now),
            confidence: cand.confidence,
            severity,
            contributing_methods: cand
                .contributing_methods
                .iter()
                .map(|m| m.to_string())
                .collect(),
            resolved: false,
        })
    }

    /// Unexpired entry for this sensor, or for any sensor whose last alert
    /// sits within the spatial radius of this candidate.
    fn in_cooldown(&self, cand: &CombinedCandidate, now_unix: u64) -> bool {
        let fresh = |e: &CooldownEntry| now_unix.saturating_sub(e.last_alert_ts) < self.cfg.cooldown_secs;

        if let Some(e) = self.entries.get(&cand.sensor_id) {
            if fresh(e) {
                return true;
            }
        }
        if let Some(loc) = cand.location {
            for e in self.entries.values() {
                if e.sensor_id == cand.sensor_id {
                    continue;
                }
                if let Some(other) = e.last_alert_location {
                    if fresh(e) && loc.distance_m(&other) <= self.cfg.radius_m {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Drop expired cooldown entries and rate timestamps outside the hour
    /// window. Memory stays bounded by construction.
    pub fn prune(&mut self, now_unix: u64) {
        let cooldown = self.cfg.cooldown_secs;
        self.entries
            .retain(|_, e| now_unix.saturating_sub(e.last_alert_ts) < cooldown);
        let cutoff = now_unix.saturating_sub(RATE_WINDOW_SECS);
        for q in self.per_sensor_alerts.values_mut() {
            while q.front().is_some_and(|&t| t < cutoff) {
                q.pop_front();
            }
        }
        self.per_sensor_alerts.retain(|_, q| !q.is_empty());
        while self.global_alerts.front().is_some_and(|&t| t < cutoff) {
            self.global_alerts.pop_front();
        }
        let key_cutoff = now_unix.saturating_sub(KEY_RETENTION_SECS);
        self.emitted_keys.retain(|_, &mut ts| ts >= key_cutoff);
    }

    pub fn snapshot(&self) -> CooldownSnapshot {
        CooldownSnapshot {
            entries: self.entries.values().cloned().collect(),
            emitted_keys: self.emitted_keys.clone().into_iter().collect(),
        }
    }

    pub fn restore(&mut self, snap: &CooldownSnapshot) {
        self.entries = snap
            .entries
            .iter()
            .map(|e| (e.sensor_id.clone(), e.clone()))
            .collect();
        self.emitted_keys = snap.emitted_keys.iter().cloned().collect();
    }
}
