//! # Sensor State Store
//! Owns all per-sensor mutable state: rolling windows per metric plus
//! hour-of-week baselines. The store hands out one `Arc<Mutex<SensorState>>`
//! per sensor; only the task processing that sensor may hold it, so a
//! coarse per-sensor lock is all the synchronization needed.
//!
//! Also home of the versioned snapshot that lets the core resume after a
//! restart without reprocessing history.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::baseline::HourOfWeekBaseline;
use crate::config::AnalyticsConfig;
use crate::dedup::CooldownSnapshot;
use crate::pattern::AggregatorSnapshot;
use crate::rolling::RollingWindow;
use crate::types::{CongestionLevel, Metric, Observation};

pub const SNAPSHOT_VERSION: u32 = 1;

/// All mutable state for one sensor. Created lazily on first observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorState {
    pub sensor_id: String,
    pub windows: BTreeMap<Metric, RollingWindow>,
    pub baselines: BTreeMap<Metric, HourOfWeekBaseline>,
    pub last_congestion: Option<CongestionLevel>,
    pub last_ts_unix: Option<u64>,
}

impl SensorState {
    pub fn new(sensor_id: &str, cfg: &AnalyticsConfig) -> Self {
        let mut windows = BTreeMap::new();
        let mut baselines = BTreeMap::new();
        for m in Metric::ALL {
            windows.insert(m, RollingWindow::with_capacity(cfg.windows.rolling_capacity));
            baselines.insert(m, HourOfWeekBaseline::new(cfg.baseline.bucket_capacity));
        }
        Self {
            sensor_id: sensor_id.to_string(),
            windows,
            baselines,
            last_congestion: None,
            last_ts_unix: None,
        }
    }

    /// Fold one validated observation into the rolling windows.
    pub fn apply(&mut self, obs: &Observation) {
        for m in Metric::ALL {
            if let Some(w) = self.windows.get_mut(&m) {
                w.record(obs.ts_unix, m.value_of(obs));
            }
        }
        self.last_congestion = Some(obs.congestion_level);
        self.last_ts_unix = Some(obs.ts_unix);
    }

    pub fn window(&self, metric: Metric) -> &RollingWindow {
        // Every metric is seeded in `new`, so the lookup cannot miss.
        &self.windows[&metric]
    }

    pub fn baseline(&self, metric: Metric) -> &HourOfWeekBaseline {
        &self.baselines[&metric]
    }

    pub fn baseline_mut(&mut self, metric: Metric) -> &mut HourOfWeekBaseline {
        self.baselines.get_mut(&metric).expect("baselines seeded for all metrics")
    }
}

/// Thread-safe registry of sensor states, keyed by sensor id.
#[derive(Debug)]
pub struct SensorStore {
    inner: Mutex<HashMap<String, Arc<Mutex<SensorState>>>>,
}

impl SensorStore {
    pub fn new() -> Self {
        Self { inner: Mutex::new(HashMap::new()) }
    }

    /// Exclusive handle for a sensor, creating fresh state on first sight.
    pub fn handle(&self, sensor_id: &str, cfg: &AnalyticsConfig) -> Arc<Mutex<SensorState>> {
        let mut map = self.inner.lock().expect("sensor store mutex poisoned");
        map.entry(sensor_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(SensorState::new(sensor_id, cfg))))
            .clone()
    }

    /// Handles for all known sensors, id-sorted for deterministic cycles.
    pub fn all_handles(&self) -> Vec<(String, Arc<Mutex<SensorState>>)> {
        let map = self.inner.lock().expect("sensor store mutex poisoned");
        let mut v: Vec<_> = map.iter().map(|(k, s)| (k.clone(), s.clone())).collect();
        v.sort_by(|a, b| a.0.cmp(&b.0));
        v
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("sensor store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn export(&self) -> BTreeMap<String, SensorState> {
        let map = self.inner.lock().expect("sensor store mutex poisoned");
        map.iter()
            .map(|(k, s)| (k.clone(), s.lock().expect("sensor mutex poisoned").clone()))
            .collect()
    }

    fn import(&self, sensors: BTreeMap<String, SensorState>) {
        let mut map = self.inner.lock().expect("sensor store mutex poisoned");
        map.clear();
        for (k, s) in sensors {
            map.insert(k, Arc::new(Mutex::new(s)));
        }
    }
}

impl Default for SensorStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Durable snapshot: rolling buffers, cooldown table, baselines and
/// aggregator watermarks. Format is versioned; an unknown version is
/// rejected at load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub sensors: BTreeMap<String, SensorState>,
    pub cooldowns: CooldownSnapshot,
    pub aggregator: AggregatorSnapshot,
}

impl Snapshot {
    pub fn capture(
        store: &SensorStore,
        cooldowns: CooldownSnapshot,
        aggregator: AggregatorSnapshot,
    ) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            sensors: store.export(),
            cooldowns,
            aggregator,
        }
    }

    pub fn restore_sensors(&self, store: &SensorStore) {
        store.import(self.sensors.clone());
    }
}

/// Write the snapshot as pretty JSON, creating parent dirs as needed.
pub async fn save_snapshot(path: &Path, snap: &Snapshot) -> Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating snapshot dir {}", dir.display()))?;
    }
    let bytes = serde_json::to_vec_pretty(snap).context("serializing snapshot")?;
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("writing snapshot to {}", path.display()))?;
    Ok(())
}

/// Read a snapshot back; missing file is `Ok(None)` (fresh start), an
/// unreadable file or version mismatch is an error for the caller to log.
pub async fn load_snapshot(path: &Path) -> Result<Option<Snapshot>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("reading snapshot {}", path.display())),
    };
    let snap: Snapshot = serde_json::from_str(&content).context("parsing snapshot JSON")?;
    if snap.version != SNAPSHOT_VERSION {
        bail!("unsupported snapshot version {} (expected {})", snap.version, SNAPSHOT_VERSION);
    }
    Ok(Some(snap))
}
