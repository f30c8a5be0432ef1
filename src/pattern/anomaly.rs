//! Anomaly flagger over closed pattern windows. The window's mean is
//! standardized against the hour-of-week baseline for the same
//! (sensor, metric) pair; deployments pick exactly one of two methods:
//! z-score against the bucket, or the Tukey fence [Q1 - k*IQR, Q3 + k*IQR].

use crate::baseline::HourOfWeekBaseline;
use crate::config::{AnomalyConfig, AnomalyMethod};
use crate::types::{AnomalyEvent, PatternWindow};

pub struct AnomalyFlagger {
    cfg: AnomalyConfig,
}

impl AnomalyFlagger {
    pub fn new(cfg: AnomalyConfig) -> Self {
        Self { cfg }
    }

    /// Run the active method for one closed window. `None` means either
    /// "looks normal" or "not enough baseline yet"; neither is an error.
    pub fn flag(&self, window: &PatternWindow, baseline: &HourOfWeekBaseline) -> Option<AnomalyEvent> {
        match self.cfg.method {
            AnomalyMethod::ZScore => self.flag_z_score(window, baseline),
            AnomalyMethod::Iqr => self.flag_iqr(window, baseline),
        }
    }

    pub fn flag_z_score(
        &self,
        window: &PatternWindow,
        baseline: &HourOfWeekBaseline,
    ) -> Option<AnomalyEvent> {
        let value = window.statistics.mean;
        let z = baseline.z_score(window.start_unix, value, self.cfg.min_history)?;
        if z.abs() <= self.cfg.z_threshold {
            return None;
        }
        Some(AnomalyEvent {
            sensor_id: window.sensor_id.clone(),
            metric: window.metric,
            ts_unix: window.end_unix,
            z_score: z,
            value,
        })
    }

    pub fn flag_iqr(
        &self,
        window: &PatternWindow,
        baseline: &HourOfWeekBaseline,
    ) -> Option<AnomalyEvent> {
        if baseline.bucket_len(window.start_unix) < self.cfg.min_history {
            return None;
        }
        let value = window.statistics.mean;
        let (q1, q3) = baseline.quartiles(window.start_unix)?;
        let iqr = q3 - q1;
        let (lo, hi) = (q1 - self.cfg.iqr_k * iqr, q3 + self.cfg.iqr_k * iqr);
        if value >= lo && value <= hi {
            return None;
        }
        // report the z-score alongside, even under the fence method
        let z = baseline
            .z_score(window.start_unix, value, self.cfg.min_history)
            .unwrap_or(0.0);
        Some(AnomalyEvent {
            sensor_id: window.sensor_id.clone(),
            metric: window.metric,
            ts_unix: window.end_unix,
            z_score: z,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Metric, WindowStats, WindowType};

    fn window(mean: f64, start: u64) -> PatternWindow {
        PatternWindow {
            sensor_id: "s1".into(),
            metric: Metric::VehicleCount,
            window_type: WindowType::Hour,
            start_unix: start,
            end_unix: start + 3_600,
            sample_count: 12,
            statistics: WindowStats {
                mean,
                median: mean,
                std: 1.0,
                min: mean - 2.0,
                max: mean + 2.0,
                p25: mean - 1.0,
                p75: mean + 1.0,
                p95: mean + 2.0,
            },
        }
    }

    fn seeded_baseline(values: &[f64], start: u64) -> HourOfWeekBaseline {
        let mut b = HourOfWeekBaseline::new(16);
        for (i, v) in values.iter().enumerate() {
            b.record(start + i as u64 * 7 * 86_400, *v);
        }
        b
    }

    fn flagger(method: AnomalyMethod) -> AnomalyFlagger {
        AnomalyFlagger::new(AnomalyConfig { method, ..AnomalyConfig::default() })
    }

    const START: u64 = 1_700_000_000 - 1_700_000_000 % 3_600;

    #[test]
    fn z_score_method_flags_extreme_window() {
        let b = seeded_baseline(&[10.0, 11.0, 9.0, 10.5, 9.5], START);
        let ev = flagger(AnomalyMethod::ZScore)
            .flag(&window(30.0, START), &b)
            .expect("should flag");
        assert!(ev.z_score > 3.0);
        assert_eq!(ev.value, 30.0);
    }

    #[test]
    fn z_score_method_quiet_on_normal_window() {
        let b = seeded_baseline(&[10.0, 11.0, 9.0, 10.5, 9.5], START);
        assert!(flagger(AnomalyMethod::ZScore).flag(&window(10.2, START), &b).is_none());
    }

    #[test]
    fn z_score_method_quiet_without_history() {
        let b = seeded_baseline(&[10.0, 11.0], START);
        assert!(flagger(AnomalyMethod::ZScore).flag(&window(30.0, START), &b).is_none());
    }

    #[test]
    fn iqr_method_flags_outside_fence() {
        let b = seeded_baseline(&[8.0, 9.0, 10.0, 11.0, 12.0], START);
        // Q1=9, Q3=11, fence at k=1.5 => [6, 14]
        let f = flagger(AnomalyMethod::Iqr);
        assert!(f.flag(&window(20.0, START), &b).is_some());
        assert!(f.flag(&window(5.0, START), &b).is_some());
        assert!(f.flag(&window(13.0, START), &b).is_none());
    }

    #[test]
    fn methods_are_independent() {
        // heavy-tailed baseline: the outlier inflates sigma so the z method
        // stays quiet, while the collapsed IQR fence still flags
        let b = seeded_baseline(&[0.0, 0.0, 0.0, 0.0, 0.0, 100.0], START);
        let v = window(50.0, START);
        assert!(flagger(AnomalyMethod::ZScore).flag(&v, &b).is_none());
        assert!(flagger(AnomalyMethod::Iqr).flag(&v, &b).is_some());
    }
}
