//! The four point-forecast methods. Each is a pure function of a
//! chronological history slice (oldest first) returning `None` when there
//! is not enough data yet — silence, not an error.

/// Uniform forecasting capability so the blender can iterate methods
/// polymorphically.
pub trait ForecastMethod: Send + Sync {
    fn name(&self) -> &'static str;

    /// Point prediction for the next period, or `None` on short history.
    fn predict(&self, history: &[f64]) -> Option<f64>;
}

/// Arithmetic mean of the last `window` samples.
pub struct MovingAverage {
    pub window: usize,
}

impl ForecastMethod for MovingAverage {
    fn name(&self) -> &'static str {
        "moving_average"
    }

    fn predict(&self, history: &[f64]) -> Option<f64> {
        if history.len() < self.window || self.window == 0 {
            return None;
        }
        let tail = &history[history.len() - self.window..];
        Some(tail.iter().sum::<f64>() / tail.len() as f64)
    }
}

/// Single-parameter exponential smoothing; the smoothed level after the
/// last sample is the next-period forecast.
pub struct ExponentialSmoothing {
    pub alpha: f64,
}

impl ForecastMethod for ExponentialSmoothing {
    fn name(&self) -> &'static str {
        "exponential_smoothing"
    }

    fn predict(&self, history: &[f64]) -> Option<f64> {
        let (first, rest) = history.split_first()?;
        if rest.is_empty() {
            return None;
        }
        let mut level = *first;
        for &x in rest {
            level = self.alpha * x + (1.0 - self.alpha) * level;
        }
        Some(level)
    }
}

/// Fixed weight vector over the most recent samples, most-recent-heaviest.
/// The configured weights need not sum to 1; the result is normalized by
/// their sum here.
pub struct WeightedMovingAverage {
    pub weights: Vec<f64>,
}

impl ForecastMethod for WeightedMovingAverage {
    fn name(&self) -> &'static str {
        "weighted_moving_average"
    }

    fn predict(&self, history: &[f64]) -> Option<f64> {
        let n = self.weights.len();
        if n == 0 || history.len() < n {
            return None;
        }
        let mass: f64 = self.weights.iter().sum();
        if mass <= f64::EPSILON {
            return None;
        }
        let acc: f64 = self
            .weights
            .iter()
            .enumerate()
            .map(|(i, w)| w * history[history.len() - 1 - i])
            .sum();
        Some(acc / mass)
    }
}

/// Low-order autoregressive integrated method, order (1,1,1): first
/// difference the series, estimate the AR coefficient from the lag-1
/// autocorrelation of the differences and the MA coefficient from the
/// lag-1 autocorrelation of the one-step residuals, then integrate the
/// forecast difference back.
pub struct ArimaMethod {
    /// Minimum history before a fit is attempted.
    pub min_history: usize,
}

impl Default for ArimaMethod {
    fn default() -> Self {
        Self { min_history: 4 }
    }
}

fn lag1_autocorr(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let mean = xs.iter().sum::<f64>() / xs.len() as f64;
    let denom: f64 = xs.iter().map(|x| (x - mean).powi(2)).sum();
    if denom <= f64::EPSILON {
        return 0.0;
    }
    let num: f64 = xs.windows(2).map(|w| (w[0] - mean) * (w[1] - mean)).sum();
    (num / denom).clamp(-1.0, 1.0)
}

impl ForecastMethod for ArimaMethod {
    fn name(&self) -> &'static str {
        "arima"
    }

    fn predict(&self, history: &[f64]) -> Option<f64> {
        if history.len() < self.min_history.max(3) {
            return None;
        }
        let diffs: Vec<f64> = history.windows(2).map(|w| w[1] - w[0]).collect();
        let mean_d = diffs.iter().sum::<f64>() / diffs.len() as f64;
        let phi = lag1_autocorr(&diffs);

        // one-step residuals of the AR(1)-with-drift part
        let residuals: Vec<f64> = diffs
            .windows(2)
            .map(|w| (w[1] - mean_d) - phi * (w[0] - mean_d))
            .collect();
        let theta = lag1_autocorr(&residuals);

        let last = *history.last()?;
        let last_diff = *diffs.last()?;
        let last_resid = residuals.last().copied().unwrap_or(0.0);
        let next_diff = mean_d + phi * (last_diff - mean_d) + theta * last_resid;
        Some(last + next_diff)
    }
}
