//! Online occupancy forecasting.
//!
//! An additive Holt-Winters model (level + trend + minute-of-hour seasonal
//! vector) extended with an exogenous regressor on the net entry/exit rate.
//! The model ingests at most one observation per minute bucket; sub-minute
//! updates overwrite the pending bucket and the rolled-over value is what
//! trains the model. Keeping the cadence fixed stops bursty scan activity
//! from dominating the seasonal vector.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Smoothing constants and window sizes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ForecastConfig {
    /// Level smoothing constant.
    pub alpha: f64,
    /// Trend smoothing constant.
    pub gamma: f64,
    /// Seasonal smoothing constant.
    pub delta: f64,
    /// Learning rate for the exogenous net-rate weight.
    pub eta: f64,
    /// Seasonal cycle length; index is minute-of-hour.
    pub season_len: usize,
    /// Retained observations used for outlier statistics.
    pub clip_window: usize,
    /// Minimum retained observations before 3-sigma clipping kicks in.
    pub clip_min_obs: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            gamma: 0.1,
            delta: 0.3,
            eta: 0.01,
            season_len: 60,
            clip_window: 500,
            clip_min_obs: 10,
        }
    }
}

/// A single occupancy observation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    /// When the observation was taken.
    pub timestamp: DateTime<Utc>,
    /// Occupancy count at that time.
    pub occupancy: f64,
    /// Entries-per-minute minus exits-per-minute over a recent window.
    pub net_rate: f64,
}

/// One step of a forecast.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ForecastPoint {
    /// Minutes ahead of the forecast origin.
    pub minutes_ahead: u32,
    /// Predicted occupancy, clamped to \[0, max_capacity\].
    pub occupancy: u32,
    /// Confidence in \[0.1, 1.0\], a function of the horizon alone.
    pub confidence: f64,
}

/// Snapshot of the model internals, exposed to operators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelState {
    /// Current level component.
    pub level: f64,
    /// Current trend component.
    pub trend: f64,
    /// Current exogenous net-rate weight.
    pub beta: f64,
    /// Number of observations the model has trained on.
    pub trained_on: u64,
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    /// Minutes since the epoch; one model update per bucket.
    minute: i64,
    occupancy: f64,
    net_rate: f64,
    timestamp: DateTime<Utc>,
}

/// Holt-Winters occupancy forecaster.
///
/// Updates are deterministic: feeding two models the same observation
/// sequence from the same initial state yields identical internals.
#[derive(Debug, Clone)]
pub struct HoltWinters {
    config: ForecastConfig,
    level: f64,
    trend: f64,
    seasonal: Vec<f64>,
    beta: f64,
    /// Latest observed net rate, committed or pending.
    last_net_rate: f64,
    /// Clipped observations retained for outlier statistics.
    retained: VecDeque<f64>,
    pending: Option<Bucket>,
    trained_on: u64,
    initialized: bool,
}

impl HoltWinters {
    /// Creates an untrained model.
    #[must_use]
    pub fn new(config: ForecastConfig) -> Self {
        let season_len = config.season_len.max(1);
        Self {
            config,
            level: 0.0,
            trend: 0.0,
            seasonal: vec![0.0; season_len],
            beta: 0.0,
            last_net_rate: 0.0,
            retained: VecDeque::new(),
            pending: None,
            trained_on: 0,
            initialized: false,
        }
    }

    fn season_index(&self, ts: DateTime<Utc>) -> usize {
        ts.minute() as usize % self.seasonal.len()
    }

    /// Mean and standard deviation of the retained window.
    fn window_stats(&self) -> (f64, f64) {
        let n = self.retained.len();
        if n == 0 {
            return (0.0, 0.0);
        }
        let mean = self.retained.iter().sum::<f64>() / n as f64;
        let var = self
            .retained
            .iter()
            .map(|y| (y - mean).powi(2))
            .sum::<f64>()
            / n as f64;
        (mean, var.sqrt())
    }

    fn clip(&self, y: f64, max_capacity: f64) -> f64 {
        let (lo, hi) = if self.retained.len() >= self.config.clip_min_obs {
            let (mean, sigma) = self.window_stats();
            (
                (mean - 3.0 * sigma).max(0.0),
                (mean + 3.0 * sigma).min(max_capacity),
            )
        } else {
            (0.0, max_capacity)
        };
        // A degenerate window (lo > hi) falls back to the capacity bounds.
        if lo > hi {
            return y.clamp(0.0, max_capacity);
        }
        y.clamp(lo, hi)
    }

    /// Records an observation, collapsing sub-minute updates.
    ///
    /// The model trains on a bucket only when a later minute arrives, so
    /// the last value seen within each minute wins.
    pub fn observe(&mut self, obs: Observation, max_capacity: u32) {
        let minute = obs.timestamp.timestamp().div_euclid(60);
        self.last_net_rate = obs.net_rate;

        if let Some(bucket) = self.pending {
            if bucket.minute != minute {
                self.train(&bucket, f64::from(max_capacity));
            }
        }
        self.pending = Some(Bucket {
            minute,
            occupancy: obs.occupancy,
            net_rate: obs.net_rate,
            timestamp: obs.timestamp,
        });
    }

    /// Applies one update of the smoothing equations.
    fn train(&mut self, bucket: &Bucket, max_capacity: f64) {
        let y = self.clip(bucket.occupancy, max_capacity);
        let x = bucket.net_rate;
        let idx = self.season_index(bucket.timestamp);

        if !self.initialized {
            self.level = y;
            self.trend = 0.0;
            self.initialized = true;
        }

        let c = &self.config;
        let level_prev = self.level;
        let trend_prev = self.trend;
        let seasonal_prev = self.seasonal[idx];

        let predicted = level_prev + trend_prev + seasonal_prev + self.beta * x;
        let error = y - predicted;

        self.level = c.alpha * (y - seasonal_prev - self.beta * x)
            + (1.0 - c.alpha) * (level_prev + trend_prev);
        self.trend = c.gamma * (self.level - level_prev) + (1.0 - c.gamma) * trend_prev;
        self.seasonal[idx] =
            c.delta * (y - self.level - self.beta * x) + (1.0 - c.delta) * seasonal_prev;
        self.beta = (self.beta + c.eta * error * x).clamp(0.0, 1.0);

        self.retained.push_back(y);
        while self.retained.len() > self.config.clip_window {
            self.retained.pop_front();
        }
        self.trained_on += 1;
    }

    /// Warm-starts the model from historical observations, then replays
    /// them through the update rule.
    ///
    /// Level starts as the mean of the first 10 observations, trend as the
    /// overall slope, and each seasonal slot as the mean deviation from the
    /// initial level at that minute-of-hour.
    pub fn ingest_history(&mut self, history: &[Observation], max_capacity: u32) -> usize {
        if history.is_empty() {
            return 0;
        }

        let head = &history[..history.len().min(10)];
        self.level = head.iter().map(|o| o.occupancy).sum::<f64>() / head.len() as f64;

        let n = history.len();
        self.trend = if n > 1 {
            (history[n - 1].occupancy - history[0].occupancy) / n as f64
        } else {
            0.0
        };

        let season_len = self.seasonal.len();
        let mut sums = vec![0.0; season_len];
        let mut counts = vec![0u32; season_len];
        for obs in history {
            let idx = self.season_index(obs.timestamp);
            sums[idx] += obs.occupancy - self.level;
            counts[idx] += 1;
        }
        for idx in 0..season_len {
            self.seasonal[idx] = if counts[idx] > 0 {
                sums[idx] / f64::from(counts[idx])
            } else {
                0.0
            };
        }
        self.initialized = true;

        for obs in history {
            self.observe(*obs, max_capacity);
        }
        // History is minute-granular already; flush the trailing bucket so
        // the replay trains on every point.
        if let Some(bucket) = self.pending.take() {
            self.train(&bucket, f64::from(max_capacity));
        }
        n
    }

    /// Forecasts occupancy for each of the next `horizon` minutes.
    ///
    /// Values are rounded to the nearest integer before clamping to
    /// `[0, max_capacity]`; confidence depends only on the step index.
    #[must_use]
    pub fn forecast(
        &self,
        origin: DateTime<Utc>,
        horizon: u32,
        max_capacity: u32,
    ) -> Vec<ForecastPoint> {
        let max = f64::from(max_capacity);
        (1..=horizon)
            .map(|j| {
                let at = origin + Duration::minutes(i64::from(j));
                let idx = self.season_index(at);
                let raw = self.level
                    + f64::from(j) * self.trend
                    + self.seasonal[idx]
                    + self.beta * self.last_net_rate;
                let value = raw.round().clamp(0.0, max);
                ForecastPoint {
                    minutes_ahead: j,
                    occupancy: value as u32,
                    confidence: (-f64::from(j) / 30.0).exp().max(0.1),
                }
            })
            .collect()
    }

    /// Latest observed net rate.
    #[must_use]
    pub fn last_net_rate(&self) -> f64 {
        self.last_net_rate
    }

    /// Standard deviation of the retained observation window.
    #[must_use]
    pub fn window_sigma(&self) -> f64 {
        self.window_stats().1
    }

    /// Snapshot of the model internals.
    #[must_use]
    pub fn state(&self) -> ModelState {
        ModelState {
            level: self.level,
            trend: self.trend,
            beta: self.beta,
            trained_on: self.trained_on,
        }
    }
}

impl Default for HoltWinters {
    fn default() -> Self {
        Self::new(ForecastConfig::default())
    }
}
