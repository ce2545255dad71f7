//! Engine tuning configuration.

use serde::{Deserialize, Serialize};

use turnstile_core::forecast::ForecastConfig;
use turnstile_core::rank::{RankTuning, RankWeights};

/// Tuning block for the occupancy engine.
///
/// All durations are plain integers so the block can live inside the
/// application's TOML configuration and environment overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity seeded into a fresh database.
    pub default_max_capacity: u32,
    /// Length of a session slot in minutes.
    pub session_length_minutes: i64,
    /// Auto-exit sweep period in seconds.
    pub sweep_interval_secs: u64,
    /// Status scheduler period in seconds.
    pub schedule_interval_secs: u64,
    /// After this many seconds of persistence failures, scans fail fast.
    pub persistence_fail_after_secs: i64,
    /// Window over which entry/exit rates are computed, in minutes.
    pub rate_window_minutes: i64,
    /// Offset of the space's wall clock from UTC, in minutes.
    ///
    /// Drives the ranker's time-of-day demand factor and the auto
    /// open/close schedule.
    pub utc_offset_minutes: i32,
    /// Forecaster smoothing constants.
    pub forecast: ForecastConfig,
    /// Removal ranker weights; must sum to 1.0.
    pub weights: RankWeights,
    /// Removal ranker normalization constants.
    pub tuning: RankTuning,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_capacity: 100,
            session_length_minutes: 60,
            sweep_interval_secs: 60,
            schedule_interval_secs: 60,
            persistence_fail_after_secs: 30,
            rate_window_minutes: 10,
            utc_offset_minutes: 0,
            forecast: ForecastConfig::default(),
            weights: RankWeights::default(),
            tuning: RankTuning::default(),
        }
    }
}

impl EngineConfig {
    /// Session length as a chrono duration.
    #[must_use]
    pub fn session_length(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.session_length_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.session_length_minutes, 60);
        assert_eq!(config.sweep_interval_secs, 60);
        assert_eq!(config.persistence_fail_after_secs, 30);
        config.weights.validate().unwrap();
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"session_length_minutes": 90}"#).unwrap();
        assert_eq!(config.session_length_minutes, 90);
        assert_eq!(config.default_max_capacity, 100);
    }
}
