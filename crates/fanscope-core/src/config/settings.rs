//! Fanscope settings
//!
//! Every section is `#[serde(default)]`, so a partial YAML file only
//! overrides the keys it names.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::paths::default_model_dir;
use crate::audio::OutputConfig;
use crate::curve::DEFAULT_POINT_CACHE_CAPACITY;
use crate::octave::OctaveResolution;
use crate::types::{SPECTRUM_F_MAX, SPECTRUM_F_MIN};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanscopeConfig {
    pub cache: CacheConfig,
    pub spectrum: SpectrumConfig,
    pub playback: PlaybackConfig,
    pub audio: OutputConfig,
}

/// Model cache and fetch coalescing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Poll interval for pending models
    /// Default: 10000 ms
    pub retry_delay_ms: u64,

    /// Upper bound for the retry delay after consecutive provider failures
    /// Default: 60000 ms
    pub max_retry_delay_ms: u64,

    /// Evaluated points kept per band model
    /// Default: 256
    pub eval_cache_capacity: usize,

    /// Directory of spectrum cache files (directory provider)
    /// Default: platform cache dir
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 10_000,
            max_retry_delay_ms: 60_000,
            eval_cache_capacity: DEFAULT_POINT_CACHE_CAPACITY,
            model_dir: None,
        }
    }
}

impl CacheConfig {
    /// Spectrum file directory, falling back to the platform default
    pub fn model_dir(&self) -> PathBuf {
        self.model_dir.clone().unwrap_or_else(default_model_dir)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Retry delay after `failures` consecutive provider errors
    ///
    /// Doubles per failure, capped at `max_retry_delay_ms`.
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        let factor = 1u64 << failures.min(16);
        let ms = self
            .retry_delay_ms
            .saturating_mul(factor)
            .min(self.max_retry_delay_ms.max(self.retry_delay_ms));
        Duration::from_millis(ms)
    }
}

/// Spectrum view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    /// Display resolution used when the caller doesn't choose one
    pub default_resolution: OctaveResolution,
    /// Lower edge of the aggregation range (Hz)
    pub f_min: f64,
    /// Upper edge of the aggregation range (Hz)
    pub f_max: f64,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            default_resolution: OctaveResolution::default(),
            f_min: SPECTRUM_F_MIN,
            f_max: SPECTRUM_F_MAX,
        }
    }
}

/// Gapless playback timing and master chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Maximum crossfade between loop copies (also capped at 49% of the clip)
    pub crossfade_ms: u64,
    /// Scheduler tick
    pub tick_ms: u64,
    /// How far ahead of the output clock copies are scheduled
    pub schedule_ahead_ms: u64,
    /// Delay between play and the first copy
    pub start_delay_ms: u64,
    /// Fade-out ramp on stop
    pub fade_out_ms: u64,
    /// Extra time before a faded source is stopped
    pub stop_buffer_ms: u64,
    /// Grace period after the fade before the output is suspended
    pub cleanup_ms: u64,
    /// Linear master gain applied before the limiter
    /// Default: 5.0
    pub master_gain: f32,
    /// Limiter ceiling in dBFS
    /// Default: -1.0
    pub limiter_threshold_db: f32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            crossfade_ms: 50,
            tick_ms: 25,
            schedule_ahead_ms: 400,
            start_delay_ms: 100,
            fade_out_ms: 30,
            stop_buffer_ms: 10,
            cleanup_ms: 20,
            master_gain: 5.0,
            limiter_threshold_db: -1.0,
        }
    }
}

impl PlaybackConfig {
    pub fn crossfade(&self) -> f64 {
        ms(self.crossfade_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn schedule_ahead(&self) -> f64 {
        ms(self.schedule_ahead_ms)
    }

    pub fn start_delay(&self) -> f64 {
        ms(self.start_delay_ms)
    }

    pub fn fade_out(&self) -> f64 {
        ms(self.fade_out_ms)
    }

    pub fn stop_buffer(&self) -> f64 {
        ms(self.stop_buffer_ms)
    }

    /// Wall-clock delay between stop and suspending an idle output
    pub fn suspend_after(&self) -> Duration {
        Duration::from_millis(self.fade_out_ms + self.cleanup_ms)
    }
}

fn ms(v: u64) -> f64 {
    v as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let cache = CacheConfig::default();
        assert_eq!(cache.backoff_delay(0), Duration::from_secs(10));
        assert_eq!(cache.backoff_delay(1), Duration::from_secs(20));
        assert_eq!(cache.backoff_delay(2), Duration::from_secs(40));
        assert_eq!(cache.backoff_delay(3), Duration::from_secs(60));
        assert_eq!(cache.backoff_delay(40), Duration::from_secs(60));
    }

    #[test]
    fn test_model_dir_override() {
        let mut config = CacheConfig::default();
        assert_eq!(config.model_dir(), default_model_dir());
        config.model_dir = Some(PathBuf::from("/srv/spectra"));
        assert_eq!(config.model_dir(), PathBuf::from("/srv/spectra"));
    }

    #[test]
    fn test_playback_timings() {
        let playback = PlaybackConfig::default();
        assert_eq!(playback.crossfade(), 0.05);
        assert_eq!(playback.schedule_ahead(), 0.4);
        assert_eq!(playback.suspend_after(), Duration::from_millis(50));
    }
}
