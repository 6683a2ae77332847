//! # Engine Configuration
//!
//! Output format, analyser settings, and crossfade defaults for one engine.

use serde::{Deserialize, Serialize};

use crate::crossfade::{clamp_crossfade_duration, CrossfadeCurve};
use crate::error::{EngineError, Result};

/// Engine configuration.
///
/// Every field has a serde default, so a config file only needs the fields it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Output sample rate (Hz). Also the rate of the engine clock.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Interleaved output channels.
    #[serde(default = "default_channels")]
    pub channels: u16,

    /// Analyser window length (power of two). Frequency data has `fft_size / 2` bins.
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,

    /// Averaging between successive spectra, in [0, 1].
    #[serde(default = "default_smoothing")]
    pub smoothing_time_constant: f32,

    /// Magnitude mapped to byte 0 in frequency data.
    #[serde(default = "default_min_decibels")]
    pub min_decibels: f32,

    /// Magnitude mapped to byte 255 in frequency data.
    #[serde(default = "default_max_decibels")]
    pub max_decibels: f32,

    /// Default crossfade length in seconds (clamped to 0.5–10).
    #[serde(default = "default_crossfade_duration")]
    pub crossfade_duration: f64,

    #[serde(default)]
    pub crossfade_curve: CrossfadeCurve,

    /// Master volume at start, in [0, 1].
    #[serde(default = "default_initial_volume")]
    pub initial_volume: f32,

    /// Seed for the synthetic reverb impulse response.
    #[serde(default = "default_reverb_seed")]
    pub reverb_seed: u64,

    /// Capacity of the event queue drained by `poll_events`.
    #[serde(default = "default_max_pending_events")]
    pub max_pending_events: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            fft_size: default_fft_size(),
            smoothing_time_constant: default_smoothing(),
            min_decibels: default_min_decibels(),
            max_decibels: default_max_decibels(),
            crossfade_duration: default_crossfade_duration(),
            crossfade_curve: CrossfadeCurve::default(),
            initial_volume: default_initial_volume(),
            reverb_seed: default_reverb_seed(),
            max_pending_events: default_max_pending_events(),
        }
    }
}

impl EngineConfig {
    /// Validate and normalize; the crossfade duration is clamped rather than rejected.
    pub fn validated(mut self) -> Result<Self> {
        if !(8_000..=192_000).contains(&self.sample_rate) {
            return Err(EngineError::invalid("sample_rate", f64::from(self.sample_rate), "must be 8000..=192000"));
        }
        if !(1..=8).contains(&self.channels) {
            return Err(EngineError::invalid("channels", f64::from(self.channels), "must be 1..=8"));
        }
        if !self.fft_size.is_power_of_two() || !(32..=32_768).contains(&self.fft_size) {
            return Err(EngineError::invalid("fft_size", self.fft_size as f64, "must be a power of two in 32..=32768"));
        }
        if !(0.0..=1.0).contains(&self.smoothing_time_constant) {
            return Err(EngineError::invalid(
                "smoothing_time_constant",
                f64::from(self.smoothing_time_constant),
                "must be in [0, 1]",
            ));
        }
        if !(self.min_decibels < self.max_decibels) {
            return Err(EngineError::invalid("min_decibels", f64::from(self.min_decibels), "must be below max_decibels"));
        }
        if !(0.0..=1.0).contains(&self.initial_volume) {
            return Err(EngineError::invalid("initial_volume", f64::from(self.initial_volume), "must be in [0, 1]"));
        }
        if self.max_pending_events == 0 {
            return Err(EngineError::invalid("max_pending_events", 0.0, "must be > 0"));
        }
        self.crossfade_duration = clamp_crossfade_duration(self.crossfade_duration)?;
        Ok(self)
    }

    /// Samples per interleaved frame.
    #[inline]
    pub fn frame_len(&self) -> usize {
        usize::from(self.channels)
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_sample_rate() -> u32 {
    48_000
}

fn default_channels() -> u16 {
    2
}

fn default_fft_size() -> usize {
    2048
}

fn default_smoothing() -> f32 {
    0.8
}

fn default_min_decibels() -> f32 {
    -100.0
}

fn default_max_decibels() -> f32 {
    -30.0
}

fn default_crossfade_duration() -> f64 {
    3.0
}

fn default_initial_volume() -> f32 {
    1.0
}

fn default_reverb_seed() -> u64 {
    0x5EED_CAFE
}

fn default_max_pending_events() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default().validated().unwrap();
        assert_eq!(config.sample_rate, 48_000);
        assert_eq!(config.frame_len(), 2);
        assert_eq!(config.crossfade_curve, CrossfadeCurve::EqualPower);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "sample_rate": 44100, "crossfade_curve": "linear" }"#).unwrap();
        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.fft_size, 2048);
        assert_eq!(config.crossfade_curve, CrossfadeCurve::Linear);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let bad = [
            EngineConfig { sample_rate: 1000, ..Default::default() },
            EngineConfig { channels: 0, ..Default::default() },
            EngineConfig { fft_size: 1000, ..Default::default() },
            EngineConfig { smoothing_time_constant: 1.5, ..Default::default() },
            EngineConfig { min_decibels: -10.0, max_decibels: -20.0, ..Default::default() },
            EngineConfig { initial_volume: 2.0, ..Default::default() },
            EngineConfig { crossfade_duration: f64::NAN, ..Default::default() },
        ];
        for config in bad {
            assert!(config.clone().validated().is_err(), "{config:?}");
        }
    }

    #[test]
    fn crossfade_duration_is_clamped() {
        let config = EngineConfig { crossfade_duration: 60.0, ..Default::default() }.validated().unwrap();
        assert_eq!(config.crossfade_duration, 10.0);
    }
}
