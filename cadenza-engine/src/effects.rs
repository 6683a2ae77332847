//! # Effect Modules
//!
//! One insertable effect sits on the mix bus between the sources and the
//! equalizer. Requests are described by an [`EffectSpec`] (plain parameters,
//! validated on construction of the module) and realized as an
//! [`EffectModule`] that owns all of its buffers. Dropping the module releases
//! them.
//!
//! | Effect     | Parameter      | Range          | Default |
//! |------------|----------------|----------------|---------|
//! | all        | `mix`          | [0, 1]         | reverb/delay 0.3, compressor 1.0 |
//! | reverb     | `room_size`    | [0, 1]         | 0.5     |
//! | reverb     | `dampening`    | [0, 1]         | 0.5     |
//! | delay      | `delay_time`   | [0, 1] s       | 0.3     |
//! | delay      | `feedback`     | [0, 1) → ≤0.95 | 0.4     |
//! | compressor | `threshold_db` | [-100, 0]      | -24     |
//! | compressor | `knee_db`      | [0, 40]        | 30      |
//! | compressor | `ratio`        | [1, 20]        | 12      |
//! | compressor | `attack`       | [0, 1] s       | 0.003   |
//! | compressor | `release`      | [0, 1] s       | 0.25    |

use serde::{Deserialize, Serialize};

use crate::compressor::Compressor;
use crate::delay::FeedbackDelay;
use crate::error::{check_param, EngineError, Result};
use crate::graph::Processor;
use crate::reverb::ConvolutionReverb;

/// Largest feedback the delay will run with.
pub const MAX_FEEDBACK: f32 = 0.95;

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverbParams {
    pub room_size: f32,
    pub dampening: f32,
    pub mix: f32,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self { room_size: 0.5, dampening: 0.5, mix: 0.3 }
    }
}

impl ReverbParams {
    pub fn validated(self) -> Result<Self> {
        check_param("room_size", self.room_size, 0.0, 1.0)?;
        check_param("dampening", self.dampening, 0.0, 1.0)?;
        check_param("mix", self.mix, 0.0, 1.0)?;
        Ok(self)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayParams {
    /// Seconds.
    pub delay_time: f32,
    pub feedback: f32,
    pub mix: f32,
}

impl Default for DelayParams {
    fn default() -> Self {
        Self { delay_time: 0.3, feedback: 0.4, mix: 0.3 }
    }
}

impl DelayParams {
    /// Feedback in [0.95, 1) is clamped to 0.95; 1 and above would run away and is rejected.
    pub fn validated(mut self) -> Result<Self> {
        check_param("delay_time", self.delay_time, 0.0, 1.0)?;
        check_param("mix", self.mix, 0.0, 1.0)?;
        if !self.feedback.is_finite() || self.feedback < 0.0 {
            return Err(EngineError::invalid("feedback", f64::from(self.feedback), "must be in [0, 1)"));
        }
        if self.feedback >= 1.0 {
            return Err(EngineError::invalid("feedback", f64::from(self.feedback), "feedback >= 1 runs away"));
        }
        self.feedback = self.feedback.min(MAX_FEEDBACK);
        Ok(self)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressorParams {
    pub threshold_db: f32,
    pub knee_db: f32,
    pub ratio: f32,
    /// Seconds.
    pub attack: f32,
    /// Seconds.
    pub release: f32,
    pub mix: f32,
}

impl Default for CompressorParams {
    fn default() -> Self {
        Self { threshold_db: -24.0, knee_db: 30.0, ratio: 12.0, attack: 0.003, release: 0.25, mix: 1.0 }
    }
}

impl CompressorParams {
    pub fn validated(self) -> Result<Self> {
        check_param("threshold_db", self.threshold_db, -100.0, 0.0)?;
        check_param("knee_db", self.knee_db, 0.0, 40.0)?;
        check_param("ratio", self.ratio, 1.0, 20.0)?;
        check_param("attack", self.attack, 0.0, 1.0)?;
        check_param("release", self.release, 0.0, 1.0)?;
        check_param("mix", self.mix, 0.0, 1.0)?;
        Ok(self)
    }
}

/// Requested effect with its parameters.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EffectSpec {
    Reverb(ReverbParams),
    Delay(DelayParams),
    Compressor(CompressorParams),
}

impl EffectSpec {
    pub fn kind(&self) -> EffectKind {
        match self {
            EffectSpec::Reverb(_) => EffectKind::Reverb,
            EffectSpec::Delay(_) => EffectKind::Delay,
            EffectSpec::Compressor(_) => EffectKind::Compressor,
        }
    }

    /// Validate (and normalize) the parameters.
    pub fn validated(self) -> Result<Self> {
        Ok(match self {
            EffectSpec::Reverb(p) => EffectSpec::Reverb(p.validated()?),
            EffectSpec::Delay(p) => EffectSpec::Delay(p.validated()?),
            EffectSpec::Compressor(p) => EffectSpec::Compressor(p.validated()?),
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    Reverb,
    Delay,
    Compressor,
}

/// A live effect sub-graph.
#[derive(Debug)]
pub enum EffectModule {
    Reverb(ConvolutionReverb),
    Delay(FeedbackDelay),
    Compressor(Compressor),
}

impl EffectModule {
    /// Validate `spec` and allocate the module for `channels` channels at `sr`.
    pub fn build(spec: EffectSpec, sr: f32, channels: usize, seed: u64) -> Result<Self> {
        Ok(match spec.validated()? {
            EffectSpec::Reverb(p) => EffectModule::Reverb(ConvolutionReverb::new(p, sr, channels, seed)),
            EffectSpec::Delay(p) => EffectModule::Delay(FeedbackDelay::new(p, sr, channels)),
            EffectSpec::Compressor(p) => EffectModule::Compressor(Compressor::new(p, sr)),
        })
    }

    pub fn kind(&self) -> EffectKind {
        match self {
            EffectModule::Reverb(_) => EffectKind::Reverb,
            EffectModule::Delay(_) => EffectKind::Delay,
            EffectModule::Compressor(_) => EffectKind::Compressor,
        }
    }
}

impl Processor for EffectModule {
    fn reset(&mut self) {
        match self {
            EffectModule::Reverb(m) => m.reset(),
            EffectModule::Delay(m) => m.reset(),
            EffectModule::Compressor(m) => m.reset(),
        }
    }

    #[inline]
    fn process_frame(&mut self, frame: &mut [f32]) {
        match self {
            EffectModule::Reverb(m) => m.process_frame(frame),
            EffectModule::Delay(m) => m.process_frame(frame),
            EffectModule::Compressor(m) => m.process_frame(frame),
        }
    }
}
