//! Signal graph.
//!
//! The persistent processing chain built once per engine lifetime:
//!
//! ```text
//! sources ─▶ mix bus ─▶ [effect slot] ─▶ EQ (10 biquads) ─▶ master gain ─▶ analyser ─▶ output
//! ```
//!
//! Every stage implements [`Processor`] and works in place on one interleaved
//! frame, so the chain needs no intermediate buffers.
//!
//! Effect rewiring is staged: the new module (or the removal) waits in a
//! single slot until the engine commits it at a render-quantum boundary. The
//! engine holds the commit back while a crossfade is running. The module a
//! commit replaces is parked in a second slot and freed by
//! [`SignalGraph::release_retired`] on the control side.

use log::debug;

use crate::analyser::Analyser;
use crate::config::EngineConfig;
use crate::effects::{EffectKind, EffectModule, EffectSpec};
use crate::equalizer::{Equalizer, EqualizerPreset, BAND_COUNT};
use crate::error::Result;
use crate::nodes::GainStage;

/// Frames per render quantum. Staged rewires land only on quantum boundaries.
pub const RENDER_QUANTUM: usize = 128;

/// Anything that transforms one interleaved frame in place.
pub trait Processor {
    /// Drop all internal signal state (delay lines, filter memory, tails).
    fn reset(&mut self);

    /// Process one interleaved frame in place.
    fn process_frame(&mut self, frame: &mut [f32]);
}

/// What became of an effect insert/remove request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RewireOutcome {
    /// In place now, or at the next quantum boundary.
    Applied,
    /// Waiting for the running crossfade to finish.
    Deferred,
}

#[derive(Debug)]
enum StagedRewire {
    Insert(Box<EffectModule>),
    Remove,
}

#[derive(Debug)]
pub struct SignalGraph {
    sample_rate: f32,
    channels: usize,
    reverb_seed: u64,
    effect: Option<Box<EffectModule>>,
    staged: Option<StagedRewire>,
    retired: Option<Box<EffectModule>>,
    equalizer: Equalizer,
    master: GainStage,
    analyser: Analyser,
}

impl SignalGraph {
    /// Build the persistent chain, optionally with an effect already in the slot.
    pub fn build(config: &EngineConfig, effect: Option<EffectSpec>) -> Result<Self> {
        let sample_rate = config.sample_rate as f32;
        let channels = config.frame_len();
        let effect = effect
            .map(|spec| EffectModule::build(spec, sample_rate, channels, config.reverb_seed).map(Box::new))
            .transpose()?;
        Ok(Self {
            sample_rate,
            channels,
            reverb_seed: config.reverb_seed,
            effect,
            staged: None,
            retired: None,
            equalizer: Equalizer::new(sample_rate, channels),
            master: GainStage::new(config.initial_volume, sample_rate)?,
            analyser: Analyser::new(
                config.fft_size,
                config.smoothing_time_constant,
                config.min_decibels,
                config.max_decibels,
            ),
        })
    }

    // ---- equalizer ----

    #[inline]
    pub fn set_band_gain(&mut self, index: usize, gain_db: f32) -> Result<()> {
        self.equalizer.set_band_gain(index, gain_db)
    }

    #[inline]
    pub fn band_gain(&self, index: usize) -> Result<f32> {
        self.equalizer.band_gain(index)
    }

    #[inline]
    pub fn equalizer_gains(&self) -> [f32; BAND_COUNT] {
        self.equalizer.gains()
    }

    #[inline]
    pub fn apply_preset(&mut self, preset: &EqualizerPreset) {
        self.equalizer.apply_preset(preset);
    }

    #[inline] pub fn equalizer(&self) -> &Equalizer { &self.equalizer }

    // ---- master gain ----

    #[inline]
    pub fn set_master_volume(&mut self, volume: f32) -> Result<()> {
        self.master.set_gain(volume)
    }

    #[inline] pub fn master_volume(&self) -> f32 { self.master.gain() }

    // ---- effect slot ----

    /// Validate `spec`, allocate the module and stage it, replacing any earlier staged request.
    pub fn stage_effect(&mut self, spec: EffectSpec) -> Result<()> {
        let module = EffectModule::build(spec, self.sample_rate, self.channels, self.reverb_seed)?;
        debug!("staging {:?} effect", module.kind());
        self.staged = Some(StagedRewire::Insert(Box::new(module)));
        Ok(())
    }

    pub fn stage_removal(&mut self) {
        debug!("staging effect removal");
        self.staged = Some(StagedRewire::Remove);
    }

    #[inline] pub fn has_staged_rewire(&self) -> bool { self.staged.is_some() }

    /// Apply the staged rewire. Returns the effect now in the slot when something changed.
    /// The outgoing module is kept, buffers and all, until `release_retired`.
    pub fn commit_rewire(&mut self) -> Option<Option<EffectKind>> {
        let staged = self.staged.take()?;
        let next = match staged {
            StagedRewire::Insert(module) => Some(module),
            StagedRewire::Remove => None,
        };
        if let Some(old) = std::mem::replace(&mut self.effect, next) {
            self.retired = Some(old);
        }
        Some(self.active_effect())
    }

    /// Free the module the last commit replaced. Returns whether there was one.
    pub fn release_retired(&mut self) -> bool {
        match self.retired.take() {
            Some(old) => {
                debug!("released retired {:?} effect", old.kind());
                true
            }
            None => false,
        }
    }

    pub fn active_effect(&self) -> Option<EffectKind> {
        self.effect.as_ref().map(|m| m.kind())
    }

    /// The staged request, if any: `Some(None)` means a pending removal.
    pub fn staged_effect(&self) -> Option<Option<EffectKind>> {
        self.staged.as_ref().map(|s| match s {
            StagedRewire::Insert(m) => Some(m.kind()),
            StagedRewire::Remove => None,
        })
    }

    /// Gain reduction of the active compressor, if one is in the slot.
    pub fn compressor_reduction_db(&self) -> Option<f32> {
        match self.effect.as_deref() {
            Some(EffectModule::Compressor(c)) => Some(c.gain_reduction_db()),
            _ => None,
        }
    }

    // ---- analysis ----

    #[inline] pub fn analyser(&self) -> &Analyser { &self.analyser }

    #[inline] pub fn channels(&self) -> usize { self.channels }
}

impl Processor for SignalGraph {
    fn reset(&mut self) {
        if let Some(fx) = self.effect.as_mut() {
            fx.reset();
        }
        self.equalizer.reset();
        self.master.reset();
        self.analyser.reset();
    }

    /// Run the mixed bus frame through effect → EQ → master gain → analyser.
    #[inline]
    fn process_frame(&mut self, frame: &mut [f32]) {
        if let Some(fx) = self.effect.as_mut() {
            fx.process_frame(frame);
        }
        self.equalizer.process_frame(frame);
        self.master.process_frame(frame);
        self.analyser.process_frame(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{DelayParams, ReverbParams};

    fn config() -> EngineConfig {
        EngineConfig { sample_rate: 8_000, channels: 2, fft_size: 256, ..Default::default() }
    }

    #[test]
    fn build_with_and_without_effect() {
        let g = SignalGraph::build(&config(), None).unwrap();
        assert_eq!(g.active_effect(), None);
        assert_eq!(g.equalizer_gains(), [0.0; BAND_COUNT]);

        let g = SignalGraph::build(&config(), Some(EffectSpec::Reverb(ReverbParams::default()))).unwrap();
        assert_eq!(g.active_effect(), Some(EffectKind::Reverb));

        let bad = EffectSpec::Delay(DelayParams { feedback: 1.0, ..Default::default() });
        assert!(SignalGraph::build(&config(), Some(bad)).is_err());
    }

    #[test]
    fn staged_rewire_commits_once() {
        let mut g = SignalGraph::build(&config(), None).unwrap();
        g.stage_effect(EffectSpec::Delay(DelayParams::default())).unwrap();
        assert_eq!(g.active_effect(), None);
        assert_eq!(g.staged_effect(), Some(Some(EffectKind::Delay)));

        assert_eq!(g.commit_rewire(), Some(Some(EffectKind::Delay)));
        assert_eq!(g.commit_rewire(), None);

        g.stage_removal();
        assert_eq!(g.commit_rewire(), Some(None));
        assert_eq!(g.active_effect(), None);
    }

    #[test]
    fn replaced_module_is_held_until_released() {
        let mut g = SignalGraph::build(&config(), Some(EffectSpec::Delay(DelayParams::default()))).unwrap();
        assert!(!g.release_retired());

        g.stage_effect(EffectSpec::Reverb(ReverbParams::default())).unwrap();
        assert_eq!(g.commit_rewire(), Some(Some(EffectKind::Reverb)));
        assert!(g.release_retired());
        assert!(!g.release_retired());

        g.stage_removal();
        assert_eq!(g.commit_rewire(), Some(None));
        assert!(g.release_retired());
    }

    #[test]
    fn reset_clears_effect_tail() {
        let mut g = SignalGraph::build(&config(), Some(EffectSpec::Delay(DelayParams::default()))).unwrap();
        g.reset();
        for _ in 0..800 {
            g.process_frame(&mut [0.5, 0.5]);
        }
        g.reset();
        for _ in 0..8_000 {
            let mut frame = [0.0, 0.0];
            g.process_frame(&mut frame);
            assert_eq!(frame, [0.0, 0.0]);
        }
    }

    #[test]
    fn invalid_effect_leaves_stage_untouched() {
        let mut g = SignalGraph::build(&config(), None).unwrap();
        let bad = EffectSpec::Delay(DelayParams { delay_time: 5.0, ..Default::default() });
        assert!(g.stage_effect(bad).is_err());
        assert!(!g.has_staged_rewire());
    }

    #[test]
    fn chain_applies_master_gain() {
        let mut g = SignalGraph::build(&config(), None).unwrap();
        g.set_master_volume(0.5).unwrap();
        g.reset();
        let mut frame = [0.8, -0.8];
        g.process_frame(&mut frame);
        assert!((frame[0] - 0.4).abs() < 1e-4);
        assert!((frame[1] + 0.4).abs() < 1e-4);
        assert!(g.set_master_volume(1.1).is_err());
        assert_eq!(g.master_volume(), 0.5);
    }
}
