//! # Engine Facade
//!
//! [`AudioEngine`] is the whole public control surface. It is an explicit
//! object with a caller-controlled lifecycle:
//!
//! ```text
//! new ──▶ Uninitialized ──initialize──▶ Running ──destroy──▶ Destroyed
//! ```
//!
//! Every control call is synchronous: it validates, programs the scheduler or
//! the graph, and returns. Audio is produced only by [`AudioEngine::render`],
//! which the host calls from its output callback. Outside the running
//! transport the engine renders silence and its clock stands still.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::buffer::PcmBuffer;
use crate::clock::{EngineClock, TransportState};
use crate::config::EngineConfig;
use crate::crossfade::CrossfadeController;
use crate::effects::{EffectKind, EffectSpec};
use crate::equalizer::{EqualizerPreset, BAND_COUNT};
use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, EventQueue};
use crate::graph::{Processor, RewireOutcome, SignalGraph, RENDER_QUANTUM};
use crate::scheduler::{PlayOptions, PlaybackScheduler, PlaybackSnapshot};
use crate::source::SourceId;

/// Everything that exists only between `initialize` and `destroy`.
#[derive(Debug)]
struct Runtime {
    clock: EngineClock,
    graph: SignalGraph,
    scheduler: PlaybackScheduler,
    transport: TransportState,
    events: EventQueue,
    /// Frames rendered into the current quantum.
    quantum_pos: usize,
}

impl Runtime {
    fn new(config: &EngineConfig) -> Result<Self> {
        let crossfade = CrossfadeController::new(config.crossfade_duration, config.crossfade_curve)?;
        Ok(Self {
            clock: EngineClock::new(config.sample_rate),
            graph: SignalGraph::build(config, None)?,
            scheduler: PlaybackScheduler::new(config.sample_rate, config.frame_len(), crossfade),
            transport: TransportState::Running,
            events: EventQueue::new(config.max_pending_events),
            quantum_pos: 0,
        })
    }

    #[inline]
    fn now(&self) -> f64 {
        self.clock.now()
    }

    fn set_transport(&mut self, state: TransportState) {
        if self.transport != state {
            self.transport = state;
            let at = self.now();
            self.events.push(EngineEvent::TransportChanged { state, at });
        }
    }

    /// Free sources and effect modules the render path retired.
    fn release_retired(&mut self) {
        self.scheduler.release_retired();
        self.graph.release_retired();
    }

    /// Apply a staged rewire unless a crossfade is holding it back.
    /// Runs on the render path, so it neither logs nor frees.
    fn commit_rewire(&mut self) -> Option<Option<EffectKind>> {
        if self.scheduler.is_crossfading() {
            return None;
        }
        let effect = self.graph.commit_rewire()?;
        let at = self.now();
        self.events.push(EngineEvent::EffectRewired { effect, at });
        Some(effect)
    }

    /// Control-side commit.
    fn try_commit_rewire(&mut self) {
        if let Some(effect) = self.commit_rewire() {
            debug!("effect slot now {effect:?} at {:.3}s", self.now());
            self.graph.release_retired();
        }
    }

    fn request_rewire(&mut self) -> RewireOutcome {
        if self.scheduler.is_crossfading() {
            warn!("effect rewire deferred until the running crossfade completes");
            return RewireOutcome::Deferred;
        }
        if !self.scheduler.is_audible() {
            self.try_commit_rewire();
        }
        RewireOutcome::Applied
    }

    fn render(&mut self, out: &mut [f32], channels: usize) {
        for frame in out.chunks_exact_mut(channels) {
            if self.quantum_pos == 0 && self.graph.has_staged_rewire() {
                self.commit_rewire();
            }
            frame.fill(0.0);
            let t = self.clock.now();
            self.scheduler.render_frame(t, frame, &mut self.events);
            self.graph.process_frame(frame);
            self.clock.advance(1);
            self.scheduler.settle(self.clock.now(), &mut self.events);
            self.quantum_pos = (self.quantum_pos + 1) % RENDER_QUANTUM;
        }
    }
}

#[derive(Debug)]
enum EngineState {
    Uninitialized,
    Running(Box<Runtime>),
    Destroyed,
}

/// One playback session.
#[derive(Debug)]
pub struct AudioEngine {
    config: EngineConfig,
    state: EngineState,
}

impl AudioEngine {
    /// Create an engine. The configuration is validated; no graph exists until [`initialize`](Self::initialize).
    pub fn new(config: EngineConfig) -> Result<Self> {
        Ok(Self { config: config.validated()?, state: EngineState::Uninitialized })
    }

    #[inline] pub fn config(&self) -> &EngineConfig { &self.config }

    /// Build the graph and start the clock. Repeated calls are no-ops; fails after `destroy`.
    pub fn initialize(&mut self) -> Result<()> {
        match self.state {
            EngineState::Running(_) => Ok(()),
            EngineState::Destroyed => Err(EngineError::Destroyed),
            EngineState::Uninitialized => {
                self.state = EngineState::Running(Box::new(Runtime::new(&self.config)?));
                info!(
                    "engine initialized: {} Hz, {} ch, fft {}",
                    self.config.sample_rate, self.config.channels, self.config.fft_size
                );
                Ok(())
            }
        }
    }

    /// Release the graph and every source. Idempotent.
    pub fn destroy(&mut self) {
        if let EngineState::Running(rt) = &mut self.state {
            let now = rt.now();
            rt.scheduler.clear(now, &mut rt.events);
            info!("engine destroyed at {now:.3}s");
        }
        self.state = EngineState::Destroyed;
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        matches!(self.state, EngineState::Running(_))
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        matches!(self.state, EngineState::Destroyed)
    }

    fn rt(&self) -> Result<&Runtime> {
        match &self.state {
            EngineState::Running(rt) => Ok(&**rt),
            EngineState::Uninitialized => Err(EngineError::NotInitialized),
            EngineState::Destroyed => Err(EngineError::Destroyed),
        }
    }

    /// Every mutating control call goes through here, so it also frees what
    /// the render path retired since the last one.
    fn rt_mut(&mut self) -> Result<&mut Runtime> {
        match &mut self.state {
            EngineState::Running(rt) => {
                rt.release_retired();
                Ok(&mut **rt)
            }
            EngineState::Uninitialized => Err(EngineError::NotInitialized),
            EngineState::Destroyed => Err(EngineError::Destroyed),
        }
    }

    // ---- playback ----

    /// Play (or preload) a decoded buffer. Returns the id of the new source.
    pub fn play(&mut self, buffer: impl Into<Arc<PcmBuffer>>, options: PlayOptions) -> Result<SourceId> {
        let rt = self.rt_mut()?;
        let now = rt.now();
        let id = rt.scheduler.play(buffer.into(), &options, now, &mut rt.events)?;
        debug!("play source {id} ({options:?})");
        Ok(id)
    }

    /// Start the preloaded source with `options` (its `preload` flag is ignored).
    pub fn play_preloaded(&mut self, options: PlayOptions) -> Result<SourceId> {
        let rt = self.rt_mut()?;
        let now = rt.now();
        rt.scheduler.play_preloaded(&options, now, &mut rt.events)
    }

    /// Freeze the transport. No-op when already paused.
    pub fn pause(&mut self) -> Result<()> {
        let rt = self.rt_mut()?;
        if rt.transport == TransportState::Running {
            rt.set_transport(TransportState::Paused);
            debug!("paused at {:.3}s", rt.now());
        }
        Ok(())
    }

    /// Resume from a pause or a device suspension. No-op when running.
    pub fn resume(&mut self) -> Result<()> {
        let rt = self.rt_mut()?;
        if rt.transport != TransportState::Running {
            rt.set_transport(TransportState::Running);
            debug!("resumed at {:.3}s", rt.now());
        }
        Ok(())
    }

    /// Host notification that the output device went away. `resume()` clears it.
    pub fn notify_device_suspended(&mut self) -> Result<()> {
        let rt = self.rt_mut()?;
        if rt.transport != TransportState::Suspended {
            warn!("output device suspended at {:.3}s", rt.now());
            rt.set_transport(TransportState::Suspended);
        }
        Ok(())
    }

    /// Stop and dispose the current and pending sources, cancelling any crossfade.
    /// Effect tails and filter memory are cleared so nothing rings on.
    pub fn stop(&mut self) -> Result<()> {
        let rt = self.rt_mut()?;
        let now = rt.now();
        rt.scheduler.stop(now, &mut rt.events);
        rt.graph.reset();
        rt.try_commit_rewire();
        Ok(())
    }

    /// Restart the current source from `offset` seconds. A rewire held back by a
    /// crossfade that this cuts lands at the next render quantum.
    pub fn seek(&mut self, offset: f64) -> Result<()> {
        let rt = self.rt_mut()?;
        let now = rt.now();
        rt.scheduler.seek(offset, now, &mut rt.events)
    }

    // ---- gain / EQ ----

    pub fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.rt_mut()?.graph.set_master_volume(volume)
    }

    pub fn volume(&self) -> Result<f32> {
        Ok(self.rt()?.graph.master_volume())
    }

    pub fn set_band_gain(&mut self, index: usize, gain_db: f32) -> Result<()> {
        self.rt_mut()?.graph.set_band_gain(index, gain_db)
    }

    pub fn band_gain(&self, index: usize) -> Result<f32> {
        self.rt()?.graph.band_gain(index)
    }

    pub fn equalizer_gains(&self) -> Result<[f32; BAND_COUNT]> {
        Ok(self.rt()?.graph.equalizer_gains())
    }

    /// Set all ten bands. Nothing changes unless every gain is valid.
    pub fn set_equalizer_preset(&mut self, gains: &[f32]) -> Result<()> {
        let rt = self.rt_mut()?;
        let preset = EqualizerPreset::from_slice(gains)?;
        rt.graph.apply_preset(&preset);
        Ok(())
    }

    // ---- crossfade ----

    /// Set the default crossfade length; returns the clamped value.
    pub fn set_crossfade_duration(&mut self, seconds: f64) -> Result<f64> {
        self.rt_mut()?.scheduler.crossfade_mut().set_duration(seconds)
    }

    pub fn crossfade_duration(&self) -> Result<f64> {
        Ok(self.rt()?.scheduler.crossfade().duration())
    }

    // ---- effects ----

    /// Insert an effect into the slot, replacing the current one.
    /// Invalid parameters fail immediately; the rewire itself may be deferred.
    pub fn apply_effect(&mut self, spec: EffectSpec) -> Result<RewireOutcome> {
        let rt = self.rt_mut()?;
        rt.graph.stage_effect(spec)?;
        Ok(rt.request_rewire())
    }

    /// Empty the effect slot.
    pub fn clear_effect(&mut self) -> Result<RewireOutcome> {
        let rt = self.rt_mut()?;
        rt.graph.stage_removal();
        Ok(rt.request_rewire())
    }

    /// The effect currently in the signal path (staged requests are not reported).
    pub fn active_effect(&self) -> Result<Option<EffectKind>> {
        Ok(self.rt()?.graph.active_effect())
    }

    /// Current compressor gain reduction in dB, when a compressor is active.
    pub fn compressor_reduction_db(&self) -> Result<Option<f32>> {
        Ok(self.rt()?.graph.compressor_reduction_db())
    }

    // ---- analysis ----

    /// Spectrum bytes, `fft_size / 2` bins.
    pub fn frequency_data(&self) -> Result<Vec<u8>> {
        Ok(self.rt()?.graph.analyser().frequency_data())
    }

    /// Waveform bytes, `fft_size` samples.
    pub fn time_domain_data(&self) -> Result<Vec<u8>> {
        Ok(self.rt()?.graph.analyser().time_domain_data())
    }

    pub fn copy_frequency_data(&self, out: &mut [u8]) -> Result<()> {
        self.rt()?.graph.analyser().copy_frequency_data(out);
        Ok(())
    }

    pub fn copy_time_domain_data(&self, out: &mut [u8]) -> Result<()> {
        self.rt()?.graph.analyser().copy_time_domain_data(out);
        Ok(())
    }

    // ---- clock / state ----

    /// Playback position (seconds) of the current source.
    pub fn current_time(&self) -> Result<f64> {
        Ok(self.rt()?.scheduler.current_position())
    }

    /// Engine clock (seconds of audio rendered while running).
    pub fn clock_time(&self) -> Result<f64> {
        Ok(self.rt()?.now())
    }

    /// Duration of the current source.
    pub fn duration(&self) -> Result<Option<f64>> {
        Ok(self.rt()?.scheduler.current_duration())
    }

    pub fn transport_state(&self) -> Result<TransportState> {
        Ok(self.rt()?.transport)
    }

    pub fn snapshot(&self) -> Result<PlaybackSnapshot> {
        let rt = self.rt()?;
        Ok(rt.scheduler.snapshot(rt.now(), rt.graph.master_volume(), rt.transport))
    }

    /// Drain queued notifications, oldest first. Overflow since the last poll is logged here.
    pub fn poll_events(&mut self) -> Result<Vec<EngineEvent>> {
        let rt = self.rt_mut()?;
        let dropped = rt.events.take_dropped();
        if dropped > 0 {
            warn!("event queue full ({}), dropped {dropped} oldest events", rt.events.capacity());
        }
        Ok(rt.events.drain())
    }

    // ---- audio ----

    /// Fill `out` with interleaved frames; returns the number of frames written.
    ///
    /// Renders silence (and leaves the clock alone) before `initialize`, after
    /// `destroy`, and while paused or suspended. A trailing partial frame is zeroed.
    pub fn render(&mut self, out: &mut [f32]) -> usize {
        let channels = self.config.frame_len();
        let frames = out.len() / channels;
        match &mut self.state {
            EngineState::Running(rt) if rt.transport.is_running() => {
                rt.render(out, channels);
                out[frames * channels..].fill(0.0);
            }
            _ => out.fill(0.0),
        }
        frames
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        if self.is_initialized() {
            self.destroy();
        }
    }
}
