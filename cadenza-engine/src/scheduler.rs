//! # Playback Scheduler
//!
//! Owns the source slots and is the only code that changes which sources are
//! live:
//! - `current`   : the source on the master path (or the outgoing one while crossfading)
//! - `pending`   : the incoming source of a running crossfade
//! - `preloaded` : a wrapped buffer waiting to be started, not connected to anything
//!
//! At most two sources produce audio, and only while a crossfade runs.
//!
//! Control calls (`play`, `stop`, `seek`) take the clock time at which they
//! happen and validate everything before touching state. The render path calls
//! [`PlaybackScheduler::render_frame`] and then [`PlaybackScheduler::settle`]
//! once per frame; settling is where exhausted buffers are retired and
//! finished crossfades promote the incoming source. Retired sources are held
//! until the control side calls [`PlaybackScheduler::release_retired`], so
//! the render path never frees a buffer or logs.

use std::sync::Arc;

use log::debug;
use serde::Serialize;

use crate::buffer::PcmBuffer;
use crate::clock::TransportState;
use crate::crossfade::{clamp_crossfade_duration, CrossfadeController};
use crate::error::{EngineError, Result};
use crate::events::{EndReason, EngineEvent, EventQueue};
use crate::source::{Source, SourceId, SourceState};

/// Options for `play`.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PlayOptions {
    /// Fade from the current source instead of cutting it.
    pub crossfade: bool,
    /// Seconds into the buffer to start from.
    pub start_offset: f64,
    /// Only wrap and cache the buffer; start it later with `play_preloaded`.
    pub preload: bool,
    /// Crossfade length for this call (clamped); the engine default otherwise.
    pub crossfade_duration: Option<f64>,
}

impl PlayOptions {
    pub fn crossfade() -> Self {
        Self { crossfade: true, ..Self::default() }
    }

    pub fn preload() -> Self {
        Self { preload: true, ..Self::default() }
    }

    pub fn with_offset(mut self, seconds: f64) -> Self {
        self.start_offset = seconds;
        self
    }

    pub fn with_crossfade_duration(mut self, seconds: f64) -> Self {
        self.crossfade_duration = Some(seconds);
        self
    }
}

// ---------------------------------- Snapshots -------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct SourceSnapshot {
    pub id: SourceId,
    pub state: SourceState,
    /// Clock time of the latest (re)schedule.
    pub start_time: f64,
    /// Seconds into the buffer.
    pub position: f64,
    pub duration: f64,
    /// Fader × master volume.
    pub gain: f32,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct CrossfadeSnapshot {
    pub outgoing: SourceId,
    pub incoming: SourceId,
    pub start: f64,
    pub duration: f64,
    pub progress: f64,
    /// Fader × master volume.
    pub outgoing_gain: f32,
    /// Fader × master volume.
    pub incoming_gain: f32,
}

/// Point-in-time view of the transport and slots.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    pub clock_time: f64,
    pub transport: TransportState,
    pub master_volume: f32,
    pub current: Option<SourceSnapshot>,
    pub pending: Option<SourceSnapshot>,
    pub preloaded: Option<SourceSnapshot>,
    pub crossfade: Option<CrossfadeSnapshot>,
}

// --------------------------------- Scheduler --------------------------------------

/// Sources the render path can retire between two control calls: the
/// outgoing and incoming sides of one crossfade.
const RETIRED_SLOTS: usize = 2;

#[derive(Debug)]
pub struct PlaybackScheduler {
    sample_rate: u32,
    channels: usize,
    next_id: SourceId,
    current: Option<Source>,
    pending: Option<Source>,
    preloaded: Option<Source>,
    crossfade: CrossfadeController,
    /// Reported position once the current source has finished and been dropped.
    last_position: f64,
    retired: Vec<Source>,
}

impl PlaybackScheduler {
    pub fn new(sample_rate: u32, channels: usize, crossfade: CrossfadeController) -> Self {
        Self {
            sample_rate,
            channels,
            next_id: 1,
            current: None,
            pending: None,
            preloaded: None,
            crossfade,
            last_position: 0.0,
            retired: Vec::with_capacity(RETIRED_SLOTS),
        }
    }

    /// Drop sources retired by the render path. Returns how many were released.
    pub fn release_retired(&mut self) -> usize {
        let released = self.retired.len();
        for source in self.retired.drain(..) {
            debug!("source {} disposed", source.id());
        }
        released
    }

    /// Start (or preload) `buffer`. Returns the new source's id.
    pub fn play(
        &mut self,
        buffer: Arc<PcmBuffer>,
        options: &PlayOptions,
        now: f64,
        events: &mut EventQueue,
    ) -> Result<SourceId> {
        self.check_start(buffer.duration(), options)?;
        let source = self.wrap(buffer);
        let id = source.id();
        if options.preload {
            if let Some(old) = self.preloaded.replace(source) {
                debug!("preloaded source {} replaced by {id}", old.id());
            } else {
                debug!("preloaded source {id}");
            }
            return Ok(id);
        }
        self.start(source, options, now, events)?;
        Ok(id)
    }

    /// Start the preloaded source. `options.preload` is ignored.
    pub fn play_preloaded(&mut self, options: &PlayOptions, now: f64, events: &mut EventQueue) -> Result<SourceId> {
        let options = PlayOptions { preload: false, ..*options };
        let duration = self.preloaded.as_ref().ok_or(EngineError::NothingPreloaded)?.duration();
        self.check_start(duration, &options)?;
        let source = self.preloaded.take().ok_or(EngineError::NothingPreloaded)?;
        let id = source.id();
        self.start(source, &options, now, events)?;
        Ok(id)
    }

    fn wrap(&mut self, buffer: Arc<PcmBuffer>) -> Source {
        let id = self.next_id;
        self.next_id += 1;
        Source::new(id, buffer, self.sample_rate, self.channels)
    }

    fn check_start(&self, duration: f64, options: &PlayOptions) -> Result<()> {
        check_offset(options.start_offset, duration)?;
        if let Some(d) = options.crossfade_duration {
            clamp_crossfade_duration(d)?;
        }
        if options.crossfade && !options.preload && self.crossfade.is_active() {
            return Err(EngineError::CrossfadeInProgress);
        }
        Ok(())
    }

    fn start(&mut self, mut source: Source, options: &PlayOptions, now: f64, events: &mut EventQueue) -> Result<()> {
        match self.current.as_mut() {
            Some(outgoing) if options.crossfade && outgoing.is_live() => {
                source.schedule(now, options.start_offset);
                let s = self.crossfade.begin(outgoing, &mut source, now, options.crossfade_duration)?;
                events.push(EngineEvent::CrossfadeStarted {
                    outgoing: s.outgoing,
                    incoming: s.incoming,
                    at: now,
                    duration: s.duration,
                });
                self.pending = Some(source);
            }
            _ => {
                self.cut_all(now, events);
                source.fader_mut().set_value(1.0);
                source.schedule(now, options.start_offset);
                debug!("source {} scheduled at {now:.3}s from {:.3}s", source.id(), options.start_offset);
                self.current = Some(source);
            }
        }
        self.last_position = 0.0;
        Ok(())
    }

    /// Cancel any crossfade and stop both live slots immediately.
    fn cut_all(&mut self, now: f64, events: &mut EventQueue) {
        if let Some(s) = self.crossfade.cancel() {
            debug!("crossfade {} -> {} cut at {now:.3}s", s.outgoing, s.incoming);
            events.push(EngineEvent::CrossfadeCancelled { outgoing: s.outgoing, incoming: s.incoming, at: now });
        }
        for source in [self.current.take(), self.pending.take()].into_iter().flatten() {
            dispose(source, now, EndReason::Stopped, events);
        }
    }

    /// Halt and dispose current and pending sources. The preloaded source is kept.
    pub fn stop(&mut self, now: f64, events: &mut EventQueue) {
        self.cut_all(now, events);
        self.last_position = 0.0;
    }

    /// Drop every source, the preloaded one included.
    pub fn clear(&mut self, now: f64, events: &mut EventQueue) {
        self.stop(now, events);
        self.preloaded = None;
    }

    /// Restart the current source from `offset` seconds.
    ///
    /// During a crossfade the target is the incoming source: the outgoing one
    /// is cut, the incoming one takes over at full fader, then it is rescheduled.
    /// If the incoming source has already run out, the crossfade is cut the
    /// same way but the outgoing source stays and is the one rescheduled.
    pub fn seek(&mut self, offset: f64, now: f64, events: &mut EventQueue) -> Result<()> {
        let incoming_live = self.crossfade.is_active() && self.pending.as_ref().is_some_and(Source::is_live);
        let target = if incoming_live { self.pending.as_ref() } else { self.current.as_ref() };
        let duration = target.filter(|s| s.is_live()).ok_or(EngineError::NoActiveSource)?.duration();
        check_offset(offset, duration)?;

        if let Some(s) = self.crossfade.cancel() {
            events.push(EngineEvent::CrossfadeCancelled { outgoing: s.outgoing, incoming: s.incoming, at: now });
            if incoming_live {
                if let Some(outgoing) = self.current.take() {
                    dispose(outgoing, now, EndReason::Stopped, events);
                }
                self.current = self.pending.take();
            } else if let Some(incoming) = self.pending.take() {
                dispose(incoming, now, EndReason::Stopped, events);
            }
        }
        if let Some(current) = self.current.as_mut() {
            current.fader_mut().set_value(1.0);
            current.schedule(now, offset);
            debug!("source {} seek to {offset:.3}s", current.id());
        }
        Ok(())
    }

    /// Mix the live sources' frame at clock time `t` into `out`.
    #[inline]
    pub fn render_frame(&mut self, t: f64, out: &mut [f32], events: &mut EventQueue) {
        for source in [self.current.as_mut(), self.pending.as_mut()].into_iter().flatten() {
            if source.activate(t) {
                events.push(EngineEvent::SourceStarted { id: source.id(), at: t });
            }
            if source.render_frame(t, out) {
                events.push(EngineEvent::SourceEnded { id: source.id(), at: t, reason: EndReason::Exhausted });
            }
        }
    }

    /// Handle crossfade completion and retire finished sources at clock time `now`.
    #[inline]
    pub fn settle(&mut self, now: f64, events: &mut EventQueue) {
        if let Some(s) = self.crossfade.take_completed(now) {
            if let Some(mut outgoing) = self.current.take() {
                end(&mut outgoing, now, EndReason::FadedOut, events);
                self.retired.push(outgoing);
            }
            self.current = self.pending.take();
            if let Some(incoming) = self.current.as_mut() {
                incoming.fader_mut().settle(now);
            }
            events.push(EngineEvent::CrossfadeCompleted { outgoing: s.outgoing, incoming: s.incoming, at: now });
        }
        if !self.crossfade.is_active() && self.current.as_ref().is_some_and(|c| c.state() == SourceState::Stopped) {
            if let Some(done) = self.current.take() {
                self.last_position = done.position();
                self.retired.push(done);
            }
        }
    }

    // ---- queries ----

    #[inline] pub fn crossfade(&self) -> &CrossfadeController { &self.crossfade }
    #[inline] pub fn crossfade_mut(&mut self) -> &mut CrossfadeController { &mut self.crossfade }
    #[inline] pub fn is_crossfading(&self) -> bool { self.crossfade.is_active() }

    /// Some source is scheduled or playing.
    pub fn is_audible(&self) -> bool {
        [self.current.as_ref(), self.pending.as_ref()].into_iter().flatten().any(Source::is_live)
    }

    /// Position (seconds) of the current source, or where the last one finished.
    pub fn current_position(&self) -> f64 {
        self.current.as_ref().map_or(self.last_position, Source::position)
    }

    pub fn current_duration(&self) -> Option<f64> {
        self.current.as_ref().map(Source::duration)
    }

    #[inline] pub fn current_id(&self) -> Option<SourceId> { self.current.as_ref().map(Source::id) }
    #[inline] pub fn pending_id(&self) -> Option<SourceId> { self.pending.as_ref().map(Source::id) }
    #[inline] pub fn preloaded_id(&self) -> Option<SourceId> { self.preloaded.as_ref().map(Source::id) }
    #[inline] pub fn retired_count(&self) -> usize { self.retired.len() }

    pub fn snapshot(&self, now: f64, master: f32, transport: TransportState) -> PlaybackSnapshot {
        let view = |s: &Source| SourceSnapshot {
            id: s.id(),
            state: s.state(),
            start_time: s.start_time(),
            position: s.position(),
            duration: s.duration(),
            gain: if s.is_live() { s.fader().value_at(now) * master } else { 0.0 },
        };
        let current = self.current.as_ref().map(view);
        let pending = self.pending.as_ref().map(view);
        let crossfade = self.crossfade.active().map(|s| CrossfadeSnapshot {
            outgoing: s.outgoing,
            incoming: s.incoming,
            start: s.start,
            duration: s.duration,
            progress: s.progress(now),
            outgoing_gain: current.map_or(0.0, |c| c.gain),
            incoming_gain: pending.map_or(0.0, |p| p.gain),
        });
        PlaybackSnapshot {
            clock_time: now,
            transport,
            master_volume: master,
            current,
            pending,
            preloaded: self.preloaded.as_ref().map(|s| SourceSnapshot { gain: 0.0, ..view(s) }),
            crossfade,
        }
    }
}

fn check_offset(offset: f64, duration: f64) -> Result<()> {
    if !offset.is_finite() || offset < 0.0 || offset > duration {
        return Err(EngineError::SeekOutOfRange { requested: offset, duration });
    }
    Ok(())
}

/// Stop `source` if it is still live and report why.
fn end(source: &mut Source, now: f64, reason: EndReason, events: &mut EventQueue) {
    if source.is_live() {
        source.stop();
        events.push(EngineEvent::SourceEnded { id: source.id(), at: now, reason });
    }
}

/// Control-path disposal: end the source and drop it here.
fn dispose(mut source: Source, now: f64, reason: EndReason, events: &mut EventQueue) {
    end(&mut source, now, reason, events);
    debug!("source {} disposed ({reason:?})", source.id());
}
