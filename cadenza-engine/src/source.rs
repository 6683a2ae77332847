//! Playable sources.
//!
//! A [`Source`] binds a shared [`PcmBuffer`] to the engine clock. Its lifecycle:
//!
//! ```text
//! Idle ──schedule──▶ Scheduled ──clock reaches start──▶ Playing ──stop / exhausted──▶ Stopped
//!                       ▲                                  │
//!                       └──────────── schedule (seek) ─────┘
//! ```
//!
//! Stopped is terminal. Each source carries its own fader timeline; the
//! crossfade controller programs ramps on it, everything else leaves it at 1.

use std::sync::Arc;

use cadenza_core::automation::ParamTimeline;
use serde::Serialize;

use crate::buffer::PcmBuffer;
use crate::nodes::ChannelMap;

/// Engine-unique source identifier, increasing with every source created.
pub type SourceId = u64;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceState {
    Idle,
    Scheduled,
    Playing,
    Stopped,
}

#[derive(Clone, Debug)]
pub struct Source {
    id: SourceId,
    buffer: Arc<PcmBuffer>,
    state: SourceState,
    map: ChannelMap,
    /// Buffer frames consumed per engine frame.
    step: f64,
    start_time: f64,
    /// Fractional read position in buffer frames.
    cursor: f64,
    fader: ParamTimeline,
}

impl Source {
    pub fn new(id: SourceId, buffer: Arc<PcmBuffer>, engine_rate: u32, output_channels: usize) -> Self {
        let step = f64::from(buffer.sample_rate()) / f64::from(engine_rate.max(1));
        let map = ChannelMap::new(buffer.channel_count(), output_channels);
        Self {
            id,
            buffer,
            state: SourceState::Idle,
            map,
            step,
            start_time: 0.0,
            cursor: 0.0,
            fader: ParamTimeline::new(1.0),
        }
    }

    #[inline] pub fn id(&self) -> SourceId { self.id }
    #[inline] pub fn state(&self) -> SourceState { self.state }
    #[inline] pub fn start_time(&self) -> f64 { self.start_time }
    #[inline] pub fn duration(&self) -> f64 { self.buffer.duration() }
    #[inline] pub fn fader(&self) -> &ParamTimeline { &self.fader }
    #[inline] pub fn fader_mut(&mut self) -> &mut ParamTimeline { &mut self.fader }

    /// Scheduled or playing: the source will produce audio.
    #[inline]
    pub fn is_live(&self) -> bool {
        matches!(self.state, SourceState::Scheduled | SourceState::Playing)
    }

    /// Playback position in seconds, clamped to the buffer duration.
    pub fn position(&self) -> f64 {
        (self.cursor / f64::from(self.buffer.sample_rate())).min(self.duration())
    }

    /// Arm the source to start at `start_time` (engine clock), reading from `offset` seconds.
    /// Rescheduling a playing source restarts it at the new offset. Stopped sources stay stopped.
    pub fn schedule(&mut self, start_time: f64, offset: f64) {
        if self.state == SourceState::Stopped {
            return;
        }
        self.start_time = self.start_time.max(start_time);
        self.cursor = offset.max(0.0) * f64::from(self.buffer.sample_rate());
        self.state = SourceState::Scheduled;
    }

    /// Promote Scheduled → Playing once the clock reaches the start time.
    /// Returns true on the frame where that happens.
    #[inline]
    pub fn activate(&mut self, now: f64) -> bool {
        if self.state == SourceState::Scheduled && now >= self.start_time {
            self.state = SourceState::Playing;
            true
        } else {
            false
        }
    }

    /// Mix one engine frame into `out` at clock time `t`.
    /// Returns true when the buffer runs out on this frame.
    #[inline]
    pub fn render_frame(&mut self, t: f64, out: &mut [f32]) -> bool {
        if self.state != SourceState::Playing {
            return false;
        }
        if self.cursor >= self.buffer.frames() as f64 {
            self.stop();
            return true;
        }
        let gain = self.fader.value_at(t);
        if gain != 0.0 {
            self.map.accumulate(&self.buffer, self.cursor, gain, out);
        }
        self.cursor += self.step;
        if self.cursor >= self.buffer.frames() as f64 {
            self.stop();
            return true;
        }
        false
    }

    /// Stop immediately and silence the fader.
    pub fn stop(&mut self) {
        self.state = SourceState::Stopped;
        self.fader.set_value(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(sr: u32, frames: usize) -> Arc<PcmBuffer> {
        let data = (0..frames).map(|i| i as f32 / frames as f32).collect();
        Arc::new(PcmBuffer::new(sr, vec![data]).unwrap())
    }

    #[test]
    fn lifecycle() {
        let mut s = Source::new(1, ramp(1000, 10), 1000, 1);
        assert_eq!(s.state(), SourceState::Idle);
        s.schedule(0.005, 0.0);
        assert!(!s.activate(0.004));
        assert!(s.activate(0.005));
        assert_eq!(s.state(), SourceState::Playing);

        let mut out = [0.0f32];
        let mut ended = false;
        for i in 0..10 {
            out[0] = 0.0;
            ended = s.render_frame(0.005 + f64::from(i) / 1000.0, &mut out);
        }
        assert!(ended);
        assert_eq!(s.state(), SourceState::Stopped);
        assert!((s.position() - s.duration()).abs() < 1e-12);

        s.schedule(1.0, 0.0);
        assert_eq!(s.state(), SourceState::Stopped);
    }

    #[test]
    fn rate_conversion_steps_through_buffer() {
        // 500 Hz buffer on a 1000 Hz engine: two engine frames per buffer frame
        let mut s = Source::new(1, ramp(500, 4), 1000, 1);
        s.schedule(0.0, 0.0);
        s.activate(0.0);
        let mut got = Vec::new();
        for i in 0..8 {
            let mut out = [0.0f32];
            s.render_frame(f64::from(i) / 1000.0, &mut out);
            got.push(out[0]);
        }
        assert!((got[1] - 0.125).abs() < 1e-6);
        assert!((got[2] - 0.25).abs() < 1e-6);
        assert_eq!(s.state(), SourceState::Stopped);
    }

    #[test]
    fn reschedule_moves_cursor() {
        let mut s = Source::new(7, ramp(1000, 1000), 1000, 2);
        s.schedule(0.0, 0.0);
        s.activate(0.0);
        s.schedule(0.0, 0.4);
        assert_eq!(s.state(), SourceState::Scheduled);
        assert!((s.position() - 0.4).abs() < 1e-12);
    }
}
