//! Engine clock and global transport.
//!
//! The clock counts rendered frames at the engine sample rate. Every scheduled
//! event (source starts, fader ramps, crossfade completion) is expressed in
//! seconds on this clock, so automation stays sample-accurate no matter how the
//! host slices its callbacks.

use serde::{Deserialize, Serialize};

/// Monotonic frame counter. Advances only while the engine renders.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EngineClock {
    sample_rate: u32,
    frames: u64,
}

impl EngineClock {
    #[inline]
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate: sample_rate.max(1), frames: 0 }
    }

    #[inline] pub fn sample_rate(&self) -> u32 { self.sample_rate }
    #[inline] pub fn frames(&self) -> u64 { self.frames }

    /// Current time in seconds.
    #[inline]
    pub fn now(&self) -> f64 {
        self.time_of(self.frames)
    }

    /// Time in seconds of an absolute frame index.
    #[inline]
    pub fn time_of(&self, frame: u64) -> f64 {
        frame as f64 / f64::from(self.sample_rate)
    }

    #[inline]
    pub fn advance(&mut self, frames: u64) {
        self.frames += frames;
    }
}

/// State of the single global transport shared by every live source.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    Running,
    /// Paused by the caller.
    Paused,
    /// The output device went away; `resume()` clears it.
    Suspended,
}

impl TransportState {
    #[inline]
    pub fn is_running(self) -> bool {
        self == TransportState::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_counts_frames_exactly() {
        let mut c = EngineClock::new(48_000);
        assert_eq!(c.now(), 0.0);
        for _ in 0..375 {
            c.advance(128);
        }
        assert_eq!(c.frames(), 48_000);
        assert_eq!(c.now(), 1.0);
        assert_eq!(c.time_of(24_000), 0.5);
    }

    #[test]
    fn transport_flags() {
        assert!(TransportState::Running.is_running());
        assert!(!TransportState::Suspended.is_running());
    }
}
