//! Decoded PCM audio.
//!
//! A [`PcmBuffer`] is planar `f32` audio with an explicit sample rate. It is
//! validated on construction and immutable afterwards; sources share it through
//! an `Arc` and it is released when the last source holding it is dropped.

use crate::error::{EngineError, Result};

/// Lowest sample rate accepted for PCM data.
pub const MIN_SAMPLE_RATE: u32 = 3_000;
/// Highest sample rate accepted for PCM data.
pub const MAX_SAMPLE_RATE: u32 = 768_000;
/// Highest channel count accepted for PCM data.
pub const MAX_CHANNELS: usize = 32;

#[derive(Clone, Debug, PartialEq)]
pub struct PcmBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl PcmBuffer {
    /// Build from planar channel data.
    ///
    /// Fails with [`EngineError::InvalidBuffer`] when there are no channels, no
    /// frames, ragged channels, an implausible sample rate, or samples that are
    /// non-finite or outside [-1, 1].
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Result<Self> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
            return Err(EngineError::InvalidBuffer(format!("sample rate {sample_rate} Hz")));
        }
        let Some(first) = channels.first() else {
            return Err(EngineError::InvalidBuffer("no channels".into()));
        };
        if channels.len() > MAX_CHANNELS {
            return Err(EngineError::InvalidBuffer(format!("{} channels", channels.len())));
        }
        let frames = first.len();
        if frames == 0 {
            return Err(EngineError::InvalidBuffer("no frames".into()));
        }
        if let Some(i) = channels.iter().position(|c| c.len() != frames) {
            return Err(EngineError::InvalidBuffer(format!(
                "channel {i} has {} frames, expected {frames}",
                channels[i].len()
            )));
        }
        if channels.iter().flatten().any(|s| !s.is_finite()) {
            return Err(EngineError::InvalidBuffer("non-finite sample".into()));
        }
        if let Some(s) = channels.iter().flatten().find(|s| s.abs() > 1.0) {
            return Err(EngineError::InvalidBuffer(format!("sample {s} outside [-1, 1]")));
        }
        Ok(Self { sample_rate, channels })
    }

    /// Build from interleaved samples.
    pub fn from_interleaved(sample_rate: u32, channel_count: usize, samples: &[f32]) -> Result<Self> {
        if channel_count == 0 {
            return Err(EngineError::InvalidBuffer("no channels".into()));
        }
        if samples.len() % channel_count != 0 {
            return Err(EngineError::InvalidBuffer(format!(
                "{} samples do not divide into {channel_count} channels",
                samples.len()
            )));
        }
        let frames = samples.len() / channel_count;
        let mut planar = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (ch, s) in planar.iter_mut().zip(frame) {
                ch.push(*s);
            }
        }
        Self::new(sample_rate, planar)
    }

    #[inline] pub fn sample_rate(&self) -> u32 { self.sample_rate }
    #[inline] pub fn channel_count(&self) -> usize { self.channels.len() }
    #[inline] pub fn frames(&self) -> usize { self.channels[0].len() }
    #[inline] pub fn channel(&self, index: usize) -> Option<&[f32]> { self.channels.get(index).map(Vec::as_slice) }

    /// Duration in seconds.
    #[inline]
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Linearly interpolated sample of channel `ch` at fractional frame `pos`.
    /// Positions past the last frame read silence.
    #[inline]
    pub fn sample_at(&self, ch: usize, pos: f64) -> f32 {
        let data = &self.channels[ch];
        let i = pos as usize;
        let Some(&s0) = data.get(i) else { return 0.0 };
        let frac = (pos - i as f64) as f32;
        if frac == 0.0 {
            return s0;
        }
        let s1 = data.get(i + 1).copied().unwrap_or(s0);
        s0 + (s1 - s0) * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_buffers() {
        assert!(matches!(PcmBuffer::new(44100, vec![]), Err(EngineError::InvalidBuffer(_))));
        assert!(matches!(PcmBuffer::new(44100, vec![vec![]]), Err(EngineError::InvalidBuffer(_))));
        assert!(PcmBuffer::new(44100, vec![vec![0.0; 4], vec![0.0; 3]]).is_err());
        assert!(PcmBuffer::new(10, vec![vec![0.0; 4]]).is_err());
        assert!(PcmBuffer::new(44100, vec![vec![0.0, f32::NAN]]).is_err());
    }

    #[test]
    fn rejects_samples_outside_unit_range() {
        assert!(matches!(PcmBuffer::new(8000, vec![vec![5.0; 800]]), Err(EngineError::InvalidBuffer(_))));
        assert!(matches!(PcmBuffer::new(8000, vec![vec![0.0, -1.0001]]), Err(EngineError::InvalidBuffer(_))));
        assert!(PcmBuffer::from_interleaved(8000, 2, &[0.5, 1.5]).is_err());
        assert!(PcmBuffer::new(8000, vec![vec![1.0, -1.0, 0.0]]).is_ok());
    }

    #[test]
    fn interleaved_is_split_per_channel() {
        let buf = PcmBuffer::from_interleaved(48000, 2, &[0.1, -0.1, 0.2, -0.2, 0.3, -0.3]).unwrap();
        assert_eq!(buf.channel_count(), 2);
        assert_eq!(buf.frames(), 3);
        assert_eq!(buf.channel(1).unwrap(), &[-0.1, -0.2, -0.3]);
        assert!(PcmBuffer::from_interleaved(48000, 2, &[0.0; 5]).is_err());
    }

    #[test]
    fn duration_and_interpolation() {
        let buf = PcmBuffer::new(4, vec![vec![0.0, 1.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0]]).unwrap_err();
        // 4 Hz is below the accepted range
        assert!(matches!(buf, EngineError::InvalidBuffer(_)));

        let buf = PcmBuffer::new(8000, vec![vec![0.0, 1.0, 0.0, -1.0]]).unwrap();
        assert!((buf.duration() - 0.0005).abs() < 1e-12);
        assert_eq!(buf.sample_at(0, 1.0), 1.0);
        assert!((buf.sample_at(0, 0.5) - 0.5).abs() < 1e-6);
        assert_eq!(buf.sample_at(0, 10.0), 0.0);
    }
}
