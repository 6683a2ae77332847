//! Small per-frame building blocks shared by the graph and the sources.
//!
//! Contents:
//! - `OnePoleSmoother` : parameter smoothing (de-zippers the master volume)
//! - `GainStage`       : master gain, validated to [0, 1]
//! - `ChannelMap`      : how a source's channels land on the output channels
//!
//! Everything here is allocation free and cheap to copy.

use cadenza_core::dsp::one_pole_coeff_ms;

use crate::buffer::PcmBuffer;
use crate::error::{check_param, Result};
use crate::graph::Processor;

/// Time constant of the master-volume smoother.
const MASTER_SMOOTHING_MS: f32 = 5.0;

/// One-pole parameter smoother: `y += (x - y) * (1 - a)`, with `a = exp(-1/(tau*sr))`.
#[derive(Copy, Clone, Debug)]
pub struct OnePoleSmoother {
    a: f32,
    y: f32,
}

impl OnePoleSmoother {
    #[inline] pub fn new_ms(t_ms: f32, sr: f32) -> Self { Self { a: one_pole_coeff_ms(t_ms, sr), y: 0.0 } }
    #[inline] pub fn reset(&mut self, y0: f32) { self.y = y0; }
    #[inline] pub fn process(&mut self, x: f32) -> f32 { self.y += (x - self.y) * (1.0 - self.a); self.y }
    #[inline] pub fn value(&self) -> f32 { self.y }
}

/// The persistent master gain. Reads report the target; audio follows it through a short smoother.
#[derive(Copy, Clone, Debug)]
pub struct GainStage {
    target: f32,
    smoother: OnePoleSmoother,
}

impl GainStage {
    pub fn new(gain: f32, sr: f32) -> Result<Self> {
        let target = check_param("volume", gain, 0.0, 1.0)?;
        let mut smoother = OnePoleSmoother::new_ms(MASTER_SMOOTHING_MS, sr);
        smoother.reset(target);
        Ok(Self { target, smoother })
    }

    /// Set the gain; fails for non-finite values or values outside [0, 1].
    pub fn set_gain(&mut self, gain: f32) -> Result<()> {
        self.target = check_param("volume", gain, 0.0, 1.0)?;
        Ok(())
    }

    #[inline] pub fn gain(&self) -> f32 { self.target }

    /// Jump straight to the target, skipping the smoothing ramp.
    #[inline] pub fn snap(&mut self) { self.smoother.reset(self.target); }
}

impl Processor for GainStage {
    fn reset(&mut self) {
        self.snap();
    }

    #[inline]
    fn process_frame(&mut self, frame: &mut [f32]) {
        let g = self.smoother.process(self.target);
        for s in frame.iter_mut() {
            *s *= g;
        }
    }
}

/// Mapping from source channels to output channels.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChannelMap {
    /// Same channel count: channel `c` feeds channel `c`.
    Direct,
    /// Mono source copied to every output.
    Spread,
    /// Mono output: average of every source channel.
    Downmix,
    /// Output `c` reads source channel `c % source_channels`.
    Wrap,
}

impl ChannelMap {
    pub fn new(source_channels: usize, output_channels: usize) -> Self {
        if source_channels == output_channels {
            ChannelMap::Direct
        } else if source_channels == 1 {
            ChannelMap::Spread
        } else if output_channels == 1 {
            ChannelMap::Downmix
        } else {
            ChannelMap::Wrap
        }
    }

    /// Add `gain ×` the buffer's frame at fractional position `pos` into `out`.
    #[inline]
    pub fn accumulate(self, buffer: &PcmBuffer, pos: f64, gain: f32, out: &mut [f32]) {
        match self {
            ChannelMap::Direct | ChannelMap::Wrap => {
                let n = buffer.channel_count();
                for (c, o) in out.iter_mut().enumerate() {
                    *o += gain * buffer.sample_at(c % n, pos);
                }
            }
            ChannelMap::Spread => {
                let s = gain * buffer.sample_at(0, pos);
                for o in out.iter_mut() {
                    *o += s;
                }
            }
            ChannelMap::Downmix => {
                let n = buffer.channel_count();
                let sum: f32 = (0..n).map(|c| buffer.sample_at(c, pos)).sum();
                if let Some(o) = out.first_mut() {
                    *o += gain * sum / n as f32;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gain_stage_validates_and_converges() {
        assert!(GainStage::new(1.5, 48000.0).is_err());
        let mut g = GainStage::new(1.0, 48000.0).unwrap();
        assert!(g.set_gain(f32::NAN).is_err());
        assert_eq!(g.gain(), 1.0);

        g.set_gain(0.25).unwrap();
        let mut frame = [1.0f32; 2];
        for _ in 0..4800 {
            frame = [1.0; 2];
            g.process_frame(&mut frame);
        }
        assert!((frame[0] - 0.25).abs() < 1e-3);

        g.set_gain(0.5).unwrap();
        g.snap();
        let mut frame = [1.0f32];
        g.process_frame(&mut frame);
        assert_eq!(frame[0], 0.5);
    }

    #[test]
    fn channel_maps() {
        assert_eq!(ChannelMap::new(2, 2), ChannelMap::Direct);
        assert_eq!(ChannelMap::new(1, 2), ChannelMap::Spread);
        assert_eq!(ChannelMap::new(2, 1), ChannelMap::Downmix);
        assert_eq!(ChannelMap::new(3, 2), ChannelMap::Wrap);

        let stereo = PcmBuffer::new(8000, vec![vec![0.5], vec![-0.25]]).unwrap();
        let mut mono = [0.0f32];
        ChannelMap::Downmix.accumulate(&stereo, 0.0, 1.0, &mut mono);
        assert!((mono[0] - 0.125).abs() < 1e-6);

        let mono_buf = PcmBuffer::new(8000, vec![vec![0.5]]).unwrap();
        let mut out = [0.1f32; 4];
        ChannelMap::Spread.accumulate(&mono_buf, 0.0, 0.5, &mut out);
        assert!(out.iter().all(|s| (s - 0.35).abs() < 1e-6));
    }
}
