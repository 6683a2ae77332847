//! Feedback delay.
//!
//! One circular line per channel, `sample_rate + 1` frames long so a full second
//! of delay fits. Per channel and frame:
//!
//! ```text
//! delayed = line[write - delay]
//! line[write] = x + feedback · delayed
//! y = x · (1 - mix) + delayed · mix
//! ```

use cadenza_core::dsp::{kill_denormals, wet_dry};

use crate::effects::DelayParams;
use crate::graph::Processor;

#[derive(Clone, Debug)]
pub struct FeedbackDelay {
    lines: Vec<Vec<f32>>,
    write: usize,
    delay_frames: usize,
    params: DelayParams,
}

impl FeedbackDelay {
    /// `params` must already be validated.
    pub fn new(params: DelayParams, sr: f32, channels: usize) -> Self {
        let len = sr as usize + 1;
        let delay_frames = ((params.delay_time * sr).round() as usize).clamp(1, len - 1);
        Self { lines: vec![vec![0.0; len]; channels], write: 0, delay_frames, params }
    }

    #[inline] pub fn delay_frames(&self) -> usize { self.delay_frames }
    #[inline] pub fn params(&self) -> &DelayParams { &self.params }
}

impl Processor for FeedbackDelay {
    fn reset(&mut self) {
        self.lines.iter_mut().for_each(|l| l.fill(0.0));
        self.write = 0;
    }

    #[inline]
    fn process_frame(&mut self, frame: &mut [f32]) {
        let Some(len) = self.lines.first().map(Vec::len) else { return };
        let read = (self.write + len - self.delay_frames) % len;
        let DelayParams { feedback, mix, .. } = self.params;
        for (x, line) in frame.iter_mut().zip(self.lines.iter_mut()) {
            let delayed = line[read];
            line[self.write] = kill_denormals(*x + feedback * delayed);
            *x = wet_dry(*x, delayed, mix);
        }
        self.write = (self.write + 1) % len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse_response(params: DelayParams, sr: f32, frames: usize) -> Vec<f32> {
        let mut d = FeedbackDelay::new(params, sr, 1);
        (0..frames)
            .map(|i| {
                let mut f = [if i == 0 { 1.0 } else { 0.0 }];
                d.process_frame(&mut f);
                f[0]
            })
            .collect()
    }

    #[test]
    fn echoes_repeat_with_feedback() {
        let p = DelayParams { delay_time: 0.01, feedback: 0.5, mix: 0.5 };
        let y = impulse_response(p, 1_000.0, 40);
        assert_eq!(y[0], 0.5);
        assert_eq!(y[10], 0.5);
        assert_eq!(y[20], 0.25);
        assert_eq!(y[30], 0.125);
        assert_eq!(y[5], 0.0);
    }

    #[test]
    fn zero_time_is_one_frame() {
        let p = DelayParams { delay_time: 0.0, feedback: 0.0, mix: 1.0 };
        let d = FeedbackDelay::new(p, 1_000.0, 2);
        assert_eq!(d.delay_frames(), 1);
        let y = impulse_response(p, 1_000.0, 3);
        assert_eq!(y, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn full_second_fits() {
        let p = DelayParams { delay_time: 1.0, feedback: 0.0, mix: 1.0 };
        let y = impulse_response(p, 100.0, 101);
        assert_eq!(y[100], 1.0);
    }
}
