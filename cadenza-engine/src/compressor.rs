//! Feed-forward dynamics compressor.
//!
//! Stereo-linked peak detection: the loudest channel of each frame drives one
//! gain for all channels, so the stereo image does not wander. The level goes
//! through the soft-knee [`GainComputer`], the reduction is smoothed in dB by
//! [`ReductionSmoother`], and no make-up gain is applied.

use cadenza_core::dsp::{db_to_lin, lin_to_db, wet_dry};
use cadenza_core::dynamics::{GainComputer, ReductionSmoother};

use crate::effects::CompressorParams;
use crate::graph::Processor;

#[derive(Clone, Debug)]
pub struct Compressor {
    computer: GainComputer,
    smoother: ReductionSmoother,
    params: CompressorParams,
}

impl Compressor {
    /// `params` must already be validated.
    pub fn new(params: CompressorParams, sr: f32) -> Self {
        Self {
            computer: GainComputer::new(params.threshold_db, params.knee_db, params.ratio),
            smoother: ReductionSmoother::new(params.attack, params.release, sr),
            params,
        }
    }

    /// Current gain reduction in dB (≤ 0), for meters.
    #[inline]
    pub fn gain_reduction_db(&self) -> f32 {
        self.smoother.value()
    }

    #[inline] pub fn params(&self) -> &CompressorParams { &self.params }
}

impl Processor for Compressor {
    fn reset(&mut self) {
        self.smoother.reset();
    }

    #[inline]
    fn process_frame(&mut self, frame: &mut [f32]) {
        let peak = frame.iter().fold(0.0f32, |m, x| m.max(x.abs()));
        let target = self.computer.reduction_db(lin_to_db(peak));
        let gain = db_to_lin(self.smoother.process(target));
        for x in frame.iter_mut() {
            *x = wet_dry(*x, *x * gain, self.params.mix);
        }
    }
}
