//! Convolution reverb.
//!
//! Design
//! - Synthetic impulse response: seeded white noise per channel, darkened by a
//!   one-pole low-pass, shaped by an exponential envelope that reaches -60 dB at
//!   the end, then energy-normalized.
//! - Uniformly partitioned overlap-save convolution: the IR is cut into
//!   `PARTITION`-frame blocks, each held as a `2 * PARTITION` spectrum. Input
//!   spectra go through a frequency-domain delay line and are multiplied against
//!   the IR partitions once per block.
//! - The wet path has one partition of latency; the dry path has none.
//!
//! All buffers are allocated at construction. `process_frame` only runs FFTs
//! into preallocated scratch space.

use std::sync::Arc;

use cadenza_core::dsp::{kill_denormals, wet_dry};
use cadenza_core::filters::OnePoleLP;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::effects::ReverbParams;
use crate::graph::Processor;

/// Partition length in frames.
pub const PARTITION: usize = 512;

const MIN_IR_SECONDS: f32 = 0.3;
const MAX_IR_SECONDS: f32 = 4.0;
const BRIGHT_CUTOFF_HZ: f32 = 12_000.0;
const DARK_CUTOFF_HZ: f32 = 1_500.0;
/// ln(1000): the envelope falls by 60 dB over the IR.
const DECAY_60DB: f32 = 6.907_755;

/// IR length in seconds for a room size in [0, 1].
#[inline]
pub fn ir_seconds(room_size: f32) -> f32 {
    MIN_IR_SECONDS + (MAX_IR_SECONDS - MIN_IR_SECONDS) * room_size
}

/// Tail low-pass cutoff for a dampening amount in [0, 1] (exponential sweep).
#[inline]
pub fn damping_cutoff_hz(dampening: f32) -> f32 {
    BRIGHT_CUTOFF_HZ * (DARK_CUTOFF_HZ / BRIGHT_CUTOFF_HZ).powf(dampening)
}

/// Generate one impulse response per channel.
pub fn synthesize_ir(params: &ReverbParams, sr: f32, channels: usize, seed: u64) -> Vec<Vec<f32>> {
    let len = ((ir_seconds(params.room_size) * sr) as usize).max(1);
    let cutoff = damping_cutoff_hz(params.dampening);
    (0..channels)
        .map(|ch| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(ch as u64));
            let mut lp = OnePoleLP::new(cutoff, sr);
            let mut ir: Vec<f32> = (0..len)
                .map(|i| {
                    let noise = rng.gen_range(-1.0f32..=1.0);
                    let env = (-DECAY_60DB * i as f32 / len as f32).exp();
                    lp.process(noise) * env
                })
                .collect();
            let energy: f32 = ir.iter().map(|x| x * x).sum();
            if energy > 0.0 {
                let norm = energy.sqrt().recip();
                ir.iter_mut().for_each(|x| *x *= norm);
            }
            ir
        })
        .collect()
}

/// Overlap-save state for one channel.
struct ChannelConvolver {
    /// IR partition spectra.
    partitions: Vec<Vec<Complex<f32>>>,
    /// Frequency-domain delay line of past input blocks (ring, newest at `head`).
    fdl: Vec<Vec<Complex<f32>>>,
    head: usize,
    /// `[previous block | current block]`.
    input: Vec<f32>,
    output: Vec<f32>,
    acc: Vec<Complex<f32>>,
}

impl ChannelConvolver {
    fn new(ir: &[f32], fft: &dyn Fft<f32>, scratch: &mut [Complex<f32>]) -> Self {
        let n = 2 * PARTITION;
        let partitions: Vec<Vec<Complex<f32>>> = ir
            .chunks(PARTITION)
            .map(|chunk| {
                let mut spec = vec![Complex::new(0.0, 0.0); n];
                for (dst, &h) in spec.iter_mut().zip(chunk) {
                    dst.re = h;
                }
                fft.process_with_scratch(&mut spec, scratch);
                spec
            })
            .collect();
        let count = partitions.len().max(1);
        Self {
            partitions,
            fdl: vec![vec![Complex::new(0.0, 0.0); n]; count],
            head: 0,
            input: vec![0.0; n],
            output: vec![0.0; PARTITION],
            acc: vec![Complex::new(0.0, 0.0); n],
        }
    }

    fn process_block(&mut self, fwd: &dyn Fft<f32>, inv: &dyn Fft<f32>, scratch: &mut [Complex<f32>]) {
        let n = 2 * PARTITION;
        let count = self.fdl.len();
        self.head = (self.head + 1) % count;

        let slot = &mut self.fdl[self.head];
        for (dst, &x) in slot.iter_mut().zip(&self.input) {
            *dst = Complex::new(x, 0.0);
        }
        fwd.process_with_scratch(slot, scratch);

        self.acc.iter_mut().for_each(|c| *c = Complex::new(0.0, 0.0));
        for (k, part) in self.partitions.iter().enumerate() {
            let past = &self.fdl[(self.head + count - k) % count];
            for ((a, &x), &h) in self.acc.iter_mut().zip(past).zip(part) {
                *a += x * h;
            }
        }
        inv.process_with_scratch(&mut self.acc, scratch);

        let scale = 1.0 / n as f32;
        for (o, a) in self.output.iter_mut().zip(&self.acc[PARTITION..]) {
            *o = kill_denormals(a.re * scale);
        }
        self.input.copy_within(PARTITION.., 0);
    }

    fn reset(&mut self) {
        for block in &mut self.fdl {
            block.fill(Complex::new(0.0, 0.0));
        }
        self.input.fill(0.0);
        self.output.fill(0.0);
        self.head = 0;
    }
}

/// Multi-channel convolution reverb with wet/dry mix.
pub struct ConvolutionReverb {
    channels: Vec<ChannelConvolver>,
    fwd: Arc<dyn Fft<f32>>,
    inv: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
    /// Position inside the current block.
    pos: usize,
    mix: f32,
    params: ReverbParams,
}

impl ConvolutionReverb {
    /// Build from validated parameters; the IR is synthesized with `seed`.
    pub fn new(params: ReverbParams, sr: f32, channels: usize, seed: u64) -> Self {
        let ir = synthesize_ir(&params, sr, channels, seed);
        let mut reverb = Self::with_impulse_response(&ir, params.mix);
        reverb.params = params;
        reverb
    }

    /// Build from an explicit impulse response, one slice per channel.
    pub fn with_impulse_response(ir: &[Vec<f32>], mix: f32) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fwd = planner.plan_fft_forward(2 * PARTITION);
        let inv = planner.plan_fft_inverse(2 * PARTITION);
        let len = fwd.get_inplace_scratch_len().max(inv.get_inplace_scratch_len());
        let mut scratch = vec![Complex::new(0.0, 0.0); len];
        let channels = ir
            .iter()
            .map(|h| ChannelConvolver::new(h, fwd.as_ref(), &mut scratch))
            .collect();
        Self {
            channels,
            fwd,
            inv,
            scratch,
            pos: 0,
            mix,
            params: ReverbParams { mix, ..ReverbParams::default() },
        }
    }

    #[inline] pub fn params(&self) -> &ReverbParams { &self.params }
}

impl Processor for ConvolutionReverb {
    fn reset(&mut self) {
        self.channels.iter_mut().for_each(ChannelConvolver::reset);
        self.pos = 0;
    }

    fn process_frame(&mut self, frame: &mut [f32]) {
        let pos = self.pos;
        for (x, ch) in frame.iter_mut().zip(self.channels.iter_mut()) {
            let wet = ch.output[pos];
            ch.input[PARTITION + pos] = *x;
            *x = wet_dry(*x, wet, self.mix);
        }
        self.pos += 1;
        if self.pos == PARTITION {
            self.pos = 0;
            for ch in &mut self.channels {
                ch.process_block(self.fwd.as_ref(), self.inv.as_ref(), &mut self.scratch);
            }
        }
    }
}

impl core::fmt::Debug for ConvolutionReverb {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConvolutionReverb")
            .field("channels", &self.channels.len())
            .field("partitions", &self.channels.first().map_or(0, |c| c.partitions.len()))
            .field("params", &self.params)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lcg(seed: &mut u32) -> f32 {
        *seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (*seed >> 8) as f32 / (1u32 << 24) as f32 - 0.5
    }

    #[test]
    fn matches_direct_convolution() {
        let mut seed = 1;
        let ir: Vec<f32> = (0..700).map(|_| lcg(&mut seed)).collect();
        let input: Vec<f32> = (0..3000).map(|_| lcg(&mut seed)).collect();
        let mut rev = ConvolutionReverb::with_impulse_response(&[ir.clone()], 1.0);

        let out: Vec<f32> = input
            .iter()
            .map(|&x| {
                let mut f = [x];
                rev.process_frame(&mut f);
                f[0]
            })
            .collect();

        for n in [PARTITION, PARTITION + 1, 900, 1500, 2999] {
            let m = n - PARTITION;
            let direct: f32 = (0..=m.min(ir.len() - 1)).map(|k| ir[k] * input[m - k]).sum();
            assert!((out[n] - direct).abs() < 1e-3, "n={n} got={} want={direct}", out[n]);
        }
    }

    #[test]
    fn dry_mix_is_passthrough() {
        let params = ReverbParams { mix: 0.0, ..ReverbParams::default() };
        let mut rev = ConvolutionReverb::new(params, 8_000.0, 2, 7);
        let mut f = [0.5, -0.5];
        rev.process_frame(&mut f);
        assert_eq!(f, [0.5, -0.5]);
    }

    #[test]
    fn synthetic_ir_shape() {
        let params = ReverbParams { room_size: 0.0, dampening: 0.5, mix: 0.5 };
        let a = synthesize_ir(&params, 10_000.0, 2, 42);
        let b = synthesize_ir(&params, 10_000.0, 2, 42);
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 3_000);
        assert_ne!(a[0], a[1]);

        let energy: f32 = a[0].iter().map(|x| x * x).sum();
        assert!((energy - 1.0).abs() < 1e-3);
        let head: f32 = a[0][..300].iter().map(|x| x.abs()).sum();
        let tail: f32 = a[0][2700..].iter().map(|x| x.abs()).sum();
        assert!(head > 50.0 * tail);
    }

    #[test]
    fn parameter_mappings() {
        assert!((ir_seconds(1.0) - 4.0).abs() < 1e-6);
        assert!((damping_cutoff_hz(0.0) - 12_000.0).abs() < 1e-2);
        assert!((damping_cutoff_hz(1.0) - 1_500.0).abs() < 1e-2);
    }

    #[test]
    fn reset_silences_tail() {
        let mut rev = ConvolutionReverb::new(ReverbParams { mix: 1.0, ..Default::default() }, 8_000.0, 1, 3);
        let mut f = [1.0];
        rev.process_frame(&mut f);
        for _ in 0..PARTITION {
            rev.process_frame(&mut [0.0]);
        }
        rev.reset();
        for _ in 0..(2 * PARTITION) {
            let mut f = [0.0];
            rev.process_frame(&mut f);
            assert_eq!(f[0], 0.0);
        }
    }
}
