//! Filters: a lightweight one-pole low-pass and RBJ biquads for equalization.
//!
//! Goals
//! - Allocation free, per-sample processing
//! - Coefficients separated from state, so one band can drive N channels
//! - Clear APIs and predictable parameterization
//!
//! Contents
//! - `OnePoleLP`    : “RC-style” one-pole low-pass (tone shaping, IR damping)
//! - `BiquadKind`   : peaking / low-shelf / high-shelf
//! - `Biquad`       : normalized coefficients (RBJ Audio EQ Cookbook)
//! - `BiquadState`  : transposed direct form II state, one per channel
//!
//! Notes
//! - `OnePoleLP` uses the inexpensive `y += a * (x - y)` form, where
//!   `a = 1 - exp(-2π fc / sr)`.
//! - Shelves use slope `S = 1`; peaking filters use the supplied `Q`.

use crate::dsp::{kill_denormals, one_pole_coeff_hz, TAU};
use core::fmt::Debug;

/// One-pole low-pass `y += a * (x - y)`.
#[derive(Copy, Clone, Debug)]
pub struct OnePoleLP {
    a: f32,
    y: f32,
    sr: f32,
    fc: f32,
}

impl OnePoleLP {
    /// Create a low-pass with cutoff `cut_hz` and sample rate `sr`.
    #[inline]
    pub fn new(cut_hz: f32, sr: f32) -> Self {
        let mut s = Self {
            a: 0.0,
            y: 0.0,
            sr: sr.max(1.0),
            fc: cut_hz.max(0.0),
        };
        s.update_coeffs();
        s
    }

    #[inline]
    pub fn set_cutoff_hz(&mut self, cut_hz: f32) {
        self.fc = cut_hz.max(0.0);
        self.update_coeffs();
    }

    #[inline]
    fn update_coeffs(&mut self) {
        self.a = 1.0 - one_pole_coeff_hz(self.fc, self.sr);
    }

    /// Process one sample.
    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        self.y += self.a * (x - self.y);
        kill_denormals(self.y)
    }

    #[inline] pub fn reset(&mut self) { self.y = 0.0; }
}

// ------------------------------------ Biquad -------------------------------------

/// Biquad response shape.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BiquadKind {
    Peaking,
    LowShelf,
    HighShelf,
}

/// Normalized biquad coefficients (`a0 == 1`).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Biquad {
    kind: BiquadKind,
    freq: f32,
    q: f32,
    gain_db: f32,
    sr: f32,
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl Biquad {
    /// Build a filter. `freq` is clamped below Nyquist, `q` to a small positive minimum.
    pub fn new(kind: BiquadKind, freq: f32, q: f32, gain_db: f32, sr: f32) -> Self {
        let mut s = Self {
            kind,
            freq: 0.0,
            q: q.max(1e-3),
            gain_db,
            sr: sr.max(1.0),
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        };
        s.freq = freq.clamp(1.0, 0.45 * s.sr);
        s.recalc();
        s
    }

    #[inline] pub fn kind(&self) -> BiquadKind { self.kind }
    #[inline] pub fn frequency(&self) -> f32 { self.freq }
    #[inline] pub fn gain_db(&self) -> f32 { self.gain_db }

    /// Change the gain (dB) and recompute. Setting the same gain twice is a no-op.
    pub fn set_gain_db(&mut self, gain_db: f32) {
        if self.gain_db.to_bits() == gain_db.to_bits() {
            return;
        }
        self.gain_db = gain_db;
        self.recalc();
    }

    fn recalc(&mut self) {
        let a = 10f32.powf(self.gain_db / 40.0);
        let w0 = TAU * self.freq / self.sr;
        let (sin_w0, cos_w0) = w0.sin_cos();

        let (b0, b1, b2, a0, a1, a2) = match self.kind {
            BiquadKind::Peaking => {
                let alpha = sin_w0 / (2.0 * self.q);
                (
                    1.0 + alpha * a,
                    -2.0 * cos_w0,
                    1.0 - alpha * a,
                    1.0 + alpha / a,
                    -2.0 * cos_w0,
                    1.0 - alpha / a,
                )
            }
            BiquadKind::LowShelf => {
                // slope S = 1 → alpha = sin(w0)/2 * sqrt(2)
                let alpha = sin_w0 * core::f32::consts::FRAC_1_SQRT_2;
                let k = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 + k),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 - k),
                    (a + 1.0) + (a - 1.0) * cos_w0 + k,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                    (a + 1.0) + (a - 1.0) * cos_w0 - k,
                )
            }
            BiquadKind::HighShelf => {
                let alpha = sin_w0 * core::f32::consts::FRAC_1_SQRT_2;
                let k = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 + k),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 - k),
                    (a + 1.0) - (a - 1.0) * cos_w0 + k,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
                    (a + 1.0) - (a - 1.0) * cos_w0 - k,
                )
            }
        };

        let inv = 1.0 / a0;
        self.b0 = b0 * inv;
        self.b1 = b1 * inv;
        self.b2 = b2 * inv;
        self.a1 = a1 * inv;
        self.a2 = a2 * inv;
    }

    /// Process one sample against a channel's state (transposed direct form II).
    #[inline]
    pub fn process(&self, state: &mut BiquadState, x: f32) -> f32 {
        let y = self.b0 * x + state.z1;
        state.z1 = kill_denormals(self.b1 * x - self.a1 * y + state.z2);
        state.z2 = kill_denormals(self.b2 * x - self.a2 * y);
        y
    }

    /// Magnitude response in dB at `freq` Hz.
    pub fn magnitude_db(&self, freq: f32) -> f32 {
        let w = f64::from(TAU * freq / self.sr);
        let (s1, c1) = w.sin_cos();
        let (s2, c2) = (2.0 * w).sin_cos();
        let (b0, b1, b2) = (f64::from(self.b0), f64::from(self.b1), f64::from(self.b2));
        let (a1, a2) = (f64::from(self.a1), f64::from(self.a2));

        // H(e^jw) with z^-1 = cos w - j sin w
        let num_re = b0 + b1 * c1 + b2 * c2;
        let num_im = -(b1 * s1 + b2 * s2);
        let den_re = 1.0 + a1 * c1 + a2 * c2;
        let den_im = -(a1 * s1 + a2 * s2);
        let mag2 = (num_re * num_re + num_im * num_im) / (den_re * den_re + den_im * den_im);
        (10.0 * mag2.log10()) as f32
    }
}

/// Per-channel biquad memory.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct BiquadState {
    z1: f32,
    z2: f32,
}

impl BiquadState {
    #[inline] pub fn reset(&mut self) { *self = Self::default(); }
}

// ------------------------------------ Tests --------------------------------------
