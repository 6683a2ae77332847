//! Generic DSP utilities and math helpers.
//!
//! Design goals:
//! - Math backend selection behind one switch (`fast-math`)
//! - Clean, side-effect free helpers that are easy to test
//! - Crossfade laws shared by the automation timeline and the engine
//!
//! Features used by this file:
//! - `fast-math` : enables polynomial approximations for sin/cos (faster, approx.)
//!
//! Conventions:
//! - All functions are `#[inline]` where useful to help the optimizer.
//! - Argument and return domains are documented per function.

#![allow(clippy::excessive_precision)]

use core::f32::consts::{FRAC_PI_2, PI};

use cfg_if::cfg_if;

// ----------------------------- Math backend selection -----------------------------

cfg_if! {
    if #[cfg(feature = "fast-math")] {
        #[inline] fn m_sin(x: f32) -> f32 { fast_sin(x) }
        #[inline] fn m_cos(x: f32) -> f32 { fast_sin(x + FRAC_PI_2) }
    } else {
        #[inline] fn m_sin(x: f32) -> f32 { x.sin() }
        #[inline] fn m_cos(x: f32) -> f32 { x.cos() }
    }
}

// --------------------------------- Constants -------------------------------------

/// 2π (commonly useful)
pub const TAU: f32 = 2.0 * PI;

/// A very small epsilon used in denormal handling and safe divisions.
pub const EPS_SMALL: f32 = 1.0e-20;

/// Floor used when converting silence to dB.
pub const DB_FLOOR: f32 = -120.0;

// --------------------------------- Utilities -------------------------------------

#[inline]
pub fn clamp(x: f32, lo: f32, hi: f32) -> f32 {
    if x < lo { lo } else if x > hi { hi } else { x }
}

#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Kill denormal/subnormal values. Returns 0.0 if |x| < EPS_SMALL.
#[inline]
pub fn kill_denormals(x: f32) -> f32 {
    if x.abs() < EPS_SMALL { 0.0 } else { x }
}

// --------------------------------- dB / linear -----------------------------------

/// Convert dB to linear gain: lin = 10^(db/20).
#[inline]
pub fn db_to_lin(db: f32) -> f32 {
    if db <= DB_FLOOR { 0.0 } else { (0.11512925464970229_f32 * db).exp() } // ln(10)/20
}

/// Convert linear gain to dB: db = 20*log10(lin). Silence maps to [`DB_FLOOR`].
#[inline]
pub fn lin_to_db(lin: f32) -> f32 {
    if lin <= EPS_SMALL { DB_FLOOR }
    else { 8.685889638065036553_f32 * lin.ln() } // 20/ln(10)
}

// --------------------------------- Fast trig -------------------------------------

/// Fast sine with range reduction into [-π, π] and a 5th-order odd polynomial.
/// Max abs error ~1e-3; only routed into the math backend with `fast-math`.
#[inline]
pub fn fast_sin(x: f32) -> f32 {
    let k = (x / TAU).round();
    let xr = x - k * TAU;
    let x2 = xr * xr;
    xr * (0.999_979_313_3 + x2 * (-0.166_624_432_0 + x2 * 0.008_308_978_98))
}

// --------------------------------- Crossfade laws --------------------------------

/// Equal-power gain pair `(outgoing, incoming)` for progress `p` in [0,1].
///
/// `outgoing = cos(π/2 · p)`, `incoming = sin(π/2 · p)`, so `out² + in² = 1`.
#[inline]
pub fn equal_power_gains(p: f32) -> (f32, f32) {
    let x = clamp(p, 0.0, 1.0) * FRAC_PI_2;
    (m_cos(x), m_sin(x))
}

/// Linear gain pair `(outgoing, incoming)` for progress `p` in [0,1]; `out + in = 1`.
#[inline]
pub fn linear_gains(p: f32) -> (f32, f32) {
    let p = clamp(p, 0.0, 1.0);
    (1.0 - p, p)
}

// --------------------------------- Exponentials / smoothing ----------------------

/// One-pole smoothing coefficient for a time constant `t_ms` (milliseconds).
///
/// The discrete one-pole form: `y[n] = x[n] + a * (y[n-1] - x[n])`
/// where `a = exp(-1/(tau * sr))` for first-order lag with time constant `tau`.
///
/// A zero time constant returns `0.0`, i.e. the follower jumps to its target.
#[inline]
pub fn one_pole_coeff_ms(t_ms: f32, sr: f32) -> f32 {
    if t_ms <= 0.0 { return 0.0; }
    let tau = t_ms * 0.001;
    (-1.0 / (tau * sr)).exp()
}

/// Convert cutoff in Hz to a simple one-pole (non-TPT) coefficient `exp(-2π fc / sr)`.
#[inline]
pub fn one_pole_coeff_hz(cut_hz: f32, sr: f32) -> f32 {
    let fc = cut_hz.max(0.0).min(0.499 * sr);
    (-2.0 * PI * fc / sr).exp()
}

// --------------------------------- Mixing ----------------------------------------

/// Dry/wet blend of one sample.
#[inline]
pub fn wet_dry(dry: f32, wet: f32, mix: f32) -> f32 {
    dry * (1.0 - mix) + wet * mix
}

// --------------------------------- Tests ------------------------------------------
