//! Dynamics building blocks: static gain curve + gain-reduction smoother.
//!
//! - `GainComputer`      : soft-knee downward compression curve (dB in → dB gain reduction)
//! - `ReductionSmoother` : attack/release one-pole smoothing of the gain reduction
//!
//! Both work in the log domain. Time constants are in seconds and converted with
//! [`one_pole_coeff_ms`].

use crate::dsp::one_pole_coeff_ms;

/// Soft-knee compressor curve.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GainComputer {
    pub threshold_db: f32,
    pub knee_db: f32,
    pub ratio: f32,
}

impl GainComputer {
    #[inline]
    pub fn new(threshold_db: f32, knee_db: f32, ratio: f32) -> Self {
        Self { threshold_db, knee_db: knee_db.max(0.0), ratio: ratio.max(1.0) }
    }

    /// Gain reduction in dB (≤ 0) for an input level `x_db`.
    #[inline]
    pub fn reduction_db(&self, x_db: f32) -> f32 {
        let over = x_db - self.threshold_db;
        let slope = 1.0 / self.ratio - 1.0;
        let w = self.knee_db;
        if 2.0 * over <= -w {
            0.0
        } else if w > 0.0 && 2.0 * over.abs() <= w {
            let k = over + 0.5 * w;
            slope * k * k / (2.0 * w)
        } else {
            slope * over
        }
    }
}

/// Attack/release smoother. Attack applies while reduction deepens, release while it recovers.
#[derive(Copy, Clone, Debug)]
pub struct ReductionSmoother {
    a_att: f32,
    a_rel: f32,
    state_db: f32,
}

impl ReductionSmoother {
    pub fn new(attack_s: f32, release_s: f32, sr: f32) -> Self {
        let mut s = Self { a_att: 0.0, a_rel: 0.0, state_db: 0.0 };
        s.set_times(attack_s, release_s, sr);
        s
    }

    pub fn set_times(&mut self, attack_s: f32, release_s: f32, sr: f32) {
        self.a_att = one_pole_coeff_ms(attack_s * 1000.0, sr);
        self.a_rel = one_pole_coeff_ms(release_s * 1000.0, sr);
    }

    #[inline]
    pub fn process(&mut self, target_db: f32) -> f32 {
        let a = if target_db < self.state_db { self.a_att } else { self.a_rel };
        self.state_db = target_db + a * (self.state_db - target_db);
        self.state_db
    }

    #[inline] pub fn value(&self) -> f32 { self.state_db }
    #[inline] pub fn reset(&mut self) { self.state_db = 0.0; }
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_knee_curve() {
        let gc = GainComputer::new(-24.0, 0.0, 4.0);
        assert_eq!(gc.reduction_db(-30.0), 0.0);
        // 12 dB over → output 3 dB over → 9 dB reduction
        assert!((gc.reduction_db(-12.0) + 9.0).abs() < 1e-4);
    }

    #[test]
    fn soft_knee_is_continuous() {
        let gc = GainComputer::new(-24.0, 12.0, 4.0);
        let lo = gc.reduction_db(-30.0 - 1e-3);
        let lo_in = gc.reduction_db(-30.0 + 1e-3);
        assert!((lo - lo_in).abs() < 1e-3);
        let hi = gc.reduction_db(-18.0 - 1e-3);
        let hi_out = gc.reduction_db(-18.0 + 1e-3);
        assert!((hi - hi_out).abs() < 1e-3);
        assert!(gc.reduction_db(-24.0) < 0.0);
    }

    #[test]
    fn smoother_attacks_then_releases() {
        let sr = 48000.0;
        let mut s = ReductionSmoother::new(0.001, 0.1, sr);
        for _ in 0..480 { s.process(-10.0); }
        assert!(s.value() < -9.9);
        for _ in 0..480 { s.process(0.0); }
        // 10 ms into a 100 ms release: still mostly reduced
        assert!(s.value() < -8.0);
    }
}
