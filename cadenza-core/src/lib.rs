//! Cadenza Core: DSP primitives for the playback engine.
//!
//! Features
//! - `fast-math`: route sin/cos through polynomial approximations
//!
//! Modules
//! - [`dsp`]        : math helpers (db/lin, one-pole coefficients, crossfade laws, mixing)
//! - [`filters`]    : one-pole low-pass, RBJ biquads (peaking / shelves)
//! - [`automation`] : time-stamped parameter automation (set / linear / equal-power ramps)
//! - [`dynamics`]   : compressor gain computer and reduction smoother
//!
//! Design
//! - No allocation in the per-sample paths
//! - Coefficients kept apart from per-channel state
//! - Clock values are `f64` seconds, sample values `f32`

pub mod automation;
pub mod dsp;
pub mod dynamics;
pub mod filters;

/// Commonly used types/functions for convenience:
pub mod prelude {
    pub use crate::automation::{ParamTimeline, RampShape};
    pub use crate::dsp::{
        clamp, db_to_lin, equal_power_gains, kill_denormals, lerp, lin_to_db, linear_gains,
        one_pole_coeff_hz, one_pole_coeff_ms, wet_dry, TAU,
    };
    pub use crate::dynamics::{GainComputer, ReductionSmoother};
    pub use crate::filters::{Biquad, BiquadKind, BiquadState, OnePoleLP};
}

#[cfg(test)]
mod smoke {

    #[test]
    fn prelude_exists() {
        use crate::prelude::*;
        let _ = db_to_lin(-6.0);
        let _ = ParamTimeline::new(1.0).value_at(0.0);
        let mut lp = OnePoleLP::new(1000.0, 48000.0);
        let _ = lp.process(0.1);
    }
}
