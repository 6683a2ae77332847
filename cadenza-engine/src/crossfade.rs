//! # Crossfade Controller
//!
//! Programs the dual fader ramps that overlap an outgoing and an incoming
//! source. Both ramps are written as automation on the sources' fader
//! timelines at invocation time, so they are evaluated exactly at every
//! sample and need no timer.
//!
//! Rules
//! - Duration is clamped to [0.5, 10] s; non-finite durations are rejected
//! - One crossfade at a time; a second request fails with `CrossfadeInProgress`
//! - Completion happens when the clock reaches `start + duration`

use cadenza_core::automation::RampShape;
use cadenza_core::dsp::{equal_power_gains, linear_gains};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::source::{Source, SourceId};

pub const MIN_CROSSFADE_SECONDS: f64 = 0.5;
pub const MAX_CROSSFADE_SECONDS: f64 = 10.0;

/// Clamp a requested crossfade length into range. NaN and infinities are rejected.
pub fn clamp_crossfade_duration(seconds: f64) -> Result<f64> {
    if !seconds.is_finite() {
        return Err(EngineError::invalid("crossfade_duration", seconds, "must be finite"));
    }
    Ok(seconds.clamp(MIN_CROSSFADE_SECONDS, MAX_CROSSFADE_SECONDS))
}

/// Shape of the fader ramps.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrossfadeCurve {
    /// `out = 1 - p`, `in = p`: the gains sum to 1.
    Linear,
    /// `out = cos(πp/2)`, `in = sin(πp/2)`: the powers sum to 1.
    #[default]
    EqualPower,
}

impl CrossfadeCurve {
    #[inline]
    pub fn ramp_shape(self) -> RampShape {
        match self {
            CrossfadeCurve::Linear => RampShape::Linear,
            CrossfadeCurve::EqualPower => RampShape::EqualPower,
        }
    }

    /// `(outgoing, incoming)` fader gains at progress `p`.
    #[inline]
    pub fn gains(self, p: f32) -> (f32, f32) {
        match self {
            CrossfadeCurve::Linear => linear_gains(p),
            CrossfadeCurve::EqualPower => equal_power_gains(p),
        }
    }

    /// The quantity the curve holds constant: `out + in` or `out² + in²`.
    #[inline]
    pub fn conserved(self, outgoing: f32, incoming: f32) -> f32 {
        match self {
            CrossfadeCurve::Linear => outgoing + incoming,
            CrossfadeCurve::EqualPower => outgoing * outgoing + incoming * incoming,
        }
    }
}

/// An active crossfade.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CrossfadeSchedule {
    pub outgoing: SourceId,
    pub incoming: SourceId,
    pub start: f64,
    pub duration: f64,
    pub curve: CrossfadeCurve,
}

impl CrossfadeSchedule {
    #[inline]
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Progress in [0, 1] at clock time `t`.
    #[inline]
    pub fn progress(&self, t: f64) -> f64 {
        ((t - self.start) / self.duration).clamp(0.0, 1.0)
    }

    #[inline]
    pub fn is_complete(&self, t: f64) -> bool {
        t >= self.end()
    }
}

#[derive(Clone, Debug)]
pub struct CrossfadeController {
    duration: f64,
    curve: CrossfadeCurve,
    active: Option<CrossfadeSchedule>,
}

impl CrossfadeController {
    pub fn new(duration: f64, curve: CrossfadeCurve) -> Result<Self> {
        Ok(Self { duration: clamp_crossfade_duration(duration)?, curve, active: None })
    }

    /// Set the default duration; returns the clamped value in effect.
    pub fn set_duration(&mut self, seconds: f64) -> Result<f64> {
        self.duration = clamp_crossfade_duration(seconds)?;
        Ok(self.duration)
    }

    #[inline] pub fn duration(&self) -> f64 { self.duration }
    #[inline] pub fn curve(&self) -> CrossfadeCurve { self.curve }
    #[inline] pub fn active(&self) -> Option<&CrossfadeSchedule> { self.active.as_ref() }
    #[inline] pub fn is_active(&self) -> bool { self.active.is_some() }

    /// Start a crossfade at clock time `now`.
    ///
    /// The outgoing fader ramps from its current value to 0 and the incoming
    /// fader from 0 to 1 over the (clamped) duration. `duration` overrides the
    /// controller default for this crossfade only.
    pub fn begin(
        &mut self,
        outgoing: &mut Source,
        incoming: &mut Source,
        now: f64,
        duration: Option<f64>,
    ) -> Result<CrossfadeSchedule> {
        if self.active.is_some() {
            return Err(EngineError::CrossfadeInProgress);
        }
        let duration = match duration {
            Some(d) => clamp_crossfade_duration(d)?,
            None => self.duration,
        };
        let end = now + duration;
        let shape = self.curve.ramp_shape();

        let out_fader = outgoing.fader_mut();
        let from = out_fader.value_at(now);
        out_fader.cancel_scheduled_values(now);
        out_fader.set_value(from);
        out_fader.set_value_at_time(from, now);
        out_fader.ramp_to_value_at_time(0.0, end, shape);

        let in_fader = incoming.fader_mut();
        in_fader.set_value(0.0);
        in_fader.set_value_at_time(0.0, now);
        in_fader.ramp_to_value_at_time(1.0, end, shape);

        let schedule = CrossfadeSchedule {
            outgoing: outgoing.id(),
            incoming: incoming.id(),
            start: now,
            duration,
            curve: self.curve,
        };
        debug!(
            "crossfade {} -> {} over {:.2}s ({:?})",
            schedule.outgoing, schedule.incoming, duration, self.curve
        );
        self.active = Some(schedule);
        Ok(schedule)
    }

    /// Take the active schedule if it has completed at `now`.
    pub fn take_completed(&mut self, now: f64) -> Option<CrossfadeSchedule> {
        if self.active.is_some_and(|s| s.is_complete(now)) {
            self.active.take()
        } else {
            None
        }
    }

    /// Drop the active schedule without completing it.
    pub fn cancel(&mut self) -> Option<CrossfadeSchedule> {
        self.active.take()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::buffer::PcmBuffer;

    fn source(id: SourceId) -> Source {
        let buf = Arc::new(PcmBuffer::new(1_000, vec![vec![0.5; 10_000]]).unwrap());
        Source::new(id, buf, 1_000, 1)
    }

    #[test]
    fn duration_clamps() {
        assert_eq!(clamp_crossfade_duration(0.1).unwrap(), 0.5);
        assert_eq!(clamp_crossfade_duration(30.0).unwrap(), 10.0);
        assert_eq!(clamp_crossfade_duration(3.0).unwrap(), 3.0);
        assert!(clamp_crossfade_duration(f64::NAN).is_err());
        assert!(clamp_crossfade_duration(f64::INFINITY).is_err());
    }

    #[test]
    fn conserved_quantity_holds_along_the_ramp() {
        for curve in [CrossfadeCurve::Linear, CrossfadeCurve::EqualPower] {
            let mut ctl = CrossfadeController::new(3.0, curve).unwrap();
            let (mut a, mut b) = (source(1), source(2));
            let s = ctl.begin(&mut a, &mut b, 2.0, None).unwrap();
            assert_eq!(s.end(), 5.0);
            for i in 0..=300 {
                let t = 2.0 + f64::from(i) * 0.01;
                let (o, n) = (a.fader().value_at(t), b.fader().value_at(t));
                assert!((curve.conserved(o, n) - 1.0).abs() < 1e-5, "{curve:?} t={t}");
            }
            assert_eq!(a.fader().value_at(5.0), 0.0);
            assert_eq!(b.fader().value_at(5.0), 1.0);
        }
    }

    #[test]
    fn curve_gains_match_the_faders() {
        let curve = CrossfadeCurve::EqualPower;
        let mut ctl = CrossfadeController::new(2.0, curve).unwrap();
        let (mut a, mut b) = (source(1), source(2));
        ctl.begin(&mut a, &mut b, 0.0, None).unwrap();
        let (o, n) = curve.gains(0.25);
        assert!((a.fader().value_at(0.5) - o).abs() < 1e-6);
        assert!((b.fader().value_at(0.5) - n).abs() < 1e-6);
    }

    #[test]
    fn one_at_a_time() {
        let mut ctl = CrossfadeController::new(1.0, CrossfadeCurve::Linear).unwrap();
        let (mut a, mut b, mut c) = (source(1), source(2), source(3));
        ctl.begin(&mut a, &mut b, 0.0, Some(0.2)).unwrap();
        assert_eq!(ctl.active().unwrap().duration, 0.5);
        assert_eq!(ctl.begin(&mut b, &mut c, 0.1, None), Err(EngineError::CrossfadeInProgress));

        assert!(ctl.take_completed(0.49).is_none());
        let done = ctl.take_completed(0.5).unwrap();
        assert_eq!((done.outgoing, done.incoming), (1, 2));
        assert!(!ctl.is_active());
        assert!(ctl.begin(&mut b, &mut c, 0.6, None).is_ok());
        assert!(ctl.cancel().is_some());
    }

    #[test]
    fn curve_serde_names() {
        let c: CrossfadeCurve = serde_json::from_str("\"equal-power\"").unwrap();
        assert_eq!(c, CrossfadeCurve::EqualPower);
        assert_eq!(CrossfadeCurve::default(), CrossfadeCurve::EqualPower);
    }
}
