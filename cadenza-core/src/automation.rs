//! Time-stamped parameter automation.
//!
//! A [`ParamTimeline`] holds a base value plus a time-sorted list of events,
//! evaluated once per sample against the engine clock (seconds, `f64`):
//! - `SetValueAtTime(v, t)`     : jump to `v` at `t`
//! - `RampToValueAtTime(v, t)`  : interpolate from the previous event to `v`, ending at `t`
//!
//! Ramps are either linear or equal-power (see [`RampShape`]). Gains scheduled this
//! way are continuous in time, so a crossfade is exact at every sample rather than
//! stepped by a timer.

use crate::dsp::{clamp, equal_power_gains, lerp};

/// Interpolation used by a ramp.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RampShape {
    Linear,
    /// Rising: `v0 + (v1 - v0)·sin(πp/2)`; falling: `v1 + (v0 - v1)·cos(πp/2)`.
    EqualPower,
}

impl RampShape {
    /// Value at progress `p` (clamped to [0,1]) of a ramp from `v0` to `v1`.
    #[inline]
    pub fn interpolate(self, v0: f32, v1: f32, p: f32) -> f32 {
        let p = clamp(p, 0.0, 1.0);
        match self {
            RampShape::Linear => lerp(v0, v1, p),
            RampShape::EqualPower => {
                let (fall, rise) = equal_power_gains(p);
                if v1 >= v0 { v0 + (v1 - v0) * rise } else { v1 + (v0 - v1) * fall }
            }
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Event {
    Set { time: f64, value: f32 },
    Ramp { time: f64, value: f32, shape: RampShape },
}

impl Event {
    #[inline]
    fn time(&self) -> f64 {
        match *self {
            Event::Set { time, .. } | Event::Ramp { time, .. } => time,
        }
    }

    #[inline]
    fn value(&self) -> f32 {
        match *self {
            Event::Set { value, .. } | Event::Ramp { value, .. } => value,
        }
    }
}

/// Automation timeline for a single scalar parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamTimeline {
    base: f32,
    events: Vec<Event>,
}

impl ParamTimeline {
    #[inline]
    pub fn new(value: f32) -> Self {
        Self { base: value, events: Vec::new() }
    }

    /// Set the value immediately, dropping all scheduled events.
    #[inline]
    pub fn set_value(&mut self, value: f32) {
        self.base = value;
        self.events.clear();
    }

    pub fn set_value_at_time(&mut self, value: f32, time: f64) {
        self.insert(Event::Set { time, value });
    }

    /// Ramp from the previous event (or the base value) to `value`, ending at `time`.
    /// A ramp with no earlier event holds the base value until `time`.
    pub fn ramp_to_value_at_time(&mut self, value: f32, time: f64, shape: RampShape) {
        self.insert(Event::Ramp { time, value, shape });
    }

    /// Remove every event at or after `time`.
    pub fn cancel_scheduled_values(&mut self, time: f64) {
        self.events.retain(|e| e.time() < time);
    }

    /// True if some event lies strictly after `time`.
    #[inline]
    pub fn is_automating(&self, time: f64) -> bool {
        self.events.iter().any(|e| e.time() > time)
    }

    /// Collapse automation that has fully elapsed at `time` into the base value.
    pub fn settle(&mut self, time: f64) {
        if !self.events.is_empty() && !self.is_automating(time) {
            self.base = self.value_at(time);
            self.events.clear();
        }
    }

    /// Evaluate the parameter at `time`.
    pub fn value_at(&self, time: f64) -> f32 {
        let mut prev_t = f64::NEG_INFINITY;
        let mut prev_v = self.base;
        for ev in &self.events {
            if ev.time() <= time {
                prev_t = ev.time();
                prev_v = ev.value();
                continue;
            }
            return match *ev {
                Event::Ramp { time: end, value, shape } if prev_t.is_finite() => {
                    let span = end - prev_t;
                    let p = if span > 0.0 { ((time - prev_t) / span) as f32 } else { 1.0 };
                    shape.interpolate(prev_v, value, p)
                }
                _ => prev_v,
            };
        }
        prev_v
    }

    fn insert(&mut self, ev: Event) {
        // after any event with the same time, so later calls win
        let idx = self.events.partition_point(|e| e.time() <= ev.time());
        self.events.insert(idx, ev);
    }
}

impl Default for ParamTimeline {
    fn default() -> Self {
        Self::new(1.0)
    }
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_value_without_events() {
        let p = ParamTimeline::new(0.7);
        assert_eq!(p.value_at(0.0), 0.7);
        assert_eq!(p.value_at(1e6), 0.7);
    }

    #[test]
    fn linear_ramp_interpolates() {
        let mut p = ParamTimeline::new(1.0);
        p.set_value_at_time(1.0, 2.0);
        p.ramp_to_value_at_time(0.0, 4.0, RampShape::Linear);
        assert_eq!(p.value_at(1.0), 1.0);
        assert!((p.value_at(3.0) - 0.5).abs() < 1e-6);
        assert_eq!(p.value_at(5.0), 0.0);
    }

    #[test]
    fn equal_power_ramps_are_complementary() {
        let mut out = ParamTimeline::new(1.0);
        let mut inc = ParamTimeline::new(0.0);
        out.set_value_at_time(1.0, 0.0);
        out.ramp_to_value_at_time(0.0, 1.0, RampShape::EqualPower);
        inc.set_value_at_time(0.0, 0.0);
        inc.ramp_to_value_at_time(1.0, 1.0, RampShape::EqualPower);
        for i in 0..=20 {
            let t = f64::from(i) / 20.0;
            let (o, n) = (out.value_at(t), inc.value_at(t));
            assert!((o * o + n * n - 1.0).abs() < 1e-5, "t={t}");
        }
    }

    #[test]
    fn ramp_without_anchor_holds_until_end() {
        let mut p = ParamTimeline::new(0.2);
        p.ramp_to_value_at_time(1.0, 1.0, RampShape::Linear);
        assert_eq!(p.value_at(0.5), 0.2);
        assert_eq!(p.value_at(1.0), 1.0);
    }

    #[test]
    fn cancel_and_settle() {
        let mut p = ParamTimeline::new(1.0);
        p.set_value_at_time(1.0, 0.0);
        p.ramp_to_value_at_time(0.0, 2.0, RampShape::Linear);
        assert!(p.is_automating(1.0));
        p.cancel_scheduled_values(1.0);
        assert!(!p.is_automating(1.0));
        assert_eq!(p.value_at(1.5), 1.0);

        p.ramp_to_value_at_time(0.5, 3.0, RampShape::Linear);
        p.settle(2.0); // ramp still running, nothing collapses
        assert!(p.is_automating(2.0));
        p.settle(3.5);
        assert!(!p.is_automating(0.0));
        assert_eq!(p.value_at(0.0), 0.5);
    }
}
