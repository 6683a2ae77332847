//! # Ten-band Equalizer
//!
//! Fixed ladder of ten biquads in series. Band 0 is a low shelf, band 9 a high
//! shelf, the eight bands in between are peaking filters. Only the gains change
//! after construction; order, count and center frequencies never do.
//!
//! Presets are plain arrays of ten gains in dB, index-aligned to
//! [`BAND_FREQUENCIES`]. A handful of named presets ship with the engine.

use cadenza_core::filters::{Biquad, BiquadKind, BiquadState};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::graph::Processor;

pub const BAND_COUNT: usize = 10;

/// Center frequencies (Hz), low to high.
pub const BAND_FREQUENCIES: [f32; BAND_COUNT] =
    [60.0, 170.0, 310.0, 600.0, 1_000.0, 3_000.0, 6_000.0, 12_000.0, 14_000.0, 16_000.0];

pub const MIN_GAIN_DB: f32 = -12.0;
pub const MAX_GAIN_DB: f32 = 12.0;

/// Q of the peaking bands.
pub const PEAKING_Q: f32 = 1.0;

fn band_kind(index: usize) -> BiquadKind {
    match index {
        0 => BiquadKind::LowShelf,
        i if i == BAND_COUNT - 1 => BiquadKind::HighShelf,
        _ => BiquadKind::Peaking,
    }
}

fn check_index(index: usize) -> Result<()> {
    if index >= BAND_COUNT {
        return Err(EngineError::Range {
            name: "band index",
            value: index as f64,
            min: 0.0,
            max: (BAND_COUNT - 1) as f64,
        });
    }
    Ok(())
}

fn check_gain(gain_db: f32) -> Result<f32> {
    if !gain_db.is_finite() || !(MIN_GAIN_DB..=MAX_GAIN_DB).contains(&gain_db) {
        return Err(EngineError::Range {
            name: "band gain",
            value: f64::from(gain_db),
            min: f64::from(MIN_GAIN_DB),
            max: f64::from(MAX_GAIN_DB),
        });
    }
    Ok(gain_db)
}

// ---------------------------------- Presets ---------------------------------------

/// Ten validated band gains (dB).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f32; BAND_COUNT]", into = "[f32; BAND_COUNT]")]
pub struct EqualizerPreset {
    gains: [f32; BAND_COUNT],
}

impl EqualizerPreset {
    /// Names accepted by [`EqualizerPreset::named`].
    pub const NAMES: [&'static str; 9] = [
        "flat",
        "bass-boost",
        "treble-boost",
        "vocal",
        "rock",
        "pop",
        "jazz",
        "classical",
        "electronic",
    ];

    pub fn new(gains: [f32; BAND_COUNT]) -> Result<Self> {
        for g in gains {
            check_gain(g)?;
        }
        Ok(Self { gains })
    }

    /// Build from a slice that must hold exactly ten gains.
    pub fn from_slice(gains: &[f32]) -> Result<Self> {
        let gains: [f32; BAND_COUNT] = gains.try_into().map_err(|_| {
            EngineError::invalid("preset length", gains.len() as f64, "expected exactly 10 gains")
        })?;
        Self::new(gains)
    }

    pub fn flat() -> Self {
        Self { gains: [0.0; BAND_COUNT] }
    }

    pub fn named(name: &str) -> Option<Self> {
        let gains = match name.to_ascii_lowercase().as_str() {
            "flat" => [0.0; BAND_COUNT],
            "bass-boost" => [6.0, 5.0, 4.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            "treble-boost" => [0.0, 0.0, 0.0, 0.0, 0.0, 2.0, 4.0, 5.0, 6.0, 6.0],
            "vocal" => [-2.0, -1.0, 0.0, 2.0, 4.0, 4.0, 3.0, 1.0, 0.0, -1.0],
            "rock" => [5.0, 4.0, 2.0, -1.0, -2.0, 1.0, 3.0, 4.0, 5.0, 5.0],
            "pop" => [-1.0, 1.0, 3.0, 4.0, 3.0, 0.0, -1.0, -1.0, -1.0, -1.0],
            "jazz" => [3.0, 2.0, 1.0, 2.0, -1.0, -1.0, 0.0, 1.0, 2.0, 3.0],
            "classical" => [4.0, 3.0, 2.0, 1.0, -1.0, -1.0, 0.0, 2.0, 3.0, 4.0],
            "electronic" => [5.0, 4.0, 1.0, 0.0, -2.0, 2.0, 1.0, 2.0, 4.0, 5.0],
            _ => return None,
        };
        Some(Self { gains })
    }

    /// Parse a preset name or a comma-separated list of ten gains.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(p) = Self::named(s) {
            return Ok(p);
        }
        let gains = s
            .split(',')
            .map(|part| part.trim().parse::<f32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| EngineError::invalid("preset", f64::NAN, "not a preset name or a list of gains"))?;
        Self::from_slice(&gains)
    }

    #[inline] pub fn gains(&self) -> [f32; BAND_COUNT] { self.gains }
}

impl Default for EqualizerPreset {
    fn default() -> Self {
        Self::flat()
    }
}

impl TryFrom<[f32; BAND_COUNT]> for EqualizerPreset {
    type Error = EngineError;

    fn try_from(gains: [f32; BAND_COUNT]) -> Result<Self> {
        Self::new(gains)
    }
}

impl From<EqualizerPreset> for [f32; BAND_COUNT] {
    fn from(p: EqualizerPreset) -> Self {
        p.gains
    }
}

// -------------------------------- Filter chain ------------------------------------

#[derive(Clone, Debug)]
pub struct Equalizer {
    bands: [Biquad; BAND_COUNT],
    /// One state per band, per channel.
    states: Vec<[BiquadState; BAND_COUNT]>,
}

impl Equalizer {
    /// Flat equalizer for `channels` interleaved channels at `sr`.
    pub fn new(sr: f32, channels: usize) -> Self {
        let bands = std::array::from_fn(|i| Biquad::new(band_kind(i), BAND_FREQUENCIES[i], PEAKING_Q, 0.0, sr));
        Self { bands, states: vec![[BiquadState::default(); BAND_COUNT]; channels] }
    }

    /// Set one band; fails with `Range` for a bad index or a gain outside [-12, 12] dB.
    pub fn set_band_gain(&mut self, index: usize, gain_db: f32) -> Result<()> {
        check_index(index)?;
        let gain_db = check_gain(gain_db)?;
        self.bands[index].set_gain_db(gain_db);
        Ok(())
    }

    pub fn band_gain(&self, index: usize) -> Result<f32> {
        check_index(index)?;
        Ok(self.bands[index].gain_db())
    }

    pub fn band(&self, index: usize) -> Option<&Biquad> {
        self.bands.get(index)
    }

    pub fn gains(&self) -> [f32; BAND_COUNT] {
        std::array::from_fn(|i| self.bands[i].gain_db())
    }

    /// Apply all ten gains. The preset is already validated, so this cannot fail halfway.
    pub fn apply_preset(&mut self, preset: &EqualizerPreset) {
        for (band, g) in self.bands.iter_mut().zip(preset.gains()) {
            band.set_gain_db(g);
        }
    }

    /// Combined magnitude response of the chain (dB) at `freq`.
    pub fn response_db(&self, freq: f32) -> f32 {
        self.bands.iter().map(|b| b.magnitude_db(freq)).sum()
    }
}

impl Processor for Equalizer {
    fn reset(&mut self) {
        for ch in &mut self.states {
            for s in ch.iter_mut() {
                s.reset();
            }
        }
    }

    #[inline]
    fn process_frame(&mut self, frame: &mut [f32]) {
        for (x, states) in frame.iter_mut().zip(self.states.iter_mut()) {
            let mut y = *x;
            for (band, state) in self.bands.iter().zip(states.iter_mut()) {
                y = band.process(state, y);
            }
            *x = y;
        }
    }
}
