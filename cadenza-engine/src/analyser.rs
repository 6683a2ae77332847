//! Analysis tap for visualizers.
//!
//! The analyser sits after the master gain. It keeps the last `fft_size` mono
//! samples in a ring and, every `fft_size / 2` frames, refreshes a smoothed
//! magnitude spectrum:
//!
//! 1. Blackman window over the ring (oldest sample first)
//! 2. FFT, magnitude scaled by `1 / fft_size`
//! 3. `X̂[k] = τ·X̂[k] + (1 - τ)·|X[k]|` with `τ = smoothing_time_constant`
//!
//! Readers get byte snapshots: dB magnitudes mapped linearly from
//! `[min_decibels, max_decibels]` onto `0..=255`, and time-domain samples as
//! `128·(1 + x)`. Reads never mutate state.

use std::sync::Arc;

use cadenza_core::dsp::{lin_to_db, TAU};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::graph::Processor;

pub struct Analyser {
    fft_size: usize,
    ring: Vec<f32>,
    write: usize,
    since_refresh: usize,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    work: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    smoothing: f32,
    min_db: f32,
    max_db: f32,
}

impl Analyser {
    /// `fft_size` must be a power of two; the engine configuration guarantees it.
    pub fn new(fft_size: usize, smoothing: f32, min_db: f32, max_db: f32) -> Self {
        let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        Self {
            fft_size,
            ring: vec![0.0; fft_size],
            write: 0,
            since_refresh: 0,
            window: blackman(fft_size),
            fft,
            work: vec![Complex::new(0.0, 0.0); fft_size],
            scratch,
            smoothed: vec![0.0; fft_size / 2],
            smoothing,
            min_db,
            max_db,
        }
    }

    #[inline] pub fn fft_size(&self) -> usize { self.fft_size }
    #[inline] pub fn frequency_bin_count(&self) -> usize { self.fft_size / 2 }

    /// Feed one output frame (channels averaged to mono).
    #[inline]
    pub fn push_frame(&mut self, frame: &[f32]) {
        if frame.is_empty() {
            return;
        }
        let mono = frame.iter().sum::<f32>() / frame.len() as f32;
        self.ring[self.write] = mono;
        self.write = (self.write + 1) % self.fft_size;
        self.since_refresh += 1;
        if self.since_refresh >= self.fft_size / 2 {
            self.since_refresh = 0;
            self.refresh_spectrum();
        }
    }

    fn refresh_spectrum(&mut self) {
        let n = self.fft_size;
        for (i, w) in self.work.iter_mut().enumerate() {
            let x = self.ring[(self.write + i) % n];
            *w = Complex::new(x * self.window[i], 0.0);
        }
        self.fft.process_with_scratch(&mut self.work, &mut self.scratch);

        let norm = 1.0 / n as f32;
        let tau = self.smoothing;
        for (s, x) in self.smoothed.iter_mut().zip(&self.work) {
            *s = tau * *s + (1.0 - tau) * x.norm() * norm;
        }
    }

    /// Copy the spectrum into `out` (up to `fft_size / 2` bytes).
    pub fn copy_frequency_data(&self, out: &mut [u8]) {
        let range = self.max_db - self.min_db;
        for (o, &mag) in out.iter_mut().zip(&self.smoothed) {
            let db = lin_to_db(mag);
            let scaled = 255.0 * (db - self.min_db) / range;
            *o = scaled.clamp(0.0, 255.0) as u8;
        }
    }

    /// Copy the waveform into `out` (up to `fft_size` bytes, oldest first).
    pub fn copy_time_domain_data(&self, out: &mut [u8]) {
        let n = self.fft_size;
        for (i, o) in out.iter_mut().take(n).enumerate() {
            let x = self.ring[(self.write + i) % n];
            *o = (128.0 * (1.0 + x)).clamp(0.0, 255.0) as u8;
        }
    }

    pub fn frequency_data(&self) -> Vec<u8> {
        let mut out = vec![0; self.frequency_bin_count()];
        self.copy_frequency_data(&mut out);
        out
    }

    pub fn time_domain_data(&self) -> Vec<u8> {
        let mut out = vec![0; self.fft_size];
        self.copy_time_domain_data(&mut out);
        out
    }
}

impl Processor for Analyser {
    fn reset(&mut self) {
        self.ring.fill(0.0);
        self.smoothed.fill(0.0);
        self.write = 0;
        self.since_refresh = 0;
    }

    /// Pass-through tap.
    #[inline]
    fn process_frame(&mut self, frame: &mut [f32]) {
        self.push_frame(frame);
    }
}

impl core::fmt::Debug for Analyser {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Analyser")
            .field("fft_size", &self.fft_size)
            .field("smoothing", &self.smoothing)
            .field("min_db", &self.min_db)
            .field("max_db", &self.max_db)
            .finish_non_exhaustive()
    }
}

fn blackman(n: usize) -> Vec<f32> {
    let (a0, a1, a2) = (0.42f32, 0.5f32, 0.08f32);
    (0..n)
        .map(|i| {
            let x = i as f32 / n as f32;
            a0 - a1 * (TAU * x).cos() + a2 * (2.0 * TAU * x).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_reads_as_floor_and_midline() {
        let mut a = Analyser::new(256, 0.8, -100.0, -30.0);
        for _ in 0..1024 {
            a.push_frame(&[0.0, 0.0]);
        }
        assert!(a.frequency_data().iter().all(|&b| b == 0));
        assert!(a.time_domain_data().iter().all(|&b| b == 128));
        assert_eq!(a.frequency_data().len(), 128);
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let n = 256;
        let bin = 32;
        let mut a = Analyser::new(n, 0.0, -100.0, 0.0);
        for i in 0..(4 * n) {
            // exactly periodic in the window
            let x = (TAU * ((bin * i) % n) as f32 / n as f32).sin();
            a.push_frame(&[x]);
        }
        let data = a.frequency_data();
        let peak = data
            .iter()
            .enumerate()
            .max_by_key(|(_, &b)| b)
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, bin);
        assert!(data[bin] > 200);
        assert_eq!(data[4], 0);
    }

    #[test]
    fn time_domain_is_oldest_first() {
        let mut a = Analyser::new(32, 0.0, -100.0, -30.0);
        for i in 0..40 {
            let x = if i == 39 { 1.0 } else { -1.0 };
            a.push_frame(&[x]);
        }
        let wave = a.time_domain_data();
        assert_eq!(wave[31], 255);
        assert_eq!(wave[0], 0);
    }

    #[test]
    fn reset_clears() {
        let mut a = Analyser::new(64, 0.5, -100.0, -30.0);
        for _ in 0..64 {
            a.process_frame(&mut [0.9]);
        }
        a.reset();
        assert!(a.time_domain_data().iter().all(|&b| b == 128));
    }
}
