//! Render throughput: one quantum-sized callback per iteration.
//!
//! Engines are re-armed between timed renders so every measured block
//! carries audio instead of the silence left once a buffer runs out.

use std::f32::consts::TAU;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cadenza_engine::{AudioEngine, EffectSpec, EngineConfig, PcmBuffer, PlayOptions, ReverbParams};
use criterion::{black_box, criterion_group, criterion_main, Bencher, Criterion};

const SR: u32 = 48_000;
const BLOCK: usize = 512;

fn tone(seconds: usize) -> Arc<PcmBuffer> {
    let n = SR as usize * seconds;
    let ch: Vec<f32> = (0..n).map(|i| 0.5 * (TAU * 440.0 * i as f32 / SR as f32).sin()).collect();
    Arc::new(PcmBuffer::new(SR, vec![ch.clone(), ch]).expect("tone buffer"))
}

fn engine(effect: Option<EffectSpec>, track: &Arc<PcmBuffer>) -> AudioEngine {
    let mut e = AudioEngine::new(EngineConfig { sample_rate: SR, ..EngineConfig::default() }).expect("config");
    e.initialize().expect("initialize");
    if let Some(spec) = effect {
        e.apply_effect(spec).expect("effect");
    }
    e.play(Arc::clone(track), PlayOptions::default()).expect("play");
    e
}

/// Rewind the current source when less than a second is left.
fn rewind(e: &mut AudioEngine) {
    let left = e.duration().expect("duration").unwrap_or(0.0) - e.current_time().expect("time");
    if left < 1.0 {
        e.seek(0.0).expect("rewind");
    }
}

/// Start a fresh crossfade whenever the previous one has finished.
fn refade(e: &mut AudioEngine, track: &Arc<PcmBuffer>) {
    if e.snapshot().expect("snapshot").crossfade.is_none() {
        e.play(Arc::clone(track), PlayOptions::preload()).expect("preload");
        e.play_preloaded(PlayOptions::crossfade().with_crossfade_duration(10.0)).expect("crossfade");
    }
}

/// Time only the render calls; `rearm` runs before each one, off the clock.
fn timed_renders(b: &mut Bencher, e: &mut AudioEngine, mut rearm: impl FnMut(&mut AudioEngine)) {
    let mut out = vec![0.0f32; BLOCK * 2];
    b.iter_custom(|iters| {
        let mut total = Duration::ZERO;
        for _ in 0..iters {
            rearm(e);
            e.poll_events().expect("events");
            let start = Instant::now();
            black_box(e.render(&mut out));
            total += start.elapsed();
        }
        total
    });
}

fn bench_render(c: &mut Criterion) {
    let track = tone(60);

    let mut dry = engine(None, &track);
    c.bench_function("render_dry_512", |b| timed_renders(b, &mut dry, rewind));

    let mut wet = engine(Some(EffectSpec::Reverb(ReverbParams::default())), &track);
    c.bench_function("render_reverb_512", |b| timed_renders(b, &mut wet, rewind));

    let mut xfade = engine(None, &track);
    c.bench_function("render_crossfade_512", |b| timed_renders(b, &mut xfade, |e| refade(e, &track)));
}

criterion_group!(benches, bench_render);
criterion_main!(benches);
