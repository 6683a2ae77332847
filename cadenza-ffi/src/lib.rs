//! C ABI wrapper for the Cadenza engine.
//!
//! ABI notes
//! - All functions are `extern "C"` and `#[no_mangle]`, prefixed `cadenza_`.
//! - Opaque handle type: `CadenzaEngine` (heap-allocated; free it with `cadenza_engine_destroy`).
//! - Fallible calls return a `CadenzaStatus`; `CADENZA_STATUS_OK` is zero.
//! - Output values are written through out-pointers, which may be null when unwanted.
//!
//! Threading
//! - The handle is NOT thread-safe. Serialize calls (for example with a host-side mutex
//!   shared between the audio callback and the control thread).

use std::slice;

use cadenza_engine::{
    decode, AudioEngine, CompressorParams, DelayParams, EffectSpec, EngineConfig, EngineError, PcmBuffer,
    PlayOptions, ReverbParams, RewireOutcome, SourceId,
};

/// Opaque engine handle.
pub struct CadenzaEngine {
    inner: AudioEngine,
}

/// Result of a fallible call. One code per engine error plus `NullPointer`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CadenzaStatus {
    Ok = 0,
    NullPointer = 1,
    Decode = 2,
    InvalidBuffer = 3,
    InvalidParameter = 4,
    Range = 5,
    CrossfadeInProgress = 6,
    SeekOutOfRange = 7,
    NoActiveSource = 8,
    NothingPreloaded = 9,
    NotInitialized = 10,
    Destroyed = 11,
}

impl From<&EngineError> for CadenzaStatus {
    fn from(e: &EngineError) -> Self {
        match e {
            EngineError::Decode(_) => CadenzaStatus::Decode,
            EngineError::InvalidBuffer(_) => CadenzaStatus::InvalidBuffer,
            EngineError::InvalidParameter { .. } => CadenzaStatus::InvalidParameter,
            EngineError::Range { .. } => CadenzaStatus::Range,
            EngineError::CrossfadeInProgress => CadenzaStatus::CrossfadeInProgress,
            EngineError::SeekOutOfRange { .. } => CadenzaStatus::SeekOutOfRange,
            EngineError::NoActiveSource => CadenzaStatus::NoActiveSource,
            EngineError::NothingPreloaded => CadenzaStatus::NothingPreloaded,
            EngineError::NotInitialized => CadenzaStatus::NotInitialized,
            EngineError::Destroyed => CadenzaStatus::Destroyed,
        }
    }
}

/// How a `play` call starts its buffer.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default)]
pub struct CadenzaPlayOptions {
    pub crossfade: bool,
    pub preload: bool,
    /// Seconds into the buffer.
    pub start_offset: f64,
    /// Per-call crossfade length; `<= 0` uses the engine default.
    pub crossfade_duration: f64,
}

impl From<CadenzaPlayOptions> for PlayOptions {
    fn from(o: CadenzaPlayOptions) -> Self {
        PlayOptions {
            crossfade: o.crossfade,
            start_offset: o.start_offset,
            preload: o.preload,
            crossfade_duration: (o.crossfade_duration > 0.0).then_some(o.crossfade_duration),
        }
    }
}

/// Whether an effect change took effect right away.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CadenzaRewire {
    Applied = 0,
    Deferred = 1,
}

impl From<RewireOutcome> for CadenzaRewire {
    fn from(o: RewireOutcome) -> Self {
        match o {
            RewireOutcome::Applied => CadenzaRewire::Applied,
            RewireOutcome::Deferred => CadenzaRewire::Deferred,
        }
    }
}

// ---- helpers ----

fn with_engine(engine: *mut CadenzaEngine, f: impl FnOnce(&mut AudioEngine) -> Result<(), EngineError>) -> CadenzaStatus {
    // SAFETY: the caller passes a handle from `cadenza_engine_create` or null.
    let Some(e) = (unsafe { engine.as_mut() }) else {
        return CadenzaStatus::NullPointer;
    };
    match f(&mut e.inner) {
        Ok(()) => CadenzaStatus::Ok,
        Err(err) => CadenzaStatus::from(&err),
    }
}

fn write_out<T>(out: *mut T, value: T) {
    // SAFETY: non-null out-pointers must be valid for a write of `T`.
    if let Some(slot) = unsafe { out.as_mut() } {
        *slot = value;
    }
}

fn options(opts: *const CadenzaPlayOptions) -> PlayOptions {
    // SAFETY: null means defaults; otherwise the pointer must be valid for a read.
    unsafe { opts.as_ref() }.copied().unwrap_or_default().into()
}

// ---- creation / destruction ----

/// Create an engine for `sample_rate` Hz and `channels` interleaved channels.
/// Returns null when the configuration is invalid.
#[no_mangle]
pub extern "C" fn cadenza_engine_create(sample_rate: u32, channels: u16) -> *mut CadenzaEngine {
    let config = EngineConfig { sample_rate, channels, ..EngineConfig::default() };
    match AudioEngine::new(config) {
        Ok(inner) => Box::into_raw(Box::new(CadenzaEngine { inner })),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Destroy an engine previously returned by `cadenza_engine_create`. Null is ignored.
#[no_mangle]
pub extern "C" fn cadenza_engine_destroy(engine: *mut CadenzaEngine) {
    if !engine.is_null() {
        // SAFETY: the pointer came from `Box::into_raw` in `cadenza_engine_create`.
        unsafe { drop(Box::from_raw(engine)) };
    }
}

/// Build the signal graph. Must precede every other call except `render`.
#[no_mangle]
pub extern "C" fn cadenza_engine_initialize(engine: *mut CadenzaEngine) -> CadenzaStatus {
    with_engine(engine, AudioEngine::initialize)
}

// ---- playback ----

/// Play interleaved f32 PCM supplied by the host. `len` counts samples, not frames.
#[no_mangle]
pub extern "C" fn cadenza_play_interleaved_f32(
    engine: *mut CadenzaEngine,
    samples: *const f32,
    len: usize,
    sample_rate: u32,
    channels: u32,
    opts: *const CadenzaPlayOptions,
    out_id: *mut SourceId,
) -> CadenzaStatus {
    if samples.is_null() {
        return CadenzaStatus::NullPointer;
    }
    // SAFETY: `samples` must be valid for `len` reads.
    let samples = unsafe { slice::from_raw_parts(samples, len) };
    let opts = options(opts);
    with_engine(engine, |e| {
        let buffer = PcmBuffer::from_interleaved(sample_rate, channels as usize, samples)?;
        write_out(out_id, e.play(buffer, opts)?);
        Ok(())
    })
}

/// Decode an encoded file image in-process and play it.
#[no_mangle]
pub extern "C" fn cadenza_play_encoded(
    engine: *mut CadenzaEngine,
    bytes: *const u8,
    len: usize,
    opts: *const CadenzaPlayOptions,
    out_id: *mut SourceId,
) -> CadenzaStatus {
    if bytes.is_null() {
        return CadenzaStatus::NullPointer;
    }
    // SAFETY: `bytes` must be valid for `len` reads.
    let bytes = unsafe { slice::from_raw_parts(bytes, len) };
    let opts = options(opts);
    with_engine(engine, |e| {
        let buffer = decode(bytes)?;
        write_out(out_id, e.play(buffer, opts)?);
        Ok(())
    })
}

/// Start the preloaded buffer.
#[no_mangle]
pub extern "C" fn cadenza_play_preloaded(
    engine: *mut CadenzaEngine,
    opts: *const CadenzaPlayOptions,
    out_id: *mut SourceId,
) -> CadenzaStatus {
    let opts = options(opts);
    with_engine(engine, |e| {
        write_out(out_id, e.play_preloaded(opts)?);
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn cadenza_pause(engine: *mut CadenzaEngine) -> CadenzaStatus {
    with_engine(engine, AudioEngine::pause)
}

#[no_mangle]
pub extern "C" fn cadenza_resume(engine: *mut CadenzaEngine) -> CadenzaStatus {
    with_engine(engine, AudioEngine::resume)
}

/// The host's output device went away; rendering yields silence until `cadenza_resume`.
#[no_mangle]
pub extern "C" fn cadenza_engine_notify_suspended(engine: *mut CadenzaEngine) -> CadenzaStatus {
    with_engine(engine, AudioEngine::notify_device_suspended)
}

#[no_mangle]
pub extern "C" fn cadenza_stop(engine: *mut CadenzaEngine) -> CadenzaStatus {
    with_engine(engine, AudioEngine::stop)
}

#[no_mangle]
pub extern "C" fn cadenza_seek(engine: *mut CadenzaEngine, seconds: f64) -> CadenzaStatus {
    with_engine(engine, |e| e.seek(seconds))
}

// ---- settings ----

#[no_mangle]
pub extern "C" fn cadenza_set_volume(engine: *mut CadenzaEngine, volume: f32) -> CadenzaStatus {
    with_engine(engine, |e| e.set_volume(volume))
}

#[no_mangle]
pub extern "C" fn cadenza_set_band_gain(engine: *mut CadenzaEngine, band: u32, gain_db: f32) -> CadenzaStatus {
    with_engine(engine, |e| e.set_band_gain(band as usize, gain_db))
}

/// Set all ten bands from `gains[0..len]`; `len` must be 10.
#[no_mangle]
pub extern "C" fn cadenza_set_equalizer_preset(engine: *mut CadenzaEngine, gains: *const f32, len: usize) -> CadenzaStatus {
    if gains.is_null() {
        return CadenzaStatus::NullPointer;
    }
    // SAFETY: `gains` must be valid for `len` reads.
    let gains = unsafe { slice::from_raw_parts(gains, len) };
    with_engine(engine, |e| e.set_equalizer_preset(gains))
}

/// Set the default crossfade length. The clamped value is written to `out_applied`.
#[no_mangle]
pub extern "C" fn cadenza_set_crossfade_duration(
    engine: *mut CadenzaEngine,
    seconds: f64,
    out_applied: *mut f64,
) -> CadenzaStatus {
    with_engine(engine, |e| {
        write_out(out_applied, e.set_crossfade_duration(seconds)?);
        Ok(())
    })
}

// ---- effects ----

fn apply(engine: *mut CadenzaEngine, spec: EffectSpec, out: *mut CadenzaRewire) -> CadenzaStatus {
    with_engine(engine, |e| {
        write_out(out, e.apply_effect(spec)?.into());
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn cadenza_apply_reverb(
    engine: *mut CadenzaEngine,
    room_size: f32,
    dampening: f32,
    mix: f32,
    out: *mut CadenzaRewire,
) -> CadenzaStatus {
    apply(engine, EffectSpec::Reverb(ReverbParams { room_size, dampening, mix }), out)
}

#[no_mangle]
pub extern "C" fn cadenza_apply_delay(
    engine: *mut CadenzaEngine,
    delay_time: f32,
    feedback: f32,
    mix: f32,
    out: *mut CadenzaRewire,
) -> CadenzaStatus {
    apply(engine, EffectSpec::Delay(DelayParams { delay_time, feedback, mix }), out)
}

#[no_mangle]
pub extern "C" fn cadenza_apply_compressor(
    engine: *mut CadenzaEngine,
    threshold_db: f32,
    knee_db: f32,
    ratio: f32,
    attack: f32,
    release: f32,
    mix: f32,
    out: *mut CadenzaRewire,
) -> CadenzaStatus {
    let params = CompressorParams { threshold_db, knee_db, ratio, attack, release, mix };
    apply(engine, EffectSpec::Compressor(params), out)
}

#[no_mangle]
pub extern "C" fn cadenza_clear_effect(engine: *mut CadenzaEngine, out: *mut CadenzaRewire) -> CadenzaStatus {
    with_engine(engine, |e| {
        write_out(out, e.clear_effect()?.into());
        Ok(())
    })
}

// ---- analysis / state ----

/// Copy spectrum bytes into `out[0..len]` (extra bins are dropped, extra space untouched).
#[no_mangle]
pub extern "C" fn cadenza_copy_frequency_data(engine: *mut CadenzaEngine, out: *mut u8, len: usize) -> CadenzaStatus {
    if out.is_null() {
        return CadenzaStatus::NullPointer;
    }
    // SAFETY: `out` must be valid for `len` writes.
    let out = unsafe { slice::from_raw_parts_mut(out, len) };
    with_engine(engine, |e| e.copy_frequency_data(out))
}

/// Copy waveform bytes into `out[0..len]`.
#[no_mangle]
pub extern "C" fn cadenza_copy_time_domain_data(engine: *mut CadenzaEngine, out: *mut u8, len: usize) -> CadenzaStatus {
    if out.is_null() {
        return CadenzaStatus::NullPointer;
    }
    // SAFETY: `out` must be valid for `len` writes.
    let out = unsafe { slice::from_raw_parts_mut(out, len) };
    with_engine(engine, |e| e.copy_time_domain_data(out))
}

#[no_mangle]
pub extern "C" fn cadenza_current_time(engine: *mut CadenzaEngine, out_seconds: *mut f64) -> CadenzaStatus {
    with_engine(engine, |e| {
        write_out(out_seconds, e.current_time()?);
        Ok(())
    })
}

// ---- rendering ----

/// Render `frames` interleaved frames into `out`. `channels` must match the engine.
///
/// Returns the number of frames rendered (0 on a null pointer or a channel mismatch).
#[no_mangle]
pub extern "C" fn cadenza_render_interleaved_f32(
    engine: *mut CadenzaEngine,
    out: *mut f32,
    frames: u32,
    channels: u32,
) -> u32 {
    // SAFETY: as in `with_engine`.
    let Some(e) = (unsafe { engine.as_mut() }) else {
        return 0;
    };
    if out.is_null() || channels as usize != e.inner.config().frame_len() {
        return 0;
    }
    // SAFETY: `out` must be valid for `frames * channels` writes.
    let out = unsafe { slice::from_raw_parts_mut(out, frames as usize * channels as usize) };
    e.inner.render(out) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    #[test]
    fn lifecycle_through_the_abi() {
        let e = cadenza_engine_create(8_000, 2);
        assert!(!e.is_null());
        assert_eq!(cadenza_pause(e), CadenzaStatus::NotInitialized);
        assert_eq!(cadenza_engine_initialize(e), CadenzaStatus::Ok);

        let pcm = vec![0.25f32; 8_000 * 2];
        let mut id: SourceId = 0;
        let status = cadenza_play_interleaved_f32(e, pcm.as_ptr(), pcm.len(), 8_000, 2, ptr::null(), &mut id);
        assert_eq!(status, CadenzaStatus::Ok);

        let mut out = vec![0.0f32; 256];
        assert_eq!(cadenza_render_interleaved_f32(e, out.as_mut_ptr(), 128, 2), 128);
        assert_eq!(cadenza_render_interleaved_f32(e, out.as_mut_ptr(), 128, 1), 0);

        let mut t = -1.0f64;
        assert_eq!(cadenza_current_time(e, &mut t), CadenzaStatus::Ok);
        assert!((t - 128.0 / 8_000.0).abs() < 1e-9);

        assert_eq!(cadenza_seek(e, 5.0), CadenzaStatus::SeekOutOfRange);
        assert_eq!(cadenza_set_volume(e, 2.0), CadenzaStatus::InvalidParameter);
        cadenza_engine_destroy(e);
    }

    #[test]
    fn null_handles_are_reported() {
        assert_eq!(cadenza_stop(ptr::null_mut()), CadenzaStatus::NullPointer);
        assert_eq!(cadenza_render_interleaved_f32(ptr::null_mut(), ptr::null_mut(), 4, 2), 0);
        cadenza_engine_destroy(ptr::null_mut());
        assert!(cadenza_engine_create(0, 2).is_null());
    }

    #[test]
    fn device_suspension_round_trip() {
        assert_eq!(cadenza_engine_notify_suspended(ptr::null_mut()), CadenzaStatus::NullPointer);
        let e = cadenza_engine_create(8_000, 1);
        assert_eq!(cadenza_engine_notify_suspended(e), CadenzaStatus::NotInitialized);
        assert_eq!(cadenza_engine_initialize(e), CadenzaStatus::Ok);

        let pcm = vec![0.25f32; 8_000];
        let status = cadenza_play_interleaved_f32(e, pcm.as_ptr(), pcm.len(), 8_000, 1, ptr::null(), ptr::null_mut());
        assert_eq!(status, CadenzaStatus::Ok);
        assert_eq!(cadenza_engine_notify_suspended(e), CadenzaStatus::Ok);

        let mut out = vec![1.0f32; 64];
        assert_eq!(cadenza_render_interleaved_f32(e, out.as_mut_ptr(), 64, 1), 64);
        assert!(out.iter().all(|s| *s == 0.0));
        let mut t = -1.0f64;
        assert_eq!(cadenza_current_time(e, &mut t), CadenzaStatus::Ok);
        assert_eq!(t, 0.0);

        assert_eq!(cadenza_resume(e), CadenzaStatus::Ok);
        cadenza_render_interleaved_f32(e, out.as_mut_ptr(), 64, 1);
        assert_eq!(cadenza_current_time(e, &mut t), CadenzaStatus::Ok);
        assert!((t - 64.0 / 8_000.0).abs() < 1e-9);
        cadenza_engine_destroy(e);
    }

    #[test]
    fn effects_and_presets() {
        let e = cadenza_engine_create(8_000, 1);
        assert_eq!(cadenza_engine_initialize(e), CadenzaStatus::Ok);

        let mut rewire = CadenzaRewire::Deferred;
        assert_eq!(cadenza_apply_delay(e, 0.1, 0.5, 0.5, &mut rewire), CadenzaStatus::Ok);
        assert_eq!(rewire, CadenzaRewire::Applied);
        assert_eq!(cadenza_apply_delay(e, 0.1, 1.0, 0.5, ptr::null_mut()), CadenzaStatus::InvalidParameter);
        assert_eq!(cadenza_clear_effect(e, ptr::null_mut()), CadenzaStatus::Ok);

        let gains = [1.0f32; 9];
        assert_eq!(cadenza_set_equalizer_preset(e, gains.as_ptr(), gains.len()), CadenzaStatus::InvalidParameter);
        assert_eq!(cadenza_set_band_gain(e, 10, 0.0), CadenzaStatus::Range);

        let mut applied = 0.0f64;
        assert_eq!(cadenza_set_crossfade_duration(e, 20.0, &mut applied), CadenzaStatus::Ok);
        assert_eq!(applied, 10.0);

        let garbage = b"definitely not audio".repeat(64);
        assert_eq!(
            cadenza_play_encoded(e, garbage.as_ptr(), garbage.len(), ptr::null(), ptr::null_mut()),
            CadenzaStatus::Decode
        );
        cadenza_engine_destroy(e);
    }
}
