//! Cadenza Engine: decoding, signal graph, scheduling and crossfades for music playback.
//!
//! Crate layout:
//! - [`decoder`]   : encoded bytes → [`PcmBuffer`] (Symphonia), sync and async
//! - [`buffer`]    : validated planar PCM
//! - [`source`]    : a buffer bound to the engine clock, with its own fader
//! - [`graph`]     : `Processor` trait and the persistent chain (effect slot → EQ → gain → analyser)
//! - [`equalizer`] : ten-band biquad chain and presets
//! - [`effects`]   : effect parameters and the module enum; [`reverb`], [`delay`], [`compressor`]
//! - [`analyser`]  : FFT tap for visualizers
//! - [`crossfade`] : dual-ramp crossfade controller
//! - [`scheduler`] : current / pending / preloaded slots
//! - [`engine`]    : the [`AudioEngine`] facade
//!
//! The render path neither allocates nor logs; finished sources and replaced
//! effects are freed by the next control call. Control calls validate
//! synchronously and only program state; audio moves when the host calls
//! [`AudioEngine::render`].

pub mod analyser;
pub mod buffer;
pub mod clock;
pub mod compressor;
pub mod config;
pub mod crossfade;
pub mod decoder;
pub mod delay;
pub mod effects;
pub mod engine;
pub mod equalizer;
pub mod error;
pub mod events;
pub mod graph;
pub mod nodes;
pub mod reverb;
pub mod scheduler;
pub mod source;

// Re-export the commonly used items so hosts need a single import.
pub use buffer::PcmBuffer;
pub use clock::TransportState;
pub use config::EngineConfig;
pub use crossfade::CrossfadeCurve;
pub use decoder::{decode, decode_async, decode_with_hint};
pub use effects::{CompressorParams, DelayParams, EffectKind, EffectSpec, ReverbParams};
pub use engine::AudioEngine;
pub use equalizer::{EqualizerPreset, BAND_COUNT, BAND_FREQUENCIES};
pub use error::{DecodeError, DecodeFailure, EngineError, Result};
pub use events::{EndReason, EngineEvent};
pub use graph::{Processor, RewireOutcome};
pub use scheduler::{PlayOptions, PlaybackSnapshot};
pub use source::{SourceId, SourceState};
