//! # Engine Error Types
//!
//! Decode failures and control-surface errors. Every invalid input is reported;
//! the engine never substitutes a default for it.

use thiserror::Error;

/// Why a byte stream could not be turned into PCM.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeFailure {
    /// No container/codec reader recognised the input.
    #[error("unsupported format")]
    UnsupportedFormat,
    /// The container was recognised but its contents could not be decoded.
    #[error("corrupt data")]
    CorruptData,
    /// Zero bytes were supplied.
    #[error("empty input")]
    EmptyInput,
}

/// Decoding failed. Not retried by the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("decode failed ({reason}): {detail}")]
pub struct DecodeError {
    pub reason: DecodeFailure,
    pub detail: String,
}

impl DecodeError {
    pub(crate) fn new(reason: DecodeFailure, detail: impl Into<String>) -> Self {
        Self { reason, detail: detail.into() }
    }
}

/// Errors surfaced by the engine facade.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    // ========================================================================
    // Input errors
    // ========================================================================
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// PCM buffer is empty or malformed.
    #[error("invalid buffer: {0}")]
    InvalidBuffer(String),

    /// Parameter is not acceptable (non-finite, out of the documented range).
    #[error("invalid parameter `{name}` = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    /// Index or value outside its fixed range (equalizer bands and gains).
    #[error("`{name}` = {value} outside [{min}, {max}]")]
    Range {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    // ========================================================================
    // State errors (retry after the state changes)
    // ========================================================================
    /// Only one crossfade may run at a time.
    #[error("a crossfade is already in progress")]
    CrossfadeInProgress,

    #[error("seek to {requested}s outside [0, {duration}]s")]
    SeekOutOfRange { requested: f64, duration: f64 },

    #[error("no source is loaded")]
    NoActiveSource,

    #[error("no source has been preloaded")]
    NothingPreloaded,

    // ========================================================================
    // Lifecycle errors
    // ========================================================================
    #[error("engine not initialized")]
    NotInitialized,

    #[error("engine destroyed")]
    Destroyed,
}

impl EngineError {
    /// Caller programming errors: reported, never retried.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidBuffer(_)
                | EngineError::InvalidParameter { .. }
                | EngineError::Range { .. }
        )
    }

    /// Valid operations that the current state rejects; retry once it changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::CrossfadeInProgress
                | EngineError::SeekOutOfRange { .. }
                | EngineError::NoActiveSource
                | EngineError::NothingPreloaded
        )
    }

    /// Lifecycle ordering violations: fatal to the call, not to the engine.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, EngineError::NotInitialized | EngineError::Destroyed)
    }

    pub(crate) fn invalid(name: &'static str, value: f64, reason: &'static str) -> Self {
        EngineError::InvalidParameter { name, value, reason }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Validate that `value` is finite and lies in `[min, max]`.
pub(crate) fn check_param(name: &'static str, value: f32, min: f32, max: f32) -> Result<f32> {
    if !value.is_finite() {
        return Err(EngineError::invalid(name, f64::from(value), "must be finite"));
    }
    if value < min || value > max {
        return Err(EngineError::invalid(name, f64::from(value), "out of range"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(EngineError::InvalidBuffer("x".into()).is_caller_error());
        assert!(EngineError::CrossfadeInProgress.is_retryable());
        assert!(EngineError::Destroyed.is_lifecycle());
        assert!(!EngineError::NotInitialized.is_retryable());
    }

    #[test]
    fn decode_error_converts() {
        let e: EngineError = DecodeError::new(DecodeFailure::EmptyInput, "0 bytes").into();
        assert_eq!(e.to_string(), "decode failed (empty input): 0 bytes");
    }

    #[test]
    fn check_param_rejects_nan_and_range() {
        assert!(check_param("mix", f32::NAN, 0.0, 1.0).is_err());
        assert!(check_param("mix", 1.5, 0.0, 1.0).is_err());
        assert_eq!(check_param("mix", 0.5, 0.0, 1.0), Ok(0.5));
    }
}
