//! # Decoder
//!
//! Turns encoded audio bytes into a validated [`PcmBuffer`] using Symphonia.
//! The container/codec is detected from the bytes themselves; an optional
//! extension hint helps formats without strong magic numbers.
//!
//! Decoding is a pure transform: it never touches an engine or its graph. The
//! async entry point moves the work to a blocking task so callers can await it.

use std::io::Cursor;

use bytes::Bytes;
use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::buffer::PcmBuffer;
use crate::error::{DecodeError, DecodeFailure};

/// Decode a complete in-memory file.
pub fn decode(bytes: &[u8]) -> Result<PcmBuffer, DecodeError> {
    decode_with_hint(bytes, None)
}

/// Decode with an optional file-extension hint (e.g. `"mp3"`).
pub fn decode_with_hint(bytes: &[u8], extension: Option<&str>) -> Result<PcmBuffer, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::new(DecodeFailure::EmptyInput, "0 bytes"));
    }
    decode_source(Cursor::new(bytes.to_vec()), extension)
}

/// Decode on a blocking task; the caller awaits the result.
pub async fn decode_async(bytes: Bytes) -> Result<PcmBuffer, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::new(DecodeFailure::EmptyInput, "0 bytes"));
    }
    tokio::task::spawn_blocking(move || decode_source(Cursor::new(bytes), None))
        .await
        .map_err(|e| DecodeError::new(DecodeFailure::CorruptData, format!("decode task failed: {e}")))?
}

fn decode_source<T>(cursor: Cursor<T>, extension: Option<&str>) -> Result<PcmBuffer, DecodeError>
where
    T: AsRef<[u8]> + Send + Sync + 'static,
{
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let mss = MediaSourceStream::new(Box::new(cursor) as Box<dyn MediaSource>, Default::default());
    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| classify(&e, "probe"))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::new(DecodeFailure::UnsupportedFormat, "no audio track"))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| classify(&e, "codec"))?;

    let mut planar: Vec<Vec<f32>> = Vec::new();
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut skipped = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(classify(&e, "demux")),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(msg)) => {
                // a single bad packet is skipped, like a player would
                skipped += 1;
                debug!("skipping undecodable packet: {msg}");
                continue;
            }
            Err(e) => return Err(classify(&e, "decode")),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        if planar.is_empty() {
            planar = vec![Vec::new(); channels];
            sample_rate = spec.rate;
        } else if planar.len() != channels {
            return Err(DecodeError::new(
                DecodeFailure::CorruptData,
                format!("channel count changed from {} to {channels}", planar.len()),
            ));
        }
        if decoded.frames() == 0 {
            continue;
        }

        let mut samples = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        samples.copy_interleaved_ref(decoded);
        for frame in samples.samples().chunks_exact(channels) {
            for (dst, s) in planar.iter_mut().zip(frame) {
                dst.push(s.clamp(-1.0, 1.0));
            }
        }
    }

    if skipped > 0 {
        warn!("decoder skipped {skipped} corrupt packet(s)");
    }
    if planar.first().map_or(true, Vec::is_empty) {
        return Err(DecodeError::new(DecodeFailure::CorruptData, "no audio frames decoded"));
    }

    debug!(
        "decoded {} frames, {} ch @ {} Hz",
        planar[0].len(),
        planar.len(),
        sample_rate
    );
    PcmBuffer::new(sample_rate, planar)
        .map_err(|e| DecodeError::new(DecodeFailure::CorruptData, e.to_string()))
}

fn classify(err: &SymphoniaError, stage: &str) -> DecodeError {
    let reason = match err {
        SymphoniaError::Unsupported(_) => DecodeFailure::UnsupportedFormat,
        _ => DecodeFailure::CorruptData,
    };
    DecodeError::new(reason, format!("{stage}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(sample_rate: u32, channels: u16, frames: usize) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut w = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames {
                let v = if i % 2 == 0 { i16::MAX / 2 } else { -(i16::MAX / 2) };
                for _ in 0..channels {
                    w.write_sample(v).unwrap();
                }
            }
            w.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn decodes_wav() {
        let bytes = wav_bytes(22050, 2, 2205);
        let pcm = decode(&bytes).unwrap();
        assert_eq!(pcm.sample_rate(), 22050);
        assert_eq!(pcm.channel_count(), 2);
        assert_eq!(pcm.frames(), 2205);
        assert!((pcm.duration() - 0.1).abs() < 1e-9);
        let first = pcm.channel(0).unwrap()[0];
        assert!((first - 0.5).abs() < 1e-3, "first={first}");
    }

    #[test]
    fn empty_input() {
        let err = decode(&[]).unwrap_err();
        assert_eq!(err.reason, DecodeFailure::EmptyInput);
    }

    #[test]
    fn garbage_is_unsupported() {
        let text = b"plain text, no container magic here. ".repeat(64);
        let err = decode(&text).unwrap_err();
        assert_eq!(err.reason, DecodeFailure::UnsupportedFormat);
    }

    #[test]
    fn truncated_header_is_corrupt() {
        let bytes = wav_bytes(44100, 1, 100);
        let err = decode(&bytes[..20]).unwrap_err();
        assert_eq!(err.reason, DecodeFailure::CorruptData);
    }

    #[test]
    fn wav_header_with_garbage_data_chunk_is_corrupt() {
        let bytes = wav_bytes(44100, 1, 100);
        let data = bytes.windows(4).position(|w| w == b"data").unwrap() + 8;
        // a valid RIFF/WAVE header whose data chunk promises 200 bytes but holds one stray byte
        let mut stub = bytes[..data].to_vec();
        stub.push(0xA5);
        let err = decode(&stub).unwrap_err();
        assert_eq!(err.reason, DecodeFailure::CorruptData, "{err}");
    }

    #[tokio::test]
    async fn async_decode_matches_sync() {
        let bytes = wav_bytes(8000, 1, 800);
        let a = decode(&bytes).unwrap();
        let b = decode_async(Bytes::from(bytes)).await.unwrap();
        assert_eq!(a, b);
    }
}
