//! Cadenza CLI: plays a list of files through the engine on a cpal output device.
//!
//! Each next file is decoded and preloaded while the previous one plays, then
//! crossfaded in `--crossfade` seconds before the previous one ends.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use cadenza_engine::{
    decode_with_hint, AudioEngine, CompressorParams, DelayParams, EffectSpec, EndReason, EngineConfig,
    EngineEvent, EqualizerPreset, PcmBuffer, PlayOptions, ReverbParams, SourceId,
};
use clap::Parser;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{debug, error, info, warn};
use parking_lot::Mutex;

type SharedEngine = Arc<Mutex<AudioEngine>>;

/// Control loop period.
const TICK: Duration = Duration::from_millis(50);
/// Columns in the spectrum meter.
const METER_COLUMNS: usize = 24;

#[derive(Parser, Debug)]
#[command(name = "cadenza-cli", version, about = "Gapless music player with crossfades, EQ and effects")]
struct Args {
    /// Audio files to play in order.
    files: Vec<PathBuf>,

    /// List output devices and exit.
    #[arg(long)]
    list_devices: bool,

    /// Output device name (default device otherwise).
    #[arg(long)]
    device: Option<String>,

    #[arg(long)]
    sample_rate: Option<u32>,

    #[arg(long)]
    channels: Option<u16>,

    /// YAML engine configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Master volume in [0, 1].
    #[arg(long)]
    volume: Option<f32>,

    /// Preset name, ten comma-separated gains in dB, or `list`.
    #[arg(long, value_name = "PRESET")]
    eq: Option<String>,

    /// Crossfade length in seconds (clamped to 0.5..10).
    #[arg(long)]
    crossfade: Option<f64>,

    /// Convolution reverb: ROOM,DAMP,MIX.
    #[arg(long, value_name = "ROOM,DAMP,MIX", value_parser = parse_triple)]
    reverb: Option<[f32; 3]>,

    /// Feedback delay: TIME,FEEDBACK,MIX.
    #[arg(long, value_name = "TIME,FEEDBACK,MIX", value_parser = parse_triple)]
    delay: Option<[f32; 3]>,

    /// Insert a compressor with default settings.
    #[arg(long)]
    compress: bool,

    /// Stop after this many seconds.
    #[arg(long, value_name = "SECS")]
    duration: Option<f64>,
}

fn parse_triple(s: &str) -> std::result::Result<[f32; 3], String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<f32>().map_err(|e| format!("`{p}`: {e}")))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    <[f32; 3]>::try_from(parts).map_err(|v| format!("expected 3 comma-separated values, got {}", v.len()))
}

// ---------------------------------- Devices -------------------------------------

fn list_output_devices() -> Result<()> {
    let host = cpal::default_host();
    println!("Available output devices:");
    for dev in host.output_devices()? {
        println!("- {}", dev.name()?);
    }
    Ok(())
}

fn pick_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    if let Some(name) = name {
        for d in host.output_devices()? {
            if d.name()? == name {
                return Ok(d);
            }
        }
        bail!("requested device not found: {name}");
    }
    host.default_output_device().ok_or_else(|| anyhow!("no default output device"))
}

fn choose_config(
    device: &cpal::Device,
    req_sr: Option<u32>,
    req_ch: Option<u16>,
) -> Result<cpal::SupportedStreamConfig> {
    if req_sr.is_none() && req_ch.is_none() {
        return Ok(device.default_output_config()?);
    }

    // Score every range by distance from the request; sample rate dominates.
    let mut best: Option<(u64, cpal::SupportedStreamConfigRange)> = None;
    for range in device.supported_output_configs()? {
        let ch = range.channels();
        let sr_min = range.min_sample_rate().0;
        let sr_max = range.max_sample_rate().0;

        let ch_pen = req_ch.map_or(0, |c| u64::from(ch.abs_diff(c)));
        let sr_pen = match req_sr {
            Some(sr) if !(sr_min..=sr_max).contains(&sr) => u64::from(sr_min.abs_diff(sr).min(sr_max.abs_diff(sr))),
            _ => 0,
        };

        let score = sr_pen.saturating_mul(1000) + ch_pen;
        if best.as_ref().map_or(true, |(s, _)| score < *s) {
            best = Some((score, range));
        }
    }

    let (_, range) = best.ok_or_else(|| anyhow!("no supported output configs"))?;
    let pick_sr = match req_sr {
        Some(sr) => cpal::SampleRate(sr.clamp(range.min_sample_rate().0, range.max_sample_rate().0)),
        None => range.max_sample_rate(),
    };
    Ok(range.with_sample_rate(pick_sr))
}

fn build_stream<T>(device: &cpal::Device, cfg: &cpal::StreamConfig, engine: SharedEngine) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::FromSample<f32> + cpal::SizedSample + Send + 'static,
{
    let err_engine = Arc::clone(&engine);
    let err_fn = move |e: cpal::StreamError| {
        error!("stream error: {e}");
        if matches!(e, cpal::StreamError::DeviceNotAvailable) {
            if let Err(e) = err_engine.lock().notify_device_suspended() {
                warn!("could not mark engine suspended: {e}");
            }
        }
    };

    // Grows to the largest callback size once, then stays put.
    let mut scratch: Vec<f32> = Vec::with_capacity(8192);

    let stream = device.build_output_stream(
        cfg,
        move |output: &mut [T], _| {
            scratch.resize(output.len(), 0.0);
            engine.lock().render(&mut scratch);
            for (o, s) in output.iter_mut().zip(&scratch) {
                *o = T::from_sample(s.clamp(-1.0, 1.0));
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

// ---------------------------------- Engine setup -------------------------------------

fn load_config(args: &Args, stream: &cpal::StreamConfig) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            serde_yaml::from_str::<EngineConfig>(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => EngineConfig::default(),
    };
    config.sample_rate = stream.sample_rate.0;
    config.channels = stream.channels;
    if let Some(v) = args.volume {
        config.initial_volume = v;
    }
    if let Some(d) = args.crossfade {
        config.crossfade_duration = d;
    }
    Ok(config)
}

fn configure(engine: &mut AudioEngine, args: &Args) -> Result<()> {
    if let Some(eq) = &args.eq {
        let preset = EqualizerPreset::parse(eq).with_context(|| format!("--eq {eq}"))?;
        engine.set_equalizer_preset(&preset.gains())?;
    }

    // One effect slot: the last flag given wins in this order.
    let mut effect = None;
    if let Some([room_size, dampening, mix]) = args.reverb {
        effect = Some(EffectSpec::Reverb(ReverbParams { room_size, dampening, mix }));
    }
    if let Some([delay_time, feedback, mix]) = args.delay {
        effect = Some(EffectSpec::Delay(DelayParams { delay_time, feedback, mix }));
    }
    if args.compress {
        effect = Some(EffectSpec::Compressor(CompressorParams::default()));
    }
    if let Some(spec) = effect {
        engine.apply_effect(spec).with_context(|| format!("{:?}", spec.kind()))?;
        info!("effect: {spec:?}");
    }
    Ok(())
}

fn decode_file(path: &Path) -> Result<PcmBuffer> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let ext = path.extension().and_then(|e| e.to_str());
    let buffer = decode_with_hint(&bytes, ext).with_context(|| format!("decoding {}", path.display()))?;
    info!(
        "decoded {}: {:.1}s, {} Hz, {} ch",
        path.display(),
        buffer.duration(),
        buffer.sample_rate(),
        buffer.channel_count()
    );
    Ok(buffer)
}

/// Decode files from `queue` until one succeeds.
fn next_buffer(queue: &mut std::slice::Iter<'_, PathBuf>) -> Option<(PathBuf, PcmBuffer)> {
    for path in queue.by_ref() {
        match decode_file(path) {
            Ok(buf) => return Some((path.clone(), buf)),
            Err(e) => warn!("skipping {}: {e:#}", path.display()),
        }
    }
    None
}

// ---------------------------------- Meter -------------------------------------

fn spectrum_line(bins: &[u8]) -> String {
    const RAMP: &[u8] = b" .:-=+*#%@";
    if bins.is_empty() {
        return String::new();
    }
    let per = bins.len().div_ceil(METER_COLUMNS);
    bins.chunks(per)
        .map(|c| {
            let peak = c.iter().copied().max().unwrap_or(0);
            char::from(RAMP[usize::from(peak) * (RAMP.len() - 1) / 255])
        })
        .collect()
}

// ---------------------------------- Main -------------------------------------

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();

    if args.list_devices {
        return list_output_devices();
    }
    if args.eq.as_deref() == Some("list") {
        for name in EqualizerPreset::NAMES {
            println!("{name}");
        }
        return Ok(());
    }
    if args.files.is_empty() {
        bail!("no input files (see --help)");
    }

    let device = pick_device(args.device.as_deref())?;
    let sup_cfg = choose_config(&device, args.sample_rate, args.channels)?;
    let sample_format = sup_cfg.sample_format();
    let mut cfg = sup_cfg.config();
    if let Some(sr) = args.sample_rate {
        cfg.sample_rate = cpal::SampleRate(sr);
    }
    if let Some(ch) = args.channels {
        cfg.channels = ch;
    }
    info!("device: {}  config: {cfg:?} ({sample_format:?})", device.name()?);

    let mut engine = AudioEngine::new(load_config(&args, &cfg)?)?;
    engine.initialize()?;
    configure(&mut engine, &args)?;

    let mut queue = args.files.iter();
    let (first_path, first) = next_buffer(&mut queue).ok_or_else(|| anyhow!("none of the files could be decoded"))?;

    let shared: SharedEngine = Arc::new(Mutex::new(engine));
    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &cfg, Arc::clone(&shared))?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &cfg, Arc::clone(&shared))?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &cfg, Arc::clone(&shared))?,
        other => bail!("unsupported device sample format: {other:?}"),
    };

    let mut current: SourceId = shared.lock().play(first, PlayOptions::default())?;
    info!("playing {}", first_path.display());
    stream.play()?;

    let started = Instant::now();
    let mut last_meter = Instant::now();
    let mut preloaded: Option<PathBuf> = None;
    let mut exhausted_queue = false;

    loop {
        std::thread::sleep(TICK);

        if args.duration.is_some_and(|d| started.elapsed().as_secs_f64() >= d) {
            info!("duration reached");
            break;
        }

        // Decode the next file outside the lock.
        if preloaded.is_none() && !exhausted_queue {
            match next_buffer(&mut queue) {
                Some((path, buf)) => {
                    shared.lock().play(buf, PlayOptions::preload())?;
                    debug!("preloaded {}", path.display());
                    preloaded = Some(path);
                }
                None => exhausted_queue = true,
            }
        }

        let mut engine = shared.lock();
        let mut finished = false;
        for event in engine.poll_events()? {
            debug!("{event:?}");
            if let EngineEvent::SourceEnded { id, reason: EndReason::Exhausted, .. } = event {
                finished |= id == current;
            }
        }

        let remaining = match engine.duration()? {
            Some(d) => d - engine.current_time()?,
            None => 0.0,
        };
        let fade = engine.crossfade_duration()?;
        if let Some(path) = preloaded.as_ref() {
            let options = if finished { PlayOptions::default() } else { PlayOptions::crossfade() };
            if finished || remaining <= fade {
                match engine.play_preloaded(options) {
                    Ok(id) => {
                        info!("playing {}", path.display());
                        current = id;
                        preloaded = None;
                        finished = false;
                    }
                    Err(e) if e.is_retryable() => debug!("next track waits: {e}"),
                    Err(e) => return Err(e.into()),
                }
            }
        }
        if finished && preloaded.is_none() && exhausted_queue {
            info!("end of queue");
            break;
        }

        if last_meter.elapsed() >= Duration::from_secs(1) {
            last_meter = Instant::now();
            debug!("[{}] {:.1}s", spectrum_line(&engine.frequency_data()?), engine.current_time()?);
        }
    }

    drop(stream);
    shared.lock().destroy();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triples_parse() {
        assert_eq!(parse_triple("0.5, 0.2,0.3").unwrap(), [0.5, 0.2, 0.3]);
        assert!(parse_triple("0.5,0.2").is_err());
        assert!(parse_triple("a,b,c").is_err());
    }

    #[test]
    fn meter_maps_bins_to_columns() {
        let mut bins = vec![0u8; 48];
        bins[47] = 255;
        let line = spectrum_line(&bins);
        assert_eq!(line.len(), METER_COLUMNS);
        assert!(line.starts_with(' '));
        assert!(line.ends_with('@'));
    }

    #[test]
    fn args_parse() {
        let args = Args::try_parse_from(["cadenza-cli", "a.mp3", "b.flac", "--eq", "rock", "--delay", "0.3,0.4,0.5"])
            .unwrap();
        assert_eq!(args.files.len(), 2);
        assert_eq!(args.delay, Some([0.3, 0.4, 0.5]));
        assert_eq!(args.eq.as_deref(), Some("rock"));
    }
}
