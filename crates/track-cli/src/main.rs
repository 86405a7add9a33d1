//! track-play: creates a platform playback track on the emulated runtime and
//! plays a test tone through whichever write path the track negotiated.
//!
//! ## Flow
//! 1. Load the optional TOML config and overlay command-line flags.
//! 2. Open the output device (or run headless) as an emulated platform runtime.
//! 3. Create the track, report its negotiated geometry and session.
//! 4. Stream the tone (or load it whole in static mode), then stop, flush and release.

mod cli;
mod tone;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use audio_track::{ConfigFile, CpalRuntime, Track, TrackConfig, WritePath, device, unit_status_code};
use audio_track_types::{TrackMode, WriteMode};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tone::Tone;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,audio_track=info,track_play=info")
        }))
        .init();

    if args.list_devices {
        let host = cpal::default_host();
        for (i, name) in device::list_devices(&host)?.iter().enumerate() {
            eprintln!("#{i}: {name}");
        }
        return Ok(());
    }

    let mut cfg = match &args.config {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::default(),
    };
    args.apply(&mut cfg);

    let mut rt = if args.headless {
        CpalRuntime::headless(cfg.runtime)
    } else {
        CpalRuntime::open(cfg.device.as_deref(), cfg.runtime)?
    };

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    ctrlc::set_handler(move || stop_flag.store(true, Ordering::Relaxed))
        .context("install ctrl-c handler")?;

    let mut track = Track::new();
    track
        .create(&mut rt, &cfg.track.params())
        .context("create track")?;
    tracing::info!(
        session_id = track.audio_session_id(&mut rt),
        bytes = track.buffer_size_in_bytes(),
        api_level = rt.api_level(),
        headless = rt.is_headless(),
        "track ready"
    );

    let result = play_tone(&mut rt, &mut track, &cfg.track, &args, &stop);

    for (what, code) in [
        ("stop", unit_status_code(track.stop(&mut rt))),
        ("flush", unit_status_code(track.flush(&mut rt))),
    ] {
        if code != 0 {
            tracing::warn!(status = code, "{what} failed");
        }
    }
    track.release(&mut rt);
    result
}

fn play_tone(
    rt: &mut CpalRuntime,
    track: &mut Track,
    cfg: &TrackConfig,
    args: &cli::Args,
    stop: &AtomicBool,
) -> Result<()> {
    let Some(path) = preferred_path(track) else {
        bail!("track has no usable write path");
    };
    tracing::info!(?path, "write path");

    let channels = usize::from(cfg.channels);
    let mut tone = Tone::new(args.frequency, cfg.sample_rate, args.amplitude, channels);
    let total_frames = (args.seconds.max(0.0) * cfg.sample_rate as f32) as usize;
    let buffer_frames = cfg.buffer_frames as usize;

    if cfg.mode == TrackMode::Static {
        let frames = total_frames.min(buffer_frames);
        write_all(rt, track, path, cfg, &tone.fill(frames), stop)?;
        track.play(rt)?;
        wait_frames(frames, cfg.sample_rate, stop);
        return Ok(());
    }

    track.play(rt)?;
    let chunk = (buffer_frames / 2).max(1);
    let mut written = 0;
    while written < total_frames && !stop.load(Ordering::Relaxed) {
        let frames = chunk.min(total_frames - written);
        write_all(rt, track, path, cfg, &tone.fill(frames), stop)?;
        written += frames;
    }
    // Let the platform buffer play out.
    wait_frames(buffer_frames, cfg.sample_rate, stop);
    Ok(())
}

/// Float first, then 16-bit shorts, then raw bytes.
fn preferred_path(track: &Track) -> Option<WritePath> {
    [WritePath::Floats, WritePath::Shorts, WritePath::ByteBuffer]
        .into_iter()
        .find(|p| track.supports_write_path(*p))
}

fn write_all(
    rt: &mut CpalRuntime,
    track: &mut Track,
    path: WritePath,
    cfg: &TrackConfig,
    samples: &[f32],
    stop: &AtomicBool,
) -> Result<()> {
    match path {
        WritePath::Shorts => {
            let buf = tone::to_shorts(samples);
            let mut offset = 0;
            while offset < buf.len() && !stop.load(Ordering::Relaxed) {
                let n = track.write_shorts(rt, &buf, offset, buf.len() - offset)?;
                offset += accepted(n)?;
            }
        }
        WritePath::Floats => {
            let mut offset = 0;
            while offset < samples.len() && !stop.load(Ordering::Relaxed) {
                let n = track.write_floats(
                    rt,
                    samples,
                    offset,
                    samples.len() - offset,
                    WriteMode::Blocking,
                )?;
                offset += accepted(n)?;
            }
        }
        WritePath::ByteBuffer => {
            let buf = tone::to_bytes(cfg.encoding, samples);
            let mut offset = 0;
            while offset < buf.len() && !stop.load(Ordering::Relaxed) {
                let rest = &buf[offset..];
                let n = track.write_byte_buffer(rt, rest, rest.len(), WriteMode::Blocking)?;
                offset += accepted(n)?;
            }
        }
    }
    Ok(())
}

/// Units accepted by a write, backing off briefly when the platform buffer is full.
fn accepted(status: i32) -> Result<usize> {
    if status < 0 {
        bail!("track write failed with status {status}");
    }
    if status == 0 {
        thread::sleep(Duration::from_millis(5));
    }
    Ok(status as usize)
}

fn wait_frames(frames: usize, sample_rate: u32, stop: &AtomicBool) {
    let mut remaining = Duration::from_secs_f64(frames as f64 / f64::from(sample_rate.max(1)));
    let tick = Duration::from_millis(20);
    while !remaining.is_zero() && !stop.load(Ordering::Relaxed) {
        let step = remaining.min(tick);
        thread::sleep(step);
        remaining -= step;
    }
}
