//! Device output stage of the emulated endpoint (CPAL output stream).
//!
//! The callback:
//! - outputs silence while the endpoint is not playing, without draining the queue
//! - refills a small local buffer from the sample queue without blocking
//! - drops that local buffer when the queue was flushed since the last refill
//! - maps the track's mono/stereo layout onto the device layout
//! - converts `f32` samples to the device sample format

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;
use crossbeam_channel::Sender;

use crate::queue::SampleQueue;

/// Settings for one endpoint's output stream.
#[derive(Clone, Debug)]
pub struct OutputConfig {
    /// Maximum number of frames to pull from the queue per refill.
    pub refill_max_frames: usize,

    /// While `false` the callback outputs silence and leaves the queue alone.
    pub playing: Arc<AtomicBool>,

    /// Receives a description of every stream error raised by the backend.
    /// The queue is closed at the same time, so blocked writers return.
    pub errors: Sender<String>,
}

/// Build a CPAL output stream that plays interleaved `f32` samples from `queue`.
///
/// The stream is created but not started; the caller owns `play()`/`pause()`.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    queue: &Arc<SampleQueue>,
    cfg: OutputConfig,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, queue, cfg),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, queue, cfg),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, queue, cfg),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, queue, cfg),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: &Arc<SampleQueue>,
    cfg: OutputConfig,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = (config.channels as usize).max(1);
    let refill_max_frames = cfg.refill_max_frames.max(1);
    let queue_cb = queue.clone();
    let playing = cfg.playing;
    let errors = cfg.errors;

    let queue_err = queue.clone();

    let mut st = MappedFrames {
        pos: 0,
        src_channels: queue.channels(),
        src: Vec::new(),
        generation: queue.generation(),
    };

    let err_fn = move |err: cpal::StreamError| {
        report_stream_error(&queue_err, &errors, err.to_string());
    };

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);
            if !playing.load(Ordering::Relaxed) {
                data.fill(silence);
                return;
            }
            st.sync_generation(queue_cb.generation());

            let frames = data.len() / channels_out;
            for frame in 0..frames {
                if st.pos >= st.src.len() {
                    st.pos = 0;
                    st.src.clear();
                    match queue_cb.pop_frames(refill_max_frames) {
                        Some(v) => st.src = v,
                        None => {
                            data[frame * channels_out..].fill(silence);
                            break;
                        }
                    }
                }
                for ch in 0..channels_out {
                    data[frame * channels_out + ch] =
                        <T as cpal::Sample>::from_sample::<f32>(st.next_sample(channels_out, ch));
                }
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Hand a stream error to the endpoint and close its queue.
///
/// The callback stops draining once the stream has failed, so a writer
/// blocked on a full queue would otherwise never wake up.
pub(crate) fn report_stream_error(queue: &SampleQueue, errors: &Sender<String>, message: String) {
    tracing::warn!("stream error: {message}");
    let _ = errors.try_send(message);
    queue.close();
}

/// Local buffer of interleaved samples fetched from the queue, so the callback
/// locks the queue once per refill rather than once per sample.
struct MappedFrames {
    pos: usize,
    src_channels: usize,
    src: Vec<f32>,
    /// Queue flush generation `src` was popped under.
    generation: u64,
}

impl MappedFrames {
    fn sync_generation(&mut self, generation: u64) {
        if generation != self.generation {
            self.generation = generation;
            self.pos = 0;
            self.src.clear();
        }
    }

    /// Read one output sample for `dst_ch`, applying the channel mapping.
    ///
    /// - mono to stereo duplicates channel 0
    /// - stereo to mono averages left and right
    /// - other layouts clamp to the available source channels
    ///
    /// `pos` advances once per destination frame, after the last channel.
    fn next_sample(&mut self, dst_channels: usize, dst_ch: usize) -> f32 {
        if self.pos >= self.src.len() {
            return 0.0;
        }

        let frame_start = self.pos;
        let get_src = |ch: usize| -> f32 {
            if ch < self.src_channels {
                self.src.get(frame_start + ch).copied().unwrap_or(0.0)
            } else {
                0.0
            }
        };

        let out = match (self.src_channels, dst_channels) {
            (2, 1) => 0.5 * (get_src(0) + get_src(1)),
            (1, _) => get_src(0),
            _ => get_src(dst_ch.min(self.src_channels.saturating_sub(1))),
        };

        if dst_ch + 1 == dst_channels {
            self.pos += self.src_channels;
        }
        out
    }
}
