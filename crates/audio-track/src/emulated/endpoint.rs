//! One emulated playback instance: validation, state machine and write paths.
//!
//! Samples of every encoding are converted to interleaved `f32` and queued for
//! the device callback. Without a device (headless) a playing endpoint consumes
//! writes immediately and a stopped one buffers up to its capacity.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use audio_track_types::{
    Encoding, StreamType, TrackMode, WriteMode, channel_count_from_mask, play_state, state, status,
};
use cpal::traits::StreamTrait;
use crossbeam_channel::Receiver;

use super::class::{Call, ConstructorArgs, FLOAT_ENCODING_SINCE, Fault};
use crate::device;
use crate::output::{self, OutputConfig};
use crate::queue::SampleQueue;

const MIN_SAMPLE_RATE: i32 = 4_000;
const MAX_SAMPLE_RATE: i32 = 192_000;

/// Stream errors kept per endpoint before further ones are dropped.
const ERROR_BACKLOG: usize = 16;

enum Sink {
    Device(cpal::Stream),
    /// No device: playing endpoints consume samples as fast as they are written.
    Null,
    /// Never opened or already released.
    Closed,
}

pub(crate) struct Endpoint {
    encoding: Encoding,
    mode: TrackMode,
    session_id: i32,
    state: i32,
    play_state: i32,
    queue: Arc<SampleQueue>,
    playing: Arc<AtomicBool>,
    sink: Sink,
    /// Stream errors reported by the device output, when there is one.
    errors: Option<Receiver<String>>,
    dead: bool,
    aux_send_level: f32,
}

impl Endpoint {
    /// Validate constructor arguments and open the endpoint on `device`, or
    /// headless when `device` is `None`.
    ///
    /// Invalid arguments raise `IllegalArgumentException`. A device stream that
    /// cannot be built leaves the instance in `STATE_UNINITIALIZED` instead.
    pub(crate) fn open(
        args: ConstructorArgs,
        device: Option<&cpal::Device>,
        api_level: u32,
        session_id: i32,
        refill_max_frames: usize,
    ) -> Result<Self, Fault> {
        if StreamType::from_code(args.stream_type).is_none() {
            return Err(Fault::illegal_argument("Invalid stream type."));
        }
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&args.sample_rate) {
            return Err(Fault::illegal_argument(format!(
                "{}Hz is not a supported sample rate.",
                args.sample_rate
            )));
        }
        let channels = channel_count_from_mask(args.channel_mask)
            .ok_or_else(|| Fault::illegal_argument("Unsupported channel configuration."))?;
        let encoding = Encoding::from_code(args.encoding)
            .filter(|e| *e != Encoding::PcmFloat || api_level >= FLOAT_ENCODING_SINCE)
            .ok_or_else(|| Fault::illegal_argument("Unsupported sample encoding."))?;
        let channels = channels as usize;
        let frame_size = channels * encoding.sample_size();
        let buffer_size = usize::try_from(args.buffer_size_in_bytes).unwrap_or(0);
        if buffer_size == 0 || buffer_size % frame_size != 0 {
            return Err(Fault::illegal_argument("Invalid audio buffer size."));
        }
        let mode = TrackMode::from_code(args.mode)
            .ok_or_else(|| Fault::illegal_argument("Invalid mode."))?;

        let queue = Arc::new(SampleQueue::new(
            channels,
            buffer_size / encoding.sample_size(),
        ));
        let playing = Arc::new(AtomicBool::new(false));

        let mut errors = None;
        let sink = match device {
            None => Sink::Null,
            Some(device) => {
                let config = device::pick_output_config(device, args.sample_rate as u32, channels as u16)
                    .map_err(|e| Fault::illegal_argument(format!("{e:#}")))?;
                let (tx, rx) = crossbeam_channel::bounded(ERROR_BACKLOG);
                let built = output::build_output_stream(
                    device,
                    &config.config(),
                    config.sample_format(),
                    &queue,
                    OutputConfig {
                        refill_max_frames,
                        playing: playing.clone(),
                        errors: tx,
                    },
                );
                match built {
                    Ok(stream) => {
                        errors = Some(rx);
                        Sink::Device(stream)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "output stream could not be built");
                        Sink::Closed
                    }
                }
            }
        };

        let state = match (&sink, mode) {
            (Sink::Closed, _) => state::UNINITIALIZED,
            (_, TrackMode::Static) => state::NO_STATIC_DATA,
            (_, TrackMode::Stream) => state::INITIALIZED,
        };

        tracing::debug!(
            sample_rate = args.sample_rate,
            channels,
            encoding = ?encoding,
            buffer_size,
            mode = ?mode,
            session_id,
            state,
            "emulated endpoint opened"
        );

        Ok(Self {
            encoding,
            mode,
            session_id,
            state,
            play_state: play_state::STOPPED,
            queue,
            playing,
            sink,
            errors,
            dead: false,
            aux_send_level: 0.0,
        })
    }

    pub(crate) fn dispatch(&mut self, call: Call<'_>) -> Result<i32, Fault> {
        match call {
            Call::Play => self.play().map(|()| status::SUCCESS),
            Call::Pause => self.pause().map(|()| status::SUCCESS),
            Call::Stop => self.stop().map(|()| status::SUCCESS),
            Call::Flush => {
                self.flush();
                Ok(status::SUCCESS)
            }
            Call::Release => {
                self.release();
                Ok(status::SUCCESS)
            }
            Call::GetState => Ok(self.state),
            Call::GetPlayState => Ok(self.play_state),
            Call::GetAudioSessionId => Ok(self.session_id),
            Call::SetAuxEffectSendLevel(level) => self.set_aux_effect_send_level(level),
            Call::AttachAuxEffect(effect_id) => Ok(self.attach_aux_effect(effect_id)),
            Call::WriteShorts { data, offset, size } => Ok(self.write_shorts(data, offset, size)),
            Call::WriteFloats {
                data,
                offset,
                size,
                write_mode,
            } => Ok(self.write_floats(data, offset, size, write_mode)),
            Call::WriteByteBuffer {
                data,
                size,
                write_mode,
            } => Ok(self.write_byte_buffer(data, size, write_mode)),
        }
    }

    pub(crate) fn session_id(&self) -> i32 {
        self.session_id
    }

    fn ensure_initialized(&self, what: &str) -> Result<(), Fault> {
        if self.state != state::INITIALIZED {
            return Err(Fault::illegal_state(format!(
                "{what}() called on uninitialized AudioTrack."
            )));
        }
        Ok(())
    }

    fn play(&mut self) -> Result<(), Fault> {
        self.ensure_initialized("play")?;
        if let Sink::Device(stream) = &self.sink {
            stream
                .play()
                .map_err(|e| Fault::illegal_state(format!("output could not start: {e}")))?;
        }
        self.playing.store(true, Ordering::Relaxed);
        self.play_state = play_state::PLAYING;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), Fault> {
        self.ensure_initialized("pause")?;
        self.playing.store(false, Ordering::Relaxed);
        self.play_state = play_state::PAUSED;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Fault> {
        self.ensure_initialized("stop")?;
        self.playing.store(false, Ordering::Relaxed);
        self.play_state = play_state::STOPPED;
        Ok(())
    }

    /// Discard queued data. Ignored while playing, for static tracks, and
    /// before initialisation.
    fn flush(&mut self) {
        if self.state == state::INITIALIZED
            && self.mode == TrackMode::Stream
            && self.play_state != play_state::PLAYING
        {
            if !self.queue.is_empty() {
                tracing::debug!(session_id = self.session_id, discarded = self.queue.len(), "flush");
            }
            self.queue.clear();
        }
    }

    fn release(&mut self) {
        self.playing.store(false, Ordering::Relaxed);
        self.queue.close();
        self.sink = Sink::Closed;
        self.errors = None;
        self.state = state::UNINITIALIZED;
        self.play_state = play_state::STOPPED;
    }

    fn set_aux_effect_send_level(&mut self, level: f32) -> Result<i32, Fault> {
        if self.state == state::UNINITIALIZED {
            return Ok(status::ERROR_INVALID_OPERATION);
        }
        if level.is_nan() {
            return Err(Fault::illegal_argument("NaN is not a valid send level"));
        }
        self.aux_send_level = level.clamp(0.0, 1.0);
        tracing::debug!(session_id = self.session_id, level = self.aux_send_level, "aux send level set");
        Ok(status::SUCCESS)
    }

    /// Only detaching (effect id 0) succeeds: the emulation hosts no effects.
    fn attach_aux_effect(&mut self, effect_id: i32) -> i32 {
        if self.state == state::UNINITIALIZED {
            return status::ERROR_INVALID_OPERATION;
        }
        if effect_id != 0 {
            return status::ERROR_BAD_VALUE;
        }
        status::SUCCESS
    }

    fn write_shorts(&mut self, data: &[i16], offset: i32, size: i32) -> i32 {
        if self.state == state::UNINITIALIZED || self.encoding != Encoding::Pcm16Bit {
            return status::ERROR_INVALID_OPERATION;
        }
        let Some(range) = slice_range(data.len(), offset, size) else {
            return status::ERROR_BAD_VALUE;
        };
        if let Some(code) = self.check_alive() {
            return code;
        }
        let samples: Vec<f32> = data[range].iter().map(|&s| short_to_f32(s)).collect();
        self.submit(&samples, true, 1)
    }

    fn write_floats(&mut self, data: &[f32], offset: i32, size: i32, write_mode: i32) -> i32 {
        if self.state == state::UNINITIALIZED || self.encoding != Encoding::PcmFloat {
            return status::ERROR_INVALID_OPERATION;
        }
        let Some(write_mode) = WriteMode::from_code(write_mode) else {
            return status::ERROR_BAD_VALUE;
        };
        let Some(range) = slice_range(data.len(), offset, size) else {
            return status::ERROR_BAD_VALUE;
        };
        if let Some(code) = self.check_alive() {
            return code;
        }
        self.submit(&data[range], write_mode == WriteMode::Blocking, 1)
    }

    fn write_byte_buffer(&mut self, data: &[u8], size: i32, write_mode: i32) -> i32 {
        if self.state == state::UNINITIALIZED {
            return status::ERROR_INVALID_OPERATION;
        }
        let Some(write_mode) = WriteMode::from_code(write_mode) else {
            return status::ERROR_BAD_VALUE;
        };
        let sample_size = self.encoding.sample_size();
        let Some(range) = slice_range(data.len(), 0, size) else {
            return status::ERROR_BAD_VALUE;
        };
        if range.len() % sample_size != 0 {
            return status::ERROR_BAD_VALUE;
        }
        if let Some(code) = self.check_alive() {
            return code;
        }
        let samples = bytes_to_f32(self.encoding, &data[range]);
        self.submit(&samples, write_mode == WriteMode::Blocking, sample_size)
    }

    /// Drain pending stream errors. Returns `ERROR_DEAD_OBJECT` once any arrived.
    fn check_alive(&mut self) -> Option<i32> {
        if let Some(errors) = &self.errors {
            for message in errors.try_iter() {
                tracing::warn!(session_id = self.session_id, error = %message, "endpoint output died");
                self.dead = true;
            }
        }
        self.dead.then_some(status::ERROR_DEAD_OBJECT)
    }

    /// Queue samples and return how many were accepted, counted in `unit`s
    /// per sample, or `ERROR_DEAD_OBJECT` when the output died mid-write.
    ///
    /// Blocking applies only to a playing streaming endpoint with a device;
    /// anything else would wait on a consumer that never runs.
    fn submit(&mut self, samples: &[f32], blocking: bool, unit: usize) -> i32 {
        let playing = self.play_state == play_state::PLAYING;
        let accepted = match &self.sink {
            Sink::Null if playing => samples.len(),
            Sink::Device(_) if blocking && playing && self.mode == TrackMode::Stream => {
                self.queue.push_blocking(samples)
            }
            _ => self.queue.push_available(samples),
        };
        if accepted < samples.len() {
            if let Some(code) = self.check_alive() {
                return code;
            }
        }
        if accepted > 0 && self.state == state::NO_STATIC_DATA {
            self.state = state::INITIALIZED;
        }
        count(accepted * unit)
    }

    #[cfg(test)]
    pub(crate) fn queued_samples(&self) -> usize {
        self.queue.len()
    }

    #[cfg(test)]
    pub(crate) fn aux_send_level(&self) -> f32 {
        self.aux_send_level
    }
}

/// `offset..offset + size` if it lies within a buffer of `len` elements.
fn slice_range(len: usize, offset: i32, size: i32) -> Option<std::ops::Range<usize>> {
    let offset = usize::try_from(offset).ok()?;
    let size = usize::try_from(size).ok()?;
    let end = offset.checked_add(size)?;
    (end <= len).then_some(offset..end)
}

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

fn short_to_f32(s: i16) -> f32 {
    f32::from(s) / 32_768.0
}

/// Decode native-order (little-endian) PCM bytes. 8-bit PCM is unsigned.
fn bytes_to_f32(encoding: Encoding, bytes: &[u8]) -> Vec<f32> {
    match encoding {
        Encoding::Pcm8Bit => bytes
            .iter()
            .map(|&b| (f32::from(b) - 128.0) / 128.0)
            .collect(),
        Encoding::Pcm16Bit => bytes
            .chunks_exact(2)
            .map(|c| short_to_f32(i16::from_le_bytes([c[0], c[1]])))
            .collect(),
        Encoding::PcmFloat => bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    }
}
