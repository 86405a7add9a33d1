//! Configuration loading and parsing.
//!
//! A config file has an optional `device` name plus `[track]` and `[runtime]`
//! tables; every key has a default, so an empty file is valid.

use std::path::Path;

use anyhow::{Context, Result};
use audio_track_types::{AUDIO_SESSION_ID_NONE, Encoding, StreamType, TrackMode};
use serde::{Deserialize, Serialize};

use crate::track::TrackParams;

/// Top-level configuration loaded from TOML.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ConfigFile {
    /// Output device name substring (defaults to the host's default device).
    pub device: Option<String>,
    pub track: TrackConfig,
    pub runtime: CpalRuntimeConfig,
}

impl ConfigFile {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<ConfigFile>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }
}

/// Typed track creation parameters.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TrackConfig {
    pub stream_type: StreamType,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// 1 (mono) or 2 (stereo).
    pub channels: u16,
    pub encoding: Encoding,
    /// Platform buffer size in frames.
    pub buffer_frames: u32,
    pub mode: TrackMode,
    /// Requested audio session (0 lets the platform allocate one).
    pub session_id: i32,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            stream_type: StreamType::Music,
            sample_rate: 48_000,
            channels: 2,
            encoding: Encoding::Pcm16Bit,
            buffer_frames: 1024,
            mode: TrackMode::Stream,
            session_id: AUDIO_SESSION_ID_NONE,
        }
    }
}

impl TrackConfig {
    /// Raw platform codes for [`crate::Track::create`].
    ///
    /// Values beyond `i32::MAX` saturate; the track rejects them at creation.
    pub fn params(&self) -> TrackParams {
        TrackParams {
            stream_type: self.stream_type.code(),
            sample_rate: i32::try_from(self.sample_rate).unwrap_or(i32::MAX),
            channel_count: i32::from(self.channels),
            format: self.encoding.code(),
            buffer_size_in_frames: i32::try_from(self.buffer_frames).unwrap_or(i32::MAX),
            mode: self.mode.code(),
            session_id: self.session_id,
        }
    }
}

/// Settings of the emulated platform runtime.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CpalRuntimeConfig {
    /// Platform API level; decides which members the playback class exposes.
    pub api_level: u32,
    /// Maximum number of frames the output callback pulls per refill.
    ///
    /// Larger values reduce queue lock churn but can increase latency.
    pub refill_max_frames: usize,
}

impl Default for CpalRuntimeConfig {
    fn default() -> Self {
        Self {
            api_level: 21,
            refill_max_frames: 256,
        }
    }
}
