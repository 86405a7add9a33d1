use std::path::PathBuf;

use audio_track::ConfigFile;
use audio_track_types::{Encoding, TrackMode};
use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "track-play", version)]
pub struct Args {
    /// TOML config file; flags below override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Run without an output device (writes are discarded while playing)
    #[arg(long)]
    pub headless: bool,

    /// Track sample rate in Hz (must be playable by the device as-is)
    #[arg(long)]
    pub rate: Option<u32>,

    /// 1 (mono) or 2 (stereo)
    #[arg(long)]
    pub channels: Option<u16>,

    /// Sample encoding submitted to the track
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Platform buffer size in frames
    #[arg(long)]
    pub frames: Option<u32>,

    /// Load the whole tone before playing instead of streaming it
    #[arg(long = "static")]
    pub static_mode: bool,

    /// Emulated platform API level (decides available write paths)
    #[arg(long)]
    pub api_level: Option<u32>,

    /// Tone duration in seconds
    #[arg(long, default_value_t = 3.0)]
    pub seconds: f32,

    /// Tone frequency in Hz
    #[arg(long, default_value_t = 440.0)]
    pub frequency: f32,

    /// Tone amplitude (0.0..=1.0)
    #[arg(long, default_value_t = 0.2)]
    pub amplitude: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Pcm8,
    Pcm16,
    Float,
}

impl From<FormatArg> for Encoding {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Pcm8 => Encoding::Pcm8Bit,
            FormatArg::Pcm16 => Encoding::Pcm16Bit,
            FormatArg::Float => Encoding::PcmFloat,
        }
    }
}

impl Args {
    /// Overlay command-line values on a loaded config.
    pub fn apply(&self, cfg: &mut ConfigFile) {
        if let Some(device) = &self.device {
            cfg.device = Some(device.clone());
        }
        if let Some(rate) = self.rate {
            cfg.track.sample_rate = rate;
        }
        if let Some(channels) = self.channels {
            cfg.track.channels = channels;
        }
        if let Some(format) = self.format {
            cfg.track.encoding = format.into();
        }
        if let Some(frames) = self.frames {
            cfg.track.buffer_frames = frames;
        }
        if self.static_mode {
            cfg.track.mode = TrackMode::Static;
        }
        if let Some(level) = self.api_level {
            cfg.runtime.api_level = level;
        }
    }
}
