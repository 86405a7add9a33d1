//! Platform audio constants shared by the track core, the emulated runtime and the CLI.
//!
//! Integer values follow the Android `AudioFormat` / `AudioTrack` / `AudioManager`
//! conventions so that raw codes can cross the binding layer unchanged.

use serde::{Deserialize, Serialize};

/// Status codes returned by track operations.
pub mod status {
    pub const SUCCESS: i32 = 0;
    pub const ERROR: i32 = -1;
    pub const ERROR_BAD_VALUE: i32 = -2;
    pub const ERROR_INVALID_OPERATION: i32 = -3;
    pub const ERROR_DEAD_OBJECT: i32 = -6;
}

/// Sample encodings (`AudioFormat.ENCODING_*`).
pub mod encoding {
    pub const INVALID: i32 = 0;
    pub const DEFAULT: i32 = 1;
    pub const PCM_16BIT: i32 = 2;
    pub const PCM_8BIT: i32 = 3;
    pub const PCM_FLOAT: i32 = 4;
}

/// Output channel masks (`AudioFormat.CHANNEL_OUT_*`).
pub mod channel {
    pub const INVALID: i32 = 0;
    pub const OUT_MONO: i32 = 4;
    pub const OUT_STEREO: i32 = 12;
}

/// Track states reported by `getState`.
pub mod state {
    pub const UNINITIALIZED: i32 = 0;
    pub const INITIALIZED: i32 = 1;
    pub const NO_STATIC_DATA: i32 = 2;
}

/// Play states reported by `getPlayState`.
pub mod play_state {
    pub const STOPPED: i32 = 1;
    pub const PAUSED: i32 = 2;
    pub const PLAYING: i32 = 3;
}

/// Session id meaning "no session" / "let the platform allocate one".
pub const AUDIO_SESSION_ID_NONE: i32 = 0;

/// Size in bytes of one sample for `encoding`, or `None` when the encoding has no
/// fixed PCM sample size.
pub fn sample_size_from_encoding(encoding: i32) -> Option<usize> {
    match encoding {
        encoding::PCM_8BIT => Some(1),
        encoding::PCM_16BIT => Some(2),
        encoding::PCM_FLOAT => Some(4),
        _ => None,
    }
}

/// Output channel mask for a channel count. Only mono and stereo layouts exist.
pub fn channel_mask_from_count(channels: i32) -> Option<i32> {
    match channels {
        1 => Some(channel::OUT_MONO),
        2 => Some(channel::OUT_STEREO),
        _ => None,
    }
}

/// Inverse of [`channel_mask_from_count`].
pub fn channel_count_from_mask(mask: i32) -> Option<i32> {
    match mask {
        channel::OUT_MONO => Some(1),
        channel::OUT_STEREO => Some(2),
        _ => None,
    }
}

/// Typed sample encoding used by configuration files.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// Unsigned 8-bit PCM.
    Pcm8Bit,
    /// Signed 16-bit PCM.
    Pcm16Bit,
    /// 32-bit float PCM.
    PcmFloat,
}

impl Encoding {
    pub fn code(self) -> i32 {
        match self {
            Encoding::Pcm8Bit => encoding::PCM_8BIT,
            Encoding::Pcm16Bit => encoding::PCM_16BIT,
            Encoding::PcmFloat => encoding::PCM_FLOAT,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            encoding::PCM_8BIT => Some(Encoding::Pcm8Bit),
            encoding::PCM_16BIT => Some(Encoding::Pcm16Bit),
            encoding::PCM_FLOAT => Some(Encoding::PcmFloat),
            _ => None,
        }
    }

    pub fn sample_size(self) -> usize {
        match self {
            Encoding::Pcm8Bit => 1,
            Encoding::Pcm16Bit => 2,
            Encoding::PcmFloat => 4,
        }
    }
}

/// Audio stream types (`AudioManager.STREAM_*`).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    VoiceCall,
    System,
    Ring,
    Music,
    Alarm,
    Notification,
}

impl StreamType {
    pub fn code(self) -> i32 {
        match self {
            StreamType::VoiceCall => 0,
            StreamType::System => 1,
            StreamType::Ring => 2,
            StreamType::Music => 3,
            StreamType::Alarm => 4,
            StreamType::Notification => 5,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(StreamType::VoiceCall),
            1 => Some(StreamType::System),
            2 => Some(StreamType::Ring),
            3 => Some(StreamType::Music),
            4 => Some(StreamType::Alarm),
            5 => Some(StreamType::Notification),
            _ => None,
        }
    }
}

/// Buffer transfer mode passed to the endpoint constructor.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrackMode {
    /// The whole clip is written once before playback.
    Static,
    /// Data is streamed continuously while playing.
    #[default]
    Stream,
}

impl TrackMode {
    pub fn code(self) -> i32 {
        match self {
            TrackMode::Static => 0,
            TrackMode::Stream => 1,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(TrackMode::Static),
            1 => Some(TrackMode::Stream),
            _ => None,
        }
    }
}

/// Blocking behaviour of the float and byte-buffer write calls.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Wait until all requested data has been queued.
    #[default]
    Blocking,
    /// Queue what fits right now and return.
    NonBlocking,
}

impl WriteMode {
    pub fn code(self) -> i32 {
        match self {
            WriteMode::Blocking => 0,
            WriteMode::NonBlocking => 1,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(WriteMode::Blocking),
            1 => Some(WriteMode::NonBlocking),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_size_covers_pcm_encodings_only() {
        assert_eq!(sample_size_from_encoding(encoding::PCM_8BIT), Some(1));
        assert_eq!(sample_size_from_encoding(encoding::PCM_16BIT), Some(2));
        assert_eq!(sample_size_from_encoding(encoding::PCM_FLOAT), Some(4));
        assert_eq!(sample_size_from_encoding(encoding::INVALID), None);
        assert_eq!(sample_size_from_encoding(encoding::DEFAULT), None);
        assert_eq!(sample_size_from_encoding(99), None);
    }

    #[test]
    fn channel_mask_maps_mono_and_stereo() {
        assert_eq!(channel_mask_from_count(1), Some(channel::OUT_MONO));
        assert_eq!(channel_mask_from_count(2), Some(channel::OUT_STEREO));
        assert_eq!(channel_mask_from_count(0), None);
        assert_eq!(channel_mask_from_count(6), None);
        assert_eq!(channel_count_from_mask(channel::OUT_STEREO), Some(2));
        assert_eq!(channel_count_from_mask(channel::INVALID), None);
    }

    #[test]
    fn typed_encoding_agrees_with_table() {
        for enc in [Encoding::Pcm8Bit, Encoding::Pcm16Bit, Encoding::PcmFloat] {
            assert_eq!(Encoding::from_code(enc.code()), Some(enc));
            assert_eq!(sample_size_from_encoding(enc.code()), Some(enc.sample_size()));
        }
    }

    #[test]
    fn stream_type_codes_match_platform() {
        assert_eq!(StreamType::Music.code(), 3);
        assert_eq!(StreamType::from_code(4), Some(StreamType::Alarm));
        assert_eq!(StreamType::from_code(42), None);
    }

    #[test]
    fn modes_default_to_streaming_and_blocking() {
        assert_eq!(TrackMode::default().code(), 1);
        assert_eq!(WriteMode::default().code(), 0);
        assert_eq!(WriteMode::from_code(1), Some(WriteMode::NonBlocking));
        assert_eq!(TrackMode::from_code(2), None);
    }
}
