//! Capability negotiation: the fixed set of members a track resolves once at creation.

use std::fmt;

use audio_track_types::encoding;

use crate::runtime::{ClassRef, MethodId, Runtime, resolve_optional};

/// Binary name of the platform playback class.
pub const PLATFORM_CLASS: &str = "android/media/AudioTrack";

/// Constructor name and its six-int signature
/// `(streamType, sampleRate, channelMask, encoding, bufferSizeInBytes, mode)`.
pub const CONSTRUCTOR_NAME: &str = "<init>";
pub const CONSTRUCTOR_SIGNATURE: &str = "(IIIIII)V";

/// Named member of the playback endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    Play,
    Pause,
    Stop,
    Flush,
    Release,
    GetState,
    GetPlayState,
    GetAudioSessionId,
    SetAuxEffectSendLevel,
    AttachAuxEffect,
    WriteShorts,
    WriteFloats,
    WriteByteBuffer,
}

impl EntryPoint {
    /// Members that every created track must have.
    pub const CONTROL: [EntryPoint; 10] = [
        EntryPoint::Play,
        EntryPoint::Pause,
        EntryPoint::Stop,
        EntryPoint::Flush,
        EntryPoint::Release,
        EntryPoint::GetState,
        EntryPoint::GetPlayState,
        EntryPoint::GetAudioSessionId,
        EntryPoint::SetAuxEffectSendLevel,
        EntryPoint::AttachAuxEffect,
    ];

    /// Data-transfer members; at least one compatible with the format is required.
    pub const WRITE: [EntryPoint; 3] = [
        EntryPoint::WriteShorts,
        EntryPoint::WriteFloats,
        EntryPoint::WriteByteBuffer,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EntryPoint::Play => "play",
            EntryPoint::Pause => "pause",
            EntryPoint::Stop => "stop",
            EntryPoint::Flush => "flush",
            EntryPoint::Release => "release",
            EntryPoint::GetState => "getState",
            EntryPoint::GetPlayState => "getPlayState",
            EntryPoint::GetAudioSessionId => "getAudioSessionId",
            EntryPoint::SetAuxEffectSendLevel => "setAuxEffectSendLevel",
            EntryPoint::AttachAuxEffect => "attachAuxEffect",
            EntryPoint::WriteShorts | EntryPoint::WriteFloats | EntryPoint::WriteByteBuffer => {
                "write"
            }
        }
    }

    pub fn signature(self) -> &'static str {
        match self {
            EntryPoint::Play
            | EntryPoint::Pause
            | EntryPoint::Stop
            | EntryPoint::Flush
            | EntryPoint::Release => "()V",
            EntryPoint::GetState | EntryPoint::GetPlayState | EntryPoint::GetAudioSessionId => {
                "()I"
            }
            EntryPoint::SetAuxEffectSendLevel => "(F)I",
            EntryPoint::AttachAuxEffect => "(I)I",
            EntryPoint::WriteShorts => "([SII)I",
            EntryPoint::WriteFloats => "([FIII)I",
            EntryPoint::WriteByteBuffer => "(Ljava/nio/ByteBuffer;II)I",
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name(), self.signature())
    }
}

/// Data-submission mechanism negotiated at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WritePath {
    Shorts,
    Floats,
    ByteBuffer,
}

impl WritePath {
    pub fn entry_point(self) -> EntryPoint {
        match self {
            WritePath::Shorts => EntryPoint::WriteShorts,
            WritePath::Floats => EntryPoint::WriteFloats,
            WritePath::ByteBuffer => EntryPoint::WriteByteBuffer,
        }
    }

    /// Whether this path can carry samples of `format`.
    pub fn accepts(self, format: i32) -> bool {
        match self {
            WritePath::ByteBuffer => true,
            WritePath::Shorts => format == encoding::PCM_16BIT,
            WritePath::Floats => format == encoding::PCM_FLOAT,
        }
    }
}

/// Resolved members of one endpoint class. `None` marks a member that is
/// unavailable on this platform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct EntryPoints {
    play: Option<MethodId>,
    pause: Option<MethodId>,
    stop: Option<MethodId>,
    flush: Option<MethodId>,
    release: Option<MethodId>,
    get_state: Option<MethodId>,
    get_play_state: Option<MethodId>,
    get_audio_session_id: Option<MethodId>,
    set_aux_effect_send_level: Option<MethodId>,
    attach_aux_effect: Option<MethodId>,
    write_shorts: Option<MethodId>,
    write_floats: Option<MethodId>,
    write_byte_buffer: Option<MethodId>,
}

impl EntryPoints {
    /// Resolve every member of `class` tolerantly. Never leaves a fault pending.
    pub(crate) fn resolve<R: Runtime + ?Sized>(runtime: &mut R, class: ClassRef) -> Self {
        let mut out = Self::default();
        for entry in EntryPoint::CONTROL.into_iter().chain(EntryPoint::WRITE) {
            *out.slot_mut(entry) = resolve_optional(runtime, class, entry.name(), entry.signature());
        }
        out
    }

    pub(crate) fn get(&self, entry: EntryPoint) -> Option<MethodId> {
        match entry {
            EntryPoint::Play => self.play,
            EntryPoint::Pause => self.pause,
            EntryPoint::Stop => self.stop,
            EntryPoint::Flush => self.flush,
            EntryPoint::Release => self.release,
            EntryPoint::GetState => self.get_state,
            EntryPoint::GetPlayState => self.get_play_state,
            EntryPoint::GetAudioSessionId => self.get_audio_session_id,
            EntryPoint::SetAuxEffectSendLevel => self.set_aux_effect_send_level,
            EntryPoint::AttachAuxEffect => self.attach_aux_effect,
            EntryPoint::WriteShorts => self.write_shorts,
            EntryPoint::WriteFloats => self.write_floats,
            EntryPoint::WriteByteBuffer => self.write_byte_buffer,
        }
    }

    fn slot_mut(&mut self, entry: EntryPoint) -> &mut Option<MethodId> {
        match entry {
            EntryPoint::Play => &mut self.play,
            EntryPoint::Pause => &mut self.pause,
            EntryPoint::Stop => &mut self.stop,
            EntryPoint::Flush => &mut self.flush,
            EntryPoint::Release => &mut self.release,
            EntryPoint::GetState => &mut self.get_state,
            EntryPoint::GetPlayState => &mut self.get_play_state,
            EntryPoint::GetAudioSessionId => &mut self.get_audio_session_id,
            EntryPoint::SetAuxEffectSendLevel => &mut self.set_aux_effect_send_level,
            EntryPoint::AttachAuxEffect => &mut self.attach_aux_effect,
            EntryPoint::WriteShorts => &mut self.write_shorts,
            EntryPoint::WriteFloats => &mut self.write_floats,
            EntryPoint::WriteByteBuffer => &mut self.write_byte_buffer,
        }
    }

    /// First required control member that did not resolve.
    pub(crate) fn missing_control(&self) -> Option<EntryPoint> {
        EntryPoint::CONTROL
            .into_iter()
            .find(|entry| self.get(*entry).is_none())
    }

    /// Write paths that resolved and can carry `format`.
    pub(crate) fn compatible_write_paths(&self, format: i32) -> Vec<WritePath> {
        [WritePath::Shorts, WritePath::Floats, WritePath::ByteBuffer]
            .into_iter()
            .filter(|path| path.accepts(format) && self.get(path.entry_point()).is_some())
            .collect()
    }
}
