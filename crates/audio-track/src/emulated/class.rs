//! Member table of the emulated playback class and typed argument decoding.

use std::fmt;

use crate::runtime::{MethodId, Value};

/// Operation behind one member of the emulated class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Op {
    Construct,
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

struct Member {
    name: &'static str,
    signature: &'static str,
    since: u32,
    op: Op,
}

/// Members and the platform API level that introduced them. The method id of a
/// member is its index in this table plus one.
const MEMBERS: [Member; 14] = [
    Member { name: "<init>", signature: "(IIIIII)V", since: 3, op: Op::Construct },
    Member { name: "play", signature: "()V", since: 3, op: Op::Play },
    Member { name: "pause", signature: "()V", since: 3, op: Op::Pause },
    Member { name: "stop", signature: "()V", since: 3, op: Op::Stop },
    Member { name: "flush", signature: "()V", since: 3, op: Op::Flush },
    Member { name: "release", signature: "()V", since: 3, op: Op::Release },
    Member { name: "getState", signature: "()I", since: 3, op: Op::GetState },
    Member { name: "getPlayState", signature: "()I", since: 3, op: Op::GetPlayState },
    Member { name: "getAudioSessionId", signature: "()I", since: 9, op: Op::GetAudioSessionId },
    Member { name: "setAuxEffectSendLevel", signature: "(F)I", since: 9, op: Op::SetAuxEffectSendLevel },
    Member { name: "attachAuxEffect", signature: "(I)I", since: 9, op: Op::AttachAuxEffect },
    Member { name: "write", signature: "([SII)I", since: 3, op: Op::WriteShorts },
    Member { name: "write", signature: "([FIII)I", since: 21, op: Op::WriteFloats },
    Member { name: "write", signature: "(Ljava/nio/ByteBuffer;II)I", since: 21, op: Op::WriteByteBuffer },
];

/// API level from which the constructor accepts `ENCODING_PCM_FLOAT`.
pub(crate) const FLOAT_ENCODING_SINCE: u32 = 21;

/// Method id of `name` + `signature` as exposed at `api_level`.
pub(crate) fn lookup(api_level: u32, name: &str, signature: &str) -> Option<MethodId> {
    let index = MEMBERS
        .iter()
        .position(|m| m.since <= api_level && m.name == name && m.signature == signature)?;
    MethodId::from_raw(index as u64 + 1)
}

/// Operation behind a method id handed out by [`lookup`].
pub(crate) fn op_for(method: MethodId) -> Option<Op> {
    let index = usize::try_from(method.raw().checked_sub(1)?).ok()?;
    MEMBERS.get(index).map(|m| m.op)
}

/// Exception raised by the emulated platform, left pending on the runtime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fault {
    pub class: &'static str,
    pub message: String,
}

impl Fault {
    pub(crate) fn illegal_argument(message: impl Into<String>) -> Self {
        Self { class: "java/lang/IllegalArgumentException", message: message.into() }
    }

    pub(crate) fn illegal_state(message: impl Into<String>) -> Self {
        Self { class: "java/lang/IllegalStateException", message: message.into() }
    }

    pub(crate) fn null_pointer(message: impl Into<String>) -> Self {
        Self { class: "java/lang/NullPointerException", message: message.into() }
    }

    pub(crate) fn no_such_method(message: impl Into<String>) -> Self {
        Self { class: "java/lang/NoSuchMethodError", message: message.into() }
    }

    pub(crate) fn no_class_def(message: impl Into<String>) -> Self {
        Self { class: "java/lang/NoClassDefFoundError", message: message.into() }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class, self.message)
    }
}

/// Constructor arguments `(streamType, sampleRate, channelMask, encoding,
/// bufferSizeInBytes, mode)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ConstructorArgs {
    pub stream_type: i32,
    pub sample_rate: i32,
    pub channel_mask: i32,
    pub encoding: i32,
    pub buffer_size_in_bytes: i32,
    pub mode: i32,
}

impl ConstructorArgs {
    pub(crate) fn decode(args: &[Value<'_>]) -> Result<Self, Fault> {
        if args.len() != 6 {
            return Err(Fault::illegal_argument(format!(
                "constructor takes 6 arguments, got {}",
                args.len()
            )));
        }
        Ok(Self {
            stream_type: int_at(args, 0)?,
            sample_rate: int_at(args, 1)?,
            channel_mask: int_at(args, 2)?,
            encoding: int_at(args, 3)?,
            buffer_size_in_bytes: int_at(args, 4)?,
            mode: int_at(args, 5)?,
        })
    }
}

/// A decoded member invocation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Call<'a> {
    Play,
    Pause,
    Stop,
    Flush,
    Release,
    GetState,
    GetPlayState,
    GetAudioSessionId,
    SetAuxEffectSendLevel(f32),
    AttachAuxEffect(i32),
    WriteShorts { data: &'a [i16], offset: i32, size: i32 },
    WriteFloats { data: &'a [f32], offset: i32, size: i32, write_mode: i32 },
    WriteByteBuffer { data: &'a [u8], size: i32, write_mode: i32 },
}

impl<'a> Call<'a> {
    /// Match `args` against the shape of `op`. The constructor is not a call.
    pub(crate) fn decode(op: Op, args: &[Value<'a>]) -> Result<Self, Fault> {
        let arity = match op {
            Op::Construct => 6,
            Op::SetAuxEffectSendLevel | Op::AttachAuxEffect => 1,
            Op::WriteShorts => 3,
            Op::WriteFloats => 4,
            Op::WriteByteBuffer => 3,
            _ => 0,
        };
        if args.len() != arity {
            return Err(Fault::illegal_argument(format!(
                "{op:?} takes {arity} arguments, got {}",
                args.len()
            )));
        }

        Ok(match op {
            Op::Construct => return Err(Fault::illegal_state("constructor invoked as a member")),
            Op::Play => Call::Play,
            Op::Pause => Call::Pause,
            Op::Stop => Call::Stop,
            Op::Flush => Call::Flush,
            Op::Release => Call::Release,
            Op::GetState => Call::GetState,
            Op::GetPlayState => Call::GetPlayState,
            Op::GetAudioSessionId => Call::GetAudioSessionId,
            Op::SetAuxEffectSendLevel => match args[0] {
                Value::Float(level) => Call::SetAuxEffectSendLevel(level),
                other => return Err(mismatch(0, "float", other)),
            },
            Op::AttachAuxEffect => Call::AttachAuxEffect(int_at(args, 0)?),
            Op::WriteShorts => match args[0] {
                Value::Shorts(data) => Call::WriteShorts {
                    data,
                    offset: int_at(args, 1)?,
                    size: int_at(args, 2)?,
                },
                other => return Err(mismatch(0, "short[]", other)),
            },
            Op::WriteFloats => match args[0] {
                Value::Floats(data) => Call::WriteFloats {
                    data,
                    offset: int_at(args, 1)?,
                    size: int_at(args, 2)?,
                    write_mode: int_at(args, 3)?,
                },
                other => return Err(mismatch(0, "float[]", other)),
            },
            Op::WriteByteBuffer => match args[0] {
                Value::Bytes(data) => Call::WriteByteBuffer {
                    data,
                    size: int_at(args, 1)?,
                    write_mode: int_at(args, 2)?,
                },
                other => return Err(mismatch(0, "ByteBuffer", other)),
            },
        })
    }
}

fn int_at(args: &[Value<'_>], index: usize) -> Result<i32, Fault> {
    match args.get(index) {
        Some(Value::Int(v)) => Ok(*v),
        Some(other) => Err(mismatch(index, "int", *other)),
        None => Err(Fault::illegal_argument(format!("missing argument {index}"))),
    }
}

fn mismatch(index: usize, expected: &str, got: Value<'_>) -> Fault {
    Fault::illegal_argument(format!("argument {index}: expected {expected}, got {got:?}"))
}
