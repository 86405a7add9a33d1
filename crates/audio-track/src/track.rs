//! Lifecycle-managed handle to a platform playback endpoint.
//!
//! A [`Track`] negotiates its capabilities once in [`Track::create`]: it
//! instantiates the endpoint, resolves every member it will ever call, checks
//! that the negotiated sample format has a usable write path, and only then
//! promotes the endpoint handles to durable ownership. After that every
//! operation follows the same pattern:
//!
//! 1. the member must have resolved, otherwise "unavailable";
//! 2. no fault may be pending on the runtime, otherwise nothing is invoked;
//! 3. a fault raised by the call is cleared and reported as an error.
//!
//! No platform fault ever escapes to the caller. The track holds no locks and
//! spawns nothing; every call is as blocking as the platform call it wraps.

use audio_track_types::{
    WriteMode, channel, channel_mask_from_count, encoding, sample_size_from_encoding,
};

use crate::entry_points::{
    CONSTRUCTOR_NAME, CONSTRUCTOR_SIGNATURE, EntryPoint, EntryPoints, PLATFORM_CLASS, WritePath,
};
use crate::error::{CreateError, TrackError, TrackResult};
use crate::runtime::{ClassRef, MethodId, ObjectRef, Runtime, Value, resolve_optional};

/// Raw creation parameters, in platform integer codes.
///
/// Values are passed to the platform unchanged apart from the channel count,
/// which is translated into a channel mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackParams {
    /// Stream type (`AudioManager.STREAM_*`).
    pub stream_type: i32,
    /// Sample rate in Hz.
    pub sample_rate: i32,
    /// 1 (mono) or 2 (stereo).
    pub channel_count: i32,
    /// Sample encoding (`AudioFormat.ENCODING_*`).
    pub format: i32,
    /// Platform buffer size in frames.
    pub buffer_size_in_frames: i32,
    /// Transfer mode (static or stream).
    pub mode: i32,
    /// Requested audio session. The six-argument constructor cannot carry it,
    /// so the platform allocates the session id.
    pub session_id: i32,
}

/// Durable endpoint handles. Class and object are always held together.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Endpoint {
    object: ObjectRef,
    class: ClassRef,
}

/// Playback sink over one platform endpoint instance.
#[derive(Debug)]
pub struct Track {
    endpoint: Option<Endpoint>,
    entry_points: EntryPoints,
    audio_format: i32,
    channel_count: i32,
    buffer_size_in_frames: i32,
    buffer_size_in_bytes: i32,
}

impl Default for Track {
    fn default() -> Self {
        Self::new()
    }
}

impl Track {
    /// An uncreated track.
    pub fn new() -> Self {
        Self {
            endpoint: None,
            entry_points: EntryPoints::default(),
            audio_format: encoding::INVALID,
            channel_count: channel::INVALID,
            buffer_size_in_frames: 0,
            buffer_size_in_bytes: 0,
        }
    }

    /// Instantiate the platform endpoint and negotiate its capabilities.
    ///
    /// Either everything succeeds and the track is created, or nothing is
    /// retained and the track stays uncreated.
    pub fn create<R: Runtime + ?Sized>(
        &mut self,
        runtime: &mut R,
        params: &TrackParams,
    ) -> Result<(), CreateError> {
        if self.endpoint.is_some() {
            return Err(CreateError::AlreadyCreated);
        }

        let bytes_per_sample = sample_size_from_encoding(params.format)
            .ok_or(CreateError::UnsupportedFormat(params.format))?;
        let channel_mask = channel_mask_from_count(params.channel_count)
            .ok_or(CreateError::UnsupportedChannelCount(params.channel_count))?;
        let buffer_size_in_bytes = buffer_size_in_bytes(
            params.buffer_size_in_frames,
            params.channel_count,
            bytes_per_sample,
        )
        .ok_or(CreateError::InvalidBufferSize {
            frames: params.buffer_size_in_frames,
        })?;

        if runtime.fault_pending() {
            return Err(CreateError::FaultPending);
        }

        tracing::debug!(
            stream_type = params.stream_type,
            sample_rate = params.sample_rate,
            channel_mask,
            format = params.format,
            buffer_size_in_bytes,
            mode = params.mode,
            session_id = params.session_id,
            "creating track"
        );

        let class = runtime.find_class(PLATFORM_CLASS);
        if runtime.fault_pending() {
            runtime.clear_fault();
        }
        let class = class.ok_or(CreateError::ClassNotFound(PLATFORM_CLASS))?;

        let ctor_args = [
            Value::Int(params.stream_type),
            Value::Int(params.sample_rate),
            Value::Int(channel_mask),
            Value::Int(params.format),
            Value::Int(buffer_size_in_bytes),
            Value::Int(params.mode),
        ];
        let negotiated = instantiate(runtime, class, &ctor_args).and_then(|object| {
            let promoted = negotiate(runtime, class, object, params.format);
            runtime.delete_local_ref(object.0);
            promoted
        });
        runtime.delete_local_ref(class.0);

        let (endpoint, entry_points) = match negotiated {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "track creation failed");
                return Err(e);
            }
        };

        self.endpoint = Some(endpoint);
        self.entry_points = entry_points;
        self.audio_format = params.format;
        self.channel_count = params.channel_count;
        self.buffer_size_in_frames = params.buffer_size_in_frames;
        self.buffer_size_in_bytes = buffer_size_in_bytes;

        tracing::info!(
            format = self.audio_format,
            channels = self.channel_count,
            frames = self.buffer_size_in_frames,
            bytes = self.buffer_size_in_bytes,
            write_paths = ?entry_points.compatible_write_paths(params.format),
            "track created"
        );
        Ok(())
    }

    /// Release the platform endpoint and reset every field.
    ///
    /// Safe on an uncreated or already released track.
    pub fn release<R: Runtime + ?Sized>(&mut self, runtime: &mut R) {
        if self.entry_points.get(EntryPoint::Release).is_some() {
            if let Err(e) = self.control(runtime, EntryPoint::Release) {
                tracing::warn!(error = %e, "endpoint release failed");
            }
        }

        if let Some(endpoint) = self.endpoint.take() {
            runtime.delete_global_ref(endpoint.object.0);
            runtime.delete_global_ref(endpoint.class.0);
            tracing::info!("track released");
        }

        *self = Self::new();
    }

    pub fn play<R: Runtime + ?Sized>(&mut self, runtime: &mut R) -> TrackResult<()> {
        self.control(runtime, EntryPoint::Play)
    }

    pub fn pause<R: Runtime + ?Sized>(&mut self, runtime: &mut R) -> TrackResult<()> {
        self.control(runtime, EntryPoint::Pause)
    }

    pub fn stop<R: Runtime + ?Sized>(&mut self, runtime: &mut R) -> TrackResult<()> {
        self.control(runtime, EntryPoint::Stop)
    }

    /// Discard data queued but not yet played.
    pub fn flush<R: Runtime + ?Sized>(&mut self, runtime: &mut R) -> TrackResult<()> {
        self.control(runtime, EntryPoint::Flush)
    }

    /// Write 16-bit samples `data[offset..offset + size]`.
    ///
    /// Returns the platform result verbatim: samples written, or a negative
    /// platform error code.
    pub fn write_shorts<R: Runtime + ?Sized>(
        &mut self,
        runtime: &mut R,
        data: &[i16],
        offset: usize,
        size: usize,
    ) -> TrackResult<i32> {
        let entry = EntryPoint::WriteShorts;
        self.ensure_available(entry)?;
        let args = [
            Value::Shorts(data),
            Value::Int(to_platform_int(offset, entry)?),
            Value::Int(to_platform_int(size, entry)?),
        ];
        self.query(runtime, entry, &args)
    }

    /// Write float samples `data[offset..offset + size]`.
    pub fn write_floats<R: Runtime + ?Sized>(
        &mut self,
        runtime: &mut R,
        data: &[f32],
        offset: usize,
        size: usize,
        mode: WriteMode,
    ) -> TrackResult<i32> {
        let entry = EntryPoint::WriteFloats;
        self.ensure_available(entry)?;
        let args = [
            Value::Floats(data),
            Value::Int(to_platform_int(offset, entry)?),
            Value::Int(to_platform_int(size, entry)?),
            Value::Int(mode.code()),
        ];
        self.query(runtime, entry, &args)
    }

    /// Write the first `size_in_bytes` bytes of `data`, encoded in the
    /// negotiated format (little-endian).
    pub fn write_byte_buffer<R: Runtime + ?Sized>(
        &mut self,
        runtime: &mut R,
        data: &[u8],
        size_in_bytes: usize,
        mode: WriteMode,
    ) -> TrackResult<i32> {
        let entry = EntryPoint::WriteByteBuffer;
        self.ensure_available(entry)?;
        let args = [
            Value::Bytes(data),
            Value::Int(to_platform_int(size_in_bytes, entry)?),
            Value::Int(mode.code()),
        ];
        self.query(runtime, entry, &args)
    }

    /// Platform state code (`STATE_*`).
    pub fn state<R: Runtime + ?Sized>(&mut self, runtime: &mut R) -> TrackResult<i32> {
        self.query(runtime, EntryPoint::GetState, &[])
    }

    /// Platform play state code (`PLAYSTATE_*`).
    pub fn play_state<R: Runtime + ?Sized>(&mut self, runtime: &mut R) -> TrackResult<i32> {
        self.query(runtime, EntryPoint::GetPlayState, &[])
    }

    /// Audio session id, or `0` ("no session") when it cannot be queried.
    pub fn audio_session_id<R: Runtime + ?Sized>(&mut self, runtime: &mut R) -> i32 {
        self.query(runtime, EntryPoint::GetAudioSessionId, &[])
            .unwrap_or(audio_track_types::AUDIO_SESSION_ID_NONE)
    }

    pub fn set_aux_effect_send_level<R: Runtime + ?Sized>(
        &mut self,
        runtime: &mut R,
        level: f32,
    ) -> TrackResult<i32> {
        self.query(runtime, EntryPoint::SetAuxEffectSendLevel, &[Value::Float(level)])
    }

    pub fn attach_aux_effect<R: Runtime + ?Sized>(
        &mut self,
        runtime: &mut R,
        effect_id: i32,
    ) -> TrackResult<i32> {
        self.query(runtime, EntryPoint::AttachAuxEffect, &[Value::Int(effect_id)])
    }

    pub fn is_created(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Negotiated encoding, or `ENCODING_INVALID` when uncreated.
    pub fn audio_format(&self) -> i32 {
        self.audio_format
    }

    pub fn buffer_size_in_frames(&self) -> i32 {
        self.buffer_size_in_frames
    }

    pub fn buffer_size_in_bytes(&self) -> i32 {
        self.buffer_size_in_bytes
    }

    /// Negotiated channel count, or `CHANNEL_INVALID` when uncreated.
    pub fn channel_count(&self) -> i32 {
        self.channel_count
    }

    pub fn supports_byte_buffer_path(&self) -> bool {
        self.entry_points.get(EntryPoint::WriteByteBuffer).is_some()
    }

    /// Whether `path` resolved on this endpoint and carries the negotiated format.
    pub fn supports_write_path(&self, path: WritePath) -> bool {
        self.endpoint.is_some()
            && path.accepts(self.audio_format)
            && self.entry_points.get(path.entry_point()).is_some()
    }

    fn ensure_available(&self, entry: EntryPoint) -> TrackResult<MethodId> {
        match (self.endpoint, self.entry_points.get(entry)) {
            (Some(_), Some(method)) => Ok(method),
            _ => Err(TrackError::Unavailable(entry)),
        }
    }

    /// Check, invoke, then detect and clear any raised fault.
    fn guarded<R, T, F>(&self, runtime: &mut R, entry: EntryPoint, call: F) -> TrackResult<T>
    where
        R: Runtime + ?Sized,
        F: FnOnce(&mut R, ObjectRef, ClassRef, MethodId) -> T,
    {
        let method = self.ensure_available(entry)?;
        let Some(endpoint) = self.endpoint else {
            return Err(TrackError::Unavailable(entry));
        };
        if runtime.fault_pending() {
            return Err(TrackError::FaultPending(entry));
        }

        let out = call(runtime, endpoint.object, endpoint.class, method);

        if runtime.fault_pending() {
            runtime.clear_fault();
            tracing::warn!(entry = %entry, "platform fault cleared");
            return Err(TrackError::Faulted(entry));
        }
        Ok(out)
    }

    fn control<R: Runtime + ?Sized>(&self, runtime: &mut R, entry: EntryPoint) -> TrackResult<()> {
        self.guarded(runtime, entry, |rt, object, class, method| {
            rt.call_void(object, class, method, &[])
        })
    }

    fn query<R: Runtime + ?Sized>(
        &self,
        runtime: &mut R,
        entry: EntryPoint,
        args: &[Value<'_>],
    ) -> TrackResult<i32> {
        self.guarded(runtime, entry, |rt, object, class, method| {
            rt.call_int(object, class, method, args)
        })
    }
}

impl Drop for Track {
    fn drop(&mut self) {
        if self.endpoint.is_some() {
            tracing::warn!("track dropped without release; endpoint handles leaked");
        }
    }
}

/// `frames × channels × bytes_per_sample`, if positive and within `i32`.
fn buffer_size_in_bytes(frames: i32, channels: i32, bytes_per_sample: usize) -> Option<i32> {
    if frames <= 0 {
        return None;
    }
    let bytes_per_sample = i32::try_from(bytes_per_sample).ok()?;
    frames.checked_mul(channels)?.checked_mul(bytes_per_sample)
}

fn to_platform_int(value: usize, entry: EntryPoint) -> TrackResult<i32> {
    i32::try_from(value).map_err(|_| TrackError::ArgumentRange(entry))
}

fn instantiate<R: Runtime + ?Sized>(
    runtime: &mut R,
    class: ClassRef,
    args: &[Value<'_>],
) -> Result<ObjectRef, CreateError> {
    let constructor = resolve_optional(runtime, class, CONSTRUCTOR_NAME, CONSTRUCTOR_SIGNATURE)
        .ok_or(CreateError::ConstructorNotFound)?;

    let object = runtime.new_object(class, constructor, args);
    if runtime.fault_pending() {
        runtime.clear_fault();
        if let Some(object) = object {
            runtime.delete_local_ref(object.0);
        }
        return Err(CreateError::Instantiation);
    }
    object.ok_or(CreateError::Instantiation)
}

/// Resolve and validate the member set, then promote the handles.
fn negotiate<R: Runtime + ?Sized>(
    runtime: &mut R,
    class: ClassRef,
    object: ObjectRef,
    format: i32,
) -> Result<(Endpoint, EntryPoints), CreateError> {
    let entry_points = EntryPoints::resolve(runtime, class);

    if let Some(missing) = entry_points.missing_control() {
        return Err(CreateError::MissingEntryPoint(missing));
    }
    if entry_points.compatible_write_paths(format).is_empty() {
        return Err(CreateError::NoCompatibleWritePath { format });
    }

    let class_global = runtime.new_global_ref(class.0);
    let object_global = runtime.new_global_ref(object.0);
    match (class_global, object_global) {
        (Some(class), Some(object)) if !runtime.fault_pending() => Ok((
            Endpoint {
                object: ObjectRef(object),
                class: ClassRef(class),
            },
            entry_points,
        )),
        (class, object) => {
            if runtime.fault_pending() {
                runtime.clear_fault();
            }
            for handle in [class, object].into_iter().flatten() {
                runtime.delete_global_ref(handle);
            }
            Err(CreateError::Promotion)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRuntime;
    use audio_track_types::{StreamType, TrackMode, play_state, state, status};

    fn params(format: i32, channels: i32, frames: i32) -> TrackParams {
        TrackParams {
            stream_type: StreamType::Music.code(),
            sample_rate: 44_100,
            channel_count: channels,
            format,
            buffer_size_in_frames: frames,
            mode: TrackMode::Stream.code(),
            session_id: 0,
        }
    }

    fn created(rt: &mut MockRuntime, format: i32) -> Track {
        let mut track = Track::new();
        track.create(rt, &params(format, 2, 1024)).unwrap();
        track
    }

    fn assert_defaults(track: &Track) {
        assert!(!track.is_created());
        assert_eq!(track.audio_format(), encoding::INVALID);
        assert_eq!(track.channel_count(), channel::INVALID);
        assert_eq!(track.buffer_size_in_frames(), 0);
        assert_eq!(track.buffer_size_in_bytes(), 0);
        assert!(!track.supports_byte_buffer_path());
        assert_eq!(track.entry_points, EntryPoints::default());
    }

    #[test]
    fn accessors_report_negotiated_geometry() {
        for format in [encoding::PCM_8BIT, encoding::PCM_16BIT, encoding::PCM_FLOAT] {
            for channels in [1, 2] {
                let mut rt = MockRuntime::new();
                let mut track = Track::new();
                track.create(&mut rt, &params(format, channels, 256)).unwrap();

                let bytes = sample_size_from_encoding(format).unwrap() as i32;
                assert_eq!(track.audio_format(), format);
                assert_eq!(track.channel_count(), channels);
                assert_eq!(track.buffer_size_in_frames(), 256);
                assert_eq!(track.buffer_size_in_bytes(), 256 * channels * bytes);
                track.release(&mut rt);
            }
        }
    }

    #[test]
    fn music_stereo_pcm16_scenario() {
        let mut rt = MockRuntime::new();
        let mut track = Track::new();
        track.create(&mut rt, &params(encoding::PCM_16BIT, 2, 1024)).unwrap();
        assert_eq!(track.buffer_size_in_bytes(), 4096);

        let ctor = &rt.constructor_calls()[0];
        assert_eq!(ctor, &vec![3, 44_100, channel::OUT_STEREO, encoding::PCM_16BIT, 4096, 1]);

        let buf = vec![0i16; 1024];
        assert_eq!(track.write_shorts(&mut rt, &buf, 0, 512), Ok(512));
        track.release(&mut rt);
    }

    #[test]
    fn mono_uses_mono_mask() {
        let mut rt = MockRuntime::new();
        let mut track = Track::new();
        track.create(&mut rt, &params(encoding::PCM_16BIT, 1, 100)).unwrap();
        assert_eq!(rt.constructor_calls()[0][2], channel::OUT_MONO);
        track.release(&mut rt);
    }

    #[test]
    fn create_twice_is_rejected_without_side_effects() {
        let mut rt = MockRuntime::new();
        let mut track = created(&mut rt, encoding::PCM_16BIT);
        let globals = rt.live_global_refs();

        let err = track
            .create(&mut rt, &params(encoding::PCM_FLOAT, 1, 64))
            .unwrap_err();
        assert_eq!(err, CreateError::AlreadyCreated);
        assert_eq!(rt.constructor_calls().len(), 1);
        assert_eq!(rt.live_global_refs(), globals);
        assert_eq!(track.audio_format(), encoding::PCM_16BIT);
        assert_eq!(track.channel_count(), 2);
        assert_eq!(track.buffer_size_in_bytes(), 4096);
        track.release(&mut rt);
    }

    #[test]
    fn unsupported_format_fails_before_instantiation() {
        let mut rt = MockRuntime::new();
        let mut track = Track::new();
        let err = track.create(&mut rt, &params(encoding::DEFAULT, 2, 1024)).unwrap_err();
        assert_eq!(err, CreateError::UnsupportedFormat(encoding::DEFAULT));
        assert!(rt.constructor_calls().is_empty());
        assert!(rt.calls().is_empty());
        assert_defaults(&track);
    }

    #[test]
    fn unsupported_channel_count_is_rejected() {
        let mut rt = MockRuntime::new();
        let mut track = Track::new();
        let err = track.create(&mut rt, &params(encoding::PCM_16BIT, 6, 1024)).unwrap_err();
        assert_eq!(err, CreateError::UnsupportedChannelCount(6));
        assert!(rt.constructor_calls().is_empty());
        assert_defaults(&track);
    }

    #[test]
    fn invalid_buffer_sizes_are_rejected() {
        let mut rt = MockRuntime::new();
        let mut track = Track::new();
        for frames in [0, -1, i32::MAX] {
            let err = track.create(&mut rt, &params(encoding::PCM_FLOAT, 2, frames)).unwrap_err();
            assert_eq!(err, CreateError::InvalidBufferSize { frames });
        }
        assert!(rt.constructor_calls().is_empty());
    }

    #[test]
    fn missing_required_control_member_fails_whole_create() {
        let mut rt = MockRuntime::new().without_member("stop", "()V");
        let mut track = Track::new();
        let err = track.create(&mut rt, &params(encoding::PCM_16BIT, 2, 1024)).unwrap_err();

        assert_eq!(err, CreateError::MissingEntryPoint(EntryPoint::Stop));
        assert_defaults(&track);
        assert_eq!(rt.live_local_refs(), 0);
        assert_eq!(rt.live_global_refs(), 0);
        assert!(!rt.fault_pending());
        assert_eq!(track.play(&mut rt), Err(TrackError::Unavailable(EntryPoint::Play)));
    }

    #[test]
    fn float_format_needs_float_or_buffer_path() {
        let mut rt = MockRuntime::new()
            .without_member("write", EntryPoint::WriteFloats.signature())
            .without_member("write", EntryPoint::WriteByteBuffer.signature());
        let mut track = Track::new();
        let err = track.create(&mut rt, &params(encoding::PCM_FLOAT, 2, 1024)).unwrap_err();
        assert_eq!(
            err,
            CreateError::NoCompatibleWritePath {
                format: encoding::PCM_FLOAT
            }
        );
        assert_eq!(rt.live_local_refs(), 0);
        assert_defaults(&track);
    }

    #[test]
    fn pcm16_with_only_short_path() {
        let mut rt = MockRuntime::new()
            .without_member("write", EntryPoint::WriteFloats.signature())
            .without_member("write", EntryPoint::WriteByteBuffer.signature());
        let mut track = created(&mut rt, encoding::PCM_16BIT);

        assert!(!track.supports_byte_buffer_path());
        assert!(track.supports_write_path(WritePath::Shorts));
        let floats = [0.0f32; 64];
        for mode in [WriteMode::Blocking, WriteMode::NonBlocking] {
            assert_eq!(
                track.write_floats(&mut rt, &floats, 0, 64, mode),
                Err(TrackError::Unavailable(EntryPoint::WriteFloats))
            );
        }
        assert_eq!(
            track.write_byte_buffer(&mut rt, &[0u8; 8], 8, WriteMode::Blocking),
            Err(TrackError::Unavailable(EntryPoint::WriteByteBuffer))
        );
        assert_eq!(rt.calls_to(EntryPoint::WriteFloats), 0);
        track.release(&mut rt);
    }

    #[test]
    fn resolved_but_incompatible_path_is_not_reported_as_supported() {
        let mut rt = MockRuntime::new();
        let mut track = created(&mut rt, encoding::PCM_8BIT);
        assert!(track.supports_write_path(WritePath::ByteBuffer));
        assert!(!track.supports_write_path(WritePath::Shorts));
        assert!(!track.supports_write_path(WritePath::Floats));
        track.release(&mut rt);
    }

    #[test]
    fn constructor_fault_is_cleared_and_reported() {
        let mut rt = MockRuntime::new().fail_constructor();
        let mut track = Track::new();
        let err = track.create(&mut rt, &params(encoding::PCM_16BIT, 2, 1024)).unwrap_err();
        assert_eq!(err, CreateError::Instantiation);
        assert!(!rt.fault_pending());
        assert_eq!(rt.live_local_refs(), 0);
        assert_defaults(&track);
    }

    #[test]
    fn null_object_without_fault_fails_create() {
        let mut rt = MockRuntime::new().null_constructor();
        let mut track = Track::new();
        let err = track.create(&mut rt, &params(encoding::PCM_16BIT, 2, 1024)).unwrap_err();
        assert_eq!(err, CreateError::Instantiation);
        assert_eq!(rt.live_local_refs(), 0);
    }

    #[test]
    fn missing_class_fails_create() {
        let mut rt = MockRuntime::new().without_class();
        let mut track = Track::new();
        let err = track.create(&mut rt, &params(encoding::PCM_16BIT, 2, 1024)).unwrap_err();
        assert_eq!(err, CreateError::ClassNotFound(PLATFORM_CLASS));
        assert!(!rt.fault_pending());
    }

    #[test]
    fn failed_promotion_discards_everything() {
        let mut rt = MockRuntime::new().fail_global_refs();
        let mut track = Track::new();
        let err = track.create(&mut rt, &params(encoding::PCM_16BIT, 2, 1024)).unwrap_err();
        assert_eq!(err, CreateError::Promotion);
        assert!(!rt.fault_pending());
        assert_eq!(rt.live_local_refs(), 0);
        assert_eq!(rt.live_global_refs(), 0);
        assert_defaults(&track);
    }

    #[test]
    fn create_holds_only_durable_handles() {
        let mut rt = MockRuntime::new();
        let mut track = created(&mut rt, encoding::PCM_16BIT);
        assert_eq!(rt.live_local_refs(), 0);
        assert_eq!(rt.live_global_refs(), 2);
        track.release(&mut rt);
        assert_eq!(rt.live_global_refs(), 0);
    }

    #[test]
    fn operations_on_uncreated_track_never_reach_platform() {
        let mut rt = MockRuntime::new();
        let mut track = Track::new();

        assert_eq!(track.play(&mut rt), Err(TrackError::Unavailable(EntryPoint::Play)));
        assert_eq!(track.pause(&mut rt), Err(TrackError::Unavailable(EntryPoint::Pause)));
        assert_eq!(track.stop(&mut rt), Err(TrackError::Unavailable(EntryPoint::Stop)));
        assert_eq!(track.flush(&mut rt), Err(TrackError::Unavailable(EntryPoint::Flush)));
        assert!(track.write_shorts(&mut rt, &[0; 4], 0, 4).is_err());
        assert!(track.write_floats(&mut rt, &[0.0; 4], 0, 4, WriteMode::Blocking).is_err());
        assert!(
            track
                .write_byte_buffer(&mut rt, &[0; 4], 4, WriteMode::Blocking)
                .is_err()
        );
        assert!(track.state(&mut rt).is_err());
        assert!(track.play_state(&mut rt).is_err());
        assert!(track.set_aux_effect_send_level(&mut rt, 0.5).is_err());
        assert!(track.attach_aux_effect(&mut rt, 1).is_err());
        assert_eq!(track.audio_session_id(&mut rt), 0);
        assert!(rt.calls().is_empty());
    }

    #[test]
    fn operations_on_released_track_never_reach_platform() {
        let mut rt = MockRuntime::new();
        let mut track = created(&mut rt, encoding::PCM_FLOAT);
        track.release(&mut rt);
        let before = rt.calls().len();

        assert!(track.play(&mut rt).is_err());
        assert!(track.write_floats(&mut rt, &[0.0; 4], 0, 4, WriteMode::Blocking).is_err());
        assert_eq!(track.audio_session_id(&mut rt), 0);
        assert_eq!(rt.calls().len(), before);
    }

    #[test]
    fn release_twice_invokes_platform_once() {
        let mut rt = MockRuntime::new();
        let mut track = created(&mut rt, encoding::PCM_16BIT);

        track.release(&mut rt);
        track.release(&mut rt);

        assert_eq!(rt.calls_to(EntryPoint::Release), 1);
        assert_defaults(&track);
        assert_eq!(rt.live_global_refs(), 0);
    }

    #[test]
    fn release_on_uncreated_track_is_noop() {
        let mut rt = MockRuntime::new();
        let mut track = Track::new();
        track.release(&mut rt);
        assert!(rt.calls().is_empty());
        assert_defaults(&track);
    }

    #[test]
    fn release_clears_fault_raised_by_endpoint() {
        let mut rt = MockRuntime::new().fault_on(EntryPoint::Release);
        let mut track = created(&mut rt, encoding::PCM_16BIT);
        track.release(&mut rt);
        assert!(!rt.fault_pending());
        assert_eq!(rt.live_global_refs(), 0);
        assert_defaults(&track);
    }

    #[test]
    fn track_can_be_created_again_after_release() {
        let mut rt = MockRuntime::new();
        let mut track = created(&mut rt, encoding::PCM_16BIT);
        track.release(&mut rt);
        track.create(&mut rt, &params(encoding::PCM_FLOAT, 1, 128)).unwrap();
        assert_eq!(track.audio_format(), encoding::PCM_FLOAT);
        assert_eq!(track.buffer_size_in_bytes(), 512);
        assert_eq!(rt.constructor_calls().len(), 2);
        track.release(&mut rt);
    }

    #[test]
    fn control_operations_drive_play_state() {
        let mut rt = MockRuntime::new();
        let mut track = created(&mut rt, encoding::PCM_16BIT);

        assert_eq!(track.state(&mut rt), Ok(state::INITIALIZED));
        assert_eq!(track.play_state(&mut rt), Ok(play_state::STOPPED));
        track.play(&mut rt).unwrap();
        assert_eq!(track.play_state(&mut rt), Ok(play_state::PLAYING));
        track.pause(&mut rt).unwrap();
        assert_eq!(track.play_state(&mut rt), Ok(play_state::PAUSED));
        track.stop(&mut rt).unwrap();
        track.flush(&mut rt).unwrap();
        assert_eq!(track.play_state(&mut rt), Ok(play_state::STOPPED));
        track.release(&mut rt);
    }

    #[test]
    fn invocation_fault_is_cleared_and_mapped() {
        let mut rt = MockRuntime::new().fault_on(EntryPoint::Play);
        let mut track = created(&mut rt, encoding::PCM_16BIT);

        let err = track.play(&mut rt).unwrap_err();
        assert_eq!(err, TrackError::Faulted(EntryPoint::Play));
        assert_eq!(err.status(), status::ERROR_INVALID_OPERATION);
        assert!(!rt.fault_pending());
        assert_eq!(track.pause(&mut rt), Ok(()));
        track.release(&mut rt);
    }

    #[test]
    fn pending_fault_blocks_invocation() {
        let mut rt = MockRuntime::new();
        let mut track = created(&mut rt, encoding::PCM_16BIT);
        let before = rt.calls().len();

        rt.raise_fault("pending from caller");
        assert_eq!(track.play(&mut rt), Err(TrackError::FaultPending(EntryPoint::Play)));
        assert_eq!(
            track.write_shorts(&mut rt, &[0; 8], 0, 8),
            Err(TrackError::FaultPending(EntryPoint::WriteShorts))
        );
        assert_eq!(track.audio_session_id(&mut rt), 0);
        assert_eq!(rt.calls().len(), before);
        assert!(rt.fault_pending());

        rt.clear_fault();
        track.release(&mut rt);
    }

    #[test]
    fn write_passes_negative_platform_codes_through() {
        let mut rt = MockRuntime::new()
            .with_result(EntryPoint::WriteShorts, status::ERROR_BAD_VALUE)
            .with_result(EntryPoint::WriteByteBuffer, status::ERROR_DEAD_OBJECT);
        let mut track = created(&mut rt, encoding::PCM_16BIT);

        assert_eq!(
            track.write_shorts(&mut rt, &[0; 4], 2, 8),
            Ok(status::ERROR_BAD_VALUE)
        );
        assert_eq!(
            track.write_byte_buffer(&mut rt, &[0; 16], 16, WriteMode::NonBlocking),
            Ok(status::ERROR_DEAD_OBJECT)
        );
        track.release(&mut rt);
    }

    #[test]
    fn write_arguments_reach_platform() {
        let mut rt = MockRuntime::new();
        let mut track = created(&mut rt, encoding::PCM_FLOAT);
        let data = [0.25f32; 32];

        assert_eq!(
            track.write_floats(&mut rt, &data, 4, 16, WriteMode::NonBlocking),
            Ok(16)
        );
        let call = rt.calls().last().unwrap();
        assert_eq!(call.entry, Some(EntryPoint::WriteFloats));
        assert_eq!(call.ints, vec![4, 16, WriteMode::NonBlocking.code()]);
        assert_eq!(call.buffer_len, Some(32));

        assert_eq!(
            track.write_byte_buffer(&mut rt, &[0u8; 64], 48, WriteMode::Blocking),
            Ok(48)
        );
        track.release(&mut rt);
    }

    #[test]
    fn oversized_write_arguments_are_rejected_locally() {
        let mut rt = MockRuntime::new();
        let mut track = created(&mut rt, encoding::PCM_16BIT);
        let before = rt.calls().len();
        assert_eq!(
            track.write_shorts(&mut rt, &[0; 4], usize::MAX, 4),
            Err(TrackError::ArgumentRange(EntryPoint::WriteShorts))
        );
        assert_eq!(rt.calls().len(), before);
        track.release(&mut rt);
    }

    #[test]
    fn session_id_falls_back_to_zero_on_fault() {
        let mut rt = MockRuntime::new();
        let mut track = created(&mut rt, encoding::PCM_16BIT);
        assert_eq!(track.audio_session_id(&mut rt), MockRuntime::SESSION_ID);
        track.release(&mut rt);

        let mut rt = MockRuntime::new().fault_on(EntryPoint::GetAudioSessionId);
        let mut track = created(&mut rt, encoding::PCM_16BIT);
        assert_eq!(track.audio_session_id(&mut rt), 0);
        assert!(!rt.fault_pending());
        track.release(&mut rt);
    }

    #[test]
    fn aux_effect_arguments_pass_through() {
        let mut rt = MockRuntime::new().with_result(EntryPoint::AttachAuxEffect, status::ERROR);
        let mut track = created(&mut rt, encoding::PCM_16BIT);

        assert_eq!(track.set_aux_effect_send_level(&mut rt, 0.75), Ok(status::SUCCESS));
        let call = rt.calls().last().unwrap();
        assert_eq!(call.floats, vec![0.75]);

        assert_eq!(track.attach_aux_effect(&mut rt, 9), Ok(status::ERROR));
        assert_eq!(rt.calls().last().unwrap().ints, vec![9]);
        track.release(&mut rt);
    }

    #[test]
    fn buffer_size_overflow_is_detected() {
        assert_eq!(buffer_size_in_bytes(1024, 2, 2), Some(4096));
        assert_eq!(buffer_size_in_bytes(i32::MAX / 2, 2, 4), None);
        assert_eq!(buffer_size_in_bytes(0, 2, 2), None);
    }

    #[test]
    fn write_faults_are_cleared_and_mapped() {
        let mut rt = MockRuntime::new()
            .fault_on(EntryPoint::WriteShorts)
            .fault_on(EntryPoint::WriteByteBuffer);
        let mut track = created(&mut rt, encoding::PCM_16BIT);

        let err = track.write_shorts(&mut rt, &[0; 8], 0, 8).unwrap_err();
        assert_eq!(err, TrackError::Faulted(EntryPoint::WriteShorts));
        assert_eq!(err.status(), status::ERROR_INVALID_OPERATION);
        assert!(!rt.fault_pending());

        let err = track
            .write_byte_buffer(&mut rt, &[0; 16], 16, WriteMode::Blocking)
            .unwrap_err();
        assert_eq!(err, TrackError::Faulted(EntryPoint::WriteByteBuffer));
        assert!(!rt.fault_pending());
        track.release(&mut rt);

        let mut rt = MockRuntime::new().fault_on(EntryPoint::WriteFloats);
        let mut track = created(&mut rt, encoding::PCM_FLOAT);
        let err = track
            .write_floats(&mut rt, &[0.0; 8], 0, 8, WriteMode::NonBlocking)
            .unwrap_err();
        assert_eq!(err, TrackError::Faulted(EntryPoint::WriteFloats));
        assert!(!rt.fault_pending());
        track.release(&mut rt);
    }

    #[test]
    fn query_faults_are_cleared_and_mapped() {
        for entry in [
            EntryPoint::GetState,
            EntryPoint::GetPlayState,
            EntryPoint::AttachAuxEffect,
        ] {
            let mut rt = MockRuntime::new().fault_on(entry);
            let mut track = created(&mut rt, encoding::PCM_16BIT);
            let result = match entry {
                EntryPoint::GetState => track.state(&mut rt),
                EntryPoint::GetPlayState => track.play_state(&mut rt),
                _ => track.attach_aux_effect(&mut rt, 0),
            };
            assert_eq!(result, Err(TrackError::Faulted(entry)));
            assert!(!rt.fault_pending());
            track.release(&mut rt);
        }
    }

    #[test]
    fn release_with_pending_fault_still_drops_references() {
        let mut rt = MockRuntime::new();
        let mut track = created(&mut rt, encoding::PCM_16BIT);
        rt.raise_fault("java/lang/IllegalStateException");

        track.release(&mut rt);
        assert_eq!(rt.calls_to(EntryPoint::Release), 0);
        assert_eq!(rt.live_global_refs(), 0);
        assert!(rt.fault_pending());
        assert_defaults(&track);
    }
}
