//! Track error types.

use audio_track_types::status;
use thiserror::Error;

use crate::entry_points::EntryPoint;

/// Failure of a control, write or query call on a track.
///
/// Every variant is reported to platform-style callers as
/// `ERROR_INVALID_OPERATION`; the variants only exist for diagnostics.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackError {
    /// The member was never resolved (uncreated track, missing on this
    /// platform, or incompatible with the negotiated format).
    #[error("{0} is not available on this track")]
    Unavailable(EntryPoint),

    /// A fault was already pending before the call; nothing was invoked.
    #[error("fault already pending before {0}")]
    FaultPending(EntryPoint),

    /// The platform raised a fault during the call. It has been cleared.
    #[error("platform fault during {0}")]
    Faulted(EntryPoint),

    /// An offset or size does not fit the platform's 32-bit integers.
    #[error("argument out of range for {0}")]
    ArgumentRange(EntryPoint),
}

impl TrackError {
    /// Platform status code for this error.
    pub fn status(&self) -> i32 {
        status::ERROR_INVALID_OPERATION
    }

    pub fn entry_point(&self) -> EntryPoint {
        match *self {
            TrackError::Unavailable(e)
            | TrackError::FaultPending(e)
            | TrackError::Faulted(e)
            | TrackError::ArgumentRange(e) => e,
        }
    }
}

/// Result type for track operations
pub type TrackResult<T> = Result<T, TrackError>;

/// Flatten a track result into the platform's integer convention.
pub fn status_code(result: TrackResult<i32>) -> i32 {
    result.unwrap_or_else(|e| e.status())
}

/// Flatten a unit result into `SUCCESS` or the error's status.
pub fn unit_status_code(result: TrackResult<()>) -> i32 {
    match result {
        Ok(()) => status::SUCCESS,
        Err(e) => e.status(),
    }
}

/// Reasons `Track::create` can fail. No state is retained in any case.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CreateError {
    #[error("track is already created")]
    AlreadyCreated,

    #[error("a platform fault is already pending")]
    FaultPending,

    #[error("unsupported sample encoding: {0}")]
    UnsupportedFormat(i32),

    #[error("unsupported channel count: {0} (only mono and stereo)")]
    UnsupportedChannelCount(i32),

    #[error("invalid buffer size: {frames} frames")]
    InvalidBufferSize { frames: i32 },

    #[error("platform class not found: {0}")]
    ClassNotFound(&'static str),

    #[error("platform constructor not found")]
    ConstructorNotFound,

    #[error("platform rejected the endpoint instantiation")]
    Instantiation,

    #[error("required member missing: {0}")]
    MissingEntryPoint(EntryPoint),

    #[error("no write path compatible with encoding {format}")]
    NoCompatibleWritePath { format: i32 },

    #[error("failed to promote endpoint handles to durable ownership")]
    Promotion,
}
