//! Lifecycle-managed playback tracks over a platform object runtime.
//!
//! A [`Track`] drives one platform playback endpoint through the binding
//! primitives of a [`Runtime`]. [`CpalRuntime`] emulates the platform class on
//! a local output device; `MockRuntime` (feature `mock`) scripts it for tests.

pub mod config;
pub mod device;
pub mod emulated;
pub mod entry_points;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod output;
pub mod queue;
pub mod runtime;
pub mod track;

pub use config::{ConfigFile, CpalRuntimeConfig, TrackConfig};
pub use emulated::{CpalRuntime, Fault};
pub use entry_points::{EntryPoint, PLATFORM_CLASS, WritePath};
pub use error::{CreateError, TrackError, TrackResult, status_code, unit_status_code};
pub use runtime::{ClassRef, Handle, MethodId, ObjectRef, Runtime, Value};
pub use track::{Track, TrackParams};
