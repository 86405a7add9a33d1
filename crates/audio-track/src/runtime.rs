//! Binding layer between the track and the embedding runtime.
//!
//! The track never talks to the platform directly. It resolves and invokes
//! members through a [`Runtime`], which follows the "pending fault" convention:
//! a failing call leaves a fault pending on the runtime instead of returning an
//! error, and the caller must detect and clear it.

use std::fmt;
use std::num::NonZeroU64;

/// Opaque reference owned by a runtime.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(NonZeroU64);

impl Handle {
    /// Build a handle from a raw non-zero value. Zero is the null handle.
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Handle)
    }

    pub fn raw(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:#x})", self.0.get())
    }
}

/// Reference to a type descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClassRef(pub Handle);

/// Reference to a live object instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectRef(pub Handle);

/// Resolved callable member. Stays valid for as long as its class is loaded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MethodId(pub NonZeroU64);

impl MethodId {
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(MethodId)
    }

    pub fn raw(self) -> u64 {
        self.0.get()
    }
}

/// Argument passed across the binding layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value<'a> {
    Int(i32),
    Float(f32),
    Shorts(&'a [i16]),
    Floats(&'a [f32]),
    Bytes(&'a [u8]),
}

/// Object/method binding primitives of the embedding runtime.
///
/// Every method that can fail does so by leaving a fault pending; the return
/// value is then meaningless (`None`, `0`, or nothing). Callers check
/// [`Runtime::fault_pending`] and clear with [`Runtime::clear_fault`].
///
/// References returned by `find_class` and `new_object` are transient (local).
/// They must be promoted with [`Runtime::new_global_ref`] to outlive the
/// current call and released with the matching delete call.
pub trait Runtime {
    /// Look up a type descriptor by its binary name.
    fn find_class(&mut self, name: &str) -> Option<ClassRef>;

    /// Resolve an instance member. Raises a fault when no such member exists.
    fn resolve_method(&mut self, class: ClassRef, name: &str, signature: &str) -> Option<MethodId>;

    /// Instantiate `class` through `constructor`.
    fn new_object(
        &mut self,
        class: ClassRef,
        constructor: MethodId,
        args: &[Value<'_>],
    ) -> Option<ObjectRef>;

    /// Invoke a member returning nothing, bypassing virtual dispatch.
    fn call_void(&mut self, object: ObjectRef, class: ClassRef, method: MethodId, args: &[Value<'_>]);

    /// Invoke a member returning a 32-bit integer, bypassing virtual dispatch.
    fn call_int(
        &mut self,
        object: ObjectRef,
        class: ClassRef,
        method: MethodId,
        args: &[Value<'_>],
    ) -> i32;

    /// Whether a fault raised by an earlier call is still pending.
    fn fault_pending(&self) -> bool;

    /// Discard the pending fault, if any.
    fn clear_fault(&mut self);

    /// Promote a reference to durable ownership.
    fn new_global_ref(&mut self, handle: Handle) -> Option<Handle>;

    fn delete_local_ref(&mut self, handle: Handle);

    fn delete_global_ref(&mut self, handle: Handle);
}

/// Resolve a member, turning "not found" into `None` and leaving no fault behind.
pub fn resolve_optional<R: Runtime + ?Sized>(
    runtime: &mut R,
    class: ClassRef,
    name: &str,
    signature: &str,
) -> Option<MethodId> {
    let method = runtime.resolve_method(class, name, signature);
    if runtime.fault_pending() {
        runtime.clear_fault();
        tracing::debug!(name, signature, "member not available");
        return None;
    }
    method
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRuntime;

    #[test]
    fn null_handle_is_rejected() {
        assert!(Handle::from_raw(0).is_none());
        assert_eq!(Handle::from_raw(7).map(Handle::raw), Some(7));
        assert!(MethodId::from_raw(0).is_none());
    }

    #[test]
    fn resolve_optional_clears_missing_member_fault() {
        let mut rt = MockRuntime::new().without_member("flush", "()V");
        let class = rt.find_class(crate::PLATFORM_CLASS).unwrap();

        assert!(resolve_optional(&mut rt, class, "flush", "()V").is_none());
        assert!(!rt.fault_pending());
        assert!(resolve_optional(&mut rt, class, "play", "()V").is_some());
    }
}
