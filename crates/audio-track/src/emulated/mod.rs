//! Emulated platform runtime backed by a CPAL output device.
//!
//! [`CpalRuntime`] implements [`Runtime`] by hosting an in-process version of
//! the platform playback class: a reference table with local and durable
//! handles, a member table gated by API level, and one endpoint state machine
//! per constructed instance. Failures follow the platform convention and leave
//! a [`Fault`] pending instead of returning errors.
//!
//! Instances are collected once no reference to them remains.

mod class;
mod endpoint;

use std::collections::HashMap;

use anyhow::Result;
use cpal::traits::DeviceTrait;

pub use class::Fault;

use crate::config::CpalRuntimeConfig;
use crate::device;
use crate::entry_points::PLATFORM_CLASS;
use crate::runtime::{ClassRef, Handle, MethodId, ObjectRef, Runtime, Value};
use class::{Call, ConstructorArgs, Op};
use endpoint::Endpoint;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Target {
    Class,
    Endpoint(u64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RefKind {
    Local,
    Global,
}

#[derive(Clone, Copy, Debug)]
struct Reference {
    target: Target,
    kind: RefKind,
}

/// Platform runtime emulated on top of a CPAL output device.
pub struct CpalRuntime {
    device: Option<cpal::Device>,
    config: CpalRuntimeConfig,
    refs: HashMap<u64, Reference>,
    next_handle: u64,
    endpoints: HashMap<u64, Endpoint>,
    next_endpoint: u64,
    next_session: i32,
    pending: Option<Fault>,
}

impl CpalRuntime {
    /// Runtime playing through the output device matching `needle`, or the
    /// host's default output device.
    pub fn open(needle: Option<&str>, config: CpalRuntimeConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = device::pick_device(&host, needle)?;
        Ok(Self::with_device(device, config))
    }

    pub fn with_device(device: cpal::Device, config: CpalRuntimeConfig) -> Self {
        let name = device
            .description()
            .map(|d| d.to_string())
            .unwrap_or_else(|_| "<unknown>".to_string());
        tracing::info!(device = %name, api_level = config.api_level, "emulated runtime ready");
        Self::build(Some(device), config)
    }

    /// Runtime without an output device. Playing endpoints discard what is
    /// written to them.
    pub fn headless(config: CpalRuntimeConfig) -> Self {
        tracing::info!(api_level = config.api_level, "headless emulated runtime ready");
        Self::build(None, config)
    }

    fn build(device: Option<cpal::Device>, config: CpalRuntimeConfig) -> Self {
        Self {
            device,
            config,
            refs: HashMap::new(),
            next_handle: 1,
            endpoints: HashMap::new(),
            next_endpoint: 1,
            next_session: 1,
            pending: None,
        }
    }

    pub fn api_level(&self) -> u32 {
        self.config.api_level
    }

    pub fn is_headless(&self) -> bool {
        self.device.is_none()
    }

    /// Fault left pending by the last failing call, if not yet cleared.
    pub fn pending_fault(&self) -> Option<&Fault> {
        self.pending.as_ref()
    }

    /// Local and durable references currently alive.
    pub fn live_references(&self) -> usize {
        self.refs.len()
    }

    /// Instances still reachable through at least one reference.
    pub fn live_endpoints(&self) -> usize {
        self.endpoints.len()
    }

    fn raise(&mut self, fault: Fault) {
        tracing::debug!(fault = %fault, "fault raised");
        self.pending = Some(fault);
    }

    fn alloc(&mut self, target: Target, kind: RefKind) -> Option<Handle> {
        let handle = Handle::from_raw(self.next_handle)?;
        self.next_handle += 1;
        self.refs.insert(handle.raw(), Reference { target, kind });
        Some(handle)
    }

    fn target(&self, handle: Handle) -> Option<Target> {
        self.refs.get(&handle.raw()).map(|r| r.target)
    }

    fn delete_ref(&mut self, handle: Handle, kind: RefKind) {
        let Some(reference) = self.refs.get(&handle.raw()).copied() else {
            return;
        };
        if reference.kind != kind {
            tracing::warn!(handle = ?handle, ?kind, "reference deleted with the wrong kind");
            return;
        }
        self.refs.remove(&handle.raw());
        if let Target::Endpoint(id) = reference.target {
            self.collect(id);
        }
    }

    /// Drop endpoint `id` once nothing refers to it.
    fn collect(&mut self, id: u64) {
        let referenced = self
            .refs
            .values()
            .any(|r| r.target == Target::Endpoint(id));
        if !referenced && self.endpoints.remove(&id).is_some() {
            tracing::debug!(endpoint = id, "endpoint collected");
        }
    }

    fn invoke(
        &mut self,
        object: ObjectRef,
        class: ClassRef,
        method: MethodId,
        args: &[Value<'_>],
    ) -> i32 {
        let id = match (self.target(object.0), self.target(class.0)) {
            (Some(Target::Endpoint(id)), Some(Target::Class)) => id,
            _ => {
                self.raise(Fault::null_pointer("invalid endpoint or class reference"));
                return 0;
            }
        };
        let Some(op) = class::op_for(method) else {
            self.raise(Fault::no_such_method(format!("unknown method id {}", method.raw())));
            return 0;
        };
        let call = match Call::decode(op, args) {
            Ok(call) => call,
            Err(fault) => {
                self.raise(fault);
                return 0;
            }
        };
        let Some(endpoint) = self.endpoints.get_mut(&id) else {
            self.raise(Fault::null_pointer("endpoint was collected"));
            return 0;
        };
        match endpoint.dispatch(call) {
            Ok(value) => value,
            Err(fault) => {
                self.raise(fault);
                0
            }
        }
    }
}

impl Runtime for CpalRuntime {
    fn find_class(&mut self, name: &str) -> Option<ClassRef> {
        if name != PLATFORM_CLASS {
            self.raise(Fault::no_class_def(name));
            return None;
        }
        self.alloc(Target::Class, RefKind::Local).map(ClassRef)
    }

    fn resolve_method(&mut self, class: ClassRef, name: &str, signature: &str) -> Option<MethodId> {
        if self.target(class.0) != Some(Target::Class) {
            self.raise(Fault::null_pointer("invalid class reference"));
            return None;
        }
        let method = class::lookup(self.config.api_level, name, signature);
        if method.is_none() {
            self.raise(Fault::no_such_method(format!("{name}{signature}")));
        }
        method
    }

    fn new_object(
        &mut self,
        class: ClassRef,
        constructor: MethodId,
        args: &[Value<'_>],
    ) -> Option<ObjectRef> {
        if self.target(class.0) != Some(Target::Class) {
            self.raise(Fault::null_pointer("invalid class reference"));
            return None;
        }
        if class::op_for(constructor) != Some(Op::Construct) {
            self.raise(Fault::no_such_method("not a constructor"));
            return None;
        }
        let opened = ConstructorArgs::decode(args).and_then(|args| {
            Endpoint::open(
                args,
                self.device.as_ref(),
                self.config.api_level,
                self.next_session,
                self.config.refill_max_frames,
            )
        });
        let endpoint = match opened {
            Ok(endpoint) => endpoint,
            Err(fault) => {
                self.raise(fault);
                return None;
            }
        };

        self.next_session += 1;
        let id = self.next_endpoint;
        self.next_endpoint += 1;
        tracing::debug!(endpoint = id, session_id = endpoint.session_id(), "endpoint constructed");
        self.endpoints.insert(id, endpoint);
        self.alloc(Target::Endpoint(id), RefKind::Local).map(ObjectRef)
    }

    fn call_void(&mut self, object: ObjectRef, class: ClassRef, method: MethodId, args: &[Value<'_>]) {
        self.invoke(object, class, method, args);
    }

    fn call_int(
        &mut self,
        object: ObjectRef,
        class: ClassRef,
        method: MethodId,
        args: &[Value<'_>],
    ) -> i32 {
        self.invoke(object, class, method, args)
    }

    fn fault_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn clear_fault(&mut self) {
        self.pending = None;
    }

    fn new_global_ref(&mut self, handle: Handle) -> Option<Handle> {
        let target = self.target(handle)?;
        self.alloc(target, RefKind::Global)
    }

    fn delete_local_ref(&mut self, handle: Handle) {
        self.delete_ref(handle, RefKind::Local);
    }

    fn delete_global_ref(&mut self, handle: Handle) {
        self.delete_ref(handle, RefKind::Global);
    }
}
