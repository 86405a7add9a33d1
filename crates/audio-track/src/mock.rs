//! Scripted in-memory runtime for exercising tracks without a platform.
//!
//! Exposes the full playback class by default; builders remove members, inject
//! faults and script integer results. Every invocation and every live
//! reference is recorded so tests can assert that nothing leaked.

use std::collections::{HashMap, HashSet};

use audio_track_types::{play_state, state, status};

use crate::entry_points::{CONSTRUCTOR_NAME, CONSTRUCTOR_SIGNATURE, EntryPoint, PLATFORM_CLASS};
use crate::runtime::{ClassRef, Handle, MethodId, ObjectRef, Runtime, Value};

/// One recorded member invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct MockCall {
    /// Entry point invoked, `None` for an unknown method id.
    pub entry: Option<EntryPoint>,
    pub ints: Vec<i32>,
    pub floats: Vec<f32>,
    /// Length of the buffer argument, if any.
    pub buffer_len: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Target {
    Class,
    Object(u64),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RefKind {
    Local,
    Global,
}

/// Member table index used as method id: 1 is the constructor, the rest
/// follow [`MEMBERS`].
const MEMBERS: [EntryPoint; 13] = [
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
    EntryPoint::WriteShorts,
    EntryPoint::WriteFloats,
    EntryPoint::WriteByteBuffer,
];

const CONSTRUCTOR_ID: u64 = 1;

#[derive(Debug, Default)]
pub struct MockRuntime {
    missing: HashSet<(String, String)>,
    class_missing: bool,
    constructor_faults: bool,
    constructor_returns_null: bool,
    global_refs_fail: bool,
    faults_on: HashSet<EntryPoint>,
    results: HashMap<EntryPoint, i32>,

    pending: Option<String>,
    next_handle: u64,
    next_object: u64,
    refs: HashMap<u64, (Target, RefKind)>,
    play_states: HashMap<u64, i32>,
    calls: Vec<MockCall>,
    constructor_calls: Vec<Vec<i32>>,
}

impl MockRuntime {
    /// Session id reported by `getAudioSessionId` unless scripted otherwise.
    pub const SESSION_ID: i32 = 17;

    pub fn new() -> Self {
        Self {
            next_handle: 1,
            next_object: 1,
            ..Default::default()
        }
    }

    /// Make `name` with `signature` unresolvable.
    pub fn without_member(mut self, name: &str, signature: &str) -> Self {
        self.missing.insert((name.to_string(), signature.to_string()));
        self
    }

    /// Make the playback class itself unresolvable.
    pub fn without_class(mut self) -> Self {
        self.class_missing = true;
        self
    }

    /// Constructor raises a fault.
    pub fn fail_constructor(mut self) -> Self {
        self.constructor_faults = true;
        self
    }

    /// Constructor returns a null object without raising.
    pub fn null_constructor(mut self) -> Self {
        self.constructor_returns_null = true;
        self
    }

    /// Promotion to durable references raises a fault.
    pub fn fail_global_refs(mut self) -> Self {
        self.global_refs_fail = true;
        self
    }

    /// Invoking `entry` raises a fault.
    pub fn fault_on(mut self, entry: EntryPoint) -> Self {
        self.faults_on.insert(entry);
        self
    }

    /// Invoking `entry` returns `value`.
    pub fn with_result(mut self, entry: EntryPoint, value: i32) -> Self {
        self.results.insert(entry, value);
        self
    }

    /// Leave a fault pending, as if a previous unrelated call had failed.
    pub fn raise_fault(&mut self, message: &str) {
        self.pending = Some(message.to_string());
    }

    pub fn pending_fault(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    pub fn calls(&self) -> &[MockCall] {
        &self.calls
    }

    pub fn calls_to(&self, entry: EntryPoint) -> usize {
        self.calls.iter().filter(|c| c.entry == Some(entry)).count()
    }

    /// Integer arguments of every constructor invocation.
    pub fn constructor_calls(&self) -> &[Vec<i32>] {
        &self.constructor_calls
    }

    pub fn live_local_refs(&self) -> usize {
        self.count_refs(RefKind::Local)
    }

    pub fn live_global_refs(&self) -> usize {
        self.count_refs(RefKind::Global)
    }

    fn count_refs(&self, kind: RefKind) -> usize {
        self.refs.values().filter(|(_, k)| *k == kind).count()
    }

    fn alloc(&mut self, target: Target, kind: RefKind) -> Option<Handle> {
        let handle = Handle::from_raw(self.next_handle)?;
        self.next_handle += 1;
        self.refs.insert(handle.raw(), (target, kind));
        Some(handle)
    }

    fn is_missing(&self, name: &str, signature: &str) -> bool {
        self.missing
            .contains(&(name.to_string(), signature.to_string()))
    }

    fn entry_for(method: MethodId) -> Option<EntryPoint> {
        let index = method.raw().checked_sub(CONSTRUCTOR_ID + 1)?;
        MEMBERS.get(usize::try_from(index).ok()?).copied()
    }

    fn invoke(
        &mut self,
        object: ObjectRef,
        class: ClassRef,
        method: MethodId,
        args: &[Value<'_>],
    ) -> i32 {
        let entry = Self::entry_for(method);
        self.calls.push(record(entry, args));

        let instance = match (self.refs.get(&object.0.raw()), self.refs.get(&class.0.raw())) {
            (Some((Target::Object(id), _)), Some((Target::Class, _))) => *id,
            _ => {
                self.raise_fault("NullPointerException: stale endpoint reference");
                return 0;
            }
        };
        let Some(entry) = entry else {
            self.raise_fault("NoSuchMethodError: unknown method id");
            return 0;
        };
        if self.faults_on.contains(&entry) {
            self.raise_fault(&format!("IllegalStateException: {entry}"));
            return 0;
        }

        let play = self.play_states.entry(instance).or_insert(play_state::STOPPED);
        match entry {
            EntryPoint::Play => *play = play_state::PLAYING,
            EntryPoint::Pause => *play = play_state::PAUSED,
            EntryPoint::Stop => *play = play_state::STOPPED,
            _ => {}
        }
        let current_play_state = *play;

        if let Some(value) = self.results.get(&entry) {
            return *value;
        }
        match entry {
            EntryPoint::GetState => state::INITIALIZED,
            EntryPoint::GetPlayState => current_play_state,
            EntryPoint::GetAudioSessionId => Self::SESSION_ID,
            EntryPoint::WriteShorts | EntryPoint::WriteFloats => int_arg(args, 2),
            EntryPoint::WriteByteBuffer => int_arg(args, 1),
            _ => status::SUCCESS,
        }
    }
}

fn int_arg(args: &[Value<'_>], index: usize) -> i32 {
    match args.get(index) {
        Some(Value::Int(i)) => *i,
        _ => 0,
    }
}

fn record(entry: Option<EntryPoint>, args: &[Value<'_>]) -> MockCall {
    let mut call = MockCall {
        entry,
        ints: Vec::new(),
        floats: Vec::new(),
        buffer_len: None,
    };
    for arg in args {
        match arg {
            Value::Int(i) => call.ints.push(*i),
            Value::Float(f) => call.floats.push(*f),
            Value::Shorts(s) => call.buffer_len = Some(s.len()),
            Value::Floats(f) => call.buffer_len = Some(f.len()),
            Value::Bytes(b) => call.buffer_len = Some(b.len()),
        }
    }
    call
}

impl Runtime for MockRuntime {
    fn find_class(&mut self, name: &str) -> Option<ClassRef> {
        if self.class_missing || name != PLATFORM_CLASS {
            self.raise_fault(&format!("NoClassDefFoundError: {name}"));
            return None;
        }
        self.alloc(Target::Class, RefKind::Local).map(ClassRef)
    }

    fn resolve_method(&mut self, class: ClassRef, name: &str, signature: &str) -> Option<MethodId> {
        if !matches!(self.refs.get(&class.0.raw()), Some((Target::Class, _)))
            || self.is_missing(name, signature)
        {
            self.raise_fault(&format!("NoSuchMethodError: {name}{signature}"));
            return None;
        }
        if name == CONSTRUCTOR_NAME && signature == CONSTRUCTOR_SIGNATURE {
            return MethodId::from_raw(CONSTRUCTOR_ID);
        }
        match MEMBERS
            .iter()
            .position(|e| e.name() == name && e.signature() == signature)
        {
            Some(index) => MethodId::from_raw(CONSTRUCTOR_ID + 1 + index as u64),
            None => {
                self.raise_fault(&format!("NoSuchMethodError: {name}{signature}"));
                None
            }
        }
    }

    fn new_object(
        &mut self,
        _class: ClassRef,
        constructor: MethodId,
        args: &[Value<'_>],
    ) -> Option<ObjectRef> {
        self.constructor_calls.push(record(None, args).ints);
        if constructor.raw() != CONSTRUCTOR_ID || self.constructor_faults {
            self.raise_fault("IllegalArgumentException: rejected by constructor");
            return None;
        }
        if self.constructor_returns_null {
            return None;
        }
        let id = self.next_object;
        self.next_object += 1;
        self.alloc(Target::Object(id), RefKind::Local).map(ObjectRef)
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
        if self.global_refs_fail {
            self.raise_fault("OutOfMemoryError: global reference table full");
            return None;
        }
        let (target, _) = *self.refs.get(&handle.raw())?;
        self.alloc(target, RefKind::Global)
    }

    fn delete_local_ref(&mut self, handle: Handle) {
        if let Some((_, RefKind::Local)) = self.refs.get(&handle.raw()) {
            self.refs.remove(&handle.raw());
        }
    }

    fn delete_global_ref(&mut self, handle: Handle) {
        if let Some((_, RefKind::Global)) = self.refs.get(&handle.raw()) {
            self.refs.remove(&handle.raw());
        }
    }
}
