//! Heap object model (spec §3.2).
//!
//! Every heap object shares a header (type tag folded into [`ObjKind`], a
//! `marked` bit, and a `next` link chaining every live object through the
//! heap-owned list). Objects are allocated with `Box::into_raw` and freed by
//! the collector's sweep phase with `Box::from_raw` — nothing else ever frees
//! one, matching the "GC is the sole deallocator" invariant from spec §9.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::ptr::NonNull;

use crate::chunk::Chunk;

/// Non-owning handle to a heap object.
///
/// Copying an `ObjRef` does not affect reference counts or lifetime; the
/// object lives until the collector decides it is unreachable. Two `ObjRef`s
/// are equal iff they point at the same allocation (identity, per spec §3.1).
#[derive(Clone, Copy)]
pub struct ObjRef(NonNull<Obj>);

impl ObjRef {
    /// # Safety
    /// `ptr` must point at a live `Obj` allocated by [`Obj::alloc`].
    unsafe fn from_non_null(ptr: NonNull<Obj>) -> Self {
        ObjRef(ptr)
    }

    /// Borrow the shared header + payload. Valid as long as the object has
    /// not been swept.
    pub fn get(&self) -> &Obj {
        // SAFETY: the GC never frees an object that is still reachable
        // through a live `Value`/`ObjRef`, and objects are never moved.
        unsafe { self.0.as_ref() }
    }

    pub fn is_marked(&self) -> bool {
        self.get().marked.get()
    }

    pub fn set_marked(&self, marked: bool) {
        self.get().marked.set(marked);
    }

    pub fn next(&self) -> Option<ObjRef> {
        self.get().next.get()
    }

    pub fn set_next(&self, next: Option<ObjRef>) {
        self.get().next.set(next);
    }

    /// Pointer identity, used for `Value::Obj` equality and for hashing
    /// object identity (e.g. function/closure/native equality).
    pub fn addr(&self) -> usize {
        self.0.as_ptr() as usize
    }

    /// Reclaim the allocation. Only the sweep phase may call this.
    ///
    /// # Safety
    /// The caller must guarantee no other `ObjRef` to this object remains
    /// reachable after this call.
    pub(crate) unsafe fn free(self) {
        drop(Box::from_raw(self.0.as_ptr()));
    }
}

impl PartialEq for ObjRef {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for ObjRef {}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.get().kind)
    }
}

/// Common header shared by every heap object, plus its payload.
pub struct Obj {
    pub kind: ObjKind,
    marked: Cell<bool>,
    next: Cell<Option<ObjRef>>,
}

impl Obj {
    /// Allocate `kind` on the heap and prepend it to `list_head`, returning
    /// the new head and a handle to the freshly allocated object.
    pub(crate) fn alloc(kind: ObjKind, list_head: Option<ObjRef>) -> (ObjRef, Option<ObjRef>) {
        let boxed = Box::new(Obj {
            kind,
            marked: Cell::new(false),
            next: Cell::new(list_head),
        });
        let ptr = NonNull::new(Box::into_raw(boxed)).expect("Box pointer is never null");
        let r = unsafe { ObjRef::from_non_null(ptr) };
        (r, Some(r))
    }
}

impl fmt::Debug for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.kind, f)
    }
}

// `next` needs a getter/setter pair that doesn't borrow through `ObjRef`
// recursively; expose via inherent methods on Obj used only by ObjRef/Heap.
impl Obj {
    fn next_cell(&self) -> &Cell<Option<ObjRef>> {
        &self.next
    }
}
impl ObjRef {
    #[allow(dead_code)]
    fn next_cell(&self) -> &Cell<Option<ObjRef>> {
        self.get().next_cell()
    }
}

/// Discriminated union of heap object payloads (spec §3.2, §9's "hoisted
/// header" redesign).
pub enum ObjKind {
    String(ObjString),
    Function(ObjFunction),
    Closure(ObjClosure),
    Upvalue(ObjUpvalue),
    Native(ObjNative),
}

impl fmt::Debug for ObjKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjKind::String(s) => write!(f, "String({:?})", s.chars),
            ObjKind::Function(fun) => write!(f, "Function({})", fun.display_name()),
            ObjKind::Closure(c) => write!(f, "Closure({})", c.function.as_function().display_name()),
            ObjKind::Upvalue(_) => write!(f, "Upvalue"),
            ObjKind::Native(n) => write!(f, "Native({})", n.name),
        }
    }
}

impl ObjRef {
    pub fn as_string(&self) -> &ObjString {
        match &self.get().kind {
            ObjKind::String(s) => s,
            _ => unreachable!("ObjRef::as_string called on non-string object"),
        }
    }
    pub fn as_function(&self) -> &ObjFunction {
        match &self.get().kind {
            ObjKind::Function(f) => f,
            _ => unreachable!("ObjRef::as_function called on non-function object"),
        }
    }
    pub fn as_closure(&self) -> &ObjClosure {
        match &self.get().kind {
            ObjKind::Closure(c) => c,
            _ => unreachable!("ObjRef::as_closure called on non-closure object"),
        }
    }
    pub fn as_upvalue(&self) -> &ObjUpvalue {
        match &self.get().kind {
            ObjKind::Upvalue(u) => u,
            _ => unreachable!("ObjRef::as_upvalue called on non-upvalue object"),
        }
    }
    pub fn as_native(&self) -> &ObjNative {
        match &self.get().kind {
            ObjKind::Native(n) => n,
            _ => unreachable!("ObjRef::as_native called on non-native object"),
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self.get().kind, ObjKind::String(_))
    }
    pub fn is_closure(&self) -> bool {
        matches!(self.get().kind, ObjKind::Closure(_))
    }
    pub fn is_function(&self) -> bool {
        matches!(self.get().kind, ObjKind::Function(_))
    }
}

/// An immutable, interned, length-prefixed UTF-8 string.
pub struct ObjString {
    pub chars: String,
    /// 32-bit FNV-1a hash over the UTF-8 bytes (spec §3.2).
    pub hash: u32,
}

impl ObjString {
    pub fn new(chars: String) -> Self {
        let hash = fnv1a_32(chars.as_bytes());
        ObjString { chars, hash }
    }
}

/// FNV-1a over raw bytes, used both for string hashing and the open-addressed
/// table's probe sequence (spec §3.2, §4.2).
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    let mut hash = OFFSET_BASIS;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// A compiled function body: arity, upvalue count, optional debug name, and
/// its own chunk (spec §3.2).
pub struct ObjFunction {
    /// Set once, by the compiler, after the body has been fully parsed
    /// (the parameter count and upvalue list aren't known until then) —
    /// hence `Cell` rather than a plain field, so it can be written through
    /// the same shared `&ObjFunction` every other accessor uses.
    arity: Cell<u8>,
    upvalue_count: Cell<usize>,
    pub name: Option<ObjRef>,
    pub chunk: RefCell<Chunk>,
}

impl ObjFunction {
    pub fn new(name: Option<ObjRef>) -> Self {
        ObjFunction {
            arity: Cell::new(0),
            upvalue_count: Cell::new(0),
            name,
            chunk: RefCell::new(Chunk::new()),
        }
    }

    pub fn arity(&self) -> u8 {
        self.arity.get()
    }

    pub fn upvalue_count(&self) -> usize {
        self.upvalue_count.get()
    }

    pub fn set_arity(&self, arity: u8) {
        self.arity.set(arity);
    }

    pub fn set_upvalue_count(&self, count: usize) {
        self.upvalue_count.set(count);
    }

    pub fn display_name(&self) -> String {
        match self.name {
            Some(n) => n.as_string().chars.clone(),
            None => "script".to_string(),
        }
    }
}

/// Describes where a closure's upvalue comes from, written by the compiler
/// right after `OP_CLOSURE` (spec §4.4, §4.6).
#[derive(Debug, Clone, Copy)]
pub struct UpvalueCapture {
    pub is_local: bool,
    pub index: u8,
}

/// A function paired with its resolved upvalues (spec §3.2).
pub struct ObjClosure {
    pub function: ObjRef,
    pub upvalues: Vec<ObjRef>,
}

/// State of a captured variable (spec §3.2): either still live on the value
/// stack (`Open`) or copied onto the heap after its scope closed (`Closed`).
pub enum UpvalueState {
    Open(usize),
    Closed(crate::value::Value),
}

pub struct ObjUpvalue {
    pub state: RefCell<UpvalueState>,
}

impl ObjUpvalue {
    pub fn new_open(stack_slot: usize) -> Self {
        ObjUpvalue {
            state: RefCell::new(UpvalueState::Open(stack_slot)),
        }
    }

    pub fn stack_slot(&self) -> Option<usize> {
        match *self.state.borrow() {
            UpvalueState::Open(slot) => Some(slot),
            UpvalueState::Closed(_) => None,
        }
    }
}

/// A host function implementing the native contract (spec §4.6, §6):
/// `(argc, args) -> ok`. On success the native leaves its result at
/// `args[0]` (the VM's reserved return slot); on failure it writes a String
/// error message there instead.
pub type NativeFn = fn(&mut crate::NativeContext<'_>, args: &mut [crate::value::Value]) -> bool;

pub struct ObjNative {
    pub name: String,
    pub arity: Option<u8>,
    pub function: NativeFn,
}
