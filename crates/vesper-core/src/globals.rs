//! The global-variable environment (spec §3.5).
//!
//! Lives in `vesper-core` rather than `vesper-vm` so that `vesper-compiler`
//! can resolve a name to its slot index at compile time (spec §4.4's
//! "global, index into `globals.names`, created on first assignment site")
//! without the compiler crate depending on the VM crate.

use crate::object::ObjRef;
use crate::table::Table;
use crate::value::Value;

/// One global binding slot: its current value (`Undefined` until defined)
/// and whether it was declared `const`.
pub struct Global {
    pub value: Value,
    pub immutable: bool,
}

/// `names` maps an interned string to its dense index in `values`.
#[derive(Default)]
pub struct Globals {
    names: Table<usize>,
    values: Vec<Global>,
    /// `declared[i]` is the name that resolves to slot `i`, kept in lockstep
    /// with `values` so runtime error messages can name a slot without an
    /// O(n) reverse scan of `names` (whose iteration order is hash-table
    /// order, not declaration order).
    declared: Vec<ObjRef>,
}

impl Globals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Resolves `name` to its slot index, if declared.
    pub fn resolve(&self, name: ObjRef) -> Option<usize> {
        self.names.get(name).copied()
    }

    /// Declares `name` if not already present, returning its slot index.
    /// A freshly declared slot starts `Undefined` and mutable; redeclaring
    /// an existing name is a no-op that returns the existing index.
    pub fn declare(&mut self, name: ObjRef) -> usize {
        if let Some(&index) = self.names.get(name) {
            return index;
        }
        let index = self.values.len();
        self.values.push(Global { value: Value::Undefined, immutable: false });
        self.declared.push(name);
        self.names.set(name, index);
        index
    }

    /// The interned name backing slot `index`, for runtime diagnostics.
    pub fn name_of(&self, index: usize) -> ObjRef {
        self.declared[index]
    }

    pub fn is_immutable(&self, index: usize) -> bool {
        self.values[index].immutable
    }

    /// Marks a declared slot `const`. Called by the compiler at the
    /// declaration site, since the compiler and the VM share this same
    /// `Globals` instance (spec §4.4's compile-time index resolution only
    /// works because there is one environment, not two).
    pub fn mark_immutable(&mut self, index: usize) {
        self.values[index].immutable = true;
    }

    pub fn is_defined(&self, index: usize) -> bool {
        !matches!(self.values[index].value, Value::Undefined)
    }

    pub fn get(&self, index: usize) -> Value {
        self.values[index].value
    }

    /// Defines (or redefines) slot `index`'s value. `immutable` is sticky
    /// from the declaration that first gave the binding a value.
    pub fn define(&mut self, index: usize, value: Value, immutable: bool) {
        let slot = &mut self.values[index];
        slot.value = value;
        slot.immutable = immutable;
    }

    pub fn set(&mut self, index: usize, value: Value) {
        self.values[index].value = value;
    }

    /// Roots for the GC (spec §4.7): every global's current value.
    pub fn iter_values(&self) -> impl Iterator<Item = &Value> {
        self.values.iter().map(|g| &g.value)
    }

    /// Roots for the GC: every interned name backing a declared slot.
    pub fn iter_names(&self) -> impl Iterator<Item = ObjRef> + '_ {
        self.names.iter().map(|(k, _)| k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::Heap;

    #[test]
    fn declare_then_define_then_read() {
        let mut heap = Heap::new();
        let mut globals = Globals::new();
        let name = heap.intern_str("answer");
        let idx = globals.declare(name);
        assert!(!globals.is_defined(idx));
        globals.define(idx, Value::Number(42.0), false);
        assert!(globals.is_defined(idx));
        assert_eq!(globals.get(idx), Value::Number(42.0));
    }

    #[test]
    fn redeclaring_an_existing_name_reuses_its_slot() {
        let mut heap = Heap::new();
        let mut globals = Globals::new();
        let name = heap.intern_str("x");
        let first = globals.declare(name);
        let second = globals.declare(name);
        assert_eq!(first, second);
        assert_eq!(globals.len(), 1);
    }
}
