//! Value model, object heap, hash table, bytecode chunk and garbage
//! collector shared by the Vesper compiler and virtual machine.
//!
//! This crate has no dependency on either `vesper-compiler` or `vesper-vm`;
//! it only defines the data those crates operate on and the `GcRoots` seam
//! that lets the collector trace into both without a circular dependency.

pub mod chunk;
pub mod disasm;
pub mod error;
pub mod gc;
pub mod globals;
pub mod limits;
pub mod object;
pub mod op;
pub mod table;
pub mod value;

pub use error::InterpretResult;
pub use gc::{GcRoots, Heap, Marker};
pub use globals::Globals;
pub use object::ObjRef;
pub use value::Value;

/// What a native function receives besides its argument slice (spec §4.11):
/// enough of the interpreter to allocate/intern strings and read globals
/// (for `hasProperty`), without depending on `vesper-vm` from this crate.
pub struct NativeContext<'a> {
    pub heap: &'a mut Heap,
    pub globals: &'a Globals,
}
