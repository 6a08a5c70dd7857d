//! Hard limits shared by the compiler and the virtual machine.
//!
//! These numbers are part of the bytecode contract: the compiler rejects
//! programs that would exceed them, and the VM sizes its stacks accordingly.

/// Number of distinct local-variable slots a single function may use.
/// Slot 0 is reserved for the callee, so a function has `LOCALS_MAX - 1`
/// usable local bindings (including parameters).
pub const LOCALS_MAX: usize = 256;

/// Number of distinct upvalues a single function may capture.
pub const UPVALUES_MAX: usize = 256;

/// Number of parameters a function declaration may list.
pub const PARAMS_MAX: usize = 255;

/// Number of simultaneously active call frames.
pub const FRAMES_MAX: usize = 64;

/// Size of the value stack, expressed as a multiple of [`FRAMES_MAX`]
/// (one slot per local per frame, worst case).
pub const STACK_MAX: usize = FRAMES_MAX * LOCALS_MAX;

/// Largest index representable without the `OP_WIDE` prefix.
pub const SHORT_INDEX_MAX: usize = 256;

/// Largest index representable at all (24-bit operand).
pub const WIDE_INDEX_MAX: usize = 1 << 24;

/// Largest forward/backward jump a single `JUMP`/`LOOP` family instruction
/// can encode (16-bit offset).
pub const JUMP_MAX: usize = u16::MAX as usize;

/// Initial garbage-collector trigger threshold, in bytes of heap allocated
/// through [`crate::gc::Heap::allocate`].
pub const GC_INITIAL_THRESHOLD: usize = 1024 * 1024;

/// Growth factor applied to the GC threshold after each successful cycle.
pub const GC_HEAP_GROW_FACTOR: f64 = 2.0;
