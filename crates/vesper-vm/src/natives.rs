//! Built-in native functions (spec §4.11 / §6 / §8 C8).
//!
//! Every native follows the same contract the compiler/VM agree on: `args[0]`
//! is the reserved callee/return slot, `args[1..]` are the actual arguments.
//! On success the native overwrites `args[0]` with the result and returns
//! `true`; on failure it writes a string message there and returns `false`.

use std::io::BufRead;

use vesper_core::value::Value;
use vesper_core::NativeContext;

fn fail(ctx: &mut NativeContext<'_>, args: &mut [Value], message: &str) -> bool {
    args[0] = Value::Obj(ctx.heap.intern_str(message));
    false
}

fn clock(ctx: &mut NativeContext<'_>, args: &mut [Value]) -> bool {
    let _ = ctx;
    let seconds = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    args[0] = Value::Number(seconds);
    true
}

fn sleep(ctx: &mut NativeContext<'_>, args: &mut [Value]) -> bool {
    let Some(seconds) = args.get(1).and_then(Value::as_number) else {
        return fail(ctx, args, "sleep() expects a number of seconds.");
    };
    std::thread::sleep(std::time::Duration::from_secs_f64(seconds.max(0.0)));
    args[0] = Value::Nil;
    true
}

fn str_of(ctx: &mut NativeContext<'_>, args: &mut [Value]) -> bool {
    let text = args.get(1).map(Value::coerce_to_string).unwrap_or_default();
    args[0] = Value::Obj(ctx.heap.intern_str(&text));
    true
}

fn number_of(ctx: &mut NativeContext<'_>, args: &mut [Value]) -> bool {
    match args.get(1).and_then(Value::coerce_to_number) {
        Some(n) => {
            args[0] = Value::Number(n);
            true
        }
        None => fail(ctx, args, "number() could not convert its argument."),
    }
}

fn bool_of(ctx: &mut NativeContext<'_>, args: &mut [Value]) -> bool {
    let _ = ctx;
    let value = args.get(1).map(Value::coerce_to_bool).unwrap_or(false);
    args[0] = Value::Bool(value);
    true
}

/// `err("message")`: constructs a native-error return directly, for scripts
/// that want to raise a runtime error from within library code.
fn err(ctx: &mut NativeContext<'_>, args: &mut [Value]) -> bool {
    let message = args.get(1).and_then(Value::as_str).unwrap_or("error").to_string();
    fail(ctx, args, &message)
}

fn read(ctx: &mut NativeContext<'_>, args: &mut [Value]) -> bool {
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(0) => {
            args[0] = Value::Nil;
            true
        }
        Ok(_) => {
            let trimmed = line.trim_end_matches(['\n', '\r']);
            args[0] = Value::Obj(ctx.heap.intern_str(trimmed));
            true
        }
        Err(e) => fail(ctx, args, &format!("read() failed: {e}")),
    }
}

/// No object/instance model exists in this language (spec §3.2's concrete
/// object-kind list has no `Instance`), so `hasProperty` is grounded against
/// the global environment instead (documented in DESIGN.md): `hasProperty`
/// reports whether a global binding with that name has been declared.
fn has_property(ctx: &mut NativeContext<'_>, args: &mut [Value]) -> bool {
    let Some(name) = args.get(1).and_then(Value::as_str) else {
        return fail(ctx, args, "hasProperty() expects a name.");
    };
    let interned = ctx.heap.intern_str(name);
    let defined = ctx.globals.resolve(interned).map(|slot| ctx.globals.is_defined(slot)).unwrap_or(false);
    args[0] = Value::Bool(defined);
    true
}

/// Backs string-interpolation desugaring (spec §4.4/§9): concatenates every
/// argument's textual form, left to right.
fn join_str(ctx: &mut NativeContext<'_>, args: &mut [Value]) -> bool {
    let mut acc = String::new();
    for value in &args[1..] {
        acc.push_str(&value.coerce_to_string());
    }
    args[0] = Value::Obj(ctx.heap.intern_str(&acc));
    true
}

/// Registers every built-in as a global native, matching `vitte_vm`'s
/// `install_stdlib` pattern (define-as-global rather than a separate
/// namespace).
pub fn install(heap: &mut vesper_core::Heap, globals: &mut vesper_core::Globals) {
    register(heap, globals, "clock", Some(0), clock);
    register(heap, globals, "sleep", Some(1), sleep);
    register(heap, globals, "str", Some(1), str_of);
    register(heap, globals, "number", Some(1), number_of);
    register(heap, globals, "bool", Some(1), bool_of);
    register(heap, globals, "err", Some(1), err);
    register(heap, globals, "read", Some(0), read);
    register(heap, globals, "hasProperty", Some(1), has_property);
    register(heap, globals, "__join_str", None, join_str);
}

fn register(
    heap: &mut vesper_core::Heap,
    globals: &mut vesper_core::Globals,
    name: &str,
    arity: Option<u8>,
    function: vesper_core::object::NativeFn,
) {
    let native = heap.alloc_native(name.to_string(), arity, function);
    let interned = heap.intern_str(name);
    let slot = globals.declare(interned);
    globals.mark_immutable(slot);
    globals.define(slot, Value::Obj(native), true);
}
