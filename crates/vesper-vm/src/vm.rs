//! Stack-based dispatch loop (spec §4.6).
//!
//! `Vm` borrows the `Heap`/`Globals` owned by [`crate::interpreter::Interpreter`]
//! rather than owning them itself, so a compile phase and a run phase can
//! share one allocator and one global environment without either crate
//! depending on the other's internals.

use vesper_core::error::{RuntimeError, TraceLine};
use vesper_core::object::UpvalueState;
use vesper_core::value::Value;
use vesper_core::{op, GcRoots, Globals, Heap, Marker, ObjRef};

use crate::options::VmOptions;
use crate::Output;

struct CallFrame {
    closure: ObjRef,
    ip: usize,
    /// Index into [`Vm::stack`] where this frame's slot 0 (the callee) lives.
    slots_base: usize,
}

/// The running machine. Lives only for the duration of one `run()` call —
/// `Interpreter` constructs a fresh `Vm` (fresh stack, fresh frames) for each
/// top-level script, reusing the same `Heap`/`Globals` across calls so that
/// REPL state and the GC's intern table persist.
pub struct Vm<'a> {
    heap: &'a mut Heap,
    globals: &'a mut Globals,
    output: &'a mut dyn Output,
    options: VmOptions,
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    /// Open upvalues, kept sorted by descending stack slot (spec §4.6
    /// "walks `openUpvalues` (sorted by descending slot)").
    open_upvalues: Vec<ObjRef>,
}

/// Root-marking for one `Vm` run, free of the allocator so the caller can
/// still hold `&mut Heap` while this holds immutable views of everything
/// else (spec §4.7's "the VM's stacks/frames/upvalues" root contributor).
struct VmRoots<'a> {
    stack: &'a [Value],
    frames: &'a [CallFrame],
    open_upvalues: &'a [ObjRef],
    globals: &'a Globals,
}

impl GcRoots for VmRoots<'_> {
    fn mark_roots(&self, marker: &mut Marker<'_>) {
        for value in self.stack {
            marker.mark_value(value);
        }
        for frame in self.frames {
            marker.mark_object(frame.closure);
        }
        for &upvalue in self.open_upvalues {
            marker.mark_object(upvalue);
        }
        for value in self.globals.iter_values() {
            marker.mark_value(value);
        }
        for name in self.globals.iter_names() {
            marker.mark_object(name);
        }
    }
}

impl<'a> Vm<'a> {
    pub fn new(heap: &'a mut Heap, globals: &'a mut Globals, output: &'a mut dyn Output, options: VmOptions) -> Self {
        Vm {
            heap,
            globals,
            output,
            options,
            stack: Vec::with_capacity(256),
            frames: Vec::new(),
            open_upvalues: Vec::new(),
        }
    }

    /// Runs `script` (the top-level function the compiler produced) to
    /// completion, wrapping it in a closure with no upvalues (spec §4.6:
    /// every callable on the stack is a closure, even the script itself).
    pub fn run(&mut self, script: ObjRef) -> Result<(), RuntimeError> {
        let closure = self.heap.alloc_closure(script, Vec::new());
        self.stack.push(Value::Obj(closure));
        self.frames.push(CallFrame { closure, ip: 0, slots_base: 0 });
        let result = self.dispatch();
        if result.is_ok() {
            debug_assert!(self.stack.is_empty(), "stack must be empty once the script frame returns");
            debug_assert!(self.frames.is_empty(), "frame stack must be empty once the script frame returns");
        }
        result
    }

    fn maybe_collect(&mut self) {
        if self.options.stress_gc || self.heap.wants_collection() {
            let roots = VmRoots {
                stack: &self.stack,
                frames: &self.frames,
                open_upvalues: &self.open_upvalues,
                globals: &*self.globals,
            };
            let stats = self.heap.collect(&roots);
            tracing::debug!(swept = stats.swept, retained = stats.retained, "gc cycle");
        }
    }

    // ---- frame/stack plumbing -----------------------------------------

    fn frame(&self) -> &CallFrame {
        self.frames.last().expect("dispatch never runs with an empty frame stack")
    }

    fn chunk_byte(&self, ip: usize) -> u8 {
        self.frame().closure.as_closure().function.as_function().chunk.borrow().code[ip]
    }

    fn current_line(&self) -> u32 {
        let frame = self.frame();
        frame.closure.as_closure().function.as_function().chunk.borrow().line_for(frame.ip.saturating_sub(1))
    }

    fn read_byte(&mut self) -> u8 {
        let ip = self.frame().ip;
        let byte = self.chunk_byte(ip);
        self.frames.last_mut().expect("checked above").ip += 1;
        byte
    }

    fn read_index(&mut self, wide: bool) -> usize {
        if wide {
            let b0 = self.read_byte() as usize;
            let b1 = self.read_byte() as usize;
            let b2 = self.read_byte() as usize;
            (b0 << 16) | (b1 << 8) | b2
        } else {
            self.read_byte() as usize
        }
    }

    fn read_jump_offset(&mut self) -> u16 {
        let hi = self.read_byte() as u16;
        let lo = self.read_byte() as u16;
        (hi << 8) | lo
    }

    fn read_constant(&mut self, wide: bool) -> Value {
        let index = self.read_index(wide);
        self.frame().closure.as_closure().function.as_function().chunk.borrow().constants[index]
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("compiler-balanced stack effects never underflow")
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    fn slot(&self, index: usize) -> Value {
        self.stack[self.frame().slots_base + index]
    }

    fn set_slot(&mut self, index: usize, value: Value) {
        let base = self.frame().slots_base;
        self.stack[base + index] = value;
    }

    // ---- errors ----------------------------------------------------------

    /// Builds a [`RuntimeError`] with the frame stack captured top-down, per
    /// spec §4.6's `runtimeError`.
    fn runtime_error(&self, message: impl Into<String>) -> RuntimeError {
        let mut trace = Vec::with_capacity(self.frames.len());
        for frame in self.frames.iter().rev() {
            let function = frame.closure.as_closure().function;
            let line = function.as_function().chunk.borrow().line_for(frame.ip.saturating_sub(1));
            trace.push(TraceLine { line, name: function.as_function().display_name() });
        }
        RuntimeError::new(message.into(), trace)
    }

    // ---- dispatch ----------------------------------------------------------

    fn dispatch(&mut self) -> Result<(), RuntimeError> {
        loop {
            if self.stack.len() > self.options.stack_limit {
                return Err(self.runtime_error("Stack overflow."));
            }

            #[cfg(feature = "trace")]
            if self.options.trace {
                let ip = self.frame().ip;
                let opcode = self.chunk_byte(ip);
                tracing::trace!(ip, opcode, line = self.current_line(), "dispatch");
            }

            let mut opcode = self.read_byte();
            let wide = opcode == op::WIDE;
            if wide {
                opcode = self.read_byte();
            }

            match opcode {
                op::CONSTANT => {
                    let v = self.read_constant(wide);
                    self.push(v);
                }
                op::CONSTANT_M1 => self.push(Value::Number(-1.0)),
                op::CONSTANT_0 => self.push(Value::Number(0.0)),
                op::CONSTANT_1 => self.push(Value::Number(1.0)),
                op::CONSTANT_2 => self.push(Value::Number(2.0)),
                op::NIL => self.push(Value::Nil),
                op::TRUE => self.push(Value::Bool(true)),
                op::FALSE => self.push(Value::Bool(false)),
                op::POP => {
                    self.pop();
                }
                op::POPN => {
                    let n = self.read_byte() as usize;
                    self.stack.truncate(self.stack.len() - n);
                }
                op::DUP => self.push(self.peek(0)),
                op::GET_LOCAL => {
                    let slot = self.read_index(wide);
                    self.push(self.slot(slot));
                }
                op::SET_LOCAL => {
                    let slot = self.read_index(wide);
                    self.set_slot(slot, self.peek(0));
                }
                op::INC_LOCAL | op::DEC_LOCAL => {
                    let slot = self.read_index(wide);
                    let imm = self.read_byte() as f64;
                    let Value::Number(n) = self.slot(slot) else {
                        return Err(self.runtime_error("Operand must be a number."));
                    };
                    let result = if opcode == op::INC_LOCAL { n + imm } else { n - imm };
                    self.set_slot(slot, Value::Number(result));
                }
                op::GET_GLOBAL => {
                    let slot = self.read_index(wide);
                    if !self.globals.is_defined(slot) {
                        return Err(self.runtime_error(format!("Undefined variable '{}'.", self.global_name(slot))));
                    }
                    self.push(self.globals.get(slot));
                }
                op::SET_GLOBAL => {
                    let slot = self.read_index(wide);
                    if !self.globals.is_defined(slot) {
                        return Err(self.runtime_error(format!("Undefined variable '{}'.", self.global_name(slot))));
                    }
                    if self.globals.is_immutable(slot) {
                        return Err(self.runtime_error(format!("Can't assign to immutable variable '{}'.", self.global_name(slot))));
                    }
                    self.globals.set(slot, self.peek(0));
                }
                op::DEFINE_GLOBAL => {
                    let slot = self.read_index(wide);
                    let immutable = self.globals.is_immutable(slot);
                    let value = self.pop();
                    self.globals.define(slot, value, immutable);
                }
                op::GET_UPVALUE => {
                    let slot = self.read_index(wide);
                    let upvalue = self.frame().closure.as_closure().upvalues[slot];
                    self.push(self.read_upvalue(upvalue));
                }
                op::SET_UPVALUE => {
                    let slot = self.read_index(wide);
                    let upvalue = self.frame().closure.as_closure().upvalues[slot];
                    self.write_upvalue(upvalue, self.peek(0));
                }
                op::EQUAL => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b));
                }
                op::GREATER => self.numeric_binary(|a, b| Value::Bool(a > b))?,
                op::LESS => self.numeric_binary(|a, b| Value::Bool(a < b))?,
                op::ADD => self.add()?,
                op::SUBTRACT => self.numeric_binary(|a, b| Value::Number(a - b))?,
                op::MULTIPLY => self.numeric_binary(|a, b| Value::Number(a * b))?,
                op::DIVIDE => self.numeric_binary(|a, b| Value::Number(a / b))?,
                op::MOD => self.numeric_binary(|a, b| Value::Number(a % b))?,
                op::NOT => {
                    let v = self.pop();
                    self.push(Value::Bool(v.is_falsey()));
                }
                op::NEGATE => {
                    let Value::Number(n) = self.peek(0) else {
                        return Err(self.runtime_error("Operand must be a number."));
                    };
                    self.pop();
                    self.push(Value::Number(-n));
                }
                op::PRINT => {
                    let v = self.pop();
                    self.output.print(&v.coerce_to_string());
                }
                op::JUMP => {
                    let offset = self.read_jump_offset();
                    self.frames.last_mut().expect("frame present").ip += offset as usize;
                }
                // Non-popping per spec §9: the condition stays on the stack
                // so a chained `and`/`or`/ternary can read it after the branch.
                op::JUMP_IF_TRUE => {
                    let offset = self.read_jump_offset();
                    if !self.peek(0).is_falsey() {
                        self.frames.last_mut().expect("frame present").ip += offset as usize;
                    }
                }
                op::JUMP_IF_FALSE => {
                    let offset = self.read_jump_offset();
                    if self.peek(0).is_falsey() {
                        self.frames.last_mut().expect("frame present").ip += offset as usize;
                    }
                }
                op::JUMP_IF_NOT_EQUAL => {
                    let offset = self.read_jump_offset();
                    if self.peek(0).is_falsey() {
                        self.frames.last_mut().expect("frame present").ip += offset as usize;
                    }
                }
                op::LOOP => {
                    let offset = self.read_jump_offset();
                    self.frames.last_mut().expect("frame present").ip -= offset as usize;
                }
                op::LOOP_IF_FALSE => {
                    let offset = self.read_jump_offset();
                    let condition = self.pop();
                    if condition.is_falsey() {
                        self.frames.last_mut().expect("frame present").ip -= offset as usize;
                    }
                }
                op::CALL => {
                    let argc = self.read_byte() as usize;
                    self.call_value(argc)?;
                }
                op::CLOSURE => {
                    let function = self.read_constant(wide).as_obj().expect("CLOSURE's constant is always a function");
                    let upvalue_count = function.as_function().upvalue_count();
                    let mut upvalues = Vec::with_capacity(upvalue_count);
                    for _ in 0..upvalue_count {
                        let is_local = self.read_byte() != 0;
                        let index = self.read_byte() as usize;
                        let upvalue = if is_local {
                            let stack_slot = self.frame().slots_base + index;
                            self.capture_upvalue(stack_slot)
                        } else {
                            self.frame().closure.as_closure().upvalues[index]
                        };
                        upvalues.push(upvalue);
                    }
                    self.maybe_collect();
                    let closure = self.heap.alloc_closure(function, upvalues);
                    self.push(Value::Obj(closure));
                }
                op::CLOSE_UPVALUE => {
                    let value = self.peek(0);
                    let top_slot = self.stack.len() - 1;
                    self.close_upvalues_from(top_slot, value);
                    self.pop();
                }
                op::RETURN => {
                    let result = self.pop();
                    let frame = self.frames.pop().expect("at least the script frame is present");
                    self.close_upvalues_from(frame.slots_base, Value::Nil);
                    if self.frames.is_empty() {
                        self.stack.truncate(frame.slots_base);
                        return Ok(());
                    }
                    self.stack.truncate(frame.slots_base);
                    self.push(result);
                }
                _ => return Err(self.runtime_error(format!("Unknown opcode {opcode}."))),
            }
        }
    }

    fn global_name(&self, slot: usize) -> String {
        self.globals.name_of(slot).as_string().chars.clone()
    }

    fn numeric_binary(&mut self, f: impl Fn(f64, f64) -> Value) -> Result<(), RuntimeError> {
        let (Value::Number(b), Value::Number(a)) = (self.peek(0), self.peek(1)) else {
            return Err(self.runtime_error("Operands must be numbers."));
        };
        self.pop();
        self.pop();
        self.push(f(a, b));
        Ok(())
    }

    /// `ADD` overloads onto string concatenation (spec §4.6): allocate the
    /// combined string, then route it through the interner so two equal
    /// concatenations always collapse to the same identity.
    fn add(&mut self) -> Result<(), RuntimeError> {
        match (self.peek(1), self.peek(0)) {
            (Value::Number(a), Value::Number(b)) => {
                self.pop();
                self.pop();
                self.push(Value::Number(a + b));
            }
            (a, b) if a.is_string() && b.is_string() => {
                let (lhs, rhs) = (a.as_str().unwrap().to_string(), b.as_str().unwrap().to_string());
                self.pop();
                self.pop();
                self.maybe_collect();
                let interned = concat_interned(self.heap, &lhs, &rhs);
                self.push(Value::Obj(interned));
            }
            _ => return Err(self.runtime_error("Operands must be two numbers or two strings.")),
        }
        Ok(())
    }

    fn call_value(&mut self, argc: usize) -> Result<(), RuntimeError> {
        let callee = self.peek(argc);
        let Some(obj) = callee.as_obj() else {
            return Err(self.runtime_error("Can only call functions and classes."));
        };
        match &obj.get().kind {
            vesper_core::object::ObjKind::Closure(_) => self.call_closure(obj, argc),
            vesper_core::object::ObjKind::Native(_) => self.call_native(obj, argc),
            _ => Err(self.runtime_error("Can only call functions and classes.")),
        }
    }

    fn call_closure(&mut self, closure: ObjRef, argc: usize) -> Result<(), RuntimeError> {
        let function = closure.as_closure().function;
        let arity = function.as_function().arity() as usize;
        if argc != arity {
            return Err(self.runtime_error(format!("Expected {arity} arguments but got {argc}.")));
        }
        if self.frames.len() >= self.options.frames_max {
            return Err(self.runtime_error("Stack overflow."));
        }
        let slots_base = self.stack.len() - argc - 1;
        self.frames.push(CallFrame { closure, ip: 0, slots_base });
        Ok(())
    }

    fn call_native(&mut self, native: ObjRef, argc: usize) -> Result<(), RuntimeError> {
        if let Some(arity) = native.as_native().arity {
            if argc != arity as usize {
                return Err(self.runtime_error(format!("Expected {arity} arguments but got {argc}.")));
            }
        }
        let base = self.stack.len() - argc - 1;
        // Natives see the callee slot as args[0] so they can overwrite it
        // with the return value in place (spec §4.6/§4.11).
        let mut args: Vec<Value> = self.stack[base..].to_vec();
        let function = native.as_native().function;
        let mut ctx = vesper_core::NativeContext { heap: &mut *self.heap, globals: &*self.globals };
        let ok = function(&mut ctx, &mut args);
        let outcome = args[0];
        self.stack.truncate(base);
        if ok {
            self.push(outcome);
            Ok(())
        } else {
            let message = outcome.as_str().unwrap_or("native call failed").to_string();
            Err(self.runtime_error(message))
        }
    }

    // ---- upvalues ----------------------------------------------------------

    fn capture_upvalue(&mut self, stack_slot: usize) -> ObjRef {
        if let Some(&existing) = self.open_upvalues.iter().find(|u| u.as_upvalue().stack_slot() == Some(stack_slot)) {
            return existing;
        }
        self.maybe_collect();
        let upvalue = self.heap.alloc_open_upvalue(stack_slot);
        let position = self.open_upvalues.iter().position(|u| {
            u.as_upvalue().stack_slot().map(|s| s < stack_slot).unwrap_or(true)
        });
        match position {
            Some(i) => self.open_upvalues.insert(i, upvalue),
            None => self.open_upvalues.push(upvalue),
        }
        upvalue
    }

    fn read_upvalue(&self, upvalue: ObjRef) -> Value {
        match upvalue.as_upvalue().stack_slot() {
            Some(slot) => self.stack[slot],
            None => match &*upvalue.as_upvalue().state.borrow() {
                UpvalueState::Closed(v) => *v,
                UpvalueState::Open(_) => unreachable!("stack_slot() already ruled this out"),
            },
        }
    }

    fn write_upvalue(&mut self, upvalue: ObjRef, value: Value) {
        match upvalue.as_upvalue().stack_slot() {
            Some(slot) => self.stack[slot] = value,
            None => *upvalue.as_upvalue().state.borrow_mut() = UpvalueState::Closed(value),
        }
    }

    /// Closes every open upvalue at or above `from_slot`, per spec §4.6:
    /// called both by `CLOSE_UPVALUE` (one local leaving scope) and by
    /// `RETURN` (the whole frame's locals leaving scope at once).
    fn close_upvalues_from(&mut self, from_slot: usize, fallback: Value) {
        // `open_upvalues` is sorted descending by slot, so the ones that
        // need closing are always a prefix of the list.
        while let Some(&first) = self.open_upvalues.first() {
            let Some(slot) = first.as_upvalue().stack_slot() else { break };
            if slot < from_slot {
                break;
            }
            let value = self.stack.get(slot).copied().unwrap_or(fallback);
            self.heap.close_upvalue(first, value);
            self.open_upvalues.remove(0);
        }
    }
}

/// Interns `a ++ b` directly against a borrowed heap. A free function
/// rather than a `Vm` method so string concatenation stays usable from
/// contexts that only hold a [`Heap`], not a whole `Vm`.
pub(crate) fn concat_interned(heap: &mut Heap, a: &str, b: &str) -> ObjRef {
    let mut combined = String::with_capacity(a.len() + b.len());
    combined.push_str(a);
    combined.push_str(b);
    heap.intern_str(&combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StdioOutput;
    use proptest::prelude::*;

    fn new_vm<'a>(heap: &'a mut Heap, globals: &'a mut Globals, output: &'a mut StdioOutput) -> Vm<'a> {
        Vm::new(heap, globals, output, VmOptions::default())
    }

    #[test]
    fn capture_upvalue_reuses_existing_capture_at_the_same_slot() {
        let mut heap = Heap::new();
        let mut globals = Globals::new();
        let mut output = StdioOutput;
        let mut vm = new_vm(&mut heap, &mut globals, &mut output);
        vm.stack = vec![Value::Nil; 4];

        let first = vm.capture_upvalue(2);
        let second = vm.capture_upvalue(2);
        assert_eq!(first, second);
        assert_eq!(vm.open_upvalues.len(), 1);
    }

    #[test]
    fn open_upvalues_stay_sorted_by_descending_slot() {
        let mut heap = Heap::new();
        let mut globals = Globals::new();
        let mut output = StdioOutput;
        let mut vm = new_vm(&mut heap, &mut globals, &mut output);
        vm.stack = vec![Value::Nil; 8];

        vm.capture_upvalue(2);
        vm.capture_upvalue(5);
        vm.capture_upvalue(0);
        vm.capture_upvalue(3);

        let slots: Vec<usize> = vm.open_upvalues.iter().map(|u| u.as_upvalue().stack_slot().unwrap()).collect();
        assert_eq!(slots, vec![5, 3, 2, 0]);
    }

    #[test]
    fn close_upvalues_from_only_closes_slots_at_or_above_the_threshold() {
        let mut heap = Heap::new();
        let mut globals = Globals::new();
        let mut output = StdioOutput;
        let mut vm = new_vm(&mut heap, &mut globals, &mut output);
        vm.stack = vec![Value::Number(10.0), Value::Number(20.0), Value::Number(30.0)];

        let low = vm.capture_upvalue(0);
        let mid = vm.capture_upvalue(1);
        let high = vm.capture_upvalue(2);

        vm.close_upvalues_from(1, Value::Nil);

        assert!(matches!(&*low.as_upvalue().state.borrow(), UpvalueState::Open(0)));
        assert!(matches!(&*mid.as_upvalue().state.borrow(), UpvalueState::Closed(Value::Number(n)) if *n == 20.0));
        assert!(matches!(&*high.as_upvalue().state.borrow(), UpvalueState::Closed(Value::Number(n)) if *n == 30.0));
        assert_eq!(vm.open_upvalues.len(), 1);
        assert_eq!(vm.open_upvalues[0], low);
    }

    /// Compiles and runs `source`, reporting whether it succeeded and, if
    /// so, whether the stack and frame vector were left empty (spec
    /// invariant 4) before the `Vm` goes out of scope.
    fn run_source_and_check_invariant_4(source: &str) -> (bool, bool) {
        let mut heap = Heap::new();
        let mut globals = Globals::new();
        crate::natives::install(&mut heap, &mut globals);
        let function =
            vesper_compiler::Compiler::compile(source, &mut heap, &mut globals).expect("fixture source compiles");
        let mut output = StdioOutput;
        let mut vm = Vm::new(&mut heap, &mut globals, &mut output, VmOptions::default());
        let outcome = vm.run(function);
        let ok = outcome.is_ok();
        let unwound = vm.stack.is_empty() && vm.frames.is_empty();
        (ok, unwound)
    }

    /// Spec invariant 4: `interpret(P)` leaves `stackTop == stack` and
    /// `frameCount == 0` on `Ok`. `run` only has private access to `Vm`'s
    /// fields from inside this module, so the check happens right here
    /// rather than through the crate's public `Interpreter` surface.
    #[test]
    fn stack_and_frames_are_empty_after_a_successful_run() {
        let mut heap = Heap::new();
        let mut globals = Globals::new();
        crate::natives::install(&mut heap, &mut globals);
        let function = vesper_compiler::Compiler::compile(
            "fun add(a, b) { return a + b; } print add(1, 2);",
            &mut heap,
            &mut globals,
        )
        .expect("fixture source compiles");
        let mut output = StdioOutput;
        let mut vm = Vm::new(&mut heap, &mut globals, &mut output, VmOptions::default());

        let result = vm.run(function);

        assert!(result.is_ok());
        assert!(vm.stack.is_empty());
        assert!(vm.frames.is_empty());
    }

    fn arithmetic_expr() -> impl Strategy<Value = String> {
        (
            prop::collection::vec(1i64..=20, 2..6),
            prop::collection::vec(prop_oneof![Just('+'), Just('-'), Just('*'), Just('/')], 1..5),
        )
            .prop_map(|(terms, ops)| {
                let mut expr = terms[0].to_string();
                for (term, operator) in terms[1..].iter().zip(ops.iter()) {
                    expr = format!("({expr} {operator} {term})");
                }
                expr
            })
    }

    proptest! {
        /// Generalizes `stack_and_frames_are_empty_after_a_successful_run`
        /// over arbitrary well-typed arithmetic programs (spec invariant 4).
        #[test]
        fn stack_and_frames_stay_empty_for_any_arithmetic_program(expr in arithmetic_expr()) {
            let source = format!("print {expr};");
            let (ok, unwound) = run_source_and_check_invariant_4(&source);
            prop_assert!(ok);
            prop_assert!(unwound);
        }
    }
}
