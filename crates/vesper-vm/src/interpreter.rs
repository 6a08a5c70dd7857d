//! Ties the compiler, the VM, the heap and the global environment together
//! behind the single entry point spec §6 describes: source text in, one of
//! `Ok`/`CompileError`/`RuntimeError` out.

use vesper_compiler::Compiler;
use vesper_core::error::CompileError;
use vesper_core::{Heap, InterpretResult, ObjRef};

use crate::options::VmOptions;
use crate::vm::Vm;
use crate::Output;

/// Owns everything that must outlive a single `interpret()` call: the
/// object heap and the global environment. A REPL keeps one `Interpreter`
/// alive across lines so `var`/`const` declarations persist; `vesper run`
/// constructs one, uses it once, and drops it.
pub struct Interpreter {
    heap: Heap,
    globals: vesper_core::Globals,
    options: VmOptions,
}

impl Interpreter {
    pub fn new(options: VmOptions) -> Self {
        let mut heap = Heap::new();
        heap.stress_gc = options.stress_gc;
        heap.heap_grow_factor = options.gc_heap_grow_factor;
        let mut globals = vesper_core::Globals::new();
        crate::natives::install(&mut heap, &mut globals);
        Interpreter { heap, globals, options }
    }

    /// Compiles and runs `source` against `output`, returning the three-way
    /// outcome spec §6 specifies. Compile errors are logged via `tracing`
    /// (spec §4.9) and the diagnostics are printed to `output` as well, so a
    /// caller that only looks at the return code still gets the message.
    pub fn interpret(&mut self, source: &str, output: &mut dyn Output) -> InterpretResult {
        let span = tracing::debug_span!("compile");
        let _enter = span.enter();
        let function = match Compiler::compile(source, &mut self.heap, &mut self.globals) {
            Ok(function) => function,
            Err(errors) => {
                for error in &errors {
                    tracing::debug!(%error, "compile error");
                    output.eprint(&error.to_string());
                }
                return InterpretResult::CompileError;
            }
        };
        drop(_enter);

        let mut vm = Vm::new(&mut self.heap, &mut self.globals, output, self.options);
        match vm.run(function) {
            Ok(()) => InterpretResult::Ok,
            Err(error) => {
                let rendered = error.render();
                tracing::debug!(message = %rendered, "runtime error");
                output.eprint(&rendered);
                InterpretResult::RuntimeError
            }
        }
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Compiles `source` without running it, for `vesper disasm` (spec §6).
    pub fn compile_only(&mut self, source: &str) -> Result<ObjRef, Vec<CompileError>> {
        Compiler::compile(source, &mut self.heap, &mut self.globals)
    }
}
