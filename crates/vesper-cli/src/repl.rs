//! Interactive read-eval-print loop (spec §6). One [`vesper_vm::Interpreter`]
//! lives for the whole session so `var`/`const` declarations persist across
//! lines, the same way the teacher's `vitte-tools` shell keeps one VM alive.

use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use vesper_core::error::InterpretResult;
use vesper_vm::{Interpreter, StdioOutput, VmOptions};

pub fn run(options: VmOptions) -> Result<()> {
    let mut interpreter = Interpreter::new(options);
    let mut output = StdioOutput;
    let mut editor = DefaultEditor::new()?;

    println!("vesper repl — Ctrl-D to exit");
    loop {
        match editor.readline("> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line.as_str());
                match interpreter.interpret(&line, &mut output) {
                    InterpretResult::Ok => {}
                    InterpretResult::CompileError | InterpretResult::RuntimeError => {
                        // Diagnostics already went to `output`; the REPL
                        // keeps running rather than exiting on one bad line.
                    }
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}
