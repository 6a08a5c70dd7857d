//! src/lib.rs — CLI library for Vesper.
//!
//! Subcommands:
//!   - run     : compiles and executes a source file
//!   - repl    : interactive read-eval-print loop, state persists across lines
//!   - disasm  : compiles only, prints the bytecode disassembly
//!
//! The `vitte-cli` binary this is grounded on also carried `build`/`test`
//! subcommands for a package manager that doesn't exist here — that surface
//! is dropped, since a manifest/build system is out of scope for this spec.

mod repl;

use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vesper_core::disasm::disassemble_chunk;
use vesper_core::error::InterpretResult;
use vesper_core::value::Value;
use vesper_core::ObjRef;
use vesper_vm::{Interpreter, StdioOutput, VmOptions};

/// `sysexits.h`-style codes: `original_source/CLox`'s own convention, which
/// spec §6 pins explicitly for `run`.
const EX_OK: i32 = 0;
const EX_DATAERR: i32 = 65;
const EX_SOFTWARE: i32 = 70;
const EX_IOERR: i32 = 74;

#[derive(Parser, Debug)]
#[command(name = "vesper", version, about = "Vesper language tool")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Compiles and runs a `.vsp` source file.
    Run {
        file: PathBuf,
        /// Forces a GC cycle before every allocation (spec §4.7 stress mode).
        #[arg(long)]
        stress_gc: bool,
    },
    /// Starts an interactive read-eval-print loop.
    Repl {
        #[arg(long)]
        stress_gc: bool,
    },
    /// Compiles a source file and prints its bytecode disassembly.
    Disasm { file: PathBuf },
}

/// Entry point called from `src/main.rs`. Returns the process exit code
/// rather than a `Result`, since the three-way `InterpretResult` maps onto
/// exit codes more directly than an `anyhow::Error` would.
pub fn run() -> i32 {
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Run { file, stress_gc } => cmd_run(file, stress_gc),
        Cmd::Repl { stress_gc } => cmd_repl(stress_gc),
        Cmd::Disasm { file } => cmd_disasm(file),
    }
}

fn cmd_run(file: PathBuf, stress_gc: bool) -> i32 {
    let source = match fs::read_to_string(&file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("vesper: could not read '{}': {e}", file.display());
            return EX_IOERR;
        }
    };

    let options = VmOptions::from_env().with_stress_gc(stress_gc);
    let mut interpreter = Interpreter::new(options);
    let mut output = StdioOutput;
    match interpreter.interpret(&source, &mut output) {
        InterpretResult::Ok => EX_OK,
        InterpretResult::CompileError => EX_DATAERR,
        InterpretResult::RuntimeError => EX_SOFTWARE,
    }
}

fn cmd_repl(stress_gc: bool) -> i32 {
    let options = VmOptions::from_env().with_stress_gc(stress_gc);
    match repl::run(options) {
        Ok(()) => EX_OK,
        Err(e) => {
            eprintln!("vesper: {e}");
            EX_SOFTWARE
        }
    }
}

fn cmd_disasm(file: PathBuf) -> i32 {
    let source = match fs::read_to_string(&file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("vesper: could not read '{}': {e}", file.display());
            return EX_IOERR;
        }
    };

    let mut interpreter = Interpreter::new(VmOptions::default());
    let script = match interpreter.compile_only(&source) {
        Ok(script) => script,
        Err(errors) => {
            for error in &errors {
                eprintln!("{error}");
            }
            return EX_DATAERR;
        }
    };

    let title = file.file_name().and_then(|n| n.to_str()).unwrap_or("script");
    print_disassembly(script, title, &mut Vec::new());
    EX_OK
}

/// Disassembles `function`'s chunk under `title`, then recurses into every
/// nested function literal found among its constants — `disassemble_chunk`
/// itself stays pure and single-chunk (spec §4.3), so the walk over nested
/// functions lives here instead.
fn print_disassembly(function: ObjRef, title: &str, seen: &mut Vec<ObjRef>) {
    if seen.contains(&function) {
        return;
    }
    seen.push(function);

    let chunk = function.as_function().chunk.borrow();
    println!("{}", disassemble_chunk(&chunk, title));

    let nested: Vec<ObjRef> = chunk
        .constants
        .iter()
        .filter_map(|c| match c {
            Value::Obj(obj) if obj.is_function() => Some(*obj),
            _ => None,
        })
        .collect();
    drop(chunk);

    for obj in nested {
        let name = obj.as_function().display_name();
        print_disassembly(obj, &name, seen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_source(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(contents.as_bytes()).expect("write source");
        file
    }

    #[test]
    fn cmd_run_exits_zero_on_success() {
        let file = write_source("print 1 + 1;");
        assert_eq!(cmd_run(file.path().to_path_buf(), false), EX_OK);
    }

    #[test]
    fn cmd_run_exits_65_on_compile_error() {
        let file = write_source("print 1 +;");
        assert_eq!(cmd_run(file.path().to_path_buf(), false), EX_DATAERR);
    }

    #[test]
    fn cmd_run_exits_70_on_runtime_error() {
        let file = write_source("print undefinedThing;");
        assert_eq!(cmd_run(file.path().to_path_buf(), false), EX_SOFTWARE);
    }

    #[test]
    fn cmd_run_exits_74_on_missing_file() {
        assert_eq!(cmd_run(PathBuf::from("/nonexistent/path/to.vsp"), false), EX_IOERR);
    }

    #[test]
    fn cmd_disasm_exits_zero_and_recurses_into_nested_functions() {
        let file = write_source("fun outer() { fun inner() { return 1; } return inner(); }");
        assert_eq!(cmd_disasm(file.path().to_path_buf()), EX_OK);
    }

    #[test]
    fn cli_parses_run_subcommand_with_stress_gc_flag() {
        let cli = Cli::try_parse_from(["vesper", "run", "script.vsp", "--stress-gc"]).expect("parses");
        match cli.cmd {
            Cmd::Run { file, stress_gc } => {
                assert_eq!(file, PathBuf::from("script.vsp"));
                assert!(stress_gc);
            }
            other => panic!("expected Run, got {other:?}"),
        }
    }
}
