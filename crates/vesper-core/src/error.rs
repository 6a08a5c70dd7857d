//! Error types (spec §7) shared by the compiler and VM crates.
//!
//! `InterpretResult` is a plain enum rather than `Result<_, E>` because `Ok`
//! carries no payload and all three outcomes are part of the public
//! contract exercised end-to-end (spec §8); `CompileError`/`RuntimeError`
//! are `thiserror` types used internally and folded into it at the
//! `Interpreter` boundary.

use thiserror::Error;

/// What the parser was looking at when a compile error was raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtToken {
    Lexeme(String),
    End,
}

impl std::fmt::Display for AtToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AtToken::Lexeme(s) => write!(f, "'{s}'"),
            AtToken::End => write!(f, "end"),
        }
    }
}

/// A single reported compile-time diagnostic (spec §6 diagnostics format:
/// `[line L] Error at '<lexeme>': <msg>` or `[line L] Error at end: <msg>`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("[line {line}] Error at {at}: {message}")]
pub struct CompileError {
    pub file: Option<String>,
    pub line: u32,
    pub at: AtToken,
    pub message: String,
}

/// One frame of a runtime stack trace, rendered `[line L] in <name|script>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceLine {
    pub line: u32,
    pub name: String,
}

impl std::fmt::Display for TraceLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[line {}] in {}", self.line, self.name)
    }
}

/// A runtime error, carrying the formatted message and the frame stack
/// captured top-down at the moment it was raised (spec §4.6 `runtimeError`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RuntimeError {
    pub message: String,
    pub trace: Vec<TraceLine>,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>, trace: Vec<TraceLine>) -> Self {
        RuntimeError { message: message.into(), trace }
    }

    /// The full diagnostic: the message followed by one trace line per
    /// active frame, matching spec §6's runtime diagnostics format.
    pub fn render(&self) -> String {
        let mut out = self.message.clone();
        for line in &self.trace {
            out.push('\n');
            out.push_str(&line.to_string());
        }
        out
    }
}

/// Internal heap-invariant violations (spec §7 "fatal errors"). These are
/// not user-recoverable — reaching one means the allocator or GC broke an
/// invariant it guarantees itself, so the process aborts rather than
/// returning a `Result` a caller might paper over.
#[derive(Debug, Error)]
pub enum ObjError {
    #[error("heap invariant violated: {0}")]
    Invariant(&'static str),
}

/// The three-way outcome of `Interpreter::interpret` (spec §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}
