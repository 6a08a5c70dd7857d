//! Single-pass Pratt-parsing compiler: source text in, a top-level
//! [`vesper_core::object::ObjFunction`] out.

mod compiler;
mod rules;
pub mod scanner;

pub use compiler::Compiler;
