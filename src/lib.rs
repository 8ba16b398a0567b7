//! Core library for the Hyacinth scripting language runtime and tooling.
//! Implements lexing, parsing, evaluation, and REPL utilities.

pub mod ast;
pub mod diagnostics;
pub mod environment;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod repl;
pub mod runtime;
pub mod stdlib;
pub mod value;

pub use diagnostics::{Diagnostic, DiagnosticKind, HyacinthError, SourceSpan};
pub use repl::Repl;
pub use runtime::Interpreter;
