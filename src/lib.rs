//! Core library for the Rill scripting language: a rule-driven lexer and
//! Pratt parser, a class-based object model, and a cooperative scheduler
//! that runs programs one line at a time.

pub mod ast;
pub mod call;
pub mod class;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod lexer;
pub mod parser;
pub mod pool;
pub mod prelude;
pub mod repl;
pub mod rules;
pub mod runtime;
mod stack;
pub mod task;
pub mod vm;

pub use class::{ClassDef, ClassId, ClassTable, Instance};
pub use config::VmConfig;
pub use diagnostics::{Diagnostic, DiagnosticKind, Result, RillError, SourcePos};
pub use repl::Repl;
pub use rules::RuleSet;
pub use runtime::Interpreter;
pub use vm::{EventStatus, Vm};
