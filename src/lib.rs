//! A small interactive shell built around a fork/pipe/exec pipeline engine.
//!
//! A line such as `ls -l | grep rs | wc -l` is tokenized by [`lexer`], parsed by
//! [`parser`] into a [`Pipeline`], and handed to [`executor::run`], which forks one
//! child that owns the whole process chain and waits for it. The builtins `exit`, `cd`
//! and `..` are intercepted by the [`Interpreter`] before anything is forked.

pub mod builtin;
pub mod env;
pub mod executor;
mod interpreter;
pub mod lexer;
pub mod parser;
pub mod pipeline;

pub use executor::{Completion, SpawnError, run, run_with_status};
pub use interpreter::{Interpreter, Options, PARSE_ERROR_STATUS};
pub use pipeline::{Pipeline, Stage};

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
pub type ExitCode = i32;
