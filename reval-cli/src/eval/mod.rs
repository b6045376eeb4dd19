//! The incremental evaluation engine.
//!
//! # Architecture
//!
//! A session owns one [`program::Program`]: a Rust source file with a print
//! helper and a `main` whose body collects every statement entered so far.
//! Each input is classified, spliced into the program, and the whole
//! program is compiled and run again. When that fails the program is put
//! back the way it was before the input.

pub mod checkpoint;
pub mod classify;
pub mod commands;
pub mod complete;
pub mod driver;
pub mod errfilter;
pub mod imports;
pub mod program;
pub mod repl;
pub mod rustc;
pub mod scan;
pub mod session;
pub mod splice;

pub use driver::{Capture, Outcome, Stage};
pub use repl::{eval_file, eval_one, run_interactive};
pub use session::{Facilities, Flow, Session};
