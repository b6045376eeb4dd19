//! Incremental read-eval-print engine for Rust.
//!
//! Inputs are spliced into one growing program that is rebuilt and rerun
//! with `rustc` after every input; see [`eval`] for the pieces.

pub mod config;
pub mod error;
pub mod eval;
pub mod logging;

pub use error::{Error, Result};
pub use eval::{Flow, Session};
