//! Command-line interface module.
//!
//! This module handles:
//! - Argument parsing via clap
//! - The buffered output sink for trace lines

mod args;
mod output;

pub use args::Args;
pub use output::{OutputSink, DEFAULT_OUTPUT_BUFFER};
