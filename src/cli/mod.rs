//! Command line interface module
//!
//! Argument parsing and the runner that turns parsed arguments into a running sync loop.

pub mod args;
pub mod runner;

pub use args::Args;
pub use runner::Runner;
