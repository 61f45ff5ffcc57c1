//! Library module for unlock-pg
//!
//! Exposes the command-line definition and its resolution into core
//! settings so they can be tested without running the binary.

pub mod cli;

pub use cli::Cli;
