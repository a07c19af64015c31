//! lineage CLI library surface, exposed so integration tests can drive
//! argument parsing and config loading without spawning the binary.

pub mod cli;
pub mod config;

pub use cli::{Args, Command, LogFormat};
