//! keyhop CLI library
//!
//! Command implementations and terminal output for the `keyhop` binary.

pub mod commands;
pub mod output;
