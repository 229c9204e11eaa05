//! `vidtierctl`: command line front end for vidtier.
//!
//! The binary is a thin wrapper around [`cli::Cli`] and [`commands::run`];
//! both are exposed so the commands can be driven from tests.
#![allow(missing_docs)]

pub mod cli;
pub mod commands;
pub mod progress;

pub use cli::{Cli, Command};
pub use commands::{EXIT_FAILURES, EXIT_OK, EXIT_REJECTED, exit_code_for, run};
