//! CLI module
//!
//! Provides a command-line interface over `DocumentStore`, driven by
//! JSON-lines requests of the shape `{"statement": "...", "params": {...}}`:
//! - init: create the default collection and its configured indexes
//! - start: open the store and serve requests from stdin until EOF
//! - query: execute a single request read from stdin and exit
//! - explain: parse a statement and print its AST, without touching a backend

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{explain, init, query, run_command, start, Config};
pub use errors::{CliError, CliResult};
pub use io::{read_request, write_error, write_response};
