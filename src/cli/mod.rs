//! Handles Command Line Interface (CLI) related functionalities.
//!
//! Includes defining commands, parsing arguments, and the `App` struct that
//! holds the shared HTTP client and dispatches subcommands to the protocol
//! front-ends.

mod commands;

pub use commands::*;
