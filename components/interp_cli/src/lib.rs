//! Command-line front end for the template interpreter
//!
//! Generates the interpreter, prints its stub listing or disassembly, and
//! runs bundled programs with the diagnostics switches turned on.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod demos;
pub mod error;
pub mod logger;
pub mod session;

pub use cli::{Cli, Command, RunArgs};
pub use demos::{Demo, DEMO_CLASS};
pub use error::{CliError, CliResult};
pub use session::{RunReport, Session};
