//! Command-line arguments

use crate::demos::Demo;
use clap::{Args, Parser, Subcommand};
use interpreter::InterpreterConfig;
use std::path::PathBuf;

/// Generate the template interpreter and run programs on it.
#[derive(Debug, Parser)]
#[command(name = "interp", version, about)]
pub struct Cli {
    /// Increase log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Load interpreter settings from a JSON file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// What to do
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the generated stubs with their address ranges
    Stubs,

    /// Disassemble a code blob ("interpreter", "stubs") or a single stub
    Disassemble {
        /// Blob or stub name
        name: String,
    },

    /// Print the effective configuration as JSON
    Config,

    /// Run a bundled program
    Run(RunArgs),
}

/// Arguments of `run`.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Program to run
    #[arg(value_enum)]
    pub demo: Demo,

    /// Integer arguments; missing ones take the program's defaults
    #[arg(allow_negative_numbers = true)]
    pub args: Vec<i32>,

    /// Print the last traced bytecodes
    #[arg(long)]
    pub trace: bool,

    /// Count executed bytecodes
    #[arg(long)]
    pub count_bytecodes: bool,

    /// Print the per-bytecode histogram
    #[arg(long)]
    pub histogram: bool,

    /// Stop when the bytecode counter reaches this value
    #[arg(long, value_name = "COUNT")]
    pub stop_at: Option<u64>,

    /// Simulator instruction budget
    #[arg(long, value_name = "STEPS")]
    pub max_steps: Option<u64>,

    /// Check oops returned by the interpreter
    #[arg(long)]
    pub verify_oops: bool,

    /// Post the invocation counter overflow after this many calls
    #[arg(long, value_name = "CALLS")]
    pub compile_threshold: Option<u32>,
}

impl RunArgs {
    /// Apply the flags on top of `config`. Flags only ever switch things on.
    pub fn apply(&self, config: InterpreterConfig) -> InterpreterConfig {
        let mut config = config;
        if self.trace {
            config.trace_bytecodes = true;
        }
        if self.count_bytecodes || self.stop_at.is_some() {
            config.count_bytecodes = true;
        }
        if self.histogram {
            config.print_bytecode_histogram = true;
        }
        if let Some(at) = self.stop_at {
            config.stop_interpreter_at = at;
        }
        if let Some(steps) = self.max_steps {
            config.max_steps = steps;
        }
        if self.verify_oops {
            config.verify_oops = true;
        }
        if let Some(threshold) = self.compile_threshold {
            config.compile_threshold = threshold;
        }
        config
    }
}
