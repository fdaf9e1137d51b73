//! Command execution
//!
//! A [`Session`] owns the effective configuration and turns each
//! subcommand into text for stdout.

use crate::cli::{Command, RunArgs};
use crate::demos::{Demo, DEMO_CLASS};
use crate::error::{CliError, CliResult};
use core_types::Value;
use interpreter::{CallOutcome, Interpreter, InterpreterConfig, Vm};
use std::fmt::Write as _;
use std::path::Path;

/// Result of running a demo.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// `Class.method(args)` that was called
    pub call: String,
    /// How it ended
    pub outcome: CallOutcome,
    /// Bytecodes executed, when counted
    pub bytecode_count: Option<u64>,
    /// Histogram lines, most frequent first
    pub histogram: Vec<(String, u64)>,
    /// Last traced bytecodes
    pub trace: Vec<String>,
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.outcome {
            CallOutcome::Returned(Value::Void) => writeln!(f, "{} returned", self.call)?,
            CallOutcome::Returned(value) => writeln!(f, "{} = {}", self.call, value)?,
            CallOutcome::Threw {
                class_name, message, ..
            } => match message {
                Some(message) => writeln!(f, "{} threw {}: {}", self.call, class_name, message)?,
                None => writeln!(f, "{} threw {}", self.call, class_name)?,
            },
            CallOutcome::FramePopped { preserved_args } => {
                writeln!(f, "{} popped with {:?}", self.call, preserved_args)?
            }
        }
        if let Some(count) = self.bytecode_count {
            writeln!(f, "bytecodes executed: {}", count)?;
        }
        for (name, count) in &self.histogram {
            writeln!(f, "  {:>12}  {}", count, name)?;
        }
        for line in &self.trace {
            writeln!(f, "  {}", line)?;
        }
        Ok(())
    }
}

/// Runs CLI commands against one configuration.
#[derive(Debug, Clone)]
pub struct Session {
    config: InterpreterConfig,
}

impl Session {
    /// Session with `config`, validated.
    pub fn new(config: InterpreterConfig) -> CliResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Session with the settings in the JSON file at `path`, or the
    /// defaults when there is none.
    pub fn from_config_file(path: Option<&Path>) -> CliResult<Self> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                InterpreterConfig::from_json_str(&text)?
            }
            None => InterpreterConfig::default(),
        };
        Self::new(config)
    }

    /// Effective configuration.
    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Execute `command`, returning what to print.
    pub fn execute(&self, command: &Command) -> CliResult<String> {
        match command {
            Command::Stubs => self.stubs(),
            Command::Disassemble { name } => self.disassemble(name),
            Command::Config => Ok(format!("{}\n", self.config.to_json())),
            Command::Run(args) => Ok(self.run(args)?.to_string()),
        }
    }

    /// Stub listing of a freshly generated interpreter.
    pub fn stubs(&self) -> CliResult<String> {
        let interp = Interpreter::generate(&self.config)?;
        Ok(interp.listing())
    }

    /// Disassembly of the blob or stub called `name`.
    pub fn disassemble(&self, name: &str) -> CliResult<String> {
        let interp = Interpreter::generate(&self.config)?;
        let code = interp.code();
        if let Some(text) = code.disassemble_blob(name) {
            return Ok(text);
        }
        for blob in code.blobs() {
            if let Some(stub) = blob.stubs().iter().find(|s| s.name == name) {
                return Ok(blob.disassemble(stub.begin, stub.end));
            }
        }
        Err(CliError::UnknownCode(name.to_string()))
    }

    /// Run a demo with the flags in `args`.
    pub fn run(&self, args: &RunArgs) -> CliResult<RunReport> {
        let config = args.apply(self.config.clone());
        config.validate()?;
        self.run_with(config, args.demo, &args.args)
    }

    fn run_with(&self, config: InterpreterConfig, demo: Demo, given: &[i32]) -> CliResult<RunReport> {
        let mut vm = Vm::new(config.clone())?;
        demo.install(&mut vm)?;
        let ints = demo.arguments(given);
        let values: Vec<Value> = ints.iter().copied().map(Value::Int).collect();
        let mut call = format!("{}.{}(", DEMO_CLASS, demo.entry());
        for (i, v) in ints.iter().enumerate() {
            if i > 0 {
                call.push_str(", ");
            }
            let _ = write!(call, "{}", v);
        }
        call.push(')');

        log::info!("calling {}", call);
        let outcome = vm.call_static(DEMO_CLASS, demo.entry(), &values)?;

        let bytecode_count = if config.count_bytecodes {
            Some(vm.bytecode_count()?)
        } else {
            None
        };
        let histogram = if config.print_bytecode_histogram {
            vm.bytecode_histogram()?
                .into_iter()
                .map(|(bc, count)| (bc.name().to_string(), count))
                .collect()
        } else {
            Vec::new()
        };
        let trace = vm.trace_records().map(ToString::to_string).collect();
        Ok(RunReport {
            call,
            outcome,
            bytecode_count,
            histogram,
            trace,
        })
    }
}
