//! Error types for the CLI

use core_types::VmError;
use thiserror::Error;

/// CLI-specific errors
#[derive(Debug, Error)]
pub enum CliError {
    /// The VM failed to start or stopped
    #[error("vm error: {0}")]
    Vm(#[from] VmError),

    /// File I/O error
    #[error("file error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration that loaded but cannot be used
    #[error("invalid configuration: {0}")]
    Config(#[from] interpreter::ConfigError),

    /// A stub or blob that does not exist
    #[error("no code named '{0}'")]
    UnknownCode(String),
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
