//! Unified error type for the dojo workspace.
//!
//! Errors fall in two groups. `Config` is a user mistake and is reported
//! before anything is started. `Spawn`, `UnexpectedExit` and `Parse` mean the
//! container engine behaved in a way the drivers cannot reason about; they are
//! fatal for the run.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::CommandOutput;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum DojoError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// The shell could not be started at all.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        /// Command line handed to the shell.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// An engine command exited in a way that was not anticipated.
    #[error("unexpected exit status.\n{output}")]
    UnexpectedExit {
        /// Everything known about the failed command.
        output: Box<CommandOutput>,
    },

    /// Engine output could not be understood.
    #[error("cannot parse engine output: {message}")]
    Parse {
        /// What went wrong, including the offending text.
        message: String,
    },
}

impl DojoError {
    /// Builds a configuration error from any message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Wraps a command result that the caller did not expect.
    #[must_use]
    pub fn unexpected(output: CommandOutput) -> Self {
        Self::UnexpectedExit {
            output: Box::new(output),
        }
    }

    /// Returns `true` for errors caused by invalid user input.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, DojoError>;
