// ABOUTME: Execution error types with SNAFU pattern.
// ABOUTME: Distinguishes transport failures from non-zero command exits.

use snafu::Snafu;

/// Unified error for remote command execution.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ExecError {
    #[snafu(display("transport failure on {target}: {source}"))]
    Transport {
        target: String,
        source: crate::ssh::Error,
    },

    #[snafu(display("command failed on {target} (exit {exit_code}): {command}: {stderr}"))]
    CommandFailed {
        target: String,
        command: String,
        exit_code: u32,
        stderr: String,
    },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecErrorKind {
    /// SSH-level failure: the command may never have reached the host.
    Transport,
    /// The command ran and exited non-zero.
    CommandFailed,
}

impl ExecError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> ExecErrorKind {
        match self {
            ExecError::Transport { .. } => ExecErrorKind::Transport,
            ExecError::CommandFailed { .. } => ExecErrorKind::CommandFailed,
        }
    }

    /// Stderr of the failed command, if it ran at all.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            ExecError::CommandFailed { stderr, .. } => Some(stderr),
            ExecError::Transport { .. } => None,
        }
    }
}
