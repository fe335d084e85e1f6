// ABOUTME: Remote command execution facade consumed by the entity layer.
// ABOUTME: Executor trait, SSH-backed implementation, and the per-host runner.

mod error;
mod runner;

pub use error::{ExecError, ExecErrorKind};
pub use runner::{HostRunner, Run};

use crate::ssh::Session;
use async_trait::async_trait;

/// Captured result of one remote command.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub exit_code: u32,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout with the trailing newline removed, the way shell command
    /// substitution would see it.
    pub fn text(&self) -> &str {
        self.stdout.trim_end_matches('\n')
    }
}

/// Transport seam: executes one shell command on one remote target.
///
/// The production implementation runs over SSH; tests substitute a scripted
/// executor.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, command: &str) -> Result<RunOutput, ExecError>;

    /// Identifier of the remote target, used in logs and cache keys.
    fn target(&self) -> &str;
}

/// Executor backed by an established SSH session.
pub struct SshExecutor {
    session: Session,
    target: String,
}

impl SshExecutor {
    pub fn new(session: Session, target: impl Into<String>) -> Self {
        Self {
            session,
            target: target.into(),
        }
    }

    pub async fn disconnect(self) -> crate::ssh::Result<()> {
        self.session.disconnect().await
    }
}

#[async_trait]
impl Executor for SshExecutor {
    async fn execute(&self, command: &str) -> Result<RunOutput, ExecError> {
        let output = self
            .session
            .exec(command)
            .await
            .map_err(|source| ExecError::Transport {
                target: self.target.clone(),
                source,
            })?;

        Ok(RunOutput {
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    fn target(&self) -> &str {
        &self.target
    }
}
