// ABOUTME: Per-host command runner binding an executor to the invocation context.
// ABOUTME: Implements sudo prefixing, quiet logging, ignore-errors, and result caching.

use super::error::ExecError;
use super::{Executor, RunOutput};
use crate::diagnostics::{DiagnosticsSink, Warning};
use crate::invocation::InvocationContext;
use std::sync::Arc;

/// One remote command invocation with its execution policy.
///
/// Defaults mirror the facade contract: not elevated, failures raised,
/// quiet, uncached.
#[derive(Debug, Clone)]
pub struct Run<'a> {
    pub command: &'a str,
    pub sudo: bool,
    pub ignore_errors: bool,
    pub quiet: bool,
    pub use_cache: bool,
    pub cache_salt: Option<&'a str>,
}

impl<'a> Run<'a> {
    pub fn command(command: &'a str) -> Self {
        Self {
            command,
            sudo: false,
            ignore_errors: false,
            quiet: true,
            use_cache: false,
            cache_salt: None,
        }
    }

    pub fn sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    pub fn ignore_errors(mut self, ignore: bool) -> Self {
        self.ignore_errors = ignore;
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn cache_salt(mut self, salt: &'a str) -> Self {
        self.cache_salt = Some(salt);
        self
    }
}

/// Executes commands on one host within one logical deployment invocation.
///
/// Cheap to clone; clones share the executor and the invocation context.
#[derive(Clone)]
pub struct HostRunner {
    executor: Arc<dyn Executor>,
    context: Arc<InvocationContext>,
    diagnostics: DiagnosticsSink,
    sudo: bool,
}

impl HostRunner {
    pub fn new(executor: Arc<dyn Executor>, context: Arc<InvocationContext>) -> Self {
        Self {
            executor,
            context,
            diagnostics: DiagnosticsSink::default(),
            sudo: false,
        }
    }

    /// Elevate every command issued through this runner.
    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    pub fn target(&self) -> &str {
        self.executor.target()
    }

    pub fn context(&self) -> &Arc<InvocationContext> {
        &self.context
    }

    /// Record a non-fatal problem against this host's report.
    pub fn warn(&self, warning: Warning) {
        self.diagnostics.warn(warning);
    }

    pub fn diagnostics(&self) -> &DiagnosticsSink {
        &self.diagnostics
    }

    /// Execute one command according to its policy.
    ///
    /// Fails when the command exits non-zero and `ignore_errors` is not set;
    /// otherwise the (possibly failed) output is returned for inspection.
    /// Transport failures always propagate.
    pub async fn run(&self, run: Run<'_>) -> Result<RunOutput, ExecError> {
        let command = if run.sudo || self.sudo {
            format!("sudo {}", run.command)
        } else {
            run.command.to_string()
        };

        if run.use_cache {
            if let Some(cached) =
                self.context
                    .cached_run(self.target(), &command, run.cache_salt)
            {
                tracing::debug!(target = %self.target(), %command, "using cached result");
                return self.finish(run, &command, cached);
            }
        }

        if run.quiet {
            tracing::debug!(target = %self.target(), %command, "run");
        } else {
            tracing::info!(target = %self.target(), %command, "run");
        }

        let output = self.executor.execute(&command).await?;

        if run.use_cache {
            self.context
                .store_run(self.target(), &command, run.cache_salt, output.clone());
        }

        self.finish(run, &command, output)
    }

    fn finish(
        &self,
        run: Run<'_>,
        command: &str,
        output: RunOutput,
    ) -> Result<RunOutput, ExecError> {
        if !output.succeeded() && !run.ignore_errors {
            return Err(ExecError::CommandFailed {
                target: self.target().to_string(),
                command: command.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim_end().to_string(),
            });
        }
        Ok(output)
    }
}
