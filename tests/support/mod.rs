// ABOUTME: Shared test support: a scripted executor standing in for SSH.
// ABOUTME: Asserts exact remote commands in order and replays canned outputs.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use relevo::exec::{ExecError, Executor, HostRunner, RunOutput};
use relevo::invocation::{InvocationContext, InvocationId};
use std::collections::VecDeque;
use std::sync::Arc;

/// Executor that replays a fixed script of expected commands. Any command
/// arriving out of order, or not in the script at all, fails the test.
pub struct ScriptedExecutor {
    target: String,
    steps: Mutex<VecDeque<(String, RunOutput)>>,
}

impl ScriptedExecutor {
    pub fn new(target: &str, steps: Vec<(String, RunOutput)>) -> Arc<Self> {
        Arc::new(Self {
            target: target.to_string(),
            steps: Mutex::new(steps.into_iter().collect()),
        })
    }

    /// Every scripted step must have been consumed.
    pub fn assert_exhausted(&self) {
        let remaining: Vec<String> = self.steps.lock().iter().map(|(c, _)| c.clone()).collect();
        assert!(
            remaining.is_empty(),
            "scripted commands never issued: {remaining:#?}"
        );
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(&self, command: &str) -> Result<RunOutput, ExecError> {
        let step = self.steps.lock().pop_front();
        let Some((expected, output)) = step else {
            panic!("unexpected command (script exhausted): {command}");
        };
        assert_eq!(command, expected, "command issued out of script order");
        Ok(output)
    }

    fn target(&self) -> &str {
        &self.target
    }
}

pub fn ok(stdout: &str) -> RunOutput {
    RunOutput {
        exit_code: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

pub fn fail(exit_code: u32, stderr: &str) -> RunOutput {
    RunOutput {
        exit_code,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

pub fn not_found(what: &str) -> RunOutput {
    fail(1, &format!("Error: No such object: {what}"))
}

pub fn context(command: &str, hosts: &[&str]) -> Arc<InvocationContext> {
    let hosts: Vec<String> = hosts.iter().map(|h| h.to_string()).collect();
    Arc::new(InvocationContext::new(InvocationId::new(
        command, None, &hosts,
    )))
}

pub fn runner(executor: Arc<ScriptedExecutor>, context: Arc<InvocationContext>) -> HostRunner {
    HostRunner::new(executor as Arc<dyn Executor>, context)
}

/// Script for one host of one invocation, in one call.
pub fn scripted(
    target: &str,
    command: &str,
    hosts: &[&str],
    steps: Vec<(String, RunOutput)>,
) -> (Arc<ScriptedExecutor>, HostRunner) {
    let executor = ScriptedExecutor::new(target, steps);
    let runner = runner(Arc::clone(&executor), context(command, hosts));
    (executor, runner)
}
