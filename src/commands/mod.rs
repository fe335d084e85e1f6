// ABOUTME: Command handlers shared by the CLI: deploy, rollback, destroy, exec.
// ABOUTME: Per-host fan-out over SSH with a shared invocation context.

mod deploy;
mod destroy;
mod exec;
mod rollback;

pub use deploy::{DeployArgs, deploy};
pub use destroy::destroy;
pub use exec::exec;
pub use rollback::rollback;

use crate::config::{Config, EntityKind, HostConfig};
use crate::diagnostics::{Diagnostics, Warning};
use crate::entity::{ContainerEntity, Entity, KubeEntity, ServiceEntity, StackEntity};
use crate::error::{Error, Result};
use crate::exec::{HostRunner, SshExecutor};
use crate::invocation::{InvocationContext, InvocationId};
use crate::output::Output;
use crate::ssh::{Session, SessionConfig};
use std::env;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Outcome of one per-host worker, with any non-fatal warnings it collected.
pub(crate) struct HostReport<T> {
    pub host: String,
    pub result: Result<T>,
    pub diagnostics: Diagnostics,
}

/// Establish the SSH session for one host.
pub(crate) async fn connect(host: &HostConfig) -> Result<Session> {
    let user = host
        .user
        .clone()
        .unwrap_or_else(|| env::var("USER").unwrap_or_else(|_| "root".to_string()));

    let mut config = SessionConfig::new(&host.host, &user)
        .port(host.port)
        .trust_on_first_use(host.trust_first_connection)
        .command_timeout(host.command_timeout);
    if let Some(ref key) = host.key_path {
        config = config.key_path(key);
    }

    Ok(Session::connect(config).await?)
}

/// Read the stack/kubernetes configuration file once, before fan-out.
pub(crate) fn read_payload(config: &Config) -> Result<Option<Vec<u8>>> {
    match config.kind {
        EntityKind::Stack | EntityKind::Kubernetes => {
            let path = config
                .config_file
                .as_ref()
                .ok_or_else(|| Error::InvalidConfig("config_file is required".to_string()))?;
            Ok(Some(std::fs::read(path)?))
        }
        _ => Ok(None),
    }
}

/// Build a fresh entity for one host. Entities memoize remote state, so each
/// host gets its own instance.
pub(crate) fn build_entity(config: &Config, payload: Option<&[u8]>) -> Result<Box<dyn Entity>> {
    let name = config.name.clone();
    let overrides = config.overrides();

    match config.kind {
        EntityKind::Container => {
            let image = config
                .image
                .clone()
                .ok_or_else(|| Error::InvalidConfig("image is required".to_string()))?;
            Ok(Box::new(ContainerEntity::new(name, image, overrides)))
        }
        EntityKind::Service => {
            let image = config
                .image
                .clone()
                .ok_or_else(|| Error::InvalidConfig("image is required".to_string()))?;
            Ok(Box::new(ServiceEntity::new(name, image, overrides)))
        }
        EntityKind::Stack => {
            let payload = payload
                .ok_or_else(|| Error::InvalidConfig("config_file is required".to_string()))?;
            let mut entity = StackEntity::new(name, payload.to_vec(), overrides);
            if let Some(filename) = remote_filename(config) {
                entity = entity.with_filename(filename);
            }
            Ok(Box::new(entity))
        }
        EntityKind::Kubernetes => {
            let payload = payload
                .ok_or_else(|| Error::InvalidConfig("config_file is required".to_string()))?;
            let mut entity = KubeEntity::new(name, payload.to_vec());
            if let Some(filename) = remote_filename(config) {
                entity = entity.with_filename(filename);
            }
            Ok(Box::new(entity))
        }
    }
}

fn remote_filename(config: &Config) -> Option<String> {
    config
        .config_file
        .as_ref()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
}

/// Run `worker` once per configured host, concurrently, all sharing one
/// invocation context.
pub(crate) async fn fan_out<T, F, Fut>(
    config: &Config,
    command: &str,
    destination: Option<&str>,
    worker: F,
) -> Result<Vec<HostReport<T>>>
where
    T: Send + 'static,
    F: Fn(HostConfig, Arc<InvocationContext>) -> Fut,
    Fut: Future<Output = (Result<T>, Diagnostics)> + Send + 'static,
{
    let id = InvocationId::new(command, destination, &config.host_names());
    let context = Arc::new(InvocationContext::new(id));

    let mut set = JoinSet::new();
    for host in config.hosts.iter().cloned() {
        let name = host.host.clone();
        let fut = worker(host, Arc::clone(&context));
        set.spawn(async move {
            let (result, diagnostics) = fut.await;
            HostReport {
                host: name,
                result,
                diagnostics,
            }
        });
    }

    let mut reports = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(report) => reports.push(report),
            Err(e) => {
                return Err(Error::InvalidConfig(format!("worker panicked: {e}")));
            }
        }
    }
    Ok(reports)
}

/// Connect, run `op` with a host runner, then disconnect. Non-fatal problems
/// along the way are collected rather than failing the host.
pub(crate) async fn with_runner<T, F, Fut>(
    host: HostConfig,
    context: Arc<InvocationContext>,
    op: F,
) -> (Result<T>, Diagnostics)
where
    F: FnOnce(HostRunner) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let session = match connect(&host).await {
        Ok(session) => session,
        Err(e) => return (Err(e), Diagnostics::default()),
    };
    let executor = Arc::new(SshExecutor::new(session, host.host.clone()));
    let runner = HostRunner::new(
        executor.clone() as Arc<dyn crate::exec::Executor>,
        context,
    )
    .with_sudo(host.sudo);
    let sink = runner.diagnostics().clone();

    let result = op(runner).await;
    let mut diagnostics = sink.take();

    if let Ok(executor) = Arc::try_unwrap(executor) {
        if let Err(e) = executor.disconnect().await {
            diagnostics.warn(Warning::ssh_disconnect(format!(
                "{}: {e}",
                host.host
            )));
        }
    }

    (result, diagnostics)
}

/// Report per-host outcomes and fail if any host failed.
pub(crate) fn summarize<T>(
    reports: &[HostReport<T>],
    output: &Output,
    describe: impl Fn(&T) -> Option<String>,
) -> Result<()> {
    let total = reports.len();
    let mut failed = 0;

    for report in reports {
        match &report.result {
            Ok(value) => {
                if let Some(message) = describe(value) {
                    output.progress(&format!("[{}] {message}", report.host));
                }
            }
            Err(e) => {
                failed += 1;
                output.error(&format!("[{}] {e}", report.host));
            }
        }
        for warning in report.diagnostics.warnings() {
            output.progress(&format!("[{}] warning: {}", report.host, warning.message));
        }
    }

    if failed > 0 {
        return Err(Error::HostsFailed { failed, total });
    }
    Ok(())
}
