// ABOUTME: Per-deployment invocation context shared by all per-host workers.
// ABOUTME: Holds the run cache, once-per-invocation memoization, and election state.

use crate::election::ManagerElection;
use crate::entity::EntityError;
use crate::exec::RunOutput;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Identity of one logical deployment invocation: the command being run, the
/// selected destination, and the exact set of target hosts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvocationId {
    pub command: String,
    pub destination: Option<String>,
    pub hosts: Vec<String>,
}

impl InvocationId {
    pub fn new(command: &str, destination: Option<&str>, hosts: &[String]) -> Self {
        let mut hosts = hosts.to_vec();
        hosts.sort();
        hosts.dedup();
        Self {
            command: command.to_string(),
            destination: destination.map(str::to_string),
            hosts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RunCacheKey {
    target: String,
    command: String,
    salt: Option<String>,
}

type OnceResult = Result<bool, EntityError>;

/// Shared state for one logical deployment invocation.
///
/// Passed explicitly to every per-host worker; nothing here outlives the
/// invocation. Locks guard only in-memory bookkeeping and are never held
/// across a remote command.
pub struct InvocationContext {
    id: InvocationId,
    run_cache: Mutex<HashMap<RunCacheKey, RunOutput>>,
    once: Mutex<HashMap<String, Arc<OnceCell<OnceResult>>>>,
    election: ManagerElection,
}

impl InvocationContext {
    pub fn new(id: InvocationId) -> Self {
        let hosts = id.hosts.len();
        Self {
            id,
            run_cache: Mutex::new(HashMap::new()),
            once: Mutex::new(HashMap::new()),
            election: ManagerElection::new(hosts),
        }
    }

    pub fn id(&self) -> &InvocationId {
        &self.id
    }

    pub fn election(&self) -> &ManagerElection {
        &self.election
    }

    pub fn cached_run(&self, target: &str, command: &str, salt: Option<&str>) -> Option<RunOutput> {
        let key = RunCacheKey {
            target: target.to_string(),
            command: command.to_string(),
            salt: salt.map(str::to_string),
        };
        self.run_cache.lock().get(&key).cloned()
    }

    pub fn store_run(&self, target: &str, command: &str, salt: Option<&str>, output: RunOutput) {
        let key = RunCacheKey {
            target: target.to_string(),
            command: command.to_string(),
            salt: salt.map(str::to_string),
        };
        self.run_cache.lock().insert(key, output);
    }

    /// Execute `operation` at most once per invocation for the given key.
    ///
    /// The first worker to arrive runs the operation; workers arriving later
    /// (or concurrently) block until the result is available and reuse it. A
    /// stored failure is surfaced to every waiter as the recorded error.
    pub async fn once<F, Fut>(&self, key: &str, operation: F) -> OnceResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = OnceResult>,
    {
        let cell = {
            let mut once = self.once.lock();
            Arc::clone(
                once.entry(key.to_string())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        cell.get_or_init(|| async { operation().await })
            .await
            .clone()
    }
}
