// ABOUTME: Manager election across the hosts of one deployment invocation.
// ABOUTME: Collects per-host verdicts and aggregates them into a cluster outcome.

use crate::entity::EntityError;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Per-invocation election of the single host authorized to mutate shared
/// cluster state.
///
/// Each worker probes its own host and records the verdict. Verdicts are
/// memoized for the invocation; nothing survives it.
pub struct ManagerElection {
    expected: usize,
    verdicts: Mutex<HashMap<String, bool>>,
}

impl ManagerElection {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            verdicts: Mutex::new(HashMap::new()),
        }
    }

    /// Memoized verdict for a host, if it has already reported.
    pub fn verdict(&self, host: &str) -> Option<bool> {
        self.verdicts.lock().get(host).copied()
    }

    /// Record a host's probe verdict.
    ///
    /// Returns whether this host is the manager. An unreachable host records
    /// `false`. When the last host reports and no host claimed manager, the
    /// whole invocation has no authoritative host and this fails with
    /// `ManagerNotFound`.
    pub fn record(&self, host: &str, is_manager: bool) -> Result<bool, EntityError> {
        let (elected, exhausted) = {
            let mut verdicts = self.verdicts.lock();
            verdicts.insert(host.to_string(), is_manager);
            let elected = verdicts.values().any(|v| *v);
            (elected, verdicts.len() >= self.expected)
        };

        if is_manager {
            return Ok(true);
        }

        if exhausted && !elected {
            return Err(EntityError::ManagerNotFound);
        }

        Ok(false)
    }
}
