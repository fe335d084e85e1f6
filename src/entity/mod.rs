// ABOUTME: Versioned entity contract shared by all backend variants.
// ABOUTME: Update/revert/destroy operations and the entity error taxonomy.

mod container;
mod kube;
mod sentinel;
mod service;
mod stack;

pub use container::ContainerEntity;
pub use kube::KubeEntity;
pub use sentinel::{SentinelPayload, SentinelStore};
pub use service::ServiceEntity;
pub use stack::StackEntity;

use crate::exec::{ExecError, HostRunner};
use crate::types::EntityName;
use async_trait::async_trait;
use thiserror::Error;

/// Errors from versioned-entity operations.
///
/// `NotFound` drives state-machine branches and is absorbed wherever a
/// fallback is defined; it reaches the operator only when no fallback exists.
/// The enum is cloneable so once-per-invocation results can be replayed to
/// every waiting worker.
#[derive(Debug, Clone, Error)]
pub enum EntityError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("backup of {0} not found, nothing to revert to")]
    BackupMissing(String),

    #[error("no cluster manager found among target hosts")]
    ManagerNotFound,

    #[error("unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("option '{new}' and its deprecated alias '{old}' both supplied")]
    AmbiguousOption { old: String, new: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("remote operation failed: {0}")]
    Remote(String),
}

impl From<ExecError> for EntityError {
    fn from(source: ExecError) -> Self {
        EntityError::Remote(source.to_string())
    }
}

/// Caller overrides for one update invocation.
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub tag: Option<String>,
    pub registry: Option<String>,
    pub account: Option<String>,
    pub force: bool,
}

/// One deployable unit with a live and optionally a backup remote
/// representation.
#[async_trait]
pub trait Entity: Send + Sync {
    fn name(&self) -> &EntityName;

    /// Bring the remote representation up to date, preserving a recoverable
    /// previous version. Returns whether a change was made.
    async fn update(&self, runner: &HostRunner, opts: &UpdateOptions)
    -> Result<bool, EntityError>;

    /// Restore the previous version. Fails with `BackupMissing` when no
    /// rollback point exists.
    async fn revert(&self, runner: &HostRunner) -> Result<(), EntityError>;

    /// Tear down the live representation and any rollback state.
    async fn destroy(&self, runner: &HostRunner) -> Result<(), EntityError>;
}
