// ABOUTME: Sentinel images persisting configuration history as labels.
// ABOUTME: Build, read, rotate, and remove the current/backup sentinel pair.

use super::EntityError;
use crate::docker;
use crate::exec::{HostRunner, Run};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::collections::BTreeMap;

pub const CONFIGURATION_LABEL: &str = "relevo.configuration";
pub const DIGESTS_LABEL: &str = "relevo.digests";
pub const PARENT_LABEL: &str = "relevo.parent";

/// History record embedded in one sentinel image: the raw configuration
/// document and the digest each referenced image resolved to when it was
/// applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelPayload {
    pub configuration: Vec<u8>,
    pub digests: BTreeMap<String, String>,
}

/// The current/backup sentinel image pair for one deployed configuration.
///
/// Sentinels are throwaway images never run; their labels are the only
/// persisted state this variant has, since the orchestrator exposes no
/// inspectable previous configuration.
pub struct SentinelStore {
    current: String,
    backup: String,
}

impl SentinelStore {
    pub fn stack(name: &str) -> Self {
        Self {
            current: format!("relevo-current-stack:{name}"),
            backup: format!("relevo-backup-stack:{name}"),
        }
    }

    pub fn kubernetes(name: &str) -> Self {
        Self {
            current: format!("relevo-current-config:{name}"),
            backup: format!("relevo-backup-config:{name}"),
        }
    }

    pub fn current_tag(&self) -> &str {
        &self.current
    }

    pub fn backup_tag(&self) -> &str {
        &self.backup
    }

    pub async fn read_current(
        &self,
        runner: &HostRunner,
    ) -> Result<Option<SentinelPayload>, EntityError> {
        self.read(runner, &self.current).await
    }

    pub async fn read_backup(
        &self,
        runner: &HostRunner,
    ) -> Result<Option<SentinelPayload>, EntityError> {
        self.read(runner, &self.backup).await
    }

    async fn read(
        &self,
        runner: &HostRunner,
        tag: &str,
    ) -> Result<Option<SentinelPayload>, EntityError> {
        let Some(info) = docker::inspect(runner, docker::InspectKind::Image, tag).await? else {
            return Ok(None);
        };

        let labels = info.pointer("/Config/Labels");
        let configuration = labels
            .and_then(|l| l.get(CONFIGURATION_LABEL))
            .and_then(|v| v.as_str())
            .and_then(|b64| BASE64.decode(b64).ok());
        let Some(configuration) = configuration else {
            // A sentinel without its configuration label is useless history
            return Ok(None);
        };

        let digests = labels
            .and_then(|l| l.get(DIGESTS_LABEL))
            .and_then(|v| v.as_str())
            .and_then(|b64| BASE64.decode(b64).ok())
            .and_then(|raw| serde_json::from_slice(&raw).ok())
            .unwrap_or_default();

        Ok(Some(SentinelPayload {
            configuration,
            digests,
        }))
    }

    /// Build a fresh current sentinel embedding the payload.
    ///
    /// `base` defaults to `scratch`; a non-scratch base is recorded in the
    /// parent label so rotation and teardown can clean it up.
    pub async fn write_current(
        &self,
        runner: &HostRunner,
        payload: &SentinelPayload,
        base: Option<&str>,
    ) -> Result<(), EntityError> {
        let base = base.unwrap_or("scratch");
        let configuration = BASE64.encode(&payload.configuration);
        let digests = BASE64.encode(
            serde_json::to_vec(&payload.digests)
                .map_err(|e| EntityError::InvalidConfig(e.to_string()))?,
        );

        let mut labels = format!("{CONFIGURATION_LABEL}={configuration} {DIGESTS_LABEL}={digests}");
        if base != "scratch" {
            labels.push_str(&format!(" {PARENT_LABEL}={base}"));
        }

        let command = format!(
            "echo 'FROM {base}\nLABEL {labels}\n' | docker build --tag {} -",
            self.current
        );
        runner.run(Run::command(&command)).await?;
        Ok(())
    }

    /// Image id a sentinel tag currently points at, with its recorded parent.
    async fn tag_identity(
        &self,
        runner: &HostRunner,
        tag: &str,
    ) -> Result<Option<(String, Option<String>)>, EntityError> {
        let Some(info) = docker::inspect(runner, docker::InspectKind::Image, tag).await? else {
            return Ok(None);
        };
        let id = info
            .get("Id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| EntityError::Remote(format!("inspect output missing Id for {tag}")))?;
        let parent = info
            .pointer("/Config/Labels")
            .and_then(|l| l.get(PARENT_LABEL))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Ok(Some((id, parent)))
    }

    /// Promote the current sentinel to backup via tag reassignment, dropping
    /// the superseded backup and its recorded parent. Failures here lose
    /// tidiness, not history, so they are logged and swallowed.
    pub async fn rotate(&self, runner: &HostRunner) -> Result<(), EntityError> {
        let Some((current_id, _)) = self.tag_identity(runner, &self.current).await? else {
            // First deployment: no history to rotate
            return Ok(());
        };
        let superseded = self.tag_identity(runner, &self.backup).await?;

        let tag = format!("docker tag {current_id} {}", self.backup);
        runner.run(Run::command(&tag)).await?;
        let untag = format!("docker rmi {}", self.current);
        runner.run(Run::command(&untag).ignore_errors(true)).await?;

        if let Some((old_id, old_parent)) = superseded {
            docker::remove_image(runner, &old_id).await;
            if let Some(parent) = old_parent {
                docker::remove_image(runner, &parent).await;
            }
        }
        Ok(())
    }

    /// Swap the current and backup roles back after a successful revert.
    pub async fn rotate_back(&self, runner: &HostRunner) -> Result<(), EntityError> {
        let current = self.tag_identity(runner, &self.current).await?;
        let Some((backup_id, _)) = self.tag_identity(runner, &self.backup).await? else {
            return Err(EntityError::BackupMissing(self.backup.clone()));
        };

        let tag = format!("docker tag {backup_id} {}", self.current);
        runner.run(Run::command(&tag)).await?;
        if let Some((current_id, _)) = current {
            let tag = format!("docker tag {current_id} {}", self.backup);
            runner.run(Run::command(&tag)).await?;
        }
        Ok(())
    }

    /// Remove both sentinels and any recorded parents. Best-effort.
    pub async fn remove_all(&self, runner: &HostRunner) {
        for tag in [&self.current, &self.backup] {
            if let Ok(Some((id, parent))) = self.tag_identity(runner, tag).await {
                docker::remove_image(runner, tag).await;
                docker::remove_image(runner, &id).await;
                if let Some(parent) = parent {
                    docker::remove_image(runner, &parent).await;
                }
            }
        }
    }
}
