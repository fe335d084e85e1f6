// ABOUTME: Plain container variant of the versioned entity.
// ABOUTME: Rename-as-backup update/revert state machine over the docker CLI.

use super::{Entity, EntityError, UpdateOptions};
use crate::docker;
use crate::exec::{HostRunner, Run, RunOutput};
use crate::options::{
    AttributeDef, OptionDef, OptionValue, Overrides, Resolved, Schema, Scope, resolve,
};
use crate::types::{EntityName, ImageRef};
use async_trait::async_trait;
use parking_lot::Mutex;

fn container_schema() -> Schema {
    Schema::new(
        vec![
            OptionDef::new("name")
                .unsafe_()
                .computed(|scope| Some(OptionValue::str(scope.name.as_str()))),
            OptionDef::new("detach")
                .unsafe_()
                .fixed(OptionValue::Switch(true)),
            OptionDef::new("publish").aliases(&["ports"]),
            OptionDef::new("env"),
            OptionDef::new("volume").aliases(&["volumes"]),
            OptionDef::new("label"),
            OptionDef::new("network").aliases(&["net"]),
            OptionDef::new("restart").unsafe_(),
            OptionDef::new("user"),
        ],
        vec![
            AttributeDef::new("stop-timeout")
                .aliases(&["stop_timeout"])
                .fixed(OptionValue::Int(10)),
            AttributeDef::new("command"),
        ],
    )
}

/// One deployed container with a `{name}_backup` rollback sibling.
pub struct ContainerEntity {
    name: EntityName,
    image: ImageRef,
    overrides: Overrides,
    // Memoized inspect output; the outer None means "not fetched yet"
    remote_info: Mutex<Option<Option<serde_json::Value>>>,
}

impl ContainerEntity {
    pub fn new(name: EntityName, image: ImageRef, overrides: Overrides) -> Self {
        Self {
            name,
            image,
            overrides,
            remote_info: Mutex::new(None),
        }
    }

    /// Derived in-process descriptor reusing this entity's overrides but
    /// addressing a different remote identifier.
    pub fn fork(&self, name: EntityName, image: Option<ImageRef>) -> ContainerEntity {
        ContainerEntity::new(
            name,
            image.unwrap_or_else(|| self.image.clone()),
            self.overrides.clone(),
        )
    }

    pub fn image(&self) -> &ImageRef {
        &self.image
    }

    fn resolved(&self, image: &ImageRef) -> Result<Resolved, EntityError> {
        let scope = Scope {
            name: &self.name,
            image: Some(image),
        };
        resolve(&container_schema(), &scope, &self.overrides)
    }

    /// Lazily fetched inspect output for the live container, memoized per
    /// instance.
    pub async fn remote_info(
        &self,
        runner: &HostRunner,
    ) -> Result<Option<serde_json::Value>, EntityError> {
        if let Some(cached) = self.remote_info.lock().clone() {
            return Ok(cached);
        }
        let info = docker::inspect(runner, docker::InspectKind::Container, self.name.as_str())
            .await?;
        *self.remote_info.lock() = Some(info.clone());
        Ok(info)
    }

    pub fn invalidate(&self) {
        *self.remote_info.lock() = None;
    }

    fn stop_timeout(&self, resolved: &Resolved) -> i64 {
        match resolved.attribute("stop-timeout") {
            Some(OptionValue::Int(t)) => *t,
            _ => 10,
        }
    }

    /// Issue the remote create+start command for this entity under its own
    /// name.
    pub async fn run(&self, runner: &HostRunner, image: &ImageRef) -> Result<(), EntityError> {
        let resolved = self.resolved(image)?;
        let mut command = format!("docker run {} {image}", resolved.render());
        if let Some(cmd) = resolved.attribute("command") {
            command.push(' ');
            command.push_str(&cmd.to_string());
        }
        runner.run(Run::command(&command).quiet(false)).await?;
        Ok(())
    }

    /// Run a command inside the live container.
    pub async fn execute(
        &self,
        runner: &HostRunner,
        command: &str,
        quiet: bool,
    ) -> Result<RunOutput, EntityError> {
        let command = format!("docker exec {} {command}", self.name);
        Ok(runner.run(Run::command(&command).quiet(quiet)).await?)
    }

    /// Delete the live container, optionally its image, and by default any
    /// dangling volumes left behind.
    pub async fn delete(
        &self,
        runner: &HostRunner,
        force: bool,
        delete_image: bool,
        delete_dangling_volumes: bool,
    ) -> Result<(), EntityError> {
        let info = self
            .remote_info(runner)
            .await?
            .ok_or_else(|| EntityError::NotFound(self.name.to_string()))?;

        let command = if force {
            format!("docker rm --force {}", self.name)
        } else {
            format!("docker rm {}", self.name)
        };
        runner.run(Run::command(&command)).await?;
        self.invalidate();

        if delete_dangling_volumes {
            docker::sweep_dangling_volumes(runner).await;
        }

        if delete_image {
            if let Some(image_id) = info.get("Image").and_then(|v| v.as_str()) {
                docker::remove_image(runner, image_id).await;
            }
        }
        Ok(())
    }

    /// Whether the live container already runs the resolved target image.
    /// Any lookup failure falls back to the recreate path.
    async fn image_matches(
        &self,
        runner: &HostRunner,
        info: &serde_json::Value,
        image: &ImageRef,
    ) -> Result<bool, EntityError> {
        let current = info
            .get("Image")
            .and_then(|v| v.as_str())
            .ok_or_else(|| EntityError::Remote("inspect output missing Image".to_string()))?;
        match docker::image_id(runner, image).await? {
            Some(target) => Ok(current == target),
            // Target image not pulled yet
            None => Ok(false),
        }
    }

    async fn recreate(&self, runner: &HostRunner, image: &ImageRef) -> Result<(), EntityError> {
        let resolved = self.resolved(image)?;
        let stop_timeout = self.stop_timeout(&resolved);
        let backup_name = self.name.backup();

        // Clean up any previous backup; its absence is not an error
        let backup = self.fork(backup_name.clone(), None);
        match backup.remote_info(runner).await {
            Ok(Some(_)) => backup.delete(runner, false, true, true).await?,
            Ok(None) => {}
            Err(e) => return Err(e),
        }

        // Demote the live container to the backup name, if there is one
        if self.remote_info(runner).await?.is_some() {
            let rename = format!("docker rename {} {backup_name}", self.name);
            runner.run(Run::command(&rename)).await?;
            let stop = format!("docker stop --time {stop_timeout} {backup_name}");
            runner.run(Run::command(&stop)).await?;
            self.invalidate();
        }

        self.run(runner, image).await
    }
}

#[async_trait]
impl Entity for ContainerEntity {
    fn name(&self) -> &EntityName {
        &self.name
    }

    async fn update(
        &self,
        runner: &HostRunner,
        opts: &UpdateOptions,
    ) -> Result<bool, EntityError> {
        let image = self.image.with_overrides(
            opts.tag.as_deref(),
            opts.registry.as_deref(),
            opts.account.as_deref(),
        );

        if !opts.force {
            if let Some(info) = self.remote_info(runner).await? {
                match self.image_matches(runner, &info, &image).await {
                    Ok(true) => {
                        // Idempotent: make sure it is running, nothing changed
                        let start = format!("docker start {}", self.name);
                        runner.run(Run::command(&start)).await?;
                        return Ok(false);
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::debug!(error = %e, "image comparison failed, recreating");
                    }
                }
            }
        }

        self.recreate(runner, &image).await?;
        Ok(true)
    }

    async fn revert(&self, runner: &HostRunner) -> Result<(), EntityError> {
        let backup_name = self.name.backup();
        let backup_info =
            docker::inspect(runner, docker::InspectKind::Container, backup_name.as_str()).await?;
        if backup_info.is_none() {
            return Err(EntityError::BackupMissing(self.name.to_string()));
        }

        let resolved = self.resolved(&self.image)?;
        let stop_timeout = self.stop_timeout(&resolved);

        // Mirror image of recreate: each step is an independent remote
        // command; an intermediate failure leaves a diagnosable state
        let live_info = self.remote_info(runner).await?;
        if live_info.is_some() {
            let stop = format!("docker stop --time {stop_timeout} {}", self.name);
            runner.run(Run::command(&stop)).await?;
        }

        let start = format!("docker start {backup_name}");
        runner.run(Run::command(&start)).await?;

        if let Some(info) = live_info {
            let rm = format!("docker rm {}", self.name);
            runner.run(Run::command(&rm)).await?;
            docker::sweep_dangling_volumes(runner).await;
            if let Some(image_id) = info.get("Image").and_then(|v| v.as_str()) {
                docker::remove_image(runner, image_id).await;
            }
        }

        let rename = format!("docker rename {backup_name} {}", self.name);
        runner.run(Run::command(&rename)).await?;
        self.invalidate();
        Ok(())
    }

    async fn destroy(&self, runner: &HostRunner) -> Result<(), EntityError> {
        self.delete(runner, true, true, true).await?;

        // Remove the rollback sibling too, if one exists
        let backup = self.fork(self.name.backup(), None);
        if backup.remote_info(runner).await?.is_some() {
            backup.delete(runner, true, true, true).await?;
        }
        Ok(())
    }
}
