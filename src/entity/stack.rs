// ABOUTME: Compose stack variant of the versioned entity.
// ABOUTME: Sentinel-image history, digest-pinned rollback, manager-gated apply.

use super::sentinel::{SentinelPayload, SentinelStore};
use super::service::manager_probe;
use super::{Entity, EntityError, UpdateOptions};
use crate::diagnostics::Warning;
use crate::docker;
use crate::exec::{HostRunner, Run};
use crate::options::{OptionDef, OptionValue, Overrides, Resolved, Schema, Scope, resolve};
use crate::types::EntityName;
use async_trait::async_trait;
use std::collections::BTreeMap;

fn stack_schema() -> Schema {
    Schema::new(
        vec![
            OptionDef::new("compose-file").aliases(&["config-filename"]),
            OptionDef::new("prune").unsafe_(),
            OptionDef::new("with-registry-auth").unsafe_(),
        ],
        vec![],
    )
}

/// One Compose stack deployment. The orchestrator keeps no previous
/// configuration, so history lives in sentinel images.
pub struct StackEntity {
    name: EntityName,
    configuration: Vec<u8>,
    filename: String,
    overrides: Overrides,
    store: SentinelStore,
}

impl StackEntity {
    pub fn new(name: EntityName, configuration: Vec<u8>, overrides: Overrides) -> Self {
        let store = SentinelStore::stack(name.as_str());
        Self {
            filename: "docker-compose.yml".to_string(),
            name,
            configuration,
            overrides,
            store,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn store(&self) -> &SentinelStore {
        &self.store
    }

    fn resolved(&self) -> Result<Resolved, EntityError> {
        let scope = Scope {
            name: &self.name,
            image: None,
        };
        // The file name always comes from `with_filename`; a configured
        // compose-file (under either spelling) would collide with it
        let overrides = self
            .overrides
            .clone()
            .without_options(&["compose-file", "config-filename"])
            .option("compose-file", OptionValue::str(&self.filename));
        resolve(&stack_schema(), &scope, &overrides)
    }

    fn apply_command(&self) -> Result<String, EntityError> {
        let resolved = self.resolved()?;
        Ok(format!(
            "docker stack deploy {} {}",
            resolved.render(),
            self.name
        ))
    }

    /// Image references the deployed stack is running, from the
    /// orchestrator's own listing: one `name image` pair per line.
    async fn deployed_services(
        &self,
        runner: &HostRunner,
    ) -> Result<Vec<(String, String)>, EntityError> {
        let command = format!(
            "docker stack services --format \"{{{{.Name}}}} {{{{.Image}}}}\" {}",
            self.name
        );
        let output = runner
            .run(Run::command(&command).ignore_errors(true))
            .await?;
        if !output.succeeded() {
            return Ok(vec![]);
        }
        Ok(output
            .text()
            .lines()
            .filter_map(|line| {
                let (name, image) = line.split_once(' ')?;
                Some((name.to_string(), image.to_string()))
            })
            .collect())
    }

    async fn upload(&self, runner: &HostRunner, content: &[u8]) -> Result<(), EntityError> {
        docker::upload_file(runner, &self.filename, content).await
    }

    /// Whether every digest recorded at the last apply still matches a fresh
    /// resolution. Resolution failures leave entries out of the fresh map
    /// and therefore count as changed.
    async fn digests_unchanged(
        &self,
        runner: &HostRunner,
        stored: &BTreeMap<String, String>,
    ) -> bool {
        if stored.is_empty() {
            return true;
        }
        let images: Vec<String> = stored.keys().cloned().collect();
        let fresh = docker::resolve_digests(runner, &images).await;
        stored
            .iter()
            .all(|(image, digest)| fresh.get(image) == Some(digest))
    }

    async fn update_inner(
        &self,
        runner: &HostRunner,
        opts: &UpdateOptions,
    ) -> Result<bool, EntityError> {
        let current = self.store.read_current(runner).await?;

        if !opts.force {
            if let Some(current) = &current {
                if current.configuration == self.configuration
                    && self.digests_unchanged(runner, &current.digests).await
                {
                    tracing::debug!(stack = %self.name, "configuration unchanged");
                    return Ok(false);
                }
            }
        }

        self.upload(runner, &self.configuration).await?;
        let apply = self.apply_command()?;
        runner.run(Run::command(&apply).quiet(false)).await?;

        // The apply succeeded; history bookkeeping failures from here on are
        // warnings, not deployment failures
        if let Err(e) = self.store.rotate(runner).await {
            runner.warn(Warning::cleanup(format!(
                "sentinel rotation for {} failed: {e}",
                self.name
            )));
        }
        let images: Vec<String> = self
            .deployed_services(runner)
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|(_, image)| image)
            .collect();
        let payload = SentinelPayload {
            configuration: self.configuration.clone(),
            digests: docker::resolve_digests(runner, &images).await,
        };
        if let Err(e) = self.store.write_current(runner, &payload, None).await {
            runner.warn(Warning::cleanup(format!(
                "failed to record sentinel for {}: {e}",
                self.name
            )));
        }
        Ok(true)
    }

    async fn revert_inner(&self, runner: &HostRunner) -> Result<bool, EntityError> {
        let backup = self
            .store
            .read_backup(runner)
            .await?
            .ok_or_else(|| EntityError::BackupMissing(self.name.to_string()))?;

        // A failed re-apply must not rotate, or the rollback point is lost
        self.upload(runner, &backup.configuration).await?;
        let apply = self.apply_command()?;
        runner.run(Run::command(&apply).quiet(false)).await?;

        // Re-applying an old manifest with floating tags does not move the
        // running image back; pin each service to its recorded digest
        let images: Vec<String> = backup.digests.keys().cloned().collect();
        let fresh = docker::resolve_digests(runner, &images).await;
        let services = self.deployed_services(runner).await?;
        for (image, digest) in &backup.digests {
            if fresh.get(image) == Some(digest) {
                continue;
            }
            for (service, service_image) in &services {
                if service_image == image {
                    let pin = format!("docker service update --image {digest} {service}");
                    runner.run(Run::command(&pin).quiet(false)).await?;
                }
            }
        }

        if let Err(e) = self.store.rotate_back(runner).await {
            runner.warn(Warning::cleanup(format!(
                "sentinel rotation for {} failed: {e}",
                self.name
            )));
        }
        Ok(true)
    }
}

#[async_trait]
impl Entity for StackEntity {
    fn name(&self) -> &EntityName {
        &self.name
    }

    async fn update(
        &self,
        runner: &HostRunner,
        opts: &UpdateOptions,
    ) -> Result<bool, EntityError> {
        if !manager_probe(runner).await? {
            return Ok(false);
        }
        let key = format!("stack.update.{}", self.name);
        runner
            .context()
            .once(&key, || self.update_inner(runner, opts))
            .await
    }

    async fn revert(&self, runner: &HostRunner) -> Result<(), EntityError> {
        if !manager_probe(runner).await? {
            return Ok(());
        }
        let key = format!("stack.revert.{}", self.name);
        runner
            .context()
            .once(&key, || self.revert_inner(runner))
            .await?;
        Ok(())
    }

    async fn destroy(&self, runner: &HostRunner) -> Result<(), EntityError> {
        if !manager_probe(runner).await? {
            return Ok(());
        }
        let command = format!("docker stack rm {}", self.name);
        runner.run(Run::command(&command).quiet(false)).await?;
        self.store.remove_all(runner).await;
        Ok(())
    }
}
