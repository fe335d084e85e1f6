// ABOUTME: Kubernetes configuration variant of the versioned entity.
// ABOUTME: Declarative apply with sentinel history and per-workload digest pinning.

use super::sentinel::{SentinelPayload, SentinelStore};
use super::{Entity, EntityError, UpdateOptions};
use crate::diagnostics::Warning;
use crate::docker;
use crate::exec::{HostRunner, Run};
use crate::types::EntityName;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

/// One workload parsed out of a manifest, with its pod containers.
#[derive(Debug, PartialEq)]
struct Workload {
    kind: String,
    name: String,
    containers: Vec<(String, String)>, // (container name, image reference)
}

/// Extract workloads carrying pod templates from a multi-document manifest.
/// Documents that do not parse or carry no containers are skipped.
fn parse_workloads(manifest: &[u8]) -> Vec<Workload> {
    let text = String::from_utf8_lossy(manifest);
    let mut workloads = Vec::new();

    for document in serde_yaml::Deserializer::from_str(&text) {
        let Ok(doc) = serde_yaml::Value::deserialize(document) else {
            continue;
        };
        let Some(kind) = doc.get("kind").and_then(|v| v.as_str()) else {
            continue;
        };
        let Some(name) = doc
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(|v| v.as_str())
        else {
            continue;
        };

        let containers = doc
            .get("spec")
            .and_then(|s| s.get("template"))
            .and_then(|t| t.get("spec"))
            .and_then(|s| s.get("containers"))
            .and_then(|c| c.as_sequence());
        let Some(containers) = containers else {
            continue;
        };

        let containers: Vec<(String, String)> = containers
            .iter()
            .filter_map(|c| {
                let name = c.get("name")?.as_str()?;
                let image = c.get("image")?.as_str()?;
                Some((name.to_string(), image.to_string()))
            })
            .collect();
        if containers.is_empty() {
            continue;
        }

        workloads.push(Workload {
            kind: kind.to_lowercase(),
            name: name.to_string(),
            containers,
        });
    }
    workloads
}

/// One Kubernetes configuration applied declaratively from a manifest file.
pub struct KubeEntity {
    name: EntityName,
    configuration: Vec<u8>,
    filename: String,
    store: SentinelStore,
}

impl KubeEntity {
    pub fn new(name: EntityName, configuration: Vec<u8>) -> Self {
        let store = SentinelStore::kubernetes(name.as_str());
        Self {
            filename: "kubernetes.yml".to_string(),
            name,
            configuration,
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

    /// Whether this host can drive the cluster: it is the one with a
    /// working kubectl context.
    async fn is_manager(&self, runner: &HostRunner) -> Result<bool, EntityError> {
        let election = runner.context().election();
        if let Some(verdict) = election.verdict(runner.target()) {
            return Ok(verdict);
        }

        let probe = runner
            .run(
                Run::command("kubectl config current-context")
                    .ignore_errors(true)
                    .use_cache(true),
            )
            .await;
        let is_manager = match probe {
            Ok(output) => output.succeeded(),
            Err(_) => false,
        };
        election.record(runner.target(), is_manager)
    }

    async fn upload(&self, runner: &HostRunner, content: &[u8]) -> Result<(), EntityError> {
        docker::upload_file(runner, &self.filename, content).await
    }

    fn apply_command(&self) -> String {
        format!("kubectl apply --filename={}", self.filename)
    }

    /// Image references of the configured workload, from the orchestrator's
    /// own template output.
    async fn referenced_images(&self, runner: &HostRunner) -> Result<Vec<String>, EntityError> {
        let command = format!(
            "kubectl get --filename={} --output jsonpath=\"{{..image}}\"",
            self.filename
        );
        let output = runner
            .run(Run::command(&command).ignore_errors(true))
            .await?;
        if !output.succeeded() {
            return Ok(vec![]);
        }
        let mut images = Vec::new();
        for image in output.text().split_whitespace() {
            if !images.iter().any(|i| i == image) {
                images.push(image.to_string());
            }
        }
        Ok(images)
    }

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
                    tracing::debug!(configuration = %self.name, "unchanged");
                    return Ok(false);
                }
            }
        }

        self.upload(runner, &self.configuration).await?;
        runner
            .run(Run::command(&self.apply_command()).quiet(false))
            .await?;

        if let Err(e) = self.store.rotate(runner).await {
            runner.warn(Warning::cleanup(format!(
                "sentinel rotation for {} failed: {e}",
                self.name
            )));
        }
        let images = self.referenced_images(runner).await.unwrap_or_default();
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
        runner
            .run(Run::command(&self.apply_command()).quiet(false))
            .await?;

        // Pin workloads whose recorded digest no longer matches what the
        // manifest's floating references resolve to
        let images: Vec<String> = backup.digests.keys().cloned().collect();
        let fresh = docker::resolve_digests(runner, &images).await;
        let workloads = parse_workloads(&backup.configuration);
        for (image, digest) in &backup.digests {
            if fresh.get(image) == Some(digest) {
                continue;
            }
            for workload in &workloads {
                for (container, container_image) in &workload.containers {
                    if container_image == image {
                        let pin = format!(
                            "kubectl set image {}/{} {container}={digest}",
                            workload.kind, workload.name
                        );
                        runner.run(Run::command(&pin).quiet(false)).await?;
                    }
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
impl Entity for KubeEntity {
    fn name(&self) -> &EntityName {
        &self.name
    }

    async fn update(
        &self,
        runner: &HostRunner,
        opts: &UpdateOptions,
    ) -> Result<bool, EntityError> {
        if !self.is_manager(runner).await? {
            return Ok(false);
        }
        let key = format!("kube.update.{}", self.name);
        runner
            .context()
            .once(&key, || self.update_inner(runner, opts))
            .await
    }

    async fn revert(&self, runner: &HostRunner) -> Result<(), EntityError> {
        if !self.is_manager(runner).await? {
            return Ok(());
        }
        let key = format!("kube.revert.{}", self.name);
        runner
            .context()
            .once(&key, || self.revert_inner(runner))
            .await?;
        Ok(())
    }

    async fn destroy(&self, runner: &HostRunner) -> Result<(), EntityError> {
        if !self.is_manager(runner).await? {
            return Ok(());
        }
        let command = format!("kubectl delete --filename={}", self.filename);
        runner.run(Run::command(&command).quiet(false)).await?;
        self.store.remove_all(runner).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  template:
    spec:
      containers:
        - name: app
          image: registry.example.com/app:latest
        - name: sidecar
          image: envoy:v1
---
apiVersion: v1
kind: Service
metadata:
  name: web
spec:
  ports:
    - port: 80
"#;

    #[test]
    fn parses_workloads_with_containers() {
        let workloads = parse_workloads(MANIFEST.as_bytes());
        assert_eq!(workloads.len(), 1);
        assert_eq!(workloads[0].kind, "deployment");
        assert_eq!(workloads[0].name, "web");
        assert_eq!(
            workloads[0].containers,
            vec![
                (
                    "app".to_string(),
                    "registry.example.com/app:latest".to_string()
                ),
                ("sidecar".to_string(), "envoy:v1".to_string()),
            ]
        );
    }

    #[test]
    fn documents_without_pod_templates_are_skipped() {
        let workloads = parse_workloads(b"kind: ConfigMap\nmetadata:\n  name: cm\n");
        assert!(workloads.is_empty());
    }
}
