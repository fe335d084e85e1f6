// ABOUTME: Swarm service variant of the versioned entity.
// ABOUTME: Fingerprint-gated differential updates and manager-gated mutation.

use super::{Entity, EntityError, UpdateOptions};
use crate::docker;
use crate::exec::{HostRunner, Run};
use crate::options::{
    AttributeDef, OptionDef, OptionValue, Overrides, PathSeg, RemovableDef, Resolved, Schema,
    Scope, diff, resolve, shell_quote,
};
use crate::types::{EntityName, ImageRef};
use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

/// Label under which the configuration fingerprint travels with the spec.
pub const CONFIGURATION_LABEL: &str = "relevo.configuration";

const ENV_PATH: &[PathSeg] = &[
    PathSeg::Key("Spec"),
    PathSeg::Key("TaskTemplate"),
    PathSeg::Key("ContainerSpec"),
    PathSeg::Key("Env"),
    PathSeg::Any,
];

const PORTS_PATH: &[PathSeg] = &[
    PathSeg::Key("Spec"),
    PathSeg::Key("EndpointSpec"),
    PathSeg::Key("Ports"),
    PathSeg::Any,
];

const MOUNTS_PATH: &[PathSeg] = &[
    PathSeg::Key("Spec"),
    PathSeg::Key("TaskTemplate"),
    PathSeg::Key("ContainerSpec"),
    PathSeg::Key("Mounts"),
    PathSeg::Any,
];

const LABELS_PATH: &[PathSeg] = &[PathSeg::Key("Spec"), PathSeg::Key("Labels")];

const CONSTRAINTS_PATH: &[PathSeg] = &[
    PathSeg::Key("Spec"),
    PathSeg::Key("TaskTemplate"),
    PathSeg::Key("Placement"),
    PathSeg::Key("Constraints"),
    PathSeg::Any,
];

/// Bare key of a `K=V` entry, for env/label removals.
fn entry_key(entry: &str) -> Vec<String> {
    vec![entry.split('=').next().unwrap_or(entry).to_string()]
}

/// Target ports of a publish entry, enumerating ranges.
///
/// `8080:80/tcp` reduces to `80`; `8000-8002:9000-9002` enumerates
/// `9000 9001 9002`. The target side is the part after the last colon,
/// before any protocol suffix.
fn port_targets(entry: &str) -> Vec<String> {
    let without_protocol = entry.split('/').next().unwrap_or(entry);
    let target = without_protocol
        .rsplit(':')
        .next()
        .unwrap_or(without_protocol);

    if let Some((start, end)) = target.split_once('-') {
        if let (Ok(start), Ok(end)) = (start.parse::<u32>(), end.parse::<u32>()) {
            if start <= end {
                return (start..=end).map(|p| p.to_string()).collect();
            }
        }
    }
    vec![target.to_string()]
}

/// A live port node reduced to its bare target port.
fn live_port(node: &serde_json::Value) -> Vec<String> {
    match node.get("TargetPort").and_then(|v| v.as_u64()) {
        Some(port) => vec![port.to_string()],
        None => vec![],
    }
}

/// A mount spec canonicalized to its sorted `k=v` list, so the declarative
/// input and the inspect report compare equal.
fn canonical_mount(entry: &str) -> Vec<String> {
    let mut parts: Vec<String> = entry
        .split(',')
        .map(|part| match part.split_once('=') {
            Some((key, value)) => format!("{}={value}", key.to_lowercase()),
            None => part.to_lowercase(),
        })
        .collect();
    parts.sort();
    vec![parts.join(",")]
}

/// Mounts are removed by target path.
fn mount_target(entry: &str) -> Vec<String> {
    entry
        .split(',')
        .filter_map(|part| {
            let (key, value) = part.split_once('=')?;
            matches!(key.to_lowercase().as_str(), "target" | "dst" | "destination")
                .then(|| value.to_string())
        })
        .take(1)
        .collect()
}

/// A live mount node rendered in the same canonical shape.
fn live_mount(node: &serde_json::Value) -> Vec<String> {
    let get = |key: &str| {
        node.get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    };
    let mut parts = Vec::new();
    if let Some(source) = get("Source") {
        parts.push(format!("source={source}"));
    }
    if let Some(target) = get("Target") {
        parts.push(format!("target={target}"));
    }
    if let Some(kind) = get("Type") {
        parts.push(format!("type={kind}"));
    }
    if parts.is_empty() {
        return vec![];
    }
    parts.sort();
    vec![parts.join(",")]
}

/// Label objects fan out to `k=v` entries.
fn live_labels(node: &serde_json::Value) -> Vec<String> {
    match node.as_object() {
        Some(map) => map
            .iter()
            .filter(|(k, _)| *k != CONFIGURATION_LABEL)
            .filter_map(|(k, v)| v.as_str().map(|v| format!("{k}={v}")))
            .collect(),
        None => vec![],
    }
}

fn service_schema() -> Schema {
    Schema::new(
        vec![
            OptionDef::new("name")
                .unsafe_()
                .computed(|scope| Some(OptionValue::str(scope.name.as_str()))),
            OptionDef::new("env").removable(
                RemovableDef::new(ENV_PATH).remove_identity(entry_key),
            ),
            OptionDef::new("publish").aliases(&["ports"]).removable(
                RemovableDef::new(PORTS_PATH)
                    .add_identity(port_targets)
                    .remove_identity(port_targets)
                    .live_entries(live_port),
            ),
            OptionDef::new("mount").aliases(&["volumes"]).removable(
                RemovableDef::new(MOUNTS_PATH)
                    .add_identity(canonical_mount)
                    .remove_identity(mount_target)
                    .live_entries(live_mount),
            ),
            OptionDef::new("label").removable(
                RemovableDef::new(LABELS_PATH)
                    .remove_identity(entry_key)
                    .live_entries(live_labels),
            ),
            OptionDef::new("constraint").removable(RemovableDef::new(CONSTRAINTS_PATH)),
            OptionDef::new("replicas").unsafe_(),
            OptionDef::new("user"),
        ],
        vec![AttributeDef::new("command")],
    )
}

/// One Swarm service. The cluster itself keeps the previous spec, so revert
/// delegates to the orchestrator's rollback rather than a backup-named
/// sibling.
pub struct ServiceEntity {
    name: EntityName,
    image: ImageRef,
    overrides: Overrides,
    remote_info: Mutex<Option<Option<serde_json::Value>>>,
}

impl ServiceEntity {
    pub fn new(name: EntityName, image: ImageRef, overrides: Overrides) -> Self {
        Self {
            name,
            image,
            overrides,
            remote_info: Mutex::new(None),
        }
    }

    fn resolved(&self, image: &ImageRef) -> Result<Resolved, EntityError> {
        let scope = Scope {
            name: &self.name,
            image: Some(image),
        };
        resolve(&service_schema(), &scope, &self.overrides)
    }

    pub async fn remote_info(
        &self,
        runner: &HostRunner,
    ) -> Result<Option<serde_json::Value>, EntityError> {
        if let Some(cached) = self.remote_info.lock().clone() {
            return Ok(cached);
        }
        let info =
            docker::inspect(runner, docker::InspectKind::Service, self.name.as_str()).await?;
        *self.remote_info.lock() = Some(info.clone());
        Ok(info)
    }

    pub fn invalidate(&self) {
        *self.remote_info.lock() = None;
    }

    /// Whether this host is the elected manager. Non-managers are inert;
    /// the last host to report with no manager anywhere fails the election.
    pub async fn is_manager(&self, runner: &HostRunner) -> Result<bool, EntityError> {
        manager_probe(runner).await
    }

    /// Lowercase hex fingerprint of the safe option set plus the resolved
    /// image reference.
    pub fn fingerprint(resolved: &Resolved, image: &str) -> String {
        let payload = serde_json::json!({
            "image": image,
            "options": resolved.safe_options(),
        });
        let mut hasher = Sha256::new();
        hasher.update(payload.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    async fn update_inner(
        &self,
        runner: &HostRunner,
        opts: &UpdateOptions,
    ) -> Result<bool, EntityError> {
        let image = self.image.with_overrides(
            opts.tag.as_deref(),
            opts.registry.as_deref(),
            opts.account.as_deref(),
        );
        let resolved = self.resolved(&image)?;

        // Pin to the registry digest when one is known, so every node runs
        // the identical image even behind a floating tag
        let pinned = docker::image_digest(runner, &image)
            .await?
            .unwrap_or_else(|| image.to_string());
        let fingerprint = Self::fingerprint(&resolved, &pinned);

        let info = self.remote_info(runner).await?;
        let stored = info
            .as_ref()
            .and_then(|i| i.pointer("/Spec/Labels"))
            .and_then(|labels| labels.get(CONFIGURATION_LABEL))
            .and_then(|v| v.as_str());

        if !opts.force && stored == Some(fingerprint.as_str()) {
            tracing::debug!(service = %self.name, "configuration unchanged");
            return Ok(false);
        }

        match info {
            None => {
                let mut command = format!(
                    "docker service create {} --label {CONFIGURATION_LABEL}={fingerprint} {pinned}",
                    resolved.render()
                );
                if let Some(cmd) = resolved.attribute("command") {
                    command.push(' ');
                    command.push_str(&cmd.to_string());
                }
                runner.run(Run::command(&command).quiet(false)).await?;
            }
            Some(info) => {
                let command = self.update_command(&resolved, &info, &fingerprint, &pinned);
                runner.run(Run::command(&command).quiet(false)).await?;
            }
        }
        self.invalidate();
        Ok(true)
    }

    /// Build the differential `docker service update` invocation. The
    /// fingerprint label rides on the same command as the mutation, so a
    /// concurrent failure cannot record a spec it never applied.
    fn update_command(
        &self,
        resolved: &Resolved,
        info: &serde_json::Value,
        fingerprint: &str,
        pinned: &str,
    ) -> String {
        let mut parts = Vec::new();
        for option in resolved.options() {
            if option.name == "name" {
                continue;
            }
            match &option.removable {
                Some(def) => {
                    let desired = option.value.entries();
                    let live = def.collect_live(info);
                    let changes = diff(&desired, &live, def);
                    for value in &changes.add {
                        parts.push(format!("--{}-add {}", option.flag, shell_quote(value)));
                    }
                    for id in &changes.remove {
                        parts.push(format!("--{}-rm {}", option.flag, shell_quote(id)));
                    }
                }
                None => option.value.render(&option.flag, &mut parts),
            }
        }
        parts.push(format!("--label-add {CONFIGURATION_LABEL}={fingerprint}"));
        parts.push(format!("--image {pinned}"));
        format!("docker service update {} {}", parts.join(" "), self.name)
    }

    async fn revert_inner(&self, runner: &HostRunner) -> Result<bool, EntityError> {
        self.invalidate();
        let info = self
            .remote_info(runner)
            .await?
            .ok_or_else(|| EntityError::BackupMissing(self.name.to_string()))?;

        // Swarm's own deployment history is the backup version
        if info.get("PreviousSpec").is_none() {
            return Err(EntityError::BackupMissing(self.name.to_string()));
        }

        let command = format!("docker service update --rollback {}", self.name);
        runner.run(Run::command(&command).quiet(false)).await?;
        self.invalidate();
        Ok(true)
    }
}

/// Probe whether this host is a Swarm manager, memoizing the verdict in the
/// invocation's election state.
pub async fn manager_probe(runner: &HostRunner) -> Result<bool, EntityError> {
    let election = runner.context().election();
    if let Some(verdict) = election.verdict(runner.target()) {
        return Ok(verdict);
    }

    let command = "docker info --format \"{{.Swarm.ControlAvailable}}\"";
    let probe = runner
        .run(Run::command(command).ignore_errors(true).use_cache(true))
        .await;
    let is_manager = match probe {
        Ok(output) => output.succeeded() && output.text() == "true",
        // Unreachable host: counts as a non-manager verdict
        Err(_) => false,
    };
    election.record(runner.target(), is_manager)
}

#[async_trait]
impl Entity for ServiceEntity {
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
        let key = format!("service.update.{}", self.name);
        runner
            .context()
            .once(&key, || self.update_inner(runner, opts))
            .await
    }

    async fn revert(&self, runner: &HostRunner) -> Result<(), EntityError> {
        if !self.is_manager(runner).await? {
            return Ok(());
        }
        let key = format!("service.revert.{}", self.name);
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
        let command = format!("docker service rm {}", self.name);
        runner.run(Run::command(&command).quiet(false)).await?;
        self.invalidate();
        Ok(())
    }
}
