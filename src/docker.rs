// ABOUTME: Remote docker primitives issued through the command facade.
// ABOUTME: Inspect-based lookups with not-found classification, image ops, uploads.

use crate::diagnostics::Warning;
use crate::entity::EntityError;
use crate::exec::{HostRunner, Run};
use crate::types::ImageRef;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::collections::BTreeMap;

/// Remote object kinds accepted by `docker inspect --type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectKind {
    Container,
    Image,
    Service,
}

impl InspectKind {
    fn as_str(self) -> &'static str {
        match self {
            InspectKind::Container => "container",
            InspectKind::Image => "image",
            InspectKind::Service => "service",
        }
    }
}

/// Whether a failed command reported a missing remote object.
///
/// This is the single place where the docker CLI's wording is interpreted;
/// callers branch on `Option`/`EntityError`, never on message text.
fn reported_not_found(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    stderr.contains("no such") || stderr.contains("not found")
}

fn classify(
    output: crate::exec::RunOutput,
    what: &str,
) -> Result<Option<crate::exec::RunOutput>, EntityError> {
    if output.succeeded() {
        Ok(Some(output))
    } else if reported_not_found(&output.stderr) {
        tracing::debug!(%what, "not found");
        Ok(None)
    } else {
        Err(EntityError::Remote(format!(
            "{what}: {}",
            output.stderr.trim_end()
        )))
    }
}

/// Structured inspect output for one remote object, `None` when absent.
pub async fn inspect(
    runner: &HostRunner,
    kind: InspectKind,
    name: &str,
) -> Result<Option<serde_json::Value>, EntityError> {
    let command = format!("docker inspect --type {} {}", kind.as_str(), name);
    let output = runner
        .run(Run::command(&command).ignore_errors(true))
        .await?;

    let Some(output) = classify(output, name)? else {
        return Ok(None);
    };

    let parsed: Vec<serde_json::Value> = serde_json::from_str(output.text())
        .map_err(|e| EntityError::Remote(format!("unparseable inspect output for {name}: {e}")))?;
    Ok(parsed.into_iter().next())
}

/// Resolved image id (`sha256:...`) of a local image, `None` when not pulled.
pub async fn image_id(runner: &HostRunner, image: &ImageRef) -> Result<Option<String>, EntityError> {
    inspect_format(runner, "{{.Id}}", &image.to_string()).await
}

/// First repo digest of a local image, `None` when the image is absent or
/// was never pulled from a registry.
pub async fn image_digest(
    runner: &HostRunner,
    image: &ImageRef,
) -> Result<Option<String>, EntityError> {
    match inspect_format(runner, "{{index .RepoDigests 0}}", &image.to_string()).await {
        Ok(Some(digest)) if !digest.is_empty() => Ok(Some(digest)),
        Ok(_) => Ok(None),
        // A locally built image has no repo digest; the format index fails
        Err(_) => Ok(None),
    }
}

async fn inspect_format(
    runner: &HostRunner,
    format: &str,
    name: &str,
) -> Result<Option<String>, EntityError> {
    let command = format!("docker inspect --type image --format \"{format}\" {name}");
    let output = runner
        .run(Run::command(&command).ignore_errors(true).use_cache(true))
        .await?;
    Ok(classify(output, name)?.map(|o| o.text().to_string()))
}

pub async fn pull_image(runner: &HostRunner, image: &ImageRef) -> Result<(), EntityError> {
    let command = format!("docker pull {image}");
    runner.run(Run::command(&command).quiet(false)).await?;
    Ok(())
}

/// Best-effort image removal. A missing image is fine; any other failure
/// lands on the host report as a cleanup warning.
pub async fn remove_image(runner: &HostRunner, image: &str) {
    let command = format!("docker rmi {image}");
    match runner.run(Run::command(&command).ignore_errors(true)).await {
        Ok(output) if output.succeeded() || reported_not_found(&output.stderr) => {}
        Ok(output) => runner.warn(Warning::cleanup(format!(
            "failed to remove image {image}: {}",
            output.stderr.trim_end()
        ))),
        Err(e) => runner.warn(Warning::cleanup(format!(
            "failed to remove image {image}: {e}"
        ))),
    }
}

/// Resolve registry digests for a set of image references, tolerantly.
///
/// Each reference is pulled (failures ignored) so its repo digest is known
/// locally, then digests are read with one batched inspect. References that
/// cannot be resolved are simply absent from the returned map.
pub async fn resolve_digests(
    runner: &HostRunner,
    images: &[String],
) -> BTreeMap<String, String> {
    let mut digests = BTreeMap::new();
    if images.is_empty() {
        return digests;
    }

    for image in images {
        let command = format!("docker pull {image}");
        let _ = runner
            .run(Run::command(&command).ignore_errors(true).use_cache(true))
            .await;
    }

    let command = format!(
        "docker inspect --type image --format \"{{{{index .RepoDigests 0}}}}\" {}",
        images.join(" ")
    );
    let batch = runner
        .run(Run::command(&command).ignore_errors(true).use_cache(true))
        .await;

    if let Ok(output) = batch {
        if output.succeeded() {
            let lines: Vec<&str> = output.text().lines().collect();
            if lines.len() == images.len() {
                for (image, digest) in images.iter().zip(lines) {
                    if !digest.is_empty() {
                        digests.insert(image.clone(), digest.to_string());
                    }
                }
                return digests;
            }
        }
    }

    // Batch output was short (some reference failed); fall back per image
    for image in images {
        if let Ok(reference) = ImageRef::parse(image) {
            if let Ok(Some(digest)) = image_digest(runner, &reference).await {
                digests.insert(image.clone(), digest);
            }
        }
    }
    digests
}

/// Upload a document to the target host through the shell.
pub async fn upload_file(
    runner: &HostRunner,
    remote_path: &str,
    content: &[u8],
) -> Result<(), EntityError> {
    let encoded = BASE64.encode(content);
    let command = format!("echo {encoded} | base64 --decode > {remote_path}");
    runner.run(Run::command(&command)).await?;
    Ok(())
}

/// Remove dangling volumes left behind by deleted containers. Best-effort;
/// a failed sweep becomes a cleanup warning.
pub async fn sweep_dangling_volumes(runner: &HostRunner) {
    let command = "for volume in $(docker volume ls --filter \"dangling=true\" --quiet); do docker volume rm \"$volume\"; done";
    match runner.run(Run::command(command).ignore_errors(true)).await {
        Ok(output) if output.succeeded() => {}
        Ok(output) => runner.warn(Warning::cleanup(format!(
            "dangling volume sweep failed: {}",
            output.stderr.trim_end()
        ))),
        Err(e) => runner.warn(Warning::cleanup(format!(
            "dangling volume sweep failed: {e}"
        ))),
    }
}
