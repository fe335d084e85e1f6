// ABOUTME: Kubernetes entity tests: declarative apply with sentinel history
// ABOUTME: and per-workload digest pinning on revert.

mod support;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use relevo::entity::{Entity, KubeEntity, UpdateOptions};
use relevo::types::EntityName;
use serde_json::json;
use std::collections::BTreeMap;
use support::{not_found, ok, scripted};

const KUBE_PROBE: &str = "kubectl config current-context";
const APPLY: &str = "kubectl apply --filename=kubernetes.yml";
const CURRENT_TAG: &str = "relevo-current-config:web";
const BACKUP_TAG: &str = "relevo-backup-config:web";

const MANIFEST: &[u8] = b"apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  template:
    spec:
      containers:
        - name: app
          image: app:v1
";

fn entity() -> KubeEntity {
    KubeEntity::new(EntityName::new("web").unwrap(), MANIFEST.to_vec())
}

fn sentinel_inspect(configuration: &[u8], digests: &BTreeMap<String, String>) -> String {
    json!([{
        "Id": "sha256:sentinel",
        "Config": {
            "Labels": {
                "relevo.configuration": BASE64.encode(configuration),
                "relevo.digests": BASE64.encode(serde_json::to_vec(digests).unwrap()),
            }
        }
    }])
    .to_string()
}

#[tokio::test]
async fn first_apply_records_a_sentinel() {
    let digests: BTreeMap<String, String> =
        [("app:v1".to_string(), "app@sha256:aaa".to_string())].into();
    let build = format!(
        "echo 'FROM scratch\nLABEL relevo.configuration={} relevo.digests={}\n' | docker build --tag {CURRENT_TAG} -",
        BASE64.encode(MANIFEST),
        BASE64.encode(serde_json::to_vec(&digests).unwrap()),
    );
    let (executor, runner) = scripted(
        "h1",
        "deploy",
        &["h1"],
        vec![
            (KUBE_PROBE.to_string(), ok("production")),
            (
                format!("docker inspect --type image {CURRENT_TAG}"),
                not_found(CURRENT_TAG),
            ),
            (
                format!(
                    "echo {} | base64 --decode > kubernetes.yml",
                    BASE64.encode(MANIFEST)
                ),
                ok(""),
            ),
            (APPLY.to_string(), ok("deployment.apps/web created")),
            (
                format!("docker inspect --type image {CURRENT_TAG}"),
                not_found(CURRENT_TAG),
            ),
            (
                "kubectl get --filename=kubernetes.yml --output jsonpath=\"{..image}\""
                    .to_string(),
                ok("app:v1"),
            ),
            ("docker pull app:v1".to_string(), ok("")),
            (
                "docker inspect --type image --format \"{{index .RepoDigests 0}}\" app:v1"
                    .to_string(),
                ok("app@sha256:aaa"),
            ),
            (build, ok("")),
        ],
    );

    let changed = entity()
        .update(&runner, &UpdateOptions::default())
        .await
        .unwrap();
    assert!(changed);
    executor.assert_exhausted();
}

#[tokio::test]
async fn host_without_kubectl_context_stays_inert() {
    let (executor, runner) = scripted(
        "h1",
        "deploy",
        &["h1", "h2"],
        vec![(
            KUBE_PROBE.to_string(),
            support::fail(1, "error: current-context is not set"),
        )],
    );

    let changed = entity()
        .update(&runner, &UpdateOptions::default())
        .await
        .unwrap();
    assert!(!changed);
    executor.assert_exhausted();
}

#[tokio::test]
async fn revert_pins_workloads_to_recorded_digests() {
    let digests: BTreeMap<String, String> =
        [("app:v1".to_string(), "app@sha256:old".to_string())].into();
    let (executor, runner) = scripted(
        "h1",
        "rollback",
        &["h1"],
        vec![
            (KUBE_PROBE.to_string(), ok("production")),
            (
                format!("docker inspect --type image {BACKUP_TAG}"),
                ok(&sentinel_inspect(MANIFEST, &digests)),
            ),
            (
                format!(
                    "echo {} | base64 --decode > kubernetes.yml",
                    BASE64.encode(MANIFEST)
                ),
                ok(""),
            ),
            (APPLY.to_string(), ok("deployment.apps/web configured")),
            // The tag moved since that deploy; the re-apply alone is not enough
            ("docker pull app:v1".to_string(), ok("")),
            (
                "docker inspect --type image --format \"{{index .RepoDigests 0}}\" app:v1"
                    .to_string(),
                ok("app@sha256:new"),
            ),
            (
                "kubectl set image deployment/web app=app@sha256:old".to_string(),
                ok(""),
            ),
            (
                format!("docker inspect --type image {CURRENT_TAG}"),
                not_found(CURRENT_TAG),
            ),
            (
                format!("docker inspect --type image {BACKUP_TAG}"),
                ok(&sentinel_inspect(MANIFEST, &digests)),
            ),
            (format!("docker tag sha256:sentinel {CURRENT_TAG}"), ok("")),
        ],
    );

    entity().revert(&runner).await.unwrap();
    executor.assert_exhausted();
}

#[tokio::test]
async fn destroy_deletes_the_configured_objects() {
    let (executor, runner) = scripted(
        "h1",
        "destroy",
        &["h1"],
        vec![
            (KUBE_PROBE.to_string(), ok("production")),
            ("kubectl delete --filename=kubernetes.yml".to_string(), ok("")),
            (
                format!("docker inspect --type image {CURRENT_TAG}"),
                not_found(CURRENT_TAG),
            ),
            (
                format!("docker inspect --type image {BACKUP_TAG}"),
                not_found(BACKUP_TAG),
            ),
        ],
    );

    entity().destroy(&runner).await.unwrap();
    executor.assert_exhausted();
}
