// ABOUTME: Compose stack entity tests: sentinel history, skip rule, and
// ABOUTME: digest-pinned rollback against a scripted executor.

mod support;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use relevo::entity::{Entity, EntityError, SentinelPayload, SentinelStore, StackEntity, UpdateOptions};
use relevo::options::{OptionValue, Overrides};
use relevo::types::EntityName;
use serde_json::json;
use std::collections::BTreeMap;
use support::{not_found, ok, scripted};

const MANAGER_PROBE: &str = "docker info --format \"{{.Swarm.ControlAvailable}}\"";
const COMPOSE: &[u8] = b"services:\n  app:\n    image: nginx:1.25\n";
const APPLY: &str = "docker stack deploy --compose-file docker-compose.yml web";
const LIST_SERVICES: &str = "docker stack services --format \"{{.Name}} {{.Image}}\" web";
const CURRENT_TAG: &str = "relevo-current-stack:web";
const BACKUP_TAG: &str = "relevo-backup-stack:web";

fn entity(configuration: &[u8]) -> StackEntity {
    StackEntity::new(
        EntityName::new("web").unwrap(),
        configuration.to_vec(),
        Overrides::default(),
    )
}

fn digests_b64(digests: &BTreeMap<String, String>) -> String {
    BASE64.encode(serde_json::to_vec(digests).unwrap())
}

fn sentinel_inspect(configuration: &[u8], digests: &BTreeMap<String, String>) -> String {
    json!([{
        "Id": "sha256:sentinel",
        "Config": {
            "Labels": {
                "relevo.configuration": BASE64.encode(configuration),
                "relevo.digests": digests_b64(digests),
            }
        }
    }])
    .to_string()
}

#[tokio::test]
async fn first_deploy_applies_and_records_a_sentinel() {
    let digests: BTreeMap<String, String> = [(
        "nginx:1.25".to_string(),
        "nginx@sha256:d1g".to_string(),
    )]
    .into();
    let build = format!(
        "echo 'FROM scratch\nLABEL relevo.configuration={} relevo.digests={}\n' | docker build --tag {CURRENT_TAG} -",
        BASE64.encode(COMPOSE),
        digests_b64(&digests),
    );
    let (executor, runner) = scripted(
        "h1",
        "deploy",
        &["h1"],
        vec![
            (MANAGER_PROBE.to_string(), ok("true")),
            (
                format!("docker inspect --type image {CURRENT_TAG}"),
                not_found(CURRENT_TAG),
            ),
            (
                format!(
                    "echo {} | base64 --decode > docker-compose.yml",
                    BASE64.encode(COMPOSE)
                ),
                ok(""),
            ),
            (APPLY.to_string(), ok("Creating service web_app")),
            // No current sentinel yet: rotation is a no-op
            (
                format!("docker inspect --type image {CURRENT_TAG}"),
                not_found(CURRENT_TAG),
            ),
            (LIST_SERVICES.to_string(), ok("web_app nginx:1.25")),
            ("docker pull nginx:1.25".to_string(), ok("")),
            (
                "docker inspect --type image --format \"{{index .RepoDigests 0}}\" nginx:1.25"
                    .to_string(),
                ok("nginx@sha256:d1g"),
            ),
            (build, ok("sha256:newsentinel")),
        ],
    );

    let changed = entity(COMPOSE)
        .update(&runner, &UpdateOptions::default())
        .await
        .unwrap();
    assert!(changed);
    executor.assert_exhausted();
}

#[tokio::test]
async fn unchanged_configuration_and_digests_skip_the_apply() {
    let digests: BTreeMap<String, String> = [(
        "nginx:1.25".to_string(),
        "nginx@sha256:d1g".to_string(),
    )]
    .into();
    let (executor, runner) = scripted(
        "h1",
        "deploy",
        &["h1"],
        vec![
            (MANAGER_PROBE.to_string(), ok("true")),
            (
                format!("docker inspect --type image {CURRENT_TAG}"),
                ok(&sentinel_inspect(COMPOSE, &digests)),
            ),
            ("docker pull nginx:1.25".to_string(), ok("")),
            (
                "docker inspect --type image --format \"{{index .RepoDigests 0}}\" nginx:1.25"
                    .to_string(),
                ok("nginx@sha256:d1g"),
            ),
        ],
    );

    let changed = entity(COMPOSE)
        .update(&runner, &UpdateOptions::default())
        .await
        .unwrap();
    assert!(!changed);
    executor.assert_exhausted();
}

#[tokio::test]
async fn moved_digest_triggers_a_redeploy_even_with_same_file() {
    let digests: BTreeMap<String, String> = [(
        "nginx:1.25".to_string(),
        "nginx@sha256:old".to_string(),
    )]
    .into();
    let fresh_digests: BTreeMap<String, String> = [(
        "nginx:1.25".to_string(),
        "nginx@sha256:new".to_string(),
    )]
    .into();
    let build = format!(
        "echo 'FROM scratch\nLABEL relevo.configuration={} relevo.digests={}\n' | docker build --tag {CURRENT_TAG} -",
        BASE64.encode(COMPOSE),
        digests_b64(&fresh_digests),
    );
    let (executor, runner) = scripted(
        "h1",
        "deploy",
        &["h1"],
        vec![
            (MANAGER_PROBE.to_string(), ok("true")),
            (
                format!("docker inspect --type image {CURRENT_TAG}"),
                ok(&sentinel_inspect(COMPOSE, &digests)),
            ),
            // The tag now resolves elsewhere, so the stored digest is stale
            ("docker pull nginx:1.25".to_string(), ok("")),
            (
                "docker inspect --type image --format \"{{index .RepoDigests 0}}\" nginx:1.25"
                    .to_string(),
                ok("nginx@sha256:new"),
            ),
            (
                format!(
                    "echo {} | base64 --decode > docker-compose.yml",
                    BASE64.encode(COMPOSE)
                ),
                ok(""),
            ),
            (APPLY.to_string(), ok("Updating service web_app")),
            // Rotate: promote the current sentinel to backup
            (
                format!("docker inspect --type image {CURRENT_TAG}"),
                ok(&sentinel_inspect(COMPOSE, &digests)),
            ),
            (
                format!("docker inspect --type image {BACKUP_TAG}"),
                not_found(BACKUP_TAG),
            ),
            (format!("docker tag sha256:sentinel {BACKUP_TAG}"), ok("")),
            (format!("docker rmi {CURRENT_TAG}"), ok("")),
            (LIST_SERVICES.to_string(), ok("web_app nginx:1.25")),
            (build, ok("")),
        ],
    );

    let changed = entity(COMPOSE)
        .update(&runner, &UpdateOptions::default())
        .await
        .unwrap();
    assert!(changed);
    executor.assert_exhausted();
}

#[tokio::test]
async fn revert_without_backup_sentinel_fails() {
    let (executor, runner) = scripted(
        "h1",
        "rollback",
        &["h1"],
        vec![
            (MANAGER_PROBE.to_string(), ok("true")),
            (
                format!("docker inspect --type image {BACKUP_TAG}"),
                not_found(BACKUP_TAG),
            ),
        ],
    );

    let err = entity(COMPOSE).revert(&runner).await.unwrap_err();
    assert!(matches!(err, EntityError::BackupMissing(_)));
    executor.assert_exhausted();
}

#[tokio::test]
async fn revert_reapplies_backup_and_pins_moved_digests() {
    let old_compose: &[u8] = b"services:\n  app:\n    image: nginx:1.24\n";
    let digests: BTreeMap<String, String> = [(
        "nginx:1.24".to_string(),
        "nginx@sha256:old".to_string(),
    )]
    .into();
    let (executor, runner) = scripted(
        "h1",
        "rollback",
        &["h1"],
        vec![
            (MANAGER_PROBE.to_string(), ok("true")),
            (
                format!("docker inspect --type image {BACKUP_TAG}"),
                ok(&sentinel_inspect(old_compose, &digests)),
            ),
            (
                format!(
                    "echo {} | base64 --decode > docker-compose.yml",
                    BASE64.encode(old_compose)
                ),
                ok(""),
            ),
            (APPLY.to_string(), ok("Updating service web_app")),
            // The tag has moved on since that deploy; pin the service back
            ("docker pull nginx:1.24".to_string(), ok("")),
            (
                "docker inspect --type image --format \"{{index .RepoDigests 0}}\" nginx:1.24"
                    .to_string(),
                ok("nginx@sha256:new"),
            ),
            (LIST_SERVICES.to_string(), ok("web_app nginx:1.24")),
            (
                "docker service update --image nginx@sha256:old web_app".to_string(),
                ok(""),
            ),
            // Swap the sentinel roles back
            (
                format!("docker inspect --type image {CURRENT_TAG}"),
                not_found(CURRENT_TAG),
            ),
            (
                format!("docker inspect --type image {BACKUP_TAG}"),
                ok(&sentinel_inspect(old_compose, &digests)),
            ),
            (format!("docker tag sha256:sentinel {CURRENT_TAG}"), ok("")),
        ],
    );

    entity(COMPOSE).revert(&runner).await.unwrap();
    executor.assert_exhausted();
}

#[tokio::test]
async fn configured_filename_option_defers_to_the_config_file() {
    let digests: BTreeMap<String, String> = [(
        "nginx:1.25".to_string(),
        "nginx@sha256:d1g".to_string(),
    )]
    .into();
    let build = format!(
        "echo 'FROM scratch\nLABEL relevo.configuration={} relevo.digests={}\n' | docker build --tag {CURRENT_TAG} -",
        BASE64.encode(COMPOSE),
        digests_b64(&digests),
    );
    let (executor, runner) = scripted(
        "h1",
        "deploy",
        &["h1"],
        vec![
            (MANAGER_PROBE.to_string(), ok("true")),
            (
                format!("docker inspect --type image {CURRENT_TAG}"),
                not_found(CURRENT_TAG),
            ),
            (
                format!(
                    "echo {} | base64 --decode > docker-compose.yml",
                    BASE64.encode(COMPOSE)
                ),
                ok(""),
            ),
            (APPLY.to_string(), ok("Creating service web_app")),
            (
                format!("docker inspect --type image {CURRENT_TAG}"),
                not_found(CURRENT_TAG),
            ),
            (LIST_SERVICES.to_string(), ok("web_app nginx:1.25")),
            ("docker pull nginx:1.25".to_string(), ok("")),
            (
                "docker inspect --type image --format \"{{index .RepoDigests 0}}\" nginx:1.25"
                    .to_string(),
                ok("nginx@sha256:d1g"),
            ),
            (build, ok("sha256:newsentinel")),
        ],
    );

    let overrides =
        Overrides::default().option("config-filename", OptionValue::str("legacy.yml"));
    let entity = StackEntity::new(
        EntityName::new("web").unwrap(),
        COMPOSE.to_vec(),
        overrides,
    );
    let changed = entity
        .update(&runner, &UpdateOptions::default())
        .await
        .unwrap();
    assert!(changed);
    executor.assert_exhausted();
}

#[tokio::test]
async fn sentinel_labels_round_trip_the_payload() {
    let digests: BTreeMap<String, String> = [(
        "nginx:1.25".to_string(),
        "nginx@sha256:d1g".to_string(),
    )]
    .into();
    let payload = SentinelPayload {
        configuration: COMPOSE.to_vec(),
        digests: digests.clone(),
    };
    let build = format!(
        "echo 'FROM scratch\nLABEL relevo.configuration={} relevo.digests={}\n' | docker build --tag {CURRENT_TAG} -",
        BASE64.encode(COMPOSE),
        digests_b64(&digests),
    );
    let (executor, runner) = scripted(
        "h1",
        "deploy",
        &["h1"],
        vec![
            (build, ok("sha256:sentinel")),
            (
                format!("docker inspect --type image {CURRENT_TAG}"),
                ok(&sentinel_inspect(COMPOSE, &digests)),
            ),
        ],
    );

    let store = SentinelStore::stack("web");
    store.write_current(&runner, &payload, None).await.unwrap();
    let read = store.read_current(&runner).await.unwrap().unwrap();
    assert_eq!(read, payload);
    executor.assert_exhausted();
}

#[tokio::test]
async fn destroy_removes_stack_and_sentinels() {
    let (executor, runner) = scripted(
        "h1",
        "destroy",
        &["h1"],
        vec![
            (MANAGER_PROBE.to_string(), ok("true")),
            ("docker stack rm web".to_string(), ok("")),
            (
                format!("docker inspect --type image {CURRENT_TAG}"),
                ok(&sentinel_inspect(COMPOSE, &BTreeMap::new())),
            ),
            (format!("docker rmi {CURRENT_TAG}"), ok("")),
            ("docker rmi sha256:sentinel".to_string(), ok("")),
            (
                format!("docker inspect --type image {BACKUP_TAG}"),
                not_found(BACKUP_TAG),
            ),
        ],
    );

    entity(COMPOSE).destroy(&runner).await.unwrap();
    executor.assert_exhausted();
}
