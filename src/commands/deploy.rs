// ABOUTME: Deploy command: update the entity on every configured host.
// ABOUTME: Pulls images where needed and reports changed/unchanged per host.

use super::{build_entity, fan_out, read_payload, summarize, with_runner};
use crate::config::{Config, EntityKind};
use crate::docker;
use crate::error::Result;
use crate::output::Output;

#[derive(Debug, Clone, Default)]
pub struct DeployArgs {
    pub tag: Option<String>,
    pub registry: Option<String>,
    pub account: Option<String>,
    pub force: bool,
}

pub async fn deploy(
    config: &Config,
    destination: Option<&str>,
    args: &DeployArgs,
    output: &Output,
) -> Result<()> {
    let payload = read_payload(config)?;
    output.progress(&format!(
        "Deploying {} to {} host(s)",
        config.name,
        config.hosts.len()
    ));

    let opts = crate::entity::UpdateOptions {
        tag: args.tag.clone(),
        registry: args.registry.clone(),
        account: args.account.clone(),
        force: args.force,
    };

    let reports = fan_out(config, "deploy", destination, |host, context| {
        let config = config.clone();
        let payload = payload.clone();
        let opts = opts.clone();
        async move {
            with_runner(host, context, |runner| async move {
                let entity = build_entity(&config, payload.as_deref())?;

                // Pre-pull so image identity checks and digest pinning see
                // the target version
                if matches!(config.kind, EntityKind::Container | EntityKind::Service) {
                    if let Some(ref image) = config.image {
                        let image = image.with_overrides(
                            opts.tag.as_deref(),
                            opts.registry.as_deref(),
                            opts.account.as_deref(),
                        );
                        docker::pull_image(&runner, &image).await?;
                    }
                }

                Ok(entity.update(&runner, &opts).await?)
            })
            .await
        }
    })
    .await?;

    for report in &reports {
        if let Ok(false) = report.result {
            output.skipped(&report.host, "configuration already deployed");
        }
    }

    summarize(&reports, output, |changed| {
        changed.then(|| "updated".to_string())
    })?;

    output.success(&format!("Deployed {}", config.name));
    Ok(())
}
