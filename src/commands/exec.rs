// ABOUTME: Exec command: run a one-off command inside the deployed container.

use super::{fan_out, summarize, with_runner};
use crate::config::{Config, EntityKind};
use crate::entity::ContainerEntity;
use crate::error::{Error, Result};
use crate::output::Output;

pub async fn exec(
    config: &Config,
    destination: Option<&str>,
    command: &str,
    output: &Output,
) -> Result<()> {
    if config.kind != EntityKind::Container {
        return Err(Error::InvalidConfig(
            "exec is only available for container entities".to_string(),
        ));
    }

    let reports = fan_out(config, "exec", destination, |host, context| {
        let config = config.clone();
        let command = command.to_string();
        async move {
            with_runner(host, context, |runner| async move {
                let image = config
                    .image
                    .clone()
                    .ok_or_else(|| Error::InvalidConfig("image is required".to_string()))?;
                let entity = ContainerEntity::new(config.name.clone(), image, config.overrides());
                let out = entity.execute(&runner, &command, false).await?;
                Ok(out.text().to_string())
            })
            .await
        }
    })
    .await?;

    summarize(&reports, output, |stdout: &String| {
        (!stdout.is_empty()).then(|| stdout.clone())
    })?;
    Ok(())
}
