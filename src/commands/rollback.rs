// ABOUTME: Rollback command: restore the previous version on every host.

use super::{build_entity, fan_out, read_payload, summarize, with_runner};
use crate::config::Config;
use crate::error::Result;
use crate::output::Output;

pub async fn rollback(config: &Config, destination: Option<&str>, output: &Output) -> Result<()> {
    let payload = read_payload(config)?;
    output.progress(&format!(
        "Rolling back {} on {} host(s)",
        config.name,
        config.hosts.len()
    ));

    let reports = fan_out(config, "rollback", destination, |host, context| {
        let config = config.clone();
        let payload = payload.clone();
        async move {
            with_runner(host, context, |runner| async move {
                let entity = build_entity(&config, payload.as_deref())?;
                entity.revert(&runner).await?;
                Ok(())
            })
            .await
        }
    })
    .await?;

    summarize(&reports, output, |_: &()| Some("reverted".to_string()))?;

    output.success(&format!("Rolled back {}", config.name));
    Ok(())
}
