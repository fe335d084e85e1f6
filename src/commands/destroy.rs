// ABOUTME: Destroy command: tear down the entity and its rollback state.
// ABOUTME: Prompts for confirmation unless --yes is given.

use super::{build_entity, fan_out, read_payload, summarize, with_runner};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::output::Output;
use std::io::{BufRead, Write};

pub async fn destroy(
    config: &Config,
    destination: Option<&str>,
    yes: bool,
    output: &Output,
) -> Result<()> {
    if !yes && !confirm(&config.name.to_string())? {
        output.progress("Aborted.");
        return Ok(());
    }

    let payload = read_payload(config)?;
    output.progress(&format!(
        "Destroying {} on {} host(s)",
        config.name,
        config.hosts.len()
    ));

    let reports = fan_out(config, "destroy", destination, |host, context| {
        let config = config.clone();
        let payload = payload.clone();
        async move {
            with_runner(host, context, |runner| async move {
                let entity = build_entity(&config, payload.as_deref())?;
                entity.destroy(&runner).await?;
                Ok(())
            })
            .await
        }
    })
    .await?;

    summarize(&reports, output, |_: &()| Some("destroyed".to_string()))?;

    output.success(&format!("Destroyed {}", config.name));
    Ok(())
}

fn confirm(name: &str) -> Result<bool> {
    print!("Destroy {name} and its rollback state? [y/N] ");
    std::io::stdout().flush().map_err(Error::Io)?;

    let mut answer = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut answer)
        .map_err(Error::Io)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
