// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates relevo.yml template files.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{EntityName, ImageRef};

use super::{CONFIG_FILENAME, Config};

pub fn init_config(
    dir: &Path,
    name: Option<&str>,
    image: Option<&str>,
    force: bool,
) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let mut config = Config::template();

    if let Some(n) = name {
        config.name = EntityName::new(n).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    }

    if let Some(i) = image {
        config.image =
            Some(ImageRef::parse(i).map_err(|e| Error::InvalidConfig(e.to_string()))?);
    }

    let yaml = generate_template_yaml(&config);
    std::fs::write(&config_path, yaml)?;

    Ok(())
}

fn generate_template_yaml(config: &Config) -> String {
    let first_host = config.hosts.first();
    format!(
        r#"name: {}
# kind: container | service | stack | kubernetes
kind: container
image: {}
hosts:
  - host: {}
    port: {}
    user: {}
    # SSH host key verification: Trust-On-First-Use is enabled by default;
    # set to false to require a pre-populated ~/.ssh/known_hosts
    # trust_first_connection: true
# options:
#   publish:
#     - "80:80"
#   env:
#     - RAILS_ENV=production
"#,
        config.name,
        config
            .image
            .as_ref()
            .map(|i| i.to_string())
            .unwrap_or_default(),
        first_host.host,
        first_host.port,
        first_host.user.as_deref().unwrap_or("deploy")
    )
}
