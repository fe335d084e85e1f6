// ABOUTME: Configuration types and parsing for relevo.yml.
// ABOUTME: Handles YAML parsing, destination merging, and entity kind selection.

mod host;
mod init;

pub use host::HostConfig;
pub use init::init_config;

use crate::error::{Error, Result};
use crate::options::{OptionValue, Overrides};
use crate::types::{EntityName, ImageRef};
use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

pub const CONFIG_FILENAME: &str = "relevo.yml";
pub const CONFIG_FILENAME_ALT: &str = "relevo.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".relevo/config.yml";

/// Which backend variant an entity deploys through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Container,
    Service,
    Stack,
    Kubernetes,
}

impl Default for EntityKind {
    fn default() -> Self {
        EntityKind::Container
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(deserialize_with = "deserialize_entity_name")]
    pub name: EntityName,

    #[serde(default)]
    pub kind: EntityKind,

    #[serde(default, deserialize_with = "deserialize_image_ref_option")]
    pub image: Option<ImageRef>,

    /// Local compose file or Kubernetes manifest for stack/kubernetes kinds.
    #[serde(default)]
    pub config_file: Option<PathBuf>,

    #[serde(deserialize_with = "deserialize_hosts")]
    pub hosts: NonEmpty<HostConfig>,

    #[serde(default)]
    pub options: BTreeMap<String, OptionValue>,

    #[serde(default)]
    pub attributes: BTreeMap<String, OptionValue>,

    #[serde(default)]
    pub registry: Option<String>,

    #[serde(default)]
    pub account: Option<String>,

    #[serde(default)]
    pub destinations: HashMap<String, Destination>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Destination {
    #[serde(default, deserialize_with = "deserialize_hosts_option")]
    pub hosts: Option<NonEmpty<HostConfig>>,

    #[serde(default)]
    pub options: BTreeMap<String, OptionValue>,

    #[serde(default)]
    pub attributes: BTreeMap<String, OptionValue>,

    #[serde(default)]
    pub tag: Option<String>,

    #[serde(default)]
    pub registry: Option<String>,

    #[serde(default)]
    pub account: Option<String>,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    fn validate(&self) -> Result<()> {
        match self.kind {
            EntityKind::Container | EntityKind::Service => {
                if self.image.is_none() {
                    return Err(Error::InvalidConfig(format!(
                        "kind {:?} requires an image",
                        self.kind
                    )));
                }
            }
            EntityKind::Stack | EntityKind::Kubernetes => {
                if self.config_file.is_none() {
                    return Err(Error::InvalidConfig(format!(
                        "kind {:?} requires a config_file",
                        self.kind
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn for_destination(&self, name: &str) -> Result<Config> {
        let dest = self
            .destinations
            .get(name)
            .ok_or_else(|| Error::UnknownDestination(name.to_string()))?;

        let mut merged = self.clone();

        // Replace hosts if the destination specifies them
        if let Some(ref hosts) = dest.hosts {
            merged.hosts = hosts.clone();
        }

        // Deep merge options and attributes
        for (k, v) in &dest.options {
            merged.options.insert(k.clone(), v.clone());
        }
        for (k, v) in &dest.attributes {
            merged.attributes.insert(k.clone(), v.clone());
        }

        if let Some(ref tag) = dest.tag {
            merged.image = merged
                .image
                .map(|image| image.with_overrides(Some(tag), None, None));
        }
        if dest.registry.is_some() {
            merged.registry = dest.registry.clone();
        }
        if dest.account.is_some() {
            merged.account = dest.account.clone();
        }

        Ok(merged)
    }

    /// The caller-override set for entity construction.
    pub fn overrides(&self) -> Overrides {
        let mut overrides = Overrides::default();
        for (name, value) in &self.options {
            overrides = overrides.option(name, value.clone());
        }
        for (name, value) in &self.attributes {
            overrides = overrides.attribute(name, value.clone());
        }
        overrides
    }

    /// Host identifiers for the invocation identity.
    pub fn host_names(&self) -> Vec<String> {
        self.hosts.iter().map(|h| h.host.clone()).collect()
    }

    pub fn template() -> Self {
        Config {
            name: EntityName::new("my-app").unwrap(),
            kind: EntityKind::Container,
            image: Some(ImageRef::parse("my-registry/my-app:latest").unwrap()),
            config_file: None,
            hosts: NonEmpty::new(HostConfig {
                host: "server.example.com".to_string(),
                port: 22,
                user: Some("deploy".to_string()),
                key_path: None,
                sudo: false,
                trust_first_connection: true,
                command_timeout: std::time::Duration::from_secs(300),
            }),
            options: BTreeMap::new(),
            attributes: BTreeMap::new(),
            registry: None,
            account: None,
            destinations: HashMap::new(),
        }
    }
}

// Custom deserializers

fn deserialize_entity_name<'de, D>(deserializer: D) -> std::result::Result<EntityName, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    EntityName::new(&s).map_err(serde::de::Error::custom)
}

fn deserialize_image_ref_option<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<ImageRef>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt {
        None => Ok(None),
        Some(s) => ImageRef::parse(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn deserialize_hosts<'de, D>(
    deserializer: D,
) -> std::result::Result<NonEmpty<HostConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<HostEntry> = Vec::deserialize(deserializer)?;
    let hosts = values
        .into_iter()
        .map(|entry| entry.into_host_config())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(serde::de::Error::custom)?;

    NonEmpty::from_vec(hosts).ok_or_else(|| serde::de::Error::custom("at least one host is required"))
}

fn deserialize_hosts_option<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<NonEmpty<HostConfig>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<Vec<HostEntry>> = Option::deserialize(deserializer)?;
    match opt {
        None => Ok(None),
        Some(values) => {
            let hosts = values
                .into_iter()
                .map(|entry| entry.into_host_config())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(serde::de::Error::custom)?;

            let nonempty = NonEmpty::from_vec(hosts).ok_or_else(|| {
                serde::de::Error::custom("destination hosts list cannot be empty")
            })?;
            Ok(Some(nonempty))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HostEntry {
    Simple(String),
    Detailed(HostConfig),
}

impl HostEntry {
    fn into_host_config(self) -> std::result::Result<HostConfig, String> {
        match self {
            HostEntry::Simple(s) => HostConfig::parse(&s),
            HostEntry::Detailed(c) => Ok(c),
        }
    }
}
