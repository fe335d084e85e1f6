// ABOUTME: Container image reference parsing and validation.
// ABOUTME: Handles formats like nginx, nginx:tag, registry/image:tag@digest.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseImageRefError {
    #[error("image reference cannot be empty")]
    Empty,

    #[error("invalid character in image reference: {0}")]
    InvalidChar(char),

    #[error("invalid image reference format: {0}")]
    InvalidFormat(String),
}

/// Immutable reference to a container image. "Changing the tag" produces a
/// new reference; equality is by rendered string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    registry: Option<String>,
    name: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageRef {
    pub fn parse(input: &str) -> Result<Self, ParseImageRefError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseImageRefError::Empty);
        }

        for c in input.chars() {
            if !c.is_ascii_alphanumeric()
                && c != '/'
                && c != ':'
                && c != '.'
                && c != '-'
                && c != '_'
                && c != '@'
            {
                return Err(ParseImageRefError::InvalidChar(c));
            }
        }

        // Split off digest if present
        let (without_digest, digest) = match input.split_once('@') {
            Some((before, after)) => (before, Some(after.to_string())),
            None => (input, None),
        };

        // Split off tag if present
        let (without_tag, tag) = match without_digest.rsplit_once(':') {
            Some((before, after)) => {
                // A colon followed by a slash is a registry port, not a tag
                if after.contains('/') {
                    (without_digest, None)
                } else {
                    (before, Some(after.to_string()))
                }
            }
            None => (without_digest, None),
        };

        let (registry, name) = Self::parse_registry_and_name(without_tag)?;

        // Default tag to "latest" if no tag and no digest
        let tag = match (&tag, &digest) {
            (None, None) => Some("latest".to_string()),
            _ => tag,
        };

        Ok(Self {
            registry,
            name,
            tag,
            digest,
        })
    }

    fn parse_registry_and_name(
        input: &str,
    ) -> Result<(Option<String>, String), ParseImageRefError> {
        // A registry is present if the first component contains a dot or colon,
        // or is "localhost"
        let parts: Vec<&str> = input.splitn(2, '/').collect();

        match parts.as_slice() {
            [name] => Ok((None, (*name).to_string())),
            [first, rest] => {
                if first.contains('.') || first.contains(':') || *first == "localhost" {
                    Ok((Some((*first).to_string()), (*rest).to_string()))
                } else {
                    // No registry, the whole thing is the name (e.g., "library/nginx")
                    Ok((None, input.to_string()))
                }
            }
            _ => Err(ParseImageRefError::InvalidFormat(input.to_string())),
        }
    }

    /// Derive a new reference with deployment-time overrides applied.
    ///
    /// `account` substitutes the account segment of the name (the part before
    /// the first slash), or prefixes one when the name has none.
    pub fn with_overrides(
        &self,
        tag: Option<&str>,
        registry: Option<&str>,
        account: Option<&str>,
    ) -> ImageRef {
        let name = match account {
            Some(account) => match self.name.split_once('/') {
                Some((_, rest)) => format!("{account}/{rest}"),
                None => format!("{account}/{}", self.name),
            },
            None => self.name.clone(),
        };

        ImageRef {
            registry: registry.map(str::to_string).or_else(|| self.registry.clone()),
            name,
            // An explicit tag override discards any pinned digest
            tag: tag.map(str::to_string).or_else(|| self.tag.clone()),
            digest: if tag.is_some() {
                None
            } else {
                self.digest.clone()
            },
        }
    }

    /// Reference to the same repository pinned to a resolved digest.
    pub fn with_digest(&self, digest: &str) -> ImageRef {
        ImageRef {
            registry: self.registry.clone(),
            name: self.name.clone(),
            tag: None,
            digest: Some(digest.to_string()),
        }
    }

    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref registry) = self.registry {
            write!(f, "{}/", registry)?;
        }
        write!(f, "{}", self.name)?;
        if let Some(ref tag) = self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(ref digest) = self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_name_with_default_tag() {
        let image = ImageRef::parse("nginx").unwrap();
        assert_eq!(image.name(), "nginx");
        assert_eq!(image.tag(), Some("latest"));
        assert_eq!(image.to_string(), "nginx:latest");
    }

    #[test]
    fn parses_registry_with_port() {
        let image = ImageRef::parse("registry.example.com:5000/team/app:v2").unwrap();
        assert_eq!(image.registry(), Some("registry.example.com:5000"));
        assert_eq!(image.name(), "team/app");
        assert_eq!(image.tag(), Some("v2"));
    }

    #[test]
    fn parses_digest_reference() {
        let image = ImageRef::parse("app@sha256:abc123").unwrap();
        assert_eq!(image.digest(), Some("sha256:abc123"));
        assert_eq!(image.tag(), None);
    }

    #[test]
    fn tag_override_replaces_tag_and_drops_digest() {
        let image = ImageRef::parse("app@sha256:abc123").unwrap();
        let derived = image.with_overrides(Some("v3"), None, None);
        assert_eq!(derived.to_string(), "app:v3");
        // Original is untouched
        assert_eq!(image.to_string(), "app@sha256:abc123");
    }

    #[test]
    fn account_override_substitutes_account_segment() {
        let image = ImageRef::parse("team/app:v1").unwrap();
        let derived = image.with_overrides(None, Some("registry.example.com"), Some("acme"));
        assert_eq!(derived.to_string(), "registry.example.com/acme/app:v1");

        let bare = ImageRef::parse("app:v1").unwrap();
        assert_eq!(
            bare.with_overrides(None, None, Some("acme")).to_string(),
            "acme/app:v1"
        );
    }
}
