// ABOUTME: Validated names for deployable entities (containers, services, stacks).
// ABOUTME: Ensures names follow RFC 1123 label requirements plus underscores.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EntityNameError {
    #[error("entity name cannot be empty")]
    Empty,

    #[error("entity name exceeds maximum length of 63 characters")]
    TooLong,

    #[error("entity name cannot start with a hyphen")]
    StartsWithHyphen,

    #[error("entity name cannot end with a hyphen")]
    EndsWithHyphen,

    #[error("entity name must be lowercase")]
    NotLowercase,

    #[error("invalid character in entity name: '{0}'")]
    InvalidChar(char),
}

/// The remote identifier of one deployable unit. Also used, suffixed with
/// `_backup`, as the name of the rollback sibling.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityName(String);

impl EntityName {
    pub fn new(value: &str) -> Result<Self, EntityNameError> {
        if value.is_empty() {
            return Err(EntityNameError::Empty);
        }

        if value.len() > 63 {
            return Err(EntityNameError::TooLong);
        }

        if value.starts_with('-') {
            return Err(EntityNameError::StartsWithHyphen);
        }

        if value.ends_with('-') {
            return Err(EntityNameError::EndsWithHyphen);
        }

        for c in value.chars() {
            if c.is_ascii_uppercase() {
                return Err(EntityNameError::NotLowercase);
            }
            if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' && c != '_' {
                return Err(EntityNameError::InvalidChar(c));
            }
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic name of the backup-named sibling.
    pub fn backup(&self) -> EntityName {
        EntityName(format!("{}_backup", self.0))
    }
}

impl fmt::Display for EntityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
