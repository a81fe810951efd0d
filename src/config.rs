//! config
//!
//! Repository client configuration.
//!
//! # Format
//!
//! Configuration is TOML, validated after parsing:
//!
//! ```toml
//! name = "production"
//! lock_timeout_ms = 5000
//! cache_invalidation = "entry"
//! ```
//!
//! # Defaults
//!
//! Every field has a default so an empty document is a valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from configuration parsing and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document is not valid TOML or has unknown fields.
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field value is out of range or malformed.
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// How the shared-object cache reacts to an invalidation request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheInvalidation {
    /// Drop only the invalidated entry; the rest of the snapshot survives.
    #[default]
    Entry,
    /// Drop the whole snapshot; the next full load repopulates it.
    Full,
}

/// Configuration for one [`RepositoryClient`](crate::client::RepositoryClient).
///
/// # Example
///
/// ```
/// use strata::config::RepositoryConfig;
///
/// let config = RepositoryConfig::from_toml("lock_timeout_ms = 250").unwrap();
/// assert_eq!(config.lock_timeout().as_millis(), 250);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RepositoryConfig {
    /// Display name of the repository connection.
    pub name: String,

    /// Upper bound on any single lock acquisition, in milliseconds.
    pub lock_timeout_ms: u64,

    /// Invalidation granularity for the shared-object cache.
    pub cache_invalidation: CacheInvalidation,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            name: "repository".to_string(),
            lock_timeout_ms: 5_000,
            cache_invalidation: CacheInvalidation::Entry,
        }
    }
}

impl RepositoryConfig {
    /// Parse and validate a configuration from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed TOML or unknown fields,
    /// `ConfigError::InvalidValue` for out-of-range values.
    pub fn from_toml(document: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::InvalidValue(
                "repository name cannot be empty".to_string(),
            ));
        }
        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "lock_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The lock acquisition bound as a [`Duration`].
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RepositoryConfig::default();
        assert_eq!(config.name, "repository");
        assert_eq!(config.lock_timeout_ms, 5_000);
        assert_eq!(config.cache_invalidation, CacheInvalidation::Entry);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_document_is_valid() {
        let config = RepositoryConfig::from_toml("").unwrap();
        assert_eq!(config, RepositoryConfig::default());
    }

    #[test]
    fn parses_all_fields() {
        let config = RepositoryConfig::from_toml(
            r#"
            name = "staging"
            lock_timeout_ms = 250
            cache_invalidation = "full"
            "#,
        )
        .unwrap();
        assert_eq!(config.name, "staging");
        assert_eq!(config.lock_timeout(), Duration::from_millis(250));
        assert_eq!(config.cache_invalidation, CacheInvalidation::Full);
    }

    #[test]
    fn zero_timeout_rejected() {
        assert!(RepositoryConfig::from_toml("lock_timeout_ms = 0").is_err());
    }

    #[test]
    fn empty_name_rejected() {
        assert!(RepositoryConfig::from_toml(r#"name = """#).is_err());
    }

    #[test]
    fn unknown_fields_rejected() {
        assert!(RepositoryConfig::from_toml("unknown_field = true").is_err());
    }

    #[test]
    fn roundtrip() {
        let config = RepositoryConfig {
            name: "prod".to_string(),
            lock_timeout_ms: 100,
            cache_invalidation: CacheInvalidation::Full,
        };
        let document = toml::to_string_pretty(&config).unwrap();
        let parsed = RepositoryConfig::from_toml(&document).unwrap();
        assert_eq!(config, parsed);
    }
}
