//! Configuration schema for kiln
//!
//! Configuration is stored at `~/.config/kiln/config.toml` unless a path is
//! given with `--config`. Sections left at their defaults are not written back,
//! so a config that only trusts builders stays a list of `[[trusted-builders]]`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Builders trusted by the user, in insertion order
    #[serde(
        rename = "trusted-builders",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub trusted_builders: Vec<TrustedBuilder>,

    /// Lifecycle selection
    #[serde(skip_serializing_if = "LifecycleConfig::is_default")]
    pub lifecycle: LifecycleConfig,

    /// Cache settings
    #[serde(skip_serializing_if = "CacheConfig::is_default")]
    pub cache: CacheConfig,

    /// Build defaults
    #[serde(skip_serializing_if = "BuildConfig::is_default")]
    pub build: BuildConfig,
}

/// A single `[[trusted-builders]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedBuilder {
    /// Builder image name
    pub name: String,
}

impl TrustedBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Lifecycle configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Path or URL of a lifecycle to use instead of the pinned default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Directory where downloaded lifecycle archives are kept
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

impl LifecycleConfig {
    fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache image reference; when set, caches are stored as an image instead of volumes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Auto-remove caches older than N days (0 = disabled)
    pub gc_days: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            image: None,
            gc_days: 30,
        }
    }
}

impl CacheConfig {
    fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// When to pull builder and run images
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullPolicy {
    Always,
    #[default]
    IfNotPresent,
    Never,
}

impl fmt::Display for PullPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => write!(f, "always"),
            Self::IfNotPresent => write!(f, "if-not-present"),
            Self::Never => write!(f, "never"),
        }
    }
}

/// Build defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Builder to use when `--builder` is not given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_builder: Option<String>,

    /// Image pull policy
    pub pull_policy: PullPolicy,

    /// Network mode for the build phase (detect always runs without network)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,

    /// Abort the build after N seconds (0 = no timeout)
    pub timeout_secs: u64,
}

impl BuildConfig {
    fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes_empty() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.trim().is_empty());
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.trusted_builders.is_empty());
        assert_eq!(config.cache.gc_days, 30);
    }

    #[test]
    fn trusted_builders_use_array_of_tables() {
        let config = Config {
            trusted_builders: vec![TrustedBuilder::new("some-builder")],
            ..Config::default()
        };
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[[trusted-builders]]"));
        assert!(toml.contains("name = \"some-builder\""));
        assert!(!toml.contains("[cache]"));
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [[trusted-builders]]
            name = "very/safe/builder"

            [build]
            pull_policy = "never"
            timeout_secs = 600
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.trusted_builders[0].name, "very/safe/builder");
        assert_eq!(config.build.pull_policy, PullPolicy::Never);
        assert_eq!(config.build.timeout_secs, 600);
        assert_eq!(config.cache.gc_days, 30); // default preserved
    }

    #[test]
    fn non_default_sections_are_written() {
        let mut config = Config::default();
        config.lifecycle.source = Some("/opt/lifecycle.tgz".to_string());
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[lifecycle]"));
        assert!(toml.contains("source = \"/opt/lifecycle.tgz\""));
    }
}
