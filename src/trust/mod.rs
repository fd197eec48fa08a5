//! Builder trust store
//!
//! Merges the built-in suggested builders with the builders a user has
//! trusted in their config. Trusted builders may run the collapsed `creator`
//! path; everything else runs each phase in its own container.

mod suggested;

pub use suggested::{is_suggested, SuggestedBuilder, SuggestedStack, SUGGESTED_BUILDERS, SUGGESTED_STACKS};

use crate::config::{Config, ConfigManager, TrustedBuilder};
use crate::error::{KilnError, KilnResult};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Result of trusting a builder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Builder was appended to the config
    Added,
    /// Builder was already in the config; nothing written
    AlreadyTrusted,
    /// Builder is suggested and trusted by default; nothing written
    Suggested,
}

/// Result of untrusting a builder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Builder was removed from the config
    Removed,
    /// Builder was never trusted; nothing written
    NotTrusted,
}

/// Trust store backed by a config file
pub struct TrustStore {
    manager: ConfigManager,
    config: Config,
}

impl TrustStore {
    /// Create a trust store from an already loaded config
    pub fn new(manager: ConfigManager, config: Config) -> Self {
        Self { manager, config }
    }

    /// Load the config at the manager's path and build a trust store from it
    pub async fn load(manager: ConfigManager) -> KilnResult<Self> {
        let config = manager.load().await?;
        Ok(Self::new(manager, config))
    }

    /// All trusted builder names, suggested included, sorted and deduplicated
    pub fn list(&self) -> Vec<String> {
        merged_names(&self.config)
    }

    /// Whether `name` may use the collapsed execution path
    pub fn is_trusted(&self, name: &str) -> bool {
        is_suggested(name) || is_user_trusted(&self.config, name)
    }

    /// Trust a builder, persisting the change if it is new
    pub async fn add(&mut self, name: &str) -> KilnResult<AddOutcome> {
        if is_suggested(name) {
            debug!("{} is a suggested builder, not persisting", name);
            return Ok(AddOutcome::Suggested);
        }
        if is_user_trusted(&self.config, name) {
            return Ok(AddOutcome::AlreadyTrusted);
        }

        let entry = name.to_string();
        let (config, added) = self
            .manager
            .update(move |config| {
                if is_user_trusted(config, &entry) {
                    return Ok(false);
                }
                config.trusted_builders.push(TrustedBuilder::new(entry));
                Ok(true)
            })
            .await?;
        self.config = config;

        if added {
            info!("Trusted builder {}", name);
            Ok(AddOutcome::Added)
        } else {
            Ok(AddOutcome::AlreadyTrusted)
        }
    }

    /// Untrust a builder. Suggested builders cannot be removed.
    pub async fn remove(&mut self, name: &str) -> KilnResult<RemoveOutcome> {
        if is_suggested(name) {
            return Err(KilnError::SuggestedBuilderImmutable(name.to_string()));
        }
        if !is_user_trusted(&self.config, name) {
            return Ok(RemoveOutcome::NotTrusted);
        }

        let entry = name.to_string();
        let (config, removed) = self
            .manager
            .update(move |config| {
                let before = config.trusted_builders.len();
                config.trusted_builders.retain(|b| b.name != entry);
                Ok(config.trusted_builders.len() != before)
            })
            .await?;
        self.config = config;

        if removed {
            info!("Untrusted builder {}", name);
            Ok(RemoveOutcome::Removed)
        } else {
            Ok(RemoveOutcome::NotTrusted)
        }
    }

    /// The config as last read or written by this store
    pub fn config(&self) -> &Config {
        &self.config
    }
}

fn is_user_trusted(config: &Config, name: &str) -> bool {
    config.trusted_builders.iter().any(|b| b.name == name)
}

fn merged_names(config: &Config) -> Vec<String> {
    SUGGESTED_BUILDERS
        .iter()
        .map(|b| b.image.to_string())
        .chain(config.trusted_builders.iter().map(|b| b.name.clone()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
