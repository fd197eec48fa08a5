//! Podman shared types
//!
//! Contains data structures used by container runtimes and the translation
//! of a [`ContainerConfig`] into `podman create` arguments.

use std::collections::BTreeMap;

/// Network mode that disables all networking
pub const NETWORK_NONE: &str = "none";

/// A volume or bind mount
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    /// Volume name or host path
    pub source: String,
    /// Path inside the container
    pub target: String,
    pub read_only: bool,
}

impl Mount {
    /// Read-write mount
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only: false,
        }
    }

    /// Read-only mount
    pub fn read_only(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            read_only: true,
            ..Self::new(source, target)
        }
    }

    /// `-v` argument value
    pub fn to_arg(&self) -> String {
        if self.read_only {
            format!("{}:{}:ro", self.source, self.target)
        } else {
            format!("{}:{}", self.source, self.target)
        }
    }
}

/// Container configuration for one sandbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerConfig {
    /// Container image to use
    pub image: String,
    /// Entrypoint override
    pub entrypoint: Option<String>,
    /// Arguments passed to the entrypoint
    pub args: Vec<String>,
    /// Working directory inside the container
    pub workdir: Option<String>,
    /// User to run as (`uid[:gid]` or name)
    pub user: Option<String>,
    /// Volume and bind mounts
    pub mounts: Vec<Mount>,
    /// Environment variables, ordered for stable argument lists
    pub env: BTreeMap<String, String>,
    /// Network mode; `None` uses the runtime default
    pub network: Option<String>,
    /// Container labels
    pub labels: BTreeMap<String, String>,
    /// Security options (e.g., "no-new-privileges")
    pub security_opt: Vec<String>,
}

impl ContainerConfig {
    /// A config for `image` with networking disabled and nothing mounted
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            entrypoint: None,
            args: Vec::new(),
            workdir: None,
            user: None,
            mounts: Vec::new(),
            env: BTreeMap::new(),
            network: Some(NETWORK_NONE.to_string()),
            labels: BTreeMap::new(),
            security_opt: vec!["no-new-privileges".to_string()],
        }
    }

    /// Arguments for `podman create`, without the leading `create`
    pub fn create_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(ref workdir) = self.workdir {
            args.push("-w".to_string());
            args.push(workdir.clone());
        }
        if let Some(ref user) = self.user {
            args.push("--user".to_string());
            args.push(user.clone());
        }
        if let Some(ref network) = self.network {
            args.push("--network".to_string());
            args.push(network.clone());
        }

        for opt in &self.security_opt {
            args.push("--security-opt".to_string());
            args.push(opt.clone());
        }
        for (k, v) in &self.labels {
            args.push("--label".to_string());
            args.push(format!("{}={}", k, v));
        }
        for m in &self.mounts {
            args.push("-v".to_string());
            args.push(m.to_arg());
        }
        for (k, v) in &self.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", k, v));
        }
        if let Some(ref entrypoint) = self.entrypoint {
            args.push("--entrypoint".to_string());
            args.push(entrypoint.clone());
        }

        args.push(self.image.clone());
        args.extend(self.args.iter().cloned());
        args
    }

    /// The mount at `target`, if any
    pub fn mount_at(&self, target: &str) -> Option<&Mount> {
        self.mounts.iter().find(|m| m.target == target)
    }
}
