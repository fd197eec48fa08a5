//! Error types for kiln
//!
//! All modules use `KilnResult<T>` as their return type.

use crate::build::phase::Phase;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for kiln operations
pub type KilnResult<T> = Result<T, KilnError>;

/// All errors that can occur in kiln
#[derive(Error, Debug)]
pub enum KilnError {
    // Environment errors
    #[error("Podman not found. Install it from https://podman.io/docs/installation")]
    PodmanNotFound,

    #[error("Podman rootless setup incomplete: {reason}")]
    PodmanRootlessSetup { reason: String },

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("writing config to {path}: {source}")]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Trust errors
    #[error("Builder {0} is a suggested builder, and is trusted by default. Currently this cannot be changed.")]
    SuggestedBuilderImmutable(String),

    // Lifecycle errors
    #[error("Invalid lifecycle at {source_name}: {reason}")]
    LifecycleInvalid { source_name: String, reason: String },

    #[error("Failed to download lifecycle from {url}: {reason}")]
    LifecycleDownload { url: String, reason: String },

    #[error("Incompatible {kind} API: builder requires {required}, lifecycle supports {supported}")]
    IncompatibleApi {
        kind: &'static str,
        required: String,
        supported: String,
    },

    // Builder errors
    #[error("Invalid builder {name}: {reason}")]
    BuilderMetadata { name: String, reason: String },

    // Build errors
    #[error("Phase {phase} failed with exit status {status}")]
    PhaseExecution { phase: Phase, status: i32 },

    #[error("Build cancelled during {phase}")]
    BuildCancelled { phase: Phase },

    // Container errors
    #[error("Failed to create container: {0}")]
    ContainerCreate(String),

    #[error("Failed to start container: {0}")]
    ContainerStart(String),

    #[error("Image pull failed: {image}: {reason}")]
    ImagePull { image: String, reason: String },

    // Cache errors
    #[error("Failed to create cache volume {name}: {reason}")]
    CacheVolumeCreate { name: String, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl KilnError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a config write error for the given path
    pub fn config_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ConfigWrite {
            path: path.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Create a lifecycle validation error
    pub fn lifecycle_invalid(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LifecycleInvalid {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error was raised before any sandbox was started
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Self::IncompatibleApi { .. }
                | Self::LifecycleInvalid { .. }
                | Self::BuilderMetadata { .. }
                | Self::SuggestedBuilderImmutable(_)
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::PodmanNotFound => Some("Install podman, or point KILN_PODMAN at the podman binary"),
            Self::PodmanRootlessSetup { .. } => Some("Run: podman system migrate"),
            Self::IncompatibleApi { .. } => {
                Some("Use a newer lifecycle with --lifecycle, or pick a newer builder")
            }
            Self::SuggestedBuilderImmutable(_) => {
                Some("Run: kiln builder suggest to see the default trusted builders")
            }
            Self::ConfigWrite { .. } => Some("Check permissions on the config file and its directory"),
            _ => None,
        }
    }
}
