//! Lifecycle resolution
//!
//! A lifecycle is the set of phase binaries that actually perform a build,
//! plus a `lifecycle.toml` descriptor declaring which buildpack and platform
//! API versions it speaks. It comes from one of three sources:
//!
//! 1. Default: a pinned release, descriptor compiled in via `include_str!`,
//!    archive downloaded once into the lifecycle cache directory
//! 2. Path: a local directory or `.tgz`/`.tar` archive
//! 3. Url: a remote archive, downloaded once and keyed by URL hash

pub mod api;
mod archive;
pub mod compat;
pub mod descriptor;
mod resolve;

pub use api::{ApiSet, ApiVersion};
pub use archive::{ArchiveLifecycle, DirectoryLifecycle};
pub use compat::{check_compatibility, Negotiated};
pub use descriptor::{BuildpackRef, LifecycleApis, LifecycleDescriptor, LifecycleInfo, OrderGroup};
pub use resolve::LifecycleResolver;

use crate::build::phase::Phase;
use crate::error::KilnResult;
use std::fmt;
use std::io::Read;
use std::path::PathBuf;

/// Lifecycle release used when no other source is configured
pub const DEFAULT_LIFECYCLE_VERSION: &str = "0.11.1";

/// Descriptor of the default lifecycle, available without any I/O
pub(crate) const DEFAULT_DESCRIPTOR: &str = include_str!("../../assets/lifecycle.toml");

/// Oldest platform API that ships the `creator` binary
pub const CREATOR_MIN_PLATFORM_API: ApiVersion = ApiVersion::new(0, 3);

/// Name of the descriptor file at the archive root
pub(crate) const DESCRIPTOR_FILE: &str = "lifecycle.toml";

/// Directory holding the phase binaries inside the archive
pub(crate) const BINARY_DIR: &str = "lifecycle";

/// A validated lifecycle implementation
pub trait Lifecycle: Send + Sync {
    /// Parsed `lifecycle.toml`
    fn descriptor(&self) -> &LifecycleDescriptor;

    /// Open a fresh, uncompressed tar stream of the lifecycle.
    ///
    /// Every call returns an independent stream. Dropping it releases the
    /// underlying file handle.
    fn open(&self) -> KilnResult<Box<dyn Read + Send>>;

    /// Whether the archive contains `lifecycle/creator`
    fn has_creator_binary(&self) -> bool;

    /// Human readable origin, used in errors and logs
    fn source_name(&self) -> &str;

    /// Whether the collapsed single-container path can be used
    fn supports_creator(&self) -> bool {
        self.has_creator_binary()
            && self
                .descriptor()
                .apis
                .platform
                .supported
                .iter()
                .any(|v| *v >= CREATOR_MIN_PLATFORM_API)
    }
}

/// Where to get a lifecycle from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LifecycleSource {
    #[default]
    Default,
    Path(PathBuf),
    Url(String),
}

impl LifecycleSource {
    /// Interpret a `--lifecycle` value or config entry
    pub fn parse(value: &str) -> Self {
        if value.starts_with("https://") || value.starts_with("http://") {
            Self::Url(value.to_string())
        } else {
            Self::Path(PathBuf::from(value))
        }
    }
}

impl fmt::Display for LifecycleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default lifecycle v{}", DEFAULT_LIFECYCLE_VERSION),
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Url(url) => write!(f, "{}", url),
        }
    }
}

/// Binaries a lifecycle must ship to run the isolated phase sequence
pub fn required_binaries() -> impl Iterator<Item = &'static str> {
    Phase::ISOLATED.iter().map(|p| p.binary())
}
