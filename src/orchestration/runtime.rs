//! Container runtime abstraction
//!
//! Every build phase runs in a sandbox created through this trait. The
//! orchestrator never talks to podman directly, so tests can substitute a
//! recording fake.

use crate::error::KilnResult;
use crate::orchestration::podman::ContainerConfig;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Read;

/// Information about a container volume
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeInfo {
    /// Volume name
    pub name: String,
    /// Volume labels
    pub labels: HashMap<String, String>,
    /// Mountpoint on the host
    pub mountpoint: Option<String>,
    /// Creation time as reported by the runtime
    pub created_at: Option<String>,
}

/// Abstract container runtime interface
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Check if the runtime is available on this system
    async fn is_available(&self) -> KilnResult<bool>;

    /// Ensure the runtime is ready (installed, rootless configured)
    async fn ensure_ready(&self) -> KilnResult<()>;

    /// Check if an image exists locally
    async fn image_exists(&self, image: &str) -> KilnResult<bool>;

    /// Pull an image
    async fn pull(&self, image: &str) -> KilnResult<()>;

    /// Labels of a local image
    async fn image_labels(&self, image: &str) -> KilnResult<HashMap<String, String>>;

    /// Create (but do not start) a container, returning its ID
    async fn create(&self, config: &ContainerConfig) -> KilnResult<String>;

    /// Extract a tar stream into `dest` inside a created container.
    ///
    /// The stream is consumed and dropped before this returns.
    async fn copy_archive(
        &self,
        container_id: &str,
        dest: &str,
        archive: Box<dyn Read + Send>,
    ) -> KilnResult<()>;

    /// Start a created container and wait for it, forwarding each output line.
    ///
    /// Returns the container's exit status.
    async fn start_attached(
        &self,
        container_id: &str,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> KilnResult<i32>;

    /// Kill a container immediately
    async fn kill(&self, container_id: &str) -> KilnResult<()>;

    /// Remove a container, ignoring containers that no longer exist
    async fn remove(&self, container_id: &str) -> KilnResult<()>;

    /// Create a named volume with labels (no-op if it exists)
    async fn volume_create(&self, name: &str, labels: &HashMap<String, String>) -> KilnResult<()>;

    /// Get volume information, or None if it does not exist
    async fn volume_inspect(&self, name: &str) -> KilnResult<Option<VolumeInfo>>;

    /// Remove a volume, ignoring volumes that no longer exist
    async fn volume_remove(&self, name: &str) -> KilnResult<()>;

    /// List volumes whose name starts with `prefix`
    async fn volume_list(&self, prefix: &str) -> KilnResult<Vec<VolumeInfo>>;

    /// Get the human-readable runtime name for display
    fn runtime_name(&self) -> &'static str;
}
