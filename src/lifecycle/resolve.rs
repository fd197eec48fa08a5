//! Lifecycle resolution from a [`LifecycleSource`]

use crate::error::{KilnError, KilnResult};
use crate::lifecycle::archive::{ArchiveLifecycle, DirectoryLifecycle};
use crate::lifecycle::descriptor::LifecycleDescriptor;
use crate::lifecycle::{Lifecycle, LifecycleSource, DEFAULT_DESCRIPTOR, DEFAULT_LIFECYCLE_VERSION};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Resolves lifecycle sources, downloading remote archives into `cache_dir`
#[derive(Debug, Clone)]
pub struct LifecycleResolver {
    cache_dir: PathBuf,
}

impl LifecycleResolver {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Descriptor of the pinned default lifecycle
    pub fn default_descriptor() -> KilnResult<LifecycleDescriptor> {
        LifecycleDescriptor::parse(DEFAULT_DESCRIPTOR, "embedded default lifecycle")
    }

    /// Release URL of the pinned default lifecycle
    pub fn default_url() -> String {
        format!(
            "https://github.com/buildpacks/lifecycle/releases/download/v{0}/lifecycle-v{0}+linux.x86-64.tgz",
            DEFAULT_LIFECYCLE_VERSION
        )
    }

    /// Materialise and validate `source`
    pub async fn resolve(&self, source: &LifecycleSource) -> KilnResult<Box<dyn Lifecycle>> {
        let source_name = source.to_string();
        match source {
            LifecycleSource::Default => {
                let dest = self
                    .cache_dir
                    .join(format!("lifecycle-v{}.tgz", DEFAULT_LIFECYCLE_VERSION));
                self.fetch(&Self::default_url(), &dest).await?;

                let lifecycle = load_blocking(move || ArchiveLifecycle::load(&dest, source_name)).await?;
                let expected = Self::default_descriptor()?;
                if lifecycle.descriptor().info.version != expected.info.version {
                    return Err(KilnError::lifecycle_invalid(
                        lifecycle.source_name(),
                        format!(
                            "archive contains lifecycle {}, expected {}",
                            lifecycle.descriptor().info.version,
                            expected.info.version
                        ),
                    ));
                }
                Ok(Box::new(lifecycle))
            }
            LifecycleSource::Path(path) => {
                if !path.exists() {
                    return Err(KilnError::PathNotFound(path.clone()));
                }
                let path = path.clone();
                if path.is_dir() {
                    let lifecycle = load_blocking(move || DirectoryLifecycle::load(&path)).await?;
                    Ok(Box::new(lifecycle))
                } else {
                    let lifecycle =
                        load_blocking(move || ArchiveLifecycle::load(&path, source_name)).await?;
                    Ok(Box::new(lifecycle))
                }
            }
            LifecycleSource::Url(url) => {
                let dest = self.cache_dir.join(url_cache_name(url));
                self.fetch(url, &dest).await?;
                let lifecycle = load_blocking(move || ArchiveLifecycle::load(&dest, source_name)).await?;
                Ok(Box::new(lifecycle))
            }
        }
    }

    /// Download `url` to `dest` unless it is already there
    async fn fetch(&self, url: &str, dest: &Path) -> KilnResult<()> {
        if dest.exists() {
            debug!("Using cached lifecycle archive {}", dest.display());
            return Ok(());
        }

        info!("Downloading lifecycle from {}", url);
        let url = url.to_string();
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || download(&url, &dest))
            .await
            .map_err(|e| KilnError::Internal(format!("download task failed: {}", e)))?
    }
}

async fn load_blocking<T, F>(f: F) -> KilnResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> KilnResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| KilnError::Internal(format!("lifecycle task failed: {}", e)))?
}

fn download(url: &str, dest: &Path) -> KilnResult<()> {
    let download_err = |reason: String| KilnError::LifecycleDownload {
        url: url.to_string(),
        reason,
    };

    let parent = dest
        .parent()
        .ok_or_else(|| download_err("invalid cache path".to_string()))?;
    fs::create_dir_all(parent)
        .map_err(|e| KilnError::io(format!("creating {}", parent.display()), e))?;

    let response = ureq::get(url)
        .call()
        .map_err(|e| download_err(e.to_string()))?;
    let mut body = response.into_body().into_reader();

    // Partial downloads stay in the temp file and are removed on drop
    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| KilnError::io(format!("creating temp file in {}", parent.display()), e))?;
    io::copy(&mut body, &mut temp).map_err(|e| download_err(e.to_string()))?;
    temp.flush().map_err(|e| download_err(e.to_string()))?;
    temp.persist(dest)
        .map_err(|e| KilnError::io(format!("placing {}", dest.display()), e.error))?;

    debug!("Saved lifecycle archive to {}", dest.display());
    Ok(())
}

/// Cache file name for a remote lifecycle
fn url_cache_name(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    format!("lifecycle-{}.tgz", &hex::encode(digest)[..16])
}
