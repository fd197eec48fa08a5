//! Configuration management for kiln
//!
//! The config file is shared between concurrent invocations. Every mutation
//! holds an exclusive `flock` on a sibling `.lock` file, re-reads the file,
//! and replaces it with a rename, so readers see either the old or the new
//! complete contents.

pub mod schema;

pub use schema::{Config, PullPolicy, TrustedBuilder};

use crate::error::{KilnError, KilnResult};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Configuration manager bound to one config file path
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a config manager for an explicit path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kiln")
            .join("config.toml")
    }

    /// Get the default directory for downloaded lifecycle archives
    pub fn default_lifecycle_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kiln")
            .join("lifecycle")
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> KilnResult<Config> {
        let path = self.config_path.clone();
        run_blocking(move || read_config(&path)).await
    }

    /// Save configuration to file, replacing it atomically
    pub async fn save(&self, config: &Config) -> KilnResult<()> {
        let path = self.config_path.clone();
        let config = config.clone();
        run_blocking(move || {
            let _lock = ConfigLock::acquire(&path)?;
            write_config(&path, &config)
        })
        .await?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Read-modify-write the config under the file lock.
    ///
    /// `apply` returns whether it changed the config; the file is only
    /// rewritten when it did. Returns the resulting config and whether it
    /// was written.
    pub async fn update<F>(&self, apply: F) -> KilnResult<(Config, bool)>
    where
        F: FnOnce(&mut Config) -> KilnResult<bool> + Send + 'static,
    {
        let path = self.config_path.clone();
        run_blocking(move || {
            let _lock = ConfigLock::acquire(&path)?;
            let mut config = read_config(&path)?;
            let changed = apply(&mut config)?;
            if changed {
                write_config(&path, &config)?;
                debug!("Rewrote config {}", path.display());
            }
            Ok((config, changed))
        })
        .await
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

async fn run_blocking<T, F>(f: F) -> KilnResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> KilnResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| KilnError::Internal(format!("config task failed: {}", e)))?
}

fn read_config(path: &Path) -> KilnResult<Config> {
    if !path.exists() {
        debug!("Config file not found, using defaults");
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| KilnError::io(format!("reading config from {}", path.display()), e))?;

    toml::from_str(&content).map_err(|e| KilnError::ConfigInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn write_config(path: &Path, config: &Config) -> KilnResult<()> {
    let content = toml::to_string_pretty(config)?;
    write_atomic(path, content.as_bytes()).map_err(|e| KilnError::config_write(path, e))
}

/// Write `data` to a temp file next to `path`, then rename it over `path`
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = parent_dir(path);
    fs::create_dir_all(parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;

    // A replaced file keeps its mode; new files are 0644
    let permissions = match fs::metadata(path) {
        Ok(existing) => existing.permissions(),
        Err(_) => default_permissions(temp.as_file())?,
    };
    fs::set_permissions(temp.path(), permissions)?;

    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(unix)]
fn default_permissions(_file: &File) -> std::io::Result<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Ok(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions(file: &File) -> std::io::Result<fs::Permissions> {
    Ok(file.metadata()?.permissions())
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Exclusive advisory lock on `<config>.lock`, released on drop
struct ConfigLock {
    _file: File,
}

impl ConfigLock {
    fn acquire(config_path: &Path) -> KilnResult<Self> {
        let lock_path = lock_path(config_path);
        fs::create_dir_all(parent_dir(&lock_path))
            .map_err(|e| KilnError::config_write(config_path, e))?;

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| KilnError::config_write(config_path, e))?;

        flock_exclusive(&file).map_err(|e| KilnError::config_write(config_path, e))?;
        Ok(Self { _file: file })
    }
}

fn lock_path(config_path: &Path) -> PathBuf {
    let mut name = config_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "config.toml".into());
    name.push(".lock");
    config_path.with_file_name(name)
}

#[cfg(unix)]
fn flock_exclusive(file: &File) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;
    // SAFETY: fd is a valid descriptor owned by `file` for the duration of the call.
    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
    if result == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn flock_exclusive(_file: &File) -> std::io::Result<()> {
    Ok(())
}
