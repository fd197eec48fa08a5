//! Native Podman container runtime
//!
//! Implements the ContainerRuntime trait by shelling out to the `podman`
//! CLI. Requires rootless Podman to be properly configured.

use crate::error::{KilnError, KilnResult};
use crate::orchestration::podman::ContainerConfig;
use crate::orchestration::runtime::{ContainerRuntime, VolumeInfo};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Container runtime using native rootless Podman
pub struct NativePodmanRuntime {
    binary: PathBuf,
}

impl NativePodmanRuntime {
    /// Runtime using `podman` from `PATH`
    pub fn new() -> Self {
        Self::with_binary("podman")
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self) -> Command {
        Command::new(&self.binary)
    }

    /// Check if Podman is installed
    async fn podman_installed(&self) -> bool {
        self.command()
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Check if rootless Podman is properly configured
    async fn rootless_configured(&self) -> KilnResult<bool> {
        let output = self.command()
            .args(["info", "--format", "{{.Host.Security.Rootless}}"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| KilnError::command_failed("podman info", e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.trim() == "true")
    }

    /// Execute a Podman command and return the output
    async fn exec(&self, args: &[&str]) -> KilnResult<std::process::Output> {
        debug!("Executing: podman {:?}", args);

        self.command()
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| KilnError::command_failed(format!("podman {:?}", args), e))
    }
}

impl Default for NativePodmanRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a JSON `Labels` object into a map, skipping non-string values
fn parse_labels(value: &serde_json::Value) -> HashMap<String, String> {
    value
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_volume(vol: &serde_json::Value) -> VolumeInfo {
    VolumeInfo {
        name: vol["Name"].as_str().unwrap_or_default().to_string(),
        labels: parse_labels(&vol["Labels"]),
        mountpoint: vol["Mountpoint"].as_str().map(String::from),
        created_at: vol["CreatedAt"].as_str().map(String::from),
    }
}

#[async_trait]
impl ContainerRuntime for NativePodmanRuntime {
    async fn is_available(&self) -> KilnResult<bool> {
        if !self.podman_installed().await {
            return Ok(false);
        }
        self.rootless_configured().await
    }

    async fn ensure_ready(&self) -> KilnResult<()> {
        if !self.podman_installed().await {
            return Err(KilnError::PodmanNotFound);
        }

        if !self.rootless_configured().await? {
            return Err(KilnError::PodmanRootlessSetup {
                reason: "Rootless Podman not configured. Run: podman system migrate".to_string(),
            });
        }

        Ok(())
    }

    async fn image_exists(&self, image: &str) -> KilnResult<bool> {
        let output = self.exec(&["image", "exists", image]).await?;
        Ok(output.status.success())
    }

    async fn pull(&self, image: &str) -> KilnResult<()> {
        info!("Pulling image: {}", image);

        let output = self.exec(&["pull", image]).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(KilnError::ImagePull {
                image: image.to_string(),
                reason: stderr.trim().to_string(),
            })
        }
    }

    async fn image_labels(&self, image: &str) -> KilnResult<HashMap<String, String>> {
        let output = self
            .exec(&["image", "inspect", "--format", "{{json .Labels}}", image])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(KilnError::command_exec("podman image inspect", stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let value: serde_json::Value = serde_json::from_str(stdout.trim())?;
        Ok(parse_labels(&value))
    }

    async fn create(&self, config: &ContainerConfig) -> KilnResult<String> {
        let mut args = vec!["create".to_string()];
        args.extend(config.create_args());

        debug!("Creating container: podman {:?}", args);

        let args_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.exec(&args_refs).await?;

        if output.status.success() {
            let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
            debug!(
                "Container created: {}",
                &container_id[..12.min(container_id.len())]
            );
            Ok(container_id)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(KilnError::ContainerCreate(stderr.trim().to_string()))
        }
    }

    async fn copy_archive(
        &self,
        container_id: &str,
        dest: &str,
        mut archive: Box<dyn Read + Send>,
    ) -> KilnResult<()> {
        let data = tokio::task::spawn_blocking(move || {
            let mut data = Vec::new();
            archive.read_to_end(&mut data).map(|_| data)
        })
        .await
        .map_err(|e| KilnError::Internal(format!("archive read task failed: {}", e)))?
        .map_err(|e| KilnError::io("reading lifecycle archive", e))?;

        let target = format!("{}:{}", container_id, dest);
        debug!("Copying {} bytes to {}", data.len(), target);

        let mut child = self.command()
            .args(["cp", "-", &target])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| KilnError::command_failed("podman cp", e))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| KilnError::Internal("podman cp stdin not piped".to_string()))?;
        stdin
            .write_all(&data)
            .await
            .map_err(|e| KilnError::io("writing archive to podman cp", e))?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| KilnError::command_failed("podman cp", e))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(KilnError::command_exec("podman cp", stderr))
        }
    }

    async fn start_attached(
        &self,
        container_id: &str,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> KilnResult<i32> {
        debug!("Starting container attached: {}", container_id);

        let mut child = self.command()
            .args(["start", "--attach", container_id])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| KilnError::command_failed("podman start", e))?;

        super::stream_child_output(&mut child, on_output).await?;

        let status = child
            .wait()
            .await
            .map_err(|e| KilnError::command_failed("podman start", e))?;

        Ok(status.code().unwrap_or(-1))
    }

    async fn kill(&self, container_id: &str) -> KilnResult<()> {
        debug!("Killing container: {}", container_id);

        let output = self.exec(&["kill", container_id]).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // Already exited
            if stderr.contains("not running") || stderr.contains("no such container") {
                Ok(())
            } else {
                Err(KilnError::command_exec("podman kill", stderr))
            }
        }
    }

    async fn remove(&self, container_id: &str) -> KilnResult<()> {
        debug!("Removing container: {}", container_id);

        let output = self.exec(&["rm", "-f", container_id]).await?;

        if output.status.success() {
            Ok(())
        } else {
            // Ignore error if container doesn't exist
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no such container") {
                Ok(())
            } else {
                Err(KilnError::command_exec("podman rm", stderr))
            }
        }
    }

    async fn volume_create(&self, name: &str, labels: &HashMap<String, String>) -> KilnResult<()> {
        debug!("Creating volume: {}", name);

        let label_strings: Vec<String> =
            labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect();

        let mut args = vec!["volume", "create", "--ignore"];
        for label in &label_strings {
            args.push("--label");
            args.push(label);
        }
        args.push(name);

        let output = self.exec(&args).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(KilnError::CacheVolumeCreate {
                name: name.to_string(),
                reason: stderr.trim().to_string(),
            })
        }
    }

    async fn volume_inspect(&self, name: &str) -> KilnResult<Option<VolumeInfo>> {
        let output = self
            .exec(&["volume", "inspect", name, "--format", "json"])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no such volume") {
                return Ok(None);
            }
            return Err(KilnError::command_exec("podman volume inspect", stderr));
        }

        // inspect returns an array even for a single volume
        let stdout = String::from_utf8_lossy(&output.stdout);
        let volumes: Vec<serde_json::Value> = serde_json::from_str(&stdout)?;

        Ok(volumes.first().map(|vol| VolumeInfo {
            name: name.to_string(),
            ..parse_volume(vol)
        }))
    }

    async fn volume_remove(&self, name: &str) -> KilnResult<()> {
        debug!("Removing volume: {}", name);

        let output = self.exec(&["volume", "rm", "-f", name]).await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no such volume") {
                Ok(())
            } else {
                Err(KilnError::command_exec("podman volume rm", stderr))
            }
        }
    }

    async fn volume_list(&self, prefix: &str) -> KilnResult<Vec<VolumeInfo>> {
        let output = self.exec(&["volume", "ls", "--format", "json"]).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(KilnError::command_exec("podman volume ls", stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(Vec::new());
        }

        let volumes: Vec<serde_json::Value> = serde_json::from_str(&stdout)?;
        Ok(volumes
            .iter()
            .map(parse_volume)
            .filter(|v| v.name.starts_with(prefix))
            .collect())
    }

    fn runtime_name(&self) -> &'static str {
        "Native Podman"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_podman_runtime_default() {
        let runtime = NativePodmanRuntime::default();
        assert_eq!(runtime.runtime_name(), "Native Podman");
    }

    #[test]
    fn parse_volume_json() {
        let value: serde_json::Value = serde_json::from_str(
            r#"{"Name": "kiln-cache-abc.build", "Labels": {"io.kiln.cache": "true", "n": 1}, "Mountpoint": "/var/vol", "CreatedAt": "2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        let info = parse_volume(&value);
        assert_eq!(info.name, "kiln-cache-abc.build");
        assert_eq!(info.labels.len(), 1);
        assert_eq!(info.mountpoint.as_deref(), Some("/var/vol"));
    }

    #[test]
    fn null_labels_are_empty() {
        assert!(parse_labels(&serde_json::Value::Null).is_empty());
    }
}
