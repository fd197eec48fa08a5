//! Orchestration module for container runtimes
//!
//! Provides the sandbox abstraction every build phase runs in. The only
//! backend is rootless Podman driven through its CLI.

mod factory;
mod native_podman;
pub mod podman;
mod runtime;

pub use factory::{create_runtime, PODMAN_ENV};
pub use native_podman::NativePodmanRuntime;
pub use podman::{ContainerConfig, Mount, NETWORK_NONE};
pub use runtime::{ContainerRuntime, VolumeInfo};

use crate::error::{KilnError, KilnResult};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Max number of output lines to include in phase failure reports.
pub const ERROR_TAIL_LINES: usize = 50;

/// The last `max` lines of a phase's output, joined for display.
pub fn output_tail(lines: &[String], max: usize) -> String {
    let start = lines.len().saturating_sub(max);
    lines[start..].join("\n")
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Returns all collected output lines. This is a standalone async function
/// (not behind `async_trait`) so runtimes can share it.
pub(crate) async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: &(dyn Fn(String) + Send + Sync),
) -> KilnResult<Vec<String>> {
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| KilnError::Internal("child stderr not piped".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| KilnError::Internal("child stdout not piped".to_string()))?;

    let mut stderr_reader = BufReader::new(stderr).lines();
    let mut stdout_reader = BufReader::new(stdout).lines();

    let mut all_output = Vec::new();
    let mut stderr_done = false;
    let mut stdout_done = false;

    while !stderr_done || !stdout_done {
        tokio::select! {
            line = stderr_reader.next_line(), if !stderr_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stderr_done = true,
                }
            }
            line = stdout_reader.next_line(), if !stdout_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stdout_done = true,
                }
            }
        }
    }

    Ok(all_output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::sync::Mutex;

    #[test]
    fn tail_keeps_last_lines() {
        let lines: Vec<String> = (0..10).map(|i| format!("line {}", i)).collect();
        assert_eq!(output_tail(&lines, 2), "line 8\nline 9");
        assert_eq!(output_tail(&lines[..1], 5), "line 0");
        assert_eq!(output_tail(&[], 5), "");
    }

    #[tokio::test]
    async fn streams_both_pipes() {
        let mut child = tokio::process::Command::new("sh")
            .args(["-c", "echo out; echo err >&2"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();

        let seen = Mutex::new(Vec::new());
        let lines = stream_child_output(&mut child, &|line| seen.lock().unwrap().push(line))
            .await
            .unwrap();
        child.wait().await.unwrap();

        let mut lines = lines;
        lines.sort();
        assert_eq!(lines, vec!["err", "out"]);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }
}
