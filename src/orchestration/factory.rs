//! Runtime selection

use crate::error::{KilnError, KilnResult};
use crate::orchestration::native_podman::NativePodmanRuntime;
use crate::orchestration::runtime::ContainerRuntime;
use std::ffi::OsString;

/// Overrides the podman binary
pub const PODMAN_ENV: &str = "KILN_PODMAN";

/// Operating systems where podman can run lifecycle containers
const SUPPORTED_OS: &[&str] = &["linux", "macos"];

/// Create the container runtime for this host.
///
/// On macOS the podman CLI talks to a podman machine, so both hosts use the
/// same CLI runtime.
pub fn create_runtime() -> KilnResult<Box<dyn ContainerRuntime>> {
    runtime_for(std::env::consts::OS, std::env::var_os(PODMAN_ENV))
}

fn runtime_for(os: &str, binary: Option<OsString>) -> KilnResult<Box<dyn ContainerRuntime>> {
    if !SUPPORTED_OS.contains(&os) {
        return Err(KilnError::UnsupportedPlatform(os.to_string()));
    }
    let runtime = match binary.filter(|b| !b.is_empty()) {
        Some(binary) => NativePodmanRuntime::with_binary(binary),
        None => NativePodmanRuntime::new(),
    };
    Ok(Box::new(runtime))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn podman_on_supported_hosts() {
        for os in SUPPORTED_OS {
            let runtime = runtime_for(os, None).unwrap();
            assert_eq!(runtime.runtime_name(), "Native Podman");
        }
    }

    #[test]
    fn unsupported_host_is_rejected() {
        let err = runtime_for("windows", None).err().unwrap();
        assert!(matches!(err, KilnError::UnsupportedPlatform(os) if os == "windows"));
    }

    #[test]
    fn empty_override_uses_path() {
        assert!(runtime_for("linux", Some(OsString::new())).is_ok());
        assert!(runtime_for("linux", Some("/opt/podman/bin/podman".into())).is_ok());
    }
}
