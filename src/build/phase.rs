//! Lifecycle phases and what each one is allowed to touch

use std::fmt;

/// Mount points inside every phase container
pub mod paths {
    pub const APP: &str = "/workspace";
    pub const LAYERS: &str = "/layers";
    pub const PLATFORM: &str = "/platform";
    pub const CACHE: &str = "/cache";
    pub const LAUNCH_CACHE: &str = "/launch-cache";
    /// Directory the lifecycle archive is extracted into
    pub const CNB: &str = "/cnb";
    pub const LIFECYCLE: &str = "/cnb/lifecycle";
    pub const DAEMON_SOCKET: &str = "/var/run/docker.sock";
}

/// A lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Detect,
    Analyze,
    Restore,
    Build,
    Export,
    /// All of the above in one container
    Create,
}

/// How a phase may access the build cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAccess {
    None,
    ReadOnly,
    ReadWrite,
}

impl Phase {
    /// Phases run, in order, when each gets its own container
    pub const ISOLATED: [Phase; 5] = [
        Phase::Detect,
        Phase::Analyze,
        Phase::Restore,
        Phase::Build,
        Phase::Export,
    ];

    /// Phases run on the collapsed path
    pub const COLLAPSED: [Phase; 1] = [Phase::Create];

    /// Name of the lifecycle binary implementing this phase
    pub fn binary(&self) -> &'static str {
        match self {
            Self::Detect => "detector",
            Self::Analyze => "analyzer",
            Self::Restore => "restorer",
            Self::Build => "builder",
            Self::Export => "exporter",
            Self::Create => "creator",
        }
    }

    /// Absolute path of the binary inside the container
    pub fn entrypoint(&self) -> String {
        format!("{}/{}", paths::LIFECYCLE, self.binary())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detect => "detect",
            Self::Analyze => "analyze",
            Self::Restore => "restore",
            Self::Build => "build",
            Self::Export => "export",
            Self::Create => "create",
        }
    }

    /// Access to the build cache
    pub fn cache_access(&self) -> CacheAccess {
        match self {
            Self::Detect | Self::Build => CacheAccess::None,
            Self::Analyze | Self::Restore => CacheAccess::ReadOnly,
            Self::Export | Self::Create => CacheAccess::ReadWrite,
        }
    }

    /// Whether the phase mounts the application source
    pub fn mounts_app(&self) -> bool {
        matches!(self, Self::Detect | Self::Build | Self::Export | Self::Create)
    }

    /// Whether the phase receives registry credentials.
    ///
    /// Analyze only reads the previous image, and only needs to when it
    /// lives in a registry.
    pub fn receives_credentials(&self, publish: bool) -> bool {
        match self {
            Self::Export | Self::Create => true,
            Self::Analyze => publish,
            _ => false,
        }
    }

    /// Whether the phase talks to the local image store
    pub fn uses_daemon(&self, publish: bool) -> bool {
        !publish && matches!(self, Self::Analyze | Self::Export | Self::Create)
    }

    /// Whether the phase runs buildpack code and so may be given network
    /// only at the user's request
    pub fn runs_buildpacks(&self) -> bool {
        matches!(self, Self::Detect | Self::Build)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_lowercase() {
        assert_eq!(Phase::Restore.to_string(), "restore");
        assert_eq!(Phase::Create.binary(), "creator");
        assert_eq!(Phase::Export.entrypoint(), "/cnb/lifecycle/exporter");
    }

    #[test]
    fn only_export_and_create_write_cache() {
        for phase in Phase::ISOLATED.iter().chain(Phase::COLLAPSED.iter()) {
            let writes = phase.cache_access() == CacheAccess::ReadWrite;
            assert_eq!(writes, matches!(phase, Phase::Export | Phase::Create), "{}", phase);
        }
        assert_eq!(Phase::Build.cache_access(), CacheAccess::None);
        assert_eq!(Phase::Restore.cache_access(), CacheAccess::ReadOnly);
    }

    #[test]
    fn credentials_follow_least_privilege() {
        assert!(!Phase::Detect.receives_credentials(true));
        assert!(!Phase::Build.receives_credentials(true));
        assert!(!Phase::Restore.receives_credentials(true));
        assert!(!Phase::Analyze.receives_credentials(false));
        assert!(Phase::Analyze.receives_credentials(true));
        assert!(Phase::Export.receives_credentials(false));
        assert!(Phase::Create.receives_credentials(false));
    }
}
