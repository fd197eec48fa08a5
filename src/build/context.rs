//! Per-phase container construction
//!
//! Each phase gets only what it needs: the cache is mounted with the access
//! the phase declares, registry credentials go only to phases that talk to a
//! registry, and phases that execute buildpack code run without network
//! unless the user asked for it.

use crate::build::phase::{paths, CacheAccess, Phase};
use crate::cache::ResolvedCache;
use crate::lifecycle::ApiVersion;
use crate::orchestration::{ContainerConfig, Mount, NETWORK_NONE};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Label carrying the build ID on every phase container
pub const BUILD_LABEL: &str = "io.kiln.build";
/// Label carrying the phase name on every phase container
pub const PHASE_LABEL: &str = "io.kiln.phase";

pub const PLATFORM_API_ENV: &str = "CNB_PLATFORM_API";
pub const REGISTRY_AUTH_ENV: &str = "CNB_REGISTRY_AUTH";

/// Everything needed to construct any phase container of one build
#[derive(Debug, Clone)]
pub struct PhaseContext<'a> {
    pub build_id: &'a str,
    pub builder_image: &'a str,
    pub app_image: &'a str,
    pub app_dir: PathBuf,
    pub platform_dir: PathBuf,
    pub layers_volume: &'a str,
    pub cache: &'a ResolvedCache,
    pub platform_api: ApiVersion,
    pub publish: bool,
    pub run_image: Option<&'a str>,
    pub previous_image: Option<&'a str>,
    /// Network for phases that run buildpacks; none when unset
    pub network: Option<&'a str>,
    pub registry_auth: Option<&'a str>,
    /// Host socket of the local image store
    pub daemon_socket: Option<PathBuf>,
    pub log_level: Option<&'a str>,
}

impl PhaseContext<'_> {
    /// Container configuration for `phase`
    pub fn container_for(&self, phase: Phase) -> ContainerConfig {
        let mut config = ContainerConfig::new(self.builder_image);
        config.entrypoint = Some(phase.entrypoint());
        config.args = self.args_for(phase);
        config.network = self.network_for(phase);
        config.labels = BTreeMap::from([
            (BUILD_LABEL.to_string(), self.build_id.to_string()),
            (PHASE_LABEL.to_string(), phase.to_string()),
        ]);

        config
            .env
            .insert(PLATFORM_API_ENV.to_string(), self.platform_api.to_string());
        if self.receives_credentials(phase) {
            if let Some(auth) = self.registry_auth {
                config
                    .env
                    .insert(REGISTRY_AUTH_ENV.to_string(), auth.to_string());
            }
        }

        config.mounts = self.mounts_for(phase);
        if self.uses_daemon(phase) {
            // The local image store socket is only reachable as root
            config.user = Some("root".to_string());
        }
        config
    }

    fn receives_credentials(&self, phase: Phase) -> bool {
        phase.receives_credentials(self.publish)
            || (phase == Phase::Restore && self.cache.image().is_some())
    }

    fn uses_daemon(&self, phase: Phase) -> bool {
        phase.uses_daemon(self.publish) && self.daemon_socket.is_some()
    }

    /// Whether the phase needs to reach a registry
    fn needs_registry(&self, phase: Phase) -> bool {
        match phase {
            Phase::Export | Phase::Create => true,
            Phase::Analyze => self.publish || self.cache.image().is_some(),
            Phase::Restore => self.cache.image().is_some(),
            Phase::Detect | Phase::Build => false,
        }
    }

    fn network_for(&self, phase: Phase) -> Option<String> {
        if phase.runs_buildpacks() {
            return Some(self.network.unwrap_or(NETWORK_NONE).to_string());
        }
        if phase == Phase::Create {
            // Runs buildpacks but must also reach the registry
            return self.network.map(String::from);
        }
        if self.needs_registry(phase) {
            None
        } else {
            Some(NETWORK_NONE.to_string())
        }
    }

    fn mounts_for(&self, phase: Phase) -> Vec<Mount> {
        let mut mounts = vec![Mount::new(self.layers_volume, paths::LAYERS)];

        if phase.mounts_app() {
            let app = self.app_dir.display().to_string();
            mounts.push(match phase {
                Phase::Build | Phase::Create => Mount::new(app, paths::APP),
                _ => Mount::read_only(app, paths::APP),
            });
        }

        if matches!(phase, Phase::Detect | Phase::Build | Phase::Create) {
            mounts.push(Mount::read_only(
                self.platform_dir.display().to_string(),
                paths::PLATFORM,
            ));
        }

        if let Some(build) = self.cache.build_volume() {
            match phase.cache_access() {
                CacheAccess::None => {}
                CacheAccess::ReadOnly => mounts.push(Mount::read_only(&build.name, paths::CACHE)),
                CacheAccess::ReadWrite => mounts.push(Mount::new(&build.name, paths::CACHE)),
            }
        }

        if let Some(launch) = self.cache.launch_volume() {
            if self.uses_daemon(phase) && phase.cache_access() == CacheAccess::ReadWrite {
                mounts.push(Mount::new(&launch.name, paths::LAUNCH_CACHE));
            }
        }

        if self.uses_daemon(phase) {
            if let Some(ref socket) = self.daemon_socket {
                mounts.push(Mount::new(socket.display().to_string(), paths::DAEMON_SOCKET));
            }
        }

        mounts
    }

    fn args_for(&self, phase: Phase) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        let mut flag = |name: &str, value: &str| {
            args.push(format!("-{}", name));
            args.push(value.to_string());
        };

        if let Some(level) = self.log_level {
            flag("log-level", level);
        }
        if phase.mounts_app() {
            flag("app", paths::APP);
        }
        flag("layers", paths::LAYERS);
        if matches!(phase, Phase::Detect | Phase::Build | Phase::Create) {
            flag("platform", paths::PLATFORM);
        }

        if phase.cache_access() != CacheAccess::None {
            match self.cache.image() {
                Some(reference) => flag("cache-image", reference),
                None => flag("cache-dir", paths::CACHE),
            }
        }

        if phase.cache_access() == CacheAccess::ReadWrite
            && self.uses_daemon(phase)
            && self.cache.launch_volume().is_some()
        {
            flag("launch-cache", paths::LAUNCH_CACHE);
        }

        if matches!(phase, Phase::Export | Phase::Create) {
            if let Some(run_image) = self.run_image {
                flag("run-image", run_image);
            }
        }
        if matches!(phase, Phase::Analyze | Phase::Create) {
            if let Some(previous) = self.previous_image {
                flag("previous-image", previous);
            }
        }

        if self.uses_daemon(phase) {
            args.push("-daemon".to_string());
        }

        if matches!(phase, Phase::Analyze | Phase::Export | Phase::Create) {
            args.push(self.app_image.to_string());
        }

        args
    }
}
