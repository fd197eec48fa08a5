//! Phase orchestration
//!
//! Turns a build request into a sequence of sandboxed lifecycle phases:
//!
//! 1. Check that the lifecycle can drive the builder (no container yet)
//! 2. Pick the strategy: one `creator` container for trusted builders,
//!    five isolated containers otherwise
//! 3. Resolve the cache volumes and create a per-build layers volume
//! 4. Run each phase to completion, stopping at the first failure
//! 5. Remove the layers volume; supersede a cache a failed phase wrote to

mod cancel;
pub mod context;
pub mod machine;
pub mod phase;

pub use cancel::CancelToken;
pub use machine::{BuildState, PhaseMachine};
pub use phase::{CacheAccess, Phase};

use crate::builder::BuilderImage;
use crate::cache::{CacheManager, CacheState, CacheStrategy, Provenance, ResolvedCache};
use crate::error::{KilnError, KilnResult};
use crate::lifecycle::{check_compatibility, ApiVersion, Lifecycle};
use crate::orchestration::ContainerRuntime;
use context::{PhaseContext, BUILD_LABEL};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Prefix of the per-build layers volume
pub const LAYERS_PREFIX: &str = "kiln-layers-";

/// How phases are mapped onto containers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// One `creator` container runs every phase
    Collapsed,
    /// Each phase runs in its own container
    Isolated,
}

impl ExecutionStrategy {
    /// Phases run under this strategy, in order
    pub fn plan(&self) -> &'static [Phase] {
        match self {
            Self::Collapsed => &Phase::COLLAPSED,
            Self::Isolated => &Phase::ISOLATED,
        }
    }

    /// Collapsed only for trusted builders with a lifecycle that can do it
    pub fn choose(trusted: bool, lifecycle: &dyn Lifecycle) -> Self {
        if !trusted {
            return Self::Isolated;
        }
        if lifecycle.supports_creator() {
            Self::Collapsed
        } else {
            warn!(
                "Lifecycle from {} cannot run phases in one container, running them separately",
                lifecycle.source_name()
            );
            Self::Isolated
        }
    }
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collapsed => write!(f, "collapsed"),
            Self::Isolated => write!(f, "isolated"),
        }
    }
}

/// What to build and how
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    /// Name of the app image to produce
    pub image: String,
    pub builder: String,
    pub app_dir: PathBuf,
    /// Export straight to a registry instead of the local image store
    pub publish: bool,
    /// Discard caches before building
    pub clear_cache: bool,
    pub cache: CacheStrategy,
    /// Build-time environment handed to buildpacks
    pub env: BTreeMap<String, String>,
    pub run_image: Option<String>,
    pub previous_image: Option<String>,
    /// Network for phases that run buildpacks
    pub network: Option<String>,
    /// Value of `CNB_REGISTRY_AUTH` for phases that talk to a registry
    pub registry_auth: Option<String>,
    /// Host socket of the local image store, required unless publishing
    pub daemon_socket: Option<PathBuf>,
    /// Lifecycle `-log-level`
    pub log_level: Option<String>,
}

/// Something that happened during a build
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    StrategyChosen(ExecutionStrategy),
    CacheResolved(Option<CacheState>),
    PhaseStarted { phase: Phase, index: usize, total: usize },
    Output { phase: Phase, line: String },
    PhaseFinished { phase: Phase, status: i32 },
}

/// Record of one completed phase
#[derive(Debug, Clone)]
pub struct PhaseLog {
    pub phase: Phase,
    pub status: i32,
    pub lines: Vec<String>,
    pub duration: Duration,
}

/// Result of a successful build
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub image: String,
    pub build_id: String,
    pub strategy: ExecutionStrategy,
    pub platform_api: ApiVersion,
    pub cache_state: Option<CacheState>,
    pub phases: Vec<PhaseLog>,
    pub duration: Duration,
}

impl BuildReport {
    /// Phases run, in order
    pub fn phases_run(&self) -> Vec<Phase> {
        self.phases.iter().map(|p| p.phase).collect()
    }
}

/// Drives the phases of one build through a container runtime
pub struct Orchestrator<'a> {
    runtime: &'a dyn ContainerRuntime,
    lifecycle: &'a dyn Lifecycle,
}

impl<'a> Orchestrator<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime, lifecycle: &'a dyn Lifecycle) -> Self {
        Self { runtime, lifecycle }
    }

    /// Run a build to completion.
    ///
    /// `trusted` is the trust store's verdict for `builder`; `on_event`
    /// receives progress and phase output as it happens.
    pub async fn build(
        &self,
        builder: &BuilderImage,
        request: &BuildRequest,
        trusted: bool,
        cancel: &CancelToken,
        on_event: &(dyn Fn(BuildEvent) + Send + Sync),
    ) -> KilnResult<BuildReport> {
        let started = Instant::now();

        let negotiated = check_compatibility(self.lifecycle.descriptor(), builder)?;
        if !request.publish && request.daemon_socket.is_none() {
            return Err(KilnError::User(
                "exporting to the local image store needs the podman socket; pass --publish to push to a registry instead".to_string(),
            ));
        }

        let strategy = ExecutionStrategy::choose(trusted, self.lifecycle);
        info!("Building {} with {} ({} phases)", request.image, builder.name, strategy);
        on_event(BuildEvent::StrategyChosen(strategy));

        let caches = CacheManager::new(self.runtime);
        if request.clear_cache {
            caches
                .clear_for(&builder.name, &request.image, &request.cache)
                .await?;
        }
        let provenance = Provenance {
            lifecycle_version: self.lifecycle.descriptor().info.version.to_string(),
            stack_id: builder.stack.id.clone(),
        };
        // Only an export to the local image store uses the launch cache
        let cache = caches
            .resolve(
                &builder.name,
                &request.image,
                &request.cache,
                &provenance,
                !request.publish,
            )
            .await?;
        on_event(BuildEvent::CacheResolved(cache.state()));

        let build_id = uuid::Uuid::new_v4().simple().to_string();
        let layers_volume = format!("{}{}", LAYERS_PREFIX, build_id);
        self.runtime
            .volume_create(
                &layers_volume,
                &HashMap::from([(BUILD_LABEL.to_string(), build_id.clone())]),
            )
            .await?;

        let outcome = self
            .run_phases(PhaseRun {
                builder,
                request,
                strategy,
                cache: &cache,
                platform_api: negotiated.platform_api,
                build_id: &build_id,
                layers_volume: &layers_volume,
                cancel,
                on_event,
            })
            .await;

        if let Err(e) = self.runtime.volume_remove(&layers_volume).await {
            warn!("Failed to remove layers volume {}: {}", layers_volume, e);
        }

        let phases = outcome?;
        info!("Built {} in {:.1}s", request.image, started.elapsed().as_secs_f64());
        Ok(BuildReport {
            image: request.image.clone(),
            build_id,
            strategy,
            platform_api: negotiated.platform_api,
            cache_state: cache.state(),
            phases,
            duration: started.elapsed(),
        })
    }

    async fn run_phases(&self, run: PhaseRun<'_>) -> KilnResult<Vec<PhaseLog>> {
        let platform_dir = write_platform_dir(&run.request.env)?;
        let ctx = PhaseContext {
            build_id: run.build_id,
            builder_image: &run.builder.name,
            app_image: &run.request.image,
            app_dir: run.request.app_dir.clone(),
            platform_dir: platform_dir.path().to_path_buf(),
            layers_volume: run.layers_volume,
            cache: run.cache,
            platform_api: run.platform_api,
            publish: run.request.publish,
            run_image: run
                .request
                .run_image
                .as_deref()
                .or(run.builder.stack.run_image.as_deref()),
            previous_image: run.request.previous_image.as_deref(),
            network: run.request.network.as_deref(),
            registry_auth: run.request.registry_auth.as_deref(),
            daemon_socket: run.request.daemon_socket.clone(),
            log_level: run.request.log_level.as_deref(),
        };

        let mut machine = PhaseMachine::new(run.strategy.plan());
        let total = machine.len();
        let mut logs = Vec::new();

        while let Some(phase) = machine.next_phase() {
            let index = logs.len() + 1;
            (run.on_event)(BuildEvent::PhaseStarted { phase, index, total });
            let phase_started = Instant::now();

            let result = self.run_phase(&ctx, phase, run.cancel, run.on_event).await;
            let (status, lines) = match result {
                Ok(done) => done,
                Err(e) => {
                    machine.abort(-1);
                    self.discard_written_cache(phase, run.cache).await;
                    return Err(e);
                }
            };

            (run.on_event)(BuildEvent::PhaseFinished { phase, status });
            match machine.finish(status) {
                BuildState::Failed { phase, status } => {
                    self.discard_written_cache(phase, run.cache).await;
                    return Err(KilnError::PhaseExecution { phase, status });
                }
                _ => {
                    debug!("Phase {} finished in {:?}", phase, phase_started.elapsed());
                    logs.push(PhaseLog {
                        phase,
                        status,
                        lines,
                        duration: phase_started.elapsed(),
                    });
                }
            }
        }

        Ok(logs)
    }

    /// Create, provision and run one phase container, always removing it
    async fn run_phase(
        &self,
        ctx: &PhaseContext<'_>,
        phase: Phase,
        cancel: &CancelToken,
        on_event: &(dyn Fn(BuildEvent) + Send + Sync),
    ) -> KilnResult<(i32, Vec<String>)> {
        if cancel.is_cancelled() {
            return Err(KilnError::BuildCancelled { phase });
        }

        let config = ctx.container_for(phase);
        let container_id = self.runtime.create(&config).await?;
        debug!("Phase {} in container {}", phase, container_id);

        let lines = Mutex::new(Vec::new());
        let on_output = |line: String| {
            if let Ok(mut lines) = lines.lock() {
                lines.push(line.clone());
            }
            on_event(BuildEvent::Output { phase, line });
        };
        let result = self
            .execute(&container_id, phase, cancel, &on_output)
            .await;

        if let Err(e) = self.runtime.remove(&container_id).await {
            warn!("Failed to remove container {}: {}", container_id, e);
        }

        let status = result?;
        let lines = lines.into_inner().unwrap_or_default();
        Ok((status, lines))
    }

    /// Provision the lifecycle into a created container and run it
    async fn execute(
        &self,
        container_id: &str,
        phase: Phase,
        cancel: &CancelToken,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> KilnResult<i32> {
        let archive = self.lifecycle.open()?;
        self.runtime
            .copy_archive(container_id, phase::paths::CNB, archive)
            .await?;

        tokio::select! {
            status = self.runtime.start_attached(container_id, on_output) => status,
            _ = cancel.cancelled() => {
                warn!("Cancelling phase {}", phase);
                if let Err(e) = self.runtime.kill(container_id).await {
                    warn!("Failed to kill container {}: {}", container_id, e);
                }
                Err(KilnError::BuildCancelled { phase })
            }
        }
    }

    /// Supersede caches a phase mounted writable and did not finish cleanly
    async fn discard_written_cache(&self, phase: Phase, cache: &ResolvedCache) {
        if phase.cache_access() != CacheAccess::ReadWrite {
            return;
        }
        let caches = CacheManager::new(self.runtime);
        for volume in [cache.build_volume(), cache.launch_volume()].into_iter().flatten() {
            if let Err(e) = caches.invalidate(volume).await {
                warn!("Failed to invalidate cache volume {}: {}", volume.name, e);
            }
        }
    }
}

/// Borrowed inputs of one phase sequence
struct PhaseRun<'r> {
    builder: &'r BuilderImage,
    request: &'r BuildRequest,
    strategy: ExecutionStrategy,
    cache: &'r ResolvedCache,
    platform_api: ApiVersion,
    build_id: &'r str,
    layers_volume: &'r str,
    cancel: &'r CancelToken,
    on_event: &'r (dyn Fn(BuildEvent) + Send + Sync),
}

/// Host directory mounted at `/platform`, with one `env/<NAME>` file per variable
fn write_platform_dir(env: &BTreeMap<String, String>) -> KilnResult<tempfile::TempDir> {
    let dir = tempfile::Builder::new()
        .prefix("kiln-platform-")
        .tempdir()
        .map_err(|e| KilnError::io("creating platform directory", e))?;
    let env_dir = dir.path().join("env");
    std::fs::create_dir_all(&env_dir)
        .map_err(|e| KilnError::io(format!("creating {}", env_dir.display()), e))?;

    for (name, value) in env {
        validate_env_name(name)?;
        let path = env_dir.join(name);
        std::fs::write(&path, value)
            .map_err(|e| KilnError::io(format!("writing {}", path.display()), e))?;
    }
    Ok(dir)
}

fn validate_env_name(name: &str) -> KilnResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(KilnError::User(format!("invalid environment variable name '{}'", name)))
    }
}

/// Default podman socket of the current user
pub fn default_daemon_socket() -> Option<PathBuf> {
    let runtime_dir = dirs::runtime_dir()?;
    let socket = runtime_dir.join("podman").join("podman.sock");
    socket.exists().then_some(socket)
}
