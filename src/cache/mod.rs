//! Cache volume management
//!
//! Each (builder, app, strategy) triple owns exactly one build cache volume
//! and one launch cache volume. Resolution is idempotent:
//!
//! | State | Meaning |
//! |-------|---------|
//! | Hit | Volume exists and its provenance matches; reused |
//! | Invalidated | Volume existed with other provenance; removed and recreated empty |
//! | Miss | No volume existed; created |
//!
//! Volumes are never relabelled in place. Anything stale or torn is removed
//! and a fresh volume takes its name.

pub mod volume;

pub use volume::{labels, CacheKind, CacheStrategy, CacheVolume, Provenance, CACHE_PREFIX};

use crate::error::KilnResult;
use crate::orchestration::ContainerRuntime;
use std::fmt;
use tracing::{debug, info};

/// Outcome of resolving a cache volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Hit,
    Invalidated,
    Miss,
}

impl CacheState {
    /// Combined state of two volumes resolved together
    fn combine(self, other: Self) -> Self {
        use CacheState::*;
        match (self, other) {
            (Invalidated, _) | (_, Invalidated) => Invalidated,
            (Hit, Hit) => Hit,
            _ => Miss,
        }
    }
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hit => write!(f, "hit"),
            Self::Invalidated => write!(f, "invalidated"),
            Self::Miss => write!(f, "miss"),
        }
    }
}

/// Caches a build will use
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedCache {
    /// Build cache volume, plus a launch cache volume when exporting to the
    /// local image store. All are present in the runtime.
    Volumes {
        build: CacheVolume,
        launch: Option<CacheVolume>,
        state: CacheState,
    },
    /// Registry cache image; nothing is mounted
    Image(String),
}

impl ResolvedCache {
    /// The build cache volume, if volumes are used
    pub fn build_volume(&self) -> Option<&CacheVolume> {
        match self {
            Self::Volumes { build, .. } => Some(build),
            Self::Image(_) => None,
        }
    }

    /// The launch cache volume, if volumes are used
    pub fn launch_volume(&self) -> Option<&CacheVolume> {
        match self {
            Self::Volumes { launch, .. } => launch.as_ref(),
            Self::Image(_) => None,
        }
    }

    /// The cache image reference, if an image is used
    pub fn image(&self) -> Option<&str> {
        match self {
            Self::Image(reference) => Some(reference),
            Self::Volumes { .. } => None,
        }
    }

    /// Resolution state of the volumes, if volumes are used
    pub fn state(&self) -> Option<CacheState> {
        match self {
            Self::Volumes { state, .. } => Some(*state),
            Self::Image(_) => None,
        }
    }
}

/// Manages kiln cache volumes through a container runtime
pub struct CacheManager<'a> {
    runtime: &'a dyn ContainerRuntime,
}

impl<'a> CacheManager<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime) -> Self {
        Self { runtime }
    }

    /// Resolve the caches for a build, creating or superseding volumes as needed.
    ///
    /// The launch cache is only resolved when `with_launch` is set; no other
    /// export mounts it.
    pub async fn resolve(
        &self,
        builder: &str,
        app: &str,
        strategy: &CacheStrategy,
        provenance: &Provenance,
        with_launch: bool,
    ) -> KilnResult<ResolvedCache> {
        if let CacheStrategy::Image(reference) = strategy {
            debug!("Using cache image {}", reference);
            return Ok(ResolvedCache::Image(reference.clone()));
        }

        let (build, build_state) = self
            .resolve_volume(builder, app, strategy, CacheKind::Build, provenance)
            .await?;
        if !with_launch {
            return Ok(ResolvedCache::Volumes {
                build,
                launch: None,
                state: build_state,
            });
        }
        let (launch, launch_state) = self
            .resolve_volume(builder, app, strategy, CacheKind::Launch, provenance)
            .await?;

        Ok(ResolvedCache::Volumes {
            build,
            launch: Some(launch),
            state: build_state.combine(launch_state),
        })
    }

    async fn resolve_volume(
        &self,
        builder: &str,
        app: &str,
        strategy: &CacheStrategy,
        kind: CacheKind,
        provenance: &Provenance,
    ) -> KilnResult<(CacheVolume, CacheState)> {
        let wanted = CacheVolume::new(builder, app, strategy, kind, provenance.clone());

        let state = match self.runtime.volume_inspect(&wanted.name).await? {
            None => CacheState::Miss,
            Some(info) => match CacheVolume::from_labels(&info.name, &info.labels) {
                Some(existing) if existing.provenance == *provenance => {
                    debug!("Cache hit: {}", existing.name);
                    return Ok((existing, CacheState::Hit));
                }
                Some(existing) => {
                    info!(
                        "Cache volume {} is invalid (filled by lifecycle {} on stack {}), superseding",
                        existing.name,
                        existing.provenance.lifecycle_version,
                        existing.provenance.stack_id
                    );
                    self.runtime.volume_remove(&existing.name).await?;
                    CacheState::Invalidated
                }
                None => {
                    info!("Cache volume {} has no usable labels, superseding", info.name);
                    self.runtime.volume_remove(&info.name).await?;
                    CacheState::Invalidated
                }
            },
        };

        self.runtime
            .volume_create(&wanted.name, &wanted.labels())
            .await?;
        debug!("Created cache volume {} ({})", wanted.name, state);
        Ok((wanted, state))
    }

    /// Remove a cache volume; the next resolve yields a fresh one
    pub async fn invalidate(&self, volume: &CacheVolume) -> KilnResult<()> {
        info!("Invalidating cache volume {}", volume.name);
        self.runtime.volume_remove(&volume.name).await
    }

    /// Remove both cache volumes of an identity, whether or not they exist
    pub async fn clear_for(&self, builder: &str, app: &str, strategy: &CacheStrategy) -> KilnResult<()> {
        for kind in [CacheKind::Build, CacheKind::Launch] {
            let name = volume::volume_name(builder, app, strategy, kind);
            debug!("Clearing cache volume {}", name);
            self.runtime.volume_remove(&name).await?;
        }
        Ok(())
    }

    /// All kiln cache volumes with parseable labels
    pub async fn list(&self) -> KilnResult<Vec<CacheVolume>> {
        let volumes = self.runtime.volume_list(CACHE_PREFIX).await?;
        let mut caches: Vec<CacheVolume> = volumes
            .iter()
            .filter_map(|v| CacheVolume::from_labels(&v.name, &v.labels))
            .collect();
        caches.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(caches)
    }

    /// Remove caches older than `days`. Returns the removed names.
    pub async fn gc(&self, days: u32) -> KilnResult<Vec<String>> {
        let mut removed = Vec::new();
        for cache in self.list().await? {
            if cache.is_older_than_days(days) {
                self.runtime.volume_remove(&cache.name).await?;
                removed.push(cache.name);
            }
        }
        Ok(removed)
    }

    /// Remove every kiln cache volume. Returns the removed names.
    pub async fn clear(&self) -> KilnResult<Vec<String>> {
        let volumes = self.runtime.volume_list(CACHE_PREFIX).await?;
        let mut removed = Vec::new();
        for v in volumes {
            self.runtime.volume_remove(&v.name).await?;
            removed.push(v.name);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRuntime;
    use chrono::Utc;

    fn provenance(version: &str) -> Provenance {
        Provenance {
            lifecycle_version: version.to_string(),
            stack_id: "io.buildpacks.stacks.bionic".to_string(),
        }
    }

    #[tokio::test]
    async fn first_resolve_is_miss_then_hit() {
        let runtime = FakeRuntime::new();
        let manager = CacheManager::new(&runtime);
        let p = provenance("0.11.1");

        let first = manager.resolve("b", "app", &CacheStrategy::Volume, &p, true).await.unwrap();
        assert_eq!(first.state(), Some(CacheState::Miss));

        let second = manager.resolve("b", "app", &CacheStrategy::Volume, &p, true).await.unwrap();
        assert_eq!(second.state(), Some(CacheState::Hit));
        assert_eq!(
            first.build_volume().unwrap().name,
            second.build_volume().unwrap().name
        );
        assert_eq!(runtime.volume_names().len(), 2);
    }

    #[tokio::test]
    async fn provenance_change_supersedes() {
        let runtime = FakeRuntime::new();
        let manager = CacheManager::new(&runtime);

        let old = manager
            .resolve("b", "app", &CacheStrategy::Volume, &provenance("0.10.0"), true)
            .await
            .unwrap();
        let new = manager
            .resolve("b", "app", &CacheStrategy::Volume, &provenance("0.11.1"), true)
            .await
            .unwrap();

        assert_eq!(new.state(), Some(CacheState::Invalidated));
        let name = &new.build_volume().unwrap().name;
        assert_eq!(name, &old.build_volume().unwrap().name);
        assert_eq!(
            runtime.volume_labels(name).unwrap()[labels::LIFECYCLE_VERSION],
            "0.11.1"
        );
        assert!(runtime.removed_volumes().contains(name));
    }

    #[tokio::test]
    async fn apps_never_share_volumes() {
        let runtime = FakeRuntime::new();
        let manager = CacheManager::new(&runtime);
        let p = provenance("0.11.1");

        let a = manager.resolve("b", "app-a", &CacheStrategy::Volume, &p, true).await.unwrap();
        let b = manager.resolve("b", "app-b", &CacheStrategy::Volume, &p, true).await.unwrap();
        assert_ne!(a.build_volume().unwrap().name, b.build_volume().unwrap().name);
        assert_eq!(b.state(), Some(CacheState::Miss));
    }

    #[tokio::test]
    async fn image_strategy_creates_nothing() {
        let runtime = FakeRuntime::new();
        let manager = CacheManager::new(&runtime);

        let resolved = manager
            .resolve("b", "app", &CacheStrategy::Image("reg/cache".into()), &provenance("0.11.1"), true)
            .await
            .unwrap();
        assert_eq!(resolved.image(), Some("reg/cache"));
        assert!(runtime.volume_names().is_empty());
    }

    #[tokio::test]
    async fn invalidate_then_resolve_is_fresh() {
        let runtime = FakeRuntime::new();
        let manager = CacheManager::new(&runtime);
        let p = provenance("0.11.1");

        let resolved = manager.resolve("b", "app", &CacheStrategy::Volume, &p, true).await.unwrap();
        manager.invalidate(resolved.build_volume().unwrap()).await.unwrap();

        let again = manager.resolve("b", "app", &CacheStrategy::Volume, &p, true).await.unwrap();
        // Launch volume survived, build volume was recreated
        assert_eq!(again.state(), Some(CacheState::Miss));
    }

    #[tokio::test]
    async fn registry_export_skips_launch_cache() {
        let runtime = FakeRuntime::new();
        let manager = CacheManager::new(&runtime);
        let p = provenance("0.11.1");

        let resolved = manager.resolve("b", "app", &CacheStrategy::Volume, &p, false).await.unwrap();
        assert!(resolved.launch_volume().is_none());
        assert_eq!(resolved.state(), Some(CacheState::Miss));
        assert_eq!(
            runtime.volume_names(),
            vec![resolved.build_volume().unwrap().name.clone()]
        );

        let again = manager.resolve("b", "app", &CacheStrategy::Volume, &p, false).await.unwrap();
        assert_eq!(again.state(), Some(CacheState::Hit));
    }

    #[tokio::test]
    async fn gc_removes_only_old_caches() {
        let runtime = FakeRuntime::new();
        let manager = CacheManager::new(&runtime);

        let mut old = CacheVolume::new("b", "old", &CacheStrategy::Volume, CacheKind::Build, provenance("0.11.1"));
        old.created_at = Utc::now() - chrono::Duration::days(60);
        runtime.volume_create(&old.name, &old.labels()).await.unwrap();
        manager
            .resolve("b", "fresh", &CacheStrategy::Volume, &provenance("0.11.1"), true)
            .await
            .unwrap();

        let removed = manager.gc(30).await.unwrap();
        assert_eq!(removed, vec![old.name.clone()]);
        assert_eq!(manager.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let runtime = FakeRuntime::new();
        let manager = CacheManager::new(&runtime);
        manager
            .resolve("b", "app", &CacheStrategy::Volume, &provenance("0.11.1"), true)
            .await
            .unwrap();

        assert_eq!(manager.clear().await.unwrap().len(), 2);
        assert!(manager.list().await.unwrap().is_empty());
    }
}
