//! Cache volume identity and labels
//!
//! A cache volume is named after a hash of the builder, the app and the cache
//! strategy, so the same inputs always map to the same volume. Its labels
//! record the provenance it was filled under; a volume whose provenance no
//! longer matches is superseded rather than reused.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

/// Prefix shared by every kiln cache volume
pub const CACHE_PREFIX: &str = "kiln-cache-";

/// Volume label keys used to track cache metadata
pub mod labels {
    /// Marks volume as a kiln cache
    pub const KILN_CACHE: &str = "io.kiln.cache";
    /// Cache kind (build, launch)
    pub const KIND: &str = "io.kiln.cache.kind";
    /// App image the cache belongs to
    pub const APP: &str = "io.kiln.cache.app";
    /// Builder image the cache was filled by
    pub const BUILDER: &str = "io.kiln.cache.builder";
    /// Lifecycle version the cache was filled with
    pub const LIFECYCLE_VERSION: &str = "io.kiln.cache.lifecycle_version";
    /// Stack the cache was filled on
    pub const STACK_ID: &str = "io.kiln.cache.stack_id";
    /// Creation timestamp (RFC3339)
    pub const CREATED_AT: &str = "io.kiln.cache.created_at";
}

/// Which lifecycle cache a volume holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    /// Layers reused by restorer and builder
    Build,
    /// Launch layers reused by the exporter when exporting to the local store
    Launch,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Launch => "launch",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "build" => Some(Self::Build),
            "launch" => Some(Self::Launch),
            _ => None,
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the build cache lives
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum CacheStrategy {
    /// Named runtime volumes
    #[default]
    Volume,
    /// A registry image, passed to the lifecycle as `-cache-image`
    Image(String),
}

impl CacheStrategy {
    /// Stable string used in the volume identity hash
    pub fn key(&self) -> String {
        match self {
            Self::Volume => "volume".to_string(),
            Self::Image(reference) => format!("image:{}", reference),
        }
    }
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Volume => write!(f, "volume"),
            Self::Image(reference) => write!(f, "image {}", reference),
        }
    }
}

/// What a cache was filled under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub lifecycle_version: String,
    pub stack_id: String,
}

/// A kiln cache volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheVolume {
    /// Volume name (kiln-cache-{hash}.{kind})
    pub name: String,
    pub kind: CacheKind,
    pub app: String,
    pub builder: String,
    pub provenance: Provenance,
    /// When the volume was created
    pub created_at: DateTime<Utc>,
}

impl CacheVolume {
    /// A new cache volume record for the given identity
    pub fn new(
        builder: &str,
        app: &str,
        strategy: &CacheStrategy,
        kind: CacheKind,
        provenance: Provenance,
    ) -> Self {
        Self {
            name: volume_name(builder, app, strategy, kind),
            kind,
            app: app.to_string(),
            builder: builder.to_string(),
            provenance,
            created_at: Utc::now(),
        }
    }

    /// Generate labels for volume creation
    pub fn labels(&self) -> HashMap<String, String> {
        HashMap::from([
            (labels::KILN_CACHE.to_string(), "true".to_string()),
            (labels::KIND.to_string(), self.kind.to_string()),
            (labels::APP.to_string(), self.app.clone()),
            (labels::BUILDER.to_string(), self.builder.clone()),
            (
                labels::LIFECYCLE_VERSION.to_string(),
                self.provenance.lifecycle_version.clone(),
            ),
            (labels::STACK_ID.to_string(), self.provenance.stack_id.clone()),
            (labels::CREATED_AT.to_string(), self.created_at.to_rfc3339()),
        ])
    }

    /// Try to parse from volume labels
    pub fn from_labels(name: &str, labels: &HashMap<String, String>) -> Option<Self> {
        if labels.get(labels::KILN_CACHE).map(String::as_str) != Some("true") {
            return None;
        }

        let kind = labels.get(labels::KIND).and_then(|s| CacheKind::parse(s))?;
        let created_at = labels
            .get(labels::CREATED_AT)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Some(Self {
            name: name.to_string(),
            kind,
            app: labels.get(labels::APP)?.clone(),
            builder: labels.get(labels::BUILDER)?.clone(),
            provenance: Provenance {
                lifecycle_version: labels.get(labels::LIFECYCLE_VERSION)?.clone(),
                stack_id: labels.get(labels::STACK_ID)?.clone(),
            },
            created_at,
        })
    }

    /// Check if this volume is older than the given number of days
    pub fn is_older_than_days(&self, days: u32) -> bool {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
        self.created_at < cutoff
    }
}

/// Deterministic volume name for a cache identity
pub fn volume_name(builder: &str, app: &str, strategy: &CacheStrategy, kind: CacheKind) -> String {
    let mut hasher = Sha256::new();
    hasher.update(builder.as_bytes());
    hasher.update(b"|");
    hasher.update(app.as_bytes());
    hasher.update(b"|");
    hasher.update(strategy.key().as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{}{}.{}", CACHE_PREFIX, &digest[..12], kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provenance() -> Provenance {
        Provenance {
            lifecycle_version: "0.11.1".to_string(),
            stack_id: "io.buildpacks.stacks.bionic".to_string(),
        }
    }

    #[test]
    fn name_is_deterministic() {
        let a = volume_name("b", "app", &CacheStrategy::Volume, CacheKind::Build);
        let b = volume_name("b", "app", &CacheStrategy::Volume, CacheKind::Build);
        assert_eq!(a, b);
        assert!(a.starts_with(CACHE_PREFIX));
        assert!(a.ends_with(".build"));
        assert_eq!(a.len(), CACHE_PREFIX.len() + 12 + ".build".len());
    }

    #[test]
    fn name_differs_per_app_builder_and_strategy() {
        let base = volume_name("b", "app", &CacheStrategy::Volume, CacheKind::Build);
        assert_ne!(base, volume_name("b", "other-app", &CacheStrategy::Volume, CacheKind::Build));
        assert_ne!(base, volume_name("b2", "app", &CacheStrategy::Volume, CacheKind::Build));
        assert_ne!(
            base,
            volume_name("b", "app", &CacheStrategy::Image("r/c".into()), CacheKind::Build)
        );
    }

    #[test]
    fn kinds_share_the_hash() {
        let build = volume_name("b", "app", &CacheStrategy::Volume, CacheKind::Build);
        let launch = volume_name("b", "app", &CacheStrategy::Volume, CacheKind::Launch);
        assert_eq!(build.trim_end_matches(".build"), launch.trim_end_matches(".launch"));
    }

    #[test]
    fn labels_roundtrip() {
        let vol = CacheVolume::new("b", "app", &CacheStrategy::Volume, CacheKind::Launch, provenance());
        let parsed = CacheVolume::from_labels(&vol.name, &vol.labels()).unwrap();

        assert_eq!(parsed.kind, CacheKind::Launch);
        assert_eq!(parsed.provenance, provenance());
        assert_eq!(parsed.app, "app");
        assert_eq!(parsed.created_at.timestamp(), vol.created_at.timestamp());
    }

    #[test]
    fn foreign_volume_is_ignored() {
        let labels = HashMap::from([("io.other".to_string(), "x".to_string())]);
        assert!(CacheVolume::from_labels("kiln-cache-x.build", &labels).is_none());
    }

    #[test]
    fn missing_provenance_is_unparseable() {
        let vol = CacheVolume::new("b", "app", &CacheStrategy::Volume, CacheKind::Build, provenance());
        let mut labels = vol.labels();
        labels.remove(labels::STACK_ID);
        assert!(CacheVolume::from_labels(&vol.name, &labels).is_none());
    }

    #[test]
    fn age_check() {
        let mut vol = CacheVolume::new("b", "app", &CacheStrategy::Volume, CacheKind::Build, provenance());
        assert!(!vol.is_older_than_days(1));
        vol.created_at = Utc::now() - chrono::Duration::days(10);
        assert!(vol.is_older_than_days(7));
    }
}
