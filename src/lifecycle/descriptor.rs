//! Lifecycle descriptor (`lifecycle.toml`)
//!
//! Two shapes exist in the wild. Current lifecycles publish API sets:
//!
//! ```toml
//! [apis.buildpack]
//! deprecated = []
//! supported = ["0.2", "0.3"]
//!
//! [apis.platform]
//! supported = ["0.3", "0.4"]
//!
//! [lifecycle]
//! version = "0.9.1"
//! ```
//!
//! Older ones publish a single `[api]` version per API. Both are normalised
//! into [`LifecycleApis`].

use crate::error::{KilnError, KilnResult};
use crate::lifecycle::api::{ApiSet, ApiVersion};
use serde::{Deserialize, Serialize};

/// Lifecycle version information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleInfo {
    pub version: semver::Version,
}

/// Buildpack and platform API support of a lifecycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleApis {
    pub buildpack: ApiSet,
    pub platform: ApiSet,
}

/// A buildpack reference inside an order group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildpackRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub optional: bool,
}

/// One group of buildpacks tried together during detection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderGroup {
    pub group: Vec<BuildpackRef>,
}

/// Immutable description of a lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleDescriptor {
    pub info: LifecycleInfo,
    pub apis: LifecycleApis,
    /// Default buildpack order used when the builder does not declare one
    pub order: Vec<OrderGroup>,
}

#[derive(Deserialize)]
struct RawDescriptor {
    lifecycle: LifecycleInfo,
    apis: Option<LifecycleApis>,
    api: Option<RawLegacyApi>,
    #[serde(default)]
    order: Vec<OrderGroup>,
}

#[derive(Deserialize)]
struct RawLegacyApi {
    buildpack: ApiVersion,
    platform: ApiVersion,
}

impl LifecycleDescriptor {
    /// Parse a `lifecycle.toml` document
    pub fn parse(content: &str, source_name: &str) -> KilnResult<Self> {
        let raw: RawDescriptor = toml::from_str(content)
            .map_err(|e| KilnError::lifecycle_invalid(source_name, e.to_string()))?;

        let apis = match (raw.apis, raw.api) {
            (Some(apis), _) => apis,
            (None, Some(legacy)) => LifecycleApis {
                buildpack: ApiSet::single(legacy.buildpack),
                platform: ApiSet::single(legacy.platform),
            },
            (None, None) => {
                return Err(KilnError::lifecycle_invalid(
                    source_name,
                    "lifecycle.toml declares no [apis] or [api] section",
                ))
            }
        };

        if apis.platform.supported.is_empty() || apis.buildpack.supported.is_empty() {
            return Err(KilnError::lifecycle_invalid(
                source_name,
                "lifecycle.toml must support at least one platform and one buildpack API",
            ));
        }

        Ok(Self {
            info: raw.lifecycle,
            apis,
            order: raw.order,
        })
    }

    /// The newest platform API this lifecycle supports
    pub fn latest_platform_api(&self) -> Option<ApiVersion> {
        self.apis.platform.supported.iter().max().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CURRENT: &str = r#"
[apis]
[apis.buildpack]
  deprecated = ["0.2"]
  supported = ["0.2", "0.3", "0.4", "0.5"]
[apis.platform]
  deprecated = []
  supported = ["0.3", "0.4", "0.5", "0.6"]

[lifecycle]
  version = "0.11.1"

[[order]]
group = [{ id = "example/node", version = "1.0.0" }, { id = "example/procfile", optional = true }]
"#;

    const LEGACY: &str = r#"
[api]
  platform = "0.2"
  buildpack = "0.2"

[lifecycle]
  version = "0.7.2"
"#;

    #[test]
    fn parses_api_sets() {
        let d = LifecycleDescriptor::parse(CURRENT, "test").unwrap();
        assert_eq!(d.info.version, semver::Version::new(0, 11, 1));
        assert_eq!(d.apis.buildpack.supported.len(), 4);
        assert!(d.apis.buildpack.is_deprecated(&ApiVersion::new(0, 2)));
        assert_eq!(d.latest_platform_api(), Some(ApiVersion::new(0, 6)));
        assert_eq!(d.order.len(), 1);
        assert!(d.order[0].group[1].optional);
        assert_eq!(d.order[0].group[1].version, None);
    }

    #[test]
    fn normalises_legacy_api_section() {
        let d = LifecycleDescriptor::parse(LEGACY, "test").unwrap();
        assert_eq!(d.apis.platform, ApiSet::single(ApiVersion::new(0, 2)));
        assert_eq!(d.apis.buildpack, ApiSet::single(ApiVersion::new(0, 2)));
        assert!(d.order.is_empty());
    }

    #[test]
    fn rejects_missing_api_declaration() {
        let err = LifecycleDescriptor::parse("[lifecycle]\nversion = \"0.9.0\"\n", "bad").unwrap_err();
        assert!(matches!(err, KilnError::LifecycleInvalid { .. }));
    }

    #[test]
    fn rejects_bad_version() {
        let content = LEGACY.replace("0.7.2", "seven");
        assert!(LifecycleDescriptor::parse(&content, "bad").is_err());
    }
}
