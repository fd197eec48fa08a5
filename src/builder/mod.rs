//! Builder image metadata
//!
//! A builder declares its stack, the lifecycle it was assembled with, its
//! buildpacks and their default order through image labels. Trust is not a
//! property of the image; ask the trust store by name.

use crate::config::PullPolicy;
use crate::error::{KilnError, KilnResult};
use crate::lifecycle::{ApiSet, ApiVersion, BuildpackRef, OrderGroup};
use crate::orchestration::ContainerRuntime;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

pub const METADATA_LABEL: &str = "io.buildpacks.builder.metadata";
pub const STACK_ID_LABEL: &str = "io.buildpacks.stack.id";
pub const MIXINS_LABEL: &str = "io.buildpacks.stack.mixins";
pub const BUILDPACK_LAYERS_LABEL: &str = "io.buildpacks.buildpack.layers";
pub const ORDER_LABEL: &str = "io.buildpacks.buildpack.order";

/// Stack the builder was built on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackInfo {
    pub id: String,
    pub mixins: Vec<String>,
    /// Default run image for exported app images
    pub run_image: Option<String>,
    pub run_image_mirrors: Vec<String>,
}

/// Lifecycle the builder declares it was assembled with
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuilderLifecycle {
    pub version: Option<semver::Version>,
    pub platform_apis: ApiSet,
    pub buildpack_apis: ApiSet,
}

/// How a set of API versions constrains a lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiRequirement {
    /// All of these must be served
    Each(Vec<ApiVersion>),
    /// At least one of these must be served, no constraint when empty
    Any(Vec<ApiVersion>),
}

/// A buildpack packaged in the builder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderBuildpack {
    pub id: String,
    pub version: String,
    /// Buildpack API the buildpack was written against
    pub api: Option<ApiVersion>,
}

/// Parsed builder image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderImage {
    pub name: String,
    pub description: Option<String>,
    pub stack: StackInfo,
    pub lifecycle: BuilderLifecycle,
    pub buildpacks: Vec<BuilderBuildpack>,
    pub order: Vec<OrderGroup>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMetadata {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    stack: RawStack,
    #[serde(default)]
    lifecycle: RawLifecycle,
    #[serde(default)]
    buildpacks: Vec<RawBuildpack>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawStack {
    #[serde(default)]
    run_image: RawRunImage,
}

#[derive(Deserialize, Default)]
struct RawRunImage {
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    mirrors: Vec<String>,
}

#[derive(Deserialize, Default)]
struct RawLifecycle {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    api: Option<RawLegacyApi>,
    #[serde(default)]
    apis: Option<RawApis>,
}

#[derive(Deserialize)]
struct RawLegacyApi {
    buildpack: ApiVersion,
    platform: ApiVersion,
}

#[derive(Deserialize)]
struct RawApis {
    #[serde(default)]
    buildpack: ApiSet,
    #[serde(default)]
    platform: ApiSet,
}

#[derive(Deserialize)]
struct RawBuildpack {
    id: String,
    #[serde(default)]
    version: String,
}

/// `io.buildpacks.buildpack.layers`: id -> version -> layer info
#[derive(Deserialize)]
struct RawLayerInfo {
    #[serde(default)]
    api: Option<ApiVersion>,
}

impl BuilderImage {
    /// Parse builder metadata out of an image's labels
    pub fn from_labels(name: &str, labels: &HashMap<String, String>) -> KilnResult<Self> {
        let invalid = |reason: String| KilnError::BuilderMetadata {
            name: name.to_string(),
            reason,
        };

        let raw_metadata = labels
            .get(METADATA_LABEL)
            .ok_or_else(|| invalid(format!("missing label {}", METADATA_LABEL)))?;
        let metadata: RawMetadata = serde_json::from_str(raw_metadata)
            .map_err(|e| invalid(format!("parsing {}: {}", METADATA_LABEL, e)))?;

        let stack_id = labels
            .get(STACK_ID_LABEL)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| invalid(format!("missing label {}", STACK_ID_LABEL)))?;

        let mixins: Vec<String> = match labels.get(MIXINS_LABEL) {
            Some(raw) => serde_json::from_str(raw)
                .map_err(|e| invalid(format!("parsing {}: {}", MIXINS_LABEL, e)))?,
            None => Vec::new(),
        };

        let layer_apis: BTreeMap<String, BTreeMap<String, RawLayerInfo>> =
            match labels.get(BUILDPACK_LAYERS_LABEL) {
                Some(raw) => serde_json::from_str(raw)
                    .map_err(|e| invalid(format!("parsing {}: {}", BUILDPACK_LAYERS_LABEL, e)))?,
                None => BTreeMap::new(),
            };

        let order: Vec<OrderGroup> = match labels.get(ORDER_LABEL) {
            Some(raw) => serde_json::from_str(raw)
                .map_err(|e| invalid(format!("parsing {}: {}", ORDER_LABEL, e)))?,
            None => Vec::new(),
        };

        let lifecycle = parse_lifecycle(metadata.lifecycle).map_err(invalid)?;

        let buildpacks = metadata
            .buildpacks
            .into_iter()
            .map(|bp| {
                let api = layer_apis
                    .get(&bp.id)
                    .and_then(|versions| versions.get(&bp.version))
                    .and_then(|info| info.api);
                BuilderBuildpack {
                    id: bp.id,
                    version: bp.version,
                    api,
                }
            })
            .collect();

        Ok(Self {
            name: name.to_string(),
            description: metadata.description.filter(|d| !d.is_empty()),
            stack: StackInfo {
                id: stack_id.clone(),
                mixins,
                run_image: metadata.stack.run_image.image,
                run_image_mirrors: metadata.stack.run_image.mirrors,
            },
            lifecycle,
            buildpacks,
            order,
        })
    }

    /// Make the builder image available according to `policy` and read its metadata
    pub async fn inspect(
        runtime: &dyn ContainerRuntime,
        name: &str,
        policy: PullPolicy,
    ) -> KilnResult<Self> {
        ensure_image(runtime, name, policy).await?;
        let labels = runtime.image_labels(name).await?;
        debug!("Builder {} has {} labels", name, labels.len());
        Self::from_labels(name, &labels)
    }

    /// Buildpack APIs a lifecycle must serve to run this builder.
    ///
    /// Every API declared by a buildpack must be served. A builder whose
    /// buildpacks declare nothing only needs one of the APIs its bundled
    /// lifecycle lists.
    pub fn buildpack_api_requirement(&self) -> ApiRequirement {
        let mut apis: Vec<ApiVersion> = self.buildpacks.iter().filter_map(|bp| bp.api).collect();
        if apis.is_empty() {
            let mut declared = self.lifecycle.buildpack_apis.supported.clone();
            declared.sort();
            declared.dedup();
            return ApiRequirement::Any(declared);
        }
        apis.sort();
        apis.dedup();
        ApiRequirement::Each(apis)
    }

    /// Flattened buildpack references of the builder's order
    pub fn ordered_buildpacks(&self) -> impl Iterator<Item = &BuildpackRef> {
        self.order.iter().flat_map(|g| g.group.iter())
    }
}

/// Pull `image` if `policy` requires it
pub async fn ensure_image(
    runtime: &dyn ContainerRuntime,
    image: &str,
    policy: PullPolicy,
) -> KilnResult<()> {
    match policy {
        PullPolicy::Always => runtime.pull(image).await,
        PullPolicy::IfNotPresent => {
            if runtime.image_exists(image).await? {
                Ok(())
            } else {
                runtime.pull(image).await
            }
        }
        PullPolicy::Never => {
            if runtime.image_exists(image).await? {
                Ok(())
            } else {
                Err(KilnError::ImagePull {
                    image: image.to_string(),
                    reason: "image not present locally and pull policy is never".to_string(),
                })
            }
        }
    }
}

fn parse_lifecycle(raw: RawLifecycle) -> Result<BuilderLifecycle, String> {
    let version = raw
        .version
        .filter(|v| !v.is_empty())
        .map(|v| semver::Version::parse(&v).map_err(|e| format!("lifecycle version '{}': {}", v, e)))
        .transpose()?;

    let (platform_apis, buildpack_apis) = match (raw.apis, raw.api) {
        (Some(apis), _) => (apis.platform, apis.buildpack),
        (None, Some(legacy)) => (ApiSet::single(legacy.platform), ApiSet::single(legacy.buildpack)),
        (None, None) => (ApiSet::default(), ApiSet::default()),
    };

    Ok(BuilderLifecycle {
        version,
        platform_apis,
        buildpack_apis,
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Labels of a typical builder with two buildpacks on API 0.4
    pub fn labels() -> HashMap<String, String> {
        let metadata = r#"{
            "description": "Test builder",
            "stack": {"runImage": {"image": "example/run:base", "mirrors": ["mirror.example/run:base"]}},
            "lifecycle": {"version": "0.11.1", "apis": {
                "buildpack": {"deprecated": [], "supported": ["0.2", "0.3", "0.4"]},
                "platform": {"deprecated": [], "supported": ["0.4", "0.5", "0.6"]}
            }},
            "buildpacks": [
                {"id": "example/node", "version": "1.0.0"},
                {"id": "example/procfile", "version": "2.1.0"}
            ]
        }"#;
        let layers = r#"{
            "example/node": {"1.0.0": {"api": "0.4", "layerDiffID": "sha256:aaa"}},
            "example/procfile": {"2.1.0": {"api": "0.4", "layerDiffID": "sha256:bbb"}}
        }"#;
        let order = r#"[{"group": [{"id": "example/node", "version": "1.0.0"}, {"id": "example/procfile", "optional": true}]}]"#;

        HashMap::from([
            (METADATA_LABEL.to_string(), metadata.to_string()),
            (STACK_ID_LABEL.to_string(), "io.buildpacks.stacks.bionic".to_string()),
            (MIXINS_LABEL.to_string(), r#"["build:git", "curl"]"#.to_string()),
            (BUILDPACK_LAYERS_LABEL.to_string(), layers.to_string()),
            (ORDER_LABEL.to_string(), order.to_string()),
        ])
    }

    pub fn builder(name: &str) -> BuilderImage {
        BuilderImage::from_labels(name, &labels()).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::labels;
    use super::*;

    #[test]
    fn parses_full_metadata() {
        let b = BuilderImage::from_labels("example/builder", &labels()).unwrap();

        assert_eq!(b.stack.id, "io.buildpacks.stacks.bionic");
        assert_eq!(b.stack.mixins, vec!["build:git", "curl"]);
        assert_eq!(b.stack.run_image.as_deref(), Some("example/run:base"));
        assert_eq!(b.lifecycle.version, Some(semver::Version::new(0, 11, 1)));
        assert_eq!(b.lifecycle.platform_apis.supported.len(), 3);
        assert_eq!(b.buildpacks.len(), 2);
        assert_eq!(b.buildpacks[0].api, Some(ApiVersion::new(0, 4)));
        assert_eq!(b.ordered_buildpacks().count(), 2);
        assert_eq!(
            b.buildpack_api_requirement(),
            ApiRequirement::Each(vec![ApiVersion::new(0, 4)])
        );
    }

    #[test]
    fn legacy_lifecycle_api() {
        let mut l = labels();
        l.insert(
            METADATA_LABEL.to_string(),
            r#"{"lifecycle": {"version": "0.6.0", "api": {"buildpack": "0.2", "platform": "0.2"}}}"#
                .to_string(),
        );
        let b = BuilderImage::from_labels("old/builder", &l).unwrap();
        assert_eq!(b.lifecycle.platform_apis, ApiSet::single(ApiVersion::new(0, 2)));
        assert!(b.buildpacks.is_empty());
        // Falls back to the declared lifecycle buildpack API
        assert_eq!(
            b.buildpack_api_requirement(),
            ApiRequirement::Any(vec![ApiVersion::new(0, 2)])
        );
    }

    #[test]
    fn missing_stack_id_is_rejected() {
        let mut l = labels();
        l.remove(STACK_ID_LABEL);
        let err = BuilderImage::from_labels("bad/builder", &l).unwrap_err();
        assert!(err.to_string().contains(STACK_ID_LABEL));
    }

    #[test]
    fn plain_image_is_not_a_builder() {
        let err = BuilderImage::from_labels("alpine", &HashMap::new()).unwrap_err();
        assert!(matches!(err, KilnError::BuilderMetadata { .. }));
    }
}
