//! API negotiation between kiln, a lifecycle and a builder

use crate::builder::{ApiRequirement, BuilderImage};
use crate::error::{KilnError, KilnResult};
use crate::lifecycle::api::ApiVersion;
use crate::lifecycle::descriptor::LifecycleDescriptor;
use tracing::{debug, warn};

/// Platform API versions kiln knows how to drive
pub const SUPPORTED_PLATFORM_APIS: &[ApiVersion] = &[
    ApiVersion::new(0, 3),
    ApiVersion::new(0, 4),
    ApiVersion::new(0, 5),
    ApiVersion::new(0, 6),
];

/// Result of a successful compatibility check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    /// Platform API the phases are run with (`CNB_PLATFORM_API`)
    pub platform_api: ApiVersion,
    /// Buildpack APIs required by the builder's buildpacks
    pub buildpack_apis: Vec<ApiVersion>,
}

/// Check that `descriptor` can drive `builder`, picking the newest platform API.
///
/// The platform API must be one kiln drives, the builder declares and the
/// lifecycle serves. Runs before any container is created.
pub fn check_compatibility(
    descriptor: &LifecycleDescriptor,
    builder: &BuilderImage,
) -> KilnResult<Negotiated> {
    let platform_api = negotiate_platform(descriptor, builder)?;
    let buildpack_apis = negotiate_buildpack(descriptor, builder)?;

    debug!(
        "Negotiated platform API {} for builder {}",
        platform_api, builder.name
    );
    Ok(Negotiated {
        platform_api,
        buildpack_apis,
    })
}

fn negotiate_platform(
    descriptor: &LifecycleDescriptor,
    builder: &BuilderImage,
) -> KilnResult<ApiVersion> {
    let declared = &builder.lifecycle.platform_apis;
    // Builders without lifecycle metadata do not constrain the platform API
    let wanted: Vec<ApiVersion> = SUPPORTED_PLATFORM_APIS
        .iter()
        .copied()
        .filter(|api| declared.supported.is_empty() || declared.latest_supporting(api).is_some())
        .collect();

    let platform = &descriptor.apis.platform;
    let platform_api = wanted
        .iter()
        .filter_map(|api| platform.latest_supporting(api))
        .max()
        .ok_or_else(|| KilnError::IncompatibleApi {
            kind: "platform",
            required: if wanted.is_empty() {
                format!(
                    "one of {} (builder declares {})",
                    describe(SUPPORTED_PLATFORM_APIS),
                    declared.describe()
                )
            } else {
                describe(&wanted)
            },
            supported: platform.describe(),
        })?;

    if platform.is_deprecated(&platform_api) {
        warn!(
            "Lifecycle {} platform API {} is deprecated",
            descriptor.info.version, platform_api
        );
    }
    Ok(platform_api)
}

fn negotiate_buildpack(
    descriptor: &LifecycleDescriptor,
    builder: &BuilderImage,
) -> KilnResult<Vec<ApiVersion>> {
    let buildpack = &descriptor.apis.buildpack;
    let served = match builder.buildpack_api_requirement() {
        ApiRequirement::Each(required) => {
            for api in &required {
                if buildpack.latest_supporting(api).is_none() {
                    return Err(KilnError::IncompatibleApi {
                        kind: "buildpack",
                        required: api.to_string(),
                        supported: buildpack.describe(),
                    });
                }
            }
            required
        }
        ApiRequirement::Any(declared) if declared.is_empty() => declared,
        ApiRequirement::Any(declared) => {
            let served: Vec<ApiVersion> = declared
                .iter()
                .copied()
                .filter(|api| buildpack.latest_supporting(api).is_some())
                .collect();
            if served.is_empty() {
                return Err(KilnError::IncompatibleApi {
                    kind: "buildpack",
                    required: format!("one of {}", describe(&declared)),
                    supported: buildpack.describe(),
                });
            }
            served
        }
    };

    for api in &served {
        if let Some(provided) = buildpack.latest_supporting(api) {
            if buildpack.is_deprecated(&provided) {
                warn!(
                    "Builder {} uses deprecated buildpack API {}",
                    builder.name, provided
                );
            }
        }
    }
    Ok(served)
}

fn describe(versions: &[ApiVersion]) -> String {
    versions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
