//! Buildpack and platform API versions
//!
//! API versions are `major.minor`. While the major is `0`, every minor is a
//! breaking change, so two versions are only compatible when they are equal.
//! From `1.0` on, a provider satisfies any requirement with the same major and
//! a minor that is not newer than its own.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A `major.minor` API version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApiVersion {
    pub major: u64,
    pub minor: u64,
}

impl ApiVersion {
    pub const fn new(major: u64, minor: u64) -> Self {
        Self { major, minor }
    }

    /// Whether a lifecycle providing `self` can serve something requiring `required`
    pub fn supports(&self, required: &ApiVersion) -> bool {
        if self.major != required.major {
            return false;
        }
        if self.major == 0 {
            self.minor == required.minor
        } else {
            self.minor >= required.minor
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ApiVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (major, minor) = match trimmed.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (trimmed, "0"),
        };
        let parse = |part: &str| {
            part.parse::<u64>()
                .map_err(|_| format!("invalid API version '{}'", s))
        };
        Ok(Self::new(parse(major)?, parse(minor)?))
    }
}

impl TryFrom<String> for ApiVersion {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ApiVersion> for String {
    fn from(v: ApiVersion) -> Self {
        v.to_string()
    }
}

/// Supported and deprecated versions of one API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSet {
    pub deprecated: Vec<ApiVersion>,
    pub supported: Vec<ApiVersion>,
}

impl ApiSet {
    /// A set with a single supported version
    pub fn single(version: ApiVersion) -> Self {
        Self {
            deprecated: vec![],
            supported: vec![version],
        }
    }

    /// The newest supported version that satisfies `required`
    pub fn latest_supporting(&self, required: &ApiVersion) -> Option<ApiVersion> {
        self.supported
            .iter()
            .filter(|v| v.supports(required))
            .max()
            .copied()
    }

    /// Whether `version` is listed as deprecated
    pub fn is_deprecated(&self, version: &ApiVersion) -> bool {
        self.deprecated.contains(version)
    }

    /// Comma-separated supported versions, for messages
    pub fn describe(&self) -> String {
        if self.supported.is_empty() {
            return "none".to_string();
        }
        self.supported
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}
