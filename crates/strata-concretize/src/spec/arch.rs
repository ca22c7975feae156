//! Platform, operating system and target triples

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ConcretizeError, Result};

/// A concrete architecture: `linux-ubuntu22.04-x86_64`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchSpec {
    pub platform: String,
    pub os: String,
    pub target: String,
}

impl ArchSpec {
    pub fn new(platform: impl Into<String>, os: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            os: os.into(),
            target: target.into(),
        }
    }

    /// The architecture of the running machine
    pub fn host() -> Self {
        let platform = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        ArchSpec::new(platform, host_os().unwrap_or_else(|| platform.to_string()), std::env::consts::ARCH)
    }
}

/// `ID` and `VERSION_ID` from os-release, e.g. `ubuntu22.04`
fn host_os() -> Option<String> {
    let release = std::fs::read_to_string("/etc/os-release").ok()?;
    let field = |key: &str| {
        release.lines().find_map(|line| {
            line.strip_prefix(key)
                .and_then(|rest| rest.strip_prefix('='))
                .map(|value| value.trim_matches('"').to_string())
        })
    };
    let id = field("ID")?;
    Some(format!("{}{}", id, field("VERSION_ID").unwrap_or_default()))
}

impl fmt::Display for ArchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.platform, self.os, self.target)
    }
}

/// Split `platform-os-target`; the os part may itself contain dashes
fn split_triple(s: &str) -> Result<(&str, &str, &str)> {
    let malformed = || {
        ConcretizeError::MalformedRequest(format!(
            "architecture '{}' is not of the form platform-os-target",
            s
        ))
    };
    let (platform, rest) = s.split_once('-').ok_or_else(malformed)?;
    let (os, target) = rest.rsplit_once('-').ok_or_else(malformed)?;
    if platform.is_empty() || os.is_empty() || target.is_empty() {
        return Err(malformed());
    }
    Ok((platform, os, target))
}

impl FromStr for ArchSpec {
    type Err = ConcretizeError;

    fn from_str(s: &str) -> Result<Self> {
        let (platform, os, target) = split_triple(s)?;
        Ok(ArchSpec::new(platform, os, target))
    }
}

impl Serialize for ArchSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ArchSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A partial architecture requirement; `None` fields are unconstrained.
///
/// Written like an [`ArchSpec`] with `*` for open fields: `linux-*-x86_64`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ArchConstraint {
    pub platform: Option<String>,
    pub os: Option<String>,
    pub target: Option<String>,
}

impl ArchConstraint {
    pub fn target(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            ..Default::default()
        }
    }

    pub fn exact(arch: &ArchSpec) -> Self {
        Self {
            platform: Some(arch.platform.clone()),
            os: Some(arch.os.clone()),
            target: Some(arch.target.clone()),
        }
    }

    pub fn matches(&self, arch: &ArchSpec) -> bool {
        fn field(want: &Option<String>, have: &str) -> bool {
            want.as_deref().map_or(true, |w| w == have)
        }
        field(&self.platform, &arch.platform)
            && field(&self.os, &arch.os)
            && field(&self.target, &arch.target)
    }

    /// Combine two requirements, `None` when they name different values for a field
    pub fn intersection(&self, other: &ArchConstraint) -> Option<ArchConstraint> {
        fn merge(a: &Option<String>, b: &Option<String>) -> Option<Option<String>> {
            match (a, b) {
                (Some(x), Some(y)) if x != y => None,
                (Some(x), _) | (None, Some(x)) => Some(Some(x.clone())),
                (None, None) => Some(None),
            }
        }
        Some(ArchConstraint {
            platform: merge(&self.platform, &other.platform)?,
            os: merge(&self.os, &other.os)?,
            target: merge(&self.target, &other.target)?,
        })
    }

    /// Whether every architecture matching `self` also matches `other`
    pub fn is_subset_of(&self, other: &ArchConstraint) -> bool {
        fn covered(mine: &Option<String>, theirs: &Option<String>) -> bool {
            match theirs {
                None => true,
                Some(t) => mine.as_deref() == Some(t.as_str()),
            }
        }
        covered(&self.platform, &other.platform)
            && covered(&self.os, &other.os)
            && covered(&self.target, &other.target)
    }
}

impl fmt::Display for ArchConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |field: &Option<String>| field.clone().unwrap_or_else(|| "*".to_string());
        write!(f, "{}-{}-{}", show(&self.platform), show(&self.os), show(&self.target))
    }
}

impl FromStr for ArchConstraint {
    type Err = ConcretizeError;

    fn from_str(s: &str) -> Result<Self> {
        let (platform, os, target) = split_triple(s)?;
        let field = |v: &str| (v != "*").then(|| v.to_string());
        Ok(ArchConstraint {
            platform: field(platform),
            os: field(os),
            target: field(target),
        })
    }
}

impl Serialize for ArchConstraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ArchConstraint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
