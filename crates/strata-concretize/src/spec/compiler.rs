//! Compilers and compiler constraints

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strata_version::{Version, VersionList};

use crate::error::{ConcretizeError, Result};

/// A concrete compiler: `gcc@10.2.1`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompilerSpec {
    pub name: String,
    pub version: Version,
}

impl CompilerSpec {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for CompilerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

impl FromStr for CompilerSpec {
    type Err = ConcretizeError;

    fn from_str(s: &str) -> Result<Self> {
        let (name, version) = s.split_once('@').ok_or_else(|| {
            ConcretizeError::MalformedRequest(format!("compiler '{}' needs a version (name@version)", s))
        })?;
        if name.is_empty() {
            return Err(ConcretizeError::MalformedRequest(format!("compiler '{}' has no name", s)));
        }
        Ok(CompilerSpec::new(name, Version::parse(version)?))
    }
}

impl Serialize for CompilerSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CompilerSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A compiler requirement: a name and a version range, `gcc@10:`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompilerConstraint {
    pub name: String,
    pub versions: VersionList,
}

impl CompilerConstraint {
    /// Any version of the named compiler
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            versions: VersionList::any(),
        }
    }

    /// Exactly this compiler
    pub fn exact(compiler: &CompilerSpec) -> Self {
        Self {
            name: compiler.name.clone(),
            versions: VersionList::exact(compiler.version.clone()),
        }
    }

    pub fn matches(&self, compiler: &CompilerSpec) -> bool {
        self.name == compiler.name && self.versions.contains(&compiler.version)
    }

    /// Combine two requirements, `None` when no compiler meets both
    pub fn intersection(&self, other: &CompilerConstraint) -> Option<CompilerConstraint> {
        if self.name != other.name {
            return None;
        }
        let versions = self.versions.intersection(&other.versions);
        (!versions.is_empty()).then(|| CompilerConstraint {
            name: self.name.clone(),
            versions,
        })
    }

    pub fn is_subset_of(&self, other: &CompilerConstraint) -> bool {
        self.name == other.name && self.versions.is_subset_of(&other.versions)
    }
}

impl fmt::Display for CompilerConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.versions.is_any() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}@{}", self.name, self.versions)
        }
    }
}

impl FromStr for CompilerConstraint {
    type Err = ConcretizeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('@') {
            Some((name, versions)) => Ok(CompilerConstraint {
                name: name.to_string(),
                versions: VersionList::parse(versions)?,
            }),
            None => Ok(CompilerConstraint::named(s)),
        }
    }
}

impl Serialize for CompilerConstraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CompilerConstraint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compiler_spec() {
        let gcc: CompilerSpec = "gcc@10.2.1".parse().unwrap();
        assert_eq!(gcc.name, "gcc");
        assert_eq!(gcc.to_string(), "gcc@10.2.1");
        assert!("gcc".parse::<CompilerSpec>().is_err());
        assert!("@1.0".parse::<CompilerSpec>().is_err());
    }

    #[test]
    fn test_constraint_matches() {
        let gcc10: CompilerSpec = "gcc@10.2.1".parse().unwrap();
        let clang: CompilerSpec = "clang@15".parse().unwrap();
        let wanted: CompilerConstraint = "gcc@10:".parse().unwrap();

        assert!(wanted.matches(&gcc10));
        assert!(!wanted.matches(&clang));
        assert!(CompilerConstraint::named("clang").matches(&clang));
        assert!(CompilerConstraint::exact(&gcc10).matches(&gcc10));
    }

    #[test]
    fn test_constraint_intersection() {
        let a: CompilerConstraint = "gcc@9:".parse().unwrap();
        let b: CompilerConstraint = "gcc@:10".parse().unwrap();
        assert_eq!(a.intersection(&b).unwrap().to_string(), "gcc@9:10");
        assert!(a.intersection(&"clang".parse().unwrap()).is_none());
        assert!(a.intersection(&"gcc@:8".parse().unwrap()).is_none());
    }
}
