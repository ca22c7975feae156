//! Concrete versions

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::parser::{parse_version, VersionError, INFINITY_VERSIONS};

/// A single version component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Component {
    Numeric(u64),
    Alpha(String),
}

impl Component {
    /// Rank among the infinity names, 0 being the highest (`develop`).
    fn infinity_rank(&self) -> Option<usize> {
        match self {
            Component::Alpha(s) => INFINITY_VERSIONS.iter().position(|inf| inf == s),
            Component::Numeric(_) => None,
        }
    }
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Component::Numeric(a), Component::Numeric(b)) => a.cmp(b),
            (Component::Alpha(a), Component::Alpha(b)) => {
                match (self.infinity_rank(), other.infinity_rank()) {
                    (Some(x), Some(y)) => y.cmp(&x),
                    (Some(_), None) => Ordering::Greater,
                    (None, Some(_)) => Ordering::Less,
                    (None, None) => a.cmp(b),
                }
            }
            // Numbers are newer than letters, except for the infinity names
            (Component::Alpha(_), Component::Numeric(_)) => {
                if self.infinity_rank().is_some() {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
            (Component::Numeric(_), Component::Alpha(_)) => other.cmp(self).reverse(),
        }
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Numeric(n) => write!(f, "{}", n),
            Component::Alpha(s) => write!(f, "{}", s),
        }
    }
}

/// A concrete version such as `1.2.3`, `2.0-rc1` or `develop`.
///
/// Equality and ordering only look at the components, so `1.2.3` and
/// `1-2-3` are the same version; the original string is kept for display.
#[derive(Debug, Clone)]
pub struct Version {
    string: String,
    components: Vec<Component>,
    separators: Vec<String>,
}

impl Version {
    /// Parse a version string
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let (components, separators) = parse_version(input)?;
        Ok(Version {
            string: input.trim().to_string(),
            components,
            separators,
        })
    }

    /// The version components
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// The original string
    pub fn as_str(&self) -> &str {
        &self.string
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Whether every component of `self` is a leading component of `other`.
    ///
    /// `4.7` is a prefix of `4.7.3` and of itself.
    pub fn is_prefix_of(&self, other: &Version) -> bool {
        self.components.len() <= other.components.len()
            && other.components[..self.components.len()] == self.components[..]
    }

    /// A version satisfies a less specific one with a common prefix:
    /// `4.7.3` satisfies `4.7`.
    pub fn satisfies(&self, other: &Version) -> bool {
        other.is_prefix_of(self)
    }

    /// Whether this version contains one of the infinity names.
    pub fn is_develop(&self) -> bool {
        self.components.iter().any(|c| c.infinity_rank().is_some())
    }

    /// The first `n` components, keeping the original separators.
    ///
    /// ```
    /// use strata_version::Version;
    ///
    /// let v = Version::parse("1.23-4b").unwrap();
    /// assert_eq!(v.up_to(2).to_string(), "1.23");
    /// assert_eq!(v.up_to(3).to_string(), "1.23-4");
    /// ```
    pub fn up_to(&self, n: usize) -> Version {
        let n = n.clamp(1, self.components.len().max(1));
        let mut string = String::new();
        for i in 0..n {
            string.push_str(&self.components[i].to_string());
            if i + 1 < n {
                string.push_str(&self.separators[i]);
            }
        }
        Version {
            string,
            components: self.components[..n].to_vec(),
            separators: self.separators[..n].to_vec(),
        }
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.components.hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.components.cmp(&other.components)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.string)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.string)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Version::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_numeric_ordering() {
        assert!(v("1.2") < v("1.10"));
        assert!(v("1.2") < v("1.2.1"));
        assert!(v("2") > v("1.99.99"));
        assert_eq!(v("1.2.3"), v("1-2_3"));
    }

    #[test]
    fn test_alpha_below_numeric() {
        assert!(v("1.2a") < v("1.2.0"));
        assert!(v("1.2rc1") < v("1.2.1"));
        assert!(v("1.a") < v("1.b"));
    }

    #[test]
    fn test_infinity_versions() {
        assert!(v("develop") > v("999999"));
        assert!(v("develop") > v("main"));
        assert!(v("main") > v("master"));
        assert!(v("head") > v("trunk"));
        assert!(v("1.develop") > v("1.999"));
        assert!(v("develop").is_develop());
        assert!(!v("1.2").is_develop());
    }

    #[test]
    fn test_satisfies_prefix() {
        assert!(v("4.7.3").satisfies(&v("4.7")));
        assert!(v("4.7").satisfies(&v("4.7")));
        assert!(!v("4.7").satisfies(&v("4.7.3")));
        assert!(!v("4.70").satisfies(&v("4.7")));
    }

    #[test]
    fn test_display_preserves_original() {
        assert_eq!(v("1-2_3b").to_string(), "1-2_3b");
        assert_eq!(v(" 2.0 ").to_string(), "2.0");
    }

    #[test]
    fn test_up_to() {
        let version = v("1.23-4b");
        assert_eq!(version.up_to(1).to_string(), "1");
        assert_eq!(version.up_to(4).to_string(), "1.23-4b");
        assert_eq!(version.up_to(10), version);
    }

    #[test]
    fn test_serde_as_string() {
        let version = v("3.9.1");
        let json = serde_json::to_string(&version).unwrap();
        assert_eq!(json, "\"3.9.1\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, version);
        assert!(serde_json::from_str::<Version>("\"1 2\"").is_err());
    }
}
