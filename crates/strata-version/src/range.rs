//! Prefix-aware version ranges

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::parser::{parse_range, VersionError};
use crate::version::Version;

/// An inclusive version range.
///
/// Bounds are prefix-aware: `1.2:1.5` contains `1.5.3` because `1.5.3`
/// satisfies `1.5`. A missing bound is unbounded. An exact range (`=1.2`)
/// contains exactly one version, while the plain form `1.2` is the range
/// `1.2:1.2` and also contains `1.2.7`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    lower: Option<Version>,
    upper: Option<Version>,
    exact: bool,
}

/// `a <= b` when both are used as upper bounds.
fn upper_le(a: &Version, b: &Version) -> bool {
    b.is_prefix_of(a) || (a < b && !a.is_prefix_of(b))
}

fn upper_admits(upper: &Version, version: &Version) -> bool {
    version <= upper || upper.is_prefix_of(version)
}

impl VersionRange {
    /// Build a range, rejecting bounds that no version can satisfy.
    pub fn new(lower: Option<Version>, upper: Option<Version>) -> Result<Self, VersionError> {
        if let (Some(lo), Some(hi)) = (&lower, &upper) {
            if !upper_admits(hi, lo) {
                return Err(VersionError::InvertedRange(format!("{}:{}", lo, hi)));
            }
        }
        Ok(VersionRange { lower, upper, exact: false })
    }

    /// The unconstrained range `:`
    pub fn any() -> Self {
        VersionRange { lower: None, upper: None, exact: false }
    }

    /// Exactly one version (`=v`)
    pub fn exact(version: Version) -> Self {
        VersionRange {
            lower: Some(version.clone()),
            upper: Some(version),
            exact: true,
        }
    }

    /// The version and everything it is a prefix of (`v`, i.e. `v:v`)
    pub fn prefix(version: Version) -> Self {
        VersionRange {
            lower: Some(version.clone()),
            upper: Some(version),
            exact: false,
        }
    }

    /// `v:`
    pub fn at_least(version: Version) -> Self {
        VersionRange { lower: Some(version), upper: None, exact: false }
    }

    /// `:v`
    pub fn at_most(version: Version) -> Self {
        VersionRange { lower: None, upper: Some(version), exact: false }
    }

    pub fn lower(&self) -> Option<&Version> {
        self.lower.as_ref()
    }

    pub fn upper(&self) -> Option<&Version> {
        self.upper.as_ref()
    }

    pub fn is_exact(&self) -> bool {
        self.exact
    }

    /// Whether this range places no constraint at all
    pub fn is_any(&self) -> bool {
        !self.exact && self.lower.is_none() && self.upper.is_none()
    }

    /// The single version this range pins, if it is exact
    pub fn concrete(&self) -> Option<&Version> {
        if self.exact {
            self.lower.as_ref()
        } else {
            None
        }
    }

    /// Check whether a concrete version lies in this range
    pub fn contains(&self, version: &Version) -> bool {
        if self.exact {
            return self.lower.as_ref() == Some(version);
        }
        let lower_ok = self.lower.as_ref().map_or(true, |lo| version >= lo);
        let upper_ok = self.upper.as_ref().map_or(true, |hi| upper_admits(hi, version));
        lower_ok && upper_ok
    }

    /// The versions in both ranges, or `None` when they are disjoint
    pub fn intersection(&self, other: &VersionRange) -> Option<VersionRange> {
        if self.exact {
            let v = self.lower.as_ref()?;
            return other.contains(v).then(|| self.clone());
        }
        if other.exact {
            return other.intersection(self);
        }

        let lower = match (&self.lower, &other.lower) {
            (Some(a), Some(b)) => Some(if a >= b { a.clone() } else { b.clone() }),
            (Some(a), None) | (None, Some(a)) => Some(a.clone()),
            (None, None) => None,
        };
        let upper = match (&self.upper, &other.upper) {
            (Some(a), Some(b)) => Some(if upper_le(a, b) { a.clone() } else { b.clone() }),
            (Some(a), None) | (None, Some(a)) => Some(a.clone()),
            (None, None) => None,
        };

        VersionRange::new(lower, upper).ok()
    }

    /// Whether some version lies in both ranges
    pub fn overlaps(&self, other: &VersionRange) -> bool {
        self.intersection(other).is_some()
    }

    /// Whether every version in this range also lies in `other`
    pub fn is_subset_of(&self, other: &VersionRange) -> bool {
        if self.exact {
            return self.lower.as_ref().map_or(false, |v| other.contains(v));
        }
        if other.exact {
            return false;
        }

        let lower_ok = match (&self.lower, &other.lower) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(b)) => a >= b,
        };
        let upper_ok = match (&self.upper, &other.upper) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(b)) => upper_le(a, b),
        };
        lower_ok && upper_ok
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::any()
    }
}

impl Ord for VersionRange {
    /// Ordered by lower bound (unbounded first), then upper bound (unbounded last).
    fn cmp(&self, other: &Self) -> Ordering {
        let lower = match (&self.lower, &other.lower) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => a.cmp(b),
        };
        let upper = match (&self.upper, &other.upper) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(b),
        };
        lower.then(upper).then(other.exact.cmp(&self.exact))
    }
}

impl PartialOrd for VersionRange {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exact {
            if let Some(v) = &self.lower {
                return write!(f, "={}", v);
            }
        }
        match (&self.lower, &self.upper) {
            (Some(lo), Some(hi)) if lo == hi => write!(f, "{}", lo),
            (lo, hi) => {
                if let Some(lo) = lo {
                    write!(f, "{}", lo)?;
                }
                f.write_str(":")?;
                if let Some(hi) = hi {
                    write!(f, "{}", hi)?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_range(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(s: &str) -> VersionRange {
        s.parse().unwrap()
    }

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn test_contains_prefix_bounds() {
        let range = r("1.2:1.5");
        assert!(range.contains(&v("1.2")));
        assert!(range.contains(&v("1.3.9")));
        assert!(range.contains(&v("1.5")));
        assert!(range.contains(&v("1.5.3")));
        assert!(!range.contains(&v("1.6")));
        assert!(!range.contains(&v("1.1.9")));
    }

    #[test]
    fn test_contains_open_ranges() {
        assert!(r(":3.9").contains(&v("3.9")));
        assert!(r(":3.9").contains(&v("0.1")));
        assert!(!r(":3.9").contains(&v("4.0")));
        assert!(r("3:").contains(&v("3")));
        assert!(r("3:").contains(&v("develop")));
        assert!(r(":").contains(&v("1.0")));
    }

    #[test]
    fn test_exact_and_prefix() {
        assert!(r("1.2").contains(&v("1.2.7")));
        assert!(!r("=1.2").contains(&v("1.2.7")));
        assert!(r("=1.2").contains(&v("1.2")));
        assert_eq!(r("=1.2").concrete(), Some(&v("1.2")));
        assert_eq!(r("1.2").concrete(), None);
    }

    #[test]
    fn test_intersection() {
        assert_eq!(r("1:3").intersection(&r("2:4")), Some(r("2:3")));
        assert_eq!(r("1.6").intersection(&r("1.6.5:")), Some(r("1.6.5:1.6")));
        assert_eq!(r(":1.6").intersection(&r(":1.6.5")), Some(r(":1.6.5")));
        assert_eq!(r("1:2").intersection(&r("3:4")), None);
        assert_eq!(r("=4.0").intersection(&r("4.1")), None);
        assert_eq!(r("=4.1.2").intersection(&r("4.1")), Some(r("=4.1.2")));
    }

    #[test]
    fn test_is_subset_of() {
        assert!(r("1.3:1.4").is_subset_of(&r("1.2:1.5")));
        assert!(r("=1.4").is_subset_of(&r("1.2:1.5")));
        assert!(r("1.5.2").is_subset_of(&r("1.2:1.5")));
        assert!(!r("1.6").is_subset_of(&r("1.6.5")));
        assert!(r("1.6.5").is_subset_of(&r("1.6")));
        assert!(!r("1:").is_subset_of(&r("1:5")));
        assert!(!r("1.2").is_subset_of(&r("=1.2")));
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert!(VersionRange::new(Some(v("2.0")), Some(v("1.0"))).is_err());
        assert!(VersionRange::new(Some(v("1.6.5")), Some(v("1.6"))).is_ok());
    }

    #[test]
    fn test_ordering() {
        let mut ranges = vec![r("2:"), r(":1"), r("1:2"), r("1:1.5")];
        ranges.sort();
        let rendered: Vec<String> = ranges.iter().map(|r| r.to_string()).collect();
        assert_eq!(rendered, vec![":1", "1:1.5", "1:2", "2:"]);
    }
}
