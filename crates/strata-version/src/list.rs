//! Unions of version ranges

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::parser::{parse_list, VersionError};
use crate::range::VersionRange;
use crate::version::Version;

/// Sorted, non-redundant union of version ranges.
///
/// `VersionList::any()` is the unconstrained list; `VersionList::none()`
/// contains no version and is what contradictory constraints intersect to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionList {
    ranges: Vec<VersionRange>,
}

impl VersionList {
    /// The unconstrained list `:`
    pub fn any() -> Self {
        VersionList { ranges: vec![VersionRange::any()] }
    }

    /// The empty list, satisfied by no version
    pub fn none() -> Self {
        VersionList { ranges: Vec::new() }
    }

    /// A list pinning exactly one version
    pub fn exact(version: Version) -> Self {
        VersionList { ranges: vec![VersionRange::exact(version)] }
    }

    pub fn parse(input: &str) -> Result<Self, VersionError> {
        parse_list(input)
    }

    /// Add a range, dropping whatever becomes redundant
    pub fn add(&mut self, range: VersionRange) {
        if self.ranges.iter().any(|existing| range.is_subset_of(existing)) {
            return;
        }
        self.ranges.retain(|existing| !existing.is_subset_of(&range));
        let pos = self.ranges.binary_search(&range).unwrap_or_else(|p| p);
        self.ranges.insert(pos, range);
    }

    pub fn ranges(&self) -> &[VersionRange] {
        &self.ranges
    }

    /// True when no version can satisfy this list
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn is_any(&self) -> bool {
        self.ranges.iter().any(VersionRange::is_any)
    }

    /// The pinned version when the list is a single exact range
    pub fn concrete(&self) -> Option<&Version> {
        match self.ranges.as_slice() {
            [only] => only.concrete(),
            _ => None,
        }
    }

    pub fn contains(&self, version: &Version) -> bool {
        self.ranges.iter().any(|r| r.contains(version))
    }

    pub fn intersection(&self, other: &VersionList) -> VersionList {
        let mut result = VersionList::none();
        for a in &self.ranges {
            for b in &other.ranges {
                if let Some(both) = a.intersection(b) {
                    result.add(both);
                }
            }
        }
        result
    }

    pub fn union(&self, other: &VersionList) -> VersionList {
        let mut result = self.clone();
        for range in &other.ranges {
            result.add(range.clone());
        }
        result
    }

    pub fn overlaps(&self, other: &VersionList) -> bool {
        self.ranges
            .iter()
            .any(|a| other.ranges.iter().any(|b| a.overlaps(b)))
    }

    /// Whether every range of this list lies inside some range of `other`.
    pub fn is_subset_of(&self, other: &VersionList) -> bool {
        self.ranges
            .iter()
            .all(|a| other.ranges.iter().any(|b| a.is_subset_of(b)))
    }

    /// Keep only the candidate versions this list admits, preserving order
    pub fn filter<'a, I>(&self, versions: I) -> Vec<&'a Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        versions.into_iter().filter(|v| self.contains(v)).collect()
    }
}

impl Default for VersionList {
    fn default() -> Self {
        Self::any()
    }
}

impl From<Version> for VersionList {
    fn from(version: Version) -> Self {
        VersionList::exact(version)
    }
}

impl From<VersionRange> for VersionList {
    fn from(range: VersionRange) -> Self {
        VersionList { ranges: vec![range] }
    }
}

impl fmt::Display for VersionList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.ranges.iter().map(|r| r.to_string()).collect();
        f.write_str(&rendered.join(","))
    }
}

impl FromStr for VersionList {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_list(s)
    }
}

impl Serialize for VersionList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VersionList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_list(&s).map_err(serde::de::Error::custom)
    }
}
