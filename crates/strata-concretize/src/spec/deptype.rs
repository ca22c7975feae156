//! Dependency type flags

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConcretizeError;

/// Set of dependency types carried by an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepTypes(u8);

impl DepTypes {
    pub const NONE: DepTypes = DepTypes(0);
    pub const BUILD: DepTypes = DepTypes(1);
    pub const LINK: DepTypes = DepTypes(2);
    pub const RUN: DepTypes = DepTypes(4);
    pub const TEST: DepTypes = DepTypes(8);
    pub const ALL: DepTypes = DepTypes(15);

    /// Types whose dependencies become part of the built artifact
    pub const LINK_RUN: DepTypes = DepTypes(2 | 4);

    const NAMES: [(DepTypes, &'static str); 4] = [
        (DepTypes::BUILD, "build"),
        (DepTypes::LINK, "link"),
        (DepTypes::RUN, "run"),
        (DepTypes::TEST, "test"),
    ];

    pub fn contains(self, other: DepTypes) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: DepTypes) -> bool {
        self.0 & other.0 != 0
    }

    pub fn union(self, other: DepTypes) -> DepTypes {
        DepTypes(self.0 | other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether an edge of these types contributes to the DAG hash
    pub fn affects_dag_hash(self) -> bool {
        self.intersects(DepTypes::LINK_RUN)
    }

    /// Single-type flags in canonical order
    pub fn iter(self) -> impl Iterator<Item = DepTypes> {
        DepTypes::NAMES
            .into_iter()
            .map(|(flag, _)| flag)
            .filter(move |flag| self.contains(*flag))
    }

    pub fn names(self) -> Vec<&'static str> {
        DepTypes::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }

    /// Name of a single-type flag
    pub fn name(self) -> &'static str {
        DepTypes::NAMES
            .iter()
            .find(|(flag, _)| *flag == self)
            .map_or("", |(_, name)| name)
    }
}

impl Default for DepTypes {
    /// Declared dependencies are build and link unless stated otherwise
    fn default() -> Self {
        DepTypes::BUILD | DepTypes::LINK
    }
}

impl BitOr for DepTypes {
    type Output = DepTypes;

    fn bitor(self, rhs: DepTypes) -> DepTypes {
        self.union(rhs)
    }
}

impl fmt::Display for DepTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join(","))
    }
}

impl FromStr for DepTypes {
    type Err = ConcretizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut types = DepTypes::NONE;
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let flag = DepTypes::NAMES
                .iter()
                .find(|(_, name)| *name == part)
                .map(|(flag, _)| *flag)
                .ok_or_else(|| {
                    ConcretizeError::MalformedRequest(format!("unknown dependency type '{}'", part))
                })?;
            types = types | flag;
        }
        Ok(types)
    }
}

impl Serialize for DepTypes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.names().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DepTypes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        names.join(",").parse().map_err(serde::de::Error::custom)
    }
}
