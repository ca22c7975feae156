//! Constraint kinds and conditions over a single spec node

use std::fmt;

use serde::{Deserialize, Serialize};
use strata_version::VersionList;

use super::arch::ArchConstraint;
use super::compiler::CompilerConstraint;
use super::variant::VariantValue;
use crate::error::Result;

/// One requirement on a spec node.
///
/// This is the closed set of things a node can be asked about; every query
/// against a spec matches exhaustively over these kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpecConstraint {
    Version(VersionList),
    Variant { name: String, value: VariantValue },
    Compiler(CompilerConstraint),
    Arch(ArchConstraint),
    /// The node has a direct dependency on this package or virtual
    DependsOn(String),
}

impl SpecConstraint {
    pub fn version(versions: &str) -> Result<Self> {
        Ok(SpecConstraint::Version(VersionList::parse(versions)?))
    }

    pub fn variant(name: impl Into<String>, value: impl Into<VariantValue>) -> Self {
        SpecConstraint::Variant {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for SpecConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecConstraint::Version(versions) => write!(f, "@{}", versions),
            SpecConstraint::Variant { name, value } => f.write_str(&value.render(name)),
            SpecConstraint::Compiler(compiler) => write!(f, "%{}", compiler),
            SpecConstraint::Arch(arch) => write!(f, "arch={}", arch),
            SpecConstraint::DependsOn(name) => write!(f, "^{}", name),
        }
    }
}

/// A conjunction of constraints on the node that declares it.
///
/// The empty condition always holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Condition {
    pub constraints: Vec<SpecConstraint>,
}

impl Condition {
    pub fn always() -> Self {
        Self::default()
    }

    pub fn is_always(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn with(mut self, constraint: SpecConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Condition on a variant value
    pub fn variant(name: impl Into<String>, value: impl Into<VariantValue>) -> Self {
        Self::always().with(SpecConstraint::variant(name, value))
    }

    /// Condition on the node version
    pub fn version(versions: &str) -> Result<Self> {
        Ok(Self::always().with(SpecConstraint::version(versions)?))
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.constraints.iter().map(|c| c.to_string()).collect();
        f.write_str(&parts.join(" "))
    }
}

impl From<SpecConstraint> for Condition {
    fn from(constraint: SpecConstraint) -> Self {
        Condition {
            constraints: vec![constraint],
        }
    }
}
