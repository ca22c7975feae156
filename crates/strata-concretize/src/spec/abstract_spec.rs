use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use strata_version::VersionList;

use super::arch::ArchConstraint;
use super::compiler::CompilerConstraint;
use super::condition::{Condition, SpecConstraint};
use super::deptype::DepTypes;
use super::variant::VariantValue;
use crate::error::{ConcretizeError, Result};

fn no_deptypes() -> DepTypes {
    DepTypes::NONE
}

fn is_any_type(deptypes: &DepTypes) -> bool {
    deptypes.is_empty()
}

/// A partially constrained package request.
///
/// Variants map to `None` when the request names a variant without fixing
/// its value; the name must still exist on the package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbstractSpec {
    pub name: String,

    #[serde(default, skip_serializing_if = "VersionList::is_any")]
    pub versions: VersionList,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variants: BTreeMap<String, Option<VariantValue>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler: Option<CompilerConstraint>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<ArchConstraint>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencyEdge>,
}

/// An edge from an abstract spec to a constrained dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub spec: AbstractSpec,

    /// Required edge types; empty means any type
    #[serde(default = "no_deptypes", skip_serializing_if = "is_any_type")]
    pub deptypes: DepTypes,

    #[serde(default, skip_serializing_if = "Condition::is_always")]
    pub when: Condition,
}

impl DependencyEdge {
    pub fn new(spec: AbstractSpec) -> Self {
        Self {
            spec,
            deptypes: DepTypes::NONE,
            when: Condition::always(),
        }
    }

    pub fn with_deptypes(mut self, deptypes: DepTypes) -> Self {
        self.deptypes = deptypes;
        self
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.when = condition;
        self
    }
}

impl AbstractSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            versions: VersionList::any(),
            variants: BTreeMap::new(),
            compiler: None,
            arch: None,
            dependencies: Vec::new(),
        }
    }

    /// Restrict versions from a constraint string such as `1.2:1.5`
    pub fn at(mut self, versions: &str) -> Result<Self> {
        self.versions = VersionList::parse(versions)?;
        Ok(self)
    }

    pub fn with_versions(mut self, versions: VersionList) -> Self {
        self.versions = versions;
        self
    }

    pub fn with_variant(mut self, name: impl Into<String>, value: impl Into<VariantValue>) -> Self {
        self.variants.insert(name.into(), Some(value.into()));
        self
    }

    /// Name a variant without choosing its value
    pub fn with_unset_variant(mut self, name: impl Into<String>) -> Self {
        self.variants.insert(name.into(), None);
        self
    }

    pub fn with_compiler(mut self, compiler: CompilerConstraint) -> Self {
        self.compiler = Some(compiler);
        self
    }

    pub fn with_arch(mut self, arch: ArchConstraint) -> Self {
        self.arch = Some(arch);
        self
    }

    /// Add a dependency of any type
    pub fn with_dependency(self, spec: AbstractSpec) -> Self {
        self.with_edge(DependencyEdge::new(spec))
    }

    pub fn with_edge(mut self, edge: DependencyEdge) -> Self {
        self.dependencies.push(edge);
        self
    }

    /// Requirements on this node alone, one per constraint kind
    pub fn constraints(&self) -> Vec<SpecConstraint> {
        let mut constraints = Vec::new();
        if !self.versions.is_any() {
            constraints.push(SpecConstraint::Version(self.versions.clone()));
        }
        for (name, value) in &self.variants {
            if let Some(value) = value {
                constraints.push(SpecConstraint::variant(name.clone(), value.clone()));
            }
        }
        if let Some(compiler) = &self.compiler {
            constraints.push(SpecConstraint::Compiler(compiler.clone()));
        }
        if let Some(arch) = &self.arch {
            constraints.push(SpecConstraint::Arch(arch.clone()));
        }
        for edge in &self.dependencies {
            constraints.push(SpecConstraint::DependsOn(edge.spec.name.clone()));
        }
        constraints
    }

    /// Merge the constraints of `other` into this spec.
    ///
    /// Fails with `MalformedRequest` when no single node could meet both.
    pub fn constrain(&mut self, other: &AbstractSpec) -> Result<()> {
        if self.name != other.name {
            return Err(ConcretizeError::MalformedRequest(format!(
                "cannot constrain {} with {}",
                self.name, other.name
            )));
        }

        let versions = self.versions.intersection(&other.versions);
        if versions.is_empty() {
            return Err(ConcretizeError::MalformedRequest(format!(
                "{} cannot be both @{} and @{}",
                self.name, self.versions, other.versions
            )));
        }
        self.versions = versions;

        for (name, value) in &other.variants {
            let merged = match (self.variants.get(name).cloned().flatten(), value) {
                (None, v) => v.clone(),
                (Some(mine), None) => Some(mine),
                (Some(VariantValue::Multi(mut mine)), Some(VariantValue::Multi(theirs))) => {
                    mine.extend(theirs.iter().cloned());
                    Some(VariantValue::Multi(mine))
                }
                (Some(mine), Some(theirs)) => {
                    if &mine != theirs {
                        return Err(ConcretizeError::MalformedRequest(format!(
                            "{} cannot be both {} and {}",
                            self.name,
                            mine.render(name),
                            theirs.render(name)
                        )));
                    }
                    Some(mine)
                }
            };
            self.variants.insert(name.clone(), merged);
        }

        self.compiler = match (&self.compiler, &other.compiler) {
            (Some(a), Some(b)) => Some(a.intersection(b).ok_or_else(|| {
                ConcretizeError::MalformedRequest(format!(
                    "{} cannot be built with both %{} and %{}",
                    self.name, a, b
                ))
            })?),
            (a, b) => a.clone().or_else(|| b.clone()),
        };

        self.arch = match (&self.arch, &other.arch) {
            (Some(a), Some(b)) => Some(a.intersection(b).ok_or_else(|| {
                ConcretizeError::MalformedRequest(format!(
                    "{} cannot target both {} and {}",
                    self.name, a, b
                ))
            })?),
            (a, b) => a.clone().or_else(|| b.clone()),
        };

        for edge in &other.dependencies {
            match self
                .dependencies
                .iter_mut()
                .find(|mine| mine.spec.name == edge.spec.name && mine.when == edge.when)
            {
                Some(mine) => {
                    mine.spec.constrain(&edge.spec)?;
                    mine.deptypes = mine.deptypes | edge.deptypes;
                }
                None => self.dependencies.push(edge.clone()),
            }
        }

        Ok(())
    }

    /// Whether some node could meet both specs
    pub fn intersects(&self, other: &AbstractSpec) -> bool {
        let mut merged = self.clone();
        merged.constrain(other).is_ok()
    }

    /// Whether every node meeting `self` also meets `other`
    pub fn satisfies(&self, other: &AbstractSpec) -> bool {
        if self.name != other.name || !self.versions.is_subset_of(&other.versions) {
            return false;
        }

        let variants_ok = other.variants.iter().all(|(name, wanted)| match wanted {
            None => self.variants.contains_key(name),
            Some(wanted) => matches!(
                self.variants.get(name),
                Some(Some(have)) if have.satisfies(wanted)
            ),
        });
        if !variants_ok {
            return false;
        }

        let compiler_ok = match (&self.compiler, &other.compiler) {
            (_, None) => true,
            (Some(mine), Some(theirs)) => mine.is_subset_of(theirs),
            (None, Some(_)) => false,
        };
        let arch_ok = match (&self.arch, &other.arch) {
            (_, None) => true,
            (Some(mine), Some(theirs)) => mine.is_subset_of(theirs),
            (None, Some(_)) => false,
        };

        compiler_ok
            && arch_ok
            && other.dependencies.iter().all(|theirs| {
                self.dependencies.iter().any(|mine| {
                    mine.spec.satisfies(&theirs.spec) && mine.deptypes.contains(theirs.deptypes)
                })
            })
    }

    /// This spec and every nested dependency spec, preorder
    pub fn traverse(&self) -> Vec<&AbstractSpec> {
        let mut out = vec![self];
        for edge in &self.dependencies {
            out.extend(edge.spec.traverse());
        }
        out
    }

    fn fmt_node(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.versions.is_any() {
            write!(f, "@{}", self.versions)?;
        }
        for (name, value) in &self.variants {
            match value {
                Some(value @ VariantValue::Bool(_)) => f.write_str(&value.render(name))?,
                Some(value) => write!(f, " {}", value.render(name))?,
                None => write!(f, " {}=*", name)?,
            }
        }
        if let Some(compiler) = &self.compiler {
            write!(f, " %{}", compiler)?;
        }
        if let Some(arch) = &self.arch {
            write!(f, " arch={}", arch)?;
        }
        Ok(())
    }
}

impl fmt::Display for AbstractSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_node(f)?;
        for edge in &self.dependencies {
            write!(f, " ^{}", edge.spec)?;
        }
        Ok(())
    }
}
