//! Human-readable reasons for an unsatisfiable request

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use strata_version::{Version, VersionList};

use crate::spec::SpecConstraint;

/// One member of a minimal set of conflicting constraints.
///
/// Every constraint the solver may have to give up on carries one of
/// these, so an unsatisfiable core can be reported by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Explanation {
    /// A root of the request
    Requested { root: String },

    /// A constraint the request puts on one of its nodes
    RequestConstraint {
        root: String,
        package: String,
        constraint: SpecConstraint,
    },

    /// The request asks for a variant to exist, whatever its value
    RequestedVariant {
        root: String,
        package: String,
        variant: String,
    },

    /// The request asks for a dependency on `package`
    RequestedDependency { root: String, package: String },

    /// A declared dependency requirement of `dependent`
    Requirement {
        dependent: String,
        package: String,
        constraint: SpecConstraint,
    },

    /// A declared conflict of `package`
    Conflict {
        package: String,
        condition: String,
        message: Option<String>,
    },

    /// `dependent` needs a version of a virtual that providers must cover
    ProviderMismatch {
        dependent: String,
        virtual_name: String,
        versions: VersionList,
    },

    /// `package` may only come from an external or a reusable spec
    NotBuildable { package: String },

    /// Summary of version constraints no known version meets together
    NoCommonVersion {
        package: String,
        constraints: Vec<VersionList>,
    },
}

impl Explanation {
    /// The version constraint this explanation puts on a package, if any
    fn version_constraint(&self) -> Option<(&str, &VersionList)> {
        match self {
            Explanation::RequestConstraint {
                package,
                constraint: SpecConstraint::Version(versions),
                ..
            }
            | Explanation::Requirement {
                package,
                constraint: SpecConstraint::Version(versions),
                ..
            } => Some((package.as_str(), versions)),
            _ => None,
        }
    }
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Explanation::Requested { root } => write!(f, "{} was requested", root),
            Explanation::RequestConstraint {
                root,
                package,
                constraint,
            } if root == package => write!(f, "the request requires {}{}", package, constraint),
            Explanation::RequestConstraint {
                root,
                package,
                constraint,
            } => write!(f, "the request for {} requires {}{}", root, package, constraint),
            Explanation::RequestedVariant {
                root,
                package,
                variant,
            } => write!(
                f,
                "the request for {} requires variant '{}' on {}",
                root, variant, package
            ),
            Explanation::RequestedDependency { root, package } => {
                write!(f, "the request for {} requires a dependency on {}", root, package)
            }
            Explanation::Requirement {
                dependent,
                package,
                constraint,
            } => write!(f, "{} requires {}{}", dependent, package, constraint),
            Explanation::Conflict {
                package,
                condition,
                message,
            } => {
                write!(f, "{} conflicts with {}", package, condition)?;
                if let Some(message) = message {
                    write!(f, ": {}", message)?;
                }
                Ok(())
            }
            Explanation::ProviderMismatch {
                dependent,
                virtual_name,
                versions,
            } => write!(
                f,
                "{} requires {}@{}, which no usable provider covers",
                dependent, virtual_name, versions
            ),
            Explanation::NotBuildable { package } => write!(
                f,
                "{} is not buildable and no external or reusable spec fits",
                package
            ),
            Explanation::NoCommonVersion {
                package,
                constraints,
            } => {
                let parts: Vec<String> = constraints.iter().map(|c| format!("@{}", c)).collect();
                write!(f, "no version of {} satisfies {}", package, parts.join(" and "))
            }
        }
    }
}

/// Append a [`Explanation::NoCommonVersion`] for every package whose
/// version constraints in `explanations` no known version meets together.
///
/// `known_versions` answers `None` for names without a version domain of
/// their own, such as virtuals; those are never summarized.
pub(crate) fn with_version_summaries<F>(mut explanations: Vec<Explanation>, known_versions: F) -> Vec<Explanation>
where
    F: Fn(&str) -> Option<Vec<Version>>,
{
    let mut by_package: BTreeMap<String, Vec<VersionList>> = BTreeMap::new();
    for explanation in &explanations {
        if let Some((package, versions)) = explanation.version_constraint() {
            let constraints = by_package.entry(package.to_string()).or_default();
            if !constraints.contains(versions) {
                constraints.push(versions.clone());
            }
        }
    }

    for (package, constraints) in by_package {
        let Some(known) = known_versions(&package) else {
            continue;
        };
        let met = known.iter().any(|v| constraints.iter().all(|c| c.contains(v)));
        if !met {
            explanations.push(Explanation::NoCommonVersion {
                package,
                constraints,
            });
        }
    }
    explanations
}
