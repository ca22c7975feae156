//! Value domains: the versions and variant values each package may take

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::warn;
use strata_version::Version;

use super::Encoder;
use crate::config::ExternalConfig;
use crate::package::{AllowedValues, PackageFacts, VariantDecl, VariantKind};
use crate::spec::{AbstractSpec, Condition, SpecConstraint};

/// One version a package may take
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionChoice {
    pub version: Version,
    /// Listed by the recipe; other versions come from externals or reuse
    pub declared: bool,
    pub preferred: bool,
    pub deprecated: bool,
}

/// The values a declared variant may take
#[derive(Debug, Clone)]
pub struct VariantDomain {
    pub decl: VariantDecl,
    /// Sorted
    pub values: Vec<String>,
    pub defaults: BTreeSet<String>,
}

impl VariantDomain {
    pub fn is_multi(&self) -> bool {
        self.decl.kind == VariantKind::Multi
    }
}

/// Everything a package may be, as seen by one request
#[derive(Debug, Clone)]
pub struct PackageDomain {
    pub facts: Arc<PackageFacts>,
    /// Newest first
    pub versions: Vec<VersionChoice>,
    pub variants: BTreeMap<String, VariantDomain>,
    /// The configured external, with variants the recipe does not accept removed
    pub external: Option<ExternalConfig>,
}

impl PackageDomain {
    pub fn version_index(&self, version: &Version) -> Option<usize> {
        self.versions.iter().position(|c| &c.version == version)
    }

    /// Version indices from most to least wanted: preferred, then declared
    /// by the recipe, then newest, deprecated last
    pub fn preference_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.versions.len()).collect();
        order.sort_by_key(|&i| {
            let choice = &self.versions[i];
            (choice.deprecated, !choice.preferred, !choice.declared, i)
        });
        order
    }

    /// Whether any version is marked preferred
    pub fn has_preferred(&self) -> bool {
        self.versions.iter().any(|c| c.preferred)
    }
}

type Mentioned = BTreeMap<(String, String), BTreeSet<String>>;

fn mention(mentioned: &mut Mentioned, package: &str, variant: &str, values: Vec<String>) {
    mentioned
        .entry((package.to_string(), variant.to_string()))
        .or_default()
        .extend(values);
}

fn mention_condition(mentioned: &mut Mentioned, package: &str, condition: &Condition) {
    for constraint in &condition.constraints {
        if let SpecConstraint::Variant { name, value } = constraint {
            mention(mentioned, package, name, value.values());
        }
    }
}

impl Encoder<'_> {
    pub(super) fn build_domains(&mut self) {
        let mentioned = self.mentioned_values();
        let packages: Vec<Arc<PackageFacts>> = self.closure.packages().values().cloned().collect();

        for facts in packages {
            let name = facts.name.clone();
            let external = self
                .config
                .externally_available
                .get(&name)
                .map(|ext| validate_external(&facts, ext));

            let preferred_override = self.config.prefer_versions.get(&name);
            let mut versions: BTreeMap<Version, VersionChoice> = BTreeMap::new();
            for decl in &facts.versions {
                let preferred = match preferred_override {
                    Some(list) => list.contains(&decl.version),
                    None => decl.preferred,
                };
                versions.insert(
                    decl.version.clone(),
                    VersionChoice {
                        version: decl.version.clone(),
                        declared: true,
                        preferred,
                        deprecated: decl.deprecated,
                    },
                );
            }
            let extra = external
                .iter()
                .map(|ext| ext.version.clone())
                .chain(
                    self.candidates
                        .iter()
                        .filter(|c| c.spec.name() == name)
                        .map(|c| c.spec.version().clone()),
                )
                .collect::<Vec<_>>();
            for version in extra {
                versions.entry(version.clone()).or_insert_with(|| VersionChoice {
                    preferred: preferred_override.is_some_and(|list| list.contains(&version)),
                    version,
                    declared: false,
                    deprecated: false,
                });
            }
            let versions: Vec<VersionChoice> = versions.into_values().rev().collect();

            let mut variants = BTreeMap::new();
            for decl in &facts.variants {
                let preference = self
                    .config
                    .variant_preferences
                    .get(&name)
                    .and_then(|prefs| prefs.get(&decl.name))
                    .filter(|value| decl.accepts(value));
                let defaults: BTreeSet<String> = match preference {
                    Some(value) => value.values().into_iter().collect(),
                    None => decl.default_values().into_iter().collect(),
                };

                let mut values: BTreeSet<String> = match (decl.kind, &decl.values) {
                    (VariantKind::Bool, _) => ["false", "true"].iter().map(|v| v.to_string()).collect(),
                    (_, AllowedValues::List(list)) => list.iter().cloned().collect(),
                    (_, AllowedValues::Any) => mentioned
                        .get(&(name.clone(), decl.name.clone()))
                        .cloned()
                        .unwrap_or_default(),
                };
                if decl.kind != VariantKind::Bool {
                    values.extend(defaults.iter().cloned());
                }

                variants.insert(
                    decl.name.clone(),
                    VariantDomain {
                        decl: decl.clone(),
                        values: values.into_iter().collect(),
                        defaults,
                    },
                );
            }

            self.domains.insert(
                name,
                PackageDomain {
                    facts,
                    versions,
                    variants,
                    external,
                },
            );
        }
    }

    /// Variant values named anywhere in the problem, for variants that accept any value
    fn mentioned_values(&self) -> Mentioned {
        let mut mentioned = Mentioned::new();

        let mention_spec = |mentioned: &mut Mentioned, spec: &AbstractSpec| {
            for (variant, value) in &spec.variants {
                let Some(value) = value else { continue };
                if self.closure.is_virtual(&spec.name) {
                    for provider in self.closure.providers(&spec.name) {
                        mention(mentioned, provider, variant, value.values());
                    }
                } else {
                    mention(mentioned, &spec.name, variant, value.values());
                }
            }
        };
        for root in &self.roots {
            mention_spec(&mut mentioned, &root.spec);
            for (dependency, _) in root.dependencies.values() {
                mention_spec(&mut mentioned, dependency);
            }
            for conditional in &root.conditional {
                mention_spec(&mut mentioned, &conditional.spec);
                mention_condition(&mut mentioned, &conditional.parent, &conditional.when);
            }
        }

        for (name, facts) in self.closure.packages() {
            for variant in &facts.variants {
                for condition in &variant.when {
                    mention_condition(&mut mentioned, name, condition);
                }
            }
            for conflict in &facts.conflicts {
                mention_condition(&mut mentioned, name, &conflict.when);
            }
            for provides in &facts.provides {
                mention_condition(&mut mentioned, name, &provides.when);
            }
            for dependency in &facts.dependencies {
                mention_condition(&mut mentioned, name, &dependency.when);
                let targets: Vec<&str> = if self.closure.is_virtual(&dependency.name) {
                    self.closure.providers(&dependency.name).iter().map(String::as_str).collect()
                } else {
                    vec![dependency.name.as_str()]
                };
                for target in targets {
                    for (variant, value) in &dependency.spec.variants {
                        mention(&mut mentioned, target, variant, value.values());
                    }
                }
            }
        }

        for (package, preferences) in &self.config.variant_preferences {
            for (variant, value) in preferences {
                mention(&mut mentioned, package, variant, value.values());
            }
        }
        for (package, external) in &self.config.externally_available {
            for (variant, value) in &external.variants {
                mention(&mut mentioned, package, variant, value.values());
            }
        }
        for candidate in &self.candidates {
            for (variant, value) in candidate.spec.variants() {
                mention(&mut mentioned, candidate.spec.name(), variant, value.values());
            }
        }
        mentioned
    }
}

/// Drop external variants the recipe does not declare or accept
fn validate_external(facts: &PackageFacts, external: &ExternalConfig) -> ExternalConfig {
    let mut validated = external.clone();
    validated.variants.retain(|variant, value| {
        let accepted = facts.variant(variant).is_some_and(|decl| decl.accepts(value));
        if !accepted {
            warn!(
                "Ignoring variant {} on external {}: not accepted by the recipe",
                value.render(variant),
                facts.name
            );
        }
        accepted
    });
    validated
}
