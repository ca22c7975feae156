//! Rules each possible package contributes on its own

use std::collections::BTreeMap;
use std::sync::Arc;

use log::warn;
use strata_version::VersionList;

use super::{Encoder, VariantDomain};
use crate::error::Result;
use crate::explain::Explanation;
use crate::package::{DependencyDecl, Requirement};
use crate::solver::{Literal, RuleType};
use crate::spec::SpecConstraint;

/// The requirement as separate constraints, so each can be blamed on its own
fn requirement_constraints(requirement: &Requirement) -> Vec<SpecConstraint> {
    let mut constraints = Vec::new();
    if !requirement.versions.is_any() {
        constraints.push(SpecConstraint::Version(requirement.versions.clone()));
    }
    for (name, value) in &requirement.variants {
        constraints.push(SpecConstraint::variant(name.clone(), value.clone()));
    }
    if let Some(compiler) = &requirement.compiler {
        constraints.push(SpecConstraint::Compiler(compiler.clone()));
    }
    constraints
}

impl Encoder<'_> {
    pub(super) fn add_package_rules(&mut self, name: &str) -> Result<()> {
        let Some(domain) = self.domains.get(name).cloned() else {
            return Ok(());
        };
        let node = self.node_lit(name);

        // Exactly one version; versions not in the recipe need a binding that brings them
        let versions: Vec<Literal> = (0..domain.versions.len())
            .map(|i| self.version_lit(name, i))
            .collect();
        self.formula.exactly_one(Some(node), &versions, RuleType::Package);
        for (i, choice) in domain.versions.iter().enumerate() {
            self.formula.implies(versions[i], node, RuleType::Definition);
            if choice.declared {
                continue;
            }
            let mut sources = Vec::new();
            if domain.external.as_ref().is_some_and(|e| e.version == choice.version) {
                sources.push(self.external_lit(name));
            }
            let candidates: Vec<usize> = self
                .candidates
                .iter()
                .enumerate()
                .filter(|(_, c)| c.spec.name() == name && c.spec.version() == &choice.version)
                .map(|(r, _)| r)
                .collect();
            for r in candidates {
                sources.push(self.reuse_lit(name, r));
            }
            self.formula.implies_any(versions[i], &sources, RuleType::Package);
        }

        let compilers: Vec<Literal> = (0..self.config.compilers.len())
            .map(|j| self.compiler_lit(name, j))
            .collect();
        self.formula.exactly_one(Some(node), &compilers, RuleType::Package);
        let targets: Vec<Literal> = (0..self.config.targets.len())
            .map(|k| self.target_lit(name, k))
            .collect();
        self.formula.exactly_one(Some(node), &targets, RuleType::Package);
        for lit in compilers.iter().chain(targets.iter()) {
            self.formula.implies(*lit, node, RuleType::Definition);
        }

        self.add_variant_rules(name, &domain.variants)?;
        self.add_external_rules(name);

        if !self.config.is_buildable(name) {
            let mut clause = vec![-node];
            if domain.external.is_some() {
                clause.push(self.external_lit(name));
            }
            if self.candidates.iter().any(|c| c.spec.name() == name) {
                clause.push(self.reused_any_lit(name));
            }
            let selector = self.selector(Explanation::NotBuildable {
                package: name.to_string(),
            });
            self.formula.add_guarded(clause, RuleType::Package, selector);
        }

        let facts = Arc::clone(&domain.facts);
        for decl in &facts.dependencies {
            self.add_dependency_rules(name, decl)?;
        }

        for conflict in &facts.conflicts {
            let condition = self.condition_lit(name, &conflict.when, name)?;
            let built = self.built_lit(name);
            let selector = self.selector(Explanation::Conflict {
                package: name.to_string(),
                condition: conflict.when.to_string(),
                message: conflict.message.clone(),
            });
            self.formula
                .add_guarded(vec![-condition, -built], RuleType::Package, selector);
        }
        Ok(())
    }

    fn add_variant_rules(
        &mut self,
        name: &str,
        variants: &BTreeMap<String, VariantDomain>,
    ) -> Result<()> {
        for (variant, domain) in variants {
            let active = self.active_lit(name, variant);
            if domain.decl.when.is_empty() {
                let node = self.node_lit(name);
                self.formula.define_and(active, &[node], RuleType::Definition);
            } else {
                let mut conditions = Vec::new();
                for condition in &domain.decl.when {
                    conditions.push(self.condition_lit(name, condition, name)?);
                }
                self.formula.define_or(active, &conditions, RuleType::Definition);
            }

            let values: Vec<Literal> = domain
                .values
                .iter()
                .map(|value| self.value_lit(name, variant, value))
                .collect();
            for &value in &values {
                self.formula.implies(value, active, RuleType::Definition);
            }
            if domain.is_multi() {
                self.formula.implies_any(active, &values, RuleType::Package);
            } else {
                self.formula.exactly_one(Some(active), &values, RuleType::Package);
            }
        }
        Ok(())
    }

    /// An external binding pins the version and the variants the configuration states
    fn add_external_rules(&mut self, name: &str) {
        let Some(domain) = self.domains.get(name) else {
            return;
        };
        let Some(external) = domain.external.clone() else {
            return;
        };
        let version = domain.version_index(&external.version);
        let pinned: Vec<(String, Vec<(String, bool)>)> = external
            .variants
            .iter()
            .filter_map(|(variant, value)| {
                let values = domain.variants.get(variant)?;
                let wanted = value.values();
                let assignment = values
                    .values
                    .iter()
                    .map(|v| (v.clone(), wanted.contains(v)))
                    .collect();
                Some((variant.clone(), assignment))
            })
            .collect();

        let lit = self.external_lit(name);
        let node = self.node_lit(name);
        self.formula.implies(lit, node, RuleType::Definition);
        if let Some(index) = version {
            let version = self.version_lit(name, index);
            self.formula.implies(lit, version, RuleType::Definition);
        }
        for (variant, assignment) in pinned {
            let active = self.active_lit(name, &variant);
            self.formula.implies(lit, active, RuleType::Definition);
            for (value, set) in assignment {
                let value = self.value_lit(name, &variant, &value);
                self.formula
                    .implies(lit, if set { value } else { -value }, RuleType::Definition);
            }
        }
    }

    fn add_dependency_rules(&mut self, name: &str, decl: &DependencyDecl) -> Result<()> {
        if decl.name == name {
            warn!("Ignoring dependency of {} on itself", name);
            return Ok(());
        }
        let when = self.condition_lit(name, &decl.when, name)?;
        let built = self.built_lit(name);
        let active = self.all_of(vec![when, built]);

        if self.closure.is_virtual(&decl.name) {
            return self.add_virtual_dependency_rules(name, decl, active);
        }
        if !self.closure.contains(&decl.name) {
            return Ok(());
        }

        self.add_edge_source(name, &decl.name, decl.types, active);
        for constraint in requirement_constraints(&decl.spec) {
            let lit = self.constraint_lit(&decl.name, &constraint, name)?;
            let selector = self.selector(Explanation::Requirement {
                dependent: name.to_string(),
                package: decl.name.clone(),
                constraint,
            });
            self.formula
                .add_guarded(vec![-active, lit], RuleType::Package, selector);
        }
        Ok(())
    }

    /// A dependency on a virtual goes to whichever provider is chosen
    fn add_virtual_dependency_rules(
        &mut self,
        name: &str,
        decl: &DependencyDecl,
        active: Literal,
    ) -> Result<()> {
        let virtual_name = decl.name.clone();
        self.add_need_source(name, &virtual_name, active);

        let providers: Vec<String> = self.closure.providers(&virtual_name).to_vec();
        for provider in providers {
            if provider == name {
                continue;
            }
            let chosen = self.provider_lit(&virtual_name, &provider);
            let via = self.all_of(vec![active, chosen]);
            self.add_edge_source(name, &provider, decl.types, via);

            if !decl.spec.versions.is_any() {
                let covering = self.covering_conditions(&provider, &virtual_name, &decl.spec.versions)?;
                let selector = self.selector(Explanation::ProviderMismatch {
                    dependent: name.to_string(),
                    virtual_name: virtual_name.clone(),
                    versions: decl.spec.versions.clone(),
                });
                let mut clause = vec![-via];
                clause.extend(covering);
                self.formula.add_guarded(clause, RuleType::Package, selector);
            }

            for constraint in requirement_constraints(&decl.spec) {
                if matches!(constraint, SpecConstraint::Version(_)) {
                    continue;
                }
                let mut clause = vec![-via];
                if let Some(lit) = self.provider_constraint_lit(&provider, &constraint, name)? {
                    clause.push(lit);
                }
                let selector = self.selector(Explanation::Requirement {
                    dependent: name.to_string(),
                    package: virtual_name.clone(),
                    constraint,
                });
                self.formula.add_guarded(clause, RuleType::Package, selector);
            }
        }
        Ok(())
    }

    /// Conditions under which `provider` provides a version of the virtual overlapping `versions`
    pub(crate) fn covering_conditions(
        &mut self,
        provider: &str,
        virtual_name: &str,
        versions: &VersionList,
    ) -> Result<Vec<Literal>> {
        let Some(facts) = self.closure.package(provider).cloned() else {
            return Ok(Vec::new());
        };
        let mut covering = Vec::new();
        for provides in &facts.provides {
            if provides.virtual_name == virtual_name && provides.versions.overlaps(versions) {
                covering.push(self.condition_lit(provider, &provides.when, provider)?);
            }
        }
        Ok(covering)
    }

    /// A constraint on a virtual applied to one provider; `None` when the
    /// provider cannot meet it at all
    pub(crate) fn provider_constraint_lit(
        &mut self,
        provider: &str,
        constraint: &SpecConstraint,
        requested_by: &str,
    ) -> Result<Option<Literal>> {
        if let SpecConstraint::Variant { name, .. } = constraint {
            let declared = self
                .domains
                .get(provider)
                .is_some_and(|d| d.variants.contains_key(name));
            if !declared {
                return Ok(None);
            }
        }
        self.constraint_lit(provider, constraint, requested_by).map(Some)
    }
}
