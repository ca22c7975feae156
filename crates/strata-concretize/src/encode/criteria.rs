//! Optimization criteria, branching hints and the final tie-break order.
//!
//! Criteria are minimized lexicographically in the order they are added:
//!
//! 1. packages built from source that could have been reused or external
//! 2. deprecated versions
//! 3. versions other than the preferred ones (the newest declared one
//!    when none is marked)
//! 4. variant values other than the defaults
//! 5. providers other than the preferred ones
//! 6. number of nodes
//! 7. version age, newest first
//! 8. compiler position in the configuration
//! 9. target position in the configuration

use super::{Encoder, VariantDomain};
use crate::solver::{BranchHint, Literal, RuleType};

impl Encoder<'_> {
    fn package_names(&self) -> Vec<String> {
        self.domains.keys().cloned().collect()
    }

    pub(super) fn add_criteria(&mut self) {
        let names = self.package_names();

        let mut built = Vec::new();
        for name in &names {
            if let Some(&lit) = self.built.get(name) {
                built.push((lit, 1));
            }
        }
        self.formula.add_criterion("build-count", built);

        let mut deprecated = Vec::new();
        let mut not_preferred = Vec::new();
        let mut age = Vec::new();
        for name in &names {
            let domain = &self.domains[name];
            let choices: Vec<(bool, bool)> = domain
                .versions
                .iter()
                .map(|c| (c.deprecated, c.preferred))
                .collect();
            // without an explicit preference the newest declared version is the default
            let has_preferred = domain.has_preferred();
            let default = domain.preference_order().first().copied();
            for (i, (is_deprecated, is_preferred)) in choices.into_iter().enumerate() {
                let lit = self.version_lit(name, i);
                if is_deprecated {
                    deprecated.push((lit, 1));
                }
                let is_default = if has_preferred { is_preferred } else { Some(i) == default };
                if !is_default {
                    not_preferred.push((lit, 1));
                }
                age.push((lit, i as u64));
            }
        }
        self.formula.add_criterion("deprecated-versions", deprecated);
        self.formula.add_criterion("non-preferred-versions", not_preferred);

        let variants = self.variant_default_terms(&names);
        self.formula.add_criterion("non-default-variants", variants);

        let mut providers = Vec::new();
        let preferences = self.config.provider_preferences.clone();
        for (virtual_name, preferred) in &preferences {
            let candidates: Vec<String> = self.closure.providers(virtual_name).to_vec();
            for provider in candidates {
                let weight = preferred
                    .iter()
                    .position(|p| *p == provider)
                    .unwrap_or(preferred.len());
                let lit = self.provider_lit(virtual_name, &provider);
                providers.push((lit, weight as u64));
            }
        }
        self.formula.add_criterion("provider-preference", providers);

        let nodes: Vec<(Literal, u64)> = names.iter().map(|name| (self.node_lit(name), 1)).collect();
        self.formula.add_criterion("node-count", nodes);

        self.formula.add_criterion("version-age", age);

        let compilers = self.config.compilers.len();
        let targets = self.config.targets.len();
        let mut compiler_terms = Vec::new();
        let mut target_terms = Vec::new();
        for name in &names {
            for j in 1..compilers {
                compiler_terms.push((self.compiler_lit(name, j), j as u64));
            }
            for k in 1..targets {
                target_terms.push((self.target_lit(name, k), k as u64));
            }
        }
        self.formula.add_criterion("compiler-order", compiler_terms);
        self.formula.add_criterion("target-order", target_terms);
    }

    /// One point per non-default value chosen, and per default value
    /// missing from an active multi-valued variant
    fn variant_default_terms(&mut self, names: &[String]) -> Vec<(Literal, u64)> {
        let mut terms = Vec::new();
        for name in names {
            let variants: Vec<(String, VariantDomain)> = self.domains[name]
                .variants
                .iter()
                .map(|(n, d)| (n.clone(), d.clone()))
                .collect();
            for (variant, domain) in variants {
                for value in &domain.values {
                    if !domain.defaults.contains(value) {
                        terms.push((self.value_lit(name, &variant, value), 1));
                    }
                }
                if domain.is_multi() {
                    let active = self.active_lit(name, &variant);
                    for default in &domain.defaults {
                        let held = self.value_lit(name, &variant, default);
                        let missing = self.formula.new_var() as Literal;
                        self.formula
                            .define_and(missing, &[active, -held], RuleType::Definition);
                        terms.push((missing, 1));
                    }
                }
            }
        }
        terms
    }

    pub(super) fn add_hints(&mut self) {
        for name in self.package_names() {
            let node = self.node_lit(&name);
            let domain = self.domains[&name].clone();

            let reusable: Vec<usize> = self
                .candidates
                .iter()
                .enumerate()
                .filter(|(_, c)| c.spec.name() == name)
                .map(|(r, _)| r)
                .collect();
            for r in reusable {
                let lit = self.reuse_lit(&name, r);
                self.formula.add_hint(BranchHint::when(node, lit));
            }
            for i in domain.preference_order() {
                let lit = self.version_lit(&name, i);
                self.formula.add_hint(BranchHint::when(node, lit));
            }
            let compiler = self.compiler_lit(&name, 0);
            self.formula.add_hint(BranchHint::when(node, compiler));
            let target = self.target_lit(&name, 0);
            self.formula.add_hint(BranchHint::when(node, target));

            for (variant, variant_domain) in &domain.variants {
                let active = self.active_lit(&name, variant);
                for default in &variant_domain.defaults {
                    let lit = self.value_lit(&name, variant, default);
                    self.formula.add_hint(BranchHint::when(active, lit));
                }
            }
        }

        let virtuals: Vec<String> = self.closure.virtuals().keys().cloned().collect();
        for virtual_name in virtuals {
            if let Some(provider) = self.ordered_providers(&virtual_name).into_iter().next() {
                let needed = self.virtual_needed_lit(&virtual_name);
                let lit = self.provider_lit(&virtual_name, &provider);
                self.formula.add_hint(BranchHint::when(needed, lit));
            }
        }
    }

    /// Providers of a virtual, configured preferences first, then by name
    fn ordered_providers(&self, virtual_name: &str) -> Vec<String> {
        let mut providers: Vec<String> = self.closure.providers(virtual_name).to_vec();
        let preferred = self.config.provider_preferences.get(virtual_name);
        providers.sort_by_key(|p| {
            let rank = preferred
                .and_then(|list| list.iter().position(|q| q == p))
                .unwrap_or(usize::MAX);
            (rank, p.clone())
        });
        providers
    }

    /// Canonical order among equally optimal models
    pub(super) fn add_tie_break(&mut self) {
        let virtuals: Vec<String> = self.closure.virtuals().keys().cloned().collect();
        for virtual_name in virtuals {
            let group: Vec<Literal> = self
                .ordered_providers(&virtual_name)
                .iter()
                .map(|provider| self.provider_lit(&virtual_name, provider))
                .collect();
            self.formula.add_tie_break(group);
        }

        let compilers = self.config.compilers.len();
        let targets = self.config.targets.len();
        for name in self.package_names() {
            let domain = self.domains[&name].clone();

            let reusable: Vec<usize> = self
                .candidates
                .iter()
                .enumerate()
                .filter(|(_, c)| c.spec.name() == name)
                .map(|(r, _)| r)
                .collect();
            for r in reusable {
                let lit = self.reuse_lit(&name, r);
                self.formula.add_tie_break(vec![lit]);
            }

            let versions: Vec<Literal> = domain
                .preference_order()
                .into_iter()
                .map(|i| self.version_lit(&name, i))
                .collect();
            self.formula.add_tie_break(versions);
            let compilers: Vec<Literal> = (0..compilers).map(|j| self.compiler_lit(&name, j)).collect();
            self.formula.add_tie_break(compilers);
            let targets: Vec<Literal> = (0..targets).map(|k| self.target_lit(&name, k)).collect();
            self.formula.add_tie_break(targets);

            for (variant, variant_domain) in &domain.variants {
                for default in &variant_domain.defaults {
                    let lit = self.value_lit(&name, variant, default);
                    self.formula.add_tie_break(vec![lit]);
                }
            }
        }
    }
}
