//! Compiler runtime injection.
//!
//! Every package built with a compiler that ships a runtime library links
//! against that runtime. The runtime node must be at least as new as every
//! compiler that uses it, and is no newer than the newest such compiler
//! unless a reusable runtime brings a newer version along.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;
use strata_version::Version;

use super::Encoder;
use crate::package::{PackageFacts, VersionDecl};
use crate::solver::{Literal, RuleType};
use crate::spec::DepTypes;

impl Encoder<'_> {
    /// compiler name -> runtime package, for the configured compilers that have one
    pub(super) fn runtime_packages(&self) -> BTreeMap<String, String> {
        if !self.config.inject_compiler_runtimes {
            return BTreeMap::new();
        }
        self.config
            .compilers
            .iter()
            .filter_map(|compiler| {
                self.config
                    .compiler_runtime(&compiler.name)
                    .map(|runtime| (compiler.name.clone(), runtime.to_string()))
            })
            .collect()
    }

    /// Make every runtime a possible dependency of every other package.
    ///
    /// A runtime no provider knows about is synthesized with one version per
    /// configured compiler of its family.
    pub(super) fn add_runtime_packages(&mut self) {
        let runtimes: Vec<(String, String)> = self
            .runtimes
            .iter()
            .map(|(compiler, runtime)| (compiler.clone(), runtime.clone()))
            .collect();

        for (compiler, runtime) in runtimes {
            if !self.closure.contains(&runtime) {
                let mut facts = PackageFacts::new(runtime.clone());
                let mut versions: Vec<&Version> = self
                    .config
                    .compilers
                    .iter()
                    .filter(|c| c.name == compiler)
                    .map(|c| &c.version)
                    .collect();
                versions.sort();
                versions.dedup();
                for version in versions {
                    facts = facts.with_version(VersionDecl::new(version.clone()));
                }
                debug!(
                    "Synthesized {} with {} versions",
                    runtime,
                    facts.versions.len()
                );
                self.closure.insert_package(Arc::new(facts));
            }

            let others: Vec<String> = self
                .closure
                .packages()
                .keys()
                .filter(|name| **name != runtime)
                .cloned()
                .collect();
            for name in others {
                self.closure.add_edge(&name, &runtime);
            }
        }
    }

    pub(super) fn add_runtime_rules(&mut self) {
        let runtimes: Vec<(String, String)> = self
            .runtimes
            .iter()
            .map(|(compiler, runtime)| (compiler.clone(), runtime.clone()))
            .collect();

        for (compiler, runtime) in runtimes {
            let Some(domain) = self.domains.get(&runtime).cloned() else {
                continue;
            };
            let compilers: Vec<(usize, Version)> = self
                .config
                .compilers
                .iter()
                .enumerate()
                .filter(|(_, c)| c.name == compiler)
                .map(|(j, c)| (j, c.version.clone()))
                .collect();
            let names: Vec<String> = self
                .closure
                .packages()
                .keys()
                .filter(|name| **name != runtime)
                .cloned()
                .collect();

            // (P built with compiler j) links the runtime, at no older version than j
            let mut uses: Vec<(Literal, Version)> = Vec::new();
            for name in &names {
                let built = self.built_lit(name);
                for (j, compiler_version) in &compilers {
                    let chosen = self.compiler_lit(name, *j);
                    let pair = self.all_of(vec![built, chosen]);
                    self.add_edge_source(name, &runtime, DepTypes::LINK, pair);
                    for (i, choice) in domain.versions.iter().enumerate() {
                        if choice.version < *compiler_version {
                            let version = self.version_lit(&runtime, i);
                            self.formula
                                .add_clause(vec![-pair, -version], RuleType::Package);
                        }
                    }
                    uses.push((pair, compiler_version.clone()));
                }
            }

            // A runtime version above the next lower one needs a compiler that
            // new, or a reused runtime of exactly that version
            let mut ascending: Vec<usize> = (0..domain.versions.len()).collect();
            ascending.reverse();
            for window in ascending.windows(2) {
                let (lower, upper) = (window[0], window[1]);
                let lower_version = &domain.versions[lower].version;
                let upper_version = domain.versions[upper].version.clone();

                let mut reasons: Vec<Literal> = uses
                    .iter()
                    .filter(|(_, v)| v > lower_version)
                    .map(|(pair, _)| *pair)
                    .collect();
                let reused: Vec<usize> = self
                    .candidates
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.spec.name() == runtime && c.spec.version() == &upper_version)
                    .map(|(r, _)| r)
                    .collect();
                for r in reused {
                    reasons.push(self.reuse_lit(&runtime, r));
                }
                let version = self.version_lit(&runtime, upper);
                self.formula.implies_any(version, &reasons, RuleType::Package);
            }
        }
    }
}
