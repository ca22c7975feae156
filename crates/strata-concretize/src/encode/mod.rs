//! Compilation of a request into a solver formula.
//!
//! The [`Encoder`] walks the possible dependencies of a request and emits
//! clauses over [`Atom`]s:
//! - Node rules: a present package takes exactly one version, compiler and target
//! - Variant rules: active variants take values their declaration allows
//! - Dependency rules: a built package pulls in what its recipe declares
//! - Virtual rules: a needed virtual has exactly one provider
//! - Reuse and external rules: a node may be bound to an existing spec
//! - Request rules: one selector per user constraint
//!
//! Every constraint that may be given up carries a selector tagged with an
//! [`Explanation`], so an unsatisfiable core maps back to readable reasons.

mod acyclic;
mod atoms;
mod conditions;
mod criteria;
mod domains;
mod package;
mod request;
mod reuse;
mod runtime;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};

use crate::config::SolverConfig;
use crate::error::{ConcretizeError, Result};
use crate::explain::Explanation;
use crate::package::{possible_dependencies, FactProvider, PossibleDependencies};
use crate::solver::{Formula, Literal, RuleType, Var};
use crate::spec::{AbstractSpec, ArchSpec, CompilerSpec, ConcreteSpec, DepTypes};

pub use atoms::{Atom, AtomTable};
pub use domains::{PackageDomain, VariantDomain, VersionChoice};
pub use request::{ConditionalDependency, RootRequest};
pub use reuse::ReuseCandidate;

/// Selectors that switch reuse off, for the fallback passes
#[derive(Debug, Clone, Copy, Default)]
pub struct ReuseSwitches {
    /// Forbids binding a root of the request to a reuse candidate
    pub no_root_reuse: Option<Var>,
    /// Forbids every reuse binding
    pub no_reuse: Option<Var>,
}

/// A compiled request, ready to be solved any number of times
#[derive(Debug)]
pub struct Problem {
    pub(crate) formula: Formula,
    pub(crate) atoms: AtomTable,
    pub(crate) explanations: BTreeMap<Var, Explanation>,
    pub(crate) switches: ReuseSwitches,
    pub(crate) closure: PossibleDependencies,
    pub(crate) domains: BTreeMap<String, PackageDomain>,
    pub(crate) candidates: Vec<ReuseCandidate>,
    pub(crate) roots: Vec<RootRequest>,
    pub(crate) requests: Vec<AbstractSpec>,
    pub(crate) compilers: Vec<CompilerSpec>,
    pub(crate) targets: Vec<ArchSpec>,
}

impl Problem {
    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    pub fn atoms(&self) -> &AtomTable {
        &self.atoms
    }

    /// Selectors that carry an explanation, sorted
    pub fn explained_selectors(&self) -> impl Iterator<Item = Var> + '_ {
        self.explanations.keys().copied()
    }

    pub fn explanation(&self, selector: Var) -> Option<&Explanation> {
        self.explanations.get(&selector)
    }

    pub fn switches(&self) -> ReuseSwitches {
        self.switches
    }

    pub fn has_root_candidates(&self) -> bool {
        self.candidates
            .iter()
            .any(|c| self.roots.iter().any(|r| r.spec.name == c.spec.name()))
    }

    pub fn has_candidates(&self) -> bool {
        !self.candidates.is_empty()
    }

    pub fn domain(&self, package: &str) -> Option<&PackageDomain> {
        self.domains.get(package)
    }

    pub fn closure(&self) -> &PossibleDependencies {
        &self.closure
    }

    /// The requests in the order they were given
    pub fn requests(&self) -> &[AbstractSpec] {
        &self.requests
    }
}

/// Builds a [`Problem`] from a request and the reusable specs.
pub struct Encoder<'a> {
    provider: &'a dyn FactProvider,
    config: &'a SolverConfig,
    formula: Formula,
    atoms: AtomTable,
    explanations: BTreeMap<Var, Explanation>,
    selectors: HashMap<Explanation, Var>,
    closure: PossibleDependencies,
    domains: BTreeMap<String, PackageDomain>,
    candidates: Vec<ReuseCandidate>,
    roots: Vec<RootRequest>,
    /// (package, rendered condition) -> literal
    conditions: HashMap<(String, String), Literal>,
    /// (parent, child) -> single dependency type -> literals that create it
    edge_sources: BTreeMap<(String, String), BTreeMap<DepTypes, Vec<Literal>>>,
    deptype_atoms: BTreeSet<(String, String, DepTypes)>,
    depends_atoms: BTreeSet<(String, String)>,
    /// (package, virtual) -> literals that make the package need it
    need_sources: BTreeMap<(String, String), Vec<Literal>>,
    built: HashMap<String, Literal>,
    /// compiler name -> runtime package
    runtimes: BTreeMap<String, String>,
    switches: ReuseSwitches,
    false_lit: Literal,
}

impl<'a> Encoder<'a> {
    pub fn new(provider: &'a dyn FactProvider, config: &'a SolverConfig) -> Self {
        let mut formula = Formula::new();
        let false_var = formula.new_var() as Literal;
        formula.add_clause(vec![-false_var], RuleType::Definition);
        Self {
            provider,
            config,
            formula,
            atoms: AtomTable::new(),
            explanations: BTreeMap::new(),
            selectors: HashMap::new(),
            closure: PossibleDependencies::default(),
            domains: BTreeMap::new(),
            candidates: Vec::new(),
            roots: Vec::new(),
            conditions: HashMap::new(),
            edge_sources: BTreeMap::new(),
            deptype_atoms: BTreeSet::new(),
            depends_atoms: BTreeSet::new(),
            need_sources: BTreeMap::new(),
            built: HashMap::new(),
            runtimes: BTreeMap::new(),
            switches: ReuseSwitches::default(),
            false_lit: false_var,
        }
    }

    /// Compile `requests` to be solved together, with `reusable` as candidates
    pub fn encode(
        mut self,
        requests: &[AbstractSpec],
        reusable: &[Arc<ConcreteSpec>],
    ) -> Result<Problem> {
        let start = Instant::now();

        if self.config.compilers.is_empty() {
            return Err(ConcretizeError::Config("no compilers configured".to_string()));
        }
        if self.config.targets.is_empty() {
            return Err(ConcretizeError::Config("no targets configured".to_string()));
        }

        self.runtimes = self.runtime_packages();
        self.roots = self.prepare_requests(requests)?;
        self.closure = possible_dependencies(self.provider, &self.closure_roots())?;
        self.add_runtime_packages();
        if self.config.reuse {
            self.collect_candidates(reusable);
        }
        self.build_domains();
        debug!(
            "Encoding {} packages, {} virtuals, {} reuse candidates",
            self.closure.packages().len(),
            self.closure.virtuals().len(),
            self.candidates.len()
        );

        self.define_built();
        let names: Vec<String> = self.closure.packages().keys().cloned().collect();
        for name in &names {
            self.add_package_rules(name)?;
        }
        self.add_platform_rules();
        debug!("After package rules: {} rules", self.formula.rules().len());

        self.add_reuse_rules();
        self.add_runtime_rules();
        self.add_request_rules()?;
        debug!("After request rules: {} rules", self.formula.rules().len());

        self.add_acyclic_rules();
        self.finalize_virtuals()?;
        self.finalize_edges();
        self.add_criteria();
        self.add_hints();
        self.add_tie_break();

        info!(
            "Encoded {} atoms, {} rules, {} explained selectors in {:?}",
            self.atoms.len(),
            self.formula.rules().len(),
            self.explanations.len(),
            start.elapsed()
        );

        Ok(Problem {
            formula: self.formula,
            atoms: self.atoms,
            explanations: self.explanations,
            switches: self.switches,
            closure: self.closure,
            domains: self.domains,
            candidates: self.candidates,
            roots: self.roots,
            requests: requests.to_vec(),
            compilers: self.config.compilers.clone(),
            targets: self.config.targets.clone(),
        })
    }

    /// Root names of the closure, each with who asked for it
    fn closure_roots(&self) -> Vec<(String, String)> {
        let mut roots = Vec::new();
        for root in &self.roots {
            roots.push((root.spec.name.clone(), "the request".to_string()));
            for name in root.dependencies.keys() {
                roots.push((name.clone(), root.spec.name.clone()));
            }
            for conditional in &root.conditional {
                roots.push((conditional.spec.name.clone(), root.spec.name.clone()));
            }
        }
        roots.retain(|(name, _)| !self.is_synthesized_runtime(name));
        for runtime in self.runtimes.values() {
            if self.provider.facts_for(runtime).is_some() {
                roots.push((runtime.clone(), "compiler runtime injection".to_string()));
            }
        }
        roots
    }

    /// A runtime package the provider does not know, built from the compiler list
    fn is_synthesized_runtime(&self, name: &str) -> bool {
        self.runtimes.values().any(|runtime| runtime == name) && self.provider.facts_for(name).is_none()
    }

    /// Whether a request may name this package as a node
    fn is_known_package(&self, name: &str) -> bool {
        self.provider.facts_for(name).is_some() || self.is_synthesized_runtime(name)
    }

    fn atom(&mut self, atom: Atom) -> Literal {
        self.atoms.intern(&mut self.formula, atom)
    }

    pub(crate) fn node_lit(&mut self, package: &str) -> Literal {
        self.atom(Atom::Node(package.to_string()))
    }

    pub(crate) fn version_lit(&mut self, package: &str, index: usize) -> Literal {
        self.atom(Atom::Version(package.to_string(), index))
    }

    pub(crate) fn value_lit(&mut self, package: &str, variant: &str, value: &str) -> Literal {
        self.atom(Atom::VariantValue {
            package: package.to_string(),
            variant: variant.to_string(),
            value: value.to_string(),
        })
    }

    pub(crate) fn active_lit(&mut self, package: &str, variant: &str) -> Literal {
        self.atom(Atom::Active(package.to_string(), variant.to_string()))
    }

    pub(crate) fn compiler_lit(&mut self, package: &str, index: usize) -> Literal {
        self.atom(Atom::Compiler(package.to_string(), index))
    }

    pub(crate) fn target_lit(&mut self, package: &str, index: usize) -> Literal {
        self.atom(Atom::Target(package.to_string(), index))
    }

    pub(crate) fn external_lit(&mut self, package: &str) -> Literal {
        self.atom(Atom::External(package.to_string()))
    }

    pub(crate) fn reuse_lit(&mut self, package: &str, candidate: usize) -> Literal {
        self.atom(Atom::Reuse(package.to_string(), candidate))
    }

    pub(crate) fn reused_any_lit(&mut self, package: &str) -> Literal {
        self.atom(Atom::ReusedAny(package.to_string()))
    }

    pub(crate) fn provider_lit(&mut self, virtual_name: &str, package: &str) -> Literal {
        self.atom(Atom::Provider(virtual_name.to_string(), package.to_string()))
    }

    pub(crate) fn virtual_needed_lit(&mut self, virtual_name: &str) -> Literal {
        self.atom(Atom::VirtualNeeded(virtual_name.to_string()))
    }

    /// Built literal of a package; `define_built` must have run
    pub(crate) fn built_lit(&mut self, package: &str) -> Literal {
        match self.built.get(package) {
            Some(&lit) => lit,
            None => self.node_lit(package),
        }
    }

    pub(crate) fn depends_lit(&mut self, parent: &str, child: &str) -> Literal {
        self.depends_atoms
            .insert((parent.to_string(), child.to_string()));
        self.atom(Atom::Depends(parent.to_string(), child.to_string()))
    }

    /// Literal for an edge of a single dependency type
    pub(crate) fn deptype_lit(&mut self, parent: &str, child: &str, deptype: DepTypes) -> Literal {
        self.depends_atoms
            .insert((parent.to_string(), child.to_string()));
        self.deptype_atoms
            .insert((parent.to_string(), child.to_string(), deptype));
        self.atom(Atom::DepType(parent.to_string(), child.to_string(), deptype))
    }

    pub(crate) fn needs_virtual_lit(&mut self, package: &str, virtual_name: &str) -> Literal {
        self.need_sources
            .entry((package.to_string(), virtual_name.to_string()))
            .or_default();
        self.atom(Atom::NeedsVirtual(package.to_string(), virtual_name.to_string()))
    }

    /// Record that `source` creates an edge of `types` from `parent` to `child`
    pub(crate) fn add_edge_source(&mut self, parent: &str, child: &str, types: DepTypes, source: Literal) {
        for deptype in types.iter() {
            self.deptype_lit(parent, child, deptype);
            self.edge_sources
                .entry((parent.to_string(), child.to_string()))
                .or_default()
                .entry(deptype)
                .or_default()
                .push(source);
        }
    }

    /// Record that `source` makes `package` need `virtual_name`
    pub(crate) fn add_need_source(&mut self, package: &str, virtual_name: &str, source: Literal) {
        self.needs_virtual_lit(package, virtual_name);
        self.need_sources
            .entry((package.to_string(), virtual_name.to_string()))
            .or_default()
            .push(source);
    }

    /// A selector tagged with `explanation`; equal explanations share one
    pub(crate) fn selector(&mut self, explanation: Explanation) -> Var {
        if let Some(&selector) = self.selectors.get(&explanation) {
            return selector;
        }
        let selector = self.formula.new_selector();
        self.explanations.insert(selector, explanation.clone());
        self.selectors.insert(explanation, selector);
        selector
    }

    pub(crate) fn true_lit(&self) -> Literal {
        -self.false_lit
    }

    /// A literal equivalent to the disjunction of `literals`
    pub(crate) fn any_of(&mut self, literals: Vec<Literal>) -> Literal {
        let literals: Vec<Literal> = literals.into_iter().filter(|&l| l != self.false_lit).collect();
        if literals.contains(&self.true_lit()) {
            return self.true_lit();
        }
        match literals.as_slice() {
            [] => self.false_lit,
            [single] => *single,
            _ => {
                let aux = self.formula.new_var() as Literal;
                self.formula.define_or(aux, &literals, RuleType::Definition);
                aux
            }
        }
    }

    /// A literal equivalent to the conjunction of `literals`
    pub(crate) fn all_of(&mut self, literals: Vec<Literal>) -> Literal {
        if literals.contains(&self.false_lit) {
            return self.false_lit;
        }
        let mut literals: Vec<Literal> = literals.into_iter().filter(|&l| l != self.true_lit()).collect();
        literals.dedup();
        match literals.as_slice() {
            [] => self.true_lit(),
            [single] => *single,
            _ => {
                let aux = self.formula.new_var() as Literal;
                self.formula.define_and(aux, &literals, RuleType::Definition);
                aux
            }
        }
    }

    /// Built(P) is Node(P) unless P could also be external or reused
    fn define_built(&mut self) {
        let names: Vec<String> = self.closure.packages().keys().cloned().collect();
        for name in names {
            let has_external = self.domains.get(&name).is_some_and(|d| d.external.is_some());
            let has_candidates = self.candidates.iter().any(|c| c.spec.name() == name);
            if !has_external && !has_candidates {
                continue;
            }

            let node = self.node_lit(&name);
            let mut parts = vec![node];
            if has_external {
                parts.push(-self.external_lit(&name));
            }
            if has_candidates {
                parts.push(-self.reused_any_lit(&name));
            }
            let built = self.atom(Atom::Built(name.clone()));
            self.formula.define_and(built, &parts, RuleType::Definition);
            self.built.insert(name, built);
        }
    }

    /// Every node of the DAG shares one platform
    fn add_platform_rules(&mut self) {
        let mut platforms: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, target) in self.config.targets.iter().enumerate() {
            platforms.entry(target.platform.clone()).or_default().push(index);
        }
        if platforms.len() < 2 {
            return;
        }

        let names: Vec<String> = self.closure.packages().keys().cloned().collect();
        for name in &names {
            for (platform, indices) in &platforms {
                let platform_lit = self.atom(Atom::Platform(platform.clone()));
                for &index in indices {
                    let target = self.target_lit(name, index);
                    self.formula.implies(target, platform_lit, RuleType::Definition);
                }
            }
        }
        let platform_lits: Vec<Literal> = platforms
            .keys()
            .map(|platform| self.atom(Atom::Platform(platform.clone())))
            .collect();
        self.formula.at_most_one(&platform_lits, RuleType::Definition);
    }

    /// Define edge atoms from their sources and require a reason for every non-root node
    fn finalize_edges(&mut self) {
        let deptype_atoms: Vec<(String, String, DepTypes)> = self.deptype_atoms.iter().cloned().collect();
        for (parent, child, deptype) in &deptype_atoms {
            let sources = self
                .edge_sources
                .get(&(parent.clone(), child.clone()))
                .and_then(|by_type| by_type.get(deptype))
                .cloned()
                .unwrap_or_default();
            let lit = self.atom(Atom::DepType(parent.clone(), child.clone(), *deptype));
            self.formula.define_or(lit, &sources, RuleType::Definition);
        }

        let depends_atoms: Vec<(String, String)> = self.depends_atoms.iter().cloned().collect();
        let mut parents: BTreeMap<String, Vec<Literal>> = BTreeMap::new();
        for (parent, child) in &depends_atoms {
            let types: Vec<Literal> = deptype_atoms
                .iter()
                .filter(|(p, c, _)| p == parent && c == child)
                .map(|(p, c, t)| self.atom(Atom::DepType(p.clone(), c.clone(), *t)))
                .collect();
            let depends = self.atom(Atom::Depends(parent.clone(), child.clone()));
            self.formula.define_or(depends, &types, RuleType::Definition);
            let child_node = self.node_lit(child);
            self.formula.implies(depends, child_node, RuleType::Definition);
            parents.entry(child.clone()).or_default().push(depends);
        }

        let root_names: BTreeSet<String> = self.roots.iter().map(|r| r.spec.name.clone()).collect();
        let names: Vec<String> = self.closure.packages().keys().cloned().collect();
        for name in names {
            if root_names.contains(&name) {
                continue;
            }
            let node = self.node_lit(&name);
            let reasons = parents.remove(&name).unwrap_or_default();
            self.formula.implies_any(node, &reasons, RuleType::Package);
        }
    }

    /// Each needed virtual gets exactly one provider
    fn finalize_virtuals(&mut self) -> Result<()> {
        let virtuals: Vec<(String, Vec<String>)> = self
            .closure
            .virtuals()
            .iter()
            .map(|(name, providers)| (name.clone(), providers.clone()))
            .collect();

        // Provider conditions first: they may name new dependency atoms
        let mut provides: BTreeMap<(String, String), Vec<Literal>> = BTreeMap::new();
        for (virtual_name, providers) in &virtuals {
            for provider in providers {
                let Some(facts) = self.closure.package(provider).cloned() else {
                    continue;
                };
                let mut conditions = Vec::new();
                for decl in facts.provides.iter().filter(|p| p.virtual_name == *virtual_name) {
                    conditions.push(self.condition_lit(provider, &decl.when, provider)?);
                }
                provides.insert((virtual_name.clone(), provider.clone()), conditions);
            }
        }

        let needs: Vec<((String, String), Vec<Literal>)> = self
            .need_sources
            .iter()
            .map(|(key, sources)| (key.clone(), sources.clone()))
            .collect();
        let mut needed_by: BTreeMap<String, Vec<Literal>> = BTreeMap::new();
        for ((package, virtual_name), sources) in needs {
            let lit = self.atom(Atom::NeedsVirtual(package, virtual_name.clone()));
            self.formula.define_or(lit, &sources, RuleType::Definition);
            needed_by.entry(virtual_name).or_default().push(lit);
        }

        for (virtual_name, providers) in virtuals {
            let needed = self.virtual_needed_lit(&virtual_name);
            let needs = needed_by.remove(&virtual_name).unwrap_or_default();
            self.formula.define_or(needed, &needs, RuleType::Definition);

            let mut provider_lits = Vec::new();
            for provider in &providers {
                let lit = self.provider_lit(&virtual_name, provider);
                provider_lits.push(lit);
                self.formula.implies(lit, needed, RuleType::Definition);
                let node = self.node_lit(provider);
                self.formula.implies(lit, node, RuleType::Definition);
                let conditions = provides
                    .remove(&(virtual_name.clone(), provider.clone()))
                    .unwrap_or_default();
                self.formula.implies_any(lit, &conditions, RuleType::Package);
            }
            self.formula
                .exactly_one(Some(needed), &provider_lits, RuleType::Package);
        }
        Ok(())
    }
}
