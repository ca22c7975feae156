//! Binding packages to previously concretized specs

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use log::debug;

use super::Encoder;
use crate::solver::{Literal, RuleType};
use crate::spec::{ConcreteSpec, DepTypes};

/// A reusable node, with its hashed dependencies also reusable
#[derive(Debug, Clone)]
pub struct ReuseCandidate {
    pub spec: Arc<ConcreteSpec>,
    /// Index into the configured compilers
    pub compiler: usize,
    /// Index into the configured targets
    pub target: usize,
    pub children: Vec<ReuseChild>,
}

/// A hashed edge of a candidate, pointing at another candidate
#[derive(Debug, Clone)]
pub struct ReuseChild {
    pub candidate: usize,
    pub deptypes: DepTypes,
    pub virtuals: BTreeSet<String>,
}

impl Encoder<'_> {
    /// Gather every node of the reusable DAGs that could stand in for a package.
    ///
    /// A node qualifies when the recipe still knows it, its compiler and
    /// target are configured, its variants are still accepted, and every
    /// dependency that shapes its hash qualifies too.
    pub(super) fn collect_candidates(&mut self, reusable: &[Arc<ConcreteSpec>]) {
        let mut seen: HashMap<String, Option<usize>> = HashMap::new();
        for spec in reusable {
            self.visit_candidate(spec, &mut seen);
        }

        let edges: Vec<(String, String)> = self
            .candidates
            .iter()
            .flat_map(|c| {
                c.children
                    .iter()
                    .map(|child| (c.spec.name().to_string(), child.candidate))
                    .collect::<Vec<_>>()
            })
            .map(|(parent, child)| (parent, self.candidates[child].spec.name().to_string()))
            .collect();
        for (parent, child) in edges {
            self.closure.add_edge(&parent, &child);
        }
        debug!(
            "{} of {} reusable nodes are candidates",
            self.candidates.len(),
            seen.len()
        );
    }

    fn visit_candidate(
        &mut self,
        spec: &Arc<ConcreteSpec>,
        seen: &mut HashMap<String, Option<usize>>,
    ) -> Option<usize> {
        if let Some(&result) = seen.get(spec.dag_hash()) {
            return result;
        }

        let mut children = Vec::new();
        let mut valid = true;
        for edge in spec.dependencies() {
            if !edge.deptypes.affects_dag_hash() {
                continue;
            }
            match self.visit_candidate(&edge.spec, seen) {
                Some(candidate) => children.push(ReuseChild {
                    candidate,
                    deptypes: edge.deptypes,
                    virtuals: edge.virtuals.clone(),
                }),
                None => valid = false,
            }
            if edge.virtuals.iter().any(|v| !self.closure.is_virtual(v)) {
                valid = false;
            }
        }

        let result = if valid {
            self.check_candidate(spec).map(|(compiler, target)| {
                self.candidates.push(ReuseCandidate {
                    spec: Arc::clone(spec),
                    compiler,
                    target,
                    children,
                });
                self.candidates.len() - 1
            })
        } else {
            None
        };
        seen.insert(spec.dag_hash().to_string(), result);
        result
    }

    fn check_candidate(&self, spec: &ConcreteSpec) -> Option<(usize, usize)> {
        let Some(facts) = self.closure.package(spec.name()) else {
            debug!("Not reusing {}: not a possible dependency", spec.format_node());
            return None;
        };
        let compiler = self.config.compilers.iter().position(|c| c == spec.compiler());
        let target = self.config.targets.iter().position(|t| t == spec.arch());
        let variants_ok = spec
            .variants()
            .iter()
            .all(|(name, value)| facts.variant(name).is_some_and(|decl| decl.accepts(value)));

        match (compiler, target, variants_ok) {
            (Some(compiler), Some(target), true) => Some((compiler, target)),
            _ => {
                debug!("Not reusing {}: no longer compatible", spec.format_node());
                None
            }
        }
    }

    /// Reuse(P, r) fixes every attribute of P to candidate r, and its
    /// hashed dependencies to their candidates
    pub(super) fn add_reuse_rules(&mut self) {
        if self.candidates.is_empty() {
            return;
        }
        let no_root_reuse = self.formula.new_selector();
        let no_reuse = self.formula.new_selector();
        self.switches.no_root_reuse = Some(no_root_reuse);
        self.switches.no_reuse = Some(no_reuse);

        let root_names: BTreeSet<String> = self.roots.iter().map(|r| r.spec.name.clone()).collect();
        let mut by_package: BTreeMap<String, Vec<Literal>> = BTreeMap::new();
        let candidates = self.candidates.clone();

        for (r, candidate) in candidates.iter().enumerate() {
            let name = candidate.spec.name();
            let Some(domain) = self.domains.get(name).cloned() else {
                continue;
            };
            let reuse = self.reuse_lit(name, r);
            by_package.entry(name.to_string()).or_default().push(reuse);

            let mut implied = vec![self.node_lit(name)];
            if let Some(index) = domain.version_index(candidate.spec.version()) {
                implied.push(self.version_lit(name, index));
            }
            implied.push(self.compiler_lit(name, candidate.compiler));
            implied.push(self.target_lit(name, candidate.target));
            for (variant, variant_domain) in &domain.variants {
                let active = self.active_lit(name, variant);
                match candidate.spec.variant(variant) {
                    Some(value) => {
                        implied.push(active);
                        let held = value.values();
                        for value in &variant_domain.values {
                            let lit = self.value_lit(name, variant, value);
                            implied.push(if held.contains(value) { lit } else { -lit });
                        }
                    }
                    None => implied.push(-active),
                }
            }
            if domain.external.is_some() {
                implied.push(-self.external_lit(name));
            }
            for child in &candidate.children {
                let child_name = candidates[child.candidate].spec.name().to_string();
                implied.push(self.reuse_lit(&child_name, child.candidate));
                self.add_edge_source(name, &child_name, child.deptypes, reuse);
                for virtual_name in &child.virtuals {
                    self.add_need_source(name, virtual_name, reuse);
                    implied.push(self.provider_lit(virtual_name, &child_name));
                }
            }
            for lit in implied {
                self.formula.implies(reuse, lit, RuleType::Reuse);
            }

            self.formula
                .add_guarded(vec![-reuse], RuleType::Reuse, no_reuse);
            if root_names.contains(name) {
                self.formula
                    .add_guarded(vec![-reuse], RuleType::Reuse, no_root_reuse);
            }
        }

        for (name, lits) in by_package {
            self.formula.at_most_one(&lits, RuleType::Reuse);
            let any = self.reused_any_lit(&name);
            self.formula.define_or(any, &lits, RuleType::Definition);
        }
    }
}
