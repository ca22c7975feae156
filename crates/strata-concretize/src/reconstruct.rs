//! Rebuilding concrete DAGs from a solver model.
//!
//! Every present node must have exactly one version, compiler and target,
//! every edge must point at a present node, the graph must be acyclic and
//! every node must hang off a root. Anything else means the encoding and
//! the model disagree, which is reported as `ReconstructionInconsistency`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use log::trace;

use crate::encode::{Atom, PackageDomain, Problem};
use crate::error::{ConcretizeError, Result};
use crate::package::VariantKind;
use crate::solver::Model;
use crate::spec::{ConcreteEdge, ConcreteSpec, DepTypes, ExternalInfo, VariantValue};

fn inconsistent(message: String) -> ConcretizeError {
    ConcretizeError::ReconstructionInconsistency(message)
}

/// A node read from the model, before its children are built
struct NodePlan {
    name: String,
    reused: Option<usize>,
    external: bool,
    version: usize,
    compiler: usize,
    target: usize,
    variants: BTreeMap<String, VariantValue>,
    /// child -> (deptypes, virtuals)
    edges: BTreeMap<String, (DepTypes, BTreeSet<String>)>,
}

/// Rebuilds the DAGs of one model
pub struct Reconstructor<'a> {
    problem: &'a Problem,
    model: &'a Model,
}

impl<'a> Reconstructor<'a> {
    pub fn new(problem: &'a Problem, model: &'a Model) -> Self {
        Self { problem, model }
    }

    fn holds(&self, atom: Atom) -> bool {
        self.problem.atoms.holds(self.model, &atom)
    }

    /// The one index in `0..count` whose atom holds
    fn exactly_one<F>(&self, what: &str, package: &str, count: usize, atom: F) -> Result<usize>
    where
        F: Fn(usize) -> Atom,
    {
        let chosen: Vec<usize> = (0..count).filter(|&i| self.holds(atom(i))).collect();
        match chosen.as_slice() {
            [index] => Ok(*index),
            _ => Err(inconsistent(format!(
                "{} has {} {}s selected",
                package,
                chosen.len(),
                what
            ))),
        }
    }

    /// Root DAGs in request order
    pub fn build(&self) -> Result<Vec<Arc<ConcreteSpec>>> {
        let mut plans: BTreeMap<String, NodePlan> = BTreeMap::new();
        for (name, domain) in &self.problem.domains {
            if self.holds(Atom::Node(name.clone())) {
                plans.insert(name.clone(), self.plan(name, domain)?);
            }
        }

        for plan in plans.values() {
            for child in plan.edges.keys() {
                if !plans.contains_key(child) {
                    return Err(inconsistent(format!(
                        "{} depends on {}, which is not in the DAG",
                        plan.name, child
                    )));
                }
            }
        }

        let mut built: HashMap<String, Arc<ConcreteSpec>> = HashMap::new();
        let mut visiting: BTreeSet<String> = BTreeSet::new();
        for root in &self.problem.roots {
            self.build_node(&root.spec.name, &plans, &mut built, &mut visiting)?;
        }
        if let Some(orphan) = plans.keys().find(|name| !built.contains_key(*name)) {
            return Err(inconsistent(format!(
                "{} is selected but no root depends on it",
                orphan
            )));
        }

        let mut roots = Vec::with_capacity(self.problem.requests.len());
        for request in &self.problem.requests {
            let root = built
                .get(&request.name)
                .cloned()
                .ok_or_else(|| inconsistent(format!("root {} is missing", request.name)))?;
            if !root.satisfies_abstract(request) {
                return Err(inconsistent(format!(
                    "{} does not satisfy the request {}",
                    root.format_node(),
                    request
                )));
            }
            roots.push(root);
        }
        Ok(roots)
    }

    fn plan(&self, name: &str, domain: &PackageDomain) -> Result<NodePlan> {
        let version = self.exactly_one("version", name, domain.versions.len(), |i| {
            Atom::Version(name.to_string(), i)
        })?;
        let compiler = self.exactly_one("compiler", name, self.problem.compilers.len(), |j| {
            Atom::Compiler(name.to_string(), j)
        })?;
        let target = self.exactly_one("target", name, self.problem.targets.len(), |k| {
            Atom::Target(name.to_string(), k)
        })?;

        let mut variants = BTreeMap::new();
        for (variant, variant_domain) in &domain.variants {
            if !self.holds(Atom::Active(name.to_string(), variant.clone())) {
                continue;
            }
            let values: Vec<String> = variant_domain
                .values
                .iter()
                .filter(|value| {
                    self.holds(Atom::VariantValue {
                        package: name.to_string(),
                        variant: variant.clone(),
                        value: (*value).clone(),
                    })
                })
                .cloned()
                .collect();
            let value = match (variant_domain.decl.kind, values.as_slice()) {
                (VariantKind::Bool, [value]) => VariantValue::Bool(value == "true"),
                (VariantKind::Single, [value]) => VariantValue::Single(value.clone()),
                (VariantKind::Multi, _) if !values.is_empty() => VariantValue::multi(values),
                _ => {
                    return Err(inconsistent(format!(
                        "variant {} of {} has {} values",
                        variant,
                        name,
                        values.len()
                    )))
                }
            };
            variants.insert(variant.clone(), value);
        }

        let reused = self
            .problem
            .candidates
            .iter()
            .enumerate()
            .find(|(r, c)| c.spec.name() == name && self.holds(Atom::Reuse(name.to_string(), *r)))
            .map(|(r, _)| r);
        let external = self.holds(Atom::External(name.to_string()));

        let mut edges = BTreeMap::new();
        for child in self.problem.closure.children(name) {
            if !self.holds(Atom::Depends(name.to_string(), child.to_string())) {
                continue;
            }
            let deptypes = DepTypes::ALL
                .iter()
                .filter(|t| self.holds(Atom::DepType(name.to_string(), child.to_string(), *t)))
                .fold(DepTypes::NONE, DepTypes::union);
            let virtuals: BTreeSet<String> = self
                .problem
                .closure
                .virtuals()
                .keys()
                .filter(|v| {
                    self.holds(Atom::NeedsVirtual(name.to_string(), (*v).clone()))
                        && self.holds(Atom::Provider((*v).clone(), child.to_string()))
                })
                .cloned()
                .collect();
            edges.insert(child.to_string(), (deptypes, virtuals));
        }

        trace!(
            "{}: version {}, {} edges{}",
            name,
            domain.versions[version].version,
            edges.len(),
            if reused.is_some() { ", reused" } else { "" }
        );
        Ok(NodePlan {
            name: name.to_string(),
            reused,
            external,
            version,
            compiler,
            target,
            variants,
            edges,
        })
    }

    /// Build a node after its children, sharing every node through `built`
    fn build_node(
        &self,
        name: &str,
        plans: &BTreeMap<String, NodePlan>,
        built: &mut HashMap<String, Arc<ConcreteSpec>>,
        visiting: &mut BTreeSet<String>,
    ) -> Result<Arc<ConcreteSpec>> {
        if let Some(node) = built.get(name) {
            return Ok(Arc::clone(node));
        }
        let plan = plans
            .get(name)
            .ok_or_else(|| inconsistent(format!("{} is requested but not selected", name)))?;
        if !visiting.insert(name.to_string()) {
            return Err(inconsistent(format!("dependency cycle through {}", name)));
        }

        let mut edges = Vec::new();
        for (child, (deptypes, virtuals)) in &plan.edges {
            let spec = self.build_node(child, plans, built, visiting)?;
            edges.push(ConcreteEdge {
                spec,
                deptypes: *deptypes,
                virtuals: virtuals.clone(),
            });
        }
        visiting.remove(name);

        let node = match plan.reused {
            Some(r) => self.reused_node(plan, r, edges)?,
            None => self.new_node(plan, edges),
        };
        built.insert(name.to_string(), Arc::clone(&node));
        Ok(node)
    }

    fn new_node(&self, plan: &NodePlan, edges: Vec<ConcreteEdge>) -> Arc<ConcreteSpec> {
        let domain = &self.problem.domains[&plan.name];
        let mut builder = ConcreteSpec::builder(
            plan.name.clone(),
            domain.versions[plan.version].version.clone(),
            self.problem.compilers[plan.compiler].clone(),
            self.problem.targets[plan.target].clone(),
        )
        .namespace(domain.facts.namespace.clone());
        for (variant, value) in &plan.variants {
            builder = builder.variant(variant.clone(), value.clone());
        }
        if let Some(hash) = &domain.facts.package_hash {
            builder = builder.package_hash(hash.clone());
        }
        if plan.external {
            if let Some(external) = &domain.external {
                builder = builder.external(ExternalInfo {
                    path: external.path.clone(),
                    module: external.module.clone(),
                });
            }
        }
        for edge in edges {
            builder = builder.edge(edge);
        }
        builder.build()
    }

    /// A reused node keeps the stored attributes verbatim, so its DAG hash survives
    fn reused_node(&self, plan: &NodePlan, candidate: usize, edges: Vec<ConcreteEdge>) -> Result<Arc<ConcreteSpec>> {
        let stored = &self.problem.candidates[candidate].spec;
        let mut builder = ConcreteSpec::builder(
            stored.name(),
            stored.version().clone(),
            stored.compiler().clone(),
            stored.arch().clone(),
        )
        .namespace(stored.namespace());
        for (variant, value) in stored.variants() {
            builder = builder.variant(variant.clone(), value.clone());
        }
        if let Some(hash) = stored.package_hash() {
            builder = builder.package_hash(hash);
        }
        if let Some(external) = stored.external() {
            builder = builder.external(external.clone());
        }
        for edge in edges {
            builder = builder.edge(edge);
        }
        let node = builder.build();

        if node.dag_hash() != stored.dag_hash() {
            return Err(inconsistent(format!(
                "reused {} changed identity ({} became {})",
                plan.name,
                stored.dag_hash(),
                node.dag_hash()
            )));
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SolverConfig;
    use crate::encode::Encoder;
    use crate::package::{DependencyDecl, PackageFacts, Repository};
    use crate::solver::{CancelToken, CdclBackend, ConstraintSolver, SolveOutcome, Var};
    use crate::spec::AbstractSpec;

    fn solved(request: &str) -> (Problem, Model) {
        let repo = Repository::new()
            .with(
                PackageFacts::new("libpng")
                    .version("1.6")
                    .unwrap()
                    .with_dependency(DependencyDecl::new("zlib")),
            )
            .with(PackageFacts::new("zlib").version("1.2").unwrap().version("1.3").unwrap());
        let config = SolverConfig::new().with_compiler("clang@17.0".parse().unwrap());
        let problem = Encoder::new(&repo, &config)
            .encode(&[AbstractSpec::new(request)], &[])
            .unwrap();
        let enabled = problem.explained_selectors().collect();
        let outcome = CdclBackend::new()
            .solve(problem.formula(), &enabled, &CancelToken::new())
            .unwrap();
        match outcome {
            SolveOutcome::Optimal(model) => (problem, model),
            SolveOutcome::Unsat { .. } => panic!("expected a model"),
        }
    }

    /// The model with one atom forced to a value
    fn with_atom(problem: &Problem, model: &Model, atom: Atom, value: bool) -> Model {
        let var = problem.atoms.get(&atom).unwrap() as Var;
        let mut values: Vec<bool> = (0..=problem.formula().num_vars()).map(|v| model.value(v)).collect();
        values[var as usize] = value;
        Model::new(values, model.costs().to_vec())
    }

    #[test]
    fn test_rebuilds_shared_dag() {
        let (problem, model) = solved("libpng");
        let roots = Reconstructor::new(&problem, &model).build().unwrap();

        assert_eq!(roots.len(), 1);
        let zlib = roots[0].dependency("zlib").unwrap();
        assert_eq!(zlib.spec.version().to_string(), "1.3");
        assert_eq!(zlib.deptypes, DepTypes::default());
    }

    #[test]
    fn test_two_versions_is_inconsistent() {
        let (problem, model) = solved("zlib");
        let broken = with_atom(&problem, &model, Atom::Version("zlib".to_string(), 1), true);
        let err = Reconstructor::new(&problem, &broken).build().unwrap_err();
        assert!(matches!(err, ConcretizeError::ReconstructionInconsistency(_)));
    }

    #[test]
    fn test_edge_to_missing_node_is_inconsistent() {
        let (problem, model) = solved("libpng");
        let broken = with_atom(&problem, &model, Atom::Node("zlib".to_string()), false);
        let err = Reconstructor::new(&problem, &broken).build().unwrap_err();
        assert!(err.to_string().contains("zlib"));
    }
}
