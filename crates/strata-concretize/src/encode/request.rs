//! Request normalization and the rules that tie a request to the DAG

use std::collections::BTreeMap;

use super::{Atom, Encoder};
use crate::error::{ConcretizeError, Result};
use crate::explain::Explanation;
use crate::solver::{Literal, RuleType, Var};
use crate::spec::{AbstractSpec, Condition, DepTypes, SpecConstraint};

/// A dependency request that only applies while its parent meets a condition
#[derive(Debug, Clone)]
pub struct ConditionalDependency {
    /// The requested node the condition is evaluated on
    pub parent: String,
    pub when: Condition,
    pub spec: AbstractSpec,
    /// `NONE` leaves the edge types open
    pub deptypes: DepTypes,
}

/// One root of the request with its nested requests flattened
#[derive(Debug, Clone)]
pub struct RootRequest {
    /// The root node alone, without dependencies
    pub spec: AbstractSpec,
    /// Unconditional dependency requests, merged by name
    pub dependencies: BTreeMap<String, (AbstractSpec, DepTypes)>,
    pub conditional: Vec<ConditionalDependency>,
}

impl RootRequest {
    fn new(spec: AbstractSpec) -> Self {
        Self {
            spec,
            dependencies: BTreeMap::new(),
            conditional: Vec::new(),
        }
    }

    fn has_dependencies(&self) -> bool {
        !self.dependencies.is_empty() || !self.conditional.is_empty()
    }
}

fn node_only(spec: &AbstractSpec) -> AbstractSpec {
    let mut node = spec.clone();
    node.dependencies.clear();
    node
}

impl Encoder<'_> {
    /// Check names and merge the requests into one entry per root package
    pub(super) fn prepare_requests(&self, requests: &[AbstractSpec]) -> Result<Vec<RootRequest>> {
        if requests.is_empty() {
            return Err(ConcretizeError::MalformedRequest("nothing to concretize".to_string()));
        }

        let mut roots: Vec<RootRequest> = Vec::new();
        for request in requests {
            if !self.is_known_package(&request.name) {
                if self.provider.is_virtual(&request.name) {
                    return Err(ConcretizeError::MalformedRequest(format!(
                        "{} is a virtual package and cannot be a root; request a provider instead",
                        request.name
                    )));
                }
                return Err(ConcretizeError::UnknownPackage {
                    name: request.name.clone(),
                    requested_by: "the request".to_string(),
                });
            }

            let index = match roots.iter().position(|r| r.spec.name == request.name) {
                Some(index) => {
                    roots[index].spec.constrain(&node_only(request))?;
                    index
                }
                None => {
                    roots.push(RootRequest::new(node_only(request)));
                    roots.len() - 1
                }
            };
            self.flatten_dependencies(&mut roots[index], request)?;
        }
        Ok(roots)
    }

    fn flatten_dependencies(&self, root: &mut RootRequest, parent: &AbstractSpec) -> Result<()> {
        for edge in &parent.dependencies {
            let name = &edge.spec.name;
            if !self.is_known_package(name) && !self.provider.is_virtual(name) {
                return Err(ConcretizeError::UnknownPackage {
                    name: name.clone(),
                    requested_by: parent.name.clone(),
                });
            }
            if *name == root.spec.name {
                return Err(ConcretizeError::MalformedRequest(format!(
                    "{} cannot depend on itself",
                    name
                )));
            }

            let child = node_only(&edge.spec);
            if edge.when.is_always() {
                match root.dependencies.get_mut(name) {
                    Some((merged, deptypes)) => {
                        merged.constrain(&child)?;
                        *deptypes = deptypes.union(edge.deptypes);
                    }
                    None => {
                        root.dependencies.insert(name.clone(), (child, edge.deptypes));
                    }
                }
            } else {
                if !self.is_known_package(&parent.name) {
                    return Err(ConcretizeError::MalformedRequest(format!(
                        "conditional dependency on {} needs a concrete parent, not {}",
                        name, parent.name
                    )));
                }
                root.conditional.push(ConditionalDependency {
                    parent: parent.name.clone(),
                    when: edge.when.clone(),
                    spec: child,
                    deptypes: edge.deptypes,
                });
            }
            self.flatten_dependencies(root, &edge.spec)?;
        }
        Ok(())
    }

    pub(super) fn add_request_rules(&mut self) -> Result<()> {
        let roots = self.roots.clone();
        let per_root = roots.len() > 1;

        for root in &roots {
            let name = root.spec.name.clone();
            if per_root && root.has_dependencies() {
                self.define_in_dag(&name);
            }

            let node = self.node_lit(&name);
            let selector = self.selector(Explanation::Requested { root: name.clone() });
            self.formula.add_guarded(vec![node], RuleType::Request, selector);
            self.add_node_constraints(&name, &root.spec, None)?;

            for (spec, deptypes) in root.dependencies.values() {
                self.add_dependency_request(&name, spec, *deptypes, None, per_root)?;
            }
            for conditional in &root.conditional {
                let when = self.condition_lit(&conditional.parent, &conditional.when, &name)?;
                self.add_dependency_request(
                    &name,
                    &conditional.spec,
                    conditional.deptypes,
                    Some(when),
                    per_root,
                )?;
            }
        }
        Ok(())
    }

    /// Constraints of a requested node of a concrete package, one selector each
    fn add_node_constraints(&mut self, root: &str, spec: &AbstractSpec, when: Option<Literal>) -> Result<()> {
        let package = spec.name.clone();
        for constraint in spec.constraints() {
            if matches!(constraint, SpecConstraint::DependsOn(_)) {
                continue;
            }
            self.check_variant_request(root, &package, &constraint)?;
            let lit = self.constraint_lit(&package, &constraint, root)?;
            let selector = self.selector(Explanation::RequestConstraint {
                root: root.to_string(),
                package: package.clone(),
                constraint,
            });
            let mut clause: Vec<Literal> = when.iter().map(|w| -w).collect();
            clause.push(lit);
            self.formula.add_guarded(clause, RuleType::Request, selector);
        }

        for (variant, value) in &spec.variants {
            if value.is_some() {
                continue;
            }
            let declared = self
                .domains
                .get(&package)
                .is_some_and(|d| d.variants.contains_key(variant));
            if !declared {
                return Err(ConcretizeError::UnknownVariant {
                    package: package.clone(),
                    variant: variant.clone(),
                    requested_by: root.to_string(),
                });
            }
            let active = self.active_lit(&package, variant);
            let selector = self.selector(Explanation::RequestedVariant {
                root: root.to_string(),
                package: package.clone(),
                variant: variant.clone(),
            });
            let mut clause: Vec<Literal> = when.iter().map(|w| -w).collect();
            clause.push(active);
            self.formula.add_guarded(clause, RuleType::Request, selector);
        }
        Ok(())
    }

    /// Reject requested variant values the recipe would never accept
    fn check_variant_request(&self, root: &str, package: &str, constraint: &SpecConstraint) -> Result<()> {
        let SpecConstraint::Variant { name, value } = constraint else {
            return Ok(());
        };
        let Some(domain) = self.domains.get(package) else {
            return Ok(());
        };
        match domain.variants.get(name) {
            None => Err(ConcretizeError::UnknownVariant {
                package: package.to_string(),
                variant: name.clone(),
                requested_by: root.to_string(),
            }),
            Some(variant) if !variant.decl.accepts(value) => Err(ConcretizeError::MalformedRequest(format!(
                "{} does not accept {}",
                package,
                value.render(name)
            ))),
            Some(_) => Ok(()),
        }
    }

    fn add_dependency_request(
        &mut self,
        root: &str,
        spec: &AbstractSpec,
        deptypes: DepTypes,
        when: Option<Literal>,
        per_root: bool,
    ) -> Result<()> {
        let name = spec.name.clone();
        let guard: Vec<Literal> = when.iter().map(|w| -w).collect();
        let selector = self.selector(Explanation::RequestedDependency {
            root: root.to_string(),
            package: name.clone(),
        });

        if self.closure.is_virtual(&name) {
            return self.add_virtual_request(root, spec, deptypes, when, per_root, selector);
        }

        let present = if per_root {
            self.atom(Atom::InDag(root.to_string(), name.clone()))
        } else {
            self.node_lit(&name)
        };
        let mut clause = guard.clone();
        clause.push(present);
        self.formula.add_guarded(clause, RuleType::Request, selector);

        self.add_deptype_request(&name, deptypes, &guard, selector);
        self.add_node_constraints(root, spec, when)
    }

    /// Edge types asked of a dependency: some parent must link it that way
    fn add_deptype_request(&mut self, package: &str, deptypes: DepTypes, guard: &[Literal], selector: Var) {
        let parents: Vec<String> = self
            .closure
            .parents(package)
            .into_iter()
            .map(str::to_string)
            .collect();
        for deptype in deptypes.iter() {
            let mut clause = guard.to_vec();
            for parent in &parents {
                clause.push(self.deptype_lit(parent, package, deptype));
            }
            self.formula.add_guarded(clause, RuleType::Request, selector);
        }
    }

    /// A request for a virtual is a request on whichever provider is chosen
    fn add_virtual_request(
        &mut self,
        root: &str,
        spec: &AbstractSpec,
        deptypes: DepTypes,
        when: Option<Literal>,
        per_root: bool,
        selector: Var,
    ) -> Result<()> {
        let virtual_name = spec.name.clone();
        let guard: Vec<Literal> = when.iter().map(|w| -w).collect();

        let present = if per_root {
            let needers: Vec<String> = self
                .need_sources
                .keys()
                .filter(|(_, v)| *v == virtual_name)
                .map(|(p, _)| p.clone())
                .collect();
            let mut terms = Vec::new();
            for package in needers {
                let in_dag = self.atom(Atom::InDag(root.to_string(), package.clone()));
                let needs = self.needs_virtual_lit(&package, &virtual_name);
                terms.push(self.all_of(vec![in_dag, needs]));
            }
            self.any_of(terms)
        } else {
            self.virtual_needed_lit(&virtual_name)
        };
        let mut clause = guard.clone();
        clause.push(present);
        self.formula.add_guarded(clause, RuleType::Request, selector);

        let providers: Vec<String> = self.closure.providers(&virtual_name).to_vec();
        for constraint in spec.constraints() {
            if matches!(constraint, SpecConstraint::DependsOn(_)) {
                continue;
            }
            if let SpecConstraint::Variant { name, .. } = &constraint {
                let declared_somewhere = providers.iter().any(|p| {
                    self.domains
                        .get(p)
                        .is_some_and(|d| d.variants.contains_key(name))
                });
                if !declared_somewhere {
                    return Err(ConcretizeError::UnknownVariant {
                        package: virtual_name.clone(),
                        variant: name.clone(),
                        requested_by: root.to_string(),
                    });
                }
            }

            let constraint_selector = self.selector(Explanation::RequestConstraint {
                root: root.to_string(),
                package: virtual_name.clone(),
                constraint: constraint.clone(),
            });
            for provider in &providers {
                let chosen = self.provider_lit(&virtual_name, provider);
                let mut clause = guard.clone();
                clause.push(-chosen);
                match &constraint {
                    SpecConstraint::Version(versions) => {
                        clause.extend(self.covering_conditions(provider, &virtual_name, versions)?);
                    }
                    other => {
                        if let Some(lit) = self.provider_constraint_lit(provider, other, root)? {
                            clause.push(lit);
                        }
                    }
                }
                self.formula
                    .add_guarded(clause, RuleType::Request, constraint_selector);
            }
        }

        for provider in &providers {
            let chosen = self.provider_lit(&virtual_name, provider);
            let mut guard = guard.clone();
            guard.push(-chosen);
            self.add_deptype_request(provider, deptypes, &guard, selector);
        }
        Ok(())
    }

    /// InDag(root, X): X is reachable from the root through chosen edges
    fn define_in_dag(&mut self, root: &str) {
        let names: Vec<String> = self.closure.packages().keys().cloned().collect();
        for name in names {
            let lit = self.atom(Atom::InDag(root.to_string(), name.clone()));
            if name == root {
                let node = self.node_lit(root);
                self.formula.define_and(lit, &[node], RuleType::Definition);
                continue;
            }
            let parents: Vec<String> = self
                .closure
                .parents(&name)
                .into_iter()
                .map(str::to_string)
                .collect();
            let mut terms = Vec::new();
            for parent in parents {
                let parent_in = self.atom(Atom::InDag(root.to_string(), parent.clone()));
                let depends = self.depends_lit(&parent, &name);
                terms.push(self.all_of(vec![parent_in, depends]));
            }
            self.formula.define_or(lit, &terms, RuleType::Definition);
        }
    }
}
