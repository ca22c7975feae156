use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use log::debug;

use super::facts::PackageFacts;
use super::provider::FactProvider;
use crate::error::{ConcretizeError, Result};

/// Every package a request could possibly pull in.
///
/// Dependencies on virtuals are expanded to all of their providers, so the
/// edge map is an over-approximation of any concrete DAG for the request.
#[derive(Debug, Clone, Default)]
pub struct PossibleDependencies {
    packages: BTreeMap<String, Arc<PackageFacts>>,
    /// virtual -> provider names, sorted
    virtuals: BTreeMap<String, Vec<String>>,
    /// parent -> possible children (concrete packages)
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl PossibleDependencies {
    pub fn packages(&self) -> &BTreeMap<String, Arc<PackageFacts>> {
        &self.packages
    }

    pub fn package(&self, name: &str) -> Option<&Arc<PackageFacts>> {
        self.packages.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    pub fn virtuals(&self) -> &BTreeMap<String, Vec<String>> {
        &self.virtuals
    }

    pub fn is_virtual(&self, name: &str) -> bool {
        self.virtuals.contains_key(name)
    }

    /// Providers of a virtual, sorted by name
    pub fn providers(&self, virtual_name: &str) -> &[String] {
        self.virtuals.get(virtual_name).map_or(&[], Vec::as_slice)
    }

    pub fn children(&self, parent: &str) -> impl Iterator<Item = &str> {
        self.edges.get(parent).into_iter().flatten().map(String::as_str)
    }

    /// Possible parents of a package
    pub fn parents(&self, child: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(_, children)| children.contains(child))
            .map(|(parent, _)| parent.as_str())
            .collect()
    }

    pub fn has_edge(&self, parent: &str, child: &str) -> bool {
        self.edges.get(parent).is_some_and(|c| c.contains(child))
    }

    /// Add a package that no provider knows about, such as a synthesized runtime
    pub fn insert_package(&mut self, facts: Arc<PackageFacts>) {
        self.packages.insert(facts.name.clone(), facts);
    }

    pub fn add_edge(&mut self, parent: &str, child: &str) {
        if parent != child {
            self.edges
                .entry(parent.to_string())
                .or_default()
                .insert(child.to_string());
        }
    }

    /// Strongly connected components with more than one package, each sorted.
    ///
    /// Only these need explicit acyclicity constraints.
    pub fn cyclic_components(&self) -> Vec<Vec<String>> {
        let names: Vec<&str> = self.packages.keys().map(String::as_str).collect();
        let index_of: BTreeMap<&str, usize> = names.iter().enumerate().map(|(i, n)| (*n, i)).collect();
        let successors: Vec<Vec<usize>> = names
            .iter()
            .map(|name| {
                self.children(name)
                    .filter_map(|child| index_of.get(child).copied())
                    .collect()
            })
            .collect();

        let mut tarjan = Tarjan::new(names.len());
        for v in 0..names.len() {
            if tarjan.index[v].is_none() {
                tarjan.connect(v, &successors);
            }
        }

        let mut components: Vec<Vec<String>> = tarjan
            .components
            .into_iter()
            .filter(|c| c.len() > 1)
            .map(|c| {
                let mut members: Vec<String> = c.into_iter().map(|i| names[i].to_string()).collect();
                members.sort();
                members
            })
            .collect();
        components.sort();
        components
    }
}

/// Iterative Tarjan's algorithm over index-based successor lists
struct Tarjan {
    index: Vec<Option<usize>>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next_index: usize,
    components: Vec<Vec<usize>>,
}

impl Tarjan {
    fn new(n: usize) -> Self {
        Self {
            index: vec![None; n],
            lowlink: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            next_index: 0,
            components: Vec::new(),
        }
    }

    fn visit(&mut self, v: usize) {
        self.index[v] = Some(self.next_index);
        self.lowlink[v] = self.next_index;
        self.next_index += 1;
        self.stack.push(v);
        self.on_stack[v] = true;
    }

    fn connect(&mut self, root: usize, successors: &[Vec<usize>]) {
        // (node, next successor position)
        let mut work = vec![(root, 0usize)];
        self.visit(root);

        while let Some(&(v, pos)) = work.last() {
            if let Some(&w) = successors[v].get(pos) {
                if let Some(top) = work.last_mut() {
                    top.1 += 1;
                }
                match self.index[w] {
                    None => {
                        self.visit(w);
                        work.push((w, 0));
                    }
                    Some(w_index) if self.on_stack[w] => {
                        self.lowlink[v] = self.lowlink[v].min(w_index);
                    }
                    Some(_) => {}
                }
                continue;
            }

            work.pop();
            if let Some(&(parent, _)) = work.last() {
                self.lowlink[parent] = self.lowlink[parent].min(self.lowlink[v]);
            }
            if Some(self.lowlink[v]) == self.index[v] {
                let mut component = Vec::new();
                while let Some(w) = self.stack.pop() {
                    self.on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                self.components.push(component);
            }
        }
    }
}

/// Collect every package reachable from `roots` through declared dependencies.
///
/// Each root is paired with the node that asked for it, which is what an
/// `UnknownPackage` error reports.
pub fn possible_dependencies(
    provider: &dyn FactProvider,
    roots: &[(String, String)],
) -> Result<PossibleDependencies> {
    let mut result = PossibleDependencies::default();
    let mut queue: VecDeque<(String, String)> = roots.iter().cloned().collect();
    let mut seen: BTreeSet<String> = BTreeSet::new();

    while let Some((name, requested_by)) = queue.pop_front() {
        if !seen.insert(name.clone()) {
            continue;
        }

        if let Some(facts) = provider.facts_for(&name) {
            for dep in &facts.dependencies {
                queue.push_back((dep.name.clone(), facts.name.clone()));
            }
            result.packages.insert(name, facts);
            continue;
        }

        let providers = provider.providers_for(&name);
        if providers.is_empty() {
            return Err(ConcretizeError::UnknownPackage { name, requested_by });
        }
        let mut names: Vec<String> = providers.iter().map(|p| p.name.clone()).collect();
        names.sort();
        for provider_name in &names {
            queue.push_back((provider_name.clone(), name.clone()));
        }
        result.virtuals.insert(name, names);
    }

    let mut edges = Vec::new();
    for (name, facts) in &result.packages {
        for dep in &facts.dependencies {
            if result.packages.contains_key(&dep.name) {
                edges.push((name.clone(), dep.name.clone()));
            } else {
                for provider_name in result.providers(&dep.name) {
                    edges.push((name.clone(), provider_name.clone()));
                }
            }
        }
    }
    for (parent, child) in edges {
        result.add_edge(&parent, &child);
    }

    debug!(
        "Possible dependencies: {} packages, {} virtuals",
        result.packages.len(),
        result.virtuals.len()
    );
    Ok(result)
}
