use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use strata_version::{Version, VersionList};

use super::abstract_spec::{AbstractSpec, DependencyEdge};
use super::arch::{ArchConstraint, ArchSpec};
use super::compiler::{CompilerConstraint, CompilerSpec};
use super::condition::{Condition, SpecConstraint};
use super::deptype::DepTypes;
use super::variant::VariantValue;
use crate::error::Result;
use crate::hash::{self, HashKind, NodeDict};

/// Where a pre-existing package lives
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalInfo {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
}

/// An edge to a shared dependency node
#[derive(Debug, Clone)]
pub struct ConcreteEdge {
    pub spec: Arc<ConcreteSpec>,
    pub deptypes: DepTypes,
    /// Virtual packages this edge satisfies
    pub virtuals: BTreeSet<String>,
}

/// Traversal order for [`ConcreteSpec::traverse`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalOrder {
    /// Parents before children
    Pre,
    /// Children before parents
    Post,
}

/// A fully resolved node of a concrete DAG.
///
/// Nodes are immutable once built and children are shared through `Arc`,
/// so a package reached along several paths is one object. Hashes are
/// computed on first use and memoized.
#[derive(Debug)]
pub struct ConcreteSpec {
    name: String,
    namespace: String,
    version: Version,
    variants: BTreeMap<String, VariantValue>,
    compiler: CompilerSpec,
    arch: ArchSpec,
    external: Option<ExternalInfo>,
    package_hash: Option<String>,
    /// Sorted by dependency name
    dependencies: Vec<ConcreteEdge>,
    dag_hash: OnceLock<String>,
    full_hash: OnceLock<String>,
}

/// Builder for [`ConcreteSpec`]
#[derive(Debug)]
pub struct ConcreteSpecBuilder {
    name: String,
    namespace: String,
    version: Version,
    variants: BTreeMap<String, VariantValue>,
    compiler: CompilerSpec,
    arch: ArchSpec,
    external: Option<ExternalInfo>,
    package_hash: Option<String>,
    dependencies: Vec<ConcreteEdge>,
}

impl ConcreteSpecBuilder {
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn variant(mut self, name: impl Into<String>, value: impl Into<VariantValue>) -> Self {
        self.variants.insert(name.into(), value.into());
        self
    }

    pub fn external(mut self, external: ExternalInfo) -> Self {
        self.external = Some(external);
        self
    }

    pub fn package_hash(mut self, package_hash: impl Into<String>) -> Self {
        self.package_hash = Some(package_hash.into());
        self
    }

    pub fn dependency(mut self, spec: Arc<ConcreteSpec>, deptypes: DepTypes) -> Self {
        self.dependencies.push(ConcreteEdge {
            spec,
            deptypes,
            virtuals: BTreeSet::new(),
        });
        self
    }

    pub fn edge(mut self, edge: ConcreteEdge) -> Self {
        self.dependencies.push(edge);
        self
    }

    /// Finish the node; edges to the same package are merged
    pub fn build(self) -> Arc<ConcreteSpec> {
        let mut merged: BTreeMap<String, ConcreteEdge> = BTreeMap::new();
        for edge in self.dependencies {
            match merged.get_mut(edge.spec.name()) {
                Some(existing) => {
                    existing.deptypes = existing.deptypes | edge.deptypes;
                    existing.virtuals.extend(edge.virtuals);
                }
                None => {
                    merged.insert(edge.spec.name().to_string(), edge);
                }
            }
        }

        Arc::new(ConcreteSpec {
            name: self.name,
            namespace: self.namespace,
            version: self.version,
            variants: self.variants,
            compiler: self.compiler,
            arch: self.arch,
            external: self.external,
            package_hash: self.package_hash,
            dependencies: merged.into_values().collect(),
            dag_hash: OnceLock::new(),
            full_hash: OnceLock::new(),
        })
    }
}

impl ConcreteSpec {
    pub fn builder(
        name: impl Into<String>,
        version: Version,
        compiler: CompilerSpec,
        arch: ArchSpec,
    ) -> ConcreteSpecBuilder {
        ConcreteSpecBuilder {
            name: name.into(),
            namespace: "builtin".to_string(),
            version,
            variants: BTreeMap::new(),
            compiler,
            arch,
            external: None,
            package_hash: None,
            dependencies: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn variants(&self) -> &BTreeMap<String, VariantValue> {
        &self.variants
    }

    pub fn variant(&self, name: &str) -> Option<&VariantValue> {
        self.variants.get(name)
    }

    pub fn compiler(&self) -> &CompilerSpec {
        &self.compiler
    }

    pub fn arch(&self) -> &ArchSpec {
        &self.arch
    }

    pub fn external(&self) -> Option<&ExternalInfo> {
        self.external.as_ref()
    }

    pub fn is_external(&self) -> bool {
        self.external.is_some()
    }

    pub fn package_hash(&self) -> Option<&str> {
        self.package_hash.as_deref()
    }

    pub fn dependencies(&self) -> &[ConcreteEdge] {
        &self.dependencies
    }

    /// The direct edge to `name`, if any
    pub fn dependency(&self, name: &str) -> Option<&ConcreteEdge> {
        self.dependencies.iter().find(|e| e.spec.name == name)
    }

    /// Digest of this node and the DAG hashes of its link and run dependencies
    pub fn dag_hash(&self) -> &str {
        self.dag_hash.get_or_init(|| hash::dag_hash(self))
    }

    /// Digest that also covers build dependencies and recipe metadata
    pub fn full_hash(&self) -> &str {
        self.full_hash.get_or_init(|| hash::full_hash(self))
    }

    /// The canonical rendering used for hashing and storage
    pub fn to_node_dict(&self, kind: HashKind) -> NodeDict {
        hash::node_dict(self, kind)
    }

    /// Serialize the whole DAG in its stored form
    pub fn to_json(&self) -> Result<String> {
        hash::to_json(self)
    }

    /// Load a DAG written by [`ConcreteSpec::to_json`], verifying stored hashes
    pub fn from_json(json: &str) -> Result<Arc<ConcreteSpec>> {
        hash::from_json(json)
    }

    /// Whether this node meets one constraint
    pub fn satisfies(&self, constraint: &SpecConstraint) -> bool {
        match constraint {
            SpecConstraint::Version(versions) => versions.contains(&self.version),
            SpecConstraint::Variant { name, value } => self
                .variants
                .get(name)
                .is_some_and(|have| have.satisfies(value)),
            SpecConstraint::Compiler(compiler) => compiler.matches(&self.compiler),
            SpecConstraint::Arch(arch) => arch.matches(&self.arch),
            SpecConstraint::DependsOn(name) => self
                .dependencies
                .iter()
                .any(|e| &e.spec.name == name || e.virtuals.contains(name)),
        }
    }

    pub fn satisfies_condition(&self, condition: &Condition) -> bool {
        condition.constraints.iter().all(|c| self.satisfies(c))
    }

    /// Whether this DAG meets an abstract request.
    ///
    /// The root must meet the root constraints; each requested dependency
    /// must be met by some edge of the DAG reaching a node with that name,
    /// or providing it as a virtual.
    pub fn satisfies_abstract(&self, request: &AbstractSpec) -> bool {
        request.name == self.name && self.meets(request, false)
    }

    /// Version constraints on a virtual name are not checked against the provider
    fn meets(&self, request: &AbstractSpec, as_virtual: bool) -> bool {
        let own_ok = request.constraints().iter().all(|c| match c {
            SpecConstraint::DependsOn(_) => true,
            SpecConstraint::Version(_) if as_virtual => true,
            other => self.satisfies(other),
        });
        let named_unset_ok = request
            .variants
            .iter()
            .filter(|(_, value)| value.is_none())
            .all(|(name, _)| self.variants.contains_key(name));
        if !own_ok || !named_unset_ok {
            return false;
        }

        let nodes = self.traverse(TraversalOrder::Pre, DepTypes::ALL);
        let mut applicable = request
            .dependencies
            .iter()
            .filter(|dep| self.satisfies_condition(&dep.when));
        applicable.all(|dep| {
            nodes.iter().flat_map(|node| node.dependencies.iter()).any(|edge| {
                if edge.spec.name == dep.spec.name {
                    edge.spec.meets(&dep.spec, false)
                } else if edge.virtuals.contains(&dep.spec.name) {
                    edge.spec.meets(&dep.spec, true)
                } else {
                    false
                }
            })
        })
    }

    /// Every node reachable through edges of `deptypes`, each once.
    ///
    /// Children are visited in name order, so the result is deterministic.
    pub fn traverse(&self, order: TraversalOrder, deptypes: DepTypes) -> Vec<&ConcreteSpec> {
        let mut visited = HashSet::new();
        let mut out = Vec::new();
        self.visit(order, deptypes, &mut visited, &mut out);
        out
    }

    fn visit<'a>(
        &'a self,
        order: TraversalOrder,
        deptypes: DepTypes,
        visited: &mut HashSet<*const ConcreteSpec>,
        out: &mut Vec<&'a ConcreteSpec>,
    ) {
        if !visited.insert(self as *const ConcreteSpec) {
            return;
        }
        if order == TraversalOrder::Pre {
            out.push(self);
        }
        for edge in &self.dependencies {
            if edge.deptypes.intersects(deptypes) {
                edge.spec.visit(order, deptypes, visited, out);
            }
        }
        if order == TraversalOrder::Post {
            out.push(self);
        }
    }

    /// Find a node by package name anywhere in the DAG
    pub fn find(&self, name: &str) -> Option<&ConcreteSpec> {
        self.traverse(TraversalOrder::Pre, DepTypes::ALL)
            .into_iter()
            .find(|node| node.name == name)
    }

    /// The node's own attributes as an exactly pinned abstract spec
    fn pinned_node(&self) -> AbstractSpec {
        let mut spec = AbstractSpec::new(self.name.clone())
            .with_versions(VersionList::exact(self.version.clone()))
            .with_compiler(CompilerConstraint::exact(&self.compiler))
            .with_arch(ArchConstraint::exact(&self.arch));
        for (name, value) in &self.variants {
            spec = spec.with_variant(name.clone(), value.clone());
        }
        spec
    }

    /// A fully pinned request that reproduces this DAG.
    ///
    /// The root keeps its own attributes; every other node becomes a flat
    /// dependency pinned to its attributes.
    pub fn to_abstract(&self) -> AbstractSpec {
        let mut root = self.pinned_node();
        for node in self.traverse(TraversalOrder::Pre, DepTypes::ALL).into_iter().skip(1) {
            root = root.with_edge(DependencyEdge::new(node.pinned_node()));
        }
        root
    }

    /// One-line rendering of this node without dependencies
    pub fn format_node(&self) -> String {
        let mut out = format!("{}@{}", self.name, self.version);
        for (name, value) in &self.variants {
            if !matches!(value, VariantValue::Bool(_)) {
                out.push(' ');
            }
            out.push_str(&value.render(name));
        }
        out.push_str(&format!(" %{} arch={}", self.compiler, self.arch));
        if let Some(external) = &self.external {
            out.push_str(&format!(" [external {}]", external.path.display()));
        }
        out
    }

    fn fmt_tree(
        &self,
        f: &mut fmt::Formatter<'_>,
        depth: usize,
        shown: &mut HashSet<*const ConcreteSpec>,
    ) -> fmt::Result {
        let indent = "    ".repeat(depth);
        let marker = if depth == 0 { "" } else { "^" };
        writeln!(f, "{}{}{}", indent, marker, self.format_node())?;
        if !shown.insert(self as *const ConcreteSpec) {
            return Ok(());
        }
        for edge in &self.dependencies {
            edge.spec.fmt_tree(f, depth + 1, shown)?;
        }
        Ok(())
    }
}

impl fmt::Display for ConcreteSpec {
    /// Indented dependency tree; shared nodes are expanded once
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut shown = HashSet::new();
        self.fmt_tree(f, 0, &mut shown)
    }
}

impl PartialEq for ConcreteSpec {
    fn eq(&self, other: &Self) -> bool {
        self.full_hash() == other.full_hash()
    }
}

impl Eq for ConcreteSpec {}

#[cfg(test)]
mod tests {
    use super::*;

    fn gcc() -> CompilerSpec {
        "gcc@10.2.1".parse().unwrap()
    }

    fn arch() -> ArchSpec {
        ArchSpec::new("linux", "ubuntu22.04", "x86_64")
    }

    fn node(name: &str, version: &str) -> ConcreteSpecBuilder {
        ConcreteSpec::builder(name, version.parse().unwrap(), gcc(), arch())
    }

    fn sample() -> Arc<ConcreteSpec> {
        let zlib = node("zlib", "1.3").variant("shared", true).build();
        let cmake = node("cmake", "3.27").build();
        let mpich = node("mpich", "4.1").dependency(zlib.clone(), DepTypes::LINK).build();
        node("hdf5", "1.14.3")
            .variant("mpi", true)
            .variant("api", "default")
            .dependency(zlib.clone(), DepTypes::BUILD | DepTypes::LINK)
            .dependency(cmake, DepTypes::BUILD)
            .edge(ConcreteEdge {
                spec: mpich,
                deptypes: DepTypes::BUILD | DepTypes::LINK,
                virtuals: ["mpi".to_string()].into_iter().collect(),
            })
            .build()
    }

    #[test]
    fn test_builder_sorts_and_merges_edges() {
        let zlib = node("zlib", "1.3").build();
        let root = node("root", "1.0")
            .dependency(zlib.clone(), DepTypes::BUILD)
            .dependency(node("abc", "1").build(), DepTypes::RUN)
            .dependency(zlib, DepTypes::LINK)
            .build();

        let names: Vec<&str> = root.dependencies().iter().map(|e| e.spec.name()).collect();
        assert_eq!(names, vec!["abc", "zlib"]);
        assert_eq!(
            root.dependency("zlib").unwrap().deptypes,
            DepTypes::BUILD | DepTypes::LINK
        );
    }

    #[test]
    fn test_satisfies_constraints() {
        let hdf5 = sample();
        assert!(hdf5.satisfies(&SpecConstraint::version("1.14").unwrap()));
        assert!(!hdf5.satisfies(&SpecConstraint::version(":1.12").unwrap()));
        assert!(hdf5.satisfies(&SpecConstraint::variant("mpi", true)));
        assert!(!hdf5.satisfies(&SpecConstraint::variant("mpi", false)));
        assert!(hdf5.satisfies(&SpecConstraint::Compiler("gcc@10:".parse().unwrap())));
        assert!(hdf5.satisfies(&SpecConstraint::Arch(ArchConstraint::target("x86_64"))));
        assert!(hdf5.satisfies(&SpecConstraint::DependsOn("mpi".to_string())));
        assert!(hdf5.satisfies(&SpecConstraint::DependsOn("zlib".to_string())));
        assert!(!hdf5.satisfies(&SpecConstraint::DependsOn("openssl".to_string())));
    }

    #[test]
    fn test_traverse_orders_and_shares() {
        let hdf5 = sample();
        let pre: Vec<&str> = hdf5
            .traverse(TraversalOrder::Pre, DepTypes::ALL)
            .iter()
            .map(|s| s.name())
            .collect();
        assert_eq!(pre, vec!["hdf5", "cmake", "mpich", "zlib"]);

        let post: Vec<&str> = hdf5
            .traverse(TraversalOrder::Post, DepTypes::LINK_RUN)
            .iter()
            .map(|s| s.name())
            .collect();
        assert_eq!(post, vec!["zlib", "mpich", "hdf5"]);

        let via_mpich = hdf5.find("mpich").unwrap().dependency("zlib").unwrap();
        let direct = hdf5.dependency("zlib").unwrap();
        assert!(Arc::ptr_eq(&via_mpich.spec, &direct.spec));
    }

    #[test]
    fn test_satisfies_abstract() {
        let hdf5 = sample();
        let request = AbstractSpec::new("hdf5")
            .with_variant("mpi", true)
            .with_dependency(AbstractSpec::new("zlib").with_variant("shared", true))
            .with_dependency(AbstractSpec::new("mpi"));
        assert!(hdf5.satisfies_abstract(&request));

        let wrong = AbstractSpec::new("hdf5").with_dependency(AbstractSpec::new("zlib").at(":1.2").unwrap());
        assert!(!hdf5.satisfies_abstract(&wrong));
    }

    #[test]
    fn test_to_abstract_pins_everything() {
        let hdf5 = sample();
        let pinned = hdf5.to_abstract();
        assert_eq!(pinned.versions.concrete().map(|v| v.to_string()), Some("1.14.3".to_string()));
        assert_eq!(pinned.variants.len(), 2);
        assert_eq!(pinned.dependencies.len(), 3);
        assert!(pinned.dependencies.iter().all(|e| e.spec.dependencies.is_empty()));
        assert!(hdf5.satisfies_abstract(&pinned));
    }

    #[test]
    fn test_display_tree() {
        let rendered = sample().to_string();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "hdf5@1.14.3 api=default+mpi %gcc@10.2.1 arch=linux-ubuntu22.04-x86_64");
        assert!(lines[1].starts_with("    ^cmake@3.27"));
        assert!(lines.iter().any(|l| l.starts_with("        ^zlib@1.3+shared")));
    }

    #[test]
    fn test_hashes_are_memoized_and_differ() {
        let hdf5 = sample();
        let first = hdf5.dag_hash().to_string();
        assert_eq!(hdf5.dag_hash(), first);
        assert_eq!(first.len(), 32);
        assert_ne!(hdf5.dag_hash(), hdf5.full_hash());
    }
}
