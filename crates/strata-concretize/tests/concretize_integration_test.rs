/// Integration tests for end-to-end concretization
///
/// These tests run whole requests through the concretizer against small
/// in-memory repositories and check the properties every resolved DAG
/// must have.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use strata_concretize::package::{DependencyDecl, VariantDecl, VersionDecl};
use strata_concretize::spec::{CompilerConstraint, Condition, TraversalOrder};
use strata_concretize::{
    AbstractSpec, CancelToken, ConcreteSpec, ConcretizeError, Concretizer, DepTypes, FactProvider,
    Outcome, PackageFacts, Repository, SolverConfig, VariantValue,
};
use strata_version::{Version, VersionList};

fn versions(s: &str) -> VersionList {
    VersionList::parse(s).unwrap()
}

fn package(name: &str, known: &[&str]) -> PackageFacts {
    let mut facts = PackageFacts::new(name);
    for version in known {
        facts = facts.version(version).unwrap();
    }
    facts
}

/// clang has no runtime package, so DAGs stay small
fn clang_config() -> SolverConfig {
    SolverConfig::new().with_compiler("clang@17.0".parse().unwrap())
}

fn hpc_repo() -> Repository {
    Repository::new()
        .with(
            package("app", &["1.0", "2.0"])
                .with_variant(VariantDecl::boolean("mpi", true))
                .with_dependency(DependencyDecl::new("hdf5"))
                .with_dependency(DependencyDecl::new("cmake").types(DepTypes::BUILD))
                .with_dependency(DependencyDecl::new("mpi").when(Condition::variant("mpi", true))),
        )
        .with(
            package("hdf5", &["1.12", "1.14"])
                .with_variant(VariantDecl::boolean("mpi", true))
                .with_dependency(DependencyDecl::new("zlib").versions(versions("1.2:")))
                .with_dependency(DependencyDecl::new("mpi").when(Condition::variant("mpi", true))),
        )
        .with(package("zlib", &["1.1", "1.2.13", "1.3"]))
        .with(
            package("cmake", &["3.27", "3.28"])
                .with_dependency(DependencyDecl::new("zlib").versions(versions(":1.2"))),
        )
        .with(package("openmpi", &["4.1", "5.0"]).provides("mpi", VersionList::any()))
        .with(package("mpich", &["4.1"]).provides("mpi", VersionList::any()))
}

/// Every node of the DAGs, each once
fn nodes(roots: &[Arc<ConcreteSpec>]) -> Vec<&ConcreteSpec> {
    let mut seen = BTreeSet::new();
    roots
        .iter()
        .flat_map(|root| root.traverse(TraversalOrder::Pre, DepTypes::ALL))
        .filter(|node| seen.insert(*node as *const ConcreteSpec))
        .collect()
}

/// Check each edge against the version requirements its parent declares
fn assert_requirements_met(repo: &Repository, roots: &[Arc<ConcreteSpec>]) {
    for node in nodes(roots) {
        let Some(facts) = repo.facts_for(node.name()) else {
            continue;
        };
        for decl in &facts.dependencies {
            if !node.satisfies_condition(&decl.when) {
                continue;
            }
            if let Some(edge) = node.dependency(&decl.name) {
                assert!(
                    decl.spec.versions.contains(edge.spec.version()),
                    "{} requires {}@{} but got {}",
                    node.name(),
                    decl.name,
                    decl.spec.versions,
                    edge.spec.format_node()
                );
            }
        }
    }
}

// ============================================================================
// Basic resolution
// ============================================================================

#[test]
fn test_resolves_full_dag() {
    let concretizer = Concretizer::new(hpc_repo(), clang_config());
    let root = concretizer.concretize(&AbstractSpec::new("app"), &[]).unwrap();

    assert_eq!(root.version().to_string(), "2.0");
    assert_eq!(root.variant("mpi"), Some(&VariantValue::Bool(true)));
    assert_eq!(root.compiler().to_string(), "clang@17.0");

    let hdf5 = root.find("hdf5").unwrap();
    assert_eq!(hdf5.version().to_string(), "1.14");
    // cmake caps zlib at 1.2, hdf5 needs 1.2 or newer
    let zlib = root.find("zlib").unwrap();
    assert_eq!(zlib.version().to_string(), "1.2.13");

    let cmake = root.dependency("cmake").unwrap();
    assert_eq!(cmake.deptypes, DepTypes::BUILD);
}

#[test]
fn test_constraints_hold_on_every_edge() {
    let repo = hpc_repo();
    let concretizer = Concretizer::new(repo.clone(), clang_config());
    let roots = concretizer
        .concretize_together(
            &[
                AbstractSpec::new("app"),
                AbstractSpec::new("hdf5").with_variant("mpi", true),
            ],
            &[],
        )
        .unwrap();
    assert_requirements_met(&repo, &roots);
}

#[test]
fn test_each_package_appears_once() {
    let concretizer = Concretizer::new(hpc_repo(), clang_config());
    let roots = concretizer
        .concretize_together(&[AbstractSpec::new("app"), AbstractSpec::new("cmake")], &[])
        .unwrap();

    let all = nodes(&roots);
    let names: BTreeSet<&str> = all.iter().map(|n| n.name()).collect();
    assert_eq!(names.len(), all.len());

    let via_app = roots[0].find("cmake").unwrap();
    assert!(std::ptr::eq(via_app, roots[1].as_ref()));
}

#[test]
fn test_requested_variant_turns_off_dependency() {
    let concretizer = Concretizer::new(hpc_repo(), clang_config());
    let root = concretizer
        .concretize(
            &AbstractSpec::new("app")
                .with_variant("mpi", false)
                .with_dependency(AbstractSpec::new("hdf5").with_variant("mpi", false)),
            &[],
        )
        .unwrap();

    assert_eq!(root.variant("mpi"), Some(&VariantValue::Bool(false)));
    assert!(root.find("openmpi").is_none());
    assert!(root.find("mpich").is_none());
}

#[test]
fn test_deprecated_versions_are_avoided() {
    let repo = Repository::new().with(
        PackageFacts::new("zlib")
            .with_version(VersionDecl::new(Version::parse("1.3").unwrap()).deprecated())
            .version("1.2.13")
            .unwrap(),
    );
    let concretizer = Concretizer::new(repo, clang_config());
    let zlib = concretizer.concretize(&AbstractSpec::new("zlib"), &[]).unwrap();
    assert_eq!(zlib.version().to_string(), "1.2.13");
}

#[test]
fn test_preferred_version_from_config() {
    let config = clang_config().with_preferred_versions("zlib", versions("1.1"));
    let concretizer = Concretizer::new(hpc_repo(), config);
    let zlib = concretizer.concretize(&AbstractSpec::new("zlib"), &[]).unwrap();
    assert_eq!(zlib.version().to_string(), "1.1");
}

#[test]
fn test_newest_version_wins_over_smaller_dag() {
    let repo = Repository::new()
        .with(
            package("a", &["1.0", "2.0"])
                .with_dependency(DependencyDecl::new("z").when(Condition::version("2:").unwrap())),
        )
        .with(package("z", &["1.0"]));
    let concretizer = Concretizer::new(repo, clang_config());

    let root = concretizer.concretize(&AbstractSpec::new("a"), &[]).unwrap();
    assert_eq!(root.version().to_string(), "2.0");
    assert!(root.find("z").is_some());

    // an explicit constraint still picks the older, smaller DAG
    let old = concretizer
        .concretize(&AbstractSpec::new("a").at("1.0").unwrap(), &[])
        .unwrap();
    assert!(old.find("z").is_none());
}

// ============================================================================
// Shared dependencies and conflicts
// ============================================================================

fn shared_leaf_repo() -> Repository {
    Repository::new()
        .with(package("a", &["1.0"]).with_dependency(DependencyDecl::new("x")))
        .with(
            package("b", &["1.0"])
                .with_dependency(DependencyDecl::new("x").versions(versions(":3.9"))),
        )
        .with(package("x", &["3.9", "4.0"]))
}

#[test]
fn test_together_picks_common_version() {
    let concretizer = Concretizer::new(shared_leaf_repo(), clang_config());
    let roots = concretizer
        .concretize_together(&[AbstractSpec::new("a"), AbstractSpec::new("b")], &[])
        .unwrap();

    let from_a = roots[0].dependency("x").unwrap();
    let from_b = roots[1].dependency("x").unwrap();
    assert_eq!(from_a.spec.version().to_string(), "3.9");
    assert!(Arc::ptr_eq(&from_a.spec, &from_b.spec));
}

#[test]
fn test_separately_resolves_each_root_on_its_own() {
    let concretizer = Concretizer::new(shared_leaf_repo(), clang_config());
    let results =
        concretizer.concretize_separately(&[AbstractSpec::new("a"), AbstractSpec::new("b")], &[]);

    let a = results[0].as_ref().unwrap();
    let b = results[1].as_ref().unwrap();
    assert_eq!(a.find("x").unwrap().version().to_string(), "4.0");
    assert_eq!(b.find("x").unwrap().version().to_string(), "3.9");
}

#[test]
fn test_conflicting_roots_name_both_requirers() {
    let repo = Repository::new()
        .with(
            package("a", &["1.0"])
                .with_dependency(DependencyDecl::new("x").versions(versions("4.0"))),
        )
        .with(
            package("b", &["1.0"])
                .with_dependency(DependencyDecl::new("x").versions(versions("4.1"))),
        )
        .with(package("x", &["4.0", "4.1"]));
    let concretizer = Concretizer::new(repo, clang_config());

    let outcome = concretizer
        .solve(
            &[AbstractSpec::new("a"), AbstractSpec::new("b")],
            &[],
            &CancelToken::new(),
        )
        .unwrap();
    let Outcome::Unsatisfiable {
        conflicting_constraints,
    } = outcome
    else {
        panic!("expected an unsatisfiable outcome");
    };

    let messages: Vec<String> = conflicting_constraints.iter().map(|e| e.to_string()).collect();
    assert!(messages.iter().any(|m| m == "a requires x@4.0"), "{:?}", messages);
    assert!(messages.iter().any(|m| m == "b requires x@4.1"), "{:?}", messages);

    let err = concretizer
        .concretize_together(&[AbstractSpec::new("a"), AbstractSpec::new("b")], &[])
        .unwrap_err();
    assert!(matches!(err, ConcretizeError::Unsatisfiable { .. }));
    assert!(err.is_solve_outcome());
}

#[test]
fn test_impossible_request_is_explained() {
    let concretizer = Concretizer::new(shared_leaf_repo(), clang_config());
    let err = concretizer
        .concretize(&AbstractSpec::new("x").at("5:").unwrap(), &[])
        .unwrap_err();
    let ConcretizeError::Unsatisfiable { explanations } = err else {
        panic!("expected an unsatisfiable error");
    };
    let messages: Vec<String> = explanations.iter().map(|e| e.to_string()).collect();
    assert!(messages.iter().any(|m| m == "the request requires x@5:"), "{:?}", messages);
}

// ============================================================================
// Virtual packages
// ============================================================================

#[test]
fn test_virtual_gets_one_provider_deterministically() {
    let concretizer = Concretizer::new(hpc_repo(), clang_config());
    let first = concretizer.concretize(&AbstractSpec::new("app"), &[]).unwrap();

    let providers: Vec<&str> = ["mpich", "openmpi"]
        .into_iter()
        .filter(|p| first.find(p).is_some())
        .collect();
    assert_eq!(providers, vec!["mpich"]);

    let edge = first.dependency("mpich").unwrap();
    assert!(edge.virtuals.contains("mpi"));

    let again = Concretizer::new(hpc_repo(), clang_config())
        .concretize(&AbstractSpec::new("app"), &[])
        .unwrap();
    assert_eq!(first.dag_hash(), again.dag_hash());
}

#[test]
fn test_provider_preference_from_config() {
    let config = clang_config().with_provider_preference("mpi", &["openmpi"]);
    let concretizer = Concretizer::new(hpc_repo(), config);
    let root = concretizer.concretize(&AbstractSpec::new("app"), &[]).unwrap();

    assert!(root.find("openmpi").is_some());
    assert!(root.find("mpich").is_none());
}

#[test]
fn test_virtual_request_binds_provider() {
    let concretizer = Concretizer::new(hpc_repo(), clang_config());
    let root = concretizer
        .concretize(
            &AbstractSpec::new("hdf5").with_dependency(AbstractSpec::new("mpi")),
            &[],
        )
        .unwrap();
    let edge = root.dependency("mpich").unwrap();
    assert!(edge.virtuals.contains("mpi"));
}

// ============================================================================
// Identity
// ============================================================================

#[test]
fn test_concretization_is_deterministic() {
    let first = Concretizer::new(hpc_repo(), clang_config())
        .concretize(&AbstractSpec::new("app"), &[])
        .unwrap();
    let second = Concretizer::new(hpc_repo(), clang_config())
        .concretize(&AbstractSpec::new("app"), &[])
        .unwrap();

    assert_eq!(first.dag_hash(), second.dag_hash());
    assert_eq!(first.full_hash(), second.full_hash());
}

#[test]
fn test_pinned_spec_concretizes_to_itself() {
    let concretizer = Concretizer::new(hpc_repo(), clang_config());
    let first = concretizer.concretize(&AbstractSpec::new("app"), &[]).unwrap();
    let again = concretizer.concretize(&first.to_abstract(), &[]).unwrap();

    assert_eq!(first.dag_hash(), again.dag_hash());
    assert_eq!(first.full_hash(), again.full_hash());
    assert_eq!(*first, *again);
}

#[test]
fn test_pinned_spec_with_runtime_concretizes_to_itself() {
    let config = SolverConfig::new().with_compiler("gcc@12.3.0".parse().unwrap());
    let concretizer = Concretizer::new(hpc_repo(), config);
    let first = concretizer.concretize(&AbstractSpec::new("hdf5"), &[]).unwrap();
    assert!(first.find("gcc-runtime").is_some());

    let again = concretizer.concretize(&first.to_abstract(), &[]).unwrap();
    assert_eq!(first.dag_hash(), again.dag_hash());
}

// ============================================================================
// Compiler runtimes
// ============================================================================

#[test]
fn test_runtime_matches_newest_compiler() {
    let repo = Repository::new()
        .with(package("a", &["1.0"]).with_dependency(DependencyDecl::new("b")))
        .with(package("b", &["1.0"]));
    let config = SolverConfig::new()
        .with_compiler("gcc@4.5.0".parse().unwrap())
        .with_compiler("gcc@10.2.1".parse().unwrap());
    let concretizer = Concretizer::new(repo, config);

    let request = AbstractSpec::new("a")
        .with_compiler("gcc@10.2.1".parse::<CompilerConstraint>().unwrap());
    let root = concretizer.concretize(&request, &[]).unwrap();

    let b = root.find("b").unwrap();
    assert_eq!(root.compiler().to_string(), "gcc@10.2.1");
    assert_eq!(b.compiler().to_string(), "gcc@4.5.0");

    let from_a = root.dependency("gcc-runtime").unwrap();
    let from_b = b.dependency("gcc-runtime").unwrap();
    assert_eq!(from_a.spec.version().to_string(), "10.2.1");
    assert!(Arc::ptr_eq(&from_a.spec, &from_b.spec));
    assert!(from_a.deptypes.contains(DepTypes::LINK));

    let runtimes = nodes(std::slice::from_ref(&root))
        .into_iter()
        .filter(|n| n.name() == "gcc-runtime")
        .count();
    assert_eq!(runtimes, 1);
}

#[test]
fn test_runtime_injection_can_be_disabled() {
    let config = SolverConfig::new()
        .with_compiler("gcc@12.3.0".parse().unwrap())
        .with_compiler_runtimes(false);
    let concretizer = Concretizer::new(hpc_repo(), config);
    let root = concretizer.concretize(&AbstractSpec::new("zlib"), &[]).unwrap();
    assert!(root.dependencies().is_empty());
}

// ============================================================================
// Request errors and cancellation
// ============================================================================

#[test]
fn test_unknown_dependency_names_requester() {
    let concretizer = Concretizer::new(hpc_repo(), clang_config());
    let err = concretizer
        .concretize(
            &AbstractSpec::new("app").with_dependency(AbstractSpec::new("petsc")),
            &[],
        )
        .unwrap_err();
    match err {
        ConcretizeError::UnknownPackage { name, requested_by } => {
            assert_eq!(name, "petsc");
            assert_eq!(requested_by, "app");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_unknown_variant_is_rejected() {
    let concretizer = Concretizer::new(hpc_repo(), clang_config());
    let err = concretizer
        .concretize(&AbstractSpec::new("zlib").with_variant("shared", true), &[])
        .unwrap_err();
    assert!(matches!(err, ConcretizeError::UnknownVariant { ref variant, .. } if variant == "shared"));
    assert!(!err.is_solve_outcome());
}

#[test]
fn test_virtual_root_is_malformed() {
    let concretizer = Concretizer::new(hpc_repo(), clang_config());
    let err = concretizer.concretize(&AbstractSpec::new("mpi"), &[]).unwrap_err();
    assert!(matches!(err, ConcretizeError::MalformedRequest(_)));
}

#[test]
fn test_expired_deadline_cancels() {
    let concretizer = Concretizer::new(hpc_repo(), clang_config());
    let outcome = concretizer
        .solve(
            &[AbstractSpec::new("app")],
            &[],
            &CancelToken::with_deadline(Instant::now()),
        )
        .unwrap();
    assert!(matches!(outcome, Outcome::SolveCancelled { .. }));
}

#[test]
fn test_zero_timeout_cancels() {
    let concretizer = Concretizer::new(hpc_repo(), clang_config().with_timeout(0));
    let err = concretizer.concretize(&AbstractSpec::new("app"), &[]).unwrap_err();
    assert!(matches!(err, ConcretizeError::SolveCancelled { .. }));
}
