//! The concretization entry point.
//!
//! A [`Concretizer`] owns the fact cache, the configuration and the solver
//! backend. Each solve runs the full pipeline: compile the request into a
//! [`Problem`], run the reuse passes, then rebuild the DAGs from the model.
//! Compiled problems are kept in a small FIFO cache so that re-solving the
//! same request (with a different cancel token, say) skips the encoding.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use indexmap::IndexMap;
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::config::SolverConfig;
use crate::driver::{Driver, DriverOutcome};
use crate::encode::{Encoder, Problem};
use crate::error::{ConcretizeError, Result};
use crate::explain::Explanation;
use crate::package::{FactProvider, FactsCache};
use crate::reconstruct::Reconstructor;
use crate::solver::{CancelToken, CdclBackend, ConstraintSolver};
use crate::spec::{AbstractSpec, ConcreteSpec, DepTypes, TraversalOrder};

/// Result of one solve
#[derive(Debug, Clone)]
pub enum Outcome {
    /// One concrete root per request, in request order
    Resolved { roots: Vec<Arc<ConcreteSpec>> },
    /// No DAG satisfies the request; a minimal set of reasons
    Unsatisfiable {
        conflicting_constraints: Vec<Explanation>,
    },
    /// The timeout or the caller's token fired first
    SolveCancelled { reason: String },
}

impl Outcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Outcome::Resolved { .. })
    }

    /// The resolved roots, or the outcome as an error
    pub fn into_result(self) -> Result<Vec<Arc<ConcreteSpec>>> {
        match self {
            Outcome::Resolved { roots } => Ok(roots),
            Outcome::Unsatisfiable {
                conflicting_constraints,
            } => Err(ConcretizeError::Unsatisfiable {
                explanations: conflicting_constraints,
            }),
            Outcome::SolveCancelled { reason } => Err(ConcretizeError::SolveCancelled { reason }),
        }
    }
}

/// Turns abstract requests into concrete DAGs.
///
/// The concretizer is `Send + Sync`; independent requests can be solved
/// from several threads at once, sharing the fact cache.
pub struct Concretizer<P> {
    facts: FactsCache<P>,
    config: SolverConfig,
    solver: Box<dyn ConstraintSolver>,
    problems: Mutex<IndexMap<String, Arc<Problem>>>,
}

impl<P: FactProvider> Concretizer<P> {
    /// A concretizer using the built-in CDCL backend
    pub fn new(provider: P, config: SolverConfig) -> Self {
        Self::with_solver(provider, config, Box::new(CdclBackend::new()))
    }

    pub fn with_solver(provider: P, config: SolverConfig, solver: Box<dyn ConstraintSolver>) -> Self {
        Self {
            facts: FactsCache::new(provider),
            config,
            solver,
            problems: Mutex::new(IndexMap::new()),
        }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn facts(&self) -> &FactsCache<P> {
        &self.facts
    }

    /// Solve `requests` together, so that every package appears once.
    ///
    /// Bad requests fail with an error before any solving. Unsatisfiable
    /// and cancelled solves are ordinary outcomes.
    pub fn solve(
        &self,
        requests: &[AbstractSpec],
        reusable: &[Arc<ConcreteSpec>],
        cancel: &CancelToken,
    ) -> Result<Outcome> {
        let start = Instant::now();
        let cancel = cancel.limited_to(self.config.timeout_duration());

        let outcome = match self.run(requests, reusable, &cancel) {
            Ok(outcome) => outcome,
            Err(ConcretizeError::SolveCancelled { reason }) => Outcome::SolveCancelled { reason },
            Err(e) => return Err(e),
        };

        let names: Vec<&str> = requests.iter().map(|r| r.name.as_str()).collect();
        match &outcome {
            Outcome::Resolved { roots } => info!(
                "Concretized {} in {:?}: {} nodes",
                names.join(", "),
                start.elapsed(),
                roots
                    .iter()
                    .flat_map(|r| r.traverse(TraversalOrder::Pre, DepTypes::ALL))
                    .map(|node| node.name())
                    .collect::<BTreeSet<_>>()
                    .len()
            ),
            Outcome::Unsatisfiable {
                conflicting_constraints,
            } => info!(
                "No solution for {} ({} conflicting constraints)",
                names.join(", "),
                conflicting_constraints.len()
            ),
            Outcome::SolveCancelled { reason } => {
                warn!("Concretization of {} cancelled: {}", names.join(", "), reason)
            }
        }
        Ok(outcome)
    }

    fn run(
        &self,
        requests: &[AbstractSpec],
        reusable: &[Arc<ConcreteSpec>],
        cancel: &CancelToken,
    ) -> Result<Outcome> {
        cancel.check()?;
        let problem = self.problem(requests, reusable)?;
        cancel.check()?;

        let driver = Driver::new(&problem, self.solver.as_ref(), cancel);
        match driver.run()? {
            DriverOutcome::Solved { model, pass } => {
                debug!("Rebuilding DAG from the {} model", pass.as_str());
                let roots = Reconstructor::new(&problem, &model).build()?;
                Ok(Outcome::Resolved { roots })
            }
            DriverOutcome::Unsatisfiable { explanations } => Ok(Outcome::Unsatisfiable {
                conflicting_constraints: explanations,
            }),
        }
    }

    /// The compiled problem for a request, from the cache when possible
    fn problem(&self, requests: &[AbstractSpec], reusable: &[Arc<ConcreteSpec>]) -> Result<Arc<Problem>> {
        let capacity = self.config.encoding_cache_size;
        if capacity == 0 {
            return Ok(Arc::new(Encoder::new(&self.facts, &self.config).encode(requests, reusable)?));
        }

        let hashes: Vec<&str> = reusable.iter().map(|s| s.dag_hash()).collect();
        let key = serde_json::to_string(&(requests, hashes))?;
        if let Ok(problems) = self.problems.lock() {
            if let Some(problem) = problems.get(&key) {
                debug!("Reusing compiled problem");
                return Ok(Arc::clone(problem));
            }
        }

        let problem = Arc::new(Encoder::new(&self.facts, &self.config).encode(requests, reusable)?);
        if let Ok(mut problems) = self.problems.lock() {
            while problems.len() >= capacity {
                problems.shift_remove_index(0);
            }
            problems.insert(key, Arc::clone(&problem));
        }
        Ok(problem)
    }

    /// Concretize several roots into one consistent DAG set
    pub fn concretize_together(
        &self,
        requests: &[AbstractSpec],
        reusable: &[Arc<ConcreteSpec>],
    ) -> Result<Vec<Arc<ConcreteSpec>>> {
        self.solve(requests, reusable, &CancelToken::new())?
            .into_result()
    }

    /// Concretize a single root
    pub fn concretize(&self, request: &AbstractSpec, reusable: &[Arc<ConcreteSpec>]) -> Result<Arc<ConcreteSpec>> {
        let mut roots = self.concretize_together(std::slice::from_ref(request), reusable)?;
        roots.pop().ok_or_else(|| {
            ConcretizeError::ReconstructionInconsistency(format!("no root returned for {}", request.name))
        })
    }

    /// Concretize each root on its own, in parallel.
    ///
    /// Results come back in request order; one failing root does not affect
    /// the others.
    pub fn concretize_separately(
        &self,
        requests: &[AbstractSpec],
        reusable: &[Arc<ConcreteSpec>],
    ) -> Vec<Result<Arc<ConcreteSpec>>> {
        requests
            .par_iter()
            .map(|request| self.concretize(request, reusable))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{DependencyDecl, PackageFacts, Repository, VariantDecl};
    use crate::spec::{CompilerSpec, VariantValue};
    use strata_version::Version;

    fn config() -> SolverConfig {
        SolverConfig::new()
            .with_compiler(CompilerSpec::new("clang", Version::parse("17.0").unwrap()))
            .with_compiler_runtimes(false)
    }

    fn repo() -> Repository {
        Repository::new()
            .with(
                PackageFacts::new("app")
                    .version("1.0")
                    .unwrap()
                    .with_variant(VariantDecl::boolean("shared", true))
                    .with_dependency(DependencyDecl::new("zlib")),
            )
            .with(PackageFacts::new("zlib").version("1.2").unwrap().version("1.3").unwrap())
    }

    #[test]
    fn test_concretize_single_root() {
        let concretizer = Concretizer::new(repo(), config());
        let root = concretizer.concretize(&AbstractSpec::new("app"), &[]).unwrap();

        assert_eq!(root.name(), "app");
        assert_eq!(root.variant("shared"), Some(&VariantValue::Bool(true)));
        let zlib = root.find("zlib").unwrap();
        assert_eq!(zlib.version().to_string(), "1.3");
    }

    #[test]
    fn test_problem_cache_is_bounded() {
        let mut config = config();
        config.encoding_cache_size = 1;
        let concretizer = Concretizer::new(repo(), config);

        concretizer.concretize(&AbstractSpec::new("app"), &[]).unwrap();
        concretizer.concretize(&AbstractSpec::new("app"), &[]).unwrap();
        concretizer.concretize(&AbstractSpec::new("zlib"), &[]).unwrap();
        assert_eq!(concretizer.problems.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_package_fails_before_solving() {
        let concretizer = Concretizer::new(repo(), config());
        let err = concretizer
            .solve(&[AbstractSpec::new("missing")], &[], &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, ConcretizeError::UnknownPackage { .. }));
    }

    #[test]
    fn test_cancelled_token_is_an_outcome() {
        let concretizer = Concretizer::new(repo(), config());
        let token = CancelToken::new();
        token.cancel();
        let outcome = concretizer
            .solve(&[AbstractSpec::new("app")], &[], &token)
            .unwrap();
        assert!(matches!(outcome, Outcome::SolveCancelled { .. }));
    }

    #[test]
    fn test_separately_keeps_order() {
        let concretizer = Concretizer::new(repo(), config());
        let results = concretizer.concretize_separately(
            &[AbstractSpec::new("zlib"), AbstractSpec::new("missing"), AbstractSpec::new("app")],
            &[],
        );
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().name(), "zlib");
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().name(), "app");
    }
}
