//! Solve passes over a compiled problem.
//!
//! A request is first solved with every reuse candidate available. When
//! that is unsatisfiable the driver retries with reuse relaxed, first for
//! the roots only and then entirely, so a bad candidate can never make a
//! satisfiable request fail. The last failing pass is explained from a
//! subset-minimal core of selectors.

use std::collections::BTreeSet;
use std::time::Instant;

use log::{debug, info};
use strata_version::Version;

use crate::encode::Problem;
use crate::error::Result;
use crate::explain::{with_version_summaries, Explanation};
use crate::solver::{CancelToken, ConstraintSolver, Model, SolveOutcome, Var};

/// How much reuse a pass allows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReusePass {
    /// Every candidate may be reused
    Full,
    /// Only dependencies may be reused, never a root
    DependenciesOnly,
    /// Everything is built or external
    Disabled,
}

impl ReusePass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReusePass::Full => "full reuse",
            ReusePass::DependenciesOnly => "dependencies-only reuse",
            ReusePass::Disabled => "no reuse",
        }
    }
}

/// Result of running the passes
#[derive(Debug)]
pub enum DriverOutcome {
    Solved { model: Model, pass: ReusePass },
    Unsatisfiable { explanations: Vec<Explanation> },
}

/// Runs the solve passes for one problem
pub struct Driver<'a> {
    problem: &'a Problem,
    solver: &'a dyn ConstraintSolver,
    cancel: &'a CancelToken,
}

impl<'a> Driver<'a> {
    pub fn new(problem: &'a Problem, solver: &'a dyn ConstraintSolver, cancel: &'a CancelToken) -> Self {
        Self {
            problem,
            solver,
            cancel,
        }
    }

    /// Passes to try, in order
    fn passes(&self) -> Vec<ReusePass> {
        if !self.problem.has_candidates() {
            return vec![ReusePass::Full];
        }
        let mut passes = vec![ReusePass::Full];
        if self.problem.has_root_candidates() {
            passes.push(ReusePass::DependenciesOnly);
        }
        passes.push(ReusePass::Disabled);
        passes
    }

    /// Switch selectors a pass turns on
    fn switches(&self, pass: ReusePass) -> BTreeSet<Var> {
        let switches = self.problem.switches();
        let selector = match pass {
            ReusePass::Full => None,
            ReusePass::DependenciesOnly => switches.no_root_reuse,
            ReusePass::Disabled => switches.no_reuse,
        };
        selector.into_iter().collect()
    }

    pub fn run(&self) -> Result<DriverOutcome> {
        let mut last_failure = None;

        for pass in self.passes() {
            self.cancel.check()?;
            let start = Instant::now();
            let mut enabled = self.switches(pass);
            enabled.extend(self.problem.explained_selectors());

            match self
                .solver
                .solve(self.problem.formula(), &enabled, self.cancel)?
            {
                SolveOutcome::Optimal(model) => {
                    info!(
                        "Solved with {} in {:?}, costs {:?}",
                        pass.as_str(),
                        start.elapsed(),
                        model.costs()
                    );
                    return Ok(DriverOutcome::Solved { model, pass });
                }
                SolveOutcome::Unsat { core } => {
                    debug!(
                        "Unsatisfiable with {} ({} selectors in core)",
                        pass.as_str(),
                        core.len()
                    );
                    last_failure = Some((pass, core));
                }
            }
        }

        let explanations = match last_failure {
            Some((pass, core)) => {
                let core = self.minimize_core(pass, core)?;
                self.explain(&core)
            }
            None => Vec::new(),
        };
        info!("Unsatisfiable: {} explanations", explanations.len());
        Ok(DriverOutcome::Unsatisfiable { explanations })
    }

    /// Drop core members one at a time while the rest stays unsatisfiable
    fn minimize_core(&self, pass: ReusePass, core: Vec<Var>) -> Result<Vec<Var>> {
        let switches = self.switches(pass);
        let mut core: Vec<Var> = core
            .into_iter()
            .filter(|s| self.problem.explanation(*s).is_some())
            .collect();
        core.sort_unstable();
        core.dedup();

        let mut checks = 0usize;
        let mut i = 0;
        while i < core.len() {
            self.cancel.check()?;
            let mut enabled = switches.clone();
            enabled.extend(core.iter().enumerate().filter(|(j, _)| *j != i).map(|(_, s)| *s));
            checks += 1;
            if self.solver.check(self.problem.formula(), &enabled, self.cancel)? {
                i += 1;
            } else {
                core.remove(i);
            }
        }
        debug!("Minimal core of {} selectors after {} checks", core.len(), checks);
        Ok(core)
    }

    fn explain(&self, core: &[Var]) -> Vec<Explanation> {
        let explanations: Vec<Explanation> = core
            .iter()
            .filter_map(|s| self.problem.explanation(*s).cloned())
            .collect();
        with_version_summaries(explanations, |package| {
            self.problem.domain(package).map(|domain| {
                domain
                    .versions
                    .iter()
                    .map(|c| c.version.clone())
                    .collect::<Vec<Version>>()
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SolverConfig;
    use crate::encode::Encoder;
    use crate::package::{DependencyDecl, PackageFacts, Repository};
    use crate::solver::{CdclBackend, Formula};
    use crate::spec::{AbstractSpec, ConcreteSpec};
    use crate::Concretizer;
    use std::sync::{Arc, Mutex};
    use strata_version::VersionList;

    fn repo() -> Repository {
        Repository::new()
            .with(
                PackageFacts::new("a")
                    .version("1.0")
                    .unwrap()
                    .with_dependency(DependencyDecl::new("x").versions(VersionList::parse("4.0").unwrap())),
            )
            .with(PackageFacts::new("x").version("4.0").unwrap().version("4.1").unwrap())
    }

    fn config() -> SolverConfig {
        SolverConfig::new().with_compiler("clang@17.0".parse().unwrap())
    }

    fn problem(requests: &[AbstractSpec]) -> Problem {
        Encoder::new(&repo(), &config()).encode(requests, &[]).unwrap()
    }

    /// A problem whose root has an installed candidate, so every pass runs
    fn problem_with_installed_root() -> Problem {
        let installed: Arc<ConcreteSpec> = Concretizer::new(repo(), config())
            .concretize(&AbstractSpec::new("a"), &[])
            .unwrap();
        Encoder::new(&repo(), &config())
            .encode(&[AbstractSpec::new("a")], &[installed])
            .unwrap()
    }

    /// Answers solves from a script and records the selectors of each call
    struct ScriptedSolver {
        answers: Mutex<Vec<SolveOutcome>>,
        calls: Mutex<Vec<BTreeSet<Var>>>,
    }

    impl ScriptedSolver {
        fn new(answers: Vec<SolveOutcome>) -> Self {
            Self {
                answers: Mutex::new(answers),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn passes(&self, problem: &Problem) -> Vec<ReusePass> {
            let switches = problem.switches();
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|enabled| {
                    if switches.no_reuse.is_some_and(|s| enabled.contains(&s)) {
                        ReusePass::Disabled
                    } else if switches.no_root_reuse.is_some_and(|s| enabled.contains(&s)) {
                        ReusePass::DependenciesOnly
                    } else {
                        ReusePass::Full
                    }
                })
                .collect()
        }
    }

    impl ConstraintSolver for ScriptedSolver {
        fn solve(&self, _formula: &Formula, enabled: &BTreeSet<Var>, _cancel: &CancelToken) -> Result<SolveOutcome> {
            self.calls.lock().unwrap().push(enabled.clone());
            Ok(self.answers.lock().unwrap().remove(0))
        }

        // every core member is needed
        fn check(&self, _formula: &Formula, _enabled: &BTreeSet<Var>, _cancel: &CancelToken) -> Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn test_single_pass_without_candidates() {
        let problem = problem(&[AbstractSpec::new("a")]);
        let cancel = CancelToken::new();
        let driver = Driver::new(&problem, &CdclBackend, &cancel);

        assert_eq!(driver.passes(), vec![ReusePass::Full]);
        match driver.run().unwrap() {
            DriverOutcome::Solved { pass, .. } => assert_eq!(pass, ReusePass::Full),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_core_is_minimal() {
        let problem = problem(&[AbstractSpec::new("a").with_dependency(AbstractSpec::new("x").at("4.1").unwrap())]);
        let cancel = CancelToken::new();
        let driver = Driver::new(&problem, &CdclBackend, &cancel);

        let DriverOutcome::Unsatisfiable { explanations } = driver.run().unwrap() else {
            panic!("expected an unsatisfiable outcome");
        };
        let messages: Vec<String> = explanations.iter().map(|e| e.to_string()).collect();
        assert!(messages.contains(&"a requires x@4.0".to_string()), "{:?}", messages);
        assert!(messages.contains(&"the request for a requires x@4.1".to_string()), "{:?}", messages);
        assert!(messages.contains(&"no version of x satisfies @4.0 and @4.1".to_string()), "{:?}", messages);
    }

    #[test]
    fn test_relaxed_pass_after_full_reuse_fails() {
        let problem = problem_with_installed_root();
        assert!(problem.has_root_candidates());
        let solver = ScriptedSolver::new(vec![
            SolveOutcome::Unsat { core: Vec::new() },
            SolveOutcome::Optimal(Model::new(Vec::new(), Vec::new())),
        ]);
        let cancel = CancelToken::new();

        match Driver::new(&problem, &solver, &cancel).run().unwrap() {
            DriverOutcome::Solved { pass, .. } => assert_eq!(pass, ReusePass::DependenciesOnly),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(
            solver.passes(&problem),
            vec![ReusePass::Full, ReusePass::DependenciesOnly]
        );
    }

    #[test]
    fn test_explanation_comes_from_last_pass() {
        let problem = problem_with_installed_root();
        let selectors: Vec<Var> = problem.explained_selectors().collect();
        assert!(selectors.len() >= 2);
        let (early, last) = (selectors[0], selectors[1]);
        let solver = ScriptedSolver::new(vec![
            SolveOutcome::Unsat { core: vec![early] },
            SolveOutcome::Unsat { core: vec![early] },
            SolveOutcome::Unsat { core: vec![last] },
        ]);
        let cancel = CancelToken::new();

        let DriverOutcome::Unsatisfiable { explanations } = Driver::new(&problem, &solver, &cancel).run().unwrap() else {
            panic!("expected an unsatisfiable outcome");
        };
        assert_eq!(
            solver.passes(&problem),
            vec![ReusePass::Full, ReusePass::DependenciesOnly, ReusePass::Disabled]
        );
        assert_eq!(explanations.first(), problem.explanation(last));
        assert!(!explanations.iter().any(|e| Some(e) == problem.explanation(early)));
    }

    #[test]
    fn test_cancelled_before_first_pass() {
        let problem = problem(&[AbstractSpec::new("a")]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = Driver::new(&problem, &CdclBackend, &cancel).run().unwrap_err();
        assert!(err.is_solve_outcome());
    }
}
