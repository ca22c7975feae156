use std::collections::BTreeSet;

use log::{debug, trace};

use super::cancel::CancelToken;
use super::formula::{literal_holds, Formula};
use super::rule::{Literal, Var};
use super::sat::{Sat, SearchResult};
use crate::error::Result;

/// An optimal assignment of a formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    values: Vec<bool>,
    costs: Vec<u64>,
}

impl Model {
    pub fn new(values: Vec<bool>, costs: Vec<u64>) -> Self {
        Self { values, costs }
    }

    pub fn value(&self, var: Var) -> bool {
        self.values.get(var as usize).copied().unwrap_or(false)
    }

    pub fn holds(&self, literal: Literal) -> bool {
        literal_holds(&self.values, literal)
    }

    /// Cost per criterion, in criterion order
    pub fn costs(&self) -> &[u64] {
        &self.costs
    }
}

/// What a solve produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveOutcome {
    Optimal(Model),
    /// The enabled selectors in `core` cannot all hold together
    Unsat { core: Vec<Var> },
}

/// A constraint solver that the driver treats as a black box.
///
/// Given a formula and the set of enabled selectors it returns a model that
/// is optimal for the formula's criteria in lexicographic order, or a subset
/// of the enabled selectors that is already unsatisfiable. Implementations
/// must poll `cancel` and fail with `SolveCancelled` when it fires.
pub trait ConstraintSolver: Send + Sync {
    fn solve(
        &self,
        formula: &Formula,
        enabled: &BTreeSet<Var>,
        cancel: &CancelToken,
    ) -> Result<SolveOutcome>;

    /// Whether any model exists, without optimizing
    fn check(&self, formula: &Formula, enabled: &BTreeSet<Var>, cancel: &CancelToken) -> Result<bool> {
        Ok(matches!(
            self.solve(formula, enabled, cancel)?,
            SolveOutcome::Optimal(_)
        ))
    }
}

fn selector_assumptions(formula: &Formula, enabled: &BTreeSet<Var>) -> Vec<Literal> {
    formula
        .selectors()
        .iter()
        .map(|&s| if enabled.contains(&s) { s as Literal } else { -(s as Literal) })
        .collect()
}

/// CDCL solver with lexicographic optimization by bound tightening.
///
/// Each criterion is minimized in turn: while a model exists, the bound on
/// the criterion is lowered below the cost of the last model. When no
/// better model exists the temporary bounds are released and the optimum is
/// pinned as a permanent bound before the next criterion is considered.
///
/// Once every criterion is pinned, the formula's tie-break groups are
/// settled greedily in order: the first literal of a group that some
/// optimal model allows is fixed true, the ones before it false.
#[derive(Debug, Clone, Copy, Default)]
pub struct CdclBackend;

impl CdclBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ConstraintSolver for CdclBackend {
    fn solve(
        &self,
        formula: &Formula,
        enabled: &BTreeSet<Var>,
        cancel: &CancelToken,
    ) -> Result<SolveOutcome> {
        let assumptions = selector_assumptions(formula, enabled);
        debug!(
            "solving {} variables, {:?}, {} of {} selectors enabled",
            formula.num_vars(),
            formula.rules().stats(),
            enabled.len(),
            assumptions.len()
        );

        let mut sat = Sat::new(formula);
        let mut best = match sat.solve(&assumptions, cancel)? {
            SearchResult::Sat(model) => model,
            SearchResult::Unsat(core) => {
                let core: Vec<Var> = core
                    .into_iter()
                    .filter(|&lit| lit > 0)
                    .map(|lit| lit as Var)
                    .collect();
                debug!("no model; core of {} selectors", core.len());
                return Ok(SolveOutcome::Unsat { core });
            }
        };

        for criterion in formula.criteria() {
            if criterion.terms.is_empty() {
                continue;
            }
            let mut cost = criterion.cost(&best);
            let mark = sat.mark();
            while cost > 0 {
                cancel.check()?;
                sat.push_bound(&criterion.terms, cost - 1);
                match sat.solve(&assumptions, cancel)? {
                    SearchResult::Sat(model) => {
                        cost = criterion.cost(&model);
                        trace!("{}: improved to {}", criterion.name, cost);
                        best = model;
                    }
                    SearchResult::Unsat(_) => break,
                }
            }
            sat.release(mark);
            sat.push_bound(&criterion.terms, cost);
            debug!("{}: optimum {}", criterion.name, cost);
        }

        let mut fixed = assumptions;
        let mut attempts = 0usize;
        for group in formula.tie_break() {
            for &literal in group {
                if literal_holds(&best, literal) {
                    fixed.push(literal);
                    break;
                }
                cancel.check()?;
                attempts += 1;
                fixed.push(literal);
                match sat.solve(&fixed, cancel)? {
                    SearchResult::Sat(model) => {
                        best = model;
                        break;
                    }
                    SearchResult::Unsat(_) => {
                        if let Some(last) = fixed.last_mut() {
                            *last = -literal;
                        }
                    }
                }
            }
        }
        trace!("tie-break settled with {} attempts", attempts);

        let costs = formula.criteria().iter().map(|c| c.cost(&best)).collect();
        debug!("optimization finished after {} conflicts", sat.conflicts());
        Ok(SolveOutcome::Optimal(Model::new(best, costs)))
    }

    fn check(&self, formula: &Formula, enabled: &BTreeSet<Var>, cancel: &CancelToken) -> Result<bool> {
        let assumptions = selector_assumptions(formula, enabled);
        let mut sat = Sat::new(formula);
        Ok(matches!(sat.solve(&assumptions, cancel)?, SearchResult::Sat(_)))
    }
}
