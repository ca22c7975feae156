//! Constraint solver backend for concretization.
//!
//! The concretizer hands its compiled problem to a [`ConstraintSolver`] and
//! only looks at the returned model or unsatisfiable core. The shipped
//! implementation, [`CdclBackend`], is a CDCL (Conflict-Driven Clause
//! Learning) SAT solver extended with pseudo-boolean upper bounds.
//!
//! # Architecture
//!
//! - [`Formula`]: variables, clauses, selectors, criteria and branching hints
//! - [`RuleSet`]: collection of clauses with deduplication
//! - [`Decisions`]: assignment trail with levels and reasons
//! - `WatchGraph`: two-watched-literal index for unit propagation
//! - [`Policy`]: deterministic branching from hints
//! - [`CdclBackend`]: search plus lexicographic optimization
//!
//! # Algorithm Overview
//!
//! 1. **Assumptions**: every selector is assumed on or off, one decision level each
//! 2. **Unit Propagation**: clauses through watched literals, bounds through running sums
//! 3. **Decision Making**: the first applicable hint, else the lowest open variable set false
//! 4. **Conflict Analysis**: first-UIP learning and non-chronological backjumping
//! 5. **Final Conflict**: a falsified assumption yields the core of assumptions behind it
//! 6. **Optimization**: each criterion is tightened until no better model exists
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeSet;
//! use strata_concretize::solver::{CancelToken, CdclBackend, ConstraintSolver, Formula, RuleType, SolveOutcome};
//!
//! let mut formula = Formula::new();
//! let a = formula.new_var() as i32;
//! let b = formula.new_var() as i32;
//! formula.add_clause(vec![a, b], RuleType::Request);
//! formula.add_criterion("prefer-b", vec![(a, 1)]);
//!
//! let outcome = CdclBackend::new()
//!     .solve(&formula, &BTreeSet::new(), &CancelToken::new())
//!     .unwrap();
//! match outcome {
//!     SolveOutcome::Optimal(model) => assert!(model.holds(b) && !model.holds(a)),
//!     SolveOutcome::Unsat { .. } => unreachable!(),
//! }
//! ```

mod backend;
mod cancel;
mod decisions;
mod formula;
mod policy;
mod rule;
mod rule_set;
mod sat;
mod watch_graph;

#[cfg(test)]
mod tests;

pub use backend::{CdclBackend, ConstraintSolver, Model, SolveOutcome};
pub use cancel::CancelToken;
pub use decisions::{Decisions, Reason};
pub use formula::{Criterion, Formula};
pub use policy::{BranchHint, Policy};
pub use rule::{var_of, Literal, Rule, RuleType, Var};
pub use rule_set::{RuleSet, RuleSetStats};
