//! Backend tests: satisfiability, unsatisfiable cores and lexicographic
//! optimization, checked against brute force on small formulas.

use std::collections::BTreeSet;
use std::time::Instant;

use super::*;
use crate::error::ConcretizeError;

/// Helper to allocate `n` fresh variables as positive literals
fn vars(formula: &mut Formula, n: usize) -> Vec<Literal> {
    (0..n).map(|_| formula.new_var() as Literal).collect()
}

/// Solve with every selector enabled
fn solve_all(formula: &Formula) -> SolveOutcome {
    let enabled: BTreeSet<Var> = formula.selectors().iter().copied().collect();
    CdclBackend::new()
        .solve(formula, &enabled, &CancelToken::new())
        .unwrap()
}

fn expect_model(outcome: SolveOutcome) -> Model {
    match outcome {
        SolveOutcome::Optimal(model) => model,
        SolveOutcome::Unsat { core } => panic!("expected a model, got core {:?}", core),
    }
}

/// Check that every enabled clause of the formula holds in the model
fn assert_satisfies(formula: &Formula, model: &Model) {
    for rule in formula.rules().iter() {
        assert!(
            rule.literals().iter().any(|&lit| model.holds(lit)),
            "clause {} violated",
            rule
        );
    }
}

/// Tiny deterministic generator for reproducible random formulas
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: u64) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 33) % bound
    }
}

// ============================================================================
// Satisfiability
// ============================================================================

#[test]
fn test_single_clause_model() {
    let mut formula = Formula::new();
    let v = vars(&mut formula, 3);
    formula.add_clause(vec![v[0], v[1]], RuleType::Request);
    formula.add_clause(vec![-v[0]], RuleType::Request);
    formula.add_clause(vec![-v[1], v[2]], RuleType::Package);

    let model = expect_model(solve_all(&formula));
    assert_satisfies(&formula, &model);
    assert!(model.holds(v[1]));
    assert!(model.holds(v[2]));
}

#[test]
fn test_contradiction_without_selectors_has_empty_core() {
    let mut formula = Formula::new();
    let v = vars(&mut formula, 1);
    formula.add_clause(vec![v[0]], RuleType::Request);
    formula.add_clause(vec![-v[0]], RuleType::Request);

    assert_eq!(solve_all(&formula), SolveOutcome::Unsat { core: vec![] });
}

#[test]
fn test_empty_clause_is_unsatisfiable() {
    let mut formula = Formula::new();
    vars(&mut formula, 1);
    formula.add_clause(vec![], RuleType::Package);

    assert!(matches!(solve_all(&formula), SolveOutcome::Unsat { .. }));
}

#[test]
fn test_pigeonhole_three_into_two() {
    let mut formula = Formula::new();
    // p[i][h]: pigeon i sits in hole h
    let p: Vec<Vec<Literal>> = (0..3).map(|_| vars(&mut formula, 2)).collect();
    for pigeon in &p {
        formula.add_clause(pigeon.clone(), RuleType::Request);
    }
    for hole in 0..2 {
        let column: Vec<Literal> = p.iter().map(|pigeon| pigeon[hole]).collect();
        formula.at_most_one(&column, RuleType::Definition);
    }

    assert_eq!(solve_all(&formula), SolveOutcome::Unsat { core: vec![] });
}

#[test]
fn test_sequential_exactly_one() {
    let mut formula = Formula::new();
    let v = vars(&mut formula, 12);
    formula.exactly_one(None, &v, RuleType::Definition);
    formula.add_clause(vec![v[4], v[9]], RuleType::Request);
    formula.add_clause(vec![-v[4]], RuleType::Request);

    let model = expect_model(solve_all(&formula));
    assert_satisfies(&formula, &model);
    let chosen: Vec<_> = v.iter().filter(|&&lit| model.holds(lit)).collect();
    assert_eq!(chosen, vec![&v[9]]);
}

#[test]
fn test_hints_steer_free_choices() {
    let mut formula = Formula::new();
    let v = vars(&mut formula, 3);
    formula.exactly_one(None, &v, RuleType::Definition);
    formula.add_hint(BranchHint::new(v[2]));

    let model = expect_model(solve_all(&formula));
    assert!(model.holds(v[2]));
}

// ============================================================================
// Selectors and Cores
// ============================================================================

#[test]
fn test_core_names_conflicting_selectors() {
    let mut formula = Formula::new();
    let v = vars(&mut formula, 2);
    let wants_a = formula.new_selector();
    let forbids_a = formula.new_selector();
    let unrelated = formula.new_selector();
    formula.add_guarded(vec![v[0]], RuleType::Request, wants_a);
    formula.add_guarded(vec![-v[0]], RuleType::Package, forbids_a);
    formula.add_guarded(vec![v[1]], RuleType::Package, unrelated);

    match solve_all(&formula) {
        SolveOutcome::Unsat { core } => {
            let core: BTreeSet<Var> = core.into_iter().collect();
            assert!(core.contains(&wants_a));
            assert!(core.contains(&forbids_a));
            assert!(!core.contains(&unrelated));
        }
        other => panic!("expected unsat, got {:?}", other),
    }
}

#[test]
fn test_disabled_selector_relaxes_clause() {
    let mut formula = Formula::new();
    let v = vars(&mut formula, 1);
    let wants_a = formula.new_selector();
    let forbids_a = formula.new_selector();
    formula.add_guarded(vec![v[0]], RuleType::Request, wants_a);
    formula.add_guarded(vec![-v[0]], RuleType::Package, forbids_a);

    let enabled: BTreeSet<Var> = [wants_a].into_iter().collect();
    let outcome = CdclBackend::new()
        .solve(&formula, &enabled, &CancelToken::new())
        .unwrap();
    let model = expect_model(outcome);
    assert!(model.holds(v[0]));
}

// ============================================================================
// Optimization
// ============================================================================

#[test]
fn test_weighted_choice_picks_cheapest() {
    let mut formula = Formula::new();
    let v = vars(&mut formula, 3);
    formula.exactly_one(None, &v, RuleType::Definition);
    formula.add_criterion("weight", vec![(v[0], 5), (v[1], 2), (v[2], 9)]);

    let model = expect_model(solve_all(&formula));
    assert!(model.holds(v[1]));
    assert_eq!(model.costs(), &[2]);
}

#[test]
fn test_criteria_are_lexicographic() {
    let mut formula = Formula::new();
    let v = vars(&mut formula, 3);
    let (a, b, c) = (v[0], v[1], v[2]);
    formula.add_clause(vec![a, b], RuleType::Request);
    formula.add_clause(vec![b, c], RuleType::Request);
    formula.add_criterion("avoid-b", vec![(b, 1)]);
    formula.add_criterion("avoid-a-and-c", vec![(a, 1), (c, 1)]);

    let model = expect_model(solve_all(&formula));
    assert!(!model.holds(b));
    assert!(model.holds(a) && model.holds(c));
    assert_eq!(model.costs(), &[0, 2]);
}

#[test]
fn test_later_criterion_breaks_ties() {
    let mut formula = Formula::new();
    let v = vars(&mut formula, 4);
    formula.exactly_one(None, &v, RuleType::Definition);
    formula.add_criterion("first", vec![(v[0], 1), (v[1], 1)]);
    formula.add_criterion("second", vec![(v[2], 3), (v[3], 1)]);

    let model = expect_model(solve_all(&formula));
    assert!(model.holds(v[3]));
    assert_eq!(model.costs(), &[0, 1]);
}

#[test]
fn test_expired_deadline_cancels_optimization() {
    let mut formula = Formula::new();
    let v = vars(&mut formula, 1);
    formula.add_clause(vec![v[0]], RuleType::Request);
    formula.add_criterion("cost", vec![(v[0], 1)]);

    let result = CdclBackend::new().solve(
        &formula,
        &BTreeSet::new(),
        &CancelToken::with_deadline(Instant::now()),
    );
    assert!(matches!(result, Err(ConcretizeError::SolveCancelled { .. })));
}

// ============================================================================
// Brute Force Cross-Check
// ============================================================================

/// Lexicographically smallest cost vector over all satisfying assignments
fn brute_force(formula: &Formula) -> Option<Vec<u64>> {
    let n = formula.num_vars() as usize;
    let mut best: Option<Vec<u64>> = None;
    for bits in 0u32..(1 << n) {
        let mut values = vec![false; n + 1];
        for (i, value) in values.iter_mut().enumerate().skip(1) {
            *value = bits & (1 << (i - 1)) != 0;
        }
        let model = Model::new(values.clone(), Vec::new());
        let satisfied = formula
            .rules()
            .iter()
            .all(|rule| rule.literals().iter().any(|&lit| model.holds(lit)));
        if !satisfied {
            continue;
        }
        let costs: Vec<u64> = formula.criteria().iter().map(|c| c.cost(&values)).collect();
        if best.as_ref().map_or(true, |b| costs < *b) {
            best = Some(costs);
        }
    }
    best
}

#[test]
fn test_random_formulas_match_brute_force() {
    let mut rng = Lcg(7);
    for round in 0..200 {
        let mut formula = Formula::new();
        let n = 4 + rng.next(5) as usize;
        let v = vars(&mut formula, n);
        let clauses = 2 + rng.next(3 * n as u64) as usize;
        for _ in 0..clauses {
            let width = 1 + rng.next(3) as usize;
            let clause: Vec<Literal> = (0..width)
                .map(|_| {
                    let lit = v[rng.next(n as u64) as usize];
                    if rng.next(2) == 0 {
                        lit
                    } else {
                        -lit
                    }
                })
                .collect();
            formula.add_clause(clause, RuleType::Package);
        }
        for c in 0..2 {
            let terms: Vec<(Literal, u64)> = v
                .iter()
                .filter_map(|&lit| {
                    if rng.next(2) == 0 {
                        Some((lit, 1 + rng.next(4)))
                    } else {
                        None
                    }
                })
                .collect();
            formula.add_criterion(format!("c{}", c), terms);
        }

        let expected = brute_force(&formula);
        match (solve_all(&formula), expected) {
            (SolveOutcome::Optimal(model), Some(costs)) => {
                assert_satisfies(&formula, &model);
                assert_eq!(model.costs(), costs.as_slice(), "round {}", round);
            }
            (SolveOutcome::Unsat { .. }, None) => {}
            (outcome, expected) => panic!(
                "round {}: solver gave {:?}, brute force {:?}",
                round, outcome, expected
            ),
        }
    }
}

// ============================================================================
// Tie-break and Checks
// ============================================================================

#[test]
fn test_tie_break_prefers_earlier_literals() {
    let mut formula = Formula::new();
    let v = vars(&mut formula, 3);
    formula.exactly_one(None, &v, RuleType::Definition);
    // Equal cost everywhere, so only the tie-break decides
    formula.add_criterion("flat", vec![(v[0], 1), (v[1], 1), (v[2], 1)]);
    formula.add_tie_break(vec![v[2], v[0]]);

    let model = expect_model(solve_all(&formula));
    assert!(model.holds(v[2]));
    assert!(!model.holds(v[0]));
}

#[test]
fn test_tie_break_never_overrides_criteria() {
    let mut formula = Formula::new();
    let v = vars(&mut formula, 2);
    formula.exactly_one(None, &v, RuleType::Definition);
    formula.add_criterion("avoid-first", vec![(v[0], 1)]);
    formula.add_tie_break(vec![v[0], v[1]]);

    let model = expect_model(solve_all(&formula));
    assert!(model.holds(v[1]));
    assert_eq!(model.costs(), &[0]);
}

#[test]
fn test_check_reports_satisfiability() {
    let mut formula = Formula::new();
    let v = vars(&mut formula, 1);
    let sel = formula.new_selector();
    formula.add_clause(vec![v[0]], RuleType::Package);
    formula.add_guarded(vec![-v[0]], RuleType::Request, sel);

    let backend = CdclBackend::new();
    let token = CancelToken::new();
    assert!(backend.check(&formula, &BTreeSet::new(), &token).unwrap());
    assert!(!backend
        .check(&formula, &BTreeSet::from([sel]), &token)
        .unwrap());
}
