use super::policy::BranchHint;
use super::rule::{Literal, Rule, RuleType, Var};
use super::rule_set::RuleSet;

/// Pairwise encoding up to this size, sequential counter above
const PAIRWISE_LIMIT: usize = 8;

/// One optimization criterion: minimize the summed weight of true literals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criterion {
    pub name: String,
    pub terms: Vec<(Literal, u64)>,
}

impl Criterion {
    /// Cost of a model indexed by variable
    pub fn cost(&self, model: &[bool]) -> u64 {
        self.terms
            .iter()
            .filter(|(lit, _)| literal_holds(model, *lit))
            .map(|(_, weight)| *weight)
            .sum()
    }
}

pub(crate) fn literal_holds(model: &[bool], literal: Literal) -> bool {
    let value = model
        .get(literal.unsigned_abs() as usize)
        .copied()
        .unwrap_or(false);
    value == (literal > 0)
}

/// A compiled constraint problem.
///
/// Clauses are kept in a [`RuleSet`]. Clauses that should be able to appear
/// in an unsatisfiability explanation are guarded by a selector variable;
/// the solver is told which selectors are enabled. Criteria are minimized
/// lexicographically in the order they were added.
#[derive(Debug, Clone, Default)]
pub struct Formula {
    num_vars: Var,
    rules: RuleSet,
    selectors: Vec<Var>,
    criteria: Vec<Criterion>,
    hints: Vec<BranchHint>,
    tie_break: Vec<Vec<Literal>>,
}

impl Formula {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_var(&mut self) -> Var {
        self.num_vars += 1;
        self.num_vars
    }

    pub fn num_vars(&self) -> Var {
        self.num_vars
    }

    /// Allocate a selector variable
    pub fn new_selector(&mut self) -> Var {
        let selector = self.new_var();
        self.selectors.push(selector);
        selector
    }

    /// Add a clause; tautologies are dropped. An empty clause makes the formula unsatisfiable.
    pub fn add_clause(&mut self, literals: Vec<Literal>, rule_type: RuleType) {
        let mut rule = Rule::new(literals, rule_type);
        if rule.normalize() {
            return;
        }
        self.rules.add(rule);
    }

    /// Add a clause that only applies while `selector` is enabled
    pub fn add_guarded(&mut self, mut literals: Vec<Literal>, rule_type: RuleType, selector: Var) {
        literals.push(-(selector as Literal));
        let mut rule = Rule::new(literals, rule_type).with_selector(selector);
        if rule.normalize() {
            return;
        }
        self.rules.add(rule);
    }

    /// `source -> target`
    pub fn implies(&mut self, source: Literal, target: Literal, rule_type: RuleType) {
        self.add_clause(vec![-source, target], rule_type);
    }

    /// `source -> (t1 | t2 | ...)`
    pub fn implies_any(&mut self, source: Literal, targets: &[Literal], rule_type: RuleType) {
        let mut literals = vec![-source];
        literals.extend_from_slice(targets);
        self.add_clause(literals, rule_type);
    }

    /// At most one of `literals` holds
    pub fn at_most_one(&mut self, literals: &[Literal], rule_type: RuleType) {
        if literals.len() <= 1 {
            return;
        }
        if literals.len() <= PAIRWISE_LIMIT {
            for (i, &a) in literals.iter().enumerate() {
                for &b in &literals[i + 1..] {
                    self.add_clause(vec![-a, -b], rule_type);
                }
            }
            return;
        }

        // Sequential counter: s_i means "one of literals[..=i] holds"
        let mut previous: Option<Literal> = None;
        for (i, &lit) in literals.iter().enumerate() {
            let last = i + 1 == literals.len();
            if let Some(prev) = previous {
                self.add_clause(vec![-lit, -prev], rule_type);
            }
            if last {
                break;
            }
            let counter = self.new_var() as Literal;
            self.add_clause(vec![-lit, counter], rule_type);
            if let Some(prev) = previous {
                self.add_clause(vec![-prev, counter], rule_type);
            }
            previous = Some(counter);
        }
    }

    /// Exactly one of `literals` holds, given `guard` (or unconditionally)
    pub fn exactly_one(&mut self, guard: Option<Literal>, literals: &[Literal], rule_type: RuleType) {
        let mut at_least = literals.to_vec();
        if let Some(guard) = guard {
            at_least.push(-guard);
        }
        self.add_clause(at_least, rule_type);
        self.at_most_one(literals, rule_type);
    }

    /// `x <-> (l1 & l2 & ...)`
    pub fn define_and(&mut self, x: Literal, literals: &[Literal], rule_type: RuleType) {
        let mut back = vec![x];
        for &lit in literals {
            self.add_clause(vec![-x, lit], rule_type);
            back.push(-lit);
        }
        self.add_clause(back, rule_type);
    }

    /// `x <-> (l1 | l2 | ...)`
    pub fn define_or(&mut self, x: Literal, literals: &[Literal], rule_type: RuleType) {
        let mut forth = vec![-x];
        for &lit in literals {
            self.add_clause(vec![-lit, x], rule_type);
            forth.push(lit);
        }
        self.add_clause(forth, rule_type);
    }

    /// Append a criterion; earlier criteria take priority
    pub fn add_criterion(&mut self, name: impl Into<String>, terms: Vec<(Literal, u64)>) {
        let terms = terms.into_iter().filter(|(_, w)| *w > 0).collect();
        self.criteria.push(Criterion {
            name: name.into(),
            terms,
        });
    }

    pub fn add_hint(&mut self, hint: BranchHint) {
        self.hints.push(hint);
    }

    /// Append a group to the canonical tie-break order.
    ///
    /// Among models that are optimal for every criterion, the solver makes
    /// the earliest literal of each group true that it can, earlier groups
    /// first. Groups usually list the choices of one exactly-one set.
    pub fn add_tie_break(&mut self, group: Vec<Literal>) {
        if !group.is_empty() {
            self.tie_break.push(group);
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn selectors(&self) -> &[Var] {
        &self.selectors
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn hints(&self) -> &[BranchHint] {
        &self.hints
    }

    pub fn tie_break(&self) -> &[Vec<Literal>] {
        &self.tie_break
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tautologies_are_dropped() {
        let mut formula = Formula::new();
        let a = formula.new_var() as Literal;
        formula.add_clause(vec![a, -a], RuleType::Package);
        assert!(formula.rules().is_empty());
    }

    #[test]
    fn test_guarded_clause_records_selector() {
        let mut formula = Formula::new();
        let a = formula.new_var() as Literal;
        let sel = formula.new_selector();
        formula.add_guarded(vec![a], RuleType::Request, sel);

        let rule = formula.rules().get(0).unwrap();
        assert_eq!(rule.selector(), Some(sel));
        assert_eq!(rule.literals(), &[a, -(sel as Literal)]);
        assert_eq!(formula.selectors(), &[sel]);
    }

    #[test]
    fn test_pairwise_at_most_one() {
        let mut formula = Formula::new();
        let lits: Vec<Literal> = (0..3).map(|_| formula.new_var() as Literal).collect();
        formula.at_most_one(&lits, RuleType::Definition);
        assert_eq!(formula.rules().len(), 3);
    }

    #[test]
    fn test_sequential_at_most_one_adds_counters() {
        let mut formula = Formula::new();
        let lits: Vec<Literal> = (0..12).map(|_| formula.new_var() as Literal).collect();
        formula.at_most_one(&lits, RuleType::Definition);
        assert_eq!(formula.num_vars(), 12 + 11);
    }

    #[test]
    fn test_criterion_cost() {
        let criterion = Criterion {
            name: "test".to_string(),
            terms: vec![(1, 3), (-2, 5), (3, 7)],
        };
        // var 1 true, var 2 false, var 3 false
        let model = vec![false, true, false, false];
        assert_eq!(criterion.cost(&model), 8);
    }

    #[test]
    fn test_zero_weights_are_dropped() {
        let mut formula = Formula::new();
        formula.add_criterion("c", vec![(1, 0), (2, 4)]);
        assert_eq!(formula.criteria()[0].terms, vec![(2, 4)]);
    }
}
