use log::trace;

use super::cancel::CancelToken;
use super::decisions::{Decisions, Reason};
use super::formula::Formula;
use super::policy::Policy;
use super::rule::{literal_index, var_of, Literal, Rule, Var};
use super::rule_set::RuleSet;
use super::watch_graph::{Implied, WatchGraph};
use crate::error::Result;

/// Cancellation is polled every this many conflicts or decisions
const CANCEL_CHECK_INTERVAL: u64 = 256;

/// `sum(weight of true literals) <= limit`
#[derive(Debug, Clone)]
struct Bound {
    /// Sorted by descending weight
    terms: Vec<(Literal, u64)>,
    limit: u64,
}

/// Result of one search
#[derive(Debug)]
pub(crate) enum SearchResult {
    /// Satisfying assignment indexed by variable
    Sat(Vec<bool>),
    /// Assumption literals that together cannot hold
    Unsat(Vec<Literal>),
}

/// Position to roll back to when temporary bounds are released
#[derive(Debug, Clone, Copy)]
pub(crate) struct Mark {
    rules: u32,
    bounds: usize,
}

/// CDCL search over a formula plus a stack of objective bounds.
///
/// Every call to [`Sat::solve`] starts from a clean assignment; learned
/// rules persist between calls until they are released with the bound
/// they may depend on.
pub(crate) struct Sat {
    num_vars: Var,
    rules: RuleSet,
    bounds: Vec<Bound>,
    policy: Policy,

    decisions: Decisions,
    watches: WatchGraph,
    /// Current weight of true literals per bound
    sums: Vec<u64>,
    /// Literal index -> (bound, weight) for every bound term
    occurrences: Vec<Vec<(u32, u64)>>,
    propagate_index: usize,

    conflicts: u64,
    steps: u64,
}

impl Sat {
    pub fn new(formula: &Formula) -> Self {
        let num_vars = formula.num_vars();
        Self {
            num_vars,
            rules: formula.rules().clone(),
            bounds: Vec::new(),
            policy: Policy::new(formula.hints().to_vec()),
            decisions: Decisions::with_capacity(num_vars),
            watches: WatchGraph::with_capacity(num_vars),
            sums: Vec::new(),
            occurrences: Vec::new(),
            propagate_index: 0,
            conflicts: 0,
            steps: 0,
        }
    }

    pub fn conflicts(&self) -> u64 {
        self.conflicts
    }

    pub fn mark(&self) -> Mark {
        Mark {
            rules: self.rules.next_id(),
            bounds: self.bounds.len(),
        }
    }

    /// Drop bounds pushed after `mark` and every rule learned since
    pub fn release(&mut self, mark: Mark) {
        self.bounds.truncate(mark.bounds);
        let retired = self.rules.retire_derived_from(mark.rules);
        trace!("released bounds back to {}, retired {} learned rules", mark.bounds, retired);
    }

    pub fn push_bound(&mut self, terms: &[(Literal, u64)], limit: u64) {
        let mut terms = terms.to_vec();
        terms.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        self.bounds.push(Bound { terms, limit });
    }

    /// Search for a model in which every assumption holds
    pub fn solve(&mut self, assumptions: &[Literal], cancel: &CancelToken) -> Result<SearchResult> {
        if self.rules.iter().any(|r| !r.is_disabled() && r.is_empty()) {
            return Ok(SearchResult::Unsat(Vec::new()));
        }
        if self.reset().is_some() || self.propagate().is_some() {
            return Ok(SearchResult::Unsat(Vec::new()));
        }

        loop {
            if let Some(conflict) = self.propagate() {
                self.conflicts += 1;
                if self.conflicts % CANCEL_CHECK_INTERVAL == 0 {
                    cancel.check()?;
                }

                let conflict_level = self.max_level(&conflict);
                if conflict_level == 0 {
                    return Ok(SearchResult::Unsat(Vec::new()));
                }
                if conflict_level < self.decisions.level() {
                    self.backtrack(conflict_level);
                }

                let (learned, backjump_level) = self.analyze(&conflict);
                if learned.is_empty() {
                    return Ok(SearchResult::Unsat(Vec::new()));
                }
                self.backtrack(backjump_level);
                self.learn(learned);
                continue;
            }

            self.steps += 1;
            if self.steps % CANCEL_CHECK_INTERVAL == 0 {
                cancel.check()?;
            }

            let level = self.decisions.level() as usize;
            if let Some(&assumption) = assumptions.get(level) {
                match self.decisions.value(assumption) {
                    Some(true) => self.decisions.new_level(),
                    Some(false) => {
                        return Ok(SearchResult::Unsat(self.analyze_final(assumption)));
                    }
                    None => {
                        self.decisions.new_level();
                        self.assign(assumption, None);
                    }
                }
                continue;
            }

            match self.policy.select(&self.decisions, self.num_vars) {
                Some(literal) => {
                    self.decisions.new_level();
                    self.assign(literal, None);
                }
                None => return Ok(SearchResult::Sat(self.decisions.model())),
            }
        }
    }

    /// Clear the assignment, rebuild watches and assert level-0 facts.
    /// Returns a conflict if the facts already contradict each other.
    fn reset(&mut self) -> Option<Vec<Literal>> {
        self.decisions = Decisions::with_capacity(self.num_vars);
        self.watches = WatchGraph::from_rules(&self.rules, self.num_vars);
        self.propagate_index = 0;
        self.policy.restart();

        self.sums = vec![0; self.bounds.len()];
        self.occurrences = vec![Vec::new(); (self.num_vars as usize + 1) * 2];
        for (index, bound) in self.bounds.iter().enumerate() {
            for &(literal, weight) in &bound.terms {
                self.occurrences[literal_index(literal)].push((index as u32, weight));
            }
        }

        let facts: Vec<(Literal, u32)> = self
            .rules
            .units()
            .map(|rule| (rule.literals()[0], rule.id()))
            .collect();
        for (literal, rule_id) in facts {
            if !self.assign(literal, Some(Reason::Rule(rule_id))) {
                return Some(vec![literal]);
            }
        }

        for index in 0..self.bounds.len() {
            if let Some(conflict) = self.enforce_bound(index as u32) {
                return Some(conflict);
            }
        }
        None
    }

    fn assign(&mut self, literal: Literal, reason: Option<Reason>) -> bool {
        if let Some(value) = self.decisions.value(literal) {
            return value;
        }
        self.decisions.assign(literal, reason);
        for &(bound, weight) in &self.occurrences[literal_index(literal)] {
            self.sums[bound as usize] += weight;
        }
        true
    }

    fn backtrack(&mut self, level: u32) {
        for &literal in self.decisions.above_level(level) {
            for &(bound, weight) in &self.occurrences[literal_index(literal)] {
                self.sums[bound as usize] -= weight;
            }
        }
        self.decisions.backtrack(level);
        self.propagate_index = self.decisions.len();
        self.policy.restart();
    }

    /// Propagate everything on the trail; returns a falsified clause on conflict
    fn propagate(&mut self) -> Option<Vec<Literal>> {
        while self.propagate_index < self.decisions.len() {
            let literal = self.decisions.trail()[self.propagate_index];
            self.propagate_index += 1;

            let decisions = &self.decisions;
            let implied = self
                .watches
                .visit(&self.rules, literal, |l| decisions.value(l));

            for consequence in implied {
                match consequence {
                    Implied::Unit { literal: unit, rule } => {
                        if !self.assign(unit, Some(Reason::Rule(rule))) {
                            return Some(self.rule_literals(rule));
                        }
                    }
                    Implied::Conflict { rule } => return Some(self.rule_literals(rule)),
                }
            }

            let touched: Vec<u32> = self.occurrences[literal_index(literal)]
                .iter()
                .map(|&(bound, _)| bound)
                .collect();
            for bound in touched {
                if let Some(conflict) = self.enforce_bound(bound) {
                    return Some(conflict);
                }
            }
        }
        None
    }

    /// Detect a violated bound or force off every open term that no longer fits
    fn enforce_bound(&mut self, index: u32) -> Option<Vec<Literal>> {
        let bound = &self.bounds[index as usize];
        let sum = self.sums[index as usize];
        if sum > bound.limit {
            return Some(self.bound_conflict(index));
        }

        let slack = bound.limit - sum;
        let forced: Vec<Literal> = bound
            .terms
            .iter()
            .take_while(|(_, weight)| *weight > slack)
            .filter(|(lit, _)| self.decisions.value(*lit).is_none())
            .map(|(lit, _)| -lit)
            .collect();
        for literal in forced {
            if !self.assign(literal, Some(Reason::Bound(index))) {
                return Some(self.bound_conflict(index));
            }
        }
        None
    }

    fn rule_literals(&self, rule_id: u32) -> Vec<Literal> {
        self.rules
            .get(rule_id)
            .map(|rule| rule.literals().to_vec())
            .unwrap_or_default()
    }

    /// Negation of every true term of a bound
    fn bound_conflict(&self, index: u32) -> Vec<Literal> {
        self.bounds[index as usize]
            .terms
            .iter()
            .filter(|(lit, _)| self.decisions.is_true(*lit))
            .map(|(lit, _)| -lit)
            .collect()
    }

    /// The clause that forced `var`, with the forced literal included
    fn reason_clause(&self, var: Var) -> Option<Vec<Literal>> {
        match self.decisions.reason(var)? {
            Reason::Rule(rule_id) => Some(self.rule_literals(rule_id)),
            Reason::Bound(index) => {
                let position = self.decisions.position(var);
                let forced = if self.decisions.is_true(var as Literal) {
                    var as Literal
                } else {
                    -(var as Literal)
                };
                let mut clause = vec![forced];
                clause.extend(
                    self.bounds[index as usize]
                        .terms
                        .iter()
                        .filter(|(lit, _)| {
                            self.decisions.is_true(*lit)
                                && self.decisions.position(var_of(*lit)) < position
                        })
                        .map(|(lit, _)| -lit),
                );
                Some(clause)
            }
        }
    }

    fn max_level(&self, clause: &[Literal]) -> u32 {
        clause
            .iter()
            .filter_map(|&lit| self.decisions.decision_level(var_of(lit)))
            .max()
            .unwrap_or(0)
    }

    /// First-UIP conflict analysis.
    ///
    /// Returns the learned clause, asserting literal first and the literal
    /// with the highest remaining level second, and the level to jump back to.
    fn analyze(&self, conflict: &[Literal]) -> (Vec<Literal>, u32) {
        let current_level = self.decisions.level();
        let mut seen = vec![false; self.num_vars as usize + 1];
        let mut learned: Vec<Literal> = vec![0];
        let mut open_at_current = 0usize;
        let mut index = self.decisions.len();
        let mut clause = conflict.to_vec();
        let mut pivot: Option<Var> = None;

        loop {
            for &lit in &clause {
                let var = var_of(lit);
                if Some(var) == pivot || seen[var as usize] {
                    continue;
                }
                let level = self.decisions.decision_level(var).unwrap_or(0);
                if level == 0 {
                    continue;
                }
                seen[var as usize] = true;
                if level == current_level {
                    open_at_current += 1;
                } else {
                    learned.push(lit);
                }
            }

            // Walk back to the most recent literal taking part in the conflict
            let mut uip = None;
            while index > 0 {
                index -= 1;
                let lit = self.decisions.trail()[index];
                if seen[var_of(lit) as usize] {
                    uip = Some(lit);
                    break;
                }
            }
            let Some(p) = uip else {
                break;
            };
            seen[var_of(p) as usize] = false;
            open_at_current = open_at_current.saturating_sub(1);

            if open_at_current == 0 {
                learned[0] = -p;
                break;
            }
            match self.reason_clause(var_of(p)) {
                Some(reason) => {
                    clause = reason;
                    pivot = Some(var_of(p));
                }
                None => {
                    learned[0] = -p;
                    break;
                }
            }
        }

        if learned[0] == 0 {
            learned.remove(0);
        }

        let mut backjump_level = 0;
        if learned.len() > 1 {
            let (best, level) = learned[1..]
                .iter()
                .enumerate()
                .map(|(i, &lit)| (i + 1, self.decisions.decision_level(var_of(lit)).unwrap_or(0)))
                .max_by_key(|&(_, level)| level)
                .unwrap_or((1, 0));
            learned.swap(1, best);
            backjump_level = level;
        }

        (learned, backjump_level)
    }

    /// Record a learned clause and assert its first literal
    fn learn(&mut self, learned: Vec<Literal>) {
        let Some(&asserting) = learned.first() else {
            return;
        };
        let rule_id = self.rules.add_derived(Rule::learned(learned.clone()));
        if learned.len() >= 2 {
            self.watches.watch(rule_id, learned[0], learned[1]);
        }
        self.assign(asserting, Some(Reason::Rule(rule_id)));
    }

    /// Which assumptions force `assumption` to be false
    fn analyze_final(&self, assumption: Literal) -> Vec<Literal> {
        let mut core = vec![assumption];
        let var = var_of(assumption);
        if self.decisions.decision_level(var) == Some(0) {
            return core;
        }

        let mut seen = vec![false; self.num_vars as usize + 1];
        seen[var as usize] = true;
        for &lit in self.decisions.above_level(0).iter().rev() {
            let v = var_of(lit);
            if !seen[v as usize] {
                continue;
            }
            match self.reason_clause(v) {
                None => core.push(lit),
                Some(reason) => {
                    for other in reason {
                        let ov = var_of(other);
                        if ov != v && self.decisions.decision_level(ov).unwrap_or(0) > 0 {
                            seen[ov as usize] = true;
                        }
                    }
                }
            }
        }
        core
    }
}
