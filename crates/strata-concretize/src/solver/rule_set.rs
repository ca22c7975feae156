use std::collections::HashMap;

use super::rule::{Literal, Rule, RuleType};

/// Clauses of a formula, addressed by sequential ID.
///
/// Compiled clauses are deduplicated on their literal set. Learned clauses
/// are appended as they come, so everything learned after a given ID can be
/// retired in one sweep.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    by_literals: HashMap<Vec<Literal>, u32>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a compiled clause, returning the ID of an identical live clause
    /// when there is one.
    pub fn add(&mut self, rule: Rule) -> u32 {
        let mut key = rule.literals().to_vec();
        key.sort_unstable();
        if let Some(&existing) = self.by_literals.get(&key) {
            if self.get(existing).is_some_and(|r| !r.is_disabled()) {
                return existing;
            }
        }

        let id = self.push(rule);
        self.by_literals.insert(key, id);
        id
    }

    pub fn add_derived(&mut self, rule: Rule) -> u32 {
        debug_assert!(rule.rule_type().is_derived());
        self.push(rule)
    }

    fn push(&mut self, mut rule: Rule) -> u32 {
        let id = self.rules.len() as u32;
        rule.set_id(id);
        self.rules.push(rule);
        id
    }

    pub fn get(&self, id: u32) -> Option<&Rule> {
        self.rules.get(id as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Live single-literal clauses
    pub fn units(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| r.is_unit() && !r.is_disabled())
    }

    pub fn next_id(&self) -> u32 {
        self.rules.len() as u32
    }

    /// Disable every derived rule with an ID of at least `first`.
    ///
    /// Learned rules created after an objective bound was added may depend
    /// on it, so they are retired together with the bound.
    pub fn retire_derived_from(&mut self, first: u32) -> usize {
        let mut retired = 0;
        for rule in self.rules.iter_mut().skip(first as usize) {
            if rule.rule_type().is_derived() && !rule.is_disabled() {
                rule.set_disabled(true);
                retired += 1;
            }
        }
        retired
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Clause counts by origin, for logging
    pub fn stats(&self) -> RuleSetStats {
        let mut stats = RuleSetStats {
            total: self.rules.len(),
            ..Default::default()
        };
        for rule in self.rules.iter().filter(|r| !r.is_disabled()) {
            let slot = match rule.rule_type() {
                RuleType::Definition => &mut stats.definition,
                RuleType::Request => &mut stats.request,
                RuleType::Package => &mut stats.package,
                RuleType::Reuse => &mut stats.reuse,
                RuleType::Learned => &mut stats.learned,
            };
            *slot += 1;
            if rule.is_unit() {
                stats.units += 1;
            }
        }
        stats
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSetStats {
    pub total: usize,
    pub units: usize,
    pub definition: usize,
    pub request: usize,
    pub package: usize,
    pub reuse: usize,
    pub learned: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_sequential() {
        let mut rules = RuleSet::new();
        let first = rules.add(Rule::assertion(1, RuleType::Request));
        let second = rules.add(Rule::requires(1, vec![2, 3], RuleType::Package));

        assert_eq!((first, second), (0, 1));
        assert_eq!(rules.next_id(), 2);
    }

    #[test]
    fn test_same_literals_share_an_id() {
        let mut rules = RuleSet::new();
        let a = rules.add(Rule::new(vec![1, 2, 3], RuleType::Package));
        let b = rules.add(Rule::new(vec![3, 1, 2], RuleType::Definition));

        assert_eq!(a, b);
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn test_learned_rules_are_kept_apart() {
        let mut rules = RuleSet::new();
        let a = rules.add_derived(Rule::learned(vec![1, 2]));
        let b = rules.add_derived(Rule::learned(vec![2, 1]));

        assert_ne!(a, b);
    }

    #[test]
    fn test_retire_only_touches_later_learned_rules() {
        let mut rules = RuleSet::new();
        rules.add(Rule::assertion(1, RuleType::Request));
        rules.add_derived(Rule::learned(vec![1, 2]));
        let mark = rules.next_id();
        rules.add(Rule::new(vec![2, 3], RuleType::Package));
        rules.add_derived(Rule::learned(vec![-2, -3]));
        rules.add_derived(Rule::learned(vec![4]));

        assert_eq!(rules.retire_derived_from(mark), 2);
        assert!(!rules.get(1).unwrap().is_disabled());
        assert!(!rules.get(2).unwrap().is_disabled());
        assert!(rules.get(3).unwrap().is_disabled());
        assert!(rules.get(4).unwrap().is_disabled());
        // the retired unit no longer counts
        assert_eq!(rules.units().count(), 1);
    }

    #[test]
    fn test_stats_skip_retired_rules() {
        let mut rules = RuleSet::new();
        rules.add(Rule::assertion(1, RuleType::Request));
        rules.add(Rule::requires(1, vec![2, 3], RuleType::Package));
        rules.add(Rule::conflict(vec![2, 3], RuleType::Package));
        rules.add_derived(Rule::learned(vec![-1, 4]));
        rules.retire_derived_from(0);

        let stats = rules.stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.units, 1);
        assert_eq!(stats.request, 1);
        assert_eq!(stats.package, 2);
        assert_eq!(stats.learned, 0);
    }
}
