use super::rule::{literal_index, Literal, Var};
use super::rule_set::RuleSet;

/// Consequence of a literal becoming true
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Implied {
    /// Every other literal of the rule is false, so `literal` must hold
    Unit { literal: Literal, rule: u32 },
    /// Every literal of the rule is false
    Conflict { rule: u32 },
}

#[derive(Debug, Clone, Copy)]
struct Watch {
    rule: u32,
    /// The rule's other watched literal at the time the watch was placed;
    /// if it is true the rule is skipped without being loaded
    blocker: Literal,
}

/// Two-watched-literal index over the clauses of a [`RuleSet`].
///
/// A clause with at least two literals keeps two of them under watch. The
/// clause only needs attention when one of those becomes false: then another
/// non-false literal takes its place, or the clause has become unit or
/// falsified. Unit clauses are asserted directly by the search.
#[derive(Debug, Default)]
pub(crate) struct WatchGraph {
    /// Indexed by [`literal_index`] of the watched literal
    lists: Vec<Vec<Watch>>,
    /// Indexed by rule ID
    pairs: Vec<[Literal; 2]>,
}

impl WatchGraph {
    pub fn with_capacity(num_vars: Var) -> Self {
        Self {
            lists: vec![Vec::new(); (num_vars as usize + 1) * 2],
            pairs: Vec::new(),
        }
    }

    /// Watch the first two literals of every live clause
    pub fn from_rules(rules: &RuleSet, num_vars: Var) -> Self {
        let mut graph = Self::with_capacity(num_vars);
        for rule in rules.iter().filter(|r| !r.is_disabled() && r.len() >= 2) {
            let literals = rule.literals();
            graph.watch(rule.id(), literals[0], literals[1]);
        }
        graph
    }

    fn list_mut(&mut self, literal: Literal) -> &mut Vec<Watch> {
        let index = literal_index(literal);
        if index >= self.lists.len() {
            self.lists.resize_with(index + 1, Vec::new);
        }
        &mut self.lists[index]
    }

    #[cfg(test)]
    fn watching(&self, literal: Literal) -> usize {
        self.lists.get(literal_index(literal)).map_or(0, Vec::len)
    }

    pub fn watch(&mut self, rule: u32, first: Literal, second: Literal) {
        let slot = rule as usize;
        if slot >= self.pairs.len() {
            self.pairs.resize(slot + 1, [0, 0]);
        }
        self.pairs[slot] = [first, second];
        self.list_mut(first).push(Watch { rule, blocker: second });
        self.list_mut(second).push(Watch { rule, blocker: first });
    }

    /// Visit the clauses watching `-literal` after `literal` became true.
    ///
    /// `value` reports the current assignment of a literal, `None` while it
    /// is open. Watches are moved as needed; the returned list holds the
    /// units and conflicts found, in watch order.
    pub fn visit<F>(&mut self, rules: &RuleSet, literal: Literal, value: F) -> Vec<Implied>
    where
        F: Fn(Literal) -> Option<bool>,
    {
        let falsified = -literal;
        let pending = std::mem::take(self.list_mut(falsified));
        let mut remaining = Vec::with_capacity(pending.len());
        let mut implied = Vec::new();

        for watch in pending {
            let Some(rule) = rules.get(watch.rule).filter(|r| !r.is_disabled()) else {
                continue;
            };
            if value(watch.blocker) == Some(true) {
                remaining.push(watch);
                continue;
            }

            let [a, b] = self.pairs[watch.rule as usize];
            let partner = if a == falsified { b } else { a };
            let partner_value = value(partner);
            if partner_value == Some(true) {
                remaining.push(Watch {
                    rule: watch.rule,
                    blocker: partner,
                });
                continue;
            }

            let free = rule
                .literals()
                .iter()
                .copied()
                .find(|&l| l != a && l != b && value(l) != Some(false));
            match free {
                Some(next) => {
                    self.pairs[watch.rule as usize] = [partner, next];
                    self.list_mut(next).push(Watch {
                        rule: watch.rule,
                        blocker: partner,
                    });
                }
                None => {
                    remaining.push(watch);
                    implied.push(match partner_value {
                        None => Implied::Unit {
                            literal: partner,
                            rule: watch.rule,
                        },
                        Some(_) => Implied::Conflict { rule: watch.rule },
                    });
                }
            }
        }

        // watches added to this list while visiting stay after the kept ones
        let list = self.list_mut(falsified);
        remaining.append(list);
        *list = remaining;

        implied
    }
}
