use super::decisions::Decisions;
use super::rule::{var_of, Literal, Var};

/// A preferred decision: once `guard` holds (or always, without a guard),
/// try `literal` before anything else that comes later in the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchHint {
    pub guard: Option<Literal>,
    pub literal: Literal,
}

impl BranchHint {
    pub fn new(literal: Literal) -> Self {
        Self { guard: None, literal }
    }

    pub fn when(guard: Literal, literal: Literal) -> Self {
        Self {
            guard: Some(guard),
            literal,
        }
    }
}

/// Deterministic branching policy.
///
/// Hints are scanned in order; the first one whose guard holds and whose
/// variable is still open is decided. Without an applicable hint the
/// lowest open variable is decided false, which keeps models small.
#[derive(Debug)]
pub struct Policy {
    hints: Vec<BranchHint>,
    /// Every variable below the cursor is known to be decided
    cursor: Var,
}

impl Policy {
    pub fn new(hints: Vec<BranchHint>) -> Self {
        Self { hints, cursor: 1 }
    }

    /// Forget the scan position; needed after any backtrack
    pub fn restart(&mut self) {
        self.cursor = 1;
    }

    /// Pick the next literal to decide, or `None` when every variable is assigned
    pub fn select(&mut self, decisions: &Decisions, num_vars: Var) -> Option<Literal> {
        for hint in &self.hints {
            if let Some(guard) = hint.guard {
                if !decisions.is_true(guard) {
                    continue;
                }
            }
            if decisions.undecided(var_of(hint.literal)) {
                return Some(hint.literal);
            }
        }

        while self.cursor <= num_vars {
            if decisions.undecided(self.cursor) {
                return Some(-(self.cursor as Literal));
            }
            self.cursor += 1;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hints_take_priority() {
        let decisions = Decisions::with_capacity(3);
        let mut policy = Policy::new(vec![BranchHint::new(3)]);
        assert_eq!(policy.select(&decisions, 3), Some(3));
    }

    #[test]
    fn test_guarded_hint_waits_for_guard() {
        let mut decisions = Decisions::with_capacity(3);
        let mut policy = Policy::new(vec![BranchHint::when(1, 3)]);

        assert_eq!(policy.select(&decisions, 3), Some(-1));

        decisions.assign(1, None);
        assert_eq!(policy.select(&decisions, 3), Some(3));
    }

    #[test]
    fn test_fallback_decides_false_and_finishes() {
        let mut decisions = Decisions::with_capacity(2);
        let mut policy = Policy::new(Vec::new());

        assert_eq!(policy.select(&decisions, 2), Some(-1));
        decisions.assign(-1, None);
        assert_eq!(policy.select(&decisions, 2), Some(-2));
        decisions.assign(2, None);
        assert_eq!(policy.select(&decisions, 2), None);

        decisions.backtrack(0);
        policy.restart();
        assert_eq!(policy.select(&decisions, 2), None);
    }
}
