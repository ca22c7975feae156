use super::rule::{var_of, Literal, Var};

/// Why a literal was assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// Unit propagation through the rule with this ID
    Rule(u32),
    /// Propagation by the objective bound with this index
    Bound(u32),
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    value: bool,
    level: u32,
    reason: Option<Reason>,
    position: u32,
}

/// The assignment trail of a search.
///
/// Literals are appended in assignment order. Each decision opens a level;
/// backtracking pops whole levels off the end of the trail. Level 0 holds
/// what is true regardless of any decision.
#[derive(Debug, Default)]
pub struct Decisions {
    /// Indexed by variable
    slots: Vec<Option<Slot>>,
    trail: Vec<Literal>,
    /// Trail length when each level above 0 was opened
    level_starts: Vec<usize>,
}

impl Decisions {
    /// Room for variables `1..=num_vars`
    pub fn with_capacity(num_vars: Var) -> Self {
        let slots = num_vars as usize + 1;
        Self {
            slots: vec![None; slots],
            trail: Vec::with_capacity(slots),
            level_starts: Vec::new(),
        }
    }

    #[inline]
    pub fn level(&self) -> u32 {
        self.level_starts.len() as u32
    }

    #[inline]
    pub fn new_level(&mut self) {
        self.level_starts.push(self.trail.len());
    }

    /// Make `literal` true at the current level.
    ///
    /// Assigning an already true literal is a no-op; returns false when the
    /// literal is already false.
    pub fn assign(&mut self, literal: Literal, reason: Option<Reason>) -> bool {
        let var = var_of(literal) as usize;
        if let Some(slot) = self.slots[var] {
            return slot.value == (literal > 0);
        }
        self.slots[var] = Some(Slot {
            value: literal > 0,
            level: self.level(),
            reason,
            position: self.trail.len() as u32,
        });
        self.trail.push(literal);
        true
    }

    /// Truth value of a literal, `None` when its variable is open
    #[inline]
    pub fn value(&self, literal: Literal) -> Option<bool> {
        self.slots[var_of(literal) as usize].map(|slot| slot.value == (literal > 0))
    }

    #[inline]
    pub fn is_true(&self, literal: Literal) -> bool {
        self.value(literal) == Some(true)
    }

    #[inline]
    pub fn undecided(&self, var: Var) -> bool {
        self.slots[var as usize].is_none()
    }

    #[inline]
    pub fn decision_level(&self, var: Var) -> Option<u32> {
        self.slots[var as usize].map(|slot| slot.level)
    }

    pub fn reason(&self, var: Var) -> Option<Reason> {
        self.slots[var as usize].and_then(|slot| slot.reason)
    }

    /// Trail position of an assigned variable
    pub fn position(&self, var: Var) -> usize {
        self.slots[var as usize].map_or(0, |slot| slot.position as usize)
    }

    /// Literals assigned above `level`, oldest first
    pub fn above_level(&self, level: u32) -> &[Literal] {
        match self.level_starts.get(level as usize) {
            Some(&start) => &self.trail[start..],
            None => &[],
        }
    }

    /// Undo every level above `level`
    pub fn backtrack(&mut self, level: u32) {
        let Some(&start) = self.level_starts.get(level as usize) else {
            return;
        };
        for literal in self.trail.drain(start..) {
            self.slots[var_of(literal) as usize] = None;
        }
        self.level_starts.truncate(level as usize);
    }

    pub fn trail(&self) -> &[Literal] {
        &self.trail
    }

    pub fn len(&self) -> usize {
        self.trail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trail.is_empty()
    }

    /// The assignment indexed by variable; open variables read as false
    pub fn model(&self) -> Vec<bool> {
        self.slots
            .iter()
            .map(|slot| slot.is_some_and(|s| s.value))
            .collect()
    }
}
