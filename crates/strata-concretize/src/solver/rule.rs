use std::fmt;

/// A propositional variable, numbered from 1
pub type Var = u32;

/// Positive when the variable is true, negative when it is false
pub type Literal = i32;

#[inline]
pub fn var_of(literal: Literal) -> Var {
    literal.unsigned_abs()
}

/// Dense index of a literal: `2v` for `v`, `2v + 1` for `-v`
#[inline]
pub(crate) fn literal_index(literal: Literal) -> usize {
    let var = var_of(literal) as usize;
    if literal > 0 {
        var * 2
    } else {
        var * 2 + 1
    }
}

/// Where a clause came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleType {
    /// Exactly-one choices and gate definitions
    Definition,
    /// The request or the configuration
    Request,
    /// Dependency, conflict, provider or variant rules of a package
    Package,
    /// Binding a node to an already-built spec
    Reuse,
    /// Learned by conflict analysis
    Learned,
}

impl RuleType {
    /// Rules derived during search rather than compiled from the problem
    pub fn is_derived(&self) -> bool {
        matches!(self, RuleType::Learned)
    }

    fn label(&self) -> &'static str {
        match self {
            RuleType::Definition => "definition",
            RuleType::Request => "request",
            RuleType::Package => "package",
            RuleType::Reuse => "reuse",
            RuleType::Learned => "learned",
        }
    }
}

/// A clause: satisfied once any of its literals is true.
///
/// Compiled clauses are normalized (sorted by variable, duplicates removed)
/// before they reach a [`RuleSet`](super::RuleSet), so two clauses over the
/// same literals compare equal by [`Rule::literals`].
#[derive(Clone)]
pub struct Rule {
    literals: Vec<Literal>,
    rule_type: RuleType,
    id: u32,
    selector: Option<Var>,
    disabled: bool,
}

impl Rule {
    pub fn new(literals: Vec<Literal>, rule_type: RuleType) -> Self {
        Self {
            literals,
            rule_type,
            id: 0,
            selector: None,
            disabled: false,
        }
    }

    pub fn assertion(literal: Literal, rule_type: RuleType) -> Self {
        Self::new(vec![literal], rule_type)
    }

    /// `source -> (t1 | t2 | ...)`
    pub fn requires(source: Literal, targets: Vec<Literal>, rule_type: RuleType) -> Self {
        let literals = std::iter::once(-source).chain(targets).collect();
        Self::new(literals, rule_type)
    }

    /// `!(l1 & l2 & ...)`
    pub fn conflict(literals: Vec<Literal>, rule_type: RuleType) -> Self {
        Self::new(literals.into_iter().map(|l| -l).collect(), rule_type)
    }

    pub fn learned(literals: Vec<Literal>) -> Self {
        Self::new(literals, RuleType::Learned)
    }

    /// Tie the clause to an explanation selector
    pub fn with_selector(mut self, selector: Var) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Sort by variable and drop repeated literals. Returns true when the
    /// clause mentions a variable in both polarities and is always satisfied.
    pub fn normalize(&mut self) -> bool {
        self.literals.sort_by_key(|l| (var_of(*l), *l));
        self.literals.dedup();
        self.literals
            .windows(2)
            .any(|pair| var_of(pair[0]) == var_of(pair[1]))
    }

    pub(crate) fn set_id(&mut self, id: u32) {
        self.id = id;
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn rule_type(&self) -> RuleType {
        self.rule_type
    }

    pub fn selector(&self) -> Option<Var> {
        self.selector
    }

    pub fn literals(&self) -> &[Literal] {
        &self.literals
    }

    pub fn is_unit(&self) -> bool {
        self.literals.len() == 1
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub(crate) fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("type", &self.rule_type)
            .field("literals", &self.literals)
            .finish()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) [", self.rule_type.label())?;
        for (i, literal) in self.literals.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{:+}", literal)?;
        }
        write!(f, "]")
    }
}
