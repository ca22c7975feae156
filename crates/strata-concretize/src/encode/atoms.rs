use std::collections::HashMap;

use crate::solver::{Formula, Literal, Model, Var};
use crate::spec::DepTypes;

/// A named fact about a candidate DAG, backed by one solver variable
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Atom {
    /// The package is part of the DAG
    Node(String),
    /// The package takes the version at this index of its domain
    Version(String, usize),
    /// A variant of the package holds this value
    VariantValue {
        package: String,
        variant: String,
        value: String,
    },
    /// The variant exists on the package
    Active(String, String),
    /// The package is built with the configured compiler at this index
    Compiler(String, usize),
    /// The package uses the configured target at this index
    Target(String, usize),
    /// Every node of the DAG runs on this platform
    Platform(String),
    /// The package is neither external nor reused
    Built(String),
    External(String),
    /// The package is bound to the reuse candidate at this index
    Reuse(String, usize),
    ReusedAny(String),
    /// Some edge links the first package to the second
    Depends(String, String),
    /// An edge of one dependency type (a single flag)
    DepType(String, String, DepTypes),
    /// The package has an active dependency on a virtual
    NeedsVirtual(String, String),
    /// Some node needs the virtual
    VirtualNeeded(String),
    /// The virtual is provided by this package
    Provider(String, String),
    /// The second package is reachable from the first (cyclic components only)
    Reach(String, String),
    /// The package belongs to the DAG under this root
    InDag(String, String),
}

/// Interning table from atoms to solver variables
#[derive(Debug, Clone, Default)]
pub struct AtomTable {
    vars: HashMap<Atom, Var>,
}

impl AtomTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The variable for `atom`, allocated on first use
    pub fn intern(&mut self, formula: &mut Formula, atom: Atom) -> Literal {
        *self.vars.entry(atom).or_insert_with(|| formula.new_var()) as Literal
    }

    pub fn get(&self, atom: &Atom) -> Option<Literal> {
        self.vars.get(atom).map(|&var| var as Literal)
    }

    /// Whether the atom is true in a model; atoms never allocated are false
    pub fn holds(&self, model: &Model, atom: &Atom) -> bool {
        self.get(atom).is_some_and(|lit| model.holds(lit))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
