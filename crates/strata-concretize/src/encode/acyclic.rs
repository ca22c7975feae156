//! Cycle exclusion over the possible-dependency graph.
//!
//! Only packages in a strongly connected component of the closure can form
//! a cycle, so reachability atoms are created for those alone.

use log::debug;

use super::{Atom, Encoder};
use crate::solver::RuleType;

impl Encoder<'_> {
    pub(super) fn add_acyclic_rules(&mut self) {
        let components = self.closure.cyclic_components();
        if components.is_empty() {
            return;
        }
        debug!("Excluding cycles in {} components", components.len());

        for component in components {
            let edges: Vec<(String, String)> = component
                .iter()
                .flat_map(|p| component.iter().map(move |q| (p.clone(), q.clone())))
                .filter(|(p, q)| self.closure.has_edge(p, q))
                .collect();

            for (p, q) in &edges {
                let depends = self.depends_lit(p, q);
                let reach = self.atom(Atom::Reach(p.clone(), q.clone()));
                self.formula.implies(depends, reach, RuleType::Definition);
            }
            // Reach(a, p) and Depends(p, q) give Reach(a, q)
            for a in &component {
                for (p, q) in &edges {
                    let from = self.atom(Atom::Reach(a.clone(), p.clone()));
                    let step = self.depends_lit(p, q);
                    let to = self.atom(Atom::Reach(a.clone(), q.clone()));
                    self.formula
                        .add_clause(vec![-from, -step, to], RuleType::Definition);
                }
            }
            for p in &component {
                let reach = self.atom(Atom::Reach(p.clone(), p.clone()));
                self.formula.add_clause(vec![-reach], RuleType::Definition);
            }
        }
    }
}
