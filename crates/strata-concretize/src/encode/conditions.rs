//! Literals for conditions and single constraints on a package

use super::Encoder;
use crate::error::{ConcretizeError, Result};
use crate::solver::Literal;
use crate::spec::{Condition, SpecConstraint};

impl Encoder<'_> {
    /// A literal true exactly when `package` is in the DAG and meets `condition`.
    ///
    /// Literals are memoized per package and condition.
    pub(crate) fn condition_lit(
        &mut self,
        package: &str,
        condition: &Condition,
        requested_by: &str,
    ) -> Result<Literal> {
        let node = self.node_lit(package);
        if condition.is_always() {
            return Ok(node);
        }

        let key = (package.to_string(), format!("{:?}", condition.constraints));
        if let Some(&lit) = self.conditions.get(&key) {
            return Ok(lit);
        }

        let mut parts = vec![node];
        for constraint in &condition.constraints {
            parts.push(self.constraint_lit(package, constraint, requested_by)?);
        }
        let lit = self.all_of(parts);
        self.conditions.insert(key, lit);
        Ok(lit)
    }

    /// A literal true when `package` meets a single constraint.
    ///
    /// Each such literal implies the package is in the DAG. Values outside
    /// the package's domain give the false literal; an undeclared variant is
    /// an `UnknownVariant` error blamed on `requested_by`.
    pub(crate) fn constraint_lit(
        &mut self,
        package: &str,
        constraint: &SpecConstraint,
        requested_by: &str,
    ) -> Result<Literal> {
        if let SpecConstraint::DependsOn(dependency) = constraint {
            let lit = if self.closure.is_virtual(dependency) {
                self.needs_virtual_lit(package, dependency)
            } else if self.closure.contains(dependency) {
                self.depends_lit(package, dependency)
            } else {
                self.false_lit
            };
            return Ok(lit);
        }

        let Some(domain) = self.domains.get(package) else {
            return Ok(self.false_lit);
        };

        match constraint {
            SpecConstraint::Version(versions) => {
                let indices: Vec<usize> = domain
                    .versions
                    .iter()
                    .enumerate()
                    .filter(|(_, choice)| versions.contains(&choice.version))
                    .map(|(i, _)| i)
                    .collect();
                let lits = indices.into_iter().map(|i| self.version_lit(package, i)).collect();
                Ok(self.any_of(lits))
            }
            SpecConstraint::Variant { name, value } => {
                let Some(variant) = domain.variants.get(name) else {
                    return Err(ConcretizeError::UnknownVariant {
                        package: package.to_string(),
                        variant: name.clone(),
                        requested_by: requested_by.to_string(),
                    });
                };
                let known: Vec<(String, bool)> = value
                    .values()
                    .into_iter()
                    .map(|v| {
                        let in_domain = variant.values.contains(&v);
                        (v, in_domain)
                    })
                    .collect();
                let mut lits = Vec::new();
                for (value, in_domain) in known {
                    if in_domain {
                        lits.push(self.value_lit(package, name, &value));
                    } else {
                        lits.push(self.false_lit);
                    }
                }
                Ok(self.all_of(lits))
            }
            SpecConstraint::Compiler(compiler) => {
                let indices: Vec<usize> = self
                    .config
                    .compilers
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| compiler.matches(c))
                    .map(|(i, _)| i)
                    .collect();
                let lits = indices.into_iter().map(|i| self.compiler_lit(package, i)).collect();
                Ok(self.any_of(lits))
            }
            SpecConstraint::Arch(arch) => {
                let indices: Vec<usize> = self
                    .config
                    .targets
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| arch.matches(t))
                    .map(|(i, _)| i)
                    .collect();
                let lits = indices.into_iter().map(|i| self.target_lit(package, i)).collect();
                Ok(self.any_of(lits))
            }
            SpecConstraint::DependsOn(_) => Ok(self.false_lit),
        }
    }
}
