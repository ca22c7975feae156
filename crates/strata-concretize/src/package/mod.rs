//! Package facts and the providers that supply them
//!
//! Recipes are evaluated elsewhere; the concretizer only sees their
//! materialized [`PackageFacts`]: versions, variants, dependencies,
//! conflicts and the virtuals a package provides.

mod cache;
mod closure;
mod facts;
mod provider;

pub use cache::FactsCache;
pub use closure::{possible_dependencies, PossibleDependencies};
pub use facts::{
    AllowedValues, ConflictDecl, DependencyDecl, PackageFacts, ProvidesDecl, Requirement,
    VariantDecl, VariantKind, VersionDecl,
};
pub use provider::{FactProvider, Repository};
