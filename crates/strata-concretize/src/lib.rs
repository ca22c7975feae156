pub mod concretizer;
pub mod config;
pub mod driver;
pub mod encode;
pub mod error;
pub mod explain;
pub mod hash;
pub mod package;
pub mod reconstruct;
pub mod solver;
pub mod spec;

pub use concretizer::{Concretizer, Outcome};
pub use config::{ExternalConfig, SolverConfig};
pub use error::{ConcretizeError, Result};
pub use explain::Explanation;
pub use package::{FactProvider, FactsCache, PackageFacts, Repository};
pub use solver::{CancelToken, CdclBackend, ConstraintSolver};
pub use spec::{
    AbstractSpec, ArchSpec, CompilerSpec, ConcreteSpec, DepTypes, ExternalInfo, VariantValue,
};
