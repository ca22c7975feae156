//! Spec model: abstract requests and concrete DAGs
//!
//! An [`AbstractSpec`] is what a user asks for, with any subset of its
//! attributes constrained. A [`ConcreteSpec`] is a resolved node with every
//! attribute fixed and its dependencies shared through `Arc`.

mod abstract_spec;
mod arch;
mod compiler;
mod concrete;
mod condition;
mod deptype;
mod variant;

pub use abstract_spec::{AbstractSpec, DependencyEdge};
pub use arch::{ArchConstraint, ArchSpec};
pub use compiler::{CompilerConstraint, CompilerSpec};
pub use concrete::{ConcreteEdge, ConcreteSpec, ConcreteSpecBuilder, ExternalInfo, TraversalOrder};
pub use condition::{Condition, SpecConstraint};
pub use deptype::DepTypes;
pub use variant::VariantValue;
