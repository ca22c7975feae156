use thiserror::Error;

use crate::explain::Explanation;

#[derive(Error, Debug)]
pub enum ConcretizeError {
    // Request errors, reported before any solve
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Unknown package '{name}' (required by {requested_by})")]
    UnknownPackage { name: String, requested_by: String },

    #[error("Unknown variant '{variant}' on package '{package}' (requested by {requested_by})")]
    UnknownVariant {
        package: String,
        variant: String,
        requested_by: String,
    },

    // Solve outcomes
    #[error("{}", render_unsatisfiable(.explanations))]
    Unsatisfiable { explanations: Vec<Explanation> },

    #[error("Solve cancelled: {reason}")]
    SolveCancelled { reason: String },

    // Internal defects
    #[error("Internal inconsistency while rebuilding the solution: {0}")]
    ReconstructionInconsistency(String),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Version constraint errors
    #[error("Invalid version: {0}")]
    Version(#[from] strata_version::VersionError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid stored spec: {0}")]
    Storage(String),

    #[error("Stored hash for {name} does not match its contents (stored {stored}, computed {computed})")]
    HashMismatch {
        name: String,
        stored: String,
        computed: String,
    },
}

fn render_unsatisfiable(explanations: &[Explanation]) -> String {
    if explanations.is_empty() {
        return "No concretization satisfies the request".to_string();
    }
    let mut out = String::from("No concretization satisfies the request:");
    for explanation in explanations {
        out.push_str("\n  - ");
        out.push_str(&explanation.to_string());
    }
    out
}

impl ConcretizeError {
    /// Whether the error is an expected solve outcome rather than a bad input or a defect
    pub fn is_solve_outcome(&self) -> bool {
        matches!(
            self,
            ConcretizeError::Unsatisfiable { .. } | ConcretizeError::SolveCancelled { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ConcretizeError>;
