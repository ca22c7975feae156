//! Solver configuration
//!
//! # Configuration Sources (in priority order, highest to lowest)
//!
//! 1. Environment variables (`STRATA_REUSE`, `STRATA_TIMEOUT`,
//!    `STRATA_INJECT_COMPILER_RUNTIMES`)
//! 2. An explicit file, or `strata.json` in the user config directory
//! 3. Built-in defaults
//!
//! # Example
//!
//! ```rust,no_run
//! use strata_concretize::config::SolverConfig;
//!
//! let config = SolverConfig::build(None, true).unwrap();
//! println!("reuse: {}", config.reuse);
//! ```

mod config;
mod source;

pub use config::{ExternalConfig, SolverConfig};
pub use source::{ConfigLoader, ConfigSource, RawConfig};
