//! Version algebra for package concretization
//!
//! This crate provides version parsing, ordering, prefix-aware ranges and
//! version lists (unions of ranges) used when matching package versions
//! against constraints.
//!
//! ```
//! use strata_version::{Version, VersionList};
//!
//! let v: Version = "4.7.3".parse().unwrap();
//! let list: VersionList = "4.5:4.7,5.1".parse().unwrap();
//! assert!(list.contains(&v));
//! ```

mod list;
mod parser;
mod range;
mod version;

pub use list::VersionList;
pub use parser::{VersionError, INFINITY_VERSIONS};
pub use range::VersionRange;
pub use version::{Component, Version};
