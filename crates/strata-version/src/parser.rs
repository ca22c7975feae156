//! Parsing of version strings and version constraints

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::range::VersionRange;
use crate::version::{Component, Version};
use crate::list::VersionList;

/// Names that compare above every numeric version, highest first.
pub const INFINITY_VERSIONS: [&str; 5] = ["develop", "main", "master", "head", "trunk"];

lazy_static! {
    static ref VALID_VERSION: Regex = Regex::new(r"^[A-Za-z0-9_.\-]+$").unwrap();
    static ref SEGMENT: Regex = Regex::new(r"(?:(?P<num>[0-9]+)|(?P<str>[a-zA-Z]+))(?P<sep>[_.\-]*)").unwrap();
}

/// Error type for version parsing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Empty version string")]
    Empty,
    #[error("Bad characters in version string \"{0}\"")]
    InvalidCharacters(String),
    #[error("Numeric component too large in version \"{0}\"")]
    ComponentOverflow(String),
    #[error("Invalid version range \"{0}\": upper bound is below lower bound")]
    InvertedRange(String),
    #[error("Could not parse version constraint \"{constraint}\": {reason}")]
    InvalidConstraint { constraint: String, reason: String },
}

/// Split a version string into components and the separators that follow them.
pub(crate) fn parse_version(input: &str) -> Result<(Vec<Component>, Vec<String>), VersionError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(VersionError::Empty);
    }
    if !VALID_VERSION.is_match(input) {
        return Err(VersionError::InvalidCharacters(input.to_string()));
    }

    let mut components = Vec::new();
    let mut separators = Vec::new();
    for caps in SEGMENT.captures_iter(input) {
        if let Some(num) = caps.name("num") {
            let value = num
                .as_str()
                .parse::<u64>()
                .map_err(|_| VersionError::ComponentOverflow(input.to_string()))?;
            components.push(Component::Numeric(value));
        } else if let Some(s) = caps.name("str") {
            components.push(Component::Alpha(s.as_str().to_string()));
        }
        separators.push(caps.name("sep").map(|m| m.as_str().to_string()).unwrap_or_default());
    }

    // A string made only of separators ("..", "-") matches VALID_VERSION but has no segments
    if components.is_empty() {
        return Err(VersionError::InvalidCharacters(input.to_string()));
    }

    Ok((components, separators))
}

/// Parse a single range: `1.2`, `=1.2`, `1.2:1.5`, `:3`, `3:` or `:`.
pub(crate) fn parse_range(input: &str) -> Result<VersionRange, VersionError> {
    let input: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if input.is_empty() {
        return Err(VersionError::InvalidConstraint {
            constraint: input,
            reason: "empty constraint".to_string(),
        });
    }

    if let Some(exact) = input.strip_prefix('=') {
        return Ok(VersionRange::exact(exact.parse()?));
    }

    let mut parts = input.split(':');
    let first = parts.next().unwrap_or_default();
    let Some(second) = parts.next() else {
        return Ok(VersionRange::prefix(first.parse()?));
    };
    if parts.next().is_some() {
        return Err(VersionError::InvalidConstraint {
            constraint: input.clone(),
            reason: "more than one ':' in range".to_string(),
        });
    }

    let lower = if first.is_empty() { None } else { Some(first.parse::<Version>()?) };
    let upper = if second.is_empty() { None } else { Some(second.parse::<Version>()?) };
    VersionRange::new(lower, upper)
}

/// Parse a comma separated union of ranges.
pub(crate) fn parse_list(input: &str) -> Result<VersionList, VersionError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(VersionError::InvalidConstraint {
            constraint: input.to_string(),
            reason: "empty constraint".to_string(),
        });
    }

    let mut list = VersionList::none();
    for part in trimmed.split(',') {
        list.add(parse_range(part)?);
    }
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_components() {
        let (components, separators) = parse_version("1.23-4b").unwrap();
        assert_eq!(
            components,
            vec![
                Component::Numeric(1),
                Component::Numeric(23),
                Component::Numeric(4),
                Component::Alpha("b".to_string()),
            ]
        );
        assert_eq!(separators, vec![".", "-", "", ""]);
    }

    #[test]
    fn test_parse_version_rejects_bad_input() {
        assert_eq!(parse_version(""), Err(VersionError::Empty));
        assert!(matches!(parse_version("1.2 3"), Err(VersionError::InvalidCharacters(_))));
        assert!(matches!(parse_version("1.2+3"), Err(VersionError::InvalidCharacters(_))));
        assert!(matches!(parse_version("..."), Err(VersionError::InvalidCharacters(_))));
        assert!(matches!(
            parse_version("99999999999999999999999"),
            Err(VersionError::ComponentOverflow(_))
        ));
    }

    #[test]
    fn test_parse_range_forms() {
        assert_eq!(parse_range("1.2:1.5").unwrap().to_string(), "1.2:1.5");
        assert_eq!(parse_range(":3").unwrap().to_string(), ":3");
        assert_eq!(parse_range("3:").unwrap().to_string(), "3:");
        assert_eq!(parse_range(":").unwrap().to_string(), ":");
        assert_eq!(parse_range("=1.2").unwrap().to_string(), "=1.2");
        assert_eq!(parse_range(" 1.2 ").unwrap().to_string(), "1.2");
    }

    #[test]
    fn test_parse_range_errors() {
        assert!(matches!(parse_range("1:2:3"), Err(VersionError::InvalidConstraint { .. })));
        assert!(matches!(parse_range("2.0:1.0"), Err(VersionError::InvertedRange(_))));
        assert!(parse_range("").is_err());
    }

    #[test]
    fn test_parse_list() {
        let list = parse_list("1.0:1.4, 2.0:").unwrap();
        assert_eq!(list.to_string(), "1.0:1.4,2.0:");
        assert!(parse_list("  ").is_err());
        assert!(parse_list("1.0,,2.0").is_err());
    }
}
