//! Variant values

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The value of a build variant.
///
/// Serialized untagged: `true`, `"openmp"` or `["a", "b"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariantValue {
    Bool(bool),
    Single(String),
    Multi(BTreeSet<String>),
}

impl VariantValue {
    pub fn multi<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        VariantValue::Multi(values.into_iter().map(Into::into).collect())
    }

    /// Individual values as strings; booleans read as `true`/`false`
    pub fn values(&self) -> Vec<String> {
        match self {
            VariantValue::Bool(b) => vec![b.to_string()],
            VariantValue::Single(s) => vec![s.clone()],
            VariantValue::Multi(set) => set.iter().cloned().collect(),
        }
    }

    /// Whether this value meets a requested one.
    ///
    /// A multi-valued variant meets a request when it holds every requested
    /// value; other kinds must match exactly.
    pub fn satisfies(&self, requested: &VariantValue) -> bool {
        match self {
            VariantValue::Multi(have) => requested.values().iter().all(|v| have.contains(v)),
            _ => self.values() == requested.values(),
        }
    }

    /// Canonical rendering with the variant name: `+foo`, `~foo`, `foo=bar`, `foo=a,b`
    pub fn render(&self, name: &str) -> String {
        match self {
            VariantValue::Bool(true) => format!("+{}", name),
            VariantValue::Bool(false) => format!("~{}", name),
            _ => format!("{}={}", name, self),
        }
    }
}

impl fmt::Display for VariantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.values().join(","))
    }
}

impl From<bool> for VariantValue {
    fn from(value: bool) -> Self {
        VariantValue::Bool(value)
    }
}

impl From<&str> for VariantValue {
    fn from(value: &str) -> Self {
        VariantValue::Single(value.to_string())
    }
}

impl From<String> for VariantValue {
    fn from(value: String) -> Self {
        VariantValue::Single(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        assert_eq!(VariantValue::Bool(true).render("shared"), "+shared");
        assert_eq!(VariantValue::Bool(false).render("shared"), "~shared");
        assert_eq!(VariantValue::from("O2").render("opt"), "opt=O2");
        assert_eq!(VariantValue::multi(["b", "a"]).render("langs"), "langs=a,b");
    }

    #[test]
    fn test_satisfies() {
        let langs = VariantValue::multi(["c", "cxx", "fortran"]);
        assert!(langs.satisfies(&VariantValue::from("cxx")));
        assert!(langs.satisfies(&VariantValue::multi(["c", "fortran"])));
        assert!(!langs.satisfies(&VariantValue::from("go")));
        assert!(VariantValue::Bool(true).satisfies(&VariantValue::Bool(true)));
        assert!(!VariantValue::Bool(true).satisfies(&VariantValue::Bool(false)));
        assert!(!VariantValue::from("a").satisfies(&VariantValue::multi(["a", "b"])));
    }

    #[test]
    fn test_untagged_serde() {
        let values: Vec<VariantValue> = serde_json::from_str(r#"[true, "x", ["b", "a"]]"#).unwrap();
        assert_eq!(
            values,
            vec![
                VariantValue::Bool(true),
                VariantValue::from("x"),
                VariantValue::multi(["a", "b"]),
            ]
        );
    }
}
