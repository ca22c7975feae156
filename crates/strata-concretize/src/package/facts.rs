//! Package metadata as seen by the concretizer

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strata_version::{Version, VersionList};

use crate::spec::{CompilerConstraint, Condition, DepTypes, VariantValue};

fn default_namespace() -> String {
    "builtin".to_string()
}

fn default_deptypes() -> DepTypes {
    DepTypes::default()
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Everything known about one package, materialized from its recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageFacts {
    /// Package name
    pub name: String,

    /// Repository namespace
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Known versions, in any order
    #[serde(default)]
    pub versions: Vec<VersionDecl>,

    /// Declared build variants
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<VariantDecl>,

    /// Declared dependencies
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencyDecl>,

    /// Conditions under which the package cannot be built
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<ConflictDecl>,

    /// Virtual packages this package can stand in for
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provides: Vec<ProvidesDecl>,

    /// Digest of the recipe, folded into the full hash
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_hash: Option<String>,
}

/// A known version of a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDecl {
    pub version: Version,

    /// Source checksum identifying the release
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,

    /// Chosen over newer versions unless something rules it out
    #[serde(default, skip_serializing_if = "is_false")]
    pub preferred: bool,

    /// Only chosen when nothing else works
    #[serde(default, skip_serializing_if = "is_false")]
    pub deprecated: bool,
}

impl VersionDecl {
    pub fn new(version: Version) -> Self {
        Self {
            version,
            checksum: None,
            preferred: false,
            deprecated: false,
        }
    }

    pub fn preferred(mut self) -> Self {
        self.preferred = true;
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }
}

/// How many values a variant takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantKind {
    Bool,
    Single,
    Multi,
}

/// The values a single or multi variant may take
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AllowedValues {
    /// Any value; candidates come from the default and from requests
    #[default]
    Any,
    List(Vec<String>),
}

impl AllowedValues {
    pub fn is_any(&self) -> bool {
        matches!(self, AllowedValues::Any)
    }

    pub fn allows(&self, value: &str) -> bool {
        match self {
            AllowedValues::Any => true,
            AllowedValues::List(values) => values.iter().any(|v| v == value),
        }
    }
}

/// A declared build variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantDecl {
    pub name: String,
    pub kind: VariantKind,
    pub default: VariantValue,

    #[serde(default, skip_serializing_if = "AllowedValues::is_any")]
    pub values: AllowedValues,

    /// The variant exists when any of these holds; empty means always
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub when: Vec<Condition>,
}

impl VariantDecl {
    pub fn boolean(name: impl Into<String>, default: bool) -> Self {
        Self {
            name: name.into(),
            kind: VariantKind::Bool,
            default: VariantValue::Bool(default),
            values: AllowedValues::Any,
            when: Vec::new(),
        }
    }

    pub fn single<I, S>(name: impl Into<String>, default: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            kind: VariantKind::Single,
            default: VariantValue::from(default),
            values: AllowedValues::List(values.into_iter().map(Into::into).collect()),
            when: Vec::new(),
        }
    }

    pub fn multi<I, S>(name: impl Into<String>, default: &[&str], values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            kind: VariantKind::Multi,
            default: VariantValue::multi(default.iter().copied()),
            values: AllowedValues::List(values.into_iter().map(Into::into).collect()),
            when: Vec::new(),
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.when.push(condition);
        self
    }

    /// Default values as strings
    pub fn default_values(&self) -> Vec<String> {
        self.default.values()
    }

    /// Whether a requested value has the right shape and allowed contents
    pub fn accepts(&self, value: &VariantValue) -> bool {
        match (self.kind, value) {
            (VariantKind::Bool, VariantValue::Bool(_)) => true,
            (VariantKind::Bool, _) => false,
            (VariantKind::Single, VariantValue::Single(v)) => self.values.allows(v),
            (VariantKind::Single, _) => false,
            (VariantKind::Multi, VariantValue::Bool(_)) => false,
            (VariantKind::Multi, other) => other.values().iter().all(|v| self.values.allows(v)),
        }
    }
}

/// Constraints a dependency declaration imposes on its target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    #[serde(default, skip_serializing_if = "VersionList::is_any")]
    pub versions: VersionList,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variants: BTreeMap<String, VariantValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler: Option<CompilerConstraint>,
}

impl Requirement {
    pub fn is_empty(&self) -> bool {
        self.versions.is_any() && self.variants.is_empty() && self.compiler.is_none()
    }
}

/// A declared dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyDecl {
    /// Package or virtual name
    pub name: String,

    /// Condition on the declaring package
    #[serde(default, skip_serializing_if = "Condition::is_always")]
    pub when: Condition,

    #[serde(default = "default_deptypes")]
    pub types: DepTypes,

    #[serde(default, skip_serializing_if = "Requirement::is_empty")]
    pub spec: Requirement,
}

impl DependencyDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            when: Condition::always(),
            types: DepTypes::default(),
            spec: Requirement::default(),
        }
    }

    pub fn types(mut self, types: DepTypes) -> Self {
        self.types = types;
        self
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.when = condition;
        self
    }

    pub fn versions(mut self, versions: VersionList) -> Self {
        self.spec.versions = versions;
        self
    }

    pub fn variant(mut self, name: impl Into<String>, value: impl Into<VariantValue>) -> Self {
        self.spec.variants.insert(name.into(), value.into());
        self
    }

    pub fn compiler(mut self, compiler: CompilerConstraint) -> Self {
        self.spec.compiler = Some(compiler);
        self
    }
}

/// The package cannot be built while `when` holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictDecl {
    pub when: Condition,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The package provides a virtual, optionally only some of its versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvidesDecl {
    #[serde(rename = "virtual")]
    pub virtual_name: String,

    #[serde(default, skip_serializing_if = "VersionList::is_any")]
    pub versions: VersionList,

    #[serde(default, skip_serializing_if = "Condition::is_always")]
    pub when: Condition,
}

impl PackageFacts {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: default_namespace(),
            versions: Vec::new(),
            variants: Vec::new(),
            dependencies: Vec::new(),
            conflicts: Vec::new(),
            provides: Vec::new(),
            package_hash: None,
        }
    }

    /// Add a plain version from a string; invalid strings are an error
    pub fn version(mut self, version: &str) -> crate::error::Result<Self> {
        self.versions.push(VersionDecl::new(Version::parse(version)?));
        Ok(self)
    }

    pub fn with_version(mut self, decl: VersionDecl) -> Self {
        self.versions.push(decl);
        self
    }

    pub fn with_variant(mut self, decl: VariantDecl) -> Self {
        self.variants.push(decl);
        self
    }

    pub fn with_dependency(mut self, decl: DependencyDecl) -> Self {
        self.dependencies.push(decl);
        self
    }

    pub fn with_conflict(mut self, when: Condition, message: Option<&str>) -> Self {
        self.conflicts.push(ConflictDecl {
            when,
            message: message.map(str::to_string),
        });
        self
    }

    pub fn provides(mut self, virtual_name: impl Into<String>, versions: VersionList) -> Self {
        self.provides.push(ProvidesDecl {
            virtual_name: virtual_name.into(),
            versions,
            when: Condition::always(),
        });
        self
    }

    pub fn with_package_hash(mut self, package_hash: impl Into<String>) -> Self {
        self.package_hash = Some(package_hash.into());
        self
    }

    pub fn variant(&self, name: &str) -> Option<&VariantDecl> {
        self.variants.iter().find(|v| v.name == name)
    }

    pub fn provides_virtual(&self, virtual_name: &str) -> bool {
        self.provides.iter().any(|p| p.virtual_name == virtual_name)
    }

    /// Versions sorted newest first, duplicates removed
    pub fn sorted_versions(&self) -> Vec<&VersionDecl> {
        let mut versions: Vec<&VersionDecl> = self.versions.iter().collect();
        versions.sort_by(|a, b| b.version.cmp(&a.version));
        versions.dedup_by(|a, b| a.version == b.version);
        versions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_facts_json() {
        let json = r#"{
            "name": "hdf5",
            "versions": [
                {"version": "1.12.2", "preferred": true},
                {"version": "1.14.3"},
                {"version": "1.8.0", "deprecated": true}
            ],
            "variants": [
                {"name": "mpi", "kind": "bool", "default": true},
                {"name": "api", "kind": "single", "default": "default", "values": ["default", "v18", "v110"]}
            ],
            "dependencies": [
                {"name": "mpi", "when": [{"variant": {"name": "mpi", "value": true}}]},
                {"name": "zlib", "types": ["link"], "spec": {"versions": "1.2:"}},
                {"name": "cmake", "types": ["build"]}
            ],
            "conflicts": [
                {"when": [{"variant": {"name": "api", "value": "v18"}}, {"version": "1.14:"}], "message": "api v18 was dropped"}
            ]
        }"#;

        let facts: PackageFacts = serde_json::from_str(json).unwrap();
        assert_eq!(facts.namespace, "builtin");
        assert_eq!(facts.versions.len(), 3);
        assert!(facts.versions[0].preferred);
        assert_eq!(facts.variant("api").unwrap().kind, VariantKind::Single);
        assert_eq!(facts.dependencies[0].types, DepTypes::BUILD | DepTypes::LINK);
        assert_eq!(facts.dependencies[1].types, DepTypes::LINK);
        assert_eq!(facts.dependencies[1].spec.versions.to_string(), "1.2:");
        assert_eq!(facts.conflicts[0].when.constraints.len(), 2);

        let sorted: Vec<String> = facts.sorted_versions().iter().map(|v| v.version.to_string()).collect();
        assert_eq!(sorted, vec!["1.14.3", "1.12.2", "1.8.0"]);
    }

    #[test]
    fn test_provides_rename() {
        let facts = PackageFacts::new("mpich").provides("mpi", VersionList::parse(":3").unwrap());
        let json = serde_json::to_value(&facts).unwrap();
        assert_eq!(json["provides"][0]["virtual"], "mpi");
        assert!(facts.provides_virtual("mpi"));
    }

    #[test]
    fn test_variant_accepts() {
        let api = VariantDecl::single("api", "default", ["default", "v18"]);
        assert!(api.accepts(&VariantValue::from("v18")));
        assert!(!api.accepts(&VariantValue::from("v99")));
        assert!(!api.accepts(&VariantValue::Bool(true)));

        let langs = VariantDecl::multi("languages", &["c"], ["c", "cxx", "fortran"]);
        assert!(langs.accepts(&VariantValue::multi(["c", "fortran"])));
        assert!(langs.accepts(&VariantValue::from("cxx")));
        assert!(!langs.accepts(&VariantValue::multi(["go"])));

        let open = VariantDecl {
            values: AllowedValues::Any,
            ..VariantDecl::single("build_type", "Release", Vec::<String>::new())
        };
        assert!(open.accepts(&VariantValue::from("Debug")));
    }
}
