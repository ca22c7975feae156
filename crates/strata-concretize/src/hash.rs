//! Content hashes and the stored form of concrete specs
//!
//! Every node is rendered into a [`NodeDict`], serialized as compact JSON
//! and digested with SHA-1. The digest is encoded with the RFC 4648 hex
//! alphabet in lower case without padding, giving 32 characters.
//!
//! Field order is fixed by the struct layout and every map is sorted, so
//! the digest only depends on the semantic content of the DAG.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use strata_version::Version;

use crate::error::{ConcretizeError, Result};
use crate::spec::{
    ArchSpec, CompilerSpec, ConcreteEdge, ConcreteSpec, DepTypes, ExternalInfo, TraversalOrder,
    VariantValue,
};

const BASE32: base32::Alphabet = base32::Alphabet::Rfc4648HexLower { padding: false };

/// Version of the stored format written by [`to_json`]
const STORAGE_FORMAT: u32 = 1;

/// Which view of a node is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashKind {
    /// Link and run dependencies by DAG hash
    Dag,
    /// All dependencies by full hash, plus recipe metadata
    Full,
    /// All dependencies by DAG hash, plus recipe metadata
    Storage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchDict {
    pub platform: String,
    pub platform_os: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerDict {
    pub name: String,
    pub version: Version,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeParameters {
    pub deptypes: DepTypes,
    #[serde(default)]
    pub virtuals: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDict {
    pub name: String,
    pub hash: String,
    pub parameters: EdgeParameters,
}

/// The canonical rendering of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDict {
    pub name: String,
    pub version: Version,
    pub arch: ArchDict,
    pub compiler: CompilerDict,
    pub namespace: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, VariantValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<ExternalInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_hash: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<EdgeDict>,

    /// Only present in the stored form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Render a node for hashing or storage
pub fn node_dict(spec: &ConcreteSpec, kind: HashKind) -> NodeDict {
    let keep = |edge: &&ConcreteEdge| match kind {
        HashKind::Dag => edge.deptypes.affects_dag_hash(),
        HashKind::Full | HashKind::Storage => true,
    };
    let dependencies = spec
        .dependencies()
        .iter()
        .filter(keep)
        .map(|edge| EdgeDict {
            name: edge.spec.name().to_string(),
            hash: match kind {
                HashKind::Full => edge.spec.full_hash().to_string(),
                HashKind::Dag | HashKind::Storage => edge.spec.dag_hash().to_string(),
            },
            parameters: EdgeParameters {
                deptypes: edge.deptypes,
                virtuals: edge.virtuals.clone(),
            },
        })
        .collect();

    NodeDict {
        name: spec.name().to_string(),
        version: spec.version().clone(),
        arch: ArchDict {
            platform: spec.arch().platform.clone(),
            platform_os: spec.arch().os.clone(),
            target: spec.arch().target.clone(),
        },
        compiler: CompilerDict {
            name: spec.compiler().name.clone(),
            version: spec.compiler().version.clone(),
        },
        namespace: spec.namespace().to_string(),
        parameters: spec.variants().clone(),
        external: spec.external().cloned(),
        package_hash: match kind {
            HashKind::Dag => None,
            HashKind::Full | HashKind::Storage => spec.package_hash().map(str::to_string),
        },
        dependencies,
        hash: None,
    }
}

/// SHA-1 of the compact JSON form, base32 encoded
pub fn digest(dict: &NodeDict) -> String {
    // Every map in a node dict has string keys, so serialization cannot fail
    let bytes = serde_json::to_vec(dict).unwrap_or_default();
    let digest = Sha1::digest(&bytes);
    base32::encode(BASE32, digest.as_slice())
}

pub fn dag_hash(spec: &ConcreteSpec) -> String {
    digest(&node_dict(spec, HashKind::Dag))
}

pub fn full_hash(spec: &ConcreteSpec) -> String {
    digest(&node_dict(spec, HashKind::Full))
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSpec {
    format: u32,
    root: String,
    nodes: Vec<NodeDict>,
}

/// The stored form of a DAG: a flat node list, dependencies first, keyed by DAG hash
pub fn to_json(root: &ConcreteSpec) -> Result<String> {
    let nodes = root
        .traverse(TraversalOrder::Post, DepTypes::ALL)
        .into_iter()
        .map(|node| {
            let mut dict = node_dict(node, HashKind::Storage);
            dict.hash = Some(node.dag_hash().to_string());
            dict
        })
        .collect();
    let stored = StoredSpec {
        format: STORAGE_FORMAT,
        root: root.dag_hash().to_string(),
        nodes,
    };
    Ok(serde_json::to_string_pretty(&stored)?)
}

/// Rebuild a DAG from its stored form, checking every stored hash
pub fn from_json(json: &str) -> Result<Arc<ConcreteSpec>> {
    let stored: StoredSpec = serde_json::from_str(json)?;
    if stored.format != STORAGE_FORMAT {
        return Err(ConcretizeError::Storage(format!(
            "unsupported stored spec format {}",
            stored.format
        )));
    }

    let mut built: HashMap<String, Arc<ConcreteSpec>> = HashMap::new();
    for dict in stored.nodes {
        let stored_hash = dict.hash.clone().ok_or_else(|| {
            ConcretizeError::Storage(format!("stored node {} has no hash", dict.name))
        })?;

        let mut builder = ConcreteSpec::builder(
            dict.name.clone(),
            dict.version,
            CompilerSpec::new(dict.compiler.name, dict.compiler.version),
            ArchSpec::new(dict.arch.platform, dict.arch.platform_os, dict.arch.target),
        )
        .namespace(dict.namespace);
        for (name, value) in dict.parameters {
            builder = builder.variant(name, value);
        }
        if let Some(external) = dict.external {
            builder = builder.external(external);
        }
        if let Some(package_hash) = dict.package_hash {
            builder = builder.package_hash(package_hash);
        }
        for edge in dict.dependencies {
            let child = built.get(&edge.hash).ok_or_else(|| {
                ConcretizeError::Storage(format!(
                    "stored node {} refers to unknown dependency {} ({})",
                    dict.name, edge.name, edge.hash
                ))
            })?;
            builder = builder.edge(ConcreteEdge {
                spec: Arc::clone(child),
                deptypes: edge.parameters.deptypes,
                virtuals: edge.parameters.virtuals,
            });
        }

        let node = builder.build();
        if node.dag_hash() != stored_hash {
            return Err(ConcretizeError::HashMismatch {
                name: dict.name,
                stored: stored_hash,
                computed: node.dag_hash().to_string(),
            });
        }
        built.entry(stored_hash).or_insert(node);
    }

    debug!("Loaded {} stored nodes", built.len());
    built.get(&stored.root).cloned().ok_or_else(|| {
        ConcretizeError::Storage(format!("stored root {} is not among the nodes", stored.root))
    })
}
