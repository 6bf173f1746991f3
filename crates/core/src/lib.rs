//! Config source core types: collections, resource identities, versioned entries.

#![forbid(unsafe_code)]

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

mod event;

pub use event::{Accumulator, Event, EventKind, Handler, Handlers};

/// Name of a category of same-schema resources, e.g. `k8s/core/v1/services`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Collection(Arc<str>);

impl Collection {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Collection {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identity of a resource within its collection. Ordering is namespace, then name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceName {
    /// Empty for cluster-scoped resources.
    pub namespace: String,
    pub name: String,
}

impl ResourceName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }

    pub fn cluster(name: impl Into<String>) -> Self {
        Self::new(String::new(), name)
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Source-assigned synchronization version. Strictly increasing across a whole source,
/// never taken from the document's own `resourceVersion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

pub type Labels = SmallVec<[(String, String); 8]>;
pub type Annotations = SmallVec<[(String, String); 4]>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: ResourceName,
    pub version: Version,
    /// Seconds since epoch from `metadata.creationTimestamp`; 0 when absent.
    pub creation_ts: i64,
    /// Sorted by key.
    pub labels: Labels,
    /// Sorted by key.
    pub annotations: Annotations,
}

/// Materialized state of one resource. Entries are immutable values: a change
/// produces a new `Entry` with a new `Version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub metadata: Metadata,
    /// The whole decoded document.
    pub body: Arc<serde_json::Value>,
}

impl Entry {
    pub fn name(&self) -> &ResourceName {
        &self.metadata.name
    }

    pub fn version(&self) -> Version {
        self.metadata.version
    }

    /// Same identity and body; versions are not compared.
    pub fn same_content(&self, other: &Entry) -> bool {
        self.metadata.name == other.metadata.name && self.body == other.body
    }

    pub fn with_version(&self, version: Version) -> Entry {
        let mut e = self.clone();
        e.metadata.version = version;
        e
    }
}

/// Errors surfaced by `ApplyContent`. Defects in single documents are never errors.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("snapshot too large: {bytes} bytes (max {max})")]
    SnapshotTooLarge { bytes: usize, max: usize },
    #[error("snapshot cannot be segmented: {0}")]
    Unsegmentable(String),
}

pub mod prelude {
    pub use super::{
        Accumulator, Collection, Entry, Event, EventKind, Handler, Metadata, ResourceName, SourceError,
        Version,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_names_order_by_namespace_then_name() {
        let mut names = vec![
            ResourceName::new("ns2", "a"),
            ResourceName::new("ns1", "z"),
            ResourceName::cluster("m"),
            ResourceName::new("ns1", "b"),
        ];
        names.sort();
        let rendered: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        assert_eq!(rendered, vec!["m", "ns1/b", "ns1/z", "ns2/a"]);
    }

    #[test]
    fn version_renders_with_prefix() {
        assert_eq!(Version::new(3).to_string(), "v3");
        assert!(Version::new(2) < Version::new(10));
    }

    #[test]
    fn same_content_ignores_version() {
        let e = Entry {
            metadata: Metadata {
                name: ResourceName::new("ns", "a"),
                version: Version::new(1),
                creation_ts: 0,
                labels: Labels::new(),
                annotations: Annotations::new(),
            },
            body: Arc::new(serde_json::json!({ "spec": { "x": 1 } })),
        };
        let bumped = e.with_version(Version::new(7));
        assert!(e.same_content(&bumped));
        assert_ne!(e, bumped);
        assert_eq!(bumped.version().to_string(), "v7");
    }
}
