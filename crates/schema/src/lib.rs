//! Resource schema registry: maps a document's (group, kind) to the collection it lands in.

#![forbid(unsafe_code)]

use anyhow::Result;
use cfgsrc_core::Collection;
use kube::core::GroupVersionKind;
use rustc_hash::FxHashMap;
use tracing::warn;

pub mod builtin;

/// Whether attached OpenAPI schemas are enforced (feature `jsonschema-validate`).
pub const SHAPE_VALIDATION: bool = cfg!(feature = "jsonschema-validate");

#[derive(Debug, Clone)]
pub struct ResourceSchema {
    collection: Collection,
    gvk: GroupVersionKind,
    plural: String,
    namespaced: bool,
    openapi: Option<serde_json::Value>,
}

impl ResourceSchema {
    pub fn new(collection: impl AsRef<str>, gvk: GroupVersionKind, plural: impl Into<String>, namespaced: bool) -> Self {
        Self { collection: Collection::new(collection), gvk, plural: plural.into(), namespaced, openapi: None }
    }

    /// Attach an OpenAPI v3 schema used for shape validation (feature `jsonschema-validate`).
    pub fn with_openapi(mut self, schema: serde_json::Value) -> Self {
        self.openapi = Some(schema);
        self
    }

    pub fn collection(&self) -> &Collection { &self.collection }
    pub fn gvk(&self) -> &GroupVersionKind { &self.gvk }
    pub fn group(&self) -> &str { &self.gvk.group }
    pub fn kind(&self) -> &str { &self.gvk.kind }
    pub fn plural(&self) -> &str { &self.plural }
    pub fn is_namespaced(&self) -> bool { self.namespaced }
    pub fn openapi(&self) -> Option<&serde_json::Value> { self.openapi.as_ref() }

    pub fn api_version(&self) -> String {
        if self.gvk.group.is_empty() {
            self.gvk.version.clone()
        } else {
            format!("{}/{}", self.gvk.group, self.gvk.version)
        }
    }

    /// Check a decoded document against the attached OpenAPI schema, if any.
    #[cfg(feature = "jsonschema-validate")]
    pub fn validate(&self, body: &serde_json::Value) -> Result<()> {
        use anyhow::anyhow;
        use jsonschema::{Draft, JSONSchema};

        let Some(schema) = self.openapi.as_ref() else { return Ok(()) };
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(schema)
            .map_err(|e| anyhow!("compiling schema for {}: {}", self.collection, e))?;
        if let Err(errors) = compiled.validate(body) {
            let issues: Vec<String> = errors.map(|e| format!("{}: {}", e.instance_path, e)).collect();
            return Err(anyhow!("{} validation failed: {}", self.collection, issues.join("; ")));
        }
        Ok(())
    }

    #[cfg(not(feature = "jsonschema-validate"))]
    pub fn validate(&self, _body: &serde_json::Value) -> Result<()> {
        Ok(())
    }
}

/// Fixed set of schemas a source recognizes. Sorted by collection name.
#[derive(Debug, Clone, Default)]
pub struct Schemas {
    all: Vec<ResourceSchema>,
    by_kind: FxHashMap<(String, String), usize>,
}

impl Schemas {
    /// Look up by API group (empty for core) and kind. The version is not part of the key.
    pub fn find(&self, group: &str, kind: &str) -> Option<&ResourceSchema> {
        self.by_kind.get(&(group.to_string(), kind.to_string())).map(|&i| &self.all[i])
    }

    pub fn get(&self, collection: &Collection) -> Option<&ResourceSchema> {
        self.all
            .binary_search_by(|s| s.collection.cmp(collection))
            .ok()
            .map(|i| &self.all[i])
    }

    pub fn all(&self) -> &[ResourceSchema] { &self.all }

    pub fn collections(&self) -> impl Iterator<Item = &Collection> + '_ {
        self.all.iter().map(|s| &s.collection)
    }

    pub fn len(&self) -> usize { self.all.len() }
    pub fn is_empty(&self) -> bool { self.all.is_empty() }
}

impl FromIterator<ResourceSchema> for Schemas {
    /// Later schemas replace earlier ones with the same collection or the same (group, kind).
    fn from_iter<I: IntoIterator<Item = ResourceSchema>>(iter: I) -> Self {
        let mut all: Vec<ResourceSchema> = Vec::new();
        for s in iter {
            let before = all.len();
            all.retain(|x| x.collection != s.collection && !(x.gvk.group == s.gvk.group && x.gvk.kind == s.gvk.kind));
            if all.len() != before {
                warn!(collection = %s.collection, kind = %s.gvk.kind, "duplicate schema replaced");
            }
            all.push(s);
        }
        all.sort_by(|a, b| a.collection.cmp(&b.collection));
        let by_kind = all
            .iter()
            .enumerate()
            .map(|(i, s)| ((s.gvk.group.clone(), s.gvk.kind.clone()), i))
            .collect();
        Self { all, by_kind }
    }
}
