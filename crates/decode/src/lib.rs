//! Splits raw multi-document snapshots and recognizes each document against a schema registry.
//!
//! Decoding is a two-stage pipeline: every segment is first parsed into an untyped YAML tree
//! and converted to JSON (rejecting non-string keys), then identity and kind are extracted
//! field by field with explicit fallbacks. A bad document is skipped, never fatal.

#![forbid(unsafe_code)]

use std::sync::Arc;

use cfgsrc_core::{Annotations, Collection, Entry, Labels, Metadata, ResourceName, SourceError, Version};
use cfgsrc_schema::Schemas;
use metrics::counter;
use rustc_hash::FxHashMap;
use serde_json::Value as Json;
use tracing::{debug, warn};

mod split;

pub use split::{join, split};

const DEFAULT_MAX_BYTES: usize = 8 * 1024 * 1024;
const DEFAULT_MAX_NODES: usize = 100_000;

/// Size guards applied while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Snapshots above this size are rejected as a whole.
    pub max_bytes: usize,
    /// Documents whose JSON tree exceeds this many nodes are skipped.
    pub max_nodes: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self { max_bytes: DEFAULT_MAX_BYTES, max_nodes: DEFAULT_MAX_NODES }
    }
}

impl DecodeLimits {
    /// Read `CFGSRC_MAX_YAML_BYTES` and `CFGSRC_MAX_YAML_NODES`, falling back to defaults.
    pub fn from_env() -> Self {
        let max_bytes = std::env::var("CFGSRC_MAX_YAML_BYTES")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_BYTES);
        let max_nodes = std::env::var("CFGSRC_MAX_YAML_NODES")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_NODES);
        Self { max_bytes, max_nodes }
    }
}

/// One recognized document bound to its collection and identity, not yet versioned.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub collection: Collection,
    pub name: ResourceName,
    pub creation_ts: i64,
    pub labels: Labels,
    pub annotations: Annotations,
    pub body: Arc<Json>,
}

impl Decoded {
    pub fn to_entry(&self, version: Version) -> Entry {
        Entry {
            metadata: Metadata {
                name: self.name.clone(),
                version,
                creation_ts: self.creation_ts,
                labels: self.labels.clone(),
                annotations: self.annotations.clone(),
            },
            body: Arc::clone(&self.body),
        }
    }
}

/// Why a segment did not produce a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    Empty,
    Unparseable,
    NonStringKey,
    TooComplex,
    MissingKind,
    Unrecognized,
    MissingName,
    Invalid,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Empty => "empty",
            SkipReason::Unparseable => "unparseable",
            SkipReason::NonStringKey => "non_string_key",
            SkipReason::TooComplex => "too_complex",
            SkipReason::MissingKind => "missing_kind",
            SkipReason::Unrecognized => "unrecognized",
            SkipReason::MissingName => "missing_name",
            SkipReason::Invalid => "invalid",
        }
    }
}

/// Result of decoding a snapshot: recognized documents in decode order plus skipped segments.
#[derive(Debug, Clone, Default)]
pub struct Decoding {
    pub docs: Vec<Decoded>,
    /// `(segment index, reason)` for every segment that was not applied.
    pub skipped: Vec<(usize, SkipReason)>,
}

#[derive(Debug, thiserror::Error)]
enum DocError {
    #[error("empty document")]
    Empty,
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("document is not a mapping")]
    NotMapping,
    #[error("non-string mapping key")]
    NonStringKey,
    #[error("number not representable in JSON")]
    BadNumber,
    #[error("document too complex (>{0} nodes)")]
    TooComplex(usize),
    #[error("missing apiVersion or kind")]
    MissingKind,
    #[error("kind not recognized: {0}")]
    Unrecognized(String),
    #[error("missing metadata.name")]
    MissingName,
    #[error("{0}")]
    Invalid(String),
}

impl DocError {
    fn reason(&self) -> SkipReason {
        match self {
            DocError::Empty => SkipReason::Empty,
            DocError::Yaml(_) | DocError::NotMapping | DocError::BadNumber => SkipReason::Unparseable,
            DocError::NonStringKey => SkipReason::NonStringKey,
            DocError::TooComplex(_) => SkipReason::TooComplex,
            DocError::MissingKind => SkipReason::MissingKind,
            DocError::Unrecognized(_) => SkipReason::Unrecognized,
            DocError::MissingName => SkipReason::MissingName,
            DocError::Invalid(_) => SkipReason::Invalid,
        }
    }
}

/// Decode a raw snapshot. Fails only when the snapshot as a whole cannot be segmented
/// (too large, or not a text stream); individual bad documents are skipped.
///
/// When the same (collection, identity) appears twice, the later document wins and takes
/// the position of the earlier one.
pub fn decode(schemas: &Schemas, text: &str, limits: &DecodeLimits) -> Result<Decoding, SourceError> {
    if text.len() > limits.max_bytes {
        counter!("source_rejected_total", 1u64, "reason" => "too_large");
        warn!(bytes = text.len(), max = limits.max_bytes, "snapshot rejected");
        return Err(SourceError::SnapshotTooLarge { bytes: text.len(), max: limits.max_bytes });
    }
    if let Some(pos) = text.find('\0') {
        counter!("source_rejected_total", 1u64, "reason" => "unsegmentable");
        warn!(offset = pos, "snapshot rejected: NUL byte");
        return Err(SourceError::Unsegmentable(format!("NUL byte at offset {}", pos)));
    }

    let mut out = Decoding::default();
    let mut seen: FxHashMap<(Collection, ResourceName), usize> = FxHashMap::default();
    for (i, segment) in split(text).into_iter().enumerate() {
        match decode_document(schemas, segment, limits) {
            Ok(doc) => {
                let key = (doc.collection.clone(), doc.name.clone());
                match seen.get(&key) {
                    Some(&at) => {
                        warn!(collection = %doc.collection, name = %doc.name, segment = i, "duplicate resource in snapshot; later document wins");
                        out.docs[at] = doc;
                    }
                    None => {
                        seen.insert(key, out.docs.len());
                        out.docs.push(doc);
                    }
                }
            }
            Err(e) => {
                let reason = e.reason();
                if reason != SkipReason::Empty {
                    debug!(segment = i, reason = reason.as_str(), error = %e, "document skipped");
                }
                counter!("decode_skipped_total", 1u64, "reason" => reason.as_str());
                out.skipped.push((i, reason));
            }
        }
    }
    Ok(out)
}

fn decode_document(schemas: &Schemas, segment: &str, limits: &DecodeLimits) -> Result<Decoded, DocError> {
    let blank = segment.lines().all(|l| {
        let t = l.trim();
        t.is_empty() || t.starts_with('#')
    });
    if blank {
        return Err(DocError::Empty);
    }
    let yaml: serde_yaml::Value = serde_yaml::from_str(segment)?;
    if yaml.is_null() {
        return Err(DocError::Empty);
    }
    if !yaml.is_mapping() {
        return Err(DocError::NotMapping);
    }
    let mut json = yaml_to_json(yaml)?;
    if too_many_nodes(&json, limits.max_nodes) {
        return Err(DocError::TooComplex(limits.max_nodes));
    }

    let api_version = json.get("apiVersion").and_then(Json::as_str).ok_or(DocError::MissingKind)?;
    let kind = json.get("kind").and_then(Json::as_str).ok_or(DocError::MissingKind)?;
    let group = api_version.split_once('/').map(|(g, _)| g).unwrap_or("");
    let schema = schemas
        .find(group, kind)
        .ok_or_else(|| DocError::Unrecognized(format!("{}, Kind={}", api_version, kind)))?;
    schema.validate(&json).map_err(|e| DocError::Invalid(format!("{:#}", e)))?;

    if cfg!(feature = "strip-managed-fields") {
        strip_managed_fields(&mut json);
    }

    let meta = json.get("metadata").and_then(Json::as_object);
    let name = meta
        .and_then(|m| m.get("name"))
        .and_then(Json::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(DocError::MissingName)?
        .to_string();
    let namespace = if schema.is_namespaced() {
        meta.and_then(|m| m.get("namespace")).and_then(Json::as_str).unwrap_or("").to_string()
    } else {
        String::new()
    };
    let creation_ts = meta
        .and_then(|m| m.get("creationTimestamp"))
        .and_then(Json::as_str)
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp())
        .unwrap_or(0);
    let labels: Labels = string_pairs(meta.and_then(|m| m.get("labels"))).into_iter().collect();
    let annotations: Annotations = string_pairs(meta.and_then(|m| m.get("annotations"))).into_iter().collect();

    Ok(Decoded {
        collection: schema.collection().clone(),
        name: ResourceName::new(namespace, name),
        creation_ts,
        labels,
        annotations,
        body: Arc::new(json),
    })
}

/// Convert an untyped YAML tree into JSON. Mapping keys must be strings.
fn yaml_to_json(v: serde_yaml::Value) -> Result<Json, DocError> {
    use serde_yaml::Value as Y;
    Ok(match v {
        Y::Null => Json::Null,
        Y::Bool(b) => Json::Bool(b),
        Y::Number(n) => yaml_number(&n)?,
        Y::String(s) => Json::String(s),
        Y::Sequence(seq) => Json::Array(seq.into_iter().map(yaml_to_json).collect::<Result<_, _>>()?),
        Y::Mapping(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                let Y::String(k) = k else { return Err(DocError::NonStringKey) };
                out.insert(k, yaml_to_json(v)?);
            }
            Json::Object(out)
        }
        Y::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

fn yaml_number(n: &serde_yaml::Number) -> Result<Json, DocError> {
    if let Some(i) = n.as_i64() {
        return Ok(Json::from(i));
    }
    if let Some(u) = n.as_u64() {
        return Ok(Json::from(u));
    }
    n.as_f64()
        .and_then(serde_json::Number::from_f64)
        .map(Json::Number)
        .ok_or(DocError::BadNumber)
}

/// True when `v` holds more than `max` nodes. Stops counting as soon as the budget is spent.
fn too_many_nodes(v: &Json, max: usize) -> bool {
    let mut pending: Vec<&Json> = vec![v];
    let mut seen = 0usize;
    while let Some(node) = pending.pop() {
        seen += 1;
        if seen > max {
            return true;
        }
        match node {
            Json::Object(map) => pending.extend(map.values()),
            Json::Array(items) => pending.extend(items.iter()),
            _ => {}
        }
    }
    false
}

fn strip_managed_fields(v: &mut Json) {
    if let Some(meta) = v.get_mut("metadata").and_then(Json::as_object_mut) {
        meta.remove("managedFields");
    }
}

/// String-valued pairs of a JSON object, sorted by key. Non-string values are dropped.
fn string_pairs(v: Option<&Json>) -> Vec<(String, String)> {
    let Some(obj) = v.and_then(Json::as_object) else { return Vec::new() };
    let mut out: Vec<(String, String)> = obj
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect();
    out.sort();
    out
}
