//! In-RAM content/collection store: live entries per collection plus, per content name,
//! the entries it contributed, so a later snapshot (or removal) touches exactly its own.
//!
//! Several content names may contribute the same identity. Each keeps its own copy; the
//! live entry belongs to whichever most recently added or changed it. Ownership falls
//! back to the most recent remaining contributor when the owner lets go, and the entry is
//! deleted only when nobody contributes it any more.

#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use cfgsrc_core::{Collection, Entry, Event, ResourceName, Version};
use cfgsrc_decode::Decoded;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

mod diff;
mod record;
mod version;

pub use diff::{diff, Change, ChangeSet};
pub use record::ContentRecord;
pub use version::VersionAllocator;

use record::EMPTY_RECORD;

#[derive(Debug)]
struct Slot {
    entry: Entry,
    owner: String,
    /// Ordered by recency of contribution; the last one is the fallback owner.
    contributors: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ContentStore {
    collections: BTreeMap<Collection, FxHashMap<ResourceName, Slot>>,
    contents: BTreeMap<String, ContentRecord>,
    versions: VersionAllocator,
}

impl ContentStore {
    pub fn new<I: IntoIterator<Item = Collection>>(collections: I) -> Self {
        Self {
            collections: collections.into_iter().map(|c| (c, FxHashMap::default())).collect(),
            ..Self::default()
        }
    }

    /// Known collections in name order.
    pub fn collections(&self) -> impl Iterator<Item = &Collection> + '_ {
        self.collections.keys()
    }

    /// Previous contribution of `content`; empty for names never applied.
    pub fn record_for(&self, content: &str) -> &ContentRecord {
        self.contents.get(content).unwrap_or(&EMPTY_RECORD)
    }

    pub fn content_names(&self) -> BTreeSet<String> {
        self.contents.keys().cloned().collect()
    }

    /// Live entries of `collection` sorted by identity. Unknown collections are empty.
    pub fn snapshot(&self, collection: &Collection) -> Vec<Entry> {
        let Some(slots) = self.collections.get(collection) else { return Vec::new() };
        let mut out: Vec<Entry> = slots.values().map(|s| s.entry.clone()).collect();
        out.sort_by(|a, b| a.name().cmp(b.name()));
        out
    }

    /// Total live entries across collections.
    pub fn len(&self) -> usize {
        self.collections.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_version(&self) -> Option<Version> {
        self.versions.last()
    }

    /// Swap `content`'s previous contribution for `docs`. Returns the events to emit:
    /// Added/Updated in decode order, then Deleted.
    pub fn replace(&mut self, content: &str, docs: Vec<Decoded>) -> Vec<Event> {
        let set = diff(self.record_for(content), docs);
        debug!(
            content,
            added = set.added(),
            updated = set.updated(),
            unchanged = set.unchanged(),
            deleted = set.deleted.len(),
            "content diffed"
        );

        let mut record = ContentRecord::default();
        let mut events = Vec::new();
        for change in set.changes {
            match change {
                Change::Added(doc) | Change::Updated { doc, .. } => {
                    let (entry, ev) = self.admit(content, &doc);
                    record.insert(doc.collection, entry);
                    events.extend(ev);
                }
                Change::Unchanged { collection, entry } => record.insert(collection, entry),
            }
        }
        for (collection, entry) in set.deleted.iter() {
            events.extend(self.release(content, collection, entry.name()));
        }
        self.contents.insert(content.to_string(), record);
        events
    }

    /// Drop everything `content` contributed along with its record.
    pub fn remove_all(&mut self, content: &str) -> Vec<Event> {
        let Some(record) = self.contents.remove(content) else { return Vec::new() };
        let mut events = Vec::new();
        for (collection, entry) in record.iter() {
            events.extend(self.release(content, collection, entry.name()));
        }
        events
    }

    /// Drop all records and entries. Returns a Deleted event per live entry, ordered by
    /// collection then identity. The version counter keeps counting.
    pub fn clear(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        for (collection, slots) in self.collections.iter_mut() {
            let mut entries: Vec<Entry> = slots.drain().map(|(_, s)| s.entry).collect();
            entries.sort_by(|a, b| a.name().cmp(b.name()));
            events.extend(entries.into_iter().map(|e| Event::Deleted(collection.clone(), e)));
        }
        self.contents.clear();
        events
    }

    /// Install a document that `content` newly contributes or changed.
    fn admit(&mut self, content: &str, doc: &Decoded) -> (Entry, Option<Event>) {
        let slots = self.collections.entry(doc.collection.clone()).or_default();
        match slots.get_mut(&doc.name) {
            None => {
                let entry = doc.to_entry(self.versions.next());
                debug!(content, collection = %doc.collection, name = %doc.name, version = %entry.version(), "entry added");
                slots.insert(
                    doc.name.clone(),
                    Slot { entry: entry.clone(), owner: content.to_string(), contributors: vec![content.to_string()] },
                );
                (entry.clone(), Some(Event::Added(doc.collection.clone(), entry)))
            }
            Some(slot) => {
                slot.contributors.retain(|c| c != content);
                slot.contributors.push(content.to_string());
                if slot.entry.body == doc.body {
                    // identical to the live entry: join without a new version
                    return (slot.entry.clone(), None);
                }
                let entry = doc.to_entry(self.versions.next());
                debug!(content, collection = %doc.collection, name = %doc.name, version = %entry.version(), "entry updated");
                slot.entry = entry.clone();
                slot.owner = content.to_string();
                (entry.clone(), Some(Event::Updated(doc.collection.clone(), entry)))
            }
        }
    }

    /// `content` stops contributing `name`.
    fn release(&mut self, content: &str, collection: &Collection, name: &ResourceName) -> Option<Event> {
        let slots = self.collections.get_mut(collection)?;
        let slot = slots.get_mut(name)?;
        slot.contributors.retain(|c| c != content);
        let next_owner = match slot.contributors.last() {
            Some(c) => c.clone(),
            None => {
                let gone = slots.remove(name)?;
                debug!(content, collection = %collection, name = %name, "entry deleted");
                return Some(Event::Deleted(collection.clone(), gone.entry));
            }
        };
        if slot.owner != content {
            return None;
        }
        slot.owner = next_owner.clone();

        let Some(candidate) = self.contents.get(&next_owner).and_then(|r| r.get(collection, name)) else {
            warn!(collection = %collection, name = %name, owner = %next_owner, "contributor without a record");
            return None;
        };
        if candidate.body == slot.entry.body {
            return None;
        }
        let entry = candidate.with_version(self.versions.next());
        debug!(collection = %collection, name = %name, owner = %next_owner, version = %entry.version(), "entry reverted to remaining contributor");
        slot.entry = entry.clone();
        if let Some(e) = self.contents.get_mut(&next_owner).and_then(|r| r.get_mut(collection, name)) {
            *e = entry.clone();
        }
        Some(Event::Updated(collection.clone(), entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn c1() -> Collection {
        Collection::new("collection1")
    }

    fn doc(name: &str, value: &str) -> Decoded {
        Decoded {
            collection: c1(),
            name: ResourceName::new("ns", name),
            creation_ts: 0,
            labels: Default::default(),
            annotations: Default::default(),
            body: Arc::new(serde_json::json!({ "metadata": { "name": name }, "spec": { "v": value } })),
        }
    }

    fn summary(events: &[Event]) -> Vec<String> {
        events
            .iter()
            .map(|e| match e.entry() {
                Some(en) => format!("{:?}({}@{})", e.kind(), en.name().name, en.version()),
                None => format!("{:?}", e.kind()),
            })
            .collect()
    }

    #[test]
    fn record_for_unknown_content_is_empty() {
        let s = ContentStore::new([c1()]);
        assert!(s.record_for("nope").is_empty());
        assert!(s.content_names().is_empty());
    }

    #[test]
    fn shared_identity_joins_silently_and_survives_removal() {
        let mut s = ContentStore::new([c1()]);
        assert_eq!(summary(&s.replace("foo", vec![doc("a", "1")])), vec!["Added(a@v1)"]);
        assert!(s.replace("bar", vec![doc("a", "1")]).is_empty());

        assert!(s.remove_all("foo").is_empty());
        let live = s.snapshot(&c1());
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].version(), Version::new(1));

        assert_eq!(summary(&s.remove_all("bar")), vec!["Deleted(a@v1)"]);
        assert!(s.is_empty());
    }

    #[test]
    fn last_writer_wins_and_falls_back_on_removal() {
        let mut s = ContentStore::new([c1()]);
        s.replace("foo", vec![doc("a", "foo")]);
        assert_eq!(summary(&s.replace("bar", vec![doc("a", "bar")])), vec!["Updated(a@v2)"]);
        assert_eq!(s.snapshot(&c1())[0].body["spec"]["v"], "bar");

        // re-applying the non-owner unchanged does not take ownership
        assert!(s.replace("foo", vec![doc("a", "foo")]).is_empty());
        assert_eq!(s.snapshot(&c1())[0].body["spec"]["v"], "bar");

        // owner leaves: the remaining contributor's body comes back with a new version
        assert_eq!(summary(&s.remove_all("bar")), vec!["Updated(a@v3)"]);
        assert_eq!(s.snapshot(&c1())[0].body["spec"]["v"], "foo");
        assert_eq!(s.record_for("foo").get(&c1(), &ResourceName::new("ns", "a")).map(|e| e.version()), Some(Version::new(3)));
    }

    #[test]
    fn removing_non_owner_leaves_live_entry_alone() {
        let mut s = ContentStore::new([c1()]);
        s.replace("foo", vec![doc("a", "foo")]);
        s.replace("bar", vec![doc("a", "bar")]);
        assert!(s.remove_all("foo").is_empty());
        assert_eq!(s.snapshot(&c1())[0].body["spec"]["v"], "bar");
        assert_eq!(s.content_names().into_iter().collect::<Vec<_>>(), vec!["bar".to_string()]);
    }

    #[test]
    fn clear_keeps_counting_versions() {
        let mut s = ContentStore::new([c1()]);
        s.replace("foo", vec![doc("b", "1"), doc("a", "1")]);
        assert_eq!(summary(&s.clear()), vec!["Deleted(a@v2)", "Deleted(b@v1)"]);
        assert!(s.is_empty());
        assert!(s.content_names().is_empty());
        assert_eq!(summary(&s.replace("foo", vec![doc("a", "1")])), vec!["Added(a@v3)"]);
    }

    #[test]
    fn snapshot_of_unknown_collection_is_empty() {
        let s = ContentStore::new([c1()]);
        assert!(s.snapshot(&Collection::new("other")).is_empty());
        assert_eq!(s.collections().count(), 1);
    }
}
