use std::collections::BTreeMap;

use cfgsrc_core::{Collection, Entry, ResourceName};
use rustc_hash::FxHashMap;

/// What one content name currently contributes: per collection, its own copy of each entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentRecord {
    collections: BTreeMap<Collection, FxHashMap<ResourceName, Entry>>,
}

pub(crate) static EMPTY_RECORD: ContentRecord = ContentRecord { collections: BTreeMap::new() };

impl ContentRecord {
    pub fn get(&self, collection: &Collection, name: &ResourceName) -> Option<&Entry> {
        self.collections.get(collection)?.get(name)
    }

    pub fn contains(&self, collection: &Collection, name: &ResourceName) -> bool {
        self.get(collection, name).is_some()
    }

    /// Identities contributed to `collection`, in no particular order.
    pub fn identities<'a>(&'a self, collection: &Collection) -> impl Iterator<Item = &'a ResourceName> + 'a {
        self.collections.get(collection).into_iter().flat_map(|m| m.keys())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Collection, &Entry)> + '_ {
        self.collections.iter().flat_map(|(c, m)| m.values().map(move |e| (c, e)))
    }

    pub fn len(&self) -> usize {
        self.collections.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn insert(&mut self, collection: Collection, entry: Entry) {
        self.collections.entry(collection).or_default().insert(entry.name().clone(), entry);
    }

    pub(crate) fn get_mut(&mut self, collection: &Collection, name: &ResourceName) -> Option<&mut Entry> {
        self.collections.get_mut(collection)?.get_mut(name)
    }
}
