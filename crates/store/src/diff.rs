//! Classification of a content name's new contribution against its previous one.

use cfgsrc_core::{Collection, Entry, ResourceName};
use cfgsrc_decode::Decoded;
use rustc_hash::FxHashSet;

use crate::ContentRecord;

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Not contributed before by this content name.
    Added(Decoded),
    /// Contributed before with a different body.
    Updated { doc: Decoded, previous: Entry },
    /// Contributed before with an identical body; keeps its version.
    Unchanged { collection: Collection, entry: Entry },
}

impl Change {
    pub fn collection(&self) -> &Collection {
        match self {
            Change::Added(doc) | Change::Updated { doc, .. } => &doc.collection,
            Change::Unchanged { collection, .. } => collection,
        }
    }

    pub fn name(&self) -> &ResourceName {
        match self {
            Change::Added(doc) | Change::Updated { doc, .. } => &doc.name,
            Change::Unchanged { entry, .. } => entry.name(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// Added/Updated/Unchanged in decode order of the new snapshot.
    pub changes: Vec<Change>,
    /// Previously contributed entries absent from the new snapshot, in no particular order.
    pub deleted: Vec<(Collection, Entry)>,
}

impl ChangeSet {
    pub fn added(&self) -> usize {
        self.changes.iter().filter(|c| matches!(c, Change::Added(_))).count()
    }

    pub fn updated(&self) -> usize {
        self.changes.iter().filter(|c| matches!(c, Change::Updated { .. })).count()
    }

    pub fn unchanged(&self) -> usize {
        self.changes.iter().filter(|c| matches!(c, Change::Unchanged { .. })).count()
    }

    /// True when applying the set changes nothing.
    pub fn is_noop(&self) -> bool {
        self.deleted.is_empty() && self.changes.iter().all(|c| matches!(c, Change::Unchanged { .. }))
    }
}

/// Diff a content name's previous record against its newly decoded documents.
/// Bodies are compared structurally; versions play no part.
pub fn diff(previous: &ContentRecord, docs: Vec<Decoded>) -> ChangeSet {
    let mut present: FxHashSet<(Collection, ResourceName)> = FxHashSet::default();
    let mut changes = Vec::with_capacity(docs.len());
    for doc in docs {
        present.insert((doc.collection.clone(), doc.name.clone()));
        let change = match previous.get(&doc.collection, &doc.name) {
            None => Change::Added(doc),
            Some(prev) if prev.body == doc.body => {
                Change::Unchanged { collection: doc.collection, entry: prev.clone() }
            }
            Some(prev) => Change::Updated { previous: prev.clone(), doc },
        };
        changes.push(change);
    }
    let deleted = previous
        .iter()
        .filter(|(c, e)| !present.contains(&((*c).clone(), e.name().clone())))
        .map(|(c, e)| (c.clone(), e.clone()))
        .collect();
    ChangeSet { changes, deleted }
}
