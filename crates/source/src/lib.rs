//! In-memory configuration source.
//!
//! Callers submit whole multi-document snapshots under a content name; the source diffs
//! each against what that name contributed before, stamps new or changed resources with
//! a source-wide version, and emits exactly the Added/Updated/Deleted events needed to
//! keep observers in sync.
//!
//! Every mutation (and `start`/`stop`) holds one exclusive lock for its diff-and-emit
//! work, so mutations are serialized and observably atomic; reads take the lock shared.
//! Handlers run synchronously under that lock and must not call back into the source.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use cfgsrc_core::{Collection, Entry, Handler, SourceError};
use cfgsrc_decode::{DecodeLimits, SkipReason};
use cfgsrc_schema::Schemas;
use cfgsrc_store::ContentStore;
use metrics::{counter, gauge, histogram};
use parking_lot::RwLock;
use tracing::{debug, info};

mod channel;
mod dispatch;

pub use channel::{channel, ChannelHandler};
pub use dispatch::{Dispatcher, Phase};

struct State {
    store: ContentStore,
    dispatcher: Dispatcher,
}

/// Source scoped to a fixed set of recognized collections.
pub struct KubeSource {
    schemas: Schemas,
    limits: DecodeLimits,
    state: RwLock<State>,
}

impl KubeSource {
    /// Decode limits are taken from the environment (`CFGSRC_MAX_YAML_*`).
    pub fn new(schemas: Schemas) -> Self {
        Self::with_limits(schemas, DecodeLimits::from_env())
    }

    pub fn with_limits(schemas: Schemas, limits: DecodeLimits) -> Self {
        let store = ContentStore::new(schemas.collections().cloned());
        Self { schemas, limits, state: RwLock::new(State { store, dispatcher: Dispatcher::default() }) }
    }

    pub fn schemas(&self) -> &Schemas {
        &self.schemas
    }

    /// Register an observer. Only observers registered before `start` see FullSync.
    pub fn dispatch(&self, handler: Arc<dyn Handler>) {
        self.state.write().dispatcher.register(handler);
    }

    /// Emit FullSync for every collection (followed by Added for anything applied
    /// beforehand) and go live. No-op when already started or once stopped.
    pub fn start(&self) {
        let mut guard = self.state.write();
        let State { store, dispatcher } = &mut *guard;
        if dispatcher.start(store) {
            info!(collections = self.schemas.len(), handlers = dispatcher.handler_count(), "source started");
        } else {
            debug!(phase = ?dispatcher.phase(), "start ignored");
        }
    }

    /// Stop emitting events for good. Idempotent; state keeps being maintained and stays
    /// readable, but observers receive nothing further.
    pub fn stop(&self) {
        if self.state.write().dispatcher.stop() {
            info!("source stopped");
        }
    }

    /// Decode `yaml`, diff it against `name`'s previous contribution, update and emit.
    /// Fails only when the snapshot as a whole is rejected, in which case nothing changes.
    pub fn apply_content(&self, name: &str, yaml: &str) -> Result<(), SourceError> {
        let t0 = Instant::now();
        let decoded = cfgsrc_decode::decode(&self.schemas, yaml, &self.limits)?;
        let docs = decoded.docs.len();
        let skipped = decoded.skipped.iter().filter(|(_, r)| *r != SkipReason::Empty).count();

        let mut st = self.state.write();
        let events = st.store.replace(name, decoded.docs);
        let delivered = st.dispatcher.emit(&events);
        gauge!("source_entries", st.store.len() as f64);
        drop(st);

        counter!("source_apply_total", 1u64);
        histogram!("source_apply_ms", t0.elapsed().as_secs_f64() * 1000.0);
        debug!(content = name, docs, skipped, changes = events.len(), delivered, "content applied");
        Ok(())
    }

    /// Drop exactly what `name` contributed.
    pub fn remove_content(&self, name: &str) {
        let mut st = self.state.write();
        let events = st.store.remove_all(name);
        st.dispatcher.emit(&events);
        gauge!("source_entries", st.store.len() as f64);
        debug!(content = name, deleted = events.len(), "content removed");
    }

    /// Drop all content, emitting Deleted for every live entry.
    pub fn clear(&self) {
        let mut st = self.state.write();
        let events = st.store.clear();
        st.dispatcher.emit(&events);
        gauge!("source_entries", 0.0);
        info!(deleted = events.len(), "source cleared");
    }

    pub fn content_names(&self) -> BTreeSet<String> {
        self.state.read().store.content_names()
    }

    /// View over one collection. Unknown collections read as empty.
    pub fn get(&self, collection: impl Into<Collection>) -> View<'_> {
        View { source: self, collection: collection.into() }
    }
}

/// Read access to one collection of a source.
pub struct View<'a> {
    source: &'a KubeSource,
    collection: Collection,
}

impl View<'_> {
    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Point-in-time copy of the live entries, sorted by namespace then name.
    pub fn all_sorted(&self) -> Vec<Entry> {
        self.source.state.read().store.snapshot(&self.collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfgsrc_core::{Accumulator, EventKind};
    use cfgsrc_schema::builtin;

    const DOC: &str = "apiVersion: testdata.cfgsrc.io/v1alpha1\nkind: Kind1\nmetadata:\n  namespace: n1\n  name: i1\nspec:\n  n1_i1: v1\n";

    #[test]
    fn mutations_before_start_are_replayed_after_full_sync() {
        let s = KubeSource::with_limits(builtin::basic(), DecodeLimits::default());
        let acc = Arc::new(Accumulator::new());
        s.dispatch(acc.clone());
        s.apply_content("foo", DOC).expect("apply");
        assert!(acc.is_empty());

        s.start();
        let kinds: Vec<EventKind> = acc.events().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec![EventKind::FullSync, EventKind::Added]);
    }

    #[test]
    fn stopped_source_keeps_state_but_emits_nothing() {
        let s = KubeSource::with_limits(builtin::basic(), DecodeLimits::default());
        let acc = Arc::new(Accumulator::new());
        s.dispatch(acc.clone());
        s.start();
        s.stop();
        s.stop();
        s.apply_content("foo", DOC).expect("apply");
        assert_eq!(acc.len(), 1);
        assert_eq!(s.get(builtin::COLLECTION1).all_sorted().len(), 1);
    }

    #[test]
    fn rejected_snapshot_changes_nothing() {
        let limits = DecodeLimits { max_bytes: 32, ..DecodeLimits::default() };
        let s = KubeSource::with_limits(builtin::basic(), limits);
        let err = s.apply_content("foo", DOC).unwrap_err();
        assert!(matches!(err, SourceError::SnapshotTooLarge { .. }));
        assert!(s.content_names().is_empty());
    }
}
