use std::sync::Arc;

use cfgsrc_core::{Event, Handler, Handlers};
use cfgsrc_store::ContentStore;
use metrics::counter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Live,
    /// Terminal: observers stay as they were when stopped.
    Stopped,
}

/// Delivers events to registered handlers, but only while live.
#[derive(Default)]
pub struct Dispatcher {
    handlers: Handlers,
    phase: Phase,
}

impl Dispatcher {
    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.add(handler);
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_live(&self) -> bool {
        self.phase == Phase::Live
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Go live. Per collection: FullSync, then Added for entries applied before start.
    /// Returns false unless the dispatcher was idle; a stopped dispatcher never restarts.
    pub fn start(&mut self, store: &ContentStore) -> bool {
        if self.phase != Phase::Idle {
            return false;
        }
        self.phase = Phase::Live;
        for collection in store.collections() {
            self.deliver(&Event::FullSync(collection.clone()));
            for entry in store.snapshot(collection) {
                self.deliver(&Event::Added(collection.clone(), entry));
            }
        }
        true
    }

    /// Returns false when already stopped.
    pub fn stop(&mut self) -> bool {
        std::mem::replace(&mut self.phase, Phase::Stopped) != Phase::Stopped
    }

    /// Deliver `events` in order. Returns how many were delivered (0 when not live).
    pub fn emit(&self, events: &[Event]) -> usize {
        if !self.is_live() {
            return 0;
        }
        for ev in events {
            self.deliver(ev);
        }
        events.len()
    }

    fn deliver(&self, ev: &Event) {
        counter!("source_events_total", 1u64, "kind" => ev.kind().as_str());
        self.handlers.handle(ev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfgsrc_core::{Accumulator, Collection, EventKind};

    #[test]
    fn stop_before_start_is_terminal() {
        let store = ContentStore::new([Collection::new("a")]);
        let acc = Arc::new(Accumulator::new());
        let mut d = Dispatcher::default();
        d.register(acc.clone());
        assert!(d.stop());
        assert!(!d.start(&store));
        assert!(acc.is_empty());
    }

    #[test]
    fn nothing_is_delivered_until_live() {
        let store = ContentStore::new([Collection::new("b"), Collection::new("a")]);
        let acc = Arc::new(Accumulator::new());
        let mut d = Dispatcher::default();
        d.register(acc.clone());

        assert_eq!(d.emit(&[Event::FullSync(Collection::new("a"))]), 0);
        assert!(acc.is_empty());

        assert!(!d.is_live());
        assert!(d.start(&store));
        assert!(d.is_live());
        assert!(!d.start(&store));
        let kinds: Vec<(EventKind, String)> =
            acc.events().iter().map(|e| (e.kind(), e.collection().to_string())).collect();
        assert_eq!(kinds, vec![(EventKind::FullSync, "a".to_string()), (EventKind::FullSync, "b".to_string())]);

        assert!(d.stop());
        assert!(!d.stop());
        assert_eq!(d.phase(), Phase::Stopped);
        assert_eq!(d.emit(&[Event::FullSync(Collection::new("a"))]), 0);
        assert!(!d.start(&store));
        assert_eq!(acc.len(), 2);
    }
}
