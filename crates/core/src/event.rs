//! Events delivered to observers of a source and the observer capability itself.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{Collection, Entry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    FullSync,
    Added,
    Updated,
    Deleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::FullSync => "full_sync",
            EventKind::Added => "added",
            EventKind::Updated => "updated",
            EventKind::Deleted => "deleted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// Initial state for the collection has been delivered.
    FullSync(Collection),
    Added(Collection, Entry),
    Updated(Collection, Entry),
    Deleted(Collection, Entry),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::FullSync(_) => EventKind::FullSync,
            Event::Added(..) => EventKind::Added,
            Event::Updated(..) => EventKind::Updated,
            Event::Deleted(..) => EventKind::Deleted,
        }
    }

    pub fn collection(&self) -> &Collection {
        match self {
            Event::FullSync(c) | Event::Added(c, _) | Event::Updated(c, _) | Event::Deleted(c, _) => c,
        }
    }

    pub fn entry(&self) -> Option<&Entry> {
        match self {
            Event::FullSync(_) => None,
            Event::Added(_, e) | Event::Updated(_, e) | Event::Deleted(_, e) => Some(e),
        }
    }
}

/// Observer of source events. Called synchronously on the mutating caller's thread while
/// the source holds its exclusive lock: implementations must not call back into the source.
pub trait Handler: Send + Sync {
    fn handle(&self, event: &Event);
}

/// Fan-out list of registered handlers.
#[derive(Default, Clone)]
pub struct Handlers {
    list: Vec<Arc<dyn Handler>>,
}

impl Handlers {
    pub fn add(&mut self, h: Arc<dyn Handler>) {
        self.list.push(h);
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

impl Handler for Handlers {
    fn handle(&self, event: &Event) {
        for h in self.list.iter() {
            h.handle(event);
        }
    }
}

/// Handler that records every event, for assertions in tests and tooling.
#[derive(Default)]
pub struct Accumulator {
    events: Mutex<Vec<Event>>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Handler for Accumulator {
    fn handle(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}
