//! Change notifications published once per committed transaction.

use std::path::PathBuf;

use parking_lot::Mutex;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypesEvent {
    pub root: PathBuf,
    /// Module the root belongs to, when known.
    pub module: Option<String>,
    /// Dotted class names, sorted.
    pub types: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RootsEvent {
    pub roots: Vec<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexEvent {
    RootsAdded(RootsEvent),
    TypesRemoved(TypesEvent),
    TypesAdded(TypesEvent),
    TypesChanged(TypesEvent),
    RootsRemoved(RootsEvent),
}

impl IndexEvent {
    /// Root of a types event.
    pub fn root(&self) -> Option<&PathBuf> {
        match self {
            IndexEvent::TypesRemoved(event)
            | IndexEvent::TypesAdded(event)
            | IndexEvent::TypesChanged(event) => Some(&event.root),
            IndexEvent::RootsAdded(_) | IndexEvent::RootsRemoved(_) => None,
        }
    }
}

pub trait ClassIndexListener: Send + Sync {
    fn on_event(&self, event: &IndexEvent);
}

impl<F> ClassIndexListener for F
where
    F: Fn(&IndexEvent) + Send + Sync,
{
    fn on_event(&self, event: &IndexEvent) {
        self(event)
    }
}

/// Listener that keeps every event it receives.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<IndexEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<IndexEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl ClassIndexListener for EventLog {
    fn on_event(&self, event: &IndexEvent) {
        self.events.lock().push(event.clone());
    }
}
