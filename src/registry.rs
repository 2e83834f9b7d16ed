//! Name-keyed, priority-ordered component registry.
//!
//! Every extension point of the bus (classifiers, handlers, notifiers,
//! recovery strategies) is stored in a [`Registry`]. Registering a component
//! under a name that is already taken replaces the previous one, and the
//! replacement counts as a fresh registration for tie-breaking.

use std::collections::HashMap;
use std::sync::Arc;

/// Identity shared by all pluggable pipeline components.
pub trait Component: Send + Sync {
    /// Registry key. Must be stable for the lifetime of the component.
    fn name(&self) -> &str;

    /// Higher runs first. Defaults to 0.
    fn priority(&self) -> i32 {
        0
    }
}

struct Entry<T: ?Sized> {
    component: Arc<T>,
    seq: u64,
}

/// Registry of components keyed by [`Component::name`].
pub struct Registry<T: ?Sized + Component> {
    entries: HashMap<String, Entry<T>>,
    next_seq: u64,
}

impl<T: ?Sized + Component> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + Component> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Registers a component, returning the one it replaced, if any.
    pub fn register(&mut self, component: Arc<T>) -> Option<Arc<T>> {
        let name = component.name().to_string();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries
            .insert(name, Entry { component, seq })
            .map(|previous| previous.component)
    }

    /// Removes a component by name.
    pub fn remove(&mut self, name: &str) -> Option<Arc<T>> {
        self.entries.remove(name).map(|entry| entry.component)
    }

    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.entries.get(name).map(|entry| Arc::clone(&entry.component))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Components in execution order: descending priority, then registration
    /// order.
    pub fn ordered(&self) -> Vec<Arc<T>> {
        let mut entries: Vec<&Entry<T>> = self.entries.values().collect();
        entries.sort_by(|a, b| {
            b.component
                .priority()
                .cmp(&a.component.priority())
                .then(a.seq.cmp(&b.seq))
        });
        entries
            .into_iter()
            .map(|entry| Arc::clone(&entry.component))
            .collect()
    }

    /// Names in execution order.
    pub fn names(&self) -> Vec<String> {
        self.ordered()
            .iter()
            .map(|component| component.name().to_string())
            .collect()
    }
}
