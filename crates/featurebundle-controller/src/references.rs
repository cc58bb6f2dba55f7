//! Bidirectional index between shared configuration objects and the control
//! resources consuming them.
//!
//! Event handlers use [`ReferenceIndex::consumers_of`] to find which control
//! resources to requeue when a configuration object changes. Lookups are
//! pure in-memory reads and never block on I/O.

use std::collections::{HashMap, HashSet};

use featurebundle_core::ObjectRef;
use parking_lot::Mutex;
use tracing::{debug, error};

#[derive(Debug, Default)]
struct IndexState {
    /// Entry -> control resources consuming it.
    referenced_by: HashMap<ObjectRef, HashSet<String>>,
    /// Control resource -> entries it consumes.
    consumes: HashMap<String, HashSet<ObjectRef>>,
}

impl IndexState {
    /// Returns the first entry of `consumer` whose reverse set does not list it.
    fn diverged_entry(&self, consumer: &str) -> Option<&ObjectRef> {
        self.consumes.get(consumer)?.iter().find(|entry| {
            !self
                .referenced_by
                .get(*entry)
                .is_some_and(|consumers| consumers.contains(consumer))
        })
    }

    fn purge(&mut self, consumer: &str) {
        for consumers in self.referenced_by.values_mut() {
            consumers.remove(consumer);
        }
        self.consumes.remove(consumer);
    }
}

/// Reference index shared by every reconciliation of one controller.
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    state: Mutex<IndexState>,
}

impl ReferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the set of entries consumed by `consumer`.
    ///
    /// Entries dropped from the set stop listing `consumer`; entries nobody
    /// references any more stay in the index with an empty consumer set.
    pub fn update_references<I>(&self, consumer: &str, entries: I)
    where
        I: IntoIterator<Item = ObjectRef>,
    {
        let current: HashSet<ObjectRef> = entries.into_iter().collect();
        let mut state = self.state.lock();

        if let Some(entry) = state.diverged_entry(consumer) {
            error!(
                consumer,
                entry = %entry,
                "Reference index diverged; rebuilding consumer entries"
            );
            state.purge(consumer);
        }

        let previous = state.consumes.remove(consumer).unwrap_or_default();
        for stale in previous.difference(&current) {
            if let Some(consumers) = state.referenced_by.get_mut(stale) {
                consumers.remove(consumer);
            }
        }
        for entry in &current {
            state
                .referenced_by
                .entry(entry.clone())
                .or_default()
                .insert(consumer.to_string());
        }
        debug!(
            consumer,
            entries = current.len(),
            dropped = previous.difference(&current).count(),
            "References updated"
        );
        state.consumes.insert(consumer.to_string(), current);
    }

    /// Control resources currently consuming `entry`.
    pub fn consumers_of(&self, entry: &ObjectRef) -> HashSet<String> {
        self.state
            .lock()
            .referenced_by
            .get(entry)
            .cloned()
            .unwrap_or_default()
    }

    /// Entries currently consumed by `consumer`.
    pub fn references_of(&self, consumer: &str) -> HashSet<ObjectRef> {
        self.state
            .lock()
            .consumes
            .get(consumer)
            .cloned()
            .unwrap_or_default()
    }

    /// Forgets `consumer` entirely.
    pub fn remove_consumer(&self, consumer: &str) {
        let mut state = self.state.lock();
        let previous = state.consumes.remove(consumer).unwrap_or_default();
        for entry in &previous {
            if let Some(consumers) = state.referenced_by.get_mut(entry) {
                consumers.remove(consumer);
            }
        }
    }

    /// Checks that both directions of the index agree.
    pub fn is_consistent(&self) -> bool {
        let state = self.state.lock();
        let forward = state.consumes.iter().all(|(consumer, entries)| {
            entries.iter().all(|entry| {
                state
                    .referenced_by
                    .get(entry)
                    .is_some_and(|consumers| consumers.contains(consumer))
            })
        });
        let backward = state.referenced_by.iter().all(|(entry, consumers)| {
            consumers.iter().all(|consumer| {
                state
                    .consumes
                    .get(consumer)
                    .is_some_and(|entries| entries.contains(entry))
            })
        });
        forward && backward
    }

    #[cfg(test)]
    fn corrupt_reverse_entry(&self, consumer: &str, entry: &ObjectRef) {
        let mut state = self.state.lock();
        if let Some(consumers) = state.referenced_by.get_mut(entry) {
            consumers.remove(consumer);
        }
    }

    #[cfg(test)]
    fn tracks_entry(&self, entry: &ObjectRef) -> bool {
        self.state.lock().referenced_by.contains_key(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cm(name: &str) -> ObjectRef {
        ObjectRef::config_map("default", name)
    }

    fn names(set: HashSet<String>) -> Vec<String> {
        let mut v: Vec<String> = set.into_iter().collect();
        v.sort();
        v
    }

    #[test]
    fn test_update_replaces_previous_entries() {
        let index = ReferenceIndex::new();
        index.update_references("cb-1", [cm("a"), cm("b")]);
        assert_eq!(names(index.consumers_of(&cm("a"))), vec!["cb-1"]);

        index.update_references("cb-1", [cm("b")]);
        assert!(index.consumers_of(&cm("a")).is_empty());
        assert_eq!(names(index.consumers_of(&cm("b"))), vec!["cb-1"]);
        // unreferenced entries keep an empty set
        assert!(index.tracks_entry(&cm("a")));
        assert!(index.is_consistent());
    }

    #[test]
    fn test_shared_entry_lists_every_consumer() {
        let index = ReferenceIndex::new();
        index.update_references("cb-1", [cm("shared"), ObjectRef::policy_role("viewer")]);
        index.update_references("cb-2", [cm("shared")]);

        assert_eq!(
            names(index.consumers_of(&cm("shared"))),
            vec!["cb-1", "cb-2"]
        );
        assert_eq!(
            names(index.consumers_of(&ObjectRef::policy_role("viewer"))),
            vec!["cb-1"]
        );
        assert!(index.consumers_of(&cm("unknown")).is_empty());
    }

    #[test]
    fn test_remove_consumer() {
        let index = ReferenceIndex::new();
        index.update_references("cb-1", [cm("a")]);
        index.update_references("cb-2", [cm("a")]);
        index.remove_consumer("cb-1");

        assert_eq!(names(index.consumers_of(&cm("a"))), vec!["cb-2"]);
        assert!(index.references_of("cb-1").is_empty());
        assert!(index.is_consistent());
    }

    #[test]
    fn test_divergence_is_repaired() {
        let index = ReferenceIndex::new();
        index.update_references("cb-1", [cm("a"), cm("b")]);
        index.corrupt_reverse_entry("cb-1", &cm("a"));
        assert!(!index.is_consistent());

        index.update_references("cb-1", [cm("a"), cm("c")]);
        assert!(index.is_consistent());
        assert_eq!(names(index.consumers_of(&cm("a"))), vec!["cb-1"]);
        assert!(index.consumers_of(&cm("b")).is_empty());
        assert_eq!(names(index.consumers_of(&cm("c"))), vec!["cb-1"]);
    }

    #[test]
    fn test_random_updates_keep_index_consistent() {
        let index = ReferenceIndex::new();
        let consumers = ["cb-1", "cb-2", "cb-3", "cb-4"];
        let entries: Vec<ObjectRef> = (0..8).map(|i| cm(&format!("cm-{i}"))).collect();
        let mut rng = fastrand::Rng::with_seed(7);
        let mut expected: HashMap<&str, HashSet<ObjectRef>> = HashMap::new();

        for _ in 0..500 {
            let consumer = consumers[rng.usize(..consumers.len())];
            if rng.u8(..10) == 0 {
                index.remove_consumer(consumer);
                expected.remove(consumer);
            } else {
                let set: HashSet<ObjectRef> = entries
                    .iter()
                    .filter(|_| rng.bool())
                    .cloned()
                    .collect();
                index.update_references(consumer, set.clone());
                expected.insert(consumer, set);
            }
            assert!(index.is_consistent());
        }

        for entry in &entries {
            let mut want: Vec<String> = expected
                .iter()
                .filter(|(_, set)| set.contains(entry))
                .map(|(c, _)| c.to_string())
                .collect();
            want.sort();
            assert_eq!(names(index.consumers_of(entry)), want);
        }
    }
}
