//! # Outbox
//! The outbox holds at most one pending task per key. Enqueueing a task for a key that already has one replaces it,
//! so a burst of writes to the same record turns into a single remote write of its latest state.

use std::collections::BTreeMap;

use super::{Pending, Queued};

#[derive(Clone, Debug)]
pub struct Outbox<R> {
    tasks: BTreeMap<String, Queued<R>>,
    superseded: usize,
}

impl<R> Default for Outbox<R> {
    fn default() -> Self {
        Self {
            tasks: BTreeMap::new(),
            superseded: 0,
        }
    }
}

impl<R> Outbox<R> {
    pub fn enqueue(
        &mut self,
        key: String,
        pending: Pending<R>,
        now: chrono::DateTime<chrono::Utc>,
    ) {
        let queued = Queued {
            queued_at: now,
            pending,
        };
        if self.tasks.insert(key, queued).is_some() {
            self.superseded += 1;
        }
    }

    /// Takes every pending task, leaving the outbox empty. Tasks come out ordered by key.
    pub fn drain(&mut self) -> Vec<(String, Queued<R>)> {
        std::mem::take(&mut self.tasks).into_iter().collect()
    }

    pub fn get(&self, key: &str) -> Option<&Queued<R>> {
        self.tasks.get(key)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// How many tasks were replaced by a newer task for the same key before being flushed.
    pub fn superseded(&self) -> usize {
        self.superseded
    }
}
