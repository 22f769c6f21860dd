//! # DirtyTracker
//! A DirtyTracker wraps the record map and remembers which keys changed since listeners were last notified.
//! Consumers such as a review dashboard use the notification to know when to re-compute derived data.

use std::collections::BTreeSet;
use std::ops::{Deref, DerefMut};

use crate::data_model::ListenerKey;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DirtyState {
    /// Not dirty, no pending notifications
    Clean,
    /// Dirty. `except` is the listener that caused every change so far, which does not need to hear about them.
    Dirty {
        except: Option<ListenerKey>,
        keys: BTreeSet<String>,
    },
}

impl DirtyState {
    fn mark(&mut self, key: &str, modifier: Option<ListenerKey>) {
        match self {
            DirtyState::Clean => {
                *self = DirtyState::Dirty {
                    except: modifier,
                    keys: BTreeSet::from([key.to_string()]),
                };
            }
            DirtyState::Dirty { except, keys } => {
                if *except != modifier {
                    *except = None;
                }
                keys.insert(key.to_string());
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct DirtyTracker<Store> {
    store: Store,
    dirty_state: DirtyState,
}

impl<Store: Default> Default for DirtyTracker<Store> {
    fn default() -> Self {
        Self::new(Store::default())
    }
}

/// Smart pointer that marks a key as dirty when dereferenced mutably
pub struct DirtyOnDerefMut<'a, Store> {
    store: &'a mut Store,
    dirty_state: &'a mut DirtyState,
    key: &'a str,
    modifier: Option<ListenerKey>,
}

impl<Store> Deref for DirtyOnDerefMut<'_, Store> {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        self.store
    }
}

impl<Store> DerefMut for DirtyOnDerefMut<'_, Store> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.dirty_state.mark(self.key, self.modifier);
        self.store
    }
}

impl<Store> DirtyTracker<Store> {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            dirty_state: DirtyState::Clean,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn dirty_state(&self) -> &DirtyState {
        &self.dirty_state
    }

    /// Mutable access scoped to one key. Only an actual mutable dereference marks the key dirty.
    pub(crate) fn store_mut<'a>(
        &'a mut self,
        key: &'a str,
        modifier: Option<ListenerKey>,
    ) -> DirtyOnDerefMut<'a, Store> {
        DirtyOnDerefMut {
            store: &mut self.store,
            dirty_state: &mut self.dirty_state,
            key,
            modifier,
        }
    }

    /// Returns the accumulated dirty state and resets it to clean.
    pub(crate) fn take_dirty(&mut self) -> DirtyState {
        std::mem::replace(&mut self.dirty_state, DirtyState::Clean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_access_stays_clean() {
        let mut tracker = DirtyTracker::new(vec![1, 2, 3]);
        let len = tracker.store_mut("a", None).len();
        assert_eq!(len, 3);
        assert_eq!(tracker.dirty_state(), &DirtyState::Clean);
    }

    #[test]
    fn test_mutation_collects_keys() {
        let mut tracker = DirtyTracker::new(Vec::<u32>::new());
        tracker.store_mut("a", None).push(1);
        tracker.store_mut("b", None).push(2);

        assert_eq!(
            tracker.take_dirty(),
            DirtyState::Dirty {
                except: None,
                keys: BTreeSet::from(["a".to_string(), "b".to_string()]),
            }
        );
        assert_eq!(tracker.dirty_state(), &DirtyState::Clean);
    }
}
