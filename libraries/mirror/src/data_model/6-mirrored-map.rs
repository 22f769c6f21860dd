//! # MirroredMap
//! The local, authoritative map of records. Every local mutation leaves a pending task in the outbox.
//! Records pulled from the remote overwrite local ones without going through the outbox, so a pull never echoes back.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::data_model::{
    DirtyState, DirtyTracker, ListenerKey, Outbox, Pending, Queued, Record, SyncState, SyncTarget,
};

type Listener = Arc<dyn Fn(ListenerKey, &BTreeSet<String>)>;

pub struct MirroredMap<R: Record> {
    records: DirtyTracker<im::OrdMap<String, R>>,
    outbox: Outbox<R>,
    listeners: slotmap::SlotMap<slotmap::DefaultKey, Listener>,

    /// Updated whenever a sync with a target starts or finishes.
    sync_states: HashMap<SyncTarget, SyncState>,
}

impl<R: Record> Default for MirroredMap<R> {
    fn default() -> Self {
        Self::from_records(im::OrdMap::new())
    }
}

impl<R: Record> MirroredMap<R> {
    /// Wraps records loaded from local storage. Loading does not count as a change and queues nothing.
    pub fn from_records(records: im::OrdMap<String, R>) -> Self {
        Self {
            records: DirtyTracker::new(records),
            outbox: Outbox::default(),
            listeners: Default::default(),
            sync_states: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&R> {
        self.records.store().get(key)
    }

    /// A snapshot of every record. This is O(1): the snapshot shares structure with the live map.
    pub fn snapshot(&self) -> im::OrdMap<String, R> {
        self.records.store().clone()
    }

    pub fn len(&self) -> usize {
        self.records.store().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.store().is_empty()
    }

    pub fn insert(
        &mut self,
        key: String,
        record: R,
        now: chrono::DateTime<chrono::Utc>,
        modifier: Option<ListenerKey>,
    ) -> Option<R> {
        self.outbox
            .enqueue(key.clone(), Pending::Upsert(record.clone()), now);
        let mut store = self.records.store_mut(&key, modifier);
        store.insert(key.clone(), record)
    }

    /// Removes the record locally and queues a remote delete.
    /// The delete is queued even when nothing was stored locally, since the remote may still hold a copy.
    pub fn remove(
        &mut self,
        key: &str,
        now: chrono::DateTime<chrono::Utc>,
        modifier: Option<ListenerKey>,
    ) -> Option<R> {
        self.outbox.enqueue(key.to_string(), Pending::Delete, now);
        if !self.records.store().contains_key(key) {
            return None;
        }
        let mut store = self.records.store_mut(key, modifier);
        store.remove(key)
    }

    /// Applies rows pulled from the remote with the "last pull wins" policy: every accepted row replaces the
    /// local record for its key as a whole. Local records without a remote row are left alone.
    ///
    /// Returns the number of local records that actually changed.
    pub fn overwrite_from_remote(
        &mut self,
        rows: Vec<(String, R)>,
        accept: impl Fn(&str) -> bool,
        modifier: Option<ListenerKey>,
    ) -> usize {
        let mut changed = 0;
        for (key, record) in rows {
            if !accept(&key) {
                continue;
            }
            if self.records.store().get(&key) == Some(&record) {
                continue;
            }
            let mut store = self.records.store_mut(&key, modifier);
            store.insert(key.clone(), record);
            changed += 1;
        }
        changed
    }

    pub fn outbox(&self) -> &Outbox<R> {
        &self.outbox
    }

    pub fn drain_outbox(&mut self) -> Vec<(String, Queued<R>)> {
        self.outbox.drain()
    }

    pub fn dirty_state(&self) -> &DirtyState {
        self.records.dirty_state()
    }
}

impl<R: Record + 'static> MirroredMap<R> {
    /// The listener is invoked with the set of changed keys whenever notifications are drained.
    pub fn register_listener(
        &mut self,
        listener: impl Fn(ListenerKey, &BTreeSet<String>) + 'static,
    ) -> ListenerKey {
        let key = self.listeners.insert(Arc::new(listener));
        ListenerKey(key)
    }

    pub fn unregister_listener(&mut self, token: ListenerKey) {
        self.listeners.remove(token.0);
    }

    /// Collects the notifications owed to listeners without calling them.
    /// Call the returned closures after releasing any borrow of the map, since listeners often read it again.
    pub fn drain_due_notifications(&mut self) -> Vec<Box<dyn FnOnce()>> {
        let (exclude_key, keys) = match self.records.take_dirty() {
            DirtyState::Clean => return Vec::new(),
            DirtyState::Dirty { except, keys } => (except, Arc::new(keys)),
        };

        let mut notifications: Vec<Box<dyn FnOnce()>> = Vec::new();
        for (key, listener) in self.listeners.iter() {
            let listener_key = ListenerKey(key);
            if exclude_key == Some(listener_key) {
                continue;
            }
            let listener = listener.clone();
            let keys = keys.clone();
            notifications.push(Box::new(move || listener(listener_key, &keys)));
        }
        notifications
    }
}

impl<R: Record> MirroredMap<R> {
    pub fn sync_state(&self, target: SyncTarget) -> Option<&SyncState> {
        self.sync_states.get(&target)
    }

    pub fn mark_sync_started(&mut self, target: SyncTarget) {
        let state = self.sync_states.entry(target).or_default();
        state.last_sync_started = Some(chrono::Utc::now());
    }

    pub fn mark_sync_finished(&mut self, target: SyncTarget, error: Option<String>) {
        let state = self.sync_states.entry(target).or_default();
        state.last_sync_finished = Some(chrono::Utc::now());
        state.last_sync_error = error;
    }
}
