//! An in-process remote. Useful for tests and for running without a backend.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use crate::data_model::{Principal, Record, SyncTarget};
use crate::{RemoteError, RemoteStore};

pub struct MemoryRemote<R> {
    rows: RefCell<BTreeMap<(String, String), R>>,
    available: Cell<bool>,
    writes: Cell<usize>,
}

impl<R> Default for MemoryRemote<R> {
    fn default() -> Self {
        Self {
            rows: RefCell::new(BTreeMap::new()),
            available: Cell::new(true),
            writes: Cell::new(0),
        }
    }
}

impl<R> MemoryRemote<R> {
    /// While unavailable, every call fails as if the network were down.
    pub fn set_available(&self, available: bool) {
        self.available.set(available);
    }

    /// Number of upserts and deletes that reached the store.
    pub fn writes(&self) -> usize {
        self.writes.get()
    }

    fn check_available(&self) -> Result<(), RemoteError> {
        if self.available.get() {
            Ok(())
        } else {
            Err(RemoteError::Unavailable("memory remote is offline".to_string()))
        }
    }
}

impl<R: Clone> MemoryRemote<R> {
    pub fn get(&self, principal: &Principal, key: &str) -> Option<R> {
        self.rows
            .borrow()
            .get(&(principal.column_value(), key.to_string()))
            .cloned()
    }
}

impl<R: Record> RemoteStore<R> for MemoryRemote<R> {
    fn target(&self) -> SyncTarget {
        SyncTarget::Memory
    }

    async fn upsert(&self, principal: &Principal, key: &str, record: &R) -> Result<(), RemoteError> {
        self.check_available()?;
        self.rows
            .borrow_mut()
            .insert((principal.column_value(), key.to_string()), record.clone());
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }

    async fn delete(&self, principal: &Principal, key: &str) -> Result<(), RemoteError> {
        self.check_available()?;
        self.rows
            .borrow_mut()
            .remove(&(principal.column_value(), key.to_string()));
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }

    async fn list(&self, principal: &Principal) -> Result<Vec<(String, R)>, RemoteError> {
        self.check_available()?;
        let owner = principal.column_value();
        Ok(self
            .rows
            .borrow()
            .iter()
            .filter(|((row_owner, _), _)| *row_owner == owner)
            .map(|((_, key), record)| (key.clone(), record.clone()))
            .collect())
    }
}
