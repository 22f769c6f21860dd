//! This is a library for mirroring a local, authoritative map of records to a remote row store.
//! It was created for Wordbox, so it doesn't include much that was not needed for that project.
//!
//! Mirroring strategy:
//! 1. The local map is always the source of truth for reads and writes. Every mutation completes locally first.
//! 2. Each mutation also leaves a "pending" task in an outbox, keyed by the record's key. A newer task for the same key replaces the older one, so the outbox only ever holds the latest full state of each record.
//! 3. Flushing drains the outbox and pushes each task to the remote. Failures are logged and dropped. There is no retry: the next mutation of the same key will send the then-current full record again.
//! 4. Pulling lists every remote row for the current principal and overwrites the matching local records wholesale ("last pull wins").
//!
//! There is no attempt at merging. If two devices write the same key, the remote keeps whichever write landed last.

#[cfg(feature = "supabase")]
pub mod supabase;

pub mod data_model;
pub mod memory;

use crate::data_model::{Pending, Principal, Queued, Record, SyncTarget};

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("remote is unavailable: {0}")]
    Unavailable(String),
    #[error("not authorized to access the remote (status {0})")]
    Unauthorized(u16),
    #[error("remote responded with status {status}: {body}")]
    Http { status: u16, body: String },
    #[error("could not decode remote row: {0}")]
    Decode(#[from] serde_json::Error),
    #[cfg(feature = "supabase")]
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// A remote key-value row store, partitioned by principal.
///
/// Implementations need not provide ordering or transactional guarantees. Callers tolerate
/// partial and duplicate writes.
#[allow(async_fn_in_trait)]
pub trait RemoteStore<R: Record> {
    fn target(&self) -> SyncTarget;

    async fn upsert(&self, principal: &Principal, key: &str, record: &R) -> Result<(), RemoteError>;

    async fn delete(&self, principal: &Principal, key: &str) -> Result<(), RemoteError>;

    async fn list(&self, principal: &Principal) -> Result<Vec<(String, R)>, RemoteError>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub pushed: usize,
    pub dropped: usize,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.dropped == 0
    }
}

/// Push already-drained tasks to the remote.
///
/// Takes the tasks by value so that the caller never holds a borrow of its store across the awaits below.
pub async fn push_pending<R, Remote>(
    remote: &Remote,
    principal: &Principal,
    tasks: Vec<(String, Queued<R>)>,
) -> FlushReport
where
    R: Record,
    Remote: RemoteStore<R>,
{
    let mut report = FlushReport::default();

    for (key, queued) in tasks {
        let result = match &queued.pending {
            Pending::Upsert(record) => remote.upsert(principal, &key, record).await,
            Pending::Delete => remote.delete(principal, &key).await,
        };

        match result {
            Ok(()) => report.pushed += 1,
            Err(e) => {
                log::warn!(
                    "Dropping {} of {key:?} for {principal} (queued at {}): {e}",
                    queued.pending.describe(),
                    queued.queued_at
                );
                report.dropped += 1;
            }
        }
    }

    report
}
