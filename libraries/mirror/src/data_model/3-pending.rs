//! # Pending
//! A pending task is what the outbox remembers about a key: either the full record to upsert, or a deletion.
//! Tasks carry the time they were queued, which is only used for diagnostics.

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pending<R> {
    Upsert(R),
    Delete,
}

impl<R> Pending<R> {
    pub fn describe(&self) -> &'static str {
        match self {
            Pending::Upsert(_) => "upsert",
            Pending::Delete => "delete",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Queued<R> {
    pub queued_at: chrono::DateTime<chrono::Utc>,
    pub pending: Pending<R>,
}
