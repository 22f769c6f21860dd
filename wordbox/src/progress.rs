//! Per-term mastery tracking.
//!
//! The local map is authoritative: every mutation completes against it and is persisted before returning.
//! Mirroring to the remote happens afterwards, out of band, through the outbox of the underlying `MirroredMap`.

use std::cell::RefCell;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use mirror::data_model::{ListenerKey, MirroredMap, Principal, Queued, Record, SyncState, SyncTarget};
use mirror::{FlushReport, RemoteStore};
use serde::{Deserialize, Serialize};

use crate::config::StoreConfig;
use crate::leitner::{self, MAX_BOX};
use crate::storage::{KeyValueStorage, StorageError};

/// Progress is keyed by the trimmed, lowercased term.
pub fn term_id(term: &str) -> String {
    term.trim().to_lowercase()
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(target_arch = "wasm32", derive(tsify::Tsify))]
#[cfg_attr(target_arch = "wasm32", tsify(into_wasm_abi, from_wasm_abi))]
#[serde(rename_all = "camelCase", default)]
pub struct ProgressRecord {
    pub attempts: u32,
    pub correct: u32,
    /// Correct answers given without a mistake on this term earlier in the same round.
    pub first_try: u32,
    #[serde(rename = "box")]
    pub leitner_box: u8,
    /// Milliseconds since the epoch, 0 if never scheduled.
    pub due_at: i64,
    pub learned: bool,
    pub last_game: Option<String>,
    pub last_at: i64,
}

impl ProgressRecord {
    /// Forces the record back into its valid range instead of failing: `correct <= attempts`,
    /// `first_try <= correct`, `box <= 5`, and box 5 always counts as learned.
    pub fn clamped(mut self) -> Self {
        self.leitner_box = self.leitner_box.min(MAX_BOX);
        self.correct = self.correct.min(self.attempts);
        self.first_try = self.first_try.min(self.correct);
        self.due_at = self.due_at.max(0);
        self.last_at = self.last_at.max(0);
        if self.leitner_box == MAX_BOX {
            self.learned = true;
        }
        self
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at <= now.timestamp_millis()
    }
}

/// Column layout of the remote `progress` table.
#[derive(Serialize)]
struct ProgressColumns {
    attempts: u32,
    correct: u32,
    first_try: u32,
    #[serde(rename = "box")]
    leitner_box: u8,
    due_at: i64,
    learned: bool,
    last_game: Option<String>,
    last_at: i64,
}

/// A stored or pulled record before it is forced into range. Reads both the local camelCase
/// layout and the remote snake_case columns, and accepts numbers that don't fit the real fields.
#[derive(Deserialize, Default)]
#[serde(default)]
struct UncheckedRecord {
    attempts: i64,
    correct: i64,
    #[serde(alias = "firstTry")]
    first_try: i64,
    #[serde(rename = "box")]
    leitner_box: i64,
    #[serde(alias = "dueAt")]
    due_at: i64,
    learned: bool,
    #[serde(alias = "lastGame")]
    last_game: Option<String>,
    #[serde(alias = "lastAt")]
    last_at: i64,
}

impl From<UncheckedRecord> for ProgressRecord {
    fn from(raw: UncheckedRecord) -> Self {
        let counter = |n: i64| n.clamp(0, i64::from(u32::MAX)) as u32;
        ProgressRecord {
            attempts: counter(raw.attempts),
            correct: counter(raw.correct),
            first_try: counter(raw.first_try),
            leitner_box: raw.leitner_box.clamp(0, i64::from(MAX_BOX)) as u8,
            due_at: raw.due_at,
            learned: raw.learned,
            last_game: raw.last_game,
            last_at: raw.last_at,
        }
        .clamped()
    }
}

impl Record for ProgressRecord {
    fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        let ProgressRecord {
            attempts,
            correct,
            first_try,
            leitner_box,
            due_at,
            learned,
            last_game,
            last_at,
        } = self.clone();
        serde_json::to_value(ProgressColumns {
            attempts,
            correct,
            first_try,
            leitner_box,
            due_at,
            learned,
            last_game,
            last_at,
        })
    }

    fn from_json(json: &serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value::<UncheckedRecord>(json.clone()).map(ProgressRecord::from)
    }
}

/// A partial update. Fields left as `None` keep their current value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(target_arch = "wasm32", derive(tsify::Tsify))]
#[cfg_attr(target_arch = "wasm32", tsify(into_wasm_abi, from_wasm_abi))]
#[serde(rename_all = "camelCase", default)]
pub struct ProgressPatch {
    pub attempts: Option<u32>,
    pub correct: Option<u32>,
    pub first_try: Option<u32>,
    #[serde(rename = "box")]
    pub leitner_box: Option<u8>,
    pub due_at: Option<i64>,
    pub learned: Option<bool>,
    pub last_game: Option<Option<String>>,
    pub last_at: Option<i64>,
}

impl ProgressPatch {
    pub fn apply_to(self, record: ProgressRecord) -> ProgressRecord {
        ProgressRecord {
            attempts: self.attempts.unwrap_or(record.attempts),
            correct: self.correct.unwrap_or(record.correct),
            first_try: self.first_try.unwrap_or(record.first_try),
            leitner_box: self.leitner_box.unwrap_or(record.leitner_box),
            due_at: self.due_at.unwrap_or(record.due_at),
            learned: self.learned.unwrap_or(record.learned),
            last_game: self.last_game.unwrap_or(record.last_game),
            last_at: self.last_at.unwrap_or(record.last_at),
        }
    }
}

/// What a pull from the remote did. A failed pull leaves the local cache untouched and says so here.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(target_arch = "wasm32", derive(tsify::Tsify))]
#[cfg_attr(target_arch = "wasm32", tsify(into_wasm_abi, from_wasm_abi))]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// False when the remote could not be reached and the local cache is all there is.
    pub fresh: bool,
    pub pulled: usize,
    pub overwritten: usize,
    pub error: Option<String>,
}

pub struct ProgressStore<S> {
    records: MirroredMap<ProgressRecord>,
    storage: S,
    config: StoreConfig,
}

fn decode_map(json: &str) -> im::OrdMap<String, ProgressRecord> {
    let entries: serde_json::Map<String, serde_json::Value> = match serde_json::from_str(json) {
        Ok(entries) => entries,
        Err(e) => {
            log::error!("Stored progress is not a JSON object, starting empty: {e}");
            return im::OrdMap::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|(term, value)| {
            serde_json::from_value::<UncheckedRecord>(value)
                .inspect_err(|e| log::warn!("Dropping unreadable progress for {term:?}: {e}"))
                .ok()
                .map(|raw| (term, ProgressRecord::from(raw)))
        })
        .collect()
}

impl<S: KeyValueStorage> ProgressStore<S> {
    /// Loads the stored map, or starts empty if there is none or it cannot be read.
    pub fn load(storage: S, config: StoreConfig) -> Self {
        let records = match storage.get(&config.progress_key) {
            Ok(Some(json)) => decode_map(&json),
            Ok(None) => im::OrdMap::new(),
            Err(e) => {
                log::error!("Could not read stored progress, starting empty: {e}");
                im::OrdMap::new()
            }
        };
        log::info!("Loaded progress for {} terms", records.len());

        Self {
            records: MirroredMap::from_records(records),
            storage,
            config,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// The stored record, or the zero state if the term has none.
    pub fn get_progress(&self, term: &str) -> ProgressRecord {
        self.records
            .get(&term_id(term))
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_all_progress(&self) -> im::OrdMap<String, ProgressRecord> {
        self.records.snapshot()
    }

    pub fn record_result(
        &mut self,
        term: &str,
        correct: bool,
        first_try: bool,
        game: &str,
    ) -> ProgressRecord {
        self.record_result_at(term, correct, first_try, game, Utc::now())
    }

    /// Applies one answer. Whether the answer was a first try is the caller's call.
    pub fn record_result_at(
        &mut self,
        term: &str,
        correct: bool,
        first_try: bool,
        game: &str,
        now: DateTime<Utc>,
    ) -> ProgressRecord {
        let id = term_id(term);
        if id.is_empty() {
            log::warn!("Ignoring a {game} result for a blank term");
            return ProgressRecord::default();
        }

        let current = self.records.get(&id).cloned().unwrap_or_default();
        let leitner_box = leitner::next_box(current.leitner_box, correct);
        let next = ProgressRecord {
            attempts: current.attempts.saturating_add(1),
            correct: current.correct.saturating_add(u32::from(correct)),
            first_try: current.first_try.saturating_add(u32::from(correct && first_try)),
            leitner_box,
            due_at: leitner::due_at(leitner_box, now).timestamp_millis(),
            learned: leitner_box == MAX_BOX,
            last_game: Some(game.to_string()),
            last_at: now.timestamp_millis(),
        }
        .clamped();

        self.store(id, next.clone(), now);
        next
    }

    pub fn set_progress(&mut self, term: &str, patch: ProgressPatch) -> ProgressRecord {
        self.set_progress_at(term, patch, Utc::now())
    }

    /// Shallow-merges `patch` onto the current record (or the zero state) and stores the result.
    pub fn set_progress_at(
        &mut self,
        term: &str,
        patch: ProgressPatch,
        now: DateTime<Utc>,
    ) -> ProgressRecord {
        let id = term_id(term);
        if id.is_empty() {
            log::warn!("Ignoring a progress update for a blank term");
            return ProgressRecord::default();
        }

        let current = self.records.get(&id).cloned().unwrap_or_default();
        let merged = patch.apply_to(current);
        let next = merged.clone().clamped();
        if next != merged {
            log::warn!("Clamped out-of-range progress for {id:?}");
        }

        self.store(id, next.clone(), now);
        next
    }

    pub fn mark_learned(&mut self, term: &str, learned: bool) -> ProgressRecord {
        self.mark_learned_at(term, learned, Utc::now())
    }

    /// Manual override. Marking learned jumps to the top box; unmarking caps the box at 4 so the term
    /// is not immediately counted as mastered again. Either way the term is due right away.
    pub fn mark_learned_at(
        &mut self,
        term: &str,
        learned: bool,
        now: DateTime<Utc>,
    ) -> ProgressRecord {
        let current = self.get_progress(term);
        let leitner_box = if learned {
            MAX_BOX
        } else {
            current.leitner_box.min(MAX_BOX - 1)
        };
        self.set_progress_at(
            term,
            ProgressPatch {
                learned: Some(learned),
                leitner_box: Some(leitner_box),
                due_at: Some(now.timestamp_millis()),
                ..Default::default()
            },
            now,
        )
    }

    pub fn reset_progress(&mut self, term: &str) {
        self.reset_progress_at(term, Utc::now())
    }

    /// Forgets the term locally and queues a remote delete. The next read returns the zero state.
    pub fn reset_progress_at(&mut self, term: &str, now: DateTime<Utc>) {
        let id = term_id(term);
        if id.is_empty() {
            return;
        }
        if self.records.remove(&id, now, None).is_some() {
            self.persist();
        }
    }

    /// Term ids whose review is due, soonest first.
    pub fn due_terms(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut due: Vec<(i64, String)> = self
            .records
            .snapshot()
            .into_iter()
            .filter(|(_, record)| record.is_due(now))
            .map(|(id, record)| (record.due_at, id))
            .collect();
        due.sort();
        due.into_iter().map(|(_, id)| id).collect()
    }

    /// Writes the whole map to local storage.
    pub fn flush(&mut self) -> Result<(), StorageError> {
        let json = serde_json::to_string(&self.records.snapshot())
            .map_err(|e| StorageError::Unavailable(format!("could not encode progress: {e}")))?;
        self.storage.set(&self.config.progress_key, &json)
    }

    fn persist(&mut self) {
        let _ = self
            .flush()
            .inspect_err(|e| log::error!("Could not persist progress locally: {e}"));
    }

    fn store(&mut self, id: String, record: ProgressRecord, now: DateTime<Utc>) {
        self.records.insert(id, record, now, None);
        self.persist();
    }

    pub fn pending_remote_writes(&self) -> usize {
        self.records.outbox().len()
    }

    pub fn take_pending(&mut self) -> Vec<(String, Queued<ProgressRecord>)> {
        self.records.drain_outbox()
    }

    pub fn sync_state(&self, target: SyncTarget) -> SyncState {
        self.records
            .sync_state(target)
            .cloned()
            .unwrap_or_default()
    }

    /// The listener receives the ids of the terms that changed.
    pub fn subscribe(&mut self, listener: impl Fn(&BTreeSet<String>) + 'static) -> ListenerKey {
        self.records
            .register_listener(move |_, changed| listener(changed))
    }

    pub fn unsubscribe(&mut self, key: ListenerKey) {
        self.records.unregister_listener(key)
    }

    /// Call the returned closures once no borrow of the store is held.
    pub fn drain_due_notifications(&mut self) -> Vec<Box<dyn FnOnce()>> {
        self.records.drain_due_notifications()
    }
}

impl<S: KeyValueStorage> ProgressStore<S> {
    /// Pushes every pending task to the remote. Failed tasks are logged and dropped; the next change
    /// to the same term sends its full state again.
    pub async fn flush_outbox<R: RemoteStore<ProgressRecord>>(
        store: &RefCell<Self>,
        remote: &R,
        principal: &Principal,
    ) -> FlushReport {
        // never hold the borrow across the await below
        let tasks = store.borrow_mut().take_pending();
        if tasks.is_empty() {
            return FlushReport::default();
        }
        mirror::push_pending(remote, principal, tasks).await
    }

    /// Pulls every remote record for `principal` and lets each one replace the local record for its term
    /// ("last pull wins", no per-field merge and no timestamp comparison). Local-only records are kept.
    ///
    /// With `known_terms`, only rows for those term ids are applied. Never fails: an unreachable remote
    /// leaves the local cache as it was and is reported through `SyncReport::fresh`.
    pub async fn sync_from_cloud<R: RemoteStore<ProgressRecord>>(
        store: &RefCell<Self>,
        remote: &R,
        principal: &Principal,
        known_terms: Option<&BTreeSet<String>>,
    ) -> SyncReport {
        let target = remote.target();
        store.borrow_mut().records.mark_sync_started(target);

        let result = remote.list(principal).await;

        let mut store = store.borrow_mut();
        match result {
            Err(e) => {
                log::warn!("Could not pull progress for {principal}, keeping local cache: {e}");
                let error = e.to_string();
                store
                    .records
                    .mark_sync_finished(target, Some(error.clone()));
                SyncReport {
                    fresh: false,
                    error: Some(error),
                    ..Default::default()
                }
            }
            Ok(rows) => {
                let pulled = rows.len();
                let rows = rows
                    .into_iter()
                    .map(|(term, record)| (term_id(&term), record.clamped()))
                    .collect();
                let overwritten = store.records.overwrite_from_remote(
                    rows,
                    |id| !id.is_empty() && known_terms.is_none_or(|known| known.contains(id)),
                    None,
                );
                if overwritten > 0 {
                    store.persist();
                }
                store.records.mark_sync_finished(target, None);
                log::info!("Pulled {pulled} progress rows for {principal}, {overwritten} changed locally");
                SyncReport {
                    fresh: true,
                    pulled,
                    overwritten,
                    error: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use chrono::{Duration, TimeZone};
    use mirror::data_model::Pending;
    use mirror::memory::MemoryRemote;

    use super::*;
    use crate::leitner::INTERVAL_DAYS;
    use crate::storage::MemoryStorage;

    fn store() -> ProgressStore<MemoryStorage> {
        ProgressStore::load(MemoryStorage::default(), StoreConfig::default())
    }

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn test_three_correct_first_tries() {
        let mut store = store();
        for _ in 0..3 {
            store.record_result("dog", true, true, "quiz");
        }

        let dog = store.get_progress("dog");
        assert_eq!(dog.attempts, 3);
        assert_eq!(dog.correct, 3);
        assert_eq!(dog.first_try, 3);
        assert_eq!(dog.leitner_box, 3);
        assert!(!dog.learned);
        assert_eq!(dog.last_game.as_deref(), Some("quiz"));
    }

    #[test]
    fn test_wrong_answer_leaves_mastery() {
        let mut store = store();
        store.set_progress(
            "dog",
            ProgressPatch {
                leitner_box: Some(5),
                learned: Some(true),
                ..Default::default()
            },
        );

        let dog = store.record_result("dog", false, false, "matching");
        assert_eq!(dog.leitner_box, 4);
        assert!(!dog.learned);
        assert_eq!(dog.attempts, 1);
        assert_eq!(dog.correct, 0);
    }

    #[test]
    fn test_due_at_uses_post_transition_box() {
        let mut store = store();
        let now = at(1_700_000_000_000);

        let mut expected_box = 0usize;
        for correct in [true, true, false, true, true, true, true, true] {
            let record = store.record_result_at("cat", correct, true, "fill", now);
            expected_box = if correct {
                (expected_box + 1).min(5)
            } else {
                expected_box.saturating_sub(1)
            };
            assert_eq!(record.leitner_box as usize, expected_box);
            assert_eq!(
                record.due_at,
                (now + Duration::days(INTERVAL_DAYS[expected_box])).timestamp_millis()
            );
            assert_eq!(record.learned, expected_box == 5);
            assert_eq!(record.last_at, now.timestamp_millis());
        }
    }

    #[test]
    fn test_counters_stay_ordered() {
        let mut store = store();
        let answers = [
            (true, true),
            (false, false),
            (true, false),
            (true, true),
            (false, true),
            (true, true),
        ];
        for (correct, first_try) in answers {
            let record = store.record_result("owl", correct, first_try, "quiz");
            assert!(record.correct <= record.attempts);
            assert!(record.first_try <= record.correct);
            assert!(record.leitner_box <= MAX_BOX);
        }

        let owl = store.get_progress("owl");
        assert_eq!(owl.attempts, 6);
        assert_eq!(owl.correct, 4);
        // a wrong answer never counts as a first try, even if the caller says so
        assert_eq!(owl.first_try, 3);
    }

    #[test]
    fn test_terms_are_normalized() {
        let mut store = store();
        store.record_result("  Dog ", true, true, "quiz");
        assert_eq!(store.get_progress("dog").attempts, 1);
        assert_eq!(store.get_progress("DOG").attempts, 1);
        assert!(store.get_all_progress().contains_key("dog"));
    }

    #[test]
    fn test_blank_term_is_ignored() {
        let mut store = store();
        store.record_result("   ", true, true, "quiz");
        assert!(store.get_all_progress().is_empty());
        assert_eq!(store.pending_remote_writes(), 0);
    }

    #[test]
    fn test_mark_learned_and_unmark() {
        let mut store = store();
        let now = at(5_000);
        store.record_result_at("fox", true, true, "quiz", at(0));

        let fox = store.mark_learned_at("fox", true, now);
        assert!(fox.learned);
        assert_eq!(fox.leitner_box, 5);
        assert_eq!(fox.due_at, 5_000);
        assert_eq!(fox.attempts, 1);

        let fox = store.mark_learned_at("fox", false, now);
        assert!(!fox.learned);
        assert_eq!(fox.leitner_box, 4);
    }

    #[test]
    fn test_unmark_keeps_lower_box() {
        let mut store = store();
        store.record_result("elk", true, true, "quiz");
        let elk = store.mark_learned("elk", false);
        assert_eq!(elk.leitner_box, 1);
        assert!(!elk.learned);
    }

    #[test]
    fn test_reset_returns_zero_state() {
        let mut store = store();
        store.record_result("dog", true, true, "quiz");
        store.reset_progress("dog");

        let dog = store.get_progress("dog");
        assert_eq!(dog, ProgressRecord::default());
        assert_eq!(dog.attempts, 0);
        assert_eq!(dog.leitner_box, 0);
        assert!(!dog.learned);

        let pending = store.take_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].1.pending, Pending::Delete);
    }

    #[test]
    fn test_snapshots_are_idempotent() {
        let mut store = store();
        store.record_result("dog", true, true, "quiz");
        store.record_result("cat", false, false, "quiz");
        assert_eq!(store.get_all_progress(), store.get_all_progress());
    }

    #[test]
    fn test_set_progress_clamps() {
        let mut store = store();
        let record = store.set_progress(
            "yak",
            ProgressPatch {
                attempts: Some(2),
                correct: Some(7),
                first_try: Some(9),
                leitner_box: Some(12),
                ..Default::default()
            },
        );
        assert_eq!(record.correct, 2);
        assert_eq!(record.first_try, 2);
        assert_eq!(record.leitner_box, 5);
        assert!(record.learned);
    }

    #[test]
    fn test_persists_and_reloads() {
        let mut store = store();
        store.record_result("dog", true, true, "quiz");
        let stored = store
            .storage()
            .get("vgs_progress_v1")
            .unwrap()
            .expect("progress is written on every change");
        let json: serde_json::Value = serde_json::from_str(&stored).unwrap();
        assert_eq!(json["dog"]["attempts"], 1);
        assert_eq!(json["dog"]["box"], 1);
        assert_eq!(json["dog"]["firstTry"], 1);
        assert_eq!(json["dog"]["lastGame"], "quiz");

        let reloaded = ProgressStore::load(store.storage().clone(), StoreConfig::default());
        assert_eq!(reloaded.get_progress("dog"), store.get_progress("dog"));
    }

    #[test]
    fn test_load_tolerates_bad_data() {
        let mut storage = MemoryStorage::default();
        storage
            .set(
                "vgs_progress_v1",
                r#"{"dog":{"attempts":1,"correct":4,"box":9},"cat":"garbage","owl":{}}"#,
            )
            .unwrap();
        let store = ProgressStore::load(storage, StoreConfig::default());

        let dog = store.get_progress("dog");
        assert_eq!(dog.correct, 1);
        assert_eq!(dog.leitner_box, 5);
        assert!(dog.learned);
        assert!(!store.get_all_progress().contains_key("cat"));
        assert_eq!(store.get_progress("owl"), ProgressRecord::default());

        let mut storage = MemoryStorage::default();
        storage
            .set(
                "vgs_progress_v1",
                r#"{"dog":{"attempts":4,"correct":3,"box":300},"cat":{"attempts":-2,"correct":1,"dueAt":-5}}"#,
            )
            .unwrap();
        let store = ProgressStore::load(storage, StoreConfig::default());
        let dog = store.get_progress("dog");
        assert_eq!((dog.attempts, dog.correct, dog.leitner_box), (4, 3, 5));
        assert!(dog.learned);
        let cat = store.get_progress("cat");
        assert_eq!((cat.attempts, cat.correct, cat.due_at), (0, 0, 0));
        assert!(store.get_all_progress().contains_key("cat"));

        let mut storage = MemoryStorage::default();
        storage.set("vgs_progress_v1", "not json").unwrap();
        assert!(
            ProgressStore::load(storage, StoreConfig::default())
                .get_all_progress()
                .is_empty()
        );
    }

    #[test]
    fn test_due_terms_sorted() {
        let mut store = store();
        let start = at(0);
        store.record_result_at("a", true, true, "quiz", start); // box 1, due in 1 day
        store.record_result_at("b", false, false, "quiz", start); // box 0, due now
        store.record_result_at("c", true, true, "quiz", start);
        store.record_result_at("c", true, true, "quiz", start); // box 2, due in 2 days

        assert_eq!(store.due_terms(start), vec!["b"]);
        assert_eq!(
            store.due_terms(start + Duration::days(1)),
            vec!["b", "a"]
        );
        assert_eq!(store.due_terms(start + Duration::days(3)).len(), 3);
    }

    #[test]
    fn test_listeners_hear_changed_terms() {
        let mut store = store();
        let heard: Rc<RefCell<Vec<BTreeSet<String>>>> = Rc::default();
        let sink = heard.clone();
        store.subscribe(move |changed| sink.borrow_mut().push(changed.clone()));

        store.record_result("dog", true, true, "quiz");
        store.mark_learned("cat", true);
        for notification in store.drain_due_notifications() {
            notification();
        }

        assert_eq!(
            *heard.borrow(),
            vec![BTreeSet::from(["cat".to_string(), "dog".to_string()])]
        );
    }

    #[test]
    fn test_record_columns_use_snake_case() {
        let record = ProgressRecord {
            attempts: 2,
            correct: 1,
            first_try: 1,
            leitner_box: 1,
            due_at: 10,
            learned: false,
            last_game: Some("quiz".to_string()),
            last_at: 5,
        };
        let json = record.to_json().unwrap();
        assert_eq!(json["first_try"], 1);
        assert_eq!(json["due_at"], 10);
        assert_eq!(json["box"], 1);

        let mut row = json.clone();
        row["principal"] = serde_json::json!("user-1");
        row["term"] = serde_json::json!("dog");
        assert_eq!(ProgressRecord::from_json(&row).unwrap(), record);
    }

    #[test]
    fn test_out_of_range_rows_are_clamped() {
        let row = serde_json::json!({
            "principal": "user-1",
            "term": "dog",
            "attempts": 7,
            "correct": -1,
            "first_try": 2,
            "box": 300,
            "due_at": 10,
            "learned": false,
            "last_game": null,
            "last_at": 5,
        });
        let record = ProgressRecord::from_json(&row).unwrap();
        assert_eq!(record.attempts, 7);
        assert_eq!(record.correct, 0);
        assert_eq!(record.first_try, 0);
        assert_eq!(record.leitner_box, MAX_BOX);
        assert!(record.learned);

        let row = serde_json::json!({"attempts": 1_099_511_627_776_u64, "correct": 3, "box": -4});
        let record = ProgressRecord::from_json(&row).unwrap();
        assert_eq!(record.attempts, u32::MAX);
        assert_eq!(record.correct, 3);
        assert_eq!(record.leitner_box, 0);

        assert!(ProgressRecord::from_json(&serde_json::json!("garbage")).is_err());
    }

    #[test]
    fn test_counters_saturate() {
        let mut store = store();
        store.set_progress(
            "dog",
            ProgressPatch {
                attempts: Some(u32::MAX),
                correct: Some(u32::MAX),
                first_try: Some(u32::MAX),
                leitner_box: Some(2),
                ..Default::default()
            },
        );

        let record = store.record_result("dog", true, true, "quiz");
        assert_eq!(record.attempts, u32::MAX);
        assert_eq!(record.correct, u32::MAX);
        assert_eq!(record.first_try, u32::MAX);
        assert_eq!(record.leitner_box, 3);

        let record = store.record_result("dog", false, false, "quiz");
        assert_eq!(record.attempts, u32::MAX);
        assert_eq!(record.correct, u32::MAX);
        assert_eq!(record.leitner_box, 2);
    }

    #[tokio::test]
    async fn test_flush_coalesces_per_term() {
        let store = RefCell::new(store());
        let remote = MemoryRemote::<ProgressRecord>::default();
        let principal = Principal::Device("d1".to_string());

        for _ in 0..4 {
            store.borrow_mut().record_result("dog", true, true, "quiz");
        }
        store.borrow_mut().record_result("cat", false, false, "quiz");
        assert_eq!(store.borrow().pending_remote_writes(), 2);

        let report = ProgressStore::flush_outbox(&store, &remote, &principal).await;
        assert_eq!(report, FlushReport { pushed: 2, dropped: 0 });
        assert_eq!(remote.writes(), 2);
        assert_eq!(
            remote.get(&principal, "dog"),
            Some(store.borrow().get_progress("dog"))
        );
        assert_eq!(store.borrow().pending_remote_writes(), 0);
    }

    #[tokio::test]
    async fn test_failed_write_self_heals_on_next_change() {
        let store = RefCell::new(store());
        let remote = MemoryRemote::<ProgressRecord>::default();
        let principal = Principal::Device("d1".to_string());

        remote.set_available(false);
        let record = store.borrow_mut().record_result("dog", true, true, "quiz");
        assert_eq!(record.attempts, 1);
        let report = ProgressStore::flush_outbox(&store, &remote, &principal).await;
        assert_eq!(report.dropped, 1);
        assert_eq!(store.borrow().pending_remote_writes(), 0);
        assert_eq!(store.borrow().get_progress("dog").attempts, 1);

        remote.set_available(true);
        store.borrow_mut().record_result("dog", true, true, "quiz");
        ProgressStore::flush_outbox(&store, &remote, &principal).await;
        assert_eq!(remote.get(&principal, "dog").unwrap().attempts, 2);
    }

    #[tokio::test]
    async fn test_remote_delete_on_reset() {
        let store = RefCell::new(store());
        let remote = MemoryRemote::<ProgressRecord>::default();
        let principal = Principal::User("u1".to_string());

        store.borrow_mut().record_result("dog", true, true, "quiz");
        ProgressStore::flush_outbox(&store, &remote, &principal).await;
        assert!(remote.get(&principal, "dog").is_some());

        store.borrow_mut().reset_progress("dog");
        ProgressStore::flush_outbox(&store, &remote, &principal).await;
        assert!(remote.get(&principal, "dog").is_none());
    }

    #[tokio::test]
    async fn test_sync_from_cloud_remote_wins() {
        let store = RefCell::new(store());
        let remote = MemoryRemote::<ProgressRecord>::default();
        let principal = Principal::User("u1".to_string());

        remote
            .upsert(
                &principal,
                "dog",
                &ProgressRecord {
                    attempts: 3,
                    correct: 3,
                    first_try: 2,
                    leitner_box: 3,
                    due_at: 1,
                    last_at: 1,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // the local record is newer, but the pull still replaces it
        store
            .borrow_mut()
            .record_result_at("dog", true, true, "quiz", at(9_999_999_999));
        store.borrow_mut().record_result("owl", true, true, "quiz");
        store.borrow_mut().take_pending();
        assert_eq!(store.borrow().get_progress("dog").leitner_box, 1);

        let report = ProgressStore::sync_from_cloud(&store, &remote, &principal, None).await;
        assert_eq!(
            report,
            SyncReport {
                fresh: true,
                pulled: 1,
                overwritten: 1,
                error: None,
            }
        );

        let store = store.borrow();
        assert_eq!(store.get_progress("dog").leitner_box, 3);
        assert_eq!(store.get_progress("dog").attempts, 3);
        assert_eq!(store.get_progress("owl").attempts, 1);
        assert_eq!(store.pending_remote_writes(), 0);
        assert!(store.sync_state(SyncTarget::Memory).last_sync_error.is_none());
    }

    #[tokio::test]
    async fn test_sync_from_cloud_only_applies_known_terms() {
        let store = RefCell::new(store());
        let remote = MemoryRemote::<ProgressRecord>::default();
        let principal = Principal::User("u1".to_string());
        let mastered = ProgressRecord {
            leitner_box: 5,
            learned: true,
            ..Default::default()
        };
        remote.upsert(&principal, "dog", &mastered).await.unwrap();
        remote.upsert(&principal, "zebra", &mastered).await.unwrap();

        let known = BTreeSet::from(["dog".to_string()]);
        let report =
            ProgressStore::sync_from_cloud(&store, &remote, &principal, Some(&known)).await;

        assert_eq!(report.pulled, 2);
        assert_eq!(report.overwritten, 1);
        assert!(store.borrow().get_progress("dog").learned);
        assert!(!store.borrow().get_all_progress().contains_key("zebra"));
    }

    #[tokio::test]
    async fn test_sync_from_cloud_clamps_pulled_rows() {
        let store = RefCell::new(store());
        let remote = MemoryRemote::<ProgressRecord>::default();
        let principal = Principal::User("u1".to_string());
        remote
            .upsert(
                &principal,
                " Dog ",
                &ProgressRecord {
                    attempts: 2,
                    correct: 5,
                    first_try: 5,
                    leitner_box: 5,
                    learned: false,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let report = ProgressStore::sync_from_cloud(&store, &remote, &principal, None).await;
        assert_eq!(report.overwritten, 1);

        let dog = store.borrow().get_progress("dog");
        assert_eq!(dog.correct, dog.attempts);
        assert!(dog.first_try <= dog.correct);
        assert!(dog.learned);
    }

    #[tokio::test]
    async fn test_sync_from_cloud_offline_keeps_local() {
        let store = RefCell::new(store());
        let remote = MemoryRemote::<ProgressRecord>::default();
        let principal = Principal::Device("d1".to_string());
        store.borrow_mut().record_result("dog", true, true, "quiz");
        let before = store.borrow().get_all_progress();

        remote.set_available(false);
        let report = ProgressStore::sync_from_cloud(&store, &remote, &principal, None).await;

        assert!(!report.fresh);
        assert!(report.error.is_some());
        assert_eq!(store.borrow().get_all_progress(), before);
        let state = store.borrow().sync_state(SyncTarget::Memory);
        assert!(state.last_sync_error.is_some());
        assert!(!state.in_progress());
    }
}
