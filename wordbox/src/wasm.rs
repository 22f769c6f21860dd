use std::cell::RefCell;
use std::rc::Rc;

use mirror::data_model::{ListenerKey, Principal, SyncState, SyncTarget};
use mirror::supabase::SupabaseRemote;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::config::{StoreConfig, supabase_config};
use crate::pairs::{Pair, PairStore};
use crate::practice;
use crate::principal::resolve_principal;
use crate::progress::{ProgressPatch, ProgressRecord, ProgressStore, SyncReport};
use crate::review::{ReviewFilter, review_rows};
use crate::sources::{HttpTextSource, PairSource, PairSourceError, Session, SupabaseWords};
use crate::storage::BrowserStorage;

const DEFAULT_DATA_PATH: &str = "/data.txt";
const PROGRESS_KEY_COLUMN: &str = "term";

fn to_js(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

// maps become plain objects rather than `Map`s
fn to_plain_js(value: &impl Serialize) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(JsValue::from)
}

fn absolute_url(url: &str) -> String {
    if url.contains("://") {
        return url.to_string();
    }
    let origin = web_sys::window()
        .and_then(|window| window.location().origin().ok())
        .unwrap_or_default();
    format!("{origin}/{}", url.trim_start_matches('/'))
}

enum Source {
    Text(HttpTextSource),
    Words(SupabaseWords),
}

impl PairSource for Source {
    fn name(&self) -> String {
        match self {
            Source::Text(source) => source.name(),
            Source::Words(source) => source.name(),
        }
    }

    async fn fetch(&self) -> Result<Vec<Pair>, PairSourceError> {
        match self {
            Source::Text(source) => source.fetch().await,
            Source::Words(source) => source.fetch().await,
        }
    }
}

#[derive(Serialize, tsify::Tsify)]
#[tsify(into_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct PairStatus {
    pub source: String,
    pub count: usize,
    pub usable: usize,
    pub updated_at: Option<i64>,
    pub error: Option<String>,
}

#[wasm_bindgen]
pub struct Wordbox {
    // we never hold a borrow of either store across an .await, so there are no "already borrowed" panics
    progress: Rc<RefCell<ProgressStore<BrowserStorage>>>,
    pairs: RefCell<PairStore>,
    source: Source,
    principal: Principal,
    remote: Option<Rc<SupabaseRemote>>,
}

#[wasm_bindgen]
impl Wordbox {
    /// Without a session, progress belongs to this device. Pairs come from `data_url` if given,
    /// otherwise from the signed-in user's word list, otherwise from `/data.txt`.
    #[wasm_bindgen(constructor)]
    pub fn new(session: Option<Session>, data_url: Option<String>) -> Result<Wordbox, JsValue> {
        crate::init_logging();

        let config = StoreConfig::default();
        let mut storage = BrowserStorage::local()
            .inspect_err(|e| log::error!("Error opening local storage: {e}"))
            .map_err(to_js)?;
        let principal = resolve_principal(
            session.as_ref().map(|session| session.user_id.clone()),
            &mut storage,
            &config.device_id_key,
        )
        .inspect_err(|e| log::error!("Error getting device ID: {e}"))
        .map_err(to_js)?;
        log::info!("Tracking progress for {principal}");

        let supabase = supabase_config().ok();
        let remote = supabase.clone().map(|supabase| {
            Rc::new(SupabaseRemote::new(
                supabase,
                session.as_ref().map(|session| session.access_token.clone()),
                config.progress_table.clone(),
                PROGRESS_KEY_COLUMN,
            ))
        });

        let source = match (supabase, session, data_url) {
            (Some(supabase), Some(session), None) => Source::Words(SupabaseWords::new(
                supabase,
                Some(session),
                config.words_table.clone(),
            )),
            (_, _, data_url) => Source::Text(HttpTextSource::new(absolute_url(
                data_url.as_deref().unwrap_or(DEFAULT_DATA_PATH),
            ))),
        };

        Ok(Self {
            progress: Rc::new(RefCell::new(ProgressStore::load(storage, config))),
            pairs: RefCell::new(PairStore::new(source.name())),
            source,
            principal,
            remote,
        })
    }

    pub fn principal(&self) -> Principal {
        self.principal.clone()
    }

    pub fn subscribe(&self, callback: js_sys::Function) -> ListenerKey {
        self.progress.borrow_mut().subscribe(move |changed| {
            let terms: js_sys::Array = changed.iter().map(|term| JsValue::from_str(term)).collect();
            let _ = callback.call1(&JsValue::null(), &terms);
        })
    }

    pub fn unsubscribe(&self, key: ListenerKey) {
        self.progress.borrow_mut().unsubscribe(key)
    }

    pub fn record_result(
        &self,
        term: &str,
        correct: bool,
        first_try: bool,
        game: &str,
    ) -> ProgressRecord {
        let _flusher = FlushLater::new(self);
        let record = self
            .progress
            .borrow_mut()
            .record_result(term, correct, first_try, game);
        self.mirror_in_background();
        record
    }

    pub fn get_progress(&self, term: &str) -> ProgressRecord {
        self.progress.borrow().get_progress(term)
    }

    pub fn get_all_progress(&self) -> Result<JsValue, JsValue> {
        to_plain_js(&self.progress.borrow().get_all_progress())
    }

    pub fn set_progress(&self, term: &str, patch: ProgressPatch) -> ProgressRecord {
        let _flusher = FlushLater::new(self);
        let record = self.progress.borrow_mut().set_progress(term, patch);
        self.mirror_in_background();
        record
    }

    pub fn mark_learned(&self, term: &str, learned: bool) -> ProgressRecord {
        let _flusher = FlushLater::new(self);
        let record = self.progress.borrow_mut().mark_learned(term, learned);
        self.mirror_in_background();
        record
    }

    pub fn reset_progress(&self, term: &str) {
        let _flusher = FlushLater::new(self);
        self.progress.borrow_mut().reset_progress(term);
        self.mirror_in_background();
    }

    pub fn due_terms(&self) -> Vec<String> {
        self.progress.borrow().due_terms(chrono::Utc::now())
    }

    pub fn pending_remote_writes(&self) -> usize {
        self.progress.borrow().pending_remote_writes()
    }

    pub fn sync_state(&self) -> SyncState {
        self.progress.borrow().sync_state(SyncTarget::Supabase)
    }

    /// Pulls this principal's progress. Rows are only applied to terms in the current pair list, once one is loaded.
    pub async fn sync_from_cloud(&self) -> SyncReport {
        let _flusher = FlushLater::new(self);

        let Some(remote) = self.remote.clone() else {
            return SyncReport {
                fresh: false,
                error: Some("cloud sync is not configured".to_string()),
                ..Default::default()
            };
        };

        let known_terms = self.pairs.borrow().term_ids();
        let known_terms = (!known_terms.is_empty()).then_some(known_terms);
        ProgressStore::sync_from_cloud(
            &self.progress,
            remote.as_ref(),
            &self.principal,
            known_terms.as_ref(),
        )
        .await
    }

    /// Returns whether the pairs changed. Failures are reported through `pair_status`.
    pub async fn load_pairs(&self) -> bool {
        let result = self.source.fetch().await;
        self.pairs.borrow_mut().apply(result)
    }

    pub fn pairs(&self) -> Result<JsValue, JsValue> {
        to_plain_js(&*self.pairs.borrow().pairs())
    }

    pub fn pair_status(&self) -> PairStatus {
        let pairs = self.pairs.borrow();
        PairStatus {
            source: pairs.source().to_string(),
            count: pairs.pairs().len(),
            usable: pairs.usable().count(),
            updated_at: pairs.updated_at().map(|at| at.timestamp_millis()),
            error: pairs.error().map(str::to_string),
        }
    }

    pub fn review(&self, filter: ReviewFilter) -> Result<JsValue, JsValue> {
        let pairs = self.pairs.borrow().pairs();
        let progress = self.progress.borrow().get_all_progress();
        to_plain_js(&filter.apply(review_rows(&pairs, &progress)))
    }

    pub fn quiz(&self) -> Result<JsValue, JsValue> {
        let pairs = self.pairs.borrow().pairs();
        let mut rng = StdRng::seed_from_u64((js_sys::Math::random() * u64::MAX as f64) as u64);
        to_plain_js(&practice::build_quiz(&pairs, &mut rng))
    }
}

impl Wordbox {
    /// Pushes the outbox without making the caller wait. Without a remote the tasks are discarded.
    fn mirror_in_background(&self) {
        let Some(remote) = self.remote.clone() else {
            self.progress.borrow_mut().take_pending();
            return;
        };
        let progress = self.progress.clone();
        let principal = self.principal.clone();

        wasm_bindgen_futures::spawn_local(async move {
            let report = ProgressStore::flush_outbox(&progress, remote.as_ref(), &principal).await;
            if !report.is_clean() {
                log::warn!(
                    "Mirrored {} progress changes, dropped {}",
                    report.pushed,
                    report.dropped
                );
            }
        });
    }

    fn flush_notifications(&self) {
        let notifications = self.progress.borrow_mut().drain_due_notifications();
        for notification in notifications {
            notification();
        }
    }
}

#[wasm_bindgen]
pub fn check_answer(given: &str, expected: &str) -> bool {
    practice::answers_match(given, expected)
}

/// Flushes listener notifications when dropped, whichever way the function returns.
struct FlushLater<'a> {
    wordbox: &'a Wordbox,
}

impl<'a> FlushLater<'a> {
    fn new(wordbox: &'a Wordbox) -> Self {
        Self { wordbox }
    }
}

impl Drop for FlushLater<'_> {
    fn drop(&mut self) {
        self.wordbox.flush_notifications();
    }
}
