mod config;
mod leitner;
mod pairs;
mod practice;
mod principal;
mod progress;
mod review;
mod sources;
mod storage;
mod utils;

#[cfg(target_arch = "wasm32")]
mod wasm;

use std::sync::LazyLock;

pub use config::{ConfigError, StoreConfig, supabase_config};
pub use leitner::{INTERVAL_DAYS, MAX_BOX, due_at, next_box};
pub use mirror::data_model::{ListenerKey, Principal, SyncState, SyncTarget};
pub use mirror::memory::MemoryRemote;
pub use mirror::supabase::{SupabaseConfig, SupabaseRemote};
pub use mirror::{FlushReport, RemoteError, RemoteStore};
pub use pairs::{Pair, PairStore, parse_pairs, split_pair_line};
pub use practice::{
    FirstTryTracker, QUIZ_DISTRACTORS, QuizQuestion, answers_match, build_quiz, normalize_answer,
    shuffle,
};
pub use principal::{get_or_create_device_id, get_uuid, resolve_principal};
pub use progress::{ProgressPatch, ProgressRecord, ProgressStore, SyncReport, term_id};
pub use review::{LOW_MASTERY_PERCENT, ReviewFilter, ReviewRow, mastery_percent, review_rows};
pub use sources::{
    HttpTextSource, PairSource, PairSourceError, Session, SupabaseWords, WordError, WordRow,
};
#[cfg(not(target_arch = "wasm32"))]
pub use storage::FileStorage;
pub use storage::{KeyValueStorage, MemoryStorage, StorageError};

#[cfg(target_arch = "wasm32")]
pub use storage::BrowserStorage;
#[cfg(target_arch = "wasm32")]
pub use wasm::{PairStatus, Wordbox, check_answer};

// keeping the logger behind a LazyLock makes it impossible to initialize it more than once
static LOGGER: LazyLock<()> = LazyLock::new(|| {
    utils::set_panic_hook();

    #[cfg(target_arch = "wasm32")]
    wasm_logger::init(wasm_logger::Config::default());

    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or("info"),
        )
        .try_init();
    }

    log::info!("Logging initialized");
});

/// Initializes logging and the panic hook. Safe to call any number of times.
pub fn init_logging() {
    LazyLock::force(&LOGGER);
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen::prelude::wasm_bindgen)]
pub fn get_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
