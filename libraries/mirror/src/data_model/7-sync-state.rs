#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[cfg_attr(target_arch = "wasm32", derive(tsify::Tsify))]
#[cfg_attr(target_arch = "wasm32", tsify(into_wasm_abi, from_wasm_abi))]
#[serde(rename_all = "camelCase")]
pub enum SyncTarget {
    Supabase,
    Memory,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(target_arch = "wasm32", derive(tsify::Tsify))]
#[cfg_attr(target_arch = "wasm32", tsify(into_wasm_abi, from_wasm_abi))]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// If last_sync_started > last_sync_finished, then the sync is in progress.
    pub last_sync_started: Option<chrono::DateTime<chrono::Utc>>,
    pub last_sync_finished: Option<chrono::DateTime<chrono::Utc>>,

    /// If last_sync_error is Some, then the last sync failed. Gets reset to None when the next sync succeeds.
    pub last_sync_error: Option<String>,
}

impl SyncState {
    pub fn in_progress(&self) -> bool {
        match (self.last_sync_started, self.last_sync_finished) {
            (Some(started), Some(finished)) => started > finished,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}
