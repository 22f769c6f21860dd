use mirror::supabase::SupabaseConfig;

const SUPABASE_URL: &str = "SUPABASE_URL";
const SUPABASE_ANON_KEY: &str = "SUPABASE_ANON_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
}

/// Names of everything the store persists or talks to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    /// Local storage key holding the whole progress map as one JSON object.
    pub progress_key: String,
    pub device_id_key: String,
    /// Remote table mirroring progress records, one row per (principal, term).
    pub progress_table: String,
    pub words_table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            progress_key: "vgs_progress_v1".to_string(),
            device_id_key: "vgs_device_id".to_string(),
            progress_table: "progress".to_string(),
            words_table: "words".to_string(),
        }
    }
}

/// Supabase settings. Native builds read them from the environment (and a `.env` file if present);
/// browser builds have them baked in at compile time.
///
/// A missing setting means the app runs local-only.
pub fn supabase_config() -> Result<SupabaseConfig, ConfigError> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = dotenvy::dotenv();
        supabase_config_from(|name| std::env::var(name).ok())
    }

    #[cfg(target_arch = "wasm32")]
    {
        supabase_config_from(|name| match name {
            SUPABASE_URL => option_env!("SUPABASE_URL").map(str::to_string),
            SUPABASE_ANON_KEY => option_env!("SUPABASE_ANON_KEY").map(str::to_string),
            _ => None,
        })
    }
}

fn supabase_config_from(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<SupabaseConfig, ConfigError> {
    let read = |name: &'static str| {
        lookup(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::Missing(name))
            .inspect_err(|e| log::error!("Supabase is not configured: {e}"))
    };

    Ok(SupabaseConfig {
        supabase_url: read(SUPABASE_URL)?,
        supabase_anon_key: read(SUPABASE_ANON_KEY)?,
    })
}
