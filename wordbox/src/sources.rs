//! Where pairs come from: a plain text file served next to the app, or the signed-in user's own word list.

use mirror::RemoteError;
use mirror::supabase::{SupabaseConfig, check_response};
use serde::{Deserialize, Serialize};

use crate::pairs::{Pair, parse_pairs};

#[derive(Debug, thiserror::Error)]
pub enum PairSourceError {
    #[error("HTTP {0}")]
    Http(u16),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

#[allow(async_fn_in_trait)]
pub trait PairSource {
    /// Shown next to the pairs so the user knows where they came from.
    fn name(&self) -> String;

    async fn fetch(&self) -> Result<Vec<Pair>, PairSourceError>;
}

/// A newline-delimited `term: definition` file.
pub struct HttpTextSource {
    url: String,
    client: reqwest::Client,
}

impl HttpTextSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

impl PairSource for HttpTextSource {
    fn name(&self) -> String {
        self.url.clone()
    }

    async fn fetch(&self) -> Result<Vec<Pair>, PairSourceError> {
        let response = self
            .client
            .get(&self.url)
            .header("Cache-Control", "no-cache")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PairSourceError::Http(status.as_u16()));
        }
        let text = response.text().await?;
        Ok(parse_pairs(&text))
    }
}

/// The parts of an auth session the word list needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(target_arch = "wasm32", derive(tsify::Tsify))]
#[cfg_attr(target_arch = "wasm32", tsify(into_wasm_abi, from_wasm_abi))]
pub struct Session {
    pub access_token: String,
    pub user_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(target_arch = "wasm32", derive(tsify::Tsify))]
#[cfg_attr(target_arch = "wasm32", tsify(into_wasm_abi, from_wasm_abi))]
pub struct WordRow {
    #[serde(default)]
    #[cfg_attr(target_arch = "wasm32", tsify(type = "string | number | null"))]
    pub id: serde_json::Value,
    #[serde(default)]
    pub word: String,
    #[serde(default)]
    pub definition: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl WordRow {
    /// The row id as a pair key, falling back to the row's position when the id is missing.
    pub fn key(&self, index: usize) -> String {
        match &self.id {
            serde_json::Value::String(id) => id.clone(),
            serde_json::Value::Null => index.to_string(),
            id => id.to_string(),
        }
    }

    pub fn to_pair(&self, index: usize) -> Pair {
        Pair {
            term: self.word.trim().to_string(),
            definition: self.definition.trim().to_string(),
            key: self.key(index),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WordError {
    #[error("Both 'word' and 'definition' are required")]
    MissingField,
    #[error("You must be signed in to insert words")]
    NotSignedIn,
    #[error("That word already exists for your account")]
    Duplicate,
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl From<reqwest::Error> for WordError {
    fn from(e: reqwest::Error) -> Self {
        WordError::Remote(RemoteError::Request(e))
    }
}

/// Body of a PostgREST error response.
#[derive(Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

const UNIQUE_VIOLATION: &str = "23505";

/// The signed-in user's personal word list. Row level security scopes every query to the session's user.
pub struct SupabaseWords {
    config: SupabaseConfig,
    session: Option<Session>,
    table: String,
    client: reqwest::Client,
}

impl SupabaseWords {
    pub fn new(config: SupabaseConfig, session: Option<Session>, table: impl Into<String>) -> Self {
        Self {
            config,
            session,
            table: table.into(),
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, session: &Session) -> reqwest::RequestBuilder {
        let request = self
            .client
            .request(method, self.config.rest_url(&self.table));
        self.config
            .authorize(request, Some(&session.access_token))
    }

    /// Every word of the signed-in user, ordered by word. Without a session the list is empty.
    pub async fn list_words(&self) -> Result<Vec<WordRow>, RemoteError> {
        let Some(session) = &self.session else {
            return Ok(Vec::new());
        };

        let response = self
            .request(reqwest::Method::GET, session)
            .query(&[
                ("select", "id,word,definition,created_at,updated_at"),
                ("order", "word.asc"),
            ])
            .send()
            .await?;
        Ok(check_response(response).await?.json().await?)
    }

    pub async fn insert_word(&self, word: &str, definition: &str) -> Result<WordRow, WordError> {
        let (word, definition) = (word.trim(), definition.trim());
        if word.is_empty() || definition.is_empty() {
            return Err(WordError::MissingField);
        }
        let session = self.session.as_ref().ok_or(WordError::NotSignedIn)?;

        let response = self
            .request(reqwest::Method::POST, session)
            .header("Prefer", "return=representation")
            .json(&[serde_json::json!({
                "user_id": session.user_id,
                "word": word,
                "definition": definition,
            })])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(rejection(status.as_u16(), &body));
        }

        let rows: Vec<WordRow> = response.json().await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| WordError::Rejected("the new word was not returned".to_string()))
    }
}

fn rejection(status: u16, body: &str) -> WordError {
    match serde_json::from_str::<PostgrestError>(body) {
        Ok(error) if error.code.as_deref() == Some(UNIQUE_VIOLATION) => WordError::Duplicate,
        Ok(PostgrestError {
            message: Some(message),
            ..
        }) => WordError::Rejected(message),
        _ => WordError::Remote(RemoteError::Http {
            status,
            body: body.to_string(),
        }),
    }
}

impl PairSource for SupabaseWords {
    fn name(&self) -> String {
        format!("supabase: public.{}", self.table)
    }

    async fn fetch(&self) -> Result<Vec<Pair>, PairSourceError> {
        let rows = self.list_words().await?;
        Ok(rows
            .iter()
            .enumerate()
            .map(|(index, row)| row.to_pair(index))
            .collect())
    }
}
