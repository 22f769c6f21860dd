//! Mirroring to a Supabase table through its PostgREST interface.
//!
//! The table needs a `principal` text column, a key column, and one column per field of the record's JSON.
//! A unique constraint on `(principal, <key column>)` lets upserts resolve conflicts.

use serde::{Deserialize, Serialize};

use crate::data_model::{Principal, Record, SyncTarget};
use crate::{RemoteError, RemoteStore};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(target_arch = "wasm32", derive(tsify::Tsify))]
#[cfg_attr(target_arch = "wasm32", tsify(into_wasm_abi, from_wasm_abi))]
pub struct SupabaseConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl SupabaseConfig {
    pub fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.supabase_url.trim_end_matches('/'))
    }

    /// Adds the headers every PostgREST request needs. Without an access token, requests run as the anonymous role.
    pub fn authorize(
        &self,
        request: reqwest::RequestBuilder,
        access_token: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let bearer = access_token.unwrap_or(&self.supabase_anon_key);
        request
            .header("apikey", &self.supabase_anon_key)
            .header("Authorization", format!("Bearer {bearer}"))
    }
}

/// Turns a non-success response into a `RemoteError`, keeping the body for diagnostics.
pub async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match status.as_u16() {
        401 | 403 => Err(RemoteError::Unauthorized(status.as_u16())),
        status => Err(RemoteError::Http { status, body }),
    }
}

pub struct SupabaseRemote {
    config: SupabaseConfig,
    access_token: Option<String>,
    table: String,
    key_column: String,
    client: reqwest::Client,
}

impl SupabaseRemote {
    pub fn new(
        config: SupabaseConfig,
        access_token: Option<String>,
        table: impl Into<String>,
        key_column: impl Into<String>,
    ) -> Self {
        Self {
            config,
            access_token,
            table: table.into(),
            key_column: key_column.into(),
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        let request = self
            .client
            .request(method, self.config.rest_url(&self.table));
        self.config
            .authorize(request, self.access_token.as_deref())
    }

    fn row<R: Record>(
        &self,
        principal: &Principal,
        key: &str,
        record: &R,
    ) -> Result<serde_json::Value, RemoteError> {
        let mut row = record.to_json()?;
        let Some(columns) = row.as_object_mut() else {
            return Err(RemoteError::Decode(
                <serde_json::Error as serde::ser::Error>::custom(
                    "records must serialize to a JSON object",
                ),
            ));
        };
        columns.insert(
            "principal".to_string(),
            serde_json::Value::String(principal.column_value()),
        );
        columns.insert(
            self.key_column.clone(),
            serde_json::Value::String(key.to_string()),
        );
        Ok(row)
    }
}

impl<R: Record> RemoteStore<R> for SupabaseRemote {
    fn target(&self) -> SyncTarget {
        SyncTarget::Supabase
    }

    async fn upsert(&self, principal: &Principal, key: &str, record: &R) -> Result<(), RemoteError> {
        let row = self.row(principal, key, record)?;
        let response = self
            .request(reqwest::Method::POST)
            .query(&[("on_conflict", format!("principal,{}", self.key_column))])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[row])
            .send()
            .await?;
        check_response(response).await?;
        Ok(())
    }

    async fn delete(&self, principal: &Principal, key: &str) -> Result<(), RemoteError> {
        let response = self
            .request(reqwest::Method::DELETE)
            .query(&[
                ("principal".to_string(), format!("eq.{}", principal.column_value())),
                (self.key_column.clone(), format!("eq.{key}")),
            ])
            .send()
            .await?;
        check_response(response).await?;
        Ok(())
    }

    async fn list(&self, principal: &Principal) -> Result<Vec<(String, R)>, RemoteError> {
        let response = self
            .request(reqwest::Method::GET)
            .query(&[
                ("select", "*".to_string()),
                ("principal", format!("eq.{}", principal.column_value())),
            ])
            .send()
            .await?;
        let rows: Vec<serde_json::Value> = check_response(response).await?.json().await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(key) = row.get(&self.key_column).and_then(|v| v.as_str()) else {
                log::warn!("Skipping {} row without a {} column", self.table, self.key_column);
                continue;
            };
            match R::from_json(&row) {
                Ok(record) => records.push((key.to_string(), record)),
                Err(e) => log::warn!("Skipping undecodable {} row for {key:?}: {e}", self.table),
            }
        }
        Ok(records)
    }
}
