//! Term/definition pairs shared by every game.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

use crate::progress::term_id;
use crate::sources::{PairSource, PairSourceError};

const DELIMITERS: [char; 5] = [':', '-', '–', '—', '\t'];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(target_arch = "wasm32", derive(tsify::Tsify))]
#[cfg_attr(target_arch = "wasm32", tsify(into_wasm_abi, from_wasm_abi))]
pub struct Pair {
    pub term: String,
    pub definition: String,
    pub key: String,
}

impl Pair {
    /// Games only use pairs with both sides filled in.
    pub fn is_usable(&self) -> bool {
        !self.term.is_empty() && !self.definition.is_empty()
    }
}

/// Splits on the first delimiter only, so later delimiters stay part of the definition.
/// A line without a delimiter is all term.
pub fn split_pair_line(line: &str) -> (String, String) {
    match line.char_indices().find(|(_, c)| DELIMITERS.contains(c)) {
        Some((index, delimiter)) => (
            line[..index].trim().to_string(),
            line[index + delimiter.len_utf8()..].trim().to_string(),
        ),
        None => (line.trim().to_string(), String::new()),
    }
}

/// One pair per non-blank line. Keys are positional (`p0`, `p1`, ...), so they only stay the same
/// across loads while the text does.
pub fn parse_pairs(text: &str) -> Vec<Pair> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).trim())
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(index, line)| {
            let (term, definition) = split_pair_line(line);
            Pair {
                term,
                definition,
                key: format!("p{index}"),
            }
        })
        .collect()
}

fn content_hash(pairs: &[Pair]) -> u64 {
    let mut hasher = Xxh3::new();
    for pair in pairs {
        for field in [&pair.term, &pair.definition, &pair.key] {
            hasher.update(&(field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
    }
    hasher.digest()
}

/// The current pair list plus the status of its last load.
///
/// Reloading identical content hands out the same `Arc`, so consumers can compare with `Arc::ptr_eq` and skip work.
/// A failed load never clears pairs that were loaded before.
#[derive(Clone, Debug)]
pub struct PairStore {
    pairs: Arc<Vec<Pair>>,
    source: String,
    updated_at: Option<DateTime<Utc>>,
    error: Option<String>,
    hash: Option<u64>,
}

impl PairStore {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            pairs: Arc::new(Vec::new()),
            source: source.into(),
            updated_at: None,
            error: None,
            hash: None,
        }
    }

    pub fn pairs(&self) -> Arc<Vec<Pair>> {
        self.pairs.clone()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn usable(&self) -> impl Iterator<Item = &Pair> {
        self.pairs.iter().filter(|pair| pair.is_usable())
    }

    /// Term ids of every usable pair. Progress pulled from the remote is only applied to these.
    pub fn term_ids(&self) -> BTreeSet<String> {
        self.usable().map(|pair| term_id(&pair.term)).collect()
    }

    pub fn ingest(&mut self, text: &str) -> bool {
        self.ingest_at(text, Utc::now())
    }

    /// Parses `text` and publishes it if the content changed. Returns whether it did.
    pub fn ingest_at(&mut self, text: &str, now: DateTime<Utc>) -> bool {
        self.replace_at(parse_pairs(text), now)
    }

    pub fn replace(&mut self, pairs: Vec<Pair>) -> bool {
        self.replace_at(pairs, Utc::now())
    }

    /// Same as `ingest_at` for pairs that were not parsed from text.
    pub fn replace_at(&mut self, pairs: Vec<Pair>, now: DateTime<Utc>) -> bool {
        self.error = None;

        let hash = content_hash(&pairs);
        if self.hash == Some(hash) {
            return false;
        }

        log::info!("Loaded {} pairs from {}", pairs.len(), self.source);
        self.pairs = Arc::new(pairs);
        self.hash = Some(hash);
        self.updated_at = Some(now);
        true
    }

    pub fn record_failure(&mut self, error: impl std::fmt::Display) {
        self.record_failure_at(error, Utc::now())
    }

    pub fn record_failure_at(&mut self, error: impl std::fmt::Display, now: DateTime<Utc>) {
        let error = error.to_string();
        log::warn!(
            "Could not load pairs from {}, keeping {} loaded pairs: {error}",
            self.source,
            self.pairs.len()
        );
        self.error = Some(error);
        self.updated_at = Some(now);
    }

    /// Applies the outcome of a fetch. Returns whether the pairs changed.
    pub fn apply(&mut self, result: Result<Vec<Pair>, PairSourceError>) -> bool {
        match result {
            Ok(pairs) => self.replace(pairs),
            Err(e) => {
                self.record_failure(e);
                false
            }
        }
    }

    /// Fetches from `source` and applies the result.
    ///
    /// This holds `&mut self` across the fetch. Owners that share the store through a `RefCell`
    /// should fetch first and call `apply` afterwards.
    pub async fn refresh(&mut self, source: &impl PairSource) -> bool {
        let result = source.fetch().await;
        self.apply(result)
    }
}
