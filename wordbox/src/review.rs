use serde::{Deserialize, Serialize};

use crate::leitner::MAX_BOX;
use crate::pairs::Pair;
use crate::progress::{ProgressRecord, term_id};

/// Terms below this mastery count as weak.
pub const LOW_MASTERY_PERCENT: u8 = 50;

/// A 0-100 score, weighted mostly by box with some credit for accuracy and first tries.
pub fn mastery_percent(record: &ProgressRecord) -> u8 {
    let record = record.clone().clamped();
    let base = f64::from(record.leitner_box) / f64::from(MAX_BOX);
    let (accuracy, first) = if record.attempts > 0 {
        let attempts = f64::from(record.attempts);
        (
            f64::from(record.correct) / attempts,
            f64::from(record.first_try) / attempts,
        )
    } else {
        (0.0, 0.0)
    };

    let score = (0.7 * base + 0.2 * accuracy + 0.1 * first).min(1.0);
    (score * 100.0).round() as u8
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(target_arch = "wasm32", derive(tsify::Tsify))]
#[cfg_attr(target_arch = "wasm32", tsify(into_wasm_abi, from_wasm_abi))]
#[serde(rename_all = "camelCase")]
pub struct ReviewRow {
    pub term: String,
    pub definition: String,
    pub progress: ProgressRecord,
    pub mastery_percent: u8,
}

/// One row per pair that has a term. Terms without progress get the zero record.
pub fn review_rows(pairs: &[Pair], progress: &im::OrdMap<String, ProgressRecord>) -> Vec<ReviewRow> {
    pairs
        .iter()
        .filter(|pair| !pair.term.is_empty())
        .map(|pair| {
            let progress = progress
                .get(&term_id(&pair.term))
                .cloned()
                .unwrap_or_default();
            ReviewRow {
                term: pair.term.clone(),
                definition: pair.definition.clone(),
                mastery_percent: mastery_percent(&progress),
                progress,
            }
        })
        .collect()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(target_arch = "wasm32", derive(tsify::Tsify))]
#[cfg_attr(target_arch = "wasm32", tsify(into_wasm_abi, from_wasm_abi))]
#[serde(rename_all = "camelCase")]
pub enum ReviewFilter {
    #[default]
    All,
    Learned,
    Unlearned,
    Low,
}

impl ReviewFilter {
    pub fn matches(self, row: &ReviewRow) -> bool {
        match self {
            ReviewFilter::All => true,
            ReviewFilter::Learned => row.progress.learned,
            ReviewFilter::Unlearned => !row.progress.learned,
            ReviewFilter::Low => row.mastery_percent < LOW_MASTERY_PERCENT,
        }
    }

    /// Keeps the matching rows, weakest first.
    pub fn apply(self, rows: Vec<ReviewRow>) -> Vec<ReviewRow> {
        let mut rows: Vec<ReviewRow> = rows.into_iter().filter(|row| self.matches(row)).collect();
        rows.sort_by_key(|row| row.mastery_percent);
        rows
    }
}
