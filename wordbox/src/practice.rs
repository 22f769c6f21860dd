//! Game-independent pieces of the practice games: answer checking, first-try bookkeeping and quiz setup.

use std::collections::HashSet;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::pairs::Pair;
use crate::progress::term_id;

/// Wrong options offered next to the right one.
pub const QUIZ_DISTRACTORS: usize = 3;

fn is_diacritic(c: char) -> bool {
    ('\u{0300}'..='\u{036f}').contains(&c)
}

/// Lowercases, strips accents and collapses whitespace, so "  Café  au lait" matches "cafe au lait".
pub fn normalize_answer(answer: &str) -> String {
    let stripped: String = answer
        .to_lowercase()
        .nfd()
        .filter(|c| !is_diacritic(*c))
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn answers_match(given: &str, expected: &str) -> bool {
    normalize_answer(given) == normalize_answer(expected)
}

/// Remembers which terms were missed since the current presentation cycle began.
#[derive(Clone, Debug, Default)]
pub struct FirstTryTracker {
    missed: HashSet<String>,
}

impl FirstTryTracker {
    pub fn record_mistake(&mut self, term: &str) {
        self.missed.insert(term_id(term));
    }

    pub fn first_try(&self, term: &str) -> bool {
        !self.missed.contains(&term_id(term))
    }

    /// Notes the answer and returns the first-try flag to record it with.
    pub fn answer(&mut self, term: &str, correct: bool) -> bool {
        if !correct {
            self.record_mistake(term);
            return false;
        }
        self.first_try(term)
    }

    pub fn next_cycle(&mut self) {
        self.missed.clear();
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(target_arch = "wasm32", derive(tsify::Tsify))]
#[cfg_attr(target_arch = "wasm32", tsify(into_wasm_abi, from_wasm_abi))]
pub struct QuizQuestion {
    /// The right answer.
    pub term: String,
    /// The definition shown to the player.
    pub prompt: String,
    pub options: Vec<String>,
}

/// One question per usable pair, in random order. Options are the term plus up to three other terms.
pub fn build_quiz<R: Rng + ?Sized>(pairs: &[Pair], rng: &mut R) -> Vec<QuizQuestion> {
    let usable: Vec<&Pair> = pairs.iter().filter(|pair| pair.is_usable()).collect();

    let mut questions: Vec<QuizQuestion> = usable
        .iter()
        .map(|pair| {
            let mut distractors: Vec<&str> = usable
                .iter()
                .map(|other| other.term.as_str())
                .filter(|term| *term != pair.term)
                .collect();
            distractors.sort_unstable();
            distractors.dedup();
            distractors.shuffle(rng);
            distractors.truncate(QUIZ_DISTRACTORS);

            let mut options = vec![pair.term.clone()];
            options.extend(distractors.into_iter().map(str::to_string));
            options.shuffle(rng);

            QuizQuestion {
                term: pair.term.clone(),
                prompt: pair.definition.clone(),
                options,
            }
        })
        .collect();

    questions.shuffle(rng);
    questions
}

/// A shuffled copy.
pub fn shuffle<T: Clone, R: Rng + ?Sized>(items: &[T], rng: &mut R) -> Vec<T> {
    let mut items = items.to_vec();
    items.shuffle(rng);
    items
}
