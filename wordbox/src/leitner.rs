//! Leitner box scheduling. Box 0 holds new or just-failed terms, box 5 holds mastered ones.

use chrono::{DateTime, Duration, Utc};

pub const MAX_BOX: u8 = 5;

/// Days until the next review, indexed by the box a term has just moved into.
pub const INTERVAL_DAYS: [i64; MAX_BOX as usize + 1] = [0, 1, 2, 4, 7, 15];

/// A correct answer moves a term up one box, a wrong answer moves it down one.
pub fn next_box(current: u8, correct: bool) -> u8 {
    let current = current.min(MAX_BOX);
    if correct {
        (current + 1).min(MAX_BOX)
    } else {
        current.saturating_sub(1)
    }
}

pub fn due_at(leitner_box: u8, now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::days(INTERVAL_DAYS[leitner_box.min(MAX_BOX) as usize])
}
