//! PHQ-9 score extraction and persistence.
//!
//! Scores are pulled out of the user's own message with an ordered list of
//! patterns. The first pattern with any match wins; among its matches the
//! first value inside 0..=27 is accepted. If every match of a pattern is out
//! of range, the next pattern is tried.
//!
//! The patterns have no disambiguation: any "<number>점" in the message can
//! be read as a score.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::db::DatabaseError;
use crate::models::enums::SeverityBand;
use crate::store::ConversationStore;

pub const MAX_SCORE: u32 = 27;

/// Score patterns in priority order. Capture group 1 is the number.
static SCORE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)PHQ.*?(\d+)점",
        r"(?i)점수.*?(\d+)",
        r"(?i)(\d+)점",
        r"(?i)총.*?(\d+)",
    ]
    .into_iter()
    .filter_map(|source| match Regex::new(source) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::error!(pattern = source, error = %e, "Invalid score pattern");
            None
        }
    })
    .collect()
});

/// Single Unicode decimal digit, the class `\d` matches in the patterns above.
static DECIMAL_DIGIT: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^\d$").ok());

fn is_decimal_digit(c: char) -> bool {
    let mut buf = [0u8; 4];
    DECIMAL_DIGIT
        .as_ref()
        .is_some_and(|re| re.is_match(c.encode_utf8(&mut buf)))
}

/// Numeric value of any Unicode decimal digit (ASCII, full-width, Arabic-Indic, ...).
///
/// Decimal digits are assigned in contiguous 0..=9 runs, so the value is the
/// offset from the start of the contiguous digit block, modulo 10.
fn digit_value(c: char) -> Option<u32> {
    if let Some(d) = c.to_digit(10) {
        return Some(d);
    }
    if !is_decimal_digit(c) {
        return None;
    }
    let mut zero = c as u32;
    while let Some(prev) = zero.checked_sub(1).and_then(char::from_u32) {
        if !is_decimal_digit(prev) {
            break;
        }
        zero -= 1;
    }
    Some((c as u32 - zero) % 10)
}

/// Parse a run of decimal digits of any script. `None` on overflow.
fn parse_digits(digits: &str) -> Option<u32> {
    digits
        .chars()
        .try_fold(0u32, |acc, c| acc.checked_mul(10)?.checked_add(digit_value(c)?))
}

/// An extracted PHQ-9 score and its band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phq9Score {
    pub score: u8,
    pub band: SeverityBand,
}

impl Phq9Score {
    /// `None` when the value is outside 0..=27.
    pub fn new(value: u32) -> Option<Self> {
        if value > MAX_SCORE {
            return None;
        }
        let score = value as u8;
        Some(Self {
            score,
            band: SeverityBand::from_score(score),
        })
    }
}

/// Find the first in-range score in `text`, following pattern priority.
pub fn extract_score(text: &str) -> Option<Phq9Score> {
    SCORE_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .filter_map(|m| parse_digits(m.as_str()))
            .find_map(Phq9Score::new)
    })
}

/// Extract a score from the user's message and upsert it for the user.
///
/// No match is not an error. Store failures propagate.
pub fn extract_and_save(
    store: &dyn ConversationStore,
    user_id: i64,
    conversation_id: i64,
    text: &str,
) -> Result<Option<Phq9Score>, DatabaseError> {
    let Some(found) = extract_score(text) else {
        return Ok(None);
    };

    store.upsert_assessment(user_id, found.score, found.band)?;
    tracing::info!(
        user_id,
        conversation_id,
        score = found.score,
        band = found.band.as_str(),
        "PHQ-9 score recorded"
    );
    Ok(Some(found))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteConversationStore;

    #[test]
    fn every_valid_score_is_extracted_with_its_band() {
        for s in 0..=27u32 {
            let text = format!("PHQ-9 검사 결과 {s}점 나왔어요");
            let found = extract_score(&text).unwrap_or_else(|| panic!("no score for {s}"));
            assert_eq!(u32::from(found.score), s);
            assert_eq!(found.band, SeverityBand::from_score(s as u8));
        }
    }

    #[test]
    fn out_of_range_score_is_rejected() {
        assert_eq!(extract_score("PHQ-9 결과 30점이래요"), None);
        assert_eq!(extract_score("100점 만점"), None);
    }

    #[test]
    fn out_of_range_falls_through_to_later_pattern() {
        // Pattern 1 only sees 30; pattern 2 finds 12 after "점수".
        let found = extract_score("PHQ 30점 아니고 점수는 12").unwrap();
        assert_eq!(found.score, 12);
        assert_eq!(found.band, SeverityBand::Moderate);
    }

    #[test]
    fn first_in_range_match_of_pattern_wins() {
        let found = extract_score("처음엔 40점, 다음엔 8점, 지금은 3점").unwrap();
        assert_eq!(found.score, 8);
        assert_eq!(found.band, SeverityBand::Mild);
    }

    #[test]
    fn pattern_priority_is_respected() {
        // "점수 5" (pattern 2) outranks the bare "20점" (pattern 3).
        let found = extract_score("20점 만점 중 제 점수 5").unwrap();
        assert_eq!(found.score, 5);

        let found = extract_score("총 합계 17").unwrap();
        assert_eq!(found.score, 17);
        assert_eq!(found.band, SeverityBand::Severe);
    }

    #[test]
    fn phq_prefix_is_case_insensitive() {
        assert_eq!(extract_score("phq9 결과 22점").unwrap().band, SeverityBand::VerySevere);
    }

    #[test]
    fn full_width_digits_are_read() {
        let found = extract_score("PHQ-9 점수는 １２점이에요").unwrap();
        assert_eq!(found.score, 12);
        assert_eq!(found.band, SeverityBand::Moderate);

        let found = extract_score("총 ２０").unwrap();
        assert_eq!(found.band, SeverityBand::VerySevere);
    }

    #[test]
    fn other_script_digits_are_read() {
        // Arabic-Indic fifteen.
        assert_eq!(extract_score("PHQ \u{0661}\u{0665}점").unwrap().score, 15);
        // Devanagari three.
        assert_eq!(extract_score("\u{0969}점").unwrap().score, 3);
    }

    #[test]
    fn digit_values_fold_across_scripts() {
        assert_eq!(parse_digits("27"), Some(27));
        assert_eq!(parse_digits("２７"), Some(27));
        assert_eq!(parse_digits("０"), Some(0));
        assert_eq!(parse_digits("１x"), None);
        assert_eq!(parse_digits("99999999999"), None);
    }

    #[test]
    fn full_width_out_of_range_falls_through() {
        let found = extract_score("PHQ ３０점, 점수는 ９").unwrap();
        assert_eq!(found.score, 9);
    }

    #[test]
    fn text_without_score_yields_none() {
        assert_eq!(extract_score("요즘 너무 피곤하고 잠이 안 와요"), None);
        assert_eq!(extract_score(""), None);
    }

    #[test]
    fn extract_and_save_upserts_single_row() {
        let store = SqliteConversationStore::open_in_memory().unwrap();

        let first = extract_and_save(&store, 4, 1, "PHQ-9 점수 11점이에요").unwrap().unwrap();
        let stored_first = store.get_assessment(4).unwrap().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = extract_and_save(&store, 4, 1, "PHQ-9 점수 11점이에요").unwrap().unwrap();
        let stored_second = store.get_assessment(4).unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(stored_second.score, 11);
        assert_eq!(stored_second.band, SeverityBand::Moderate);
        assert!(stored_second.updated_at > stored_first.updated_at);
    }

    #[test]
    fn extract_and_save_without_match_writes_nothing() {
        let store = SqliteConversationStore::open_in_memory().unwrap();
        assert_eq!(extract_and_save(&store, 4, 1, "그냥 우울해요").unwrap(), None);
        assert!(store.get_assessment(4).unwrap().is_none());
    }
}
