//! Validators for loosely-structured model output and input files.
//!
//! All validators except [`sanitize_area`] are soft: they filter and log
//! rather than fail, so one odd response never stops a batch.

use thiserror::Error;
use tracing::warn;

/// Header every quiz block must start with.
pub const QUIZ_HEADER: &str = "Quiz:";

/// Option markers every quiz block must contain.
pub const QUIZ_OPTIONS: [&str; 4] = ["A.", "B.", "C.", "D."];

/// Concepts with more words than this are treated as sentence-like output.
pub const MAX_CONCEPT_WORDS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid area name: {0}")]
    InvalidFormat(String),
}

/// Normalize an area name: underscores become spaces, lowercase, trimmed.
///
/// Only letters, whitespace, hyphens and ampersands are allowed in the
/// result.
pub fn sanitize_area(raw: &str) -> Result<String, ValidationError> {
    let sanitized = raw.replace('_', " ").to_lowercase().trim().to_string();

    let valid = !sanitized.is_empty()
        && sanitized
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_whitespace() || c == '-' || c == '&');

    if !valid {
        return Err(ValidationError::InvalidFormat(raw.to_string()));
    }

    Ok(sanitized)
}

/// Drop blank questions; warn (but still return) when fewer than `min_count` remain.
pub fn validate_questions(questions: Vec<String>, min_count: usize) -> Vec<String> {
    let valid: Vec<String> = questions
        .into_iter()
        .filter(|q| !q.trim().is_empty())
        .collect();

    if valid.len() < min_count {
        warn!(
            "Fewer questions than expected: {} (expected at least {})",
            valid.len(),
            min_count
        );
    }

    valid
}

/// Drop blank concepts and sentence-like entries longer than [`MAX_CONCEPT_WORDS`] words.
pub fn validate_concepts(concepts: Vec<String>) -> Vec<String> {
    let mut valid = Vec::with_capacity(concepts.len());

    for concept in concepts {
        let concept = concept.trim();
        if concept.is_empty() {
            continue;
        }

        if concept.split_whitespace().count() > MAX_CONCEPT_WORDS {
            let preview: String = concept.chars().take(50).collect();
            warn!("Concept seems too long, might be malformed: {}...", preview);
            continue;
        }

        valid.push(concept.to_string());
    }

    if valid.is_empty() {
        warn!("No valid concepts extracted");
    }

    valid
}

/// Structural classification of a quiz block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockVerdict {
    WellFormed,
    MissingHeader,
    MissingOption(&'static str),
}

pub fn classify_quiz_block(text: &str) -> BlockVerdict {
    if !text.starts_with(QUIZ_HEADER) {
        return BlockVerdict::MissingHeader;
    }

    QUIZ_OPTIONS
        .iter()
        .find(|option| !text.contains(*option))
        .map(|option| BlockVerdict::MissingOption(option))
        .unwrap_or(BlockVerdict::WellFormed)
}

/// `true` if `text` starts with [`QUIZ_HEADER`] and contains every option marker.
pub fn validate_quiz_block(text: &str) -> bool {
    match classify_quiz_block(text) {
        BlockVerdict::WellFormed => true,
        BlockVerdict::MissingHeader => {
            warn!("Quiz doesn't start with '{}'", QUIZ_HEADER);
            false
        }
        BlockVerdict::MissingOption(option) => {
            warn!("Quiz missing option {}", option);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sanitize_area_underscores() {
        assert_eq!(sanitize_area("Ancient_History").unwrap(), "ancient history");
    }

    #[test]
    fn test_sanitize_area_allows_hyphen_and_ampersand() {
        assert_eq!(
            sanitize_area("  Arts & Crafts  ").unwrap(),
            "arts & crafts"
        );
        assert_eq!(sanitize_area("Socio-Economics").unwrap(), "socio-economics");
    }

    #[test]
    fn test_sanitize_area_rejects_punctuation() {
        assert_eq!(
            sanitize_area("Math!!"),
            Err(ValidationError::InvalidFormat("Math!!".to_string()))
        );
        assert!(sanitize_area("Physics 101").is_err());
        assert!(sanitize_area("   ").is_err());
    }

    #[test]
    fn test_validate_questions_drops_blank() {
        let out = validate_questions(strings(&["What is light?", "  ", "", "Why?"]), 1);
        assert_eq!(out, strings(&["What is light?", "Why?"]));
    }

    #[test]
    fn test_validate_questions_short_list_still_returned() {
        let out = validate_questions(strings(&["Only one?"]), 3);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_validate_concepts_drops_long_entries() {
        let out = validate_concepts(strings(&[
            "carbon",
            "a very long sentence with way more than ten words in it describing something",
        ]));
        assert_eq!(out, strings(&["carbon"]));
    }

    #[test]
    fn test_validate_concepts_trims_and_drops_blank() {
        let out = validate_concepts(strings(&["  chlorophyll ", "", "   ", "light reaction"]));
        assert_eq!(out, strings(&["chlorophyll", "light reaction"]));
    }

    #[test]
    fn test_validate_concepts_ten_words_kept() {
        let ten = "one two three four five six seven eight nine ten";
        assert_eq!(validate_concepts(strings(&[ten])).len(), 1);
    }

    #[test]
    fn test_quiz_block_missing_d() {
        assert!(!validate_quiz_block("Quiz: X?\nA. 1\nB. 2\nC. 3"));
        assert_eq!(
            classify_quiz_block("Quiz: X?\nA. 1\nB. 2\nC. 3"),
            BlockVerdict::MissingOption("D.")
        );
    }

    #[test]
    fn test_quiz_block_complete() {
        assert!(validate_quiz_block("Quiz: X?\nA. 1\nB. 2\nC. 3\nD. 4"));
    }

    #[test]
    fn test_quiz_block_missing_header() {
        assert_eq!(
            classify_quiz_block("Question: X?\nA. 1\nB. 2\nC. 3\nD. 4"),
            BlockVerdict::MissingHeader
        );
    }
}
