//! Parsers for the semi-structured text the language model returns.
//!
//! Each parser implements a small grammar and reports malformed output as
//! a [`ParseError`], which the caller treats as a retryable failure:
//!
//! | Output | Grammar |
//! |--------|---------|
//! | questions | one question per line, blank lines ignored |
//! | concepts | optional `Concept:` label, optional `[`…`]`, comma-separated items or one item per line |
//! | quizzes | sections delimited by `[Quiz]`, each checked by [`classify_quiz_block`] |
//! | evaluation | a JSON object (possibly nested) with the five rubric labels, each an integer 1..=5 |

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{EvaluationScore, RetrievedPassage, RubricDimension};
use crate::validation::{classify_quiz_block, validate_concepts, BlockVerdict};

/// Literal delimiter preceding every quiz block.
pub const QUIZ_DELIMITER: &str = "[Quiz]";

const CONCEPT_LABEL: &str = "Concept:";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Model returned an empty response")]
    EmptyResponse,
    #[error("No questions found in response")]
    NoQuestions,
    #[error("No valid concepts found in response")]
    NoConcepts,
    #[error("No well-formed quiz blocks found in response")]
    NoQuizBlocks,
    #[error("No JSON found in response")]
    MissingJson,
    #[error("Invalid JSON in response: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("Evaluation is missing dimension '{0}'")]
    MissingDimension(&'static str),
    #[error("Score for '{dimension}' out of range: {value}")]
    ScoreOutOfRange {
        dimension: &'static str,
        value: String,
    },
}

/// One question per non-blank line.
pub fn parse_questions(text: &str) -> Result<Vec<String>, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::EmptyResponse);
    }

    let questions: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if questions.is_empty() {
        return Err(ParseError::NoQuestions);
    }
    Ok(questions)
}

/// Concept list, e.g. `[aldose, carbohydrate, sugar]`.
///
/// The list is normally comma-separated on the first non-blank line. A
/// reply whose first line is a single unbracketed item followed by more
/// lines is read as one concept per line, with `-`/`*` bullets removed.
/// Items are trimmed and stripped of surrounding quotes, then filtered by
/// [`validate_concepts`].
pub fn parse_concepts(text: &str) -> Result<Vec<String>, ParseError> {
    let mut body = text.trim();
    if body.is_empty() {
        return Err(ParseError::EmptyResponse);
    }

    if let Some(rest) = body.strip_prefix(CONCEPT_LABEL) {
        body = rest.trim();
    }

    let lines: Vec<&str> = body
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let one_per_line = match lines.first() {
        Some(first) => lines.len() > 1 && !first.contains(',') && !first.starts_with('['),
        None => false,
    };

    let raw: Vec<&str> = if one_per_line {
        lines
            .iter()
            .map(|l| l.trim_start_matches(['-', '*']).trim())
            .collect()
    } else {
        lines
            .first()
            .map(|first| first.trim_start_matches('[').trim_end_matches(']'))
            .unwrap_or("")
            .split(',')
            .collect()
    };

    let items: Vec<String> = raw
        .into_iter()
        .map(|item| {
            item.trim()
                .trim_matches(|c| c == '"' || c == '\'')
                .trim()
                .to_string()
        })
        .collect();

    let concepts = validate_concepts(items);
    if concepts.is_empty() {
        return Err(ParseError::NoConcepts);
    }
    Ok(concepts)
}

/// Split a quiz response on [`QUIZ_DELIMITER`] and keep the well-formed blocks.
///
/// Sections that do not start with `Quiz` are treated as preamble and
/// ignored; sections that do but fail [`classify_quiz_block`] are dropped
/// with a warning.
pub fn parse_quiz_blocks(text: &str) -> Result<Vec<String>, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::EmptyResponse);
    }

    let mut blocks = Vec::new();
    for section in text.split(QUIZ_DELIMITER) {
        let section = section.trim();
        if !section.starts_with("Quiz") {
            continue;
        }

        match classify_quiz_block(section) {
            BlockVerdict::WellFormed => blocks.push(section.to_string()),
            BlockVerdict::MissingHeader => {
                warn!("Invalid quiz format (bad header), skipping");
            }
            BlockVerdict::MissingOption(option) => {
                warn!("Invalid quiz format (missing option {}), skipping", option);
            }
        }
    }

    if blocks.is_empty() {
        return Err(ParseError::NoQuizBlocks);
    }
    debug!("Parsed {} quiz blocks", blocks.len());
    Ok(blocks)
}

/// Extract the five rubric scores from an evaluation response.
///
/// The scores are read from the top-level object, or else from the first
/// nested object that carries every rubric label (e.g.
/// `{"reasoning": "...", "evaluation": {...}}`).
pub fn parse_evaluation(text: &str) -> Result<EvaluationScore, ParseError> {
    let json = extract_json_object(text).ok_or(ParseError::MissingJson)?;
    let value: Value = serde_json::from_str(json)?;
    let top = value.as_object().ok_or(ParseError::MissingJson)?;
    let object = find_rubric_object(&value).unwrap_or(top);

    let mut score = EvaluationScore::failed();
    for dimension in RubricDimension::ALL {
        let label = dimension.label();
        let raw = object
            .get(label)
            .ok_or(ParseError::MissingDimension(label))?;
        score.set(dimension, rubric_value(label, raw)?);
    }
    Ok(score)
}

fn find_rubric_object(value: &Value) -> Option<&Map<String, Value>> {
    match value {
        Value::Object(object) => {
            let complete = RubricDimension::ALL
                .iter()
                .all(|d| object.contains_key(d.label()));
            if complete {
                Some(object)
            } else {
                object.values().find_map(find_rubric_object)
            }
        }
        Value::Array(items) => items.iter().find_map(find_rubric_object),
        _ => None,
    }
}

/// Locate the JSON object in a model response: a fenced ```` ```json ````
/// block, the whole response, or the outermost `{…}` span.
fn extract_json_object(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let after = &text[start + "```json".len()..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if !inner.is_empty() {
                return Some(inner);
            }
        }
    }

    let trimmed = text.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed);
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn rubric_value(label: &'static str, raw: &Value) -> Result<i32, ParseError> {
    let out_of_range = || ParseError::ScoreOutOfRange {
        dimension: label,
        value: raw.to_string(),
    };

    let number = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(out_of_range)?;

    if number.fract() != 0.0 || !(1.0..=5.0).contains(&number) {
        return Err(out_of_range());
    }
    Ok(number as i32)
}

/// Render retrieved passages as numbered `Information N:` blocks.
///
/// An empty slice renders as the empty string.
pub fn format_passages(passages: &[RetrievedPassage]) -> String {
    passages
        .iter()
        .enumerate()
        .map(|(i, p)| format!("Information {}:\n{}", i + 1, p.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Number quiz blocks for the evaluation prompt: `1: <block>`.
pub fn format_quiz_set(blocks: &[String]) -> String {
    blocks
        .iter()
        .enumerate()
        .map(|(i, block)| format!("{}: {}", i + 1, block))
        .collect::<Vec<_>>()
        .join("\n\n")
}
