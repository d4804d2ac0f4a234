//! Prompt templates for each model call.
//!
//! The wording is free-form, but the output formats they request are what
//! [`crate::parse`] expects: one question per line, a bracketed concept
//! list, `[Quiz]`-delimited blocks, and a bare JSON rubric object (the
//! evaluation call runs in JSON mode).

use crate::models::RubricDimension;
use crate::parse::QUIZ_DELIMITER;

/// Number of questions requested per area and level.
pub const SEED_QUESTION_COUNT: usize = 5;

/// Number of quizzes requested per question.
pub const QUIZ_COUNT: usize = 3;

pub fn seed_questions(area: &str, level: &str) -> String {
    format!(
        "You are a curious student at the given education level, learning about a particular \
area of study. Write {count} diverse questions you would want to ask while learning this \
subject. Output only the questions, one per line, without numbering or bullet points. \
Prefer questions that need real expertise in the field to answer, but keep them suitable \
for the student's education level.

Example:
Area: Biology
Education level: primary school
Question:
What are the different parts of a plant, and how do they help it grow?
Why do animals need food, water, and air to survive?
Why do some animals sleep during the day and are awake at night?

Area: {area}
Education level: {level}
Question:
",
        count = SEED_QUESTION_COUNT,
        area = area,
        level = level,
    )
}

pub fn extract_concepts(question: &str, level: &str, area: &str) -> String {
    format!(
        "Identify the key concepts in the question below. Each concept must be a noun or \
noun phrase from the relevant area, in singular form if countable. Answer with one list, \
in square brackets, separated by commas, without bullet points.

Example:
Question: What is aldose?
Education Level: college
Area: chemistry
Concept: [aldose, carbohydrate, sugar, organic chemistry]

Question: {question}
Education Level: {level}
Area: {area}
Concept:"
    )
}

pub fn summarize_reference(area: &str, level: &str, reference: &str, question: &str) -> String {
    format!(
        "You write summaries for students studying {area} at the {level} level. A student \
has asked a question and you have reference information from Wikipedia. Condense that \
information into a single clear paragraph that covers the key points and helps the \
student understand their question.

Reference Wikipedia Information:
{reference}

Student Question: {question}"
    )
}

pub fn generate_quizzes(area: &str, level: &str, summary: &str, question: &str) -> String {
    let d = QUIZ_DELIMITER;
    format!(
        "You write quizzes for students studying {area} at the {level} level. Create \
{count} multiple-choice quizzes that help the student understand the question below. \
Every quiz must be supported by the reference summary. Each quiz has one question, one \
correct answer and three incorrect options, and the correct answer is always option A. \
Match the difficulty to {level} education.

Example:

Student Question: Where is Beijing located?
{d}
Quiz: What is the capital city of China?
A. Beijing
B. Chengdu
C. Shanghai
D. Hangzhou

{d}
Quiz: What continent is Beijing located on?
A. Asia
B. Europe
C. Africa
D. North America

Write {count} quizzes in exactly this format, each one preceded by {d}.

Reference Wikipedia Information:
{summary}

Student Question: {question}",
        count = QUIZ_COUNT,
    )
}

pub fn evaluate_quizzes(
    area: &str,
    level: &str,
    question: &str,
    summary: &str,
    quiz_set: &str,
) -> String {
    let json_keys = RubricDimension::ALL
        .iter()
        .map(|d| format!("\"{}\": score", d.label()))
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        "A student studying {area} at the {level} level asked: \"{question}\". The quiz set \
below was written to help them understand the topic; the correct answer is always option A. \
Score the whole set from 1 to 5 on each criterion. Judge whether the quizzes reflect the \
reference information from Wikipedia and whether each correct answer is supported by it. Be \
strict: quizzes that cannot be verified against the reference deserve low scores.

1. Educational Value: will students learn from these quizzes?
    - 1: no learning value. 3: some learning value. 5: great learning value.
2. Diversity: do the quizzes cover a broad range of topics or repeat one concept?
    - 1: very repetitive. 3: a few different topics. 5: a broad range of topics.
3. Area Relevance: are the quizzes tied to the student's question and subject area?
    - 1: not relevant. 3: fairly aligned. 5: directly tied to the question.
4. Difficulty Appropriateness: do the quizzes match the student's education level?
    - 1: far too easy or hard. 3: somewhat aligned. 5: perfectly suited.
5. Comprehensiveness: do the quizzes cover the depth and breadth of the topic?
    - 1: superficial. 3: covers the basics. 5: thorough and detailed.

Reference information from Wikipedia:
{summary}

Quiz set:
{quiz_set}

Reply with a single JSON object and nothing else: no reasoning, no nesting, exactly these \
five keys, each an integer from 1 to 5:
{{
{json_keys}
}}
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_prompt_mentions_inputs() {
        let p = seed_questions("biology", "high school");
        assert!(p.contains("Area: biology"));
        assert!(p.contains("Education level: high school"));
        assert!(p.ends_with("Question:\n"));
    }

    #[test]
    fn test_concept_prompt_has_example_list() {
        let p = extract_concepts("What is light?", "college", "physics");
        assert!(p.contains("[aldose, carbohydrate, sugar, organic chemistry]"));
        assert!(p.trim_end().ends_with("Concept:"));
    }

    #[test]
    fn test_quiz_prompt_uses_delimiter() {
        let p = generate_quizzes("geography", "primary school", "Beijing is...", "Where?");
        assert!(p.matches(QUIZ_DELIMITER).count() >= 3);
        assert!(p.contains("Beijing is..."));
    }

    #[test]
    fn test_evaluation_prompt_lists_every_dimension() {
        let p = evaluate_quizzes("a", "b", "c", "d", "1: Quiz: x");
        for dim in RubricDimension::ALL {
            assert!(p.contains(&format!("\"{}\": score", dim.label())));
        }
        assert!(p.contains("single JSON object and nothing else"));
        assert!(!p.contains("```"));
        assert!(!p.to_lowercase().contains("step by step"));
    }
}
