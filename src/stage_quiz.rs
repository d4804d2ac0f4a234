//! Stage 3: retrieval-grounded summaries and quizzes.
//!
//! For each question the concepts are resolved to reference passages. With
//! passages available, the model first condenses them into a summary and
//! then writes quizzes from that summary. Without passages the question
//! gets an empty summary, reference and quiz list.
//!
//! Writes two artifacts: the quiz artifact (concepts plus `quiz`) and the
//! reference artifact (`summary` and rendered `wiki` passages).

use anyhow::Result;
use indexmap::IndexMap;
use tracing::{error, info, warn};

use crate::artifacts::{read_json, write_json};
use crate::llm::{run_chat_task, ChatTask};
use crate::models::{AreaQuiz, AreaReference, ConceptsArtifact, QuizArtifact, ReferenceArtifact};
use crate::parse::{format_passages, parse_quiz_blocks, ParseError};
use crate::pipeline::Pipeline;
use crate::progress::ProgressEvent;
use crate::prompts;
use crate::retriever::KnowledgeRetriever;

pub const STAGE: &str = "quiz";

/// Outcome for one question.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionQuiz {
    pub summary: String,
    pub reference: String,
    pub quiz: Vec<String>,
}

pub async fn run(pipeline: &Pipeline) -> Result<(QuizArtifact, ReferenceArtifact)> {
    let config = pipeline.config();
    let input = config.paths.concepts_path();

    info!("Reading concepts from {}", input.display());
    let data: ConceptsArtifact = read_json(&input, crate::stage_concepts::STAGE)?;
    let retriever = pipeline.retriever();

    let mut quizzes = QuizArtifact::new();
    let mut references = ReferenceArtifact::new();

    for (level, areas) in data {
        info!("Generating quizzes for {} level", level);
        let total = areas.len() as u64;
        pipeline.progress().report(ProgressEvent::LevelStarted {
            stage: STAGE,
            level: level.clone(),
            total,
        });

        let mut quiz_by_area = IndexMap::new();
        let mut ref_by_area = IndexMap::new();

        for (i, (area, entry)) in areas.into_iter().enumerate() {
            if entry.concepts.len() != entry.questions.len() {
                warn!(
                    stage = STAGE,
                    level = %level,
                    area = %area,
                    "{} questions but {} concept lists",
                    entry.questions.len(),
                    entry.concepts.len()
                );
            }

            let mut reference = AreaReference::default();
            let mut quiz = Vec::with_capacity(entry.questions.len());

            for (q, question) in entry.questions.iter().enumerate() {
                let concepts = entry.concepts.get(q).map(Vec::as_slice).unwrap_or(&[]);
                let outcome =
                    quiz_for_question(pipeline, &retriever, &level, &area, question, concepts)
                        .await;
                reference.summary.push(outcome.summary);
                reference.wiki.push(outcome.reference);
                quiz.push(outcome.quiz);
            }

            pipeline.progress().report(ProgressEvent::AreaDone {
                stage: STAGE,
                level: level.clone(),
                area: area.clone(),
                n: i as u64 + 1,
                total,
            });
            ref_by_area.insert(area.clone(), reference);
            quiz_by_area.insert(
                area,
                AreaQuiz {
                    questions: entry.questions,
                    concepts: entry.concepts,
                    quiz: Some(quiz),
                },
            );
        }

        quizzes.insert(level.clone(), quiz_by_area);
        references.insert(level, ref_by_area);
    }

    let quiz_path = config.paths.quiz_path();
    info!("Writing quizzes to {}", quiz_path.display());
    write_json(&quiz_path, &quizzes)?;

    let reference_path = config.paths.reference_path();
    info!("Writing reference material to {}", reference_path.display());
    write_json(&reference_path, &references)?;

    info!("Quiz generation completed");
    Ok((quizzes, references))
}

/// Retrieve, summarize and quiz one question. Never fails: every error
/// degrades to an empty outcome.
pub async fn quiz_for_question(
    pipeline: &Pipeline,
    retriever: &KnowledgeRetriever,
    level: &str,
    area: &str,
    question: &str,
    concepts: &[String],
) -> QuestionQuiz {
    let passages = match retriever.retrieve(question, concepts).await {
        Ok(passages) => passages,
        Err(e) => {
            warn!(
                stage = STAGE,
                level = %level,
                area = %area,
                question = %question,
                "Retrieval failed: {:#}",
                e
            );
            Vec::new()
        }
    };

    if passages.is_empty() {
        warn!(
            stage = STAGE,
            level = %level,
            area = %area,
            question = %question,
            "No reference passages; skipping summary and quiz generation"
        );
        return QuestionQuiz::default();
    }

    let reference = format_passages(&passages);
    let label = format!("{} {}/{}", STAGE, level, area);

    let summary_task = ChatTask::text(
        format!("{} summary", label),
        prompts::summarize_reference(area, level, &reference, question),
    );
    let summary =
        match run_chat_task(pipeline.chat(), pipeline.policy(), &summary_task, parse_summary).await
        {
            Ok(summary) => summary,
            Err(e) => {
                error!(
                    stage = STAGE,
                    level = %level,
                    area = %area,
                    question = %question,
                    "Failed to summarize reference after retries: {:#}",
                    e
                );
                return QuestionQuiz::default();
            }
        };

    let quiz_task = ChatTask::text(
        format!("{} quizzes", label),
        prompts::generate_quizzes(area, level, &summary, question),
    );
    match run_chat_task(pipeline.chat(), pipeline.policy(), &quiz_task, parse_quiz_blocks).await {
        Ok(quiz) => QuestionQuiz {
            summary,
            reference,
            quiz,
        },
        Err(e) => {
            error!(
                stage = STAGE,
                level = %level,
                area = %area,
                question = %question,
                "Failed to generate quizzes after retries: {:#}",
                e
            );
            QuestionQuiz::default()
        }
    }
}

fn parse_summary(text: &str) -> Result<String, ParseError> {
    let summary = text.trim();
    if summary.is_empty() {
        return Err(ParseError::EmptyResponse);
    }
    Ok(summary.to_string())
}
