//! Stage 4: score each question's quiz set on the five rubric dimensions.
//!
//! Questions without quizzes score [`EvaluationScore::absent`]; questions
//! whose evaluation keeps failing score [`EvaluationScore::failed`]. Areas
//! with no quiz list at all are copied through unscored.

use anyhow::Result;
use indexmap::IndexMap;
use tracing::{error, info, warn};

use crate::artifacts::{read_json, write_json};
use crate::llm::{run_chat_task, ChatTask};
use crate::models::{AreaEvaluation, EvaluationArtifact, EvaluationScore, QuizArtifact, ReferenceArtifact};
use crate::parse::{format_quiz_set, parse_evaluation};
use crate::pipeline::Pipeline;
use crate::progress::ProgressEvent;
use crate::prompts;

pub const STAGE: &str = "eval";

pub async fn run(pipeline: &Pipeline) -> Result<EvaluationArtifact> {
    let config = pipeline.config();

    let reference_path = config.paths.reference_path();
    info!("Reading reference material from {}", reference_path.display());
    let references: ReferenceArtifact = read_json(&reference_path, crate::stage_quiz::STAGE)?;

    let quiz_path = config.paths.quiz_path();
    info!("Reading quizzes from {}", quiz_path.display());
    let quizzes: QuizArtifact = read_json(&quiz_path, crate::stage_quiz::STAGE)?;

    let mut out = EvaluationArtifact::new();
    for (level, areas) in quizzes {
        info!("Evaluating quizzes for {} level", level);
        let total = areas.len() as u64;
        pipeline.progress().report(ProgressEvent::LevelStarted {
            stage: STAGE,
            level: level.clone(),
            total,
        });

        let mut by_area = IndexMap::new();
        for (i, (area, entry)) in areas.into_iter().enumerate() {
            let llm_score = match &entry.quiz {
                Some(quiz_lists) => {
                    let summaries = references
                        .get(&level)
                        .and_then(|by_area| by_area.get(&area))
                        .map(|r| r.summary.as_slice());
                    if summaries.is_none() {
                        warn!(
                            stage = STAGE,
                            level = %level,
                            area = %area,
                            "No reference summaries; evaluating without them"
                        );
                    }

                    let mut scores = Vec::with_capacity(entry.questions.len());
                    for (q, question) in entry.questions.iter().enumerate() {
                        let quiz = quiz_lists.get(q).map(Vec::as_slice).unwrap_or(&[]);
                        let summary = summaries
                            .and_then(|s| s.get(q))
                            .map(String::as_str)
                            .unwrap_or("");
                        scores.push(
                            score_question(pipeline, &level, &area, question, summary, quiz).await,
                        );
                    }
                    Some(scores)
                }
                None => None,
            };

            pipeline.progress().report(ProgressEvent::AreaDone {
                stage: STAGE,
                level: level.clone(),
                area: area.clone(),
                n: i as u64 + 1,
                total,
            });
            by_area.insert(
                area,
                AreaEvaluation {
                    questions: entry.questions,
                    concepts: entry.concepts,
                    quiz: entry.quiz,
                    llm_score,
                },
            );
        }
        out.insert(level, by_area);
    }

    let path = config.paths.evaluation_path();
    info!("Writing evaluation results to {}", path.display());
    write_json(&path, &out)?;
    info!("Evaluation completed");
    Ok(out)
}

/// Score one question's quiz set. An empty set scores all zeros without a model call.
pub async fn score_question(
    pipeline: &Pipeline,
    level: &str,
    area: &str,
    question: &str,
    summary: &str,
    quiz: &[String],
) -> EvaluationScore {
    if quiz.is_empty() {
        return EvaluationScore::absent();
    }

    let task = ChatTask::json(
        format!("{} {}/{}", STAGE, level, area),
        prompts::evaluate_quizzes(area, level, question, summary, &format_quiz_set(quiz)),
    );

    match run_chat_task(pipeline.chat(), pipeline.policy(), &task, parse_evaluation).await {
        Ok(score) => score,
        Err(e) => {
            error!(
                stage = STAGE,
                level = %level,
                area = %area,
                question = %question,
                "Failed to evaluate quiz after {} attempts: {:#}",
                pipeline.policy().max_attempts,
                e
            );
            EvaluationScore::failed()
        }
    }
}
