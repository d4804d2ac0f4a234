//! Stage 1: seed questions for every (education level, area) pair.
//!
//! Reads the areas file, normalizes area names, and asks the model for a
//! handful of questions per pair. Writes the questions artifact.

use anyhow::Result;
use std::collections::BTreeSet;
use tracing::{error, info, warn};

use crate::artifacts::{read_areas, write_json};
use crate::llm::{run_chat_task, ChatTask};
use crate::models::QuestionsArtifact;
use crate::parse::parse_questions;
use crate::pipeline::Pipeline;
use crate::progress::ProgressEvent;
use crate::prompts;
use crate::validation::{sanitize_area, validate_questions};

pub const STAGE: &str = "seed";

/// Sanitize raw area lines, skipping invalid names and duplicates.
pub fn prepare_areas(raw: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut areas = Vec::with_capacity(raw.len());

    for line in raw {
        match sanitize_area(&line) {
            Ok(area) => {
                if seen.insert(area.clone()) {
                    areas.push(area);
                } else {
                    warn!("Duplicate area '{}' skipped", area);
                }
            }
            Err(e) => error!("{}; skipping", e),
        }
    }

    areas
}

pub async fn run(pipeline: &Pipeline) -> Result<QuestionsArtifact> {
    let config = pipeline.config();
    let areas_path = config.paths.areas_path();

    info!("Reading subject areas from {}", areas_path.display());
    let areas = prepare_areas(read_areas(&areas_path)?);
    if areas.is_empty() {
        warn!("No valid areas in {}", areas_path.display());
    }

    let mut out = QuestionsArtifact::new();
    let total = areas.len() as u64;

    for level in &config.pipeline.education_levels {
        info!("Generating questions for {} level", level);
        pipeline.progress().report(ProgressEvent::LevelStarted {
            stage: STAGE,
            level: level.clone(),
            total,
        });

        let by_area = out.entry(level.clone()).or_default();
        for (i, area) in areas.iter().enumerate() {
            let task = ChatTask::text(
                format!("{} {}/{}", STAGE, level, area),
                prompts::seed_questions(area, level),
            );

            let questions =
                match run_chat_task(pipeline.chat(), pipeline.policy(), &task, parse_questions)
                    .await
                {
                    Ok(questions) => {
                        validate_questions(questions, config.pipeline.min_questions)
                    }
                    Err(e) => {
                        error!(
                            stage = STAGE,
                            level = %level,
                            area = %area,
                            "Failed to generate questions after retries: {:#}",
                            e
                        );
                        Vec::new()
                    }
                };

            by_area.insert(area.clone(), questions);
            pipeline.progress().report(ProgressEvent::AreaDone {
                stage: STAGE,
                level: level.clone(),
                area: area.clone(),
                n: i as u64 + 1,
                total,
            });
        }
    }

    let path = config.paths.questions_path();
    info!("Writing questions to {}", path.display());
    write_json(&path, &out)?;
    info!(
        "Generated questions for {} areas across {} levels",
        areas.len(),
        config.pipeline.education_levels.len()
    );
    Ok(out)
}
