//! Stage 2: extract key concepts for every question.

use anyhow::Result;
use indexmap::IndexMap;
use tracing::{error, info};

use crate::artifacts::{read_json, write_json};
use crate::llm::{run_chat_task, ChatTask};
use crate::models::{AreaConcepts, ConceptsArtifact, QuestionsArtifact};
use crate::parse::parse_concepts;
use crate::pipeline::Pipeline;
use crate::progress::ProgressEvent;
use crate::prompts;

pub const STAGE: &str = "concepts";

pub async fn run(pipeline: &Pipeline) -> Result<ConceptsArtifact> {
    let config = pipeline.config();
    let input = config.paths.questions_path();

    info!("Reading questions from {}", input.display());
    let questions: QuestionsArtifact = read_json(&input, crate::stage_seed::STAGE)?;

    let mut out = ConceptsArtifact::new();
    for (level, areas) in questions {
        info!("Extracting concepts for {} level", level);
        let total = areas.len() as u64;
        pipeline.progress().report(ProgressEvent::LevelStarted {
            stage: STAGE,
            level: level.clone(),
            total,
        });

        let mut by_area = IndexMap::new();
        for (i, (area, question_list)) in areas.into_iter().enumerate() {
            let mut concepts = Vec::with_capacity(question_list.len());

            for question in &question_list {
                let task = ChatTask::text(
                    format!("{} {}/{}", STAGE, level, area),
                    prompts::extract_concepts(question, &level, &area),
                );

                let extracted =
                    match run_chat_task(pipeline.chat(), pipeline.policy(), &task, parse_concepts)
                        .await
                    {
                        Ok(extracted) => extracted,
                        Err(e) => {
                            error!(
                                stage = STAGE,
                                level = %level,
                                area = %area,
                                question = %question,
                                "Failed to extract concepts after retries: {:#}",
                                e
                            );
                            Vec::new()
                        }
                    };
                concepts.push(extracted);
            }

            pipeline.progress().report(ProgressEvent::AreaDone {
                stage: STAGE,
                level: level.clone(),
                area: area.clone(),
                n: i as u64 + 1,
                total,
            });
            by_area.insert(
                area,
                AreaConcepts {
                    questions: question_list,
                    concepts,
                },
            );
        }
        out.insert(level, by_area);
    }

    let path = config.paths.concepts_path();
    info!("Writing concepts to {}", path.display());
    write_json(&path, &out)?;
    info!("Concept extraction completed");
    Ok(out)
}
