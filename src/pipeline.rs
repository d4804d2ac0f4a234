//! Stage sequencing.
//!
//! A [`Pipeline`] owns the configuration and the three external
//! capabilities (chat model, embedder, page source) and runs the stages in
//! order: seed → concepts → quiz → eval. Each stage reads the previous
//! stage's artifact from disk, so any single step can be re-run alone.

use anyhow::Result;
use clap::ValueEnum;
use std::sync::Arc;
use tracing::info;

use crate::cache::ContentCache;
use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::index::IndexStore;
use crate::llm::{create_chat_model, ChatModel};
use crate::progress::{NoProgress, ProgressReporter};
use crate::retriever::KnowledgeRetriever;
use crate::retry::RetryPolicy;
use crate::wiki::{create_page_source, PageSource};
use crate::{stage_concepts, stage_evaluate, stage_quiz, stage_seed};

/// Which part of the pipeline to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Step {
    Seed,
    Concepts,
    Quiz,
    Eval,
    All,
}

impl Step {
    fn includes(self, stage: Step) -> bool {
        self == Step::All || self == stage
    }
}

pub struct Pipeline {
    config: Config,
    chat: Arc<dyn ChatModel>,
    embedder: Arc<dyn Embedder>,
    pages: Arc<dyn PageSource>,
    policy: RetryPolicy,
    progress: Arc<dyn ProgressReporter>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        chat: Arc<dyn ChatModel>,
        embedder: Arc<dyn Embedder>,
        pages: Arc<dyn PageSource>,
    ) -> Self {
        let policy = RetryPolicy::from_config(&config.retry);
        Self {
            config,
            chat,
            embedder,
            pages,
            policy,
            progress: Arc::new(NoProgress),
        }
    }

    /// Build a pipeline with the Ollama and Wikipedia clients named in `config`.
    pub fn from_config(config: Config) -> Result<Self> {
        let chat = create_chat_model(&config)?;
        let embedder = create_embedder(&config)?;
        let pages = create_page_source(&config)?;
        Ok(Self::new(config, chat, embedder, pages))
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn chat(&self) -> &dyn ChatModel {
        self.chat.as_ref()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn progress(&self) -> &dyn ProgressReporter {
        self.progress.as_ref()
    }

    pub fn content_cache(&self) -> ContentCache {
        ContentCache::new(self.config.paths.cache_dir_path())
    }

    /// A fresh retriever: the per-run topic memo starts empty.
    pub fn retriever(&self) -> KnowledgeRetriever {
        KnowledgeRetriever::new(
            self.content_cache(),
            self.pages.clone(),
            self.embedder.clone(),
            IndexStore::new(self.config.paths.index_dir_path()),
            self.config.retrieval.clone(),
            self.config.wikipedia.fetch_delay(),
        )
    }

    /// Run `step` (or every stage for [`Step::All`]), optionally clearing the cache first.
    pub async fn run(&self, step: Step, clear_cache: bool) -> Result<()> {
        if clear_cache {
            let removed = self.content_cache().clear();
            info!("Cleared {} cached pages before run", removed);
        }

        if step.includes(Step::Seed) {
            info!("=== Step 1: seed questions ===");
            stage_seed::run(self).await?;
        }
        if step.includes(Step::Concepts) {
            info!("=== Step 2: extract concepts ===");
            stage_concepts::run(self).await?;
        }
        if step.includes(Step::Quiz) {
            info!("=== Step 3: generate quizzes ===");
            stage_quiz::run(self).await?;
        }
        if step.includes(Step::Eval) {
            info!("=== Step 4: evaluate quizzes ===");
            stage_evaluate::run(self).await?;
        }

        info!("Pipeline completed successfully");
        Ok(())
    }
}
