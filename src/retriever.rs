//! Knowledge retrieval: topics → documents → index → ranked passages.
//!
//! For each topic the retriever consults the [`ContentCache`] first and
//! falls back to the [`PageSource`], pacing external fetches and writing
//! every fetched page back to the cache. A topic whose fetch fails is
//! logged and contributes no document. Each topic is resolved at most once
//! per run, whether it succeeded or failed.
//!
//! The resulting document set is indexed through the [`IndexStore`] and
//! queried with the question text.

use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::ContentCache;
use crate::config::RetrievalConfig;
use crate::embedding::Embedder;
use crate::index::IndexStore;
use crate::models::{Document, RetrievedPassage};
use crate::wiki::PageSource;

/// Enforces a minimum spacing between the starts of consecutive fetches.
///
/// Shared by every caller of one retriever, so concurrent callers queue
/// behind the same limiter.
#[derive(Debug)]
pub struct FetchPacer {
    interval: Duration,
    last: tokio::sync::Mutex<Option<Instant>>,
}

impl FetchPacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: tokio::sync::Mutex::new(None),
        }
    }

    /// Wait until a fetch may start. The first fetch never waits.
    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            tokio::time::sleep_until(previous + self.interval).await;
        }
        *last = Some(Instant::now());
    }
}

pub struct KnowledgeRetriever {
    cache: ContentCache,
    pages: Arc<dyn PageSource>,
    embedder: Arc<dyn Embedder>,
    store: IndexStore,
    settings: RetrievalConfig,
    pacer: FetchPacer,
    resolved: Mutex<HashMap<String, Option<Document>>>,
}

impl KnowledgeRetriever {
    pub fn new(
        cache: ContentCache,
        pages: Arc<dyn PageSource>,
        embedder: Arc<dyn Embedder>,
        store: IndexStore,
        settings: RetrievalConfig,
        fetch_delay: Duration,
    ) -> Self {
        Self {
            cache,
            pages,
            embedder,
            store,
            settings,
            pacer: FetchPacer::new(fetch_delay),
            resolved: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Top-K passages relevant to `question`, drawn from the pages for `topics`.
    ///
    /// No obtainable topics yields an empty list rather than an error.
    pub async fn retrieve(&self, question: &str, topics: &[String]) -> Result<Vec<RetrievedPassage>> {
        let documents = self.gather_documents(topics).await;
        if documents.is_empty() {
            debug!("No documents for question: {}", question);
            return Ok(Vec::new());
        }

        let index = self
            .store
            .load_or_build(
                &documents,
                self.embedder.as_ref(),
                self.settings.chunk_size,
                self.settings.chunk_overlap,
            )
            .await?;

        index
            .query(self.embedder.as_ref(), question, self.settings.top_k)
            .await
    }

    /// Resolve each distinct, non-blank topic to a document, in first-seen order.
    pub async fn gather_documents(&self, topics: &[String]) -> Vec<Document> {
        let mut seen = HashSet::new();
        let mut documents = Vec::new();

        for topic in topics {
            let topic = topic.trim();
            if topic.is_empty() || !seen.insert(topic) {
                continue;
            }
            if let Some(doc) = self.resolve(topic).await {
                documents.push(doc);
            }
        }

        documents
    }

    async fn resolve(&self, topic: &str) -> Option<Document> {
        if let Some(known) = self.memo_get(topic) {
            return known;
        }

        let doc = match self.cache.get_entry(topic) {
            Some(entry) if !entry.content.trim().is_empty() => {
                debug!("Using cached page: {}", topic);
                Some(Document {
                    topic: topic.to_string(),
                    id: Some(entry.source_id).filter(|id| !id.is_empty()),
                    text: entry.content,
                })
            }
            _ => self.fetch(topic).await,
        };

        self.memo_put(topic, doc.clone());
        doc
    }

    async fn fetch(&self, topic: &str) -> Option<Document> {
        self.pacer.wait().await;
        debug!("Fetching page: {}", topic);

        match self.pages.fetch_page(topic).await {
            Ok(page) if !page.text.trim().is_empty() => {
                self.cache.set(topic, &page.text, &page.id);
                Some(Document {
                    topic: topic.to_string(),
                    id: Some(page.id).filter(|id| !id.is_empty()),
                    text: page.text,
                })
            }
            Ok(_) => {
                warn!("Could not load page for '{}': page not found", topic);
                None
            }
            Err(e) => {
                warn!("Could not load page for '{}': {:#}", topic, e);
                None
            }
        }
    }

    fn memo_get(&self, topic: &str) -> Option<Option<Document>> {
        self.resolved
            .lock()
            .ok()
            .and_then(|memo| memo.get(topic).cloned())
    }

    fn memo_put(&self, topic: &str, doc: Option<Document>) {
        if let Ok(mut memo) = self.resolved.lock() {
            memo.insert(topic.to_string(), doc);
        }
    }
}
