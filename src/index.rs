//! In-memory semantic index over fetched documents, with on-disk persistence.
//!
//! A [`VectorIndex`] holds one embedding per chunk and answers queries by
//! cosine similarity. [`IndexStore`] persists indices under a directory
//! keyed by a fingerprint of the exact document set, so an index built for
//! one question's documents is never reused for a different document set:
//!
//! ```text
//! <index_dir>/<fingerprint>/index.json
//! ```
//!
//! The fingerprint covers the embedding model name and, for every document
//! actually obtained, its topic, source id and text hash. A persisted
//! index is rebuilt when it cannot be parsed or was written by a different
//! format version, model or chunking configuration.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::chunk::chunk_documents;
use crate::embedding::{blob_to_vec, cosine_similarity, embed_query, vec_to_blob, Embedder};
use crate::models::{Document, RetrievedPassage};

/// Bumped whenever the persisted layout changes.
pub const INDEX_VERSION: u32 = 1;

const INDEX_FILE: &str = "index.json";

/// A chunk together with its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    pub topic: String,
    pub document_id: Option<String>,
    pub chunk_index: usize,
    pub text: String,
    pub hash: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    model: String,
    chunk_size: usize,
    chunk_overlap: usize,
    chunks: Vec<IndexedChunk>,
}

impl VectorIndex {
    /// An index over no documents; every query returns no passages.
    pub fn empty(model: &str, chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            model: model.to_string(),
            chunk_size,
            chunk_overlap,
            chunks: Vec::new(),
        }
    }

    /// Chunk `documents` and embed every chunk.
    pub async fn build(
        documents: &[Document],
        embedder: &dyn Embedder,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<Self> {
        let chunks = chunk_documents(documents, chunk_size, chunk_overlap);
        let mut index = Self::empty(embedder.model_name(), chunk_size, chunk_overlap);
        if chunks.is_empty() {
            return Ok(index);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder
            .embed(&texts)
            .await
            .with_context(|| format!("Failed to embed {} chunks", texts.len()))?;
        if vectors.len() != chunks.len() {
            anyhow::bail!(
                "Embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }

        index.chunks = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, embedding)| IndexedChunk {
                topic: chunk.topic,
                document_id: chunk.document_id,
                chunk_index: chunk.chunk_index,
                text: chunk.text,
                hash: chunk.hash,
                embedding,
            })
            .collect();

        debug!(
            "Built index with {} chunks from {} documents",
            index.chunks.len(),
            documents.len()
        );
        Ok(index)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[IndexedChunk] {
        &self.chunks
    }

    /// Rank chunks by cosine similarity to `query`, descending.
    /// Ties keep chunk order. At most `top_k` passages are returned.
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<RetrievedPassage> {
        let mut scored: Vec<(usize, f32)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| (i, cosine_similarity(query, &chunk.embedding)))
            .collect();

        // Stable sort keeps chunk order for equal scores
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        scored
            .into_iter()
            .take(top_k)
            .enumerate()
            .map(|(rank, (i, score))| RetrievedPassage {
                rank,
                content: self.chunks[i].text.clone(),
                score,
                topic: self.chunks[i].topic.clone(),
            })
            .collect()
    }

    /// Embed `question` and return the `top_k` most similar passages.
    ///
    /// An empty index returns no passages without calling the embedder.
    pub async fn query(
        &self,
        embedder: &dyn Embedder,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedPassage>> {
        if self.chunks.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let vector = embed_query(embedder, question).await?;
        Ok(self.search(&vector, top_k))
    }
}

// ============ Persistence ============

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    version: u32,
    model: String,
    fingerprint: String,
    created_at: DateTime<Utc>,
    chunk_size: usize,
    chunk_overlap: usize,
    chunks: Vec<PersistedChunk>,
}

#[derive(Serialize, Deserialize)]
struct PersistedChunk {
    topic: String,
    #[serde(default)]
    document_id: Option<String>,
    chunk_index: usize,
    text: String,
    hash: String,
    /// Base64 of little-endian f32 bytes.
    embedding: String,
}

/// Fingerprint-keyed directory of persisted indices.
#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// SHA-256 over the model name and, per document in topic order, the
    /// topic, source id and SHA-256 of the text.
    ///
    /// A refetched page whose text changed yields a new fingerprint.
    pub fn fingerprint(model: &str, documents: &[Document]) -> String {
        let mut entries: BTreeMap<&str, (&str, String)> = BTreeMap::new();
        for doc in documents {
            entries.entry(doc.topic.as_str()).or_insert_with(|| {
                (
                    doc.id.as_deref().unwrap_or(""),
                    format!("{:x}", Sha256::digest(doc.text.as_bytes())),
                )
            });
        }

        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        for (topic, (id, text_hash)) in entries {
            hasher.update([0u8]);
            hasher.update(topic.as_bytes());
            hasher.update([0u8]);
            hasher.update(id.as_bytes());
            hasher.update([0u8]);
            hasher.update(text_hash.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn location(&self, fingerprint: &str) -> PathBuf {
        self.dir.join(fingerprint).join(INDEX_FILE)
    }

    /// Load a persisted index if it exists and matches the current settings.
    pub fn load(
        &self,
        fingerprint: &str,
        model: &str,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Option<VectorIndex> {
        let path = self.location(fingerprint);
        if !path.exists() {
            return None;
        }

        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) => {
                warn!("Could not read index {}: {}. Rebuilding", path.display(), e);
                return None;
            }
        };

        let persisted: PersistedIndex = match serde_json::from_str(&data) {
            Ok(p) => p,
            Err(e) => {
                warn!("Could not parse index {}: {}. Rebuilding", path.display(), e);
                return None;
            }
        };

        if persisted.fingerprint != fingerprint {
            warn!("Index {} belongs to another document set. Rebuilding", path.display());
            return None;
        }
        if persisted.version != INDEX_VERSION {
            info!(
                "Index version {} is outdated (current {}). Rebuilding",
                persisted.version, INDEX_VERSION
            );
            return None;
        }
        if persisted.model != model {
            warn!(
                "Embedding model changed from '{}' to '{}'. Rebuilding index",
                persisted.model, model
            );
            return None;
        }
        if persisted.chunk_size != chunk_size || persisted.chunk_overlap != chunk_overlap {
            info!("Chunking settings changed. Rebuilding index");
            return None;
        }

        let mut chunks = Vec::with_capacity(persisted.chunks.len());
        for chunk in persisted.chunks {
            let bytes = match STANDARD.decode(chunk.embedding.as_bytes()) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Corrupt embedding in {}: {}. Rebuilding", path.display(), e);
                    return None;
                }
            };
            chunks.push(IndexedChunk {
                topic: chunk.topic,
                document_id: chunk.document_id,
                chunk_index: chunk.chunk_index,
                text: chunk.text,
                hash: chunk.hash,
                embedding: blob_to_vec(&bytes),
            });
        }

        debug!(
            "Loaded {} chunks from {} (built {})",
            chunks.len(),
            path.display(),
            persisted.created_at.format("%Y-%m-%d %H:%M")
        );
        Some(VectorIndex {
            model: persisted.model,
            chunk_size,
            chunk_overlap,
            chunks,
        })
    }

    /// Write `index` to its fingerprint location, replacing any previous file.
    pub fn persist(&self, fingerprint: &str, index: &VectorIndex) -> Result<()> {
        let path = self.location(fingerprint);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create index directory: {}", parent.display()))?;
        }

        let persisted = PersistedIndex {
            version: INDEX_VERSION,
            model: index.model.clone(),
            fingerprint: fingerprint.to_string(),
            created_at: Utc::now(),
            chunk_size: index.chunk_size,
            chunk_overlap: index.chunk_overlap,
            chunks: index
                .chunks
                .iter()
                .map(|c| PersistedChunk {
                    topic: c.topic.clone(),
                    document_id: c.document_id.clone(),
                    chunk_index: c.chunk_index,
                    text: c.text.clone(),
                    hash: c.hash.clone(),
                    embedding: STANDARD.encode(vec_to_blob(&c.embedding)),
                })
                .collect(),
        };

        let data = serde_json::to_string(&persisted)?;
        std::fs::write(&path, data)
            .with_context(|| format!("Failed to write index: {}", path.display()))?;
        debug!("Saved {} chunks to {}", index.chunks.len(), path.display());
        Ok(())
    }

    /// Reuse the persisted index for this exact document set, or build and persist one.
    ///
    /// An empty document set yields an empty index that is never persisted.
    /// A failed write is logged; the freshly built index is still returned.
    pub async fn load_or_build(
        &self,
        documents: &[Document],
        embedder: &dyn Embedder,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<VectorIndex> {
        let model = embedder.model_name();
        if documents.is_empty() {
            return Ok(VectorIndex::empty(model, chunk_size, chunk_overlap));
        }

        let fingerprint = Self::fingerprint(model, documents);
        if let Some(index) = self.load(&fingerprint, model, chunk_size, chunk_overlap) {
            debug!("Reusing index {}", fingerprint);
            return Ok(index);
        }

        let index = VectorIndex::build(documents, embedder, chunk_size, chunk_overlap).await?;
        if let Err(e) = self.persist(&fingerprint, &index) {
            warn!("Could not persist index {}: {:#}", fingerprint, e);
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Deterministic bag-of-letters embedder.
    struct LetterEmbedder {
        model: String,
        calls: AtomicUsize,
    }

    impl LetterEmbedder {
        fn new(model: &str) -> Self {
            Self {
                model: model.to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    fn letter_vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; 26];
        for c in text.to_lowercase().chars() {
            if c.is_ascii_lowercase() {
                v[(c as u8 - b'a') as usize] += 1.0;
            }
        }
        v
    }

    #[async_trait]
    impl Embedder for LetterEmbedder {
        fn model_name(&self) -> &str {
            &self.model
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| letter_vector(t)).collect())
        }
    }

    fn doc(topic: &str, text: &str) -> Document {
        Document {
            topic: topic.to_string(),
            id: None,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_query_ranks_by_similarity() {
        let embedder = LetterEmbedder::new("letters");
        let docs = vec![doc("a", "aaaa aaaa"), doc("z", "zzzz zzzz"), doc("m", "mmmm")];
        let index = VectorIndex::build(&docs, &embedder, 8, 2).await.unwrap();
        assert_eq!(index.len(), 3);

        let hits = index.query(&embedder, "zz", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].topic, "z");
        assert_eq!(hits[0].rank, 0);
        assert_eq!(hits[1].rank, 1);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_ties_keep_chunk_order() {
        let embedder = LetterEmbedder::new("letters");
        let docs = vec![doc("first", "abc"), doc("second", "abc"), doc("third", "abc")];
        let index = VectorIndex::build(&docs, &embedder, 8, 2).await.unwrap();
        let hits = index.query(&embedder, "abc", 3).await.unwrap();
        let topics: Vec<&str> = hits.iter().map(|h| h.topic.as_str()).collect();
        assert_eq!(topics, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_empty_index_never_embeds() {
        let embedder = LetterEmbedder::new("letters");
        let index = VectorIndex::build(&[], &embedder, 8, 2).await.unwrap();
        assert!(index.is_empty());
        let hits = index.query(&embedder, "anything", 5).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fingerprint_order_and_duplicates_insensitive() {
        let a = vec![doc("x", "1"), doc("y", "2")];
        let b = vec![doc("y", "2"), doc("x", "1"), doc("x", "1")];
        assert_eq!(IndexStore::fingerprint("m", &a), IndexStore::fingerprint("m", &b));
        assert_ne!(IndexStore::fingerprint("m", &a), IndexStore::fingerprint("n", &a));
        assert_ne!(
            IndexStore::fingerprint("m", &a),
            IndexStore::fingerprint("m", &[doc("x", "1")])
        );
    }

    #[tokio::test]
    async fn test_persisted_index_is_reused() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path());
        let embedder = LetterEmbedder::new("letters");
        let docs = vec![doc("a", "alpha beta"), doc("b", "gamma delta")];

        let built = store.load_or_build(&docs, &embedder, 8, 2).await.unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        let fp = IndexStore::fingerprint("letters", &docs);
        assert!(store.location(&fp).exists());

        let loaded = store.load_or_build(&docs, &embedder, 8, 2).await.unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(loaded, built);
    }

    #[tokio::test]
    async fn test_changed_page_text_rebuilds() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path());
        let embedder = LetterEmbedder::new("letters");

        let old = store
            .load_or_build(&[doc("Carbon", "old revision text")], &embedder, 8, 2)
            .await
            .unwrap();
        let new = store
            .load_or_build(&[doc("Carbon", "refetched new revision")], &embedder, 8, 2)
            .await
            .unwrap();

        assert_eq!(old.chunks()[0].text, "old revision text");
        assert_eq!(new.chunks()[0].text, "refetched new revision");
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_different_topic_sets_get_separate_indices() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path());
        let embedder = LetterEmbedder::new("letters");

        let first = store
            .load_or_build(&[doc("a", "aaaa")], &embedder, 8, 2)
            .await
            .unwrap();
        let second = store
            .load_or_build(&[doc("z", "zzzz")], &embedder, 8, 2)
            .await
            .unwrap();
        assert_eq!(first.chunks()[0].topic, "a");
        assert_eq!(second.chunks()[0].topic, "z");
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_model_mismatch_rebuilds() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path());
        let docs = vec![doc("a", "alpha")];

        let old = LetterEmbedder::new("old-model");
        let index = VectorIndex::build(&docs, &old, 8, 2).await.unwrap();
        let fp = IndexStore::fingerprint("new-model", &docs);
        // Stale file written under the new fingerprint by a different model
        store.persist(&fp, &index).unwrap();

        assert!(store.load(&fp, "new-model", 8, 2).is_none());
        let new = LetterEmbedder::new("new-model");
        let rebuilt = store.load_or_build(&docs, &new, 8, 2).await.unwrap();
        assert_eq!(rebuilt.model(), "new-model");
        assert_eq!(new.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_corrupt_index_rebuilds() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path());
        let embedder = LetterEmbedder::new("letters");
        let docs = vec![doc("a", "alpha")];
        let fp = IndexStore::fingerprint("letters", &docs);
        std::fs::create_dir_all(store.location(&fp).parent().unwrap()).unwrap();
        std::fs::write(store.location(&fp), "not json").unwrap();

        let index = store.load_or_build(&docs, &embedder, 8, 2).await.unwrap();
        assert_eq!(index.len(), 1);
        assert!(store.load(&fp, "letters", 8, 2).is_some());
    }

    #[tokio::test]
    async fn test_empty_document_set_not_persisted() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path().join("indices"));
        let embedder = LetterEmbedder::new("letters");
        let index = store.load_or_build(&[], &embedder, 8, 2).await.unwrap();
        assert!(index.is_empty());
        assert!(!store.dir().exists());
    }
}
