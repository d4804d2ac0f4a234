//! Embedding backend abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and the Ollama implementation
//! ([`OllamaEmbedder`]), plus vector utilities used by the index:
//! - [`cosine_similarity`]: similarity between two embedding vectors
//! - [`vec_to_blob`]: encode a `Vec<f32>` as little-endian bytes for persistence
//! - [`blob_to_vec`]: decode those bytes back into a `Vec<f32>`
//!
//! # Retry Strategy
//!
//! Every `/api/embed` request runs under the configured [`RetryPolicy`]:
//! - connection errors, HTTP 429 and 5xx, and malformed bodies are retried
//!   with exponential backoff
//! - any other 4xx (e.g. an unknown model) is a [`RequestRejected`] and
//!   fails at once

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::{Config, EmbeddingConfig};
use crate::retry::{retry_if, RetryPolicy};

/// Turns text into vectors for semantic search.
///
/// The index records [`Embedder::model_name`] so vectors from different
/// models are never compared.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"embeddinggemma"`).
    fn model_name(&self) -> &str;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let results = embedder.embed(&[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Empty embedding response"))
}

// ============ Ollama Embedder ============

/// A client error (4xx other than 429) from the embedding API.
#[derive(Debug, Error)]
#[error("Ollama API error {status}: {body}")]
pub struct RequestRejected {
    pub status: u16,
    pub body: String,
}

/// Build the error for a non-success response.
fn status_error(status: reqwest::StatusCode, body: String) -> anyhow::Error {
    if status.is_client_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS {
        RequestRejected {
            status: status.as_u16(),
            body,
        }
        .into()
    } else {
        anyhow!("Ollama API error {}: {}", status, body)
    }
}

/// Whether a failed embedding request is worth another attempt.
pub fn is_retryable(err: &anyhow::Error) -> bool {
    err.downcast_ref::<RequestRejected>().is_none()
}

/// Embedder backed by a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL, sending at most
/// `batch_size` texts per request. Requires the embedding model to be
/// pulled (e.g. `ollama pull embeddinggemma`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    batch_size: usize,
    policy: RetryPolicy,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig, policy: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            batch_size: config.batch_size.max(1),
            policy,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{}/api/embed", self.url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                anyhow!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url,
                    e
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(status_error(status, body_text));
        }

        let json: serde_json::Value = response.json().await?;
        let vectors = parse_ollama_response(&json)?;
        if vectors.len() != texts.len() {
            bail!(
                "Ollama returned {} embeddings for {} inputs",
                vectors.len(),
                texts.len()
            );
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            debug!("Embedding batch of {} texts with {}", batch.len(), self.model);
            let vectors = retry_if(&self.policy, || self.embed_batch(batch), is_retryable).await?;
            out.extend(vectors);
        }
        Ok(out)
    }
}

/// Parse the `/api/embed` response: `{"embeddings": [[f32, ...], ...]}`.
pub fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    let mut result = Vec::with_capacity(embeddings.len());

    for embedding in embeddings {
        let vec: Vec<f32> = embedding
            .as_array()
            .ok_or_else(|| anyhow!("Invalid Ollama response: embedding is not an array"))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        result.push(vec);
    }

    Ok(result)
}

/// Create the configured [`Embedder`].
///
/// | Config Value | Embedder |
/// |-------------|----------|
/// | `"ollama"` | [`OllamaEmbedder`] |
pub fn create_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let policy = RetryPolicy::from_config(&config.retry);
    match config.embedding.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(&config.embedding, policy)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Encode a float vector as little-endian f32 bytes.
///
/// ```rust
/// use conquerx::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Reverses [`vec_to_blob`]. Trailing bytes that do not form a full f32 are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-norm vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_are_not_retried() {
        use reqwest::StatusCode;

        let not_found = status_error(StatusCode::NOT_FOUND, "model not found".to_string());
        assert!(!is_retryable(&not_found));
        assert!(not_found.to_string().contains("model not found"));

        assert!(is_retryable(&status_error(StatusCode::TOO_MANY_REQUESTS, String::new())));
        assert!(is_retryable(&status_error(StatusCode::BAD_GATEWAY, String::new())));
        assert!(is_retryable(&anyhow!("connection refused")));
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let v = vec![0.25f32, -1.0, 1e-6, 42.0];
        assert_eq!(blob_to_vec(&vec_to_blob(&v)), v);
    }

    #[test]
    fn test_cosine_identical() {
        let a = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 1.0];
        let b = vec![-1.0, -1.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_parse_ollama_response() {
        let json = serde_json::json!({
            "model": "embeddinggemma",
            "embeddings": [[0.1, 0.2], [0.3, 0.4]]
        });
        let vectors = parse_ollama_response(&json).unwrap();
        assert_eq!(vectors.len(), 2);
        assert!((vectors[1][0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_parse_ollama_response_missing_array() {
        let json = serde_json::json!({ "error": "model not found" });
        assert!(parse_ollama_response(&json).is_err());
    }

    #[test]
    fn test_create_embedder_uses_config_model() {
        let config = Config::default();
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.model_name(), "embeddinggemma");
    }

    #[tokio::test]
    async fn test_unreachable_server_errors() {
        let mut config = EmbeddingConfig::default();
        config.url = "http://127.0.0.1:9".to_string();
        config.timeout_secs = 2;
        let policy = RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            jitter: false,
        };
        let embedder = OllamaEmbedder::new(&config, policy).unwrap();
        let err = embed_query(&embedder, "hello").await.unwrap_err();
        assert!(err.to_string().contains("Ollama"));
    }
}
