//! TOML configuration parsing and validation.
//!
//! Every section has built-in defaults, so an empty file (or no file at
//! all) yields a runnable configuration pointing at a local Ollama
//! instance and English Wikipedia. The resulting [`Config`] is built once
//! at process start and handed to every component constructor.
//!
//! ```toml
//! [paths]
//! root = "./run"
//!
//! [llm]
//! model = "gemma3:4b"
//!
//! [retrieval]
//! top_k = 5
//! chunk_size = 128
//! chunk_overlap = 50
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "./conquerx.toml";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub wikipedia: WikipediaConfig,
    pub retrieval: RetrievalConfig,
    pub retry: RetryConfig,
    pub pipeline: PipelineConfig,
}

/// Locations of pipeline artifacts, the content cache and the index store.
///
/// Relative entries are resolved against `root` by the `*_path` accessors.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PathsConfig {
    pub root: PathBuf,
    pub areas: PathBuf,
    pub questions: PathBuf,
    pub concepts: PathBuf,
    pub quiz: PathBuf,
    pub reference: PathBuf,
    pub evaluation: PathBuf,
    pub log_file: Option<PathBuf>,
    pub cache_dir: PathBuf,
    pub index_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            areas: PathBuf::from("areas.txt"),
            questions: PathBuf::from("questions.json"),
            concepts: PathBuf::from("concepts.json"),
            quiz: PathBuf::from("quiz_concept_wiki.json"),
            reference: PathBuf::from("wiki.json"),
            evaluation: PathBuf::from("wiki_evaluation.json"),
            log_file: Some(PathBuf::from("pipeline.log")),
            cache_dir: PathBuf::from(".cache/wikipedia"),
            index_dir: PathBuf::from(".indices"),
        }
    }
}

impl PathsConfig {
    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    pub fn areas_path(&self) -> PathBuf {
        self.resolve(&self.areas)
    }
    pub fn questions_path(&self) -> PathBuf {
        self.resolve(&self.questions)
    }
    pub fn concepts_path(&self) -> PathBuf {
        self.resolve(&self.concepts)
    }
    pub fn quiz_path(&self) -> PathBuf {
        self.resolve(&self.quiz)
    }
    pub fn reference_path(&self) -> PathBuf {
        self.resolve(&self.reference)
    }
    pub fn evaluation_path(&self) -> PathBuf {
        self.resolve(&self.evaluation)
    }
    pub fn log_file_path(&self) -> Option<PathBuf> {
        self.log_file.as_deref().map(|p| self.resolve(p))
    }
    pub fn cache_dir_path(&self) -> PathBuf {
        self.resolve(&self.cache_dir)
    }
    pub fn index_dir_path(&self) -> PathBuf {
        self.resolve(&self.index_dir)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            url: default_ollama_url(),
            model: "gemma3:4b".to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub url: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Number of chunk texts sent per embedding request.
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            url: default_ollama_url(),
            model: "embeddinggemma".to_string(),
            timeout_secs: 30,
            batch_size: 32,
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WikipediaConfig {
    pub language: String,
    pub user_agent: String,
    /// Minimum spacing between two page fetches.
    pub fetch_delay_ms: u64,
    pub timeout_secs: u64,
    /// Overrides `https://{language}.wikipedia.org`.
    pub base_url: Option<String>,
}

impl Default for WikipediaConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            user_agent: "ConQuerX-Research/1.0".to_string(),
            fetch_delay_ms: 100,
            timeout_secs: 30,
            base_url: None,
        }
    }
}

impl WikipediaConfig {
    pub fn fetch_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_delay_ms)
    }

    pub fn api_base(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.wikipedia.org", self.language),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of passages returned per question.
    pub top_k: usize,
    /// Chunk window size, in whitespace tokens.
    pub chunk_size: usize,
    /// Tokens shared between consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            chunk_size: 128,
            chunk_overlap: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            jitter: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineConfig {
    pub education_levels: Vec<String>,
    /// Below this many questions per area a warning is logged.
    pub min_questions: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            education_levels: vec![
                "primary school".to_string(),
                "high school".to_string(),
                "college".to_string(),
            ],
            min_questions: 3,
        }
    }
}

impl Config {
    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `WIKIPEDIA_USER_AGENT` | `wikipedia.user_agent` |
    /// | `OLLAMA_MODEL` | `llm.model` |
    /// | `EMBEDDING_MODEL` | `embedding.model` |
    /// | `OLLAMA_URL` | `llm.url` and `embedding.url` |
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(agent) = lookup("WIKIPEDIA_USER_AGENT") {
            self.wikipedia.user_agent = agent;
        }
        if let Some(model) = lookup("OLLAMA_MODEL") {
            self.llm.model = model;
        }
        if let Some(model) = lookup("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(url) = lookup("OLLAMA_URL") {
            self.llm.url = url.clone();
            self.embedding.url = url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.retrieval.chunk_size == 0 {
            bail!("retrieval.chunk_size must be > 0");
        }
        if self.retrieval.chunk_overlap >= self.retrieval.chunk_size {
            bail!(
                "retrieval.chunk_overlap ({}) must be smaller than retrieval.chunk_size ({})",
                self.retrieval.chunk_overlap,
                self.retrieval.chunk_size
            );
        }
        if self.retrieval.top_k < 1 {
            bail!("retrieval.top_k must be >= 1");
        }
        if self.retry.max_attempts < 1 {
            bail!("retry.max_attempts must be >= 1");
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            bail!("retry.max_delay_ms must be >= retry.base_delay_ms");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        if self.pipeline.education_levels.is_empty() {
            bail!("pipeline.education_levels must list at least one level");
        }
        if self.wikipedia.user_agent.trim().is_empty() {
            bail!("wikipedia.user_agent must not be empty");
        }

        match self.llm.provider.as_str() {
            "ollama" => {}
            other => bail!("Unknown llm provider: '{}'. Must be ollama.", other),
        }
        match self.embedding.provider.as_str() {
            "ollama" => {}
            other => bail!("Unknown embedding provider: '{}'. Must be ollama.", other),
        }

        Ok(())
    }
}

/// Parse a TOML config string (no environment overrides, no validation).
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Load configuration for a run.
///
/// - `Some(path)`: the file must exist.
/// - `None`: [`DEFAULT_CONFIG_PATH`] is used if present, built-in defaults otherwise.
///
/// Environment overrides are applied before validation.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            parse_config(&content)?
        }
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                let content = std::fs::read_to_string(default_path).with_context(|| {
                    format!("Failed to read config file: {}", default_path.display())
                })?;
                parse_config(&content)?
            } else {
                Config::default()
            }
        }
    };

    config.apply_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.chunk_size, 128);
        assert_eq!(config.retrieval.chunk_overlap, 50);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.pipeline.education_levels.len(), 3);
        assert_eq!(config.wikipedia.user_agent, "ConQuerX-Research/1.0");
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = parse_config("[retrieval]\ntop_k = 8\n").unwrap();
        assert_eq!(config.retrieval.top_k, 8);
        assert_eq!(config.retrieval.chunk_size, 128);
        assert_eq!(config.llm.model, "gemma3:4b");
    }

    #[test]
    fn test_paths_resolve_against_root() {
        let config = parse_config("[paths]\nroot = \"/tmp/run\"\n").unwrap();
        assert_eq!(
            config.paths.questions_path(),
            PathBuf::from("/tmp/run/questions.json")
        );
        assert_eq!(
            config.paths.cache_dir_path(),
            PathBuf::from("/tmp/run/.cache/wikipedia")
        );
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let config =
            parse_config("[retrieval]\nchunk_size = 10\nchunk_overlap = 10\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config = parse_config("[retry]\nmax_attempts = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = parse_config("[llm]\nprovider = \"magic\"\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Unknown llm provider"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("OLLAMA_MODEL", "llama3"),
            ("EMBEDDING_MODEL", "nomic-embed-text"),
            ("WIKIPEDIA_USER_AGENT", "Tester/0.1"),
            ("OLLAMA_URL", "http://gpu-box:11434"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.llm.model, "llama3");
        assert_eq!(config.embedding.model, "nomic-embed-text");
        assert_eq!(config.wikipedia.user_agent, "Tester/0.1");
        assert_eq!(config.embedding.url, "http://gpu-box:11434");
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let err = load_config(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_api_base() {
        let mut wiki = WikipediaConfig::default();
        assert_eq!(wiki.api_base(), "https://en.wikipedia.org");
        wiki.base_url = Some("http://localhost:9000/".to_string());
        assert_eq!(wiki.api_base(), "http://localhost:9000");
    }
}
