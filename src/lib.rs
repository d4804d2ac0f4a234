//! # ConQuerX
//!
//! A four-stage batch pipeline that turns a list of subject areas into
//! graded multiple-choice quizzes, grounded in Wikipedia.
//!
//! ## Architecture
//!
//! ```text
//! areas.txt ──▶ seed ──▶ concepts ──▶ quiz ──────────▶ eval
//!               │         │            │   ▲            │
//!               ▼         ▼            ▼   │            ▼
//!       questions.json concepts.json   │ retriever   wiki_evaluation.json
//!                                      │   │
//!                  quiz_concept_wiki.json  ├── content cache (.cache/wikipedia)
//!                  wiki.json               ├── Wikipedia (on cache miss)
//!                                          └── vector index (.indices/<fingerprint>)
//! ```
//!
//! The language model, the embedding model and the encyclopedia are
//! capability traits ([`llm::ChatModel`], [`embedding::Embedder`],
//! [`wiki::PageSource`]) so tests can run the whole pipeline offline.
//!
//! ## Quick Start
//!
//! ```bash
//! conquerx run                    # all four stages
//! conquerx run --step quiz        # a single stage
//! conquerx cache stats
//! conquerx cache clear
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and artifacts |
//! | [`validation`] | Area, question, concept and quiz-block validators |
//! | [`parse`] | Grammar for model output |
//! | [`retry`] | Exponential backoff retrier |
//! | [`cache`] | Disk-backed content cache |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding backend abstraction |
//! | [`index`] | Vector index and fingerprinted persistence |
//! | [`retriever`] | Topic resolution and passage retrieval |
//! | [`llm`] | Chat model abstraction and retried chat tasks |
//! | [`wiki`] | Wikipedia page source |
//! | [`pipeline`] | Stage sequencing |

pub mod artifacts;
pub mod cache;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod index;
pub mod llm;
pub mod logging;
pub mod models;
pub mod parse;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod retriever;
pub mod retry;
pub mod stage_concepts;
pub mod stage_evaluate;
pub mod stage_quiz;
pub mod stage_seed;
pub mod stats;
pub mod validation;
pub mod wiki;
