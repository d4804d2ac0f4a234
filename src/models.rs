//! Core data models used throughout ConQuerX.
//!
//! These types represent the reference documents and passages that flow
//! through retrieval, and the JSON artifacts written by each pipeline stage.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Persisted content-cache record, one file per topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(rename = "concept")]
    pub topic: String,
    #[serde(rename = "page_id")]
    pub source_id: String,
    pub content: String,
}

/// A page returned by an encyclopedia source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub id: String,
    pub title: String,
    pub text: String,
}

/// A unit of retrievable reference text for one retrieval session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Topic the document was resolved from.
    pub topic: String,
    /// Origin page identifier, when known.
    pub id: Option<String>,
    pub text: String,
}

/// A fixed-size window of document text.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub topic: String,
    pub document_id: Option<String>,
    pub chunk_index: usize,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
}

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedPassage {
    /// Zero-based position in the result list.
    pub rank: usize,
    pub content: String,
    pub score: f32,
    pub topic: String,
}

/// `level → area → T`, the nesting shared by every artifact.
///
/// Insertion-ordered: levels follow `pipeline.education_levels` and areas
/// follow the areas file, and both orders survive a read/write round trip.
pub type LevelMap<T> = IndexMap<String, IndexMap<String, T>>;

/// Output of the seed stage.
pub type QuestionsArtifact = LevelMap<Vec<String>>;

/// Questions with one concept list per question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AreaConcepts {
    pub questions: Vec<String>,
    pub concepts: Vec<Vec<String>>,
}

pub type ConceptsArtifact = LevelMap<AreaConcepts>;

/// Concepts artifact entry enriched with one list of quiz blocks per question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AreaQuiz {
    pub questions: Vec<String>,
    pub concepts: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz: Option<Vec<Vec<String>>>,
}

pub type QuizArtifact = LevelMap<AreaQuiz>;

/// Reference material produced alongside quizzes: one summary and one
/// rendered passage set per question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AreaReference {
    pub summary: Vec<String>,
    pub wiki: Vec<String>,
}

pub type ReferenceArtifact = LevelMap<AreaReference>;

/// Quiz artifact entry enriched with one score map per question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AreaEvaluation {
    pub questions: Vec<String>,
    pub concepts: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz: Option<Vec<Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_score: Option<Vec<EvaluationScore>>,
}

pub type EvaluationArtifact = LevelMap<AreaEvaluation>;

/// The five fixed rubric criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RubricDimension {
    EducationalValue,
    Diversity,
    AreaRelevance,
    DifficultyAppropriateness,
    Comprehensiveness,
}

impl RubricDimension {
    pub const ALL: [RubricDimension; 5] = [
        RubricDimension::EducationalValue,
        RubricDimension::Diversity,
        RubricDimension::AreaRelevance,
        RubricDimension::DifficultyAppropriateness,
        RubricDimension::Comprehensiveness,
    ];

    /// Key used in model output and in the evaluation artifact.
    pub fn label(self) -> &'static str {
        match self {
            RubricDimension::EducationalValue => "Educational Value",
            RubricDimension::Diversity => "Diversity",
            RubricDimension::AreaRelevance => "Area Relevance",
            RubricDimension::DifficultyAppropriateness => "Difficulty Appropriateness",
            RubricDimension::Comprehensiveness => "Comprehensiveness",
        }
    }
}

/// Scores for all five rubric dimensions.
///
/// Values are 1..=5 for a real rubric score, [`EvaluationScore::ABSENT`]
/// when there was no quiz to evaluate and [`EvaluationScore::FAILED`] when
/// evaluation failed after exhausting retries. The struct shape keeps all
/// five dimensions present together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationScore {
    #[serde(rename = "Educational Value")]
    pub educational_value: i32,
    #[serde(rename = "Diversity")]
    pub diversity: i32,
    #[serde(rename = "Area Relevance")]
    pub area_relevance: i32,
    #[serde(rename = "Difficulty Appropriateness")]
    pub difficulty_appropriateness: i32,
    #[serde(rename = "Comprehensiveness")]
    pub comprehensiveness: i32,
}

impl EvaluationScore {
    pub const ABSENT: i32 = 0;
    pub const FAILED: i32 = -1;

    pub fn uniform(value: i32) -> Self {
        Self {
            educational_value: value,
            diversity: value,
            area_relevance: value,
            difficulty_appropriateness: value,
            comprehensiveness: value,
        }
    }

    /// No quiz existed for the question.
    pub fn absent() -> Self {
        Self::uniform(Self::ABSENT)
    }

    /// Evaluation failed after all retries.
    pub fn failed() -> Self {
        Self::uniform(Self::FAILED)
    }

    pub fn get(&self, dimension: RubricDimension) -> i32 {
        match dimension {
            RubricDimension::EducationalValue => self.educational_value,
            RubricDimension::Diversity => self.diversity,
            RubricDimension::AreaRelevance => self.area_relevance,
            RubricDimension::DifficultyAppropriateness => self.difficulty_appropriateness,
            RubricDimension::Comprehensiveness => self.comprehensiveness,
        }
    }

    pub fn set(&mut self, dimension: RubricDimension, value: i32) {
        match dimension {
            RubricDimension::EducationalValue => self.educational_value = value,
            RubricDimension::Diversity => self.diversity = value,
            RubricDimension::AreaRelevance => self.area_relevance = value,
            RubricDimension::DifficultyAppropriateness => self.difficulty_appropriateness = value,
            RubricDimension::Comprehensiveness => self.comprehensiveness = value,
        }
    }
}
