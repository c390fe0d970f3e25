//! Pipeline state model
//!
//! `PipelineState` is the single record threaded through the four stages of a
//! query run. Each stage contributes its own optional payload; a payload is
//! `None` until its stage has produced output, never a misleading default.
//!
//! All mutation goes through [`manager`], which takes a state by value and
//! returns the updated one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

pub mod manager;

pub use manager::{
    add_context, apply_update, apply_updates, begin_new_query, can_retry, check, create_initial,
    deserialize, enter_error, enter_failure, generate_session_id, record_duration, serialize,
    transition, validate,
};

/// Position of a run in the pipeline
///
/// The four processing stages run in declaration order; `Completed` and
/// `Error` are the sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "query_analysis")]
    Analysis,
    #[serde(rename = "document_retrieval")]
    Retrieval,
    #[serde(rename = "content_processing")]
    Processing,
    #[serde(rename = "response_generation")]
    Generation,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "error")]
    Error,
}

impl Stage {
    /// Processing stages in execution order
    pub const PROCESSING: [Stage; 4] = [
        Stage::Analysis,
        Stage::Retrieval,
        Stage::Processing,
        Stage::Generation,
    ];

    pub const ALL: [Stage; 6] = [
        Stage::Analysis,
        Stage::Retrieval,
        Stage::Processing,
        Stage::Generation,
        Stage::Completed,
        Stage::Error,
    ];

    /// Stable name used in serialized state and `processing_times` keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Analysis => "query_analysis",
            Stage::Retrieval => "document_retrieval",
            Stage::Processing => "content_processing",
            Stage::Generation => "response_generation",
            Stage::Completed => "completed",
            Stage::Error => "error",
        }
    }

    /// Human-readable label used as the prefix of stage failure messages
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Analysis => "Query analysis",
            Stage::Retrieval => "Document retrieval",
            Stage::Processing => "Content processing",
            Stage::Generation => "Response generation",
            Stage::Completed => "Completed",
            Stage::Error => "Error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Error)
    }

    /// Stages whose payloads are produced at or after this one
    pub fn downstream(&self) -> &'static [Stage] {
        match self {
            Stage::Analysis => &[
                Stage::Analysis,
                Stage::Retrieval,
                Stage::Processing,
                Stage::Generation,
            ],
            Stage::Retrieval => &[Stage::Retrieval, Stage::Processing, Stage::Generation],
            Stage::Processing => &[Stage::Processing, Stage::Generation],
            Stage::Generation => &[Stage::Generation],
            Stage::Completed | Stage::Error => &[],
        }
    }

    pub fn parse(name: &str) -> Option<Stage> {
        Self::ALL.into_iter().find(|stage| stage.as_str() == name)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reading level of a document or of simplified content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DifficultyLevel {
    #[default]
    #[serde(rename = "초급")]
    Beginner,
    #[serde(rename = "중급")]
    Intermediate,
    #[serde(rename = "고급")]
    Advanced,
}

/// Why a run entered the error stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The stage implementation returned an error
    StageFailure,
    /// The stage did not finish within the configured timeout
    Timeout,
    /// The stage succeeded but its output failed a hard quality gate
    QualityGate,
}

impl FailureKind {
    /// Whether the executor may resume the run after this failure
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::StageFailure | FailureKind::Timeout)
    }
}

/// Output of the query analysis stage
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub processed_query: String,
    pub intent: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub entities: BTreeMap<String, Vec<String>>,
    /// Quality signal read by the router
    pub confidence: f64,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl QueryAnalysis {
    pub fn non_finite_field(&self) -> Option<&'static str> {
        (!self.confidence.is_finite()).then_some("confidence")
    }
}

/// One retrieved policy document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: String,
    /// `YYYY-MM-DD`
    pub published_date: String,
    pub difficulty: DifficultyLevel,
    /// Relevance in `[0, 1]`
    pub score: f64,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// Output of the document retrieval stage
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RetrievalResult {
    #[serde(default)]
    pub documents: Vec<DocumentResult>,
    /// Quality signal read by the router; reported by the retriever and may
    /// exceed `documents.len()` when results were truncated
    pub total_count: usize,
    pub search_strategy: String,
}

impl RetrievalResult {
    pub fn non_finite_field(&self) -> Option<&'static str> {
        self.documents
            .iter()
            .any(|doc| !doc.score.is_finite())
            .then_some("score")
    }
}

/// Output of the content processing stage
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcessedContent {
    pub simplified_content: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub step_by_step_guide: Vec<String>,
    #[serde(default)]
    pub terminology_explanations: BTreeMap<String, String>,
    #[serde(default)]
    pub target_difficulty: DifficultyLevel,
    pub readability_score: f64,
}

impl ProcessedContent {
    pub fn non_finite_field(&self) -> Option<&'static str> {
        (!self.readability_score.is_finite()).then_some("readability_score")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedLink {
    pub title: String,
    pub url: String,
}

/// Output of the response generation stage
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GeneratedResponse {
    pub main_response: String,
    #[serde(default)]
    pub follow_up_questions: Vec<String>,
    #[serde(default)]
    pub related_links: Vec<RelatedLink>,
    pub confidence_score: f64,
}

impl GeneratedResponse {
    pub fn non_finite_field(&self) -> Option<&'static str> {
        (!self.confidence_score.is_finite()).then_some("confidence_score")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The record carrying all inputs, outputs and diagnostics of one query run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub session_id: String,
    pub user_query: String,
    pub current_stage: Stage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Number of times the run entered the error stage
    pub retry_count: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<QueryAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval: Option<RetrievalResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing: Option<ProcessedContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<GeneratedResponse>,

    #[serde(default)]
    pub chat_history: Vec<ChatTurn>,
    /// Stage name -> duration in seconds
    #[serde(default)]
    pub processing_times: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    #[serde(default)]
    pub context: HashMap<String, Value>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl PipelineState {
    pub fn is_completed(&self) -> bool {
        self.current_stage == Stage::Completed
    }

    pub fn is_error(&self) -> bool {
        self.current_stage == Stage::Error
    }

    /// The final response text, if generation has produced a non-blank one
    pub fn final_response(&self) -> Option<&str> {
        self.response
            .as_ref()
            .map(|r| r.main_response.as_str())
            .filter(|text| !text.trim().is_empty())
    }

    /// Sum of all recorded stage durations in seconds
    pub fn total_processing_time(&self) -> f64 {
        self.processing_times.values().sum()
    }

    /// The first stage payload carrying a NaN or infinite score
    ///
    /// JSON has no encoding for such values, so a state holding one cannot
    /// be checkpointed and restored.
    pub fn non_finite_score(&self) -> Option<(Stage, &'static str)> {
        let fields = [
            (
                Stage::Analysis,
                self.analysis
                    .as_ref()
                    .and_then(QueryAnalysis::non_finite_field),
            ),
            (
                Stage::Retrieval,
                self.retrieval
                    .as_ref()
                    .and_then(RetrievalResult::non_finite_field),
            ),
            (
                Stage::Processing,
                self.processing
                    .as_ref()
                    .and_then(ProcessedContent::non_finite_field),
            ),
            (
                Stage::Generation,
                self.response
                    .as_ref()
                    .and_then(GeneratedResponse::non_finite_field),
            ),
        ];
        fields
            .into_iter()
            .find_map(|(stage, field)| field.map(|field| (stage, field)))
    }

    pub(crate) fn clear_payload(&mut self, stage: Stage) {
        match stage {
            Stage::Analysis => self.analysis = None,
            Stage::Retrieval => self.retrieval = None,
            Stage::Processing => self.processing = None,
            Stage::Generation => self.response = None,
            Stage::Completed | Stage::Error => {}
        }
    }
}

/// A single overlay applied by [`manager::apply_update`]
///
/// Stage moves are deliberately not expressible here; they go through
/// [`manager::transition`] and [`manager::enter_error`], which validate them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StateUpdate {
    Analysis(QueryAnalysis),
    Retrieval(RetrievalResult),
    Processing(ProcessedContent),
    Response(GeneratedResponse),
    /// Merge into `context`; existing keys are overwritten
    Context(HashMap<String, Value>),
    /// Merge into `metadata`; existing keys are overwritten
    Metadata(HashMap<String, Value>),
    ChatTurn(ChatTurn),
}

impl StateUpdate {
    /// Name of the first NaN or infinite score this update would store
    pub fn non_finite_field(&self) -> Option<&'static str> {
        match self {
            StateUpdate::Analysis(analysis) => analysis.non_finite_field(),
            StateUpdate::Retrieval(retrieval) => retrieval.non_finite_field(),
            StateUpdate::Processing(processing) => processing.non_finite_field(),
            StateUpdate::Response(response) => response.non_finite_field(),
            StateUpdate::Context(_) | StateUpdate::Metadata(_) | StateUpdate::ChatTurn(_) => None,
        }
    }
}
