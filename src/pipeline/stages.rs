//! Stage seams
//!
//! The four processing stages are external collaborators. Each is an async
//! trait taking a typed input built from the current state and returning its
//! typed payload or an `anyhow` error; the executor owns every state change.

use crate::state::{
    ChatTurn, DifficultyLevel, DocumentResult, GeneratedResponse, PipelineState, ProcessedContent,
    QueryAnalysis, RetrievalResult,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisInput {
    pub query: String,
    pub session_id: String,
    pub context: HashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalInput {
    /// Normalized query from analysis, or the raw query when analysis left it blank
    pub query: String,
    pub keywords: Vec<String>,
    pub category: Option<String>,
    pub max_results: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingInput {
    pub documents: Vec<DocumentResult>,
    pub user_query: String,
    pub target_difficulty: DifficultyLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationInput {
    pub user_query: String,
    pub content: ProcessedContent,
    pub chat_history: Vec<ChatTurn>,
    pub include_suggestions: bool,
}

impl AnalysisInput {
    pub fn from_state(state: &PipelineState) -> Self {
        Self {
            query: state.user_query.clone(),
            session_id: state.session_id.clone(),
            context: state.context.clone(),
        }
    }
}

impl RetrievalInput {
    pub fn from_state(state: &PipelineState, max_results: usize) -> Result<Self> {
        let analysis = state
            .analysis
            .as_ref()
            .ok_or_else(|| anyhow!("query analysis output is missing"))?;

        let query = if analysis.processed_query.trim().is_empty() {
            state.user_query.clone()
        } else {
            analysis.processed_query.clone()
        };

        Ok(Self {
            query,
            keywords: analysis.keywords.clone(),
            category: analysis.category.clone(),
            max_results,
        })
    }
}

impl ProcessingInput {
    pub fn from_state(state: &PipelineState, target_difficulty: DifficultyLevel) -> Result<Self> {
        let retrieval = state
            .retrieval
            .as_ref()
            .ok_or_else(|| anyhow!("document retrieval output is missing"))?;

        Ok(Self {
            documents: retrieval.documents.clone(),
            user_query: state.user_query.clone(),
            target_difficulty,
        })
    }
}

impl GenerationInput {
    pub fn from_state(state: &PipelineState) -> Result<Self> {
        let content = state
            .processing
            .clone()
            .ok_or_else(|| anyhow!("content processing output is missing"))?;

        Ok(Self {
            user_query: state.user_query.clone(),
            content,
            chat_history: state.chat_history.clone(),
            include_suggestions: true,
        })
    }
}

/// Must populate `confidence`
#[async_trait]
pub trait QueryAnalyzer: Send + Sync {
    async fn analyze(&self, input: AnalysisInput) -> Result<QueryAnalysis>;
}

/// Must populate `total_count`
#[async_trait]
pub trait DocumentRetriever: Send + Sync {
    async fn retrieve(&self, input: RetrievalInput) -> Result<RetrievalResult>;
}

/// Must populate `simplified_content` and `readability_score`
#[async_trait]
pub trait ContentProcessor: Send + Sync {
    async fn process(&self, input: ProcessingInput) -> Result<ProcessedContent>;
}

/// Must populate `main_response` and `confidence_score`
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, input: GenerationInput) -> Result<GeneratedResponse>;
}

/// The four stage implementations a pipeline runs
#[derive(Clone)]
pub struct StageSet {
    pub analyzer: Arc<dyn QueryAnalyzer>,
    pub retriever: Arc<dyn DocumentRetriever>,
    pub processor: Arc<dyn ContentProcessor>,
    pub generator: Arc<dyn ResponseGenerator>,
}

impl std::fmt::Debug for StageSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageSet")
            .field("analyzer", &"<QueryAnalyzer>")
            .field("retriever", &"<DocumentRetriever>")
            .field("processor", &"<ContentProcessor>")
            .field("generator", &"<ResponseGenerator>")
            .finish()
    }
}
