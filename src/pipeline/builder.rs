//! Pipeline assembly
//!
//! Registers the four stage implementations, the configuration and an
//! optional checkpoint store. The topology itself is fixed: entry at
//! `query_analysis`, one conditional edge set per stage chosen by the router,
//! and the shared `error` sink.

use super::executor::PipelineExecutor;
use super::stages::{
    ContentProcessor, DocumentRetriever, QueryAnalyzer, ResponseGenerator, StageSet,
};
use crate::config::{PipelineConfig, ThresholdConfig};
use crate::error::{PipelineError, Result};
use crate::state::Stage;
use crate::storage::CheckpointStore;
use std::sync::Arc;

#[derive(Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
    analyzer: Option<Arc<dyn QueryAnalyzer>>,
    retriever: Option<Arc<dyn DocumentRetriever>>,
    processor: Option<Arc<dyn ContentProcessor>>,
    generator: Option<Arc<dyn ResponseGenerator>>,
    checkpoint_store: Option<Arc<dyn CheckpointStore>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace only the thresholds, keeping the rest of the configuration
    pub fn with_thresholds(mut self, thresholds: ThresholdConfig) -> Self {
        self.config.thresholds = thresholds;
        self
    }

    pub fn with_analyzer(mut self, analyzer: impl QueryAnalyzer + 'static) -> Self {
        self.analyzer = Some(Arc::new(analyzer));
        self
    }

    pub fn with_retriever(mut self, retriever: impl DocumentRetriever + 'static) -> Self {
        self.retriever = Some(Arc::new(retriever));
        self
    }

    pub fn with_processor(mut self, processor: impl ContentProcessor + 'static) -> Self {
        self.processor = Some(Arc::new(processor));
        self
    }

    pub fn with_generator(mut self, generator: impl ResponseGenerator + 'static) -> Self {
        self.generator = Some(Arc::new(generator));
        self
    }

    /// Register all four stages at once
    pub fn with_stages(mut self, stages: StageSet) -> Self {
        self.analyzer = Some(stages.analyzer);
        self.retriever = Some(stages.retriever);
        self.processor = Some(stages.processor);
        self.generator = Some(stages.generator);
        self
    }

    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoint_store = Some(store);
        self
    }

    /// Build the executor
    ///
    /// Fails with `InvalidConfig` before any stage can run, or with
    /// `MissingStage` naming the first unregistered stage.
    pub fn build(self) -> Result<PipelineExecutor> {
        self.config.validate()?;

        let stages = StageSet {
            analyzer: self
                .analyzer
                .ok_or(PipelineError::MissingStage(Stage::Analysis.as_str()))?,
            retriever: self
                .retriever
                .ok_or(PipelineError::MissingStage(Stage::Retrieval.as_str()))?,
            processor: self
                .processor
                .ok_or(PipelineError::MissingStage(Stage::Processing.as_str()))?,
            generator: self
                .generator
                .ok_or(PipelineError::MissingStage(Stage::Generation.as_str()))?,
        };

        Ok(PipelineExecutor::new(
            stages,
            self.config,
            self.checkpoint_store,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stages::{AnalysisInput, GenerationInput, ProcessingInput, RetrievalInput};
    use crate::state::{GeneratedResponse, ProcessedContent, QueryAnalysis, RetrievalResult};
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl QueryAnalyzer for Noop {
        async fn analyze(&self, _input: AnalysisInput) -> anyhow::Result<QueryAnalysis> {
            Ok(QueryAnalysis::default())
        }
    }

    #[async_trait]
    impl DocumentRetriever for Noop {
        async fn retrieve(&self, _input: RetrievalInput) -> anyhow::Result<RetrievalResult> {
            Ok(RetrievalResult::default())
        }
    }

    #[async_trait]
    impl ContentProcessor for Noop {
        async fn process(&self, _input: ProcessingInput) -> anyhow::Result<ProcessedContent> {
            Ok(ProcessedContent::default())
        }
    }

    #[async_trait]
    impl ResponseGenerator for Noop {
        async fn generate(&self, _input: GenerationInput) -> anyhow::Result<GeneratedResponse> {
            Ok(GeneratedResponse::default())
        }
    }

    fn complete() -> PipelineBuilder {
        PipelineBuilder::new()
            .with_analyzer(Noop)
            .with_retriever(Noop)
            .with_processor(Noop)
            .with_generator(Noop)
    }

    #[test]
    fn test_build_with_all_stages() {
        let executor = complete().build().unwrap();
        assert_eq!(executor.config().thresholds.max_retries, 3);
        assert!(!executor.has_checkpoint_store());
    }

    #[test]
    fn test_build_reports_missing_stage() {
        let result = PipelineBuilder::new()
            .with_analyzer(Noop)
            .with_retriever(Noop)
            .with_generator(Noop)
            .build();

        match result {
            Err(PipelineError::MissingStage(name)) => assert_eq!(name, "content_processing"),
            other => panic!("expected MissingStage, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_build_rejects_invalid_thresholds() {
        let result = complete()
            .with_thresholds(ThresholdConfig {
                min_analysis_confidence: 1.5,
                ..Default::default()
            })
            .build();

        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }
}
