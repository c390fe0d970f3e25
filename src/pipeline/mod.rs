//! Imperative shell: stage seams, assembly and execution

pub mod builder;
pub mod executor;
pub mod stages;

pub use builder::PipelineBuilder;
pub use executor::{run_pipeline, PipelineExecutor};
pub use stages::{
    AnalysisInput, ContentProcessor, DocumentRetriever, GenerationInput, ProcessingInput,
    QueryAnalyzer, ResponseGenerator, RetrievalInput, StageSet,
};
