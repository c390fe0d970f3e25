//! # civic-qa
//!
//! Orchestration core for a citizen-facing Q&A pipeline. A query runs through
//! four stages (query analysis, document retrieval, content simplification,
//! response generation); after each one a quality-gated router decides
//! whether to proceed, complete, or escalate to the error stage, from which
//! stage failures are retried within a bounded budget.
//!
//! ## Modules
//!
//! - `state` - The `PipelineState` value and its pure manager functions
//! - `core` - Transition rules, routing decisions and run summaries (no I/O)
//! - `pipeline` - Stage traits, the pipeline builder and the executor
//! - `storage` - Checkpoint store trait with memory and file backends
//! - `config` - Thresholds and pipeline configuration loading
//! - `error` - Library error type
//!
//! ## Example
//!
//! ```no_run
//! use civic_qa::pipeline::{PipelineBuilder, StageSet};
//!
//! # async fn example(stages: StageSet) -> civic_qa::error::Result<()> {
//! let executor = PipelineBuilder::new().with_stages(stages).build()?;
//! let state = executor.run_pipeline("session-1", "주민등록등본 발급 방법").await?;
//! if let Some(answer) = state.final_response() {
//!     println!("{}", answer);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod pipeline;
pub mod state;
pub mod storage;

pub use error::{PipelineError, Result};
pub use pipeline::{run_pipeline, PipelineBuilder, PipelineExecutor};
pub use state::{PipelineState, Stage};
