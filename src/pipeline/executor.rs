//! Pipeline executor
//!
//! A small interpreter over the fixed stage graph: look at `current_stage`,
//! invoke that stage (or the error router), apply the result through the
//! state manager, ask the router for the next stage, repeat until a terminal
//! state. Stage failures never escape as errors; they become an `error`
//! state that the caller receives like any other result.

use super::stages::{
    AnalysisInput, GenerationInput, ProcessingInput, RetrievalInput, StageSet,
};
use crate::config::{PipelineConfig, ThresholdConfig};
use crate::core::router::{route_after, route_from_error, RoutingDecision};
use crate::error::{PipelineError, Result};
use crate::state::{
    self, create_initial, enter_failure, record_duration, transition, FailureKind, PipelineState,
    Stage, StateUpdate,
};
use crate::storage::CheckpointStore;
use anyhow::anyhow;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Result of invoking one stage, before it is folded into the state
enum StageOutcome {
    Produced(StateUpdate),
    Failed(anyhow::Error),
    TimedOut,
}

/// Runs queries through the four stages
///
/// Holds no per-run state, so one executor can serve many concurrent runs.
#[derive(Clone)]
pub struct PipelineExecutor {
    stages: StageSet,
    config: PipelineConfig,
    checkpoint_store: Option<Arc<dyn CheckpointStore>>,
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("stages", &self.stages)
            .field("config", &self.config)
            .field(
                "checkpoint_store",
                &self.checkpoint_store.as_ref().map(|_| "<CheckpointStore>"),
            )
            .finish()
    }
}

impl PipelineExecutor {
    pub(super) fn new(
        stages: StageSet,
        config: PipelineConfig,
        checkpoint_store: Option<Arc<dyn CheckpointStore>>,
    ) -> Self {
        Self {
            stages,
            config,
            checkpoint_store,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.config.thresholds
    }

    pub fn has_checkpoint_store(&self) -> bool {
        self.checkpoint_store.is_some()
    }

    /// Create the initial state for `query` and run it to a terminal state
    pub async fn run_pipeline(&self, session_id: &str, query: &str) -> Result<PipelineState> {
        let state = create_initial(session_id, query)?;
        self.run(state).await
    }

    /// Continue a checkpointed run from the stage it was stored at
    pub async fn resume(&self, session_id: &str) -> Result<PipelineState> {
        let store = self.checkpoint_store.as_ref().ok_or_else(|| {
            PipelineError::invalid_argument("resume requires a checkpoint store")
        })?;

        let serialized = store
            .load(session_id)
            .await?
            .ok_or_else(|| PipelineError::CheckpointNotFound(session_id.to_string()))?;
        let state = state::deserialize(&serialized)?;

        info!(
            session_id,
            stage = %state.current_stage,
            retry_count = state.retry_count,
            "Resuming pipeline from checkpoint"
        );
        self.run(state).await
    }

    /// Drive `state` to `completed` or a terminal `error`
    ///
    /// Only a state that fails its own invariants is returned as an error;
    /// every stage, timeout and quality-gate failure ends in an `Ok` state.
    pub async fn run(&self, mut state: PipelineState) -> Result<PipelineState> {
        state::check(&state)?;
        let thresholds = &self.config.thresholds;

        info!(
            session_id = %state.session_id,
            stage = %state.current_stage,
            "Starting pipeline run"
        );

        loop {
            self.checkpoint(&state).await;

            let current = state.current_stage;
            match current {
                Stage::Completed => {
                    info!(
                        session_id = %state.session_id,
                        retry_count = state.retry_count,
                        total_seconds = state.total_processing_time(),
                        "Pipeline completed"
                    );
                    return Ok(state);
                }
                Stage::Error => {
                    let retryable = state
                        .failure_kind
                        .map(|kind| kind.is_retryable())
                        .unwrap_or(true);
                    if !retryable {
                        warn!(
                            session_id = %state.session_id,
                            error = state.error_message.as_deref().unwrap_or_default(),
                            "Pipeline stopped at a quality gate"
                        );
                        return Ok(state);
                    }

                    let decision = route_from_error(&state, thresholds);
                    log_decision(&state, Stage::Error, &decision);
                    if decision.is_error() {
                        warn!(
                            session_id = %state.session_id,
                            retry_count = state.retry_count,
                            error = state.error_message.as_deref().unwrap_or_default(),
                            "Pipeline failed after exhausting retries"
                        );
                        return Ok(state);
                    }
                    state = transition(state, decision.next_stage, thresholds.max_retries)?;
                }
                stage => {
                    state = self.execute_stage(stage, state).await?;
                    if state.is_error() {
                        continue;
                    }

                    let decision = route_after(stage, &state, thresholds);
                    log_decision(&state, stage, &decision);
                    state = if decision.is_error() {
                        enter_failure(state, FailureKind::QualityGate, &decision.reason)?
                    } else {
                        transition(state, decision.next_stage, thresholds.max_retries)?
                    };
                }
            }
        }
    }

    /// Invoke one stage under the configured timeout and fold in its result
    async fn execute_stage(&self, stage: Stage, state: PipelineState) -> Result<PipelineState> {
        let timeout = self.config.thresholds.stage_timeout();
        debug!(session_id = %state.session_id, stage = %stage, "Starting stage");

        let started = Instant::now();
        let outcome = match tokio::time::timeout(timeout, self.invoke(stage, &state)).await {
            Ok(Ok(update)) => match update.non_finite_field() {
                Some(field) => StageOutcome::Failed(anyhow!("returned a non-finite {}", field)),
                None => StageOutcome::Produced(update),
            },
            Ok(Err(e)) => StageOutcome::Failed(e),
            Err(_) => StageOutcome::TimedOut,
        };
        let elapsed = started.elapsed().as_secs_f64();

        match outcome {
            StageOutcome::Produced(update) => {
                info!(
                    session_id = %state.session_id,
                    stage = %stage,
                    seconds = elapsed,
                    "Stage finished"
                );
                let state = state::apply_update(state, update);
                record_duration(state, stage.as_str(), elapsed)
            }
            StageOutcome::Failed(e) => {
                let message = format!("{} failed: {:#}", stage.label(), e);
                warn!(session_id = %state.session_id, stage = %stage, "{}", message);
                enter_failure(state, FailureKind::StageFailure, &message)
            }
            StageOutcome::TimedOut => {
                let message = format!(
                    "{} failed: timed out after {}s",
                    stage.label(),
                    timeout.as_secs()
                );
                warn!(session_id = %state.session_id, stage = %stage, "{}", message);
                enter_failure(state, FailureKind::Timeout, &message)
            }
        }
    }

    async fn invoke(&self, stage: Stage, state: &PipelineState) -> anyhow::Result<StateUpdate> {
        let update = match stage {
            Stage::Analysis => {
                let input = AnalysisInput::from_state(state);
                StateUpdate::Analysis(self.stages.analyzer.analyze(input).await?)
            }
            Stage::Retrieval => {
                let input = RetrievalInput::from_state(state, self.config.max_results)?;
                StateUpdate::Retrieval(self.stages.retriever.retrieve(input).await?)
            }
            Stage::Processing => {
                let input = ProcessingInput::from_state(state, self.config.target_difficulty)?;
                StateUpdate::Processing(self.stages.processor.process(input).await?)
            }
            Stage::Generation => {
                let input = GenerationInput::from_state(state)?;
                StateUpdate::Response(self.stages.generator.generate(input).await?)
            }
            Stage::Completed | Stage::Error => {
                return Err(anyhow!("{} is not an executable stage", stage));
            }
        };
        Ok(update)
    }

    /// Store the state if a store is attached; failures are logged only
    async fn checkpoint(&self, state: &PipelineState) {
        let Some(store) = &self.checkpoint_store else {
            return;
        };

        let serialized = match state::serialize(state) {
            Ok(serialized) => serialized,
            Err(e) => {
                warn!(session_id = %state.session_id, "Failed to serialize checkpoint: {}", e);
                return;
            }
        };

        if let Err(e) = store.store(&state.session_id, &serialized).await {
            warn!(session_id = %state.session_id, "Failed to store checkpoint: {}", e);
        }
    }
}

fn log_decision(state: &PipelineState, after: Stage, decision: &RoutingDecision) {
    info!(
        session_id = %state.session_id,
        after = %after,
        next = %decision.next_stage,
        confidence = decision.confidence,
        reason = %decision.reason,
        "Routing decision"
    );
    if let Some(warning) = decision.warning() {
        warn!(
            session_id = %state.session_id,
            after = %after,
            warning,
            "Proceeding despite weak quality signal"
        );
    }
}

/// Build a one-off executor from `stages` and run a single query
pub async fn run_pipeline(
    stages: StageSet,
    session_id: &str,
    query: &str,
    thresholds: ThresholdConfig,
) -> Result<PipelineState> {
    let executor = super::PipelineBuilder::new()
        .with_stages(stages)
        .with_thresholds(thresholds)
        .build()?;
    executor.run_pipeline(session_id, query).await
}
