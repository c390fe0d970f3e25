//! Pure routing decisions at each stage boundary
//!
//! One function per boundary inspects the state the stage just produced and
//! decides whether the run proceeds, completes, or escalates to `error`.
//! Hard gates fail only on a genuinely empty or invalid signal; weak but
//! usable signals proceed with a lowered confidence and a `warning` entry in
//! the decision metadata.

use crate::config::ThresholdConfig;
use crate::state::{can_retry, PipelineState, Stage};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Retrieval counts at or above this are treated as sufficient
pub const SUFFICIENT_RESULT_COUNT: usize = 2;

const PROCEED_CONFIDENCE: f64 = 0.9;
const CAUTIOUS_CONFIDENCE: f64 = 0.6;
const RETRY_FROM_STAGE_CONFIDENCE: f64 = 0.5;
const RETRY_FROM_START_CONFIDENCE: f64 = 0.3;

/// Outcome of a routing function; consumed immediately by the executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub next_stage: Stage,
    pub reason: String,
    /// In `[0, 1]`
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl RoutingDecision {
    pub fn new(next_stage: Stage, reason: impl Into<String>, confidence: f64) -> Self {
        Self {
            next_stage,
            reason: reason.into(),
            confidence: confidence.clamp(0.0, 1.0),
            metadata: HashMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn with_warning(self, warning: &str) -> Self {
        self.with("warning", Value::String(warning.to_string()))
    }

    /// The soft-gate warning attached to a proceeding decision, if any
    pub fn warning(&self) -> Option<&str> {
        self.metadata.get("warning").and_then(Value::as_str)
    }

    pub fn is_error(&self) -> bool {
        self.next_stage == Stage::Error
    }
}

fn short_circuit(state: &PipelineState, reason: &str) -> Option<RoutingDecision> {
    state
        .is_error()
        .then(|| RoutingDecision::new(Stage::Error, reason, 1.0))
}

/// Characters of trimmed text, counting Hangul syllables as one each
fn text_length(text: Option<&str>) -> usize {
    text.map(|t| t.trim().chars().count()).unwrap_or(0)
}

/// Route after query analysis: gate on analysis confidence
pub fn route_after_analysis(state: &PipelineState, config: &ThresholdConfig) -> RoutingDecision {
    if let Some(decision) = short_circuit(state, "Analysis failed") {
        return decision;
    }

    let confidence = state
        .analysis
        .as_ref()
        .map(|a| a.confidence)
        .filter(|c| c.is_finite())
        .unwrap_or(0.0);

    if confidence <= 0.0 || confidence < config.min_analysis_confidence {
        return RoutingDecision::new(Stage::Error, "Query confidence too low", 1.0)
            .with("min_confidence", json!(config.min_analysis_confidence))
            .with("actual_confidence", json!(confidence));
    }

    RoutingDecision::new(
        Stage::Retrieval,
        "Analysis successful, proceeding to document retrieval",
        confidence,
    )
}

/// Route after document retrieval: gate on the reported result count
pub fn route_after_retrieval(state: &PipelineState, config: &ThresholdConfig) -> RoutingDecision {
    if let Some(decision) = short_circuit(state, "Document retrieval failed") {
        return decision;
    }

    let results_count = state.retrieval.as_ref().map(|r| r.total_count).unwrap_or(0);

    if results_count == 0 {
        return RoutingDecision::new(Stage::Error, "No documents found", 1.0)
            .with("results_count", json!(results_count));
    }
    if results_count < config.min_result_count {
        return RoutingDecision::new(Stage::Error, "Too few documents found", 1.0)
            .with("results_count", json!(results_count))
            .with("min_result_count", json!(config.min_result_count));
    }

    if results_count < SUFFICIENT_RESULT_COUNT {
        return RoutingDecision::new(
            Stage::Processing,
            "Limited results found, proceeding with caution",
            CAUTIOUS_CONFIDENCE,
        )
        .with("results_count", json!(results_count))
        .with_warning("limited_results");
    }

    RoutingDecision::new(
        Stage::Processing,
        "Sufficient documents found",
        PROCEED_CONFIDENCE,
    )
    .with("results_count", json!(results_count))
}

/// Route after content processing: gate on content length, warn on readability
pub fn route_after_processing(state: &PipelineState, config: &ThresholdConfig) -> RoutingDecision {
    if let Some(decision) = short_circuit(state, "Content processing failed") {
        return decision;
    }

    let content_length = text_length(
        state
            .processing
            .as_ref()
            .map(|p| p.simplified_content.as_str()),
    );

    if content_length == 0 || content_length < config.min_content_length {
        return RoutingDecision::new(Stage::Error, "Processed content is insufficient", 1.0)
            .with("content_length", json!(content_length));
    }

    let readability = state
        .processing
        .as_ref()
        .map(|p| p.readability_score)
        .filter(|r| r.is_finite())
        .unwrap_or(0.0);

    if readability < config.min_readability {
        return RoutingDecision::new(
            Stage::Generation,
            "Low readability but proceeding",
            CAUTIOUS_CONFIDENCE,
        )
        .with("readability_score", json!(readability))
        .with_warning("low_readability");
    }

    RoutingDecision::new(
        Stage::Generation,
        "Content processing successful",
        PROCEED_CONFIDENCE,
    )
    .with("readability_score", json!(readability))
}

/// Route after response generation
///
/// Only the response length gates; a low response confidence still completes
/// with a warning so the user receives an answer.
pub fn route_after_generation(state: &PipelineState, config: &ThresholdConfig) -> RoutingDecision {
    if let Some(decision) = short_circuit(state, "Response generation failed") {
        return decision;
    }

    let response_length = text_length(state.response.as_ref().map(|r| r.main_response.as_str()));

    if response_length == 0 || response_length < config.min_response_length {
        return RoutingDecision::new(Stage::Error, "Generated response is insufficient", 1.0)
            .with("response_length", json!(response_length));
    }

    let confidence_score = state
        .response
        .as_ref()
        .map(|r| r.confidence_score)
        .filter(|c| c.is_finite())
        .unwrap_or(0.0);

    if confidence_score < config.min_response_confidence {
        return RoutingDecision::new(
            Stage::Completed,
            "Response generated with low confidence",
            confidence_score,
        )
        .with("confidence_score", json!(confidence_score))
        .with_warning("low_confidence");
    }

    RoutingDecision::new(
        Stage::Completed,
        "Workflow completed successfully",
        confidence_score,
    )
    .with("confidence_score", json!(confidence_score))
}

/// Route out of the error stage
///
/// Picks the resume point by looking for a stage name in `error_message`,
/// falling back to the first stage. Messages that mention none of the
/// expected words (or the wrong one) restart from the beginning.
pub fn route_from_error(state: &PipelineState, config: &ThresholdConfig) -> RoutingDecision {
    if !can_retry(state, config.max_retries) {
        return RoutingDecision::new(Stage::Error, "Maximum retries exceeded", 1.0)
            .with("retry_count", json!(state.retry_count));
    }

    let message = state
        .error_message
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();

    let resume = [
        ("analysis", Stage::Analysis, "Retrying from query analysis"),
        ("retrieval", Stage::Retrieval, "Retrying from document retrieval"),
        ("processing", Stage::Processing, "Retrying from content processing"),
    ]
    .into_iter()
    .find(|(needle, _, _)| message.contains(needle));

    match resume {
        Some((retry_from, stage, reason)) => {
            RoutingDecision::new(stage, reason, RETRY_FROM_STAGE_CONFIDENCE)
                .with("retry_from", json!(retry_from))
        }
        None => RoutingDecision::new(
            Stage::Analysis,
            "Retrying from the beginning",
            RETRY_FROM_START_CONFIDENCE,
        )
        .with("retry_from", json!("beginning")),
    }
}

/// Dispatch to the boundary function for `stage`
pub fn route_after(
    stage: Stage,
    state: &PipelineState,
    config: &ThresholdConfig,
) -> RoutingDecision {
    match stage {
        Stage::Analysis => route_after_analysis(state, config),
        Stage::Retrieval => route_after_retrieval(state, config),
        Stage::Processing => route_after_processing(state, config),
        Stage::Generation => route_after_generation(state, config),
        Stage::Error => route_from_error(state, config),
        Stage::Completed => {
            RoutingDecision::new(Stage::Completed, "Workflow already completed", 1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{
        create_initial, enter_error, GeneratedResponse, ProcessedContent, QueryAnalysis,
        RetrievalResult,
    };

    fn config() -> ThresholdConfig {
        ThresholdConfig::default()
    }

    fn state() -> PipelineState {
        create_initial("test-session", "주민등록등본 발급 방법").unwrap()
    }

    fn analyzed(confidence: f64) -> PipelineState {
        PipelineState {
            analysis: Some(QueryAnalysis {
                processed_query: "주민등록등본 발급".to_string(),
                intent: "procedure_inquiry".to_string(),
                confidence,
                ..Default::default()
            }),
            ..state()
        }
    }

    fn retrieved(total_count: usize) -> PipelineState {
        PipelineState {
            current_stage: Stage::Retrieval,
            retrieval: Some(RetrievalResult {
                documents: vec![],
                total_count,
                search_strategy: "hybrid".to_string(),
            }),
            ..analyzed(0.9)
        }
    }

    fn processed(content: &str, readability: f64) -> PipelineState {
        PipelineState {
            current_stage: Stage::Processing,
            processing: Some(ProcessedContent {
                simplified_content: content.to_string(),
                readability_score: readability,
                ..Default::default()
            }),
            ..retrieved(3)
        }
    }

    fn generated(response: &str, confidence: f64) -> PipelineState {
        PipelineState {
            current_stage: Stage::Generation,
            response: Some(GeneratedResponse {
                main_response: response.to_string(),
                confidence_score: confidence,
                ..Default::default()
            }),
            ..processed("정부24에서 신청하면 바로 발급됩니다.", 0.8)
        }
    }

    fn failed(message: &str, retry_count: u32) -> PipelineState {
        let mut failed = enter_error(state(), message).unwrap();
        failed.retry_count = retry_count;
        failed
    }

    #[test]
    fn test_route_after_analysis_success() {
        let decision = route_after_analysis(&analyzed(0.8), &config());
        assert_eq!(decision.next_stage, Stage::Retrieval);
        assert_eq!(decision.confidence, 0.8);
        assert!(decision.reason.contains("successful"));
        assert!(decision.warning().is_none());
    }

    #[test]
    fn test_route_after_analysis_boundary_is_inclusive() {
        let decision = route_after_analysis(&analyzed(0.3), &config());
        assert_eq!(decision.next_stage, Stage::Retrieval);

        let decision = route_after_analysis(&analyzed(0.29999), &config());
        assert_eq!(decision.next_stage, Stage::Error);
        assert!(decision.reason.contains("confidence too low"));
        assert_eq!(decision.metadata["min_confidence"], json!(0.3));
        assert_eq!(decision.metadata["actual_confidence"], json!(0.29999));
    }

    #[test]
    fn test_route_after_analysis_without_signal() {
        let decision = route_after_analysis(&state(), &config());
        assert_eq!(decision.next_stage, Stage::Error);

        let zero_threshold = ThresholdConfig {
            min_analysis_confidence: 0.0,
            ..config()
        };
        let decision = route_after_analysis(&analyzed(0.0), &zero_threshold);
        assert_eq!(decision.next_stage, Stage::Error);

        let decision = route_after_analysis(&analyzed(f64::NAN), &config());
        assert_eq!(decision.next_stage, Stage::Error);
    }

    #[test]
    fn test_every_route_short_circuits_on_error() {
        let errored = failed("Query analysis failed: boom", 1);
        for stage in Stage::PROCESSING {
            let decision = route_after(stage, &errored, &config());
            assert_eq!(decision.next_stage, Stage::Error, "after {}", stage);
            assert_eq!(decision.confidence, 1.0);
        }
    }

    #[test]
    fn test_route_after_retrieval_counts() {
        let decision = route_after_retrieval(&retrieved(0), &config());
        assert_eq!(decision.next_stage, Stage::Error);
        assert!(decision.reason.contains("No documents found"));

        let decision = route_after_retrieval(&retrieved(1), &config());
        assert_eq!(decision.next_stage, Stage::Processing);
        assert_eq!(decision.confidence, 0.6);
        assert_eq!(decision.warning(), Some("limited_results"));

        let decision = route_after_retrieval(&retrieved(2), &config());
        assert_eq!(decision.next_stage, Stage::Processing);
        assert_eq!(decision.confidence, 0.9);
        assert!(decision.warning().is_none());
        assert!(decision.reason.contains("Sufficient documents"));
    }

    #[test]
    fn test_route_after_retrieval_respects_min_result_count() {
        let strict = ThresholdConfig {
            min_result_count: 3,
            ..config()
        };
        let decision = route_after_retrieval(&retrieved(2), &strict);
        assert_eq!(decision.next_stage, Stage::Error);
        assert_eq!(decision.metadata["min_result_count"], json!(3));

        let decision = route_after_retrieval(&retrieved(3), &strict);
        assert_eq!(decision.next_stage, Stage::Processing);
    }

    #[test]
    fn test_route_after_processing_content_length_boundary() {
        let decision = route_after_processing(&processed("가나다라마바사아자", 0.8), &config());
        assert_eq!(decision.next_stage, Stage::Error);
        assert_eq!(decision.metadata["content_length"], json!(9));

        let decision = route_after_processing(&processed("가나다라마바사아자차", 0.8), &config());
        assert_eq!(decision.next_stage, Stage::Generation);
        assert_eq!(decision.confidence, 0.9);
    }

    #[test]
    fn test_route_after_processing_ignores_surrounding_whitespace() {
        let decision = route_after_processing(&processed("   짧은 내용   \n", 0.8), &config());
        assert_eq!(decision.next_stage, Stage::Error);
        assert!(decision.reason.contains("insufficient"));
    }

    #[test]
    fn test_route_after_processing_low_readability_is_soft() {
        let decision =
            route_after_processing(&processed("충분히 긴 쉬운 설명 내용입니다.", 0.1), &config());
        assert_eq!(decision.next_stage, Stage::Generation);
        assert_eq!(decision.confidence, 0.6);
        assert_eq!(decision.warning(), Some("low_readability"));
    }

    #[test]
    fn test_route_after_generation_success() {
        let decision =
            route_after_generation(&generated("정부24에서 발급 가능합니다.", 0.8), &config());
        assert_eq!(decision.next_stage, Stage::Completed);
        assert_eq!(decision.confidence, 0.8);
        assert!(decision.reason.contains("successfully"));
    }

    #[test]
    fn test_route_after_generation_low_confidence_still_completes() {
        let decision =
            route_after_generation(&generated("정부24에서 발급 가능합니다.", 0.49999), &config());
        assert_eq!(decision.next_stage, Stage::Completed);
        assert_eq!(decision.confidence, 0.49999);
        assert_eq!(decision.warning(), Some("low_confidence"));
        assert!(decision.reason.contains("low confidence"));
    }

    #[test]
    fn test_route_after_generation_short_response() {
        let decision = route_after_generation(&generated("네.", 0.99), &config());
        assert_eq!(decision.next_stage, Stage::Error);
        assert!(decision.reason.contains("insufficient"));

        let mut missing = generated("placeholder", 0.9);
        missing.response = None;
        let decision = route_after_generation(&missing, &config());
        assert_eq!(decision.next_stage, Stage::Error);
        assert_eq!(decision.metadata["response_length"], json!(0));
    }

    #[test]
    fn test_route_from_error_picks_stage_by_message() {
        let cases = vec![
            ("Query analysis failed: upstream 500", Stage::Analysis, "analysis"),
            ("Document retrieval failed: index offline", Stage::Retrieval, "retrieval"),
            ("Content PROCESSING failed: quota", Stage::Processing, "processing"),
        ];

        for (message, expected, retry_from) in cases {
            let decision = route_from_error(&failed(message, 1), &config());
            assert_eq!(decision.next_stage, expected, "for {:?}", message);
            assert_eq!(decision.confidence, 0.5);
            assert_eq!(decision.metadata["retry_from"], json!(retry_from));
        }
    }

    #[test]
    fn test_route_from_error_falls_back_to_beginning() {
        let decision = route_from_error(
            &failed("Response generation failed: model overloaded", 1),
            &config(),
        );
        assert_eq!(decision.next_stage, Stage::Analysis);
        assert_eq!(decision.confidence, 0.3);
        assert_eq!(decision.metadata["retry_from"], json!("beginning"));
    }

    #[test]
    fn test_route_from_error_when_retries_exhausted() {
        let decision = route_from_error(&failed("Query analysis failed: boom", 3), &config());
        assert_eq!(decision.next_stage, Stage::Error);
        assert!(decision.reason.contains("Maximum retries"));
        assert_eq!(decision.metadata["retry_count"], json!(3));

        let no_retries = ThresholdConfig {
            max_retries: 0,
            ..config()
        };
        let decision = route_from_error(&failed("Query analysis failed: boom", 0), &no_retries);
        assert_eq!(decision.next_stage, Stage::Error);
    }

    #[test]
    fn test_decision_confidence_is_clamped() {
        let decision = RoutingDecision::new(Stage::Completed, "ok", 1.7);
        assert_eq!(decision.confidence, 1.0);
        let decision = RoutingDecision::new(Stage::Completed, "ok", -0.2);
        assert_eq!(decision.confidence, 0.0);
    }
}
