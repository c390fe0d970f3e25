//! Pipeline configuration
//!
//! `ThresholdConfig` holds the quality-gate thresholds and retry budget the
//! router and executor consult. `PipelineConfig` wraps it together with the
//! stage input defaults, checkpoint settings and log level, and can be loaded
//! from YAML or TOML.

use crate::error::{PipelineError, Result};
use crate::state::DifficultyLevel;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_MIN_ANALYSIS_CONFIDENCE: f64 = 0.3;
pub const DEFAULT_MIN_RESULT_COUNT: usize = 1;
pub const DEFAULT_MIN_CONTENT_LENGTH: usize = 10;
pub const DEFAULT_MIN_READABILITY: f64 = 0.3;
pub const DEFAULT_MIN_RESPONSE_LENGTH: usize = 10;
pub const DEFAULT_MIN_RESPONSE_CONFIDENCE: f64 = 0.5;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;
pub const DEFAULT_MAX_RESULTS: usize = 5;

/// Get the default directory for file checkpoints
pub fn default_checkpoint_dir() -> PathBuf {
    ProjectDirs::from("kr", "civic-qa", "civic-qa")
        .map(|dirs| dirs.data_dir().join("checkpoints"))
        .unwrap_or_else(|| PathBuf::from(".civic-qa/checkpoints"))
}

/// Quality-gate thresholds and retry budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub max_retries: u32,
    pub min_analysis_confidence: f64,
    pub min_result_count: usize,
    /// Characters of trimmed simplified content
    pub min_content_length: usize,
    /// Below this the run proceeds with a warning
    pub min_readability: f64,
    /// Characters of trimmed final response
    pub min_response_length: usize,
    /// Below this the run still completes, flagged with a warning
    pub min_response_confidence: f64,
    /// Per-stage timeout
    pub timeout_seconds: u64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            min_analysis_confidence: DEFAULT_MIN_ANALYSIS_CONFIDENCE,
            min_result_count: DEFAULT_MIN_RESULT_COUNT,
            min_content_length: DEFAULT_MIN_CONTENT_LENGTH,
            min_readability: DEFAULT_MIN_READABILITY,
            min_response_length: DEFAULT_MIN_RESPONSE_LENGTH,
            min_response_confidence: DEFAULT_MIN_RESPONSE_CONFIDENCE,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

fn check_unit_interval(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PipelineError::invalid_config(format!(
            "{} must lie in [0, 1], got {}",
            name, value
        )))
    }
}

impl ThresholdConfig {
    /// Fail fast on out-of-range values
    pub fn validate(&self) -> Result<()> {
        check_unit_interval("min_analysis_confidence", self.min_analysis_confidence)?;
        check_unit_interval("min_readability", self.min_readability)?;
        check_unit_interval("min_response_confidence", self.min_response_confidence)?;

        if self.timeout_seconds == 0 {
            return Err(PipelineError::invalid_config(
                "timeout_seconds must be greater than zero",
            ));
        }

        Ok(())
    }

    pub fn stage_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointSettings {
    pub enabled: bool,
    /// Directory for file checkpoints; the per-user data directory when unset
    pub directory: Option<PathBuf>,
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
        }
    }
}

/// Everything needed to build a pipeline besides the stages themselves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub thresholds: ThresholdConfig,
    /// Upper bound passed to the retriever
    pub max_results: usize,
    /// Reading level requested from the content processor
    pub target_difficulty: DifficultyLevel,
    pub checkpoint: CheckpointSettings,
    /// Default log filter when no `-v` flag or `RUST_LOG` is given
    pub log_level: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            thresholds: ThresholdConfig::default(),
            max_results: DEFAULT_MAX_RESULTS,
            target_difficulty: DifficultyLevel::Beginner,
            checkpoint: CheckpointSettings::default(),
            log_level: "warn".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn with_thresholds(thresholds: ThresholdConfig) -> Self {
        Self {
            thresholds,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;
        if self.max_results == 0 {
            return Err(PipelineError::invalid_config(
                "max_results must be greater than zero",
            ));
        }
        if self.log_level.parse::<LevelFilter>().is_err() {
            return Err(PipelineError::invalid_config(format!(
                "log_level must be one of off, error, warn, info, debug, trace; got {}",
                self.log_level
            )));
        }
        Ok(())
    }

    /// Apply `CIVIC_QA_*` environment overrides
    pub fn merge_env_vars(&mut self) {
        self.merge_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    ///
    /// Unparseable values are ignored.
    pub fn merge_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("CIVIC_QA_MAX_RETRIES").and_then(|v| v.parse().ok()) {
            self.thresholds.max_retries = value;
        }
        if let Some(value) = lookup("CIVIC_QA_TIMEOUT_SECONDS").and_then(|v| v.parse().ok()) {
            self.thresholds.timeout_seconds = value;
        }
        if let Some(value) = lookup("CIVIC_QA_MAX_RESULTS").and_then(|v| v.parse().ok()) {
            self.max_results = value;
        }
        if let Some(level) = lookup("CIVIC_QA_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(dir) = lookup("CIVIC_QA_CHECKPOINT_DIR") {
            self.checkpoint.directory = Some(PathBuf::from(dir));
        }
    }

    /// Directory file checkpoints go to when checkpointing is enabled
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.checkpoint
            .directory
            .clone()
            .unwrap_or_else(default_checkpoint_dir)
    }
}

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

/// Determine the format from a file extension
pub fn config_format(path: &Path) -> Result<ConfigFormat> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
        Some("toml") => Ok(ConfigFormat::Toml),
        _ => Err(PipelineError::invalid_config(format!(
            "Unsupported configuration file format for {}. Use .yaml, .yml or .toml",
            path.display()
        ))),
    }
}

/// Parse YAML content into a validated PipelineConfig
///
/// Accepts either a full pipeline config or a bare thresholds document.
pub fn parse_yaml_config(content: &str) -> Result<PipelineConfig> {
    let value: serde_yaml::Value = serde_yaml::from_str(content)?;
    let keys = value
        .as_mapping()
        .map(|mapping| mapping.keys().filter_map(|k| k.as_str()).collect::<Vec<_>>())
        .unwrap_or_default();
    let config = if is_full_config(&keys)? {
        serde_yaml::from_value(value)?
    } else {
        PipelineConfig::with_thresholds(serde_yaml::from_value(value)?)
    };
    config.validate()?;
    Ok(config)
}

/// Parse TOML content into a validated PipelineConfig
pub fn parse_toml_config(content: &str) -> Result<PipelineConfig> {
    let table: toml::Table = toml::from_str(content)?;
    let keys = table.keys().map(String::as_str).collect::<Vec<_>>();
    let config = if is_full_config(&keys)? {
        toml::from_str(content)?
    } else {
        PipelineConfig::with_thresholds(toml::from_str(content)?)
    };
    config.validate()?;
    Ok(config)
}

const PIPELINE_KEYS: [&str; 5] = [
    "thresholds",
    "max_results",
    "target_difficulty",
    "checkpoint",
    "log_level",
];

const THRESHOLD_KEYS: [&str; 8] = [
    "max_retries",
    "min_analysis_confidence",
    "min_result_count",
    "min_content_length",
    "min_readability",
    "min_response_length",
    "min_response_confidence",
    "timeout_seconds",
];

/// Tell a full pipeline config from a bare thresholds document
///
/// A full config must keep its thresholds under `thresholds`; top-level
/// threshold keys next to pipeline keys are rejected rather than dropped.
fn is_full_config(keys: &[&str]) -> Result<bool> {
    if !keys.iter().any(|key| PIPELINE_KEYS.contains(key)) {
        return Ok(false);
    }
    let stray: Vec<&str> = keys
        .iter()
        .copied()
        .filter(|key| THRESHOLD_KEYS.contains(key))
        .collect();
    if stray.is_empty() {
        Ok(true)
    } else {
        Err(PipelineError::invalid_config(format!(
            "{} must be nested under `thresholds` when other pipeline settings are present",
            stray.join(", ")
        )))
    }
}

/// Load a config file, picking the parser by extension
pub async fn load_config(path: &Path) -> Result<PipelineConfig> {
    let format = config_format(path)?;
    let content = tokio::fs::read_to_string(path).await?;
    match format {
        ConfigFormat::Yaml => parse_yaml_config(&content),
        ConfigFormat::Toml => parse_toml_config(&content),
    }
}
