use anyhow::Context;
use civic_qa::config::{self, PipelineConfig};
use civic_qa::core::summarize;
use civic_qa::state;
use civic_qa::storage::{CheckpointStore, FileCheckpointStore};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// Inspect configuration and checkpoints of the citizen Q&A pipeline
#[derive(Parser)]
#[command(name = "civic-qa", version)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a .yaml, .yml or .toml configuration file
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or validate the effective configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Inspect stored pipeline checkpoints
    Checkpoint {
        /// Checkpoint directory (defaults to the configured one)
        #[arg(long, global = true)]
        dir: Option<PathBuf>,

        #[command(subcommand)]
        command: CheckpointCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the configuration after defaults, file and environment are merged
    Show {
        #[arg(long, value_enum, default_value = "yaml")]
        format: OutputFormat,
    },
    /// Check a configuration file without printing it
    Validate {
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum CheckpointCommands {
    /// List sessions with a stored checkpoint
    List,
    /// Summarize a stored checkpoint
    Show {
        session_id: String,
        /// Print the full stored state instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Delete a stored checkpoint
    Delete {
        session_id: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
    Toml,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Loaded before logging starts so its log_level can seed the filter.
    // Commands that need it report a load failure themselves.
    let effective = load_effective_config(cli.config.clone()).await;

    let log_level = match cli.verbose {
        0 => effective
            .as_ref()
            .map(|config| config.log_level.clone())
            .unwrap_or_else(|_| "warn".to_string()),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(cli.verbose >= 2)
        .init();

    debug!("civic-qa started with verbosity level: {}", cli.verbose);

    let result = match cli.command {
        Commands::Config { command } => run_config_command(effective, command).await,
        Commands::Checkpoint { dir, command } => {
            run_checkpoint_command(effective, dir, command).await
        }
    };

    if let Err(e) = result {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn load_effective_config(path: Option<PathBuf>) -> anyhow::Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => config::load_config(&path)
            .await
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config.merge_env_vars();
    config.validate()?;
    Ok(config)
}

async fn run_config_command(
    effective: anyhow::Result<PipelineConfig>,
    command: ConfigCommands,
) -> anyhow::Result<()> {
    match command {
        ConfigCommands::Show { format } => {
            let config = effective?;
            let rendered = match format {
                OutputFormat::Yaml => serde_yaml::to_string(&config)?,
                OutputFormat::Json => serde_json::to_string_pretty(&config)?,
                OutputFormat::Toml => toml::to_string_pretty(&config)?,
            };
            println!("{}", rendered.trim_end());
        }
        ConfigCommands::Validate { path } => {
            let config = config::load_config(&path)
                .await
                .with_context(|| format!("Invalid configuration in {}", path.display()))?;
            println!(
                "Configuration is valid (max_retries: {}, timeout: {}s)",
                config.thresholds.max_retries, config.thresholds.timeout_seconds
            );
        }
    }
    Ok(())
}

async fn run_checkpoint_command(
    effective: anyhow::Result<PipelineConfig>,
    dir: Option<PathBuf>,
    command: CheckpointCommands,
) -> anyhow::Result<()> {
    let config = effective?;
    let store = FileCheckpointStore::new(dir.unwrap_or_else(|| config.checkpoint_dir()));
    debug!("Using checkpoint directory {}", store.storage_path().display());

    match command {
        CheckpointCommands::List => {
            let sessions = store.list().await?;
            if sessions.is_empty() {
                println!("No checkpoints found.");
            } else {
                for session_id in sessions {
                    println!("{}", session_id);
                }
            }
        }
        CheckpointCommands::Show { session_id, json } => {
            let serialized = store
                .load(&session_id)
                .await?
                .with_context(|| format!("No checkpoint found for session {}", session_id))?;
            let state = state::deserialize(&serialized)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                print!("{}", summarize(&state, config.thresholds.max_retries));
            }
        }
        CheckpointCommands::Delete { session_id } => {
            store.delete(&session_id).await?;
            println!("Deleted checkpoint for session {}", session_id);
        }
    }
    Ok(())
}
