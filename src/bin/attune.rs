//! Attune CLI
//!
//! Commands:
//! - run: bootstrap baselines, then stream NDJSON ingest messages from stdin
//! - validate: load and validate a configuration file
//! - wiring: print the parameter -> {topic: weight} influence table
//! - sample-config: print the reference study configuration

use clap::{Parser, Subcommand};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;

use attune::bootstrap::{bootstrap, ExperienceSource, HttpExperienceSource};
use attune::config::{EngineConfig, REFERENCE_CONFIG};
use attune::dispatch::HttpActuationClient;
use attune::engine::Engine;
use attune::error::EngineError;
use attune::types::IngestMessage;
use attune::ATTUNE_VERSION;
use chrono::Utc;
use tracing::{error, info, warn};

/// Attune - adaptive behavior engine for human-robot interaction
#[derive(Parser)]
#[command(name = "attune")]
#[command(version = ATTUNE_VERSION)]
#[command(about = "Fuse sensor streams into rate-limited actuation decisions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bootstrap baselines, then process NDJSON ingest messages from stdin
    Run {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,

        /// Skip the baseline bootstrap push
        #[arg(long)]
        skip_bootstrap: bool,

        /// Operator identifier forwarded to the experience estimator
        #[arg(long)]
        operator: Option<String>,
    },

    /// Load and validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print the parameter -> {topic: weight} influence table as JSON
    Wiring {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print the reference study configuration
    SampleConfig,
}

/// Placeholder source for configurations without an estimate endpoint.
struct NoEstimateSource;

impl ExperienceSource for NoEstimateSource {
    fn experience_score(&self) -> Result<i64, EngineError> {
        Err(EngineError::ExperienceUnavailable(
            "no estimate_url configured".to_string(),
        ))
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "fatal");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), EngineError> {
    match cli.command {
        Commands::Run {
            config,
            skip_bootstrap,
            operator,
        } => cmd_run(&config, skip_bootstrap, operator),
        Commands::Validate { config } => cmd_validate(&config),
        Commands::Wiring { config } => cmd_wiring(&config),
        Commands::SampleConfig => {
            print!("{}", REFERENCE_CONFIG.trim_start());
            Ok(())
        }
    }
}

fn cmd_run(
    config_path: &PathBuf,
    skip_bootstrap: bool,
    operator: Option<String>,
) -> Result<(), EngineError> {
    let config = EngineConfig::from_toml_file(config_path)?;
    let client = HttpActuationClient::new();

    if skip_bootstrap {
        info!("baseline bootstrap skipped");
    } else {
        let params = match &config.bootstrap.estimate_url {
            Some(url) => bootstrap(
                &config.bootstrap,
                &HttpExperienceSource::new(url.clone(), operator),
                &client,
            )?,
            None => bootstrap(&config.bootstrap, &NoEstimateSource, &client)?,
        };
        info!(?params, "baselines established");
    }

    let mut engine = Engine::from_config(config)?;
    info!(instance_id = %engine.instance_id(), "engine ready, reading NDJSON from stdin");

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<IngestMessage>(&line) {
            Ok(message) => {
                let topic = message.topic.clone();
                let outcome = engine.ingest(message, Utc::now(), &client);
                info!(%topic, ?outcome, "message ingested");
            }
            Err(e) => {
                // Malformed transport input is logged and skipped; the
                // stream keeps flowing
                warn!(error = %e, "unparseable ingest message");
            }
        }
    }

    let snapshot = engine.snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn cmd_validate(config_path: &PathBuf) -> Result<(), EngineError> {
    let config = EngineConfig::from_toml_file(config_path)?;
    println!(
        "configuration valid: {} producers, {} modalities, debounce {}s",
        config.producers.len(),
        config.modalities.len(),
        config.debounce_interval,
    );
    Ok(())
}

fn cmd_wiring(config_path: &PathBuf) -> Result<(), EngineError> {
    let config = EngineConfig::from_toml_file(config_path)?;
    let engine = Engine::from_config(config)?;
    println!("{}", serde_json::to_string_pretty(&engine.wiring())?);
    Ok(())
}
