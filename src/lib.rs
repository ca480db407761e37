//! Answer Queue - an ordered, retrying submission queue for questionnaire answers.
//!
//! The library exposes [`queue::SubmissionQueue`], which serializes answer
//! submissions to a backend through a [`submit::Submitter`], coalesces
//! duplicate pending answers, and retries failures with a bounded budget.

pub mod answers;
pub mod cli;
pub mod config;
pub mod error;
pub mod notify;
pub mod queue;
pub mod submit;
pub mod validation;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::answers::AnswerRecord;
use crate::cli::{Cli, Commands, RunArgs};
use crate::config::hot_reload::{ConfigReloadEvent, ConfigWatcher};
use crate::config::ConfigManager;
use crate::notify::{Metrics, MetricsServer};
use crate::queue::{
    EnqueueOutcome, QueueStats, RejectReason, SubmissionQueue, SubmissionStatus,
};
use crate::submit::{DryRunSubmitter, HttpSubmitter, LaggedSubmitter, Submitter};

/// Runs the tool with the provided CLI arguments.
pub async fn run(cli: Cli) -> Result<()> {
    setup_logging(&log_level(&cli))?;

    match cli.command {
        Commands::Run(args) => run_queue(args, &cli.config).await,
        Commands::ConfigValidate => validate_config(&cli.config),
        Commands::ConfigShow => show_config(&cli.config),
        Commands::Transform {
            question_type,
            answer,
        } => show_transform(&question_type, &answer),
    }
}

/// Level from `-v` flags, else `global.log_level` from the config file, else info.
///
/// `RUST_LOG` still takes precedence over the result.
fn log_level(cli: &Cli) -> String {
    if let Some(level) = cli.verbosity_level() {
        return level.to_string();
    }
    config::loader::load_from_path(&cli.config)
        .map(|config| config.global.log_level.to_lowercase())
        .ok()
        .filter(|level| validation::semantic::VALID_LOG_LEVELS.contains(&level.as_str()))
        .unwrap_or_else(|| "info".to_string())
}

/// Initializes the tracing subscriber for structured logging.
fn setup_logging(level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .json()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Pushes a file of answers through the queue and reports the outcome.
async fn run_queue(args: RunArgs, config_path: &std::path::Path) -> Result<()> {
    info!("Starting answer queue");

    let config_manager = ConfigManager::new(config_path, !args.dry_run)?;
    let config = config_manager.get_config().read().await.clone();
    info!("Configuration loaded and validated");

    let records = answers::load_answers(&args.answers)?;
    info!(count = records.len(), path = ?args.answers, "Answers loaded");

    let metrics = Arc::new(Metrics::new()?);
    if config.global.prometheus.enabled {
        let port = config.global.prometheus.port;
        let metrics_server = MetricsServer::new(metrics.clone(), port);
        tokio::spawn(async move {
            if let Err(e) = metrics_server.start().await {
                error!(error = %e, "Prometheus server failed");
            }
        });
        info!(port, "Prometheus metrics server started");
    }

    let submitter = build_submitter(&config, args.dry_run)?;
    let queue = SubmissionQueue::builder(config.queue.clone(), submitter)
        .event_log(config.event_log.clone())
        .metrics(metrics)
        .build()?;

    // Keeps the file watcher alive for the duration of the run.
    let _watcher = if args.watch_config {
        let (reload_tx, mut reload_rx) = mpsc::channel(10);
        let watcher = ConfigWatcher::new(&config_manager, queue.clone(), reload_tx).start()?;
        tokio::spawn(async move {
            while let Some(event) = reload_rx.recv().await {
                match event {
                    ConfigReloadEvent::Reloaded => info!("Queue settings updated from config"),
                    ConfigReloadEvent::ValidationFailed { message } => {
                        warn!(message = %message, "Configuration reload rejected")
                    }
                }
            }
        });
        info!("Config hot-reload enabled");
        Some(watcher)
    } else {
        None
    };

    let total = records.len();
    let drain = {
        let queue = queue.clone();
        async move {
            let accepted = feed_answers(&queue, records).await;
            queue.wait_idle().await;
            accepted
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            queue.shutdown();
        }
        accepted = drain => {
            info!(accepted, total, "All answers processed");
        }
    }

    let stats = queue.stats();
    print_stats(&stats);

    if let Some(path) = &args.export_log {
        let log = queue.export_log()?;
        std::fs::write(path, log)
            .with_context(|| format!("Failed to write event log to {}", path.display()))?;
        println!("Event log written to {}", path.display());
    }

    info!("Answer queue finished");
    Ok(())
}

/// Picks the submitter for this run, wrapped with lag injection if configured.
fn build_submitter(config: &config::AppConfig, dry_run: bool) -> Result<Box<dyn Submitter>> {
    let base: Box<dyn Submitter> = if dry_run {
        Box::new(DryRunSubmitter)
    } else {
        let endpoint = config
            .backend
            .endpoint
            .clone()
            .context("backend.endpoint is required unless --dry-run is set")?;
        let submitter = HttpSubmitter::new(endpoint);
        info!(endpoint = submitter.endpoint(), "Submitting to backend");
        Box::new(submitter)
    };

    if config.diagnostics.is_active() {
        warn!(
            lag_ms = config.diagnostics.simulated_lag_ms,
            fail_every = config.diagnostics.fail_every,
            "Diagnostic lag/failure injection enabled"
        );
        return Ok(Box::new(LaggedSubmitter::from_config(
            base,
            &config.diagnostics,
        )));
    }

    Ok(base)
}

/// Offers every answer in order, waiting out back-pressure. Returns how many were accepted.
async fn feed_answers(queue: &SubmissionQueue, records: Vec<AnswerRecord>) -> usize {
    let mut accepted = 0;
    for record in records {
        if offer(queue, record).await {
            accepted += 1;
        }
    }
    accepted
}

/// Re-offers a rejected answer once the condition that refused it clears.
async fn offer(queue: &SubmissionQueue, record: AnswerRecord) -> bool {
    let mut rx = queue.subscribe();
    loop {
        let outcome = queue.try_enqueue(
            record.question_id.clone(),
            record.answer.clone(),
            record.metadata.clone(),
        );

        let waited = match outcome {
            EnqueueOutcome::Rejected(RejectReason::ShutDown) => return false,
            EnqueueOutcome::Rejected(RejectReason::QueueFull) => {
                let capacity = queue.config().max_queue_size;
                rx.wait_for(|s| s.is_shut_down || s.queue_length < capacity)
                    .await
                    .is_ok()
            }
            EnqueueOutcome::Rejected(RejectReason::InFlight) => {
                let question_id = record.question_id.clone();
                rx.wait_for(|s| {
                    s.is_shut_down
                        || s.statuses.get(&question_id) != Some(&SubmissionStatus::Processing)
                })
                .await
                .is_ok()
            }
            EnqueueOutcome::Accepted { .. } | EnqueueOutcome::Replaced { .. } => return true,
        };

        if !waited {
            return false;
        }
    }
}

fn print_stats(stats: &QueueStats) {
    println!("Queue statistics:");
    println!("  Submitted:       {}", stats.total_processed);
    println!("  Failed:          {}", stats.total_errors);
    println!("  Retries:         {}", stats.total_retries);
    println!("  Still queued:    {}", stats.current_queue_length);
    for (status, count) in &stats.processing_state_counts {
        println!("  {:<16} {}", format!("{}:", status), count);
    }
}

/// Validates the configuration file and reports any issues.
fn validate_config(config_path: &std::path::Path) -> Result<()> {
    let config = config::loader::load_and_validate(config_path, false)?;

    println!("Configuration is valid.");
    println!(
        "Queue: max_retries={}, max_queue_size={}, inter_item_delay={:?}, retry_delay={:?}",
        config.queue.max_retries,
        config.queue.max_queue_size,
        config.queue.inter_item_delay(),
        config.queue.retry_delay(),
    );
    match &config.backend.endpoint {
        Some(endpoint) => println!("Backend: {}", endpoint),
        None => println!("Backend: none configured (dry runs only)"),
    }

    Ok(())
}

/// Displays the parsed configuration.
fn show_config(config_path: &std::path::Path) -> Result<()> {
    let config = config::loader::load_and_validate(config_path, false)?;
    let yaml = serde_yaml::to_string(&config)?;
    println!("{}", yaml);
    Ok(())
}

/// Prints the encoded form of an answer.
fn show_transform(question_type: &str, raw: &str) -> Result<()> {
    // Bare words are taken as strings so `--answer si` works without quoting.
    let answer: Value =
        serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    let question_type = queue::QuestionType::parse(question_type);
    let transformed = queue::transform_answer(&question_type, &answer);

    println!("{}", serde_json::to_string(&transformed.value)?);
    if let Some(coercion) = transformed.coercion {
        println!("note: {}", coercion);
    }
    Ok(())
}
