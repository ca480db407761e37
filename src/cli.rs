//! Command-line interface definitions.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// An ordered, retrying submission queue for questionnaire answers.
#[derive(Parser, Debug)]
#[command(name = "answer-queue", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "/config/answer-queue.yaml", env = "CONFIG_PATH", global = true)]
    pub config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Log level requested with `-v` flags, if any.
    pub fn verbosity_level(&self) -> Option<&'static str> {
        match self.verbose {
            0 => None,
            1 => Some("debug"),
            _ => Some("trace"),
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit a file of answers through the queue.
    Run(RunArgs),

    /// Validate the configuration file without starting.
    #[command(name = "config-validate")]
    ConfigValidate,

    /// Display the parsed configuration.
    #[command(name = "config-show")]
    ConfigShow,

    /// Show how an answer is encoded for a question type.
    Transform {
        /// Question type name (e.g. binaria, numerica, checkbox).
        #[arg(short = 't', long)]
        question_type: String,

        /// Raw answer as JSON (e.g. '"si"', '12.5', '["a","b"]').
        #[arg(short, long)]
        answer: String,
    },
}

/// Arguments for the run subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// JSON-lines file with one answer per line.
    #[arg(short, long)]
    pub answers: PathBuf,

    /// Accept every submission locally instead of calling the backend.
    #[arg(long, default_value = "false")]
    pub dry_run: bool,

    /// Write the event log as JSON to this file when done.
    #[arg(long)]
    pub export_log: Option<PathBuf>,

    /// Apply config file edits to the running queue.
    #[arg(long, default_value = "false")]
    pub watch_config: bool,
}
