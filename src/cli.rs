//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Endpoint failure detector
#[derive(Parser, Debug)]
#[command(name = "failure-detector")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "FAILURE_DETECTOR_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "FAILURE_DETECTOR_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "FAILURE_DETECTOR_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Feed random probe outcomes through the detector and print the verdicts
    Simulate {
        /// Number of samples to submit
        #[arg(long, default_value_t = 100_000)]
        samples: usize,

        /// Endpoints per service
        #[arg(long, default_value_t = 3)]
        endpoints: u8,

        /// Number of services
        #[arg(long, default_value_t = 1)]
        services: usize,

        /// Probability that a sample is an error (0.0-1.0)
        #[arg(long, default_value_t = 0.5)]
        error_rate: f64,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Print the effective configuration
    Config,
}

/// Output format for printed snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Text,
    /// JSON document
    Json,
}
