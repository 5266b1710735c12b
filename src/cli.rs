//! Command-line interface for the advising API client
//!
//! Global options configure the connection, credentials and retry policy;
//! the subcommand picks the HTTP verb. Retry settings are resolved in order:
//! built-in defaults (or the conservative preset), then a JSON config file,
//! then individual flags.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Method;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::retry::RetryConfig;

/// Main command-line interface structure
///
/// # Examples
///
/// ```
/// use advisor_client::cli::Cli;
/// use clap::Parser;
///
/// let cli = Cli::try_parse_from([
///     "advisor-client", "--max-retries", "2", "get", "/api/programmes",
/// ]).unwrap();
/// assert_eq!(cli.retry_config().unwrap().max_retries, 2);
/// ```
#[derive(Parser)]
#[command(
    name = "advisor-client",
    about = "Call the student advising API with automatic retries",
    version
)]
pub struct Cli {
    /// Request to send
    #[command(subcommand)]
    pub command: Commands,

    /// API base URL; request paths are appended to it
    #[arg(short = 'u', long, default_value = "http://localhost:5000")]
    pub base_url: String,

    /// Per-attempt request timeout in milliseconds
    #[arg(short = 't', long, default_value = "10000")]
    pub timeout_ms: u64,

    /// File holding the bearer token; requests are unauthenticated without it
    #[arg(long)]
    pub token_file: Option<PathBuf>,

    /// JSON file with retry settings (any subset of the RetryConfig fields)
    #[arg(long)]
    pub retry_config: Option<PathBuf>,

    /// Start from the conservative preset (2 retries, 2s base, 10s cap)
    #[arg(long)]
    pub conservative: bool,

    /// Maximum number of retries after the first attempt
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Delay before the first retry in milliseconds
    #[arg(long)]
    pub base_delay_ms: Option<u64>,

    /// Upper bound for any retry delay in milliseconds
    #[arg(long)]
    pub max_delay_ms: Option<u64>,

    /// Jitter factor in [0, 1]
    #[arg(long)]
    pub jitter: Option<f64>,

    /// Additional status code to retry on (repeatable); 429 is always retried
    #[arg(long = "retry-status")]
    pub retry_status: Vec<u16>,

    /// Also retry connection failures and timeouts
    #[arg(long)]
    pub retry_network_errors: bool,

    /// Decode the response body (JSON or text) instead of printing it raw
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Resolves the effective retry configuration
    pub fn retry_config(&self) -> Result<RetryConfig> {
        let mut config = if self.conservative {
            RetryConfig::conservative()
        } else {
            RetryConfig::default()
        };
        if let Some(path) = &self.retry_config {
            RetryConfigFile::load(path)?.apply(&mut config);
        }

        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(base_delay_ms) = self.base_delay_ms {
            config.base_delay_ms = base_delay_ms;
        }
        if let Some(max_delay_ms) = self.max_delay_ms {
            config.max_delay_ms = max_delay_ms;
        }
        if let Some(jitter) = self.jitter {
            config.jitter_factor = jitter;
        }
        config.retryable_status_codes.extend(self.retry_status.iter().copied());
        config.retry_network_errors |= self.retry_network_errors;

        config.validate()?;
        Ok(config)
    }
}

/// Retry settings read from `--retry-config`; absent fields keep the preset
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RetryConfigFile {
    max_retries: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    jitter_factor: Option<f64>,
    retryable_status_codes: Option<BTreeSet<u16>>,
    retry_network_errors: Option<bool>,
}

impl RetryConfigFile {
    fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read retry config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Invalid retry config {}", path.display()))
    }

    fn apply(self, config: &mut RetryConfig) {
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(base_delay_ms) = self.base_delay_ms {
            config.base_delay_ms = base_delay_ms;
        }
        if let Some(max_delay_ms) = self.max_delay_ms {
            config.max_delay_ms = max_delay_ms;
        }
        if let Some(jitter_factor) = self.jitter_factor {
            config.jitter_factor = jitter_factor;
        }
        if let Some(codes) = self.retryable_status_codes {
            config.retryable_status_codes = codes;
        }
        if let Some(retry_network_errors) = self.retry_network_errors {
            config.retry_network_errors = retry_network_errors;
        }
    }
}

/// HTTP verbs supported by the CLI
///
/// # Examples
///
/// ```text
/// advisor-client get /api/programmes
/// advisor-client --token-file ~/.advisor-token post /api/chat --data '{"message":"hi"}'
/// ```
#[derive(Subcommand)]
pub enum Commands {
    /// Send a GET request
    Get { path: String },
    /// Send a DELETE request
    Delete { path: String },
    /// Send a POST request with an optional JSON body
    Post {
        path: String,
        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,
    },
    /// Send a PUT request with an optional JSON body
    Put {
        path: String,
        #[arg(short, long)]
        data: Option<String>,
    },
    /// Send a PATCH request with an optional JSON body
    Patch {
        path: String,
        #[arg(short, long)]
        data: Option<String>,
    },
}

impl Commands {
    pub fn method(&self) -> Method {
        match self {
            Commands::Get { .. } => Method::GET,
            Commands::Delete { .. } => Method::DELETE,
            Commands::Post { .. } => Method::POST,
            Commands::Put { .. } => Method::PUT,
            Commands::Patch { .. } => Method::PATCH,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Commands::Get { path }
            | Commands::Delete { path }
            | Commands::Post { path, .. }
            | Commands::Put { path, .. }
            | Commands::Patch { path, .. } => path,
        }
    }

    pub fn data(&self) -> Option<&str> {
        match self {
            Commands::Post { data, .. } | Commands::Put { data, .. } | Commands::Patch { data, .. } => {
                data.as_deref()
            }
            Commands::Get { .. } | Commands::Delete { .. } => None,
        }
    }
}
