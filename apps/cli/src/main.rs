//! Bhasha CLI - English to Nepali translation with cached model pipelines
//!
//! This CLI provides a `bhasha` command that translates text, checks it with
//! a sentiment-based heuristic, and offers an interactive shell that keeps
//! loaded pipelines warm between requests.

mod commands;

use anyhow::{Context, Result};
use bhasha_pipelines::{BackendKind, LanguageService, default_config_path, load_config};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use commands::{check, shell, translate};

/// Bhasha CLI - English to Nepali translation
#[derive(Parser, Debug)]
#[command(
    name = "bhasha",
    author,
    version,
    about = "Bhasha - English to Nepali translation with cached model pipelines",
    long_about = "Bhasha translates English text to Nepali using model-serving backends.\nLoaded pipelines are cached, failing models fall back to smaller candidates, and a word list answers when no model is available."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Workspace directory containing .bhasha/config.toml (defaults to the current directory)
    #[arg(short = 'w', long, global = true)]
    workspace: Option<PathBuf>,

    /// Pipeline backend (mock, http), overriding the config file
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Model server base URL, overriding the config file
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Translate text
    ///
    /// Uses the first translation model that loads. When none can be loaded
    /// the built-in word list is used and a note is printed.
    Translate {
        /// Text to translate
        text: String,

        /// Source language code (defaults to the model's own)
        #[arg(long)]
        src: Option<String>,

        /// Target language code (defaults to the model's own)
        #[arg(long)]
        tgt: Option<String>,

        /// Output the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check text for likely problems
    ///
    /// Runs the sentiment classifier as a heuristic. Negative or strongly
    /// scored text is flagged.
    Check {
        /// Text to check
        text: String,

        /// Output the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start an interactive shell
    ///
    /// Plain lines are translated. Commands start with ':' (type :help).
    Shell,
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .with_context(|| format!("Invalid log level: {}", log_level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let workspace = match args.workspace {
        Some(path) => path,
        None => std::env::current_dir().context("Failed to determine current directory")?,
    };

    let mut config = load_config(&workspace).with_context(|| {
        format!("Failed to load {}", default_config_path(&workspace).display())
    })?;
    if let Some(ref backend) = args.backend {
        config.backend.kind = backend.parse::<BackendKind>()?;
    }
    if let Some(base_url) = args.base_url {
        config.backend.base_url = base_url;
    }
    debug!(workspace = %workspace.display(), backend = %config.backend.kind, "Configuration loaded");

    let service = LanguageService::from_config(&config, &workspace)?;
    service.cache().start_sweeper();

    let result = match args.command {
        Command::Translate { text, src, tgt, json } => {
            translate::execute(&service, &text, src.as_deref(), tgt.as_deref(), json).await
        }
        Command::Check { text, json } => check::execute(&service, &text, json).await,
        Command::Shell => shell::execute(&service).await,
    };

    service.shutdown();
    result
}
