//! # ragchat CLI
//!
//! ## Usage
//!
//! ```bash
//! ragchat --config ./config/ragchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragchat chat` | Interactive chat and ingestion session |
//! | `ragchat ask "<query>"` | Ask one question |
//! | `ragchat ingest --text/--file` | Ingest one document |
//! | `ragchat stats` | Show metadata keys and values for a namespace |
//! | `ragchat health` | Probe the backend |
//! | `ragchat completions <shell>` | Print shell completions |

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use ragchat::ask::{self, IngestSource};
use ragchat::config::{self, Config};
use ragchat::http::HttpBackend;
use ragchat::render::OutputMode;
use ragchat::repl;
use ragchat::session::SessionOptions;
use ragchat::stats;

/// ragchat: chat with your documents through a RAG backend.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults.
#[derive(Parser)]
#[command(
    name = "ragchat",
    about = "ragchat: chat with a RAG backend and ingest documents into namespaces",
    version,
    long_about = "ragchat talks to a retrieval-augmented generation service: ask questions within \
    a namespace, narrow answers with metadata filters, and ingest pasted text or files with \
    editable metadata."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragchat.toml")]
    config: PathBuf,

    /// Namespace to work in, overriding `session.default_namespace`.
    #[arg(long, short = 'n', global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive session.
    ///
    /// Type questions to chat; lines starting with `/` are commands
    /// (`/help` lists them).
    Chat,

    /// Ask a single question and print the answer with its sources.
    Ask {
        /// The question.
        query: String,

        /// Metadata filter as `key=value`; repeatable.
        #[arg(long = "filter", value_parser = parse_key_val)]
        filters: Vec<(String, String)>,

        /// Print the answer as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Ingest one document into the namespace.
    Ingest {
        /// Document text.
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        text: Option<String>,

        /// File to upload.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Extra metadata as `key=value`; repeatable. Added after
        /// `source=<default_source>`, so `--meta source=x` overrides it.
        #[arg(long = "meta", value_parser = parse_key_val)]
        meta: Vec<(String, String)>,
    },

    /// Show metadata keys and observed values for the namespace.
    Stats {
        /// Print the raw stats as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Check that the backend is reachable.
    Health,

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: clap_complete::Shell,
    },
}

/// Parse a `key=value` pair for `--filter` and `--meta` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "ragchat", &mut std::io::stdout());
        return Ok(());
    }

    let mut cfg: Config = config::load_config(&cli.config)?;
    if let Some(ns) = &cli.namespace {
        cfg.session.default_namespace = ns.clone();
        cfg.validate()?;
    }

    let backend = Arc::new(HttpBackend::new(&cfg.backend).context("Failed to build HTTP client")?);
    let options = SessionOptions::from_config(&cfg);

    match cli.command {
        Commands::Chat => {
            repl::run_repl(backend, options, OutputMode::default_for_tty()).await?;
        }
        Commands::Ask {
            query,
            filters,
            json,
        } => {
            let mode = if json {
                OutputMode::Json
            } else {
                OutputMode::default_for_tty()
            };
            ask::run_ask(backend, options, &query, &filters, mode).await?;
        }
        Commands::Ingest { text, file, meta } => {
            let source = match (&text, &file) {
                (_, Some(path)) => IngestSource::File(path),
                (Some(text), None) => IngestSource::Text(text),
                (None, None) => anyhow::bail!("either --text or --file is required"),
            };
            ask::run_ingest(backend, options, source, &meta, OutputMode::default_for_tty()).await?;
        }
        Commands::Stats { json } => {
            let mode = if json { OutputMode::Json } else { OutputMode::Plain };
            stats::run_stats(backend.as_ref(), &cfg.session.default_namespace, mode).await?;
        }
        Commands::Health => {
            stats::run_health(backend.as_ref(), backend.base_url()).await?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
