//! # Efiko CLI (`efiko`)
//!
//! ## Usage
//!
//! ```bash
//! efiko --config ./config/efiko.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `efiko serve` | Start the HTTP API |
//! | `efiko ingest <file>` | Ingest a document and print its index handle |
//! | `efiko chat "<message>"` | Run one chat turn against the configured model |
//! | `efiko export <transcript.json> -o <out.pdf>` | Render a transcript to PDF |
//!
//! Log verbosity follows `RUST_LOG` (default `info`). Logs and ingest
//! progress go to stderr; command output goes to stdout.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use efiko::config::{self, Config};
use efiko::progress::ProgressMode;
use efiko::{export, ingest, orchestrator, server};

const DEFAULT_CONFIG: &str = "./config/efiko.toml";

/// Efiko, an AI study companion.
#[derive(Parser)]
#[command(name = "efiko", version, about = "Efiko, an AI study companion")]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// When the default path does not exist, built-in defaults are used.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API.
    Serve,

    /// Ingest a PDF, DOCX or TXT file into an in-process index.
    ///
    /// Prints the index handle and chunk count. The index lives only for
    /// the duration of the command; use `chat --document` to ask about a
    /// file from the command line.
    Ingest {
        /// File to ingest.
        file: PathBuf,

        /// Progress output on stderr. Defaults to `human` when stderr is a
        /// terminal, otherwise `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },

    /// Send one message to Efiko and print the reply.
    Chat {
        message: String,

        /// Ground the reply in this document.
        #[arg(long)]
        document: Option<PathBuf>,
    },

    /// Render a JSON transcript to PDF.
    Export {
        /// JSON array of `{ "role", "content" }` turns.
        transcript: PathBuf,

        /// Output PDF path.
        #[arg(short, long, default_value = "chat.pdf")]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

fn load(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG) {
        tracing::info!(path = %path.display(), "config file not found; using defaults");
        return Ok(Config::default());
    }
    config::load_config(path)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Export needs no configuration.
    if let Commands::Export { transcript, output } = &cli.command {
        return export::run_export(transcript, output);
    }

    let cfg = load(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ingest { file, progress } => {
            let mode = progress
                .map(ProgressMode::from)
                .unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_ingest(&cfg, &file, mode).await?;
        }
        Commands::Chat { message, document } => {
            orchestrator::run_chat(&cfg, &message, document.as_deref()).await?;
        }
        Commands::Export { .. } => unreachable!("handled before config loading"),
    }

    Ok(())
}
