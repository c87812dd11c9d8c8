//! HR RAG Assistant CLI - main entry point
//!
//! Unified interface for serving the agent endpoint, asking one-shot
//! questions, ingesting documents and curating the knowledge graph.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use hr_rag_agent::{commands, metrics};
use tracing::warn;

#[derive(Parser)]
#[command(name = "hr_rag_agent")]
#[command(about = "HR & German labor-law RAG assistant", long_about = None)]
#[command(version)]
struct Cli {
    /// Address to expose Prometheus metrics (e.g., 0.0.0.0:9898)
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP/WebSocket agent endpoint
    Serve {
        /// Bind host (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Ask the agent a single question
    Ask {
        /// The question to answer
        question: String,

        /// User id for personal memories
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Ingest text files into the knowledge store
    Ingest {
        /// Single text file to ingest
        #[arg(long, conflicts_with = "directory")]
        file: Option<PathBuf>,

        /// Directory containing text files to ingest
        #[arg(long)]
        directory: Option<PathBuf>,

        /// File pattern to match (default: *.txt)
        #[arg(long, default_value = "*.txt")]
        pattern: String,
    },

    /// Find near-duplicate entities and merge them
    Curate {
        /// Similarity metric: cosine | euclidean | manhattan | correlation | jaccard
        #[arg(short, long, default_value = "cosine")]
        metric: String,

        /// Reporting threshold for candidate pairs
        #[arg(short, long, default_value_t = 0.8)]
        threshold: f32,

        /// Merge threshold (pairs at or above it are merged)
        #[arg(long, default_value_t = 0.9)]
        merge_threshold: f32,

        /// Only report candidate pairs, merge nothing
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Write the per-pair outcome report to a CSV file
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Serve { .. } => "serve",
            Commands::Ask { .. } => "ask",
            Commands::Ingest { .. } => "ingest",
            Commands::Curate { .. } => "curate",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for local development
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("hr_rag_agent=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr.as_deref() {
        match addr.parse::<SocketAddr>() {
            Ok(socket) => metrics::spawn_metrics_server(socket),
            Err(err) => warn!(%addr, "Invalid metrics address: {}", err),
        }
    }

    let command_name = cli.command.name();
    metrics::record_command_start(command_name);
    let start = Instant::now();

    let result = execute_command(cli.command).await;

    metrics::record_command_result(command_name, start.elapsed(), result.is_ok());

    result
}

async fn execute_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Serve { host, port } => {
            commands::serve::run(host, port).await?;
        }
        Commands::Ask { question, user } => {
            commands::ask::run(&question, user).await?;
        }
        Commands::Ingest {
            file,
            directory,
            pattern,
        } => {
            commands::ingest::run(file, directory, &pattern).await?;
        }
        Commands::Curate {
            metric,
            threshold,
            merge_threshold,
            dry_run,
            report,
        } => {
            commands::curate::run(commands::curate::CurateArgs {
                metric,
                threshold,
                merge_threshold,
                dry_run,
                report,
            })
            .await?;
        }
    }

    Ok(())
}
