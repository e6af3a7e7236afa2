//! # tessera CLI
//!
//! Command-line interface for tessera, a content-aware chunking and caching
//! layer for hierarchical design documents.
//!
//! ## Commands
//!
//! - `tessera ingest <FILE> --file-key <KEY>` - chunk a document and persist it
//! - `tessera fetch <CHUNK_ID>` - resolve one chunk from storage
//! - `tessera list [--file-key <KEY>] [--chunk-type <TYPE>]` - list stored chunks
//! - `tessera cleanup` - evict every expired chunk
//! - `tessera config show|init|path` - manage configuration
//!
//! ## Examples
//!
//! ```bash
//! # Ingest a design document export
//! tessera ingest design.json --file-key my-file
//!
//! # Fetch the primary chunk, then follow nextChunkId
//! tessera fetch my-file:node:root --format json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use tessera::config::Config;
use tessera::service::DocumentService;
use tessera_chunker::Chunker;
use tessera_core::{id, ChunkFilter, ChunkType, StorageAdapter};

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Content-aware chunking and caching for design documents")]
#[command(version)]
struct Cli {
    /// Path to config file (default: ~/.config/tessera/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk a document file and persist every chunk
    Ingest {
        /// JSON document to ingest
        file: PathBuf,

        /// Source document identifier
        #[arg(short = 'k', long)]
        file_key: String,

        /// Override the auto-detected chunk type
        #[arg(short = 't', long)]
        chunk_type: Option<String>,
    },

    /// Fetch a chunk by id
    Fetch {
        /// Chunk id (`fileKey:type:identifier`)
        chunk_id: String,
    },

    /// List stored chunks
    List {
        /// Restrict to one source document
        #[arg(short = 'k', long)]
        file_key: Option<String>,

        /// Restrict to one chunk type
        #[arg(short = 't', long)]
        chunk_type: Option<String>,

        /// Maximum rows
        #[arg(short, long, default_value = "100")]
        limit: usize,
    },

    /// Evict every expired chunk
    Cleanup,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Print sample configuration file
    Init,
    /// Show config file path
    Path,
}

fn parse_chunk_type(raw: &str) -> Result<ChunkType> {
    raw.parse::<ChunkType>()
        .with_context(|| format!("invalid chunk type: {raw}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let config = if let Some(ref path) = cli.config {
        Config::load_from(Some(path.clone()))
            .with_context(|| format!("Failed to load config from {}", path.display()))?
    } else {
        Config::load().context("Failed to load config")?
    };

    match cli.command {
        Commands::Ingest {
            file,
            file_key,
            chunk_type,
        } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let data: Value =
                serde_json::from_str(&raw).context("Input is not valid JSON")?;
            let type_hint = chunk_type.as_deref().map(parse_chunk_type).transpose()?;

            let storage = config.build_adapter().await?;
            let chunker = Chunker::new(config.chunker.clone());
            let service = DocumentService::new(chunker, storage);

            let summary = service.ingest(&data, &file_key, type_hint).await?;

            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
                OutputFormat::Text => {
                    println!("Ingested {} as {} chunks", file_key, summary.total_chunks);
                    println!("  Primary: {}", summary.first_chunk_id);
                    for outline in &summary.structure_summary {
                        println!(
                            "  {} ({}, {} B)",
                            outline.id, outline.chunk_type, outline.size
                        );
                    }
                }
            }
        }

        Commands::Fetch { chunk_id } => {
            let parsed = id::parse(&chunk_id).context("Invalid chunk id")?;

            let storage = config.build_adapter().await?;
            let chunker = Chunker::new(config.chunker.clone());
            let service = DocumentService::new(chunker, storage);

            match service.fetch(&parsed.file_key, &chunk_id).await? {
                None => {
                    match cli.format {
                        OutputFormat::Json => println!("{}", serde_json::json!({"found": false})),
                        OutputFormat::Text => println!("Chunk not found: {chunk_id}"),
                    }
                    std::process::exit(1);
                }
                Some(result) => match cli.format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
                    OutputFormat::Text => {
                        println!("Chunk {}", result.chunk_id);
                        println!("  File:  {} ({} chunks)", result.file_key, result.total_chunks);
                        if let Some(next) = &result.next_chunk_id {
                            println!("  Next:  {next}");
                        }
                        if let Some(metadata) = &result.metadata {
                            println!("  Metadata: {}", serde_json::to_string(metadata)?);
                        }
                        if let Some(vars) = &result.global_vars {
                            println!("  Global vars: {}", serde_json::to_string(vars)?);
                        }
                        for node in &result.nodes {
                            println!("  Node: {}", serde_json::to_string(node)?);
                        }
                    }
                },
            }
        }

        Commands::List {
            file_key,
            chunk_type,
            limit,
        } => {
            let chunk_type = chunk_type.as_deref().map(parse_chunk_type).transpose()?;
            let filter = ChunkFilter {
                file_key,
                chunk_type,
                limit,
                ..Default::default()
            };

            let storage = config.build_adapter().await?;
            let summaries = storage
                .list(Some(filter))
                .await
                .map_err(tessera_core::Error::from)?;

            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summaries)?),
                OutputFormat::Text => {
                    if summaries.is_empty() {
                        println!("No chunks found.");
                    } else {
                        for summary in &summaries {
                            println!(
                                "{}  {}  {} B  {}",
                                summary.id,
                                summary.chunk_type,
                                summary.size,
                                summary.created.format("%Y-%m-%d %H:%M:%S")
                            );
                        }
                    }
                }
            }
        }

        Commands::Cleanup => {
            let storage = config.build_adapter().await?;
            let evicted = storage.cleanup().await.map_err(tessera_core::Error::from)?;
            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({"evicted": evicted}));
                }
                OutputFormat::Text => println!("Evicted {evicted} expired chunks"),
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => match cli.format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&config)
                            .context("Failed to serialize config")?
                    );
                }
                OutputFormat::Text => {
                    println!(
                        "{}",
                        toml::to_string_pretty(&config).context("Failed to serialize config")?
                    );
                }
            },
            ConfigAction::Init => println!("{}", Config::sample_toml()),
            ConfigAction::Path => {
                if let Some(path) = Config::config_path() {
                    println!("{}", path.display());
                } else {
                    println!("Could not determine config directory");
                }
            }
        },
    }

    Ok(())
}
