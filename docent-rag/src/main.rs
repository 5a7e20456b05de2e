use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docent_rag::{RagConfig, RagService, StatusReport};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

/// Answer questions from your own documents.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML); falls back to $DOCENT_CONFIG
    #[arg(short, long, env = "DOCENT_CONFIG")]
    config: Option<PathBuf>,

    /// Override the index base path from the configuration
    #[arg(short, long)]
    index: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add or update documents in the index
    Ingest {
        /// Text, Markdown, HTML or PDF files, or directories to walk for them
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Ask a question
    Ask {
        question: String,
        /// Number of passages to answer from
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Also print the supporting passages
        #[arg(long)]
        show_passages: bool,
    },
    /// Show index and backend status
    Status {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Re-embed every stored document with the configured embedder
    Rebuild,
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    let mut config = RagConfig::load(args.config.as_deref()).context("invalid configuration")?;
    if let Some(index) = args.index {
        config = config.with_index_path(index);
    }

    match args.command {
        Commands::Ingest { paths } => {
            let service = RagService::start_indexing(config).await?;
            let reports = service.ingest_paths(&paths).await;

            let mut failed = 0;
            for report in &reports {
                match &report.result {
                    Ok(outcome) => println!("{}: {}", report.source, describe(outcome)),
                    Err(e) => {
                        failed += 1;
                        println!("{}: failed [{}] {}", report.source, e.code(), e);
                    }
                }
            }
            service.shutdown().await?;
            if failed > 0 {
                anyhow::bail!("{failed} of {} documents failed", reports.len());
            }
            Ok(())
        }
        Commands::Ask {
            question,
            top_k,
            show_passages,
        } => {
            let service = RagService::start(config).await?;
            let k = top_k.unwrap_or(service.config().retrieval.top_k);

            if show_passages {
                let passages = service.retrieve(&question, k).await?;
                for (rank, hit) in passages.iter().enumerate() {
                    println!("[{}] {} (score {:.3})", rank + 1, hit.chunk_id(), hit.score);
                }
                println!();
            }

            let answer = service
                .query_with_k(&question, k)
                .await
                .context("failed to answer")?;
            println!("{}", answer.text);
            if !answer.citations.is_empty() {
                println!("\nSources: {}", answer.citations.join(", "));
            }
            Ok(())
        }
        Commands::Status { format } => {
            let status = RagService::stored_status(&config).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
                OutputFormat::Summary => print_status(&status),
            }
            Ok(())
        }
        Commands::Rebuild => {
            let (service, summary) = RagService::start_reembedding(config).await?;
            println!(
                "Re-embedded {} documents into {} passages",
                summary.documents, summary.chunks
            );
            service.shutdown().await?;
            Ok(())
        }
    }
}

fn describe(outcome: &docent_retriever::IngestOutcome) -> String {
    use docent_retriever::IngestOutcome;
    match outcome {
        IngestOutcome::Added { chunks } => format!("added {chunks} passages"),
        IngestOutcome::Unchanged => "unchanged".to_string(),
        IngestOutcome::Replaced { chunks, removed } => {
            format!("replaced {removed} passages with {chunks}")
        }
    }
}

fn print_status(status: &StatusReport) {
    println!("docent status");
    println!("=============");
    println!("Index:      {}", status.index_path.display());
    println!(
        "Contents:   {} passages from {} documents",
        status.entries, status.documents
    );
    println!(
        "Vectors:    {} dimensions, {} similarity",
        status.dimension, status.metric
    );
    println!(
        "Embedder:   {} ({})",
        status.embedding_backend, status.embedder
    );
    if let Some(generator) = &status.generator {
        println!("Generator:  {generator}");
    }
    println!(
        "Chunking:   {} chars, {} overlap",
        status.chunking.max_size, status.chunking.overlap
    );
    println!(
        "Retrieval:  top {}{}",
        status.top_k,
        if status.rerank { ", reranked" } else { "" }
    );
}
