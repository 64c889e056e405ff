//! `recall`: ingest chat history into a local knowledge base and query it.

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::Context as _,
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::EnvFilter,
};

use {
    recall_embeddings::{EmbeddingCoordinator, EmbeddingProvider, OpenAiEmbeddingProvider},
    recall_ingest::{ExportConfig, InclusionPolicy, Ingestor, LiveRecord},
    recall_retrieval::{ContextOptions, Retriever, SearchOptions},
    recall_store::{ContentStore, SqliteContentStore},
};

#[derive(Parser)]
#[command(name = "recall")]
#[command(version)]
#[command(about = "Personal RAG knowledge base over chat history")]
struct Cli {
    /// SQLite database path
    #[arg(long, env = "RECALL_DB", default_value = "recall.db")]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a plain-text chat export transcript
    IngestExport {
        /// Transcript file
        file: PathBuf,

        /// Chat name the transcript belongs to
        #[arg(long)]
        chat: String,

        /// Sender name treated as the owner's own messages
        #[arg(long)]
        self_name: Option<String>,

        /// Only index the owner's own messages
        #[arg(long)]
        outbound_only: bool,
    },

    /// Ingest session logs (a .jsonl file or a directory of them)
    IngestSessions {
        path: PathBuf,

        #[arg(long)]
        outbound_only: bool,
    },

    /// Ingest a JSON file holding an array of buffered bridge records
    IngestLive {
        file: PathBuf,

        #[arg(long)]
        outbound_only: bool,
    },

    /// Embed every knowledge record still missing an embedding
    Backfill {
        /// Records per embedding request
        #[arg(long, default_value_t = 10)]
        batch_size: i64,
    },

    /// Similarity search over the knowledge base
    Search {
        query: String,

        #[arg(long, default_value_t = 5)]
        limit: usize,

        #[arg(long, default_value_t = 0.7)]
        threshold: f32,
    },

    /// Assemble a token-budgeted context block for a query
    Context {
        query: String,

        #[arg(long, default_value_t = 2000)]
        max_tokens: usize,

        #[arg(long, default_value_t = 0.7)]
        threshold: f32,
    },

    /// Show row counts and embedding progress
    Status,
}

fn provider_from_env() -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let api_key = std::env::var("EMBEDDINGS_API_KEY")
        .context("EMBEDDINGS_API_KEY is not set")?;
    let mut provider = OpenAiEmbeddingProvider::new(api_key);
    if let Ok(base_url) = std::env::var("EMBEDDINGS_BASE_URL") {
        provider = provider.with_base_url(base_url);
    }
    if let Ok(model) = std::env::var("EMBEDDINGS_MODEL") {
        let dims = std::env::var("EMBEDDINGS_DIMENSIONS")
            .ok()
            .and_then(|d| d.parse().ok())
            .unwrap_or(1536);
        provider = provider.with_model(model, dims);
    }
    Ok(Arc::new(provider))
}

fn ingestor(store: Arc<dyn ContentStore>, outbound_only: bool) -> Ingestor {
    Ingestor::new(store).with_policy(InclusionPolicy { outbound_only })
}

fn print_report(report: &recall_common::IngestReport) {
    println!(
        "processed {}  skipped {}  errors {}",
        report.processed, report.skipped, report.errors
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let store: Arc<SqliteContentStore> = Arc::new(SqliteContentStore::open(&cli.db).await?);

    match cli.command {
        Commands::IngestExport {
            file,
            chat,
            self_name,
            outbound_only,
        } => {
            let mut config = ExportConfig::new(&chat);
            if let Some(name) = self_name {
                config = config.with_self_name(&name);
            }
            let report = ingestor(store, outbound_only)
                .ingest_export_file(&file, &config)
                .await?;
            print_report(&report);
        },

        Commands::IngestSessions {
            path,
            outbound_only,
        } => {
            let ingestor = ingestor(store, outbound_only);
            let report = if path.is_dir() {
                ingestor.ingest_session_dir(&path).await?
            } else {
                ingestor.ingest_session_file(&path).await?
            };
            print_report(&report);
        },

        Commands::IngestLive {
            file,
            outbound_only,
        } => {
            let text = tokio::fs::read_to_string(&file).await?;
            let records: Vec<LiveRecord> =
                serde_json::from_str(&text).context("live buffer file is not a JSON array")?;
            let report = ingestor(store, outbound_only).ingest_live(records).await?;
            print_report(&report);
        },

        Commands::Backfill { batch_size } => {
            let coordinator = EmbeddingCoordinator::new(store, provider_from_env()?)
                .with_batch_size(batch_size);
            let report = coordinator.backfill().await?;
            match &report.error {
                None => println!("embedded {} records", report.processed),
                Some(err) => println!(
                    "embedded {} records, then a batch failed: {err}",
                    report.processed
                ),
            }
        },

        Commands::Search {
            query,
            limit,
            threshold,
        } => {
            let retriever = Retriever::new(store, provider_from_env()?);
            let hits = retriever
                .search(
                    &query,
                    &SearchOptions {
                        limit,
                        threshold,
                        source_types: None,
                    },
                )
                .await?;
            if hits.is_empty() {
                println!("no matches");
            }
            for hit in hits {
                println!(
                    "[{:.3}] ({}) {}",
                    hit.similarity, hit.record.source_type, hit.record.processed_content
                );
            }
        },

        Commands::Context {
            query,
            max_tokens,
            threshold,
        } => {
            let retriever = Retriever::new(store, provider_from_env()?);
            let context = retriever
                .get_context(
                    &query,
                    &ContextOptions {
                        max_tokens,
                        threshold,
                        ..ContextOptions::default()
                    },
                )
                .await?;
            info!(sources = context.sources.len(), "context assembled");
            println!("{}", context.text);
        },

        Commands::Status => {
            let counts = store.counts().await?;
            println!("messages:  {}", counts.messages);
            println!("knowledge: {}", counts.knowledge);
            println!("embedded:  {}", counts.embedded);
            println!("pending:   {}", counts.pending);
            println!("chats:     {}", counts.chats);
        },
    }

    Ok(())
}
