use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use cognisync_indexer::{
    ingest_lock_wait_ms_last, ingest_lock_wait_ms_max, IngestPipeline, IngestStatus, Settings,
};
use cognisync_search::{QueryHit, QueryPipeline};
use cognisync_vector_store::{Embedder, StubEmbedder};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

mod logging;

#[derive(Parser)]
#[command(name = "cognisync")]
#[command(about = "Document ingestion and semantic retrieval", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding the index and mapping (overrides COGNISYNC_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// TOML settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Also append log records to this file (overrides COGNISYNC_LOG_FILE)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a file or every file below a directory
    Ingest(IngestArgs),

    /// Retrieve the documents most relevant to a question
    Query(QueryArgs),

    /// Report the consistency of the stored index and mapping
    Check,
}

#[derive(Args)]
struct IngestArgs {
    /// File or directory to ingest
    path: PathBuf,
}

#[derive(Args)]
struct QueryArgs {
    /// Question text
    text: String,

    /// Number of neighbours to retrieve
    #[arg(short = 'k', long)]
    top_k: Option<usize>,

    /// Minimum similarity a result must reach
    #[arg(long)]
    threshold: Option<f32>,

    /// Include the concatenated source text of the results
    #[arg(long)]
    with_content: bool,
}

#[derive(Serialize)]
struct QueryOutput<'a> {
    status: &'static str,
    query: &'a str,
    results: Vec<QueryHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<String>,
}

#[derive(Serialize)]
struct ErrorOutput {
    status: &'static str,
    message: String,
}

pub async fn main_entry() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_file = cli
        .log_file
        .clone()
        .or_else(|| std::env::var_os(logging::LOG_FILE_ENV).map(PathBuf::from));
    logging::init(cli.verbose, cli.quiet, log_file.as_deref())?;

    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    if let Some(dir) = cli.data_dir {
        settings.data_dir = dir;
    }
    settings.validate().context("Invalid settings")?;
    log::debug!("Using data directory {}", settings.data_dir.display());

    let embedder: Arc<dyn Embedder> = Arc::new(
        StubEmbedder::new(settings.embedding_dimension).context("Failed to create embedder")?,
    );

    match cli.command {
        Commands::Ingest(args) => run_ingest(args, &settings, embedder).await,
        Commands::Query(args) => run_query(args, &settings, embedder).await,
        Commands::Check => run_check(&settings, embedder).await,
    }
}

async fn run_ingest(
    args: IngestArgs,
    settings: &Settings,
    embedder: Arc<dyn Embedder>,
) -> Result<ExitCode> {
    let pipeline = IngestPipeline::from_settings(settings, embedder)?;
    let metadata = tokio::fs::metadata(&args.path)
        .await
        .with_context(|| format!("Cannot access {}", args.path.display()))?;

    let code = if metadata.is_dir() {
        let report = pipeline.ingest_directory(&args.path).await?;
        print_json(&report)?;
        ExitCode::SUCCESS
    } else {
        let outcome = pipeline.ingest_file(&args.path).await;
        print_json(&outcome)?;
        if outcome.status == IngestStatus::Error {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        }
    };
    log::debug!(
        "Ingest lock wait: last {}ms, max {}ms",
        ingest_lock_wait_ms_last(),
        ingest_lock_wait_ms_max()
    );
    Ok(code)
}

async fn run_query(
    args: QueryArgs,
    settings: &Settings,
    embedder: Arc<dyn Embedder>,
) -> Result<ExitCode> {
    let pipeline = QueryPipeline::from_settings(settings, embedder);
    let top_k = args.top_k.unwrap_or(settings.top_k);
    let threshold = args.threshold.or(settings.similarity_threshold);

    match pipeline.query(&args.text, top_k, threshold).await {
        Ok(results) => {
            let context = if args.with_content {
                Some(pipeline.gather_context(&results).await)
            } else {
                None
            };
            print_json(&QueryOutput {
                status: "ok",
                query: &args.text,
                results,
                context,
            })?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            log::error!("Query failed: {err}");
            print_json(&ErrorOutput {
                status: "error",
                message: err.to_string(),
            })?;
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run_check(settings: &Settings, embedder: Arc<dyn Embedder>) -> Result<ExitCode> {
    let pipeline = QueryPipeline::from_settings(settings, embedder);
    let report = pipeline.state().check().await?;
    print_json(&report)?;
    Ok(if report.valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
