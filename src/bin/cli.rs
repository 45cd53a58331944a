use std::collections::HashSet;
use std::io::Write as _;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use tokio::io::AsyncBufReadExt;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wiki_rag::retriever::{ChatSession, Retriever};
use wiki_rag::storage::{self, JsonlWriter};
use wiki_rag::{Chunk, Config, Document, DocumentPipeline, EmbeddingArchive, Error, Result, WikiClient};

/// Wikipedia RAG pipeline command line interface
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "WIKI_RAG_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output format (json, pretty, plain)
    #[arg(long, default_value = "pretty")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone)]
enum OutputFormat {
    Json,
    Pretty,
    Plain,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "pretty" => Ok(OutputFormat::Pretty),
            "plain" => Ok(OutputFormat::Plain),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Download article extracts into the documents file
    Fetch(FetchArgs),
    /// Clean and chunk fetched documents into the chunks file
    Chunk,
    /// Embed all chunks and rebuild the vector index artifacts
    Index,
    /// Retrieve the nearest chunks for a query, without the chat model
    Search(SearchArgs),
    /// Ask a single question and print the grounded answer
    Query(QueryArgs),
    /// Interactive question/answer loop
    Chat(ChatArgs),
    /// Pipeline artifact and corpus status
    Status(StatusArgs),
    /// Configuration management
    Config(ConfigArgs),
}

#[derive(Args)]
struct FetchArgs {
    /// Fetch only the first N keywords
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Args)]
struct SearchArgs {
    /// Search query
    query: String,

    /// Maximum number of results
    #[arg(short, long, default_value = "5")]
    k: usize,

    /// Print full chunk texts instead of snippets
    #[arg(long)]
    full: bool,
}

#[derive(Args)]
struct QueryArgs {
    /// Question to answer
    question: String,

    /// Number of chunks to retrieve as context
    #[arg(short, long)]
    k: Option<usize>,
}

#[derive(Args)]
struct ChatArgs {
    /// Number of chunks to retrieve as context
    #[arg(short, long)]
    k: Option<usize>,
}

#[derive(Args)]
struct StatusArgs {
    /// Show detailed artifact information
    #[arg(long)]
    detailed: bool,
}

#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Validate configuration
    Validate,
    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "wiki-rag.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("wiki_rag={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Fetch(args) => handle_fetch(&config, args).await,
        Commands::Chunk => handle_chunk(&config),
        Commands::Index => handle_index(&config).await,
        Commands::Search(args) => handle_search(&config, args).await,
        Commands::Query(args) => handle_query(&config, args).await,
        Commands::Chat(args) => handle_chat(&config, args).await,
        Commands::Status(args) => handle_status(&config, args),
        Commands::Config(args) => handle_config_command(&args, &config),
    };

    match result {
        Ok(output) => {
            print_output(&output, &cli.output);
            Ok(())
        }
        Err(e) => {
            error!("Command failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn load_config(config_path: Option<&std::path::Path>) -> Result<Config> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Config::from_file(&path.to_path_buf())
        }
        None => Ok(Config::default()),
    }
}

async fn handle_fetch(config: &Config, args: FetchArgs) -> Result<Value> {
    let client = WikiClient::new(&config.fetcher)?;
    let out_path = config.documents_path();
    let mut writer = JsonlWriter::create(&out_path)?;

    let keywords: Vec<&String> = match args.limit {
        Some(limit) => config.fetcher.keywords.iter().take(limit).collect(),
        None => config.fetcher.keywords.iter().collect(),
    };

    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut saved = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;

    for keyword in &keywords {
        info!("Fetching: {}", keyword);

        match client.fetch_page(keyword.as_str()).await {
            Ok(Some(document)) => {
                if !seen_ids.insert(document.id.clone()) {
                    warn!(
                        "Duplicate page '{}' (id {}), keeping the first occurrence",
                        keyword, document.id
                    );
                    skipped += 1;
                } else {
                    writer.write_record(&document)?;
                    saved += 1;
                }
            }
            Ok(None) => {
                skipped += 1;
            }
            Err(e) => {
                error!("Failed to fetch '{}': {}", keyword, e);
                failed += 1;
            }
        }

        tokio::time::sleep(config.fetcher.request_delay).await;
    }

    info!("Saved {} documents to {}", saved, out_path.display());

    Ok(json!({
        "status": "completed",
        "keywords_requested": keywords.len(),
        "documents_saved": saved,
        "skipped": skipped,
        "failed": failed,
        "output": out_path.display().to_string(),
    }))
}

fn handle_chunk(config: &Config) -> Result<Value> {
    let documents: Vec<Document> = storage::read_jsonl(&config.documents_path())?;
    let pipeline = DocumentPipeline::new(config.document.clone());

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut dropped = 0usize;

    for document in &documents {
        let document_chunks = pipeline.chunk_document(document);
        if document_chunks.is_empty() {
            warn!("Document {} produced no chunks, dropping it", document.id);
            dropped += 1;
        }
        chunks.extend(document_chunks);
    }

    let out_path = config.chunks_path();
    storage::write_jsonl(&out_path, &chunks)?;

    info!("Wrote {} chunks to {}", chunks.len(), out_path.display());

    Ok(json!({
        "status": "completed",
        "documents": documents.len(),
        "dropped_documents": dropped,
        "chunks": chunks.len(),
        "output": out_path.display().to_string(),
    }))
}

async fn handle_index(config: &Config) -> Result<Value> {
    let chunks: Vec<Chunk> = storage::read_jsonl(&config.chunks_path())?;
    if chunks.is_empty() {
        return Err(Error::InvalidInput(
            "No chunks to index; run the chunk stage first".to_string(),
        ));
    }

    let embedder = wiki_rag::EmbeddingFactory::create(&config.embedding)?;
    info!(
        "Embedding {} chunks with '{}' ({} dimensions)",
        chunks.len(),
        embedder.model_name(),
        embedder.dimension()
    );

    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        vectors.push(embedder.embed_text(&chunk.text).await?);
        if (i + 1) % 25 == 0 {
            info!("Embedded {}/{} chunks", i + 1, chunks.len());
        }
    }

    let archive = EmbeddingArchive::new(
        embedder.model_name().to_string(),
        embedder.dimension(),
        chunks,
        vectors,
    );
    let index = archive.build_index()?;

    let embeddings_path = config.embeddings_path();
    let index_path = config.index_path();
    archive.save(&embeddings_path)?;
    index.save(&index_path)?;

    info!(
        "Index rebuilt: {} vectors at {}",
        index.len(),
        index_path.display()
    );

    Ok(json!({
        "status": "completed",
        "chunks_indexed": archive.chunks.len(),
        "dimension": archive.dimension,
        "model": archive.model,
        "embeddings_file": embeddings_path.display().to_string(),
        "index_file": index_path.display().to_string(),
    }))
}

async fn handle_search(config: &Config, args: SearchArgs) -> Result<Value> {
    let retriever = Retriever::load(config)?;
    let results = retriever.retrieve(&args.query, Some(args.k)).await?;

    let formatted: Vec<Value> = results
        .iter()
        .map(|r| {
            let text = if args.full {
                r.chunk.text.clone()
            } else {
                snippet(&r.chunk.text, 160)
            };
            json!({
                "position": r.position,
                "distance": r.distance,
                "id": r.chunk.id,
                "title": r.chunk.metadata.title,
                "text": text,
            })
        })
        .collect();

    Ok(json!({
        "query": args.query,
        "total_found": formatted.len(),
        "results": formatted,
        "parameters": { "k": args.k },
    }))
}

async fn handle_query(config: &Config, args: QueryArgs) -> Result<Value> {
    let retriever = Retriever::load(config)?;
    let mut session = ChatSession::new();

    let answered = retriever.answer(&mut session, &args.question, args.k).await?;

    let sources: Vec<Value> = answered
        .retrieved
        .iter()
        .map(|r| json!({ "id": r.chunk.id, "title": r.chunk.metadata.title }))
        .collect();

    Ok(json!({
        "question": args.question,
        "answer": answered.answer,
        "sources": sources,
    }))
}

async fn handle_chat(config: &Config, args: ChatArgs) -> Result<Value> {
    let retriever = Retriever::load(config)?;
    report_corpus(config);

    println!("=== Wikipedia RAG chat ===");
    println!(
        "{} chunks indexed with '{}'.",
        retriever.chunk_count(),
        retriever.embedding_model()
    );
    println!("Type a question and press Enter. Type 'salir' or 'exit' to quit.\n");

    let mut session = ChatSession::new();
    let stdin = tokio::io::stdin();
    let mut lines = tokio::io::BufReader::new(stdin).lines();

    loop {
        print!("Question: ");
        std::io::stdout().flush()?;

        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };
        let question = line.trim();

        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("salir") || question.eq_ignore_ascii_case("exit") {
            println!("Bye.");
            break;
        }

        match retriever.answer(&mut session, question, args.k).await {
            Ok(answered) => {
                println!("\n=== ANSWER ===");
                println!("{}", answered.answer);
                println!("\n{}\n", "=".repeat(50));
            }
            Err(e) => {
                println!("\nSomething went wrong: {}\n", e);
            }
        }
    }

    Ok(json!({ "turns": session.len() }))
}

/// Report corpus counts from the JSONL stage files. Malformed lines are
/// skipped with a warning; missing files are fine here.
fn report_corpus(config: &Config) {
    match storage::read_jsonl_lenient::<Document>(&config.documents_path()) {
        Ok(documents) => info!("Corpus: {} documents on disk", documents.len()),
        Err(e) => warn!("Documents file unavailable: {}", e),
    }
    match storage::read_jsonl_lenient::<Chunk>(&config.chunks_path()) {
        Ok(chunks) => info!("Corpus: {} chunks on disk", chunks.len()),
        Err(e) => warn!("Chunks file unavailable: {}", e),
    }
}

fn handle_status(config: &Config, args: StatusArgs) -> Result<Value> {
    let documents = storage::read_jsonl_lenient::<Document>(&config.documents_path())
        .map(|d| d.len())
        .ok();
    let chunks = storage::read_jsonl_lenient::<Chunk>(&config.chunks_path())
        .map(|c| c.len())
        .ok();

    let archive = EmbeddingArchive::load(&config.embeddings_path()).ok();
    let index_exists = config.index_path().exists();

    let mut status = json!({
        "system": {
            "version": env!("CARGO_PKG_VERSION"),
            "status": if archive.is_some() && index_exists { "ready" } else { "not indexed" },
        },
        "corpus": {
            "documents": documents,
            "chunks": chunks,
        },
        "artifacts": {
            "embeddings": archive.as_ref().map(|a| json!({
                "model": a.model,
                "dimension": a.dimension,
                "chunks": a.chunks.len(),
                "built_at": a.built_at.to_rfc3339(),
            })),
            "index": index_exists,
        },
    });

    if args.detailed {
        let detailed = json!({
            "paths": {
                "documents": config.documents_path().display().to_string(),
                "chunks": config.chunks_path().display().to_string(),
                "embeddings": config.embeddings_path().display().to_string(),
                "index": config.index_path().display().to_string(),
            },
            "embedding_provider": format!("{:?}", config.embedding.provider),
            "chat_model": config.chat.model,
            "top_k": config.retrieval.top_k,
        });
        if let Some(obj) = status.as_object_mut() {
            obj.insert("detailed".to_string(), detailed);
        }
    }

    Ok(status)
}

fn handle_config_command(args: &ConfigArgs, config: &Config) -> Result<Value> {
    match &args.action {
        ConfigAction::Show => Ok(json!({ "config": config })),
        ConfigAction::Validate => match config.validate() {
            Ok(()) => Ok(json!({
                "status": "valid",
                "message": "Configuration is valid",
            })),
            Err(e) => {
                let output = json!({
                    "status": "invalid",
                    "error": e.to_string(),
                });
                print_output(&output, &OutputFormat::Pretty);
                Err(e)
            }
        },
        ConfigAction::Generate { output } => {
            let default_config = Config::default();
            let config_json = serde_json::to_string_pretty(&default_config)?;
            std::fs::write(output, config_json)?;

            Ok(json!({
                "status": "generated",
                "file": output.display().to_string(),
                "message": "Default configuration file generated",
            }))
        }
    }
}

fn snippet(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut.trim_end())
    }
}

fn print_output(output: &Value, format: &OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(output).unwrap_or_default());
        }
        OutputFormat::Pretty => {
            println!(
                "{}",
                serde_json::to_string_pretty(output).unwrap_or_default()
            );
        }
        OutputFormat::Plain => {
            if let Some(obj) = output.as_object() {
                for (key, value) in obj {
                    match value {
                        Value::String(s) => println!("{}: {}", key, s),
                        Value::Number(n) => println!("{}: {}", key, n),
                        Value::Bool(b) => println!("{}: {}", key, b),
                        _ => println!("{}: {}", key, value),
                    }
                }
            } else {
                println!("{}", output);
            }
        }
    }
}
