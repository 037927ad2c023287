use anyhow::Context;
use book_chat_core::{
    CharacterNgramEmbedder, ChatOptions, Embedder, EmbeddingIndex, InMemoryStore, LopdfExtractor,
    OllamaClient, OllamaConfig, OllamaEmbedder, QdrantStore, Session, SessionState, VectorStore,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_LLM_MODEL, DEFAULT_OLLAMA_URL,
};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

type DynEmbedder = Box<dyn Embedder + Send + Sync>;
type DynStore = Box<dyn VectorStore + Send + Sync>;
type ChatSession = Session<LopdfExtractor, DynEmbedder, DynStore, OllamaClient>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmbedderKind {
    /// Ollama embedding model.
    Ollama,
    /// Offline character trigram hashing.
    Ngram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    Memory,
    Qdrant,
}

#[derive(Parser)]
#[command(name = "book-chat", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Ollama base URL
    #[arg(long, env = "OLLAMA_URL", default_value = DEFAULT_OLLAMA_URL)]
    ollama_url: String,

    /// Model used to answer questions
    #[arg(long, env = "BOOK_CHAT_LLM_MODEL", default_value = DEFAULT_LLM_MODEL)]
    llm_model: String,

    /// Model used to embed chunks and questions
    #[arg(long, env = "BOOK_CHAT_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Embedding backend
    #[arg(long, value_enum, default_value_t = EmbedderKind::Ollama)]
    embedder: EmbedderKind,

    /// Vector storage backend
    #[arg(long, value_enum, default_value_t = StoreKind::Memory)]
    vector_store: StoreKind,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant collection prefix; the session id is appended
    #[arg(long, default_value = "book_chunks")]
    qdrant_collection: String,

    /// Directory uploaded PDFs are stored under
    #[arg(long, env = "BOOK_CHAT_UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Timeout for each embedding or completion request
    #[arg(long, default_value = "120")]
    request_timeout_secs: u64,

    /// Maximum characters per chunk
    #[arg(long, default_value = "1000")]
    chunk_size: usize,

    /// Characters shared by neighbouring chunks
    #[arg(long, default_value = "200")]
    chunk_overlap: usize,

    /// Number of chunks retrieved per question
    #[arg(long, default_value = "3")]
    top_k: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive session: upload, process, then ask questions.
    Chat {
        /// PDF to upload and process before the first prompt.
        #[arg(long)]
        pdf: Option<PathBuf>,
    },
    /// Process one PDF and answer the given questions in order.
    Ask {
        /// PDF to process.
        #[arg(long)]
        pdf: PathBuf,
        /// Question to ask; repeat for a conversation.
        #[arg(long, required = true)]
        question: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "book-chat boot"
    );

    let mut session = build_session(&cli)?;
    info!(session = %session.id(), "session created");

    match &cli.command {
        Command::Chat { pdf } => run_chat(&mut session, pdf.as_deref()).await?,
        Command::Ask { pdf, question } => {
            upload(&mut session, pdf).await?;
            let report = session
                .process_pdf()
                .await
                .map_err(|error| anyhow::anyhow!("Error processing PDF: {error}"))?;
            println!(
                "{} processed: {} page(s), {} chunks",
                report.document.document_title, report.document.page_count, report.chunk_count
            );

            for text in question {
                let answer = session.ask(text).await;
                println!("Q: {text}\nA: {answer}\n");
            }
        }
    }

    Ok(())
}

fn build_session(cli: &Cli) -> anyhow::Result<ChatSession> {
    let timeout = Duration::from_secs(cli.request_timeout_secs.max(1));
    let id = Uuid::new_v4();

    let options = ChatOptions {
        chunk_max_chars: cli.chunk_size,
        chunk_overlap_chars: cli.chunk_overlap,
        top_k: cli.top_k,
        ..ChatOptions::default()
    };

    let embedder: DynEmbedder = match cli.embedder {
        EmbedderKind::Ollama => Box::new(
            OllamaEmbedder::new(OllamaConfig {
                base_url: cli.ollama_url.clone(),
                model: cli.embedding_model.clone(),
                timeout,
            })
            .context("invalid embedding backend settings")?,
        ),
        EmbedderKind::Ngram => Box::new(CharacterNgramEmbedder::default()),
    };

    let store: DynStore = match cli.vector_store {
        StoreKind::Memory => Box::new(InMemoryStore::new()),
        StoreKind::Qdrant => {
            let collection = format!("{}_{}", cli.qdrant_collection, id.simple());
            Box::new(
                QdrantStore::new(&cli.qdrant_url, collection, timeout)
                    .context("invalid qdrant settings")?,
            )
        }
    };

    let model = OllamaClient::new(OllamaConfig {
        base_url: cli.ollama_url.clone(),
        model: cli.llm_model.clone(),
        timeout,
    })
    .context("invalid language model settings")?;
    info!(model = model.model(), "language model configured");

    Ok(Session::new(
        id,
        &cli.upload_dir,
        &options,
        LopdfExtractor,
        EmbeddingIndex::new(embedder, store),
        model,
    ))
}

async fn upload(session: &mut ChatSession, path: &Path) -> anyhow::Result<PathBuf> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("unable to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("path has no file name: {}", path.display()))?;

    let stored = session.store_upload(file_name, &bytes).await?;
    Ok(stored)
}

#[derive(Debug, PartialEq, Eq)]
enum ReplCommand<'a> {
    Upload(&'a str),
    Process,
    History,
    Status,
    Reset,
    Help,
    Quit,
    Unknown(&'a str),
    Question(&'a str),
}

fn parse_line(line: &str) -> ReplCommand<'_> {
    let Some(command) = line.strip_prefix('/') else {
        return ReplCommand::Question(line);
    };

    let (name, argument) = command
        .split_once(char::is_whitespace)
        .map(|(name, rest)| (name, rest.trim()))
        .unwrap_or((command, ""));

    match name {
        "upload" if !argument.is_empty() => ReplCommand::Upload(argument),
        "process" => ReplCommand::Process,
        "history" => ReplCommand::History,
        "status" => ReplCommand::Status,
        "reset" => ReplCommand::Reset,
        "help" => ReplCommand::Help,
        "quit" | "exit" => ReplCommand::Quit,
        _ => ReplCommand::Unknown(name),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /upload PATH   store a PDF for this session");
    println!("  /process       extract, chunk and index the uploaded PDF");
    println!("  /history       show the conversation so far");
    println!("  /status        show the session state");
    println!("  /reset         forget the processed document");
    println!("  /quit          leave");
    println!("Anything else is a question about the processed PDF.");
}

fn print_status(session: &ChatSession) {
    match (session.state(), session.document()) {
        (SessionState::Ready, Some(document)) => println!(
            "Ready for questions about {} ({} chunks, {} turn(s) so far)",
            document.document_title,
            session.chunk_count(),
            session.history().len()
        ),
        _ => match session.upload_path() {
            Some(path) => println!(
                "Awaiting processing: {} uploaded, run /process",
                path.display()
            ),
            None => println!("Awaiting processing: /upload a PDF first"),
        },
    }
}

fn prompt_label(state: SessionState) -> &'static str {
    match state {
        SessionState::Empty => "awaiting document",
        SessionState::Ready => "ready",
    }
}

async fn handle_upload(session: &mut ChatSession, path: &Path) {
    match upload(session, path).await {
        Ok(stored) => println!("Uploaded {}", stored.display()),
        Err(error) => println!("Error uploading PDF: {error:#}"),
    }
}

async fn handle_process(session: &mut ChatSession) {
    println!("Processing PDF...");
    match session.process_pdf().await {
        Ok(report) => println!(
            "PDF processed successfully! {}: {} page(s), {} chunks",
            report.document.document_title, report.document.page_count, report.chunk_count
        ),
        Err(error) => println!("Error processing PDF: {error}"),
    }
}

/// Reads one line, replacing bytes that are not valid UTF-8. `None` at EOF.
async fn read_line<R>(input: &mut R) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buffer = Vec::new();
    if input.read_until(b'\n', &mut buffer).await? == 0 {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&buffer).into_owned()))
}

async fn run_chat(session: &mut ChatSession, pdf: Option<&Path>) -> anyhow::Result<()> {
    println!("Book Chat");
    print_help();

    if let Some(path) = pdf {
        handle_upload(session, path).await;
        if session.upload_path().is_some() {
            handle_process(session).await;
        }
    }

    run_repl(session, BufReader::new(tokio::io::stdin())).await?;
    Ok(())
}

/// Runs the prompt loop until `/quit` or end of input and returns how many
/// non-empty lines were handled.
async fn run_repl<R>(session: &mut ChatSession, mut input: R) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut handled = 0;
    loop {
        print!("[{}] > ", prompt_label(session.state()));
        std::io::stdout().flush()?;

        let Some(line) = read_line(&mut input).await? else {
            println!();
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        handled += 1;

        match parse_line(line) {
            ReplCommand::Upload(path) => handle_upload(session, Path::new(path)).await,
            ReplCommand::Process => handle_process(session).await,
            ReplCommand::History => {
                if session.history().is_empty() {
                    println!("No questions asked yet.");
                } else {
                    println!("{}", session.history().render());
                }
            }
            ReplCommand::Status => print_status(session),
            ReplCommand::Reset => match session.reset().await {
                Ok(()) => println!("Session reset; upload and process a PDF to continue."),
                Err(error) => {
                    warn!(%error, "reset left backend state behind");
                    println!("Session reset with errors: {error}");
                }
            },
            ReplCommand::Help => print_help(),
            ReplCommand::Quit => break,
            ReplCommand::Unknown(name) => println!("Unknown command /{name}; try /help"),
            ReplCommand::Question(question) => {
                let answer = session.ask(question).await;
                println!("{answer}");
            }
        }
    }

    Ok(handled)
}
