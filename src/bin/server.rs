use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Json},
    routing::{get, post},
    Router,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::signal;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use wiki_rag::retriever::{ChatSession, ChatTurn, Retriever};
use wiki_rag::{Config, Result};

/// Wikipedia RAG web chat server
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "WIKI_RAG_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Shared between handlers: the read-only retriever and the in-memory,
/// process-lifetime chat session.
#[derive(Clone)]
struct AppState {
    retriever: Arc<Retriever>,
    session: Arc<Mutex<ChatSession>>,
    session_id: Uuid,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    version: String,
    chunks_indexed: usize,
    embedding_model: String,
}

#[derive(Deserialize)]
struct ChatRequest {
    question: String,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Serialize)]
struct ChatApiResponse {
    question: String,
    answer: String,
    sources: Vec<SourceRef>,
}

#[derive(Serialize)]
struct SourceRef {
    id: String,
    title: String,
    distance: f32,
}

#[derive(Serialize)]
struct HistoryResponse {
    session_id: Uuid,
    turns: Vec<ChatTurn>,
}

/// Generic API response envelope
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
    timestamp: chrono::DateTime<chrono::Utc>,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            timestamp: chrono::Utc::now(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("wiki_rag={},tower_http=info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match cli.config {
        Some(path) => Config::from_file(&path)?,
        None => Config::default(),
    };

    // Missing artifacts are an unrecoverable startup failure; everything
    // after this point answers requests with textual errors instead.
    let retriever = Retriever::load(&config)?;
    info!(
        "Loaded {} chunks, embedding model '{}'",
        retriever.chunk_count(),
        retriever.embedding_model()
    );

    let state = AppState {
        retriever: Arc::new(retriever),
        session: Arc::new(Mutex::new(ChatSession::new())),
        session_id: Uuid::new_v4(),
    };

    let mut app = Router::new()
        .route("/", get(chat_page))
        .route("/api/chat", post(chat_handler))
        .route("/api/history", get(history_handler))
        .route("/healthz", get(health_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(config.server.request_timeout)),
        );

    if config.server.enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| wiki_rag::Error::Config(format!("Invalid listen address: {}", e)))?;

    info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to install shutdown handler: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

async fn chat_page() -> Html<&'static str> {
    Html(CHAT_PAGE)
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        chunks_indexed: state.retriever.chunk_count(),
        embedding_model: state.retriever.embedding_model().to_string(),
    })
}

async fn history_handler(State(state): State<AppState>) -> Json<ApiResponse<HistoryResponse>> {
    let session = state.session.lock().await;
    Json(ApiResponse::success(HistoryResponse {
        session_id: state.session_id,
        turns: session.turns().to_vec(),
    }))
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> impl IntoResponse {
    let question = request.question.trim().to_string();
    if question.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<ChatApiResponse>::error("Question is empty")),
        );
    }

    let mut session = state.session.lock().await;
    match state
        .retriever
        .answer(&mut session, &question, request.k)
        .await
    {
        Ok(answered) => {
            let sources = answered
                .retrieved
                .iter()
                .map(|r| SourceRef {
                    id: r.chunk.id.clone(),
                    title: r.chunk.metadata.title.clone(),
                    distance: r.distance,
                })
                .collect();

            (
                StatusCode::OK,
                Json(ApiResponse::success(ChatApiResponse {
                    question,
                    answer: answered.answer,
                    sources,
                })),
            )
        }
        Err(e) => {
            error!("Chat request failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
        }
    }
}

const CHAT_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Wikipedia RAG chat</title>
<style>
  body { font-family: system-ui, sans-serif; max-width: 720px; margin: 2rem auto; padding: 0 1rem; }
  h1 { font-size: 1.4rem; }
  #history { margin: 1rem 0; }
  .turn { margin-bottom: 1rem; }
  .question { font-weight: 600; }
  .answer { background: #f2f4f7; border-radius: 8px; padding: .75rem; white-space: pre-wrap; }
  form { display: flex; gap: .5rem; }
  input[type=text] { flex: 1; padding: .5rem; }
  button { padding: .5rem 1rem; }
  .sources { color: #667085; font-size: .85rem; margin-top: .25rem; }
</style>
</head>
<body>
<h1>Wikipedia RAG chat</h1>
<p>Answers are grounded only in the indexed article chunks.</p>
<div id="history"></div>
<form id="ask">
  <input type="text" id="question" placeholder="Ask a question..." autocomplete="off" autofocus>
  <button type="submit">Send</button>
</form>
<script>
const history = document.getElementById('history');
const form = document.getElementById('ask');
const input = document.getElementById('question');

function addTurn(question, answer, sources) {
  const turn = document.createElement('div');
  turn.className = 'turn';
  const q = document.createElement('div');
  q.className = 'question';
  q.textContent = question;
  const a = document.createElement('div');
  a.className = 'answer';
  a.textContent = answer;
  turn.appendChild(q);
  turn.appendChild(a);
  if (sources && sources.length) {
    const s = document.createElement('div');
    s.className = 'sources';
    s.textContent = 'Sources: ' + sources.map(src => src.title).join(', ');
    turn.appendChild(s);
  }
  history.appendChild(turn);
  turn.scrollIntoView();
}

form.addEventListener('submit', async (event) => {
  event.preventDefault();
  const question = input.value.trim();
  if (!question) return;
  input.value = '';
  input.disabled = true;
  try {
    const resp = await fetch('/api/chat', {
      method: 'POST',
      headers: { 'Content-Type': 'application/json' },
      body: JSON.stringify({ question }),
    });
    const body = await resp.json();
    if (body.success) {
      addTurn(body.data.question, body.data.answer, body.data.sources);
    } else {
      addTurn(question, 'Error: ' + (body.error || 'request failed'), []);
    }
  } catch (err) {
    addTurn(question, 'Error: ' + err, []);
  } finally {
    input.disabled = false;
    input.focus();
  }
});
</script>
</body>
</html>
"#;
