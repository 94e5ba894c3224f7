use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    serve, Json, Router,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::chapters::ChapterStore;
use crate::completion::OpenAiClient;
use crate::dialogue::{ConversationHistory, ConversationTurn};
use crate::error::ChatError;
use crate::session::ChatSession;

// Used when no templates directory is present next to the binary's working directory.
const INDEX_TEMPLATE: &str = include_str!("../templates/index.html");

/// Frames sent by the browser over `/ws`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Select {
        chapter: String,
    },
    Submit {
        message: String,
        #[serde(default)]
        chapter: Option<String>,
    },
    Clear,
    Cancel,
}

/// Frames sent to the browser over `/ws`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Welcome {
        session_id: String,
        chapters: Vec<String>,
        selected: String,
    },
    /// Full UI state after a select, submit or clear.
    Transcript {
        input: String,
        selected: String,
        turns: Vec<ConversationTurn>,
    },
    Error {
        message: String,
        input: String,
    },
    Cancelled {
        input: String,
    },
}

impl ServerFrame {
    pub fn transcript(session: &ChatSession) -> Self {
        ServerFrame::Transcript {
            input: session.input().to_string(),
            selected: session.chapter().to_string(),
            turns: session.history().turns().to_vec(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct WebOptions {
    pub title: String,
    pub window: usize,
    pub template_dir: PathBuf,
    pub static_dir: PathBuf,
}

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    store: Arc<ChapterStore>,
    client: Arc<OpenAiClient>,
    title: String,
    window: usize,
    static_dir: PathBuf,
}

impl AppState {
    pub fn new(store: ChapterStore, client: OpenAiClient, options: WebOptions) -> Self {
        Self {
            templates: Arc::new(create_minijinja_env(options.template_dir)),
            store: Arc::new(store),
            client: Arc::new(client),
            title: options.title,
            window: options.window,
            static_dir: options.static_dir,
        }
    }
}

// Minijinja Environment setup
fn create_minijinja_env(template_dir: PathBuf) -> AutoReloader {
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        if template_dir.is_dir() {
            env.set_loader(path_loader(template_dir.clone()));
            // Watch the templates directory for changes
            notifier.watch_path(template_dir.as_path(), true);
        } else {
            env.add_template("index.html", INDEX_TEMPLATE)?;
        }
        Ok(env)
    })
}

async fn index_handler(State(state): State<AppState>) -> Response {
    // Acquire env, get template, and render within the same block
    state
        .templates
        .acquire_env()
        .and_then(|env| {
            env.get_template("index.html").and_then(|tmpl| {
                let context = minijinja::context! {
                    title => state.title.as_str(),
                    chapters => state.store.names(),
                    selected => state.store.default_chapter(),
                };
                tmpl.render(context)
            })
        })
        .map(|page| Html(page).into_response())
        .unwrap_or_else(|e| {
            error!("Failed to get or render template: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!("Internal Server Error: {}", e)),
            )
                .into_response()
        })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChaptersResponse {
    pub chapters: Vec<String>,
    pub default: String,
}

async fn chapters_handler(State(state): State<AppState>) -> Json<ChaptersResponse> {
    Json(ChaptersResponse {
        chapters: state.store.names(),
        default: state.store.default_chapter().to_string(),
    })
}

/// One submit from a client that keeps its own transcript.
#[derive(Debug, Serialize, Deserialize)]
pub struct RespondRequest {
    #[serde(default)]
    pub chapter: Option<String>,
    pub message: String,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RespondResponse {
    pub input: String,
    pub history: Vec<ConversationTurn>,
}

pub struct ApiError(ChatError);

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            ChatError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ChatError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ChatError::Configuration(_) | ChatError::ChapterRead { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn respond_handler(
    State(state): State<AppState>,
    Json(request): Json<RespondRequest>,
) -> Result<Json<RespondResponse>, ApiError> {
    let mut session = ChatSession::with_history(
        &state.store,
        state.window,
        ConversationHistory::from_turns(request.history),
    );
    if let Some(chapter) = request.chapter {
        session.select_chapter(chapter);
    }
    session.set_input(request.message);
    session.submit(&state.store, state.client.as_ref()).await?;

    Ok(Json(RespondResponse {
        input: session.input().to_string(),
        history: session.history().turns().to_vec(),
    }))
}

// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    debug!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

pub fn parse_client_frame(text: &str) -> serde_json::Result<ClientFrame> {
    serde_json::from_str(text)
}

async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
) -> Result<(), axum::Error> {
    match serde_json::to_string(frame) {
        Ok(json) => sender.send(Message::Text(json)).await,
        Err(e) => {
            error!("Failed to serialize server frame: {}", e);
            Ok(())
        }
    }
}

enum SubmitOutcome {
    Finished(Result<(), ChatError>),
    Cancelled,
    Disconnected,
}

/// Runs a submit while still listening to the socket, so a `cancel` frame or a
/// disconnect drops the in-flight completion.
async fn run_submit(
    session: &mut ChatSession,
    state: &AppState,
    receiver: &mut SplitStream<WebSocket>,
) -> SubmitOutcome {
    let submit = session.submit(&state.store, state.client.as_ref());
    tokio::pin!(submit);

    loop {
        tokio::select! {
            result = &mut submit => return SubmitOutcome::Finished(result.map(|_| ())),
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => match parse_client_frame(&text) {
                    Ok(ClientFrame::Cancel) => return SubmitOutcome::Cancelled,
                    Ok(other) => warn!(?other, "Ignoring frame while a reply is pending"),
                    Err(e) => warn!("Ignoring malformed frame while a reply is pending: {}", e),
                },
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return SubmitOutcome::Disconnected,
                Some(Ok(_)) => {}
            }
        }
    }
}

// Each connection owns exactly one chat session.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4();
    info!(%session_id, "New WebSocket session");
    let (mut sender, mut receiver) = socket.split();
    let mut session = ChatSession::new(&state.store, state.window);

    let welcome = ServerFrame::Welcome {
        session_id: session_id.to_string(),
        chapters: state.store.names(),
        selected: session.chapter().to_string(),
    };
    if send_frame(&mut sender, &welcome).await.is_err() {
        warn!(%session_id, "Failed to send welcome frame");
        return;
    }

    while let Some(incoming) = receiver.next().await {
        let frame = match incoming {
            Ok(Message::Text(text)) => match parse_client_frame(&text) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(%session_id, "Malformed client frame: {}", e);
                    let reply = ServerFrame::Error {
                        message: format!("malformed frame: {}", e),
                        input: session.input().to_string(),
                    };
                    if send_frame(&mut sender, &reply).await.is_err() {
                        break;
                    }
                    continue;
                }
            },
            Ok(Message::Close(_)) => {
                debug!(%session_id, "Client requested WebSocket close");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(%session_id, "WebSocket receive error: {}", e);
                break;
            }
        };

        let reply = match frame {
            ClientFrame::Select { chapter } => {
                session.select_chapter(chapter);
                ServerFrame::transcript(&session)
            }
            ClientFrame::Clear => {
                session.clear();
                ServerFrame::transcript(&session)
            }
            ClientFrame::Cancel => {
                debug!(%session_id, "Cancel received with nothing in flight");
                continue;
            }
            ClientFrame::Submit { message, chapter } => {
                if let Some(chapter) = chapter {
                    session.select_chapter(chapter);
                }
                session.set_input(message);
                match run_submit(&mut session, &state, &mut receiver).await {
                    SubmitOutcome::Finished(Ok(())) => ServerFrame::transcript(&session),
                    SubmitOutcome::Finished(Err(e)) => ServerFrame::Error {
                        message: e.to_string(),
                        input: session.input().to_string(),
                    },
                    SubmitOutcome::Cancelled => {
                        info!(%session_id, "Completion cancelled by client");
                        ServerFrame::Cancelled { input: session.input().to_string() }
                    }
                    SubmitOutcome::Disconnected => {
                        info!(%session_id, "Client left while a completion was in flight");
                        break;
                    }
                }
            }
        };

        if send_frame(&mut sender, &reply).await.is_err() {
            warn!(%session_id, "WebSocket client disconnected or send error");
            break;
        }
    }
    info!(%session_id, turns = session.history().len(), "WebSocket session closed");
}

pub fn build_router(state: AppState) -> Router {
    // Serve static files from the configured directory
    let static_files_service = ServeDir::new(&state.static_dir).not_found_service(
        tower::service_fn(|_req: axum::extract::Request| async {
            Ok::<_, std::convert::Infallible>((StatusCode::NOT_FOUND, "Not Found").into_response())
        }),
    );

    Router::new()
        .route("/", get(index_handler))
        .route("/ws", get(ws_handler))
        .route("/api/chapters", get(chapters_handler))
        .route("/api/respond", post(respond_handler))
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_web_server(addr: SocketAddr, state: AppState) -> Result<()> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;
    info!("Web server listening on http://{}", addr);

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}
