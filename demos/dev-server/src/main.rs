//! Development server for the console client.
//!
//! Serves the session directory REST API and the `/ws` envelope protocol
//! with a canned assistant behind it, so the client can be exercised end
//! to end without a real agent process.
//!
//! Run with: cargo run -p dev-server -- --port 8000

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use clap::Parser;
use futures::{SinkExt, StreamExt, stream::SplitStream};
use serde_json::json;
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_console_core::{DirectoryError, NewSession, Session, SessionDirectory};
use agent_console_session::MemoryDirectory;
use agent_console_transport::{ClientEnvelope, Envelope, Handshake};

/// Idle receive window before a keepalive pong is pushed.
const RECV_TIMEOUT: Duration = Duration::from_secs(30);
/// Pace of the canned response stream.
const CHUNK_DELAY: Duration = Duration::from_millis(120);

#[derive(Parser, Debug)]
#[command(version, about = "Development server for the console client")]
struct Args {
    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    /// Port to listen on.
    #[arg(long, default_value_t = 8000)]
    port: u16,
}

#[derive(Clone)]
struct AppState {
    directory: Arc<MemoryDirectory>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    let args = Args::parse();
    let state = AppState {
        directory: Arc::new(MemoryDirectory::new()),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/sessions", get(list_sessions).post(create_session))
        .route(
            "/api/sessions/{id}",
            get(fetch_session).delete(remove_session),
        )
        .route("/api/models", get(models))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .context("invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Listening on http://{addr}");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "service": "agent-console-dev-server" }))
}

async fn list_sessions(State(state): State<AppState>) -> Response {
    match state.directory.list_sessions().await {
        Ok(sessions) => Json(json!({ "sessions": sessions })).into_response(),
        Err(e) => error_json(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<NewSession>,
) -> Response {
    match state.directory.create_session(req).await {
        Ok(session) => Json(session).into_response(),
        Err(DirectoryError::Rejected(detail)) => error_json(StatusCode::BAD_REQUEST, &detail),
        Err(e) => error_json(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

async fn fetch_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.directory.get_session(&id).await {
        Ok(Some(session)) => Json(session).into_response(),
        Ok(None) => error_json(StatusCode::NOT_FOUND, "Session not found"),
        Err(e) => error_json(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

async fn remove_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.directory.delete_session(&id).await {
        Ok(()) => Json(json!({ "message": "Session deleted" })).into_response(),
        Err(DirectoryError::NotFound(_)) => error_json(StatusCode::NOT_FOUND, "Session not found"),
        Err(e) => error_json(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

async fn models(State(state): State<AppState>) -> Response {
    match state.directory.models().await {
        Ok(catalog) => Json(catalog).into_response(),
        Err(e) => error_json(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

fn error_json(status: StatusCode, detail: &str) -> Response {
    (status, Json(json!({ "detail": detail }))).into_response()
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // All outbound frames funnel through one task so the scripted turn
    // and the control plane never interleave writes.
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
    let send_task = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            let frame = match envelope.encode() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!("Failed to encode envelope: {e}");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let Some(session) = register(&mut ws_receiver, &state, &tx).await else {
        // Let the rejection frame flush before the socket drops.
        tokio::time::sleep(Duration::from_millis(50)).await;
        send_task.abort();
        return;
    };
    tracing::info!(session_id = %session.id, "WebSocket connected");

    let _ = tx.send(Envelope::pong());

    let busy = Arc::new(AtomicBool::new(false));
    loop {
        let message = match tokio::time::timeout(RECV_TIMEOUT, ws_receiver.next()).await {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(e))) => {
                tracing::debug!("WebSocket error: {e}");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                // Idle connection: keep the client's liveness view fresh.
                let _ = tx.send(Envelope::pong());
                continue;
            }
        };
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let envelope: ClientEnvelope = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("Invalid client frame: {e}");
                continue;
            }
        };
        match envelope {
            ClientEnvelope::Ping => {
                let _ = tx.send(Envelope::pong());
            }
            ClientEnvelope::UserMessage { content } => {
                if busy.load(Ordering::SeqCst) {
                    let _ = tx.send(Envelope::error("Still processing, please wait..."));
                    continue;
                }
                if let Err(e) = state.directory.touch(&session.id) {
                    tracing::debug!("Activity update failed: {e}");
                }
                tracing::info!(session_id = %session.id, "User message received");
                let _ = tx.send(Envelope::user_echo(content.clone()));
                busy.store(true, Ordering::SeqCst);
                tokio::spawn(run_turn(
                    content,
                    session.model.clone(),
                    tx.clone(),
                    Arc::clone(&busy),
                ));
            }
        }
    }

    send_task.abort();
    tracing::info!(session_id = %session.id, "WebSocket disconnected");
}

/// Bind the connection to a session: the first frame must be a handshake
/// naming a known session id.
async fn register(
    receiver: &mut SplitStream<WebSocket>,
    state: &AppState,
    tx: &mpsc::UnboundedSender<Envelope>,
) -> Option<Session> {
    let first = match receiver.next().await {
        Some(Ok(Message::Text(text))) => text,
        _ => return None,
    };
    let session_id = match serde_json::from_str::<Handshake>(&first) {
        Ok(handshake) if !handshake.session_id.is_empty() => handshake.session_id,
        _ => {
            let _ = tx.send(Envelope::error("Session ID is required"));
            return None;
        }
    };
    match state.directory.get_session(&session_id).await {
        Ok(Some(session)) => Some(session),
        Ok(None) => {
            let _ = tx.send(Envelope::error("Session not found"));
            None
        }
        Err(e) => {
            let _ = tx.send(Envelope::error(e.to_string()));
            None
        }
    }
}

/// One canned turn: streamed fragments, a tool line, then the finish.
async fn run_turn(
    prompt: String,
    model: String,
    tx: mpsc::UnboundedSender<Envelope>,
    busy: Arc<AtomicBool>,
) {
    let reply = format!(
        "Received \"{prompt}\". This development build streams a canned {model} \
         reply instead of driving a real agent."
    );
    for chunk in chunk_text(&reply, 24) {
        if tx.send(Envelope::stream_chunk(chunk)).is_err() {
            return;
        }
        tokio::time::sleep(CHUNK_DELAY).await;
    }
    let _ = tx.send(Envelope::tool("workspace_scan", "completed"));
    let _ = tx.send(Envelope::finish());
    busy.store(false, Ordering::SeqCst);
}

fn chunk_text(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}
