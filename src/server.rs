//! HTTP + WebSocket endpoint exposing the RAG agent.
//!
//! Routes:
//! - `POST /query?session_id=` — run the agent, return the full answer
//! - `GET /message-history/:session_id` — session history
//! - `GET /ws/:session_id` — WebSocket streaming (`chunk` / `complete` /
//!   `error` frames)
//! - `GET /health`, `GET /metrics`

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::agent::{AgentDeps, RagAgent};
use crate::metrics;
use crate::session::{ChatTurn, SessionStore};

/// Shared application state, created once at startup.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<RagAgent>,
    pub deps: Arc<AgentDeps>,
    pub sessions: Arc<SessionStore>,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub response: String,
    pub new_messages: Vec<ChatTurn>,
}

#[derive(Debug, Deserialize)]
pub struct SessionParams {
    #[serde(default = "default_session_id")]
    pub session_id: String,
}

fn default_session_id() -> String {
    "default".to_string()
}

/// Build the router with permissive CORS, as the original endpoint had.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/query", post(query_agent))
        .route("/message-history/:session_id", get(message_history))
        .route("/ws/:session_id", get(ws_handler))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::gather_text() {
        Ok((content_type, body)) => {
            ([(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn message_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<Vec<ChatTurn>> {
    Json(state.sessions.history(&session_id))
}

async fn query_agent(
    State(state): State<AppState>,
    Query(params): Query<SessionParams>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, (StatusCode, String)> {
    let history = state.sessions.history(&params.session_id);

    match state
        .agent
        .run(&state.deps, &request.question, &history)
        .await
    {
        Ok(reply) => {
            state.sessions.append(&params.session_id, &reply.new_messages);
            metrics::record_agent_query("http", true);
            Ok(Json(QueryResponse {
                response: reply.answer,
                new_messages: reply.new_messages,
            }))
        }
        Err(err) => {
            metrics::record_agent_query("http", false);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error processing query: {}", err),
            ))
        }
    }
}

async fn ws_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, session_id: String) {
    let conn_id = Uuid::new_v4();
    debug!(%conn_id, %session_id, "WebSocket connected");

    while let Some(Ok(message)) = socket.recv().await {
        let text = match message {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            _ => continue,
        };

        let question = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("question").and_then(Value::as_str).map(str::to_string))
            .filter(|q| !q.trim().is_empty());

        let Some(question) = question else {
            let _ = send_frame(&mut socket, &error_frame("No question provided")).await;
            continue;
        };

        match stream_answer(&mut socket, &state, &session_id, &question).await {
            Ok(()) => metrics::record_agent_query("ws", true),
            Err(err) => {
                metrics::record_agent_query("ws", false);
                warn!(%conn_id, "WebSocket query failed: {}", err);
                if send_frame(&mut socket, &error_frame(&err.to_string()))
                    .await
                    .is_err()
                {
                    break; // connection already closed
                }
            }
        }
    }

    debug!(%conn_id, "WebSocket disconnected");
}

async fn stream_answer(
    socket: &mut WebSocket,
    state: &AppState,
    session_id: &str,
    question: &str,
) -> anyhow::Result<()> {
    let history = state.sessions.history(session_id);
    let (tx, mut rx) = mpsc::channel::<String>(32);

    let agent = state.agent.clone();
    let deps = state.deps.clone();
    let question = question.to_string();
    let task =
        tokio::spawn(async move { agent.run_stream(&deps, &question, &history, tx).await });

    while let Some(chunk) = rx.recv().await {
        send_frame(socket, &chunk_frame(&chunk)).await?;
    }

    let reply = task.await??;
    state.sessions.append(session_id, &reply.new_messages);
    send_frame(socket, &complete_frame(&reply.new_messages)).await?;
    Ok(())
}

async fn send_frame(socket: &mut WebSocket, frame: &Value) -> anyhow::Result<()> {
    socket
        .send(WsMessage::Text(serde_json::to_string(frame)?))
        .await?;
    Ok(())
}

fn chunk_frame(content: &str) -> Value {
    json!({ "type": "chunk", "content": content })
}

fn complete_frame(new_messages: &[ChatTurn]) -> Value {
    json!({ "type": "complete", "new_messages": new_messages })
}

fn error_frame(content: &str) -> Value {
    json!({ "type": "error", "content": content })
}
