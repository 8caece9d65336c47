use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use shellbridge_terminal::{Credentials, HostTarget};
use shellbridge_types::{AgentNotification, BridgeError, ConnectionId, ErrorCode};
use shellbridge_viewers::OutboundMessage;

use crate::orchestrator::run_chat_turn;
use crate::service::BridgeService;
use crate::web::protocol::{ClientMessage, ConnectRequest};

/// Application state shared across routes
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<BridgeService>,
}

/// Create router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Connection management
        .route("/api/connections", get(list_connections).post(create_connection))
        .route("/api/connections/:id", delete(close_connection))
        .route("/api/commands", get(list_commands))
        // WebSocket endpoints
        .route("/ws/terminal/:connection_id", get(terminal_ws_handler))
        .route("/ws/conversation/:session_id", get(conversation_ws_handler))
        .with_state(state)
}

/// POST /api/connections - Open a remote shell
async fn create_connection(
    State(state): State<AppState>,
    Json(request): Json<ConnectRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let mut target = HostTarget::new(request.host).with_port(request.port);
    if let Some(username) = request.username {
        target = target.with_username(username);
    }
    let credentials = Credentials {
        password: request.password,
        key_path: request.key_path,
    };

    let connection_id = state.service.connections.connect(target, credentials).await?;

    Ok(Json(serde_json::json!({
        "connection_id": connection_id,
        "terminal_ws": format!("/ws/terminal/{}", connection_id),
    })))
}

/// GET /api/connections - List live connections
async fn list_connections(State(state): State<AppState>) -> Json<serde_json::Value> {
    let connections = state.service.connections.list().await;
    Json(serde_json::json!({ "connections": connections }))
}

/// DELETE /api/connections/:id - Disconnect and drop tracked commands
async fn close_connection(
    State(state): State<AppState>,
    Path(id): Path<ConnectionId>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.service.connections.disconnect(id).await?;
    state.service.tracker.cleanup_by_connection(id).await;

    Ok(Json(serde_json::json!({ "success": true })))
}

/// GET /api/commands - Snapshot of tracked commands
async fn list_commands(State(state): State<AppState>) -> Json<serde_json::Value> {
    let commands = state.service.tracker.all_commands().await;
    let active = state.service.tracker.active_command_count().await;
    Json(serde_json::json!({
        "commands": commands,
        "active_count": active,
    }))
}

/// GET /ws/terminal/:connection_id - Raw terminal relay
async fn terminal_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(connection_id): Path<ConnectionId>,
) -> Response {
    ws.on_upgrade(move |socket| handle_terminal_socket(socket, state, connection_id))
}

/// Both directions are verbatim: inbound frames go straight to the remote
/// input stream, outbound frames are raw remote output fanned out by the
/// bridge.
async fn handle_terminal_socket(socket: WebSocket, state: AppState, connection_id: ConnectionId) {
    let viewer_id = format!("viewer-{}", Uuid::new_v4());

    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundMessage>();
    state.service.viewers.add_session(viewer_id.clone(), tx).await;
    if let Err(e) = state
        .service
        .connections
        .attach_viewer(connection_id, &viewer_id)
        .await
    {
        tracing::warn!(connection = %connection_id, error = %e, "terminal viewer attach failed");
        state.service.viewers.remove_session(&viewer_id).await;
        return;
    }

    let (mut ws_sink, mut ws_stream) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let frame = match msg {
                OutboundMessage::Frame(text) => WsMessage::Text(text),
                OutboundMessage::Notice(notice) => match serde_json::to_string(&notice) {
                    Ok(json) => WsMessage::Text(json),
                    Err(_) => continue,
                },
            };
            if ws_sink.send(frame).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_stream.next().await {
        let bytes = match msg {
            WsMessage::Text(text) => text.into_bytes(),
            WsMessage::Binary(data) => data,
            WsMessage::Close(_) => break,
            _ => continue,
        };
        if let Err(e) = state.service.connections.send_input(connection_id, &bytes).await {
            tracing::debug!(connection = %connection_id, error = %e, "terminal input dropped");
            break;
        }
    }

    let _ = state
        .service
        .connections
        .detach_viewer(connection_id, &viewer_id)
        .await;
    state.service.viewers.remove_session(&viewer_id).await;
    send_task.abort();
}

/// GET /ws/conversation/:session_id - Agent conversation channel
async fn conversation_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| handle_conversation_socket(socket, state, session_id))
}

async fn handle_conversation_socket(socket: WebSocket, state: AppState, session_id: String) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundMessage>();
    state.service.viewers.add_session(session_id.clone(), tx).await;

    let message_count = state.service.history.message_count(&session_id).await;
    state
        .service
        .viewers
        .send_to_session(
            &session_id,
            AgentNotification::chat(format!(
                "conversation attached ({message_count} messages in history)"
            )),
        )
        .await;

    let (mut ws_sink, mut ws_stream) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let notice = match msg {
                OutboundMessage::Notice(notice) => notice,
                OutboundMessage::Frame(text) => AgentNotification::chat(text),
            };
            if let Ok(json) = serde_json::to_string(&notice) {
                if ws_sink.send(WsMessage::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    });

    while let Some(Ok(msg)) = ws_stream.next().await {
        let text = match msg {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            _ => continue,
        };

        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Chat {
                content,
                connection_id,
            }) => {
                // Run the turn off the socket reader so notifications keep
                // flowing while the model thinks
                let service = Arc::clone(&state.service);
                let session = session_id.clone();
                tokio::spawn(async move {
                    if let Err(e) = run_chat_turn(&service, &session, connection_id, &content).await
                    {
                        tracing::error!(session = %session, error = %e, "chat turn failed");
                        service
                            .viewers
                            .send_to_session(
                                &session,
                                AgentNotification::error(
                                    format!("chat failed: {e}"),
                                    ErrorCode::Internal,
                                ),
                            )
                            .await;
                    }
                });
            }
            Ok(ClientMessage::Ping) => {
                state
                    .service
                    .viewers
                    .send_to_session(&session_id, AgentNotification::ping())
                    .await;
            }
            Err(e) => {
                tracing::debug!(session = %session_id, error = %e, "unparseable client message");
            }
        }
    }

    state.service.viewers.remove_session(&session_id).await;
    send_task.abort();
}

/// Error handling
#[derive(Debug)]
enum AppError {
    Bridge(BridgeError),
}

impl From<BridgeError> for AppError {
    fn from(err: BridgeError) -> Self {
        AppError::Bridge(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let AppError::Bridge(err) = self;
        let status = match &err {
            BridgeError::ConnectionNotFound(_) => StatusCode::NOT_FOUND,
            BridgeError::ConnectionUnavailable(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({
            "error": err.to_string(),
            "code": err.code(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
