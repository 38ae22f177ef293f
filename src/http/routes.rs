use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Json, Router,
};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{
    facade::{LogEntry, StatusFacade},
    status::StatusSnapshot,
};

/// `/health` answers 200 no matter what the stream is doing; it tells a
/// liveness probe that this process is up, not that the encoder is.
pub fn create_router(facade: StatusFacade) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/api/status", get(status_handler))
        .route("/ws", get(ws_handler))
        .with_state(facade)
}

async fn index_handler(State(facade): State<StatusFacade>) -> String {
    let snapshot = facade.snapshot();
    let mut body = format!("Stream is {} (uptime {})", snapshot.status, snapshot.uptime);
    if !snapshot.error.is_empty() {
        body.push_str(&format!("\nLast error: {}", snapshot.error));
    }
    body
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn status_handler(State(facade): State<StatusFacade>) -> Json<StatusSnapshot> {
    Json(facade.snapshot())
}

async fn ws_handler(ws: WebSocketUpgrade, State(facade): State<StatusFacade>) -> Response {
    let rx = facade.subscribe();
    ws.on_upgrade(move |socket| push_logs(socket, rx))
}

/// Forwards accepted log lines as `{time, text, type}` until either side
/// goes away. A slow client skips what it missed.
async fn push_logs(mut socket: WebSocket, mut rx: broadcast::Receiver<LogEntry>) {
    loop {
        tokio::select! {
            entry = rx.recv() => match entry {
                Ok(entry) => {
                    let text = match serde_json::to_string(&entry) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to encode log entry");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "log subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
