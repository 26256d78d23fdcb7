use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::HeaderMap,
    response::Response,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt, stream::SplitSink};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{
    auth::{authenticate_token, bearer_token},
    config::AppConfig,
    errors::{AppError, Result},
    repository::RepositoryState,
};

use super::{Connection, RealtimeHub};

#[derive(Debug, Deserialize)]
pub struct SocketParams {
    pub token: Option<String>,
}

/// Frames the server writes.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame<'a> {
    Event { event: &'a str, payload: &'a JsonValue },
    Pong { ts: i64 },
}

/// Frames a client may send. Anything else is ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Ping,
}

/// socket_handler
///
/// `GET /ws`. The token comes from `?token=` or the `Authorization` header and
/// goes through the same verification and freshness check as HTTP requests.
/// A rejected handshake answers 401 before any upgrade or room join.
pub async fn socket_handler(
    State(repo): State<RepositoryState>,
    State(config): State<AppConfig>,
    State(hub): State<RealtimeHub>,
    Query(params): Query<SocketParams>,
    headers: HeaderMap,
    upgrade: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response> {
    let token = params
        .token
        .as_deref()
        .or_else(|| bearer_token(&headers))
        .ok_or(AppError::Unauthorized)?;
    let user = authenticate_token(repo.as_ref(), &config, token).await?;

    let upgrade = upgrade.map_err(|e| AppError::BadRequest(e.to_string()))?;
    let connection = hub
        .join(&user.identity)
        .map_err(|e| AppError::Unavailable(e.to_string()))?;

    Ok(upgrade.on_upgrade(move |socket| run_socket(socket, connection)))
}

async fn run_socket(socket: WebSocket, mut connection: Connection) {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            delivered = connection.recv() => {
                let Some(delivered) = delivered else {
                    // Hub shut down.
                    break;
                };
                let frame = ServerFrame::Event {
                    event: &delivered.event,
                    payload: &delivered.payload,
                };
                if !send_frame(&mut sink, &frame).await {
                    break;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let frame = serde_json::from_str::<ClientFrame>(text.as_str());
                    if let Ok(ClientFrame::Ping) = frame {
                        let pong = ServerFrame::Pong { ts: Utc::now().timestamp_millis() };
                        if !send_frame(&mut sink, &pong).await {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = sink.close().await;
    tracing::debug!(connection = connection.id(), "socket closed");
}

async fn send_frame(sink: &mut SplitSink<WebSocket, Message>, frame: &ServerFrame<'_>) -> bool {
    let text = match serde_json::to_string(frame) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode socket frame");
            return true;
        }
    };
    sink.send(Message::Text(text.into())).await.is_ok()
}
