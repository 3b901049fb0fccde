//! WebSocket transport for coordinator connections
//!
//! The gate runs as middleware in front of the upgrade (and the stats
//! view), so a connection with a bad token is refused before the
//! registry ever sees it.

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Query, Request, State,
    },
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::error;

use super::api::ApiResponse;
use super::server::AppState;

/// Query string of the WebSocket URI
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// Refuse the request unless it carries the shared secret
///
/// An unreadable query string counts as a missing token, so every
/// failure looks the same to the caller.
pub async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let token = Query::<TokenQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(query)| query.token);

    match state.gate.check(token.as_deref()) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            error::log_dropped(request.uri().path(), &e, "Rejected request");
            (StatusCode::UNAUTHORIZED, Json(ApiResponse::<()>::error(e.to_string()))).into_response()
        }
    }
}

/// Upgrade an authorized request to a coordinator connection
pub async fn ws_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let remote_address = remote_address(&headers, peer);
    ws.on_upgrade(move |socket| serve_connection(state, socket, remote_address))
}

/// Prefer the first `X-Forwarded-For` hop, fall back to the peer address
pub fn remote_address(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| peer.to_string())
}

/// Pump one connection until either side closes
async fn serve_connection(state: AppState, socket: WebSocket, remote_address: String) {
    let (mut sink, mut stream) = socket.split();
    let (outbox, mut outbound) = mpsc::unbounded_channel::<String>();

    let (id, identity) = state.router.connect(remote_address, outbox).await;

    let mut writer = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let router = state.router.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    router.handle_text(id, text.as_str()).await;
                }
                Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                    Ok(text) => {
                        router.handle_text(id, text).await;
                    }
                    Err(_) => tracing::warn!(conn = %id, "Dropping non-UTF-8 binary frame"),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(conn = %id, error = %e, "Socket read failed");
                    break;
                }
            }
        }
    });

    // Whichever half finishes first ends the connection
    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    state.router.disconnect(id).await;
    tracing::debug!(conn = %id, identity = %identity, "Connection closed");
}
