// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket upgrade and the per-Conn reader/writer loop (§4.1, §5).
//!
//! Grounded on the teacher's `transport/ws.rs`: split the socket into
//! sender/receiver halves with `futures_util::StreamExt::split`, bridge
//! them to the rest of the system over `mpsc` channels, and drive both
//! directions plus shutdown from one `tokio::select!` loop. The
//! bridge/session-entry indirection the teacher uses doesn't apply here —
//! `Conn` and `Manager` already play that role — but the task shape (one
//! reader + one writer per connection, cooperatively cancelled) carries
//! over directly.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::action::Action;
use crate::conn::{CloseReason, Conn};
use crate::error::ChatError;
use crate::manager::ConnMessage;
use crate::principal::{Principal, Role};
use crate::transport::auth;
use crate::transport::AppState;

/// Query parameters for the Conn upgrade: `role`/`id` identify the
/// principal, `group_id` scopes admins to a roster/waiting-queue group,
/// `token` carries the bearer credential when auth is enabled (§6 wire
/// protocol; the handshake itself is out of band of the framed protocol).
#[derive(Debug, Clone, Deserialize)]
pub struct ConnQuery {
    pub role: String,
    pub id: u64,
    pub group_id: Option<u64>,
    pub token: Option<String>,
}

/// `GET /ws` — Conn upgrade.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let query_str = query.token.as_ref().map(|t| format!("token={t}")).unwrap_or_default();
    if auth::validate_ws_query(&query_str, state.config.auth_token.as_deref()).is_err() {
        return ChatError::AuthFailure.to_http_response("unauthorized").into_response();
    }

    let role = match query.role.as_str() {
        "user" => Role::User,
        "admin" => Role::Admin,
        _ => return ChatError::InvalidAction.to_http_response("unknown role").into_response(),
    };
    let principal = Principal { role, id: query.id };

    let exists = match role {
        Role::User => state.user_repo.find(principal.id).await,
        Role::Admin => state.admin_repo.find(principal.id).await,
    };
    match exists {
        Ok(Some(_)) => {}
        Ok(None) => return ChatError::InvalidUser.to_http_response("unknown principal").into_response(),
        Err(err) => return err.to_http_response("lookup failed").into_response(),
    }

    let group_id = query.group_id;
    ws.on_upgrade(move |socket| handle_conn(socket, state, principal, group_id)).into_response()
}

/// Per-connection reader/writer loop.
async fn handle_conn(socket: WebSocket, state: Arc<AppState>, principal: Principal, group_id: Option<u64>) {
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Action>(state.config.queue_capacity.max(1));
    let cancel = state.shutdown.child_token();
    let uuid = uuid::Uuid::new_v4().to_string();
    let conn = Arc::new(Conn::new(principal, uuid.clone(), group_id, outbound_tx, cancel.clone()));

    let registered = match principal.role {
        Role::User => state.user_manager.register(Arc::clone(&conn)).await,
        Role::Admin => state.admin_manager.register(Arc::clone(&conn)).await,
    };
    if let Err(err) = registered {
        tracing::warn!(err = %err, ?principal, "failed to register conn");
        return;
    }

    let (mut ws_tx, mut ws_rx) = socket.split();
    let read_timeout = state.config.read_timeout();
    let ping_interval = state.config.ping_interval();
    let mut ping_ticker = tokio::time::interval(ping_interval);
    let mut idle = tokio::time::interval(read_timeout);
    idle.tick().await; // first tick fires immediately; consume it so the real deadline is one full interval out

    let close_reason = loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break CloseReason::Shutdown,

            _ = idle.tick() => break CloseReason::ReadTimeout,

            _ = ping_ticker.tick() => {
                if ws_tx.send(WsMessage::Text(serde_json::to_string(&Action::ping(crate::time::now())).unwrap_or_default().into())).await.is_err() {
                    break CloseReason::WriteError;
                }
            }

            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(action) => {
                        let Ok(text) = serde_json::to_string(&action) else { continue };
                        if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                            break CloseReason::WriteError;
                        }
                    }
                    None => break CloseReason::Shutdown,
                }
            }

            inbound = ws_rx.next() => {
                idle.reset();
                match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        dispatch_inbound(&state, &conn, principal.role, &text).await;
                    }
                    Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {}
                    Some(Ok(WsMessage::Close(_))) | None => break CloseReason::PeerClose,
                    Some(Ok(WsMessage::Binary(_))) => {}
                    Some(Err(_)) => break CloseReason::ReadError,
                }
            }
        }
    };

    conn.close(close_reason);
    unregister(&state, principal.role, principal.id, &uuid, group_id).await;
}

async fn dispatch_inbound(state: &Arc<AppState>, conn: &Arc<Conn>, role: Role, text: &str) {
    let action: Action = match serde_json::from_str(text) {
        Ok(a) => a,
        Err(_) => {
            let _ = conn.deliver(Action::error(crate::time::now(), "malformed frame"));
            return;
        }
    };
    let sender = match role {
        Role::User => state.user_manager.inbound_sender(),
        Role::Admin => state.admin_manager.inbound_sender(),
    };
    if sender.send(ConnMessage { conn: Arc::clone(conn), action }).await.is_err() {
        let _ = conn.deliver(Action::error(crate::time::now(), "server busy"));
    }
}

async fn unregister(state: &Arc<AppState>, role: Role, id: u64, uuid: &str, group_id: Option<u64>) {
    match role {
        Role::User => state.user_manager.unregister(id, uuid, group_id).await,
        Role::Admin => state.admin_manager.unregister(id, uuid, group_id).await,
    }
}
