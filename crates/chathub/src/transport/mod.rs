// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport: the Conn upgrade endpoint and a health
//! check. The HTTP admin console (login, CRUD, file upload) is an
//! external collaborator per §1 and is not built here — `AppState` only
//! carries what the core needs to serve `Conn`s.

pub mod auth;
pub mod ws;

use std::sync::Arc;

use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tokio_util::sync::CancellationToken;

use crate::config::ChatConfig;
use crate::manager::Manager;
use crate::role::{AdminRoleAdapter, UserRoleAdapter};
use crate::store::{AdminRepo, UserRepo};

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

/// Everything a request handler needs: the config, both per-role
/// managers, the directory repos (for upgrade-time principal lookup),
/// and the shutdown token each Conn's cancellation derives from.
pub struct AppState {
    pub config: ChatConfig,
    pub user_manager: Arc<Manager<UserRoleAdapter>>,
    pub admin_manager: Arc<Manager<AdminRoleAdapter>>,
    pub admin_repo: Arc<dyn AdminRepo>,
    pub user_repo: Arc<dyn UserRepo>,
    pub shutdown: CancellationToken,
}

async fn health() -> impl IntoResponse {
    "ok"
}

/// Build the axum `Router` serving the Conn upgrade and health check.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws::ws_handler))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), auth::auth_layer))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
