// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP-surface tests against the real router, in-process via
//! `axum_test::TestServer` (teacher's `transport/http_tests.rs` idiom).

use std::sync::Arc;

use axum::http::StatusCode;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::assignment::AssignmentStore;
use crate::bus::LocalBus;
use crate::ids::IdAllocator;
use crate::store::{
    MemoryDirectory, MemoryKv, MemoryPersistence, MemoryTransferStore, MessageStore, NullPushNotifier,
    SessionStore, SystemClock, TransferStore,
};

fn test_config(auth_token: Option<&str>) -> ChatConfig {
    ChatConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
        auth_token: auth_token.map(str::to_owned),
        shard_count: 2,
        ping_interval_ms: 30_000,
        read_timeout_ms: 90_000,
        queue_capacity: 16,
        inbound_workers: 1,
        assignment_ttl_secs: 3600,
        offline_duration_secs: 300,
        node_id: Some("test-node".to_owned()),
        bus_url: None,
        bus_token: None,
        shutdown_drain_ms: 1_000,
    }
}

fn test_state(auth_token: Option<&str>) -> Arc<AppState> {
    let clock = Arc::new(SystemClock);
    let kv = Arc::new(MemoryKv::new(clock.clone()));
    let assignments = Arc::new(AssignmentStore::new(kv.clone(), clock.clone()));
    let persistence = Arc::new(MemoryPersistence::default());
    let transfers = Arc::new(MemoryTransferStore::default());
    let directory = Arc::new(MemoryDirectory::new(300));
    let push = Arc::new(NullPushNotifier);
    let ids = Arc::new(IdAllocator::default());
    let bus = Arc::new(LocalBus::default());

    let admin_adapter = AdminRoleAdapter::new(
        Arc::clone(&assignments),
        Arc::clone(&persistence) as Arc<dyn MessageStore>,
        Arc::clone(&persistence) as Arc<dyn SessionStore>,
        Arc::clone(&transfers) as Arc<dyn TransferStore>,
        Arc::clone(&directory) as Arc<dyn AdminRepo>,
        Arc::clone(&directory) as Arc<dyn UserRepo>,
        push,
        clock.clone(),
        Arc::clone(&ids),
        3600,
    );
    let user_adapter = UserRoleAdapter::new(
        Arc::clone(&assignments),
        Arc::clone(&persistence) as Arc<dyn MessageStore>,
        Arc::clone(&persistence) as Arc<dyn SessionStore>,
        Arc::clone(&directory) as Arc<dyn AdminRepo>,
        Arc::clone(&directory) as Arc<dyn UserRepo>,
        clock.clone(),
        Arc::clone(&ids),
    );

    let (admin_manager, admin_rx) =
        Manager::new("test-node".to_owned(), false, 2, 16, kv.clone(), bus.clone(), admin_adapter);
    let (user_manager, user_rx) = Manager::new("test-node".to_owned(), false, 2, 16, kv, bus, user_adapter);
    admin_manager.adapter().set_user_manager(Arc::clone(&user_manager));
    user_manager.adapter().set_admin_manager(Arc::clone(&admin_manager));
    drop(admin_rx);
    drop(user_rx);

    Arc::new(AppState {
        config: test_config(auth_token),
        user_manager,
        admin_manager,
        admin_repo: Arc::clone(&directory) as Arc<dyn AdminRepo>,
        user_repo: Arc::clone(&directory) as Arc<dyn UserRepo>,
        shutdown: CancellationToken::new(),
    })
}

#[tokio::test]
async fn health_is_always_reachable_without_auth() {
    let state = test_state(Some("secret"));
    let server = axum_test::TestServer::new(build_router(state)).unwrap();

    let resp = server.get("/health").await;
    resp.assert_status(StatusCode::OK);
    assert_eq!(resp.text(), "ok");
}

#[tokio::test]
async fn health_is_reachable_when_auth_is_disabled() {
    let state = test_state(None);
    let server = axum_test::TestServer::new(build_router(state)).unwrap();

    let resp = server.get("/health").await;
    resp.assert_status(StatusCode::OK);
}

#[tokio::test]
async fn ws_upgrade_path_is_exempt_from_the_generic_bearer_layer() {
    // `/ws` auth is the query-string token check inside `ws_handler`
    // itself (§6), not the generic bearer middleware. With a matching
    // token but an unknown principal, the request should reach that
    // inner logic and fail with `InvalidUser` (404), not the generic
    // middleware's 401.
    let state = test_state(Some("secret"));
    let server = axum_test::TestServer::new(build_router(state)).unwrap();

    let resp = server.get("/ws?role=user&id=1&token=secret").await;
    resp.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ws_upgrade_rejects_a_missing_or_wrong_token_when_auth_is_enabled() {
    let state = test_state(Some("secret"));
    let server = axum_test::TestServer::new(build_router(state)).unwrap();

    let resp = server.get("/ws?role=user&id=1").await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
}
