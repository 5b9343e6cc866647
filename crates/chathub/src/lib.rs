// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chathub: the real-time routing and session fabric behind a multi-tenant
//! live-chat dispatch service. This crate is the *core* only — the
//! connection manager, the session/assignment engine, the delivery
//! pipeline, and the cross-node event bus. HTTP login/admin/CRUD, file
//! upload, push transport internals, and the relational persistence layer
//! are external collaborators, reached here only through the
//! `MessageStore`/`SessionStore`/`AdminRepo`/`UserRepo`/`TransferStore`/
//! `PushNotifier`/`Clock`/`Bus`/`Kv` traits in [`store`] and [`bus`].

pub mod action;
pub mod assignment;
pub mod bus;
pub mod config;
pub mod conn;
pub mod delivery;
pub mod error;
pub mod ids;
pub mod manager;
pub mod message;
pub mod offline;
pub mod principal;
pub mod role;
pub mod router;
pub mod session;
pub mod store;
pub mod time;
pub mod transfer;
pub mod transport;
pub mod waiting;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::bus::{Bus, LocalBus, NatsBus};
use crate::config::ChatConfig;
use crate::ids::IdAllocator;
use crate::manager::Manager;
use crate::role::{AdminRoleAdapter, UserRoleAdapter};
use crate::router::EventRouter;
use crate::store::{
    AdminRepo, Clock, Kv, MemoryDirectory, MemoryKv, MemoryPersistence, MemoryTransferStore,
    MessageStore, NullPushNotifier, PushNotifier, SessionStore, SystemClock, TransferStore, UserRepo,
};
use crate::transport::AppState;

/// Wire up the default single-process collaborator stack and run the
/// dispatch fabric until shutdown.
///
/// Production deployments supply their own `MessageStore`/`SessionStore`/
/// `AdminRepo`/`UserRepo`/`TransferStore`/`PushNotifier`/`Kv` (Redis, a
/// relational store, WeChat push — all out of scope here, §1); this
/// entrypoint wires the in-memory stand-ins so `chathubd` is runnable
/// standalone and so the property/integration test harness has a
/// ready-made single-node fixture to build on.
pub async fn run(config: ChatConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let kv: Arc<dyn Kv> = Arc::new(MemoryKv::new(Arc::clone(&clock)));
    let assignments = Arc::new(assignment::AssignmentStore::new(Arc::clone(&kv), Arc::clone(&clock)));

    let persistence = Arc::new(MemoryPersistence::default());
    let message_store: Arc<dyn MessageStore> = Arc::clone(&persistence) as Arc<dyn MessageStore>;
    let session_store: Arc<dyn SessionStore> = Arc::clone(&persistence) as Arc<dyn SessionStore>;
    let transfer_store: Arc<dyn TransferStore> = Arc::new(MemoryTransferStore::default());

    let directory = Arc::new(MemoryDirectory::new(config.offline_duration_secs));
    let admin_repo: Arc<dyn AdminRepo> = Arc::clone(&directory) as Arc<dyn AdminRepo>;
    let user_repo: Arc<dyn UserRepo> = Arc::clone(&directory) as Arc<dyn UserRepo>;

    let push: Arc<dyn PushNotifier> = Arc::new(NullPushNotifier);
    let ids = Arc::new(IdAllocator::default());

    let node_id = config.node_id();
    let clustered = config.bus_url.is_some();
    let bus: Arc<dyn Bus> = match config.bus_url.as_deref() {
        Some(url) => Arc::new(NatsBus::connect(url, config.bus_token.as_deref()).await?),
        None => Arc::new(LocalBus::default()),
    };

    let admin_adapter = AdminRoleAdapter::new(
        Arc::clone(&assignments),
        Arc::clone(&message_store),
        Arc::clone(&session_store),
        Arc::clone(&transfer_store),
        Arc::clone(&admin_repo),
        Arc::clone(&user_repo),
        Arc::clone(&push),
        Arc::clone(&clock),
        Arc::clone(&ids),
        config.assignment_ttl_secs,
    );
    let user_adapter = UserRoleAdapter::new(
        Arc::clone(&assignments),
        Arc::clone(&message_store),
        Arc::clone(&session_store),
        Arc::clone(&admin_repo),
        Arc::clone(&user_repo),
        Arc::clone(&clock),
        Arc::clone(&ids),
    );

    let (admin_manager, admin_inbound_rx) = Manager::new(
        node_id.clone(),
        clustered,
        config.shard_count,
        config.queue_capacity,
        Arc::clone(&kv),
        Arc::clone(&bus),
        admin_adapter,
    );
    let (user_manager, user_inbound_rx) = Manager::new(
        node_id.clone(),
        clustered,
        config.shard_count,
        config.queue_capacity,
        Arc::clone(&kv),
        Arc::clone(&bus),
        user_adapter,
    );

    // Complete the cyclic admin<->user manager wiring (§9): neither
    // adapter can hold the other's manager until both managers exist.
    admin_manager.adapter().set_user_manager(Arc::clone(&user_manager));
    user_manager.adapter().set_admin_manager(Arc::clone(&admin_manager));

    admin_manager.spawn_workers(admin_inbound_rx, config.inbound_workers);
    user_manager.spawn_workers(user_inbound_rx, config.inbound_workers);

    EventRouter::new(Arc::clone(&admin_manager), Arc::clone(&message_store)).spawn();
    EventRouter::new(Arc::clone(&user_manager), Arc::clone(&message_store)).spawn();

    spawn_signal_handler(shutdown.clone());

    let state = Arc::new(AppState {
        config: config.clone(),
        user_manager,
        admin_manager,
        admin_repo,
        user_repo,
        shutdown: shutdown.clone(),
    });

    tracing::info!(node_id = %node_id, clustered, "chathub listening on {addr}");
    let router = transport::build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    let serve = axum::serve(listener, router).with_graceful_shutdown(shutdown.clone().cancelled_owned());

    // §5 graceful shutdown: drain mode is bounded by `shutdown_drain_ms` —
    // every Conn's cancellation token is a child of `shutdown`, so each
    // read/write loop observes the signal and closes with reason
    // `Shutdown` promptly; this timeout only guards against a handler
    // that hangs instead of returning.
    let drain = config.shutdown_drain();
    tokio::select! {
        result = serve => result?,
        () = async { shutdown.cancelled().await; tokio::time::sleep(drain).await } => {
            tracing::warn!("shutdown drain timeout elapsed before all conns closed");
        }
    }

    Ok(())
}

/// First SIGTERM/SIGINT cancels `shutdown` (drain mode, §5); a second
/// forces immediate exit. `syscall.SIGKILL` cannot be caught by any
/// process, so — unlike the source this was distilled from, which
/// registers a handler for it — it is not registered here (§9).
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(err = %e, "failed to install SIGTERM handler");
                return;
            }
        };
        let mut sigint = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(err = %e, "failed to install SIGINT handler");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
            _ = sigint.recv() => tracing::info!("received SIGINT"),
        }
        shutdown.cancel();

        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM again, forcing exit"),
            _ = sigint.recv() => tracing::info!("received SIGINT again, forcing exit"),
        }
        std::process::exit(130);
    });
}
