// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Manager<R>`: the per-role composition of shards, bus subscription, and
//! register/unregister hooks (§4.3).

pub mod locator;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::action::Action;
use crate::bus::{Bus, BusEvent};
use crate::conn::{Conn, ConnectionShard};
use crate::error::ChatError;
use crate::principal::{GroupId, PrincipalId, Role};
use crate::store::Kv;

const LOCATOR_TTL_SECS: i64 = 120;

/// A parsed inbound frame paired with the `Conn` it arrived on, queued for
/// a worker in the Manager's inbound pool (§2, §5).
pub struct ConnMessage {
    pub conn: Arc<Conn>,
    pub action: Action,
}

/// Role-specific hooks: registration/unregistration side effects and
/// inbound action handling (§2 RoleAdapters, §4.7).
///
/// Implementations are concrete per-role types (`UserRoleAdapter`,
/// `AdminRoleAdapter`), never used as a trait object — `Manager<Self>` in
/// these signatures is exactly the manager that owns this adapter.
#[async_trait]
pub trait RoleAdapter: Send + Sync + Sized + 'static {
    fn role(&self) -> Role;

    async fn on_register(&self, manager: &Manager<Self>, conn: &Arc<Conn>);

    async fn on_unregister(&self, manager: &Manager<Self>, principal_id: PrincipalId, group_id: Option<GroupId>);

    async fn handle_inbound(
        &self,
        manager: &Manager<Self>,
        conn: &Arc<Conn>,
        action: Action,
    ) -> Result<(), ChatError>;

    /// React to a bus event addressed to this role, other than `Message`
    /// (reload-and-deliver is handled centrally by `EventRouter`, since
    /// it's identical across roles).
    async fn on_bus_event(&self, manager: &Manager<Self>, event: BusEvent) {
        let _ = (manager, event);
    }
}

/// Owns shards, node-local bus subscription, the buffered inbound channel,
/// and register/unregister hooks for one role (§4.3).
pub struct Manager<R: RoleAdapter> {
    role: Role,
    node_id: String,
    /// Whether a real cluster bus is configured. Gates the `Do(remote,
    /// local)` toggle (§4.3 Cluster toggle, §9 "isCluster() gating").
    clustered: bool,
    shards: ConnectionShard,
    kv: Arc<dyn Kv>,
    bus: Arc<dyn Bus>,
    inbound_tx: mpsc::Sender<ConnMessage>,
    adapter: R,
}

impl<R: RoleAdapter> Manager<R> {
    /// Construct a Manager and return it alongside the receiving half of
    /// its inbound channel, which the caller must pass to `spawn_workers`.
    pub fn new(
        node_id: String,
        clustered: bool,
        shard_count: usize,
        queue_capacity: usize,
        kv: Arc<dyn Kv>,
        bus: Arc<dyn Bus>,
        adapter: R,
    ) -> (Arc<Self>, mpsc::Receiver<ConnMessage>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(queue_capacity.max(1));
        let role = adapter.role();
        let manager = Arc::new(Self {
            role,
            node_id,
            clustered,
            shards: ConnectionShard::new(shard_count),
            kv,
            bus,
            inbound_tx,
            adapter,
        });
        (manager, inbound_rx)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn shards(&self) -> &ConnectionShard {
        &self.shards
    }

    pub fn own_channel(&self) -> String {
        crate::bus::node_channel(&self.node_id, self.role)
    }

    pub fn inbound_sender(&self) -> mpsc::Sender<ConnMessage> {
        self.inbound_tx.clone()
    }

    /// Spawn the fixed worker pool draining the inbound channel (§5).
    /// `tokio::sync::mpsc::Receiver` has a single consumer, so workers
    /// share it behind a mutex rather than each owning a receiver.
    pub fn spawn_workers(self: &Arc<Self>, rx: mpsc::Receiver<ConnMessage>, worker_count: usize) {
        let rx = Arc::new(Mutex::new(rx));
        for _ in 0..worker_count.max(1) {
            let manager = Arc::clone(self);
            let rx = Arc::clone(&rx);
            tokio::spawn(async move {
                loop {
                    let msg = { rx.lock().await.recv().await };
                    let Some(ConnMessage { conn, action }) = msg else { break };
                    if let Err(err) = manager.adapter.handle_inbound(&manager, &conn, action).await {
                        tracing::debug!(err = %err, principal = ?conn.principal(), "inbound action failed");
                        let _ = conn.deliver(Action::error(crate::time::now(), err.to_string()));
                    }
                }
            });
        }
    }

    /// Register a new Conn for its principal (§4.3 Registration).
    pub async fn register(&self, conn: Arc<Conn>) -> Result<(), ChatError> {
        let principal = conn.principal();
        let previous_channel = locator::locate(self.kv.as_ref(), self.role, principal.id).await?;

        let displaced = self.shards.put(Arc::clone(&conn)).await;

        locator::claim(self.kv.as_ref(), self.role, principal.id, &self.own_channel(), LOCATOR_TTL_SECS)
            .await?;
        locator::spawn_refresh(
            Arc::clone(&self.kv),
            self.role,
            principal.id,
            self.own_channel(),
            LOCATOR_TTL_SECS,
            conn.cancellation_token(),
        );

        if let Some(displaced) = displaced {
            if displaced.uuid() != conn.uuid() {
                let _ = displaced.deliver(Action::other_login(crate::time::now()));
                displaced.close(crate::conn::CloseReason::DuplicateLogin);
            }
        } else if let Some(channel) = previous_channel {
            if channel != self.own_channel() {
                let _ = self.bus.publish(&channel, BusEvent::OtherLogin(principal.id)).await;
            }
        }

        self.adapter.on_register(self, &conn).await;
        Ok(())
    }

    /// Unregister a Conn, guarded by uuid-match (§4.3 Unregistration, §8 property 3/5).
    pub async fn unregister(&self, principal_id: PrincipalId, uuid: &str, group_id: Option<GroupId>) {
        let removed = self.shards.remove(principal_id, uuid).await;
        if removed {
            let _ = locator::release(self.kv.as_ref(), self.role, principal_id).await;
        }
        self.adapter.on_unregister(self, principal_id, group_id).await;
    }

    /// `LocateNode(principalId) → nodeChannel | None` (§4.3).
    pub async fn locate_node(&self, principal_id: PrincipalId) -> Result<Option<String>, ChatError> {
        locator::locate(self.kv.as_ref(), self.role, principal_id).await
    }

    pub fn bus(&self) -> &Arc<dyn Bus> {
        &self.bus
    }

    pub fn adapter(&self) -> &R {
        &self.adapter
    }

    /// `Do(remoteFn, localFn)` for group-wide broadcasts: when a cluster
    /// bus is configured, publish once and let every node's `EventRouter`
    /// (including this one, which also subscribes to its own broadcast
    /// subject) apply `local`; otherwise apply `local` directly (§4.3
    /// Cluster toggle, §9).
    pub async fn do_broadcast<F>(&self, event: BusEvent, local: F) -> Result<(), ChatError>
    where
        F: Future<Output = Result<(), ChatError>>,
    {
        if self.clustered {
            self.bus.publish_to_all(self.role, event).await
        } else {
            local.await
        }
    }

    /// `Do(remoteFn, localFn)` for a principal-targeted event: publish to
    /// the owning node's channel when it's a different node; otherwise run
    /// `local` (§4.3 Cluster toggle).
    pub async fn do_point<F>(
        &self,
        principal_id: PrincipalId,
        event: BusEvent,
        local: F,
    ) -> Result<(), ChatError>
    where
        F: Future<Output = Result<(), ChatError>>,
    {
        if self.try_publish_remote(principal_id, event).await?.is_none() {
            local.await?;
        }
        Ok(())
    }

    /// Publish `event` to `principal_id`'s owning node if it is clustered
    /// and hosted elsewhere. Returns `Some(())` if the publish happened
    /// (the caller should treat the target as reachable without running
    /// its local/offline fallback), `None` if the caller owns the
    /// principal itself or no cluster bus is configured.
    pub async fn try_publish_remote(
        &self,
        principal_id: PrincipalId,
        event: BusEvent,
    ) -> Result<Option<()>, ChatError> {
        if !self.clustered {
            return Ok(None);
        }
        let Some(channel) = self.locate_node(principal_id).await? else { return Ok(None) };
        if channel == self.own_channel() {
            return Ok(None);
        }
        self.bus.publish(&channel, event).await?;
        Ok(Some(()))
    }
}
