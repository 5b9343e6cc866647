// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `EventRouter`: maps bus events to in-process manager actions (§4.6).
//!
//! Every node subscribes to its own `NodeChannel` and to the shared
//! per-role broadcast subject; each message pulled off either is
//! dispatched here. `Message` events are handled centrally (reload +
//! local delivery is identical regardless of role); every other tag is
//! forwarded to the owning `RoleAdapter::on_bus_event`.

use std::sync::Arc;

use crate::action::receive_message_action;
use crate::bus::BusEvent;
use crate::conn::CloseReason;
use crate::manager::{Manager, RoleAdapter};
use crate::message::MessageId;
use crate::principal::{PrincipalId, Role};
use crate::store::MessageStore;

pub struct EventRouter<R: RoleAdapter> {
    manager: Arc<Manager<R>>,
    message_store: Arc<dyn MessageStore>,
}

impl<R: RoleAdapter> EventRouter<R> {
    pub fn new(manager: Arc<Manager<R>>, message_store: Arc<dyn MessageStore>) -> Arc<Self> {
        Arc::new(Self { manager, message_store })
    }

    /// Spawn the two subscription loops (own node channel, role broadcast).
    pub fn spawn(self: &Arc<Self>) {
        let own = Arc::clone(self);
        tokio::spawn(async move {
            let channel = own.manager.own_channel();
            match own.manager.bus().subscribe(&channel).await {
                Ok(mut sub) => {
                    while let Some(event) = sub.recv().await {
                        own.dispatch(event).await;
                    }
                }
                Err(e) => tracing::error!(err = %e, channel, "event router failed to subscribe"),
            }
        });

        let broadcast = Arc::clone(self);
        tokio::spawn(async move {
            let role = broadcast.manager.role();
            match broadcast.manager.bus().subscribe_broadcast(role).await {
                Ok(mut sub) => {
                    while let Some(event) = sub.recv().await {
                        broadcast.dispatch(event).await;
                    }
                }
                Err(e) => tracing::error!(err = %e, %role, "event router failed to subscribe to broadcast"),
            }
        });
    }

    async fn dispatch(&self, event: BusEvent) {
        match event {
            BusEvent::Message(id) => self.deliver_reloaded(id).await,
            other => self.manager.adapter().on_bus_event(&self.manager, other).await,
        }
    }

    /// Reload a message from the store and attempt local delivery only —
    /// the remote branch is suppressed here to avoid ping-pong (§4.5).
    async fn deliver_reloaded(&self, id: MessageId) {
        let message = match self.message_store.find_by_id(id).await {
            Ok(Some(m)) => m,
            Ok(None) => {
                tracing::warn!(message_id = id, "bus message event referenced an unknown message");
                return;
            }
            Err(e) => {
                tracing::warn!(err = %e, message_id = id, "failed to reload message for remote delivery");
                return;
            }
        };

        let target: PrincipalId = match self.manager.role() {
            Role::Admin => message.admin_id,
            Role::User => message.user_id,
        };

        match self.manager.shards().get(target).await {
            Some(conn) => {
                let frame = receive_message_action(crate::time::now(), &message);
                if conn.deliver(frame).is_err() {
                    conn.close(CloseReason::SlowConsumer);
                }
            }
            None => {
                // At-most-once: the Conn died between LocateNode and
                // remote reception. The message stays in MessageStore.
                tracing::debug!(message_id = id, target, "remote delivery target has no live conn, dropping");
            }
        }
    }
}
