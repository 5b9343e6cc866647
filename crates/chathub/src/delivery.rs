// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `DeliveryEngine`: resolves a persisted message's destination — local,
//! remote node, or offline — and invokes the offline policy (§4.5).

use std::future::Future;

use crate::action::{receive_message_action, Action};
use crate::bus::BusEvent;
use crate::conn::CloseReason;
use crate::error::ChatError;
use crate::manager::{Manager, RoleAdapter};
use crate::message::Message;
use crate::principal::PrincipalId;

/// Which branch of the §4.5 decision tree a `deliver` call actually took.
/// Role adapters use this to decide whether to signal presence back to the
/// originating side (`SceneAdminOnline`/`SceneAdminOffline` in the source,
/// §4.6 `user-online`/`user-offline` rows) — local and remote-publish both
/// count as the target being reachable; only `Offline` means the offline
/// policy ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Offline,
}

/// Borrows the `Manager` that owns the target principal's connections.
/// Conceptually a separate component (§2), implemented as a thin wrapper
/// rather than an independent owner of shard/bus/locator state, since
/// `Manager` already owns exactly those (§9 cyclic-reference guidance).
/// Adapters always have a `&Manager<Self>` in hand when routing, so this
/// borrows rather than taking its own `Arc`.
pub struct DeliveryEngine<'a, R: RoleAdapter> {
    manager: &'a Manager<R>,
}

impl<'a, R: RoleAdapter> DeliveryEngine<'a, R> {
    pub fn new(manager: &'a Manager<R>) -> Self {
        Self { manager }
    }

    /// Route `message` to `target_id` (a principal of `manager`'s role).
    /// `offline` runs only when the target has no live Conn anywhere in
    /// the cluster (§4.5 decision tree); the returned outcome tells the
    /// caller whether that happened.
    pub async fn deliver<F>(
        &self,
        target_id: PrincipalId,
        message: &Message,
        offline: F,
    ) -> Result<DeliveryOutcome, ChatError>
    where
        F: Future<Output = Result<(), ChatError>>,
    {
        if let Some(conn) = self.manager.shards().get(target_id).await {
            let frame = receive_message_action(crate::time::now(), message);
            match conn.deliver(frame) {
                Ok(()) => return Ok(DeliveryOutcome::Delivered),
                Err(ChatError::QueueFull) => conn.close(CloseReason::SlowConsumer),
                Err(e) => return Err(e),
            }
        }

        if self.manager.try_publish_remote(target_id, BusEvent::Message(message.id)).await?.is_some() {
            return Ok(DeliveryOutcome::Delivered);
        }
        offline.await?;
        Ok(DeliveryOutcome::Offline)
    }

    /// Deliver a pre-built frame (e.g. a synthesized offline auto-reply or
    /// system notice) to a principal if it has a live local Conn; silent
    /// no-op otherwise, matching at-most-once semantics.
    pub async fn deliver_frame_if_local(&self, target_id: PrincipalId, frame: Action) {
        if let Some(conn) = self.manager.shards().get(target_id).await {
            if conn.deliver(frame).is_err() {
                conn.close(CloseReason::SlowConsumer);
            }
        }
    }

    pub fn manager(&self) -> &Manager<R> {
        self.manager
    }
}
