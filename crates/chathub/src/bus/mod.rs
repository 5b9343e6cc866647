// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-node event bus (§2, §4.6). Two publish modes: `publish` targets
//! one node's channel; `publish_to_all` fans out to every node hosting a
//! given role. Every node subscribes to both its own `NodeChannel` and the
//! shared per-role broadcast subject.

pub mod event;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

pub use event::BusEvent;

use crate::error::ChatError;
use crate::principal::Role;

/// A string derived from `(nodeIp, role)`, e.g. `10.0.0.4:9501-admin`. One
/// bus topic per NodeChannel; every node subscribes only to its own (§3).
pub fn node_channel(node_id: &str, role: Role) -> String {
    format!("{node_id}-{role}")
}

/// A live bus subscription. Each call to `recv` yields the next event,
/// skipping any this subscriber lagged behind on (logged, not surfaced).
#[async_trait]
pub trait BusSubscription: Send {
    async fn recv(&mut self) -> Option<BusEvent>;
}

/// Typed publish/subscribe over a broker; fan-out to per-node channels (§2).
#[async_trait]
pub trait Bus: Send + Sync {
    /// Point-publish to one node's channel (used for principal-targeted
    /// events via `Manager::locate_node`).
    async fn publish(&self, channel: &str, event: BusEvent) -> Result<(), ChatError>;

    /// Publish to every node hosting `role` (used for group-wide updates).
    async fn publish_to_all(&self, role: Role, event: BusEvent) -> Result<(), ChatError>;

    async fn subscribe(&self, channel: &str) -> Result<Box<dyn BusSubscription>, ChatError>;

    async fn subscribe_broadcast(&self, role: Role) -> Result<Box<dyn BusSubscription>, ChatError>;
}

struct BroadcastSubscription(broadcast::Receiver<BusEvent>);

#[async_trait]
impl BusSubscription for BroadcastSubscription {
    async fn recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.0.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "bus subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// In-process bus used when no cluster broker is configured
/// (`bus_url` unset). Every "remote" publish is simply fanned out to
/// local subscribers via a `tokio::sync::broadcast` channel per topic —
/// this is the single-node stand-in for the NATS-backed `Bus` and is what
/// the `Do(remote, local)` toggle degrades to.
pub struct LocalBus {
    channels: RwLock<HashMap<String, broadcast::Sender<BusEvent>>>,
    broadcasts: RwLock<HashMap<Role, broadcast::Sender<BusEvent>>>,
}

impl Default for LocalBus {
    fn default() -> Self {
        Self { channels: RwLock::new(HashMap::new()), broadcasts: RwLock::new(HashMap::new()) }
    }
}

impl LocalBus {
    const CAPACITY: usize = 256;

    async fn channel_sender(&self, channel: &str) -> broadcast::Sender<BusEvent> {
        if let Some(tx) = self.channels.read().await.get(channel) {
            return tx.clone();
        }
        let mut channels = self.channels.write().await;
        channels.entry(channel.to_owned()).or_insert_with(|| broadcast::channel(Self::CAPACITY).0).clone()
    }

    async fn broadcast_sender(&self, role: Role) -> broadcast::Sender<BusEvent> {
        if let Some(tx) = self.broadcasts.read().await.get(&role) {
            return tx.clone();
        }
        let mut broadcasts = self.broadcasts.write().await;
        broadcasts.entry(role).or_insert_with(|| broadcast::channel(Self::CAPACITY).0).clone()
    }
}

#[async_trait]
impl Bus for LocalBus {
    async fn publish(&self, channel: &str, event: BusEvent) -> Result<(), ChatError> {
        let _ = self.channel_sender(channel).await.send(event);
        Ok(())
    }

    async fn publish_to_all(&self, role: Role, event: BusEvent) -> Result<(), ChatError> {
        let _ = self.broadcast_sender(role).await.send(event);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Box<dyn BusSubscription>, ChatError> {
        Ok(Box::new(BroadcastSubscription(self.channel_sender(channel).await.subscribe())))
    }

    async fn subscribe_broadcast(&self, role: Role) -> Result<Box<dyn BusSubscription>, ChatError> {
        Ok(Box::new(BroadcastSubscription(self.broadcast_sender(role).await.subscribe())))
    }
}

/// NATS-backed `Bus`. Point-publishes land on `chat.node.{channel}`;
/// role-wide broadcasts land on `chat.broadcast.{role}`, a subject every
/// node of that role subscribes to in addition to its own node subject.
pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    pub async fn connect(url: &str, token: Option<&str>) -> anyhow::Result<Self> {
        let mut opts = async_nats::ConnectOptions::new().retry_on_initial_connect();
        if let Some(token) = token {
            opts = opts.token(token.to_owned());
        }
        let client = opts.connect(url).await?;
        Ok(Self { client })
    }

    fn node_subject(channel: &str) -> String {
        format!("chat.node.{channel}")
    }

    fn broadcast_subject(role: Role) -> String {
        format!("chat.broadcast.{role}")
    }
}

struct NatsSubscription(async_nats::Subscriber);

#[async_trait]
impl BusSubscription for NatsSubscription {
    async fn recv(&mut self) -> Option<BusEvent> {
        use futures_util::StreamExt;
        loop {
            let msg = self.0.next().await?;
            match serde_json::from_slice::<BusEvent>(&msg.payload) {
                Ok(event) => return Some(event),
                Err(e) => {
                    tracing::debug!(err = %e, "dropping malformed bus message");
                    continue;
                }
            }
        }
    }
}

#[async_trait]
impl Bus for NatsBus {
    async fn publish(&self, channel: &str, event: BusEvent) -> Result<(), ChatError> {
        let payload = serde_json::to_vec(&event).map_err(|_| ChatError::TransientIO)?;
        self.client
            .publish(Self::node_subject(channel), payload.into())
            .await
            .map_err(|e| {
                tracing::warn!(err = %e, "bus publish failed");
                ChatError::TransientIO
            })
    }

    async fn publish_to_all(&self, role: Role, event: BusEvent) -> Result<(), ChatError> {
        let payload = serde_json::to_vec(&event).map_err(|_| ChatError::TransientIO)?;
        self.client.publish(Self::broadcast_subject(role), payload.into()).await.map_err(|e| {
            tracing::warn!(err = %e, "bus broadcast publish failed");
            ChatError::TransientIO
        })
    }

    async fn subscribe(&self, channel: &str) -> Result<Box<dyn BusSubscription>, ChatError> {
        let sub = self.client.subscribe(Self::node_subject(channel)).await.map_err(|_| ChatError::Fatal)?;
        Ok(Box::new(NatsSubscription(sub)))
    }

    async fn subscribe_broadcast(&self, role: Role) -> Result<Box<dyn BusSubscription>, ChatError> {
        let sub =
            self.client.subscribe(Self::broadcast_subject(role)).await.map_err(|_| ChatError::Fatal)?;
        Ok(Box::new(NatsSubscription(sub)))
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
