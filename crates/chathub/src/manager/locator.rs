// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster locator: maps a principal to the node currently hosting its
//! live `Conn`, via the shared KV (§4.3, §9).
//!
//! The source's locator has no TTL, so a node that crashes without
//! cleanup leaves a stale `chan:*` entry forever. §9 names a TTL +
//! periodic refresh as a mitigation an implementer should adopt; this is
//! that mitigation — `claim` sets a TTL and `spawn_refresh` keeps it
//! alive for as long as the Conn stays registered.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::ChatError;
use crate::principal::{PrincipalId, Role};
use crate::store::Kv;

fn chan_key(role: Role, principal_id: PrincipalId) -> String {
    format!("chan:{role}:{principal_id}")
}

pub async fn locate(
    kv: &dyn Kv,
    role: Role,
    principal_id: PrincipalId,
) -> Result<Option<String>, ChatError> {
    kv.get(&chan_key(role, principal_id)).await
}

pub async fn claim(
    kv: &dyn Kv,
    role: Role,
    principal_id: PrincipalId,
    node_channel: &str,
    ttl_secs: i64,
) -> Result<(), ChatError> {
    kv.set(&chan_key(role, principal_id), node_channel, Some(ttl_secs)).await
}

pub async fn release(kv: &dyn Kv, role: Role, principal_id: PrincipalId) -> Result<(), ChatError> {
    kv.del(&chan_key(role, principal_id)).await
}

/// Keep a principal's locator entry alive by re-claiming it at half the
/// TTL, until `cancel` fires (normally the owning Conn's close signal).
pub fn spawn_refresh(
    kv: Arc<dyn Kv>,
    role: Role,
    principal_id: PrincipalId,
    node_channel: String,
    ttl_secs: i64,
    cancel: CancellationToken,
) {
    let interval = Duration::from_secs((ttl_secs / 2).max(1) as u64);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; claim already set it
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = claim(kv.as_ref(), role, principal_id, &node_channel, ttl_secs).await {
                        tracing::debug!(err = %e, principal_id, "locator refresh failed");
                    }
                }
            }
        }
    });
}
