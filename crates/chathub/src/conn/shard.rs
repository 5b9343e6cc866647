// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ConnectionShard`: a lock-striped registry mapping principal ID to live
//! `Conn` (§4.2).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::Conn;
use crate::principal::{GroupId, PrincipalId};

struct Shard {
    conns: RwLock<HashMap<PrincipalId, Arc<Conn>>>,
}

impl Shard {
    fn new() -> Self {
        Self { conns: RwLock::new(HashMap::new()) }
    }
}

/// A connection registry striped into `N` shards keyed by `principalId mod N`.
/// Sharding bounds tail latency of the hot `Get` path and of roster scans
/// (§4.2 Rationale).
pub struct ConnectionShard {
    shards: Vec<Shard>,
}

impl ConnectionShard {
    pub fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        Self { shards: (0..shard_count).map(|_| Shard::new()).collect() }
    }

    fn shard_for(&self, principal_id: PrincipalId) -> &Shard {
        let idx = (principal_id as usize) % self.shards.len();
        &self.shards[idx]
    }

    pub async fn get(&self, principal_id: PrincipalId) -> Option<Arc<Conn>> {
        self.shard_for(principal_id).conns.read().await.get(&principal_id).cloned()
    }

    /// Insert `conn`, returning the displaced `Conn` for the same principal,
    /// if any (§4.3 registration step 1-2).
    pub async fn put(&self, conn: Arc<Conn>) -> Option<Arc<Conn>> {
        let principal_id = conn.principal().id;
        self.shard_for(principal_id).conns.write().await.insert(principal_id, conn)
    }

    /// Remove the entry for `principal_id` only if its uuid matches `uuid` —
    /// prevents a stale unregister from evicting a successor Conn that
    /// already reconnected (§4.2 Rationale, §8 property 3).
    pub async fn remove(&self, principal_id: PrincipalId, uuid: &str) -> bool {
        let mut conns = self.shard_for(principal_id).conns.write().await;
        if conns.get(&principal_id).is_some_and(|c| c.uuid() == uuid) {
            conns.remove(&principal_id);
            true
        } else {
            false
        }
    }

    /// Snapshot of all live conns, optionally filtered by `group_id`
    /// (admin-only attribute; users never match a `Some` filter).
    pub async fn for_each(&self, group_id: Option<GroupId>) -> Vec<Arc<Conn>> {
        let mut out = Vec::new();
        for shard in &self.shards {
            let conns = shard.conns.read().await;
            out.extend(
                conns
                    .values()
                    .filter(|c| match group_id {
                        Some(g) => c.group_id() == Some(g),
                        None => true,
                    })
                    .cloned(),
            );
        }
        out
    }

    pub async fn len(&self) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.conns.read().await.len();
        }
        total
    }
}

#[cfg(test)]
#[path = "shard_tests.rs"]
mod tests;
