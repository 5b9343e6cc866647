// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The user↔admin binding: validity TTL, reverse lookup, and the
//! last-chat map (§4.4).

use std::sync::Arc;

use crate::error::ChatError;
use crate::principal::PrincipalId;
use crate::store::{Clock, Kv};

const DEFAULT_TTL_SECS: i64 = 86_400;

fn active_set_key(admin_id: PrincipalId) -> String {
    format!("admin:{admin_id}:chat-user")
}

fn last_chat_key(admin_id: PrincipalId) -> String {
    format!("admin:{admin_id}:chat-user:last-time")
}

fn reverse_binding_key(user_id: PrincipalId) -> String {
    format!("user:{user_id}:admin")
}

/// Binds users to admins with a time-bounded validity, backed by `Kv`.
/// Holds no in-process locks — atomicity comes from the KV's own
/// operations (§5 Locking).
pub struct AssignmentStore {
    kv: Arc<dyn Kv>,
    clock: Arc<dyn Clock>,
}

impl AssignmentStore {
    pub fn new(kv: Arc<dyn Kv>, clock: Arc<dyn Clock>) -> Self {
        Self { kv, clock }
    }

    /// `IsUserValid(admin, user) = score(admin, user) > now` (§4.4, §8 property 1).
    pub async fn is_user_valid(&self, admin_id: PrincipalId, user_id: PrincipalId) -> Result<bool, ChatError> {
        let score = self.kv.zscore(&active_set_key(admin_id), &user_id.to_string()).await?;
        Ok(score.is_some_and(|s| s > self.clock.now()))
    }

    /// Bind `user` to `admin` with TTL `ttl_secs` (default 86400s), and set
    /// the reverse binding `user:{id}:admin` (§8 property 2).
    pub async fn add_user(
        &self,
        admin_id: PrincipalId,
        user_id: PrincipalId,
        ttl_secs: Option<i64>,
    ) -> Result<(), ChatError> {
        let valid_until = self.clock.now() + ttl_secs.unwrap_or(DEFAULT_TTL_SECS);
        self.kv.zadd(&active_set_key(admin_id), &user_id.to_string(), valid_until).await?;
        self.kv.set(&reverse_binding_key(user_id), &admin_id.to_string(), None).await?;
        Ok(())
    }

    /// Refresh an existing binding's validity without touching the reverse
    /// binding (it is unchanged while the admin stays the same).
    pub async fn update_limit_time(
        &self,
        admin_id: PrincipalId,
        user_id: PrincipalId,
        ttl_secs: Option<i64>,
    ) -> Result<(), ChatError> {
        let valid_until = self.clock.now() + ttl_secs.unwrap_or(DEFAULT_TTL_SECS);
        self.kv.zadd(&active_set_key(admin_id), &user_id.to_string(), valid_until).await
    }

    pub async fn remove_user(&self, admin_id: PrincipalId, user_id: PrincipalId) -> Result<(), ChatError> {
        self.kv.zrem(&active_set_key(admin_id), &user_id.to_string()).await?;
        self.kv.del(&reverse_binding_key(user_id)).await?;
        Ok(())
    }

    /// The admin currently assigned to `user`, via the reverse binding.
    pub async fn assigned_admin(&self, user_id: PrincipalId) -> Result<Option<PrincipalId>, ChatError> {
        let raw = self.kv.get(&reverse_binding_key(user_id)).await?;
        Ok(raw.and_then(|s| s.parse().ok()))
    }

    /// `GetActiveCount(A)`: members of the active set with score > now (§3, §8 property 4).
    pub async fn active_count(&self, admin_id: PrincipalId) -> Result<usize, ChatError> {
        let now = self.clock.now();
        Ok(self.kv.zrange_by_score_count(&active_set_key(admin_id), now, 0).await?.len())
    }

    /// Active users for an admin, most-recently-valid first: `(userId, validUntil)`.
    pub async fn active_users(&self, admin_id: PrincipalId) -> Result<Vec<(PrincipalId, i64)>, ChatError> {
        let now = self.clock.now();
        let raw = self.kv.zrange_by_score_count(&active_set_key(admin_id), now, 0).await?;
        Ok(raw.into_iter().filter_map(|(member, score)| member.parse().ok().map(|id| (id, score))).collect())
    }

    pub async fn touch_last_chat(&self, admin_id: PrincipalId, user_id: PrincipalId) -> Result<(), ChatError> {
        let now = self.clock.now();
        self.kv.hset(&last_chat_key(admin_id), &user_id.to_string(), &now.to_string()).await
    }

    pub async fn last_chat_at(
        &self,
        admin_id: PrincipalId,
        user_id: PrincipalId,
    ) -> Result<Option<i64>, ChatError> {
        let raw = self.kv.hget(&last_chat_key(admin_id), &user_id.to_string()).await?;
        Ok(raw.and_then(|s| s.parse().ok()))
    }
}

#[cfg(test)]
#[path = "assignment_tests.rs"]
mod tests;
