// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The waiting queue: users whose session has no active assignment (§3).
//! Materialized from `SessionStore::list_unassigned`, not cached — the
//! queue is a view, never a source of truth. Visibility is scoped to an
//! admin's accessible groups (§3: "an admin sees only entries whose user
//! belongs to a group the admin has access to"), resolved here by joining
//! against `UserRepo` since the session record itself carries no group.

use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::message::ChatSession;
use crate::principal::{GroupId, PrincipalId};
use crate::store::{MessageStore, SessionStore, UserRepo};

const PREVIEW_LIMIT: usize = 3;

/// A user whose session has no active assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitingEntry {
    pub user_id: PrincipalId,
    pub group_id: GroupId,
    pub queued_at: i64,
    pub recent_message_preview: Vec<String>,
}

/// List the users currently waiting in `group_id`, most recently queued
/// first, each with a short preview of their most recent messages.
pub async fn list_waiting(
    session_store: &dyn SessionStore,
    message_store: &dyn MessageStore,
    user_repo: &dyn UserRepo,
    group_id: GroupId,
) -> Result<Vec<WaitingEntry>, ChatError> {
    let mut sessions: Vec<ChatSession> = session_store.list_unassigned(group_id).await?;
    sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));

    let mut entries = Vec::with_capacity(sessions.len());
    for session in sessions {
        let Some(user) = user_repo.find(session.user_id).await? else { continue };
        if user.profile.group_id != group_id {
            continue;
        }
        let preview = message_store
            .recent_for_session(session.id, PREVIEW_LIMIT)
            .await?
            .into_iter()
            .map(|m| m.content)
            .collect();
        entries.push(WaitingEntry {
            user_id: session.user_id,
            group_id,
            queued_at: session.started_at,
            recent_message_preview: preview,
        });
    }
    Ok(entries)
}
