// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transfer requests: reassigning a user from one admin to another (§3, S6).

use serde::{Deserialize, Serialize};

use crate::principal::PrincipalId;

pub type TransferId = u64;

/// `(id, fromAdminId, toAdminId, userId, createdAt, accepted, canceled)`.
/// A user has at most one non-terminal transfer at a time (§3 invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub from_admin_id: PrincipalId,
    pub to_admin_id: PrincipalId,
    pub user_id: PrincipalId,
    pub created_at: i64,
    pub accepted: bool,
    pub canceled: bool,
}

impl Transfer {
    pub fn new(
        id: TransferId,
        from_admin_id: PrincipalId,
        to_admin_id: PrincipalId,
        user_id: PrincipalId,
        created_at: i64,
    ) -> Self {
        Self { id, from_admin_id, to_admin_id, user_id, created_at, accepted: false, canceled: false }
    }

    pub fn is_terminal(&self) -> bool {
        self.accepted || self.canceled
    }
}
