// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Principals: the addressable chat participants (users and admins).

use serde::{Deserialize, Serialize};

pub type PrincipalId = u64;
pub type GroupId = u64;

/// The two kinds of chat participant. Every `Conn` is bound to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `(role, id)` pair addressing a single chat participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub role: Role,
    pub id: PrincipalId,
}

impl Principal {
    pub fn user(id: PrincipalId) -> Self {
        Self { role: Role::User, id }
    }

    pub fn admin(id: PrincipalId) -> Self {
        Self { role: Role::Admin, id }
    }
}

/// Profile fields shared by users and admins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: PrincipalId,
    pub name: String,
    pub avatar: String,
    pub group_id: GroupId,
}

/// Per-admin settings: offline auto-reply, presence bookkeeping, break template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminSetting {
    /// Auto-reply content sent to a user when this admin is offline. `None`
    /// disables step 2 of the offline policy (§4.5).
    pub offline_content: Option<String>,
    /// Unix seconds of this admin's last observed online transition.
    pub last_online: i64,
    /// Template used to synthesize the system "notice" message on auto-close.
    pub break_message: String,
}

/// An admin principal: a `Profile` plus group membership and `Setting`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admin {
    pub profile: Profile,
    pub setting: AdminSetting,
}

impl Admin {
    pub fn principal(&self) -> Principal {
        Principal::admin(self.profile.id)
    }
}

/// A user principal: a `Profile` whose `group_id` selects the admin pool it
/// routes to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub profile: Profile,
}

impl User {
    pub fn principal(&self) -> Principal {
        Principal::user(self.profile.id)
    }
}
