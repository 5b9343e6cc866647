// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The persisted `Message` model and its wire-visible fields.

use serde::{Deserialize, Serialize};

use crate::principal::PrincipalId;

pub type MessageId = u64;
pub type SessionId = u64;

/// Who authored a message. Discriminant order follows the system this was
/// distilled from: user = 0, admin = 1, system = 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
#[serde(rename_all = "lowercase")]
pub enum MessageSource {
    User = 0,
    Admin = 1,
    System = 2,
}

/// Message content kind, as carried in the `send-message` wire action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Navigator,
    Notice,
}

/// A single chat message, durable once persisted via `MessageStore`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub user_id: PrincipalId,
    pub admin_id: PrincipalId,
    pub source: MessageSource,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub content: String,
    pub session_id: SessionId,
    /// Client-generated idempotency token, echoed back in a `receipt`.
    pub req_id: String,
    pub received_at: i64,
    pub is_read: bool,
}

impl Message {
    /// Build the system "notice" message delivered when an idle session is
    /// auto-closed by the offline policy (§4.5 step 3).
    pub fn system_notice(
        id: MessageId,
        user_id: PrincipalId,
        admin_id: PrincipalId,
        session_id: SessionId,
        content: impl Into<String>,
        received_at: i64,
    ) -> Self {
        Self {
            id,
            user_id,
            admin_id,
            source: MessageSource::System,
            kind: MessageType::Notice,
            content: content.into(),
            session_id,
            req_id: String::new(),
            received_at,
            is_read: false,
        }
    }

    /// Build the synthesized admin auto-reply delivered when the target
    /// admin is offline but has an `offline_content` setting (§4.5 step 2).
    pub fn offline_auto_reply(
        id: MessageId,
        user_id: PrincipalId,
        admin_id: PrincipalId,
        session_id: SessionId,
        content: impl Into<String>,
        received_at: i64,
    ) -> Self {
        Self {
            id,
            user_id,
            admin_id,
            source: MessageSource::Admin,
            kind: MessageType::Text,
            content: content.into(),
            session_id,
            req_id: String::new(),
            received_at,
            is_read: false,
        }
    }
}

/// Conversation record. A user's session is `queued` while `admin_id == 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: SessionId,
    pub user_id: PrincipalId,
    pub admin_id: PrincipalId,
    pub started_at: i64,
    pub closed_at: Option<i64>,
}

impl ChatSession {
    pub fn is_queued(&self) -> bool {
        self.admin_id == 0 && self.closed_at.is_none()
    }

    pub fn is_active(&self) -> bool {
        self.admin_id != 0 && self.closed_at.is_none()
    }
}
