// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Conn wire protocol: `{action, time, data}` frames (§6).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::principal::PrincipalId;

/// A single framed message exchanged over a `Conn`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub action: String,
    pub time: i64,
    #[serde(default)]
    pub data: Value,
}

impl Action {
    pub fn new(action: impl Into<String>, time: i64, data: Value) -> Self {
        Self { action: action.into(), time, data }
    }

    pub fn ping(time: i64) -> Self {
        Self { action: "ping".to_owned(), time, data: Value::Null }
    }

    pub fn error(time: i64, message: impl Into<String>) -> Self {
        Self { action: "error".to_owned(), time, data: serde_json::json!({ "message": message.into() }) }
    }

    pub fn receipt(time: i64, user_id: PrincipalId, req_id: impl Into<String>) -> Self {
        Self {
            action: "receipt".to_owned(),
            time,
            data: serde_json::json!({ "user_id": user_id, "req_id": req_id.into() }),
        }
    }

    pub fn other_login(time: i64) -> Self {
        Self { action: "other-login".to_owned(), time, data: Value::Null }
    }

    pub fn more_than_one(time: i64) -> Self {
        Self { action: "more-than-one".to_owned(), time, data: Value::Null }
    }
}

/// Client→server `send-message` payload (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageData {
    #[serde(default)]
    pub user_id: PrincipalId,
    #[serde(rename = "type")]
    pub kind: crate::message::MessageType,
    pub content: String,
    pub req_id: String,
}

/// Server→client `receive-message` payload: the full persisted `Message`.
pub fn receive_message_action(time: i64, message: &crate::message::Message) -> Action {
    Action::new("receive-message", time, serde_json::json!(message))
}

/// Server→client `waiting-users` payload for one group.
pub fn waiting_users_action(time: i64, entries: &[crate::waiting::WaitingEntry]) -> Action {
    Action::new("waiting-users", time, serde_json::json!(entries))
}

/// Server→client roster payload (`backend-users`/`admins`).
pub fn roster_action(action: &str, time: i64, roster: &[PrincipalId]) -> Action {
    Action::new(action, time, serde_json::json!({ "ids": roster }))
}

/// Server→client presence payload (`frontend-online`/`frontend-offline`).
pub fn presence_action(action: &str, time: i64, user_id: PrincipalId) -> Action {
    Action::new(action, time, serde_json::json!({ "user_id": user_id }))
}

/// Server→client `user-transfer` payload: all of an admin's pending transfers.
pub fn user_transfer_action(time: i64, transfers: &[crate::transfer::Transfer]) -> Action {
    Action::new("user-transfer", time, serde_json::json!(transfers))
}
