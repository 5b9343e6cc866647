// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The bus event taxonomy (§4.6).

use serde::{Deserialize, Serialize};

use crate::message::MessageId;
use crate::principal::{GroupId, PrincipalId};

/// Every inter-node event carries a tag and a payload. Bus delivery is
/// unordered across tags; each receiver handler must be independent (§5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "types", content = "data", rename_all = "kebab-case")]
pub enum BusEvent {
    /// Reload & deliver on the receiving node.
    Message(MessageId),
    /// Recompute and broadcast the waiting queue to admins in the group.
    WaitingUser(GroupId),
    /// Broadcast the roster of online admins in the group.
    Admin(GroupId),
    /// Notify the in-flight Conn for `adminId` that it has been superseded.
    #[serde(rename = "other-login")]
    OtherLogin(PrincipalId),
    /// Push pending transfers to the admin.
    #[serde(rename = "admin-transfer")]
    AdminTransfer(PrincipalId),
    /// Force refresh of the admin's cached `Setting`.
    #[serde(rename = "update-admin-setting")]
    UpdateAdminSetting(PrincipalId),
    /// Notify the assigned admin of user presence.
    #[serde(rename = "user-online")]
    UserOnline(PrincipalId),
    #[serde(rename = "user-offline")]
    UserOffline(PrincipalId),
}
