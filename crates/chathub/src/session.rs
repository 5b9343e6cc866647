// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session/assignment lifecycle transitions (§3 Session state machine,
//! §4.8): accepting a waiting user, manual close, and the transfer
//! acceptance/cancellation pair. These are invoked by the out-of-scope
//! HTTP admin-console handlers (§1); this module is the core logic they
//! call into, grounded on `admin_manager.go`'s `AddUser`/transfer flow.

use crate::assignment::AssignmentStore;
use crate::error::ChatError;
use crate::ids::IdAllocator;
use crate::message::ChatSession;
use crate::principal::PrincipalId;
use crate::store::{Clock, SessionStore, TransferStore};
use crate::transfer::{Transfer, TransferId};

/// `queued --admin-accepts--> active` (§4.8). Binds `user_id` to
/// `admin_id` in the `AssignmentStore` and transitions the user's queued
/// session in place (same session id, `admin_id` now set).
pub async fn accept_waiting(
    assignments: &AssignmentStore,
    session_store: &dyn SessionStore,
    admin_id: PrincipalId,
    user_id: PrincipalId,
    ttl_secs: Option<i64>,
) -> Result<ChatSession, ChatError> {
    let session = session_store.find_current(user_id).await?.ok_or(ChatError::InvalidSession)?;
    if !session.is_queued() {
        return Err(ChatError::InvalidSession);
    }
    assignments.add_user(admin_id, user_id, ttl_secs).await?;
    session_store.assign_admin(session.id, admin_id).await
}

/// `active --manual-close--> closed` (§4.8), triggered by the admin
/// ending a conversation outright.
pub async fn manual_close(
    assignments: &AssignmentStore,
    session_store: &dyn SessionStore,
    clock: &dyn Clock,
    admin_id: PrincipalId,
    user_id: PrincipalId,
) -> Result<(), ChatError> {
    let session = session_store.find_active(user_id).await?.ok_or(ChatError::InvalidSession)?;
    if session.admin_id != admin_id {
        return Err(ChatError::InvalidUser);
    }
    session_store.close(session.id, clock.now()).await?;
    assignments.remove_user(admin_id, user_id).await
}

/// Open a transfer request. A user has at most one non-terminal transfer
/// at a time (§3 invariant).
pub async fn initiate_transfer(
    transfer_store: &dyn TransferStore,
    clock: &dyn Clock,
    ids: &IdAllocator,
    from_admin_id: PrincipalId,
    to_admin_id: PrincipalId,
    user_id: PrincipalId,
) -> Result<Transfer, ChatError> {
    if transfer_store.find_open_for_user(user_id).await?.is_some() {
        return Err(ChatError::InvalidAction);
    }
    let transfer = Transfer::new(ids.next_transfer(), from_admin_id, to_admin_id, user_id, clock.now());
    transfer_store.save(transfer).await
}

pub async fn cancel_transfer(
    transfer_store: &dyn TransferStore,
    transfer_id: TransferId,
) -> Result<(), ChatError> {
    let mut transfer = transfer_store.find(transfer_id).await?.ok_or(ChatError::InvalidAction)?;
    if transfer.is_terminal() {
        return Err(ChatError::InvalidAction);
    }
    transfer.canceled = true;
    transfer_store.save(transfer).await?;
    Ok(())
}

/// `active --transfer-accept--> closed` for the old admin, with a new
/// `active` session opened for the receiving admin (§4.8, S6). The old
/// admin's active-set entry is removed and the new admin's is added in
/// the same call, preserving the §3 invariant that at most one admin has
/// an active assignment for a user at a time.
pub async fn accept_transfer(
    assignments: &AssignmentStore,
    session_store: &dyn SessionStore,
    transfer_store: &dyn TransferStore,
    clock: &dyn Clock,
    ids: &IdAllocator,
    transfer_id: TransferId,
) -> Result<ChatSession, ChatError> {
    let mut transfer = transfer_store.find(transfer_id).await?.ok_or(ChatError::InvalidAction)?;
    if transfer.is_terminal() {
        return Err(ChatError::InvalidAction);
    }

    let old_session = session_store.find_active(transfer.user_id).await?.ok_or(ChatError::InvalidSession)?;
    session_store.close(old_session.id, clock.now()).await?;
    assignments.remove_user(transfer.from_admin_id, transfer.user_id).await?;
    assignments.add_user(transfer.to_admin_id, transfer.user_id, None).await?;

    let new_session = ChatSession {
        id: ids.next_session(),
        user_id: transfer.user_id,
        admin_id: transfer.to_admin_id,
        started_at: clock.now(),
        closed_at: None,
    };
    let saved = session_store.save(new_session).await?;

    transfer.accepted = true;
    transfer_store.save(transfer).await?;
    Ok(saved)
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
