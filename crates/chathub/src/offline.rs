// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Offline policy: what runs when a target principal has no live Conn
//! anywhere in the cluster (§4.5).

use crate::action::receive_message_action;
use crate::assignment::AssignmentStore;
use crate::error::ChatError;
use crate::message::Message;
use crate::principal::PrincipalId;
use crate::store::{AdminRepo, Clock, MessageStore, PushNotifier, SessionStore};

/// Offline policy for an admin→user message: push-notify if the user has
/// an active subscription, then consume it (§4.5 admin→user case).
pub async fn run_admin_to_user(
    push: &dyn PushNotifier,
    user_id: PrincipalId,
    message: &Message,
) -> Result<(), ChatError> {
    if push.has_active_subscription(user_id).await? {
        push.notify(user_id, message).await?;
    }
    Ok(())
}

/// Offline policy for a user→admin message, run when the admin has no
/// live Conn anywhere (§4.5 user→admin case). Returns the frames that
/// were synthesized and delivered to the user, for callers that need to
/// route them onward (e.g. cross-node receivers reusing the same policy).
pub struct OfflineOutcome {
    pub auto_reply: Option<Message>,
    pub notice: Option<Message>,
    pub session_closed: bool,
}

#[allow(clippy::too_many_arguments)]
pub async fn run_user_to_admin(
    admin_repo: &dyn AdminRepo,
    assignments: &AssignmentStore,
    message_store: &dyn MessageStore,
    session_store: &dyn SessionStore,
    clock: &dyn Clock,
    admin_id: PrincipalId,
    user_id: PrincipalId,
    session_id: crate::message::SessionId,
    next_message_id: impl Fn() -> crate::message::MessageId,
) -> Result<OfflineOutcome, ChatError> {
    // Step 1: SceneAdminOffline is a presence notification, handled by the
    // caller via EventRouter/RoleAdapter (it has the admin's live Conn
    // registry, which this policy doesn't need).
    let Some(admin) = admin_repo.find(admin_id).await? else {
        return Ok(OfflineOutcome { auto_reply: None, notice: None, session_closed: false });
    };

    let mut outcome = OfflineOutcome { auto_reply: None, notice: None, session_closed: false };

    // Step 2: synthesize and persist an auto-reply if configured.
    if let Some(ref content) = admin.setting.offline_content {
        let reply = Message::offline_auto_reply(
            next_message_id(),
            user_id,
            admin_id,
            session_id,
            content.clone(),
            clock.now(),
        );
        let reply = message_store.save(reply).await?;
        outcome.auto_reply = Some(reply);
    }

    // Step 3: auto-close if the admin has been offline longer than the
    // group's configured offline duration.
    let group_id = admin.profile.group_id;
    let offline_duration = admin_repo.offline_duration_secs(group_id).await?;
    if clock.now() - admin.setting.last_online > offline_duration {
        session_store.close(session_id, clock.now()).await?;
        assignments.remove_user(admin_id, user_id).await?;

        let notice = Message::system_notice(
            next_message_id(),
            user_id,
            admin_id,
            session_id,
            admin.setting.break_message.clone(),
            clock.now(),
        );
        let notice = message_store.save(notice).await?;
        outcome.notice = Some(notice);
        outcome.session_closed = true;
    }

    Ok(outcome)
}

/// Build the wire frames for an `OfflineOutcome`, in delivery order.
pub fn outcome_frames(outcome: &OfflineOutcome, time: i64) -> Vec<crate::action::Action> {
    let mut frames = Vec::new();
    if let Some(ref reply) = outcome.auto_reply {
        frames.push(receive_message_action(time, reply));
    }
    if let Some(ref notice) = outcome.notice {
        frames.push(receive_message_action(time, notice));
    }
    frames
}
