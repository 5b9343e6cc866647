// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `UserRoleAdapter`: register/unregister/inbound hooks for the user-role
//! `Manager` (§4.7 user→admin branch).
//!
//! Routing a user's message to their admin needs the *admin* manager's
//! shards/locator, not this one's — `Manager<UserRoleAdapter>` only knows
//! about live user Conns. The two managers are constructed independently
//! and then cross-wired via `set_admin_manager`/`set_user_manager`
//! (`role::admin`'s mirror image), since neither can exist yet when the
//! other's adapter is built (§9 cyclic-reference guidance generalizes to
//! the two per-role managers referencing each other).

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use crate::action::{presence_action, waiting_users_action, Action, SendMessageData};
use crate::assignment::AssignmentStore;
use crate::bus::BusEvent;
use crate::conn::Conn;
use crate::delivery::{DeliveryEngine, DeliveryOutcome};
use crate::error::ChatError;
use crate::ids::IdAllocator;
use crate::manager::{Manager, RoleAdapter};
use crate::message::{ChatSession, Message, MessageSource};
use crate::offline;
use crate::principal::{GroupId, PrincipalId, Role};
use crate::role::AdminRoleAdapter;
use crate::store::{AdminRepo, Clock, MessageStore, SessionStore, UserRepo};
use crate::waiting;

pub struct UserRoleAdapter {
    admin_manager: OnceLock<Arc<Manager<AdminRoleAdapter>>>,
    assignments: Arc<AssignmentStore>,
    message_store: Arc<dyn MessageStore>,
    session_store: Arc<dyn SessionStore>,
    admin_repo: Arc<dyn AdminRepo>,
    user_repo: Arc<dyn UserRepo>,
    clock: Arc<dyn Clock>,
    ids: Arc<IdAllocator>,
}

impl UserRoleAdapter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        assignments: Arc<AssignmentStore>,
        message_store: Arc<dyn MessageStore>,
        session_store: Arc<dyn SessionStore>,
        admin_repo: Arc<dyn AdminRepo>,
        user_repo: Arc<dyn UserRepo>,
        clock: Arc<dyn Clock>,
        ids: Arc<IdAllocator>,
    ) -> Self {
        Self {
            admin_manager: OnceLock::new(),
            assignments,
            message_store,
            session_store,
            admin_repo,
            user_repo,
            clock,
            ids,
        }
    }

    /// Completes cross-wiring once the admin manager exists. Called once
    /// during startup, before either manager starts serving Conns.
    pub fn set_admin_manager(&self, manager: Arc<Manager<AdminRoleAdapter>>) {
        let _ = self.admin_manager.set(manager);
    }

    /// `None` only before `set_admin_manager` has run; every call site
    /// after startup treats that as nothing-to-do rather than panicking.
    fn admin_manager(&self) -> Option<Arc<Manager<AdminRoleAdapter>>> {
        self.admin_manager.get().cloned()
    }

    /// Notify the user's currently-assigned admin of a presence
    /// transition (§4.6 `user-online`/`user-offline` rows). A no-op if
    /// the user has no assignment.
    async fn notify_assigned_admin(&self, user_id: PrincipalId, online: bool) {
        let Ok(Some(admin_id)) = self.assignments.assigned_admin(user_id).await else { return };
        let Some(admin_manager) = self.admin_manager() else { return };
        let event = if online { BusEvent::UserOnline(user_id) } else { BusEvent::UserOffline(user_id) };
        let wire_action = if online { "frontend-online" } else { "frontend-offline" };
        let result = admin_manager
            .do_point(admin_id, event, async {
                if let Some(conn) = admin_manager.shards().get(admin_id).await {
                    let _ = conn.deliver(presence_action(wire_action, crate::time::now(), user_id));
                }
                Ok(())
            })
            .await;
        if let Err(err) = result {
            tracing::debug!(err = %err, admin_id, user_id, "failed to notify assigned admin of presence change");
        }
    }

    async fn handle_send_message(&self, conn: &Arc<Conn>, data: SendMessageData) -> Result<(), ChatError> {
        let user_id = conn.principal().id;
        let now = self.clock.now();

        let assigned_admin = self.assignments.assigned_admin(user_id).await?;
        let valid_admin = match assigned_admin {
            Some(admin_id) if self.assignments.is_user_valid(admin_id, user_id).await? => Some(admin_id),
            _ => None,
        };

        let Some(admin_id) = valid_admin else {
            self.enqueue_waiting(conn, user_id, data, now).await?;
            return Ok(());
        };

        let session = self.session_store.find_active(user_id).await?.filter(|s| s.admin_id == admin_id);
        let Some(session) = session else {
            conn.deliver(Action::error(now, "无效的会话"))?;
            return Ok(());
        };

        let message = Message {
            id: self.ids.next_message(),
            user_id,
            admin_id,
            source: MessageSource::User,
            kind: data.kind,
            content: data.content,
            session_id: session.id,
            req_id: data.req_id,
            received_at: now,
            is_read: false,
        };
        let message = self.message_store.save(message).await?;
        self.assignments.touch_last_chat(admin_id, user_id).await?;

        let admin_repo = Arc::clone(&self.admin_repo);
        let assignments = Arc::clone(&self.assignments);
        let message_store = Arc::clone(&self.message_store);
        let session_store = Arc::clone(&self.session_store);
        let clock = Arc::clone(&self.clock);
        let ids = Arc::clone(&self.ids);
        let session_id = session.id;
        let reply_conn = Arc::clone(conn);

        let admin_manager = self.admin_manager().ok_or(ChatError::Fatal)?;
        let engine = DeliveryEngine::new(&admin_manager);
        let outcome = engine
            .deliver(admin_id, &message, async move {
                let outcome = offline::run_user_to_admin(
                    admin_repo.as_ref(),
                    assignments.as_ref(),
                    message_store.as_ref(),
                    session_store.as_ref(),
                    clock.as_ref(),
                    admin_id,
                    user_id,
                    session_id,
                    || ids.next_message(),
                )
                .await?;
                for frame in offline::outcome_frames(&outcome, clock.now()) {
                    let _ = reply_conn.deliver(frame);
                }
                Ok(())
            })
            .await?;

        match outcome {
            DeliveryOutcome::Delivered => self.notify_self_presence(conn, user_id, true),
            DeliveryOutcome::Offline => self.notify_self_presence(conn, user_id, false),
        }
        Ok(())
    }

    /// Tell the sending user's own Conn whether their message reached a
    /// live admin (§4.5, §9's `UserManager.triggerMessageEvent` in the
    /// source).
    fn notify_self_presence(&self, conn: &Arc<Conn>, user_id: PrincipalId, online: bool) {
        let action = if online { "frontend-online" } else { "frontend-offline" };
        let _ = conn.deliver(presence_action(action, crate::time::now(), user_id));
    }

    async fn enqueue_waiting(
        &self,
        conn: &Arc<Conn>,
        user_id: PrincipalId,
        data: SendMessageData,
        now: i64,
    ) -> Result<(), ChatError> {
        let session = match self.session_store.find_current(user_id).await? {
            Some(s) if s.is_queued() => s,
            _ => {
                let session = ChatSession {
                    id: self.ids.next_session(),
                    user_id,
                    admin_id: 0,
                    started_at: now,
                    closed_at: None,
                };
                self.session_store.save(session).await?
            }
        };

        let message = Message {
            id: self.ids.next_message(),
            user_id,
            admin_id: 0,
            source: MessageSource::User,
            kind: data.kind,
            content: data.content,
            session_id: session.id,
            req_id: data.req_id,
            received_at: now,
            is_read: false,
        };
        self.message_store.save(message).await?;

        let group_id = conn.group_id().unwrap_or(0);
        let admin_manager = self.admin_manager().ok_or(ChatError::Fatal)?;
        let session_store = Arc::clone(&self.session_store);
        let message_store = Arc::clone(&self.message_store);
        let user_repo = Arc::clone(&self.user_repo);
        let broadcaster = Arc::clone(&admin_manager);
        let result = admin_manager
            .do_broadcast(BusEvent::WaitingUser(group_id), async move {
                broadcast_waiting_queue(&broadcaster, session_store.as_ref(), message_store.as_ref(), user_repo.as_ref(), group_id)
                    .await
            })
            .await;
        if let Err(err) = result {
            tracing::debug!(err = %err, group_id, "failed to publish waiting-user event");
        }
        Ok(())
    }
}

/// Recompute the waiting queue for `group_id` and push it to every live
/// admin Conn in that group (§4.6 `WaitingUser` row). Shared by the local
/// fallback of `do_broadcast` and by `EventRouter`'s handling of the
/// cross-node `WaitingUser` event via `AdminRoleAdapter::on_bus_event`.
pub(crate) async fn broadcast_waiting_queue(
    admin_manager: &Manager<AdminRoleAdapter>,
    session_store: &dyn SessionStore,
    message_store: &dyn MessageStore,
    user_repo: &dyn UserRepo,
    group_id: GroupId,
) -> Result<(), ChatError> {
    let entries = waiting::list_waiting(session_store, message_store, user_repo, group_id).await?;
    let frame = waiting_users_action(crate::time::now(), &entries);
    for conn in admin_manager.shards().for_each(Some(group_id)).await {
        let _ = conn.deliver(frame.clone());
    }
    Ok(())
}

#[async_trait]
impl RoleAdapter for UserRoleAdapter {
    fn role(&self) -> Role {
        Role::User
    }

    async fn on_register(&self, _manager: &Manager<Self>, conn: &Arc<Conn>) {
        self.notify_assigned_admin(conn.principal().id, true).await;
    }

    async fn on_unregister(&self, _manager: &Manager<Self>, principal_id: PrincipalId, _group_id: Option<GroupId>) {
        self.notify_assigned_admin(principal_id, false).await;
    }

    async fn handle_inbound(
        &self,
        _manager: &Manager<Self>,
        conn: &Arc<Conn>,
        action: Action,
    ) -> Result<(), ChatError> {
        match action.action.as_str() {
            "send-message" => {
                let data: SendMessageData =
                    serde_json::from_value(action.data).map_err(|_| ChatError::InvalidAction)?;
                self.handle_send_message(conn, data).await
            }
            "ping" => Ok(()),
            _ => Err(ChatError::InvalidAction),
        }
    }

    async fn on_bus_event(&self, _manager: &Manager<Self>, _event: BusEvent) {
        // Users have no group-wide broadcasts in §4.6; `Message` is
        // handled centrally by `EventRouter` and every other tag targets
        // admins only.
    }
}
