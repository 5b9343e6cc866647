// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `AdminRoleAdapter`: register/unregister/inbound hooks for the admin-role
//! `Manager` (§4.7 admin→user branch), plus the non-`Message` bus event
//! handling for the admin side (§4.6).

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use crate::action::{self, presence_action, Action, SendMessageData};
use crate::assignment::AssignmentStore;
use crate::bus::BusEvent;
use crate::conn::Conn;
use crate::delivery::DeliveryEngine;
use crate::error::ChatError;
use crate::ids::IdAllocator;
use crate::manager::{Manager, RoleAdapter};
use crate::message::{Message, MessageSource};
use crate::offline;
use crate::principal::{GroupId, PrincipalId, Role};
use crate::role::user::broadcast_waiting_queue;
use crate::role::UserRoleAdapter;
use crate::store::{AdminRepo, Clock, MessageStore, PushNotifier, SessionStore, TransferStore, UserRepo};

pub struct AdminRoleAdapter {
    user_manager: OnceLock<Arc<Manager<UserRoleAdapter>>>,
    assignments: Arc<AssignmentStore>,
    message_store: Arc<dyn MessageStore>,
    session_store: Arc<dyn SessionStore>,
    transfer_store: Arc<dyn TransferStore>,
    admin_repo: Arc<dyn AdminRepo>,
    user_repo: Arc<dyn UserRepo>,
    push: Arc<dyn PushNotifier>,
    clock: Arc<dyn Clock>,
    ids: Arc<IdAllocator>,
    assignment_ttl_secs: i64,
}

impl AdminRoleAdapter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        assignments: Arc<AssignmentStore>,
        message_store: Arc<dyn MessageStore>,
        session_store: Arc<dyn SessionStore>,
        transfer_store: Arc<dyn TransferStore>,
        admin_repo: Arc<dyn AdminRepo>,
        user_repo: Arc<dyn UserRepo>,
        push: Arc<dyn PushNotifier>,
        clock: Arc<dyn Clock>,
        ids: Arc<IdAllocator>,
        assignment_ttl_secs: i64,
    ) -> Self {
        Self {
            user_manager: OnceLock::new(),
            assignments,
            message_store,
            session_store,
            transfer_store,
            admin_repo,
            user_repo,
            push,
            clock,
            ids,
            assignment_ttl_secs,
        }
    }

    /// Completes cross-wiring once the user manager exists (mirrors
    /// `UserRoleAdapter::set_admin_manager`).
    pub fn set_user_manager(&self, manager: Arc<Manager<UserRoleAdapter>>) {
        let _ = self.user_manager.set(manager);
    }

    /// `None` only before `set_user_manager` has run; see
    /// `UserRoleAdapter::admin_manager` for the mirrored accessor.
    fn user_manager(&self) -> Option<Arc<Manager<UserRoleAdapter>>> {
        self.user_manager.get().cloned()
    }

    async fn deliver_pending_transfers(&self, manager: &Manager<Self>, admin_id: PrincipalId) {
        let Some(conn) = manager.shards().get(admin_id).await else { return };
        match self.transfer_store.list_pending(admin_id).await {
            Ok(transfers) if !transfers.is_empty() => {
                let _ = conn.deliver(action::user_transfer_action(self.clock.now(), &transfers));
            }
            Ok(_) => {}
            Err(err) => tracing::debug!(err = %err, admin_id, "failed to load pending transfers"),
        }
    }

    /// Push the current admin roster for `group_id` to every admin Conn in
    /// that group (§4.6 `Admin` row, grounded on `broadcastAdmins`).
    async fn broadcast_admin_roster(&self, manager: &Manager<Self>, group_id: GroupId) {
        let conns = manager.shards().for_each(Some(group_id)).await;
        let roster: Vec<PrincipalId> = conns.iter().map(|c| c.principal().id).collect();
        let frame = action::roster_action("admins", self.clock.now(), &roster);
        for conn in &conns {
            let _ = conn.deliver(frame.clone());
        }
    }

    async fn broadcast_waiting(&self, manager: &Manager<Self>, group_id: GroupId) {
        if let Err(err) = broadcast_waiting_queue(
            manager,
            self.session_store.as_ref(),
            self.message_store.as_ref(),
            self.user_repo.as_ref(),
            group_id,
        )
        .await
        {
            tracing::debug!(err = %err, group_id, "failed to broadcast waiting queue");
        }
    }

    async fn handle_send_message(&self, conn: &Arc<Conn>, data: SendMessageData) -> Result<(), ChatError> {
        let admin_id = conn.principal().id;
        let user_id = data.user_id;
        let now = self.clock.now();

        if !self.assignments.is_user_valid(admin_id, user_id).await? {
            conn.deliver(Action::error(now, "该用户已失效，无法发送消息"))?;
            return Ok(());
        }

        let session = self.session_store.find_active(user_id).await?;
        let Some(session) = session.filter(|s| s.admin_id == admin_id) else {
            conn.deliver(Action::error(now, "无效的用户"))?;
            return Ok(());
        };

        let message = Message {
            id: self.ids.next_message(),
            user_id,
            admin_id,
            source: MessageSource::Admin,
            kind: data.kind,
            content: data.content,
            session_id: session.id,
            req_id: data.req_id.clone(),
            received_at: now,
            is_read: false,
        };
        let message = self.message_store.save(message).await?;
        self.assignments.update_limit_time(admin_id, user_id, Some(self.assignment_ttl_secs)).await?;
        self.assignments.touch_last_chat(admin_id, user_id).await?;

        conn.deliver(Action::receipt(now, user_id, data.req_id))?;

        let push = Arc::clone(&self.push);
        let reply = message.clone();
        let user_manager = self.user_manager().ok_or(ChatError::Fatal)?;
        let engine = DeliveryEngine::new(&user_manager);
        engine.deliver(user_id, &message, async move { offline::run_admin_to_user(push.as_ref(), user_id, &reply).await }).await?;
        Ok(())
    }
}

#[async_trait]
impl RoleAdapter for AdminRoleAdapter {
    fn role(&self) -> Role {
        Role::Admin
    }

    async fn on_register(&self, manager: &Manager<Self>, conn: &Arc<Conn>) {
        let admin_id = conn.principal().id;
        self.deliver_pending_transfers(manager, admin_id).await;
        if let Some(group_id) = conn.group_id() {
            self.broadcast_admin_roster(manager, group_id).await;
            self.broadcast_waiting(manager, group_id).await;
        }
    }

    async fn on_unregister(&self, manager: &Manager<Self>, principal_id: PrincipalId, group_id: Option<GroupId>) {
        if let Err(err) = self.admin_repo.touch_last_online(principal_id, self.clock.now()).await {
            tracing::debug!(err = %err, admin_id = principal_id, "failed to record last-online");
        }
        if let Some(group_id) = group_id {
            self.broadcast_admin_roster(manager, group_id).await;
        }
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

    async fn on_bus_event(&self, manager: &Manager<Self>, event: BusEvent) {
        match event {
            BusEvent::Message(_) => {}
            BusEvent::WaitingUser(group_id) => self.broadcast_waiting(manager, group_id).await,
            BusEvent::Admin(group_id) => self.broadcast_admin_roster(manager, group_id).await,
            BusEvent::OtherLogin(admin_id) => {
                if let Some(conn) = manager.shards().get(admin_id).await {
                    let _ = conn.deliver(Action::other_login(self.clock.now()));
                    conn.close(crate::conn::CloseReason::DuplicateLogin);
                }
            }
            BusEvent::AdminTransfer(admin_id) => self.deliver_pending_transfers(manager, admin_id).await,
            BusEvent::UpdateAdminSetting(_) => {
                // AdminRepo is always read fresh (no local setting cache in
                // this node), so there is nothing to invalidate here.
            }
            BusEvent::UserOnline(user_id) => self.notify_assigned_admin(manager, user_id, true).await,
            BusEvent::UserOffline(user_id) => self.notify_assigned_admin(manager, user_id, false).await,
        }
    }
}

impl AdminRoleAdapter {
    async fn notify_assigned_admin(&self, manager: &Manager<Self>, user_id: PrincipalId, online: bool) {
        match self.assignments.assigned_admin(user_id).await {
            Ok(Some(admin_id)) => {
                if let Some(conn) = manager.shards().get(admin_id).await {
                    let wire_action = if online { "frontend-online" } else { "frontend-offline" };
                    let _ = conn.deliver(presence_action(wire_action, self.clock.now(), user_id));
                }
            }
            Ok(None) => {}
            Err(err) => tracing::debug!(err = %err, user_id, "failed to resolve assigned admin"),
        }
    }
}
