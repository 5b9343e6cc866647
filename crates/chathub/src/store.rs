// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External collaborators the core depends on only as contracts (§1, §6):
//! a fast KV with TTL + sorted-set semantics, a `MessageStore`, a
//! `SessionStore`, `AdminRepo`/`UserRepo`, a `TransferStore`, a
//! `PushNotifier`, and a `Clock`. Production wiring supplies real
//! implementations (Redis, a relational store, WeChat push); this crate
//! ships in-memory implementations sufficient for single-node operation
//! and for the property/integration tests in §8.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::ChatError;
use crate::message::{ChatSession, Message, MessageId, SessionId};
use crate::principal::{Admin, GroupId, PrincipalId, User};
use crate::transfer::{Transfer, TransferId};

/// Wall-clock abstraction so tests can control time deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// The system clock, in Unix seconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// A fast KV with TTL and sorted-set semantics, matching the key space in
/// §6: sorted sets (score = validUntil or similar), hashes, and plain
/// strings with optional TTL.
#[async_trait::async_trait]
pub trait Kv: Send + Sync {
    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), ChatError>;
    async fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>, ChatError>;
    async fn zrem(&self, key: &str, member: &str) -> Result<(), ChatError>;
    /// Members with score greater than `min_exclusive`, up to `count` (0 = unbounded).
    async fn zrange_by_score_count(
        &self,
        key: &str,
        min_exclusive: i64,
        count: usize,
    ) -> Result<Vec<(String, i64)>, ChatError>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), ChatError>;
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, ChatError>;
    async fn hdel(&self, key: &str, field: &str) -> Result<(), ChatError>;

    async fn get(&self, key: &str) -> Result<Option<String>, ChatError>;
    /// `ttl_secs = None` means no expiry.
    async fn set(&self, key: &str, value: &str, ttl_secs: Option<i64>) -> Result<(), ChatError>;
    async fn del(&self, key: &str) -> Result<(), ChatError>;
}

#[derive(Default)]
struct StringEntry {
    value: String,
    expires_at: Option<i64>,
}

/// In-memory `Kv`. TTL is enforced lazily on read, matching how a Redis
/// client would observe expiry without a background sweep.
pub struct MemoryKv {
    clock: Arc<dyn Clock>,
    zsets: RwLock<HashMap<String, HashMap<String, i64>>>,
    hashes: RwLock<HashMap<String, HashMap<String, String>>>,
    strings: RwLock<HashMap<String, StringEntry>>,
}

impl MemoryKv {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            zsets: RwLock::new(HashMap::new()),
            hashes: RwLock::new(HashMap::new()),
            strings: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait::async_trait]
impl Kv for MemoryKv {
    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), ChatError> {
        self.zsets.write().await.entry(key.to_owned()).or_default().insert(member.to_owned(), score);
        Ok(())
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>, ChatError> {
        Ok(self.zsets.read().await.get(key).and_then(|m| m.get(member).copied()))
    }

    async fn zrem(&self, key: &str, member: &str) -> Result<(), ChatError> {
        if let Some(set) = self.zsets.write().await.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn zrange_by_score_count(
        &self,
        key: &str,
        min_exclusive: i64,
        count: usize,
    ) -> Result<Vec<(String, i64)>, ChatError> {
        let sets = self.zsets.read().await;
        let Some(set) = sets.get(key) else { return Ok(Vec::new()) };
        let mut members: Vec<(String, i64)> =
            set.iter().filter(|(_, &score)| score > min_exclusive).map(|(m, &s)| (m.clone(), s)).collect();
        members.sort_by(|a, b| b.1.cmp(&a.1));
        if count > 0 {
            members.truncate(count);
        }
        Ok(members)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), ChatError> {
        self.hashes
            .write()
            .await
            .entry(key.to_owned())
            .or_default()
            .insert(field.to_owned(), value.to_owned());
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, ChatError> {
        Ok(self.hashes.read().await.get(key).and_then(|m| m.get(field).cloned()))
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<(), ChatError> {
        if let Some(map) = self.hashes.write().await.get_mut(key) {
            map.remove(field);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ChatError> {
        let now = self.clock.now();
        let mut strings = self.strings.write().await;
        if let Some(entry) = strings.get(key) {
            if entry.expires_at.is_some_and(|exp| exp <= now) {
                strings.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<i64>) -> Result<(), ChatError> {
        let expires_at = ttl_secs.map(|ttl| self.clock.now() + ttl);
        self.strings
            .write()
            .await
            .insert(key.to_owned(), StringEntry { value: value.to_owned(), expires_at });
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), ChatError> {
        self.strings.write().await.remove(key);
        Ok(())
    }
}

/// Durable message storage, out of scope per §1 — interface only.
#[async_trait::async_trait]
pub trait MessageStore: Send + Sync {
    async fn save(&self, message: Message) -> Result<Message, ChatError>;
    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, ChatError>;
    /// Recent messages for a session, oldest first. Backs the waiting-queue
    /// preview (`WaitingEntry::recent_message_preview`, §3).
    async fn recent_for_session(
        &self,
        session_id: SessionId,
        limit: usize,
    ) -> Result<Vec<Message>, ChatError>;
}

/// Durable session storage, out of scope per §1 — interface only.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, session: ChatSession) -> Result<ChatSession, ChatError>;
    async fn find_active(
        &self,
        user_id: PrincipalId,
    ) -> Result<Option<ChatSession>, ChatError>;
    /// The user's current non-terminal session, queued or active. Used to
    /// decide whether a `send-message` re-enters the waiting queue or reuses
    /// the already-queued session (§4.8: closed -> queued on next message).
    async fn find_current(&self, user_id: PrincipalId) -> Result<Option<ChatSession>, ChatError>;
    async fn close(&self, id: SessionId, closed_at: i64) -> Result<(), ChatError>;
    /// Transition a queued session to active under `admin_id` (§4.8
    /// queued --admin-accepts--> active; the session id is unchanged).
    async fn assign_admin(&self, id: SessionId, admin_id: PrincipalId) -> Result<ChatSession, ChatError>;
    /// All sessions with `admin_id == 0` and unclosed, i.e. the waiting queue.
    async fn list_unassigned(&self, group_id: GroupId) -> Result<Vec<ChatSession>, ChatError>;
}

/// Admin profile/settings repository, out of scope per §1 — interface only.
#[async_trait::async_trait]
pub trait AdminRepo: Send + Sync {
    async fn find(&self, id: PrincipalId) -> Result<Option<Admin>, ChatError>;
    async fn offline_duration_secs(&self, group_id: GroupId) -> Result<i64, ChatError>;
    /// Record `now` as the admin's last-online transition (§3 Admin.Setting,
    /// consumed by the offline policy's `lastOnline + offlineDuration`
    /// check, §4.5 step 3). Called from `Manager::unregister`'s role hook.
    async fn touch_last_online(&self, admin_id: PrincipalId, now: i64) -> Result<(), ChatError>;
}

/// User profile repository, out of scope per §1 — interface only.
#[async_trait::async_trait]
pub trait UserRepo: Send + Sync {
    async fn find(&self, id: PrincipalId) -> Result<Option<User>, ChatError>;
}

/// Transfer log, out of scope per §1 — interface only.
#[async_trait::async_trait]
pub trait TransferStore: Send + Sync {
    async fn save(&self, transfer: Transfer) -> Result<Transfer, ChatError>;
    async fn find(&self, id: TransferId) -> Result<Option<Transfer>, ChatError>;
    async fn list_pending(&self, to_admin_id: PrincipalId) -> Result<Vec<Transfer>, ChatError>;
    /// A user's single non-terminal transfer, if any (invariant in §3).
    async fn find_open_for_user(&self, user_id: PrincipalId) -> Result<Option<Transfer>, ChatError>;
}

/// Push notification transport (e.g. WeChat subscribe-push), out of scope
/// per §1 — interface only. `notify` consumes the subscription.
#[async_trait::async_trait]
pub trait PushNotifier: Send + Sync {
    async fn has_active_subscription(&self, user_id: PrincipalId) -> Result<bool, ChatError>;
    async fn notify(&self, user_id: PrincipalId, message: &Message) -> Result<(), ChatError>;
}

/// In-memory `MessageStore`/`SessionStore` pair backing the single-node
/// test harness (§8).
pub struct MemoryPersistence {
    messages: RwLock<HashMap<MessageId, Message>>,
    messages_by_session: RwLock<HashMap<SessionId, Vec<MessageId>>>,
    sessions: RwLock<HashMap<SessionId, ChatSession>>,
    /// The user's single current non-terminal session (queued or active);
    /// removed on close.
    current_by_user: RwLock<HashMap<PrincipalId, SessionId>>,
}

impl Default for MemoryPersistence {
    fn default() -> Self {
        Self {
            messages: RwLock::new(HashMap::new()),
            messages_by_session: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            current_by_user: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait::async_trait]
impl MessageStore for MemoryPersistence {
    async fn save(&self, message: Message) -> Result<Message, ChatError> {
        self.messages_by_session
            .write()
            .await
            .entry(message.session_id)
            .or_default()
            .push(message.id);
        self.messages.write().await.insert(message.id, message.clone());
        Ok(message)
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, ChatError> {
        Ok(self.messages.read().await.get(&id).cloned())
    }

    async fn recent_for_session(
        &self,
        session_id: SessionId,
        limit: usize,
    ) -> Result<Vec<Message>, ChatError> {
        let by_session = self.messages_by_session.read().await;
        let Some(ids) = by_session.get(&session_id) else { return Ok(Vec::new()) };
        let messages = self.messages.read().await;
        Ok(ids.iter().rev().take(limit).rev().filter_map(|id| messages.get(id).cloned()).collect())
    }
}

#[async_trait::async_trait]
impl SessionStore for MemoryPersistence {
    async fn save(&self, session: ChatSession) -> Result<ChatSession, ChatError> {
        if session.closed_at.is_none() {
            self.current_by_user.write().await.insert(session.user_id, session.id);
        }
        self.sessions.write().await.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_active(&self, user_id: PrincipalId) -> Result<Option<ChatSession>, ChatError> {
        let Some(&id) = self.current_by_user.read().await.get(&user_id) else { return Ok(None) };
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&id).filter(|s| s.is_active()).cloned())
    }

    async fn find_current(&self, user_id: PrincipalId) -> Result<Option<ChatSession>, ChatError> {
        let Some(&id) = self.current_by_user.read().await.get(&user_id) else { return Ok(None) };
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn close(&self, id: SessionId, closed_at: i64) -> Result<(), ChatError> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(&id) {
            session.closed_at = Some(closed_at);
            self.current_by_user.write().await.remove(&session.user_id);
        }
        Ok(())
    }

    async fn assign_admin(&self, id: SessionId, admin_id: PrincipalId) -> Result<ChatSession, ChatError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(ChatError::InvalidSession)?;
        session.admin_id = admin_id;
        Ok(session.clone())
    }

    async fn list_unassigned(&self, _group_id: GroupId) -> Result<Vec<ChatSession>, ChatError> {
        Ok(self.sessions.read().await.values().filter(|s| s.is_queued()).cloned().collect())
    }
}

/// In-memory `TransferStore`, kept separate from `MemoryPersistence`
/// since `TransferStore` is its own collaborator per §1. Transfer ids
/// are allocated by the shared `IdAllocator`, not by this store.
#[derive(Default)]
pub struct MemoryTransferStore {
    transfers: RwLock<HashMap<TransferId, Transfer>>,
    open_by_user: RwLock<HashMap<PrincipalId, TransferId>>,
}

#[async_trait::async_trait]
impl TransferStore for MemoryTransferStore {
    async fn save(&self, transfer: Transfer) -> Result<Transfer, ChatError> {
        let mut open_by_user = self.open_by_user.write().await;
        if transfer.is_terminal() {
            open_by_user.remove(&transfer.user_id);
        } else {
            open_by_user.insert(transfer.user_id, transfer.id);
        }
        self.transfers.write().await.insert(transfer.id, transfer.clone());
        Ok(transfer)
    }

    async fn find(&self, id: TransferId) -> Result<Option<Transfer>, ChatError> {
        Ok(self.transfers.read().await.get(&id).cloned())
    }

    async fn list_pending(&self, to_admin_id: PrincipalId) -> Result<Vec<Transfer>, ChatError> {
        Ok(self
            .transfers
            .read()
            .await
            .values()
            .filter(|t| t.to_admin_id == to_admin_id && !t.is_terminal())
            .cloned()
            .collect())
    }

    async fn find_open_for_user(&self, user_id: PrincipalId) -> Result<Option<Transfer>, ChatError> {
        let Some(&id) = self.open_by_user.read().await.get(&user_id) else { return Ok(None) };
        Ok(self.transfers.read().await.get(&id).cloned())
    }
}

/// A no-op push notifier: always reports no active subscription. Suitable
/// for tests and for deployments without a configured push backend.
#[derive(Default)]
pub struct NullPushNotifier;

#[async_trait::async_trait]
impl PushNotifier for NullPushNotifier {
    async fn has_active_subscription(&self, _user_id: PrincipalId) -> Result<bool, ChatError> {
        Ok(false)
    }

    async fn notify(&self, _user_id: PrincipalId, _message: &Message) -> Result<(), ChatError> {
        Ok(())
    }
}

/// In-memory `AdminRepo`/`UserRepo` pair. Seeded directly by the caller
/// (production wiring would be a relational store, out of scope per §1);
/// `per_group_offline_secs` defaults every unlisted group to
/// `ChatConfig::offline_duration_secs`.
pub struct MemoryDirectory {
    admins: RwLock<HashMap<PrincipalId, Admin>>,
    users: RwLock<HashMap<PrincipalId, User>>,
    default_offline_secs: i64,
    per_group_offline_secs: RwLock<HashMap<GroupId, i64>>,
}

impl MemoryDirectory {
    pub fn new(default_offline_secs: i64) -> Self {
        Self {
            admins: RwLock::new(HashMap::new()),
            users: RwLock::new(HashMap::new()),
            default_offline_secs,
            per_group_offline_secs: RwLock::new(HashMap::new()),
        }
    }

    pub async fn put_admin(&self, admin: Admin) {
        self.admins.write().await.insert(admin.profile.id, admin);
    }

    pub async fn put_user(&self, user: User) {
        self.users.write().await.insert(user.profile.id, user);
    }

    pub async fn set_offline_duration(&self, group_id: GroupId, secs: i64) {
        self.per_group_offline_secs.write().await.insert(group_id, secs);
    }
}

#[async_trait::async_trait]
impl AdminRepo for MemoryDirectory {
    async fn find(&self, id: PrincipalId) -> Result<Option<Admin>, ChatError> {
        Ok(self.admins.read().await.get(&id).cloned())
    }

    async fn offline_duration_secs(&self, group_id: GroupId) -> Result<i64, ChatError> {
        Ok(self
            .per_group_offline_secs
            .read()
            .await
            .get(&group_id)
            .copied()
            .unwrap_or(self.default_offline_secs))
    }

    async fn touch_last_online(&self, admin_id: PrincipalId, now: i64) -> Result<(), ChatError> {
        if let Some(admin) = self.admins.write().await.get_mut(&admin_id) {
            admin.setting.last_online = now;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl UserRepo for MemoryDirectory {
    async fn find(&self, id: PrincipalId) -> Result<Option<User>, ChatError> {
        Ok(self.users.read().await.get(&id).cloned())
    }
}
