// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios against an in-process admin/user `Manager` pair,
//! wired with `MemoryKv` and a `LocalBus` the way `chathub::run` wires
//! production collaborators, but driven directly through `RoleAdapter`
//! rather than over a real socket.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use chathub::action::Action;
use chathub::assignment::AssignmentStore;
use chathub::bus::LocalBus;
use chathub::conn::Conn;
use chathub::ids::IdAllocator;
use chathub::manager::{Manager, RoleAdapter};
use chathub::message::{ChatSession, SessionId};
use chathub::principal::{Admin, AdminSetting, Principal, PrincipalId, Profile, User};
use chathub::role::{AdminRoleAdapter, UserRoleAdapter};
use chathub::store::{
    AdminRepo, Clock, MemoryDirectory, MemoryKv, MemoryPersistence, MemoryTransferStore,
    MessageStore, NullPushNotifier, SessionStore, TransferStore,
};

struct TestClock(AtomicI64);

impl TestClock {
    fn new(start: i64) -> Arc<Self> {
        Arc::new(Self(AtomicI64::new(start)))
    }

    fn advance(&self, secs: i64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

struct Harness {
    admin_manager: Arc<Manager<AdminRoleAdapter>>,
    user_manager: Arc<Manager<UserRoleAdapter>>,
    sessions: Arc<MemoryPersistence>,
    transfers: Arc<MemoryTransferStore>,
    assignments: Arc<AssignmentStore>,
    directory: Arc<MemoryDirectory>,
    ids: Arc<IdAllocator>,
    clock: Arc<TestClock>,
}

const ASSIGNMENT_TTL: i64 = 3600;
const OFFLINE_DURATION: i64 = 60;

fn build_harness() -> Harness {
    let clock = TestClock::new(1_000_000);
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let kv = Arc::new(MemoryKv::new(Arc::clone(&dyn_clock)));
    let assignments = Arc::new(AssignmentStore::new(kv.clone(), Arc::clone(&dyn_clock)));
    let sessions = Arc::new(MemoryPersistence::default());
    let transfers = Arc::new(MemoryTransferStore::default());
    let directory = Arc::new(MemoryDirectory::new(OFFLINE_DURATION));
    let push = Arc::new(NullPushNotifier);
    let ids = Arc::new(IdAllocator::default());
    let bus = Arc::new(LocalBus::default());

    let admin_adapter = AdminRoleAdapter::new(
        Arc::clone(&assignments),
        Arc::clone(&sessions) as Arc<dyn MessageStore>,
        Arc::clone(&sessions) as Arc<dyn SessionStore>,
        Arc::clone(&transfers) as Arc<dyn TransferStore>,
        Arc::clone(&directory) as Arc<dyn AdminRepo>,
        Arc::clone(&directory) as Arc<dyn chathub::store::UserRepo>,
        push,
        Arc::clone(&dyn_clock),
        Arc::clone(&ids),
        ASSIGNMENT_TTL,
    );
    let user_adapter = UserRoleAdapter::new(
        Arc::clone(&assignments),
        Arc::clone(&sessions) as Arc<dyn MessageStore>,
        Arc::clone(&sessions) as Arc<dyn SessionStore>,
        Arc::clone(&directory) as Arc<dyn AdminRepo>,
        Arc::clone(&directory) as Arc<dyn chathub::store::UserRepo>,
        Arc::clone(&dyn_clock),
        Arc::clone(&ids),
    );

    let (admin_manager, _admin_rx) =
        Manager::new("node-a".to_owned(), false, 4, 16, kv.clone(), bus.clone(), admin_adapter);
    let (user_manager, _user_rx) =
        Manager::new("node-a".to_owned(), false, 4, 16, kv, bus, user_adapter);

    admin_manager.adapter().set_user_manager(Arc::clone(&user_manager));
    user_manager.adapter().set_admin_manager(Arc::clone(&admin_manager));

    Harness { admin_manager, user_manager, sessions, transfers, assignments, directory, ids, clock }
}

fn make_conn(principal: Principal, uuid: &str, group_id: Option<u64>) -> (Arc<Conn>, mpsc::Receiver<Action>) {
    let (tx, rx) = mpsc::channel::<Action>(16);
    (Arc::new(Conn::new(principal, uuid.to_owned(), group_id, tx, CancellationToken::new())), rx)
}

fn send_message_data(user_id: PrincipalId, content: &str, req_id: &str) -> serde_json::Value {
    serde_json::json!({ "user_id": user_id, "type": "text", "content": content, "req_id": req_id })
}

async fn seed_admin(directory: &MemoryDirectory, id: PrincipalId, group_id: u64, offline_content: Option<&str>, last_online: i64) {
    directory
        .put_admin(Admin {
            profile: Profile { id, name: "agent".to_owned(), avatar: String::new(), group_id },
            setting: AdminSetting {
                offline_content: offline_content.map(str::to_owned),
                last_online,
                break_message: "chat closed while you were away".to_owned(),
            },
        })
        .await;
}

async fn seed_user(directory: &MemoryDirectory, id: PrincipalId, group_id: u64) {
    directory
        .put_user(User { profile: Profile { id, name: "customer".to_owned(), avatar: String::new(), group_id } })
        .await;
}

async fn queue_session(sessions: &MemoryPersistence, ids: &IdAllocator, user_id: PrincipalId, now: i64) -> SessionId {
    let session = ChatSession { id: ids.next_session(), user_id, admin_id: 0, started_at: now, closed_at: None };
    let session = SessionStore::save(sessions, session).await.unwrap();
    session.id
}

async fn drain_one(rx: &mut mpsc::Receiver<Action>) -> Action {
    rx.try_recv().expect("expected a queued frame")
}

fn assert_empty(rx: &mut mpsc::Receiver<Action>) {
    assert!(rx.try_recv().is_err(), "did not expect a queued frame");
}

// -- S1: happy-path user-to-admin routing after acceptance -------------------

#[tokio::test]
async fn s1_happy_path_delivers_live_to_live() {
    let h = build_harness();
    seed_admin(&h.directory, 7, 1, None, h.clock.now()).await;
    seed_user(&h.directory, 42, 1).await;

    let (admin_conn, mut admin_rx) = make_conn(Principal::admin(7), "admin-1", Some(1));
    h.admin_manager.register(Arc::clone(&admin_conn)).await.unwrap();

    queue_session(&h.sessions, &h.ids, 42, h.clock.now()).await;
    chathub::session::accept_waiting(&h.assignments, h.sessions.as_ref(), 7, 42, None).await.unwrap();

    let (user_conn, mut user_rx) = make_conn(Principal::user(42), "user-1", None);
    h.user_manager.register(Arc::clone(&user_conn)).await.unwrap();
    // registration notifies the assigned admin of presence
    match drain_one(&mut admin_rx).await.action.as_str() {
        "frontend-online" => {}
        other => panic!("unexpected admin frame: {other}"),
    }

    let action = Action::new("send-message", h.clock.now(), send_message_data(7, "hello there", "req-1"));
    h.user_manager.adapter().handle_inbound(&h.user_manager, &user_conn, action).await.unwrap();

    let received = drain_one(&mut admin_rx).await;
    assert_eq!(received.action, "receive-message");
    assert_eq!(received.data["content"], "hello there");
    assert_eq!(received.data["source"], "user");

    let presence = drain_one(&mut user_rx).await;
    assert_eq!(presence.action, "frontend-online");
    assert_empty(&mut user_rx);
}

// -- S3: offline admin auto-reply + auto-close -------------------------------

#[tokio::test]
async fn s3_offline_admin_synthesizes_auto_reply_and_closes_idle_session() {
    let h = build_harness();
    // last_online far enough in the past to exceed OFFLINE_DURATION.
    seed_admin(&h.directory, 7, 1, Some("I'm away, back soon"), h.clock.now() - OFFLINE_DURATION - 1).await;
    seed_user(&h.directory, 42, 1).await;

    queue_session(&h.sessions, &h.ids, 42, h.clock.now()).await;
    chathub::session::accept_waiting(&h.assignments, h.sessions.as_ref(), 7, 42, None).await.unwrap();

    let (user_conn, mut user_rx) = make_conn(Principal::user(42), "user-1", None);
    h.user_manager.register(Arc::clone(&user_conn)).await.unwrap();
    assert_empty(&mut user_rx); // no admin Conn registered, so no presence push

    let action = Action::new("send-message", h.clock.now(), send_message_data(7, "anyone there?", "req-2"));
    h.user_manager.adapter().handle_inbound(&h.user_manager, &user_conn, action).await.unwrap();

    let auto_reply = drain_one(&mut user_rx).await;
    assert_eq!(auto_reply.action, "receive-message");
    assert_eq!(auto_reply.data["content"], "I'm away, back soon");
    assert_eq!(auto_reply.data["source"], "admin");

    let notice = drain_one(&mut user_rx).await;
    assert_eq!(notice.action, "receive-message");
    assert_eq!(notice.data["content"], "chat closed while you were away");
    assert_eq!(notice.data["source"], "system");

    let presence = drain_one(&mut user_rx).await;
    assert_eq!(presence.action, "frontend-offline");
    assert_empty(&mut user_rx);

    assert!(h.sessions.find_active(42).await.unwrap().is_none());
    assert!(!h.assignments.is_user_valid(7, 42).await.unwrap());
}

// -- S4: duplicate login supersedes the prior connection ---------------------

#[tokio::test]
async fn s4_duplicate_login_closes_the_displaced_connection() {
    let h = build_harness();
    seed_admin(&h.directory, 7, 1, None, h.clock.now()).await;

    let (first, _first_rx) = make_conn(Principal::admin(7), "first", Some(1));
    h.admin_manager.register(Arc::clone(&first)).await.unwrap();
    assert!(!first.is_closed());

    let (second, _second_rx) = make_conn(Principal::admin(7), "second", Some(1));
    h.admin_manager.register(Arc::clone(&second)).await.unwrap();

    assert!(first.is_closed());
    assert!(!second.is_closed());
    assert_eq!(h.admin_manager.shards().get(7).await.unwrap().uuid(), "second");
}

// -- S5: admin send against an expired assignment is rejected ----------------

#[tokio::test]
async fn s5_admin_send_after_assignment_expiry_is_rejected() {
    let h = build_harness();
    seed_admin(&h.directory, 7, 1, None, h.clock.now()).await;
    seed_user(&h.directory, 42, 1).await;

    queue_session(&h.sessions, &h.ids, 42, h.clock.now()).await;
    chathub::session::accept_waiting(&h.assignments, h.sessions.as_ref(), 7, 42, Some(30)).await.unwrap();
    assert!(h.assignments.is_user_valid(7, 42).await.unwrap());

    h.clock.advance(31);
    assert!(!h.assignments.is_user_valid(7, 42).await.unwrap());

    let (admin_conn, mut admin_rx) = make_conn(Principal::admin(7), "admin-1", Some(1));
    h.admin_manager.register(Arc::clone(&admin_conn)).await.unwrap();

    let action = Action::new("send-message", h.clock.now(), send_message_data(42, "still there?", "req-3"));
    h.admin_manager.adapter().handle_inbound(&h.admin_manager, &admin_conn, action).await.unwrap();

    let err = drain_one(&mut admin_rx).await;
    assert_eq!(err.action, "error");
    assert_empty(&mut admin_rx);

    // The session was never touched by the rejected send.
    assert!(h.sessions.find_active(42).await.unwrap().is_some());
}

// -- S6: transfer acceptance moves routing to the new admin ------------------

#[tokio::test]
async fn s6_accepted_transfer_routes_subsequent_messages_to_new_admin() {
    let h = build_harness();
    seed_admin(&h.directory, 7, 1, None, h.clock.now()).await;
    seed_admin(&h.directory, 8, 1, None, h.clock.now()).await;
    seed_user(&h.directory, 42, 1).await;

    queue_session(&h.sessions, &h.ids, 42, h.clock.now()).await;
    chathub::session::accept_waiting(&h.assignments, h.sessions.as_ref(), 7, 42, None).await.unwrap();

    let transfer =
        chathub::session::initiate_transfer(h.transfers.as_ref(), h.clock.as_ref(), &h.ids, 7, 8, 42)
            .await
            .unwrap();
    chathub::session::accept_transfer(
        &h.assignments,
        h.sessions.as_ref(),
        h.transfers.as_ref(),
        h.clock.as_ref(),
        &h.ids,
        transfer.id,
    )
    .await
    .unwrap();

    let (new_admin_conn, mut new_admin_rx) = make_conn(Principal::admin(8), "admin-8", Some(1));
    h.admin_manager.register(Arc::clone(&new_admin_conn)).await.unwrap();

    let (old_admin_conn, mut old_admin_rx) = make_conn(Principal::admin(7), "admin-7", Some(1));
    h.admin_manager.register(Arc::clone(&old_admin_conn)).await.unwrap();

    let (user_conn, _user_rx) = make_conn(Principal::user(42), "user-1", None);
    h.user_manager.register(Arc::clone(&user_conn)).await.unwrap();
    // presence notification goes to the *new* admin now (the assignment moved).
    assert_eq!(drain_one(&mut new_admin_rx).await.action, "frontend-online");
    assert_empty(&mut old_admin_rx);

    let action = Action::new("send-message", h.clock.now(), send_message_data(8, "hi again", "req-4"));
    h.user_manager.adapter().handle_inbound(&h.user_manager, &user_conn, action).await.unwrap();

    let received = drain_one(&mut new_admin_rx).await;
    assert_eq!(received.action, "receive-message");
    assert_eq!(received.data["content"], "hi again");
    assert_empty(&mut old_admin_rx);
}

// -- S2: cross-node delivery via the bus, no shared Manager instance ---------

#[tokio::test]
async fn s2_message_to_a_user_connected_on_another_node_routes_through_the_bus() {
    let clock = TestClock::new(1_000_000);
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let kv = Arc::new(MemoryKv::new(Arc::clone(&dyn_clock)));
    let bus = Arc::new(LocalBus::default());
    let assignments = Arc::new(AssignmentStore::new(kv.clone(), Arc::clone(&dyn_clock)));
    let sessions = Arc::new(MemoryPersistence::default());
    let transfers = Arc::new(MemoryTransferStore::default());
    let directory = Arc::new(MemoryDirectory::new(OFFLINE_DURATION));
    let push = Arc::new(NullPushNotifier);
    let ids = Arc::new(IdAllocator::default());

    seed_admin(&directory, 7, 1, None, clock.now()).await;
    seed_user(&directory, 42, 1).await;
    queue_session(&sessions, &ids, 42, clock.now()).await;
    chathub::session::accept_waiting(&assignments, sessions.as_ref(), 7, 42, None).await.unwrap();

    // node-a hosts the admin and, co-located with it, a User Manager
    // instance that the admin's DeliveryEngine runs against directly but
    // which no user ever connects to (§4.3, §4.5 local/remote branch).
    let admin_adapter = AdminRoleAdapter::new(
        Arc::clone(&assignments),
        Arc::clone(&sessions) as Arc<dyn MessageStore>,
        Arc::clone(&sessions) as Arc<dyn SessionStore>,
        Arc::clone(&transfers) as Arc<dyn TransferStore>,
        Arc::clone(&directory) as Arc<dyn AdminRepo>,
        Arc::clone(&directory) as Arc<dyn chathub::store::UserRepo>,
        push,
        Arc::clone(&dyn_clock),
        Arc::clone(&ids),
        ASSIGNMENT_TTL,
    );
    let node_a_user_adapter = UserRoleAdapter::new(
        Arc::clone(&assignments),
        Arc::clone(&sessions) as Arc<dyn MessageStore>,
        Arc::clone(&sessions) as Arc<dyn SessionStore>,
        Arc::clone(&directory) as Arc<dyn AdminRepo>,
        Arc::clone(&directory) as Arc<dyn chathub::store::UserRepo>,
        Arc::clone(&dyn_clock),
        Arc::clone(&ids),
    );
    let (admin_manager, _admin_rx) =
        Manager::new("node-a".to_owned(), true, 4, 16, kv.clone(), bus.clone(), admin_adapter);
    let (node_a_user_manager, _node_a_user_rx) =
        Manager::new("node-a".to_owned(), true, 4, 16, kv.clone(), bus.clone(), node_a_user_adapter);
    admin_manager.adapter().set_user_manager(Arc::clone(&node_a_user_manager));

    // node-b is a separate process hosting the user's real connection: a
    // distinct `Manager<UserRoleAdapter>` sharing only the Kv (for the
    // cluster locator) and Bus (for cross-node events).
    let node_b_user_adapter = UserRoleAdapter::new(
        Arc::clone(&assignments),
        Arc::clone(&sessions) as Arc<dyn MessageStore>,
        Arc::clone(&sessions) as Arc<dyn SessionStore>,
        Arc::clone(&directory) as Arc<dyn AdminRepo>,
        Arc::clone(&directory) as Arc<dyn chathub::store::UserRepo>,
        Arc::clone(&dyn_clock),
        Arc::clone(&ids),
    );
    let (node_b_user_manager, node_b_user_rx) =
        Manager::new("node-b".to_owned(), true, 4, 16, kv, bus, node_b_user_adapter);
    node_b_user_manager.spawn_workers(node_b_user_rx, 1);
    chathub::router::EventRouter::new(Arc::clone(&node_b_user_manager), Arc::clone(&sessions) as Arc<dyn MessageStore>)
        .spawn();

    let (admin_conn, mut admin_rx) = make_conn(Principal::admin(7), "admin-1", Some(1));
    admin_manager.register(Arc::clone(&admin_conn)).await.unwrap();

    let (user_conn, mut user_rx) = make_conn(Principal::user(42), "user-1", None);
    node_b_user_manager.register(Arc::clone(&user_conn)).await.unwrap();
    assert_empty(&mut admin_rx); // presence goes through node-a's (empty) user manager, not node-b's

    let action = Action::new("send-message", clock.now(), send_message_data(42, "hi from node-a", "req-x"));
    admin_manager.adapter().handle_inbound(&admin_manager, &admin_conn, action).await.unwrap();

    let receipt = drain_one(&mut admin_rx).await;
    assert_eq!(receipt.action, "receipt");

    let received = tokio::time::timeout(std::time::Duration::from_millis(500), user_rx.recv())
        .await
        .expect("expected the cross-node frame before the timeout")
        .expect("sender half dropped");
    assert_eq!(received.action, "receive-message");
    assert_eq!(received.data["content"], "hi from node-a");
    assert_eq!(received.data["source"], "admin");
}

// -- Idempotent unregister at the Manager layer -------------------------------

#[tokio::test]
async fn manager_unregister_is_idempotent_for_a_stale_uuid() {
    let h = build_harness();
    seed_admin(&h.directory, 7, 1, None, h.clock.now()).await;

    let (conn, _rx) = make_conn(Principal::admin(7), "only", Some(1));
    h.admin_manager.register(Arc::clone(&conn)).await.unwrap();

    h.admin_manager.unregister(7, "only", Some(1)).await;
    assert!(h.admin_manager.shards().get(7).await.is_none());

    // A second unregister call for the same (now-gone) uuid is a no-op,
    // not a panic or a double side effect.
    h.admin_manager.unregister(7, "only", Some(1)).await;
    assert!(h.admin_manager.shards().get(7).await.is_none());
}
