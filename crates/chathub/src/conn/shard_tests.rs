// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::action::Action;
use crate::principal::Principal;

fn make_conn(principal: Principal, uuid: &str, group_id: Option<GroupId>) -> Arc<Conn> {
    let (tx, _rx) = mpsc::channel::<Action>(4);
    Arc::new(Conn::new(principal, uuid.to_owned(), group_id, tx, CancellationToken::new()))
}

#[tokio::test]
async fn get_returns_none_for_unregistered_principal() {
    let shards = ConnectionShard::new(4);
    assert!(shards.get(99).await.is_none());
}

#[tokio::test]
async fn put_then_get_roundtrips() {
    let shards = ConnectionShard::new(4);
    let conn = make_conn(Principal::user(1), "u1", None);
    assert!(shards.put(Arc::clone(&conn)).await.is_none());

    let got = shards.get(1).await.expect("conn should be registered");
    assert_eq!(got.uuid(), "u1");
}

#[tokio::test]
async fn put_displaces_prior_conn_for_same_principal() {
    let shards = ConnectionShard::new(4);
    let first = make_conn(Principal::user(1), "u1", None);
    let second = make_conn(Principal::user(1), "u2", None);

    shards.put(Arc::clone(&first)).await;
    let displaced = shards.put(Arc::clone(&second)).await;

    assert_eq!(displaced.unwrap().uuid(), "u1");
    assert_eq!(shards.get(1).await.unwrap().uuid(), "u2");
}

/// §8 property 3 / §4.2 rationale: a stale unregister (carrying the old
/// uuid) must not evict a successor Conn that has already reconnected.
#[tokio::test]
async fn remove_is_a_noop_when_uuid_does_not_match_current_occupant() {
    let shards = ConnectionShard::new(4);
    let first = make_conn(Principal::user(1), "u1", None);
    let second = make_conn(Principal::user(1), "u2", None);

    shards.put(Arc::clone(&first)).await;
    shards.put(Arc::clone(&second)).await;

    let removed = shards.remove(1, "u1").await;
    assert!(!removed);
    assert_eq!(shards.get(1).await.unwrap().uuid(), "u2");
}

#[tokio::test]
async fn remove_evicts_when_uuid_matches() {
    let shards = ConnectionShard::new(4);
    let conn = make_conn(Principal::user(1), "u1", None);
    shards.put(Arc::clone(&conn)).await;

    assert!(shards.remove(1, "u1").await);
    assert!(shards.get(1).await.is_none());
}

#[tokio::test]
async fn for_each_filters_by_group_and_counts_all_shards() {
    let shards = ConnectionShard::new(4);
    shards.put(make_conn(Principal::admin(1), "a1", Some(7))).await;
    shards.put(make_conn(Principal::admin(2), "a2", Some(7))).await;
    shards.put(make_conn(Principal::admin(3), "a3", Some(9))).await;

    let group7 = shards.for_each(Some(7)).await;
    assert_eq!(group7.len(), 2);
    assert!(group7.iter().all(|c| c.group_id() == Some(7)));

    let everyone = shards.for_each(None).await;
    assert_eq!(everyone.len(), 3);
    assert_eq!(shards.len().await, 3);
}
