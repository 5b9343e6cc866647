// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use proptest::prelude::*;

use super::*;
use crate::store::MemoryKv;

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

fn store(clock: Arc<TestClock>) -> AssignmentStore {
    AssignmentStore::new(Arc::new(MemoryKv::new(clock.clone())), clock)
}

#[tokio::test]
async fn add_user_establishes_validity_and_reverse_binding() {
    let clock = TestClock::new(1_000);
    let store = store(clock.clone());

    store.add_user(7, 42, None).await.unwrap();

    assert!(store.is_user_valid(7, 42).await.unwrap());
    assert_eq!(store.assigned_admin(42).await.unwrap(), Some(7));
    assert_eq!(store.active_count(7).await.unwrap(), 1);
}

#[tokio::test]
async fn validity_expires_after_ttl() {
    let clock = TestClock::new(1_000);
    let store = store(clock.clone());

    store.add_user(7, 42, Some(60)).await.unwrap();
    assert!(store.is_user_valid(7, 42).await.unwrap());

    clock.advance(61);
    assert!(!store.is_user_valid(7, 42).await.unwrap());
    assert_eq!(store.active_count(7).await.unwrap(), 0);
}

#[tokio::test]
async fn update_limit_time_refreshes_validity_without_touching_reverse_binding() {
    let clock = TestClock::new(1_000);
    let store = store(clock.clone());

    store.add_user(7, 42, Some(60)).await.unwrap();
    clock.advance(59);
    store.update_limit_time(7, 42, Some(60)).await.unwrap();
    clock.advance(59);

    assert!(store.is_user_valid(7, 42).await.unwrap());
    assert_eq!(store.assigned_admin(42).await.unwrap(), Some(7));
}

#[tokio::test]
async fn remove_user_clears_active_set_and_reverse_binding() {
    let clock = TestClock::new(1_000);
    let store = store(clock.clone());

    store.add_user(7, 42, None).await.unwrap();
    store.remove_user(7, 42).await.unwrap();

    assert!(!store.is_user_valid(7, 42).await.unwrap());
    assert_eq!(store.assigned_admin(42).await.unwrap(), None);
    assert_eq!(store.active_count(7).await.unwrap(), 0);
}

#[tokio::test]
async fn active_count_matches_members_with_score_greater_than_now() {
    let clock = TestClock::new(1_000);
    let store = store(clock.clone());

    store.add_user(7, 1, Some(100)).await.unwrap();
    store.add_user(7, 2, Some(200)).await.unwrap();
    store.add_user(7, 3, Some(-1)).await.unwrap(); // already expired

    assert_eq!(store.active_count(7).await.unwrap(), 2);
    let active = store.active_users(7).await.unwrap();
    assert_eq!(active.len(), 2);
    assert!(active.iter().any(|(id, _)| *id == 1));
    assert!(active.iter().any(|(id, _)| *id == 2));
}

#[tokio::test]
async fn last_chat_is_recorded_per_admin_user_pair() {
    let clock = TestClock::new(1_000);
    let store = store(clock.clone());

    assert_eq!(store.last_chat_at(7, 42).await.unwrap(), None);
    store.touch_last_chat(7, 42).await.unwrap();
    assert_eq!(store.last_chat_at(7, 42).await.unwrap(), Some(1_000));

    clock.advance(30);
    store.touch_last_chat(7, 42).await.unwrap();
    assert_eq!(store.last_chat_at(7, 42).await.unwrap(), Some(1_030));
}

proptest! {
    /// §8 property 1: `IsUserValid(A, U, t) ⇔ score(A, U) > t`.
    #[test]
    fn is_user_valid_matches_score_comparison(ttl in -100i64..1000, now in 0i64..10_000) {
        let clock = TestClock::new(now);
        let store = store(clock.clone());
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            store.add_user(1, 2, Some(ttl)).await.unwrap();
            let valid = store.is_user_valid(1, 2).await.unwrap();
            let score = now + ttl;
            prop_assert_eq!(valid, score > now);
            Ok(())
        })?;
    }

    /// §8 property 4: `GetActiveCount` equals the set-count of members with
    /// score > now, across an arbitrary sequence of add/remove/refresh ops.
    #[test]
    fn active_count_tracks_membership(
        ops in proptest::collection::vec((0u64..5, proptest::bool::ANY, -50i64..50), 1..30)
    ) {
        let clock = TestClock::new(1_000);
        let store = store(clock.clone());
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let mut expected = std::collections::HashMap::new();
            for (user, add, ttl) in ops {
                if add {
                    store.add_user(9, user, Some(ttl)).await.unwrap();
                    expected.insert(user, 1_000 + ttl);
                } else {
                    store.remove_user(9, user).await.unwrap();
                    expected.remove(&user);
                }
            }
            let want = expected.values().filter(|&&score| score > 1_000).count();
            let got = store.active_count(9).await.unwrap();
            prop_assert_eq!(got, want);
            Ok(())
        })?;
    }
}
