// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::principal::Role;

#[tokio::test]
async fn publish_delivers_only_to_subscribers_of_that_channel() {
    let bus = LocalBus::default();
    let mut mine = bus.subscribe("node-a-user").await.unwrap();
    let mut other = bus.subscribe("node-b-user").await.unwrap();

    bus.publish("node-a-user", BusEvent::Message(7)).await.unwrap();

    match mine.recv().await {
        Some(BusEvent::Message(id)) => assert_eq!(id, 7),
        other => panic!("unexpected event: {other:?}"),
    }

    // The other node's channel never received anything; its sender has no
    // pending event to hand back, so a bounded wait would just hang —
    // publishing once more on its own channel proves it was otherwise idle.
    bus.publish("node-b-user", BusEvent::Message(9)).await.unwrap();
    match other.recv().await {
        Some(BusEvent::Message(id)) => assert_eq!(id, 9),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn publish_to_all_fans_out_to_every_broadcast_subscriber_of_that_role() {
    let bus = LocalBus::default();
    let mut admin_a = bus.subscribe_broadcast(Role::Admin).await.unwrap();
    let mut admin_b = bus.subscribe_broadcast(Role::Admin).await.unwrap();
    let mut user_sub = bus.subscribe_broadcast(Role::User).await.unwrap();

    bus.publish_to_all(Role::Admin, BusEvent::WaitingUser(3)).await.unwrap();

    for sub in [&mut admin_a, &mut admin_b] {
        match sub.recv().await {
            Some(BusEvent::WaitingUser(group)) => assert_eq!(group, 3),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    bus.publish_to_all(Role::User, BusEvent::UserOffline(11)).await.unwrap();
    match user_sub.recv().await {
        Some(BusEvent::UserOffline(id)) => assert_eq!(id, 11),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn publish_with_no_subscribers_does_not_error() {
    let bus = LocalBus::default();
    bus.publish("nobody-home", BusEvent::OtherLogin(1)).await.unwrap();
    bus.publish_to_all(Role::Admin, BusEvent::AdminTransfer(2)).await.unwrap();
}

#[test]
fn node_channel_combines_node_id_and_role() {
    assert_eq!(node_channel("10.0.0.4:9501", Role::Admin), "10.0.0.4:9501-admin");
}
