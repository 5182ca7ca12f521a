// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! End-to-end node behaviour over the in-memory transport harness, exercising
//! whole `Node`s rather than individual components directly.

mod common;

use std::time::Duration;

use common::{id4, quiet_config, spawn_node, Network};

/// Advance the paused clock in small steps, yielding between each so that
/// timers firing mid-window hand control to the background tasks they wake
/// (the maintenance loop, inbound dispatch) before time moves further.
async fn settle(total: Duration) {
    let step = Duration::from_millis(5);
    let mut remaining = total;
    while remaining > Duration::ZERO {
        let this_step = step.min(remaining);
        tokio::time::advance(this_step).await;
        tokio::task::yield_now().await;
        remaining -= this_step;
    }
}

#[tokio::test]
async fn ping_between_two_nodes_routes_each_other() {
    let network = Network::<4>::new();
    let a = spawn_node(&network, "mem://a", id4(1), quiet_config());
    let b = spawn_node(&network, "mem://b", id4(2), quiet_config());

    let b_endpoint = network.endpoint("mem://b");
    let endpoints = a.ping(id4(2), vec![b_endpoint]).await.unwrap();
    assert_eq!(endpoints, vec!["mem://b".to_string()]);

    // Give B's driver a moment to finish routing A from the inbound PING.
    tokio::time::sleep(Duration::from_millis(10)).await;

    a.shutdown();
    b.shutdown();
}

#[tokio::test]
async fn bootstrap_chain_lets_a_later_joiner_find_value_through_one_hop() {
    let network = Network::<4>::new();
    let a = spawn_node(&network, "mem://a", id4(0x01), quiet_config());
    let b = spawn_node(&network, "mem://b", id4(0x80), quiet_config());
    let c = spawn_node(&network, "mem://c", id4(0xff), quiet_config());

    b.bootstrap("mem://a".to_string()).await.unwrap();
    c.bootstrap("mem://a".to_string()).await.unwrap();
    // Let the FIND_NODE(self) issued by each bootstrap settle so B and C's
    // tables fully cross-populate through A.
    tokio::time::sleep(Duration::from_millis(20)).await;

    a.put(id4(0x40), b"hello".to_vec(), 1, Duration::from_secs(60))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    // A later joiner that only knows C should still be able to retrieve the
    // value through an iterative FIND_VALUE that hops via C's table.
    let d = spawn_node(&network, "mem://d", id4(0xa5), quiet_config());
    d.bootstrap("mem://c".to_string()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let value = d.get(id4(0x40)).await;
    assert_eq!(value, Some(b"hello".to_vec()));

    a.shutdown();
    b.shutdown();
    c.shutdown();
    d.shutdown();
}

#[tokio::test]
async fn put_is_rejected_locally_on_stale_version() {
    let network = Network::<4>::new();
    let a = spawn_node(&network, "mem://a", id4(0x01), quiet_config());
    let b = spawn_node(&network, "mem://b", id4(0x02), quiet_config());
    b.bootstrap("mem://a".to_string()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    a.put(id4(0x40), b"v5".to_vec(), 5, Duration::from_secs(60))
        .await
        .unwrap();

    let err = a
        .put(id4(0x40), b"v0".to_vec(), 0, Duration::from_secs(60))
        .await
        .unwrap_err();
    assert!(matches!(err, ant_kad::Error::StaleVersion { offered: 0, current: 5 }));

    // The accepted value is still retrievable locally.
    assert_eq!(a.get(id4(0x40)).await, Some(b"v5".to_vec()));

    a.shutdown();
    b.shutdown();
}

#[tokio::test]
async fn get_falls_back_to_find_value_when_not_held_locally() {
    let network = Network::<4>::new();
    let a = spawn_node(&network, "mem://a", id4(0x01), quiet_config());
    let b = spawn_node(&network, "mem://b", id4(0x02), quiet_config());
    b.bootstrap("mem://a".to_string()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(b.get(id4(0x99)).await, None);

    a.shutdown();
    b.shutdown();
}

#[tokio::test(start_paused = true)]
async fn republish_keeps_a_replica_alive_past_its_original_ttl_window() {
    let mut config = quiet_config();
    // Fast republish, well inside the put's TTL, so the maintenance loop's
    // periodic re-`STORE` has several chances to land before expiry.
    config.republish_interval = Duration::from_millis(20);

    let network = Network::<4>::new();
    let a = spawn_node(&network, "mem://a", id4(0x01), config.clone());
    let b = spawn_node(&network, "mem://b", id4(0x02), config);
    b.bootstrap("mem://a".to_string()).await.unwrap();
    settle(Duration::from_millis(20)).await;

    // TTL short enough that, left alone, B's replica would expire well
    // before the 150ms window below — only a republish reaching it in time
    // keeps it alive that long.
    a.put(id4(0x40), b"hello".to_vec(), 1, Duration::from_millis(60))
        .await
        .unwrap();
    settle(Duration::from_millis(150)).await;

    assert_eq!(b.get(id4(0x40)).await, Some(b"hello".to_vec()));

    a.shutdown();
    b.shutdown();
}

#[tokio::test(start_paused = true)]
async fn replica_expires_after_its_ttl_with_no_republish() {
    let mut config = quiet_config();
    // Republish itself stays quiet (default, 24h) so it never fires within
    // this test; replicate_interval is shortened only because the
    // maintenance loop derives its expire-check period from the shortest of
    // the three background intervals, and B (holding a Replica, not a
    // Primary) never actually dispatches a replicate STORE regardless.
    config.replicate_interval = Duration::from_millis(200);

    let network = Network::<4>::new();
    let a = spawn_node(&network, "mem://a", id4(0x01), config.clone());
    let b = spawn_node(&network, "mem://b", id4(0x02), config);
    b.bootstrap("mem://a".to_string()).await.unwrap();
    settle(Duration::from_millis(20)).await;

    a.put(id4(0x40), b"hello".to_vec(), 1, Duration::from_millis(50))
        .await
        .unwrap();
    assert_eq!(b.get(id4(0x40)).await, Some(b"hello".to_vec()));

    settle(Duration::from_millis(400)).await;
    assert_eq!(b.get(id4(0x40)).await, None);

    a.shutdown();
    b.shutdown();
}
