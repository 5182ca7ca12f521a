// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The k-bucket (C3): a fixed-capacity LRU of peer entries, evicted by a
//! liveness probe rather than by simple recency.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::clock::{Clock, Instant};
use crate::endpoint::Endpoint;
use crate::node_id::NodeId;

/// A single routing-table entry: a peer's identifier, its known endpoints in
/// insertion order (modulo recency merges), and when it was last touched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerEntry<const N: usize> {
    /// The peer's identifier.
    pub id: NodeId<N>,
    /// Known reachable endpoints, oldest first.
    pub endpoints: Vec<Endpoint>,
    /// When this entry was last touched (inserted or refreshed).
    pub last_seen: Instant,
}

/// Probes a candidate peer for liveness. Implemented by [`crate::invoker::Invoker`];
/// kept as a narrow trait here so the bucket's eviction policy can be unit
/// tested without a real transport.
#[async_trait]
pub trait Pinger<const N: usize>: Send + Sync {
    /// Send a PING to `id` over `endpoints` and report whether it answered
    /// before the configured request deadline.
    async fn ping(&self, id: NodeId<N>, endpoints: &[Endpoint]) -> bool;
}

/// The result of a [`KBucket::touch`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TouchOutcome<const N: usize> {
    /// The peer was new and the bucket had room; it was appended.
    Inserted,
    /// The peer was already present; it was moved to the tail and its
    /// endpoints merged.
    Updated,
    /// The bucket was full, the least-recently-seen peer answered a liveness
    /// probe, so it was kept (moved to tail) and the new peer was dropped.
    Dropped,
    /// The bucket was full, the least-recently-seen peer failed its liveness
    /// probe, so it was evicted and the new peer appended.
    Evicted(NodeId<N>),
}

struct BucketState<const N: usize> {
    entries: VecDeque<PeerEntry<N>>,
    last_touched: Option<Instant>,
}

/// A capacity-`k` ordered sequence of [`PeerEntry`], ordered
/// least-recently-seen first (head) to most-recently-seen last (tail).
///
/// All operations serialize on a single async mutex, which also guarantees
/// at most one liveness probe per bucket is in flight: a concurrent `touch`
/// that needs to probe the head simply waits for the lock, which is held for
/// the probe's duration.
pub struct KBucket<const N: usize> {
    capacity: usize,
    state: Mutex<BucketState<N>>,
}

impl<const N: usize> KBucket<N> {
    /// Create an empty bucket with the given capacity (`k`).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(BucketState {
                entries: VecDeque::with_capacity(capacity),
                last_touched: None,
            }),
        }
    }

    /// Insert, refresh, or probe-evict for `peer_id`. See module docs and
    /// §4.3 of the specification for the exact policy.
    pub async fn touch(
        &self,
        peer_id: NodeId<N>,
        endpoints: Vec<Endpoint>,
        clock: &dyn Clock,
        pinger: &dyn Pinger<N>,
    ) -> TouchOutcome<N> {
        let mut state = self.state.lock().await;
        let now = clock.now();
        state.last_touched = Some(now);

        if let Some(pos) = state.entries.iter().position(|p| p.id == peer_id) {
            let mut entry = state.entries.remove(pos).expect("position just found");
            for ep in endpoints {
                if !entry.endpoints.contains(&ep) {
                    entry.endpoints.push(ep);
                }
            }
            entry.last_seen = now;
            state.entries.push_back(entry);
            return TouchOutcome::Updated;
        }

        if state.entries.len() < self.capacity {
            state.entries.push_back(PeerEntry {
                id: peer_id,
                endpoints,
                last_seen: now,
            });
            return TouchOutcome::Inserted;
        }

        // Bucket full: probe the head (least-recently-seen) peer before
        // deciding whether it stays or the newcomer replaces it.
        let head = state.entries.front().expect("full bucket is non-empty").clone();
        if pinger.ping(head.id, &head.endpoints).await {
            let mut head = state.entries.pop_front().expect("checked above");
            let head_id = head.id;
            head.last_seen = clock.now();
            state.entries.push_back(head);
            debug!(peer = %peer_id, head = %head_id, "bucket full, head alive, dropping new peer");
            TouchOutcome::Dropped
        } else {
            let evicted = state.entries.pop_front().expect("checked above");
            state.entries.push_back(PeerEntry {
                id: peer_id,
                endpoints,
                last_seen: clock.now(),
            });
            debug!(peer = %peer_id, evicted = %evicted.id, "bucket full, head unreachable, evicting");
            TouchOutcome::Evicted(evicted.id)
        }
    }

    /// Remove `peer_id` from the bucket, if present.
    pub async fn remove(&self, peer_id: &NodeId<N>) -> Option<PeerEntry<N>> {
        let mut state = self.state.lock().await;
        let pos = state.entries.iter().position(|p| &p.id == peer_id)?;
        state.entries.remove(pos)
    }

    /// Snapshot of all current entries, head (oldest) first.
    pub async fn peers(&self) -> Vec<PeerEntry<N>> {
        self.state.lock().await.entries.iter().cloned().collect()
    }

    /// Lookup a single entry by id.
    pub async fn get(&self, peer_id: &NodeId<N>) -> Option<PeerEntry<N>> {
        self.state
            .lock()
            .await
            .entries
            .iter()
            .find(|p| &p.id == peer_id)
            .cloned()
    }

    /// When this bucket was last touched by any `touch` call, or `None` if
    /// it never has been. Drives bucket-refresh scheduling (§4.10).
    pub async fn last_touched(&self) -> Option<Instant> {
        self.state.lock().await.last_touched
    }

    /// Current occupancy.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// Whether the bucket holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
