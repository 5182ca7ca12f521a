// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The routing table (C4): `NodeId::BITS` k-buckets indexed by distance from
//! the local id, with the nearest-peers query used by every lookup round.

use crate::bucket::{KBucket, Pinger, TouchOutcome};
use crate::clock::Clock;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::node_id::NodeId;

/// The full set of k-buckets for a single local identity.
pub struct RoutingTable<const N: usize> {
    local_id: NodeId<N>,
    buckets: Vec<KBucket<N>>,
}

impl<const N: usize> RoutingTable<N> {
    /// Create a table for `local_id` with `k`-capacity buckets.
    pub fn new(local_id: NodeId<N>, k: usize) -> Self {
        let buckets = (0..NodeId::<N>::BITS).map(|_| KBucket::new(k)).collect();
        Self { local_id, buckets }
    }

    /// The local identifier this table is rooted at.
    pub fn local_id(&self) -> NodeId<N> {
        self.local_id
    }

    /// Insert, refresh, or probe-evict `peer_id` in the bucket it belongs to.
    ///
    /// Returns [`Error::SelfReference`] if `peer_id == local_id`: a node never
    /// places itself in its own table.
    pub async fn touch(
        &self,
        peer_id: NodeId<N>,
        endpoints: Vec<Endpoint>,
        clock: &dyn Clock,
        pinger: &dyn Pinger<N>,
    ) -> Result<TouchOutcome<N>> {
        let index = self.local_id.bucket_index(&peer_id)?;
        Ok(self.buckets[index].touch(peer_id, endpoints, clock, pinger).await)
    }

    /// Remove `peer_id` from its bucket, if present.
    pub async fn remove(&self, peer_id: &NodeId<N>) -> Result<()> {
        let index = self.local_id.bucket_index(peer_id)?;
        self.buckets[index].remove(peer_id).await;
        Ok(())
    }

    /// The `count` peers nearest to `target` across the whole table, sorted
    /// nearest-first. Used to seed and narrow every FIND_NODE/FIND_VALUE
    /// lookup round.
    pub async fn nearest(&self, target: &NodeId<N>, count: usize) -> Vec<(NodeId<N>, Vec<Endpoint>)> {
        let mut candidates = Vec::new();
        for bucket in &self.buckets {
            for entry in bucket.peers().await {
                candidates.push(entry);
            }
        }
        candidates.sort_by_key(|entry| entry.id.distance(target));
        candidates
            .into_iter()
            .take(count)
            .map(|entry| (entry.id, entry.endpoints))
            .collect()
    }

    /// Bucket indices that have gone untouched since `since`, for the
    /// maintenance loop's refresh scheduling (§4.10).
    pub async fn stale_buckets(&self, since: crate::clock::Instant) -> Vec<usize> {
        let mut stale = Vec::new();
        for (index, bucket) in self.buckets.iter().enumerate() {
            let touched = bucket.last_touched().await;
            if bucket.is_empty().await {
                continue;
            }
            match touched {
                Some(t) if t >= since => {}
                _ => stale.push(index),
            }
        }
        stale
    }

    /// Total number of peers held across all buckets.
    pub async fn len(&self) -> usize {
        let mut total = 0;
        for bucket in &self.buckets {
            total += bucket.len().await;
        }
        total
    }

    /// Whether the table holds no peers at all.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TokioClock;
    use async_trait::async_trait;

    struct AlwaysAlive;
    #[async_trait]
    impl<const N: usize> Pinger<N> for AlwaysAlive {
        async fn ping(&self, _id: NodeId<N>, _endpoints: &[Endpoint]) -> bool {
            true
        }
    }

    fn id(n: u32) -> NodeId<4> {
        NodeId::new(n.to_be_bytes())
    }

    #[tokio::test]
    async fn touch_self_is_rejected() {
        let table: RoutingTable<4> = RoutingTable::new(id(1), 20);
        let clock = TokioClock;
        let pinger = AlwaysAlive;
        let err = table.touch(id(1), vec![], &clock, &pinger).await.unwrap_err();
        assert_eq!(err, Error::SelfReference);
    }

    #[tokio::test]
    async fn nearest_returns_closest_peers_sorted() {
        let table: RoutingTable<4> = RoutingTable::new(id(0), 20);
        let clock = TokioClock;
        let pinger = AlwaysAlive;
        for n in [1u32, 2, 4, 8, 16] {
            table.touch(id(n), vec![], &clock, &pinger).await.unwrap();
        }
        let nearest = table.nearest(&id(0), 3).await;
        let ids: Vec<_> = nearest.into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![id(1), id(2), id(4)]);
    }

    #[tokio::test]
    async fn len_tracks_inserted_peers() {
        let table: RoutingTable<4> = RoutingTable::new(id(0), 20);
        let clock = TokioClock;
        let pinger = AlwaysAlive;
        assert!(table.is_empty().await);
        table.touch(id(1), vec![], &clock, &pinger).await.unwrap();
        table.touch(id(2), vec![], &clock, &pinger).await.unwrap();
        assert_eq!(table.len().await, 2);
    }
}
