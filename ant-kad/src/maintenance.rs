// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The maintenance loop (C10): periodic bucket refresh, value republish,
//! value replicate, and value expiration. Background tasks catch and log
//! everything except cancellation, so a single bad peer or a transient
//! network blip never brings the node down.

use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use tokio::sync::watch;

use crate::clock::Clock;
use crate::config::Config;
use crate::lookup::LookupEngine;
use crate::node_id::NodeId;
use crate::routing_table::RoutingTable;
use crate::store::ValueStore;

/// Drives the periodic background work for one node.
pub struct MaintenanceLoop<const N: usize> {
    local_id: NodeId<N>,
    routing_table: Arc<RoutingTable<N>>,
    store: Arc<ValueStore<N>>,
    lookup: Arc<LookupEngine<N>>,
    clock: Arc<dyn Clock>,
    config: Config,
}

impl<const N: usize> MaintenanceLoop<N> {
    /// Build a maintenance loop over the given collaborators.
    pub fn new(
        local_id: NodeId<N>,
        routing_table: Arc<RoutingTable<N>>,
        store: Arc<ValueStore<N>>,
        lookup: Arc<LookupEngine<N>>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Self {
        Self {
            local_id,
            routing_table,
            store,
            lookup,
            clock,
            config,
        }
    }

    /// Run forever, ticking bucket refresh, republish, replicate and expiry
    /// on their own independent intervals, until `cancel` is signalled.
    pub async fn run(self: Arc<Self>, mut cancel: watch::Receiver<bool>) {
        let mut refresh_tick = tokio::time::interval(self.config.refresh_interval);
        let mut republish_tick = tokio::time::interval(self.config.republish_interval);
        let mut replicate_tick = tokio::time::interval(self.config.replicate_interval);
        // Expiry is checked more frequently than any single TTL so that
        // short-lived replicas do not linger far past their deadline.
        let expire_period = shortest(&[
            self.config.republish_interval,
            self.config.replicate_interval,
            self.config.refresh_interval,
        ]);
        let mut expire_tick = tokio::time::interval(expire_period);

        loop {
            tokio::select! {
                _ = refresh_tick.tick() => self.run_bucket_refresh().await,
                _ = republish_tick.tick() => self.run_republish().await,
                _ = replicate_tick.tick() => self.run_replicate().await,
                _ = expire_tick.tick() => self.run_expire(),
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        info!("maintenance loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn run_bucket_refresh(&self) {
        let since = self.clock.now() - self.config.refresh_interval;
        let stale = self.routing_table.stale_buckets(since).await;
        if stale.is_empty() {
            return;
        }
        let mut rng = SmallRng::from_entropy();
        for index in stale {
            let target = self.local_id.random_in_bucket(index, &mut rng);
            trace!(bucket = index, "refreshing stale bucket");
            self.lookup.find_node(target).await;
        }
    }

    async fn run_republish(&self) {
        let now = self.clock.now();
        for (key, value, version, ttl) in self.store.take_due_for_republish(now, self.config.republish_interval) {
            debug!(%key, "republishing primary value");
            let outcome = self
                .lookup
                .store(key, value, version, ttl.as_millis() as u64, crate::message::WireStoreMode::Primary)
                .await;
            if let Err(err) = outcome {
                warn!(%key, %err, "republish failed");
            }
        }
    }

    async fn run_replicate(&self) {
        let now = self.clock.now();
        for (key, value, version, ttl) in self.store.take_due_for_replicate(now, self.config.replicate_interval) {
            debug!(%key, "replicating primary value");
            let outcome = self
                .lookup
                .store(key, value, version, ttl.as_millis() as u64, crate::message::WireStoreMode::Replica)
                .await;
            if let Err(err) = outcome {
                warn!(%key, %err, "replicate failed");
            }
        }
    }

    fn run_expire(&self) {
        self.store.expire(self.clock.now());
    }
}

fn shortest(durations: &[std::time::Duration]) -> std::time::Duration {
    durations.iter().copied().min().unwrap_or(std::time::Duration::from_secs(60))
}
