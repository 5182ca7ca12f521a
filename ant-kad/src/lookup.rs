// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The iterative lookup engine (C9): α-parallel FIND_NODE / FIND_VALUE over
//! a shortlist ordered by XOR distance to the target, plus the parallel
//! STORE broadcast that rides on a FIND_NODE lookup.

use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;

use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::invoker::Invoker;
use crate::message::{NodeInfo, Request, Response, ValueInfo};
use crate::node_id::NodeId;
use crate::routing_table::RoutingTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CandidateState {
    Pending,
    InFlight,
    Queried,
    Failed,
}

#[derive(Debug, Clone)]
struct Candidate<const N: usize> {
    id: NodeId<N>,
    endpoints: Vec<Endpoint>,
    state: CandidateState,
}

/// The outcome of a `FIND_NODE`-shaped lookup: the closest `Queried` peers
/// found, sorted ascending by distance to the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindNodeOutcome<const N: usize> {
    /// The closest successfully-queried peers, nearest first.
    pub peers: Vec<NodeId<N>>,
}

/// The outcome of a `FIND_VALUE`-shaped lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindValueOutcome<const N: usize> {
    /// A value was found. `cache_at` is the closest queried peer that did
    /// *not* already have it, a candidate for cache-on-return `STORE` (§4.9).
    Found {
        value: ValueInfo,
        cache_at: Option<(NodeId<N>, Vec<Endpoint>)>,
    },
    /// No peer in the lookup held the value.
    NotFound(FindNodeOutcome<N>),
}

/// Runs iterative FIND_NODE / FIND_VALUE lookups and the STORE broadcast
/// that follows a FIND_NODE, against a single node's routing table and
/// invoker.
pub struct LookupEngine<const N: usize> {
    local_id: NodeId<N>,
    routing_table: Arc<RoutingTable<N>>,
    invoker: Arc<Invoker<N>>,
    k: usize,
    alpha: usize,
}

impl<const N: usize> LookupEngine<N> {
    /// Build a lookup engine over the given collaborators.
    pub fn new(local_id: NodeId<N>, routing_table: Arc<RoutingTable<N>>, invoker: Arc<Invoker<N>>, k: usize, alpha: usize) -> Self {
        Self {
            local_id,
            routing_table,
            invoker,
            k,
            alpha,
        }
    }

    async fn seed(&self, target: &NodeId<N>) -> Vec<Candidate<N>> {
        self.routing_table
            .nearest(target, self.k)
            .await
            .into_iter()
            .map(|(id, endpoints)| Candidate {
                id,
                endpoints,
                state: CandidateState::Pending,
            })
            .collect()
    }

    fn merge_candidate(shortlist: &mut Vec<Candidate<N>>, target: &NodeId<N>, local_id: &NodeId<N>, id: NodeId<N>, endpoints: Vec<String>, resolved: &Arc<Invoker<N>>) {
        if &id == local_id {
            return;
        }
        if shortlist.iter().any(|c| c.id == id) {
            return;
        }
        let endpoints = endpoints.into_iter().map(|uri| resolved_endpoint(resolved, &uri)).collect();
        let pos = shortlist.iter().position(|c| target.distance(&c.id) > target.distance(&id)).unwrap_or(shortlist.len());
        shortlist.insert(
            pos,
            Candidate {
                id,
                endpoints,
                state: CandidateState::Pending,
            },
        );
    }

    fn closest_has_pending(shortlist: &[Candidate<N>], k: usize) -> bool {
        shortlist
            .iter()
            .take(k)
            .any(|c| c.state == CandidateState::Pending)
    }

    fn top_k_queried(shortlist: &[Candidate<N>], k: usize) -> Vec<NodeId<N>> {
        shortlist
            .iter()
            .filter(|c| c.state == CandidateState::Queried)
            .take(k)
            .map(|c| c.id)
            .collect()
    }

    /// Run an iterative FIND_NODE lookup for `target`.
    pub async fn find_node(&self, target: NodeId<N>) -> FindNodeOutcome<N> {
        let mut shortlist = self.seed(&target).await;
        self.drive(&mut shortlist, &target, |_| Request::FindNode { key: target }).await;
        FindNodeOutcome {
            peers: Self::top_k_queried(&shortlist, self.k),
        }
    }

    /// Run an iterative FIND_VALUE lookup for `target`.
    pub async fn find_value(&self, target: NodeId<N>) -> FindValueOutcome<N> {
        let mut shortlist = self.seed(&target).await;
        let mut found: Option<ValueInfo> = None;
        let mut no_value_yet: Vec<(NodeId<N>, Vec<Endpoint>)> = Vec::new();

        let mut in_flight = FuturesUnordered::new();
        loop {
            while found.is_none() && in_flight.len() < self.alpha && Self::closest_has_pending(&shortlist, self.k) {
                let Some(next) = shortlist.iter_mut().take(self.k).find(|c| c.state == CandidateState::Pending) else {
                    break;
                };
                next.state = CandidateState::InFlight;
                let id = next.id;
                let endpoints = next.endpoints.clone();
                let invoker = self.invoker.clone();
                in_flight.push(async move {
                    let response = invoker.call(id, &endpoints, Request::FindValue { key: target }).await;
                    (id, endpoints, response)
                });
            }

            let Some((id, endpoints, response)) = in_flight.next().await else {
                break;
            };

            let entry = shortlist.iter_mut().find(|c| c.id == id);
            match response {
                Ok(Response::FindValue { nodes, value: Some(v) }) => {
                    if let Some(entry) = entry {
                        entry.state = CandidateState::Queried;
                    }
                    let _ = self.routing_table.touch(id, endpoints, &crate::clock::TokioClock, self.invoker.as_ref() as &dyn crate::bucket::Pinger<N>).await;
                    found = Some(v);
                    self.merge_nodes(&mut shortlist, &target, nodes);
                    break;
                }
                Ok(Response::FindValue { nodes, value: None }) => {
                    if let Some(entry) = entry {
                        entry.state = CandidateState::Queried;
                    }
                    no_value_yet.push((id, endpoints.clone()));
                    let _ = self.routing_table.touch(id, endpoints, &crate::clock::TokioClock, self.invoker.as_ref() as &dyn crate::bucket::Pinger<N>).await;
                    self.merge_nodes(&mut shortlist, &target, nodes);
                }
                _ => {
                    if let Some(entry) = entry {
                        entry.state = CandidateState::Failed;
                    }
                }
            }

            if found.is_none() && !Self::closest_has_pending(&shortlist, self.k) && in_flight.is_empty() {
                break;
            }
        }

        match found {
            Some(value) => {
                let cache_at = no_value_yet
                    .into_iter()
                    .min_by_key(|(id, _)| target.distance(id));
                FindValueOutcome::Found { value, cache_at }
            }
            None => FindValueOutcome::NotFound(FindNodeOutcome {
                peers: Self::top_k_queried(&shortlist, self.k),
            }),
        }
    }

    fn merge_nodes(&self, shortlist: &mut Vec<Candidate<N>>, target: &NodeId<N>, nodes: Vec<NodeInfo<N>>) {
        for node in nodes {
            Self::merge_candidate(shortlist, target, &self.local_id, node.id, node.endpoints, &self.invoker);
        }
    }

    async fn drive(&self, shortlist: &mut Vec<Candidate<N>>, target: &NodeId<N>, request_for: impl Fn(&NodeId<N>) -> Request<N>) {
        let mut in_flight = FuturesUnordered::new();
        loop {
            while in_flight.len() < self.alpha && Self::closest_has_pending(shortlist, self.k) {
                let Some(next) = shortlist.iter_mut().take(self.k).find(|c| c.state == CandidateState::Pending) else {
                    break;
                };
                next.state = CandidateState::InFlight;
                let id = next.id;
                let endpoints = next.endpoints.clone();
                let invoker = self.invoker.clone();
                let request = request_for(&id);
                in_flight.push(async move {
                    let response = invoker.call(id, &endpoints, request).await;
                    (id, endpoints, response)
                });
            }

            let Some((id, endpoints, response)) = in_flight.next().await else {
                break;
            };

            let entry = shortlist.iter_mut().find(|c| c.id == id);
            match response {
                Ok(Response::FindNode { nodes }) => {
                    if let Some(entry) = entry {
                        entry.state = CandidateState::Queried;
                    }
                    let _ = self
                        .routing_table
                        .touch(id, endpoints, &crate::clock::TokioClock, self.invoker.as_ref() as &dyn crate::bucket::Pinger<N>)
                        .await;
                    self.merge_nodes(shortlist, target, nodes);
                }
                _ => {
                    if let Some(entry) = entry {
                        entry.state = CandidateState::Failed;
                    }
                }
            }

            if !Self::closest_has_pending(shortlist, self.k) && in_flight.is_empty() {
                break;
            }
        }
    }

    /// Run a FIND_NODE on `key`, then STORE to each of the resulting peers
    /// in parallel. Succeeds if at least one replica acknowledges.
    ///
    /// `mode` is carried on the wire as-is: a periodic republish broadcasts
    /// `Primary` so replicas know the originator is still alive, while a
    /// replicate pass broadcasts `Replica` to freshen other nodes' TTLs
    /// without claiming origination.
    pub async fn store(
        &self,
        key: NodeId<N>,
        value: Vec<u8>,
        version: u64,
        ttl_millis: u64,
        mode: crate::message::WireStoreMode,
    ) -> Result<(), Error> {
        let outcome = self.find_node(key).await;
        if outcome.peers.is_empty() {
            return Err(Error::EndpointNotAvailable);
        }

        let mut calls = FuturesUnordered::new();
        for peer in &outcome.peers {
            let Some((_, endpoints)) = self.routing_table.nearest(peer, 1).await.into_iter().find(|(id, _)| id == peer) else {
                continue;
            };
            let invoker = self.invoker.clone();
            let request = Request::Store {
                key,
                mode,
                value: Some(ValueInfo {
                    data: value.clone(),
                    version,
                    ttl_millis,
                }),
            };
            let peer_id = *peer;
            calls.push(async move { invoker.call(peer_id, &endpoints, request).await });
        }

        let mut any_success = false;
        while let Some(result) = calls.next().await {
            if matches!(
                result,
                Ok(Response::Store {
                    status: crate::message::StoreStatus::Success
                })
            ) {
                any_success = true;
            }
        }

        if any_success {
            Ok(())
        } else {
            Err(Error::EndpointNotAvailable)
        }
    }
}

fn resolved_endpoint<const N: usize>(invoker: &Arc<Invoker<N>>, uri: &str) -> Endpoint {
    invoker.resolve(uri)
}
