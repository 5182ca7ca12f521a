// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The request handler (C7): services inbound PING/STORE/FIND_NODE/FIND_VALUE,
//! updating the routing table on every contact before replying — Kademlia's
//! "learn on every contact" property.

use std::sync::Arc;
use std::time::Duration;

use crate::bucket::Pinger;
use crate::clock::Clock;
use crate::config::Config;
use crate::endpoint::EndpointRegistry;
use crate::message::{NodeInfo, Request, Response, StoreStatus, ValueInfo};
use crate::node_id::NodeId;
use crate::routing_table::RoutingTable;
use crate::store::{StoreMode, ValueStore};

/// Services inbound requests against a node's routing table and value store.
pub struct RequestHandler<const N: usize> {
    local_id: NodeId<N>,
    routing_table: Arc<RoutingTable<N>>,
    store: Arc<ValueStore<N>>,
    endpoints: Arc<EndpointRegistry>,
    config: Config,
    /// This node's own advertised endpoints, returned in `PingResponse`.
    local_endpoints: Vec<String>,
}

impl<const N: usize> RequestHandler<N> {
    /// Build a handler over the given collaborators.
    pub fn new(
        local_id: NodeId<N>,
        routing_table: Arc<RoutingTable<N>>,
        store: Arc<ValueStore<N>>,
        endpoints: Arc<EndpointRegistry>,
        config: Config,
        local_endpoints: Vec<String>,
    ) -> Self {
        Self {
            local_id,
            routing_table,
            store,
            endpoints,
            config,
            local_endpoints,
        }
    }

    /// This node's own identifier, used to stamp the header of replies.
    pub fn local_id(&self) -> NodeId<N> {
        self.local_id
    }

    /// Handle one inbound request from `sender`, observed arriving via
    /// `source_uri`, optionally carrying additional claimed endpoints (as
    /// `PingRequest` does).
    pub async fn handle(
        &self,
        sender: NodeId<N>,
        source_uri: &str,
        claimed_endpoints: &[String],
        request: Request<N>,
        clock: &dyn Clock,
        pinger: &dyn Pinger<N>,
    ) -> Response<N> {
        let mut endpoints = vec![self.endpoints.resolve(source_uri)];
        for uri in claimed_endpoints {
            let ep = self.endpoints.resolve(uri.as_str());
            if !endpoints.contains(&ep) {
                endpoints.push(ep);
            }
        }

        // A self-update is discarded; every other peer still gets routed.
        if let Err(err) = self.routing_table.touch(sender, endpoints, clock, pinger).await {
            trace!(%sender, %err, "inbound contact not routed");
        }

        match request {
            Request::Ping { .. } => Response::Ping {
                endpoints: self.local_endpoints.clone(),
            },
            Request::Store { key, mode, value } => self.handle_store(key, mode.into(), value, clock),
            Request::FindNode { key } => self.handle_find_node(&key).await,
            Request::FindValue { key } => self.handle_find_value(&key, clock).await,
        }
    }

    fn handle_store(
        &self,
        key: NodeId<N>,
        mode: StoreMode,
        value: Option<ValueInfo>,
        clock: &dyn Clock,
    ) -> Response<N> {
        let Some(value) = value else {
            return Response::Store {
                status: StoreStatus::Invalid,
            };
        };
        let ttl = Duration::from_millis(value.ttl_millis);
        let result = self.store.set(
            key,
            value.data,
            value.version,
            ttl,
            mode,
            clock.now(),
            self.config.republish_interval,
            self.config.replicate_interval,
        );
        let status = match result {
            Ok(()) => StoreStatus::Success,
            Err(err) => {
                debug!(%key, %err, "store rejected");
                StoreStatus::Invalid
            }
        };
        Response::Store { status }
    }

    async fn handle_find_node(&self, key: &NodeId<N>) -> Response<N> {
        let nodes = self.nearest_as_node_info(key).await;
        Response::FindNode { nodes }
    }

    async fn handle_find_value(&self, key: &NodeId<N>, clock: &dyn Clock) -> Response<N> {
        if let Some(stored) = self.store.get(key) {
            let now = clock.now();
            let ttl_millis = stored.expire_at.saturating_duration_since(now).as_millis() as u64;
            return Response::FindValue {
                nodes: Vec::new(),
                value: Some(ValueInfo {
                    data: stored.value,
                    version: stored.version,
                    ttl_millis,
                }),
            };
        }
        Response::FindValue {
            nodes: self.nearest_as_node_info(key).await,
            value: None,
        }
    }

    /// The `k` closest known peers to `key`, including self when self is
    /// among them (§4.7) — self is never stored in the routing table, so it
    /// has to be injected into the candidate set before truncating.
    async fn nearest_as_node_info(&self, key: &NodeId<N>) -> Vec<NodeInfo<N>> {
        let mut candidates: Vec<(NodeId<N>, Vec<String>)> = self
            .routing_table
            .nearest(key, self.config.k)
            .await
            .into_iter()
            .map(|(id, endpoints)| (id, endpoints.iter().map(|e| e.uri().to_string()).collect()))
            .collect();
        candidates.push((self.local_id, self.local_endpoints.clone()));
        candidates.sort_by_key(|(id, _)| id.distance(key));
        candidates
            .into_iter()
            .take(self.config.k)
            .map(|(id, endpoints)| NodeInfo { id, endpoints })
            .collect()
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
        async fn ping(&self, _id: NodeId<N>, _endpoints: &[crate::endpoint::Endpoint]) -> bool {
            true
        }
    }

    fn id(n: u32) -> NodeId<4> {
        NodeId::new(n.to_be_bytes())
    }

    fn handler() -> RequestHandler<4> {
        RequestHandler::new(
            id(0),
            Arc::new(RoutingTable::new(id(0), 20)),
            Arc::new(ValueStore::new()),
            Arc::new(EndpointRegistry::new()),
            Config::default(),
            vec!["udp://self:1234".to_string()],
        )
    }

    #[tokio::test]
    async fn ping_routes_sender_and_replies_with_local_endpoints() {
        let handler = handler();
        let clock = TokioClock;
        let pinger = AlwaysAlive;

        let response = handler
            .handle(
                id(1),
                "udp://peer1:1",
                &[],
                Request::Ping { endpoints: vec![] },
                &clock,
                &pinger,
            )
            .await;
        assert_eq!(
            response,
            Response::Ping {
                endpoints: vec!["udp://self:1234".to_string()]
            }
        );
        assert_eq!(handler.routing_table.len().await, 1);
    }

    #[tokio::test]
    async fn store_then_find_value_round_trips() {
        let handler = handler();
        let clock = TokioClock;
        let pinger = AlwaysAlive;

        let store_resp = handler
            .handle(
                id(1),
                "udp://peer1:1",
                &[],
                Request::Store {
                    key: id(0x40),
                    mode: crate::message::WireStoreMode::Primary,
                    value: Some(ValueInfo {
                        data: b"hello".to_vec(),
                        version: 1,
                        ttl_millis: 60_000,
                    }),
                },
                &clock,
                &pinger,
            )
            .await;
        assert_eq!(
            store_resp,
            Response::Store {
                status: StoreStatus::Success
            }
        );

        let find_resp = handler
            .handle(
                id(2),
                "udp://peer2:1",
                &[],
                Request::FindValue { key: id(0x40) },
                &clock,
                &pinger,
            )
            .await;
        match find_resp {
            Response::FindValue { value: Some(v), nodes } => {
                assert_eq!(v.data, b"hello".to_vec());
                assert!(nodes.is_empty());
            }
            other => panic!("expected FindValue with a value, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn find_value_without_a_match_returns_nearest_peers() {
        let handler = handler();
        let clock = TokioClock;
        let pinger = AlwaysAlive;
        handler
            .handle(id(1), "udp://peer1:1", &[], Request::Ping { endpoints: vec![] }, &clock, &pinger)
            .await;

        let response = handler
            .handle(id(2), "udp://peer2:1", &[], Request::FindValue { key: id(0x40) }, &clock, &pinger)
            .await;
        match response {
            Response::FindValue { value: None, nodes } => assert!(!nodes.is_empty()),
            other => panic!("expected FindValue without a value, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stale_store_version_is_rejected_as_invalid() {
        let handler = handler();
        let clock = TokioClock;
        let pinger = AlwaysAlive;
        handler
            .handle(
                id(1),
                "udp://peer1:1",
                &[],
                Request::Store {
                    key: id(0x40),
                    mode: crate::message::WireStoreMode::Primary,
                    value: Some(ValueInfo {
                        data: b"v5".to_vec(),
                        version: 5,
                        ttl_millis: 60_000,
                    }),
                },
                &clock,
                &pinger,
            )
            .await;

        let response = handler
            .handle(
                id(1),
                "udp://peer1:1",
                &[],
                Request::Store {
                    key: id(0x40),
                    mode: crate::message::WireStoreMode::Primary,
                    value: Some(ValueInfo {
                        data: b"v0".to_vec(),
                        version: 0,
                        ttl_millis: 60_000,
                    }),
                },
                &clock,
                &pinger,
            )
            .await;
        assert_eq!(
            response,
            Response::Store {
                status: StoreStatus::Invalid
            }
        );
    }
}
