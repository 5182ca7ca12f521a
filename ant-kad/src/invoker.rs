// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The invoker (C8): issues outbound RPCs over a peer's known endpoints,
//! trying them in preference order and falling through to the next on
//! timeout, also doubling as the [`Pinger`] the routing table uses for its
//! eviction probe.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::bucket::Pinger;
use crate::clock::Clock;
use crate::config::Config;
use crate::correlation::{CorrelationKey, CorrelationQueue};
use crate::endpoint::{Endpoint, EndpointRegistry};
use crate::error::{Error, Result};
use crate::message::{Header, Message, MessageSequence, Request, RequestEnvelope, Response};
use crate::node_id::NodeId;
use crate::transport::MessageTransport;

/// Sends outbound RPCs and correlates their responses.
pub struct Invoker<const N: usize> {
    local_id: NodeId<N>,
    config: Config,
    transport: Arc<dyn MessageTransport<N>>,
    endpoints: Arc<EndpointRegistry>,
    correlation: Arc<CorrelationQueue<(NodeId<N>, Response<N>)>>,
    clock: Arc<dyn Clock>,
    next_reply_id: AtomicU32,
}

impl<const N: usize> Invoker<N> {
    /// Build an invoker over the given collaborators.
    pub fn new(
        local_id: NodeId<N>,
        config: Config,
        transport: Arc<dyn MessageTransport<N>>,
        endpoints: Arc<EndpointRegistry>,
        correlation: Arc<CorrelationQueue<(NodeId<N>, Response<N>)>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            local_id,
            config,
            transport,
            endpoints,
            correlation,
            clock,
            next_reply_id: AtomicU32::new(1),
        }
    }

    /// Send `request` to `peer`, trying `endpoints` in order of most-recent
    /// success first (ties keep insertion order), falling through to the
    /// next on timeout. Fails with [`Error::EndpointNotAvailable`] once every
    /// endpoint has failed within the request deadline.
    pub async fn call(
        &self,
        peer: NodeId<N>,
        endpoints: &[Endpoint],
        request: Request<N>,
    ) -> Result<Response<N>> {
        self.call_and_learn_sender(peer, endpoints, request).await.map(|(_, response)| response)
    }

    /// As [`Self::call`], but also returns the identifier the responder
    /// claimed in its header. Used where the peer's id is not yet known
    /// ahead of the call — bootstrap's first contact with a seed endpoint,
    /// most notably.
    pub async fn call_and_learn_sender(
        &self,
        peer: NodeId<N>,
        endpoints: &[Endpoint],
        request: Request<N>,
    ) -> Result<(NodeId<N>, Response<N>)> {
        let mut ordered = endpoints.to_vec();
        ordered.sort_by(|a, b| b.last_success().cmp(&a.last_success()));

        for endpoint in &ordered {
            match self.try_endpoint(peer, endpoint, request.clone()).await {
                Ok(response) => return Ok(response),
                Err(Error::Timeout) => continue,
                Err(other) => return Err(other),
            }
        }
        Err(Error::EndpointNotAvailable)
    }

    async fn try_endpoint(&self, peer: NodeId<N>, endpoint: &Endpoint, request: Request<N>) -> Result<(NodeId<N>, Response<N>)> {
        let reply_id = self.next_reply_id.fetch_add(1, Ordering::Relaxed);
        let key = CorrelationKey {
            endpoint: endpoint.uri().to_string(),
            reply_id,
        };

        trace!(%peer, endpoint = %endpoint, reply_id, "dispatching RPC");
        // Registration happens before `send` is issued, guaranteeing a fast
        // reply cannot race ahead of the waiter being in place.
        let pending = self.correlation.register(key)?;

        let sequence = MessageSequence {
            network: self.config.network_id,
            messages: vec![Message::Request(RequestEnvelope {
                header: Header {
                    sender: self.local_id,
                    reply_id,
                },
                body: request,
            })],
        };

        if let Err(err) = self.transport.send(endpoint, sequence).await {
            self.endpoints.on_timeout(endpoint);
            return Err(err);
        }

        let deadline = self.clock.now() + self.config.request_timeout;
        match pending.wait(deadline).await {
            Ok(learned) => {
                self.endpoints.on_success(endpoint, self.clock.as_ref());
                Ok(learned)
            }
            Err(err) => {
                self.endpoints.on_timeout(endpoint);
                Err(err)
            }
        }
    }

    /// Deliver an inbound response to its matching waiter. Returns `false`
    /// for a late or unmatched reply (logged and dropped by the caller, per
    /// §4.6 — never treated as an error).
    pub fn deliver_response(&self, endpoint: &Endpoint, reply_id: u32, sender: NodeId<N>, response: Response<N>) -> bool {
        let key = CorrelationKey {
            endpoint: endpoint.uri().to_string(),
            reply_id,
        };
        self.correlation.deliver(&key, (sender, response))
    }

    /// Canonicalize a URI reported by a peer (e.g. in a `FindNodeResponse`)
    /// through the shared endpoint registry, so it compares equal to any
    /// other handle already resolved for the same address.
    pub fn resolve(&self, uri: &str) -> Endpoint {
        self.endpoints.resolve(uri)
    }
}

#[async_trait]
impl<const N: usize> Pinger<N> for Invoker<N> {
    async fn ping(&self, id: NodeId<N>, endpoints: &[Endpoint]) -> bool {
        let request = Request::Ping { endpoints: Vec::new() };
        matches!(self.call(id, endpoints, request).await, Ok(Response::Ping { .. }))
    }
}
