// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! Multicast discovery (C11): periodic LAN bootstrap via a multicast PING,
//! and the unicast-reply receive path it relies on.
//!
//! The receive loop never locks a start/stop mutex around dispatch — it is
//! independent of lifecycle state entirely and drains cleanly on
//! cancellation via a [`watch`] token, rather than the brittle re-entrant
//! locking pattern some Kademlia implementations use here.

use std::sync::Arc;

use tokio::sync::watch;

use crate::bucket::Pinger;
use crate::config::Config;
use crate::endpoint::Endpoint;
use crate::invoker::Invoker;
use crate::lookup::LookupEngine;
use crate::message::Message;
use crate::node_id::NodeId;
use crate::routing_table::RoutingTable;
use crate::transport::{InboundStream, MessageTransport};

/// Periodically broadcasts a discovery PING over a multicast group and
/// seeds the routing table from any unicast replies it receives.
pub struct MulticastDiscovery<const N: usize> {
    local_id: NodeId<N>,
    transport: Arc<dyn MessageTransport<N>>,
    routing_table: Arc<RoutingTable<N>>,
    invoker: Arc<Invoker<N>>,
    lookup: Arc<LookupEngine<N>>,
    config: Config,
    local_endpoints: Vec<String>,
}

impl<const N: usize> MulticastDiscovery<N> {
    /// Build a discovery loop. Returns `None` if no multicast group is
    /// configured, since discovery is entirely optional (§4.11).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        local_id: NodeId<N>,
        transport: Arc<dyn MessageTransport<N>>,
        routing_table: Arc<RoutingTable<N>>,
        invoker: Arc<Invoker<N>>,
        lookup: Arc<LookupEngine<N>>,
        config: Config,
        local_endpoints: Vec<String>,
    ) -> Option<Self> {
        config.multicast_group.as_ref()?;
        Some(Self {
            local_id,
            transport,
            routing_table,
            invoker,
            lookup,
            config,
            local_endpoints,
        })
    }

    /// Broadcast a discovery PING every `multicast_interval` to `multicast_endpoint`,
    /// until `cancel` is signalled.
    pub async fn run_broadcast_loop(&self, multicast_endpoint: Endpoint, mut cancel: watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(self.config.multicast_interval);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(err) = self.broadcast_once(&multicast_endpoint).await {
                        warn!(%err, "multicast discovery broadcast failed");
                    }
                }
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        info!("multicast discovery broadcast loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn broadcast_once(&self, multicast_endpoint: &Endpoint) -> crate::error::Result<()> {
        trace!("broadcasting discovery ping");
        let sequence = crate::message::MessageSequence {
            network: self.config.network_id,
            messages: vec![Message::Request(crate::message::RequestEnvelope {
                header: crate::message::Header {
                    sender: self.local_id,
                    reply_id: 0,
                },
                body: crate::message::Request::Ping {
                    endpoints: self.local_endpoints.clone(),
                },
            })],
        };
        self.transport.send(multicast_endpoint, sequence).await
    }

    /// Drain inbound unicast replies to our discovery PINGs, connecting to
    /// each newly discovered peer. Runs independently of the broadcast
    /// loop's lifecycle; `cancel` stops it without any shared lock.
    pub async fn run_receive_loop(&self, mut inbound: impl InboundStream<N>, mut cancel: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                message = inbound.recv() => {
                    match message {
                        Some((endpoint, sequence)) => self.handle_inbound(endpoint, sequence).await,
                        None => {
                            debug!("multicast inbound stream closed");
                            break;
                        }
                    }
                }
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        info!("multicast discovery receive loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn handle_inbound(&self, source: Endpoint, sequence: crate::message::MessageSequence<N>) {
        if sequence.network != self.config.network_id {
            trace!(source = %source, "dropping multicast reply with mismatched network id");
            return;
        }
        for message in sequence.messages {
            if let Message::Response(envelope) = message {
                if let crate::message::Response::Ping { endpoints } = envelope.body {
                    let peer = envelope.header.sender;
                    if peer == self.local_id {
                        continue;
                    }
                    debug!(%peer, "discovered peer via multicast, connecting");
                    self.connect(peer, source, endpoints).await;
                }
            }
        }
    }

    /// The "Connect" sequence for a newly discovered peer: an initial PING
    /// (routing it on success) followed by a FIND_NODE on our own id to
    /// seed the rest of the routing table (§4.11).
    async fn connect(&self, peer: NodeId<N>, source: Endpoint, claimed_endpoints: Vec<String>) {
        let mut endpoints = vec![source];
        for uri in claimed_endpoints {
            let ep = self.invoker.resolve(&uri);
            if !endpoints.contains(&ep) {
                endpoints.push(ep);
            }
        }

        let ping = self
            .invoker
            .call(peer, &endpoints, crate::message::Request::Ping { endpoints: Vec::new() })
            .await;
        if ping.is_err() {
            trace!(%peer, "connect ping failed, not routing");
            return;
        }
        let _ = self
            .routing_table
            .touch(peer, endpoints, &crate::clock::TokioClock, self.invoker.as_ref() as &dyn Pinger<N>)
            .await;
        self.lookup.find_node(self.local_id).await;
    }
}
