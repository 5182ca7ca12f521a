// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The node facade (C15): a cheap, `Clone`-able handle over a command
//! channel to a background driver task that owns every other component.
//! Callers never touch the routing table, store or invoker directly; they
//! go through `Node`, which keeps the collaborators' locks off the async
//! call sites entirely except inside the driver loop itself.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};

use crate::config::Config;
use crate::correlation::CorrelationQueue;
use crate::endpoint::{Endpoint, EndpointRegistry};
use crate::error::{Error, Result};
use crate::handler::RequestHandler;
use crate::invoker::Invoker;
use crate::lookup::{FindValueOutcome, LookupEngine};
use crate::maintenance::MaintenanceLoop;
use crate::message::{Header, Message, MessageSequence, Request, Response, ResponseEnvelope, WireStoreMode};
use crate::node_id::NodeId;
use crate::routing_table::RoutingTable;
use crate::store::ValueStore;
use crate::transport::{InboundStream, MessageTransport};

/// Commands accepted by a node's background driver.
enum NodeCommand<const N: usize> {
    Ping {
        peer: NodeId<N>,
        endpoints: Vec<Endpoint>,
        reply: oneshot::Sender<Result<Vec<String>>>,
    },
    Put {
        key: NodeId<N>,
        value: Vec<u8>,
        version: u64,
        ttl: Duration,
        reply: oneshot::Sender<Result<()>>,
    },
    Get {
        key: NodeId<N>,
        reply: oneshot::Sender<Option<Vec<u8>>>,
    },
    Bootstrap {
        seed_uri: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Inbound {
        source: Endpoint,
        sequence: MessageSequence<N>,
    },
}

/// A cheap, shareable handle to a running DHT node.
///
/// Cloning a `Node` clones only the command channel; the routing table,
/// value store and correlation queue all live in the background driver
/// task spawned by [`Node::spawn`].
#[derive(Clone)]
pub struct Node<const N: usize> {
    local_id: NodeId<N>,
    commands: mpsc::Sender<NodeCommand<N>>,
    shutdown: watch::Sender<bool>,
}

impl<const N: usize> Node<N> {
    /// Spawn a node's background driver and maintenance loop, returning the
    /// facade handle.
    pub fn spawn(
        local_id: NodeId<N>,
        config: Config,
        transport: Arc<dyn MessageTransport<N>>,
        local_endpoints: Vec<String>,
        mut inbound: Box<dyn InboundStream<N>>,
    ) -> Self {
        let endpoints = Arc::new(EndpointRegistry::new());
        let routing_table = Arc::new(RoutingTable::new(local_id, config.k));
        let store = Arc::new(ValueStore::new());
        let correlation = Arc::new(CorrelationQueue::new());
        let clock: Arc<dyn crate::clock::Clock> = Arc::new(crate::clock::TokioClock);

        let invoker = Arc::new(Invoker::new(
            local_id,
            config.clone(),
            transport.clone(),
            endpoints.clone(),
            correlation,
            clock.clone(),
        ));
        let handler = Arc::new(RequestHandler::new(
            local_id,
            routing_table.clone(),
            store.clone(),
            endpoints.clone(),
            config.clone(),
            local_endpoints,
        ));
        let lookup = Arc::new(LookupEngine::new(local_id, routing_table.clone(), invoker.clone(), config.k, config.alpha));
        let maintenance = Arc::new(MaintenanceLoop::new(
            local_id,
            routing_table.clone(),
            store.clone(),
            lookup.clone(),
            clock.clone(),
            config.clone(),
        ));

        let (tx, mut rx) = mpsc::channel(256);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn({
            let maintenance = maintenance.clone();
            let cancel = shutdown_rx.clone();
            async move {
                maintenance.run(cancel).await;
            }
        });

        tokio::spawn({
            let transport = transport.clone();
            let handler = handler.clone();
            let invoker = invoker.clone();
            let clock = clock.clone();
            let mut cancel = shutdown_rx.clone();
            let network_id = config.network_id;
            async move {
                loop {
                    tokio::select! {
                        inbound_msg = inbound.recv() => {
                            match inbound_msg {
                                Some((source, sequence)) => {
                                    dispatch_inbound(&handler, &invoker, &transport, &clock, network_id, source, sequence).await;
                                }
                                None => {
                                    debug!("inbound transport stream closed");
                                    break;
                                }
                            }
                        }
                        changed = cancel.changed() => {
                            if changed.is_err() || *cancel.borrow() {
                                break;
                            }
                        }
                    }
                }
            }
        });

        tokio::spawn({
            let routing_table = routing_table.clone();
            let store = store.clone();
            let lookup = lookup.clone();
            let invoker = invoker.clone();
            let clock = clock.clone();
            let config = config.clone();
            async move {
                while let Some(cmd) = rx.recv().await {
                    handle_command(cmd, &routing_table, &store, &lookup, &invoker, clock.as_ref(), &config).await;
                }
            }
        });

        Self {
            local_id,
            commands: tx,
            shutdown: shutdown_tx,
        }
    }

    /// This node's own identifier.
    pub fn local_id(&self) -> NodeId<N> {
        self.local_id
    }

    /// Ping a peer directly over the given endpoints.
    pub async fn ping(&self, peer: NodeId<N>, endpoints: Vec<Endpoint>) -> Result<Vec<String>> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(NodeCommand::Ping { peer, endpoints, reply })
            .await
            .map_err(|_| Error::DriverGone)?;
        rx.await.map_err(|_| Error::DriverGone)?
    }

    /// Store `value` under `key` at version `version` across the network,
    /// originating as this node (`Primary`).
    pub async fn put(&self, key: NodeId<N>, value: Vec<u8>, version: u64, ttl: Duration) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(NodeCommand::Put {
                key,
                value,
                version,
                ttl,
                reply,
            })
            .await
            .map_err(|_| Error::DriverGone)?;
        rx.await.map_err(|_| Error::DriverGone)?
    }

    /// Retrieve the value for `key`, checking the local store first and
    /// falling back to an iterative FIND_VALUE lookup.
    pub async fn get(&self, key: NodeId<N>) -> Option<Vec<u8>> {
        let (reply, rx) = oneshot::channel();
        if self
            .commands
            .send(NodeCommand::Get { key, reply })
            .await
            .is_err()
        {
            return None;
        }
        rx.await.ok().flatten()
    }

    /// Seed the routing table from a single known peer endpoint: PING it,
    /// then FIND_NODE our own id to populate the rest of the table.
    pub async fn bootstrap(&self, seed_uri: String) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(NodeCommand::Bootstrap { seed_uri, reply })
            .await
            .map_err(|_| Error::DriverGone)?;
        rx.await.map_err(|_| Error::DriverGone)?
    }

    /// Feed one inbound message sequence (already decoded) into the node.
    /// The external transport/decoder calls this for every datagram it
    /// receives addressed to this node (outside multicast discovery, which
    /// has its own receive loop — see [`crate::multicast::MulticastDiscovery`]).
    pub async fn handle_inbound(&self, source: Endpoint, sequence: MessageSequence<N>) -> Result<()> {
        self.commands
            .send(NodeCommand::Inbound { source, sequence })
            .await
            .map_err(|_| Error::DriverGone)
    }

    /// Signal every background task (driver, inbound dispatch, maintenance)
    /// to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

async fn handle_command<const N: usize>(
    cmd: NodeCommand<N>,
    routing_table: &Arc<RoutingTable<N>>,
    store: &Arc<ValueStore<N>>,
    lookup: &Arc<LookupEngine<N>>,
    invoker: &Arc<Invoker<N>>,
    clock: &dyn crate::clock::Clock,
    config: &Config,
) {
    match cmd {
        NodeCommand::Ping { peer, endpoints, reply } => {
            let result = invoker.call(peer, &endpoints, Request::Ping { endpoints: Vec::new() }).await;
            let outcome = match result {
                Ok(Response::Ping { endpoints }) => Ok(endpoints),
                Ok(_) => Err(Error::Transport("unexpected response to PING".to_string())),
                Err(err) => Err(err),
            };
            let _ = reply.send(outcome);
        }
        NodeCommand::Put { key, value, version, ttl, reply } => {
            // The local store is authoritative for version acceptance: a
            // stale write is rejected here, before any network traffic,
            // rather than inferred from whether a remote broadcast happened
            // to succeed. This node keeps the Primary copy; the k nearest
            // remote peers only hold a Replica on its behalf (only the
            // originator republishes — see the value store docs).
            let local_result = store.set(
                key,
                value.clone(),
                version,
                ttl,
                crate::store::StoreMode::Primary,
                clock.now(),
                config.republish_interval,
                config.replicate_interval,
            );
            if let Err(err) = local_result {
                let _ = reply.send(Err(err));
                return;
            }
            // Propagation to the k nearest peers is best-effort: if nobody
            // is reachable yet, the value is still held locally and the
            // maintenance loop's republish pass will keep retrying it.
            if let Err(err) = lookup
                .store(key, value, version, ttl.as_millis() as u64, WireStoreMode::Replica)
                .await
            {
                debug!(%key, %err, "initial store broadcast did not reach any peer");
            }
            let _ = reply.send(Ok(()));
        }
        NodeCommand::Get { key, reply } => {
            if let Some(stored) = store.get(&key) {
                let _ = reply.send(Some(stored.value));
                return;
            }
            let outcome = lookup.find_value(key).await;
            let value = match outcome {
                FindValueOutcome::Found { value, .. } => Some(value.data),
                FindValueOutcome::NotFound(_) => None,
            };
            let _ = reply.send(value);
        }
        NodeCommand::Bootstrap { seed_uri, reply } => {
            let endpoint = invoker.resolve(&seed_uri);
            let local_id = routing_table.local_id();
            // The seed's identifier is unknown ahead of this call; learn it
            // from the response header rather than pretending we already
            // know who we are dialing.
            let result = invoker
                .call_and_learn_sender(local_id, std::slice::from_ref(&endpoint), Request::Ping { endpoints: Vec::new() })
                .await;
            match result {
                Ok((seed_id, Response::Ping { .. })) => {
                    let _ = routing_table
                        .touch(seed_id, vec![endpoint], clock, invoker.as_ref() as &dyn crate::bucket::Pinger<N>)
                        .await;
                    lookup.find_node(local_id).await;
                    let _ = reply.send(Ok(()));
                }
                Ok(_) => {
                    let _ = reply.send(Err(Error::Transport("unexpected response to bootstrap PING".to_string())));
                }
                Err(err) => {
                    let _ = reply.send(Err(err));
                }
            }
        }
        NodeCommand::Inbound { .. } => {
            // Raw transport dispatch is handled on its own task (see
            // `Node::spawn`) so it never waits behind the command queue;
            // this variant only exists so the channel's type covers it.
        }
    }
}

async fn dispatch_inbound<const N: usize>(
    handler: &Arc<RequestHandler<N>>,
    invoker: &Arc<Invoker<N>>,
    transport: &Arc<dyn MessageTransport<N>>,
    clock: &Arc<dyn crate::clock::Clock>,
    network_id: u64,
    source: Endpoint,
    sequence: MessageSequence<N>,
) {
    if sequence.network != network_id {
        trace!(source = %source, "dropping message with mismatched network id");
        return;
    }
    for message in sequence.messages {
        match message {
            Message::Request(envelope) => {
                let response = handler
                    .handle(
                        envelope.header.sender,
                        source.uri(),
                        claimed_endpoints(&envelope.body),
                        envelope.body,
                        clock.as_ref(),
                        invoker.as_ref() as &dyn crate::bucket::Pinger<N>,
                    )
                    .await;
                let reply = MessageSequence {
                    network: network_id,
                    messages: vec![Message::Response(ResponseEnvelope {
                        header: Header {
                            sender: handler_local_id(handler),
                            reply_id: envelope.header.reply_id,
                        },
                        body: response,
                    })],
                };
                if let Err(err) = transport.send(&source, reply).await {
                    warn!(%err, "failed to send response");
                }
            }
            Message::Response(envelope) => {
                if !invoker.deliver_response(&source, envelope.header.reply_id, envelope.header.sender, envelope.body) {
                    trace!(source = %source, reply_id = envelope.header.reply_id, "dropping unmatched response");
                }
            }
        }
    }
}

fn claimed_endpoints<const N: usize>(request: &Request<N>) -> &[String] {
    match request {
        Request::Ping { endpoints } => endpoints,
        _ => &[],
    }
}

fn handler_local_id<const N: usize>(handler: &Arc<RequestHandler<N>>) -> NodeId<N> {
    handler.local_id()
}
