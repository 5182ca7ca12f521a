// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! An in-memory `MessageTransport`/`InboundStream` pair wiring several
//! `Node`s together through plain channels, in place of a real socket.
//! Mirrors the mock-transport style used by the networking layer's own
//! behaviour tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use ant_kad::{Endpoint, EndpointRegistry, Error, MessageSequence, Node, Result};
use ant_kad::{InboundStream, MessageTransport};

type Mailbox<const N: usize> = mpsc::UnboundedSender<(Endpoint, MessageSequence<N>)>;

/// A shared "wire": a registry of mailboxes keyed by endpoint URI, standing
/// in for a real socket layer. Every node on the same `Network` can reach
/// every other by URI.
pub struct Network<const N: usize> {
    mailboxes: Mutex<HashMap<String, Mailbox<N>>>,
    endpoints: Arc<EndpointRegistry>,
}

impl<const N: usize> Network<N> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            mailboxes: Mutex::new(HashMap::new()),
            endpoints: Arc::new(EndpointRegistry::new()),
        })
    }

    /// Register `uri` on the network, returning the transport/inbound pair a
    /// `Node::spawn` at that address should use.
    pub fn join(self: &Arc<Self>, uri: &str) -> (InMemoryTransport<N>, Box<dyn InboundStream<N>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.mailboxes.lock().unwrap_or_else(|e| e.into_inner()).insert(uri.to_string(), tx);
        let transport = InMemoryTransport {
            network: self.clone(),
            self_endpoint: self.endpoints.resolve(uri),
        };
        (transport, Box::new(InMemoryInbound { rx }))
    }

    pub fn endpoint(&self, uri: &str) -> Endpoint {
        self.endpoints.resolve(uri)
    }
}

pub struct InMemoryTransport<const N: usize> {
    network: Arc<Network<N>>,
    self_endpoint: Endpoint,
}

#[async_trait]
impl<const N: usize> MessageTransport<N> for InMemoryTransport<N> {
    async fn send(&self, endpoint: &Endpoint, sequence: MessageSequence<N>) -> Result<()> {
        let mailboxes = self.network.mailboxes.lock().unwrap_or_else(|e| e.into_inner());
        match mailboxes.get(endpoint.uri()) {
            Some(tx) => {
                let _ = tx.send((self.self_endpoint.clone(), sequence));
                Ok(())
            }
            None => Err(Error::EndpointNotAvailable),
        }
    }

    fn resolve(&self, uri: &str) -> Endpoint {
        self.network.endpoint(uri)
    }
}

pub struct InMemoryInbound<const N: usize> {
    rx: mpsc::UnboundedReceiver<(Endpoint, MessageSequence<N>)>,
}

#[async_trait]
impl<const N: usize> InboundStream<N> for InMemoryInbound<N> {
    async fn recv(&mut self) -> Option<(Endpoint, MessageSequence<N>)> {
        self.rx.recv().await
    }
}

/// Spawn a node at `uri` on `network`, wired up with an otherwise-default
/// config tuned for fast, deterministic tests (long background intervals so
/// nothing fires unexpectedly mid-test).
pub fn spawn_node<const N: usize>(
    network: &Arc<Network<N>>,
    uri: &str,
    local_id: ant_kad::NodeId<N>,
    config: ant_kad::Config,
) -> Node<N> {
    let (transport, inbound) = network.join(uri);
    Node::spawn(local_id, config, Arc::new(transport), vec![uri.to_string()], inbound)
}

pub fn quiet_config() -> ant_kad::Config {
    use std::time::Duration;
    ant_kad::Config {
        k: 20,
        alpha: 3,
        request_timeout: Duration::from_secs(2),
        refresh_interval: Duration::from_secs(3600 * 24),
        republish_interval: Duration::from_secs(3600 * 24),
        replicate_interval: Duration::from_secs(3600 * 24),
        network_id: 0,
        multicast_group: None,
        multicast_interval: Duration::from_secs(3600 * 24),
    }
}

pub fn id4(n: u32) -> ant_kad::NodeId<4> {
    ant_kad::NodeId::new(n.to_be_bytes())
}
