// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! `ant-kad` is a transport-agnostic Kademlia DHT node core.
//!
//! This crate owns the routing table, value store, iterative lookups, and
//! maintenance scheduling behind a small [`node::Node`] facade. It does not
//! open a socket, encode a byte on the wire, or choose a hash function:
//! those are the embedding binary's job, plugged in through the
//! [`transport::MessageTransport`]/[`transport::InboundStream`] traits and the
//! [`clock::Clock`] collaborator. See the crate's design document for the
//! full module breakdown.

#[macro_use]
extern crate tracing;

pub mod bucket;
pub mod clock;
pub mod config;
pub mod correlation;
pub mod endpoint;
pub mod error;
pub mod handler;
pub mod invoker;
pub mod lookup;
pub mod maintenance;
pub mod message;
pub mod multicast;
pub mod node;
pub mod node_id;
pub mod routing_table;
pub mod store;
pub mod transport;

pub use clock::{Clock, Instant, TokioClock};
pub use config::Config;
pub use endpoint::{Endpoint, EndpointRegistry};
pub use error::{Error, Result};
pub use lookup::{FindNodeOutcome, FindValueOutcome};
pub use message::{Message, MessageSequence, Request, Response};
pub use multicast::MulticastDiscovery;
pub use node::Node;
pub use node_id::{Kad160, Kad256, NodeId};
pub use store::StoreMode;
pub use transport::{InboundStream, MessageTransport};
