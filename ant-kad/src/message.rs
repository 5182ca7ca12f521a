// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! In-memory message schema (§6): the envelope, header and RPC bodies every
//! codec (JSON / Protobuf / MessagePack — none of which live in this crate)
//! must round-trip exactly. This module only defines the shapes; encoding is
//! the embedding binary's job via [`crate::transport::MessageTransport`].

use crate::node_id::NodeId;
use crate::store::StoreMode;

/// Per-message header shared by every request and response.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Header<const N: usize> {
    /// The sender's claimed identifier.
    pub sender: NodeId<N>,
    /// Sender-chosen token echoed by the responder to correlate the reply.
    /// 32 bits wide, matching the wire schema; see the correlation queue's
    /// note on why this is narrower than some senders' internal magic.
    pub reply_id: u32,
}

/// The outermost envelope carrying a scoping token and one or more messages.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MessageSequence<const N: usize> {
    /// Scoping token separating unrelated DHTs sharing a transport/multicast
    /// group. A sequence whose `network` does not match ours is dropped
    /// with no reply (`ProtocolMismatch`).
    pub network: u64,
    /// The messages carried in this sequence.
    pub messages: Vec<Message<N>>,
}

/// A single request or response, carrying its header.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Message<const N: usize> {
    /// An outbound or inbound request.
    Request(RequestEnvelope<N>),
    /// An outbound or inbound response.
    Response(ResponseEnvelope<N>),
}

/// A request, paired with its header.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RequestEnvelope<const N: usize> {
    /// Header shared by the request/response pair.
    pub header: Header<N>,
    /// The request body.
    pub body: Request<N>,
}

/// A response, paired with its header (same `reply_id` as the request).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResponseEnvelope<const N: usize> {
    /// Header shared by the request/response pair.
    pub header: Header<N>,
    /// The response body.
    pub body: Response<N>,
}

/// The `hasValue`/`value` pair carried by `STORE` and `FIND_VALUE`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValueInfo {
    /// The stored bytes.
    pub data: Vec<u8>,
    /// Monotonically increasing version for this key.
    pub version: u64,
    /// Caller-supplied time-to-live, in milliseconds on the wire.
    pub ttl_millis: u64,
}

/// A peer as reported by `FIND_NODE`/`FIND_VALUE`: identifier plus known
/// endpoint URIs (not yet resolved through the local [`crate::endpoint::EndpointRegistry`]).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeInfo<const N: usize> {
    /// The peer's identifier.
    pub id: NodeId<N>,
    /// URIs at which the peer claims to be reachable.
    pub endpoints: Vec<String>,
}

/// Status carried by a `STORE` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StoreStatus {
    /// The store rejected the write (most commonly a stale version).
    Invalid,
    /// The write was accepted.
    Success,
}

/// Wire-level store mode, mirroring [`StoreMode`] 1:1 (Primary→Primary,
/// Replica→Replica per §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WireStoreMode {
    /// See [`StoreMode::Primary`].
    Primary,
    /// See [`StoreMode::Replica`].
    Replica,
}

impl From<WireStoreMode> for StoreMode {
    fn from(mode: WireStoreMode) -> Self {
        match mode {
            WireStoreMode::Primary => StoreMode::Primary,
            WireStoreMode::Replica => StoreMode::Replica,
        }
    }
}

impl From<StoreMode> for WireStoreMode {
    fn from(mode: StoreMode) -> Self {
        match mode {
            StoreMode::Primary => WireStoreMode::Primary,
            StoreMode::Replica => WireStoreMode::Replica,
        }
    }
}

/// A request body, one per RPC kind (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Request<const N: usize> {
    /// `PingRequest { endpoints }`.
    Ping { endpoints: Vec<String> },
    /// `StoreRequest { key, mode, hasValue, value }`.
    Store {
        key: NodeId<N>,
        mode: WireStoreMode,
        value: Option<ValueInfo>,
    },
    /// `FindNodeRequest { key }`.
    FindNode { key: NodeId<N> },
    /// `FindValueRequest { key }`.
    FindValue { key: NodeId<N> },
}

/// A response body, one per RPC kind (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Response<const N: usize> {
    /// `PingResponse { endpoints }`.
    Ping { endpoints: Vec<String> },
    /// `StoreResponse { status }`.
    Store { status: StoreStatus },
    /// `FindNodeResponse { nodes }`.
    FindNode { nodes: Vec<NodeInfo<N>> },
    /// `FindValueResponse { nodes, hasValue, value }`.
    FindValue {
        nodes: Vec<NodeInfo<N>>,
        value: Option<ValueInfo>,
    },
}
