// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

use thiserror::Error;

/// A specialised `Result` type for the `ant-kad` crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds raised by the routing table, lookup engine, value store and
/// correlation layer. These are discriminants a caller can match on, not
/// exception types: most are expected, recoverable outcomes of operating a
/// DHT node on an unreliable network, not bugs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// No response arrived within the per-RPC deadline.
    #[error("request to endpoint timed out")]
    Timeout,

    /// Every endpoint known for a peer failed within the request deadline.
    #[error("no reachable endpoint for peer")]
    EndpointNotAvailable,

    /// A message sequence carried a `network` id different from ours.
    #[error("message network id {theirs} does not match ours ({ours})")]
    ProtocolMismatch {
        /// The network id carried by the inbound message.
        theirs: u64,
        /// Our own configured network id.
        ours: u64,
    },

    /// `bucket_index` or `update` was asked to place `self` in its own
    /// routing table.
    #[error("bucket index requested for self")]
    SelfReference,

    /// A `STORE` arrived with a version no greater than the one already held.
    #[error("store version {offered} is not greater than current version {current}")]
    StaleVersion {
        /// The version carried by the rejected `STORE`.
        offered: u64,
        /// The version already held for this key.
        current: u64,
    },

    /// The operation was cancelled by its caller; not logged as an error.
    #[error("operation cancelled")]
    Cancelled,

    /// The correlation queue already has a registered waiter for this
    /// `(endpoint, reply-id)` pair; `wait` permits at most one.
    #[error("duplicate outstanding request for this (endpoint, reply-id) pair")]
    DuplicateOutstandingRequest,

    /// The underlying `MessageTransport` reported a send failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The background driver task for a [`crate::node::Node`] is no longer
    /// running, so a command could not be delivered or answered.
    #[error("node driver task is no longer running")]
    DriverGone,
}
