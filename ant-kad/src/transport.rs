// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The `MessageTransport` collaborator interface (§1): framed message
//! delivery to/from an [`Endpoint`], with encoding, socket I/O and NAT
//! traversal left entirely to the embedding binary.

use async_trait::async_trait;

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::message::MessageSequence;

/// Delivers framed [`MessageSequence`]s to and from transport endpoints.
///
/// UDP is the primary target (§6), but the trait only requires message
/// framing and an endpoint identity preserved across a request/response
/// pair; a reliable stream transport satisfies it equally well.
#[async_trait]
pub trait MessageTransport<const N: usize>: Send + Sync + 'static {
    /// Send `sequence` to `endpoint`. Does not wait for a reply; matching a
    /// later inbound sequence to this send is the correlation queue's job.
    async fn send(&self, endpoint: &Endpoint, sequence: MessageSequence<N>) -> Result<()>;

    /// Resolve a URI (as carried in a `PingResponse`/`FindNodeResponse`/etc.)
    /// to a local [`Endpoint`] handle via the endpoint registry.
    fn resolve(&self, uri: &str) -> Endpoint;
}

/// Delivers one inbound [`MessageSequence`] at a time, paired with the
/// endpoint it arrived from (for UDP, the reply's source address).
#[async_trait]
pub trait InboundStream<const N: usize>: Send {
    /// Wait for the next inbound sequence. Returns `None` once the
    /// transport has shut down.
    async fn recv(&mut self) -> Option<(Endpoint, MessageSequence<N>)>;
}
