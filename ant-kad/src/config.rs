// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The configuration surface consumed by every long-lived component in this
//! crate. Loading these values from a CLI, environment, or config file is the
//! embedding binary's job; this crate only defines the typed struct and its
//! defaults.

use std::time::Duration;

/// Bucket capacity. Classic Kademlia default.
pub const DEFAULT_K: usize = 20;
/// Lookup concurrency (in-flight RPCs per lookup round).
pub const DEFAULT_ALPHA: usize = 3;
/// Per-RPC timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
/// Bucket-refresh period.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);
/// Primary value republish period.
pub const DEFAULT_REPUBLISH_INTERVAL: Duration = Duration::from_secs(3600);
/// Primary value replicate period.
pub const DEFAULT_REPLICATE_INTERVAL: Duration = Duration::from_secs(3600);
/// Multicast discovery bootstrap period.
pub const DEFAULT_MULTICAST_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Tunables for a single DHT node.
///
/// Mirrors the recognized options of §6 of the specification this crate
/// implements: `k`, `alpha`, `requestTimeout`, `refreshInterval`,
/// `republishInterval`, `replicateInterval`, `networkId`, `multicastGroup`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Bucket capacity (peers per k-bucket).
    pub k: usize,
    /// Lookup concurrency.
    pub alpha: usize,
    /// Per-RPC timeout.
    pub request_timeout: Duration,
    /// How long a bucket may go untouched before a refresh lookup targets it.
    pub refresh_interval: Duration,
    /// How often a Primary store entry is republished.
    pub republish_interval: Duration,
    /// How often a Primary store entry's replicas are freshened.
    pub replicate_interval: Duration,
    /// Scoping token separating unrelated DHTs sharing a transport/multicast group.
    pub network_id: u64,
    /// Optional multicast group identifier (e.g. an address string) for LAN
    /// bootstrap; `None` disables multicast discovery entirely.
    pub multicast_group: Option<String>,
    /// How often the multicast discovery loop re-broadcasts its PING.
    pub multicast_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            alpha: DEFAULT_ALPHA,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            republish_interval: DEFAULT_REPUBLISH_INTERVAL,
            replicate_interval: DEFAULT_REPLICATE_INTERVAL,
            network_id: 0,
            multicast_group: None,
            multicast_interval: DEFAULT_MULTICAST_INTERVAL,
        }
    }
}
