// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The endpoint registry (C2): canonicalizes transport URIs into opaque
//! handles so that equality and hashing identify the same reachable address
//! consistently, and tracks per-endpoint success/timeout telemetry used by
//! the invoker's endpoint-preference ordering and the bucket's eviction probe.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use fnv::FnvHashMap;

use crate::clock::{Clock, Instant};

struct EndpointInner {
    uri: String,
    successes: AtomicU64,
    timeouts: AtomicU64,
    last_success: Mutex<Option<Instant>>,
}

/// An opaque handle to a reachable transport address.
///
/// Equality and hashing are structural over the canonical URI, not over
/// pointer identity, so two `resolve` calls for the same address compare
/// equal even if the registry happened to hand back different `Arc`s (it
/// never does in practice, since [`EndpointRegistry::resolve`] caches by
/// URI, but callers should not rely on that).
#[derive(Clone)]
pub struct Endpoint(Arc<EndpointInner>);

impl Endpoint {
    /// The canonical URI this endpoint was resolved from.
    pub fn uri(&self) -> &str {
        &self.0.uri
    }

    /// Total observed successful round-trips.
    pub fn successes(&self) -> u64 {
        self.0.successes.load(Ordering::Relaxed)
    }

    /// Total observed timeouts.
    pub fn timeouts(&self) -> u64 {
        self.0.timeouts.load(Ordering::Relaxed)
    }

    /// When this endpoint last completed a request successfully, if ever.
    pub fn last_success(&self) -> Option<Instant> {
        *self.0.last_success.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.0.uri == other.0.uri
    }
}

impl Eq for Endpoint {}

impl Hash for Endpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.uri.hash(state);
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint").field("uri", &self.0.uri).finish()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.uri)
    }
}

/// Canonicalizes URIs into [`Endpoint`] handles and fans success/timeout
/// telemetry out to them.
///
/// Endpoints are held by [`Weak`] reference internally: once no
/// [`crate::bucket::PeerEntry`] (and no in-flight call) holds a strong
/// reference to an endpoint, it is dropped from the registry on its next
/// `resolve` of the same URI — there is no explicit GC pass to run.
#[derive(Default)]
pub struct EndpointRegistry {
    entries: Mutex<FnvHashMap<String, Weak<EndpointInner>>>,
}

impl EndpointRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a URI to its canonical `Endpoint`, creating it on first
    /// observation.
    pub fn resolve(&self, uri: impl Into<String>) -> Endpoint {
        let uri = uri.into();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = entries.get(&uri).and_then(Weak::upgrade) {
            return Endpoint(existing);
        }
        let inner = Arc::new(EndpointInner {
            uri: uri.clone(),
            successes: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            last_success: Mutex::new(None),
        });
        entries.insert(uri, Arc::downgrade(&inner));
        Endpoint(inner)
    }

    /// Record a successful round-trip through `endpoint`.
    pub fn on_success(&self, endpoint: &Endpoint, clock: &dyn Clock) {
        endpoint.0.successes.fetch_add(1, Ordering::Relaxed);
        *endpoint
            .0
            .last_success
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(clock.now());
        trace!(uri = %endpoint.uri(), "endpoint success recorded");
    }

    /// Record a timeout through `endpoint`.
    pub fn on_timeout(&self, endpoint: &Endpoint) {
        endpoint.0.timeouts.fetch_add(1, Ordering::Relaxed);
        trace!(uri = %endpoint.uri(), "endpoint timeout recorded");
    }

    /// Number of endpoints currently referenced by at least one caller.
    /// Exposed for tests and diagnostics; also prunes stale map entries.
    pub fn live_count(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, weak| weak.strong_count() > 0);
        entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TokioClock;

    #[test]
    fn resolve_is_canonical() {
        let registry = EndpointRegistry::new();
        let a = registry.resolve("udp://10.0.0.1:1234");
        let b = registry.resolve("udp://10.0.0.1:1234");
        assert_eq!(a, b);
        assert_eq!(registry.live_count(), 1);
    }

    #[test]
    fn distinct_uris_are_distinct_endpoints() {
        let registry = EndpointRegistry::new();
        let a = registry.resolve("udp://10.0.0.1:1234");
        let b = registry.resolve("udp://10.0.0.2:1234");
        assert_ne!(a, b);
    }

    #[test]
    fn dropping_all_references_makes_endpoint_eligible_for_gc() {
        let registry = EndpointRegistry::new();
        {
            let _a = registry.resolve("udp://10.0.0.1:1234");
            assert_eq!(registry.live_count(), 1);
        }
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn success_and_timeout_counters() {
        let registry = EndpointRegistry::new();
        let ep = registry.resolve("udp://10.0.0.1:1234");
        let clock = TokioClock;
        registry.on_success(&ep, &clock);
        registry.on_timeout(&ep);
        registry.on_timeout(&ep);
        assert_eq!(ep.successes(), 1);
        assert_eq!(ep.timeouts(), 2);
        assert!(ep.last_success().is_some());
    }
}
