// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The value store (C5): versioned key/value entries, held either as the
//! node `Primary` responsible for republishing and replicating them, or as a
//! `Replica` that merely honors their TTL.

use std::time::Duration;

use fnv::FnvHashMap;
use std::sync::Mutex;

use crate::clock::Instant;
use crate::error::{Error, Result};
use crate::node_id::NodeId;

/// Why this node holds a given value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StoreMode {
    /// This node originated the value and is responsible for periodically
    /// republishing and replicating it (§4.9).
    Primary,
    /// This node merely holds a replica on behalf of some primary, and lets
    /// it expire if nobody refreshes it in time.
    Replica,
}

struct Entry {
    value: Vec<u8>,
    version: u64,
    mode: StoreMode,
    ttl: Duration,
    expire_at: Instant,
    republish_at: Option<Instant>,
    replicate_at: Option<Instant>,
}

/// A snapshot of one stored entry, as returned by [`ValueStore::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
    /// The stored bytes.
    pub value: Vec<u8>,
    /// The entry's current version.
    pub version: u64,
    /// When this entry expires absent a refresh.
    pub expire_at: Instant,
}

/// A versioned, in-memory key/value table.
///
/// A `set` for a key already held is rejected with [`Error::StaleVersion`]
/// only if it carries a version strictly lower than the one on file; an
/// equal version is accepted as a refresh (expiry and, for `Primary`
/// entries, the republish/replicate timers are reset, but the stored bytes
/// are otherwise unchanged since a caller only ever resends identical bytes
/// at an unchanged version). This is what lets republish and replicate work
/// at all: both re-`STORE` a `Primary` entry's current value at its current,
/// unbumped version purely to reset its replicas' TTLs, and that re-`STORE`
/// must succeed rather than being rejected as stale.
pub struct ValueStore<const N: usize> {
    entries: Mutex<FnvHashMap<NodeId<N>, Entry>>,
}

impl<const N: usize> Default for ValueStore<N> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(FnvHashMap::default()),
        }
    }
}

impl<const N: usize> ValueStore<N> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update `key`, rejecting versions strictly lower than the
    /// one already held.
    ///
    /// On acceptance, `expire_at` is reset to `now + ttl`. For `Primary`
    /// entries, `republish_at`/`replicate_at` are (re)set to
    /// `now + republish_interval`/`now + replicate_interval`; `Replica`
    /// entries never carry these, since only an entry's originator
    /// republishes or replicates it.
    #[allow(clippy::too_many_arguments)]
    pub fn set(
        &self,
        key: NodeId<N>,
        value: Vec<u8>,
        version: u64,
        ttl: Duration,
        mode: StoreMode,
        now: Instant,
        republish_interval: Duration,
        replicate_interval: Duration,
    ) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = entries.get(&key) {
            if version < existing.version {
                return Err(Error::StaleVersion {
                    offered: version,
                    current: existing.version,
                });
            }
        }
        let (republish_at, replicate_at) = match mode {
            StoreMode::Primary => (Some(now + republish_interval), Some(now + replicate_interval)),
            StoreMode::Replica => (None, None),
        };
        entries.insert(
            key,
            Entry {
                value,
                version,
                mode,
                ttl,
                expire_at: now + ttl,
                republish_at,
                replicate_at,
            },
        );
        Ok(())
    }

    /// Look up the current value, version and expiration for `key`.
    pub fn get(&self, key: &NodeId<N>) -> Option<StoredValue> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).map(|e| StoredValue {
            value: e.value.clone(),
            version: e.version,
            expire_at: e.expire_at,
        })
    }

    /// Snapshot of all keys currently held.
    pub fn keys(&self) -> Vec<NodeId<N>> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect()
    }

    /// Drop entries with `expire_at <= now`. Called periodically by the
    /// maintenance loop.
    pub fn expire(&self, now: Instant) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, e| e.expire_at > now);
    }

    /// Remove `key` unconditionally.
    pub fn remove(&self, key: &NodeId<N>) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).remove(key);
    }

    /// `Primary` keys with `republish_at <= now`, paired with their current
    /// value, version and TTL, for the maintenance loop to re-`STORE`. The
    /// TTL returned is the entry's own (caller-supplied, at `set` time), not
    /// the republish period, so a republished value keeps its full
    /// remaining lifetime on the wire rather than being truncated to one
    /// maintenance cycle. Resets `republish_at` to `now + republish_interval`
    /// for each.
    pub fn take_due_for_republish(
        &self,
        now: Instant,
        republish_interval: Duration,
    ) -> Vec<(NodeId<N>, Vec<u8>, u64, Duration)> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut due = Vec::new();
        for (key, entry) in entries.iter_mut() {
            if entry.mode == StoreMode::Primary && entry.republish_at.is_some_and(|at| at <= now) {
                due.push((*key, entry.value.clone(), entry.version, entry.ttl));
                entry.republish_at = Some(now + republish_interval);
            }
        }
        due
    }

    /// `Primary` keys with `replicate_at <= now`, paired with their current
    /// value, version and TTL, for the maintenance loop to freshen replicas.
    /// Resets `replicate_at` to `now + replicate_interval` for each.
    pub fn take_due_for_replicate(
        &self,
        now: Instant,
        replicate_interval: Duration,
    ) -> Vec<(NodeId<N>, Vec<u8>, u64, Duration)> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut due = Vec::new();
        for (key, entry) in entries.iter_mut() {
            if entry.mode == StoreMode::Primary && entry.replicate_at.is_some_and(|at| at <= now) {
                due.push((*key, entry.value.clone(), entry.version, entry.ttl));
                entry.replicate_at = Some(now + replicate_interval);
            }
        }
        due
    }

    /// Total number of keys currently held.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time;

    fn id(n: u32) -> NodeId<4> {
        NodeId::new(n.to_be_bytes())
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test(start_paused = true)]
    async fn set_rejects_strictly_lower_version_only() {
        let store: ValueStore<4> = ValueStore::new();
        let now = Instant::now();
        store
            .set(id(1), b"v5".to_vec(), 5, HOUR, StoreMode::Primary, now, HOUR, HOUR)
            .unwrap();

        let err = store
            .set(id(1), b"v0".to_vec(), 0, HOUR, StoreMode::Primary, now, HOUR, HOUR)
            .unwrap_err();
        assert_eq!(
            err,
            Error::StaleVersion {
                offered: 0,
                current: 5
            }
        );

        let stored = store.get(&id(1)).unwrap();
        assert_eq!(stored.value, b"v5".to_vec());
        assert_eq!(stored.version, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn set_at_an_equal_version_refreshes_rather_than_rejects() {
        // This is what republish and replicate rely on: both re-`STORE` an
        // entry's current value at its current, unbumped version purely to
        // reset expiry, and that must succeed.
        let store: ValueStore<4> = ValueStore::new();
        let now = Instant::now();
        store
            .set(id(1), b"v5".to_vec(), 5, Duration::from_millis(50), StoreMode::Replica, now, HOUR, HOUR)
            .unwrap();

        time::advance(Duration::from_millis(30)).await;
        let later = Instant::now();
        store
            .set(id(1), b"v5".to_vec(), 5, Duration::from_millis(50), StoreMode::Replica, later, HOUR, HOUR)
            .unwrap();

        let stored = store.get(&id(1)).unwrap();
        assert_eq!(stored.version, 5);
        assert_eq!(stored.expire_at, later + Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn set_accepts_strictly_greater_version() {
        let store: ValueStore<4> = ValueStore::new();
        let now = Instant::now();
        store
            .set(id(1), b"v5".to_vec(), 5, HOUR, StoreMode::Primary, now, HOUR, HOUR)
            .unwrap();
        store
            .set(id(1), b"v6".to_vec(), 6, HOUR, StoreMode::Primary, now, HOUR, HOUR)
            .unwrap();
        assert_eq!(store.get(&id(1)).unwrap().version, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn expire_drops_entries_past_their_ttl() {
        let store: ValueStore<4> = ValueStore::new();
        let now = Instant::now();
        store
            .set(
                id(1),
                b"short".to_vec(),
                1,
                Duration::from_millis(50),
                StoreMode::Replica,
                now,
                HOUR,
                HOUR,
            )
            .unwrap();

        time::advance(Duration::from_millis(100)).await;
        store.expire(Instant::now());
        assert!(store.get(&id(1)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn republish_only_applies_to_primary_entries() {
        let store: ValueStore<4> = ValueStore::new();
        let now = Instant::now();
        store
            .set(id(1), b"p".to_vec(), 1, HOUR, StoreMode::Primary, now, HOUR, HOUR)
            .unwrap();
        store
            .set(id(2), b"r".to_vec(), 1, HOUR, StoreMode::Replica, now, HOUR, HOUR)
            .unwrap();

        time::advance(HOUR + Duration::from_secs(1)).await;
        let due = store.take_due_for_republish(Instant::now(), HOUR);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].0, id(1));

        // Having been taken, it is not due again immediately.
        let due_again = store.take_due_for_republish(Instant::now(), HOUR);
        assert!(due_again.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn replicate_is_independent_of_republish() {
        let store: ValueStore<4> = ValueStore::new();
        let now = Instant::now();
        store
            .set(
                id(1),
                b"p".to_vec(),
                1,
                HOUR,
                StoreMode::Primary,
                now,
                Duration::from_secs(7200),
                Duration::from_secs(100),
            )
            .unwrap();

        time::advance(Duration::from_secs(200)).await;
        let republish_due = store.take_due_for_republish(Instant::now(), Duration::from_secs(7200));
        assert!(republish_due.is_empty());
        let replicate_due = store.take_due_for_replicate(Instant::now(), Duration::from_secs(100));
        assert_eq!(replicate_due.len(), 1);
    }
}
