// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The correlation queue (C6): matches inbound responses to outstanding
//! requests keyed by `(endpoint, reply id)`.
//!
//! Registration is synchronous and separate from the wait: calling
//! [`CorrelationQueue::register`] inserts the waiter into the table
//! immediately and hands back a [`PendingCall`] guard, so a caller that
//! sends its request only after `register` returns is guaranteed the reply
//! cannot race ahead of the registration. An `async fn wait` alone would not
//! give this guarantee, since nothing observes the registration until the
//! future is first polled.

use std::collections::hash_map::Entry as MapEntry;

use fnv::FnvHashMap;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// A key identifying one outstanding request: the endpoint it was sent to
/// and the reply id carried in the message header.
///
/// `reply_id` is `u32`, matching the wire schema's header field width, not
/// the wider magic some sender implementations generate internally: the
/// wire width is authoritative for correlation.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct CorrelationKey {
    /// The transport-level address the request was sent to.
    pub endpoint: String,
    /// The reply id from the request's message header.
    pub reply_id: u32,
}

/// A registered waiter. Dropping it without consuming [`Self::wait`]
/// deregisters it, so a cancelled lookup round does not leak table entries.
pub struct PendingCall<R> {
    key: CorrelationKey,
    queue: std::sync::Weak<Inner<R>>,
    rx: Option<oneshot::Receiver<R>>,
}

impl<R> PendingCall<R> {
    /// Wait for the matching response, or [`Error::Timeout`] if `deadline`
    /// elapses first. Either outcome deregisters the waiter.
    pub async fn wait(mut self, deadline: Instant) -> Result<R> {
        let rx = self.rx.take().expect("wait consumes the receiver exactly once");
        tokio::select! {
            res = rx => res.map_err(|_| Error::Cancelled),
            _ = tokio::time::sleep_until(deadline) => {
                self.deregister();
                Err(Error::Timeout)
            }
        }
    }

    fn deregister(&self) {
        if let Some(inner) = self.queue.upgrade() {
            inner.waiters.lock().unwrap_or_else(|e| e.into_inner()).remove(&self.key);
        }
    }
}

impl<R> Drop for PendingCall<R> {
    fn drop(&mut self) {
        // If `wait` already consumed `rx` and completed, the waiter table
        // entry is already gone (the responder removed it on delivery, or
        // the timeout branch removed it above); this is then a harmless
        // no-op lookup.
        self.deregister();
    }
}

struct Inner<R> {
    waiters: std::sync::Mutex<FnvHashMap<CorrelationKey, oneshot::Sender<R>>>,
}

/// Tracks outstanding requests awaiting a correlated response.
pub struct CorrelationQueue<R> {
    inner: std::sync::Arc<Inner<R>>,
}

impl<R> Default for CorrelationQueue<R> {
    fn default() -> Self {
        Self {
            inner: std::sync::Arc::new(Inner {
                waiters: std::sync::Mutex::new(FnvHashMap::default()),
            }),
        }
    }
}

impl<R> CorrelationQueue<R> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `key` before sending the corresponding request.
    ///
    /// Returns [`Error::DuplicateOutstandingRequest`] if `key` already has an
    /// outstanding waiter (reply ids are expected to be chosen so this does
    /// not happen in ordinary operation).
    pub fn register(&self, key: CorrelationKey) -> Result<PendingCall<R>> {
        let (tx, rx) = oneshot::channel();
        let mut waiters = self.inner.waiters.lock().unwrap_or_else(|e| e.into_inner());
        match waiters.entry(key.clone()) {
            MapEntry::Occupied(_) => Err(Error::DuplicateOutstandingRequest),
            MapEntry::Vacant(slot) => {
                slot.insert(tx);
                drop(waiters);
                Ok(PendingCall {
                    key,
                    queue: std::sync::Arc::downgrade(&self.inner),
                    rx: Some(rx),
                })
            }
        }
    }

    /// Deliver an inbound response to its matching waiter, if one is still
    /// registered. Returns `false` if no waiter matched `key` (a late or
    /// duplicate reply, or one whose `PendingCall` already timed out).
    pub fn deliver(&self, key: &CorrelationKey, response: R) -> bool {
        let sender = self
            .inner
            .waiters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        match sender {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Number of waiters currently outstanding.
    pub fn len(&self) -> usize {
        self.inner.waiters.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether there are no waiters outstanding.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Duration;

    fn key(reply_id: u32) -> CorrelationKey {
        CorrelationKey {
            endpoint: "udp://10.0.0.1:1234".to_string(),
            reply_id,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deliver_resolves_the_matching_wait() {
        let queue: CorrelationQueue<u32> = CorrelationQueue::new();
        let pending = queue.register(key(1)).unwrap();
        assert!(queue.deliver(&key(1), 42));
        let deadline = Instant::now() + Duration::from_secs(5);
        assert_eq!(pending.wait(deadline).await.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_if_never_delivered() {
        let queue: CorrelationQueue<u32> = CorrelationQueue::new();
        let pending = queue.register(key(1)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        let wait = tokio::spawn(pending.wait(deadline));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(wait.await.unwrap().unwrap_err(), Error::Timeout);
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_registration_is_rejected() {
        let queue: CorrelationQueue<u32> = CorrelationQueue::new();
        let _first = queue.register(key(1)).unwrap();
        let err = queue.register(key(1)).unwrap_err();
        assert_eq!(err, Error::DuplicateOutstandingRequest);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_a_pending_call_deregisters_it() {
        let queue: CorrelationQueue<u32> = CorrelationQueue::new();
        let pending = queue.register(key(1)).unwrap();
        assert_eq!(queue.len(), 1);
        drop(pending);
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn late_delivery_after_timeout_is_reported_as_unmatched() {
        let queue: CorrelationQueue<u32> = CorrelationQueue::new();
        let pending = queue.register(key(1)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(1);
        let wait = tokio::spawn(pending.wait(deadline));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(wait.await.unwrap().unwrap_err(), Error::Timeout);
        assert!(!queue.deliver(&key(1), 7));
    }
}
