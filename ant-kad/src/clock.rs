// Copyright 2024 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The `Clock` collaborator interface (§1): everything in this crate that
//! reasons about deadlines and expirations goes through it rather than
//! calling `Instant::now()` directly, so tests can drive time with
//! `tokio::time::pause`/`advance` instead of sleeping in real time.

/// A monotonic timestamp. An alias for `tokio::time::Instant` rather than a
/// bespoke type: it is already monotonic, already cheap to compare, and
/// already integrates with `tokio::time::pause`/`advance` for deterministic
/// timer tests.
pub type Instant = tokio::time::Instant;

/// Supplies monotonic time to the routing table, value store, correlation
/// queue and maintenance loop. An external collaborator in production (the
/// embedding binary may inject a clock backed by a simulated network), but
/// [`TokioClock`] is a perfectly ordinary default for real deployments.
pub trait Clock: Send + Sync + 'static {
    /// The current monotonic instant.
    fn now(&self) -> Instant;
}

/// The default [`Clock`], backed by the Tokio runtime's own timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now()
    }
}
