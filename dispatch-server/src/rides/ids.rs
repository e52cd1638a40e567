//! Ride identity allocation.
//!
//! Normally an atomic increment on the durable sequence counter, rendered
//! as `RID` + six digits with wrap recycling. When the counter is
//! unreachable the service mints a clock-derived fallback id and logs; the
//! store's unique index on the raid id catches the rare collision and the
//! caller retries.

use std::sync::Arc;

use tracing::warn;

use crate::ports::clock::Clock;
use crate::ports::store::{CounterStore, Store};
use crate::types::primitives::RideId;

// ═══════════════════════════════════════════════════════════════════════════════
// RIDE ID SERVICE
// ═══════════════════════════════════════════════════════════════════════════════

/// Allocates human-readable ride identifiers.
pub struct RideIdService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RideIdService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RideIdService").finish_non_exhaustive()
    }
}

impl RideIdService {
    /// Create the service.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Allocate the next ride id.
    ///
    /// Never fails: a counter outage degrades to the fallback form instead.
    pub async fn next(&self) -> RideId {
        match self.store.next_ride_sequence().await {
            Ok(sequence) => RideId::from_sequence(sequence),
            Err(err) => {
                warn!(error = %err, "Sequence counter unavailable, using fallback ride id");
                RideId::fallback(self.clock.unix_millis(), rand::random_range(0..1000))
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
