//! Processed webhook event ids, so redelivered events are not counted twice

use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

/// Sweep expired entries once the ledger grows past this many ids
const SWEEP_THRESHOLD: usize = 1024;
/// Minimum gap between two sweeps
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Process-local set of recently handled event ids.
///
/// Entries expire after `ttl`; an expired id can be claimed again.
pub struct DeliveryLedger {
    seen: DashMap<String, Instant>,
    ttl: Duration,
    last_sweep: Mutex<Option<Instant>>,
}

impl DeliveryLedger {
    pub fn new(ttl: Duration) -> Self {
        Self {
            seen: DashMap::new(),
            ttl,
            last_sweep: Mutex::new(None),
        }
    }

    /// Claim an event id. Returns false if it was already claimed within the ttl.
    pub fn claim(&self, event_id: &str) -> bool {
        if self.len() >= SWEEP_THRESHOLD {
            self.sweep_if_due();
        }

        let now = Instant::now();
        let mut claimed = false;
        self.seen
            .entry(event_id.to_string())
            .and_modify(|at| {
                if now.duration_since(*at) >= self.ttl {
                    *at = now;
                    claimed = true;
                }
            })
            .or_insert_with(|| {
                claimed = true;
                now
            });
        claimed
    }

    /// Forget an event id so a later delivery is processed again
    pub fn release(&self, event_id: &str) {
        self.seen.remove(event_id);
    }

    /// Purge at most once per [`SWEEP_INTERVAL`]
    fn sweep_if_due(&self) {
        {
            let Some(mut last) = self.last_sweep.try_lock() else {
                // Another claim is checking the schedule
                return;
            };
            if matches!(*last, Some(at) if at.elapsed() < SWEEP_INTERVAL) {
                return;
            }
            *last = Some(Instant::now());
        }
        self.purge_expired();
    }

    /// Drop all expired ids
    pub fn purge_expired(&self) {
        let ttl = self.ttl;
        self.seen.retain(|_, at| at.elapsed() < ttl);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }
}
