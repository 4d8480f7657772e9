// In-flight de-duplication set
//
// Best-effort and process-local: it only saves redundant store round trips.
// The atomic re-check in the store is what prevents double application.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::trace;

#[derive(Clone)]
pub struct InFlightSet {
    ids: Arc<Mutex<HashSet<String>>>,
    release_after: Duration,
}

impl InFlightSet {
    pub fn new(release_after: Duration) -> Self {
        Self {
            ids: Arc::new(Mutex::new(HashSet::new())),
            release_after,
        }
    }

    /// Claim `id`, or `None` if an attempt for it is already in flight
    pub fn try_claim(&self, id: &str) -> Option<InFlightClaim> {
        if !self.ids().insert(id.to_string()) {
            return None;
        }
        Some(InFlightClaim {
            set: self.clone(),
            id: id.to_string(),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids().contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, id: &str) {
        self.ids().remove(id);
    }

    // a set of plain strings stays consistent across a panic
    fn ids(&self) -> MutexGuard<'_, HashSet<String>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases its id `release_after` the claim is dropped
pub struct InFlightClaim {
    set: InFlightSet,
    id: String,
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        let set = self.set.clone();
        let id = std::mem::take(&mut self.id);
        let delay = set.release_after;

        match Handle::try_current() {
            Ok(handle) if !delay.is_zero() => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    set.release(&id);
                    trace!(queue_id = %id, "In-flight claim released");
                });
            }
            _ => set.release(&id),
        }
    }
}
