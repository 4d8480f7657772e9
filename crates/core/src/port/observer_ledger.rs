// Observer Ledger Port (Interface)
//
// Remembers, per (queue, member), the last position an observer was shown so
// that change events stay edge-triggered across polls and restarts. Writes are
// compare-and-set against the observation the caller loaded: of two polls
// racing from the same baseline, exactly one records the transition.

use crate::domain::Observation;
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ObserverLedger: Send + Sync {
    async fn load(&self, queue_id: &str, member_id: &str) -> Result<Option<Observation>>;

    /// Record `next` if the entry still equals `expected` (`None`: no entry yet).
    ///
    /// Returns false when another writer got there first.
    async fn compare_and_store(
        &self,
        queue_id: &str,
        member_id: &str,
        expected: Option<&Observation>,
        next: &Observation,
    ) -> Result<bool>;

    /// Remove the entry if it still equals `expected`
    async fn compare_and_forget(
        &self,
        queue_id: &str,
        member_id: &str,
        expected: &Observation,
    ) -> Result<bool>;

    /// Stamp every entry of an ended queue with `ended_at`. Entries stay
    /// loadable so each observer can still be told about the removal.
    async fn retire_queue(&self, queue_id: &str, ended_at: i64) -> Result<u64>;

    /// Delete entries retired at or before `cutoff`
    async fn purge_retired(&self, cutoff: i64) -> Result<u64>;
}

pub mod memory {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy)]
    struct Entry {
        observation: Observation,
        ended_at: Option<i64>,
    }

    type Entries = HashMap<(String, String), Entry>;

    #[derive(Default)]
    pub struct InMemoryObserverLedger {
        entries: Mutex<Entries>,
    }

    impl InMemoryObserverLedger {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn len(&self) -> usize {
            self.with_entries(|entries| entries.len()).unwrap_or(0)
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        fn with_entries<T>(&self, f: impl FnOnce(&mut Entries) -> T) -> Result<T> {
            let mut entries = self
                .entries
                .lock()
                .map_err(|_| AppError::Internal("observer ledger mutex poisoned".into()))?;
            Ok(f(&mut entries))
        }
    }

    fn key(queue_id: &str, member_id: &str) -> (String, String) {
        (queue_id.to_string(), member_id.to_string())
    }

    #[async_trait]
    impl ObserverLedger for InMemoryObserverLedger {
        async fn load(&self, queue_id: &str, member_id: &str) -> Result<Option<Observation>> {
            let key = key(queue_id, member_id);
            self.with_entries(|entries| entries.get(&key).map(|e| e.observation))
        }

        async fn compare_and_store(
            &self,
            queue_id: &str,
            member_id: &str,
            expected: Option<&Observation>,
            next: &Observation,
        ) -> Result<bool> {
            let key = key(queue_id, member_id);
            self.with_entries(|entries| {
                let current = entries.get(&key).map(|e| &e.observation);
                if current != expected {
                    return false;
                }
                let ended_at = entries.get(&key).and_then(|e| e.ended_at);
                entries.insert(
                    key,
                    Entry {
                        observation: *next,
                        ended_at,
                    },
                );
                true
            })
        }

        async fn compare_and_forget(
            &self,
            queue_id: &str,
            member_id: &str,
            expected: &Observation,
        ) -> Result<bool> {
            let key = key(queue_id, member_id);
            self.with_entries(|entries| match entries.get(&key) {
                Some(entry) if entry.observation == *expected => {
                    entries.remove(&key);
                    true
                }
                _ => false,
            })
        }

        async fn retire_queue(&self, queue_id: &str, ended_at: i64) -> Result<u64> {
            self.with_entries(|entries| {
                let mut retired = 0;
                for ((queue, _), entry) in entries.iter_mut() {
                    if queue == queue_id && entry.ended_at.is_none() {
                        entry.ended_at = Some(ended_at);
                        retired += 1;
                    }
                }
                retired
            })
        }

        async fn purge_retired(&self, cutoff: i64) -> Result<u64> {
            self.with_entries(|entries| {
                let before = entries.len();
                entries.retain(|_, entry| !entry.ended_at.is_some_and(|at| at <= cutoff));
                (before - entries.len()) as u64
            })
        }
    }
}
