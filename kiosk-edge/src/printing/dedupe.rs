//! Duplicate submission guard
//!
//! Identical jobs submitted within the window share one execution and its
//! outcome. Network retries from the front door would otherwise double-print.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;

struct Submission<V> {
    started: Instant,
    outcome: Arc<OnceCell<V>>,
}

pub struct DedupeGuard<K, V> {
    window: Duration,
    entries: Mutex<HashMap<K, Submission<V>>>,
}

impl<K: Hash + Eq, V: Clone> DedupeGuard<K, V> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Run `job` unless an identical submission is inside the window, in
    /// which case wait for that one and return its outcome.
    pub async fn run<F, Fut>(&self, key: K, job: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let outcome = {
            let mut entries = self.entries.lock();
            let now = Instant::now();
            entries.retain(|_, s| now.duration_since(s.started) < self.window);
            match entries.entry(key) {
                Entry::Occupied(existing) => {
                    tracing::info!("duplicate job collapsed into earlier submission");
                    existing.get().outcome.clone()
                }
                Entry::Vacant(slot) => {
                    let outcome = Arc::new(OnceCell::new());
                    if !self.window.is_zero() {
                        slot.insert(Submission {
                            started: now,
                            outcome: outcome.clone(),
                        });
                    }
                    outcome
                }
            }
        };
        outcome.get_or_init(job).await.clone()
    }
}
