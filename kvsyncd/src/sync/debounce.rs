//! Per-key delayed calls where a newer schedule replaces the pending one.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

type PendingMap<K> = Arc<Mutex<HashMap<K, Pending>>>;

/// At most one pending call per key. Scheduling a key again aborts the
/// pending call before it starts; a call that has already fired is no longer
/// pending and always runs to completion.
pub struct Debouncer<K> {
    pending: PendingMap<K>,
    generation: AtomicU64,
}

impl<K> Default for Debouncer<K> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` after `delay` unless `key` is scheduled or cancelled again
    /// first. Must be called from within a tokio runtime.
    pub fn schedule<F, Fut>(&self, key: K, delay: Duration, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let deadline = tokio::time::Instant::now() + delay;
        let pending = Arc::clone(&self.pending);
        // Held across spawn + insert so the timer cannot fire before its
        // entry exists.
        let mut guard = lock(&self.pending);
        if let Some(previous) = guard.remove(&key) {
            previous.handle.abort();
        }
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            {
                let mut guard = lock(&pending);
                match guard.get(&task_key) {
                    Some(entry) if entry.generation == generation => {
                        guard.remove(&task_key);
                    }
                    _ => return,
                }
            }
            task().await;
        });
        guard.insert(key, Pending { generation, handle });
    }

    pub fn cancel(&self, key: &K) -> bool {
        match lock(&self.pending).remove(key) {
            Some(entry) => {
                entry.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancels every pending call without running it. Returns how many were
    /// dropped.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Pending> = lock(&self.pending).drain().map(|(_, p)| p).collect();
        for entry in &drained {
            entry.handle.abort();
        }
        drained.len()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        lock(&self.pending).contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }
}

fn lock<K>(pending: &Mutex<HashMap<K, Pending>>) -> MutexGuard<'_, HashMap<K, Pending>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
