//! Single-flight request coalescing

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Shares one in-flight execution per key among concurrent callers
///
/// The first caller for a key (the leader) runs the work; everyone who
/// arrives while it runs subscribes and receives a clone of the leader's
/// output. If the leader is cancelled before finishing, a waiting caller
/// takes over and runs its own work instead.
#[derive(Clone)]
pub(crate) struct SingleFlight<T> {
    inflight: Arc<DashMap<String, broadcast::Sender<T>>>,
    // Keys with a background task running
    refreshing: Arc<DashMap<String, ()>>,
}

enum Role<T> {
    Leader(broadcast::Sender<T>),
    Follower(broadcast::Receiver<T>),
}

/// Removes the in-flight marker even if the leader future is dropped
struct InflightGuard<'a, T> {
    map: &'a DashMap<String, broadcast::Sender<T>>,
    key: &'a str,
}

impl<T> Drop for InflightGuard<'_, T> {
    fn drop(&mut self) {
        self.map.remove(self.key);
    }
}

impl<T: Clone + Send + 'static> SingleFlight<T> {
    pub(crate) fn new() -> Self {
        Self {
            inflight: Arc::new(DashMap::new()),
            refreshing: Arc::new(DashMap::new()),
        }
    }

    /// Run `f` for `key`, or wait for the run already in flight
    pub(crate) async fn run<F, Fut>(&self, key: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        loop {
            // Scope the entry lock so it is released before any await
            let role = match self.inflight.entry(key.to_string()) {
                Entry::Occupied(o) => Role::Follower(o.get().subscribe()),
                Entry::Vacant(v) => {
                    let (tx, _rx) = broadcast::channel(1);
                    v.insert(tx.clone());
                    Role::Leader(tx)
                }
            };

            match role {
                Role::Follower(mut rx) => match rx.recv().await {
                    Ok(value) => return value,
                    // Leader went away without a result; compete again
                    Err(_) => continue,
                },
                Role::Leader(tx) => {
                    let guard = InflightGuard {
                        map: &self.inflight,
                        key,
                    };
                    let value = f().await;
                    drop(guard);

                    if tx.receiver_count() > 0 {
                        let _ = tx.send(value.clone());
                    }
                    return value;
                }
            }
        }
    }

    /// Check whether a run for `key` is in progress
    pub(crate) fn is_in_flight(&self, key: &str) -> bool {
        self.inflight.contains_key(key)
    }

    /// Spawn a background task for `key` unless one is already running
    ///
    /// Returns `true` if a task was spawned.
    pub(crate) fn try_spawn<F, Fut>(&self, key: &str, task_factory: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let should_run = match self.refreshing.entry(key.to_string()) {
            Entry::Vacant(v) => {
                v.insert(());
                true
            }
            Entry::Occupied(_) => false,
        };

        if should_run {
            let task = task_factory();
            let map = self.refreshing.clone();
            let key = key.to_string();
            tokio::spawn(async move {
                task.await;
                map.remove(&key);
            });
        }
        should_run
    }
}
