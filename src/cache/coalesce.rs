//! Deduplication of concurrent identical fetches.
//!
//! The first caller for a key becomes the leader: it registers a shared future
//! in the group table and drives it. Callers arriving while that future is in
//! flight join it instead of running their own loader. The group entry is
//! removed as soon as the fetch resolves, fails, panics or is abandoned, so
//! nothing here outlives one fetch.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, WeakShared};
use metrics::counter;
use tracing::debug;

use super::lock::mutex_lock;

const SOURCE: &str = "cache::coalesce";
const METRIC_COALESCE_SHARED: &str = "catalogd_coalesce_shared_total";

type SharedFetch<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

struct Group<T, E> {
    id: u64,
    fetch: WeakShared<BoxFuture<'static, Result<T, E>>>,
    waiters: usize,
}

type GroupTable<T, E> = Arc<Mutex<HashMap<String, Group<T, E>>>>;

/// Whether the caller ran the loader or joined another caller's fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Waiter,
}

/// Join point for concurrent fetches of the same key.
///
/// One instance per operation; the label names it in logs and metrics.
pub struct Coalescer<T, E> {
    label: &'static str,
    groups: GroupTable<T, E>,
    next_id: AtomicU64,
}

impl<T, E> Coalescer<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            groups: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Run `loader` for `key` unless a fetch for `key` is already in flight,
    /// in which case wait for that fetch and return its result.
    pub async fn execute<F, Fut>(&self, key: &str, loader: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.execute_with_role(key, loader).await.0
    }

    pub async fn execute_with_role<F, Fut>(&self, key: &str, loader: F) -> (Result<T, E>, Role)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (fetch, role) = self.join_or_lead(key, loader);
        if role == Role::Waiter {
            counter!(METRIC_COALESCE_SHARED, "operation" => self.label).increment(1);
            debug!(
                operation = self.label,
                key,
                result = "shared",
                "Joined in-flight fetch"
            );
        }
        (fetch.await, role)
    }

    /// Number of keys with a fetch in flight.
    pub fn in_flight(&self) -> usize {
        mutex_lock(&self.groups, SOURCE, "in_flight").len()
    }

    fn join_or_lead<F, Fut>(&self, key: &str, loader: F) -> (SharedFetch<T, E>, Role)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let mut groups = mutex_lock(&self.groups, SOURCE, "join_or_lead");

        if let Some(group) = groups.get_mut(key)
            && let Some(fetch) = group.fetch.upgrade()
        {
            group.waiters += 1;
            return (fetch, Role::Waiter);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let guard = GroupGuard {
            label: self.label,
            groups: Arc::clone(&self.groups),
            key: key.to_string(),
            id,
        };
        let fetch = async move {
            let _guard = guard;
            loader().await
        }
        .boxed()
        .shared();

        // Not polled yet, so the weak handle is always available here.
        if let Some(weak) = fetch.downgrade() {
            groups.insert(
                key.to_string(),
                Group {
                    id,
                    fetch: weak,
                    waiters: 0,
                },
            );
        }
        (fetch, Role::Leader)
    }
}

/// Removes its group entry when the fetch finishes or is dropped.
struct GroupGuard<T, E> {
    label: &'static str,
    groups: GroupTable<T, E>,
    key: String,
    id: u64,
}

impl<T, E> Drop for GroupGuard<T, E> {
    fn drop(&mut self) {
        let mut groups = mutex_lock(&self.groups, SOURCE, "release");
        // A newer group may own the key if this one was abandoned.
        if groups.get(&self.key).is_some_and(|group| group.id == self.id)
            && let Some(group) = groups.remove(&self.key)
        {
            debug!(
                operation = self.label,
                key = %self.key,
                waiters = group.waiters,
                "Released coalescing group"
            );
        }
    }
}
