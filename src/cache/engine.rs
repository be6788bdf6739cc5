//! Loading Cache Module
//!
//! The cache engine: lazy expiration, single-flight loading, stale-while-revalidate
//! refresh and removal on top of a pluggable backing store.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::cache::loader::resolve;
use crate::cache::stats::StatsCounter;
use crate::cache::{
    BackingStore, CacheEntry, CacheLoader, CachePolicy, CacheStats, Clock, Executor, LoadFuture,
    LoadingValueReference, MemoryStore, MonotonicClock, SameThreadExecutor, ValueReference,
    MAX_KEY_LENGTH,
};
use crate::error::{CacheError, Result};

static NEXT_NAMESPACE: AtomicU64 = AtomicU64::new(0);

// == Loading Cache ==
/// A keyed cache that computes missing values through a [`CacheLoader`].
///
/// At most one computation runs per key at a time; concurrent callers for the
/// same key wait for it instead of starting their own. Loaders always run
/// outside the cache's lock, so a slow key never holds up other keys.
///
/// Cloning is cheap and yields a handle to the same cache.
pub struct LoadingCache<V> {
    inner: Arc<Inner<V>>,
}

struct Inner<V> {
    namespace: String,
    prefix: String,
    policy: CachePolicy,
    store: Arc<dyn BackingStore<V>>,
    clock: Arc<dyn Clock>,
    executor: Arc<dyn Executor>,
    /// Guards every structural change of a value reference.
    lock: Mutex<()>,
    next_token: AtomicU64,
    stats: StatsCounter,
}

impl<V> Clone for LoadingCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for LoadingCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadingCache")
            .field("namespace", &self.inner.namespace)
            .field("policy", &self.inner.policy)
            .field("size", &self.inner.stats.entries())
            .finish()
    }
}

// == Builder ==
/// Assembles a [`LoadingCache`] from its collaborators.
///
/// Unset collaborators default to a private [`MemoryStore`], a
/// [`MonotonicClock`] and a [`SameThreadExecutor`].
pub struct LoadingCacheBuilder<V> {
    policy: CachePolicy,
    namespace: Option<String>,
    store: Option<Arc<dyn BackingStore<V>>>,
    clock: Option<Arc<dyn Clock>>,
    executor: Option<Arc<dyn Executor>>,
}

impl<V> LoadingCacheBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Prefix for this cache's keys in the backing store. Caches sharing a
    /// store must use distinct namespaces.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn store(mut self, store: Arc<dyn BackingStore<V>>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn build(self) -> Result<LoadingCache<V>> {
        let namespace = match &self.namespace {
            Some(namespace) if namespace.is_empty() => {
                return Err(CacheError::InvalidArgument(
                    "Namespace cannot be empty".to_string(),
                ))
            }
            Some(namespace) => namespace.clone(),
            None => next_namespace(),
        };
        Ok(self.assemble(namespace))
    }

    fn assemble(self, namespace: String) -> LoadingCache<V> {
        let store: Arc<dyn BackingStore<V>> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryStore::new()),
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(MonotonicClock::new()),
        };
        let executor: Arc<dyn Executor> = match self.executor {
            Some(executor) => executor,
            None => Arc::new(SameThreadExecutor),
        };

        debug!(
            "Created cache '{}' with policy {:?}",
            namespace, self.policy
        );

        LoadingCache {
            inner: Arc::new(Inner {
                prefix: format!("{}:", namespace),
                namespace,
                policy: self.policy,
                store,
                clock,
                executor,
                lock: Mutex::new(()),
                next_token: AtomicU64::new(1),
                stats: StatsCounter::default(),
            }),
        }
    }
}

fn next_namespace() -> String {
    format!("cache-{}", NEXT_NAMESPACE.fetch_add(1, Ordering::Relaxed))
}

impl<V> LoadingCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn builder() -> LoadingCacheBuilder<V> {
        LoadingCacheBuilder {
            policy: CachePolicy::default(),
            namespace: None,
            store: None,
            clock: None,
            executor: None,
        }
    }

    /// Creates a cache with default collaborators.
    pub fn new(policy: CachePolicy) -> Self {
        Self::builder().policy(policy).assemble(next_namespace())
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.inner.policy
    }

    // == Get If Present ==
    /// Returns the stored value without loading, locking or blocking.
    ///
    /// `None` when the key is absent, expired, or still being loaded for the
    /// first time. While a refresh is in flight the previous value is returned.
    pub fn get_if_present(&self, key: &str) -> Option<V> {
        let inner = &self.inner;
        let now = inner.clock.now_nanos();

        let value = inner
            .store
            .get(&inner.store_key(key))
            .filter(|entry| !entry.is_expired(&inner.policy, now))
            .and_then(|entry| {
                let value = entry.value_reference().value();
                if value.is_some() {
                    entry.record_read(&inner.policy, now);
                }
                value
            });

        match value {
            Some(_) => inner.stats.record_hit(),
            None => inner.stats.record_miss(),
        }
        value
    }

    // == Get ==
    /// Returns the value for `key`, computing it with `loader` if needed.
    ///
    /// Concurrent calls for a cold key run `loader` once; every caller gets the
    /// same value or the same error. When a refresh is due the current value
    /// is returned right away and the refresh runs on the cache's executor.
    pub fn get<L>(&self, key: &str, loader: &Arc<L>) -> Result<V>
    where
        L: CacheLoader<V> + ?Sized + 'static,
    {
        self.get_inner(key, loader, None)
    }

    /// Like [`get`](Self::get), but waits at most `timeout` when joining a
    /// computation started by another caller. The caller's own load is not
    /// bounded.
    pub fn get_with_timeout<L>(&self, key: &str, loader: &Arc<L>, timeout: Duration) -> Result<V>
    where
        L: CacheLoader<V> + ?Sized + 'static,
    {
        self.get_inner(key, loader, Some(timeout))
    }

    fn get_inner<L>(&self, key: &str, loader: &Arc<L>, wait: Option<Duration>) -> Result<V>
    where
        L: CacheLoader<V> + ?Sized + 'static,
    {
        validate_key(key)?;
        let inner = &self.inner;
        let now = inner.clock.now_nanos();

        if let Some(entry) = inner.store.get(&inner.store_key(key)) {
            let expired = entry.is_expired(&inner.policy, now);
            match entry.value_reference() {
                ValueReference::Loaded(value) if !expired => {
                    entry.record_read(&inner.policy, now);
                    inner.stats.record_hit();
                    if entry.needs_refresh(&inner.policy, now) {
                        if let Some(fresh) = self.refresh_in_place(key, loader) {
                            return Ok(fresh);
                        }
                    }
                    return Ok(value.clone());
                }
                ValueReference::Loading(loading) => {
                    // A refresh in flight keeps serving the value it will replace.
                    if loading.is_active() && !expired {
                        if let Some(stale) = loading.value() {
                            entry.record_read(&inner.policy, now);
                            inner.stats.record_hit();
                            return Ok(stale);
                        }
                    }
                    inner.stats.record_miss();
                    return self.join(key, loading.clone(), loader, wait);
                }
                _ => {}
            }
        }

        inner.stats.record_miss();
        self.lock_and_load(key, loader, wait)
    }

    /// Waits on another caller's computation. A failed refresh falls back to a
    /// fresh attempt rather than surfacing the refresh error.
    fn join<L>(
        &self,
        key: &str,
        loading: LoadingValueReference<V>,
        loader: &Arc<L>,
        wait: Option<Duration>,
    ) -> Result<V>
    where
        L: CacheLoader<V> + ?Sized + 'static,
    {
        match self.await_load(key, &loading, wait) {
            Some(outcome) => outcome,
            None => self.lock_and_load(key, loader, wait),
        }
    }

    /// Blocks on `loading`. `None` means a joined refresh failed and the
    /// caller should start its own load.
    fn await_load(
        &self,
        key: &str,
        loading: &LoadingValueReference<V>,
        wait: Option<Duration>,
    ) -> Option<Result<V>> {
        let outcome = match wait {
            Some(timeout) => loading.wait_timeout(key, timeout),
            None => loading.wait(),
        };
        match outcome {
            Err(CacheError::Timeout { .. }) => Some(outcome),
            Err(err) if loading.is_active() => {
                debug!("Joined refresh of key '{}' failed ({}), retrying", key, err);
                None
            }
            other => Some(other),
        }
    }

    /// The single-flight slow path.
    fn lock_and_load<L>(&self, key: &str, loader: &Arc<L>, wait: Option<Duration>) -> Result<V>
    where
        L: CacheLoader<V> + ?Sized + 'static,
    {
        let inner = &self.inner;
        let store_key = inner.store_key(key);

        loop {
            let guard = inner.lock.lock();
            let now = inner.clock.now_nanos();
            let existing = inner.store.get(&store_key);

            if let Some(entry) = &existing {
                match entry.value_reference() {
                    ValueReference::Loading(loading) => match loading.future().peek() {
                        None => {
                            let loading = loading.clone();
                            drop(guard);
                            match self.await_load(key, &loading, wait) {
                                Some(outcome) => return outcome,
                                None => continue,
                            }
                        }
                        // Finished, but its owner has not settled the entry yet.
                        Some(Ok(value)) => {
                            entry.record_read(&inner.policy, now);
                            return Ok(value);
                        }
                        Some(Err(_)) => {}
                    },
                    ValueReference::Loaded(value) if !entry.is_expired(&inner.policy, now) => {
                        entry.record_read(&inner.policy, now);
                        return Ok(value.clone());
                    }
                    _ => {}
                }
            }

            // Expired values are not kept as `previous`: a failed reload leaves
            // the key absent instead of resurrecting stale data.
            let loading = LoadingValueReference::new(inner.next_token(), ValueReference::Unset);
            inner.install(&store_key, key, existing, &loading, now);
            drop(guard);

            return self.load(key, loading, loader);
        }
    }

    /// Runs the loader on the calling thread and settles `loading`.
    fn load<L>(&self, key: &str, loading: LoadingValueReference<V>, loader: &Arc<L>) -> Result<V>
    where
        L: CacheLoader<V> + ?Sized + 'static,
    {
        let inner = &self.inner;
        debug!("Loading key '{}' in cache '{}'", key, inner.namespace);

        let started = inner.clock.now_nanos();
        let outcome = resolve(key, guarded_load(loader.as_ref(), key));
        let elapsed = inner.clock.now_nanos().saturating_sub(started);

        match &outcome {
            Ok(value) => {
                inner.stats.record_load_success(elapsed);
                inner.store_loaded_value(key, &loading, value.clone());
            }
            Err(err) => {
                inner.stats.record_load_failure(elapsed);
                debug!("Load of key '{}' failed: {}", key, err);
                inner.remove_loading_value(key, &loading);
            }
        }

        // Settle the entry first so callers arriving after the wake-up retry
        // instead of joining a finished computation.
        loading.complete(outcome.clone());
        outcome
    }

    // == Refresh ==
    /// Recomputes `key` on the cache's executor while the current value keeps
    /// being served.
    ///
    /// Returns `None` if a computation is already in flight for the key;
    /// refresh never queues behind or cancels one. Otherwise returns a future
    /// the caller may wait on to observe the outcome. A failed refresh is
    /// logged and the previous value stays in place.
    pub fn refresh<L>(&self, key: &str, loader: &Arc<L>) -> Result<Option<LoadFuture<V>>>
    where
        L: CacheLoader<V> + ?Sized + 'static,
    {
        validate_key(key)?;
        let inner = &self.inner;
        let store_key = inner.store_key(key);

        let (loading, old_value) = {
            let _guard = inner.lock.lock();
            let now = inner.clock.now_nanos();
            let existing = inner.store.get(&store_key);
            let current = existing
                .as_ref()
                .map(|entry| entry.value_reference().clone())
                .unwrap_or(ValueReference::Unset);

            if current.is_loading() {
                debug!("Skipping refresh of key '{}': load already in flight", key);
                return Ok(None);
            }

            let old_value = current.value();
            let loading = LoadingValueReference::new(inner.next_token(), current);
            inner.install(&store_key, key, existing, &loading, now);
            (loading, old_value)
        };

        inner.stats.record_refresh();
        let future = loading.future().clone();

        let task_inner = Arc::clone(&self.inner);
        let task_loader = Arc::clone(loader);
        let task_key = key.to_string();
        let started = inner.clock.now_nanos();
        inner.executor.execute(Box::new(move || {
            let reloaded = match old_value {
                Some(old) => guarded_reload(task_loader.as_ref(), &task_key, old),
                None => LoadFuture::ready(resolve(
                    &task_key,
                    guarded_load(task_loader.as_ref(), &task_key),
                )),
            };
            reloaded.add_listener(move |outcome| {
                // Settle the entry before waking anyone joined on the refresh.
                task_inner.settle_refresh(&task_key, &loading, outcome, started);
                loading.complete(outcome.clone());
            });
        }));

        Ok(Some(future))
    }

    /// Triggers a refresh from the read path and returns its value if it
    /// finished before the executor handed control back.
    fn refresh_in_place<L>(&self, key: &str, loader: &Arc<L>) -> Option<V>
    where
        L: CacheLoader<V> + ?Sized + 'static,
    {
        match self.refresh(key, loader) {
            Ok(Some(future)) => future.peek().and_then(|outcome| outcome.ok()),
            _ => None,
        }
    }

    // == Put ==
    /// Stores `value` unconditionally.
    ///
    /// A computation in flight for the key is not cancelled: its result is
    /// discarded when it completes, and the last write wins.
    pub fn put(&self, key: &str, value: V) -> Result<()> {
        validate_key(key)?;
        let inner = &self.inner;
        let now = inner.clock.now_nanos();

        let entry = CacheEntry::new(key, ValueReference::Loaded(value), now);
        if inner.store.set(&inner.store_key(key), entry) {
            inner.stats.entry_added();
        }
        Ok(())
    }

    /// Stores `value` unless the key already holds a live value. Returns
    /// whether it was stored.
    pub fn put_if_absent(&self, key: &str, value: V) -> Result<bool> {
        validate_key(key)?;
        let inner = &self.inner;
        let store_key = inner.store_key(key);

        let _guard = inner.lock.lock();
        let now = inner.clock.now_nanos();
        let entry = CacheEntry::new(key, ValueReference::Loaded(value), now);

        match inner.store.get(&store_key) {
            None => {
                let added = inner.store.add(&store_key, entry);
                if added {
                    inner.stats.entry_added();
                }
                Ok(added)
            }
            Some(existing)
                if existing.value_reference().value().is_some()
                    && !existing.is_expired(&inner.policy, now) =>
            {
                Ok(false)
            }
            Some(_) => {
                if inner.store.set(&store_key, entry) {
                    inner.stats.entry_added();
                }
                Ok(true)
            }
        }
    }

    // == Remove ==
    /// Deletes `key`. Returns whether it was present; a missing key is not an
    /// error.
    pub fn remove(&self, key: &str) -> bool {
        let inner = &self.inner;
        let removed = inner.store.remove(&inner.store_key(key));
        if removed {
            inner.stats.entry_removed();
        }
        removed
    }

    // == Cleanup Expired ==
    /// Removes every expired entry of this cache from the backing store.
    ///
    /// Entries with a computation in flight are left alone. Returns the number
    /// of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        let inner = &self.inner;
        let _guard = inner.lock.lock();
        let now = inner.clock.now_nanos();

        let mut removed = 0;
        for store_key in inner.store.keys(&inner.prefix) {
            let expired = inner.store.get(&store_key).is_some_and(|entry| {
                !entry.value_reference().is_loading() && entry.is_expired(&inner.policy, now)
            });
            if expired && inner.store.remove(&store_key) {
                inner.stats.entry_removed();
                removed += 1;
            }
        }

        inner.stats.record_expirations(removed);
        if removed > 0 {
            info!(
                "Removed {} expired entries from cache '{}'",
                removed, inner.namespace
            );
        }
        removed
    }

    // == Size ==
    /// Approximate number of entries, expired ones included until removed.
    pub fn size(&self) -> usize {
        self.inner.stats.entries()
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot()
    }
}

impl<V> Inner<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn store_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn next_token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    /// Attaches `loading` to the entry, creating it if absent. Caller holds the lock.
    fn install(
        &self,
        store_key: &str,
        key: &str,
        existing: Option<CacheEntry<V>>,
        loading: &LoadingValueReference<V>,
        now: u64,
    ) {
        let reference = ValueReference::Loading(loading.clone());
        match existing {
            Some(mut entry) => {
                entry.set_value_reference(reference);
                // A lock-free remove may have dropped the key since it was read.
                if self.store.set(store_key, entry) {
                    self.stats.entry_added();
                }
            }
            None => {
                if self
                    .store
                    .set(store_key, CacheEntry::new(key, reference, now))
                {
                    self.stats.entry_added();
                }
            }
        }
    }

    /// Commits a computed value if `loading` still owns the entry, or if the
    /// entry holds no value at all. Returns whether the value was stored.
    fn store_loaded_value(&self, key: &str, loading: &LoadingValueReference<V>, value: V) -> bool {
        let store_key = self.store_key(key);
        let _guard = self.lock.lock();
        let now = self.clock.now_nanos();

        match self.store.get(&store_key) {
            Some(mut entry) => {
                let owned = matches!(
                    entry.value_reference(),
                    ValueReference::Loading(current) if current.same_load(loading)
                );
                if !owned && entry.value_reference().value().is_some() {
                    debug!(
                        "Discarding value loaded for key '{}': superseded by a concurrent write",
                        key
                    );
                    return false;
                }
                entry.set_value_reference(ValueReference::Loaded(value));
                entry.record_write(&self.policy, now);
                if self.store.set(&store_key, entry) {
                    self.stats.entry_added();
                }
            }
            None => {
                let entry = CacheEntry::new(key, ValueReference::Loaded(value), now);
                if self.store.set(&store_key, entry) {
                    self.stats.entry_added();
                }
            }
        }
        debug!("Stored value for key '{}' in cache '{}'", key, self.namespace);
        true
    }

    /// Commits or rolls back a finished refresh.
    fn settle_refresh(
        &self,
        key: &str,
        loading: &LoadingValueReference<V>,
        outcome: &Result<V>,
        started: u64,
    ) {
        let elapsed = self.clock.now_nanos().saturating_sub(started);
        match outcome {
            Ok(value) => {
                self.stats.record_load_success(elapsed);
                self.store_loaded_value(key, loading, value.clone());
            }
            Err(err) => {
                self.stats.record_load_failure(elapsed);
                warn!(
                    "Refresh of key '{}' failed, keeping previous value: {}",
                    key, err
                );
                self.remove_loading_value(key, loading);
            }
        }
    }

    /// Undoes a failed computation: a refresh restores the previous value, a
    /// cold load removes the entry.
    fn remove_loading_value(&self, key: &str, loading: &LoadingValueReference<V>) {
        let store_key = self.store_key(key);
        let _guard = self.lock.lock();

        let Some(mut entry) = self.store.get(&store_key) else {
            return;
        };
        let owned = matches!(
            entry.value_reference(),
            ValueReference::Loading(current) if current.same_load(loading)
        );
        if !owned {
            return;
        }

        if loading.is_active() {
            entry.set_value_reference(loading.previous().clone());
            if self.store.set(&store_key, entry) {
                self.stats.entry_added();
            }
        } else if self.store.remove(&store_key) {
            self.stats.entry_removed();
        }
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidArgument("Key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidArgument(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

/// Calls `load`, turning a panic into an error so waiters are never stranded.
fn guarded_load<V, L>(loader: &L, key: &str) -> anyhow::Result<Option<V>>
where
    L: CacheLoader<V> + ?Sized,
{
    panic::catch_unwind(AssertUnwindSafe(|| loader.load(key)))
        .unwrap_or_else(|_| Err(anyhow::anyhow!("loader panicked")))
}

fn guarded_reload<V, L>(loader: &L, key: &str, old_value: V) -> LoadFuture<V>
where
    V: Clone,
    L: CacheLoader<V> + ?Sized,
{
    panic::catch_unwind(AssertUnwindSafe(|| loader.reload(key, old_value)))
        .unwrap_or_else(|_| LoadFuture::failed(key, anyhow::anyhow!("loader panicked")))
}
