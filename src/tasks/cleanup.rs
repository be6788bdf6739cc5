//! Expiry Sweep Task
//!
//! Background task that periodically removes expired cache entries. Reads
//! already treat expired entries as absent; the sweep only reclaims memory.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::LoadingCache;

/// Spawns a background task that periodically sweeps expired entries.
///
/// The task runs in an infinite loop, sleeping for the specified interval
/// between sweeps. Each sweep briefly holds the cache's lock, so it runs on
/// the blocking pool.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let cache = LoadingCache::<String>::new(policy);
/// let cleanup_handle = spawn_cleanup_task(cache.clone(), 30);
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task<V>(cache: LoadingCache<V>, cleanup_interval_secs: u64) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting expiry sweep for cache '{}' every {} seconds",
            cache.namespace(),
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let sweeper = cache.clone();
            let removed = match tokio::task::spawn_blocking(move || sweeper.cleanup_expired()).await
            {
                Ok(removed) => removed,
                Err(err) => {
                    debug!("Expiry sweep did not finish: {}", err);
                    continue;
                }
            };

            if removed == 0 {
                debug!("Expiry sweep: no expired entries found");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePolicy;

    fn short_lived_cache() -> LoadingCache<String> {
        let policy = CachePolicy::builder()
            .expire_after_write_duration(Duration::from_millis(500))
            .build();
        LoadingCache::new(policy)
    }

    #[tokio::test]
    async fn test_cleanup_task_removes_expired_entries() {
        let cache = short_lived_cache();
        cache.put("expire_soon", "value".to_string()).unwrap();

        let handle = spawn_cleanup_task(cache.clone(), 1);

        // Wait for entry to expire and a sweep to run
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(cache.size(), 0, "Expired entry should have been swept");
        assert!(cache.stats().expirations >= 1);

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_preserves_valid_entries() {
        let policy = CachePolicy::builder()
            .expire_after_write_duration(Duration::from_secs(3600))
            .build();
        let cache: LoadingCache<String> = LoadingCache::new(policy);
        cache.put("long_lived", "value".to_string()).unwrap();

        let handle = spawn_cleanup_task(cache.clone(), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(cache.get_if_present("long_lived"), Some("value".to_string()));
        assert_eq!(cache.size(), 1);

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_can_be_aborted() {
        let handle = spawn_cleanup_task(short_lived_cache(), 1);

        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
