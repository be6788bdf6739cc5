//! Cache Loader Module
//!
//! The user-supplied computation that produces values on a miss or refresh.

use std::marker::PhantomData;

use crate::cache::LoadFuture;
use crate::error::{CacheError, Result};

// == Cache Loader ==
/// Computes values for keys.
///
/// `load` returning `Ok(None)` means the loader had nothing to give; the cache
/// treats that as [`CacheError::InvalidLoadResult`], never as a cached miss.
pub trait CacheLoader<V>: Send + Sync {
    fn load(&self, key: &str) -> anyhow::Result<Option<V>>;

    /// Recomputes a value that is already cached. Runs on the cache's executor.
    ///
    /// The default calls [`load`](Self::load) and returns an already-completed
    /// future. Override to hand the work to another pool and resolve the future
    /// from there.
    fn reload(&self, key: &str, old_value: V) -> LoadFuture<V>
    where
        V: Clone,
    {
        let _ = old_value;
        LoadFuture::ready(resolve(key, self.load(key)))
    }
}

/// Turns a raw loader outcome into the value handed to callers.
pub(crate) fn resolve<V>(key: &str, outcome: anyhow::Result<Option<V>>) -> Result<V> {
    match outcome {
        Ok(Some(value)) => Ok(value),
        Ok(None) => Err(CacheError::InvalidLoadResult(key.to_string())),
        Err(cause) => Err(CacheError::execution(key, cause)),
    }
}

// == Closure Loader ==
/// Adapts a closure into a [`CacheLoader`].
pub struct FnLoader<F, V> {
    f: F,
    _value: PhantomData<fn() -> V>,
}

impl<F, V> CacheLoader<V> for FnLoader<F, V>
where
    F: Fn(&str) -> anyhow::Result<V> + Send + Sync,
{
    fn load(&self, key: &str) -> anyhow::Result<Option<V>> {
        (self.f)(key).map(Some)
    }
}

/// Builds a loader from a closure that always yields a value or an error.
///
/// ```
/// use stampede::cache::{loader_fn, CacheLoader};
///
/// let loader = loader_fn(|key: &str| Ok(key.len()));
/// assert_eq!(loader.load("abc").unwrap(), Some(3));
/// ```
pub fn loader_fn<F, V>(f: F) -> FnLoader<F, V>
where
    F: Fn(&str) -> anyhow::Result<V> + Send + Sync,
{
    FnLoader {
        f,
        _value: PhantomData,
    }
}
