//! Value Reference Module
//!
//! The per-entry state machine: nothing stored, a computation in flight, or a
//! computed value.

use std::time::Duration;

use crate::cache::LoadFuture;
use crate::error::{CacheError, Result};

// == Value Reference ==
/// What an entry currently holds.
///
/// ```text
/// Unset  --load-->    Loading(previous = Unset)  --ok--> Loaded
/// Loaded --refresh--> Loading(previous = Loaded) --ok--> Loaded(new)
/// ```
///
/// A failed cold load removes the entry; a failed refresh restores `previous`.
#[derive(Debug, Clone)]
pub enum ValueReference<V> {
    Unset,
    Loading(LoadingValueReference<V>),
    Loaded(V),
}

impl<V: Clone> ValueReference<V> {
    /// The value a reader can see right now. Never blocks.
    pub fn value(&self) -> Option<V> {
        match self {
            ValueReference::Unset => None,
            ValueReference::Loading(loading) => loading.value(),
            ValueReference::Loaded(value) => Some(value.clone()),
        }
    }

    /// Blocks until an in-flight computation resolves. `Unset` yields `None`.
    pub fn wait_for_value(&self) -> Result<Option<V>> {
        match self {
            ValueReference::Unset => Ok(None),
            ValueReference::Loading(loading) => loading.wait().map(Some),
            ValueReference::Loaded(value) => Ok(Some(value.clone())),
        }
    }

    /// Like [`wait_for_value`](Self::wait_for_value) but gives up after `timeout`.
    pub fn wait_for_value_timeout(&self, key: &str, timeout: Duration) -> Result<Option<V>> {
        match self {
            ValueReference::Loading(loading) => loading.wait_timeout(key, timeout).map(Some),
            other => other.wait_for_value(),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, ValueReference::Loading(_))
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, ValueReference::Loaded(_))
    }
}

// == Loading Value Reference ==
/// A computation in flight, layered over the reference it will replace.
#[derive(Debug, Clone)]
pub struct LoadingValueReference<V> {
    token: u64,
    previous: Box<ValueReference<V>>,
    future: LoadFuture<V>,
}

impl<V: Clone> LoadingValueReference<V> {
    /// `token` must be unique among the loads of one cache; commits compare it
    /// to decide whether this load still owns the entry.
    pub fn new(token: u64, previous: ValueReference<V>) -> Self {
        // Never nest loads: a Loading previous collapses to what it wraps.
        let previous = match previous {
            ValueReference::Loading(loading) => *loading.previous,
            other => other,
        };
        Self {
            token,
            previous: Box::new(previous),
            future: LoadFuture::pending(),
        }
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    /// True when this load refreshes an existing value rather than filling an
    /// empty entry.
    pub fn is_active(&self) -> bool {
        self.previous.is_loaded()
    }

    pub fn previous(&self) -> &ValueReference<V> {
        &self.previous
    }

    pub fn future(&self) -> &LoadFuture<V> {
        &self.future
    }

    /// The completed value if the computation succeeded, else the previous one.
    pub fn value(&self) -> Option<V> {
        match self.future.peek() {
            Some(Ok(value)) => Some(value),
            _ => self.previous.value(),
        }
    }

    pub fn wait(&self) -> Result<V> {
        self.future.get_blocking()
    }

    pub fn wait_timeout(&self, key: &str, timeout: Duration) -> Result<V> {
        self.future
            .get_timeout(timeout)
            .unwrap_or_else(|| {
                Err(CacheError::Timeout {
                    key: key.to_string(),
                    waited: timeout,
                })
            })
    }

    /// Resolves the computation. Returns `false` if it already was.
    pub fn complete(&self, outcome: Result<V>) -> bool {
        self.future.complete(outcome)
    }

    /// Same computation, compared by token.
    pub fn same_load(&self, other: &LoadingValueReference<V>) -> bool {
        self.token == other.token
    }
}
