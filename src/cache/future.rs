//! Load Future Module
//!
//! A one-shot completion cell shared between the thread computing a value and
//! every thread waiting on it.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{CacheError, Result};

type Listener<V> = Box<dyn FnOnce(&Result<V>) + Send + 'static>;

struct State<V> {
    outcome: Option<Result<V>>,
    listeners: Vec<Listener<V>>,
}

struct Shared<V> {
    state: Mutex<State<V>>,
    done: Condvar,
}

// == Load Future ==
/// Handle to a computation that may still be running.
///
/// Cloning is cheap; all clones observe the same outcome.
pub struct LoadFuture<V> {
    shared: Arc<Shared<V>>,
}

impl<V> Clone for LoadFuture<V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V> fmt::Debug for LoadFuture<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadFuture")
            .field("completed", &self.is_completed())
            .finish()
    }
}

impl<V> LoadFuture<V> {
    pub fn is_completed(&self) -> bool {
        self.shared.state.lock().outcome.is_some()
    }
}

impl<V: Clone> LoadFuture<V> {
    /// Creates a future that has not completed yet.
    pub fn pending() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    outcome: None,
                    listeners: Vec::new(),
                }),
                done: Condvar::new(),
            }),
        }
    }

    /// Creates an already-completed future.
    pub fn ready(outcome: Result<V>) -> Self {
        let future = Self::pending();
        future.complete(outcome);
        future
    }

    /// Resolves the future, waking waiters and running listeners on the calling
    /// thread. Returns `false` if it had already been resolved.
    pub fn complete(&self, outcome: Result<V>) -> bool {
        let listeners = {
            let mut state = self.shared.state.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome.clone());
            std::mem::take(&mut state.listeners)
        };
        self.shared.done.notify_all();

        for listener in listeners {
            listener(&outcome);
        }
        true
    }

    /// Returns the outcome if already resolved, without blocking.
    pub fn peek(&self) -> Option<Result<V>> {
        self.shared.state.lock().outcome.clone()
    }

    /// Blocks until the future resolves.
    pub fn get_blocking(&self) -> Result<V> {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(outcome) = &state.outcome {
                return outcome.clone();
            }
            self.shared.done.wait(&mut state);
        }
    }

    /// Blocks for at most `timeout`. Returns `None` if the future is still pending.
    pub fn get_timeout(&self, timeout: Duration) -> Option<Result<V>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            if let Some(outcome) = &state.outcome {
                return Some(outcome.clone());
            }
            if self
                .shared
                .done
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.outcome.clone();
            }
        }
    }

    /// Runs `listener` once the future resolves. If it already has, the listener
    /// runs immediately on the calling thread.
    pub fn add_listener<F>(&self, listener: F)
    where
        F: FnOnce(&Result<V>) + Send + 'static,
    {
        let outcome = {
            let mut state = self.shared.state.lock();
            match &state.outcome {
                Some(outcome) => outcome.clone(),
                None => {
                    state.listeners.push(Box::new(listener));
                    return;
                }
            }
        };
        listener(&outcome);
    }

    /// Creates a future already failed with a loader error for `key`.
    pub fn failed(key: &str, cause: anyhow::Error) -> Self {
        Self::ready(Err(CacheError::execution(key, cause)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_ready_future_is_completed() {
        let future = LoadFuture::ready(Ok(5));
        assert!(future.is_completed());
        assert_eq!(future.get_blocking().unwrap(), 5);
        assert_eq!(future.peek().unwrap().unwrap(), 5);
    }

    #[test]
    fn test_complete_only_once() {
        let future = LoadFuture::pending();
        assert!(future.complete(Ok(1)));
        assert!(!future.complete(Ok(2)));
        assert_eq!(future.get_blocking().unwrap(), 1);
    }

    #[test]
    fn test_waiters_wake_on_completion() {
        let future: LoadFuture<u32> = LoadFuture::pending();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let future = future.clone();
                thread::spawn(move || future.get_blocking())
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        future.complete(Ok(9));

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap().unwrap(), 9);
        }
    }

    #[test]
    fn test_error_reaches_every_waiter() {
        let future: LoadFuture<u32> = LoadFuture::failed("k", anyhow::anyhow!("nope"));
        let first = future.get_blocking();
        let second = future.get_blocking();
        assert!(matches!(first, Err(CacheError::Execution { .. })));
        assert!(matches!(second, Err(CacheError::Execution { .. })));
    }

    #[test]
    fn test_get_timeout_expires() {
        let future: LoadFuture<u32> = LoadFuture::pending();
        assert!(future.get_timeout(Duration::from_millis(10)).is_none());

        future.complete(Ok(3));
        assert_eq!(
            future.get_timeout(Duration::from_millis(10)).unwrap().unwrap(),
            3
        );
    }

    #[test]
    fn test_listeners_run_on_completion() {
        let calls = Arc::new(AtomicUsize::new(0));
        let future: LoadFuture<u32> = LoadFuture::pending();

        let counter = Arc::clone(&calls);
        future.add_listener(move |outcome| {
            assert_eq!(*outcome.as_ref().unwrap(), 4);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        future.complete(Ok(4));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Late listeners fire immediately.
        let counter = Arc::clone(&calls);
        future.add_listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
