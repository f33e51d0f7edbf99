//! Per-skill async locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A lazily populated map of one async mutex per skill name.
///
/// Each skill gets its own lock; there is no lock spanning skills. The
/// guarded value lets a store keep small per-skill state (such as a cached
/// record count) inside the same critical section as its writes.
#[derive(Debug)]
pub struct KeyedLocks<T> {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<T>>>>,
}

impl<T> Default for KeyedLocks<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Default> KeyedLocks<T> {
    /// Create an empty lock map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for `key`, created on first use.
    pub fn get(&self, key: &str) -> Arc<tokio::sync::Mutex<T>> {
        let mut map = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(T::default()))),
        )
    }

    /// Number of keys seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether no key has been locked yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
