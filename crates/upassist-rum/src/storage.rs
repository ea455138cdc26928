//! Persistent key-value storage with expiry.

use crate::clock::Clock;
use crate::Error;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Port for the cookie-like storage identity tokens live in.
///
/// The store turns a time-to-live into its own absolute expiry (a cookie
/// `Expires` date, a database timestamp) and enforces it: an expired entry
/// reads as absent.
pub trait KeyValueStore: Send + Sync + Debug {
    /// Read a live entry.
    fn get(&self, key: &str) -> Result<Option<String>, Error>;

    /// Write an entry that expires `ttl` from now. `None` means it never
    /// expires.
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), Error>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

/// In-process [`KeyValueStore`].
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create an empty store reading expiry against `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Expiry recorded for `key`: `None` if there is no entry,
    /// `Some(None)` if it never expires.
    pub fn expires_at(&self, key: &str) -> Option<Option<Instant>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|e| e.expires_at)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        let expired = match entries.get(key) {
            None => return Ok(None),
            Some(entry) => entry.expires_at.is_some_and(|at| now >= at),
        };
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|e| e.value.clone()))
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), Error> {
        let expires_at = ttl.map(|ttl| self.clock.now() + ttl);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at,
                },
            );
        Ok(())
    }
}
