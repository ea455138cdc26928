//! Session and client identity tokens.

use crate::storage::KeyValueStore;
use crate::Error;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Storage key of the session token.
pub const SESSION_COOKIE: &str = "_up_session_id";

/// Storage key of the client token.
pub const CLIENT_COOKIE: &str = "_up_client_id";

/// Lazily creates and reads identity tokens.
///
/// The session token expires a fixed time after creation; reading it does
/// not extend it. The client token never expires.
#[derive(Debug, Clone)]
pub struct IdentityManager {
    store: Arc<dyn KeyValueStore>,
    session_ttl: Duration,
    /// Serializes read-or-create so concurrent events share one token.
    creating: Arc<Mutex<()>>,
}

impl IdentityManager {
    pub fn new(store: Arc<dyn KeyValueStore>, session_ttl: Duration) -> Self {
        Self {
            store,
            session_ttl,
            creating: Arc::new(Mutex::new(())),
        }
    }

    /// Current session token, created if absent or expired.
    pub fn session_id(&self) -> Result<String, Error> {
        self.get_or_create(SESSION_COOKIE, Some(self.session_ttl))
    }

    /// Long-lived client token, created if absent.
    pub fn client_id(&self) -> Result<String, Error> {
        self.get_or_create(CLIENT_COOKIE, None)
    }

    fn get_or_create(&self, key: &str, ttl: Option<Duration>) -> Result<String, Error> {
        let _guard = self.creating.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = self.store.get(key)? {
            return Ok(existing);
        }
        debug!(key, "identity token not found, creating new one");
        let token = new_token();
        self.store.set(key, &token, ttl)?;
        Ok(token)
    }
}

fn new_token() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::storage::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[derive(Debug)]
    struct CountingStore {
        inner: MemoryStore,
        writes: AtomicUsize,
    }

    impl KeyValueStore for CountingStore {
        fn get(&self, key: &str) -> Result<Option<String>, Error> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), Error> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value, ttl)
        }
    }

    /// Store whose reads take long enough for callers to overlap.
    #[derive(Debug)]
    struct SlowStore {
        inner: CountingStore,
    }

    impl KeyValueStore for SlowStore {
        fn get(&self, key: &str) -> Result<Option<String>, Error> {
            thread::sleep(Duration::from_millis(50));
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), Error> {
            self.inner.set(key, value, ttl)
        }
    }

    fn counting_store(clock: &ManualClock) -> CountingStore {
        CountingStore {
            inner: MemoryStore::new(Arc::new(clock.clone())),
            writes: AtomicUsize::new(0),
        }
    }

    fn setup() -> (IdentityManager, Arc<MemoryStore>, ManualClock) {
        let clock = ManualClock::default();
        let store = Arc::new(MemoryStore::new(Arc::new(clock.clone())));
        let identity = IdentityManager::new(store.clone(), Duration::from_secs(30 * 60));
        (identity, store, clock)
    }

    #[test]
    fn test_session_created_with_fixed_expiry() {
        let (identity, store, clock) = setup();
        let created_at = clock.now();

        let first = identity.session_id().unwrap();

        assert_eq!(
            store.expires_at(SESSION_COOKIE),
            Some(Some(created_at + Duration::from_secs(30 * 60)))
        );

        clock.advance(Duration::from_secs(5 * 60));
        assert_eq!(identity.session_id().unwrap(), first);
        // reading does not slide the expiry
        assert_eq!(
            store.expires_at(SESSION_COOKIE),
            Some(Some(created_at + Duration::from_secs(30 * 60)))
        );
    }

    #[test]
    fn test_session_regenerated_after_expiry() {
        let (identity, _store, clock) = setup();
        let first = identity.session_id().unwrap();

        clock.advance(Duration::from_secs(31 * 60));

        assert_ne!(identity.session_id().unwrap(), first);
    }

    #[test]
    fn test_client_id_is_stable_and_never_expires() {
        let (identity, store, clock) = setup();
        let first = identity.client_id().unwrap();

        clock.advance(Duration::from_secs(400 * 24 * 3600));

        assert_eq!(identity.client_id().unwrap(), first);
        assert_eq!(store.expires_at(CLIENT_COOKIE), Some(None));
    }

    #[test]
    fn test_tokens_are_distinct() {
        let (identity, _store, _clock) = setup();
        assert_ne!(identity.session_id().unwrap(), identity.client_id().unwrap());
    }

    #[test]
    fn test_one_write_per_absence() {
        let clock = ManualClock::default();
        let store = Arc::new(counting_store(&clock));
        let identity = IdentityManager::new(store.clone(), Duration::from_secs(1800));

        for _ in 0..5 {
            identity.session_id().unwrap();
            identity.client_id().unwrap();
        }

        assert_eq!(store.writes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_readers_share_one_token() {
        let clock = ManualClock::default();
        let store = Arc::new(SlowStore {
            inner: counting_store(&clock),
        });
        let identity = IdentityManager::new(store.clone(), Duration::from_secs(1800));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let identity = identity.clone();
                thread::spawn(move || {
                    (identity.session_id().unwrap(), identity.client_id().unwrap())
                })
            })
            .collect();
        let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(store.inner.writes.load(Ordering::SeqCst), 2);
    }
}
