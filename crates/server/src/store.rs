//! Session store.
//!
//! Maps session IDs to [`Session`]s. The map is sharded, so lookups and
//! inserts for different IDs do not contend on one lock, and a new ID is
//! inserted with insert-if-absent so no two sessions can ever share an ID.
//!
//! Idle sessions are evicted lazily on [`SessionStore::get`] and in bulk by
//! [`spawn_idle_sweeper`].

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::TryRngCore;
use rand::rngs::OsRng;
use susen_puzzle::Snapshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::session::{EffectiveScheme, SESSION_ID_BYTES, Session, SessionId};

/// Fresh IDs tried before giving up on a create.
pub const MAX_MINT_ATTEMPTS: usize = 8;

/// Error minting a session.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read the OS random source: {0}")]
    Random(String),

    #[error("no unused session ID after {attempts} attempts")]
    IdExhausted { attempts: usize },
}

type IdSource = Box<dyn Fn() -> Result<SessionId, StoreError> + Send + Sync>;

/// Session ID from the operating system's CSPRNG.
pub fn random_session_id() -> Result<SessionId, StoreError> {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| StoreError::Random(err.to_string()))?;
    Ok(SessionId::from_bytes(&bytes))
}

/// Concurrent map of live sessions.
pub struct SessionStore {
    sessions: DashMap<SessionId, Arc<Session>>,
    root: Snapshot,
    idle_timeout: Duration,
    mint: IdSource,
}

impl SessionStore {
    /// New sessions start with a history holding only `root`.
    pub fn new(root: Snapshot, idle_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            root,
            idle_timeout,
            mint: Box::new(random_session_id),
        }
    }

    /// Replace the ID generator.
    pub fn with_id_source(
        mut self,
        source: impl Fn() -> Result<SessionId, StoreError> + Send + Sync + 'static,
    ) -> Self {
        self.mint = Box::new(source);
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Live session for `id`, without refreshing its last access.
    ///
    /// A session idle past the timeout is removed here and reported absent.
    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.get_at(id, Instant::now())
    }

    pub(crate) fn get_at(&self, id: &SessionId, now: Instant) -> Option<Arc<Session>> {
        // Expiry is decided under the shard lock, so a session touched by a
        // concurrent request is never dropped here.
        let timeout = self.idle_timeout;
        if self
            .sessions
            .remove_if(id, |_, session| session.idle_for(now) >= timeout)
            .is_some()
        {
            debug!(session = %id.short(), "session expired on lookup");
            return None;
        }
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Mint a new session bound to `scheme`.
    pub fn create(&self, scheme: EffectiveScheme) -> Result<Arc<Session>, StoreError> {
        let now = Instant::now();
        for _ in 0..MAX_MINT_ATTEMPTS {
            let id = (self.mint)()?;
            match self.sessions.entry(id) {
                Entry::Occupied(entry) => {
                    warn!(session = %entry.key().short(), "session ID collision, retrying");
                }
                Entry::Vacant(entry) => {
                    let session = Arc::new(Session::new(
                        entry.key().clone(),
                        scheme,
                        self.root.clone(),
                        now,
                    ));
                    entry.insert(Arc::clone(&session));
                    return Ok(session);
                }
            }
        }
        Err(StoreError::IdExhausted {
            attempts: MAX_MINT_ATTEMPTS,
        })
    }

    /// Existing live session for `id` (touched) if `admit` accepts it,
    /// otherwise a new one bound to `scheme`. The flag is `true` when the
    /// session was just created.
    pub fn get_or_create(
        &self,
        id: Option<&SessionId>,
        scheme: EffectiveScheme,
        admit: impl FnOnce(&Session) -> bool,
    ) -> Result<(Arc<Session>, bool), StoreError> {
        if let Some(id) = id {
            match self.get(id) {
                Some(session) if admit(&session) => {
                    session.touch(Instant::now());
                    return Ok((session, false));
                }
                Some(_) => {}
                None => debug!(session = %id.short(), "unknown session ID"),
            }
        }
        Ok((self.create(scheme)?, true))
    }

    pub fn remove(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    /// Remove every session idle past the timeout. Returns how many went.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }

    pub(crate) fn evict_idle_at(&self, now: Instant) -> usize {
        let timeout = self.idle_timeout;
        let mut evicted = 0;
        self.sessions.retain(|_, session| {
            let keep = session.idle_for(now) < timeout;
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    /// Number of sessions currently held.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Run [`SessionStore::evict_idle`] every `every` until the task is aborted.
pub fn spawn_idle_sweeper(store: Arc<SessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = store.evict_idle();
            if evicted > 0 {
                info!(evicted, live = store.len(), "evicted idle sessions");
            } else {
                debug!(live = store.len(), "idle sweep found nothing to evict");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::session::Scheme;
    use susen_puzzle::Catalog;

    const TIMEOUT: Duration = Duration::from_secs(60);

    fn store() -> SessionStore {
        let root = Catalog::with_builtins().unwrap().get("1-star").unwrap();
        SessionStore::new(root, TIMEOUT)
    }

    fn http() -> EffectiveScheme {
        EffectiveScheme::transport(Scheme::Http)
    }

    #[test]
    fn test_create_then_get() {
        let store = store();
        let session = store.create(http()).unwrap();
        assert_eq!(store.len(), 1);

        let found = store.get(session.id()).unwrap();
        assert!(Arc::ptr_eq(&session, &found));
        assert_eq!(found.scheme(), http());
        assert_eq!(found.view(|h| h.depth()), 1);
    }

    #[test]
    fn test_get_unknown_is_none() {
        let store = store();
        let id = random_session_id().unwrap();
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn test_get_or_create() {
        let store = store();
        let (first, created) = store.get_or_create(None, http(), |_| true).unwrap();
        assert!(created);

        let (again, created) = store
            .get_or_create(Some(first.id()), http(), |_| true)
            .unwrap();
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &again));

        let unknown = random_session_id().unwrap();
        let (other, created) = store
            .get_or_create(Some(&unknown), http(), |_| true)
            .unwrap();
        assert!(created);
        assert_ne!(other.id(), &unknown);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_get_or_create_refused_session_stays() {
        let store = store();
        let first = store.create(http()).unwrap();

        let (other, created) = store
            .get_or_create(Some(first.id()), http(), |_| false)
            .unwrap();
        assert!(created);
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(store.len(), 2);
        assert!(store.get(first.id()).is_some());
    }

    #[test]
    fn test_remove() {
        let store = store();
        let session = store.create(http()).unwrap();
        assert!(store.remove(session.id()).is_some());
        assert!(store.get(session.id()).is_none());
        assert!(store.remove(session.id()).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_get_expires_idle_session() {
        let store = store();
        let session = store.create(http()).unwrap();
        let later = session.last_access() + TIMEOUT;
        assert!(store.get_at(session.id(), later).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_get_keeps_session_touched_after_lookup_time() {
        let store = store();
        let session = store.create(http()).unwrap();
        let lookup = session.last_access() + TIMEOUT;
        // A concurrent request refreshed the session after this lookup began.
        session.touch(lookup + Duration::from_secs(1));

        let found = store.get_at(session.id(), lookup).unwrap();
        assert!(Arc::ptr_eq(&session, &found));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_evict_idle_keeps_recent() {
        let store = store();
        let stale = store.create(http()).unwrap();
        let fresh = store.create(http()).unwrap();
        let now = stale.last_access() + TIMEOUT + Duration::from_secs(1);
        fresh.touch(now - Duration::from_secs(1));

        assert_eq!(store.evict_idle_at(now), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get_at(fresh.id(), now).is_some());
        assert!(store.get_at(stale.id(), now).is_none());
    }

    #[test]
    fn test_collision_regenerates() {
        let fixed = [
            SessionId::from_bytes(&[1; SESSION_ID_BYTES]),
            SessionId::from_bytes(&[1; SESSION_ID_BYTES]),
            SessionId::from_bytes(&[2; SESSION_ID_BYTES]),
        ];
        let calls = AtomicUsize::new(0);
        let calls = Arc::new(calls);
        let counter = Arc::clone(&calls);
        let store = store().with_id_source(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(fixed[n.min(fixed.len() - 1)].clone())
        });

        let first = store.create(http()).unwrap();
        let second = store.create(http()).unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_collision_gives_up() {
        let store = store().with_id_source(|| Ok(SessionId::from_bytes(&[9; SESSION_ID_BYTES])));
        store.create(http()).unwrap();
        let err = store.create(http()).unwrap_err();
        assert!(matches!(
            err,
            StoreError::IdExhausted {
                attempts: MAX_MINT_ATTEMPTS
            }
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_id_source_failure_propagates() {
        let store = store().with_id_source(|| Err(StoreError::Random("unavailable".into())));
        assert!(matches!(store.create(http()), Err(StoreError::Random(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_creates_are_distinct() {
        let store = store();
        let ids: Vec<SessionId> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        (0..25)
                            .map(|_| store.create(http()).unwrap().id().clone())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 200);
        assert_eq!(store.len(), 200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_idle_sessions() {
        let store = Arc::new(store());
        let session = store.create(http()).unwrap();
        let sweeper = spawn_idle_sweeper(Arc::clone(&store), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.len(), 1);

        tokio::time::sleep(TIMEOUT).await;
        assert!(store.is_empty());
        assert!(store.get(session.id()).is_none());
        sweeper.abort();
    }
}
