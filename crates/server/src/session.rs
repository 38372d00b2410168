//! Per-client sessions and their undo history.
//!
//! A [`Session`] pins the transport scheme it was minted under and owns one
//! [`HistoryLog`]. All history reads and writes go through the session's own
//! lock, so overlapping requests from one client are serialized while
//! different sessions never contend.

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use susen_puzzle::Snapshot;
use tokio::time::Instant;

// ============================================================================
// Session Identity
// ============================================================================

/// Length in bytes of the random material behind a session ID.
pub const SESSION_ID_BYTES: usize = 32;

/// Opaque session token: [`SESSION_ID_BYTES`] random bytes, hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn from_bytes(bytes: &[u8; SESSION_ID_BYTES]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Accept only the exact shape we mint (lowercase hex of the right length).
    pub fn parse(text: &str) -> Option<Self> {
        let well_formed = text.len() == SESSION_ID_BYTES * 2
            && text
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        well_formed.then(|| Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix used in logs; the full token is a bearer credential.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Scheme
// ============================================================================

/// Transport scheme as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    /// Case-insensitive parse of `http` / `https`; anything else is `None`.
    pub fn parse(text: &str) -> Option<Self> {
        if text.eq_ignore_ascii_case("http") {
            Some(Self::Http)
        } else if text.eq_ignore_ascii_case("https") {
            Some(Self::Https)
        } else {
            None
        }
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, Self::Https)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the effective scheme of a request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemeSource {
    /// The listener's own scheme (no forwarded-protocol header).
    Transport,
    /// The first hop of a trusted forwarded-protocol header.
    Forwarded,
}

/// Scheme a request is treated as arriving over, and how that was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectiveScheme {
    pub scheme: Scheme,
    pub source: SchemeSource,
}

impl EffectiveScheme {
    pub fn transport(scheme: Scheme) -> Self {
        Self {
            scheme,
            source: SchemeSource::Transport,
        }
    }

    pub fn forwarded(scheme: Scheme) -> Self {
        Self {
            scheme,
            source: SchemeSource::Forwarded,
        }
    }
}

// ============================================================================
// History Log
// ============================================================================

/// Snapshots in the order they became current, plus a cursor on the one
/// that is current now.
///
/// Never empty; `cursor < entries.len()` always holds.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    entries: Vec<Snapshot>,
    cursor: usize,
}

impl HistoryLog {
    pub fn new(root: Snapshot) -> Self {
        Self {
            entries: vec![root],
            cursor: 0,
        }
    }

    pub fn current(&self) -> &Snapshot {
        &self.entries[self.cursor]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of snapshots held, including any beyond the cursor.
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    /// Drop anything past the cursor, then make `snapshot` current.
    pub fn append(&mut self, snapshot: Snapshot) {
        self.entries.truncate(self.cursor + 1);
        self.entries.push(snapshot);
        self.cursor = self.entries.len() - 1;
    }

    /// Step the cursor back one entry. Returns `false` (and does nothing)
    /// when already at the root.
    pub fn back(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        true
    }

    /// Replace the whole history with a single root.
    pub fn reset(&mut self, root: Snapshot) {
        self.entries.clear();
        self.entries.push(root);
        self.cursor = 0;
    }
}

// ============================================================================
// Session
// ============================================================================

/// One client's puzzle state.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    scheme: EffectiveScheme,
    created_at: Instant,
    last_access: Mutex<Instant>,
    history: Mutex<HistoryLog>,
}

impl Session {
    pub fn new(id: SessionId, scheme: EffectiveScheme, root: Snapshot, now: Instant) -> Self {
        Self {
            id,
            scheme,
            created_at: now,
            last_access: Mutex::new(now),
            history: Mutex::new(HistoryLog::new(root)),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Scheme recorded when the session was minted; never changes.
    pub fn scheme(&self) -> EffectiveScheme {
        self.scheme
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_access(&self) -> Instant {
        *self.last_access.lock()
    }

    pub fn touch(&self, now: Instant) {
        let mut last = self.last_access.lock();
        if now > *last {
            *last = now;
        }
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_access())
    }

    /// Run `f` with exclusive access to the history.
    ///
    /// This is the only way history is mutated. `f` must not block on I/O;
    /// if it returns early or unwinds, whatever it did not write stays as it
    /// was.
    pub fn update<T>(&self, f: impl FnOnce(&mut HistoryLog) -> T) -> T {
        let mut history = self.history.lock();
        f(&mut history)
    }

    /// Run `f` against a consistent view of the history.
    pub fn view<T>(&self, f: impl FnOnce(&HistoryLog) -> T) -> T {
        let history = self.history.lock();
        f(&history)
    }

    pub fn current(&self) -> Snapshot {
        self.view(|history| history.current().clone())
    }

    pub fn append(&self, snapshot: Snapshot) {
        self.update(|history| history.append(snapshot));
    }

    pub fn back(&self) -> bool {
        self.update(HistoryLog::back)
    }

    pub fn reset(&self, root: Snapshot) {
        self.update(|history| history.reset(root));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use susen_puzzle::Catalog;

    fn snapshots() -> (Snapshot, Snapshot, Snapshot) {
        let catalog = Catalog::with_builtins().unwrap();
        (
            catalog.get("1-star").unwrap(),
            catalog.get("2-star").unwrap(),
            catalog.get("3-star").unwrap(),
        )
    }

    fn session(root: Snapshot) -> Session {
        let id = SessionId::from_bytes(&[7; SESSION_ID_BYTES]);
        Session::new(
            id,
            EffectiveScheme::transport(Scheme::Http),
            root,
            Instant::now(),
        )
    }

    #[test]
    fn test_session_id_parse() {
        let id = SessionId::from_bytes(&[0xab; SESSION_ID_BYTES]);
        assert_eq!(id.as_str().len(), 64);
        assert_eq!(SessionId::parse(id.as_str()), Some(id.clone()));
        assert_eq!(id.short(), "abababab");

        assert_eq!(SessionId::parse(""), None);
        assert_eq!(SessionId::parse("abc"), None);
        assert_eq!(SessionId::parse(&id.as_str().to_uppercase()), None);
        assert_eq!(SessionId::parse(&"g".repeat(64)), None);
    }

    #[test]
    fn test_scheme_parse() {
        assert_eq!(Scheme::parse("http"), Some(Scheme::Http));
        assert_eq!(Scheme::parse("HTTPS"), Some(Scheme::Https));
        assert_eq!(Scheme::parse("ws"), None);
        assert_eq!(Scheme::parse(""), None);
        assert!(Scheme::Https.is_secure());
        assert!(!Scheme::Http.is_secure());
    }

    #[test]
    fn test_history_starts_at_root() {
        let (a, _, _) = snapshots();
        let history = HistoryLog::new(a.clone());
        assert_eq!(history.current(), &a);
        assert_eq!(history.cursor(), 0);
        assert_eq!(history.depth(), 1);
    }

    #[test]
    fn test_back_at_root_is_noop() {
        let (a, _, _) = snapshots();
        let mut history = HistoryLog::new(a.clone());
        assert!(!history.back());
        assert_eq!(history.cursor(), 0);
        assert_eq!(history.current(), &a);
    }

    #[test]
    fn test_append_then_back_restores() {
        let (a, b, _) = snapshots();
        let mut history = HistoryLog::new(a.clone());
        history.append(b.clone());
        assert_eq!(history.current(), &b);
        assert_eq!(history.cursor(), 1);

        assert!(history.back());
        assert_eq!(history.current(), &a);
        assert_eq!(history.depth(), 2);
    }

    #[test]
    fn test_append_discards_redo_tail() {
        let (a, b, c) = snapshots();
        let mut history = HistoryLog::new(a.clone());
        history.append(b);
        history.append(c.clone());
        assert!(history.back());
        assert!(history.back());
        assert_eq!(history.cursor(), 0);

        history.append(c.clone());
        assert_eq!(history.depth(), 2);
        assert_eq!(history.cursor(), 1);
        assert_eq!(history.current(), &c);
    }

    #[test]
    fn test_reset_replaces_history() {
        let (a, b, c) = snapshots();
        let mut history = HistoryLog::new(a);
        history.append(b);
        history.reset(c.clone());
        assert_eq!(history.depth(), 1);
        assert_eq!(history.cursor(), 0);
        assert_eq!(history.current(), &c);
        assert!(!history.back());
    }

    #[test]
    fn test_session_operations() {
        let (a, b, c) = snapshots();
        let session = session(a.clone());
        assert_eq!(session.current(), a);

        session.append(b.clone());
        assert_eq!(session.current(), b);
        assert!(session.back());
        assert_eq!(session.current(), a);
        assert!(!session.back());

        session.reset(c.clone());
        assert_eq!(session.current(), c);
        assert_eq!(session.view(|h| (h.cursor(), h.depth())), (0, 1));
    }

    #[test]
    fn test_failed_update_leaves_history() {
        let (a, b, _) = snapshots();
        let session = session(a.clone());
        let result: Result<(), &str> = session.update(|history| {
            if history.cursor() == 0 {
                return Err("rejected");
            }
            history.append(b);
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(session.current(), a);
        assert_eq!(session.view(HistoryLog::depth), 1);
    }

    #[test]
    fn test_touch_is_monotonic() {
        let (a, _, _) = snapshots();
        let session = session(a);
        let start = session.last_access();
        session.touch(start + Duration::from_secs(5));
        session.touch(start + Duration::from_secs(1));
        assert_eq!(session.last_access(), start + Duration::from_secs(5));
        assert_eq!(
            session.idle_for(start + Duration::from_secs(8)),
            Duration::from_secs(3)
        );
        assert!(session.created_at() <= session.last_access());
    }

    #[test]
    fn test_concurrent_appends_are_serialized() {
        let (a, b, _) = snapshots();
        let session = session(a);
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        session.append(b.clone());
                    }
                });
            }
        });
        session.view(|history| {
            assert_eq!(history.depth(), 401);
            assert_eq!(history.cursor(), 400);
        });
    }
}
