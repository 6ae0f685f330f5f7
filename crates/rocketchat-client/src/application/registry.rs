//! Pending-call registry: correlation id → callback of an outstanding call.
//!
//! # Lifecycle of an entry (for beginners)
//!
//! ```text
//! register()  ──►  outstanding  ──►  resolve()      (the result frame arrived)
//!                       │
//!                       ├────────►  discard_all()  (the connection went away)
//!                       │
//!                       └────────►  expire_stale() (optional timeout policy)
//! ```
//!
//! Every path out of "outstanding" *removes* the entry and hands it to the
//! caller, who then dispatches it.  Because removal happens under the lock,
//! at most one of those paths can ever see a given entry, which is what makes
//! callback delivery at-most-once.
//!
//! # Thread safety
//!
//! The id counter, the entry map, and the `closed` flag live behind one
//! `std::sync::Mutex`, so allocating an id and storing its entry are a single
//! step, and `discard_all` cannot interleave with a `register` on the same
//! connection.  No callback ever runs while the lock is held, so a callback
//! may freely issue new calls.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rocketchat_core::protocol::CallIdCounter;
use rocketchat_core::CallId;
use thiserror::Error;

use crate::application::dispatcher::CallOutcome;
use crate::application::session::ServerHandle;

/// A callback waiting for the outcome of one call.
///
/// It receives the server the call was made on, so it can issue follow-up
/// calls, and the outcome.  Any context the caller needs is captured by the
/// closure itself.  Returning `Err` marks a callback failure, which the
/// dispatcher logs.
pub type ResultCallback =
    Box<dyn FnOnce(&ServerHandle, CallOutcome) -> anyhow::Result<()> + Send + 'static>;

/// Why a call could not be registered.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegisterError {
    /// The connection has been torn down; no further calls are accepted.
    #[error("registry is closed")]
    Closed,
    /// Every correlation id has been used once already.
    #[error("correlation ids exhausted")]
    IdsExhausted,
}

/// No outstanding call has this id (duplicate, spurious, or expired response).
#[derive(Debug, Error, PartialEq, Eq)]
#[error("no pending call with id {0}")]
pub struct NotFound(pub CallId);

/// One outstanding call.
pub struct PendingCall {
    /// Correlation id embedded in the call's frame.
    pub id: CallId,
    /// Method name, kept for log messages.
    pub method: String,
    /// When the call was registered; drives the timeout policy.
    pub created_at: Instant,
    callback: ResultCallback,
}

impl PendingCall {
    /// Splits the entry into its id, method, and callback.
    pub(crate) fn into_parts(self) -> (CallId, String, ResultCallback) {
        (self.id, self.method, self.callback)
    }
}

impl fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCall")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

struct RegistryState {
    ids: CallIdCounter,
    entries: HashMap<CallId, PendingCall>,
    closed: bool,
}

/// Thread-safe map of outstanding calls for one connection.
pub struct PendingCallRegistry {
    state: Mutex<RegistryState>,
}

impl PendingCallRegistry {
    /// Creates an empty, open registry whose first id is 1.
    pub fn new() -> Self {
        Self::with_counter(CallIdCounter::new())
    }

    /// Creates an empty, open registry drawing ids from `ids`.
    pub fn with_counter(ids: CallIdCounter) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                ids,
                entries: HashMap::new(),
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // Callbacks never run under this lock, so a poisoned lock can only
        // come from a panic inside this module; the map is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocates a fresh id and stores `callback` under it.
    ///
    /// # Errors
    ///
    /// - [`RegisterError::Closed`] after [`discard_all`](Self::discard_all).
    /// - [`RegisterError::IdsExhausted`] once the id space is used up.
    pub fn register(
        &self,
        method: &str,
        callback: ResultCallback,
    ) -> Result<CallId, RegisterError> {
        self.register_at(method, callback, Instant::now())
    }

    /// Like [`register`](Self::register) with an explicit creation instant.
    pub fn register_at(
        &self,
        method: &str,
        callback: ResultCallback,
        created_at: Instant,
    ) -> Result<CallId, RegisterError> {
        let mut state = self.lock();
        if state.closed {
            return Err(RegisterError::Closed);
        }
        let id = state.ids.next_id().ok_or(RegisterError::IdsExhausted)?;
        state.entries.insert(
            id,
            PendingCall {
                id,
                method: method.to_string(),
                created_at,
                callback,
            },
        );
        Ok(id)
    }

    /// Removes and returns the entry for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`NotFound`] if no call with this id is outstanding.  Callers
    /// treat this as a loggable anomaly, never as fatal.
    pub fn resolve(&self, id: CallId) -> Result<PendingCall, NotFound> {
        self.lock().entries.remove(&id).ok_or(NotFound(id))
    }

    /// Closes the registry and removes every outstanding entry.
    ///
    /// Entries are returned in issuance order.  Each one must still be
    /// dispatched (as a connection-lost outcome) by the caller.  Later
    /// [`register`](Self::register) calls fail with [`RegisterError::Closed`].
    pub fn discard_all(&self) -> Vec<PendingCall> {
        let mut state = self.lock();
        state.closed = true;
        let mut drained: Vec<PendingCall> = state.entries.drain().map(|(_, e)| e).collect();
        drained.sort_by_key(|e| e.id);
        drained
    }

    /// Removes every entry registered more than `timeout` before `now`.
    ///
    /// Expired entries are returned in issuance order for dispatch as a
    /// timed-out outcome.
    pub fn expire_stale(&self, timeout: Duration, now: Instant) -> Vec<PendingCall> {
        let mut state = self.lock();
        let stale: Vec<CallId> = state
            .entries
            .values()
            .filter(|e| now.saturating_duration_since(e.created_at) > timeout)
            .map(|e| e.id)
            .collect();
        let mut expired: Vec<PendingCall> = stale
            .into_iter()
            .filter_map(|id| state.entries.remove(&id))
            .collect();
        expired.sort_by_key(|e| e.id);
        expired
    }

    /// Number of outstanding calls.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// `true` when no call is outstanding.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `true` once [`discard_all`](Self::discard_all) has run.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl Default for PendingCallRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    fn noop() -> ResultCallback {
        Box::new(|_server: &ServerHandle, _outcome: CallOutcome| Ok(()))
    }

    #[test]
    fn test_register_returns_increasing_ids() {
        // Arrange
        let registry = PendingCallRegistry::new();

        // Act
        let a = registry.register("m", noop()).unwrap();
        let b = registry.register("m", noop()).unwrap();

        // Assert
        assert!(b > a);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_resolve_removes_entry_exactly_once() {
        // Arrange
        let registry = PendingCallRegistry::new();
        let id = registry.register("browseChannels", noop()).unwrap();

        // Act
        let first = registry.resolve(id);
        let second = registry.resolve(id);

        // Assert
        let entry = first.expect("first resolve must find the entry");
        assert_eq!(entry.id, id);
        assert_eq!(entry.method, "browseChannels");
        assert_eq!(second.unwrap_err(), NotFound(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_resolve_unknown_id_is_not_found() {
        let registry = PendingCallRegistry::new();
        assert_eq!(
            registry.resolve(CallId::new(99)).unwrap_err(),
            NotFound(CallId::new(99))
        );
    }

    #[test]
    fn test_ids_are_not_reused_after_resolve() {
        // Arrange
        let registry = PendingCallRegistry::new();
        let first = registry.register("m", noop()).unwrap();
        registry.resolve(first).unwrap();

        // Act
        let second = registry.register("m", noop()).unwrap();

        // Assert
        assert_ne!(first, second, "a resolved id must never be handed out again");
    }

    #[test]
    fn test_discard_all_drains_in_issuance_order_and_closes() {
        // Arrange
        let registry = PendingCallRegistry::new();
        let ids: Vec<_> = (0..5).map(|_| registry.register("m", noop()).unwrap()).collect();

        // Act
        let drained = registry.discard_all();

        // Assert
        let drained_ids: Vec<_> = drained.iter().map(|e| e.id).collect();
        assert_eq!(drained_ids, ids);
        assert!(registry.is_empty());
        assert!(registry.is_closed());
        assert_eq!(registry.register("m", noop()).unwrap_err(), RegisterError::Closed);
    }

    #[test]
    fn test_discard_all_on_empty_registry() {
        let registry = PendingCallRegistry::new();
        assert!(registry.discard_all().is_empty());
        assert!(registry.is_closed());
    }

    #[test]
    fn test_exhausted_ids_refuse_registration() {
        // Arrange
        let registry = PendingCallRegistry::with_counter(CallIdCounter::starting_at(u64::MAX));
        registry.register("m", noop()).unwrap();

        // Act
        let result = registry.register("m", noop());

        // Assert
        assert_eq!(result.unwrap_err(), RegisterError::IdsExhausted);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_expire_stale_only_removes_old_entries() {
        // Arrange
        let registry = PendingCallRegistry::new();
        let start = Instant::now();
        let old = registry.register_at("old", noop(), start).unwrap();
        let young = registry
            .register_at("young", noop(), start + Duration::from_secs(9))
            .unwrap();

        // Act – ten seconds after start with a five second timeout
        let expired = registry.expire_stale(Duration::from_secs(5), start + Duration::from_secs(10));

        // Assert
        let expired_ids: Vec<_> = expired.iter().map(|e| e.id).collect();
        assert_eq!(expired_ids, vec![old]);
        assert!(registry.resolve(young).is_ok());
        assert_eq!(registry.resolve(old).unwrap_err(), NotFound(old));
    }

    #[test]
    fn test_concurrent_registration_yields_unique_ids() {
        // Arrange
        let registry = Arc::new(PendingCallRegistry::new());
        let thread_count = 8;
        let calls_per_thread = 500;

        // Act – register from many threads simultaneously
        let handles: Vec<_> = (0..thread_count)
            .map(|_| {
                let r = Arc::clone(&registry);
                thread::spawn(move || {
                    (0..calls_per_thread)
                        .map(|_| r.register("m", noop()).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let all_ids: Vec<CallId> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread panicked"))
            .collect();

        // Assert – every id unique and every entry stored
        let unique: HashSet<_> = all_ids.iter().copied().collect();
        assert_eq!(unique.len(), thread_count * calls_per_thread);
        assert_eq!(registry.len(), thread_count * calls_per_thread);
    }

    #[test]
    fn test_concurrent_resolve_delivers_each_entry_once() {
        // Arrange – 200 entries, 4 threads all trying to resolve every id
        let registry = Arc::new(PendingCallRegistry::new());
        let ids: Vec<_> = (0..200).map(|_| registry.register("m", noop()).unwrap()).collect();
        let ids = Arc::new(ids);

        // Act
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let r = Arc::clone(&registry);
                let ids = Arc::clone(&ids);
                thread::spawn(move || ids.iter().filter(|id| r.resolve(**id).is_ok()).count())
            })
            .collect();
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        // Assert – each id resolved by exactly one thread
        assert_eq!(total, 200);
        assert!(registry.is_empty());
    }
}
