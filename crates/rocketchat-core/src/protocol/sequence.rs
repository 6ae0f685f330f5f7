//! Monotonic counter for DDP method-call correlation ids.
//!
//! # What is a correlation id? (for beginners)
//!
//! Every `method` frame the client sends carries an `id`.  The server echoes
//! that same `id` in the `result` frame it sends back, which is the only way
//! to tell which of many in-flight calls an answer belongs to.
//!
//! Ids come from a counter that only ever moves forward.  If an id were handed
//! out twice, a late answer to an old call could be matched to an unrelated
//! newer call, so the counter refuses to wrap: once `u64::MAX` has been issued
//! it reports exhaustion instead of starting over at zero.
//!
//! # Thread safety
//!
//! Unlike an atomic counter this type takes `&mut self`.  The pending-call
//! registry keeps it behind the same lock as its entry map, so allocating an
//! id and storing the entry that owns it happen as one step.

use crate::protocol::messages::CallId;

/// A monotonically increasing, never-wrapping source of [`CallId`]s.
///
/// # Examples
///
/// ```rust
/// use rocketchat_core::protocol::CallIdCounter;
///
/// let mut counter = CallIdCounter::new();
/// assert_eq!(counter.next_id().unwrap().get(), 1);
/// assert_eq!(counter.next_id().unwrap().get(), 2);
/// ```
#[derive(Debug)]
pub struct CallIdCounter {
    /// The value the next call to [`next_id`](Self::next_id) returns, or
    /// `None` once the id space is used up.
    next: Option<u64>,
}

impl CallIdCounter {
    /// Creates a counter whose first id is 1.
    ///
    /// Meteor servers number their own ids from 1 too, which keeps client
    /// logs easy to compare against server logs.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Creates a counter whose first id is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self { next: Some(first) }
    }

    /// Returns a fresh id, or `None` if every id has already been issued.
    pub fn next_id(&mut self) -> Option<CallId> {
        let id = self.next?;
        // `checked_add` yields `None` at u64::MAX, which permanently exhausts
        // the counter instead of wrapping back to an id already used.
        self.next = id.checked_add(1);
        Some(CallId::new(id))
    }

    /// Returns the id the next call would hand out, without consuming it.
    ///
    /// Useful for logging and diagnostics.
    pub fn peek(&self) -> Option<CallId> {
        self.next.map(CallId::new)
    }
}

impl Default for CallIdCounter {
    fn default() -> Self {
        Self::new()
    }
}
