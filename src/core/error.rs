// ============================================================================
// spark-state - Errors
// Error taxonomy for writes, subscriptions and snapshots
// ============================================================================

use thiserror::Error;

use super::types::{Key, Unresolved};

/// Errors produced by the state engine.
///
/// Only [`StateError::InfiniteLoop`] is expected to reach application code in
/// normal operation. The remaining variants describe misuse of the API
/// (writing an index into an object, snapshotting a cyclic graph, ...).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// A subscriber callback was re-entered while it was still running.
    ///
    /// The pending round is discarded before this error propagates out of the
    /// write that triggered it.
    #[error("infinite loop: a subscriber callback mutated state it is itself subscribed to")]
    InfiniteLoop,

    /// Nested writes inside callbacks went deeper than the configured limit.
    #[error("dispatch depth exceeded the configured maximum of {0}")]
    DispatchDepthExceeded(usize),

    /// The selector never read a property of a wrapped node.
    #[error("selector did not read any reactive node")]
    NotReactive,

    /// Only objects, arrays and class instances can be wrapped.
    #[error("value is not proxifiable")]
    NotProxifiable,

    /// The key kind does not fit the node (an index into an object, a field
    /// name into an array).
    #[error("key {key} cannot be used on {kind}")]
    KeyKind { key: Key, kind: &'static str },

    /// Array length must be set to a non-negative integer.
    #[error("invalid array length")]
    InvalidLength,

    /// The accessor has a getter but no setter.
    #[error("accessor `{0}` is read-only")]
    ReadOnlyAccessor(String),

    /// Accessor properties cannot be deleted.
    #[error("accessor `{0}` cannot be deleted")]
    AccessorDelete(String),

    /// Snapshots copy by value and cannot represent reference cycles.
    #[error("cannot snapshot a graph containing a reference cycle")]
    CyclicSnapshot,

    /// A write was attempted through a value that is not a node.
    #[error(transparent)]
    Unresolved(#[from] Unresolved),
}

impl StateError {
    /// Returns true for the errors that abort a whole dispatch round.
    pub fn aborts_round(&self) -> bool {
        matches!(
            self,
            StateError::InfiniteLoop | StateError::DispatchDepthExceeded(_)
        )
    }
}

/// Result alias used throughout the crate.
pub type StateResult<T> = std::result::Result<T, StateError>;
