// ============================================================================
// spark-state - A Reactive Object-Graph State Engine for Rust
// ============================================================================
//
// Wraps a plain, possibly cyclic object graph so that every write is
// observable at the exact path that changed. Subscribers select a path with
// a closure; writes are diffed structurally against the previous value, and
// subscriber callbacks run synchronously, depth-first, with re-entry
// detected and rejected instead of looping forever.
//
// Layout:
//   core        - nodes, values, errors, config, thread-local context
//   reactivity  - dependency capture, diffing, dispatch, resubscription
//   primitives  - subscribe, snapshot/unwrap, UI bindings
// ============================================================================

#[macro_use]
mod macros;

pub mod core;
pub mod primitives;
pub mod reactivity;

// Re-export core items at crate root for ergonomic access
pub use crate::core::constants;
pub use crate::core::config::{config, configure, EngineConfig};
pub use crate::core::context::{dispatch_depth, is_capturing, with_context, StateContext};
pub use crate::core::error::{StateError, StateResult};
pub use crate::core::node::{wrap, wrap_root, Accessor, ClassInfo, Node, Proxifiable};
pub use crate::core::types::{AnyHandler, Key, Opaque, Unresolved, Value};

// Re-export primitives at crate root
pub use crate::primitives::binding::{use_state, StateBinding};
pub use crate::primitives::snapshot::{unwrap, Plain};
pub use crate::primitives::subscribe::{
    selector, subscribe, subscribe_multiple, IntoSelectors, Resolution, Selector, Subscription,
};

// =============================================================================
// TESTS
// =============================================================================
