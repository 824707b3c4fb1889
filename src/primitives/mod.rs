// ============================================================================
// spark-state - Primitives Module
// Public building blocks: subscriptions, snapshots and UI bindings
// ============================================================================

pub mod binding;
pub mod snapshot;
pub mod subscribe;

// Re-export for convenience
pub use binding::{use_state, StateBinding};
pub use snapshot::{unwrap, Plain};
pub use subscribe::{
    selector, subscribe, subscribe_multiple, IntoSelectors, Resolution, Selector, Subscription,
};
