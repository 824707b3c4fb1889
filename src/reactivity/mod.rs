// ============================================================================
// spark-state - Reactivity Module
// Dependency capture, structural diffing, dispatch and resubscription
// ============================================================================

pub mod diff;
pub mod resubscribe;
pub mod scheduling;
pub mod tracking;

pub use diff::{mark_ancestors, mark_changes, mark_key, mark_subtree};
pub use resubscribe::resubscribe_subtree;
pub use scheduling::call_handlers;
pub use tracking::{capture, record_read};
