// ============================================================================
// spark-state - Core Module
// Graph nodes, values, errors, configuration and the thread-local context
// ============================================================================

pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod node;
pub mod types;

pub use config::{config, configure, EngineConfig, DEFAULT_MAX_DISPATCH_DEPTH};
pub use context::{dispatch_depth, is_capturing, with_context, StateContext};
pub use error::{StateError, StateResult};
pub use node::{wrap, wrap_root, Accessor, ClassInfo, Node, Proxifiable};
pub use types::{AnyHandler, Key, Opaque, Unresolved, Value};
