// ============================================================================
// spark-state - Engine Configuration
// Per-thread knobs for callback error handling and dispatch depth
// ============================================================================

use serde::{Deserialize, Serialize};

use super::context::with_context;

/// Default limit on nested dispatch rounds.
pub const DEFAULT_MAX_DISPATCH_DEPTH: usize = 256;

/// Engine configuration, stored in the thread-local context.
///
/// Deserializes with per-field defaults, so a partial JSON document such as
/// `{"max_dispatch_depth": 32}` is a valid configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Catch and log panics raised by subscriber callbacks so sibling
    /// callbacks still run. When false, a panicking callback unwinds out of
    /// the write that triggered it.
    pub catch_callback_panics: bool,

    /// Maximum nesting of dispatch rounds (callbacks writing state whose
    /// callbacks write state, ...). Exceeding it aborts the round with
    /// `StateError::DispatchDepthExceeded`.
    pub max_dispatch_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            catch_callback_panics: true,
            max_dispatch_depth: DEFAULT_MAX_DISPATCH_DEPTH,
        }
    }
}

/// Replace the configuration of the current thread, returning the previous one.
pub fn configure(config: EngineConfig) -> EngineConfig {
    with_context(|ctx| ctx.config.replace(config))
}

/// Configuration of the current thread.
pub fn config() -> EngineConfig {
    with_context(|ctx| ctx.config.get())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = EngineConfig::default();
        assert!(cfg.catch_callback_panics);
        assert_eq!(cfg.max_dispatch_depth, DEFAULT_MAX_DISPATCH_DEPTH);
    }

    #[test]
    fn configure_returns_previous() {
        let custom = EngineConfig {
            catch_callback_panics: false,
            max_dispatch_depth: 8,
        };
        let prev = configure(custom);
        assert_eq!(prev, EngineConfig::default());
        assert_eq!(config(), custom);
        configure(prev);
        assert_eq!(config(), EngineConfig::default());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"max_dispatch_depth": 32}"#).unwrap();
        assert_eq!(cfg.max_dispatch_depth, 32);
        assert!(cfg.catch_callback_panics);

        let json = serde_json::to_value(EngineConfig::default()).unwrap();
        assert_eq!(json["max_dispatch_depth"], 256);
    }
}
