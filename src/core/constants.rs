// ============================================================================
// spark-state - Constants
// Flag constants for subscriber state
// ============================================================================

// =============================================================================
// SUBSCRIBER STATE FLAGS
// =============================================================================

/// Subscriber has not been unsubscribed
pub const ACTIVE: u32 = 1 << 0;

/// The selector resolved all the way on its most recent run
pub const FOUND: u32 = 1 << 1;

/// Subscriber is registered in a node's handler list
pub const ATTACHED: u32 = 1 << 2;

// =============================================================================
// LIMITS
// =============================================================================

/// Largest array length (2^32 - 1)
pub const MAX_ARRAY_LENGTH: usize = u32::MAX as usize;
