// ============================================================================
// spark-state - Dependency Capture
// Records the last (node, key) pair a selector reads
// ============================================================================
//
// A subscription depends on exactly one pair: the last property read while
// its selector runs. Typical selectors are path expressions
// (`store.a.b.c`), so the last read is the leaf; a selector that stops at
// an unresolvable link leaves the last valid link as its dependency.
// ============================================================================

use crate::core::context::with_context;
use crate::core::node::Node;
use crate::core::types::Key;

// =============================================================================
// CAPTURE
// =============================================================================

/// Run `f` inside a capture window.
///
/// Returns `f`'s result and the last pair read inside the window. Windows
/// nest: the enclosing window's state is restored when this one closes,
/// including when `f` unwinds.
pub fn capture<R>(f: impl FnOnce() -> R) -> (R, Option<(Node, Key)>) {
    let guard = CaptureGuard {
        enclosing: Some(with_context(|ctx| ctx.enter_capture())),
    };
    let result = f();
    let touched = guard.finish();
    (result, touched)
}

/// Record a read of `(node, key)` if a capture window is open.
pub fn record_read(node: &Node, key: &Key) {
    with_context(|ctx| ctx.record_read(node, key));
}

struct CaptureGuard {
    /// `Some` until the window is closed
    enclosing: Option<Option<(Node, Key)>>,
}

impl CaptureGuard {
    fn finish(mut self) -> Option<(Node, Key)> {
        let enclosing = self.enclosing.take().flatten();
        with_context(|ctx| ctx.exit_capture(enclosing))
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        if let Some(enclosing) = self.enclosing.take() {
            with_context(|ctx| ctx.exit_capture(enclosing));
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
