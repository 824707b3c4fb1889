// ============================================================================
// spark-state - Reactive Context
// Thread-local state for dependency capture, dispatch and diff memoization
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::config::EngineConfig;
use super::error::StateError;
use super::node::Node;
use super::types::{handler_ptr, AnyHandler, Key};

// =============================================================================
// PENDING SET
// =============================================================================

/// Handlers marked at one dispatch depth, in marking order, without
/// duplicates.
#[derive(Default)]
pub struct PendingSet {
    order: Vec<Rc<dyn AnyHandler>>,
    seen: HashSet<*const ()>,
}

impl PendingSet {
    /// Returns false if the handler was already pending.
    pub fn insert(&mut self, handler: Rc<dyn AnyHandler>) -> bool {
        if !self.seen.insert(handler_ptr(&handler)) {
            return false;
        }
        self.order.push(handler);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }

    pub fn into_ordered(self) -> Vec<Rc<dyn AnyHandler>> {
        self.order
    }
}

// =============================================================================
// REACTIVE CONTEXT
// =============================================================================

/// Thread-local context holding all global state of the engine.
///
/// Every access goes through short `with_context` calls; no borrow of any
/// field is held while user code (selectors, callbacks, setters) runs.
pub struct StateContext {
    // =========================================================================
    // DEPENDENCY CAPTURE
    // =========================================================================
    /// Nesting depth of open capture windows (0 = not capturing)
    pub capture_depth: Cell<u32>,

    /// Most recent (node, key) pair read inside the innermost capture window
    pub last_read: RefCell<Option<(Node, Key)>>,

    // =========================================================================
    // DISPATCH
    // =========================================================================
    /// Pending handler sets, one per dispatch depth
    pub pending: RefCell<Vec<PendingSet>>,

    /// Index of the pending set currently being filled
    pub depth: Cell<usize>,

    /// Handlers currently executing, outermost first
    pub call_stack: RefCell<Vec<Rc<dyn AnyHandler>>>,

    /// Error that aborted the innermost round, unwinding outward
    pub abort: RefCell<Option<StateError>>,

    // =========================================================================
    // DIFF MEMOIZATION (cleared after every write)
    // =========================================================================
    /// Node identity -> whether its diff found a change
    pub changes_cache: RefCell<HashMap<usize, bool>>,

    /// Node identities already walked by ancestor propagation
    pub ancestor_cache: RefCell<HashSet<usize>>,

    // =========================================================================
    // CONFIGURATION
    // =========================================================================
    pub config: Cell<EngineConfig>,
}

impl StateContext {
    pub fn new() -> Self {
        Self {
            capture_depth: Cell::new(0),
            last_read: RefCell::new(None),
            pending: RefCell::new(vec![PendingSet::default()]),
            depth: Cell::new(0),
            call_stack: RefCell::new(Vec::new()),
            abort: RefCell::new(None),
            changes_cache: RefCell::new(HashMap::new()),
            ancestor_cache: RefCell::new(HashSet::new()),
            config: Cell::new(EngineConfig::default()),
        }
    }

    // =========================================================================
    // DEPENDENCY CAPTURE
    // =========================================================================

    /// Open a capture window, returning the enclosing window's last read.
    pub fn enter_capture(&self) -> Option<(Node, Key)> {
        self.capture_depth.set(self.capture_depth.get() + 1);
        self.last_read.replace(None)
    }

    /// Close the innermost capture window, restoring the enclosing one.
    /// Returns the last pair read inside the closed window.
    pub fn exit_capture(&self, enclosing: Option<(Node, Key)>) -> Option<(Node, Key)> {
        self.capture_depth
            .set(self.capture_depth.get().saturating_sub(1));
        self.last_read.replace(enclosing)
    }

    pub fn is_capturing(&self) -> bool {
        self.capture_depth.get() > 0
    }

    /// Record a read if a capture window is open.
    pub fn record_read(&self, node: &Node, key: &Key) {
        if self.is_capturing() {
            *self.last_read.borrow_mut() = Some((node.clone(), key.clone()));
        }
    }

    // =========================================================================
    // PENDING HANDLERS
    // =========================================================================

    /// Add a handler to the pending set of the current depth (set semantics).
    /// Returns false if it was already pending.
    pub fn mark_pending(&self, handler: Rc<dyn AnyHandler>) -> bool {
        let depth = self.depth.get();
        let mut pending = self.pending.borrow_mut();
        if pending.len() <= depth {
            pending.resize_with(depth + 1, PendingSet::default);
        }
        pending[depth].insert(handler)
    }

    /// Number of handlers pending at the current depth.
    pub fn pending_count(&self) -> usize {
        let depth = self.depth.get();
        self.pending.borrow().get(depth).map_or(0, PendingSet::len)
    }

    /// Take the current pending set and descend one level, so handlers marked
    /// while the round runs form a deeper round. Returns the round and the
    /// new depth.
    pub fn enter_round(&self) -> (Vec<Rc<dyn AnyHandler>>, usize) {
        let depth = self.depth.get();
        let mut pending = self.pending.borrow_mut();
        if pending.len() <= depth + 1 {
            pending.resize_with(depth + 2, PendingSet::default);
        }
        let round = std::mem::take(&mut pending[depth]).into_ordered();
        self.depth.set(depth + 1);
        (round, depth + 1)
    }

    /// Return to the enclosing level, discarding anything left pending in
    /// the level being left.
    pub fn exit_round(&self) {
        let depth = self.depth.get();
        if let Some(set) = self.pending.borrow_mut().get_mut(depth) {
            set.clear();
        }
        self.depth.set(depth.saturating_sub(1));
    }

    pub fn dispatch_depth(&self) -> usize {
        self.depth.get()
    }

    // =========================================================================
    // CALL STACK
    // =========================================================================

    /// Whether a handler with this callback identity is executing.
    pub fn is_running(&self, original: *const ()) -> bool {
        self.call_stack
            .borrow()
            .iter()
            .any(|h| h.original() == original)
    }

    pub fn push_call(&self, handler: Rc<dyn AnyHandler>) {
        self.call_stack.borrow_mut().push(handler);
    }

    pub fn pop_call(&self) -> Option<Rc<dyn AnyHandler>> {
        self.call_stack.borrow_mut().pop()
    }

    pub fn call_depth(&self) -> usize {
        self.call_stack.borrow().len()
    }

    // =========================================================================
    // ROUND ABORT
    // =========================================================================

    /// Latch an error that aborts every round up to the outermost one.
    pub fn set_abort(&self, error: StateError) {
        let mut abort = self.abort.borrow_mut();
        if abort.is_none() {
            *abort = Some(error);
        }
    }

    pub fn abort_error(&self) -> Option<StateError> {
        self.abort.borrow().clone()
    }

    pub fn take_abort(&self) -> Option<StateError> {
        self.abort.borrow_mut().take()
    }

    // =========================================================================
    // DIFF MEMOIZATION
    // =========================================================================

    pub fn cached_change(&self, id: usize) -> Option<bool> {
        self.changes_cache.borrow().get(&id).copied()
    }

    pub fn cache_change(&self, id: usize, changed: bool) {
        self.changes_cache.borrow_mut().insert(id, changed);
    }

    /// Mark a node as visited by ancestor propagation. Returns false if it
    /// was already visited during this write.
    pub fn visit_ancestor(&self, id: usize) -> bool {
        self.ancestor_cache.borrow_mut().insert(id)
    }

    pub fn clear_caches(&self) {
        self.changes_cache.borrow_mut().clear();
        self.ancestor_cache.borrow_mut().clear();
    }
}

impl Default for StateContext {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// THREAD-LOCAL ACCESS
// =============================================================================

thread_local! {
    /// The thread-local state context
    static CONTEXT: StateContext = StateContext::new();
}

/// Access the thread-local state context.
pub fn with_context<R>(f: impl FnOnce(&StateContext) -> R) -> R {
    CONTEXT.with(f)
}

/// Check if a capture window is open
pub fn is_capturing() -> bool {
    with_context(|ctx| ctx.is_capturing())
}

/// Current dispatch depth (0 outside of any callback round)
pub fn dispatch_depth() -> usize {
    with_context(|ctx| ctx.dispatch_depth())
}

// =============================================================================
// TESTS
// =============================================================================
