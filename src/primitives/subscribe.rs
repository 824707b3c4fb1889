// ============================================================================
// spark-state - Subscriptions
// Path subscriptions that follow their target as the graph is rewritten
// ============================================================================
//
// A subscription is a selector (a closure that reads a path through the
// graph) plus a callback. It attaches to the last (node, key) pair its
// selector reads and, every time it fires, detaches and runs the selector
// again, so it keeps listening at the right place after ancestors are
// replaced.
//
// Key features:
// - Fires on any observable change at or below the selected path
// - Tracks "found" so a path appearing or disappearing is reported once
// - Shared callback identity across `subscribe_multiple` selectors
// ============================================================================

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::core::constants::*;
use crate::core::error::{StateError, StateResult};
use crate::core::node::Node;
use crate::core::types::{AnyHandler, Key, Unresolved, Value};
use crate::reactivity::tracking::capture;

// =============================================================================
// SELECTORS
// =============================================================================

/// Result of running a selector: whether its path resolved all the way.
pub trait Resolution {
    fn resolved(&self) -> bool;
}

impl<T> Resolution for Result<T, Unresolved> {
    fn resolved(&self) -> bool {
        self.is_ok()
    }
}

impl Resolution for Value {
    fn resolved(&self) -> bool {
        true
    }
}

impl Resolution for usize {
    fn resolved(&self) -> bool {
        true
    }
}

/// A type-erased selector closure.
#[derive(Clone)]
pub struct Selector(Rc<dyn Fn() -> bool>);

impl Selector {
    pub fn new<R, F>(f: F) -> Self
    where
        R: Resolution,
        F: Fn() -> R + 'static,
    {
        Selector(Rc::new(move || f().resolved()))
    }

    /// Run the selector. Returns true if it resolved.
    pub fn resolve(&self) -> bool {
        (self.0)()
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Selector")
    }
}

/// Shorthand for [`Selector::new`].
pub fn selector<R, F>(f: F) -> Selector
where
    R: Resolution,
    F: Fn() -> R + 'static,
{
    Selector::new(f)
}

/// Anything that can be turned into a list of selectors.
pub trait IntoSelectors {
    fn into_selectors(self) -> Vec<Selector>;
}

impl IntoSelectors for Selector {
    fn into_selectors(self) -> Vec<Selector> {
        vec![self]
    }
}

impl IntoSelectors for Vec<Selector> {
    fn into_selectors(self) -> Vec<Selector> {
        self
    }
}

impl<const N: usize> IntoSelectors for [Selector; N] {
    fn into_selectors(self) -> Vec<Selector> {
        self.into()
    }
}

// =============================================================================
// SUBSCRIBER
// =============================================================================

/// One selector attached to one (node, key) pair.
pub(crate) struct Subscriber {
    selector: Selector,

    /// User callback, shared between the selectors of one subscription
    callback: Rc<dyn Fn()>,

    /// The pair this subscriber is currently registered at
    tracked: RefCell<Option<(Node, Key)>>,

    flags: Cell<u32>,

    /// Self-reference handed to node handler lists
    this: Weak<Subscriber>,
}

impl Subscriber {
    fn new(selector: Selector, callback: Rc<dyn Fn()>) -> Rc<Self> {
        Rc::new_cyclic(|this| Subscriber {
            selector,
            callback,
            tracked: RefCell::new(None),
            flags: Cell::new(ACTIVE),
            this: this.clone(),
        })
    }

    fn has(&self, flag: u32) -> bool {
        self.flags.get() & flag != 0
    }

    fn set_flag(&self, flag: u32, on: bool) {
        let flags = self.flags.get();
        self.flags.set(if on { flags | flag } else { flags & !flag });
    }

    fn identity(&self) -> *const () {
        self as *const Subscriber as *const ()
    }

    /// Run the selector and register at the last pair it read.
    fn attach(&self) -> StateResult<()> {
        let (found, touched) = capture(|| self.selector.resolve());
        self.set_flag(FOUND, found);

        let Some((node, key)) = touched else {
            return Err(StateError::NotReactive);
        };

        if let Some(this) = self.this.upgrade() {
            node.add_handler(key.clone(), this);
        }
        *self.tracked.borrow_mut() = Some((node, key));
        self.set_flag(ATTACHED, true);
        Ok(())
    }

    fn detach(&self) {
        self.set_flag(ATTACHED, false);
        let tracked = self.tracked.borrow_mut().take();
        if let Some((node, key)) = tracked {
            node.remove_handler(&key, self.identity());
        }
    }

    fn reattach(&self) {
        self.detach();
        if let Err(error) = self.attach() {
            log::warn!("subscriber could not reattach: {error}");
        }
    }

    fn unsubscribe(&self) {
        self.set_flag(ACTIVE, false);
        self.detach();
    }

    fn is_live(&self) -> bool {
        self.has(ACTIVE) && self.has(ATTACHED)
    }
}

impl AnyHandler for Subscriber {
    fn fire(&self) {
        if !self.is_live() {
            return;
        }
        let was_found = self.has(FOUND);
        self.reattach();

        // A path that disappears is reported once, one that never
        // resolved stays silent
        if was_found || self.has(FOUND) {
            (self.callback)();
        }
    }

    fn update(&self) {
        if self.is_live() {
            self.reattach();
        }
    }

    fn original(&self) -> *const () {
        Rc::as_ptr(&self.callback) as *const ()
    }
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

/// Handle returned by [`subscribe`] and [`subscribe_multiple`].
///
/// Dropping the handle does not unsubscribe; call
/// [`Subscription::unsubscribe`].
pub struct Subscription {
    subscribers: Vec<Rc<Subscriber>>,
}

impl Subscription {
    /// Detach every selector. Safe to call more than once.
    pub fn unsubscribe(&self) {
        for subscriber in &self.subscribers {
            subscriber.unsubscribe();
        }
    }

    pub fn is_active(&self) -> bool {
        self.subscribers.iter().any(|s| s.has(ACTIVE))
    }

    /// Pairs the selectors are currently attached to.
    pub fn tracked(&self) -> Vec<(Node, Key)> {
        self.subscribers
            .iter()
            .filter_map(|s| s.tracked.borrow().clone())
            .collect()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("selectors", &self.subscribers.len())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Call `on_change` whenever the value selected by `selector` changes.
///
/// The selector reads a path through the graph; the subscription attaches
/// to the last property it reads. Fails with [`StateError::NotReactive`] if
/// the selector reads no wrapped node.
///
/// # Example
///
/// ```
/// use spark_state::{subscribe, wrap_root};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let store = wrap_root(serde_json::json!({"user": {"name": "ada"}})).unwrap();
/// let calls = Rc::new(Cell::new(0));
///
/// let s = store.clone();
/// let c = calls.clone();
/// let sub = subscribe(move || s.get("user").get("name"), move || c.set(c.get() + 1)).unwrap();
///
/// store.get("user").set("name", "grace").unwrap();
/// assert_eq!(calls.get(), 1);
/// sub.unsubscribe();
/// ```
pub fn subscribe<R, S, F>(selector: S, on_change: F) -> StateResult<Subscription>
where
    R: Resolution,
    S: Fn() -> R + 'static,
    F: Fn() + 'static,
{
    subscribe_multiple(Selector::new(selector), on_change)
}

/// Subscribe one callback to several selectors.
///
/// The callback runs once per selector whose target changed, and all
/// selectors share its identity for loop detection. If any selector fails
/// to attach, the ones already attached are detached again.
pub fn subscribe_multiple(
    selectors: impl IntoSelectors,
    on_change: impl Fn() + 'static,
) -> StateResult<Subscription> {
    let callback: Rc<dyn Fn()> = Rc::new(on_change);
    let mut subscribers: Vec<Rc<Subscriber>> = Vec::new();

    for selector in selectors.into_selectors() {
        let subscriber = Subscriber::new(selector, callback.clone());
        if let Err(error) = subscriber.attach() {
            subscriber.unsubscribe();
            for attached in &subscribers {
                attached.unsubscribe();
            }
            return Err(error);
        }
        subscribers.push(subscriber);
    }

    Ok(Subscription { subscribers })
}

// =============================================================================
// TESTS
// =============================================================================
