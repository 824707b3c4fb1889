// ============================================================================
// spark-state - Binding Adapter
// Component-local state kept in sync with the graph through subscriptions
// ============================================================================
//
// A binding is what a UI component holds: a value computed from the state
// graph, recomputed whenever any of its selectors' targets change. It only
// uses the public subscribe contract.
// ============================================================================

use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::core::error::StateResult;
use crate::primitives::subscribe::{subscribe_multiple, IntoSelectors, Subscription};

struct BindingState<S> {
    value: RefCell<S>,
    compute: Box<dyn Fn() -> S>,
    renders: Cell<u64>,
}

impl<S> BindingState<S> {
    fn recompute(&self) {
        // Compute before borrowing so `compute` may read freely
        let next = (self.compute)();
        *self.value.borrow_mut() = next;
        self.renders.set(self.renders.get() + 1);
    }
}

/// Locally held state bound to one or more selectors.
///
/// Unmounts (unsubscribes) when dropped.
pub struct StateBinding<S: 'static> {
    state: Rc<BindingState<S>>,
    subscription: Subscription,
}

impl<S: 'static> StateBinding<S> {
    /// Current value.
    pub fn get(&self) -> S
    where
        S: Clone,
    {
        self.state.value.borrow().clone()
    }

    /// Borrow the current value.
    pub fn with<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.state.value.borrow())
    }

    pub fn borrow(&self) -> Ref<'_, S> {
        self.state.value.borrow()
    }

    /// Number of recomputations since mount.
    pub fn renders(&self) -> u64 {
        self.state.renders.get()
    }

    pub fn is_mounted(&self) -> bool {
        self.subscription.is_active()
    }

    /// Stop following the graph. The last value stays readable.
    pub fn unmount(&self) {
        self.subscription.unsubscribe();
    }
}

impl<S: 'static> Drop for StateBinding<S> {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl<S: fmt::Debug + 'static> fmt::Debug for StateBinding<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateBinding")
            .field("value", &*self.state.value.borrow())
            .field("renders", &self.renders())
            .field("mounted", &self.is_mounted())
            .finish()
    }
}

/// Bind `compute`'s result to the targets of `selectors`.
///
/// `compute` runs once now and once after every notification from any of the
/// selectors.
///
/// # Example
///
/// ```
/// use spark_state::{selector, use_state, wrap_root};
///
/// let store = wrap_root(serde_json::json!({"todos": ["a"]})).unwrap();
///
/// let (s1, s2) = (store.clone(), store.clone());
/// let count = use_state(
///     selector(move || s1.get("todos").len()),
///     move || s2.get("todos").len().unwrap_or(0),
/// )
/// .unwrap();
///
/// store.get("todos").as_node().unwrap().push(["b"]).unwrap();
/// assert_eq!(count.get(), 2);
/// ```
pub fn use_state<S: 'static>(
    selectors: impl IntoSelectors,
    compute: impl Fn() -> S + 'static,
) -> StateResult<StateBinding<S>> {
    let state = Rc::new(BindingState {
        value: RefCell::new(compute()),
        compute: Box::new(compute),
        renders: Cell::new(0),
    });

    let weak = Rc::downgrade(&state);
    let subscription = subscribe_multiple(selectors, move || {
        if let Some(state) = weak.upgrade() {
            state.recompute();
        }
    })?;

    Ok(StateBinding {
        state,
        subscription,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::wrap_root;
    use crate::primitives::subscribe::selector;
    use serde_json::json;

    #[test]
    fn recomputes_on_change() {
        let root = wrap_root(json!({"user": {"name": "ada"}})).unwrap();
        let (a, b) = (root.clone(), root.clone());
        let name = use_state(selector(move || a.get("user").get("name")), move || {
            b.get("user")
                .get("name")
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
        })
        .unwrap();

        assert_eq!(name.get().as_deref(), Some("ada"));
        assert_eq!(name.renders(), 0);

        root.set("user", json!({"name": "grace"})).unwrap();
        assert_eq!(name.get().as_deref(), Some("grace"));
        assert_eq!(name.renders(), 1);
    }

    #[test]
    fn several_selectors() {
        let root = wrap_root(json!({"a": 1, "b": 2})).unwrap();
        let (ra, rb, rc) = (root.clone(), root.clone(), root.clone());
        let sum = use_state(
            [selector(move || ra.get("a")), selector(move || rb.get("b"))],
            move || rc.get("a").as_f64().unwrap_or(0.0) + rc.get("b").as_f64().unwrap_or(0.0),
        )
        .unwrap();

        root.set("a", 10).unwrap();
        root.set("b", 20).unwrap();
        assert_eq!(sum.get(), 30.0);
        assert_eq!(sum.renders(), 2);
        assert!(sum.with(|v| *v > 29.0));
    }

    #[test]
    fn drop_unmounts() {
        let root = wrap_root(json!({"a": 1})).unwrap();
        let r = root.clone();
        let binding = use_state(selector(move || r.get("a")), || ()).unwrap();
        assert_eq!(root.handler_count("a"), 1);
        assert!(binding.is_mounted());

        drop(binding);
        assert_eq!(root.handler_count("a"), 0);
    }

    #[test]
    fn unmounted_binding_keeps_last_value() {
        let root = wrap_root(json!({"a": 1})).unwrap();
        let (r1, r2) = (root.clone(), root.clone());
        let a = use_state(selector(move || r1.get("a")), move || r2.get("a").as_i64()).unwrap();

        a.unmount();
        root.set("a", 2).unwrap();
        assert_eq!(a.get(), Some(1));
        assert_eq!(a.renders(), 0);
    }
}
