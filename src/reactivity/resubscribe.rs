// ============================================================================
// spark-state - Resubscription
// Moves subscribers off subtrees that were swapped out of the graph
// ============================================================================
//
// After a write replaces a node, subscribers registered anywhere inside the
// old subtree are still attached to nodes that are no longer reachable from
// their root. Each of them re-runs its selector (without invoking its
// callback) so it attaches to whatever the path resolves to now.
//
// Handlers that fired during the write have already re-resolved themselves;
// re-resolving them again here finds the same pair and is harmless.
// ============================================================================

use std::collections::HashSet;

use crate::core::node::Node;
use crate::core::types::Value;

/// Re-resolve every subscriber registered in `root`'s descendant closure,
/// children before their owners. Returns how many handlers were updated.
pub fn resubscribe_subtree(root: &Node) -> usize {
    let mut visited = HashSet::new();
    let updated = visit(root, &mut visited);
    if updated > 0 {
        log::debug!("resubscribed {updated} handler(s) under {root:?}");
    }
    updated
}

fn visit(node: &Node, visited: &mut HashSet<usize>) -> usize {
    if !visited.insert(node.id()) {
        return 0;
    }

    let mut updated = 0;
    for (_, child) in node.raw_entries() {
        if let Value::Node(child) = child {
            updated += visit(&child, visited);
        }
    }

    // Snapshot per key: `update` detaches and reattaches, mutating the list
    for key in node.handler_keys() {
        for handler in node.handlers_at(&key) {
            handler.update();
            updated += 1;
        }
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::wrap_root;
    use crate::core::types::AnyHandler;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Counting(Rc<Cell<usize>>);

    impl AnyHandler for Counting {
        fn fire(&self) {}
        fn update(&self) {
            self.0.set(self.0.get() + 1);
        }
        fn original(&self) -> *const () {
            std::ptr::null()
        }
    }

    #[test]
    fn updates_every_handler_once() {
        let root = wrap_root(json!({"a": {"b": {}}})).unwrap();
        let a = root.get("a").as_node().cloned().unwrap();
        let b = a.get("b").as_node().cloned().unwrap();
        // Cycle back to the top
        b.set("up", root.clone()).unwrap();

        let count = Rc::new(Cell::new(0));
        root.add_handler("a".into(), Rc::new(Counting(count.clone())));
        b.add_handler("x".into(), Rc::new(Counting(count.clone())));
        b.add_handler("y".into(), Rc::new(Counting(count.clone())));

        assert_eq!(resubscribe_subtree(&root), 3);
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn empty_subtree() {
        let root = wrap_root(json!({"a": [1, 2, {"b": 3}]})).unwrap();
        assert_eq!(resubscribe_subtree(&root), 0);
    }
}
