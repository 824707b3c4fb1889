// ============================================================================
// spark-state - Change Diff Engine
// Decides which (node, key) handler lists must fire for a write
// ============================================================================
//
// Old and new values are compared structurally, not by identity: replacing
// a subtree with an equal copy fires nothing, and changing one leaf fires
// the leaf, every key on the path down to it, and every ancestor path
// through which the written node is reachable.
//
// Two memo caches in the context keep the walks finite on cyclic graphs:
// one keyed by the old node being compared, one by the ancestor being
// visited. Both are cleared once per write, before dispatch.
//
// Borrow discipline: every read of node data is a short borrow that clones
// out (`raw_get`, `raw_entries`), so recursion never holds a RefCell borrow.
// ============================================================================

use crate::core::context::with_context;
use crate::core::node::Node;
use crate::core::types::{Key, Value};

// =============================================================================
// MARK KEY
// =============================================================================

/// Add every handler registered at `(node, key)` to the current pending set.
/// Returns how many handlers are registered there.
pub fn mark_key(node: &Node, key: &Key) -> usize {
    let handlers = node.handlers_at(key);
    let count = handlers.len();
    if count > 0 {
        with_context(|ctx| {
            for handler in handlers {
                ctx.mark_pending(handler);
            }
        });
    }
    count
}

// =============================================================================
// MARK CHANGES
// =============================================================================

/// Compare the current value at `(node, key)` with `new`, marking handlers
/// deepest first. Returns true if anything observable changed.
///
/// Must run before the new value is stored.
pub fn mark_changes(node: &Node, key: &Key, new: &Value) -> bool {
    let old = node.raw_get(key);

    let Value::Node(old_node) = &old else {
        if old.same(new) {
            return false;
        }
        mark_key(node, key);
        return true;
    };

    // A node shared under several keys is diffed once, but every key that
    // reaches a changed node still fires
    if let Some(changed) = with_context(|ctx| ctx.cached_change(old_node.id())) {
        if changed {
            mark_key(node, key);
        }
        return changed;
    }

    let new_node = match new {
        Value::Node(new_node) if new_node.ptr_eq(old_node) => return false,
        Value::Node(new_node) if new_node.is_array() == old_node.is_array() => new_node,
        // Primitive, opaque, or array/non-array mismatch: the whole old
        // subtree is considered replaced
        _ => {
            mark_subtree(old_node);
            mark_key(node, key);
            with_context(|ctx| ctx.cache_change(old_node.id(), true));
            return true;
        }
    };

    with_context(|ctx| ctx.cache_change(old_node.id(), false));

    let changed = if old_node.is_array() {
        diff_elements(old_node, new_node)
    } else {
        diff_fields(old_node, new_node)
    };

    if changed {
        mark_key(node, key);
    }
    with_context(|ctx| ctx.cache_change(old_node.id(), changed));
    changed
}

fn diff_elements(old: &Node, new: &Node) -> bool {
    let old_len = old.raw_len();
    let new_len = new.raw_len();
    let mut changed = false;

    for i in 0..old_len {
        let key = Key::Index(i);
        let next = new.raw_get(&key);
        changed |= mark_changes(old, &key, &next);
    }

    for i in old_len..new_len {
        mark_key(old, &Key::Index(i));
        changed = true;
    }

    if old_len != new_len {
        mark_key(old, &Key::Length);
    }

    changed
}

fn diff_fields(old: &Node, new: &Node) -> bool {
    let old_keys = old.keys();
    let mut changed = false;

    for key in &old_keys {
        let next = new.raw_get(key);
        changed |= mark_changes(old, key, &next);
    }

    // Keys only present on the new side count unless they hold `Undefined`,
    // which is indistinguishable from absent
    for (key, value) in new.raw_entries() {
        if value.is_undefined() || old_keys.contains(&key) {
            continue;
        }
        mark_key(old, &key);
        changed = true;
    }

    changed
}

// =============================================================================
// MARK SUBTREE
// =============================================================================

/// Mark every handler registered anywhere in `node`'s descendant closure,
/// children before their owners.
pub fn mark_subtree(node: &Node) {
    let first_visit = with_context(|ctx| {
        if ctx.cached_change(node.id()).is_some() {
            return false;
        }
        ctx.cache_change(node.id(), true);
        true
    });
    if !first_visit {
        return;
    }

    for (_, child) in node.raw_entries() {
        if let Value::Node(child) = child {
            mark_subtree(&child);
        }
    }

    for key in node.handler_keys() {
        mark_key(node, &key);
    }
}

// =============================================================================
// ANCESTOR PROPAGATION
// =============================================================================

/// Mark, in every owner of `node`, the keys under which `node` is held, then
/// continue from each owner up to the roots.
pub fn mark_ancestors(node: &Node) {
    if !with_context(|ctx| ctx.visit_ancestor(node.id())) {
        return;
    }

    for parent in node.parents() {
        let keys = parent.keys_holding(node);
        if keys.is_empty() {
            log::warn!("stale owner link: {parent:?} no longer holds {node:?}, pruning it");
            node.forget_parent(&parent);
            continue;
        }
        for key in &keys {
            mark_key(&parent, key);
        }
        mark_ancestors(&parent);
    }
}

// =============================================================================
// TESTS
// =============================================================================
