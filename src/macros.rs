// ============================================================================
// spark-state - Ergonomic Macros
// ============================================================================

/// Helper macro to clone variables into a move closure.
///
/// Handy for subscription callbacks, which usually need their own handle to
/// the store they write to.
///
/// # Usage
///
/// ```rust
/// use spark_state::{cloned, subscribe, wrap_root};
///
/// let store = wrap_root(serde_json::json!({"a": 1, "log": []})).unwrap();
///
/// let sub = subscribe(
///     cloned!(store => move || store.get("a")),
///     cloned!(store => move || {
///         let _ = store.get("log").as_node().map(|log| log.push(["a changed"]));
///     }),
/// )
/// .unwrap();
///
/// store.set("a", 2).unwrap();
/// assert_eq!(store.get("log").len(), Ok(1));
/// sub.unsubscribe();
/// ```
#[macro_export]
macro_rules! cloned {
    ($($n:ident),+ => $e:expr) => {
        {
            $( let $n = $n.clone(); )+
            $e
        }
    };
}

/// Build a path selector over a node.
///
/// `select!(store => "a", "b", 0usize)` is a closure reading
/// `store.a.b[0]`, failing with `Unresolved` as soon as a link in the path
/// is not a node. The node handle is cloned into the closure.
///
/// # Usage
///
/// ```rust
/// use spark_state::{select, subscribe, wrap_root};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let store = wrap_root(serde_json::json!({"todos": [{"done": false}]})).unwrap();
/// let hits = Rc::new(Cell::new(0));
///
/// let h = hits.clone();
/// let sub = subscribe(select!(store => "todos", 0usize, "done"), move || h.set(h.get() + 1)).unwrap();
///
/// store.get("todos").get(0usize).unwrap().set("done", true).unwrap();
/// assert_eq!(hits.get(), 1);
/// sub.unsubscribe();
/// ```
#[macro_export]
macro_rules! select {
    ($root:ident => $($key:expr),+ $(,)?) => {
        {
            let $root = $root.clone();
            move || -> ::std::result::Result<$crate::Value, $crate::Unresolved> {
                let value = $crate::Value::from(&$root);
                $( let value = value.get($key)?; )+
                Ok(value)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::core::node::wrap_root;
    use serde_json::json;

    #[test]
    fn select_reads_path() {
        let store = wrap_root(json!({"a": {"b": [10, 20]}})).unwrap();
        let read = select!(store => "a", "b", 1usize);
        assert_eq!(read().unwrap().as_i64(), Some(20));

        store.set("a", 1).unwrap();
        assert!(read().is_err());
    }

    #[test]
    fn cloned_keeps_original_usable() {
        let store = wrap_root(json!({"n": 1})).unwrap();
        let read = cloned!(store => move || store.get("n").as_i64());
        assert_eq!(read(), Some(1));
        assert_eq!(store.get("n").as_i64(), Some(1));
    }
}
