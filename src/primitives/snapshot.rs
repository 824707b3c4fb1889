// ============================================================================
// spark-state - Snapshots
// Plain deep copies of wrapped state, and JSON export
// ============================================================================
//
// `Plain` is the unwrapped form of a value: it carries no owners, no handler
// lists and no node identity. It is both the input of the wrapper factory
// and the output of `unwrap`, so state can cross into code that compares,
// serializes or stores it without touching the reactive graph.
// ============================================================================

use std::collections::HashSet;
use std::rc::Rc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::error::{StateError, StateResult};
use crate::core::node::{ClassInfo, Node};
use crate::core::types::{Opaque, Value};

// =============================================================================
// PLAIN
// =============================================================================

/// An unwrapped value.
///
/// Objects keep their field order. Instances keep their class, so wrapping a
/// snapshot of an instance gives back a node with the same accessors.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Plain {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Plain>),
    Object(Vec<(String, Plain)>),
    Instance(Rc<ClassInfo>, Vec<(String, Plain)>),
    Opaque(Opaque),
}

impl Plain {
    pub fn object<K, I>(fields: I) -> Plain
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Plain)>,
    {
        Plain::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn array<V, I>(items: I) -> Plain
    where
        V: Into<Plain>,
        I: IntoIterator<Item = V>,
    {
        Plain::Array(items.into_iter().map(Into::into).collect())
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Plain::Undefined)
    }

    /// Field of an object or instance. Missing fields are `None`.
    pub fn get(&self, name: &str) -> Option<&Plain> {
        match self {
            Plain::Object(fields) | Plain::Instance(_, fields) => {
                fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    pub fn index(&self, i: usize) -> Option<&Plain> {
        match self {
            Plain::Array(items) => items.get(i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Plain::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Plain::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Plain::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn class_name(&self) -> Option<&'static str> {
        match self {
            Plain::Instance(class, _) => Some(class.name()),
            _ => None,
        }
    }

    /// Export as JSON.
    ///
    /// `Undefined` and opaque fields are omitted from objects; inside arrays
    /// they become `null`, as do non-finite numbers. Integral numbers are
    /// exported as integers.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match self {
            Plain::Undefined | Plain::Null | Plain::Opaque(_) => Json::Null,
            Plain::Bool(b) => Json::Bool(*b),
            Plain::Number(n) => number_to_json(*n),
            Plain::String(s) => Json::String(s.clone()),
            Plain::Array(items) => Json::Array(items.iter().map(Plain::to_json).collect()),
            Plain::Object(fields) | Plain::Instance(_, fields) => Json::Object(
                fields
                    .iter()
                    .filter(|(_, v)| !matches!(v, Plain::Undefined | Plain::Opaque(_)))
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

/// Largest magnitude below which every integer is exactly representable.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

// =============================================================================
// CONVERSIONS
// =============================================================================

impl From<bool> for Plain {
    fn from(b: bool) -> Self {
        Plain::Bool(b)
    }
}

impl From<f64> for Plain {
    fn from(n: f64) -> Self {
        Plain::Number(n)
    }
}

impl From<i32> for Plain {
    fn from(n: i32) -> Self {
        Plain::Number(f64::from(n))
    }
}

impl From<i64> for Plain {
    fn from(n: i64) -> Self {
        Plain::Number(n as f64)
    }
}

impl From<usize> for Plain {
    fn from(n: usize) -> Self {
        Plain::Number(n as f64)
    }
}

impl From<&str> for Plain {
    fn from(s: &str) -> Self {
        Plain::String(s.to_string())
    }
}

impl From<String> for Plain {
    fn from(s: String) -> Self {
        Plain::String(s)
    }
}

impl From<Opaque> for Plain {
    fn from(o: Opaque) -> Self {
        Plain::Opaque(o)
    }
}

/// JSON objects arrive with serde_json's key order (sorted).
impl From<serde_json::Value> for Plain {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Plain::Null,
            Json::Bool(b) => Plain::Bool(b),
            Json::Number(n) => n.as_f64().map_or(Plain::Null, Plain::Number),
            Json::String(s) => Plain::String(s),
            Json::Array(items) => Plain::Array(items.into_iter().map(Plain::from).collect()),
            Json::Object(map) => {
                Plain::Object(map.into_iter().map(|(k, v)| (k, Plain::from(v))).collect())
            }
        }
    }
}

impl Serialize for Plain {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Plain {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Plain::from)
    }
}

// =============================================================================
// UNWRAP
// =============================================================================

/// Plain deep copy of `value`.
///
/// Primitives and opaque values come back unchanged. Nodes are copied field
/// by field; a node reachable twice through different paths is copied twice,
/// while a node reachable from itself fails with
/// [`StateError::CyclicSnapshot`].
pub fn unwrap(value: &Value) -> StateResult<Plain> {
    let mut path = HashSet::new();
    copy(value, &mut path)
}

fn copy(value: &Value, path: &mut HashSet<usize>) -> StateResult<Plain> {
    Ok(match value {
        Value::Undefined => Plain::Undefined,
        Value::Null => Plain::Null,
        Value::Bool(b) => Plain::Bool(*b),
        Value::Number(n) => Plain::Number(*n),
        Value::String(s) => Plain::String(s.to_string()),
        Value::Opaque(o) => Plain::Opaque(o.clone()),
        Value::Node(node) => copy_node(node, path)?,
    })
}

fn copy_node(node: &Node, path: &mut HashSet<usize>) -> StateResult<Plain> {
    if !path.insert(node.id()) {
        return Err(StateError::CyclicSnapshot);
    }

    let entries = node.raw_entries();
    let plain = if node.is_array() {
        let items = entries
            .iter()
            .map(|(_, v)| copy(v, path))
            .collect::<StateResult<Vec<_>>>()?;
        Plain::Array(items)
    } else {
        let fields = entries
            .iter()
            .map(|(k, v)| Ok((k.to_string(), copy(v, path)?)))
            .collect::<StateResult<Vec<_>>>()?;
        match node.class() {
            Some(class) => Plain::Instance(class, fields),
            None => Plain::Object(fields),
        }
    };

    path.remove(&node.id());
    Ok(plain)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::wrap_root;
    use serde_json::json;

    #[test]
    fn unwrap_copies_structure() {
        let root = wrap_root(json!({"a": {"b": [1, "x", null, true]}})).unwrap();
        let plain = root.snapshot().unwrap();
        assert_eq!(plain.to_json(), json!({"a": {"b": [1, "x", null, true]}}));

        // Mutating the graph does not touch the copy
        root.get("a").set("b", 2).unwrap();
        assert_eq!(plain.get("a").and_then(|a| a.get("b")).and_then(|b| b.index(0)), Some(&Plain::Number(1.0)));
    }

    #[test]
    fn primitives_are_returned_unchanged() {
        assert_eq!(unwrap(&Value::from(3)).unwrap(), Plain::Number(3.0));
        assert_eq!(unwrap(&Value::Undefined).unwrap(), Plain::Undefined);
        let blob = Opaque::new(42u32);
        assert_eq!(unwrap(&Value::from(blob.clone())).unwrap(), Plain::Opaque(blob));
    }

    #[test]
    fn shared_nodes_are_copied_twice() {
        let root = wrap_root(json!({"a": {"n": 1}})).unwrap();
        root.set("b", root.get("a")).unwrap();
        let plain = root.snapshot().unwrap();
        assert_eq!(plain.to_json(), json!({"a": {"n": 1}, "b": {"n": 1}}));
    }

    #[test]
    fn cycles_are_rejected() {
        let root = wrap_root(json!({"a": {}})).unwrap();
        root.get("a").set("back", root.clone()).unwrap();
        assert_eq!(root.snapshot(), Err(StateError::CyclicSnapshot));
        root.get("a").set("back", Value::Null).unwrap();
        assert!(root.snapshot().is_ok());
    }

    #[test]
    fn json_export_rules() {
        let plain = Plain::object([
            ("gone", Plain::Undefined),
            ("blob", Plain::Opaque(Opaque::new(()))),
            ("nan", Plain::Number(f64::NAN)),
            ("half", Plain::Number(0.5)),
            ("list", Plain::array([Plain::Undefined, Plain::Number(f64::INFINITY), Plain::from(2)])),
        ]);
        assert_eq!(
            plain.to_json(),
            json!({"nan": null, "half": 0.5, "list": [null, null, 2]})
        );
        assert_eq!(serde_json::to_string(&Plain::from(7)).unwrap(), "7");
    }

    #[test]
    fn deserialize_through_json() {
        let plain: Plain = serde_json::from_str(r#"{"a": [1, 2.5], "b": "s"}"#).unwrap();
        assert_eq!(plain.get("a").and_then(|a| a.index(1)).and_then(Plain::as_f64), Some(2.5));
        assert_eq!(plain.get("b").and_then(Plain::as_str), Some("s"));
    }
}
