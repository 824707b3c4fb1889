// ============================================================================
// spark-state - Type Definitions
// Keys, values and the type-erased handler interface of the state graph
// ============================================================================

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use super::error::StateResult;
use super::node::Node;

// =============================================================================
// KEY
// =============================================================================

/// A property key of a wrapped node.
///
/// Objects are keyed by field name, arrays by index. `Length` is the
/// synthetic key arrays notify whenever their effective length changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Field(Rc<str>),
    Index(usize),
    Length,
}

impl Key {
    /// Field name, if this is a field key.
    pub fn as_field(&self) -> Option<&str> {
        match self {
            Key::Field(name) => Some(name),
            _ => None,
        }
    }

    /// Array index, if this is an index key.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(name) => write!(f, "{name}"),
            Key::Index(i) => write!(f, "[{i}]"),
            Key::Length => write!(f, "length"),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Field(Rc::from(name))
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Field(Rc::from(name))
    }
}

impl From<Rc<str>> for Key {
    fn from(name: Rc<str>) -> Self {
        Key::Field(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

// =============================================================================
// UNRESOLVED
// =============================================================================

/// Reading a property through a value that is not a node.
///
/// Selectors propagate this with `?`; a subscription whose selector returns
/// it watches the last link that did resolve and retries when that link
/// changes.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[error("read through a value that is not a node")]
pub struct Unresolved;

// =============================================================================
// OPAQUE
// =============================================================================

/// A foreign value stored in the graph without being wrapped.
///
/// Opaque values are compared by identity, never diffed and copied by
/// reference in snapshots.
#[derive(Clone)]
pub struct Opaque(Rc<dyn Any>);

impl Opaque {
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &Opaque) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}

impl PartialEq for Opaque {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opaque({:p})", Rc::as_ptr(&self.0))
    }
}

// =============================================================================
// VALUE
// =============================================================================

/// A value stored in the state graph.
///
/// Objects and arrays only ever appear as [`Value::Node`]: anything
/// proxifiable is wrapped on its way in.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Node(Node),
    Opaque(Opaque),
}

impl Value {
    /// Strict identity comparison.
    ///
    /// Numbers compare by `==` (so NaN differs from itself), strings by
    /// content, nodes and opaque values by identity.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Node(a), Value::Node(b)) => a.ptr_eq(b),
            (Value::Opaque(a), Value::Opaque(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// True for `Undefined` and `Null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_node(&self) -> bool {
        matches!(self, Value::Node(_))
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The number as an integer, if it has no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_opaque(&self) -> Option<&Opaque> {
        match self {
            Value::Opaque(o) => Some(o),
            _ => None,
        }
    }

    /// Tracked read of `key` on the wrapped node.
    ///
    /// Fails with [`Unresolved`] when this value is not a node, which is how
    /// selectors express "target not currently resolvable".
    pub fn get(&self, key: impl Into<Key>) -> Result<Value, Unresolved> {
        match self {
            Value::Node(node) => Ok(node.get(key)),
            _ => Err(Unresolved),
        }
    }

    /// Tracked read of the node's length.
    pub fn len(&self) -> Result<usize, Unresolved> {
        match self {
            Value::Node(node) => Ok(node.len()),
            _ => Err(Unresolved),
        }
    }

    /// Write `key` on the wrapped node.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> StateResult<()> {
        match self {
            Value::Node(node) => node.set(key, value),
            _ => Err(Unresolved.into()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        Value::Node(node)
    }
}

impl From<&Node> for Value {
    fn from(node: &Node) -> Self {
        Value::Node(node.clone())
    }
}

impl From<Opaque> for Value {
    fn from(opaque: Opaque) -> Self {
        Value::Opaque(opaque)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Undefined, Into::into)
    }
}

// =============================================================================
// TYPE-ERASED HANDLER
// =============================================================================

/// Type-erased subscriber interface stored in a node's handler lists.
///
/// The scheduler only needs to fire handlers and compare their identities;
/// the resubscription manager only needs `update`.
pub trait AnyHandler: Any {
    /// Re-resolve the tracked pair and invoke the user callback.
    fn fire(&self);

    /// Re-resolve the tracked pair without invoking the user callback.
    fn update(&self);

    /// Identity of the user callback, used for loop detection.
    fn original(&self) -> *const ();
}

/// Pointer identity of a handler allocation.
pub(crate) fn handler_ptr(handler: &Rc<dyn AnyHandler>) -> *const () {
    Rc::as_ptr(handler) as *const ()
}
