// ============================================================================
// spark-state - Wrapped Nodes
// The wrapper factory, tracked reads and the write pipeline
// ============================================================================
//
// A Node is one object or array of the state graph. Its data and its
// metadata (owners, handler lists, last notified length) live in separate
// cells, so iterating a node never exposes the metadata.
//
// Every write runs the same pipeline:
//   1. wrap the incoming value (adding this node to its owners)
//   2. diff old against new, marking handlers in the current pending set
//   3. apply the new data and release owners that no longer hold a child
//   4. mark `length` if an array's effective length changed
//   5. propagate to every ancestor if anything changed
//   6. clear the diff caches and drain the pending set
//   7. resubscribe handlers that were attached inside replaced subtrees
// ============================================================================

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use super::constants::MAX_ARRAY_LENGTH;
use super::context::with_context;
use super::error::{StateError, StateResult};
use super::types::{handler_ptr, AnyHandler, Key, Value};
use crate::primitives::snapshot::{unwrap, Plain};
use crate::reactivity::{diff, resubscribe, scheduling, tracking};

// =============================================================================
// CLASSES
// =============================================================================

/// Getter/setter property declared by a [`Proxifiable`] class.
///
/// Accessors are not data: writes go straight to `set` without being diffed,
/// so a setter's side effects are only observable through the ordinary
/// writes it performs on the node.
#[derive(Clone, Copy)]
pub struct Accessor {
    pub name: &'static str,
    pub get: fn(&Node) -> Value,
    pub set: Option<fn(&Node, Value) -> StateResult<()>>,
}

impl Accessor {
    pub fn read_only(name: &'static str, get: fn(&Node) -> Value) -> Self {
        Self {
            name,
            get,
            set: None,
        }
    }

    pub fn read_write(
        name: &'static str,
        get: fn(&Node) -> Value,
        set: fn(&Node, Value) -> StateResult<()>,
    ) -> Self {
        Self {
            name,
            get,
            set: Some(set),
        }
    }
}

/// Runtime description of a proxifiable class.
pub struct ClassInfo {
    name: &'static str,
    accessors: Vec<Accessor>,
}

impl ClassInfo {
    pub fn of<T: Proxifiable>() -> Rc<ClassInfo> {
        Rc::new(ClassInfo {
            name: T::class_name(),
            accessors: T::accessors(),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn accessor(&self, name: &str) -> Option<Accessor> {
        self.accessors.iter().find(|a| a.name == name).copied()
    }
}

impl PartialEq for ClassInfo {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl fmt::Debug for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassInfo")
            .field("name", &self.name)
            .field("accessors", &self.accessors.len())
            .finish()
    }
}

/// Types whose instances are wrapped into reactive nodes.
///
/// Anything else stored in the graph must go through [`crate::Opaque`] and is
/// never wrapped or diffed.
pub trait Proxifiable: 'static {
    fn class_name() -> &'static str;

    /// Data fields of the instance, in declaration order.
    fn into_fields(self) -> Vec<(String, Plain)>;

    fn accessors() -> Vec<Accessor> {
        Vec::new()
    }
}

// =============================================================================
// NODE
// =============================================================================

pub(crate) enum NodeData {
    Object {
        class: Option<Rc<ClassInfo>>,
        fields: Vec<(Rc<str>, Value)>,
    },
    Array(Vec<Value>),
}

#[derive(Default)]
pub(crate) struct NodeMeta {
    /// Nodes currently holding this one (a DAG, possibly cyclic)
    parents: Vec<Weak<NodeInner>>,
    /// Subscribers per key, in subscription order
    handlers: HashMap<Key, Vec<Rc<dyn AnyHandler>>>,
    /// Array length as of the last notification
    length: usize,
}

pub struct NodeInner {
    data: RefCell<NodeData>,
    meta: RefCell<NodeMeta>,
}

/// Handle to a wrapped object or array.
///
/// Cloning the handle does not copy the node; equality is identity.
#[derive(Clone)]
pub struct Node(Rc<NodeInner>);

impl Node {
    fn with_data(data: NodeData) -> Node {
        let length = match &data {
            NodeData::Array(items) => items.len(),
            NodeData::Object { .. } => 0,
        };
        Node(Rc::new(NodeInner {
            data: RefCell::new(data),
            meta: RefCell::new(NodeMeta {
                length,
                ..NodeMeta::default()
            }),
        }))
    }

    /// A new, empty object node with no owners.
    pub fn object() -> Node {
        Node::with_data(NodeData::Object {
            class: None,
            fields: Vec::new(),
        })
    }

    /// A new, empty array node with no owners.
    pub fn array() -> Node {
        Node::with_data(NodeData::Array(Vec::new()))
    }

    /// Wrap an instance of a proxifiable class.
    pub fn from_instance<T: Proxifiable>(value: T) -> Node {
        let class = ClassInfo::of::<T>();
        build_object(Some(class), value.into_fields())
    }

    // =========================================================================
    // IDENTITY
    // =========================================================================

    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_array(&self) -> bool {
        matches!(&*self.0.data.borrow(), NodeData::Array(_))
    }

    pub fn class(&self) -> Option<Rc<ClassInfo>> {
        match &*self.0.data.borrow() {
            NodeData::Object { class, .. } => class.clone(),
            NodeData::Array(_) => None,
        }
    }

    pub fn class_name(&self) -> Option<&'static str> {
        self.class().map(|c| c.name())
    }

    fn kind(&self) -> &'static str {
        if self.is_array() { "an array" } else { "an object" }
    }

    // =========================================================================
    // OWNERSHIP
    // =========================================================================

    /// Live nodes currently holding this one. Dead links are pruned.
    pub fn parents(&self) -> Vec<Node> {
        let mut meta = self.0.meta.borrow_mut();
        meta.parents.retain(|p| p.strong_count() > 0);
        meta.parents
            .iter()
            .filter_map(Weak::upgrade)
            .map(Node)
            .collect()
    }

    pub fn parent_count(&self) -> usize {
        self.parents().len()
    }

    /// Record `parent` as an owner. Idempotent per owner.
    pub(crate) fn adopt(&self, parent: &Node) {
        let mut meta = self.0.meta.borrow_mut();
        let weak = Rc::downgrade(&parent.0);
        if !meta.parents.iter().any(|p| p.ptr_eq(&weak)) {
            meta.parents.push(weak);
        }
    }

    pub(crate) fn forget_parent(&self, parent: &Node) {
        let weak = Rc::downgrade(&parent.0);
        self.0
            .meta
            .borrow_mut()
            .parents
            .retain(|p| !p.ptr_eq(&weak) && p.strong_count() > 0);
    }

    /// Keys of this node whose value is `child`.
    pub(crate) fn keys_holding(&self, child: &Node) -> Vec<Key> {
        self.raw_entries()
            .into_iter()
            .filter(|(_, v)| v.as_node().is_some_and(|n| n.ptr_eq(child)))
            .map(|(k, _)| k)
            .collect()
    }

    pub(crate) fn holds(&self, child: &Node) -> bool {
        !self.keys_holding(child).is_empty()
    }

    // =========================================================================
    // HANDLER LISTS
    // =========================================================================

    /// Number of subscribers attached at `key`.
    pub fn handler_count(&self, key: impl Into<Key>) -> usize {
        let key = key.into();
        self.0.meta.borrow().handlers.get(&key).map_or(0, Vec::len)
    }

    pub fn has_handlers(&self) -> bool {
        !self.0.meta.borrow().handlers.is_empty()
    }

    pub(crate) fn handler_keys(&self) -> Vec<Key> {
        self.0.meta.borrow().handlers.keys().cloned().collect()
    }

    pub(crate) fn handlers_at(&self, key: &Key) -> Vec<Rc<dyn AnyHandler>> {
        self.0
            .meta
            .borrow()
            .handlers
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn add_handler(&self, key: Key, handler: Rc<dyn AnyHandler>) {
        self.0
            .meta
            .borrow_mut()
            .handlers
            .entry(key)
            .or_default()
            .push(handler);
    }

    /// Remove the handler with the given identity. Returns true if found.
    pub(crate) fn remove_handler(&self, key: &Key, handler: *const ()) -> bool {
        let mut meta = self.0.meta.borrow_mut();
        let Some(list) = meta.handlers.get_mut(key) else {
            return false;
        };
        let before = list.len();
        list.retain(|h| handler_ptr(h) != handler);
        let removed = list.len() != before;
        if list.is_empty() {
            meta.handlers.remove(key);
        }
        removed
    }

    // =========================================================================
    // RAW ACCESS (untracked)
    // =========================================================================

    pub(crate) fn raw_get(&self, key: &Key) -> Value {
        match (&*self.0.data.borrow(), key) {
            (NodeData::Object { fields, .. }, Key::Field(name)) => fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
                .unwrap_or_default(),
            (NodeData::Array(items), Key::Index(i)) => items.get(*i).cloned().unwrap_or_default(),
            (NodeData::Array(items), Key::Length) => Value::from(items.len()),
            _ => Value::Undefined,
        }
    }

    /// Data entries in order. Accessors are not included.
    pub(crate) fn raw_entries(&self) -> Vec<(Key, Value)> {
        match &*self.0.data.borrow() {
            NodeData::Object { fields, .. } => fields
                .iter()
                .map(|(k, v)| (Key::Field(k.clone()), v.clone()))
                .collect(),
            NodeData::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| (Key::Index(i), v.clone()))
                .collect(),
        }
    }

    pub(crate) fn raw_len(&self) -> usize {
        match &*self.0.data.borrow() {
            NodeData::Object { fields, .. } => fields.len(),
            NodeData::Array(items) => items.len(),
        }
    }

    fn raw_elements(&self) -> Vec<Value> {
        match &*self.0.data.borrow() {
            NodeData::Array(items) => items.clone(),
            NodeData::Object { .. } => Vec::new(),
        }
    }

    fn accessor(&self, key: &Key) -> Option<Accessor> {
        let name = key.as_field()?;
        self.class()?.accessor(name)
    }

    // =========================================================================
    // TRACKED READS
    // =========================================================================

    /// Read `key`, recording it as the last touched pair when a capture
    /// window is open. Missing keys read as `Undefined`.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        let key = key.into();
        tracking::record_read(self, &key);
        match self.accessor(&key) {
            Some(accessor) => (accessor.get)(self),
            None => self.raw_get(&key),
        }
    }

    /// Number of elements (arrays track `length`) or fields (objects).
    pub fn len(&self) -> usize {
        if self.is_array() {
            tracking::record_read(self, &Key::Length);
        }
        self.raw_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Data keys in order (field names or indices). Never includes metadata
    /// or accessors.
    ///
    /// On arrays this is a read of `length`. Objects have no key for their
    /// key set, so listing object keys is untracked.
    pub fn keys(&self) -> Vec<Key> {
        if self.is_array() {
            tracking::record_read(self, &Key::Length);
        }
        self.raw_entries().into_iter().map(|(k, _)| k).collect()
    }

    /// Tracked like a read of `key`.
    pub fn contains_key(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        tracking::record_read(self, &key);
        match &*self.0.data.borrow() {
            NodeData::Object { fields, .. } => match &key {
                Key::Field(name) => fields.iter().any(|(k, _)| k == name),
                _ => false,
            },
            NodeData::Array(items) => match key {
                Key::Index(i) => i < items.len(),
                Key::Length => true,
                Key::Field(_) => false,
            },
        }
    }

    /// Elements of an array node (untracked). Empty for objects.
    pub fn elements(&self) -> Vec<Value> {
        self.raw_elements()
    }

    /// Plain deep copy of this node.
    pub fn snapshot(&self) -> StateResult<Plain> {
        unwrap(&Value::Node(self.clone()))
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// Write `value` at `key`, notifying every subscriber whose observed value
    /// changed.
    ///
    /// Writing an accessor calls its setter directly. Writing `length` on an
    /// array truncates or extends it.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> StateResult<()> {
        let key = key.into();
        let value = value.into();

        if let Some(accessor) = self.accessor(&key) {
            return match accessor.set {
                Some(set) => set(self, value),
                None => Err(StateError::ReadOnlyAccessor(accessor.name.to_string())),
            };
        }

        match key {
            Key::Field(name) if !self.is_array() => self.write_field(name, value),
            Key::Index(index) if self.is_array() => {
                let len = index
                    .checked_add(1)
                    .filter(|len| *len <= MAX_ARRAY_LENGTH)
                    .ok_or(StateError::InvalidLength)?;
                let mut items = self.raw_elements();
                if index >= items.len() {
                    items.resize(len, Value::Undefined);
                }
                items[index] = value;
                self.write_elements(items)
            }
            Key::Length if self.is_array() => {
                let len = value
                    .as_f64()
                    .filter(|n| *n >= 0.0 && n.fract() == 0.0 && *n <= MAX_ARRAY_LENGTH as f64)
                    .ok_or(StateError::InvalidLength)?;
                self.set_len(len as usize)
            }
            key => Err(StateError::KeyKind {
                key,
                kind: self.kind(),
            }),
        }
    }

    /// Delete `key`.
    ///
    /// Implemented as a write of `Undefined` followed by removal of the field,
    /// so deletion is diffed exactly like assignment. Deleting an array index
    /// leaves an `Undefined` hole and keeps the length.
    pub fn delete(&self, key: impl Into<Key>) -> StateResult<()> {
        let key = key.into();

        if let Some(accessor) = self.accessor(&key) {
            return Err(StateError::AccessorDelete(accessor.name.to_string()));
        }

        match key {
            Key::Field(name) if !self.is_array() => {
                if !self.contains_key(Key::Field(name.clone())) {
                    return Ok(());
                }
                let written = self.write_field(name.clone(), Value::Undefined);
                if let NodeData::Object { fields, .. } = &mut *self.0.data.borrow_mut() {
                    fields.retain(|(k, _)| *k != name);
                }
                written
            }
            Key::Index(index) if self.is_array() => {
                if index >= self.raw_len() {
                    return Ok(());
                }
                self.set(Key::Index(index), Value::Undefined)
            }
            Key::Length if self.is_array() => Err(StateError::InvalidLength),
            key => Err(StateError::KeyKind {
                key,
                kind: self.kind(),
            }),
        }
    }

    /// Append values, returning the new length.
    pub fn push<I, V>(&self, values: I) -> StateResult<usize>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.expect_array()?;
        let mut items = self.raw_elements();
        items.extend(values.into_iter().map(Into::into));
        let len = items.len();
        if len > MAX_ARRAY_LENGTH {
            return Err(StateError::InvalidLength);
        }
        self.write_elements(items)?;
        Ok(len)
    }

    /// Remove and return the last element (`Undefined` when empty).
    pub fn pop(&self) -> StateResult<Value> {
        self.expect_array()?;
        let mut items = self.raw_elements();
        let Some(last) = items.pop() else {
            return Ok(Value::Undefined);
        };
        self.write_elements(items)?;
        Ok(last)
    }

    /// Remove `delete_count` elements starting at `start` and insert `values`
    /// in their place. Returns the removed elements.
    pub fn splice<I, V>(&self, start: usize, delete_count: usize, values: I) -> StateResult<Vec<Value>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.expect_array()?;
        let mut items = self.raw_elements();
        let start = start.min(items.len());
        let end = start.saturating_add(delete_count).min(items.len());
        let removed: Vec<Value> = items
            .splice(start..end, values.into_iter().map(Into::into))
            .collect();
        if items.len() > MAX_ARRAY_LENGTH {
            return Err(StateError::InvalidLength);
        }
        self.write_elements(items)?;
        Ok(removed)
    }

    /// Truncate or extend (with `Undefined`) to `len` elements.
    pub fn set_len(&self, len: usize) -> StateResult<()> {
        self.expect_array()?;
        if len > MAX_ARRAY_LENGTH {
            return Err(StateError::InvalidLength);
        }
        let mut items = self.raw_elements();
        items.resize(len, Value::Undefined);
        self.write_elements(items)
    }

    fn expect_array(&self) -> StateResult<()> {
        if self.is_array() {
            Ok(())
        } else {
            Err(StateError::KeyKind {
                key: Key::Length,
                kind: "an object",
            })
        }
    }

    // =========================================================================
    // WRITE PIPELINE
    // =========================================================================

    fn write_field(&self, name: Rc<str>, value: Value) -> StateResult<()> {
        let key = Key::Field(name.clone());
        let value = wrap(value, Some(self));
        let old = self.raw_get(&key);

        let changed = diff::mark_changes(self, &key, &value);

        if let NodeData::Object { fields, .. } = &mut *self.0.data.borrow_mut() {
            match fields.iter_mut().find(|(k, _)| *k == name) {
                Some(slot) => slot.1 = value,
                None => fields.push((name, value)),
            }
        }

        let replaced = self.release_replaced(vec![(key, old)]);
        self.finish(changed, replaced)
    }

    fn write_elements(&self, items: Vec<Value>) -> StateResult<()> {
        let items: Vec<Value> = items.into_iter().map(|v| wrap(v, Some(self))).collect();
        let old = self.raw_elements();

        let mut changed = false;
        for i in 0..old.len().max(items.len()) {
            let next = items.get(i).cloned().unwrap_or_default();
            changed |= diff::mark_changes(self, &Key::Index(i), &next);
        }

        let len = items.len();
        if let NodeData::Array(current) = &mut *self.0.data.borrow_mut() {
            *current = items;
        }

        let length_changed = {
            let mut meta = self.0.meta.borrow_mut();
            let changed = meta.length != len;
            meta.length = len;
            changed
        };
        if length_changed {
            diff::mark_key(self, &Key::Length);
            changed = true;
        }

        let old = old
            .into_iter()
            .enumerate()
            .map(|(i, v)| (Key::Index(i), v))
            .collect();
        let replaced = self.release_replaced(old);
        self.finish(changed, replaced)
    }

    /// Collect old child nodes that were swapped out, dropping this node from
    /// their owners when it no longer holds them anywhere.
    fn release_replaced(&self, old: Vec<(Key, Value)>) -> Vec<Node> {
        let mut replaced: Vec<Node> = Vec::new();
        for (key, value) in old {
            let Value::Node(child) = value else {
                continue;
            };
            if self.raw_get(&key).same(&Value::Node(child.clone())) {
                continue;
            }
            if !self.holds(&child) {
                child.forget_parent(self);
            }
            if !replaced.iter().any(|n| n.ptr_eq(&child)) {
                replaced.push(child);
            }
        }
        replaced
    }

    fn finish(&self, changed: bool, replaced: Vec<Node>) -> StateResult<()> {
        if changed {
            diff::mark_ancestors(self);
        }
        with_context(|ctx| ctx.clear_caches());

        let dispatched = scheduling::call_handlers();

        // After dispatch, so handlers that fired have already moved themselves
        for old in &replaced {
            resubscribe::resubscribe_subtree(old);
        }

        dispatched
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0.data.borrow() {
            NodeData::Array(items) => write!(f, "Node(array#{:x}, len {})", self.id(), items.len()),
            NodeData::Object { class, fields } => match class {
                Some(class) => write!(f, "Node({}#{:x}, {} fields)", class.name(), self.id(), fields.len()),
                None => write!(f, "Node(object#{:x}, {} fields)", self.id(), fields.len()),
            },
        }
    }
}

// =============================================================================
// WRAPPER FACTORY
// =============================================================================

/// Wrap `value` into the graph under `parent`.
///
/// Raw input (`Plain`, JSON) becomes fresh nodes when converted into a
/// `Value`; an existing node is never re-wrapped, it only gains `parent` as
/// an additional owner.
pub fn wrap(value: impl Into<Value>, parent: Option<&Node>) -> Value {
    let value = value.into();
    if let (Value::Node(node), Some(parent)) = (&value, parent) {
        node.adopt(parent);
    }
    value
}

/// Wrap a top-level store object.
pub fn wrap_root(raw: impl Into<Plain>) -> StateResult<Node> {
    match Value::from(raw.into()) {
        Value::Node(node) => Ok(node),
        _ => Err(StateError::NotProxifiable),
    }
}

fn build(plain: Plain) -> Value {
    match plain {
        Plain::Undefined => Value::Undefined,
        Plain::Null => Value::Null,
        Plain::Bool(b) => Value::Bool(b),
        Plain::Number(n) => Value::Number(n),
        Plain::String(s) => Value::from(s),
        Plain::Opaque(o) => Value::Opaque(o),
        Plain::Array(items) => {
            let node = Node::with_data(NodeData::Array(Vec::new()));
            let values: Vec<Value> = items
                .into_iter()
                .map(|item| wrap(build(item), Some(&node)))
                .collect();
            node.0.meta.borrow_mut().length = values.len();
            *node.0.data.borrow_mut() = NodeData::Array(values);
            Value::Node(node)
        }
        Plain::Object(fields) => Value::Node(build_object(None, fields)),
        Plain::Instance(class, fields) => Value::Node(build_object(Some(class), fields)),
    }
}

fn build_object(class: Option<Rc<ClassInfo>>, fields: Vec<(String, Plain)>) -> Node {
    let node = Node::with_data(NodeData::Object {
        class: class.clone(),
        fields: Vec::new(),
    });
    let mut built: Vec<(Rc<str>, Value)> = Vec::with_capacity(fields.len());
    for (name, plain) in fields {
        let value = wrap(build(plain), Some(&node));
        match built.iter_mut().find(|(k, _)| **k == *name) {
            Some(slot) => slot.1 = value,
            None => built.push((Rc::from(name), value)),
        }
    }
    *node.0.data.borrow_mut() = NodeData::Object {
        class,
        fields: built,
    };
    node
}

impl From<Plain> for Value {
    fn from(plain: Plain) -> Self {
        build(plain)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        build(Plain::from(json))
    }
}

impl Value {
    /// Wrap an instance of a proxifiable class.
    pub fn instance<T: Proxifiable>(value: T) -> Value {
        Value::Node(Node::from_instance(value))
    }
}

// =============================================================================
// TESTS
// =============================================================================
