use serde_json::json;
use spark_state::{select, subscribe, wrap_root, Key, Value};
use std::cell::Cell;
use std::rc::Rc;

#[test]
fn test_length_subscription_follows_array_operations() {
    let _ = env_logger::builder().is_test(true).try_init();

    let c = wrap_root(json!({"arr": [3]})).unwrap();
    c.delete("arr").unwrap();

    let hits = Rc::new(Cell::new(0));
    let h = hits.clone();
    let sub = subscribe(select!(c => "arr", Key::Length), move || h.set(h.get() + 1)).unwrap();

    c.set("arr", json!([3])).unwrap();
    assert_eq!(hits.get(), 1);

    let arr = c.get("arr").as_node().cloned().unwrap();

    // Each operation is one write, so `length` fires at most once per call
    arr.push([2, 22]).unwrap();
    assert_eq!(hits.get(), 2);

    // Same length
    arr.set(2usize, 4).unwrap();
    assert_eq!(hits.get(), 2);

    arr.pop().unwrap();
    assert_eq!(hits.get(), 3);

    arr.splice(1, 1, Vec::<Value>::new()).unwrap();
    assert_eq!(hits.get(), 4);

    arr.set_len(0).unwrap();
    assert_eq!(hits.get(), 5);

    hits.set(0);
    c.set("arr", json!([3, 6])).unwrap();
    assert_eq!(hits.get(), 1);

    sub.unsubscribe();
}

#[test]
fn test_element_subscriptions() {
    let root = wrap_root(json!({"items": [{"id": 1}, {"id": 2}]})).unwrap();
    let hits = Rc::new(Cell::new(0));
    let h = hits.clone();
    let sub = subscribe(select!(root => "items", 1usize, "id"), move || h.set(h.get() + 1)).unwrap();

    let items = root.get("items").as_node().cloned().unwrap();

    // Removing the first element shifts the second into slot 0
    items.splice(0, 1, Vec::<Value>::new()).unwrap();
    assert_eq!(hits.get(), 1);
    assert_eq!(sub.tracked()[0].1, Key::Index(1));

    // Slot 1 appears again
    items.push([json!({"id": 9})]).unwrap();
    assert_eq!(hits.get(), 2);
    assert_eq!(root.get("items").get(1usize).unwrap().get("id").unwrap().as_i64(), Some(9));

    sub.unsubscribe();
}

#[test]
fn test_length_write_truncates() {
    let root = wrap_root(json!({"list": [1, 2, 3]})).unwrap();
    let list = root.get("list");
    list.set(Key::Length, 1).unwrap();
    assert_eq!(list.len(), Ok(1));

    list.set(Key::Length, 3).unwrap();
    assert_eq!(list.len(), Ok(3));
    assert!(list.get(2usize).unwrap().is_undefined());
}

#[test]
fn test_unchanged_array_replacement_is_silent() {
    let root = wrap_root(json!({"list": [1, [2, 3], {"k": "v"}]})).unwrap();
    let hits = Rc::new(Cell::new(0));
    let h = hits.clone();
    let sub = subscribe(select!(root => "list"), move || h.set(h.get() + 1)).unwrap();

    root.set("list", json!([1, [2, 3], {"k": "v"}])).unwrap();
    assert_eq!(hits.get(), 0);

    root.set("list", json!([1, [2, 4], {"k": "v"}])).unwrap();
    assert_eq!(hits.get(), 1);
    sub.unsubscribe();
}
