use serde_json::json;
use spark_state::{select, subscribe, wrap_root, Key, Plain, Subscription};
use std::cell::Cell;
use std::rc::Rc;

fn counting(hits: &Rc<Cell<usize>>) -> impl Fn() + 'static {
    let hits = hits.clone();
    move || hits.set(hits.get() + 1)
}

#[test]
fn test_subscription_on_missing_then_deleted_key() {
    let _ = env_logger::builder().is_test(true).try_init();

    let a = wrap_root(json!({})).unwrap();
    let hits = Rc::new(Cell::new(0));

    let sub = subscribe(select!(a => "b"), counting(&hits)).unwrap();
    a.set("b", json!({})).unwrap();
    a.delete("b").unwrap();
    sub.unsubscribe();

    a.set("b", json!({})).unwrap();
    a.delete("b").unwrap();
    assert_eq!(hits.get(), 2);
}

#[test]
fn test_nested_paths_follow_replacements() {
    let _ = env_logger::builder().is_test(true).try_init();

    let a = wrap_root(json!({})).unwrap();
    let hits = Rc::new(Cell::new(0));

    let subs: Vec<Subscription> = vec![
        subscribe(select!(a => "b", "c"), counting(&hits)).unwrap(),
        subscribe(select!(a => "b", "c", "x"), counting(&hits)).unwrap(),
        subscribe(select!(a => "b", "c", "z", "f"), counting(&hits)).unwrap(),
    ];

    // `c` goes from unresolvable to resolvable (an absent key reads as undefined)
    a.set("b", json!({})).unwrap();
    assert_eq!(hits.get(), 1);

    // A field holding undefined is the same as no field
    a.set("b", Plain::object([("c", Plain::Undefined)])).unwrap();
    assert_eq!(hits.get(), 1);

    a.get("b").set("c", json!({"x": 1, "y": 2})).unwrap();
    assert_eq!(hits.get(), 3);

    // Equal copy
    a.set("b", json!({"c": {"x": 1, "y": 2}})).unwrap();
    assert_eq!(hits.get(), 3);

    // Only `y` changed, so only the subscriber on `c` fires
    a.set("b", json!({"c": {"x": 1, "y": 3}})).unwrap();
    assert_eq!(hits.get(), 4);

    let c = a.get("b").get("c").unwrap();
    c.set("z", json!({"f": "hello"})).unwrap();
    c.get("z").unwrap().set("f", "hell").unwrap();
    assert_eq!(hits.get(), 8);

    a.set("b", json!({"c": {"x": 2, "y": 3, "z": {"f": "heaven"}}})).unwrap();
    assert_eq!(hits.get(), 11);

    for sub in &subs {
        sub.unsubscribe();
    }
    a.set("b", json!({"c": {"x": 22, "y": 3, "z": {"f": "left behind"}}})).unwrap();
    assert_eq!(hits.get(), 11);
}

#[test]
fn test_sibling_changes_do_not_fire() {
    let root = wrap_root(json!({"left": {"v": 1}, "right": {"v": 1}})).unwrap();
    let hits = Rc::new(Cell::new(0));
    let sub = subscribe(select!(root => "left", "v"), counting(&hits)).unwrap();

    root.get("right").set("v", 2).unwrap();
    root.set("right", json!({"v": 3})).unwrap();
    assert_eq!(hits.get(), 0);

    root.get("left").set("v", 2).unwrap();
    assert_eq!(hits.get(), 1);
    sub.unsubscribe();
}

#[test]
fn test_subscription_on_subtree_sees_deep_changes() {
    let root = wrap_root(json!({"a": {"b": {"c": {"d": 1}}}})).unwrap();
    let hits = Rc::new(Cell::new(0));
    let sub = subscribe(select!(root => "a"), counting(&hits)).unwrap();

    let d_owner = root.get("a").get("b").unwrap().get("c").unwrap();
    d_owner.set("d", 2).unwrap();
    assert_eq!(hits.get(), 1);

    d_owner.set("d", 2).unwrap();
    assert_eq!(hits.get(), 1);

    d_owner.set("e", "new").unwrap();
    assert_eq!(hits.get(), 2);
    sub.unsubscribe();
}

#[test]
fn test_shape_changes_notify_ancestors_once() {
    let _ = env_logger::builder().is_test(true).try_init();

    let store = wrap_root(json!({"b": {"c": {"x": 1, "y": {"z": 2}}}})).unwrap();
    let b = store.get("b");
    let hits_b = Rc::new(Cell::new(0));
    let hits_x = Rc::new(Cell::new(0));
    let sub_b = subscribe(select!(store => "b"), counting(&hits_b)).unwrap();
    let sub_x = subscribe(select!(store => "b", "c", "x"), counting(&hits_x)).unwrap();

    // Object to array
    b.set("c", json!([1, 2, 3])).unwrap();
    assert_eq!(hits_b.get(), 1);
    assert_eq!(hits_x.get(), 1);

    // Array to primitive: `x` can no longer be read, so the subscriber
    // falls back to the last link that resolved
    b.set("c", 5).unwrap();
    assert_eq!(hits_b.get(), 2);
    assert_eq!(hits_x.get(), 2);
    let tracked = sub_x.tracked();
    assert!(tracked[0].0.ptr_eq(b.as_node().unwrap()));
    assert_eq!(tracked[0].1, Key::from("c"));

    // Back to an object holding `x`
    b.set("c", json!({"x": 9})).unwrap();
    assert_eq!(hits_b.get(), 3);
    assert_eq!(hits_x.get(), 3);
    let c = b.get("c").unwrap();
    assert!(sub_x.tracked()[0].0.ptr_eq(c.as_node().unwrap()));

    sub_b.unsubscribe();
    sub_x.unsubscribe();
}
