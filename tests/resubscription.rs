use serde_json::json;
use spark_state::{select, subscribe, wrap_root, Key};
use std::cell::Cell;
use std::rc::Rc;

fn counting(hits: &Rc<Cell<usize>>) -> impl Fn() + 'static {
    let hits = hits.clone();
    move || hits.set(hits.get() + 1)
}

#[test]
fn test_silent_replacement_moves_subscriber() {
    let _ = env_logger::builder().is_test(true).try_init();

    let store = wrap_root(json!({"user": {"profile": {"name": "ada"}}})).unwrap();
    let hits = Rc::new(Cell::new(0));
    let sub = subscribe(select!(store => "user", "profile", "name"), counting(&hits)).unwrap();

    let old_profile = store.get("user").get("profile").unwrap().as_node().cloned().unwrap();
    assert_eq!(old_profile.handler_count("name"), 1);

    // Equal copy: nothing fires, but the subscriber must move to the new node
    store.set("user", json!({"profile": {"name": "ada"}})).unwrap();
    assert_eq!(hits.get(), 0);
    assert_eq!(old_profile.handler_count("name"), 0);

    let new_profile = store.get("user").get("profile").unwrap().as_node().cloned().unwrap();
    assert_eq!(new_profile.handler_count("name"), 1);
    assert!(sub.tracked()[0].0.ptr_eq(&new_profile));

    // Writes to the detached node are invisible, writes to the live one fire
    old_profile.set("name", "ghost").unwrap();
    assert_eq!(hits.get(), 0);
    new_profile.set("name", "grace").unwrap();
    assert_eq!(hits.get(), 1);

    sub.unsubscribe();
}

#[test]
fn test_subscriber_falls_back_to_last_valid_link() {
    let store = wrap_root(json!({"a": {"b": {"c": 1}}})).unwrap();
    let hits = Rc::new(Cell::new(0));
    let sub = subscribe(select!(store => "a", "b", "c"), counting(&hits)).unwrap();

    // `b` disappears: found -> not found fires once
    store.get("a").set("b", 5).unwrap();
    assert_eq!(hits.get(), 1);
    assert_eq!(sub.tracked()[0].1, Key::from("b"));

    // Still not resolvable: silent
    store.get("a").set("b", 6).unwrap();
    assert_eq!(hits.get(), 1);

    // Resolvable again
    store.get("a").set("b", json!({"c": 2})).unwrap();
    assert_eq!(hits.get(), 2);
    assert_eq!(sub.tracked()[0].1, Key::from("c"));

    sub.unsubscribe();
}

#[test]
fn test_deep_subscribers_survive_ancestor_swap() {
    let store = wrap_root(json!({"root": {"l1": {"l2": {"l3": {"v": 0}}}}})).unwrap();
    let hits = Rc::new(Cell::new(0));
    let subs = [
        subscribe(select!(store => "root", "l1", "l2", "l3", "v"), counting(&hits)).unwrap(),
        subscribe(select!(store => "root", "l1", "l2"), counting(&hits)).unwrap(),
    ];

    // Equal swap at the top moves both without firing
    store.set("root", json!({"l1": {"l2": {"l3": {"v": 0}}}})).unwrap();
    assert_eq!(hits.get(), 0);

    // Both now listen on the new subtree
    store
        .get("root")
        .get("l1")
        .and_then(|v| v.get("l2"))
        .and_then(|v| v.get("l3"))
        .unwrap()
        .set("v", 1)
        .unwrap();
    assert_eq!(hits.get(), 2);

    for sub in &subs {
        sub.unsubscribe();
    }
}
