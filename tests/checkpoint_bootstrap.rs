// (c) Copyright 2025 Helsing GmbH. All rights reserved.
#![cfg(all(feature = "json", feature = "ulid"))]

use cowrite::{Checkpoint, ListInterpreter, MapInterpreter, codec::JsonCodec};
use serde_json::json;
use std::sync::Once;

// stamp of the checkpoint below, and one issued before and after it
const BEFORE: &str = "AAAAOTKy5nQAAA==";
const AT: &str = "AAAAOTKy5nUAAA==";
const AFTER: &str = "AAAAOTKy5nYAAA==";

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

fn checkpoint() -> Checkpoint {
    serde_json::from_value(json!({
        "id": "doc",
        "index": 3,
        "api_version": 1,
        "vs": AT,
        "actors": { "0": "gst_b2b6d556", "1": "gst_b355e9c9" },
        "lists": {
            "todo": {
                "ids": ["0:0", "1:0", "0:1"],
                "afters": ["root", "0:0", "root"],
                "values": ["\"milk\"", { "t": "" }, "\"eggs\""]
            }
        },
        "maps": {
            "settings": { "theme": "\"dark\"", "font": "12" }
        }
    }))
    .unwrap()
}

#[test]
fn lists_load_and_keep_going() {
    init_tracing();
    let mut list = ListInterpreter::<JsonCodec>::new("doc", "todo");
    list.import_from_checkpoint(&checkpoint()).unwrap();

    // both counters are 0, so the session tokens decide the order under root
    assert_eq!(list.to_vec().unwrap(), [json!("milk"), json!("eggs")]);
    assert_eq!(list.len(), 2);

    // a write the checkpoint already contains a newer version of is dropped
    list.apply_command(
        &["lput", "doc", "todo", "0:gst_b2b6d556", "\"bread\""],
        BEFORE,
        false,
    )
    .unwrap();
    assert_eq!(list.get(0).unwrap(), Some(json!("milk")));

    list.apply_command(
        &["lput", "doc", "todo", "0:gst_b2b6d556", "\"bread\""],
        AFTER,
        false,
    )
    .unwrap();
    assert_eq!(list.get(0).unwrap(), Some(json!("bread")));

    // local edits mint ids that don't collide with anything in the checkpoint
    list.push(&json!("butter")).unwrap();
    assert_eq!(
        list.to_vec().unwrap(),
        [json!("bread"), json!("eggs"), json!("butter")]
    );
    let pushed = list.item_ids()[2].to_string();
    assert!(pushed.starts_with("3:"), "{pushed}");
}

#[test]
fn maps_load_and_keep_going() {
    init_tracing();
    let mut map = MapInterpreter::<JsonCodec>::new("doc", "settings");
    map.import_from_checkpoint(&checkpoint()).unwrap();
    assert_eq!(map.get("theme"), Some(json!("dark")));
    assert_eq!(map.get("font"), Some(json!(12)));

    map.apply_command(&["mdel", "doc", "settings", "font"], BEFORE, false)
        .unwrap();
    assert_eq!(map.get("font"), Some(json!(12)));

    map.apply_command(&["mdel", "doc", "settings", "font"], AFTER, false)
        .unwrap();
    assert_eq!(map.get("font"), None);
    assert_eq!(map.keys().collect::<Vec<_>>(), ["theme"]);
}

#[test]
fn empty_containers_import_as_empty() {
    init_tracing();
    let mut list = ListInterpreter::<JsonCodec>::new("doc", "missing");
    list.push(&json!("dropped")).unwrap();
    list.import_from_checkpoint(&checkpoint()).unwrap();
    assert!(list.is_empty());

    let mut map = MapInterpreter::<JsonCodec>::new("doc", "missing");
    map.set("dropped", &json!(true));
    map.import_from_checkpoint(&checkpoint()).unwrap();
    assert!(map.is_empty());
}
