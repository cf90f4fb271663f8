//! Patch construction against empty and populated twins

use serde_json::{json, Value};
use twingest_core::{ModelId, PatchBuilder, PatchOperation, Twin, TwinProperty};

const SOURCE_TIME: &str = "2022-02-22T22:22:22.222Z";

fn message_properties() -> Vec<TwinProperty> {
    vec![
        TwinProperty::new("key", json!("something")),
        TwinProperty::new("number", json!(-12.1)),
    ]
}

fn model_id() -> ModelId {
    ModelId::parse("dtmi:com:example:thing;3").unwrap()
}

#[test]
fn test_patch_for_empty_twin_adds_everything() {
    let twin = Twin::new("thing-1", &ModelId::parse("dtmi:com:example:thing;1").unwrap());

    let ops = PatchBuilder::build(&message_properties(), &twin, &model_id(), SOURCE_TIME);

    assert_eq!(
        ops,
        vec![
            PatchOperation::replace("/$metadata/$model", "dtmi:com:example:thing;3"),
            PatchOperation::add("/key", "something"),
            PatchOperation::replace("/$metadata/key/sourceTime", SOURCE_TIME),
            PatchOperation::add("/number", "-12.1"),
            PatchOperation::replace("/$metadata/number/sourceTime", SOURCE_TIME),
        ]
    );
}

#[test]
fn test_patch_for_populated_twin_replaces() {
    let twin = Twin::materialize(
        "thing-1",
        &ModelId::parse("dtmi:com:example:thing;1").unwrap(),
        &[
            TwinProperty::new("key", json!("old")),
            TwinProperty::new("number", json!(1)),
        ],
        "2020-01-01T00:00:00Z",
    );

    let ops = PatchBuilder::build(&message_properties(), &twin, &model_id(), SOURCE_TIME);

    assert_eq!(ops.len(), 5);
    assert_eq!(ops[1], PatchOperation::replace("/key", "something"));
    assert_eq!(ops[3], PatchOperation::replace("/number", "-12.1"));
}

#[test]
fn test_patch_follows_message_key_order() {
    let twin = Twin::new("t", &model_id());
    let props = vec![
        TwinProperty::new("zeta", json!(1)),
        TwinProperty::new("alpha", json!(2)),
    ];

    let ops = PatchBuilder::build(&props, &twin, &model_id(), SOURCE_TIME);
    let paths: Vec<_> = ops.iter().map(PatchOperation::path).collect();

    assert_eq!(
        paths,
        vec![
            "/$metadata/$model",
            "/zeta",
            "/$metadata/zeta/sourceTime",
            "/alpha",
            "/$metadata/alpha/sourceTime",
        ]
    );
}

#[test]
fn test_patch_escapes_pointer_tokens() {
    let twin = Twin::new("t", &model_id());
    let props = vec![TwinProperty::new("a/b~c", json!(true))];

    let ops = PatchBuilder::build(&props, &twin, &model_id(), SOURCE_TIME);

    assert_eq!(ops[1], PatchOperation::add("/a~1b~0c", "true"));
    assert_eq!(
        ops[2],
        PatchOperation::replace("/$metadata/a~1b~0c/sourceTime", SOURCE_TIME)
    );
}

#[test]
fn test_numbers_are_written_in_canonical_form() {
    let message: Value = serde_json::from_str(
        r#"{"a":21.0,"b":1e3,"c":-12.10,"d":1e-7,"e":12345678901234567890123}"#,
    )
    .unwrap();
    let props: Vec<TwinProperty> = message
        .as_object()
        .unwrap()
        .iter()
        .map(|(name, value)| TwinProperty::new(name.clone(), value.clone()))
        .collect();

    let ops = PatchBuilder::build(&props, &Twin::new("t", &model_id()), &model_id(), SOURCE_TIME);
    let written: Vec<_> = ops
        .iter()
        .filter(|op| !op.path().starts_with("/$metadata"))
        .map(|op| (op.path(), op.value()))
        .collect();

    assert_eq!(
        written,
        vec![
            ("/a", "21"),
            ("/b", "1000"),
            ("/c", "-12.1"),
            ("/d", "1E-07"),
            ("/e", "12345678901234567890123"),
        ]
    );
}

#[test]
fn test_patch_document_wire_form() {
    let twin = Twin::new("t", &model_id());
    let ops = PatchBuilder::build(
        &[TwinProperty::new("nested", json!({ "x": 1 }))],
        &twin,
        &model_id(),
        SOURCE_TIME,
    );

    let doc = serde_json::to_value(&ops).unwrap();
    assert_eq!(doc[0]["op"], "replace");
    assert_eq!(doc[1], json!({ "op": "add", "path": "/nested", "value": "{\"x\":1}" }));
}
