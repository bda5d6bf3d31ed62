//! Analysis session lifecycle and JSON fact ingestion
mod common;

use common::{math_utils, read_write, sequential_config};
use dirmap::{AnalysisError, AnalysisSession, DirectionLabel, DirmapConfig, ModuleFacts};
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::sync::Arc;

const MATH_UTILS: &str = indoc! {r#"
    {
      "module": "math/utils",
      "symbols": [
        { "name": "add", "kind": "Function", "signature": "int(int,int)" },
        { "name": "multiply", "kind": "Function", "signature": "int(int,int)" },
        { "name": "g_polymorphismFactor", "kind": "Global", "type_name": "int" }
      ],
      "accesses": [
        { "function": "multiply", "global": "g_polymorphismFactor", "mode": "Read" }
      ]
    }
"#};

const CALLBACKS: &str = indoc! {r#"
    {
      "module": "polymorphism_tests",
      "symbols": [
        { "name": "applyWithCallback", "kind": "Function" },
        { "name": "callbackEntry", "kind": "Function" },
        { "name": "poke", "kind": "Function" },
        { "name": "g_scratch", "kind": "Global", "type_name": "int" }
      ],
      "call_sites": [
        { "id": 1, "caller": "applyWithCallback",
          "target": { "kind": "function_pointer", "signature": "int(int,int)",
                      "slot": { "slot": "param", "function": "applyWithCallback", "index": 0 } } },
        { "id": 2, "caller": "callbackEntry",
          "target": { "kind": "direct", "name": "applyWithCallback" } },
        { "id": 3, "caller": "callbackEntry",
          "target": { "kind": "direct", "name": "applyWithCallback" } }
      ],
      "accesses": [
        { "function": "poke", "global": "g_scratch", "mode": "Read",
          "via": { "pointer": { "is_const": false } } }
      ],
      "bindings": [
        { "slot": { "slot": "param", "function": "applyWithCallback", "index": 0 },
          "value": "function", "name": "add", "site": 2, "in_function": "callbackEntry" },
        { "slot": { "slot": "param", "function": "applyWithCallback", "index": 0 },
          "value": "function", "name": "multiply", "site": 3, "in_function": "callbackEntry" }
      ]
    }
"#};

fn json_session() -> AnalysisSession {
    let mut session = AnalysisSession::new(DirmapConfig::default());
    for json in [CALLBACKS, MATH_UTILS] {
        session.ingest(ModuleFacts::from_json(json).unwrap()).unwrap();
    }
    session
}

#[test]
fn test_json_facts_are_analyzed() {
    dirmap::observability::init_tracing("dirmap=debug");
    let oracle = json_session().run().unwrap();

    let callees: Vec<_> = oracle
        .callees_of("applyWithCallback")
        .unwrap()
        .iter()
        .map(|s| s.name.to_string())
        .collect();
    assert_eq!(callees, vec!["add", "multiply"]);
    assert_eq!(oracle.classify("applyWithCallback").unwrap(), DirectionLabel::In);
    assert_eq!(oracle.classify("callbackEntry").unwrap(), DirectionLabel::In);
    assert_eq!(oracle.classify("poke").unwrap(), DirectionLabel::In);
    assert_eq!(oracle.classify("g_scratch").unwrap(), DirectionLabel::In);
    assert!(oracle.unresolved_calls().is_empty());
}

#[test]
fn test_run_twice_returns_same_oracle() {
    let mut session = json_session();
    assert!(!session.is_finalized());

    let first = session.run().unwrap();
    let second = session.run().unwrap();
    assert!(session.is_finalized());
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_ingest_after_run_is_rejected() {
    let mut session = json_session();
    session.run().unwrap();

    let err = session.ingest(math_utils().build()).unwrap_err();
    assert!(matches!(err, AnalysisError::AnalysisFinalized { .. }));
    assert!(err.to_string().contains("math/utils"));
}

#[test]
fn test_unknown_symbol_lookup_is_an_error() {
    let oracle = json_session().run().unwrap();
    assert!(matches!(
        oracle.classify("doesNotExist"),
        Err(AnalysisError::UnresolvedSymbol { .. })
    ));
}

#[test]
fn test_oracle_is_shared_across_threads() {
    let mut session = AnalysisSession::new(sequential_config());
    session.ingest(read_write().build()).unwrap();
    session.ingest(math_utils().build()).unwrap();
    let oracle = session.run().unwrap();

    let labels: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = ["readGlobal", "writeGlobal", "readWriteGlobal"]
            .into_iter()
            .map(|name| {
                let oracle = Arc::clone(&oracle);
                scope.spawn(move || oracle.classify(name).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(
        labels,
        vec![DirectionLabel::In, DirectionLabel::Out, DirectionLabel::InOut]
    );
}

#[test]
fn test_report_serializes_to_json() {
    let oracle = json_session().run().unwrap();
    let report = serde_json::to_value(oracle.report()).unwrap();

    let functions = report["functions"].as_array().unwrap();
    let entry = functions
        .iter()
        .find(|f| f["name"] == "applyWithCallback")
        .unwrap();
    assert_eq!(entry["direction"], "In");
    assert_eq!(entry["local_direction"], "Unknown");
    assert_eq!(entry["callees"], serde_json::json!(["add", "multiply"]));

    let globals = report["globals"].as_array().unwrap();
    let factor = globals
        .iter()
        .find(|g| g["name"] == "g_polymorphismFactor")
        .unwrap();
    assert_eq!(factor["accessors"][0]["function"], "multiply");
    assert_eq!(report["stats"]["edges"], 3);
}
