//! Integration tests for scripted replay
//!
//! Tests the flow: JSONL script -> ScriptRunner -> renderer -> memory surfaces,
//! the same path the `tracesync replay` command takes.

use std::io::Write;
use std::sync::Arc;

use tracesync::{parse_script, Config, LoopHandle, MemorySurfaceFactory, ScriptRunner, SyncError};

use super::common::client_view;

const BRANCHING: &str = r#"
# a question with two answers, the second replacing the first
{"op":"node","id":1,"input":[{"text":"Q: "}],"output":[{"text":"A"}]}
{"op":"node","id":2,"parent":1,"output":[{"text":"B"}]}
{"op":"node","id":3,"parent":2,"output":[{"text":"C"}]}
{"op":"node","id":4,"parent":1,"output":[{"text":"D"}]}
{"op":"ready"}
{"op":"trace","id":1}
{"op":"trace","id":2}
{"op":"trace","id":3}
{"op":"trace","id":4}
{"op":"metric","name":"tokens","value":4}
{"op":"complete"}
"#;

fn script_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

/// Test that a branching script ends with the client on the final branch
#[tokio::test]
async fn test_replay_branching_script() {
    let file = script_file(BRANCHING);
    let steps = parse_script(&std::fs::read_to_string(file.path()).unwrap()).unwrap();

    let config = Config {
        debug_capture: true,
        ..Config::default()
    };
    let factory = Arc::new(MemorySurfaceFactory::new());
    let mut runner = ScriptRunner::new(LoopHandle::current(), &config, factory.clone());
    runner.run(&steps).await.unwrap();
    assert_eq!(runner.renderer().last_trace_id(), Some(4));

    let export = runner.finish().await.expect("debug capture was enabled");
    let export: serde_json::Value = serde_json::from_str(&export).unwrap();
    assert!(export["messageCount"].as_u64().unwrap() > 0);

    let surface = factory.latest().unwrap();
    let delivered = surface.sent_messages();
    assert_eq!(client_view(&delivered), vec![1, 4]);
    assert_eq!(factory.surfaces().len(), 1);

    let last = serde_json::to_value(delivered.last().unwrap()).unwrap();
    assert_eq!(last["name"], "status");
    assert_eq!(last["value"], "Done");
}

/// Test that evicting the displayed node falls back to a replay from the root
#[tokio::test]
async fn test_replay_after_eviction_rebuilds_from_root() {
    let steps = parse_script(
        r#"
{"op":"node","id":1,"output":[{"text":"a"}]}
{"op":"node","id":2,"parent":1,"output":[{"text":"b"}]}
{"op":"node","id":3,"parent":2,"output":[{"text":"c"}]}
{"op":"node","id":4,"parent":2,"output":[{"text":"d"}]}
{"op":"trace","id":1}
{"op":"ready"}
{"op":"trace","id":2}
{"op":"trace","id":3}
{"op":"evict","id":3}
{"op":"trace","id":4}
"#,
    )
    .unwrap();

    let factory = Arc::new(MemorySurfaceFactory::new());
    let mut runner = ScriptRunner::new(LoopHandle::current(), &Config::default(), factory.clone());
    runner.run(&steps).await.unwrap();
    assert!(!runner.arena().contains(3));
    runner.finish().await;

    let delivered = factory.latest().unwrap().sent_messages();
    assert_eq!(client_view(&delivered), vec![1, 2, 4]);
    let resets = delivered.iter().filter(|m| m.is_reset()).count();
    assert_eq!(resets, 2);
}

/// Test that a session step moves the client to a new surface
#[tokio::test]
async fn test_replay_session_switch() {
    let steps = parse_script(
        r#"
{"op":"node","id":1}
{"op":"node","id":2}
{"op":"trace","id":1}
{"op":"ready"}
{"op":"session","context":"cell-2"}
{"op":"trace","id":2}
{"op":"request_output"}
"#,
    )
    .unwrap();

    let factory = Arc::new(MemorySurfaceFactory::new());
    let mut runner = ScriptRunner::new(LoopHandle::current(), &Config::default(), factory.clone());
    runner.run(&steps).await.unwrap();
    runner.finish().await;

    let surfaces = factory.surfaces();
    assert_eq!(surfaces.len(), 2);
    let delivered: Vec<_> = surfaces.iter().flat_map(|s| s.sent_messages()).collect();
    assert_eq!(client_view(&delivered), vec![2]);
}

/// Test that steps referring to unknown parents are rejected with their line
#[tokio::test]
async fn test_replay_rejects_unknown_parent() {
    let steps = parse_script("{\"op\":\"node\",\"id\":1}\n{\"op\":\"node\",\"id\":2,\"parent\":9}\n").unwrap();

    let factory = Arc::new(MemorySurfaceFactory::new());
    let mut runner = ScriptRunner::new(LoopHandle::current(), &Config::default(), factory);
    match runner.run(&steps).await {
        Err(SyncError::Script { line, message }) => {
            assert_eq!(line, 2);
            assert!(message.contains("parent 9"));
        }
        other => panic!("expected script error, got {other:?}"),
    }
    runner.finish().await;
}
