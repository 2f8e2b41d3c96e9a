//! Integration tests for the executor workflow: target, next, start, done,
//! and the structured surface.

mod common;

use common::TestEnv;
use std::io::Cursor;
use waypoint::{Error, NextTask, Status, protocol};

#[test]
fn test_end_to_end_target_walk() {
    let mut env = TestEnv::new();
    let a = env.bare_task("A");
    let b = env.bare_task("B");
    env.dep(b.id, a.id);
    env.store.set_target(b.id).unwrap();

    // A is the first actionable task.
    match env.store.next(false).unwrap() {
        NextTask::Task { task } => assert_eq!(task.task.id, a.id),
        other => panic!("expected A, got {other:?}"),
    }

    env.store.start(a.id).unwrap();

    // Completion is gated on the criterion.
    let err = env.store.done().unwrap_err();
    assert!(matches!(err, Error::MissingCriterion(id) if id == a.id));

    env.store
        .edit(a.id, None, None, Some(Some("merged")))
        .unwrap();
    env.store.done().unwrap();

    match env.store.next(false).unwrap() {
        NextTask::Task { task } => assert_eq!(task.task.id, b.id),
        other => panic!("expected B, got {other:?}"),
    }

    env.store
        .edit(b.id, None, None, Some(Some("released")))
        .unwrap();
    env.store.start(b.id).unwrap();
    env.store.done().unwrap();

    match env.store.next(false).unwrap() {
        NextTask::TargetReached { target_id } => assert_eq!(target_id, Some(b.id)),
        other => panic!("expected target reached, got {other:?}"),
    }
}

#[test]
fn test_at_most_one_task_in_progress() {
    let mut env = TestEnv::new();
    let a = env.task("a");
    let b = env.task("b");
    let c = env.task("c");

    env.store.start(a.id).unwrap();
    assert!(env.store.start(b.id).is_err());
    assert!(env.store.start(c.id).is_err());

    // Across every step of the sequence exactly one task is in progress.
    let in_progress = |env: &mut TestEnv| {
        env.store
            .list(true, Some(Status::InProgress))
            .unwrap()
            .0
            .len()
    };
    assert_eq!(in_progress(&mut env), 1);

    env.store.done().unwrap();
    env.store.start(b.id).unwrap();
    assert_eq!(in_progress(&mut env), 1);
}

#[test]
fn test_start_idempotent_keeps_started_at() {
    let mut env = TestEnv::new();
    let a = env.task("a");

    let first = env.store.start(a.id).unwrap();
    let again = env.store.start(a.id).unwrap();

    assert_eq!(again.task.status, Status::InProgress);
    assert_eq!(again.task.started_at, first.task.started_at);
}

#[test]
fn test_stop_returns_to_pending_and_keeps_started_at() {
    let mut env = TestEnv::new();
    let a = env.task("a");

    let started = env.store.start(a.id).unwrap();
    let stopped = env.store.stop().unwrap();

    assert_eq!(stopped.task.status, Status::Pending);
    assert_eq!(stopped.task.started_at, started.task.started_at);
    assert!(env.store.current().is_err());
}

#[test]
fn test_blocking_active_task_lets_another_start() {
    let mut env = TestEnv::new();
    let a = env.task("a");
    let b = env.task("b");

    env.store.start(a.id).unwrap();
    let blocked = env.store.block(a.id).unwrap();
    assert_eq!(blocked.task.status, Status::Blocked);

    // The active slot is free again.
    let started = env.store.start(b.id).unwrap();
    assert_eq!(started.task.status, Status::InProgress);

    // And a can come back through unblock once b is out of the way.
    env.store.done().unwrap();
    env.store.unblock(a.id).unwrap();
    let resumed = env.store.start(a.id).unwrap();
    assert_eq!(resumed.task.status, Status::InProgress);
}

#[test]
fn test_artifact_workflow() {
    let mut env = TestEnv::new();
    let a = env.task("a");
    env.store.start(a.id).unwrap();

    env.store
        .log_artifact(None, "design", "docs/design.md")
        .unwrap();
    env.store
        .log_artifact(Some(a.id), "notes", "docs/notes.md")
        .unwrap();

    let artifacts = env.store.artifacts(Some(a.id)).unwrap();
    let names: Vec<&str> = artifacts.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["design", "notes"]);
    // Paths are stored verbatim; the files do not exist.
    assert_eq!(artifacts[0].file_path, "docs/design.md");
}

#[test]
fn test_reorder_and_reindex() {
    let mut env = TestEnv::new();
    let a = env.task("a");
    let b = env.task("b");
    let c = env.task("c");

    // Move c between a and b.
    let moved = env.store.reorder(c.id, Some(a.id), Some(b.id)).unwrap();
    assert_eq!(moved.manual_order, 15.0);
    assert_eq!(env.listed_ids(true), vec![a.id, c.id, b.id]);

    let tasks = env.store.reindex().unwrap();
    let orders: Vec<f64> = tasks.iter().map(|t| t.manual_order).collect();
    assert_eq!(orders, vec![10.0, 20.0, 30.0]);
    assert_eq!(env.listed_ids(true), vec![a.id, c.id, b.id]);
}

// =============================================================================
// Structured surface
// =============================================================================

fn serve_lines(env: &mut TestEnv, input: &str) -> Vec<serde_json::Value> {
    let mut output = Vec::new();
    protocol::serve(&mut env.store, Cursor::new(input.to_string()), &mut output)
        .expect("serve failed");
    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn test_serve_walks_a_target() {
    let mut env = TestEnv::new();

    let input = concat!(
        r#"{"type":"create","title":"A","criterion":"merged"}"#,
        "\n",
        r#"{"type":"create","title":"B","criterion":"released"}"#,
        "\n",
        r#"{"type":"add_dependency","task_id":2,"depends_on":1}"#,
        "\n",
        r#"{"type":"set_target","id":2}"#,
        "\n",
        r#"{"type":"next"}"#,
        "\n",
        r#"{"type":"start","id":1}"#,
        "\n",
        r#"{"type":"done"}"#,
        "\n",
    );

    let responses = serve_lines(&mut env, input);
    assert_eq!(responses.len(), 7);
    for response in &responses {
        assert_eq!(response["status"], "ok");
    }

    assert_eq!(responses[4]["data"]["type"], "task");
    assert_eq!(responses[4]["data"]["task"]["id"], 1);
    assert_eq!(responses[6]["data"]["status"], "completed");
}

#[test]
fn test_serve_reports_stable_error_codes() {
    let mut env = TestEnv::new();
    let a = env.task("a");
    let b = env.task("b");
    env.store.start(a.id).unwrap();

    // Starting b while a is active fails with a code the caller can branch on.
    let responses = serve_lines(&mut env, &format!("{{\"type\":\"start\",\"id\":{}}}\n", b.id));
    assert_eq!(responses[0]["status"], "error");
    assert_eq!(responses[0]["code"], "another_active");
    assert!(
        responses[0]["message"]
            .as_str()
            .unwrap()
            .contains(&format!("#{}", a.id))
    );
}

#[test]
fn test_serve_rejects_malformed_requests() {
    let mut env = TestEnv::new();
    let responses = serve_lines(&mut env, "{\"type\":\"launch\"}\nnot json at all\n");
    assert_eq!(responses.len(), 2);
    for response in &responses {
        assert_eq!(response["status"], "error");
        assert_eq!(response["code"], "invalid_request");
    }
}
