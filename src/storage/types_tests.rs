//! Unit tests for storage record types and builders.

use super::*;
use serde_json::json;

#[test]
fn test_session_record_new() {
    let record = SessionRecord::new(SessionState::new("Server crashed at 2AM"));
    assert!(!record.id.is_empty());
    assert_eq!(record.problem, "Server crashed at 2AM");
    assert_eq!(record.status, SessionStatus::Idle);
    assert_eq!(record.created_at, record.updated_at);
}

#[test]
fn test_session_record_ids_are_unique() {
    let a = SessionRecord::new(SessionState::new("p"));
    let b = SessionRecord::new(SessionState::new("p"));
    assert_ne!(a.id, b.id);
}

#[test]
fn test_with_state_refreshes_status() {
    let record = SessionRecord::new(SessionState::new("p"));
    let id = record.id.clone();
    let created = record.created_at;

    let mut state = SessionState::new("p");
    state.iteration = 1;
    state.current_question = Some("Why?".to_string());
    let updated = record.with_state(state);

    assert_eq!(updated.id, id);
    assert_eq!(updated.created_at, created);
    assert_eq!(updated.status, SessionStatus::Questioning);
    assert!(updated.updated_at >= created);
}

#[test]
fn test_invocation_new() {
    let inv = Invocation::new("rca_start", json!({"problem": "p"}));
    assert!(!inv.id.is_empty());
    assert_eq!(inv.tool_name, "rca_start");
    assert!(inv.session_id.is_none());
    assert!(inv.success);
    assert!(inv.output.is_none());
}

#[test]
fn test_invocation_success() {
    let inv = Invocation::new("submit_answer", json!({}))
        .with_session("sess-1")
        .success(json!({"type": "next_question"}), 120);
    assert!(inv.success);
    assert_eq!(inv.session_id.as_deref(), Some("sess-1"));
    assert_eq!(inv.latency_ms, Some(120));
    assert!(inv.error.is_none());
}

#[test]
fn test_invocation_failure() {
    let inv = Invocation::new("submit_answer", json!({})).failure("Gateway timed out", 5000);
    assert!(!inv.success);
    assert_eq!(inv.error.as_deref(), Some("Gateway timed out"));
    assert!(inv.output.is_none());
}
