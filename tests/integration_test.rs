use codeloop::api::ScriptedModelService;
use codeloop::config::Config;
use codeloop::state::{ConversationState, Orchestrator, SessionRecord, SessionStore};
use codeloop::tools::ToolRegistry;
use codeloop::types::{Message, ToolCallRequest, ToolResult};
use codeloop::AgentError;
use serde_json::json;
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;

fn config(api_key: Option<&str>, model: &str, api_url: &str) -> Config {
    let working_dir = std::env::current_dir().expect("cwd");
    Config {
        api_key: api_key.map(str::to_string),
        model: model.to_string(),
        api_url: api_url.to_string(),
        anthropic_version: "2023-06-01".to_string(),
        session_dir: working_dir.join(".codeloop"),
        working_dir,
        mode: "normal".to_string(),
        streaming: false,
        max_tokens: 4096,
    }
}

#[test]
fn test_config_validation_rejects_invalid_models_for_remote_api() {
    let config = config(
        Some("test-key"),
        "local/mock-model",
        "https://api.anthropic.com/v1/messages",
    );
    assert!(matches!(config.validate(), Err(AgentError::Config { .. })));
}

#[test]
fn test_config_validation_allows_local_endpoint_without_api_key() {
    let config = config(None, "local/llama3.3", "http://localhost:8000/v1/messages");
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_validation_rejects_unknown_mode() {
    let mut config = config(
        Some("test-key"),
        "claude-opus-4-5-20251101",
        "https://api.anthropic.com/v1/messages",
    );
    config.mode = "turbo".to_string();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("normal, plan, yolo, build"));
}

#[test]
fn test_session_round_trip_preserves_id_messages_and_metadata() {
    let temp = TempDir::new().expect("temp dir");
    let call = ToolCallRequest::from_value("toolu_1", "read_file", json!({"path": "a.rs"}));
    let state = ConversationState::with_messages(
        vec![
            Message::Human("read a.rs".into()),
            Message::AssistantToolCalls(vec![call.clone()]),
            Message::ToolResult(ToolResult::success(&call, "fn a() {}")),
            Message::AssistantText("It defines a.".into()),
        ],
        "/work",
    );

    let mut record = SessionRecord::from_conversation("abc123", &state);
    record.set_metadata("model", json!("claude-opus-4-5-20251101"));
    let path = temp.path().join("sessions/abc123.json");
    record.save(&path).expect("save");

    let loaded = SessionRecord::load(&path).expect("load");
    assert_eq!(loaded.session_id, "abc123");
    assert_eq!(loaded.working_directory, "/work");
    assert_eq!(loaded.messages.len(), 4);
    assert_eq!(loaded.messages[1].role, "tool_call");
    assert_eq!(loaded.messages[1].content, "read_file({\"path\":\"a.rs\"})");
    assert_eq!(
        loaded.metadata_value("model"),
        Some(&json!("claude-opus-4-5-20251101"))
    );
    assert_eq!(
        loaded.restore_messages(),
        vec![
            Message::Human("read a.rs".into()),
            Message::AssistantText("It defines a.".into()),
        ]
    );
}

#[tokio::test]
async fn test_interactive_turns_are_recorded_and_resumable() {
    let temp = TempDir::new().expect("temp dir");
    let mut store = SessionStore::new(temp.path()).expect("store");
    store.create(Some("s1"), "/work");

    let model = ScriptedModelService::new()
        .respond_text("Hi there.")
        .respond_text("Still here.");
    let mut orchestrator = Orchestrator::new(Arc::new(model.clone()), ToolRegistry::new())
        .with_sessions(store);

    let mut output = Vec::new();
    orchestrator
        .run_interactive("/work", Cursor::new("hello\nare you there?\nexit\n"), &mut output)
        .await
        .expect("interactive session");

    let printed = String::from_utf8(output).unwrap();
    assert!(printed.contains("Agent: Hi there."));
    assert!(printed.contains("Agent: Still here."));

    let mut reopened = SessionStore::new(temp.path()).expect("store");
    let record = reopened.load("s1").expect("load").expect("session saved");
    assert_eq!(record.messages.len(), 4);
    assert_eq!(record.restore_messages().len(), 4);

    let missing = reopened.load("nope").expect("load");
    assert!(missing.is_none());
    assert_eq!(reopened.list().expect("list"), vec!["s1".to_string()]);
}

#[tokio::test]
async fn test_resumed_session_appends_only_the_new_turn() {
    let temp = TempDir::new().expect("temp dir");
    let call = ToolCallRequest::from_value("toolu_1", "read_file", json!({"path": "a.rs"}));
    let earlier = ConversationState::with_messages(
        vec![
            Message::Human("read a.rs".into()),
            Message::AssistantToolCalls(vec![call.clone()]),
            Message::ToolResult(ToolResult::success(&call, "fn a() {}")),
            Message::AssistantText("It defines a.".into()),
        ],
        "/work",
    );
    let mut store = SessionStore::new(temp.path()).expect("store");
    SessionRecord::from_conversation("s2", &earlier)
        .save(&store.path_for("s2"))
        .expect("save");

    let restored = store
        .load("s2")
        .expect("load")
        .expect("session exists")
        .restore_messages();
    assert_eq!(restored.len(), 2);

    let model = ScriptedModelService::new().respond_text("It defines b.");
    let mut orchestrator = Orchestrator::new(Arc::new(model.clone()), ToolRegistry::new())
        .with_sessions(store);
    orchestrator.resume(ConversationState::with_messages(restored, "/work"));

    let mut output = Vec::new();
    orchestrator
        .run_interactive("/work", Cursor::new("and b.rs?\nexit\n"), &mut output)
        .await
        .expect("interactive session");

    assert_eq!(
        model.transcripts()[0],
        vec![
            Message::Human("read a.rs".into()),
            Message::AssistantText("It defines a.".into()),
            Message::Human("and b.rs?".into()),
        ]
    );

    let mut reopened = SessionStore::new(temp.path()).expect("store");
    let record = reopened.load("s2").expect("load").expect("session saved");
    let roles: Vec<&str> = record.messages.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(
        roles,
        vec!["user", "tool_call", "tool", "assistant", "user", "assistant"]
    );
    assert_eq!(record.messages[4].content, "and b.rs?");
    assert_eq!(record.messages[5].content, "It defines b.");
}
