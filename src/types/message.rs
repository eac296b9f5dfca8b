//! Transcript and streaming types shared by the orchestrator, dispatcher and sink.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type ToolArguments = Map<String, Value>;

/// A model-issued request to run one tool. `id` correlates it with its `ToolResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: ToolArguments,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: ToolArguments) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Build from a JSON value, treating anything but an object as "no arguments".
    pub fn from_value(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        let arguments = match input {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(id, name, arguments)
    }

    pub fn arguments_json(&self) -> String {
        serde_json::to_string(&self.arguments).unwrap_or_else(|_| "{}".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub text: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(request: &ToolCallRequest, text: impl Into<String>) -> Self {
        Self {
            call_id: request.id.clone(),
            tool_name: request.name.clone(),
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(request: &ToolCallRequest, text: impl Into<String>) -> Self {
        Self {
            call_id: request.id.clone(),
            tool_name: request.name.clone(),
            text: text.into(),
            is_error: true,
        }
    }
}

/// One entry of the append-only conversation transcript.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Human(String),
    AssistantText(String),
    AssistantToolCalls(Vec<ToolCallRequest>),
    ToolResult(ToolResult),
}

impl Message {
    pub fn role(&self) -> &'static str {
        match self {
            Message::Human(_) => "user",
            Message::AssistantText(_) | Message::AssistantToolCalls(_) => "assistant",
            Message::ToolResult(_) => "tool",
        }
    }
}

/// Incremental output observed by a stream sink, in production order.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Token(String),
    ToolStart {
        name: String,
        arguments: ToolArguments,
    },
    ToolEnd {
        name: String,
        output: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_drops_non_object_input() {
        let request = ToolCallRequest::from_value("toolu_1", "git_status", json!("bogus"));
        assert!(request.arguments.is_empty());

        let request = ToolCallRequest::from_value("toolu_2", "search_code", json!({"pattern": "x"}));
        assert_eq!(request.arguments.get("pattern"), Some(&json!("x")));
        assert_eq!(request.arguments_json(), r#"{"pattern":"x"}"#);
    }

    #[test]
    fn test_message_roles() {
        let call = ToolCallRequest::from_value("toolu_1", "read_file", json!({"path": "a"}));
        let result = ToolResult::error(&call, "Error: File not found: a");

        assert_eq!(Message::Human("hi".into()).role(), "user");
        assert_eq!(Message::AssistantText("done".into()).role(), "assistant");
        assert_eq!(Message::AssistantToolCalls(vec![call]).role(), "assistant");
        assert_eq!(Message::ToolResult(result).role(), "tool");
    }
}
